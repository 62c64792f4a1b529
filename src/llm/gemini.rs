use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llm::media::{detect_mime_type, is_image_mime, normalize_image_mime};
use crate::llm::ImageGenerator;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, thiserror::Error)]
pub enum ImageGenerationError {
    #[error("Google AI API key missing; set GOOGLE_API_KEY")]
    MissingApiKey,
    #[error("Gemini request failed: {0}")]
    Transport(String),
    #[error("Gemini request failed with status {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("Failed to parse Gemini response: {0}")]
    InvalidResponse(String),
    #[error("No response candidate returned{}", reason_suffix(.0))]
    NoCandidate(Option<String>),
    #[error("No image data returned from model{}", reason_suffix(.0))]
    NoImage(Option<String>),
    #[error("Returned image data could not be decoded: {0}")]
    Decode(#[from] base64::DecodeError),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|value| format!(" ({value})"))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

pub struct GeminiImageGenerator {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiImageGenerator {
    pub fn new(api_key: &str, model: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.gemini_api_key,
            &config.gemini_image_model,
            &config.gemini_api_base_url,
            Duration::from_secs(config.gemini_timeout_seconds),
        )
    }

    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.api_key, "[redacted]")
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn call_api(&self, payload: Value) -> Result<GeminiResponse, ImageGenerationError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = %self.model, payload = %payload_summary);
        }

        info!("Sending image generation request to Gemini (model={})", self.model);
        let response = get_http_client()
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                ImageGenerationError::Transport(err_text)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ImageGenerationError::Transport(self.redact(&err.to_string())))?;

        if !status.is_success() {
            let (message, body_summary) = summarize_error_body(&body);
            let body_summary = self.redact(&body_summary);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(ImageGenerationError::Status {
                status,
                detail: message
                    .map(|message| self.redact(&message))
                    .unwrap_or(body_summary),
            });
        }

        let value = serde_json::from_str::<GeminiResponse>(&body)
            .map_err(|err| ImageGenerationError::InvalidResponse(err.to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.model, response = %response_summary);
        }
        Ok(value)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<GeneratedImage, ImageGenerationError> {
        if self.api_key.is_empty() {
            return Err(ImageGenerationError::MissingApiKey);
        }

        let payload = build_image_payload(prompt, image, mime_type);
        let metadata = json!({ "promptChars": prompt.chars().count(), "imageBytes": image.len() });

        log_llm_timing("gemini", &self.model, "generate_image", Some(metadata), move || async move {
            let response = self.call_api(payload).await?;
            let generated = extract_generated_image(response)?;
            if let Some(text) = generated.text.as_deref() {
                info!("Gemini text response: {}", truncate_for_log(text, 500));
            }
            Ok::<_, ImageGenerationError>(generated)
        })
        .await
    }
}

fn inline_mime_type(mime_type: &str, image: &[u8]) -> String {
    let declared = normalize_image_mime(mime_type);
    if is_image_mime(&declared) {
        return declared;
    }
    detect_mime_type(image)
        .filter(|detected| is_image_mime(detected))
        .unwrap_or_else(|| "image/png".to_string())
}

fn build_image_payload(prompt: &str, image: &[u8], mime_type: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inlineData": {
                        "mimeType": inline_mime_type(mime_type, image),
                        "data": general_purpose::STANDARD.encode(image)
                    }
                }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    })
}

/// Reads the first candidate only; the first inline image part wins.
fn extract_generated_image(
    response: GeminiResponse,
) -> Result<GeneratedImage, ImageGenerationError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);
    let Some(candidate) = response.candidates.and_then(|list| list.into_iter().next()) else {
        return Err(ImageGenerationError::NoCandidate(block_reason));
    };

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();

    let mut text_parts = Vec::new();
    let mut image = None;
    for part in parts {
        match part {
            GeminiPart::Text { text } => {
                if !text.trim().is_empty() {
                    text_parts.push(text);
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if !inline_data.mime_type.is_empty() && !is_image_mime(&inline_data.mime_type) {
                    continue;
                }
                image = Some(inline_data);
                break;
            }
            GeminiPart::Other(_) => {}
        }
    }

    let Some(inline_data) = image else {
        return Err(ImageGenerationError::NoImage(candidate.finish_reason));
    };
    let bytes = general_purpose::STANDARD.decode(inline_data.data.trim())?;
    let mime_type = if inline_data.mime_type.is_empty() {
        detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string())
    } else {
        normalize_image_mime(&inline_data.mime_type)
    };

    Ok(GeneratedImage {
        bytes,
        mime_type,
        text: if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        },
    })
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| {
                    parts
                        .iter()
                        .map(|part| {
                            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                                json!({ "text": truncate_for_log(text, 200) })
                            } else if let Some(inline_data) = part.get("inlineData") {
                                let mime_type = inline_data
                                    .get("mimeType")
                                    .and_then(|value| value.as_str())
                                    .unwrap_or("unknown");
                                let data_len = inline_data
                                    .get("data")
                                    .and_then(|value| value.as_str())
                                    .map(|value| value.len())
                                    .unwrap_or(0);
                                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                            } else {
                                json!({ "unknownPart": true })
                            }
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            summarized_contents.push(json!({ "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut other_parts = 0usize;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for part in candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
    {
        match part {
            GeminiPart::Text { .. } => text_parts += 1,
            GeminiPart::InlineData { .. } => image_parts += 1,
            GeminiPart::Other(_) => other_parts += 1,
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "otherParts": other_parts,
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn parse(body: Value) -> GeminiResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn payload_puts_prompt_before_image() {
        let payload = build_image_payload("studio shot", b"\x89PNG\r\n\x1a\n0000", "image/png");
        let parts = payload.pointer("/contents/0/parts").unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "studio shot");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(
            parts[1]["inlineData"]["data"],
            general_purpose::STANDARD.encode(b"\x89PNG\r\n\x1a\n0000")
        );
        assert_eq!(
            payload.pointer("/generationConfig/responseModalities/1"),
            Some(&json!("IMAGE"))
        );
    }

    #[test]
    fn payload_normalizes_jpg_alias() {
        let payload = build_image_payload("p", b"data", "image/jpg");
        assert_eq!(
            payload.pointer("/contents/0/parts/1/inlineData/mimeType"),
            Some(&json!("image/jpeg"))
        );
    }

    #[test]
    fn payload_defaults_unknown_type_to_png() {
        let payload = build_image_payload("p", b"not an image", "application/octet-stream");
        assert_eq!(
            payload.pointer("/contents/0/parts/1/inlineData/mimeType"),
            Some(&json!("image/png"))
        );
    }

    #[test]
    fn extracts_first_inline_image_and_text() {
        let encoded = general_purpose::STANDARD.encode(b"first");
        let response = parse(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your photo" },
                    { "inlineData": { "mimeType": "image/png", "data": encoded } },
                    { "inlineData": { "mimeType": "image/png", "data": general_purpose::STANDARD.encode(b"second") } }
                ] },
                "finishReason": "STOP"
            }]
        }));

        let image = extract_generated_image(response).unwrap();
        assert_eq!(image.bytes, b"first");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.text.as_deref(), Some("Here is your photo"));
    }

    #[test]
    fn ignores_unknown_parts() {
        let response = parse(json!({
            "candidates": [{
                "content": { "parts": [
                    { "thoughtSignature": "abc" },
                    { "inlineData": { "mimeType": "image/jpeg", "data": general_purpose::STANDARD.encode(b"img") } }
                ] }
            }]
        }));

        let image = extract_generated_image(response).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(image.text.is_none());
    }

    #[test]
    fn missing_candidates_reports_block_reason() {
        let response = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        let err = extract_generated_image(response).unwrap_err();
        assert!(matches!(err, ImageGenerationError::NoCandidate(Some(ref reason)) if reason == "SAFETY"));
        assert_eq!(err.to_string(), "No response candidate returned (SAFETY)");
    }

    #[test]
    fn later_candidates_are_not_consulted() {
        let response = parse(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "only words" }] }, "finishReason": "STOP" },
                { "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": general_purpose::STANDARD.encode(b"second") } }
                ] } }
            ]
        }));
        let err = extract_generated_image(response).unwrap_err();
        assert!(matches!(err, ImageGenerationError::NoImage(Some(ref reason)) if reason == "STOP"));
    }

    #[test]
    fn text_only_candidate_is_an_error() {
        let response = parse(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I cannot do that" }] },
                "finishReason": "STOP"
            }]
        }));
        let err = extract_generated_image(response).unwrap_err();
        assert_eq!(err.to_string(), "No image data returned from model (STOP)");
    }

    #[test]
    fn error_body_message_is_extracted() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let generator = GeminiImageGenerator::new(
            "  ",
            "gemini-2.5-flash-image",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        );
        let err = generator.generate("p", b"x", "image/png").await.unwrap_err();
        assert!(matches!(err, ImageGenerationError::MissingApiKey));
    }

    #[test]
    fn endpoint_targets_generate_content() {
        let generator = GeminiImageGenerator::new(
            "key",
            "gemini-2.5-flash-image",
            "https://example.test/",
            Duration::from_secs(1),
        );
        assert_eq!(
            generator.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    fn mock_generator(server: &MockServer, api_key: &str) -> GeminiImageGenerator {
        GeminiImageGenerator::new(api_key, "test-image-model", &server.uri(), Duration::from_secs(5))
    }

    const GENERATE_PATH: &str = "/v1beta/models/test-image-model:generateContent";

    #[tokio::test]
    async fn generate_posts_prompt_and_image_with_key_header() {
        let server = MockServer::start().await;
        let output = general_purpose::STANDARD.encode(b"composite");
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "secret-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [
                        { "text": "Done" },
                        { "inlineData": { "mimeType": "image/png", "data": output } }
                    ] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = mock_generator(&server, "secret-key");
        let image = generator
            .generate("studio prompt", b"\x89PNG\r\n\x1a\nrest", "image/png")
            .await
            .unwrap();

        assert_eq!(image.bytes, b"composite");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.text.as_deref(), Some("Done"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.as_str().contains("secret-key"));
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body.pointer("/contents/0/parts/0/text"), Some(&json!("studio prompt")));
        assert_eq!(
            body.pointer("/contents/0/parts/1/inlineData/data"),
            Some(&json!(general_purpose::STANDARD.encode(b"\x89PNG\r\n\x1a\nrest")))
        );
    }

    #[tokio::test]
    async fn api_error_message_becomes_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = mock_generator(&server, "bad-key")
            .generate("p", b"img", "image/png")
            .await
            .unwrap_err();

        assert!(matches!(err, ImageGenerationError::Status { status, .. } if status == StatusCode::BAD_REQUEST));
        assert!(err.to_string().ends_with(": API key not valid"));
    }

    #[tokio::test]
    async fn echoed_key_is_redacted_from_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "message": "key leaked-key-123 is disabled" }
            })))
            .mount(&server)
            .await;

        let err = mock_generator(&server, "leaked-key-123")
            .generate("p", b"img", "image/png")
            .await
            .unwrap_err();

        let text = err.to_string();
        assert!(!text.contains("leaked-key-123"));
        assert!(text.contains("key [redacted] is disabled"));
    }

    #[tokio::test]
    async fn non_json_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = mock_generator(&server, "k")
            .generate("p", b"img", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, ImageGenerationError::InvalidResponse(_)));
    }

    #[test]
    fn redact_replaces_every_occurrence() {
        let generator = GeminiImageGenerator::new("abc", "m", "http://x", Duration::from_secs(1));
        assert_eq!(generator.redact("abc and abc"), "[redacted] and [redacted]");
        let keyless = GeminiImageGenerator::new("", "m", "http://x", Duration::from_secs(1));
        assert_eq!(keyless.redact("abc"), "abc");
    }
}
