use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "photoshoot.timing";

#[derive(Debug)]
pub struct RequestTimer {
    operation: String,
    file_name: Option<String>,
    file_size: Option<usize>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn start(operation: &str) -> Self {
        let timer = RequestTimer {
            operation: operation.to_string(),
            file_name: None,
            file_size: None,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        };
        info!(
            target: "photoshoot.timing",
            "event=request_received operation={} received_at={}",
            timer.operation,
            timer.started_at.to_rfc3339()
        );
        timer
    }

    pub fn set_file(&mut self, file_name: &str, file_size: usize) {
        self.file_name = Some(file_name.to_string());
        self.file_size = Some(file_size);
    }

    pub fn complete(&mut self, status: &str, detail: Option<String>) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.status = status.to_string();
        self.detail = detail;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "photoshoot.timing",
            "event=request_completed operation={} file={:?} size={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.file_name,
            self.file_size,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.completed {
            self.complete("aborted", None);
        }
    }
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "photoshoot.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "photoshoot.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok: Result<u32, String> =
            log_llm_timing("gemini", "m", "op", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            log_llm_timing("gemini", "m", "op", None, || async { Err("boom".to_string()) })
                .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn timer_completes_once() {
        let mut timer = RequestTimer::start("upload");
        timer.set_file("a.png", 3);
        timer.complete("error", Some("first".to_string()));
        timer.complete("success", None);
        assert_eq!(timer.status, "error");
        assert_eq!(timer.detail.as_deref(), Some("first"));
    }
}
