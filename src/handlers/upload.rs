use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::llm::media::{detect_mime_type, is_image_mime, normalize_image_mime};
use crate::llm::ImageGenerationError;
use crate::scenes::{select_prompt, Demographic, Scene};
use crate::state::AppState;
use crate::storage::{self, StoredFile, OUTPUTS_MOUNT, UPLOADS_MOUNT};
use crate::utils::timing::RequestTimer;

pub const FILE_FIELD: &str = "productImage";
pub const SCENE_FIELD: &str = "sceneType";
pub const DEMOGRAPHIC_FIELDS: [&str; 2] = ["demographic", "modelType"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No image uploaded")]
    MissingFile,
    #[error("Only image files are allowed!")]
    NotAnImage,
    #[error("File too large (max {max_mb} MB)")]
    TooLarge { max_mb: usize },
    #[error("Invalid upload: {0}")]
    Malformed(String),
    #[error("Failed to store file: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Generation(#[from] ImageGenerationError),
}

impl UploadError {
    fn too_large(max_bytes: usize) -> Self {
        UploadError::TooLarge {
            max_mb: max_bytes.div_ceil(1024 * 1024),
        }
    }

    fn from_multipart(err: MultipartError, max_bytes: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large(max_bytes)
        } else {
            UploadError::Malformed(err.body_text())
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MissingFile | UploadError::NotAnImage | UploadError::Malformed(_) => {
                StatusCode::BAD_REQUEST
            }
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Storage(_) | UploadError::Generation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub original_image: String,
    pub generated_image: String,
    pub model: String,
    pub scene_type: String,
    pub demographic: String,
}

#[derive(Debug)]
struct UploadedImage {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedImage>,
    scene_type: Option<String>,
    demographic: Option<String>,
}

async fn read_limited(mut field: Field<'_>, max_bytes: usize) -> Result<Vec<u8>, UploadError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| UploadError::from_multipart(err, max_bytes))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(UploadError::too_large(max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Declared type must be `image/*`; sniffed bytes override it when recognised.
fn resolve_image_mime(declared: Option<&str>, bytes: &[u8]) -> Result<String, UploadError> {
    let declared = declared.map(normalize_image_mime).unwrap_or_default();
    if !is_image_mime(&declared) {
        return Err(UploadError::NotAnImage);
    }
    match detect_mime_type(bytes) {
        Some(detected) if is_image_mime(&detected) => Ok(normalize_image_mime(&detected)),
        Some(_) => Err(UploadError::NotAnImage),
        None => Ok(declared),
    }
}

async fn read_upload_form(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::from_multipart(err, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let declared = field.content_type().map(|value| value.to_string());
            let bytes = read_limited(field, max_bytes).await?;
            if bytes.is_empty() {
                continue;
            }
            let mime_type = resolve_image_mime(declared.as_deref(), &bytes)?;
            form.file = Some(UploadedImage {
                file_name,
                mime_type,
                bytes,
            });
        } else if name == SCENE_FIELD {
            form.scene_type = Some(
                field
                    .text()
                    .await
                    .map_err(|err| UploadError::from_multipart(err, max_bytes))?,
            );
        } else if DEMOGRAPHIC_FIELDS.contains(&name.as_str()) {
            form.demographic = Some(
                field
                    .text()
                    .await
                    .map_err(|err| UploadError::from_multipart(err, max_bytes))?,
            );
        }
    }

    Ok(form)
}

async fn generate_for_upload(
    state: &AppState,
    form: &UploadForm,
    image: &UploadedImage,
    stored: &StoredFile,
) -> Result<UploadResponse, UploadError> {
    let scene = Scene::resolve(form.scene_type.as_deref());
    let demographic = Demographic::resolve(form.demographic.as_deref());
    let prompt = select_prompt(scene, demographic);

    info!(
        "Generating {} image (demographic={}) with {}",
        scene.id(),
        demographic.id(),
        state.generator.model()
    );

    let generated = state
        .generator
        .generate(&prompt, &image.bytes, &image.mime_type)
        .await?;
    let output =
        storage::save_generated(&state.output_dir, &generated.bytes, &generated.mime_type).await?;

    Ok(UploadResponse {
        success: true,
        message: "Image generated successfully".to_string(),
        original_image: stored.public_url(UPLOADS_MOUNT),
        generated_image: output.public_url(OUTPUTS_MOUNT),
        model: state.generator.model().to_string(),
        scene_type: scene.id().to_string(),
        demographic: demographic.id().to_string(),
    })
}

async fn process_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    timer: &mut RequestTimer,
) -> Result<UploadResponse, UploadError> {
    let multipart = multipart.map_err(|rejection| UploadError::Malformed(rejection.body_text()))?;
    let form = read_upload_form(multipart, state.max_upload_bytes).await?;
    let Some(image) = form.file.as_ref() else {
        return Err(UploadError::MissingFile);
    };
    timer.set_file(&image.file_name, image.bytes.len());

    let stored = storage::save_upload(&state.upload_dir, &image.file_name, &image.bytes).await?;
    match generate_for_upload(state, &form, image, &stored).await {
        Ok(response) => Ok(response),
        Err(err) => {
            storage::remove_file(&stored.path).await;
            Err(err)
        }
    }
}

pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut timer = RequestTimer::start("upload");
    match process_upload(&state, multipart, &mut timer).await {
        Ok(body) => {
            info!("Generated {} from {}", body.generated_image, body.original_image);
            timer.complete("success", None);
            Json(body).into_response()
        }
        Err(err) => {
            if err.status().is_server_error() {
                error!("Upload error: {}", err);
            } else {
                warn!("Rejected upload: {}", err);
            }
            timer.complete("error", Some(err.to_string()));
            err.into_response()
        }
    }
}
