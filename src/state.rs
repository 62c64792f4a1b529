use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::llm::{GeminiImageGenerator, ImageGenerator};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn ImageGenerator>,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub started_at: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        upload_dir: PathBuf,
        output_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        AppState {
            generator,
            upload_dir,
            output_dir,
            max_upload_bytes,
            started_at: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(GeminiImageGenerator::from_config(config)),
            config.upload_dir.clone(),
            config.output_dir.clone(),
            config.max_upload_bytes,
        )
    }
}
