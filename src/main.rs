use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};

mod config;
mod handlers;
mod llm;
mod scenes;
mod server;
mod state;
mod storage;
mod utils;

use config::CONFIG;
use state::AppState;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_dir, &CONFIG.log_level);
    info!("Starting product photoshoot service");

    if CONFIG.gemini_api_key.is_empty() {
        warn!("GOOGLE_API_KEY is not set; image generation requests will fail");
    }

    storage::ensure_dirs(&[CONFIG.upload_dir.as_path(), CONFIG.output_dir.as_path()])
        .context("Failed to create upload/output directories")?;

    let state = AppState::from_config(&CONFIG);
    server::run(state, &CONFIG).await
}
