pub mod gemini;
pub mod media;

use async_trait::async_trait;

pub use gemini::{GeminiImageGenerator, GeneratedImage, ImageGenerationError};

/// A single-shot image generation backend.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<GeneratedImage, ImageGenerationError>;
}
