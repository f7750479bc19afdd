//! Generator trait and retry helper.

use crate::error::Result;
use crate::image::EncodedImage;
use async_trait::async_trait;

/// Trait for backends that render a try-on image.
#[async_trait]
pub trait TryOnGenerator: Send + Sync {
    /// Renders `subject` wearing `garment`, returning a `data:` URI.
    async fn generate(&self, subject: &EncodedImage, garment: &EncodedImage) -> Result<String>;

    /// Returns the name of this generator for display.
    fn name(&self) -> &str;

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

/// Extension trait for generators with retry logic.
#[async_trait]
pub trait TryOnGeneratorExt: TryOnGenerator {
    /// Generates with automatic retries on transient failures.
    async fn generate_with_retries(
        &self,
        subject: &EncodedImage,
        garment: &EncodedImage,
        max_retries: u32,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.generate(subject, garment).await {
                Ok(uri) => return Ok(uri),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = e.retry_after().unwrap_or(std::time::Duration::from_secs(1));
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis(),
                        "retrying after transient error: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: TryOnGenerator + ?Sized> TryOnGeneratorExt for T {}
