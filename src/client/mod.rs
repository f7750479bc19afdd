//! Generation client: request construction and image extraction.

mod gemini;
mod generator;
#[cfg(test)]
pub(crate) mod testing;

pub use gemini::{GeminiModel, GeminiTryOnClient, GeminiTryOnClientBuilder, TRY_ON_INSTRUCTION};
pub use generator::{TryOnGenerator, TryOnGeneratorExt};
