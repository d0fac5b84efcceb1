//! Generation provider implementations.
//!
//! Only Google Gemini is wired up; see [`GeminiGenerator`].

mod gemini;
mod sse;

use std::sync::Arc;

use docchat_core::generation::Generator;
use docchat_core::Result;

use crate::config::GenerationConfig;

pub use gemini::GeminiGenerator;
pub use sse::SseDecoder;

/// Instantiate the configured generator with its API key.
pub fn create_generator(config: &GenerationConfig, api_key: String) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(GeminiGenerator::new(config, api_key)?))
}
