//! Embedding provider implementations.
//!
//! - **[`CohereEmbedder`]**: calls the Cohere `/v1/embed` API with batching,
//!   retry, and backoff. Requires an API key.
//! - **[`HashingEmbedder`]**: deterministic local feature hashing; no
//!   network, no key. Meant for offline use and tests.
//!
//! Use [`create_provider`] to pick one from configuration.

mod cohere;
mod hashing;

use std::sync::Arc;

use anyhow::{bail, Result};
use docchat_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

pub use cohere::CohereEmbedder;
pub use hashing::HashingEmbedder;

/// Instantiate the provider named by `config.provider`.
///
/// `api_key` is required for `cohere` and ignored for `hashing`.
pub fn create_provider(
    config: &EmbeddingConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "cohere" => {
            let Some(key) = api_key else {
                bail!("{} is not set", config.api_key_env);
            };
            Ok(Arc::new(CohereEmbedder::new(config, key)?))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
