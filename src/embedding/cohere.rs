use async_trait::async_trait;
use docchat_core::embedding::EmbeddingProvider;
use docchat_core::{Error, Result};
use reqwest::Client;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::http;

const COHERE_EMBED_URL: &str = "https://api.cohere.com/v1/embed";

/// Embedding provider backed by the Cohere API.
///
/// Documents are embedded with `input_type = "search_document"` and
/// queries with `"search_query"`, as the v3 models expect.
pub struct CohereEmbedder {
    client: Client,
    api_key: String,
    model: String,
    batch_size: usize,
    max_retries: u32,
}

impl CohereEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn call(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "texts": texts,
            "input_type": input_type,
            "truncate": "END",
        });
        let auth = format!("Bearer {}", self.api_key);
        let response = http::post_json(
            &self.client,
            "Cohere",
            COHERE_EMBED_URL,
            &[("Authorization", auth.as_str())],
            &body,
            self.max_retries,
        )
        .await?;

        let json: serde_json::Value = response.json().await.map_err(Error::generation)?;
        let vectors = parse_embed_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(Error::Generation(format!(
                "Cohere returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call(&[text.to_string()], "search_query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Generation("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(batch = batch.len(), "embedding document batch");
            out.extend(self.call(batch, "search_document").await?);
        }
        Ok(out)
    }
}

/// Extract `embeddings` from a `/v1/embed` response.
///
/// Accepts both the plain `[[f32]]` shape and the typed
/// `{"float": [[f32]]}` shape.
fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .ok_or_else(|| Error::Generation("invalid Cohere response: missing embeddings".into()))?;
    let rows = embeddings
        .as_array()
        .or_else(|| embeddings.get("float").and_then(|f| f.as_array()))
        .ok_or_else(|| Error::Generation("invalid Cohere response: embeddings shape".into()))?;

    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
                .ok_or_else(|| Error::Generation("invalid Cohere response: row".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_embeddings() {
        let json = serde_json::json!({"id": "x", "embeddings": [[0.5, -1.0], [0.0, 2.0]]});
        let vecs = parse_embed_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![0.5, -1.0], vec![0.0, 2.0]]);
    }

    #[test]
    fn test_parse_typed_embeddings() {
        let json = serde_json::json!({"embeddings": {"float": [[1.0, 2.0]]}});
        let vecs = parse_embed_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_parse_missing_embeddings() {
        let json = serde_json::json!({"message": "invalid api token"});
        assert!(matches!(
            parse_embed_response(&json),
            Err(Error::Generation(_))
        ));
    }
}
