//! Shared HTTP plumbing for the upstream providers.
//!
//! Retry strategy (same for embedding and generation services):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use docchat_core::{Error, Result};
use reqwest::{Client, Response};
use tracing::{debug, warn};

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(Error::generation)
}

/// POST `body` as JSON, retrying transient failures, and return the first
/// successful response.
pub(crate) async fn post_json(
    client: &Client,
    service: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<Response> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::Generation(format!("{} API error {}: {}", service, status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, "transient API error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                warn!(service, error = %e, "request failed");
                last_err = Some(Error::Generation(format!("{} request failed: {}", service, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| Error::Generation(format!("{} request failed after retries", service))))
}
