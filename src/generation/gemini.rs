use async_trait::async_trait;
use docchat_core::generation::{FragmentStream, Generator, Prompt};
use docchat_core::models::Role;
use docchat_core::{Error, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sse::SseDecoder;
use crate::config::GenerationConfig;
use crate::http;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Every harm category Gemini accepts a threshold for.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
];

/// Generator backed by the Google Gemini `generateContent` API.
///
/// [`rewrite`](Generator::rewrite) uses the unary endpoint;
/// [`generate`](Generator::generate) uses `streamGenerateContent` with
/// server-sent events and yields each candidate text part as it arrives.
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn post(&self, method: &str, prompt: &Prompt) -> Result<reqwest::Response> {
        let url = format!("{}/{}:{}", GEMINI_BASE_URL, self.model, method);
        let body = serde_json::to_value(build_request(prompt, self.temperature))
            .map_err(Error::generation)?;
        http::post_json(
            &self.client,
            "Gemini",
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
            self.max_retries,
        )
        .await
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn rewrite(&self, prompt: &Prompt) -> Result<String> {
        let response = self.post("generateContent", prompt).await?;
        let parsed: GenerateResponse = response.json().await.map_err(Error::generation)?;
        Ok(parsed.text()?.trim().to_string())
    }

    async fn generate(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let response = self.post("streamGenerateContent?alt=sse", prompt).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(Error::Generation(format!("Gemini stream error: {}", e)));
                        return;
                    }
                };
                for data in decoder.push(&chunk) {
                    match parse_event(&data) {
                        Ok(text) if text.is_empty() => {}
                        Ok(text) => yield Ok(text),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                match parse_event(&data) {
                    Ok(text) if text.is_empty() => {}
                    other => yield other,
                }
            }
            debug!("generation stream finished");
        };

        Ok(Box::pin(stream))
    }
}

fn parse_event(data: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| Error::Generation(format!("invalid Gemini stream event: {}", e)))?;
    parsed.text()
}

// ============ Wire types ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationParams,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Result<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(Error::Generation(format!("prompt blocked: {}", reason)));
        }
        Ok(self
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: Some(role.to_string()),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

fn build_request(prompt: &Prompt, temperature: f32) -> GenerateRequest {
    let mut contents: Vec<Content> = prompt
        .history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            text_content(role, &m.content)
        })
        .collect();
    contents.push(text_content("user", &prompt.input));

    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: Some(prompt.system.clone()),
            }],
        },
        contents,
        generation_config: GenerationParams { temperature },
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}
