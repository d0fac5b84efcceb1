//! TOML configuration parsing and validation.
//!
//! All file locations, chunking and retrieval parameters, and provider
//! settings come from one TOML file. [`load_config`] parses it, checks
//! every value, and resolves provider credentials from the environment
//! (after loading an optional `.env`), so no component is built from a
//! half-valid configuration.
//!
//! ```toml
//! [paths]
//! manifest = "data/files.json"
//! chat_histories = "data/chats"
//! registry = "data/chat_paths.json"
//! index = "data/index"
//!
//! [prompts]
//! rewrite = "prompts/contextualize.txt"
//! answer = "prompts/answer.txt"
//!
//! [chunking]
//! separator = "\n"
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "cohere"
//! ```

use anyhow::{bail, Context, Result};
use docchat_core::generation::PromptTemplate;
use docchat_core::Error;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::persist;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Resolved from the environment by [`load_config`].
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Document name → chunk ids manifest (JSON object).
    pub manifest: PathBuf,
    /// Directory holding one `<chat>_history.json` per session.
    pub chat_histories: PathBuf,
    /// Session id → history path registry (JSON array).
    pub registry: PathBuf,
    /// Directory for the vector index snapshot.
    pub index: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptsConfig {
    /// Instructions for rewriting a follow-up into a standalone query.
    pub rewrite: PathBuf,
    /// Instructions for answering; must contain `{context}`.
    pub answer: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_separator() -> String {
    "\n".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `cohere` or `hashing`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector size for the `hashing` provider.
    #[serde(default = "default_hashing_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_hashing_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_embedding_key_env(),
        }
    }
}

impl EmbeddingConfig {
    pub fn needs_credential(&self) -> bool {
        self.provider == "cohere"
    }
}

fn default_embedding_provider() -> String {
    "cohere".to_string()
}
fn default_embedding_model() -> String {
    "embed-english-light-v3.0".to_string()
}
fn default_hashing_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    96
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_embedding_key_env() -> String {
    "COHERE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            temperature: 0.0,
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            api_key_env: default_generation_key_env(),
        }
    }
}

fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_generation_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

/// Provider API keys as found in the environment. Empty values count as absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub embedding: Option<String>,
    pub generation: Option<String>,
}

/// Both keys, present and non-empty.
#[derive(Debug, Clone)]
pub struct ChatCredentials {
    /// `None` when the embedding provider needs no key.
    pub embedding: Option<String>,
    pub generation: String,
}

impl Config {
    /// Keys required before chat is enabled.
    ///
    /// Fails with [`Error::MissingCredential`] naming every absent variable.
    pub fn chat_credentials(&self) -> std::result::Result<ChatCredentials, Error> {
        let mut missing = Vec::new();
        if self.embedding.needs_credential() && self.credentials.embedding.is_none() {
            missing.push(self.embedding.api_key_env.clone());
        }
        if self.credentials.generation.is_none() {
            missing.push(self.generation.api_key_env.clone());
        }
        match (&self.credentials.generation, missing.is_empty()) {
            (Some(generation), true) => Ok(ChatCredentials {
                embedding: self.credentials.embedding.clone(),
                generation: generation.clone(),
            }),
            _ => Err(Error::MissingCredential(missing)),
        }
    }

    /// Key for the embedding provider alone (document ingestion).
    pub fn embedding_credential(&self) -> std::result::Result<Option<String>, Error> {
        if !self.embedding.needs_credential() {
            return Ok(None);
        }
        self.credentials
            .embedding
            .clone()
            .map(Some)
            .ok_or_else(|| Error::MissingCredential(vec![self.embedding.api_key_env.clone()]))
    }

    pub fn rewrite_template(&self) -> Result<PromptTemplate> {
        let text = read_prompt(&self.prompts.rewrite)?;
        Ok(PromptTemplate::new(text))
    }

    pub fn answer_template(&self) -> Result<PromptTemplate> {
        let text = read_prompt(&self.prompts.answer)?;
        Ok(PromptTemplate::with_context_slot(text)?)
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file: {}", path.display()))
}

/// Read a credential from the environment, treating empty values as absent.
pub fn env_credential(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Insert or replace `var=value` in a dotenv file, keeping other lines.
///
/// The value is written single-quoted, so it may not contain a single
/// quote or a line break. The file is replaced atomically.
pub async fn set_env_key(env_path: &Path, var: &str, value: &str) -> Result<()> {
    if value.contains(&['\'', '\n', '\r'][..]) {
        bail!("{} must not contain single quotes or line breaks", var);
    }
    let existing = match tokio::fs::read_to_string(env_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", env_path.display()))
        }
    };

    let entry = format!("{}='{}'", var, value);
    let prefix = format!("{}=", var);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if line.trim_start().starts_with(&prefix) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    persist::write_atomic(env_path, out.as_bytes()).await?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    // Prompt files are read once here so a typo fails at startup, not mid-chat.
    config.rewrite_template()?;
    config.answer_template()?;

    // A missing .env is fine; real environment variables win.
    let _ = dotenvy::dotenv();
    config.credentials = Credentials {
        embedding: env_credential(&config.embedding.api_key_env),
        generation: env_credential(&config.generation.api_key_env),
    };

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "cohere" => {}
        "hashing" => {
            if config.embedding.dims == 0 {
                bail!("embedding.dims must be > 0 when provider is 'hashing'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be cohere or hashing.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
