//! Configuration parsing and validation.
//!
//! Interview Coach is configured with a TOML file (default
//! `config/coach.toml`). Every section is optional; missing keys take the
//! defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/coach.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! candidate_k = 15
//! final_limit = 10
//! priority_limit = 10
//! other_limit = 5
//! # priority_terms = ["카카오", "Kakao", ...]
//!
//! [embedding]
//! provider = "hash"          # "hash" | "openai" | "disabled"
//! dims = 256
//!
//! [llm]
//! provider = "anthropic"     # "anthropic" | "openai" | "disabled"
//! model = "claude-3-5-sonnet-latest"
//!
//! [generation]
//! min_interval_secs = 4.0
//! max_retries = 3
//! base_delay_secs = 3.0
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```
//!
//! API keys are never read from the file; `llm.api_key_env` and
//! `embedding.api_key_env` name the environment variables that hold them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use interview_coach_core::retrieval::DEFAULT_PRIORITY_TERMS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Fully defaulted configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/coach.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates requested from the vector store before dedup.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_priority_limit")]
    pub priority_limit: usize,
    #[serde(default = "default_other_limit")]
    pub other_limit: usize,
    #[serde(default = "default_priority_terms")]
    pub priority_terms: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
            priority_limit: default_priority_limit(),
            other_limit: default_other_limit(),
            priority_terms: default_priority_terms(),
        }
    }
}

fn default_candidate_k() -> usize {
    15
}
fn default_final_limit() -> usize {
    10
}
fn default_priority_limit() -> usize {
    10
}
fn default_other_limit() -> usize {
    5
}
fn default_priority_terms() -> Vec<String> {
    DEFAULT_PRIORITY_TERMS.iter().map(|t| t.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: None,
            api_key_env: default_openai_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "ANTHROPIC_API_KEY",
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Minimum spacing between LLM calls for one session.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: f64,
    /// Total attempts per generation, counting the first.
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    /// Most recent messages rendered into the prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Messages retained per session. Must be even.
    #[serde(default = "default_memory_ceiling")]
    pub memory_ceiling: usize,
    /// Truncate each retrieved chunk to this many characters in the prompt.
    #[serde(default)]
    pub max_chunk_chars: Option<usize>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            max_retries: default_generation_retries(),
            base_delay_secs: default_base_delay(),
            history_turns: default_history_turns(),
            memory_ceiling: default_memory_ceiling(),
            max_chunk_chars: None,
            system_prompt: None,
        }
    }
}

fn default_min_interval() -> f64 {
    4.0
}
fn default_generation_retries() -> u32 {
    3
}
fn default_base_delay() -> f64 {
    3.0
}
fn default_history_turns() -> usize {
    10
}
fn default_memory_ceiling() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Reads, parses, and validates a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    let retrieval = &config.retrieval;
    if retrieval.final_limit == 0 {
        bail!("retrieval.final_limit must be >= 1");
    }
    if retrieval.candidate_k < retrieval.final_limit {
        bail!("retrieval.candidate_k must be >= retrieval.final_limit");
    }

    match config.embedding.provider.as_str() {
        "hash" | "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or disabled.",
            other
        ),
    }
    if config.embedding.provider == "hash" && config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    match config.llm.provider.as_str() {
        "anthropic" | "openai" | "disabled" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be anthropic, openai, or disabled.",
            other
        ),
    }

    let generation = &config.generation;
    if !(generation.min_interval_secs >= 0.0 && generation.min_interval_secs.is_finite()) {
        bail!("generation.min_interval_secs must be a non-negative number");
    }
    if !(generation.base_delay_secs >= 0.0 && generation.base_delay_secs.is_finite()) {
        bail!("generation.base_delay_secs must be a non-negative number");
    }
    if generation.max_retries == 0 {
        bail!("generation.max_retries must be >= 1");
    }
    if generation.memory_ceiling == 0 || generation.memory_ceiling % 2 != 0 {
        bail!("generation.memory_ceiling must be a positive even number");
    }
    if generation.max_chunk_chars == Some(0) {
        bail!("generation.max_chunk_chars must be > 0 when set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/coach.sqlite"));
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.candidate_k, 15);
        assert_eq!(config.retrieval.other_limit, 5);
        assert!(config.retrieval.priority_terms.iter().any(|t| t == "카카오"));
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.generation.min_interval_secs, 4.0);
        assert_eq!(config.generation.max_retries, 3);
        assert_eq!(config.generation.memory_ceiling, 20);
        assert_eq!(config.generation.history_turns, 10);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            [generation]
            max_retries = 5
            base_delay_secs = 5.0

            [retrieval]
            priority_terms = ["Acme"]
            "#,
        )
        .unwrap();
        assert_eq!(config.generation.max_retries, 5);
        assert_eq!(config.generation.base_delay_secs, 5.0);
        assert_eq!(config.generation.history_turns, 10);
        assert_eq!(config.retrieval.priority_terms, vec!["Acme".to_string()]);
        assert_eq!(config.retrieval.final_limit, 10);
    }

    #[test]
    fn test_rejects_bad_chunking() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_odd_memory_ceiling() {
        let err = parse_config("[generation]\nmemory_ceiling = 7\n").unwrap_err();
        assert!(err.to_string().contains("memory_ceiling"));
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        let err = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
        parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[llm]\nprovider = \"bedrock\"\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"tfidf\"\n").is_err());
    }

    #[test]
    fn test_key_env_defaults_per_provider() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.key_env(), "ANTHROPIC_API_KEY");
        llm.provider = "openai".into();
        assert_eq!(llm.key_env(), "OPENAI_API_KEY");
        llm.api_key_env = Some("MY_KEY".into());
        assert_eq!(llm.key_env(), "MY_KEY");
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/coach.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
