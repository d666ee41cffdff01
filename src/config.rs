use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// On-disk knowledge stores: the Q/A cache file plus the two document corpora.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub cache_file: PathBuf,
    pub training_dir: PathBuf,
    pub learned_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Minimum cosine similarity for a cached question to count as a hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// When set, only the N most recent entries are embedded per lookup.
    /// The cache file itself stays append-only regardless.
    #[serde(default)]
    pub max_embedded: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_embedded: None,
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `"openai"` or `"ollama"`. Selects both the chat and embedding backend.
    pub name: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Override the provider base URL (e.g. a local Ollama or a proxy).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            max_results: default_max_results(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_search_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}
fn default_max_results() -> usize {
    3
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
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
    "127.0.0.1:3000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    // Validate cache
    if !(0.0..=1.0).contains(&config.cache.similarity_threshold) {
        anyhow::bail!("cache.similarity_threshold must be in [0.0, 1.0]");
    }

    // Validate web search
    if config.web.max_results == 0 {
        anyhow::bail!("web.max_results must be >= 1");
    }

    match config.provider.name.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!("Unknown provider: '{}'. Must be openai or ollama.", other),
    }

    Ok(config)
}

/// Create the data directories and seed the cache file with an empty array.
///
/// Idempotent: existing directories and a populated cache file are left alone.
pub fn ensure_data_layout(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.data.training_dir)?;
    std::fs::create_dir_all(&config.data.learned_dir)?;

    if let Some(parent) = config.data.cache_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !config.data.cache_file.exists() {
        std::fs::write(&config.data.cache_file, "[]")?;
    }

    Ok(())
}
