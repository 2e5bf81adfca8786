#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

pub const ENV_API_KEY: &str = "PINECONE_API_KEY";
pub const ENV_HOST: &str = "PINECONE_HOST";
pub const ENV_INDEX: &str = "PINECONE_INDEX";
pub const ENV_NAMESPACE: &str = "PINECONE_NAMESPACE";

pub const DEFAULT_NAMESPACE: &str = "mcp";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Index host, e.g. `notes-abc123.svc.us-east-1.pinecone.io`
    pub host: String,
    pub index: String,
    /// Target namespace for note ingestion
    pub namespace: String,
    pub api_version: String,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: String::new(),
            index: "notes".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_version: "2025-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub task_type: TaskType,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:v1.5".to_string(),
            task_type: TaskType::SearchDocument,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
            retry_attempts: 1,
        }
    }
}

/// Nomic task type, sent to the model as a text prefix
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    SearchDocument,
    SearchQuery,
    Clustering,
    Classification,
}

impl TaskType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchDocument => "search_document",
            Self::SearchQuery => "search_query",
            Self::Clustering => "clustering",
            Self::Classification => "classification",
        }
    }

    #[inline]
    pub fn apply_prefix(self, text: &str) -> String {
        format!("{}: {}", self.as_str(), text)
    }
}

impl fmt::Display for TaskType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-namespace query deadline; an expired namespace counts as failed
    pub namespace_timeout_secs: Option<u64>,
}

/// Values supplied on the command line, highest precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub index: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Missing Pinecone API key (set PINECONE_API_KEY or --pinecone-api-key)")]
    MissingApiKey,
    #[error("Missing Pinecone host (set PINECONE_HOST or --pinecone-host)")]
    MissingHost,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid namespace: {0:?} (cannot be empty)")]
    InvalidNamespace(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".notes-mcp"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when absent
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.validate()?;

        Ok(config)
    }

    /// Build the effective configuration from `~/.notes-mcp/config.toml` and
    /// a `.env` file in the working directory
    #[inline]
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let config_dir = Self::config_dir()?;
        let env_file = std::env::current_dir().ok().map(|dir| dir.join(".env"));
        Self::resolve_from(&config_dir, env_file.as_deref(), overrides)
    }

    /// Layer the sources, lowest precedence first: defaults, the config
    /// file, `env_file`, the process environment, then `overrides`.
    ///
    /// Values from `env_file` are exported into the process environment
    /// unless the variable is already set, so the environment wins.
    #[inline]
    pub fn resolve_from(
        config_dir: &Path,
        env_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        if let Some(path) = env_file.filter(|path| path.exists()) {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
        }

        let mut config = Self::load(config_dir).with_context(|| {
            format!("Failed to load config from {}", config_dir.display())
        })?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);

        config
            .validate()
            .context("Effective configuration is invalid")?;

        Ok(config)
    }

    /// Apply environment values; empty values are ignored
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 4] = [
            (ENV_API_KEY, &mut self.pinecone.api_key),
            (ENV_HOST, &mut self.pinecone.host),
            (ENV_INDEX, &mut self.pinecone.index),
            (ENV_NAMESPACE, &mut self.pinecone.namespace),
        ];

        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        }
    }

    #[inline]
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let fields = [
            (&overrides.api_key, &mut self.pinecone.api_key),
            (&overrides.host, &mut self.pinecone.host),
            (&overrides.index, &mut self.pinecone.index),
            (&overrides.namespace, &mut self.pinecone.namespace),
        ];

        for (value, field) in fields {
            if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                field.clone_from(value);
            }
        }
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate everything that can be checked without the remote credentials.
    /// Pinecone connection settings are checked when a client is created.
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.search.validate()?;

        if self.pinecone.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace(self.pinecone.namespace.clone()));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.embedding.ollama_url()
    }
}

impl PineconeConfig {
    /// Check the settings required to reach the index
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }

        self.host_url()?;

        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }

        Ok(())
    }

    /// Index host as a base URL ending in `/`, so endpoints resolve below any
    /// path prefix. Hosts given without a scheme are reached over https.
    #[inline]
    pub fn host_url(&self) -> Result<Url, ConfigError> {
        let host = self.host.trim().trim_end_matches('/');
        let url_str = if host.contains("://") {
            format!("{host}/")
        } else {
            format!("https://{host}/")
        };

        let url = Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str.clone()))?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(url_str));
        }

        Ok(url)
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.ollama_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=300).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl SearchConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.namespace_timeout_secs {
            Some(secs) if !(1..=300).contains(&secs) => Err(ConfigError::InvalidTimeout(secs)),
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn namespace_timeout(&self) -> Option<std::time::Duration> {
        self.namespace_timeout_secs
            .map(std::time::Duration::from_secs)
    }
}
