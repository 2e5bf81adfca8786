// Configuration management module
// Layers the TOML config file, `.env`, process environment and CLI flags

pub mod settings;


pub use settings::{
    Config, ConfigError, ConfigOverrides, EmbeddingConfig, PineconeConfig, SearchConfig, TaskType,
};

use console::style;

/// Print the effective configuration with the API key masked
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Pinecone Settings:").bold().yellow());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(&config.pinecone.api_key)).cyan()
    );
    eprintln!("  Host: {}", style(&config.pinecone.host).cyan());
    eprintln!("  Index: {}", style(&config.pinecone.index).cyan());
    eprintln!("  Namespace: {}", style(&config.pinecone.namespace).cyan());
    eprintln!(
        "  API Version: {}",
        style(&config.pinecone.api_version).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Task Type: {}", style(config.embedding.task_type).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.embedding.embedding_dimension).cyan()
    );
    match config.embedding.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    match config.search.namespace_timeout_secs {
        Some(secs) => eprintln!("  Namespace Timeout: {}", style(format!("{secs}s")).cyan()),
        None => eprintln!("  Namespace Timeout: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

/// Where the configuration lives, for `config` without `--show`
#[inline]
pub fn config_hint(config: &Config) -> String {
    format!(
        "Config file: {}\nRun `notes-mcp config --show` to print the effective configuration.",
        config.config_file_path().display()
    )
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    if secret.chars().count() <= 8 {
        return "********".to_string();
    }
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{visible}")
}
