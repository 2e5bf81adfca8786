use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.pinecone.namespace, "mcp");
    assert_eq!(config.pinecone.index, "notes");
    assert!(config.pinecone.api_key.is_empty());
    assert_eq!(config.embedding.protocol, "http");
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.task_type, TaskType::SearchDocument);
    assert_eq!(config.embedding.embedding_dimension, 768);
    assert_eq!(config.embedding.retry_attempts, 1);
    assert_eq!(config.search.namespace_timeout_secs, None);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.embedding.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.embedding_dimension = 32;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.retry_attempts = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.namespace_timeout_secs = Some(0);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.pinecone.namespace = String::new();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidNamespace(_))
    ));
}

#[test]
fn pinecone_validation_requires_credentials() {
    let mut pinecone = PineconeConfig::default();
    assert!(matches!(
        pinecone.validate(),
        Err(ConfigError::MissingApiKey)
    ));

    pinecone.api_key = "pc-test".to_string();
    assert!(matches!(pinecone.validate(), Err(ConfigError::MissingHost)));

    pinecone.host = "notes-abc123.svc.pinecone.io".to_string();
    assert!(pinecone.validate().is_ok());
}

#[test]
fn host_url_defaults_to_https() {
    let pinecone = PineconeConfig {
        host: "notes-abc123.svc.pinecone.io".to_string(),
        ..PineconeConfig::default()
    };
    let url = pinecone.host_url().expect("host url is valid");
    assert_eq!(url.as_str(), "https://notes-abc123.svc.pinecone.io/");

    let pinecone = PineconeConfig {
        host: "http://127.0.0.1:5080/".to_string(),
        ..PineconeConfig::default()
    };
    let url = pinecone.host_url().expect("host url is valid");
    assert_eq!(url.as_str(), "http://127.0.0.1:5080/");
    let pinecone = PineconeConfig {
        host: "http://gateway.local/pinecone".to_string(),
        ..PineconeConfig::default()
    };
    let url = pinecone.host_url().expect("host url is valid");
    assert_eq!(url.as_str(), "http://gateway.local/pinecone/");
    assert_eq!(
        url.join("query").expect("joins").as_str(),
        "http://gateway.local/pinecone/query"
    );
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial = r#"
        [pinecone]
        namespace = "aichat"

        [embedding]
        task_type = "search_query"
    "#;

    let config: Config = toml::from_str(partial).expect("partial config parses");
    assert_eq!(config.pinecone.namespace, "aichat");
    assert_eq!(config.pinecone.index, "notes");
    assert_eq!(config.embedding.task_type, TaskType::SearchQuery);
    assert_eq!(config.embedding.port, 11434);
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("load succeeds without a file");

    assert_eq!(config.pinecone, PineconeConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[embedding]\nprotocol = \"ftp\"\n",
    )
    .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn env_overrides_file_values() {
    let mut config = Config::default();
    config.pinecone.host = "from-file.pinecone.io".to_string();

    config.apply_env(env_from(&[
        ("PINECONE_API_KEY", "env-key"),
        ("PINECONE_HOST", "from-env.pinecone.io"),
        ("PINECONE_NAMESPACE", "default"),
    ]));

    assert_eq!(config.pinecone.api_key, "env-key");
    assert_eq!(config.pinecone.host, "from-env.pinecone.io");
    assert_eq!(config.pinecone.namespace, "default");
    assert_eq!(config.pinecone.index, "notes");
}

#[test]
fn empty_env_values_are_ignored() {
    let mut config = Config::default();
    config.apply_env(env_from(&[("PINECONE_NAMESPACE", "  ")]));
    assert_eq!(config.pinecone.namespace, "mcp");
}

#[test]
fn cli_overrides_win_over_env() {
    let mut config = Config::default();
    config.apply_env(env_from(&[
        ("PINECONE_API_KEY", "env-key"),
        ("PINECONE_INDEX", "env-index"),
    ]));
    config.apply_overrides(&ConfigOverrides {
        api_key: Some("cli-key".to_string()),
        namespace: Some("aichat".to_string()),
        ..ConfigOverrides::default()
    });

    assert_eq!(config.pinecone.api_key, "cli-key");
    assert_eq!(config.pinecone.index, "env-index");
    assert_eq!(config.pinecone.namespace, "aichat");
}

#[test]
fn task_type_prefix() {
    assert_eq!(
        TaskType::SearchDocument.apply_prefix("hello"),
        "search_document: hello"
    );
    assert_eq!(TaskType::SearchQuery.to_string(), "search_query");
}

#[test]
fn namespace_timeout_conversion() {
    let search = SearchConfig {
        namespace_timeout_secs: Some(5),
    };
    assert_eq!(
        search.namespace_timeout(),
        Some(std::time::Duration::from_secs(5))
    );
    assert_eq!(SearchConfig::default().namespace_timeout(), None);
}
