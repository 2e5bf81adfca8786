//! Note ingestion and cross-namespace search
//!
//! `NotesService` is built once at startup and shared by the MCP tools and the
//! CLI. It owns no mutable state: every call goes to the embedder and the
//! vector store.

#[cfg(test)]
pub(crate) mod testing;

mod ingest;
mod search;

pub use search::rank_matches;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::database::{Metadata, PineconeClient, ScoredVector, VectorRecord, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::{NotesError, Result};

/// Size of the merged result set
pub const RESULT_LIMIT: usize = 3;
/// Matches requested from each namespace
pub const NAMESPACE_TOP_K: usize = 3;
/// Content shown for matches whose metadata carries no text
pub const NO_CONTENT_PLACEHOLDER: &str = "No content available";

const TEXT_KEY: &str = "text";
const TITLE_KEY: &str = "title";
const NOTION_ID_KEY: &str = "notion_id";
const DATE_ADDED_KEY: &str = "date_added";

/// Where a note originated, derived from its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "notion")]
    Notion,
    #[serde(rename = "aichat")]
    AiChat,
}

impl Source {
    /// Notion imports carry a `notion_id`; everything else came from chat
    #[inline]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        if metadata.contains_key(NOTION_ID_KEY) {
            Self::Notion
        } else {
            Self::AiChat
        }
    }
}

impl fmt::Display for Source {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notion => f.write_str("notion"),
            Self::AiChat => f.write_str("aichat"),
        }
    }
}

/// A search hit, validated from the store's loosely typed metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub content: String,
    pub score: f32,
    pub source: Source,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Match {
    #[inline]
    pub fn from_scored(namespace: &str, scored: ScoredVector) -> Self {
        let metadata = scored.metadata.unwrap_or_default();

        let content = metadata
            .get(TEXT_KEY)
            .and_then(Value::as_str)
            .map_or_else(|| NO_CONTENT_PLACEHOLDER.to_string(), str::to_string);

        let title = metadata
            .get(TITLE_KEY)
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .map(str::to_string);

        Self {
            content,
            score: scored.score.unwrap_or(1.0),
            source: Source::from_metadata(&metadata),
            namespace: namespace.to_string(),
            title,
        }
    }
}

/// Outcome of a cross-namespace search
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Best matches, score descending, at most `RESULT_LIMIT`
    pub matches: Vec<Match>,
    pub namespaces_queried: usize,
    /// Namespaces whose query failed or timed out; excluded from `matches`
    pub failed_namespaces: Vec<String>,
}

impl SearchResults {
    #[inline]
    pub fn is_partial(&self) -> bool {
        !self.failed_namespaces.is_empty()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// A note as written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

impl Note {
    /// Fresh note with a new UUID, stamped now
    #[inline]
    pub fn new(text: &str, namespace: &str, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            namespace: namespace.to_string(),
            created_at: Utc::now(),
            embedding,
        }
    }

    #[inline]
    pub fn date_added(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    #[inline]
    pub fn receipt(&self) -> NoteReceipt {
        NoteReceipt {
            id: self.id.clone(),
            namespace: self.namespace.clone(),
            date_added: self.date_added(),
        }
    }

    #[inline]
    pub fn into_record(self) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert(DATE_ADDED_KEY.to_string(), Value::String(self.date_added()));
        metadata.insert(TEXT_KEY.to_string(), Value::String(self.text));

        VectorRecord {
            id: self.id,
            values: self.embedding,
            metadata,
        }
    }
}

/// Confirmation of a stored note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteReceipt {
    pub id: String,
    pub namespace: String,
    pub date_added: String,
}

#[derive(Clone)]
pub struct NotesService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    namespace: String,
    namespace_timeout: Option<Duration>,
}

impl fmt::Debug for NotesService {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotesService")
            .field("namespace", &self.namespace)
            .field("namespace_timeout", &self.namespace_timeout)
            .finish_non_exhaustive()
    }
}

impl NotesService {
    /// `namespace` is the ingestion target; search covers every namespace
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            namespace: namespace.into(),
            namespace_timeout: None,
        }
    }

    /// Connect the Ollama embedder and the Pinecone index described by `config`
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = OllamaClient::new(config)
            .map_err(|e| NotesError::Config(format!("{e:#}")))?;
        let store =
            PineconeClient::new(config).map_err(|e| NotesError::Config(format!("{e:#}")))?;

        debug!(
            "Notes service using index '{}', ingestion namespace '{}'",
            store.index_name(),
            config.pinecone.namespace
        );

        Ok(
            Self::new(Arc::new(embedder), Arc::new(store), &config.pinecone.namespace)
                .with_namespace_timeout(config.search.namespace_timeout()),
        )
    }

    #[inline]
    pub fn with_namespace_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.namespace_timeout = timeout;
        self
    }

    /// Ingestion target namespace
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every namespace currently holding vectors; empty for a fresh index
    #[inline]
    pub async fn list_namespaces(&self) -> Result<BTreeSet<String>> {
        let stats = self
            .store
            .describe_index_stats()
            .await
            .map_err(|e| NotesError::StoreUnavailable(format!("{e:#}")))?;

        Ok(stats.namespaces.into_keys().collect())
    }
}
