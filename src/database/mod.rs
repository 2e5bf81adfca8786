// Vector store module
// The `VectorStore` seam and its Pinecone data-plane implementation


pub mod pinecone;

pub use pinecone::PineconeClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form metadata stored next to a vector
pub type Metadata = serde_json::Map<String, Value>;

/// A record written to the index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// A scored match from a similarity query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoredVector {
    pub id: String,
    /// Absent when the store does not report a score
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Index-wide statistics; the namespace map is the namespace listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceStats>,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub total_vector_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    #[serde(default)]
    pub vector_count: u64,
}

/// Remote store of (id, vector, metadata) triples partitioned into namespaces
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace `records` in `namespace`, returning the upserted count
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<u64>;

    /// Top-`top_k` matches for `vector` within `namespace`, best first
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>>;

    async fn describe_index_stats(&self) -> Result<IndexStats>;
}
