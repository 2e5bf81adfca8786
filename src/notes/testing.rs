//! In-memory stand-ins for the embedder and the vector store

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{IndexStats, Metadata, NamespaceStats, ScoredVector, VectorRecord, VectorStore};
use crate::embeddings::Embedder;

pub(crate) struct FakeEmbedder {
    vector: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl FakeEmbedder {
    pub(crate) fn returning(vector: Vec<f32>) -> Self {
        Self {
            vector,
            fail: false,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(Vec::new())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inputs(&self) -> Vec<String> {
        self.inputs.lock().expect("inputs lock").clone()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .expect("inputs lock")
            .extend(texts.iter().cloned());

        if self.fail {
            return Err(anyhow!("model unavailable"));
        }
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    preset: BTreeMap<String, Vec<ScoredVector>>,
    failing: BTreeSet<String>,
    hanging: BTreeSet<String>,
    stats_unavailable: bool,
    upsert_fails: bool,
    records: Mutex<BTreeMap<String, Vec<VectorRecord>>>,
    queries: Mutex<Vec<String>>,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_matches(mut self, namespace: &str, matches: Vec<ScoredVector>) -> Self {
        self.preset.insert(namespace.to_string(), matches);
        self
    }

    pub(crate) fn with_failing(mut self, namespace: &str) -> Self {
        self.failing.insert(namespace.to_string());
        self
    }

    pub(crate) fn with_hanging(mut self, namespace: &str) -> Self {
        self.hanging.insert(namespace.to_string());
        self
    }

    pub(crate) fn stats_unavailable(mut self) -> Self {
        self.stats_unavailable = true;
        self
    }

    pub(crate) fn failing_upserts(mut self) -> Self {
        self.upsert_fails = true;
        self
    }

    pub(crate) fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        self.records
            .lock()
            .expect("records lock")
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn queried(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<u64> {
        if self.upsert_fails {
            return Err(anyhow!("write rejected"));
        }
        let count = records.len() as u64;
        self.records
            .lock()
            .expect("records lock")
            .entry(namespace.to_string())
            .or_default()
            .extend(records);
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(namespace.to_string());

        if self.failing.contains(namespace) {
            return Err(anyhow!("namespace {namespace} unreachable"));
        }
        if self.hanging.contains(namespace) {
            std::future::pending::<()>().await;
        }

        let mut matches = match self.preset.get(namespace) {
            Some(preset) => preset.clone(),
            None => self.similar_records(namespace, vector),
        };
        matches.truncate(top_k);
        if !include_metadata {
            for hit in &mut matches {
                hit.metadata = None;
            }
        }
        Ok(matches)
    }

    async fn describe_index_stats(&self) -> Result<IndexStats> {
        if self.stats_unavailable {
            return Err(anyhow!("index unreachable"));
        }

        let records = self.records.lock().expect("records lock");
        let names = self
            .preset
            .keys()
            .chain(self.failing.iter())
            .chain(self.hanging.iter())
            .chain(records.keys());

        Ok(IndexStats {
            namespaces: names
                .map(|name| (name.clone(), NamespaceStats::default()))
                .collect(),
            dimension: None,
            total_vector_count: 0,
        })
    }
}

impl FakeStore {
    fn similar_records(&self, namespace: &str, vector: &[f32]) -> Vec<ScoredVector> {
        let mut hits: Vec<ScoredVector> = self
            .records(namespace)
            .into_iter()
            .map(|record| ScoredVector {
                score: Some(cosine(&record.values, vector)),
                id: record.id,
                metadata: Some(record.metadata),
            })
            .collect();
        hits.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
        hits
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// A store match with the given score and metadata object
pub(crate) fn scored(id: &str, score: Option<f32>, metadata: Value) -> ScoredVector {
    let metadata: Option<Metadata> = match metadata {
        Value::Object(map) => Some(map),
        _ => None,
    };
    ScoredVector {
        id: id.to_string(),
        score,
        metadata,
    }
}
