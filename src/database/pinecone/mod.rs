
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{IndexStats, ScoredVector, VectorRecord, VectorStore};
use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Pinecone data-plane client bound to a single index host
#[derive(Debug, Clone)]
pub struct PineconeClient {
    base_url: Url,
    api_key: String,
    api_version: String,
    index: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

#[derive(Debug, Serialize)]
struct DescribeIndexStatsRequest {}

impl PineconeClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        config
            .pinecone
            .validate()
            .context("Invalid Pinecone configuration")?;

        let base_url = config.pinecone.host_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config.pinecone.api_key.clone(),
            api_version: config.pinecone.api_version.clone(),
            index: config.pinecone.index.clone(),
            agent,
        })
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index
    }

    #[inline]
    pub fn upsert_blocking(&self, namespace: &str, records: &[VectorRecord]) -> Result<u64> {
        debug!(
            "Upserting {} vector(s) into namespace '{}'",
            records.len(),
            namespace
        );

        let response: UpsertResponse = self.post_json(
            "vectors/upsert",
            &UpsertRequest {
                vectors: records,
                namespace,
            },
        )?;

        Ok(response.upserted_count)
    }

    #[inline]
    pub fn query_blocking(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>> {
        debug!("Querying namespace '{}' with top_k {}", namespace, top_k);

        let response: QueryResponse = self.post_json(
            "query",
            &QueryRequest {
                namespace,
                vector,
                top_k,
                include_metadata,
                include_values: false,
            },
        )?;

        debug!(
            "Namespace '{}' returned {} match(es)",
            namespace,
            response.matches.len()
        );
        Ok(response.matches)
    }

    #[inline]
    pub fn describe_index_stats_blocking(&self) -> Result<IndexStats> {
        self.post_json("describe_index_stats", &DescribeIndexStatsRequest {})
    }

    fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build URL for {endpoint}"))?;

        let request_json = serde_json::to_string(body)
            .with_context(|| format!("Failed to serialize {endpoint} request"))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Api-Key", self.api_key.as_str())
            .header("X-Pinecone-API-Version", self.api_version.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|error| match error {
                ureq::Error::StatusCode(status) => {
                    anyhow!("Pinecone returned HTTP {} for {}", status, endpoint)
                }
                other => anyhow!("Pinecone request to {} failed: {}", endpoint, other),
            })?;

        serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse {endpoint} response"))
    }
}

#[async_trait]
impl VectorStore for PineconeClient {
    #[inline]
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<u64> {
        let client = self.clone();
        let namespace = namespace.to_string();

        tokio::task::spawn_blocking(move || client.upsert_blocking(&namespace, &records))
            .await
            .context("Upsert task did not complete")?
    }

    #[inline]
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>> {
        let client = self.clone();
        let namespace = namespace.to_string();
        let vector = vector.to_vec();

        tokio::task::spawn_blocking(move || {
            client.query_blocking(&namespace, &vector, top_k, include_metadata)
        })
        .await
        .context("Query task did not complete")?
    }

    #[inline]
    async fn describe_index_stats(&self) -> Result<IndexStats> {
        let client = self.clone();

        tokio::task::spawn_blocking(move || client.describe_index_stats_blocking())
            .await
            .context("Index stats task did not complete")?
    }
}
