use anyhow::anyhow;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{Match, NAMESPACE_TOP_K, NotesService, RESULT_LIMIT, SearchResults};
use crate::database::ScoredVector;
use crate::{NotesError, Result};

impl NotesService {
    /// Search every namespace in the index and return the global top matches.
    ///
    /// The query is embedded once. A namespace whose query fails is logged and
    /// left out; only embedding and namespace discovery failures are errors.
    #[inline]
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let query = validate_query(query)?;
        let vector = self.embed_query(query).await?;

        let namespaces: Vec<String> = self.list_namespaces().await?.into_iter().collect();
        info!("Found {} namespaces: {:?}", namespaces.len(), namespaces);

        Ok(self.fan_out(&vector, &namespaces).await)
    }

    /// Search only `namespaces`, queried in the given order
    #[inline]
    pub async fn search_in(&self, query: &str, namespaces: &[String]) -> Result<SearchResults> {
        let query = validate_query(query)?;
        let vector = self.embed_query(query).await?;

        Ok(self.fan_out(&vector, namespaces).await)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        debug!("Embedding query ({} chars)", query.len());

        self.embedder
            .embed_one(query)
            .await
            .map_err(|e| NotesError::Embedding(format!("{e:#}")))
    }

    async fn fan_out(&self, vector: &[f32], namespaces: &[String]) -> SearchResults {
        let queries = namespaces.iter().map(|ns| self.query_namespace(ns, vector));
        let outcomes = join_all(queries).await;

        let mut candidates = Vec::new();
        let mut failed_namespaces = Vec::new();

        for (namespace, outcome) in namespaces.iter().zip(outcomes) {
            match outcome {
                Ok(scored) => {
                    debug!("{} count: {}", namespace, scored.len());
                    candidates.extend(
                        scored
                            .into_iter()
                            .map(|hit| Match::from_scored(namespace, hit))
                            .filter(|hit| hit.score.is_finite()),
                    );
                }
                Err(e) => {
                    warn!("Skipping namespace '{}': {:#}", namespace, e);
                    failed_namespaces.push(namespace.clone());
                }
            }
        }

        let matches = rank_matches(candidates, RESULT_LIMIT);

        info!(
            "Returning {} documents from {} namespaces ({} failed)",
            matches.len(),
            namespaces.len(),
            failed_namespaces.len()
        );

        SearchResults {
            matches,
            namespaces_queried: namespaces.len(),
            failed_namespaces,
        }
    }

    async fn query_namespace(
        &self,
        namespace: &str,
        vector: &[f32],
    ) -> anyhow::Result<Vec<ScoredVector>> {
        let query = self.store.query(namespace, vector, NAMESPACE_TOP_K, true);

        match self.namespace_timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| anyhow!("query timed out after {:?}", limit))?,
            None => query.await,
        }
    }
}

/// Sort by score, best first, and keep the first `limit`.
///
/// The sort is stable: equal scores keep their input order, which is
/// namespace query order and then the store's match order.
#[inline]
pub fn rank_matches(mut candidates: Vec<Match>, limit: usize) -> Vec<Match> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(limit);
    candidates
}

fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(NotesError::InvalidInput(
            "search query cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
