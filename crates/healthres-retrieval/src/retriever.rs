use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use healthres_core::traits::{Embedder, SearchBackend};
use healthres_core::types::{BackendKind, RankedMatch, Truncate};
use healthres_core::{Error, Result};

use crate::backend::rank;

/// Per-query pipeline: embed once, search the selected backend, normalize.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    backends: HashMap<BackendKind, Arc<dyn SearchBackend>>,
    truncate: Truncate,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("truncate", &self.truncate)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, backends: HashMap::new(), truncate: Truncate::default() }
    }

    /// Registers a backend under its own kind, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Truncation mode used when a call does not pass its own.
    pub fn with_truncate(mut self, truncate: Truncate) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn has_backend(&self, kind: BackendKind) -> bool { self.backends.contains_key(&kind) }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub async fn search(&self, query: &str, backend: BackendKind, k: usize) -> Result<Vec<RankedMatch>> {
        self.search_with(query, backend, k, self.truncate).await
    }

    /// Returns at most `k` matches, best first. An empty vector means no results.
    pub async fn search_with(
        &self,
        query: &str,
        backend: BackendKind,
        k: usize,
        truncate: Truncate,
    ) -> Result<Vec<RankedMatch>> {
        let target = self
            .backends
            .get(&backend)
            .ok_or_else(|| Error::InvalidConfig(format!("the {backend} backend is not available")))?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let vector = self.embedder.embed_one(query, truncate).await?;
        let mut matches = target.search(&vector, k).await?;
        rank(&mut matches, k);
        debug!(backend = %backend, k, hits = matches.len(), elapsed_ms = start.elapsed().as_millis(), "retrieval");
        Ok(matches)
    }
}
