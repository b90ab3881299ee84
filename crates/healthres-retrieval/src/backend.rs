use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use healthres_ann::AnnIndex;
use healthres_core::traits::{SearchBackend, VectorStore};
use healthres_core::types::{BackendKind, Corpus, IndexHandle, RankedMatch};
use healthres_core::{Error, Result};

/// Local ANN index joined with the in-memory corpus for metadata.
pub struct LocalBackend {
    index: Arc<AnnIndex>,
    corpus: Arc<Corpus>,
    min_neighbors: usize,
}

impl LocalBackend {
    pub fn new(index: Arc<AnnIndex>, corpus: Arc<Corpus>) -> Self { Self { index, corpus, min_neighbors: 2 } }

    /// Below this many raw neighbours the result is reported empty.
    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    pub fn index(&self) -> &AnnIndex { &self.index }
}

#[async_trait]
impl SearchBackend for LocalBackend {
    fn kind(&self) -> BackendKind { BackendKind::Local }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<RankedMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let neighbours = self.index.query(vector, k.max(self.min_neighbors))?;
        if neighbours.len() < self.min_neighbors {
            debug!(found = neighbours.len(), min = self.min_neighbors, "too few neighbours, returning none");
            return Ok(Vec::new());
        }
        let metric = self.index.metric();
        let mut matches = neighbours
            .into_iter()
            .map(|n| {
                let doc = self.corpus.get(n.id).ok_or_else(|| {
                    Error::index_mismatch("local index", format!("item {} is not in the loaded corpus", n.id))
                })?;
                Ok(RankedMatch {
                    document_id: doc.id,
                    score: metric.score_from_distance(n.distance),
                    metadata: doc.meta.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rank(&mut matches, k);
        Ok(matches)
    }
}

/// Named index in a vector store; metadata travels with each match.
pub struct RemoteBackend {
    store: Arc<dyn VectorStore>,
    index: IndexHandle,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn VectorStore>, index: IndexHandle) -> Self { Self { store, index } }

    pub fn index(&self) -> &IndexHandle { &self.index }
}

#[async_trait]
impl SearchBackend for RemoteBackend {
    fn kind(&self) -> BackendKind { BackendKind::Remote }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<RankedMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut matches = self.store.query(&self.index, vector, k).await?;
        rank(&mut matches, k);
        Ok(matches)
    }
}

/// Orders by descending score (ties by document id) and keeps at most `k`.
pub fn rank(matches: &mut Vec<RankedMatch>, k: usize) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.document_id.cmp(&b.document_id)));
    matches.truncate(k);
}
