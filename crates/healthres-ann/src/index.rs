//! Approximate nearest-neighbour index over the corpus embeddings.
//!
//! Backed by a usearch HNSW graph. Items are keyed by their row position and a
//! built index is never mutated: a changed corpus means building a new one.

use std::fmt;

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use healthres_core::config::LocalIndexSettings;
use healthres_core::types::{DocumentId, EmbeddingMatrix, Metric};
use healthres_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnConfig {
    pub metric: Metric,
    /// Graph degree; higher improves recall at the cost of memory.
    pub connectivity: usize,
    /// Candidate list size while linking each item; higher improves recall and slows the build.
    pub expansion_add: usize,
    /// Candidate list size per query.
    pub expansion_search: usize,
}

impl Default for AnnConfig {
    fn default() -> Self { Self { metric: Metric::Angular, connectivity: 16, expansion_add: 100, expansion_search: 64 } }
}

impl AnnConfig {
    pub fn from_settings(settings: &LocalIndexSettings) -> Self {
        Self {
            metric: settings.metric,
            connectivity: settings.connectivity,
            expansion_add: settings.expansion_add,
            expansion_search: settings.expansion_search,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_expansion_add(mut self, expansion_add: usize) -> Self {
        self.expansion_add = expansion_add;
        self
    }

    pub(crate) fn options(&self, dim: usize) -> Result<IndexOptions> {
        if self.connectivity < 2 || self.expansion_add == 0 || self.expansion_search == 0 {
            return Err(Error::InvalidConfig(
                "connectivity must be at least 2 and both expansions at least 1".into(),
            ));
        }
        Ok(IndexOptions {
            dimensions: dim,
            metric: metric_kind(self.metric)?,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        })
    }
}

fn metric_kind(metric: Metric) -> Result<MetricKind> {
    match metric {
        Metric::Angular | Metric::Cosine => Ok(MetricKind::Cos),
        Metric::Euclidean => Ok(MetricKind::L2sq),
        Metric::DotProduct => {
            Err(Error::InvalidConfig("the local index supports angular, cosine or euclidean metrics".into()))
        }
    }
}

/// Maps a raw usearch distance onto the convention of `metric`.
fn to_metric_distance(metric: Metric, raw: f32) -> f32 {
    match metric {
        // cosine distance d = 1 - cos, angular = sqrt(2 - 2cos)
        Metric::Angular => (2.0 * raw).max(0.0).sqrt(),
        Metric::Euclidean => raw.max(0.0).sqrt(),
        Metric::Cosine | Metric::DotProduct => raw,
    }
}

pub(crate) fn index_err<E: fmt::Display>(context: &str) -> impl Fn(E) -> Error + '_ {
    move |e| Error::InvalidConfig(format!("{context}: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: DocumentId,
    pub distance: f32,
}

pub struct AnnIndex {
    pub(crate) index: Index,
    pub(crate) config: AnnConfig,
    pub(crate) dim: usize,
}

impl fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnIndex").field("dim", &self.dim).field("len", &self.len()).field("config", &self.config).finish()
    }
}

impl AnnIndex {
    /// Builds an index keyed by row position. An empty matrix yields an empty index.
    pub fn build(vectors: &EmbeddingMatrix, config: &AnnConfig) -> Result<Self> {
        Self::build_rows(vectors.dim(), vectors.rows(), config)
    }

    pub fn build_rows(dim: usize, rows: &[Vec<f32>], config: &AnnConfig) -> Result<Self> {
        let options = config.options(dim)?;
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(Error::index_mismatch(
                "local index",
                format!("vector {i} has dimension {} but the index expects {dim}", row.len()),
            ));
        }
        let index = Index::new(&options).map_err(index_err("failed to create local index"))?;
        if rows.is_empty() {
            debug!(dim, "built empty local index");
            return Ok(Self { index, config: *config, dim });
        }
        index.reserve(rows.len()).map_err(index_err("failed to reserve local index"))?;
        for (key, row) in (0u64..).zip(rows) {
            index.add(key, row.as_slice()).map_err(index_err("failed to add to local index"))?;
        }
        info!(items = rows.len(), dim, metric = %config.metric, connectivity = config.connectivity, "built local index");
        Ok(Self { index, config: *config, dim })
    }

    pub(crate) fn empty(dim: usize, config: &AnnConfig) -> Result<Self> {
        let index = Index::new(&config.options(dim)?).map_err(index_err("failed to create local index"))?;
        Ok(Self { index, config: *config, dim })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn metric(&self) -> Metric { self.config.metric }

    pub fn config(&self) -> &AnnConfig { &self.config }

    pub fn len(&self) -> usize { self.index.size() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Nearest `k` items, closest first. Fewer come back when the index holds fewer.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dim {
            return Err(Error::index_mismatch(
                "local index",
                format!("query has dimension {} but the index expects {}", vector.len(), self.dim),
            ));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.index.search(vector, k).map_err(index_err("local index query failed"))?;
        let metric = self.metric();
        let mut neighbours: Vec<Neighbor> = matches
            .keys
            .iter()
            .zip(&matches.distances)
            .filter_map(|(&key, &raw)| {
                usize::try_from(key).ok().map(|id| Neighbor { id, distance: to_metric_distance(metric, raw) })
            })
            .collect();
        neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        neighbours.truncate(k);
        Ok(neighbours)
    }
}
