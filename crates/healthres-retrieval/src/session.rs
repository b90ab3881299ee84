//! Construct-once lifecycle for the corpus, its embeddings and both indexes.
//!
//! Each step lives in a `tokio::sync::OnceCell`: the first caller performs it,
//! concurrent callers wait for that result, and a failed step leaves the cell
//! empty so nothing is served from a half-built state.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use healthres_ann::{AnnConfig, AnnIndex};
use healthres_core::config::Settings;
use healthres_core::corpus::CorpusLoader;
use healthres_core::traits::{Embedder, VectorStore};
use healthres_core::types::{Corpus, EmbeddingMatrix, Provenance, Truncate, VectorRecord};
use healthres_core::{Error, Result};
use healthres_vector::{index_spec, upsert_batched};

use crate::backend::{LocalBackend, RemoteBackend};
use crate::retriever::Retriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    NotStarted,
    Loaded,
    Embedded,
    Indexed,
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Loaded => "corpus loaded",
            Self::Embedded => "corpus embedded",
            Self::Indexed => "indexes built",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

pub struct Session {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    store: Option<Arc<dyn VectorStore>>,
    corpus: OnceCell<Arc<Corpus>>,
    embeddings: OnceCell<Arc<EmbeddingMatrix>>,
    local: OnceCell<Arc<LocalBackend>>,
    remote: OnceCell<Arc<RemoteBackend>>,
    retriever: OnceCell<Arc<Retriever>>,
}

impl Session {
    /// `store` of `None` disables the remote backend.
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>, store: Option<Arc<dyn VectorStore>>) -> Self {
        Self {
            settings,
            embedder,
            store,
            corpus: OnceCell::new(),
            embeddings: OnceCell::new(),
            local: OnceCell::new(),
            remote: OnceCell::new(),
            retriever: OnceCell::new(),
        }
    }

    /// Builds the configured embedder and vector store.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = healthres_embed::get_default_embedder(&settings.embedding)?;
        let store = if settings.remote.enabled { Some(healthres_vector::build_store(&settings.remote).await?) } else { None };
        Ok(Self::new(settings, embedder, store))
    }

    /// Uses an already loaded corpus instead of reading `data.corpus_path`.
    pub fn with_corpus(mut self, corpus: Corpus) -> Self {
        self.corpus = OnceCell::new_with(Some(Arc::new(corpus)));
        self
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn phase(&self) -> Phase {
        if self.retriever.initialized() {
            Phase::Ready
        } else if self.local.initialized() || self.remote.initialized() {
            Phase::Indexed
        } else if self.embeddings.initialized() {
            Phase::Embedded
        } else if self.corpus.initialized() {
            Phase::Loaded
        } else {
            Phase::NotStarted
        }
    }

    pub async fn corpus(&self) -> Result<Arc<Corpus>> {
        self.corpus
            .get_or_try_init(|| async {
                let path = self.settings.corpus_path();
                let (corpus, report) = tokio::task::spawn_blocking(move || CorpusLoader::new().load(&path))
                    .await
                    .map_err(|e| Error::DataLoad(format!("loader task failed: {e}")))??;
                info!(rows = report.rows, columns = report.columns, dropped = report.dropped_rows, "phase: loaded");
                Ok(Arc::new(corpus))
            })
            .await
            .cloned()
    }

    pub async fn embeddings(&self) -> Result<Arc<EmbeddingMatrix>> {
        self.embeddings
            .get_or_try_init(|| async {
                let corpus = self.corpus().await?;
                let matrix = self.embedder.embed_batch(&corpus.abstracts(), Truncate::default()).await?;
                if matrix.len() != corpus.len() {
                    return Err(Error::EmbeddingService(format!(
                        "{} embeddings for {} documents",
                        matrix.len(),
                        corpus.len()
                    )));
                }
                if matrix.dim() != self.embedder.dim() {
                    return Err(Error::index_mismatch(
                        "corpus embeddings",
                        format!("dimension {} but the embedder declares {}", matrix.dim(), self.embedder.dim()),
                    ));
                }
                info!(rows = matrix.len(), dim = matrix.dim(), model = self.embedder.model_id(), "phase: embedded");
                Ok(Arc::new(matrix))
            })
            .await
            .cloned()
    }

    pub async fn local_backend(&self) -> Result<Arc<LocalBackend>> {
        self.local
            .get_or_try_init(|| async {
                let corpus = self.corpus().await?;
                let embeddings = self.embeddings().await?;
                let config = AnnConfig::from_settings(&self.settings.local_index);
                let index = self.load_or_build_index(&corpus, embeddings, config).await?;
                let backend = LocalBackend::new(Arc::new(index), corpus)
                    .with_min_neighbors(self.settings.local_index.min_neighbors);
                Ok(Arc::new(backend))
            })
            .await
            .cloned()
    }

    fn provenance(&self, corpus: &Corpus) -> Provenance {
        Provenance::new(self.embedder.model_id(), corpus.fingerprint())
    }

    async fn load_or_build_index(
        &self,
        corpus: &Corpus,
        embeddings: Arc<EmbeddingMatrix>,
        config: AnnConfig,
    ) -> Result<AnnIndex> {
        let provenance = self.provenance(corpus);
        let path: Option<PathBuf> = self.settings.local_index_path();
        if let Some(path) = path.as_ref().filter(|p| p.exists()) {
            match AnnIndex::load(path, &config, embeddings.dim(), &provenance) {
                Ok(index) => {
                    info!(path = %path.display(), "phase: local index reused");
                    return Ok(index);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "persisted local index is stale, rebuilding"),
            }
        }
        let index = tokio::task::spawn_blocking(move || AnnIndex::build(&embeddings, &config))
            .await
            .map_err(|e| Error::InvalidConfig(format!("index build task failed: {e}")))??;
        if let Some(path) = path {
            if let Err(e) = index.save(&path, &provenance) {
                warn!(path = %path.display(), error = %e, "could not persist local index");
            }
        }
        info!(items = index.len(), connectivity = index.config().connectivity, "phase: local index built");
        Ok(index)
    }

    pub async fn remote_backend(&self) -> Result<Arc<RemoteBackend>> {
        self.remote
            .get_or_try_init(|| async {
                let store = self
                    .store
                    .clone()
                    .ok_or_else(|| Error::InvalidConfig("the remote backend is disabled".into()))?;
                let corpus = self.corpus().await?;
                let embeddings = self.embeddings().await?;
                let spec = index_spec(&self.settings.remote, embeddings.dim());
                let handle = store.ensure_index(&spec).await?;

                let provenance = self.provenance(&corpus).to_string();
                let recorded = store.provenance(&handle).await?;
                let stored = store.count(&handle).await?;
                let current = recorded.as_deref() == Some(provenance.as_str());
                if current && stored >= corpus.len() {
                    info!(index = %handle.name, stored, %provenance, "phase: remote index already populated");
                } else {
                    if stored > 0 && !current {
                        warn!(
                            index = %handle.name,
                            stored,
                            recorded = recorded.as_deref().unwrap_or("unknown"),
                            %provenance,
                            "remote index holds vectors from another corpus or model, clearing"
                        );
                        store.clear(&handle).await?;
                    }
                    let records = VectorRecord::from_corpus(&corpus, &embeddings)?;
                    let report =
                        upsert_batched(store.as_ref(), &handle, &records, self.settings.remote.batch_size).await?;
                    store.set_provenance(&handle, &provenance).await?;
                    info!(index = %handle.name, batches = report.batches.len(), total = report.total, "phase: remote index populated");
                }
                Ok(Arc::new(RemoteBackend::new(store, handle)))
            })
            .await
            .cloned()
    }

    /// Runs every remaining construction step and returns the query pipeline.
    pub async fn ready(&self) -> Result<Arc<Retriever>> {
        self.retriever
            .get_or_try_init(|| async {
                let local = self.local_backend().await?;
                let mut retriever = Retriever::new(self.embedder.clone())
                    .with_truncate(self.settings.embedding.query_truncate)
                    .with_backend(local);
                if self.store.is_some() {
                    retriever = retriever.with_backend(self.remote_backend().await?);
                }
                info!("phase: ready");
                Ok(Arc::new(retriever))
            })
            .await
            .cloned()
    }
}
