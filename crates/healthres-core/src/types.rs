//! Domain types shared by the loader, the index backends and the responder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Ordinal position of a document in the loaded corpus.
///
/// Stable only for the lifetime of one load: reloading a file with a different
/// row set renumbers every document.
pub type DocumentId = usize;

/// Metadata carried alongside every indexed vector and every ranked match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub abstract_text: String,
    pub authors: String,
    pub publication_year: i32,
}

/// One research item of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub meta: DocumentMeta,
}

/// Ordered, immutable sequence of documents indexed by position `0..n`.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    docs: Vec<Document>,
}

impl Corpus {
    /// Builds a corpus from metadata rows; ids are assigned by position.
    pub fn from_rows(rows: Vec<DocumentMeta>) -> Self {
        let docs = rows.into_iter().enumerate().map(|(id, meta)| Document { id, meta }).collect();
        Self { docs }
    }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn get(&self, id: DocumentId) -> Option<&Document> { self.docs.get(id) }

    pub fn iter(&self) -> impl Iterator<Item = &Document> { self.docs.iter() }

    /// Abstract texts in corpus order, as sent to the embedding service.
    pub fn abstracts(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.meta.abstract_text.clone()).collect()
    }

    /// Content hash over every retained field, in order.
    ///
    /// Used to decide whether persisted index state still describes this corpus.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for doc in &self.docs {
            hasher.update(doc.meta.abstract_text.as_bytes());
            hasher.update(&[0x1f]);
            hasher.update(doc.meta.authors.as_bytes());
            hasher.update(&[0x1f]);
            hasher.update(&doc.meta.publication_year.to_le_bytes());
            hasher.update(&[0x1e]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Row-major matrix of embeddings, one row per input text, all of width `dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    rows: Vec<Vec<f32>>,
}

impl EmbeddingMatrix {
    /// Validates that every row has exactly `dim` components.
    pub fn new(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::EmbeddingService("embedding dimension must be positive".into()));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(Error::EmbeddingService(format!(
                "row {i} has dimension {} but {dim} was expected",
                row.len()
            )));
        }
        Ok(Self { dim, rows })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn row(&self, i: usize) -> Option<&[f32]> { self.rows.get(i).map(Vec::as_slice) }

    pub fn rows(&self) -> &[Vec<f32>] { &self.rows }

    pub fn into_rows(self) -> Vec<Vec<f32>> { self.rows }
}

/// Normalized query result shared by both backends. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub document_id: DocumentId,
    pub score: f32,
    pub metadata: DocumentMeta,
}

/// Distance/similarity function of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Angular,
    Cosine,
    Euclidean,
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Angular => "angular",
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dotproduct",
        }
    }

    /// Converts a raw distance (lower is closer) into a score where higher is closer.
    ///
    /// Angular distance `d = sqrt(2 - 2cos)` maps back to the cosine similarity,
    /// cosine distance `1 - cos` likewise, euclidean uses `1 / (1 + d)` and
    /// dot-product distances are negated.
    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Self::Angular => 1.0 - distance * distance / 2.0,
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
            Self::DotProduct => -distance,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "angular" => Ok(Self::Angular),
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "dotproduct" | "dot" => Ok(Self::DotProduct),
            other => Err(Error::InvalidConfig(format!("unknown metric '{other}'"))),
        }
    }
}

/// How the embedding service treats inputs longer than the model context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Truncate {
    /// Reject overly long input with an error.
    None,
    /// Drop tokens from the start of the input.
    Start,
    /// Drop tokens from the end of the input.
    #[default]
    End,
}

impl Truncate {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Start => "START",
            Self::End => "END",
        }
    }
}

/// Which nearest-neighbour backend answers a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Local => "local", Self::Remote => "remote" })
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "annoy" | "forest" => Ok(Self::Local),
            "remote" | "pinecone" | "cloud" => Ok(Self::Remote),
            other => Err(Error::InvalidConfig(format!("unknown backend '{other}'"))),
        }
    }
}

/// The corpus and embedding model a set of stored vectors was built from.
///
/// Persisted indexes are reused only when their provenance matches the
/// current session exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub model_id: String,
    pub fingerprint: String,
}

impl Provenance {
    pub fn new(model_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self { model_id: model_id.into(), fingerprint: fingerprint.into() }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}@{}", self.model_id, self.fingerprint) }
}

/// Cloud placement of a managed index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub cloud: String,
    pub region: String,
}

impl Default for Placement {
    fn default() -> Self { Self { cloud: "aws".to_string(), region: "us-east-1".to_string() } }
}

/// Desired shape of a named vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub placement: Placement,
}

/// Reference to a provisioned index. The store service remains the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHandle {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    /// Data-plane host for managed services that route per index.
    pub host: Option<String>,
}

/// One `(id, vector, metadata)` triple destined for a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub meta: DocumentMeta,
}

impl VectorRecord {
    /// Pairs each document with its embedding row; ids are the ordinal position.
    pub fn from_corpus(corpus: &Corpus, embeddings: &EmbeddingMatrix) -> Result<Vec<Self>> {
        if corpus.len() != embeddings.len() {
            return Err(Error::EmbeddingService(format!(
                "{} embeddings for {} documents",
                embeddings.len(),
                corpus.len()
            )));
        }
        Ok(corpus
            .iter()
            .zip(embeddings.rows())
            .map(|(doc, vector)| Self { id: doc.id.to_string(), vector: vector.clone(), meta: doc.meta.clone() })
            .collect())
    }
}

/// Sizes of the batches sent by a batched upsert, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub batches: Vec<usize>,
    pub total: usize,
}

/// Role of a conversation turn sent to a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }

    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }

    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
}
