//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_REMOTE__INDEX_NAME`). API keys are
//! never read from files; see [`secret`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Metric, Placement, Truncate};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment, env_name: env_name.to_string() })
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("failed to get '{key}': {e}")))
    }

    /// Extracts and validates the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub local_index: LocalIndexSettings,
    pub remote: RemoteSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub corpus_path: String,
    /// Where the local index is persisted; `None` keeps it in memory only.
    pub local_index_path: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { corpus_path: "data/data.csv".to_string(), local_index_path: Some("data/data_index.ann".to_string()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Cohere,
    #[serde(rename = "openai")]
    OpenAi,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    /// Overrides the provider's public API base URL.
    pub endpoint: Option<String>,
    /// Truncation mode used for query embeddings at both backends.
    pub query_truncate: Truncate,
    /// Split corpus embedding into requests of at most this many texts.
    /// Unset sends the whole corpus in one request.
    pub max_batch: Option<usize>,
    /// Retries on 429/5xx with exponential backoff; 0 disables retrying.
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Cohere,
            model: "multilingual-22-12".to_string(),
            dimension: 768,
            endpoint: None,
            query_truncate: Truncate::End,
            max_batch: None,
            max_retries: 0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalIndexSettings {
    pub metric: Metric,
    /// Graph degree of the HNSW index.
    pub connectivity: usize,
    /// Build effort. `trees` is accepted for older config files.
    #[serde(alias = "trees")]
    pub expansion_add: usize,
    pub expansion_search: usize,
    /// Fewer raw neighbours than this yields an empty result.
    pub min_neighbors: usize,
}

impl Default for LocalIndexSettings {
    fn default() -> Self {
        Self { metric: Metric::Angular, connectivity: 16, expansion_add: 100, expansion_search: 64, min_neighbors: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    Pinecone,
    Lance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub provider: StoreProvider,
    pub index_name: String,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
    pub batch_size: usize,
    pub namespace: String,
    pub controller_url: String,
    pub lance_uri: String,
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: StoreProvider::Pinecone,
            index_name: "mh".to_string(),
            metric: Metric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            batch_size: 128,
            namespace: String::new(),
            controller_url: "https://api.pinecone.io".to_string(),
            lance_uri: "data/indexes/lancedb".to_string(),
            timeout_secs: 60,
        }
    }
}

impl RemoteSettings {
    pub fn placement(&self) -> Placement { Placement { cloud: self.cloud.clone(), region: self.region.clone() } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Cohere,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Overrides the provider's public API base URL.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Cohere,
            model: "command-r".to_string(),
            temperature: 0.6,
            max_tokens: None,
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 5 } }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.retrieval.top_k == 0 { return invalid("retrieval.top_k must be at least 1"); }
        if self.local_index.connectivity < 2 { return invalid("local_index.connectivity must be at least 2"); }
        if self.local_index.expansion_add == 0 { return invalid("local_index.expansion_add must be at least 1"); }
        if self.local_index.expansion_search == 0 { return invalid("local_index.expansion_search must be at least 1"); }
        if self.embedding.dimension == 0 { return invalid("embedding.dimension must be positive"); }
        if self.embedding.max_batch == Some(0) { return invalid("embedding.max_batch must be at least 1"); }
        if self.remote.batch_size == 0 { return invalid("remote.batch_size must be at least 1"); }
        if self.remote.index_name.trim().is_empty() { return invalid("remote.index_name is required"); }
        if matches!(self.local_index.metric, Metric::DotProduct) {
            return invalid("local_index.metric supports angular, cosine or euclidean");
        }
        Ok(())
    }

    pub fn corpus_path(&self) -> PathBuf { expand_path(&self.data.corpus_path) }

    pub fn local_index_path(&self) -> Option<PathBuf> { self.data.local_index_path.as_deref().map(expand_path) }
}

/// Reads an API key from the process environment.
pub fn secret(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::InvalidConfig(format!("{name} is not set"))),
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
