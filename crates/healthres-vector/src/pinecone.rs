//! Pinecone serverless index client (control plane + data plane REST).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use healthres_core::config::RemoteSettings;
use healthres_core::traits::VectorStore;
use healthres_core::types::{DocumentMeta, IndexHandle, IndexSpec, Metric, RankedMatch, VectorRecord};
use healthres_core::{Error, Result};

pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

const META_ABSTRACT: &str = "Abstract";
const META_AUTHORS: &str = "Authors";
const META_YEAR: &str = "Publication Year";

/// Namespace holding bookkeeping vectors, kept apart from the searchable data.
pub const META_NAMESPACE: &str = "healthres-meta";
const MARKER_PREFIX: &str = "provenance";
const META_PROVENANCE: &str = "provenance";

pub struct PineconeStore {
    client: Client,
    controller_url: String,
    namespace: String,
    ready_poll: Duration,
    ready_attempts: usize,
}

impl PineconeStore {
    pub fn new(api_key: &str, controller_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("missing Pinecone API key".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| Error::InvalidConfig("invalid Pinecone API key".into()))?,
        );
        headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            namespace: String::new(),
            ready_poll: Duration::from_secs(1),
            ready_attempts: 120,
        })
    }

    pub fn from_settings(settings: &RemoteSettings, api_key: &str) -> Result<Self> {
        Ok(Self::new(api_key, &settings.controller_url, Duration::from_secs(settings.timeout_secs))?
            .with_namespace(&settings.namespace))
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// How often and how long to wait for a freshly created index to become ready.
    pub fn with_ready_poll(mut self, interval: Duration, attempts: usize) -> Self {
        self.ready_poll = interval;
        self.ready_attempts = attempts.max(1);
        self
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{name}", self.controller_url);
        let resp = self.client.get(&url).send().await.map_err(transport_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        resp.json().await.map(Some).map_err(|e| Error::VectorStore(format!("malformed index description: {e}")))
    }

    async fn create(&self, spec: &IndexSpec) -> Result<()> {
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": pinecone_metric(spec.metric),
            "spec": { "serverless": { "cloud": spec.placement.cloud, "region": spec.placement.region } },
        });
        let resp =
            self.client.post(format!("{}/indexes", self.controller_url)).json(&body).send().await.map_err(transport_error)?;
        if resp.status() == StatusCode::CONFLICT {
            warn!(index = %spec.name, "index was created concurrently");
            return Ok(());
        }
        check(resp).await?;
        info!(index = %spec.name, dim = spec.dimension, metric = %spec.metric, cloud = %spec.placement.cloud, region = %spec.placement.region, "created index");
        Ok(())
    }

    async fn wait_ready(&self, name: &str) -> Result<IndexDescription> {
        for attempt in 0..self.ready_attempts {
            if let Some(desc) = self.describe(name).await? {
                if desc.status.ready {
                    return Ok(desc);
                }
                debug!(index = name, state = %desc.status.state, attempt, "waiting for index");
            }
            tokio::time::sleep(self.ready_poll).await;
        }
        Err(Error::Timeout(format!("index '{name}' did not become ready")))
    }

    fn data_url(index: &IndexHandle, route: &str) -> Result<String> {
        let host = index
            .host
            .as_deref()
            .ok_or_else(|| Error::VectorStore(format!("index '{}' has no data-plane host", index.name)))?;
        let base = if host.starts_with("http") { host.to_string() } else { format!("https://{host}") };
        Ok(format!("{}/{route}", base.trim_end_matches('/')))
    }

    async fn data_post(&self, index: &IndexHandle, route: &str, body: &Value) -> Result<Response> {
        let resp = self.client.post(Self::data_url(index, route)?).json(body).send().await.map_err(transport_error)?;
        check(resp).await
    }

    async fn data_get(&self, index: &IndexHandle, route: &str, query: &[(&str, &str)]) -> Result<Response> {
        let resp = self.client.get(Self::data_url(index, route)?).query(query).send().await.map_err(transport_error)?;
        check(resp).await
    }

    /// Id of the marker vector recording what the data namespace holds.
    fn marker_id(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{MARKER_PREFIX}:{ns}"),
            None => MARKER_PREFIX.to_string(),
        }
    }

    fn namespace(&self) -> Option<&str> { (!self.namespace.is_empty()).then_some(self.namespace.as_str()) }
}

/// Fails with `IndexConfigMismatch` unless `desc` has the requested dimension and metric.
fn check_shape(spec: &IndexSpec, desc: &IndexDescription) -> Result<()> {
    if desc.dimension != spec.dimension {
        return Err(Error::index_mismatch(
            &spec.name,
            format!("existing dimension {}, requested {}", desc.dimension, spec.dimension),
        ));
    }
    if desc.metric != pinecone_metric(spec.metric) {
        return Err(Error::index_mismatch(&spec.name, format!("existing metric {}, requested {}", desc.metric, spec.metric)));
    }
    Ok(())
}

/// Pinecone has no angular metric; cosine ranks identically.
fn pinecone_metric(metric: Metric) -> &'static str {
    match metric {
        Metric::Angular | Metric::Cosine => "cosine",
        Metric::Euclidean => "euclidean",
        Metric::DotProduct => "dotproduct",
    }
}

/// Pinecone euclidean scores are squared distances; everything else is a similarity.
fn normalize_score(metric: Metric, score: f32) -> f32 {
    match metric {
        Metric::Euclidean => 1.0 / (1.0 + score.max(0.0)),
        _ => score,
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(Error::VectorStore(format!("HTTP {}: {}", status.as_u16(), body.trim())))
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("vector store request: {err}"))
    } else {
        Error::VectorStore(format!("transport: {err}"))
    }
}

fn metadata_of(record: &VectorRecord) -> Value {
    let mut m = Map::new();
    m.insert(META_ABSTRACT.into(), Value::String(record.meta.abstract_text.clone()));
    m.insert(META_AUTHORS.into(), Value::String(record.meta.authors.clone()));
    m.insert(META_YEAR.into(), Value::from(record.meta.publication_year));
    Value::Object(m)
}

/// Pinecone stores numbers as floats; years may also have been written as strings.
fn year_of(value: Option<&Value>) -> Option<i32> {
    let year = match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64),
        _ => None,
    };
    year.and_then(|y| i32::try_from(y).ok())
}

fn match_to_ranked(m: QueryMatch, metric: Metric) -> Result<RankedMatch> {
    let document_id =
        m.id.parse::<usize>().map_err(|_| Error::VectorStore(format!("non-ordinal id '{}' in index", m.id)))?;
    let meta = m.metadata.unwrap_or_default();
    let text = |key: &str| meta.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let publication_year = year_of(meta.get(META_YEAR))
        .ok_or_else(|| Error::VectorStore(format!("match '{}' lacks a publication year", m.id)))?;
    Ok(RankedMatch {
        document_id,
        score: normalize_score(metric, m.score),
        metadata: DocumentMeta { abstract_text: text(META_ABSTRACT), authors: text(META_AUTHORS), publication_year },
    })
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn provider(&self) -> &str { "pinecone" }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle> {
        let desc = match self.describe(&spec.name).await? {
            Some(existing) => {
                check_shape(spec, &existing)?;
                info!(index = %spec.name, dim = existing.dimension, "reusing existing index");
                if existing.status.ready { existing } else { self.wait_ready(&spec.name).await? }
            }
            None => {
                self.create(spec).await?;
                self.wait_ready(&spec.name).await?
            }
        };
        // A concurrent creator may have won with another shape
        check_shape(spec, &desc)?;
        Ok(IndexHandle { name: spec.name.clone(), dimension: spec.dimension, metric: spec.metric, host: Some(desc.host) })
    }

    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != index.dimension) {
            return Err(Error::VectorStore(format!(
                "vector '{}' has dimension {} but index '{}' expects {}",
                bad.id,
                bad.vector.len(),
                index.name,
                index.dimension
            )));
        }
        let vectors: Vec<Value> = records
            .iter()
            .map(|r| json!({ "id": r.id, "values": r.vector, "metadata": metadata_of(r) }))
            .collect();
        let mut body = json!({ "vectors": vectors });
        if let Some(ns) = self.namespace() {
            body["namespace"] = Value::String(ns.to_string());
        }
        let resp = self.data_post(index, "vectors/upsert", &body).await?;
        let parsed: UpsertResponse =
            resp.json().await.map_err(|e| Error::VectorStore(format!("malformed upsert response: {e}")))?;
        if parsed.upserted_count != records.len() {
            return Err(Error::VectorStore(format!(
                "service acknowledged {} of {} vectors",
                parsed.upserted_count,
                records.len()
            )));
        }
        debug!(index = %index.name, records = records.len(), "upserted");
        Ok(())
    }

    async fn query(&self, index: &IndexHandle, vector: &[f32], k: usize) -> Result<Vec<RankedMatch>> {
        if vector.len() != index.dimension {
            return Err(Error::VectorStore(format!(
                "query has dimension {} but index '{}' expects {}",
                vector.len(),
                index.name,
                index.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut body = json!({ "vector": vector, "topK": k, "includeMetadata": true, "includeValues": false });
        if let Some(ns) = self.namespace() {
            body["namespace"] = Value::String(ns.to_string());
        }
        let resp = self.data_post(index, "query", &body).await?;
        let parsed: QueryResponse =
            resp.json().await.map_err(|e| Error::VectorStore(format!("malformed query response: {e}")))?;
        let mut matches =
            parsed.matches.into_iter().map(|m| match_to_ranked(m, index.metric)).collect::<Result<Vec<_>>>()?;
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);
        Ok(matches)
    }

    async fn count(&self, index: &IndexHandle) -> Result<usize> {
        let resp = self.data_post(index, "describe_index_stats", &json!({})).await?;
        let stats: IndexStats =
            resp.json().await.map_err(|e| Error::VectorStore(format!("malformed index stats: {e}")))?;
        let in_namespace = |ns: &str| stats.namespaces.get(ns).map_or(0, |n| n.vector_count);
        Ok(match self.namespace() {
            Some(ns) => in_namespace(ns),
            None => stats.total_vector_count.saturating_sub(in_namespace(META_NAMESPACE)),
        })
    }

    async fn provenance(&self, index: &IndexHandle) -> Result<Option<String>> {
        let id = self.marker_id();
        let resp = self.data_get(index, "vectors/fetch", &[("ids", id.as_str()), ("namespace", META_NAMESPACE)]).await?;
        let parsed: FetchResponse =
            resp.json().await.map_err(|e| Error::VectorStore(format!("malformed fetch response: {e}")))?;
        Ok(parsed
            .vectors
            .get(&id)
            .and_then(|v| v.metadata.as_ref())
            .and_then(|m| m.get(META_PROVENANCE))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn set_provenance(&self, index: &IndexHandle, provenance: &str) -> Result<()> {
        // Dense vectors must not be all zeros
        let mut values = vec![0.0f32; index.dimension.max(1)];
        values[0] = 1.0;
        let body = json!({
            "vectors": [{ "id": self.marker_id(), "values": values, "metadata": { META_PROVENANCE: provenance } }],
            "namespace": META_NAMESPACE,
        });
        self.data_post(index, "vectors/upsert", &body).await?;
        debug!(index = %index.name, provenance, "recorded index provenance");
        Ok(())
    }

    async fn clear(&self, index: &IndexHandle) -> Result<()> {
        let body = json!({ "deleteAll": true, "namespace": self.namespace().unwrap_or_default() });
        self.data_post(index, "vectors/delete", &body).await?;
        info!(index = %index.name, namespace = self.namespace().unwrap_or_default(), "cleared index");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
    metric: String,
    #[serde(default)]
    host: String,
    status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: std::collections::HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    namespaces: std::collections::HashMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    vector_count: usize,
}
