use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use tracing::{debug, info};

use healthres_core::traits::VectorStore;
use healthres_core::types::{DocumentMeta, IndexHandle, IndexSpec, Metric, RankedMatch, VectorRecord};
use healthres_core::{Error, Result};

use crate::schema::{build_records_schema, vector_dim, ABSTRACT_COLUMN, AUTHORS_COLUMN, ID_COLUMN, YEAR_COLUMN};
use crate::table::{ensure_table, get_meta, open_db, set_meta, store_err, table_exists};

const META_TABLE: &str = "healthres_meta";

/// Embedded LanceDB store: one table per index, metric kept in a meta table.
pub struct LanceStore {
    db: Connection,
}

impl LanceStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let db = open_db(path.to_string_lossy().as_ref()).await?;
        Ok(Self { db })
    }

    async fn open_index(&self, index: &IndexHandle) -> Result<lancedb::Table> {
        self.db.open_table(&index.name).execute().await.map_err(store_err)
    }
}

fn metric_key(index: &str) -> String { format!("index:{index}:metric") }

fn provenance_key(index: &str) -> String { format!("index:{index}:provenance") }

/// Angular and cosine share LanceDB's cosine distance.
fn distance_type(metric: Metric) -> DistanceType {
    match metric {
        Metric::Angular | Metric::Cosine => DistanceType::Cosine,
        Metric::Euclidean => DistanceType::L2,
        Metric::DotProduct => DistanceType::Dot,
    }
}

fn score(metric: Metric, distance: f32) -> f32 {
    match metric {
        Metric::Angular => Metric::Cosine.score_from_distance(distance),
        m => m.score_from_distance(distance),
    }
}

fn same_metric(a: Metric, b: Metric) -> bool {
    let canonical = |m: Metric| if m == Metric::Angular { Metric::Cosine } else { m };
    canonical(a) == canonical(b)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::VectorStore(format!("result column '{name}' missing or mistyped")))
}

fn to_record_batch(dim: usize, records: &[VectorRecord]) -> Result<RecordBatch> {
    let width = i32::try_from(dim).map_err(|_| Error::VectorStore(format!("dimension {dim} too large")))?;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let abstracts: Vec<&str> = records.iter().map(|r| r.meta.abstract_text.as_str()).collect();
    let authors: Vec<&str> = records.iter().map(|r| r.meta.authors.as_str()).collect();
    let years: Vec<i32> = records.iter().map(|r| r.meta.publication_year).collect();
    let vectors = records.iter().map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>()));
    RecordBatch::try_new(
        build_records_schema(width),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(abstracts)),
            Arc::new(StringArray::from(authors)),
            Arc::new(Int32Array::from(years)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, width)),
        ],
    )
    .map_err(store_err)
}

#[async_trait]
impl VectorStore for LanceStore {
    fn provider(&self) -> &str { "lance" }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle> {
        let handle =
            IndexHandle { name: spec.name.clone(), dimension: spec.dimension, metric: spec.metric, host: None };
        let key = metric_key(&spec.name);

        if table_exists(&self.db, &spec.name).await? {
            let table = self.open_index(&handle).await?;
            let schema = table.schema().await.map_err(store_err)?;
            let dim = vector_dim(&schema)
                .ok_or_else(|| Error::index_mismatch(&spec.name, "existing table has no vector column"))?;
            if dim != spec.dimension {
                return Err(Error::index_mismatch(
                    &spec.name,
                    format!("existing dimension {dim}, requested {}", spec.dimension),
                ));
            }
            match get_meta(&self.db, META_TABLE, &key).await? {
                Some(recorded) => {
                    let existing: Metric = recorded.parse()?;
                    if !same_metric(existing, spec.metric) {
                        return Err(Error::index_mismatch(
                            &spec.name,
                            format!("existing metric {existing}, requested {}", spec.metric),
                        ));
                    }
                }
                None => set_meta(&self.db, META_TABLE, &key, spec.metric.as_str()).await?,
            }
            info!(index = %spec.name, dim, "reusing existing index");
            return Ok(handle);
        }

        let width = i32::try_from(spec.dimension)
            .map_err(|_| Error::InvalidConfig(format!("dimension {} too large", spec.dimension)))?;
        ensure_table(&self.db, &spec.name, build_records_schema(width)).await?;
        set_meta(&self.db, META_TABLE, &key, spec.metric.as_str()).await?;
        info!(index = %spec.name, dim = spec.dimension, metric = %spec.metric, "created index");
        Ok(handle)
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
        let batch = to_record_batch(index.dimension, records)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.open_index(index).await?;
        // Replays overwrite rows with the same id
        let mut mi = table.merge_insert(&[ID_COLUMN]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(store_err)?;
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
        let table = self.open_index(index).await?;
        if k == 0 || table.count_rows(None).await.map_err(store_err)? == 0 {
            return Ok(Vec::new());
        }
        let mut stream = table
            .vector_search(vector.to_vec())
            .map_err(store_err)?
            .distance_type(distance_type(index.metric))
            .limit(k)
            .execute()
            .await
            .map_err(store_err)?;

        let mut matches = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(store_err)? {
            let ids = column::<StringArray>(&batch, ID_COLUMN)?;
            let abstracts = column::<StringArray>(&batch, ABSTRACT_COLUMN)?;
            let authors = column::<StringArray>(&batch, AUTHORS_COLUMN)?;
            let years = column::<Int32Array>(&batch, YEAR_COLUMN)?;
            let distances = column::<Float32Array>(&batch, "_distance")?;
            for i in 0..batch.num_rows() {
                let document_id = ids
                    .value(i)
                    .parse::<usize>()
                    .map_err(|_| Error::VectorStore(format!("non-ordinal id '{}' in index", ids.value(i))))?;
                let distance = if distances.is_null(i) { f32::INFINITY } else { distances.value(i) };
                matches.push(RankedMatch {
                    document_id,
                    score: score(index.metric, distance),
                    metadata: DocumentMeta {
                        abstract_text: abstracts.value(i).to_string(),
                        authors: authors.value(i).to_string(),
                        publication_year: years.value(i),
                    },
                });
            }
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);
        Ok(matches)
    }

    async fn count(&self, index: &IndexHandle) -> Result<usize> {
        self.open_index(index).await?.count_rows(None).await.map_err(store_err)
    }

    async fn provenance(&self, index: &IndexHandle) -> Result<Option<String>> {
        get_meta(&self.db, META_TABLE, &provenance_key(&index.name)).await
    }

    async fn set_provenance(&self, index: &IndexHandle, provenance: &str) -> Result<()> {
        set_meta(&self.db, META_TABLE, &provenance_key(&index.name), provenance).await
    }

    async fn clear(&self, index: &IndexHandle) -> Result<()> {
        self.open_index(index).await?.delete("true").await.map_err(store_err)?;
        info!(index = %index.name, "cleared index");
        Ok(())
    }
}
