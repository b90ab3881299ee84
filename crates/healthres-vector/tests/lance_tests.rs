use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use healthres_core::traits::VectorStore;
use healthres_core::types::{
    DocumentMeta, IndexHandle, IndexSpec, Metric, Placement, RankedMatch, VectorRecord,
};
use healthres_core::Error;
use healthres_vector::{upsert_batched, upsert_batched_from, LanceStore};

fn spec(name: &str, dimension: usize) -> IndexSpec {
    IndexSpec { name: name.to_string(), dimension, metric: Metric::Cosine, placement: Placement::default() }
}

/// Distinct unit-ish vectors: a one-hot slot plus a small ramp.
fn records(n: usize, dim: usize) -> Vec<VectorRecord> {
    (0..n)
        .map(|i| {
            let mut v = vec![0.01f32; dim];
            v[i % dim] = 1.0;
            v[(i / dim) % dim] += 0.5;
            VectorRecord {
                id: i.to_string(),
                vector: v,
                meta: DocumentMeta {
                    abstract_text: format!("abstract {i}"),
                    authors: format!("author {i}"),
                    publication_year: 2000 + (i % 20) as i32,
                },
            }
        })
        .collect()
}

#[tokio::test]
async fn ensure_index_is_idempotent_and_rejects_mismatch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceStore::open(tmp.path()).await?;

    let first = store.ensure_index(&spec("mh", 8)).await?;
    store.upsert(&first, &records(3, 8)).await?;
    let second = store.ensure_index(&spec("mh", 8)).await?;
    assert_eq!(first, second);
    assert_eq!(store.count(&second).await?, 3, "reuse keeps existing rows");

    let wrong_dim = store.ensure_index(&spec("mh", 16)).await.unwrap_err();
    assert!(matches!(wrong_dim, Error::IndexConfigMismatch { .. }), "{wrong_dim}");

    let mut euclid = spec("mh", 8);
    euclid.metric = Metric::Euclidean;
    let wrong_metric = store.ensure_index(&euclid).await.unwrap_err();
    assert!(matches!(wrong_metric, Error::IndexConfigMismatch { .. }), "{wrong_metric}");
    assert_eq!(store.count(&second).await?, 3, "mismatch leaves the index untouched");
    Ok(())
}

#[tokio::test]
async fn upsert_twice_keeps_one_row_per_id() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceStore::open(tmp.path()).await?;
    let index = store.ensure_index(&spec("papers", 8)).await?;
    let recs = records(20, 8);

    upsert_batched(&store, &index, &recs, 7).await?;
    upsert_batched(&store, &index, &recs, 7).await?;
    assert_eq!(store.count(&index).await?, 20);
    Ok(())
}

#[tokio::test]
async fn three_hundred_docs_upsert_in_three_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceStore::open(tmp.path()).await?;
    let dim = 32;
    let index = store.ensure_index(&spec("mh", dim)).await?;
    let recs = records(300, dim);

    let report = upsert_batched(&store, &index, &recs, 128).await?;
    assert_eq!(report.batches, vec![128, 128, 44]);
    assert_eq!(report.total, 300);
    assert_eq!(store.count(&index).await?, 300);

    for id in [0usize, 127, 128, 255, 299] {
        let hits = store.query(&index, &recs[id].vector, 5).await?;
        assert_eq!(hits[0].document_id, id, "id {id} is queryable");
        assert_eq!(hits[0].metadata.abstract_text, format!("abstract {id}"));
        assert!(hits.len() <= 5);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
    Ok(())
}

#[tokio::test]
async fn empty_index_query_is_empty_and_bad_vectors_fail() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceStore::open(tmp.path()).await?;
    let index = store.ensure_index(&spec("empty", 4)).await?;
    assert!(store.query(&index, &[1.0, 0.0, 0.0, 0.0], 5).await?.is_empty());

    let err = store.query(&index, &[1.0, 0.0], 5).await.unwrap_err();
    assert!(matches!(err, Error::VectorStore(_)));
    let err = store.upsert(&index, &records(1, 3)).await.unwrap_err();
    assert!(matches!(err, Error::VectorStore(_)));
    Ok(())
}

/// Fails every call after the first `ok_calls` upserts.
struct FlakyStore {
    inner: LanceStore,
    ok_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn provider(&self) -> &str { "flaky" }

    async fn ensure_index(&self, spec: &IndexSpec) -> healthres_core::Result<IndexHandle> {
        self.inner.ensure_index(spec).await
    }

    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> healthres_core::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            return Err(Error::VectorStore("HTTP 429: quota exceeded".into()));
        }
        self.inner.upsert(index, records).await
    }

    async fn query(&self, index: &IndexHandle, vector: &[f32], k: usize) -> healthres_core::Result<Vec<RankedMatch>> {
        self.inner.query(index, vector, k).await
    }

    async fn count(&self, index: &IndexHandle) -> healthres_core::Result<usize> { self.inner.count(index).await }

    async fn provenance(&self, index: &IndexHandle) -> healthres_core::Result<Option<String>> {
        self.inner.provenance(index).await
    }

    async fn set_provenance(&self, index: &IndexHandle, provenance: &str) -> healthres_core::Result<()> {
        self.inner.set_provenance(index, provenance).await
    }

    async fn clear(&self, index: &IndexHandle) -> healthres_core::Result<()> { self.inner.clear(index).await }
}

#[tokio::test]
async fn failed_batch_reports_offset_and_resumes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let flaky = FlakyStore { inner: LanceStore::open(tmp.path()).await?, ok_calls: 1, calls: AtomicUsize::new(0) };
    let index = flaky.ensure_index(&spec("mh", 16)).await?;
    let recs = records(300, 16);

    let err = upsert_batched(&flaky, &index, &recs, 128).await.unwrap_err();
    assert_eq!(err.batch_offset(), Some(128));
    assert!(matches!(err, Error::UpsertBatch { len: 128, .. }));
    assert_eq!(flaky.count(&index).await?, 128);

    let resumed = upsert_batched_from(&flaky.inner, &index, &recs, 128, 128).await?;
    assert_eq!(resumed.batches, vec![128, 44]);
    assert_eq!(flaky.count(&index).await?, 300);
    Ok(())
}

#[tokio::test]
async fn provenance_is_kept_per_index_and_clear_empties_rows() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceStore::open(tmp.path()).await?;
    let papers = store.ensure_index(&spec("papers", 16)).await?;
    let other = store.ensure_index(&spec("other", 16)).await?;
    assert_eq!(store.provenance(&papers).await?, None);

    upsert_batched(&store, &papers, &records(20, 16), 8).await?;
    store.set_provenance(&papers, "fake@abc").await?;
    store.set_provenance(&papers, "fake@def").await?;
    assert_eq!(store.provenance(&papers).await?.as_deref(), Some("fake@def"));
    assert_eq!(store.provenance(&other).await?, None);

    store.clear(&papers).await?;
    assert_eq!(store.count(&papers).await?, 0);
    assert!(store.query(&papers, &records(1, 16)[0].vector, 3).await?.is_empty());
    Ok(())
}
