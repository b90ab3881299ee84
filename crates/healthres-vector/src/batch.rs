use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use healthres_core::traits::VectorStore;
use healthres_core::types::{IndexHandle, UpsertReport, VectorRecord};
use healthres_core::{Error, Result};

/// Upserts `records` in fixed-size batches, in order.
///
/// A failing batch stops the run with `Error::UpsertBatch` carrying its start
/// offset. Ids are row positions, so replaying from that offset (or from zero)
/// converges to the same stored set.
pub async fn upsert_batched(
    store: &dyn VectorStore,
    index: &IndexHandle,
    records: &[VectorRecord],
    batch_size: usize,
) -> Result<UpsertReport> {
    upsert_batched_from(store, index, records, batch_size, 0).await
}

/// Same as [`upsert_batched`], skipping the records before `start_offset`.
pub async fn upsert_batched_from(
    store: &dyn VectorStore,
    index: &IndexHandle,
    records: &[VectorRecord],
    batch_size: usize,
    start_offset: usize,
) -> Result<UpsertReport> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("upsert batch size must be at least 1".into()));
    }
    let pending = records.get(start_offset..).unwrap_or_default();
    let mut report = UpsertReport::default();
    if pending.is_empty() {
        return Ok(report);
    }
    info!(index = %index.name, provider = store.provider(), records = pending.len(), batch_size, "upserting vectors");
    let pb = ProgressBar::new(pending.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    for (n, chunk) in pending.chunks(batch_size).enumerate() {
        let offset = start_offset + n * batch_size;
        pb.set_message(format!("batch at {offset}"));
        if let Err(e) = store.upsert(index, chunk).await {
            pb.abandon_with_message(format!("failed at offset {offset}"));
            warn!(index = %index.name, offset, len = chunk.len(), error = %e, "upsert batch failed");
            return Err(Error::UpsertBatch { offset, len: chunk.len(), reason: e.to_string() });
        }
        report.batches.push(chunk.len());
        report.total += chunk.len();
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("upsert complete");
    info!(index = %index.name, batches = report.batches.len(), total = report.total, "upsert finished");
    Ok(report)
}
