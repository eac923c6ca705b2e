//! Shard artifact collection and aggregation.
//!
//! Workers upload one raw and one summary artifact per phase; the collector
//! pulls both directories down, parses whatever is present, and merges it.
//! A shard that died before uploading is a warning, not a failure: a
//! partial aggregate with a warning beats a failed run.

use tokio::fs;
use tracing::{info, warn};

use kbench_metrics::{aggregate_summaries, LatencySeries, RequestsSummary};
use kbench_store::{shard_suffix, Phase, S3Store, WorkloadPaths};

use crate::RemoteError;

/// One phase's merged shard results.
#[derive(Debug)]
pub struct CollectedPhase {
    /// Aggregated summary across all reporting shards.
    pub summary: RequestsSummary,
    /// Concatenated raw series across all reporting shards.
    pub raw: LatencySeries,
    /// Shards whose summary artifact was found and parsed.
    pub shards_with_summary: usize,
    /// Shards whose raw artifact was found and parsed.
    pub shards_with_raw: usize,
}

/// Download and merge every shard artifact for one phase of a workload.
pub async fn collect_phase(
    store: &S3Store,
    paths: &WorkloadPaths,
    phase: Phase,
    test_id: &str,
    expected_shards: usize,
) -> Result<CollectedPhase, RemoteError> {
    let raw_sfx = shard_suffix(phase, false);
    let summary_sfx = shard_suffix(phase, true);

    let mut raws: Vec<LatencySeries> = Vec::new();
    let (_raw_dir, raw_files) = store.download_dir(&paths.raw_dir(phase)).await?;
    for fpath in &raw_files {
        if !fpath.to_string_lossy().ends_with(&raw_sfx) {
            continue;
        }
        match fs::read(fpath).await {
            Ok(bytes) => match serde_json::from_slice::<LatencySeries>(&bytes) {
                Ok(series) => raws.push(series),
                Err(e) => warn!(path = %fpath.display(), error = %e, "bad raw artifact"),
            },
            Err(e) => warn!(path = %fpath.display(), error = %e, "unreadable raw artifact"),
        }
    }

    let mut summaries: Vec<RequestsSummary> = Vec::new();
    let (_summary_dir, summary_files) = store.download_dir(&paths.summary_dir(phase)).await?;
    for fpath in &summary_files {
        if !fpath.to_string_lossy().ends_with(&summary_sfx) {
            continue;
        }
        match fs::read(fpath).await {
            Ok(bytes) => match serde_json::from_slice::<RequestsSummary>(&bytes) {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(path = %fpath.display(), error = %e, "bad summary artifact"),
            },
            Err(e) => warn!(path = %fpath.display(), error = %e, "unreadable summary artifact"),
        }
    }

    if summaries.len() < expected_shards || raws.len() < expected_shards {
        warn!(
            phase = phase.as_str(),
            expected = expected_shards,
            summaries = summaries.len(),
            raws = raws.len(),
            "missing shard artifacts; aggregating the subset present"
        );
    }

    let mut raw = LatencySeries::with_capacity(raws.iter().map(LatencySeries::len).sum());
    for r in &raws {
        raw.extend_from(r);
    }
    let summary = aggregate_summaries(test_id, &summaries, &raws);
    info!(
        phase = phase.as_str(),
        shards_with_summary = summaries.len(),
        shards_with_raw = raws.len(),
        success_total = summary.success_total,
        failure_total = summary.failure_total,
        "collected shard artifacts"
    );
    Ok(CollectedPhase {
        summary,
        raw,
        shards_with_summary: summaries.len(),
        shards_with_raw: raws.len(),
    })
}
