//! Baseline selection for run comparison.

use tracing::{info, warn};

use kbench_metrics::RequestsSummary;

use crate::paths::{Phase, WorkloadPaths};
use crate::{S3Store, StoreError};

/// The most recent prior run's artifacts.
#[derive(Debug)]
pub struct Baseline {
    /// The prior aggregated summary.
    pub summary: RequestsSummary,
    /// Key the summary was read from.
    pub summary_key: String,
    /// Sibling raw-series key under the compare-raw prefix (same base name);
    /// its object may or may not exist.
    pub raw_key: String,
}

/// Pick the newest archived summary under the workload's compare prefix,
/// excluding the current run. Returns `None` (with a warning) on the first
/// run of a workload, when the bucket has no prior archive.
pub async fn find_baseline(
    store: &S3Store,
    paths: &WorkloadPaths,
    phase: Phase,
    current_test_id: &str,
) -> Result<Option<Baseline>, StoreError> {
    let prefix = paths.compare_summary_dir(phase);
    let objects = store.list_newest(&prefix).await?;
    let Some(prior) = objects.iter().find(|o| o.base_name() != current_test_id) else {
        warn!(prefix, "no prior summary found; skipping comparison");
        return Ok(None);
    };

    let bytes = store.download_bytes(&prior.key).await?;
    let summary: RequestsSummary =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
            key: prior.key.clone(),
            message: e.to_string(),
        })?;

    let raw_key = paths.compare_raw_key(phase, prior.base_name());
    info!(
        summary_key = %prior.key,
        baseline_test_id = %summary.test_id,
        "selected comparison baseline"
    );
    Ok(Some(Baseline {
        summary,
        summary_key: prior.key.clone(),
        raw_key,
    }))
}
