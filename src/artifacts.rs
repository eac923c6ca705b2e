//! Local artifact files.
//!
//! Every phase of a run produces three local files named after the shard:
//! the raw series, the summary JSON, and the human-readable summary table.
//! Workers upload the first two to the shard directories; the table stays
//! on disk (and in the pod log) for operators.

use std::path::{Path, PathBuf};

use anyhow::Context;
use kbench_metrics::{LatencySeries, RequestsSummary};
use kbench_store::Phase;

/// Local files written for one phase of one shard.
#[derive(Debug)]
pub struct PhaseFiles {
    /// Raw latency series JSON.
    pub raw_json: PathBuf,
    /// Summary JSON in the wire schema.
    pub summary_json: PathBuf,
    /// Rendered summary table.
    pub summary_table: PathBuf,
}

/// Write the three artifact files for one phase under `output_dir`.
pub fn write_phase_files(
    output_dir: &Path,
    shard_prefix: &str,
    phase: Phase,
    summary: &RequestsSummary,
    raw: &LatencySeries,
) -> anyhow::Result<PhaseFiles> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create artifact dir {}", output_dir.display()))?;

    let base = format!("{}-{}", shard_prefix, phase.as_str());
    let raw_json = output_dir.join(format!("{base}-raw.json"));
    let summary_json = output_dir.join(format!("{base}-summary.json"));
    let summary_table = output_dir.join(format!("{base}-summary.txt"));

    std::fs::write(&raw_json, serde_json::to_vec(raw)?)
        .with_context(|| format!("write {}", raw_json.display()))?;
    std::fs::write(&summary_json, summary.json()?)
        .with_context(|| format!("write {}", summary_json.display()))?;
    std::fs::write(&summary_table, summary.table())
        .with_context(|| format!("write {}", summary_table.display()))?;

    Ok(PhaseFiles {
        raw_json,
        summary_json,
        summary_table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_metrics::Histogram;

    #[test]
    fn files_carry_shard_and_phase_names() {
        let dir = tempfile::tempdir().unwrap();
        let summary = RequestsSummary::from_parts(
            "t",
            1,
            0,
            Histogram::new(),
            &LatencySeries::new(),
        );
        let files = write_phase_files(
            dir.path(),
            "shard0-ab12cde",
            Phase::Writes,
            &summary,
            &LatencySeries::new(),
        )
        .unwrap();
        assert!(files.raw_json.ends_with("shard0-ab12cde-writes-raw.json"));
        assert!(files.summary_json.exists());
        assert!(files.summary_table.exists());

        let back: RequestsSummary =
            serde_json::from_slice(&std::fs::read(&files.summary_json).unwrap()).unwrap();
        assert_eq!(back, summary);
    }
}
