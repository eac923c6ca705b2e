//! Bucket key layout for run artifacts.
//!
//! Per workload:
//!
//! ```text
//! <workload>/writes-raw/<shard>-writes-raw.json          current-run raw, per shard
//! <workload>/writes-summary/<shard>-writes-summary.json  current-run summary, per shard
//! <workload>/writes-compare-raw/<test_id>                archived for future comparisons
//! <workload>/writes-compare-summary/<test_id>
//! ```
//!
//! and the same four under `reads-`. Archive keys are named by the run
//! timestamp so a newest-first listing yields the comparison baseline.

/// Which half of a workload an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The create half.
    Writes,
    /// The get/list half.
    Reads,
}

impl Phase {
    /// Label used in keys, artifact names, and metric names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Writes => "writes",
            Self::Reads => "reads",
        }
    }
}

/// Key builder for one workload's artifacts.
#[derive(Debug, Clone)]
pub struct WorkloadPaths {
    prefix: String,
}

impl WorkloadPaths {
    /// Keys rooted at `<workload>/`.
    pub fn new(workload: &str) -> Self {
        Self {
            prefix: workload.trim_matches('/').to_string(),
        }
    }

    /// Keys rooted at `<root>/<workload>/`, for sharing a bucket across
    /// clusters.
    pub fn with_root(root: &str, workload: &str) -> Self {
        Self {
            prefix: format!("{}/{}", root.trim_matches('/'), workload.trim_matches('/')),
        }
    }

    /// Directory of per-shard raw series for `phase`.
    pub fn raw_dir(&self, phase: Phase) -> String {
        format!("{}/{}-raw", self.prefix, phase.as_str())
    }

    /// Directory of per-shard summaries for `phase`.
    pub fn summary_dir(&self, phase: Phase) -> String {
        format!("{}/{}-summary", self.prefix, phase.as_str())
    }

    /// Archive directory of aggregated raw series, keyed by test id.
    pub fn compare_raw_dir(&self, phase: Phase) -> String {
        format!("{}/{}-compare-raw", self.prefix, phase.as_str())
    }

    /// Archive directory of aggregated summaries, keyed by test id.
    pub fn compare_summary_dir(&self, phase: Phase) -> String {
        format!("{}/{}-compare-summary", self.prefix, phase.as_str())
    }

    /// One shard's raw artifact key.
    pub fn shard_raw_key(&self, phase: Phase, shard_prefix: &str) -> String {
        format!(
            "{}/{}-{}-raw.json",
            self.raw_dir(phase),
            shard_prefix,
            phase.as_str()
        )
    }

    /// One shard's summary artifact key.
    pub fn shard_summary_key(&self, phase: Phase, shard_prefix: &str) -> String {
        format!(
            "{}/{}-{}-summary.json",
            self.summary_dir(phase),
            shard_prefix,
            phase.as_str()
        )
    }

    /// Archive key for the aggregated raw series of a run.
    pub fn compare_raw_key(&self, phase: Phase, test_id: &str) -> String {
        format!("{}/{}", self.compare_raw_dir(phase), test_id)
    }

    /// Archive key for the aggregated summary of a run.
    pub fn compare_summary_key(&self, phase: Phase, test_id: &str) -> String {
        format!("{}/{}", self.compare_summary_dir(phase), test_id)
    }

    /// Key for a comparison output artifact (delta JSON, rendered table,
    /// merged raw series) of a run.
    pub fn compare_result_key(&self, phase: Phase, name: &str) -> String {
        format!("{}/{}-compare-results/{}", self.prefix, phase.as_str(), name)
    }
}

/// File-name suffix of a shard artifact: `-writes-raw.json` and friends.
pub fn shard_suffix(phase: Phase, summary: bool) -> String {
    if summary {
        format!("-{}-summary.json", phase.as_str())
    } else {
        format!("-{}-raw.json", phase.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_contract() {
        let p = WorkloadPaths::new("secrets");
        assert_eq!(p.raw_dir(Phase::Writes), "secrets/writes-raw");
        assert_eq!(p.summary_dir(Phase::Reads), "secrets/reads-summary");
        assert_eq!(
            p.compare_summary_dir(Phase::Writes),
            "secrets/writes-compare-summary"
        );
        assert_eq!(
            p.shard_raw_key(Phase::Writes, "shard0-ab12cde"),
            "secrets/writes-raw/shard0-ab12cde-writes-raw.json"
        );
        assert_eq!(
            p.shard_summary_key(Phase::Reads, "shard0-ab12cde"),
            "secrets/reads-summary/shard0-ab12cde-reads-summary.json"
        );
        assert_eq!(
            p.compare_summary_key(Phase::Writes, "2024-05-01T00:00:00Z"),
            "secrets/writes-compare-summary/2024-05-01T00:00:00Z"
        );
    }

    #[test]
    fn root_prefix_nests_workloads() {
        let p = WorkloadPaths::with_root("cluster-a/", "configmaps");
        assert_eq!(p.raw_dir(Phase::Writes), "cluster-a/configmaps/writes-raw");
    }

    #[test]
    fn shard_suffixes() {
        assert_eq!(shard_suffix(Phase::Writes, false), "-writes-raw.json");
        assert_eq!(shard_suffix(Phase::Reads, true), "-reads-summary.json");
    }
}
