//! Run-over-baseline comparison.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::summary::duration_ns;
use crate::{HistogramDelta, LatencySeries, RequestsSummary};

/// Percentage change with a floor-of-one denominator so an empty baseline
/// does not divide by zero.
fn pct(before: f64, after: f64) -> f64 {
    100.0 * (after - before) / before.max(1.0)
}

/// Change in one counter between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterDelta {
    /// Baseline value.
    pub before: u64,
    /// Current value.
    pub after: u64,
    /// `after - before`.
    pub abs_diff: i64,
    /// `100 × (after − before) / max(before, 1)`.
    pub pct_diff: f64,
}

impl CounterDelta {
    fn of(before: u64, after: u64) -> Self {
        Self {
            before,
            after,
            abs_diff: after as i64 - before as i64,
            pct_diff: pct(before as f64, after as f64),
        }
    }
}

/// Change in one latency percentile between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyDelta {
    /// Baseline value.
    #[serde(with = "duration_ns")]
    pub before: Duration,
    /// Current value.
    #[serde(with = "duration_ns")]
    pub after: Duration,
    /// `after - before` in nanoseconds.
    pub abs_diff_ns: i64,
    /// `100 × (after − before) / max(before, 1)` over nanoseconds.
    pub pct_diff: f64,
}

impl LatencyDelta {
    fn of(before: Duration, after: Duration) -> Self {
        Self {
            before,
            after,
            abs_diff_ns: after.as_nanos() as i64 - before.as_nanos() as i64,
            pct_diff: pct(before.as_nanos() as f64, after.as_nanos() as f64),
        }
    }
}

/// One raw sample tagged with the run it came from, for plotting merged
/// distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedDuration {
    /// Label of the origin run (its test id).
    pub label: String,
    /// Sample value.
    #[serde(with = "duration_ns")]
    pub duration: Duration,
}

/// Field-wise difference between the current run and its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestsCompare {
    /// The baseline summary.
    pub before: RequestsSummary,
    /// The current summary.
    pub after: RequestsSummary,

    /// Success counter change.
    pub success_total: CounterDelta,
    /// Failure counter change.
    pub failure_total: CounterDelta,
    /// Pointwise histogram change.
    pub latency_histogram_delta: HistogramDelta,

    /// p50 change.
    pub lantency_p50: LatencyDelta,
    /// p90 change.
    pub lantency_p90: LatencyDelta,
    /// p99 change.
    pub lantency_p99: LatencyDelta,
    /// p99.9 change.
    pub lantency_p999: LatencyDelta,
    /// p99.99 change.
    pub lantency_p9999: LatencyDelta,
}

impl RequestsCompare {
    /// Diff `after` (current run) against `before` (baseline).
    pub fn new(before: RequestsSummary, after: RequestsSummary) -> Self {
        Self {
            success_total: CounterDelta::of(before.success_total, after.success_total),
            failure_total: CounterDelta::of(before.failure_total, after.failure_total),
            latency_histogram_delta: after
                .latency_histogram
                .delta_from(&before.latency_histogram),
            lantency_p50: LatencyDelta::of(before.lantency_p50, after.lantency_p50),
            lantency_p90: LatencyDelta::of(before.lantency_p90, after.lantency_p90),
            lantency_p99: LatencyDelta::of(before.lantency_p99, after.lantency_p99),
            lantency_p999: LatencyDelta::of(before.lantency_p999, after.lantency_p999),
            lantency_p9999: LatencyDelta::of(before.lantency_p9999, after.lantency_p9999),
            before,
            after,
        }
    }

    /// Compact JSON form, the artifact written to object storage.
    pub fn json(&self) -> Result<String, crate::MetricsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Fixed-column comparison table.
    pub fn table(&self) -> String {
        fn counter_row(name: &str, d: &CounterDelta) -> Vec<String> {
            vec![
                name.to_string(),
                d.before.to_string(),
                d.after.to_string(),
                d.abs_diff.to_string(),
                format!("{:+.2}%", d.pct_diff),
            ]
        }
        fn latency_row(name: &str, d: &LatencyDelta) -> Vec<String> {
            vec![
                name.to_string(),
                format!("{:?}", d.before),
                format!("{:?}", d.after),
                format!("{}ns", d.abs_diff_ns),
                format!("{:+.2}%", d.pct_diff),
            ]
        }
        let rows = vec![
            counter_row("success-total", &self.success_total),
            counter_row("failure-total", &self.failure_total),
            latency_row("latency-p50", &self.lantency_p50),
            latency_row("latency-p90", &self.lantency_p90),
            latency_row("latency-p99", &self.lantency_p99),
            latency_row("latency-p99.9", &self.lantency_p999),
            latency_row("latency-p99.99", &self.lantency_p9999),
        ];
        let mut out = format!(
            "\nBEFORE: {:?}\n AFTER: {:?}\n\n",
            self.before.test_id, self.after.test_id
        );
        out.push_str(&crate::table::render(
            &["METRIC", "BEFORE", "AFTER", "ABS-DIFF", "PCT-DIFF"],
            &rows,
        ));
        out
    }
}

/// Merge raw series from several runs into one label-tagged sequence sorted
/// by duration, for downstream plotting.
pub fn merge_tagged(series: &[(String, LatencySeries)]) -> Vec<TaggedDuration> {
    let total: usize = series.iter().map(|(_, s)| s.len()).sum();
    let mut out = Vec::with_capacity(total);
    for (label, s) in series {
        for &d in s.as_slice() {
            out.push(TaggedDuration {
                label: label.clone(),
                duration: d,
            });
        }
    }
    out.sort_by_key(|t| t.duration);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Histogram;

    fn summary(test_id: &str, success: u64, p50_ms: u64) -> RequestsSummary {
        let mut h = Histogram::new();
        for _ in 0..success {
            h.observe_ms(p50_ms as f64);
        }
        let raw: LatencySeries = vec![Duration::from_millis(p50_ms); success as usize].into();
        RequestsSummary::from_parts(test_id, success, 0, h, &raw)
    }

    #[test]
    fn delta_is_after_minus_before() {
        let before = summary("old", 100, 10);
        let after = summary("new", 150, 5);
        let cmp = RequestsCompare::new(before.clone(), after.clone());

        assert_eq!(cmp.before.test_id, "old");
        assert_eq!(cmp.after.test_id, "new");
        assert_eq!(cmp.success_total.abs_diff, 50);
        assert_eq!(cmp.success_total.pct_diff, 50.0);
        assert!(cmp.lantency_p50.abs_diff_ns < 0);
    }

    #[test]
    fn pct_diff_survives_zero_baseline() {
        let before = summary("old", 0, 0);
        let after = summary("new", 10, 1);
        let cmp = RequestsCompare::new(before, after);
        assert_eq!(cmp.success_total.pct_diff, 1000.0);
        assert!(cmp.success_total.pct_diff.is_finite());
    }

    #[test]
    fn json_round_trip() {
        let cmp = RequestsCompare::new(summary("a", 5, 2), summary("b", 6, 3));
        let js = cmp.json().unwrap();
        let back: RequestsCompare = serde_json::from_str(&js).unwrap();
        assert_eq!(back, cmp);
    }

    #[test]
    fn tagged_merge_sorts_by_duration() {
        let a: LatencySeries = vec![Duration::from_millis(5), Duration::from_millis(1)].into();
        let b: LatencySeries = vec![Duration::from_millis(3)].into();
        let merged = merge_tagged(&[("run-a".to_string(), a), ("run-b".to_string(), b)]);
        let ms: Vec<u64> = merged.iter().map(|t| t.duration.as_millis() as u64).collect();
        assert_eq!(ms, vec![1, 3, 5]);
        assert_eq!(merged[1].label, "run-b");
    }

    #[test]
    fn table_lists_every_metric() {
        let cmp = RequestsCompare::new(summary("a", 5, 2), summary("b", 6, 3));
        let t = cmp.table();
        for metric in ["success-total", "failure-total", "latency-p50", "latency-p99.99"] {
            assert!(t.contains(metric), "missing {metric}");
        }
    }
}
