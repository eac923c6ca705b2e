//! Per-run request summary.
//!
//! The JSON field names below are the wire contract consumed by existing
//! dashboards; they are emitted verbatim, including the historical
//! `lantency` spelling, and must not be renamed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Histogram, LatencySeries, SamplerSnapshot};

/// Serde adapter: `Duration` as integer nanoseconds.
pub(crate) mod duration_ns {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ns = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(ns))
    }
}

/// Results of one run phase (writes or reads), aggregated or per-shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestsSummary {
    /// Run identifier: the run start timestamp, RFC 3339 with nanoseconds.
    pub test_id: String,

    /// Number of successful requests.
    pub success_total: u64,
    /// Number of failed requests.
    pub failure_total: u64,

    /// Client-side latency histogram.
    pub latency_histogram: Histogram,

    /// 50th-percentile latency.
    #[serde(with = "duration_ns")]
    pub lantency_p50: Duration,
    /// 90th-percentile latency.
    #[serde(with = "duration_ns")]
    pub lantency_p90: Duration,
    /// 99th-percentile latency.
    #[serde(with = "duration_ns")]
    pub lantency_p99: Duration,
    /// 99.9th-percentile latency.
    #[serde(with = "duration_ns")]
    pub lantency_p999: Duration,
    /// 99.99th-percentile latency.
    #[serde(with = "duration_ns")]
    pub lantency_p9999: Duration,
}

impl RequestsSummary {
    /// Build a summary from an end-of-run sampler snapshot.
    ///
    /// Percentiles come from the raw samples, not the histogram buckets.
    pub fn from_snapshot(test_id: impl Into<String>, snap: &SamplerSnapshot) -> Self {
        Self::from_parts(
            test_id,
            snap.success_total,
            snap.failure_total,
            snap.histogram.clone(),
            &snap.raw,
        )
    }

    /// Build a summary from already-merged parts.
    pub fn from_parts(
        test_id: impl Into<String>,
        success_total: u64,
        failure_total: u64,
        latency_histogram: Histogram,
        raw: &LatencySeries,
    ) -> Self {
        let sorted = raw.sorted();
        Self {
            test_id: test_id.into(),
            success_total,
            failure_total,
            latency_histogram,
            lantency_p50: sorted.pick(0.5),
            lantency_p90: sorted.pick(0.9),
            lantency_p99: sorted.pick(0.99),
            lantency_p999: sorted.pick(0.999),
            lantency_p9999: sorted.pick(0.9999),
        }
    }

    /// Percentiles in summary order, for publishing.
    pub fn percentiles(&self) -> [(&'static str, Duration); 5] {
        [
            ("p50", self.lantency_p50),
            ("p90", self.lantency_p90),
            ("p99", self.lantency_p99),
            ("p999", self.lantency_p999),
            ("p9999", self.lantency_p9999),
        ]
    }

    /// Compact JSON form, the artifact written to object storage.
    pub fn json(&self) -> Result<String, crate::MetricsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable form: totals, histogram table, percentiles.
    pub fn table(&self) -> String {
        let mut out = format!(
            "\nTEST ID: {:?}\n\n        TOTAL: {}\nSUCCESS TOTAL: {}\nFAILURE TOTAL: {}\n\n",
            self.test_id,
            self.success_total + self.failure_total,
            self.success_total,
            self.failure_total,
        );
        out.push_str(&self.latency_histogram.table());
        out.push_str(&format!(
            "\n   50-percentile latency: {:?}\n   90-percentile latency: {:?}\n   99-percentile latency: {:?}\n 99.9-percentile latency: {:?}\n99.99-percentile latency: {:?}\n\n",
            self.lantency_p50,
            self.lantency_p90,
            self.lantency_p99,
            self.lantency_p999,
            self.lantency_p9999,
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Outcome, Request, RequestKind, Sampler};
    use std::time::Instant;

    fn snapshot_with(durations_ms: &[u64], failures: usize) -> SamplerSnapshot {
        let sampler = Sampler::with_capacity(durations_ms.len());
        for (i, &ms) in durations_ms.iter().enumerate() {
            let outcome = if i < failures { Outcome::Failure } else { Outcome::Success };
            sampler.observe(&Request {
                kind: RequestKind::Write,
                key: format!("k{i}"),
                payload_bytes: 0,
                start: Instant::now(),
                duration: Duration::from_millis(ms),
                outcome,
                error_kind: None,
            });
        }
        sampler.snapshot()
    }

    #[test]
    fn totals_equal_histogram_sum() {
        let snap = snapshot_with(&[1, 2, 3, 4, 5], 2);
        let s = RequestsSummary::from_snapshot("t", &snap);
        assert_eq!(
            s.success_total + s.failure_total,
            s.latency_histogram.total()
        );
    }

    #[test]
    fn percentiles_are_monotone() {
        let snap = snapshot_with(&[5, 1, 9, 3, 7, 2, 8, 4, 6, 10], 0);
        let s = RequestsSummary::from_snapshot("t", &snap);
        assert!(s.lantency_p50 <= s.lantency_p90);
        assert!(s.lantency_p90 <= s.lantency_p99);
        assert!(s.lantency_p99 <= s.lantency_p999);
        assert!(s.lantency_p999 <= s.lantency_p9999);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let snap = snapshot_with(&[2, 4, 8], 1);
        let s = RequestsSummary::from_snapshot("2024-05-01T00:00:00.000000001Z", &snap);
        let js = s.json().unwrap();
        let back: RequestsSummary = serde_json::from_str(&js).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn wire_field_names_are_fixed() {
        let snap = snapshot_with(&[2], 0);
        let s = RequestsSummary::from_snapshot("t", &snap);
        let js = s.json().unwrap();
        for field in [
            "\"test_id\"",
            "\"success_total\"",
            "\"failure_total\"",
            "\"latency_histogram\"",
            "\"upper_bound_ms\"",
            "\"lantency_p50\"",
            "\"lantency_p90\"",
            "\"lantency_p99\"",
            "\"lantency_p999\"",
            "\"lantency_p9999\"",
        ] {
            assert!(js.contains(field), "missing {field} in {js}");
        }
    }

    #[test]
    fn table_renders_totals() {
        let snap = snapshot_with(&[1, 2], 0);
        let s = RequestsSummary::from_snapshot("run-1", &snap);
        let t = s.table();
        assert!(t.contains("SUCCESS TOTAL: 2"));
        assert!(t.contains("+Inf"));
    }
}
