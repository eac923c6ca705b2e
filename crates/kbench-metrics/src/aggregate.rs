//! Shard result aggregation.
//!
//! Shards report independently and in no particular order, so the merge is
//! built from commutative, associative pieces: totals are summed, histograms
//! added pointwise, raw series concatenated then sorted once for percentile
//! selection.

use tracing::warn;

use crate::{Histogram, LatencySeries, RequestsSummary};

/// Merge per-shard summaries and raw series into one summary.
///
/// `summaries` and `raws` are independent subsets: a shard whose raw
/// artifact was lost still contributes its totals, and vice versa. An empty
/// input produces an all-zero summary under `test_id`.
pub fn aggregate_summaries(
    test_id: impl Into<String>,
    summaries: &[RequestsSummary],
    raws: &[LatencySeries],
) -> RequestsSummary {
    let mut success_total = 0u64;
    let mut failure_total = 0u64;
    let mut histogram = Histogram::new();
    for s in summaries {
        success_total += s.success_total;
        failure_total += s.failure_total;
        histogram.merge(&s.latency_histogram);
    }

    let mut merged = LatencySeries::with_capacity(raws.iter().map(LatencySeries::len).sum());
    for r in raws {
        merged.extend_from(r);
    }

    if summaries.is_empty() && raws.is_empty() {
        warn!("no shard artifacts to aggregate; producing an empty summary");
    }

    RequestsSummary::from_parts(test_id, success_total, failure_total, histogram, &merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Outcome, Request, RequestKind, Sampler};
    use std::time::{Duration, Instant};

    fn shard(durations_ms: &[u64]) -> (RequestsSummary, LatencySeries) {
        let sampler = Sampler::with_capacity(durations_ms.len());
        for &ms in durations_ms {
            sampler.observe(&Request {
                kind: RequestKind::Write,
                key: "k".to_string(),
                payload_bytes: 0,
                start: Instant::now(),
                duration: Duration::from_millis(ms),
                outcome: Outcome::Success,
                error_kind: None,
            });
        }
        let snap = sampler.snapshot();
        (
            RequestsSummary::from_snapshot("shard", &snap),
            snap.raw.clone(),
        )
    }

    #[test]
    fn totals_and_histogram_sum_across_shards() {
        let (s1, r1) = shard(&[1; 100]);
        let (s2, r2) = shard(&[2; 100]);
        let agg = aggregate_summaries("agg", &[s1.clone(), s2.clone()], &[r1, r2]);

        assert_eq!(agg.success_total, 200);
        assert_eq!(agg.failure_total, 0);
        let mut expect = s1.latency_histogram.clone();
        expect.merge(&s2.latency_histogram);
        assert_eq!(agg.latency_histogram, expect);
    }

    #[test]
    fn aggregate_p50_lies_between_shard_p50s() {
        let (s1, r1) = shard(&[10, 10, 10, 10]);
        let (s2, r2) = shard(&[30, 30, 30, 30]);
        let lo = s1.lantency_p50.min(s2.lantency_p50);
        let hi = s1.lantency_p50.max(s2.lantency_p50);
        let agg = aggregate_summaries("agg", &[s1, s2], &[r1, r2]);
        assert!(agg.lantency_p50 >= lo && agg.lantency_p50 <= hi);
    }

    #[test]
    fn missing_raw_still_counts_totals() {
        let (s1, _) = shard(&[5, 5]);
        let agg = aggregate_summaries("agg", &[s1], &[]);
        assert_eq!(agg.success_total, 2);
        assert_eq!(agg.lantency_p50, Duration::ZERO);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let agg = aggregate_summaries("agg", &[], &[]);
        assert_eq!(agg.success_total + agg.failure_total, 0);
        assert_eq!(agg.latency_histogram.total(), 0);
    }
}
