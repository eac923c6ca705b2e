//! End-to-end pipeline over local artifacts: shard samplers are snapshotted
//! into summaries, written as artifact files, parsed back, aggregated, and
//! compared across two simulated runs. This is the same data path the
//! remote collector drives against object storage.

use std::time::{Duration, Instant};

use kbench::artifacts::write_phase_files;
use kbench_metrics::{
    aggregate_summaries, LatencySeries, Outcome, Request, RequestKind, RequestsCompare,
    RequestsSummary, Sampler,
};
use kbench_store::{shard_suffix, Phase};

fn shard_snapshot(durations_ms: &[u64], failures: usize) -> kbench_metrics::SamplerSnapshot {
    let sampler = Sampler::with_capacity(durations_ms.len());
    for (i, &ms) in durations_ms.iter().enumerate() {
        let outcome = if i < failures {
            Outcome::Failure
        } else {
            Outcome::Success
        };
        sampler.observe(&Request {
            kind: RequestKind::Write,
            key: format!("kbench{i}"),
            payload_bytes: 1024,
            start: Instant::now(),
            duration: Duration::from_millis(ms),
            outcome,
            error_kind: (outcome == Outcome::Failure).then_some("transient"),
        });
    }
    sampler.snapshot()
}

#[test]
fn shard_artifacts_aggregate_like_the_collector() {
    let dir = tempfile::tempdir().unwrap();

    // two shards, 100 writes each
    let shards = [
        shard_snapshot(&[10; 100], 0),
        shard_snapshot(&[30; 100], 0),
    ];

    let mut summaries = Vec::new();
    let mut raws = Vec::new();
    for (i, snap) in shards.iter().enumerate() {
        let summary = RequestsSummary::from_snapshot(format!("shard-{i}"), snap);
        let files = write_phase_files(
            dir.path(),
            &format!("shard{i}-abc{i}def"),
            Phase::Writes,
            &summary,
            &snap.raw,
        )
        .unwrap();

        // read the artifacts back the way the collector does, matching by
        // file-name suffix
        let raw_name = files.raw_json.file_name().unwrap().to_str().unwrap();
        assert!(raw_name.ends_with(&shard_suffix(Phase::Writes, false)));
        let parsed_raw: LatencySeries =
            serde_json::from_slice(&std::fs::read(&files.raw_json).unwrap()).unwrap();
        let parsed_summary: RequestsSummary =
            serde_json::from_slice(&std::fs::read(&files.summary_json).unwrap()).unwrap();
        assert_eq!(parsed_summary, summary);

        summaries.push(parsed_summary);
        raws.push(parsed_raw);
    }

    let agg = aggregate_summaries("run-1", &summaries, &raws);
    assert_eq!(agg.success_total, 200);
    assert_eq!(agg.failure_total, 0);
    assert_eq!(agg.latency_histogram.total(), 200);

    // aggregate p50 lies between the per-shard p50s
    let lo = summaries[0].lantency_p50.min(summaries[1].lantency_p50);
    let hi = summaries[0].lantency_p50.max(summaries[1].lantency_p50);
    assert!(agg.lantency_p50 >= lo && agg.lantency_p50 <= hi);
}

#[test]
fn two_runs_compare_field_wise() {
    let before_snap = shard_snapshot(&[20; 50], 5);
    let after_snap = shard_snapshot(&[10; 80], 0);

    let before = RequestsSummary::from_snapshot("run-1", &before_snap);
    let after = RequestsSummary::from_snapshot("run-2", &after_snap);

    let compare = RequestsCompare::new(before.clone(), after.clone());
    assert_eq!(compare.before.test_id, "run-1");
    assert_eq!(compare.after.test_id, "run-2");
    assert_eq!(
        compare.success_total.abs_diff,
        after.success_total as i64 - before.success_total as i64
    );
    assert!(compare.lantency_p50.abs_diff_ns < 0, "latency improved");

    // the delta artifact round-trips
    let js = compare.json().unwrap();
    let back: RequestsCompare = serde_json::from_str(&js).unwrap();
    assert_eq!(back, compare);
}

#[test]
fn summary_invariants_hold_under_failures() {
    let snap = shard_snapshot(&[5, 10, 15, 20, 25, 30, 35, 40], 3);
    let summary = RequestsSummary::from_snapshot("run", &snap);

    assert_eq!(
        summary.success_total + summary.failure_total,
        summary.latency_histogram.total()
    );
    assert!(summary.lantency_p50 <= summary.lantency_p90);
    assert!(summary.lantency_p90 <= summary.lantency_p99);
    assert!(summary.lantency_p99 <= summary.lantency_p999);
    assert!(summary.lantency_p999 <= summary.lantency_p9999);
}
