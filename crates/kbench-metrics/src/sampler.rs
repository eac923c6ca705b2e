//! In-process request sampler.
//!
//! One sampler per phase per shard. Counters and histogram cells are
//! atomics so the ingress workload can share a sampler across its HTTP
//! workers; the raw buffer is preallocated and appended under a short
//! critical section. Observing never fails and never reorders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::histogram::{bucket_index, CELLS};
use crate::{Histogram, LatencySeries};

/// Whether a request wrote or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Object create.
    Write,
    /// Object get or list.
    Read,
}

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call returned without error (after any transparent retries).
    Success,
    /// The call returned a non-retryable error.
    Failure,
    /// The run was stopped before the call was issued.
    Canceled,
}

/// One finalized request record. Created by the driver at call issue,
/// finalized on response or deadline, appended exactly once.
#[derive(Debug, Clone)]
pub struct Request {
    /// Write or read.
    pub kind: RequestKind,
    /// Object key, unique within the run.
    pub key: String,
    /// Payload size in bytes (zero for reads and lists).
    pub payload_bytes: usize,
    /// Monotonic issue timestamp.
    pub start: Instant,
    /// Wall time from issue to final response, retries included.
    pub duration: Duration,
    /// Terminal state.
    pub outcome: Outcome,
    /// Error classification label, present only on failure.
    pub error_kind: Option<&'static str>,
}

/// Immutable end-of-run view of a sampler.
#[derive(Debug, Clone)]
pub struct SamplerSnapshot {
    /// Successful requests.
    pub success_total: u64,
    /// Failed requests.
    pub failure_total: u64,
    /// Requests canceled before issue; excluded from the histogram.
    pub canceled_total: u64,
    /// Latency histogram over successes and failures.
    pub histogram: Histogram,
    /// Raw durations in observation order.
    pub raw: LatencySeries,
}

/// Concurrent-safe request sampler.
pub struct Sampler {
    success_total: AtomicU64,
    failure_total: AtomicU64,
    canceled_total: AtomicU64,
    buckets: [AtomicU64; CELLS],
    raw: Mutex<Vec<Duration>>,
}

impl Sampler {
    /// A sampler with a raw buffer sized for `capacity` requests, so the
    /// hot path stays allocation-free until the estimate is exceeded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            success_total: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            canceled_total: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            raw: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Record one finalized request.
    ///
    /// Canceled requests bump only the canceled counter: they carry no
    /// meaningful latency, and keeping them out of the histogram preserves
    /// `success + failure == histogram total`.
    pub fn observe(&self, req: &Request) {
        match req.outcome {
            Outcome::Canceled => {
                self.canceled_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Outcome::Success => {
                self.success_total.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failure => {
                self.failure_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        let ms = req.duration.as_secs_f64() * 1_000.0;
        self.buckets[bucket_index(ms)].fetch_add(1, Ordering::Relaxed);
        self.raw
            .lock()
            .expect("sampler raw buffer poisoned")
            .push(req.duration);
    }

    /// Consume the sampler into its immutable end-of-run view.
    pub fn snapshot(self) -> SamplerSnapshot {
        let mut counts = [0u64; CELLS];
        for (i, cell) in counts.iter_mut().enumerate() {
            *cell = self.buckets[i].load(Ordering::Relaxed);
        }
        let histogram = Histogram::from_counts(counts);
        let raw = self
            .raw
            .into_inner()
            .expect("sampler raw buffer poisoned");
        SamplerSnapshot {
            success_total: self.success_total.load(Ordering::Relaxed),
            failure_total: self.failure_total.load(Ordering::Relaxed),
            canceled_total: self.canceled_total.load(Ordering::Relaxed),
            histogram,
            raw: LatencySeries::from(raw),
        }
    }
}

impl Request {
    /// A successful request record.
    pub fn success(
        kind: RequestKind,
        key: impl Into<String>,
        payload_bytes: usize,
        start: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            payload_bytes,
            start,
            duration,
            outcome: Outcome::Success,
            error_kind: None,
        }
    }

    /// A failed request record with its error classification.
    pub fn failure(
        kind: RequestKind,
        key: impl Into<String>,
        payload_bytes: usize,
        start: Instant,
        duration: Duration,
        error_kind: &'static str,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            payload_bytes,
            start,
            duration,
            outcome: Outcome::Failure,
            error_kind: Some(error_kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_req(ms: u64, outcome: Outcome) -> Request {
        Request {
            kind: RequestKind::Write,
            key: "k".to_string(),
            payload_bytes: 10,
            start: Instant::now(),
            duration: Duration::from_millis(ms),
            outcome,
            error_kind: None,
        }
    }

    #[test]
    fn totals_match_histogram_sum() {
        let sampler = Sampler::with_capacity(8);
        sampler.observe(&write_req(1, Outcome::Success));
        sampler.observe(&write_req(2, Outcome::Success));
        sampler.observe(&write_req(3, Outcome::Failure));
        sampler.observe(&write_req(4, Outcome::Canceled));

        let snap = sampler.snapshot();
        assert_eq!(snap.success_total, 2);
        assert_eq!(snap.failure_total, 1);
        assert_eq!(snap.canceled_total, 1);
        assert_eq!(snap.histogram.total(), snap.success_total + snap.failure_total);
        assert_eq!(snap.raw.len(), 3);
    }

    #[test]
    fn raw_preserves_observation_order() {
        let sampler = Sampler::with_capacity(4);
        for ms in [30, 10, 20] {
            sampler.observe(&write_req(ms, Outcome::Success));
        }
        let snap = sampler.snapshot();
        let got: Vec<u64> = snap.raw.as_slice().iter().map(|d| d.as_millis() as u64).collect();
        assert_eq!(got, vec![30, 10, 20]);
    }

    #[test]
    fn concurrent_observers_do_not_lose_counts() {
        let sampler = std::sync::Arc::new(Sampler::with_capacity(1000));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = sampler.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    s.observe(&write_req(1, Outcome::Success));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let snap = std::sync::Arc::try_unwrap(sampler).ok().unwrap().snapshot();
        assert_eq!(snap.success_total, 1000);
        assert_eq!(snap.histogram.total(), 1000);
        assert_eq!(snap.raw.len(), 1000);
    }
}
