//! Fixed-layout latency histogram.
//!
//! Buckets are exponential: upper bounds 0.5 ms × 2^k for k in 0..=13
//! (0.5 ms up to 4.096 s), closed on the right, plus one overflow bucket.
//! Every sampler in every shard uses the same layout, so merging shard
//! histograms is pointwise addition with no bound reconciliation.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::MetricsError;

/// Number of finite buckets.
pub const FINITE_BUCKETS: usize = 14;

/// Total cells including the overflow bucket.
pub(crate) const CELLS: usize = FINITE_BUCKETS + 1;

/// Upper bound in milliseconds for finite bucket `k`.
fn upper_bound_ms(k: usize) -> f64 {
    0.5 * f64::from(1u32 << k)
}

/// Index of the bucket a duration falls into.
///
/// Smallest upper bound that is >= the value wins; anything past the last
/// finite bound lands in the overflow cell.
pub(crate) fn bucket_index(duration_ms: f64) -> usize {
    for k in 0..FINITE_BUCKETS {
        if duration_ms <= upper_bound_ms(k) {
            return k;
        }
    }
    FINITE_BUCKETS
}

/// One serialized histogram cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Upper bound in milliseconds; `None` is the overflow bucket.
    pub upper_bound_ms: Option<f64>,
    /// Requests observed at or under the bound (and over the previous one).
    pub count: u64,
}

/// Latency histogram over the fixed bucket layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [u64; CELLS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// An empty histogram. Acts as the merge identity.
    pub fn new() -> Self {
        Self { counts: [0; CELLS] }
    }

    pub(crate) fn from_counts(counts: [u64; CELLS]) -> Self {
        Self { counts }
    }

    /// Record one observation in milliseconds.
    pub fn observe_ms(&mut self, duration_ms: f64) {
        self.counts[bucket_index(duration_ms)] += 1;
    }

    /// Total count across all cells.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Pointwise addition. Associative and commutative; identical bucket
    /// bounds are guaranteed by the fixed layout.
    pub fn merge(&mut self, other: &Histogram) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
    }

    /// Pointwise subtraction, `self` as the later run.
    pub fn delta_from(&self, before: &Histogram) -> HistogramDelta {
        let mut cells = [0i64; CELLS];
        for (i, cell) in cells.iter_mut().enumerate() {
            *cell = self.counts[i] as i64 - before.counts[i] as i64;
        }
        HistogramDelta { counts: cells }
    }

    /// Serialized cell view, overflow last.
    pub fn buckets(&self) -> Vec<HistogramBucket> {
        let mut out = Vec::with_capacity(CELLS);
        for k in 0..FINITE_BUCKETS {
            out.push(HistogramBucket {
                upper_bound_ms: Some(upper_bound_ms(k)),
                count: self.counts[k],
            });
        }
        out.push(HistogramBucket {
            upper_bound_ms: None,
            count: self.counts[FINITE_BUCKETS],
        });
        out
    }

    /// Rebuild from serialized cells, enforcing the fixed layout.
    pub fn from_buckets(buckets: &[HistogramBucket]) -> Result<Self, MetricsError> {
        let mut h = Self::new();
        for b in buckets {
            let idx = match b.upper_bound_ms {
                None => FINITE_BUCKETS,
                Some(bound) => {
                    let mut found = None;
                    for k in 0..FINITE_BUCKETS {
                        if (upper_bound_ms(k) - bound).abs() < f64::EPSILON {
                            found = Some(k);
                            break;
                        }
                    }
                    found.ok_or(MetricsError::BucketMismatch {
                        upper_bound_ms: b.upper_bound_ms,
                    })?
                }
            };
            h.counts[idx] += b.count;
        }
        Ok(h)
    }

    /// Fixed-column table with one row per cell, overflow rendered `+Inf`.
    pub fn table(&self) -> String {
        let mut rows = Vec::with_capacity(CELLS);
        let mut lower = 0.0_f64;
        for k in 0..FINITE_BUCKETS {
            let upper = upper_bound_ms(k);
            rows.push(vec![
                format!("{lower:.3}"),
                format!("{upper:.3}"),
                self.counts[k].to_string(),
            ]);
            lower = upper;
        }
        rows.push(vec![
            format!("{lower:.3}"),
            "+Inf".to_string(),
            self.counts[FINITE_BUCKETS].to_string(),
        ]);
        crate::table::render(&["LOWER BOUND (MS)", "UPPER BOUND (MS)", "COUNT"], &rows)
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.buckets().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Histogram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let buckets = Vec::<HistogramBucket>::deserialize(deserializer)?;
        Histogram::from_buckets(&buckets).map_err(D::Error::custom)
    }
}

/// One signed cell of a histogram delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramDeltaBucket {
    /// Upper bound in milliseconds; `None` is the overflow bucket.
    pub upper_bound_ms: Option<f64>,
    /// Count change between the two runs.
    pub count: i64,
}

/// Pointwise difference of two histograms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramDelta {
    counts: [i64; CELLS],
}

impl HistogramDelta {
    /// Serialized cell view, overflow last.
    pub fn buckets(&self) -> Vec<HistogramDeltaBucket> {
        let mut out = Vec::with_capacity(CELLS);
        for k in 0..FINITE_BUCKETS {
            out.push(HistogramDeltaBucket {
                upper_bound_ms: Some(upper_bound_ms(k)),
                count: self.counts[k],
            });
        }
        out.push(HistogramDeltaBucket {
            upper_bound_ms: None,
            count: self.counts[FINITE_BUCKETS],
        });
        out
    }
}

impl Serialize for HistogramDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.buckets().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HistogramDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let buckets = Vec::<HistogramDeltaBucket>::deserialize(deserializer)?;
        let mut counts = [0i64; CELLS];
        for b in &buckets {
            let idx = match b.upper_bound_ms {
                None => FINITE_BUCKETS,
                Some(bound) => (0..FINITE_BUCKETS)
                    .find(|&k| (upper_bound_ms(k) - bound).abs() < f64::EPSILON)
                    .ok_or_else(|| {
                        D::Error::custom(MetricsError::BucketMismatch {
                            upper_bound_ms: b.upper_bound_ms,
                        })
                    })?,
            };
            counts[idx] += b.count;
        }
        Ok(HistogramDelta { counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_bounds_are_exponential() {
        assert_eq!(upper_bound_ms(0), 0.5);
        assert_eq!(upper_bound_ms(1), 1.0);
        assert_eq!(upper_bound_ms(13), 4096.0);
    }

    #[test]
    fn assignment_is_closed_on_right() {
        // exactly on a bound goes to that bucket, not the next
        assert_eq!(bucket_index(0.5), 0);
        assert_eq!(bucket_index(1.0), 1);
        assert_eq!(bucket_index(0.50001), 1);
        assert_eq!(bucket_index(4096.0), 13);
        assert_eq!(bucket_index(4096.1), FINITE_BUCKETS);
    }

    #[test]
    fn assignment_is_stable() {
        for ms in [0.0, 0.3, 0.5, 1.7, 100.0, 4096.0, 90000.0] {
            assert_eq!(bucket_index(ms), bucket_index(ms));
        }
    }

    #[test]
    fn merge_is_pointwise() {
        let mut a = Histogram::new();
        a.observe_ms(0.4);
        a.observe_ms(3.0);
        let mut b = Histogram::new();
        b.observe_ms(0.4);
        b.observe_ms(10_000.0);

        a.merge(&b);
        assert_eq!(a.total(), 4);
        let cells = a.buckets();
        assert_eq!(cells[0].count, 2);
        assert_eq!(cells[FINITE_BUCKETS].count, 1);
    }

    #[test]
    fn merge_identity_and_associativity() {
        let mut a = Histogram::new();
        for ms in [0.2, 1.5, 7.0, 5000.0] {
            a.observe_ms(ms);
        }
        let mut b = Histogram::new();
        b.observe_ms(2.0);
        let mut c = Histogram::new();
        c.observe_ms(64.0);
        c.observe_ms(64.0);

        let mut with_identity = a.clone();
        with_identity.merge(&Histogram::new());
        assert_eq!(with_identity, a);

        // (a+b)+c == a+(b+c), bitwise after canonical serialization
        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);
        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);
        assert_eq!(
            serde_json::to_string(&left).unwrap(),
            serde_json::to_string(&right).unwrap()
        );
    }

    #[test]
    fn serde_round_trip() {
        let mut h = Histogram::new();
        h.observe_ms(0.1);
        h.observe_ms(42.0);
        h.observe_ms(99_999.0);
        let js = serde_json::to_string(&h).unwrap();
        let back: Histogram = serde_json::from_str(&js).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn unknown_bound_is_rejected() {
        let cells = vec![HistogramBucket {
            upper_bound_ms: Some(0.7),
            count: 3,
        }];
        assert!(Histogram::from_buckets(&cells).is_err());
    }

    #[test]
    fn delta_is_signed() {
        let mut before = Histogram::new();
        before.observe_ms(0.4);
        before.observe_ms(0.4);
        let mut after = Histogram::new();
        after.observe_ms(0.4);
        after.observe_ms(3.0);

        let delta = after.delta_from(&before);
        let cells = delta.buckets();
        assert_eq!(cells[0].count, -1);
        assert_eq!(cells[3].count, 1);
    }
}
