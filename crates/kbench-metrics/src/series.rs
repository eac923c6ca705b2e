//! Raw latency series and percentile selection.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered sequence of request durations, appended in issue order.
///
/// Serialized as an array of nanosecond integers. The sorted form is
/// transient: [`LatencySeries::sorted`] clones and sorts on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencySeries(Vec<Duration>);

impl LatencySeries {
    /// An empty series.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// An empty series with room for `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append one duration, preserving issue order.
    pub fn push(&mut self, d: Duration) {
        self.0.push(d);
    }

    /// Append every sample of `other`.
    pub fn extend_from(&mut self, other: &LatencySeries) {
        self.0.extend_from_slice(&other.0);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no samples were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Samples in issue order.
    pub fn as_slice(&self) -> &[Duration] {
        &self.0
    }

    /// A sorted copy for percentile picking.
    pub fn sorted(&self) -> LatencySeries {
        let mut v = self.0.clone();
        v.sort_unstable();
        Self(v)
    }

    /// Percentile by index `floor(q * (len - 1))`; zero for an empty series.
    ///
    /// Callers are expected to pass an already-sorted series; picking from
    /// an unsorted one returns an arbitrary sample.
    pub fn pick(&self, q: f64) -> Duration {
        if self.0.is_empty() {
            return Duration::ZERO;
        }
        let idx = (q * (self.0.len() - 1) as f64).floor() as usize;
        self.0[idx.min(self.0.len() - 1)]
    }
}

impl From<Vec<Duration>> for LatencySeries {
    fn from(v: Vec<Duration>) -> Self {
        Self(v)
    }
}

impl Serialize for LatencySeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos: Vec<u64> = self.0.iter().map(|d| d.as_nanos() as u64).collect();
        nanos.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LatencySeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nanos = Vec::<u64>::deserialize(deserializer)?;
        Ok(Self(nanos.into_iter().map(Duration::from_nanos).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_of_ms(ms: &[u64]) -> LatencySeries {
        ms.iter().map(|&m| Duration::from_millis(m)).collect::<Vec<_>>().into()
    }

    #[test]
    fn pick_on_empty_is_zero() {
        assert_eq!(LatencySeries::new().pick(0.99), Duration::ZERO);
    }

    #[test]
    fn pick_uses_floor_index() {
        let s = series_of_ms(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).sorted();
        // floor(0.5 * 9) = 4 -> 5ms
        assert_eq!(s.pick(0.5), Duration::from_millis(5));
        // floor(0.9 * 9) = 8 -> 9ms
        assert_eq!(s.pick(0.9), Duration::from_millis(9));
        assert_eq!(s.pick(0.9999), Duration::from_millis(9));
    }

    #[test]
    fn sorted_is_transient() {
        let s = series_of_ms(&[5, 1, 3]);
        let sorted = s.sorted();
        assert_eq!(sorted.as_slice()[0], Duration::from_millis(1));
        // original keeps issue order
        assert_eq!(s.as_slice()[0], Duration::from_millis(5));
    }

    #[test]
    fn serde_is_nanoseconds() {
        let s = series_of_ms(&[1]);
        assert_eq!(serde_json::to_string(&s).unwrap(), "[1000000]");
        let back: LatencySeries = serde_json::from_str("[1000000]").unwrap();
        assert_eq!(back, s);
    }
}
