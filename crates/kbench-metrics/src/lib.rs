//! Latency metrics for kbench load runs.
//!
//! Every API call a worker issues is recorded once: a counter bump, a
//! histogram bucket increment, and a raw duration appended in issue order.
//! At the end of a run the sampler is snapshotted into a [`RequestsSummary`],
//! per-shard summaries are merged with [`aggregate`], and two runs are
//! diffed with [`compare`].
//!
//! Samplers are plain values handed down the call graph. Aggregation across
//! shards is value combination, never registry mutation.

#![deny(missing_docs)]

mod aggregate;
mod compare;
mod histogram;
mod sampler;
mod series;
mod summary;
mod table;

pub use aggregate::aggregate_summaries;
pub use compare::{merge_tagged, CounterDelta, LatencyDelta, RequestsCompare, TaggedDuration};
pub use histogram::{Histogram, HistogramBucket, HistogramDelta, HistogramDeltaBucket};
pub use sampler::{Outcome, Request, RequestKind, Sampler, SamplerSnapshot};
pub use series::LatencySeries;
pub use summary::RequestsSummary;

use thiserror::Error;

/// Errors from merging or decoding metric artifacts.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A histogram artifact carried a bucket bound outside the fixed layout.
    #[error("unknown histogram bucket upper bound {upper_bound_ms:?} ms")]
    BucketMismatch {
        /// The offending upper bound; `None` is the overflow bucket.
        upper_bound_ms: Option<f64>,
    },

    /// A JSON artifact failed to decode.
    #[error("failed to decode metrics artifact: {0}")]
    Decode(#[from] serde_json::Error),
}
