//! Run artifact storage and metric publishing.
//!
//! Artifacts (raw latency series, summaries, comparison tables) live in one
//! S3 bucket under well-known per-workload prefixes; the newest prior
//! summary under a compare prefix is the baseline for the next run. Latency
//! percentiles additionally go to CloudWatch, where dashboards trend them
//! across runs.

#![deny(missing_docs)]

mod baseline;
mod cloudwatch;
mod paths;
mod s3;

pub use baseline::{find_baseline, Baseline};
pub use cloudwatch::MetricPublisher;
pub use paths::{shard_suffix, Phase, WorkloadPaths};
pub use s3::{ListedObject, S3Store};

use thiserror::Error;

/// Errors from artifact storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An S3 request failed.
    #[error("s3 {op} failed for {key:?}: {message}")]
    S3 {
        /// Operation name (put, get, list).
        op: &'static str,
        /// Object key or prefix.
        key: String,
        /// Underlying error message.
        message: String,
    },

    /// Local filesystem I/O while staging artifacts failed.
    #[error("artifact i/o failed for {path:?}: {source}")]
    Io {
        /// Local path involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A downloaded artifact failed to decode.
    #[error("failed to decode artifact {key:?}: {message}")]
    Decode {
        /// Object key the artifact came from.
        key: String,
        /// Underlying error message.
        message: String,
    },
}
