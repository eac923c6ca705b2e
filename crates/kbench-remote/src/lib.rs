//! Remote (in-cluster) execution of kbench workloads.
//!
//! The coordinator fans a workload out across M identical worker pods via a
//! parallel Job, waits for completion by polling pods, then reads each
//! shard's artifacts back from object storage and merges them into one
//! comparable summary per phase.

#![deny(missing_docs)]

mod collect;
mod coordinator;
mod job;

pub use collect::{collect_phase, CollectedPhase};
pub use coordinator::{wait_for_job, JobWaitConfig, ShardCoordinator};
pub use job::{render_job, JobSpecConfig};

use thiserror::Error;

/// Errors that abort a remote run.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A Kubernetes API call failed.
    #[error("kubernetes error during {op}: {message}")]
    Kube {
        /// Operation that failed (create job, list pods, ...).
        op: &'static str,
        /// Underlying error message.
        message: String,
    },

    /// The Job object reported the `Failed` condition.
    #[error("job {name} failed: {message}")]
    JobFailed {
        /// Job name.
        name: String,
        /// Condition message from the apiserver.
        message: String,
    },

    /// The run-level deadline elapsed before enough pods succeeded.
    #[error("job {name} deadline exceeded after {succeeded}/{target} completions")]
    DeadlineExceeded {
        /// Job name.
        name: String,
        /// Pods that reached the succeeded phase.
        succeeded: usize,
        /// Required completions.
        target: usize,
    },

    /// The operator stopped the run.
    #[error("remote run canceled")]
    Canceled,

    /// Artifact storage failed.
    #[error(transparent)]
    Store(#[from] kbench_store::StoreError),
}

impl RemoteError {
    pub(crate) fn kube(op: &'static str, err: kube::Error) -> Self {
        Self::Kube {
            op,
            message: err.to_string(),
        }
    }
}
