//! Workload drivers.
//!
//! A driver is single-threaded and cooperative: it issues one call, checks
//! the stop signal, then issues the next. Parallelism comes from running
//! many drivers, one per worker shard. All cluster traffic goes through the
//! rate-limited caller so every request lands in the phase sampler.

#![deny(missing_docs)]

mod driver;
mod ingress;
mod payload;
mod stress;

pub use driver::{run_object_driver, DriverConfig, DriverOutput, ObjectKind};
pub use ingress::{run_ingress_driver, IngressConfig, IngressOutput};
pub use payload::{random_alphanumeric, random_bytes, random_suffix};
pub use stress::{run_stress_driver, StressConfig};

use thiserror::Error;

/// Errors that abort a workload (individual request failures never do).
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Namespace setup or another pre-flight call failed.
    #[error(transparent)]
    Client(#[from] kbench_client::ClientError),

    /// The HTTP client for the ingress workload could not be built.
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid workload parameters.
    #[error("invalid workload configuration: {0}")]
    InvalidConfig(String),
}
