//! Rate-limited Kubernetes API access for kbench load drivers.
//!
//! Every API call funnels through one path: wait on the token bucket,
//! attach the per-call deadline, issue against the next client in the
//! round-robin pool, classify the result, retry transient kinds, and report
//! exactly one `(duration, outcome)` observation to the phase sampler.

#![deny(missing_docs)]

mod caller;
mod error;
mod limiter;
mod namespace;
mod pool;
mod retry;

pub use caller::{Caller, CallerConfig, PhaseCaller};
pub use error::{classify, ClientError, ErrorKind};
pub use limiter::RateLimiter;
pub use namespace::{delete_namespace, ensure_namespace};
pub use pool::ClientPool;
pub use retry::RetryPolicy;
