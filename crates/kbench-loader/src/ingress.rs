//! Ingress HTTP QPS workload.
//!
//! Unlike the API workloads this one is fan-out: a fixed set of HTTP
//! workers hammer the ingress test server concurrently, sharing one request
//! counter and one sampler. The payload is whatever the server returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbench_metrics::{Outcome, Request, RequestKind, Sampler, SamplerSnapshot};

use crate::LoaderError;

/// Log progress every Nth request (across all workers).
const LOG_EVERY: u64 = 1000;

/// Ingress QPS parameters.
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// URL of the ingress test server.
    pub target_url: String,
    /// Concurrent HTTP workers.
    pub concurrency: usize,
    /// Wall-clock budget for the run.
    pub duration: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// End-of-run state of the ingress workload.
#[derive(Debug)]
pub struct IngressOutput {
    /// Shared sampler snapshot across all workers.
    pub requests: SamplerSnapshot,
    /// Total requests issued.
    pub issued: u64,
}

/// Run the ingress HTTP QPS workload.
pub async fn run_ingress_driver(
    cfg: &IngressConfig,
    cancel: &CancellationToken,
) -> Result<IngressOutput, LoaderError> {
    if cfg.concurrency == 0 {
        return Err(LoaderError::InvalidConfig(
            "ingress concurrency must be at least 1".to_string(),
        ));
    }

    let client = reqwest::Client::builder()
        .timeout(cfg.timeout)
        .build()?;

    // rough per-worker capacity guess; the buffer grows if the server is fast
    let est = (cfg.duration.as_secs() as usize).saturating_mul(100).max(1024);
    let sampler = Arc::new(Sampler::with_capacity(est));
    let counter = Arc::new(AtomicU64::new(0));
    let deadline = TokioInstant::now() + cfg.duration;

    info!(
        target = %cfg.target_url,
        concurrency = cfg.concurrency,
        duration = ?cfg.duration,
        "starting ingress load"
    );

    let mut workers = Vec::with_capacity(cfg.concurrency);
    for worker in 0..cfg.concurrency {
        let client = client.clone();
        let sampler = sampler.clone();
        let counter = counter.clone();
        let cancel = cancel.clone();
        let url = cfg.target_url.clone();
        workers.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() || TokioInstant::now() >= deadline {
                    break;
                }
                let start = Instant::now();
                let outcome = match client.get(&url).send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        // drain the body so keep-alive connections get reused
                        let body_ok = resp.bytes().await.is_ok();
                        if status.is_success() && body_ok {
                            Outcome::Success
                        } else {
                            Outcome::Failure
                        }
                    }
                    Err(_) => Outcome::Failure,
                };
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                sampler.observe(&Request {
                    kind: RequestKind::Read,
                    key: url.clone(),
                    payload_bytes: 0,
                    start,
                    duration: start.elapsed(),
                    outcome,
                    error_kind: (outcome == Outcome::Failure).then_some("transient"),
                });
                if n % LOG_EVERY == 0 {
                    info!(worker, requests = n, "ingress progress");
                }
            }
        }));
    }

    for w in workers {
        if let Err(e) = w.await {
            warn!(error = %e, "ingress worker panicked");
        }
    }

    let issued = counter.load(Ordering::Relaxed);
    let sampler = Arc::try_unwrap(sampler)
        .unwrap_or_else(|_| unreachable!("all ingress workers joined"));
    info!(issued, "ingress load complete");
    Ok(IngressOutput {
        requests: sampler.snapshot(),
        issued,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let cfg = IngressConfig {
            target_url: "http://127.0.0.1:1".to_string(),
            concurrency: 0,
            duration: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        };
        let err = run_ingress_driver(&cfg, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_workers_promptly() {
        let cfg = IngressConfig {
            target_url: "http://127.0.0.1:1".to_string(),
            concurrency: 2,
            duration: Duration::from_secs(60),
            timeout: Duration::from_millis(100),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Instant::now();
        let out = run_ingress_driver(&cfg, &cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            out.requests.success_total + out.requests.failure_total,
            out.issued
        );
    }
}
