//! Mixed stress workload.
//!
//! The write phase alternates ConfigMap and Secret creates; the read phase
//! runs paged list scans across the configured namespaces until the
//! workload duration elapses. This exercises both the write path and the
//! pagination path of the apiserver in one run.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbench_client::{ensure_namespace, Caller, ClientError, ErrorKind};
use kbench_metrics::{RequestKind, Sampler, SamplerSnapshot};

use crate::payload::{random_alphanumeric, random_bytes, random_suffix};
use crate::LoaderError;

/// Log every Nth list round.
const LOG_EVERY: usize = 20;

/// Mixed stress parameters.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Namespace receiving writes; created if absent.
    pub namespace_write: String,
    /// Namespaces scanned by the read phase.
    pub namespaces_read: Vec<String>,
    /// Object name prefix.
    pub name_prefix: String,
    /// ConfigMap+Secret pairs to create; zero disables the write phase.
    pub objects: usize,
    /// Payload size per object in bytes.
    pub object_size: usize,
    /// Wall-clock budget for the read phase; zero means a single pass.
    pub duration: Duration,
}

/// Run the mixed stress workload.
pub async fn run_stress_driver(
    caller: &Caller,
    cfg: &StressConfig,
    cancel: &CancellationToken,
) -> Result<(SamplerSnapshot, SamplerSnapshot), LoaderError> {
    ensure_namespace(&caller.pool().next(), &cfg.namespace_write).await?;

    let write_sampler = Sampler::with_capacity(cfg.objects * 2);
    if cfg.object_size > 0 {
        let configmap_payload = random_alphanumeric(cfg.object_size);
        let secret_payload = random_bytes(cfg.object_size);
        let writes = caller.phase(RequestKind::Write, &write_sampler);
        info!(namespace = %cfg.namespace_write, objects = cfg.objects, "starting stress writes");
        'writes: for i in 0..cfg.objects {
            if cancel.is_cancelled() {
                warn!(iteration = i, "stress writes stopped");
                break;
            }
            // alternate shapes so both code paths stay hot on the server
            let pair = [
                (format!("{}cm{}{}", cfg.name_prefix, i, random_suffix()), true),
                (format!("{}sec{}{}", cfg.name_prefix, i, random_suffix()), false),
            ];
            for (name, is_configmap) in pair {
                let result = if is_configmap {
                    writes
                        .create_configmap(&cfg.namespace_write, &name, configmap_payload.clone())
                        .await
                } else {
                    writes
                        .create_secret(&cfg.namespace_write, &name, secret_payload.clone())
                        .await
                };
                match result {
                    Ok(()) => {}
                    Err(ClientError::Canceled) => break 'writes,
                    Err(e) if e.kind() == ErrorKind::Fatal => return Err(e.into()),
                    Err(e) => warn!(key = %name, error = %e, "stress write failed"),
                }
                if cancel.is_cancelled() {
                    break 'writes;
                }
            }
            if (i + 1) % LOG_EVERY == 0 {
                info!(iteration = i + 1, remaining = cfg.objects - i - 1, "stress writes");
            }
        }
    }

    let read_sampler = Sampler::with_capacity(4096);
    {
        let reads = caller.phase(RequestKind::Read, &read_sampler);
        let deadline = Instant::now() + cfg.duration;
        info!(
            namespaces = ?cfg.namespaces_read,
            duration = ?cfg.duration,
            "starting stress reads"
        );
        let mut round = 0usize;
        'reads: loop {
            if cancel.is_cancelled() {
                warn!(round, "stress reads stopped");
                break;
            }
            round += 1;

            if let Err(e) = reads.list_nodes().await {
                if scan_aborts(&e) {
                    warn!(error = %e, "stress reads aborted");
                    break;
                }
                warn!(error = %e, "list nodes failed");
            }
            for ns in &cfg.namespaces_read {
                if cancel.is_cancelled() {
                    break 'reads;
                }
                for result in [
                    reads.list_pods(ns).await.map(|_| ()),
                    reads.list_configmaps(ns).await.map(|_| ()),
                    reads.list_secrets(ns).await.map(|_| ()),
                ] {
                    if let Err(e) = result {
                        if scan_aborts(&e) {
                            warn!(namespace = %ns, error = %e, "stress reads aborted");
                            break 'reads;
                        }
                        warn!(namespace = %ns, error = %e, "list failed");
                    }
                }
            }
            if round % LOG_EVERY == 0 {
                info!(round, "stress read rounds");
            }
            if Instant::now() >= deadline {
                break;
            }
        }
    }

    Ok((write_sampler.snapshot(), read_sampler.snapshot()))
}

/// Errors that end the read loop rather than the single scan.
fn scan_aborts(e: &ClientError) -> bool {
    matches!(e, ClientError::Canceled) || e.kind() == ErrorKind::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_aborts_the_read_loop() {
        assert!(scan_aborts(&ClientError::Canceled));
        assert!(!scan_aborts(&ClientError::Api {
            kind: ErrorKind::Transient,
            verb: "list",
            resource: "pods",
            key: "pods".to_string(),
            message: "reset".to_string(),
        }));
    }
}
