//! Write-then-read object driver for Secrets and ConfigMaps.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbench_client::{ensure_namespace, Caller, ClientError, ErrorKind};
use kbench_metrics::{RequestKind, Sampler, SamplerSnapshot};

use crate::payload::{random_alphanumeric, random_bytes};
use crate::LoaderError;

/// Abort the write phase after this many consecutive failures; a broken
/// apiserver doesn't need N more create attempts to prove it.
const WRITE_FAIL_THRESHOLD: usize = 20;

/// Log every Nth operation.
const LOG_EVERY: usize = 20;

/// The two object shapes a driver creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Opaque Secrets with one binary data field.
    Secret,
    /// ConfigMaps with one string data field.
    ConfigMap,
}

impl ObjectKind {
    /// Workload label used in logs, artifact names, and metric names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secret => "secrets",
            Self::ConfigMap => "configmaps",
        }
    }
}

/// One driver's parameters. Passed by value at construction; drivers never
/// mutate shared configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Namespace receiving the objects; created if absent.
    pub namespace: String,
    /// Object name prefix; object `i` is named `<name_prefix><i>`.
    pub name_prefix: String,
    /// Number of objects to write then read back.
    pub objects: usize,
    /// Payload size per object in bytes.
    pub object_size: usize,
}

/// End-of-run state of one driver.
#[derive(Debug)]
pub struct DriverOutput {
    /// Write-phase sampler snapshot.
    pub writes: SamplerSnapshot,
    /// Read-phase sampler snapshot.
    pub reads: SamplerSnapshot,
    /// Keys whose create succeeded, in issue order.
    pub written_keys: Vec<String>,
}

/// Run one write-then-read workload.
///
/// The write phase creates `objects` objects named `<name_prefix><i>`, then
/// the read phase gets every successfully-written key back in issue order.
/// Individual request failures are sampled and logged, never fatal. The
/// stop signal is honored between calls; an in-flight call always completes.
pub async fn run_object_driver(
    caller: &Caller,
    kind: ObjectKind,
    cfg: &DriverConfig,
    cancel: &CancellationToken,
) -> Result<DriverOutput, LoaderError> {
    if cfg.name_prefix.is_empty() {
        return Err(LoaderError::InvalidConfig(
            "name prefix must not be empty".to_string(),
        ));
    }

    ensure_namespace(&caller.pool().next(), &cfg.namespace).await?;

    info!(
        workload = kind.as_str(),
        namespace = %cfg.namespace,
        objects = cfg.objects,
        object_size = cfg.object_size,
        "starting writes"
    );

    // one payload for the whole run
    let secret_payload = random_bytes(cfg.object_size);
    let configmap_payload = random_alphanumeric(cfg.object_size);

    let write_sampler = Sampler::with_capacity(cfg.objects);
    let mut written_keys = Vec::with_capacity(cfg.objects);
    let mut consecutive_failures = 0usize;
    {
        let writes = caller.phase(RequestKind::Write, &write_sampler);
        for i in 0..cfg.objects {
            if cancel.is_cancelled() {
                warn!(workload = kind.as_str(), iteration = i, "writes stopped");
                break;
            }
            let name = format!("{}{}", cfg.name_prefix, i);
            let result = match kind {
                ObjectKind::Secret => {
                    writes
                        .create_secret(&cfg.namespace, &name, secret_payload.clone())
                        .await
                }
                ObjectKind::ConfigMap => {
                    writes
                        .create_configmap(&cfg.namespace, &name, configmap_payload.clone())
                        .await
                }
            };
            match result {
                Ok(()) => {
                    consecutive_failures = 0;
                    written_keys.push(name);
                    if (i + 1) % LOG_EVERY == 0 {
                        info!(
                            workload = kind.as_str(),
                            iteration = i + 1,
                            remaining = cfg.objects - i - 1,
                            "wrote objects"
                        );
                    }
                }
                Err(ClientError::Canceled) => break,
                Err(e) if e.kind() == ErrorKind::Fatal => {
                    warn!(workload = kind.as_str(), key = %name, error = %e, "fatal write error");
                    return Err(e.into());
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(workload = kind.as_str(), key = %name, error = %e, "write failed");
                    if consecutive_failures >= WRITE_FAIL_THRESHOLD {
                        warn!(
                            workload = kind.as_str(),
                            consecutive_failures, "too many consecutive write failures, aborting writes"
                        );
                        break;
                    }
                }
            }
        }
    }

    info!(
        workload = kind.as_str(),
        written = written_keys.len(),
        "starting reads"
    );

    let read_sampler = Sampler::with_capacity(written_keys.len());
    {
        let reads = caller.phase(RequestKind::Read, &read_sampler);
        for (i, name) in written_keys.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(workload = kind.as_str(), iteration = i, "reads stopped");
                break;
            }
            let result = match kind {
                ObjectKind::Secret => reads.get_secret(&cfg.namespace, name).await,
                ObjectKind::ConfigMap => reads.get_configmap(&cfg.namespace, name).await,
            };
            match result {
                Ok(()) => {
                    if (i + 1) % LOG_EVERY == 0 {
                        info!(
                            workload = kind.as_str(),
                            iteration = i + 1,
                            remaining = written_keys.len() - i - 1,
                            "read objects"
                        );
                    }
                }
                Err(ClientError::Canceled) => break,
                Err(e) => {
                    warn!(workload = kind.as_str(), key = %name, error = %e, "read failed");
                }
            }
        }
    }

    let out = DriverOutput {
        writes: write_sampler.snapshot(),
        reads: read_sampler.snapshot(),
        written_keys,
    };
    info!(
        workload = kind.as_str(),
        writes_success = out.writes.success_total,
        writes_failure = out.writes.failure_total,
        reads_success = out.reads.success_total,
        reads_failure = out.reads.failure_total,
        "workload complete"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(ObjectKind::Secret.as_str(), "secrets");
        assert_eq!(ObjectKind::ConfigMap.as_str(), "configmaps");
    }

    #[tokio::test]
    async fn empty_prefix_is_rejected_before_any_call() {
        // a client pointed at an unroutable endpoint; validation fires first
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        let client = kube::Client::try_from(config).unwrap();
        let pool = kbench_client::ClientPool::from_clients(vec![client]).unwrap();
        let caller = Caller::new(
            pool,
            kbench_client::CallerConfig::default(),
            CancellationToken::new(),
        );
        let cfg = DriverConfig {
            namespace: "default".to_string(),
            name_prefix: String::new(),
            objects: 1,
            object_size: 1,
        };
        let err = run_object_driver(&caller, ObjectKind::Secret, &cfg, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidConfig(_)));
    }
}
