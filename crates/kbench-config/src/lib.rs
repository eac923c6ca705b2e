//! Run configuration.
//!
//! One YAML document carries every knob for a run. The document is written
//! back to its source path after every field mutation, so an interrupted
//! orchestrator can be restarted against the same file and pick up where it
//! left off. Drivers receive plain values copied out of this document and
//! never mutate it; persistence is the orchestrator's job alone.

#![deny(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration errors are always fatal: a run with bad parameters must
/// not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the document failed.
    #[error("config i/o failed for {path:?}: {source}")]
    Io {
        /// File path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML for this schema.
    #[error("config parse failed for {path:?}: {source}")]
    Parse {
        /// File path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A field value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Kubernetes client tuning shared by every driver of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClientSection {
    /// Size of the round-robin client pool.
    pub clients: usize,
    /// Token-bucket fill rate in requests per second.
    pub client_qps: f64,
    /// Token-bucket capacity.
    pub client_burst: u32,
    /// Per-call deadline.
    #[serde(with = "humantime_serde")]
    pub client_timeout: Duration,
    /// Items per list page.
    pub list_batch: u32,
    /// Sleep between list pages.
    #[serde(with = "humantime_serde")]
    pub list_interval: Duration,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            clients: 5,
            client_qps: 15.0,
            client_burst: 30,
            client_timeout: Duration::from_secs(30),
            list_batch: 1000,
            list_interval: Duration::from_secs(5),
        }
    }
}

/// What the workers generate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkloadSection {
    /// Workload kind: `secrets`, `configmaps`, `stress`, or `ingress`.
    pub kind: String,
    /// Namespace receiving the generated objects.
    pub namespace: String,
    /// Object name prefix; workers add their own unique suffix.
    pub name_prefix: String,
    /// Objects per shard.
    pub objects: usize,
    /// Payload size per object in bytes.
    pub object_size: usize,
    /// Wall-clock budget for duration-bound workloads.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Target URL for the ingress workload.
    pub target_url: String,
    /// Concurrent HTTP workers for the ingress workload.
    pub concurrency: usize,
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            kind: "secrets".to_string(),
            namespace: "kbench-load".to_string(),
            name_prefix: "kbench".to_string(),
            objects: 100,
            object_size: 1024,
            duration: Duration::from_secs(0),
            target_url: String::new(),
            concurrency: 10,
        }
    }
}

/// Remote (in-cluster) execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RemoteSection {
    /// Worker image pulled by the job pods.
    pub image: String,
    /// Number of shards; every shard runs in parallel.
    pub completes: usize,
    /// Job parallelism; normally equal to `completes`.
    pub parallels: usize,
    /// Namespace the Job runs in.
    pub job_namespace: String,
    /// Service account granting workers API access.
    pub service_account: String,
    /// Grace period before the first completion poll.
    #[serde(with = "humantime_serde")]
    pub initial_wait: Duration,
    /// Interval between completion polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            image: String::new(),
            completes: 5,
            parallels: 5,
            job_namespace: "kbench-system".to_string(),
            service_account: "kbench".to_string(),
            initial_wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Artifact storage and metric publishing targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreSection {
    /// S3 bucket holding run artifacts; empty disables uploads.
    pub bucket_name: String,
    /// AWS region override; empty uses the environment.
    pub region: String,
    /// CloudWatch metric namespace; empty disables publishing.
    pub metric_namespace: String,
}

/// Where a run currently stands. Persisted so restarts are recoverable and
/// failures are visible without log digging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    /// No run has started against this document.
    #[default]
    Idle,
    /// A run is in progress.
    Started,
    /// The last run completed and uploaded its artifacts.
    Succeeded,
    /// The last run aborted; see `error`.
    Failed,
}

/// Persisted status record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Status {
    /// Current run state.
    pub state: RunState,
    /// Error message of the last failure, if any.
    pub error: String,
    /// Test id of the last run.
    pub last_test_id: String,
}

/// The whole run document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Run name; used as the root prefix for bucket keys.
    pub name: String,
    /// Kubeconfig path; empty infers in-cluster or environment config.
    pub kubeconfig: String,
    /// Client tuning.
    pub client: ClientSection,
    /// Workload shape.
    pub workload: WorkloadSection,
    /// Remote execution.
    pub remote: RemoteSection,
    /// Storage and publishing.
    pub store: StoreSection,
    /// Run status, updated as the run progresses.
    pub status: Status,

    /// Source path; set by [`Config::load`], never serialized.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "kbench".to_string(),
            kubeconfig: String::new(),
            client: ClientSection::default(),
            workload: WorkloadSection::default(),
            remote: RemoteSection::default(),
            store: StoreSection::default(),
            status: Status::default(),
            path: None,
        }
    }
}

impl Config {
    /// Load and validate a document, remembering its path for [`sync`].
    ///
    /// [`sync`]: Config::sync
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut cfg: Config = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        cfg.path = Some(path.to_path_buf());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist the document back to its source path. A no-op for documents
    /// built in memory.
    pub fn sync(&self) -> Result<(), ConfigError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let text = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(path, text).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(path = %path.display(), "synced config");
        Ok(())
    }

    /// Record a state change and persist it.
    pub fn set_status(&mut self, state: RunState, error: impl Into<String>) -> Result<(), ConfigError> {
        self.status.state = state;
        self.status.error = error.into();
        self.sync()
    }

    /// Reject out-of-range or inconsistent parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.client.clients == 0 {
            return Err(ConfigError::Invalid(
                "client.clients must be at least 1".to_string(),
            ));
        }
        if self.client.client_burst == 0 {
            return Err(ConfigError::Invalid(
                "client.client-burst must be at least 1".to_string(),
            ));
        }
        if self.remote.completes == 0 {
            return Err(ConfigError::Invalid(
                "remote.completes must be at least 1".to_string(),
            ));
        }
        if self.remote.parallels > self.remote.completes {
            return Err(ConfigError::Invalid(
                "remote.parallels must not exceed remote.completes".to_string(),
            ));
        }
        match self.workload.kind.as_str() {
            "secrets" | "configmaps" | "stress" => {}
            "ingress" => {
                if self.workload.target_url.is_empty() {
                    return Err(ConfigError::Invalid(
                        "workload.target-url is required for the ingress kind".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown workload kind {other:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn load_sync_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        let doc = "name: load-a\nworkload:\n  kind: configmaps\n  objects: 42\n";
        std::fs::write(&path, doc).unwrap();

        let mut cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.workload.objects, 42);
        assert_eq!(cfg.workload.kind, "configmaps");
        // untouched sections come from defaults
        assert_eq!(cfg.client.clients, 5);

        cfg.set_status(RunState::Started, "").unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.status.state, RunState::Started);
        assert_eq!(reloaded.workload.objects, 42);
    }

    #[test]
    fn bad_kind_is_rejected() {
        let mut cfg = Config::default();
        cfg.workload.kind = "deployments".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ingress_requires_target() {
        let mut cfg = Config::default();
        cfg.workload.kind = "ingress".to_string();
        assert!(cfg.validate().is_err());
        cfg.workload.target_url = "http://ingress.example.com/".to_string();
        cfg.validate().unwrap();
    }

    #[test]
    fn parallels_bounded_by_completes() {
        let mut cfg = Config::default();
        cfg.remote.parallels = cfg.remote.completes + 1;
        assert!(cfg.validate().is_err());
    }
}
