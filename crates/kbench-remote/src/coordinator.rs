//! Job launch and completion polling.

use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::job::JobSpecConfig;
use crate::{render_job, RemoteError};

/// Completion polling parameters.
#[derive(Debug, Clone)]
pub struct JobWaitConfig {
    /// Grace period before the first poll, covering image pulls and pod
    /// scheduling.
    pub initial_wait: Duration,
    /// Interval between pod polls.
    pub poll_interval: Duration,
    /// Pods that must reach the succeeded phase.
    pub completions: usize,
    /// Objects per shard, scaling the run deadline.
    pub objects: usize,
    /// Also match pods by name prefix; CronJob pods carry a generated
    /// job-name label, so the prefix is the only stable handle.
    pub match_name_prefix: bool,
}

impl JobWaitConfig {
    /// Reasonable defaults for `completions` shards of `objects` objects.
    pub fn new(completions: usize, objects: usize) -> Self {
        Self {
            initial_wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(15),
            completions,
            objects,
            match_name_prefix: false,
        }
    }

    /// Run deadline: initial wait, plus five minutes per completion, plus a
    /// minute per hundred objects.
    pub fn deadline(&self) -> Duration {
        self.initial_wait
            + Duration::from_secs(300) * self.completions as u32
            + Duration::from_secs(60) * (self.objects / 100) as u32
    }
}

/// Launches the worker Job and tracks it to completion.
pub struct ShardCoordinator {
    client: Client,
    namespace: String,
    cancel: CancellationToken,
}

impl ShardCoordinator {
    /// A coordinator for jobs in `namespace`.
    pub fn new(client: Client, namespace: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            cancel,
        }
    }

    /// Render and create the worker Job.
    pub async fn launch(&self, cfg: &JobSpecConfig) -> Result<(), RemoteError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
        let job = render_job(cfg);
        api.create(&PostParams::default(), &job)
            .await
            .map_err(|e| RemoteError::kube("create job", e))?;
        info!(
            job = %cfg.name,
            namespace = %self.namespace,
            completions = cfg.completions,
            "created worker job"
        );
        Ok(())
    }

    /// Wait until the job completes, fails, or the run deadline elapses.
    /// Returns the final pod list so callers can report per-shard status.
    pub async fn wait(&self, job_name: &str, cfg: &JobWaitConfig) -> Result<Vec<Pod>, RemoteError> {
        wait_for_job(
            self.client.clone(),
            &self.namespace,
            job_name,
            cfg,
            &self.cancel,
        )
        .await
    }

    /// Delete the Job; absent is success so cleanup is idempotent. Running
    /// pods are left to the operator.
    pub async fn delete_job(&self, job_name: &str) -> Result<(), RemoteError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.delete(job_name, &DeleteParams::foreground()).await {
            Ok(_) => {
                info!(job = %job_name, "deleted worker job");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                info!(job = %job_name, "worker job already absent");
                Ok(())
            }
            Err(e) => Err(RemoteError::kube("delete job", e)),
        }
    }
}

/// True when the pod belongs to the job, by `job-name` label or (for the
/// CronJob variant) by name prefix.
fn pod_matches(pod: &Pod, job_name: &str, match_name_prefix: bool) -> bool {
    let by_label = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get("job-name"))
        .is_some_and(|v| v == job_name);
    by_label || (match_name_prefix && pod.name_any().starts_with(job_name))
}

fn pod_succeeded(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|p| p == "Succeeded")
}

/// Poll pods until at least `completions` of the job's pods succeed or the
/// Job object reports a terminal condition.
pub async fn wait_for_job(
    client: Client,
    namespace: &str,
    job_name: &str,
    cfg: &JobWaitConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Pod>, RemoteError> {
    let deadline = Instant::now() + cfg.deadline();
    info!(
        job = %job_name,
        namespace,
        completions = cfg.completions,
        initial_wait = %humantime::format_duration(cfg.initial_wait),
        poll_interval = %humantime::format_duration(cfg.poll_interval),
        deadline = %humantime::format_duration(cfg.deadline()),
        "waiting for job completion"
    );

    tokio::select! {
        _ = cancel.cancelled() => return Err(RemoteError::Canceled),
        _ = tokio::time::sleep(cfg.initial_wait) => {}
    }

    let pods_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let jobs_api: Api<Job> = Api::namespaced(client, namespace);
    let mut last_pods: Vec<Pod> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(RemoteError::Canceled);
        }

        match pods_api.list(&ListParams::default()).await {
            Ok(list) => {
                last_pods = list
                    .items
                    .into_iter()
                    .filter(|p| pod_matches(p, job_name, cfg.match_name_prefix))
                    .collect();
                let succeeded = last_pods.iter().filter(|p| pod_succeeded(p)).count();
                info!(
                    job = %job_name,
                    pods = last_pods.len(),
                    succeeded,
                    target = cfg.completions,
                    "polled job pods"
                );
                if succeeded >= cfg.completions {
                    return Ok(last_pods);
                }
            }
            Err(e) => warn!(job = %job_name, error = %e, "failed to list job pods"),
        }

        match jobs_api.get(job_name).await {
            Ok(job) => {
                if let Some(conditions) = job.status.as_ref().and_then(|s| s.conditions.as_ref()) {
                    for cond in conditions {
                        if cond.status != "True" {
                            continue;
                        }
                        match cond.type_.as_str() {
                            "Failed" => {
                                return Err(RemoteError::JobFailed {
                                    name: job_name.to_string(),
                                    message: cond.message.clone().unwrap_or_default(),
                                });
                            }
                            "Complete" => {
                                info!(job = %job_name, "job reported complete");
                                return Ok(last_pods);
                            }
                            _ => {}
                        }
                    }
                }
            }
            Err(e) => warn!(job = %job_name, error = %e, "failed to get job object"),
        }

        if Instant::now() >= deadline {
            let succeeded = last_pods.iter().filter(|p| pod_succeeded(p)).count();
            return Err(RemoteError::DeadlineExceeded {
                name: job_name.to_string(),
                succeeded,
                target: cfg.completions,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Canceled),
            _ = tokio::time::sleep(cfg.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod(name: &str, job_label: Option<&str>, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: job_label.map(|j| {
                    BTreeMap::from([("job-name".to_string(), j.to_string())])
                }),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pods_match_by_job_label() {
        let p = pod("worker-abc", Some("loadjob"), "Running");
        assert!(pod_matches(&p, "loadjob", false));
        assert!(!pod_matches(&p, "otherjob", false));
    }

    #[test]
    fn cronjob_pods_match_by_name_prefix() {
        let p = pod("loadjob-1593205200-2t2tv", Some("loadjob-1593205200"), "Succeeded");
        assert!(!pod_matches(&p, "loadjob", false));
        assert!(pod_matches(&p, "loadjob", true));
    }

    #[test]
    fn succeeded_phase_is_detected() {
        assert!(pod_succeeded(&pod("p", None, "Succeeded")));
        assert!(!pod_succeeded(&pod("p", None, "Running")));
    }

    #[test]
    fn deadline_scales_with_completions_and_objects() {
        let cfg = JobWaitConfig::new(10, 1000);
        // 30s + 10*5min + 10*1min
        assert_eq!(
            cfg.deadline(),
            Duration::from_secs(30) + Duration::from_secs(3000) + Duration::from_secs(600)
        );
    }
}
