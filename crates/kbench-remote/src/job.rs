//! Worker Job rendering.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Parameters for the parallel worker Job.
#[derive(Debug, Clone)]
pub struct JobSpecConfig {
    /// Job name; pods are matched back by the `job-name` label.
    pub name: String,
    /// Namespace the Job and its pods run in.
    pub namespace: String,
    /// Worker image, pulled from the configured registry.
    pub image: String,
    /// Number of shards.
    pub completions: i32,
    /// Shards running at once; normally equal to `completions` so every
    /// shard runs in parallel.
    pub parallelism: i32,
    /// Full worker command line: the driver flags plus per-shard artifact
    /// output prefixes.
    pub command: Vec<String>,
    /// Service account granting the workers API access.
    pub service_account: Option<String>,
}

/// Render the typed Job manifest: `completions` parallel, identical workers.
pub fn render_job(cfg: &JobSpecConfig) -> Job {
    let labels = BTreeMap::from([
        ("app".to_string(), cfg.name.clone()),
        ("name".to_string(), cfg.name.clone()),
    ]);
    Job {
        metadata: ObjectMeta {
            name: Some(cfg.name.clone()),
            namespace: Some(cfg.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            completions: Some(cfg.completions),
            parallelism: Some(cfg.parallelism),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: cfg.service_account.clone(),
                    restart_policy: Some("OnFailure".to_string()),
                    containers: vec![Container {
                        name: "kbench".to_string(),
                        image: Some(cfg.image.clone()),
                        image_pull_policy: Some("Always".to_string()),
                        command: Some(cfg.command.clone()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JobSpecConfig {
        JobSpecConfig {
            name: "kbench-secrets".to_string(),
            namespace: "kbench-load".to_string(),
            image: "registry.example.com/kbench:latest".to_string(),
            completions: 10,
            parallelism: 10,
            command: vec![
                "/kbench".to_string(),
                "create".to_string(),
                "secrets".to_string(),
                "--objects=100".to_string(),
            ],
            service_account: Some("kbench".to_string()),
        }
    }

    #[test]
    fn completions_equal_parallelism() {
        let job = render_job(&config());
        let spec = job.spec.unwrap();
        assert_eq!(spec.completions, Some(10));
        assert_eq!(spec.parallelism, Some(10));
    }

    #[test]
    fn workers_share_one_command_line() {
        let job = render_job(&config());
        let pod = job.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
        let container = &pod.containers[0];
        assert_eq!(
            container.command.as_ref().unwrap()[2],
            "secrets".to_string()
        );
        assert_eq!(pod.service_account_name.as_deref(), Some("kbench"));
    }
}
