//! Remote-run orchestration.
//!
//! Loads the run document, launches the worker Job, waits for completion,
//! collects and aggregates shard artifacts, compares against the stored
//! baseline, archives the aggregate for future comparisons, and publishes
//! percentiles. Status transitions are persisted into the document as they
//! happen so a crashed orchestrator leaves a readable trail.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbench_client::{ensure_namespace, ClientPool};
use kbench_config::{Config, RunState};
use kbench_metrics::{merge_tagged, LatencySeries, RequestsCompare, RequestsSummary};
use kbench_remote::{collect_phase, JobSpecConfig, JobWaitConfig, RemoteError, ShardCoordinator};
use kbench_store::{find_baseline, MetricPublisher, Phase, S3Store, WorkloadPaths};

/// Flags for `run remote`.
#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Path to the run configuration YAML.
    #[arg(short = 'f', long = "config")]
    pub config_file: PathBuf,
}

/// Orchestrate one remote run, recording final status into the document.
pub async fn run_remote(args: &RemoteArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut cfg = Config::load(&args.config_file)?;
    cfg.set_status(RunState::Started, "")?;

    match orchestrate(&mut cfg, cancel).await {
        Ok(()) => {
            cfg.set_status(RunState::Succeeded, "")?;
            Ok(())
        }
        Err(e) => {
            cfg.set_status(RunState::Failed, e.to_string())?;
            Err(e)
        }
    }
}

fn worker_command(cfg: &Config, paths: &WorkloadPaths) -> Vec<String> {
    let w = &cfg.workload;
    let c = &cfg.client;
    let mut cmd = vec![
        "/kbench".to_string(),
        "create".to_string(),
        w.kind.clone(),
        format!("--namespace={}", w.namespace),
        format!("--name-prefix={}", w.name_prefix),
        format!("--objects={}", w.objects),
        format!("--object-size={}", w.object_size),
        format!("--clients={}", c.clients),
        format!("--client-qps={}", c.client_qps),
        format!("--client-burst={}", c.client_burst),
        format!("--client-timeout={}", humantime::format_duration(c.client_timeout)),
        format!("--s3-bucket-name={}", cfg.store.bucket_name),
        format!("--requests-raw-writes-json-s3-dir={}", paths.raw_dir(Phase::Writes)),
        format!(
            "--requests-summary-writes-json-s3-dir={}",
            paths.summary_dir(Phase::Writes)
        ),
        format!("--requests-raw-reads-json-s3-dir={}", paths.raw_dir(Phase::Reads)),
        format!(
            "--requests-summary-reads-json-s3-dir={}",
            paths.summary_dir(Phase::Reads)
        ),
        "--writes-output-name-prefix=shard".to_string(),
        "--reads-output-name-prefix=shard".to_string(),
    ];
    if !cfg.store.region.is_empty() {
        cmd.push(format!("--s3-region={}", cfg.store.region));
    }
    if w.kind == "stress" {
        cmd.push(format!("--list-batch={}", c.list_batch));
        cmd.push(format!(
            "--list-interval={}",
            humantime::format_duration(c.list_interval)
        ));
        cmd.push(format!(
            "--duration={}",
            humantime::format_duration(w.duration)
        ));
    }
    cmd
}

async fn orchestrate(cfg: &mut Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let test_id = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    cfg.status.last_test_id = test_id.clone();
    cfg.sync()?;
    info!(test_id = %test_id, workload = %cfg.workload.kind, "starting remote run");

    let kubeconfig = (!cfg.kubeconfig.is_empty()).then(|| PathBuf::from(&cfg.kubeconfig));
    let pool = ClientPool::build(1, kubeconfig.as_deref()).await?;
    let client = pool.next();

    ensure_namespace(&client, &cfg.remote.job_namespace).await?;

    let paths = WorkloadPaths::with_root(&cfg.name, &cfg.workload.kind);
    let region = (!cfg.store.region.is_empty()).then(|| cfg.store.region.clone());
    let store = S3Store::connect(cfg.store.bucket_name.clone(), region.clone()).await;

    let job_name = format!("kbench-{}", cfg.workload.kind);
    let coordinator = ShardCoordinator::new(client, cfg.remote.job_namespace.clone(), cancel.clone());
    coordinator
        .launch(&JobSpecConfig {
            name: job_name.clone(),
            namespace: cfg.remote.job_namespace.clone(),
            image: cfg.remote.image.clone(),
            completions: cfg.remote.completes as i32,
            parallelism: cfg.remote.parallels as i32,
            command: worker_command(cfg, &paths),
            service_account: (!cfg.remote.service_account.is_empty())
                .then(|| cfg.remote.service_account.clone()),
        })
        .await?;

    let wait = JobWaitConfig {
        initial_wait: cfg.remote.initial_wait,
        poll_interval: cfg.remote.poll_interval,
        completions: cfg.remote.completes,
        objects: cfg.workload.objects,
        match_name_prefix: false,
    };
    match coordinator.wait(&job_name, &wait).await {
        Ok(pods) => info!(pods = pods.len(), "worker job finished"),
        // a blown deadline still leaves partial shard artifacts worth collecting
        Err(RemoteError::DeadlineExceeded {
            succeeded, target, ..
        }) => warn!(succeeded, target, "job deadline exceeded; collecting partial artifacts"),
        Err(e) => {
            let _ = coordinator.delete_job(&job_name).await;
            return Err(e.into());
        }
    }

    for phase in [Phase::Writes, Phase::Reads] {
        let collected = collect_phase(&store, &paths, phase, &test_id, cfg.remote.completes).await?;
        println!("{}", collected.summary.table());
        finish_phase(&store, &paths, phase, &test_id, &collected.summary, &collected.raw).await?;
        publish_phase(cfg, phase, &collected.summary, region.clone()).await;
    }

    coordinator.delete_job(&job_name).await?;
    info!(test_id = %test_id, "remote run complete");
    Ok(())
}

/// Compare one phase against its baseline, then archive the aggregate.
async fn finish_phase(
    store: &S3Store,
    paths: &WorkloadPaths,
    phase: Phase,
    test_id: &str,
    summary: &RequestsSummary,
    raw: &LatencySeries,
) -> anyhow::Result<()> {
    match find_baseline(store, paths, phase, test_id).await {
        Ok(Some(baseline)) => {
            let compare = RequestsCompare::new(baseline.summary.clone(), summary.clone());
            println!("{}", compare.table());

            store
                .upload_bytes(
                    &paths.compare_result_key(phase, &format!("{test_id}.json")),
                    compare.json()?.into_bytes(),
                )
                .await?;
            store
                .upload_bytes(
                    &paths.compare_result_key(phase, &format!("{test_id}.txt")),
                    compare.table().into_bytes(),
                )
                .await?;

            // merged raw distribution across both runs, for plotting
            match store.download_bytes(&baseline.raw_key).await {
                Ok(bytes) => match serde_json::from_slice::<LatencySeries>(&bytes) {
                    Ok(baseline_raw) => {
                        let merged = merge_tagged(&[
                            (baseline.summary.test_id.clone(), baseline_raw),
                            (test_id.to_string(), raw.clone()),
                        ]);
                        store
                            .upload_bytes(
                                &paths.compare_result_key(phase, &format!("{test_id}-merged-raw.json")),
                                serde_json::to_vec(&merged)?,
                            )
                            .await?;
                    }
                    Err(e) => warn!(key = %baseline.raw_key, error = %e, "bad baseline raw artifact"),
                },
                Err(e) => warn!(key = %baseline.raw_key, error = %e, "baseline raw series unavailable"),
            }
        }
        Ok(None) => {}
        Err(e) => warn!(phase = phase.as_str(), error = %e, "baseline lookup failed; skipping comparison"),
    }

    // archive for future comparisons regardless of whether one happened now
    store
        .upload_bytes(
            &paths.compare_summary_key(phase, test_id),
            summary.json()?.into_bytes(),
        )
        .await
        .context("archive aggregated summary")?;
    store
        .upload_bytes(
            &paths.compare_raw_key(phase, test_id),
            serde_json::to_vec(raw)?,
        )
        .await
        .context("archive aggregated raw series")?;
    store
        .upload_bytes(
            &paths.compare_result_key(phase, &format!("{test_id}-summary.txt")),
            summary.table().into_bytes(),
        )
        .await
        .context("upload aggregated summary table")?;
    Ok(())
}

async fn publish_phase(cfg: &Config, phase: Phase, summary: &RequestsSummary, region: Option<String>) {
    if cfg.store.metric_namespace.is_empty() {
        return;
    }
    let publisher = MetricPublisher::connect(cfg.store.metric_namespace.clone(), region).await;
    publisher
        .publish_percentiles(&cfg.workload.kind, phase, summary)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_command_carries_shard_output_dirs() {
        let cfg = Config::default();
        let paths = WorkloadPaths::with_root(&cfg.name, &cfg.workload.kind);
        let cmd = worker_command(&cfg, &paths);
        assert_eq!(cmd[1], "create");
        assert_eq!(cmd[2], "secrets");
        assert!(cmd
            .iter()
            .any(|a| a == "--requests-raw-writes-json-s3-dir=kbench/secrets/writes-raw"));
        assert!(cmd
            .iter()
            .any(|a| a == "--requests-summary-reads-json-s3-dir=kbench/secrets/reads-summary"));
        // stress-only flags stay off the secrets command line
        assert!(!cmd.iter().any(|a| a.starts_with("--list-batch")));
    }

    #[test]
    fn stress_command_gets_list_flags() {
        let mut cfg = Config::default();
        cfg.workload.kind = "stress".to_string();
        let paths = WorkloadPaths::with_root(&cfg.name, &cfg.workload.kind);
        let cmd = worker_command(&cfg, &paths);
        assert!(cmd.iter().any(|a| a == "--list-batch=1000"));
        assert!(cmd.iter().any(|a| a.starts_with("--duration=")));
    }
}
