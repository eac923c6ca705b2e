//! Worker subcommands: generate load inside a job pod (or locally), write
//! shard artifacts, upload them to the shard directories.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbench_client::{Caller, CallerConfig, ClientPool};
use kbench_loader::{
    random_suffix, run_ingress_driver, run_object_driver, run_stress_driver, DriverConfig,
    IngressConfig, ObjectKind, StressConfig,
};
use kbench_metrics::{RequestsSummary, SamplerSnapshot};
use kbench_store::{Phase, S3Store};

use crate::artifacts::write_phase_files;

/// Flags shared by the secrets and configmaps workloads.
#[derive(Args, Debug, Clone)]
pub struct ObjectArgs {
    /// Namespace to send writes to (created if absent).
    #[arg(long, default_value = "kbench-load")]
    pub namespace: String,

    /// Object name prefix; this worker appends a unique suffix.
    #[arg(long, default_value = "kbench")]
    pub name_prefix: String,

    /// Number of objects to write then read back.
    #[arg(long, default_value_t = 100)]
    pub objects: usize,

    /// Payload size per object in bytes.
    #[arg(long, default_value_t = 1024)]
    pub object_size: usize,

    /// Size of the round-robin client pool.
    #[arg(long, default_value_t = 5)]
    pub clients: usize,

    /// Client QPS (token-bucket fill rate).
    #[arg(long, default_value_t = 15.0)]
    pub client_qps: f64,

    /// Client burst (token-bucket capacity).
    #[arg(long, default_value_t = 30)]
    pub client_burst: u32,

    /// Per-call timeout.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub client_timeout: Duration,

    /// Kubeconfig path; omit when running in-cluster.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// S3 bucket for artifacts; empty disables uploads.
    #[arg(long, default_value = "")]
    pub s3_bucket_name: String,

    /// AWS region override for the bucket.
    #[arg(long, default_value = "")]
    pub s3_region: String,

    /// S3 directory receiving per-shard write-phase raw series.
    #[arg(long, default_value = "")]
    pub requests_raw_writes_json_s3_dir: String,

    /// S3 directory receiving per-shard write-phase summaries.
    #[arg(long, default_value = "")]
    pub requests_summary_writes_json_s3_dir: String,

    /// S3 directory receiving per-shard read-phase raw series.
    #[arg(long, default_value = "")]
    pub requests_raw_reads_json_s3_dir: String,

    /// S3 directory receiving per-shard read-phase summaries.
    #[arg(long, default_value = "")]
    pub requests_summary_reads_json_s3_dir: String,

    /// Artifact name prefix for the write phase.
    #[arg(long, default_value = "shard")]
    pub writes_output_name_prefix: String,

    /// Artifact name prefix for the read phase.
    #[arg(long, default_value = "shard")]
    pub reads_output_name_prefix: String,

    /// Local directory for artifact files.
    #[arg(long, default_value = "/var/log")]
    pub output_dir: PathBuf,

    /// Block after completion instead of exiting (keeps the pod alive for
    /// log collection).
    #[arg(long)]
    pub block: bool,
}

/// Extra flags for the mixed stress workload.
#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    /// Common object-workload flags.
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Namespaces scanned by the read phase; defaults to the write
    /// namespace.
    #[arg(long = "namespace-read")]
    pub namespaces_read: Vec<String>,

    /// Items per list page.
    #[arg(long, default_value_t = 1000)]
    pub list_batch: u32,

    /// Sleep between list pages.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub list_interval: Duration,

    /// Read-phase duration; zero runs a single pass.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub duration: Duration,
}

/// Flags for the ingress HTTP QPS workload.
#[derive(Args, Debug, Clone)]
pub struct IngressArgs {
    /// URL of the ingress test server.
    #[arg(long)]
    pub target_url: String,

    /// Concurrent HTTP workers.
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    /// Run duration.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1m")]
    pub duration: Duration,

    /// Per-request timeout.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// S3 bucket for artifacts; empty disables uploads.
    #[arg(long, default_value = "")]
    pub s3_bucket_name: String,

    /// AWS region override for the bucket.
    #[arg(long, default_value = "")]
    pub s3_region: String,

    /// S3 directory receiving per-shard raw series.
    #[arg(long, default_value = "")]
    pub requests_raw_reads_json_s3_dir: String,

    /// S3 directory receiving per-shard summaries.
    #[arg(long, default_value = "")]
    pub requests_summary_reads_json_s3_dir: String,

    /// Artifact name prefix.
    #[arg(long, default_value = "shard")]
    pub reads_output_name_prefix: String,

    /// Local directory for artifact files.
    #[arg(long, default_value = "/var/log")]
    pub output_dir: PathBuf,
}

fn caller_config(args: &ObjectArgs) -> CallerConfig {
    CallerConfig {
        qps: args.client_qps,
        burst: args.client_burst,
        timeout: args.client_timeout,
        ..CallerConfig::default()
    }
}

fn test_id_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// Upload one phase's raw and summary artifacts to its shard directories.
async fn upload_phase(
    store: &S3Store,
    raw_dir: &str,
    summary_dir: &str,
    files: &crate::artifacts::PhaseFiles,
) -> anyhow::Result<()> {
    for (dir, path) in [
        (raw_dir, &files.raw_json),
        (summary_dir, &files.summary_json),
        (summary_dir, &files.summary_table),
    ] {
        if dir.is_empty() {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("artifact file name")?;
        let key = format!("{}/{}", dir.trim_matches('/'), name);
        store
            .upload(&key, path)
            .await
            .with_context(|| format!("upload artifact {key}"))?;
    }
    Ok(())
}

/// Persist and upload both phases of a worker run.
async fn finish_run(
    args: &ObjectArgs,
    test_id: &str,
    writes: &SamplerSnapshot,
    reads: &SamplerSnapshot,
) -> anyhow::Result<()> {
    let sfx = random_suffix();
    let writes_prefix = format!("{}-{}", args.writes_output_name_prefix, sfx);
    let reads_prefix = format!("{}-{}", args.reads_output_name_prefix, sfx);

    let writes_summary = RequestsSummary::from_snapshot(test_id, writes);
    let reads_summary = RequestsSummary::from_snapshot(test_id, reads);
    println!("{}", writes_summary.table());
    println!("{}", reads_summary.table());

    let writes_files = write_phase_files(
        &args.output_dir,
        &writes_prefix,
        Phase::Writes,
        &writes_summary,
        &writes.raw,
    )?;
    let reads_files = write_phase_files(
        &args.output_dir,
        &reads_prefix,
        Phase::Reads,
        &reads_summary,
        &reads.raw,
    )?;

    if !args.s3_bucket_name.is_empty() {
        let region = (!args.s3_region.is_empty()).then(|| args.s3_region.clone());
        let store = S3Store::connect(args.s3_bucket_name.clone(), region).await;
        upload_phase(
            &store,
            &args.requests_raw_writes_json_s3_dir,
            &args.requests_summary_writes_json_s3_dir,
            &writes_files,
        )
        .await?;
        upload_phase(
            &store,
            &args.requests_raw_reads_json_s3_dir,
            &args.requests_summary_reads_json_s3_dir,
            &reads_files,
        )
        .await?;
    }
    Ok(())
}

/// Run the secrets or configmaps workload end to end.
pub async fn run_object_workload(
    kind: ObjectKind,
    args: &ObjectArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let pool = ClientPool::build(args.clients, args.kubeconfig.as_deref()).await?;
    let caller = Caller::new(pool, caller_config(args), cancel.clone());

    // unique key space and artifact names per worker, since every pod in
    // the job shares one command line
    let driver_cfg = DriverConfig {
        namespace: args.namespace.clone(),
        name_prefix: format!("{}{}", args.name_prefix, random_suffix()),
        objects: args.objects,
        object_size: args.object_size,
    };

    let out = run_object_driver(&caller, kind, &driver_cfg, cancel).await?;
    let test_id = test_id_now();
    finish_run(args, &test_id, &out.writes, &out.reads).await?;

    if args.objects > 0 && out.writes.success_total == 0 {
        bail!("no successful writes out of {} attempts", args.objects);
    }
    if args.block {
        info!("blocking until stopped");
        cancel.cancelled().await;
    }
    Ok(())
}

/// Run the mixed stress workload end to end.
pub async fn run_stress_workload(
    args: &StressArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let pool = ClientPool::build(args.object.clients, args.object.kubeconfig.as_deref()).await?;
    let caller = Caller::new(
        pool,
        CallerConfig {
            list_batch: args.list_batch,
            list_interval: args.list_interval,
            ..caller_config(&args.object)
        },
        cancel.clone(),
    );

    let namespaces_read = if args.namespaces_read.is_empty() {
        vec![args.object.namespace.clone()]
    } else {
        args.namespaces_read.clone()
    };
    let cfg = StressConfig {
        namespace_write: args.object.namespace.clone(),
        namespaces_read,
        name_prefix: format!("{}{}", args.object.name_prefix, random_suffix()),
        objects: args.object.objects,
        object_size: args.object.object_size,
        duration: args.duration,
    };

    let (writes, reads) = run_stress_driver(&caller, &cfg, cancel).await?;
    let test_id = test_id_now();
    finish_run(&args.object, &test_id, &writes, &reads).await?;

    if args.object.objects > 0 && args.object.object_size > 0 && writes.success_total == 0 {
        bail!("no successful stress writes");
    }
    Ok(())
}

/// Run the ingress HTTP QPS workload end to end.
pub async fn run_ingress_workload(
    args: &IngressArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let cfg = IngressConfig {
        target_url: args.target_url.clone(),
        concurrency: args.concurrency,
        duration: args.duration,
        timeout: args.timeout,
    };
    let out = run_ingress_driver(&cfg, cancel).await?;
    let test_id = test_id_now();

    let summary = RequestsSummary::from_snapshot(&test_id, &out.requests);
    println!("{}", summary.table());

    let prefix = format!("{}-{}", args.reads_output_name_prefix, random_suffix());
    let files = write_phase_files(
        &args.output_dir,
        &prefix,
        Phase::Reads,
        &summary,
        &out.requests.raw,
    )?;

    if !args.s3_bucket_name.is_empty() {
        let region = (!args.s3_region.is_empty()).then(|| args.s3_region.clone());
        let store = S3Store::connect(args.s3_bucket_name.clone(), region).await;
        upload_phase(
            &store,
            &args.requests_raw_reads_json_s3_dir,
            &args.requests_summary_reads_json_s3_dir,
            &files,
        )
        .await?;
    }

    if out.issued > 0 && out.requests.success_total == 0 {
        warn!(issued = out.issued, "every ingress request failed");
        bail!("no successful ingress requests out of {}", out.issued);
    }
    Ok(())
}
