//! kbench CLI.

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kbench::orchestrate::{run_remote, RemoteArgs};
use kbench::worker::{
    run_ingress_workload, run_object_workload, run_stress_workload, IngressArgs, ObjectArgs,
    StressArgs,
};
use kbench_loader::ObjectKind;

/// Kubernetes cluster load generator and latency metrics pipeline.
#[derive(Parser, Debug)]
#[command(name = "kbench", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate load (runs inside worker pods, or locally for small runs).
    Create {
        #[command(subcommand)]
        workload: CreateWorkload,
    },

    /// Orchestrate a run.
    Run {
        #[command(subcommand)]
        mode: RunMode,
    },
}

#[derive(Subcommand, Debug)]
enum CreateWorkload {
    /// Write then read back N Secrets.
    Secrets(ObjectArgs),
    /// Write then read back N ConfigMaps.
    Configmaps(ObjectArgs),
    /// Alternate ConfigMap/Secret writes, then paged list scans.
    Stress(StressArgs),
    /// Drive HTTP QPS against the ingress test server.
    Ingress(IngressArgs),
}

#[derive(Subcommand, Debug)]
enum RunMode {
    /// Fan the workload out across worker pods, aggregate, compare, publish.
    Remote(RemoteArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // one stop signal for the whole process; every suspension point in the
    // drivers and the coordinator honors it
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match cli.command {
        Commands::Create { workload } => match workload {
            CreateWorkload::Secrets(args) => {
                run_object_workload(ObjectKind::Secret, &args, &cancel).await
            }
            CreateWorkload::Configmaps(args) => {
                run_object_workload(ObjectKind::ConfigMap, &args, &cancel).await
            }
            CreateWorkload::Stress(args) => run_stress_workload(&args, &cancel).await,
            CreateWorkload::Ingress(args) => run_ingress_workload(&args, &cancel).await,
        },
        Commands::Run { mode } => match mode {
            RunMode::Remote(args) => run_remote(&args, &cancel).await,
        },
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received interrupt; stopping"),
                _ = term.recv() => info!("received SIGTERM; stopping"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received interrupt; stopping");
        }
        cancel.cancel();
    });
}
