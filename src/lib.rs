//! kbench - Kubernetes cluster load generator and latency metrics pipeline.
//!
//! The binary has two faces: worker subcommands (`create secrets`,
//! `create configmaps`, `create stress`, `create ingress`) that run inside
//! job pods and generate load, and the orchestrator (`run remote`) that
//! fans workers out as a parallel Job, aggregates their shard artifacts,
//! compares the run against the stored baseline, and publishes percentiles.

pub mod artifacts;
pub mod orchestrate;
pub mod worker;
