//! CloudWatch latency percentile publishing.
//!
//! Metrics are observability, not authoritative: a run never fails because
//! a datum didn't land. Failures are retried a few times, then logged and
//! dropped.

use std::time::{Duration, SystemTime};

use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use aws_sdk_cloudwatch::Client;
use tracing::{info, warn};

use kbench_metrics::RequestsSummary;

use crate::paths::Phase;

/// CloudWatch caps put-metric-data at 20 datums per call.
const MAX_DATUMS_PER_CALL: usize = 20;

/// Publish attempts per batch before giving up.
const PUBLISH_ATTEMPTS: u32 = 3;

/// Publisher for one CloudWatch metric namespace.
#[derive(Clone)]
pub struct MetricPublisher {
    client: Client,
    namespace: String,
}

impl MetricPublisher {
    /// Connect using the environment's AWS configuration.
    pub async fn connect(namespace: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            namespace: namespace.into(),
        }
    }

    /// Wrap an already-built client, for alternate endpoints and tests.
    pub fn from_client(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Emit one datum per percentile of `summary`, named
    /// `add-on-<workload>-<phase>-latency-<q>` in milliseconds.
    ///
    /// Never fails the run: exhausted retries log and return.
    pub async fn publish_percentiles(
        &self,
        workload: &str,
        phase: Phase,
        summary: &RequestsSummary,
    ) {
        let now = DateTime::from(SystemTime::now());
        let datums: Vec<MetricDatum> = summary
            .percentiles()
            .iter()
            .map(|(q, latency)| {
                MetricDatum::builder()
                    .metric_name(format!(
                        "add-on-{}-{}-latency-{}",
                        workload,
                        phase.as_str(),
                        q
                    ))
                    .unit(StandardUnit::Milliseconds)
                    .value(latency.as_secs_f64() * 1_000.0)
                    .timestamp(now)
                    .build()
            })
            .collect();
        self.publish(datums).await;
    }

    /// Publish datums in batches of at most 20.
    pub async fn publish(&self, datums: Vec<MetricDatum>) {
        for batch in datums.chunks(MAX_DATUMS_PER_CALL) {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let result = self
                    .client
                    .put_metric_data()
                    .namespace(&self.namespace)
                    .set_metric_data(Some(batch.to_vec()))
                    .send()
                    .await;
                match result {
                    Ok(_) => {
                        info!(
                            namespace = %self.namespace,
                            datums = batch.len(),
                            "published metric data"
                        );
                        break;
                    }
                    Err(e) if attempt < PUBLISH_ATTEMPTS => {
                        let backoff = Duration::from_millis(200) * 2u32.pow(attempt - 1);
                        warn!(
                            attempt,
                            ?backoff,
                            error = %e,
                            "metric publish failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => {
                        warn!(
                            namespace = %self.namespace,
                            datums = batch.len(),
                            error = %e,
                            "metric publish failed, dropping batch"
                        );
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batching_respects_the_cap() {
        let datums: Vec<MetricDatum> = (0..45)
            .map(|i| MetricDatum::builder().metric_name(format!("m{i}")).build())
            .collect();
        let batches: Vec<usize> = datums
            .chunks(MAX_DATUMS_PER_CALL)
            .map(<[MetricDatum]>::len)
            .collect();
        assert_eq!(batches, vec![20, 20, 5]);
    }
}
