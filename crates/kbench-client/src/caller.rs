//! Rate-limited, sampled API operations.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kbench_metrics::{Outcome, Request, RequestKind, Sampler};

use crate::error::{classify, ClientError, ErrorKind};
use crate::limiter::RateLimiter;
use crate::pool::ClientPool;
use crate::retry::RetryPolicy;

/// Maximum from-scratch restarts of a paged scan on expired continue tokens.
const MAX_SCAN_RESTARTS: u32 = 5;

/// Fixed backoff between scan restarts.
const SCAN_RESTART_BACKOFF: Duration = Duration::from_secs(15);

/// Tunables for the rate-limited caller.
#[derive(Debug, Clone)]
pub struct CallerConfig {
    /// Token-bucket fill rate in requests per second; non-positive disables
    /// limiting.
    pub qps: f64,
    /// Token-bucket capacity.
    pub burst: u32,
    /// Per-call deadline.
    pub timeout: Duration,
    /// Items requested per list page.
    pub list_batch: u32,
    /// Sleep between list pages, so a paged scan throttles itself even
    /// under unlimited tokens.
    pub list_interval: Duration,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            qps: 5.0,
            burst: 10,
            timeout: Duration::from_secs(30),
            list_batch: 1000,
            list_interval: Duration::from_secs(5),
        }
    }
}

/// Rate-limited Kubernetes caller shared by the drivers of one worker.
pub struct Caller {
    pool: ClientPool,
    limiter: RateLimiter,
    cfg: CallerConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Caller {
    /// Wrap a client pool with rate limiting and the default retry table.
    pub fn new(pool: ClientPool, cfg: CallerConfig, cancel: CancellationToken) -> Self {
        Self {
            limiter: RateLimiter::new(cfg.qps, cfg.burst),
            pool,
            cfg,
            retry: RetryPolicy::default(),
            cancel,
        }
    }

    /// The underlying client pool, for non-sampled setup and cleanup calls.
    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Bind the caller to one phase: every operation issued through the
    /// returned handle reports to `sampler` as `kind` requests.
    pub fn phase<'a>(&'a self, kind: RequestKind, sampler: &'a Sampler) -> PhaseCaller<'a> {
        PhaseCaller {
            caller: self,
            kind,
            sampler,
        }
    }

    /// Run one attempt loop: per-attempt deadline, transient retry with
    /// exponential backoff. Returns the final error kind and message on
    /// failure. No sampling here; callers record exactly one observation
    /// per logical operation.
    async fn attempt<T, F, Fut>(&self, f: F) -> Result<T, (ErrorKind, String)>
    where
        F: Fn(Client) -> Fut,
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        let mut step = 0u32;
        loop {
            let outcome = tokio::time::timeout(self.cfg.timeout, f(self.pool.next())).await;
            let (kind, message) = match outcome {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => (classify(&e), e.to_string()),
                Err(_) => (
                    ErrorKind::Transient,
                    format!("request deadline {:?} exceeded", self.cfg.timeout),
                ),
            };
            if kind.retryable() && step < self.retry.max_steps {
                let delay = self.retry.delay(step);
                debug!(step, ?delay, error = %message, "transient error, backing off");
                step += 1;
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err((kind, message)),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
            return Err((kind, message));
        }
    }

    /// Wait for a rate-limiter token, bailing out on cancellation.
    async fn acquire_token(&self) -> Result<(), ClientError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ClientError::Canceled),
            _ = self.limiter.acquire() => Ok(()),
        }
    }
}

/// Caller bound to one phase sampler.
pub struct PhaseCaller<'a> {
    caller: &'a Caller,
    kind: RequestKind,
    sampler: &'a Sampler,
}

impl PhaseCaller<'_> {
    /// One sampled call: token, deadline, issue, classify, record.
    ///
    /// Kinds listed in `success_kinds` are recorded and returned as
    /// successes (create paths treat already-exists this way). Retries
    /// extend the recorded duration; they never record extra observations.
    async fn call<T, F, Fut>(
        &self,
        verb: &'static str,
        resource: &'static str,
        key: &str,
        payload_bytes: usize,
        success_kinds: &[ErrorKind],
        f: F,
    ) -> Result<Option<T>, ClientError>
    where
        F: Fn(Client) -> Fut,
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        if let Err(e) = self.caller.acquire_token().await {
            self.sampler.observe(&Request {
                kind: self.kind,
                key: key.to_string(),
                payload_bytes,
                start: Instant::now(),
                duration: Duration::ZERO,
                outcome: Outcome::Canceled,
                error_kind: None,
            });
            return Err(e);
        }

        let start = Instant::now();
        match self.caller.attempt(f).await {
            Ok(v) => {
                self.sampler.observe(&Request::success(
                    self.kind,
                    key,
                    payload_bytes,
                    start,
                    start.elapsed(),
                ));
                Ok(Some(v))
            }
            Err((kind, _)) if success_kinds.contains(&kind) => {
                self.sampler.observe(&Request::success(
                    self.kind,
                    key,
                    payload_bytes,
                    start,
                    start.elapsed(),
                ));
                Ok(None)
            }
            Err((kind, message)) => {
                self.sampler.observe(&Request::failure(
                    self.kind,
                    key,
                    payload_bytes,
                    start,
                    start.elapsed(),
                    kind.as_str(),
                ));
                Err(ClientError::Api {
                    kind,
                    verb,
                    resource,
                    key: key.to_string(),
                    message,
                })
            }
        }
    }

    /// Create an opaque Secret with one data field.
    pub async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), ClientError> {
        let payload_bytes = data.len();
        let secret = Secret {
            metadata: object_meta(namespace, name),
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(name.to_string(), ByteString(data))])),
            ..Default::default()
        };
        let ns = namespace.to_string();
        self.call(
            "create",
            "secrets",
            name,
            payload_bytes,
            &[ErrorKind::AlreadyExists],
            move |client| {
                let api: Api<Secret> = Api::namespaced(client, &ns);
                let secret = secret.clone();
                async move { api.create(&PostParams::default(), &secret).await }
            },
        )
        .await
        .map(|_| ())
    }

    /// Get a Secret by name.
    pub async fn get_secret(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let ns = namespace.to_string();
        let key = name.to_string();
        self.call("get", "secrets", name, 0, &[], move |client| {
            let api: Api<Secret> = Api::namespaced(client, &ns);
            let key = key.clone();
            async move { api.get(&key).await }
        })
        .await
        .map(|_| ())
    }

    /// Create a ConfigMap with one data field.
    pub async fn create_configmap(
        &self,
        namespace: &str,
        name: &str,
        value: String,
    ) -> Result<(), ClientError> {
        let cm = ConfigMap {
            metadata: object_meta(namespace, name),
            data: Some(BTreeMap::from([(name.to_string(), value.clone())])),
            ..Default::default()
        };
        let ns = namespace.to_string();
        self.call(
            "create",
            "configmaps",
            name,
            value.len(),
            &[ErrorKind::AlreadyExists],
            move |client| {
                let api: Api<ConfigMap> = Api::namespaced(client, &ns);
                let cm = cm.clone();
                async move { api.create(&PostParams::default(), &cm).await }
            },
        )
        .await
        .map(|_| ())
    }

    /// Get a ConfigMap by name.
    pub async fn get_configmap(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let ns = namespace.to_string();
        let key = name.to_string();
        self.call("get", "configmaps", name, 0, &[], move |client| {
            let api: Api<ConfigMap> = Api::namespaced(client, &ns);
            let key = key.clone();
            async move { api.get(&key).await }
        })
        .await
        .map(|_| ())
    }

    /// Paged list of Pods in a namespace.
    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClientError> {
        let ns = namespace.to_string();
        self.list_with("pods", move |client| Api::namespaced(client, &ns))
            .await
    }

    /// Paged list of Nodes.
    pub async fn list_nodes(&self) -> Result<Vec<Node>, ClientError> {
        self.list_with("nodes", Api::all).await
    }

    /// Paged list of Namespaces.
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        self.list_with("namespaces", Api::all).await
    }

    /// Paged list of CertificateSigningRequests.
    pub async fn list_csrs(&self) -> Result<Vec<CertificateSigningRequest>, ClientError> {
        self.list_with("certificatesigningrequests", Api::all).await
    }

    /// Paged list of Secrets in a namespace.
    pub async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>, ClientError> {
        let ns = namespace.to_string();
        self.list_with("secrets", move |client| Api::namespaced(client, &ns))
            .await
    }

    /// Paged list of ConfigMaps in a namespace.
    pub async fn list_configmaps(&self, namespace: &str) -> Result<Vec<ConfigMap>, ClientError> {
        let ns = namespace.to_string();
        self.list_with("configmaps", move |client| Api::namespaced(client, &ns))
            .await
    }

    /// Generic paged scan over any listable resource.
    ///
    /// Pages of `list_batch` items with `list_interval` sleeps in between.
    /// When the server reports the continue token expired, the scan restarts
    /// from the beginning, at most [`MAX_SCAN_RESTARTS`] times with a fixed
    /// backoff. One observation covers the whole scan.
    pub async fn list_with<K>(
        &self,
        resource: &'static str,
        make_api: impl Fn(Client) -> Api<K>,
    ) -> Result<Vec<K>, ClientError>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let start = Instant::now();
        let mut restarts = 0u32;

        'scan: loop {
            let mut items: Vec<K> = Vec::new();
            let mut continue_token: Option<String> = None;

            loop {
                if let Err(e) = self.caller.acquire_token().await {
                    self.sampler.observe(&Request {
                        kind: self.kind,
                        key: resource.to_string(),
                        payload_bytes: 0,
                        start,
                        duration: start.elapsed(),
                        outcome: Outcome::Canceled,
                        error_kind: None,
                    });
                    return Err(e);
                }

                let mut lp = ListParams::default().limit(self.caller.cfg.list_batch);
                if let Some(ref token) = continue_token {
                    lp = lp.continue_token(token);
                }
                let page = self
                    .caller
                    .attempt(|client| {
                        let api = make_api(client);
                        let lp = lp.clone();
                        async move { api.list(&lp).await }
                    })
                    .await;

                match page {
                    Ok(list) => {
                        items.extend(list.items);
                        match list.metadata.continue_ {
                            Some(token) if !token.is_empty() => {
                                continue_token = Some(token);
                                tokio::select! {
                                    _ = self.caller.cancel.cancelled() => {
                                        self.sampler.observe(&Request {
                                            kind: self.kind,
                                            key: resource.to_string(),
                                            payload_bytes: 0,
                                            start,
                                            duration: start.elapsed(),
                                            outcome: Outcome::Canceled,
                                            error_kind: None,
                                        });
                                        return Err(ClientError::Canceled);
                                    }
                                    _ = tokio::time::sleep(self.caller.cfg.list_interval) => {}
                                }
                            }
                            _ => {
                                self.sampler.observe(&Request::success(
                                    self.kind,
                                    resource,
                                    0,
                                    start,
                                    start.elapsed(),
                                ));
                                return Ok(items);
                            }
                        }
                    }
                    Err((ErrorKind::StaleContinue, message)) => {
                        restarts += 1;
                        if restarts > MAX_SCAN_RESTARTS {
                            self.sampler.observe(&Request::failure(
                                self.kind,
                                resource,
                                0,
                                start,
                                start.elapsed(),
                                ErrorKind::StaleContinue.as_str(),
                            ));
                            return Err(ClientError::StaleContinueExhausted {
                                resource,
                                restarts: restarts - 1,
                            });
                        }
                        warn!(
                            resource,
                            restarts, error = %message,
                            "continue token expired, restarting scan"
                        );
                        tokio::select! {
                            _ = self.caller.cancel.cancelled() => return Err(ClientError::Canceled),
                            _ = tokio::time::sleep(SCAN_RESTART_BACKOFF) => {}
                        }
                        continue 'scan;
                    }
                    Err((kind, message)) => {
                        self.sampler.observe(&Request::failure(
                            self.kind,
                            resource,
                            0,
                            start,
                            start.elapsed(),
                            kind.as_str(),
                        ));
                        return Err(ClientError::Api {
                            kind,
                            verb: "list",
                            resource,
                            key: resource.to_string(),
                            message,
                        });
                    }
                }
            }
        }
    }
}

fn object_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([("name".to_string(), name.to_string())])),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_meta_carries_name_label() {
        let meta = object_meta("load-test", "secret42");
        assert_eq!(meta.name.as_deref(), Some("secret42"));
        assert_eq!(
            meta.labels.unwrap().get("name").map(String::as_str),
            Some("secret42")
        );
    }

    #[test]
    fn default_config_is_sane() {
        let cfg = CallerConfig::default();
        assert!(cfg.qps > 0.0);
        assert!(cfg.burst >= 1);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }
}
