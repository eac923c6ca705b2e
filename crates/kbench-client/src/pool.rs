//! Round-robin pool of Kubernetes clients.
//!
//! A driver issues calls one at a time, but the apiserver meters in-flight
//! requests per connection. Spreading sequential calls over several clients
//! keeps a single connection from becoming the bottleneck.

use std::path::Path;
use std::sync::Mutex;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;

use crate::ClientError;

/// Fixed pool of independently-built clients with a round-robin cursor.
pub struct ClientPool {
    clients: Vec<Client>,
    cur: Mutex<usize>,
}

impl ClientPool {
    /// Build `size` clients from a kubeconfig path, or from the inferred
    /// in-cluster / environment configuration when no path is given.
    pub async fn build(size: usize, kubeconfig: Option<&Path>) -> Result<Self, ClientError> {
        if size == 0 {
            return Err(ClientError::InvalidConfig(
                "client pool size must be at least 1".to_string(),
            ));
        }
        let config = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path)
                    .map_err(|e| ClientError::Build(format!("read kubeconfig: {e}")))?;
                Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClientError::Build(format!("load kubeconfig: {e}")))?
            }
            None => Config::infer()
                .await
                .map_err(|e| ClientError::Build(format!("infer config: {e}")))?,
        };
        let mut clients = Vec::with_capacity(size);
        for _ in 0..size {
            clients.push(
                Client::try_from(config.clone())
                    .map_err(|e| ClientError::Build(e.to_string()))?,
            );
        }
        info!(clients = clients.len(), "built kubernetes client pool");
        Ok(Self {
            clients,
            cur: Mutex::new(0),
        })
    }

    /// A pool wrapping already-built clients.
    pub fn from_clients(clients: Vec<Client>) -> Result<Self, ClientError> {
        if clients.is_empty() {
            return Err(ClientError::InvalidConfig(
                "client pool size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            clients,
            cur: Mutex::new(0),
        })
    }

    /// The next client in round-robin order. Clients are cheap handles over
    /// a shared connection pool, so cloning out of the slot is fine.
    pub fn next(&self) -> Client {
        let mut cur = self.cur.lock().expect("client pool cursor poisoned");
        *cur = (*cur + 1) % self.clients.len();
        self.clients[*cur].clone()
    }

    /// Number of clients in the pool.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Always false; construction rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
