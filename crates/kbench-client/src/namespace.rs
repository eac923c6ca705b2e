//! Namespace setup and teardown.
//!
//! Setup and cleanup calls are not load, so they bypass the rate limiter
//! and sampler entirely.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use tracing::info;

use crate::error::{classify, ClientError, ErrorKind};

/// Field manager for server-side apply.
const FIELD_MANAGER: &str = "kbench";

/// Ensure a namespace exists (idempotent).
///
/// Uses server-side apply so it never fails on "already exists" and doesn't
/// race with concurrent creators.
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<(), ClientError> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
        .await
        .map_err(|e| ClientError::Api {
            kind: classify(&e),
            verb: "apply",
            resource: "namespaces",
            key: name.to_string(),
            message: e.to_string(),
        })?;
    info!(namespace = %name, "namespace ready");
    Ok(())
}

/// Delete a namespace, treating "not found" as success so cleanup is
/// idempotent.
pub async fn delete_namespace(client: &Client, name: &str) -> Result<(), ClientError> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(namespace = %name, "namespace deleted");
            Ok(())
        }
        Err(e) if classify(&e) == ErrorKind::NotFound => {
            info!(namespace = %name, "namespace already absent");
            Ok(())
        }
        Err(e) => Err(ClientError::Api {
            kind: classify(&e),
            verb: "delete",
            resource: "namespaces",
            key: name.to_string(),
            message: e.to_string(),
        }),
    }
}
