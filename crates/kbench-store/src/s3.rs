//! S3 object operations for run artifacts.

use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::StoreError;

/// One listed object with its ordering key.
#[derive(Debug, Clone)]
pub struct ListedObject {
    /// Full object key.
    pub key: String,
    /// Last-modified time as (seconds, subsecond nanos) since the epoch.
    pub last_modified: (i64, u32),
}

impl ListedObject {
    /// Final path segment of the key.
    pub fn base_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// S3-backed artifact store for one bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Connect using the environment's AWS configuration.
    pub async fn connect(bucket: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            bucket: bucket.into(),
        }
    }

    /// Wrap an already-built client, for S3-compatible endpoints and tests.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The bucket this store writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a local file to `key`.
    pub async fn upload(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path).await.map_err(|e| StoreError::Io {
            path: local_path.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::S3 {
                op: "put",
                key: key.to_string(),
                message: e.to_string(),
            })?;
        info!(bucket = %self.bucket, key, "uploaded object");
        Ok(())
    }

    /// Upload in-memory bytes to `key`.
    pub async fn upload_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::S3 {
                op: "put",
                key: key.to_string(),
                message: e.to_string(),
            })?;
        info!(bucket = %self.bucket, key, size, "uploaded object");
        Ok(())
    }

    /// Download `key` into memory.
    pub async fn download_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::S3 {
                op: "get",
                key: key.to_string(),
                message: e.to_string(),
            })?;
        let bytes = out.body.collect().await.map_err(|e| StoreError::S3 {
            op: "get",
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.into_bytes().to_vec())
    }

    /// List every object under `prefix`, newest last-modified first.
    pub async fn list_newest(&self, prefix: &str) -> Result<Vec<ListedObject>, StoreError> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::S3 {
                op: "list",
                key: prefix.to_string(),
                message: e.to_string(),
            })?;
            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                let last_modified = obj
                    .last_modified()
                    .map(|t| (t.secs(), t.subsec_nanos()))
                    .unwrap_or((0, 0));
                objects.push(ListedObject {
                    key: key.to_string(),
                    last_modified,
                });
            }
        }
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        info!(bucket = %self.bucket, prefix, objects = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Recursively download everything under `prefix` into a temp directory,
    /// mirroring the key layout. An empty prefix yields an empty directory;
    /// individual object failures are skipped with a warning.
    pub async fn download_dir(&self, prefix: &str) -> Result<(TempDir, Vec<PathBuf>), StoreError> {
        let target = tempfile::Builder::new()
            .prefix("kbench-download-")
            .tempdir()
            .map_err(|e| StoreError::Io {
                path: std::env::temp_dir().display().to_string(),
                source: e,
            })?;
        let objects = self.list_newest(prefix).await?;
        let mut files = Vec::with_capacity(objects.len());
        for obj in &objects {
            let bytes = match self.download_bytes(&obj.key).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(key = %obj.key, error = %e, "skipping undownloadable object");
                    continue;
                }
            };
            let fpath = target.path().join(&obj.key);
            if let Some(parent) = fpath.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Io {
                        path: parent.display().to_string(),
                        source: e,
                    })?;
            }
            tokio::fs::write(&fpath, &bytes)
                .await
                .map_err(|e| StoreError::Io {
                    path: fpath.display().to_string(),
                    source: e,
                })?;
            files.push(fpath);
        }
        info!(
            bucket = %self.bucket,
            prefix,
            files = files.len(),
            "downloaded directory"
        );
        Ok((target, files))
    }
}
