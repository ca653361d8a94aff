//! S3-compatible object storage for finished archives.
//!
//! Supports MinIO and AWS S3. The bucket must already exist; this is
//! checked when the store is created so a bad bucket fails a run before
//! any export work starts.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::ObjectStorageSettings;

/// An object in the remote bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object key
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Trait for remote archive storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local archive, returning the object key it was stored under
    async fn upload(&self, local_path: &Path) -> Result<String>;

    /// List objects under the configured prefix
    async fn list_objects(&self) -> Result<Vec<RemoteObject>>;

    /// Delete one object by key
    async fn delete_object(&self, name: &str) -> Result<()>;
}

/// S3 / MinIO object store
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Key prefix without trailing slash (may be empty)
    path: String,
}

impl S3Store {
    /// Connect and verify the bucket exists
    pub async fn connect(settings: &ObjectStorageSettings) -> Result<Self> {
        let endpoint = if settings.host.starts_with("http://") || settings.host.starts_with("https://") {
            settings.host.clone()
        } else {
            format!("https://{}", settings.host)
        };
        debug!("Using S3 endpoint: {}", endpoint);

        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "bookstack-export",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and many S3-compatible services
            .build();

        let store = Self {
            client: Client::from_conf(config),
            bucket: settings.bucket.clone(),
            path: normalize_prefix(settings.path.as_deref()),
        };
        store.check_bucket().await?;
        Ok(store)
    }

    async fn check_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("Bucket {} is accessible", self.bucket);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Err(anyhow!("Given bucket does not exist: {}", self.bucket))
                } else {
                    Err(anyhow!(
                        "Failed to check bucket {}: {}",
                        self.bucket,
                        service_error
                    ))
                }
            }
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("Archive path has no file name: {}", local_path.display()))?;
        let key = object_key(&self.path, &file_name);

        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Failed to read archive: {}", local_path.display()))?;

        let resp = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload archive to s3://{}/{}", self.bucket, key))?;

        info!(
            "Created object: {} with tag: {} and version-id: {}",
            key,
            resp.e_tag.unwrap_or_default(),
            resp.version_id.unwrap_or_default()
        );
        Ok(key)
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let prefix = if self.path.is_empty() {
            String::new()
        } else {
            format!("{}/", self.path)
        };
        debug!("Listing objects in s3://{}/{}", self.bucket, prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let resp = request
                .send()
                .await
                .with_context(|| format!("Failed to list objects in bucket {}", self.bucket))?;

            if let Some(contents) = resp.contents {
                for object in contents {
                    let (Some(key), Some(modified)) = (object.key, object.last_modified) else {
                        continue;
                    };
                    let Some(last_modified) =
                        DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos())
                    else {
                        continue;
                    };
                    objects.push(RemoteObject {
                        name: key,
                        last_modified,
                    });
                }
            }

            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token;
            } else {
                break;
            }
        }

        debug!("Found {} objects", objects.len());
        Ok(objects)
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .with_context(|| format!("Failed to delete object: {}", name))?;

        info!("Deleted object: s3://{}/{}", self.bucket, name);
        Ok(())
    }
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn normalize_prefix(path: Option<&str>) -> String {
    path.unwrap_or_default().trim_matches('/').to_string()
}

fn object_key(prefix: &str, file_name: &str) -> String {
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}
