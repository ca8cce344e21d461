//! Object store client interface used by `s3cp`
//!
//! The copy orchestration in `common` only talks to storage through the [`ObjectStore`] trait.
//! This keeps the concurrency and failure-isolation logic independent of the transport: the
//! production implementation is [`s3::S3Store`] (AWS SDK), tests use in-memory stores.
//!
//! # Operations
//!
//! - [`ObjectStore::list_objects`] - one page of keys under a prefix, paginated by continuation token
//! - [`ObjectStore::copy_object`] - server-side copy, no object bytes pass through this process
//! - [`ObjectStore::object_exists`] - single existence check
//! - [`ObjectStore::wait_for_object_exists`] - polls until the object is visible or the wait budget
//!   runs out
//!
//! # Cancellation
//!
//! All futures returned by the trait are cancel-safe: callers bound them by racing against a
//! deadline and dropping them, which aborts the in-flight request. A request the service already
//! committed may still complete server-side.

use std::time::Duration;

pub mod s3;

/// Errors reported by object store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed listing objects in s3://{bucket}/{prefix}: {source:#}")]
    List {
        bucket: String,
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed copying {from} to {to}: {source:#}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed checking whether s3://{bucket}/{key} exists: {source:#}")]
    Wait {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("s3://{bucket}/{key} did not appear after waiting {waited:?}")]
    WaitTimeout {
        bucket: String,
        key: String,
        waited: Duration,
    },
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` once the service reports no further pages.
    pub continuation: Option<String>,
}

/// Attributes applied to every copied object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Canned ACL, e.g. `bucket-owner-full-control`
    pub acl: Option<String>,
    /// Storage class, e.g. `STANDARD` or `GLACIER_IR`
    pub storage_class: Option<String>,
}

impl ObjectAttributes {
    /// Builds attributes, rejecting values S3 does not know about.
    pub fn new(acl: Option<String>, storage_class: Option<String>) -> anyhow::Result<Self> {
        if let Some(acl) = &acl {
            let known = aws_sdk_s3::types::ObjectCannedAcl::values();
            if !known.contains(&acl.as_str()) {
                return Err(anyhow::anyhow!(
                    "unknown ACL {:?}, expected one of: {}",
                    acl,
                    known.join(", ")
                ));
            }
        }
        if let Some(storage_class) = &storage_class {
            let known = aws_sdk_s3::types::StorageClass::values();
            if !known.contains(&storage_class.as_str()) {
                return Err(anyhow::anyhow!(
                    "unknown storage class {:?}, expected one of: {}",
                    storage_class,
                    known.join(", ")
                ));
            }
        }
        Ok(Self { acl, storage_class })
    }
}

/// A single server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub target_bucket: String,
    pub target_key: String,
    pub attributes: ObjectAttributes,
}

impl CopyRequest {
    /// The `x-amz-copy-source` value: `bucket/key`, percent-escaped (including `/`).
    #[must_use]
    pub fn copy_source(&self) -> String {
        urlencoding::encode(&format!("{}/{}", self.source_bucket, self.source_key)).into_owned()
    }

    #[must_use]
    pub fn source_url(&self) -> String {
        format!("s3://{}/{}", self.source_bucket, self.source_key)
    }

    #[must_use]
    pub fn target_url(&self) -> String {
        format!("s3://{}/{}", self.target_bucket, self.target_key)
    }
}

/// Polling schedule used while waiting for a copied object to become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub delay: Duration,
    pub max_wait: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        // same schedule as the S3 "object exists" waiter: 20 checks, 5s apart
        Self {
            delay: Duration::from_secs(5),
            max_wait: Duration::from_secs(100),
        }
    }
}

#[async_trait::async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, Error>;

    async fn copy_object(&self, request: &CopyRequest) -> Result<(), Error>;

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, Error>;

    /// Blocks until `bucket/key` is observable or until another check would exceed
    /// `settings.max_wait`.
    async fn wait_for_object_exists(
        &self,
        bucket: &str,
        key: &str,
        settings: &WaitSettings,
    ) -> Result<(), Error> {
        let started = tokio::time::Instant::now();
        let mut checks = 0;
        loop {
            checks += 1;
            if self.object_exists(bucket, key).await? {
                tracing::debug!("s3://{}/{} visible after {} check(s)", bucket, key, checks);
                return Ok(());
            }
            let waited = started.elapsed();
            if waited + settings.delay > settings.max_wait {
                return Err(Error::WaitTimeout {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    waited,
                });
            }
            tracing::trace!("s3://{}/{} not visible yet, probing again", bucket, key);
            tokio::time::sleep(settings.delay).await;
        }
    }
}
