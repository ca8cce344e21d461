//! [`ObjectStore`] backed by the AWS SDK for S3.

use anyhow::{Context, anyhow};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use tracing::instrument;

use crate::{CopyRequest, Error, ListPage, ObjectStore};

/// Session parameters for the S3 client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack, ...)
    pub endpoint_url: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

/// Renders an SDK error as `code: message` for service errors, or the full error chain otherwise.
fn describe_sdk_error<E, R>(error: SdkError<E, R>) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(service_error) = error.as_service_error() {
        return anyhow!(
            "{}: {}",
            service_error.code().unwrap_or("unknown"),
            service_error.message().unwrap_or("no message")
        );
    }
    anyhow::Error::new(error)
}

/// Creates an authenticated session for `config.region`.
///
/// Credentials come from the standard AWS provider chain (environment, shared credentials file,
/// SSO, instance metadata, ...). They are resolved eagerly so that a missing or broken credential
/// setup fails here, before any listing or copying starts.
#[instrument]
pub async fn connect(config: &SessionConfig) -> anyhow::Result<S3Store> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(config.region.clone()));
    if let Some(endpoint_url) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    let sdk_config = loader.load().await;
    let credentials = sdk_config
        .credentials_provider()
        .context("no AWS credentials provider is configured")?;
    credentials
        .provide_credentials()
        .await
        .context("failed loading AWS credentials")?;
    tracing::debug!("AWS credentials resolved for region {}", config.region);
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.force_path_style)
        .build();
    Ok(S3Store {
        client: aws_sdk_s3::Client::from_conf(s3_config),
    })
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, Error> {
        throttle::get_ops_token().await;
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|error| Error::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: describe_sdk_error(error),
            })?;
        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(String::from))
            .collect();
        let continuation = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };
        tracing::debug!(
            "listed {} key(s), more pages: {}",
            keys.len(),
            continuation.is_some()
        );
        Ok(ListPage { keys, continuation })
    }

    #[instrument(skip(self))]
    async fn copy_object(&self, request: &CopyRequest) -> Result<(), Error> {
        throttle::get_ops_token().await;
        self.client
            .copy_object()
            .copy_source(request.copy_source())
            .bucket(&request.target_bucket)
            .key(&request.target_key)
            .set_acl(
                request
                    .attributes
                    .acl
                    .as_deref()
                    .map(aws_sdk_s3::types::ObjectCannedAcl::from),
            )
            .set_storage_class(
                request
                    .attributes
                    .storage_class
                    .as_deref()
                    .map(aws_sdk_s3::types::StorageClass::from),
            )
            .send()
            .await
            .map_err(|error| Error::Copy {
                from: request.source_url(),
                to: request.target_url(),
                source: describe_sdk_error(error),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        throttle::get_ops_token().await;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_not_found()) =>
            {
                Ok(false)
            }
            Err(error) => Err(Error::Wait {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: describe_sdk_error(error),
            }),
        }
    }
}
