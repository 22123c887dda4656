//! S3 object store.
//!
//! Reads notification objects for the worker and creates/uploads them for
//! the extract command. Error codes are mapped onto [`FetchError`] so the
//! delivery loop can tell a missing object from a flaky read.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info, instrument};

use super::ObjectStore;
use crate::error::FetchError;

/// Error codes S3 returns when `create_bucket` finds the bucket already there
const BUCKET_EXISTS_CODES: &[&str] = &["BucketAlreadyOwnedByYou", "BucketAlreadyExists"];

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create `bucket`, treating an already existing bucket as success.
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Created bucket {}", bucket);
                Ok(())
            },
            Err(e)
                if e
                    .as_service_error()
                    .and_then(|s| s.code())
                    .is_some_and(|code| BUCKET_EXISTS_CODES.contains(&code)) =>
            {
                debug!("Bucket {} already exists", bucket);
                Ok(())
            },
            Err(e) => Err(anyhow::anyhow!(
                "Failed to create bucket {}: {}",
                bucket,
                DisplayErrorContext(&e)
            )),
        }
    }

    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<()> {
        let size = data.len();
        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to upload s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                )
            })?;

        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);
        Ok(())
    }
}

fn classify_get_error(container: &str, key: &str, err: &GetObjectError, detail: String) -> FetchError {
    let container = container.to_string();
    let key = key.to_string();

    if err.is_no_such_key() || err.code() == Some("NotFound") || err.code() == Some("NoSuchBucket")
    {
        return FetchError::NotFound { container, key };
    }
    if err.code() == Some("AccessDenied") {
        return FetchError::AccessDenied { container, key };
    }
    FetchError::Unreadable {
        container,
        key,
        reason: detail,
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Downloading s3://{}/{}", container, key);

        let response = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match e.as_service_error() {
                    Some(service) => classify_get_error(container, key, service, detail),
                    None => FetchError::Unreadable {
                        container: container.to_string(),
                        key: key.to_string(),
                        reason: detail,
                    },
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Unreadable {
                container: container.to_string(),
                key: key.to_string(),
                reason: format!("body stream failed: {}", e),
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), container, key);
        Ok(data)
    }
}
