//! Blob storage access
//!
//! [`ObjectStore`] is the narrow read interface the object fetcher needs.
//! [`S3Storage`] talks to S3 or LocalStack/MinIO; [`MemoryObjectStore`] keeps
//! objects in process for tests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FetchError;

pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3Storage;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full body of `container/key`.
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        (**self).get_object(container, key).await
    }
}
