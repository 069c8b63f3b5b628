use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, TryStreamExt};

use crate::domain::{
    errors::StorageResult,
    models::{BlobItem, BlobProperties, Metadata},
    value_objects::BlobName,
};

/// Lazily produced content of a blob
pub type BlobByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// Lazily produced, page-by-page listing of a container
pub type BlobItemStream = BoxStream<'static, StorageResult<BlobItem>>;

/// Content of a blob together with the properties observed when opening it
pub struct BlobDownload {
    pub properties: BlobProperties,
    pub stream: BlobByteStream,
}

impl BlobDownload {
    /// Buffer the whole content in memory
    pub async fn bytes(self) -> StorageResult<Bytes> {
        let buffer = self
            .stream
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?;

        Ok(buffer.freeze())
    }
}

impl std::fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDownload")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Port for one blob container.
///
/// Every adapter in this crate is written against this trait. Implementations
/// own retries and timeouts; callers never retry.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Name of the container this handle addresses
    fn container(&self) -> &str;

    /// Check if the container exists
    async fn container_exists(&self) -> StorageResult<bool>;

    /// Create the container, returning whether it was actually created
    async fn create_container_if_missing(&self) -> StorageResult<bool>;

    /// Delete the container and everything in it, returning whether it existed
    async fn delete_container_if_exists(&self) -> StorageResult<bool>;

    /// Create or overwrite a block blob, replacing its metadata
    async fn put(
        &self,
        name: &BlobName,
        data: Bytes,
        metadata: Metadata,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Open a blob for reading
    async fn get(&self, name: &BlobName) -> StorageResult<BlobDownload>;

    /// Fetch size, kind and metadata without the content
    async fn get_properties(&self, name: &BlobName) -> StorageResult<BlobProperties>;

    /// Replace the metadata of an existing blob
    async fn set_metadata(&self, name: &BlobName, metadata: Metadata) -> StorageResult<()>;

    /// Delete a blob; a missing blob is not an error. Returns whether it existed
    async fn delete(&self, name: &BlobName) -> StorageResult<bool>;

    /// List blobs, optionally restricted to a name prefix. The in-memory store
    /// and the cloud backends list in name order.
    fn list(&self, prefix: Option<&str>) -> BlobItemStream;

    /// Create an empty append blob unless one exists, returning whether it was created.
    /// Safe to call concurrently for the same name.
    async fn create_append_blob_if_missing(&self, name: &BlobName) -> StorageResult<bool>;

    /// Append a block to an existing append blob
    async fn append_block(&self, name: &BlobName, data: Bytes) -> StorageResult<()>;
}
