use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            DynSagaData, Metadata, SagaDataRegistry, SagaSnapshot, SnapshotDocument,
            SnapshotDocumentRef,
        },
        value_objects::BlobName,
    },
    ports::{
        services::SnapshotArchive,
        storage::{BlobItemStream, BlobStore},
    },
};

/// Content type of both snapshot documents
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Snapshot archive writing two JSON documents per saga revision:
/// `<id>/<revision>/data.json` and `<id>/<revision>/metadata.json`.
///
/// The two writes are independent; a failure between them leaves a data
/// document without its metadata.
pub struct BlobSnapshotArchive {
    blobs: Arc<dyn BlobStore>,
    registry: Arc<SagaDataRegistry>,
}

impl BlobSnapshotArchive {
    /// Open the archive, creating its container if needed
    pub async fn open(
        blobs: Arc<dyn BlobStore>,
        registry: Arc<SagaDataRegistry>,
    ) -> StorageResult<Self> {
        let archive = Self { blobs, registry };
        archive.ensure_container_exists().await?;
        Ok(archive)
    }

    pub fn registry(&self) -> &SagaDataRegistry {
        &self.registry
    }

    fn document_name(
        saga_id: Uuid,
        revision: u32,
        document: SnapshotDocument,
    ) -> StorageResult<BlobName> {
        Ok(SnapshotDocumentRef::new(saga_id, revision, document).blob_name()?)
    }

    async fn download(&self, name: &BlobName) -> StorageResult<Bytes> {
        self.blobs.get(name).await?.bytes().await
    }

    async fn upload(&self, name: &BlobName, content: Vec<u8>) -> StorageResult<()> {
        self.blobs
            .put(name, Bytes::from(content), Metadata::new(), Some(JSON_CONTENT_TYPE))
            .await
            .map_err(|e| e.into_write_error(self.blobs.container(), name.as_str()))
    }

    /// Load only the saga data of a snapshot
    pub async fn get_saga_data(
        &self,
        saga_id: Uuid,
        revision: u32,
    ) -> StorageResult<Box<dyn DynSagaData>> {
        let name = Self::document_name(saga_id, revision, SnapshotDocument::Data)?;
        let content = self.download(&name).await?;

        self.registry
            .decode(&content)
            .map_err(|e| StorageError::Malformed {
                container: self.blobs.container().to_string(),
                name: name.to_string(),
                message: format!("Could not decode saga data: {}", e),
                source: Some(Arc::new(e)),
            })
    }

    /// Load only the audit metadata of a snapshot
    pub async fn get_saga_metadata(&self, saga_id: Uuid, revision: u32) -> StorageResult<Metadata> {
        let name = Self::document_name(saga_id, revision, SnapshotDocument::Metadata)?;
        let content = self.download(&name).await?;

        serde_json::from_slice(&content).map_err(|e| StorageError::Malformed {
            container: self.blobs.container().to_string(),
            name: name.to_string(),
            message: format!("Could not decode snapshot metadata: {}", e),
            source: Some(Arc::new(e)),
        })
    }
}

#[async_trait]
impl SnapshotArchive for BlobSnapshotArchive {
    async fn save(&self, data: &dyn DynSagaData, metadata: &Metadata) -> StorageResult<()> {
        let (saga_id, revision) = (data.saga_id(), data.saga_revision());
        let container = self.blobs.container();

        let data_name = Self::document_name(saga_id, revision, SnapshotDocument::Data)?;
        let metadata_name = Self::document_name(saga_id, revision, SnapshotDocument::Metadata)?;

        if !self.registry.contains(data.type_name()) {
            warn!(
                saga_type = data.type_name(),
                "Archiving saga data whose type is not registered for reading"
            );
        }

        let data_json = SagaDataRegistry::encode(data).map_err(|e| {
            StorageError::io(
                container,
                data_name.as_str(),
                format!("Could not serialize saga data of type '{}'", data.type_name()),
                e,
            )
        })?;
        let metadata_json = serde_json::to_vec(metadata).map_err(|e| {
            StorageError::io(
                container,
                metadata_name.as_str(),
                "Could not serialize snapshot metadata",
                e,
            )
        })?;

        self.upload(&data_name, data_json).await?;
        self.upload(&metadata_name, metadata_json).await?;

        debug!(%saga_id, revision, container, "Archived saga snapshot");
        Ok(())
    }

    async fn get_snapshot(&self, saga_id: Uuid, revision: u32) -> StorageResult<SagaSnapshot> {
        let data = self.get_saga_data(saga_id, revision).await?;
        let metadata = self.get_saga_metadata(saga_id, revision).await?;

        Ok(SagaSnapshot { data, metadata })
    }

    fn list_all(&self) -> BlobItemStream {
        self.blobs.list(None)
    }

    async fn ensure_container_exists(&self) -> StorageResult<()> {
        if self.blobs.container_exists().await? {
            return Ok(());
        }

        info!("Container {} does not exist - will create it now", self.blobs.container());
        self.blobs.create_container_if_missing().await?;
        Ok(())
    }

    async fn drop_and_recreate(&self) -> StorageResult<()> {
        let container = self.blobs.container();

        if self.blobs.delete_container_if_exists().await? {
            info!("Deleted container {}", container);
        }

        self.blobs.create_container_if_missing().await?;
        info!("Created container {}", container);
        Ok(())
    }
}
