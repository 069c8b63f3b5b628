use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::{
        errors::StorageResult,
        models::{DynSagaData, Metadata, SagaSnapshot},
    },
    ports::storage::BlobItemStream,
};

/// Port for archiving saga state snapshots for auditing
#[async_trait]
pub trait SnapshotArchive: Send + Sync + 'static {
    /// Archive the saga data under its id and revision together with the audit metadata
    async fn save(&self, data: &dyn DynSagaData, metadata: &Metadata) -> StorageResult<()>;

    /// Load the snapshot stored for the given saga id and revision
    async fn get_snapshot(&self, saga_id: Uuid, revision: u32) -> StorageResult<SagaSnapshot>;

    /// Every raw document in the archive, in name order
    fn list_all(&self) -> BlobItemStream;

    /// Create the archive container unless it exists
    async fn ensure_container_exists(&self) -> StorageResult<()>;

    /// Delete and recreate the archive container, dropping every snapshot
    async fn drop_and_recreate(&self) -> StorageResult<()>;
}
