use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::domain::{
    errors::StorageResult,
    models::{Metadata, TimeRange},
    value_objects::PayloadId,
};

/// Reader over a stored payload
pub type PayloadReader = StreamReader<BoxStream<'static, std::io::Result<Bytes>>, Bytes>;

/// Port for storing large message payloads outside the messages themselves
#[async_trait]
pub trait PayloadStore: Send + Sync + 'static {
    /// Store everything read from `source` under `id`, overwriting any previous payload.
    ///
    /// The source is read to the end before the upload starts, so a payload
    /// must fit in memory.
    async fn save(
        &self,
        id: &PayloadId,
        source: &mut (dyn AsyncRead + Unpin + Send),
        metadata: Option<Metadata>,
    ) -> StorageResult<()>;

    /// Open the payload stored under `id`
    async fn read(&self, id: &PayloadId) -> StorageResult<PayloadReader>;

    /// Stored metadata plus the derived `Length` key
    async fn read_metadata(&self, id: &PayloadId) -> StorageResult<Metadata>;

    /// Delete the payload; deleting an unknown id succeeds
    async fn delete(&self, id: &PayloadId) -> StorageResult<()>;

    /// Ids of stored payloads whose timestamps fall within the given ranges
    fn query(
        &self,
        read_time: Option<TimeRange>,
        save_time: Option<TimeRange>,
    ) -> BoxStream<'static, StorageResult<PayloadId>>;
}
