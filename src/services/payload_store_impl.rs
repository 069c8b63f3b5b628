use async_trait::async_trait;
use bon::Builder;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            metadata::{format_timestamp, parse_timestamp, LENGTH, READ_TIME, SAVE_TIME},
            Metadata, TimeRange,
        },
        value_objects::{BlobName, PayloadId},
    },
    ports::{
        services::{PayloadReader, PayloadStore},
        storage::BlobStore,
        Clock,
    },
};

/// Behaviour switches for [`BlobPayloadStore`]
#[derive(Debug, Clone, Copy, Builder)]
pub struct PayloadStoreOptions {
    /// Create the container on the first save if it does not exist
    #[builder(default = true)]
    pub create_container: bool,
    /// Stamp `ReadTime` on every read
    #[builder(default = true)]
    pub update_last_read_time: bool,
}

impl Default for PayloadStoreOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Payload store keeping every payload in its own block blob `data-<id>.dat`
pub struct BlobPayloadStore {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    options: PayloadStoreOptions,
    container_initialized: AtomicBool,
}

impl BlobPayloadStore {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, options: PayloadStoreOptions) -> Self {
        Self {
            blobs,
            clock,
            options,
            container_initialized: AtomicBool::new(false),
        }
    }

    /// Checked once per instance; creation itself is idempotent
    async fn ensure_container(&self) -> StorageResult<()> {
        if !self.options.create_container || self.container_initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.blobs.container_exists().await? {
            info!("Container {} does not exist - will create it now", self.blobs.container());
            self.blobs.create_container_if_missing().await?;
        }

        self.container_initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn spawn_read_time_update(&self, name: BlobName) {
        let blobs = self.blobs.clone();
        let read_time = format_timestamp(self.clock.now());

        tokio::spawn(async move {
            let result = async {
                let mut metadata = blobs.get_properties(&name).await?.metadata;
                metadata.insert(READ_TIME.to_string(), read_time);
                blobs.set_metadata(&name, metadata).await
            }
            .await;

            if let Err(e) = result {
                warn!(
                    blob = %name,
                    container = blobs.container(),
                    error = %e,
                    "Could not update last read time"
                );
            }
        });
    }
}

/// Half-open range check where a missing or unparsable timestamp never excludes
fn matches_range(metadata: &Metadata, key: &str, range: Option<&TimeRange>) -> bool {
    let Some(range) = range else {
        return true;
    };

    match metadata.get(key).and_then(|value| parse_timestamp(value)) {
        Some(time) => range.contains(time),
        None => true,
    }
}

#[async_trait]
impl PayloadStore for BlobPayloadStore {
    async fn save(
        &self,
        id: &PayloadId,
        source: &mut (dyn AsyncRead + Unpin + Send),
        metadata: Option<Metadata>,
    ) -> StorageResult<()> {
        let name = id.blob_name()?;
        let container = self.blobs.container();

        self.ensure_container()
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        let mut buffer = Vec::new();
        source
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| {
                StorageError::io(
                    container,
                    name.as_str(),
                    format!("Could not write to blob named '{}'", name),
                    e,
                )
            })?;

        let mut stored = Metadata::new();
        stored.insert(SAVE_TIME.to_string(), format_timestamp(self.clock.now()));
        if let Some(metadata) = metadata {
            stored.extend(metadata);
        }

        let size = buffer.len();
        self.blobs
            .put(&name, Bytes::from(buffer), stored, None)
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        debug!(blob = %name, container, size, "Saved payload");
        Ok(())
    }

    async fn read(&self, id: &PayloadId) -> StorageResult<PayloadReader> {
        let name = id.blob_name()?;
        let download = self.blobs.get(&name).await?;

        if self.options.update_last_read_time {
            self.spawn_read_time_update(name);
        }

        let stream = download.stream.map_err(std::io::Error::from).boxed();
        Ok(StreamReader::new(stream))
    }

    async fn read_metadata(&self, id: &PayloadId) -> StorageResult<Metadata> {
        let name = id.blob_name()?;
        let properties = self.blobs.get_properties(&name).await?;

        let mut metadata = properties.metadata;
        metadata.insert(LENGTH.to_string(), properties.size.to_string());
        Ok(metadata)
    }

    async fn delete(&self, id: &PayloadId) -> StorageResult<()> {
        let name = id.blob_name()?;
        if !self.blobs.delete(&name).await? {
            debug!(blob = %name, "Payload was already gone");
        }
        Ok(())
    }

    fn query(
        &self,
        read_time: Option<TimeRange>,
        save_time: Option<TimeRange>,
    ) -> BoxStream<'static, StorageResult<PayloadId>> {
        let listing = self.blobs.list(None);

        if read_time.is_none() && save_time.is_none() {
            return listing
                .try_filter_map(|item| async move { Ok(PayloadId::from_blob_name(&item.name)) })
                .boxed();
        }

        let blobs = self.blobs.clone();
        listing
            .try_filter_map(move |item| {
                let blobs = blobs.clone();
                async move {
                    let Some(id) = PayloadId::from_blob_name(&item.name) else {
                        return Ok(None);
                    };

                    let metadata = match blobs.get_properties(&item.name).await {
                        Ok(properties) => properties.metadata,
                        // Deleted after it was listed
                        Err(e) if e.is_not_found() => return Ok(None),
                        Err(e) => return Err(e),
                    };

                    let matches = matches_range(&metadata, READ_TIME, read_time.as_ref())
                        && matches_range(&metadata, SAVE_TIME, save_time.as_ref());

                    Ok(matches.then_some(id))
                }
            })
            .boxed()
    }
}
