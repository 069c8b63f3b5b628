use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{BlobItem, BlobKind, BlobProperties, Metadata},
        value_objects::{BlobName, ContainerName},
    },
    ports::storage::{BlobDownload, BlobItemStream, BlobStore},
};

/// Azure's maximum page size for blob listings
pub const DEFAULT_PAGE_SIZE: usize = 5000;

const CHUNK_SIZE: usize = 64 * 1024;

/// In-memory implementation of BlobStore for testing and development.
///
/// Handles created through [`InMemoryBlobStore::container_handle`] share one
/// account, so several adapters can work side by side on different
/// containers. Clones address the same container.
#[derive(Clone)]
pub struct InMemoryBlobStore {
    account: Arc<RwLock<HashMap<String, ContainerData>>>,
    container: ContainerName,
    page_size: usize,
}

#[derive(Default)]
struct ContainerData {
    // keyed by blob name; BTreeMap keeps listings in name order
    blobs: BTreeMap<String, StoredBlob>,
}

#[derive(Clone)]
struct StoredBlob {
    name: BlobName,
    data: Bytes,
    kind: BlobKind,
    metadata: Metadata,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl StoredBlob {
    fn new(name: &BlobName, data: Bytes, kind: BlobKind, metadata: Metadata) -> Self {
        Self {
            name: name.clone(),
            etag: etag_for(&data),
            data,
            kind,
            metadata,
            content_type: None,
            last_modified: Utc::now(),
        }
    }

    fn properties(&self) -> BlobProperties {
        BlobProperties {
            name: self.name.clone(),
            size: self.data.len() as u64,
            kind: self.kind,
            etag: Some(self.etag.clone()),
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn item(&self) -> BlobItem {
        BlobItem {
            name: self.name.clone(),
            size: self.data.len() as u64,
            last_modified: self.last_modified,
        }
    }

    fn touch(&mut self) {
        self.etag = etag_for(&self.data);
        self.last_modified = Utc::now();
    }
}

fn etag_for(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

struct ListCursor {
    after: Option<String>,
    finished: bool,
}

impl InMemoryBlobStore {
    /// Create a store with a fresh account holding a single (not yet created) container
    pub fn new(container: ContainerName) -> Self {
        Self {
            account: Arc::new(RwLock::new(HashMap::new())),
            container,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Handle on another container of the same account
    pub fn container_handle(&self, container: ContainerName) -> Self {
        Self {
            account: self.account.clone(),
            container,
            page_size: self.page_size,
        }
    }

    /// Number of blobs returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn container_not_found(&self) -> StorageError {
        StorageError::ContainerNotFound {
            container: self.container.to_string(),
        }
    }

    fn not_found(&self, name: &BlobName) -> StorageError {
        StorageError::not_found(self.container.as_str(), name.as_str())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn container(&self) -> &str {
        self.container.as_str()
    }

    async fn container_exists(&self) -> StorageResult<bool> {
        Ok(self.account.read().await.contains_key(self.container.as_str()))
    }

    async fn create_container_if_missing(&self) -> StorageResult<bool> {
        let mut account = self.account.write().await;
        if account.contains_key(self.container.as_str()) {
            return Ok(false);
        }

        account.insert(self.container.to_string(), ContainerData::default());
        Ok(true)
    }

    async fn delete_container_if_exists(&self) -> StorageResult<bool> {
        Ok(self
            .account
            .write()
            .await
            .remove(self.container.as_str())
            .is_some())
    }

    async fn put(
        &self,
        name: &BlobName,
        data: Bytes,
        metadata: Metadata,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let mut account = self.account.write().await;
        let container = account
            .get_mut(self.container.as_str())
            .ok_or_else(|| self.container_not_found())?;

        let mut blob = StoredBlob::new(name, data, BlobKind::Block, metadata);
        blob.content_type = content_type.map(str::to_string);
        container.blobs.insert(name.to_string(), blob);

        Ok(())
    }

    async fn get(&self, name: &BlobName) -> StorageResult<BlobDownload> {
        let account = self.account.read().await;
        let blob = account
            .get(self.container.as_str())
            .and_then(|c| c.blobs.get(name.as_str()))
            .ok_or_else(|| self.not_found(name))?;

        let data = blob.data.clone();
        let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(BlobDownload {
            properties: blob.properties(),
            stream: stream::iter(chunks).boxed(),
        })
    }

    async fn get_properties(&self, name: &BlobName) -> StorageResult<BlobProperties> {
        let account = self.account.read().await;
        account
            .get(self.container.as_str())
            .and_then(|c| c.blobs.get(name.as_str()))
            .map(StoredBlob::properties)
            .ok_or_else(|| self.not_found(name))
    }

    async fn set_metadata(&self, name: &BlobName, metadata: Metadata) -> StorageResult<()> {
        let mut account = self.account.write().await;
        let blob = account
            .get_mut(self.container.as_str())
            .and_then(|c| c.blobs.get_mut(name.as_str()))
            .ok_or_else(|| self.not_found(name))?;

        blob.metadata = metadata;
        blob.touch();
        Ok(())
    }

    async fn delete(&self, name: &BlobName) -> StorageResult<bool> {
        let mut account = self.account.write().await;
        Ok(account
            .get_mut(self.container.as_str())
            .and_then(|c| c.blobs.remove(name.as_str()))
            .is_some())
    }

    fn list(&self, prefix: Option<&str>) -> BlobItemStream {
        let account = self.account.clone();
        let container = self.container.to_string();
        let prefix = prefix.map(str::to_string);
        let page_size = self.page_size;

        let cursor = ListCursor {
            after: None,
            finished: false,
        };

        // one read lock per page, so writers interleave with long listings
        stream::try_unfold(cursor, move |cursor| {
            let account = account.clone();
            let container = container.clone();
            let prefix = prefix.clone();
            async move {
                if cursor.finished {
                    return Ok::<_, StorageError>(None);
                }

                let account = account.read().await;
                let data = account
                    .get(&container)
                    .ok_or_else(|| StorageError::ContainerNotFound {
                        container: container.clone(),
                    })?;

                let lower = match (&cursor.after, &prefix) {
                    (Some(after), _) => Bound::Excluded(after.clone()),
                    (None, Some(prefix)) => Bound::Included(prefix.clone()),
                    (None, None) => Bound::Unbounded,
                };

                let page: Vec<BlobItem> = data
                    .blobs
                    .range::<String, _>((lower, Bound::Unbounded))
                    .take_while(|(name, _)| {
                        prefix.as_deref().map_or(true, |p| name.starts_with(p))
                    })
                    .take(page_size)
                    .map(|(_, blob)| blob.item())
                    .collect();

                if page.is_empty() {
                    return Ok(None);
                }

                let next = ListCursor {
                    finished: page.len() < page_size,
                    after: page.last().map(|item| item.name.to_string()),
                };
                Ok(Some((stream::iter(page.into_iter().map(Ok::<_, StorageError>)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    async fn create_append_blob_if_missing(&self, name: &BlobName) -> StorageResult<bool> {
        let mut account = self.account.write().await;
        let container = account
            .get_mut(self.container.as_str())
            .ok_or_else(|| self.container_not_found())?;

        if container.blobs.contains_key(name.as_str()) {
            return Ok(false);
        }

        container.blobs.insert(
            name.to_string(),
            StoredBlob::new(name, Bytes::new(), BlobKind::Append, Metadata::new()),
        );
        Ok(true)
    }

    async fn append_block(&self, name: &BlobName, data: Bytes) -> StorageResult<()> {
        let mut account = self.account.write().await;
        let blob = account
            .get_mut(self.container.as_str())
            .and_then(|c| c.blobs.get_mut(name.as_str()))
            .ok_or_else(|| self.not_found(name))?;

        if blob.kind != BlobKind::Append {
            return Err(StorageError::WrongBlobKind {
                container: self.container.to_string(),
                name: name.to_string(),
                expected: BlobKind::Append,
                actual: blob.kind,
            });
        }

        let mut buffer = BytesMut::with_capacity(blob.data.len() + data.len());
        buffer.extend_from_slice(&blob.data);
        buffer.extend_from_slice(&data);
        blob.data = buffer.freeze();
        blob.touch();

        Ok(())
    }
}
