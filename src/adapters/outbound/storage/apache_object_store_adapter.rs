use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt, TryStreamExt};
use object_store::{
    path::Path as ObjectPath, Attribute, AttributeValue, Attributes, GetOptions, GetResult,
    ObjectStore as ApacheObjectStore, PutMode, PutOptions, PutPayload,
};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    adapters::outbound::storage::error::{map_container_error, map_object_store_error},
    domain::{
        errors::{StorageError, StorageResult},
        models::{BlobItem, BlobKind, BlobProperties, Metadata},
        value_objects::{BlobName, ContainerName},
    },
    ports::storage::{BlobDownload, BlobItemStream, BlobStore},
};

/// Object marking that a container exists
const CONTAINER_MARKER: &str = ".container";

/// Reserved metadata attribute recording the blob kind
const BLOB_KIND_ATTRIBUTE: &str = "blob-kind";

/// BlobStore backed by any Apache `object_store` implementation.
///
/// A container is the path prefix `<container>/` guarded by a marker object.
/// Blob metadata travels as `Attribute::Metadata` entries, so the backend must
/// support attributes (in-memory, S3 and Azure do; the local file system does
/// not). Object stores cannot append, so append blobs are rewritten whole on
/// every append; appends and metadata updates made through one adapter
/// instance are serialized by a single writer lock.
pub struct ObjectStoreBlobStore {
    inner: Arc<dyn ApacheObjectStore>,
    container: ContainerName,
    writer: Mutex<()>,
}

impl ObjectStoreBlobStore {
    pub fn new(store: Arc<dyn ApacheObjectStore>, container: ContainerName) -> Self {
        Self {
            inner: store,
            container,
            writer: Mutex::new(()),
        }
    }

    fn root(&self) -> ObjectPath {
        ObjectPath::from(self.container.as_str())
    }

    fn marker_path(&self) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.container, CONTAINER_MARKER))
    }

    fn path(&self, name: &BlobName) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.container, name))
    }

    fn map_err(&self, name: &BlobName) -> impl Fn(object_store::Error) -> StorageError + '_ {
        let name = name.to_string();
        move |err| map_object_store_error(err, self.container.as_str(), &name)
    }

    async fn ensure_container(&self) -> StorageResult<()> {
        if self.container_exists().await? {
            Ok(())
        } else {
            Err(StorageError::ContainerNotFound {
                container: self.container.to_string(),
            })
        }
    }

    async fn put_with(
        &self,
        name: &BlobName,
        data: Bytes,
        attributes: Attributes,
        mode: PutMode,
    ) -> Result<(), object_store::Error> {
        let options = PutOptions {
            mode,
            attributes,
            ..Default::default()
        };
        self.inner
            .put_opts(&self.path(name), PutPayload::from(data), options)
            .await
            .map(|_| ())
    }

    /// Download content and attributes in one request
    async fn read_whole(&self, name: &BlobName) -> StorageResult<(Bytes, Attributes)> {
        let result = self.inner.get(&self.path(name)).await.map_err(self.map_err(name))?;
        let attributes = result.attributes.clone();
        let data = result.bytes().await.map_err(self.map_err(name))?;
        Ok((data, attributes))
    }

    fn properties(&self, name: &BlobName, result: &GetResult) -> BlobProperties {
        let (kind, content_type, metadata) = split_attributes(&result.attributes);
        BlobProperties {
            name: name.clone(),
            size: result.meta.size,
            kind,
            etag: result.meta.e_tag.clone(),
            last_modified: result.meta.last_modified,
            content_type,
            metadata,
        }
    }
}

fn kind_value(kind: BlobKind) -> &'static str {
    match kind {
        BlobKind::Block => "block",
        BlobKind::Append => "append",
    }
}

fn build_attributes(kind: BlobKind, content_type: Option<&str>, metadata: Metadata) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(
        Attribute::Metadata(Cow::Borrowed(BLOB_KIND_ATTRIBUTE)),
        AttributeValue::from(kind_value(kind)),
    );
    if let Some(content_type) = content_type {
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
    }
    for (key, value) in metadata {
        attributes.insert(Attribute::Metadata(Cow::Owned(key)), AttributeValue::from(value));
    }
    attributes
}

/// Separate the reserved attributes from user metadata
fn split_attributes(attributes: &Attributes) -> (BlobKind, Option<String>, Metadata) {
    let mut kind = BlobKind::Block;
    let mut content_type = None;
    let mut metadata = Metadata::new();

    for (attribute, value) in attributes.iter() {
        let value: &str = value.as_ref();
        match attribute {
            Attribute::Metadata(key) if key == BLOB_KIND_ATTRIBUTE => {
                if value == kind_value(BlobKind::Append) {
                    kind = BlobKind::Append;
                }
            }
            Attribute::Metadata(key) => {
                metadata.insert(key.to_string(), value.to_string());
            }
            Attribute::ContentType => content_type = Some(value.to_string()),
            _ => {}
        }
    }

    (kind, content_type, metadata)
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    fn container(&self) -> &str {
        self.container.as_str()
    }

    async fn container_exists(&self) -> StorageResult<bool> {
        match self.inner.head(&self.marker_path()).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_container_error(e, self.container.as_str())),
        }
    }

    async fn create_container_if_missing(&self) -> StorageResult<bool> {
        let options = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };

        match self
            .inner
            .put_opts(&self.marker_path(), PutPayload::from(Bytes::new()), options)
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(map_container_error(e, self.container.as_str())),
        }
    }

    async fn delete_container_if_exists(&self) -> StorageResult<bool> {
        let existed = self.container_exists().await?;

        let locations: Vec<ObjectPath> = self
            .inner
            .list(Some(&self.root()))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| map_container_error(e, self.container.as_str()))?;

        for location in locations {
            match self.inner.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(map_container_error(e, self.container.as_str())),
            }
        }

        Ok(existed)
    }

    async fn put(
        &self,
        name: &BlobName,
        data: Bytes,
        metadata: Metadata,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.ensure_container().await?;

        let attributes = build_attributes(BlobKind::Block, content_type, metadata);
        self.put_with(name, data, attributes, PutMode::Overwrite)
            .await
            .map_err(self.map_err(name))
    }

    async fn get(&self, name: &BlobName) -> StorageResult<BlobDownload> {
        let result = self.inner.get(&self.path(name)).await.map_err(self.map_err(name))?;
        let properties = self.properties(name, &result);

        let container = self.container.to_string();
        let blob = name.to_string();
        let stream = result
            .into_stream()
            .map_err(move |e| map_object_store_error(e, &container, &blob))
            .boxed();

        Ok(BlobDownload { properties, stream })
    }

    async fn get_properties(&self, name: &BlobName) -> StorageResult<BlobProperties> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .inner
            .get_opts(&self.path(name), options)
            .await
            .map_err(self.map_err(name))?;

        Ok(self.properties(name, &result))
    }

    async fn set_metadata(&self, name: &BlobName, metadata: Metadata) -> StorageResult<()> {
        let _writer = self.writer.lock().await;

        let (data, attributes) = self.read_whole(name).await?;
        let (kind, content_type, _) = split_attributes(&attributes);
        let attributes = build_attributes(kind, content_type.as_deref(), metadata);

        self.put_with(name, data, attributes, PutMode::Overwrite)
            .await
            .map_err(self.map_err(name))
    }

    async fn delete(&self, name: &BlobName) -> StorageResult<bool> {
        let path = self.path(name);

        match self.inner.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(self.map_err(name)(e)),
        }

        match self.inner.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.map_err(name)(e)),
        }
    }

    fn list(&self, prefix: Option<&str>) -> BlobItemStream {
        let inner = self.inner.clone();
        let container = self.container.to_string();
        let prefix = prefix.map(str::to_string);

        // object_store prefixes match whole path segments, so list the deepest
        // complete directory and filter the rest by name
        let directory = match prefix.as_deref().and_then(|p| p.rsplit_once('/')) {
            Some((dir, _)) if !dir.is_empty() => ObjectPath::from(format!("{}/{}", container, dir)),
            _ => ObjectPath::from(container.as_str()),
        };
        let marker = ObjectPath::from(format!("{}/{}", container, CONTAINER_MARKER));

        let listing = async move {
            match inner.head(&marker).await {
                Ok(_) => {}
                Err(object_store::Error::NotFound { .. }) => {
                    return Err(StorageError::ContainerNotFound { container });
                }
                Err(e) => return Err(map_container_error(e, &container)),
            }

            let strip = format!("{}/", container);
            let items = inner
                .list(Some(&directory))
                .map_err({
                    let container = container.clone();
                    move |e| map_container_error(e, &container)
                })
                .try_filter_map(move |meta| {
                    let item = meta
                        .location
                        .as_ref()
                        .strip_prefix(strip.as_str())
                        .and_then(decode_location)
                        .filter(|name| *name != CONTAINER_MARKER)
                        .filter(|name| prefix.as_deref().map_or(true, |p| name.starts_with(p)))
                        .and_then(|name| BlobName::new(name.into_owned()).ok())
                        .map(|name| BlobItem {
                            name,
                            size: meta.size,
                            last_modified: meta.last_modified,
                        });
                    futures::future::ready(Ok(item))
                });

            Ok(items)
        };

        stream::once(listing).try_flatten().boxed()
    }

    async fn create_append_blob_if_missing(&self, name: &BlobName) -> StorageResult<bool> {
        self.ensure_container().await?;

        let attributes = build_attributes(BlobKind::Append, None, Metadata::new());
        match self
            .put_with(name, Bytes::new(), attributes, PutMode::Create)
            .await
        {
            Ok(()) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(self.map_err(name)(e)),
        }
    }

    async fn append_block(&self, name: &BlobName, data: Bytes) -> StorageResult<()> {
        let _writer = self.writer.lock().await;

        let (existing, attributes) = self.read_whole(name).await?;
        let (kind, _, _) = split_attributes(&attributes);
        if kind != BlobKind::Append {
            return Err(StorageError::WrongBlobKind {
                container: self.container.to_string(),
                name: name.to_string(),
                expected: BlobKind::Append,
                actual: kind,
            });
        }

        let mut buffer = BytesMut::with_capacity(existing.len() + data.len());
        buffer.extend_from_slice(&existing);
        buffer.extend_from_slice(&data);

        self.put_with(name, buffer.freeze(), attributes, PutMode::Overwrite)
            .await
            .map_err(self.map_err(name))
    }
}

impl std::fmt::Debug for ObjectStoreBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBlobStore")
            .field("store", &self.inner.to_string())
            .field("container", &self.container)
            .finish()
    }
}

/// Listed locations come back percent-encoded (`#` as `%23`); recover the
/// name that was written
fn decode_location(encoded: &str) -> Option<Cow<'_, str>> {
    urlencoding::decode(encoded).ok()
}
