use async_trait::async_trait;
use bon::Builder;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{
        errors::{StorageError, StorageResult, ValidationError as DomainValidationError},
        models::{
            metadata::{is_flag_set, ERROR_COUNT, IS_FINAL},
            BlobProperties, FailureInfo, FailureRecord, Metadata,
        },
        value_objects::BlobName,
    },
    ports::{services::ErrorTracker, storage::BlobStore, Clock},
};

/// Line terminator written after every record
const RECORD_TERMINATOR: &[u8] = b"\r\n";

/// Settings for [`BlobErrorTracker`]
#[derive(Debug, Clone, Builder)]
pub struct ErrorTrackerSettings {
    /// Queue or endpoint whose messages are tracked; namespaces the log blobs
    #[builder(into)]
    pub destination_address: String,
    /// Number of failed deliveries after which a message is final
    #[builder(default = 5)]
    pub max_delivery_attempts: u32,
}

/// Error tracker keeping one append blob per message:
/// `<destination-address>/<message-id>-errors.jsonl`, one JSON record per line.
///
/// The number of failures is cached in the `ErrorCount` metadata entry. The
/// append and the counter update are two separate writes, so concurrent
/// workers failing the same message can leave the counter behind the log;
/// [`ErrorTracker::recompute_error_count`] repairs it from the log itself.
pub struct BlobErrorTracker {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    settings: ErrorTrackerSettings,
    container_ready: OnceCell<()>,
}

impl BlobErrorTracker {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, settings: ErrorTrackerSettings) -> Self {
        Self {
            blobs,
            clock,
            settings,
            container_ready: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &ErrorTrackerSettings {
        &self.settings
    }

    fn log_name(&self, message_id: &str) -> StorageResult<BlobName> {
        if self.settings.destination_address.trim().is_empty() {
            return Err(DomainValidationError::EmptyIdentifier {
                kind: "Destination address",
            }
            .into());
        }
        if message_id.trim().is_empty() {
            return Err(DomainValidationError::EmptyIdentifier { kind: "Message id" }.into());
        }
        if let Some(character) = message_id.chars().find(|c| *c == '/' || c.is_control()) {
            return Err(DomainValidationError::InvalidIdentifierCharacter {
                kind: "message id",
                character,
            }
            .into());
        }

        Ok(BlobName::new(format!(
            "{}/{}-errors.jsonl",
            self.settings.destination_address, message_id
        ))?)
    }

    async fn ensure_container(&self) -> StorageResult<()> {
        self.container_ready
            .get_or_try_init(|| async {
                if self.blobs.create_container_if_missing().await? {
                    info!("Created container {} for error logs", self.blobs.container());
                }
                Ok::<_, StorageError>(())
            })
            .await?;
        Ok(())
    }

    async fn properties_if_exists(&self, name: &BlobName) -> StorageResult<Option<BlobProperties>> {
        match self.blobs.get_properties(name).await {
            Ok(properties) => Ok(Some(properties)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ensure_log(&self, name: &BlobName) -> StorageResult<()> {
        self.ensure_container().await?;
        if self.blobs.create_append_blob_if_missing(name).await? {
            debug!(blob = %name, "Created error log");
        }
        Ok(())
    }

    /// Non-blank lines of the log as stored, `None` when there is no log
    async fn read_lines(&self, name: &BlobName) -> StorageResult<Option<Vec<String>>> {
        let content = match self.blobs.get(name).await {
            Ok(download) => download.bytes().await?,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let text = std::str::from_utf8(&content).map_err(|e| StorageError::Malformed {
            container: self.blobs.container().to_string(),
            name: name.to_string(),
            message: "Error log is not valid UTF-8".to_string(),
            source: Some(Arc::new(e)),
        })?;

        Ok(Some(
            text.split('\n')
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    async fn read_records(&self, name: &BlobName) -> StorageResult<Option<Vec<FailureRecord>>> {
        let Some(lines) = self.read_lines(name).await? else {
            return Ok(None);
        };

        let container = self.blobs.container();
        let mut records = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let record = serde_json::from_str(line).map_err(|e| StorageError::Malformed {
                container: container.to_string(),
                name: name.to_string(),
                message: format!("Could not parse record {} of the error log: {}", index + 1, e),
                source: Some(Arc::new(e)),
            })?;
            records.push(record);
        }

        Ok(Some(records))
    }
}

fn cached_count(metadata: &Metadata) -> u32 {
    metadata
        .get(ERROR_COUNT)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl ErrorTracker for BlobErrorTracker {
    async fn register_error(&self, message_id: &str, failure: FailureInfo) -> StorageResult<()> {
        let name = self.log_name(message_id)?;
        let container = self.blobs.container();

        self.ensure_log(&name)
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        let mut metadata = self.blobs.get_properties(&name).await?.metadata;
        let error_count = cached_count(&metadata).saturating_add(1);

        let record = FailureRecord {
            time: self.clock.now(),
            attempt: error_count,
            info: failure,
        };
        let mut line = serde_json::to_vec(&record).map_err(|e| {
            StorageError::io(container, name.as_str(), "Could not serialize failure record", e)
        })?;
        line.extend_from_slice(RECORD_TERMINATOR);

        self.blobs
            .append_block(&name, Bytes::from(line))
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        metadata.insert(ERROR_COUNT.to_string(), error_count.to_string());
        let is_final = is_flag_set(metadata.get(IS_FINAL))
            || error_count >= self.settings.max_delivery_attempts;

        self.blobs
            .set_metadata(&name, metadata)
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        if is_final {
            error!(
                message_id,
                error_count,
                is_final,
                error_type = %record.info.error_type,
                "Unhandled exception {} while handling message with ID {}: {}",
                error_count,
                message_id,
                record.info.message
            );
        } else {
            warn!(
                message_id,
                error_count,
                is_final,
                error_type = %record.info.error_type,
                "Unhandled exception {} while handling message with ID {}: {}",
                error_count,
                message_id,
                record.info.message
            );
        }

        Ok(())
    }

    async fn clean_up(&self, message_id: &str) -> StorageResult<()> {
        let name = self.log_name(message_id)?;
        if self.blobs.delete(&name).await? {
            debug!(blob = %name, "Deleted error log");
        }
        Ok(())
    }

    async fn has_exceeded_limit(&self, message_id: &str) -> StorageResult<bool> {
        let name = self.log_name(message_id)?;
        let Some(properties) = self.properties_if_exists(&name).await? else {
            return Ok(false);
        };

        Ok(is_flag_set(properties.metadata.get(IS_FINAL))
            || cached_count(&properties.metadata) >= self.settings.max_delivery_attempts)
    }

    async fn get_full_description(&self, message_id: &str) -> StorageResult<String> {
        let name = self.log_name(message_id)?;
        let lines = self.read_lines(&name).await?.unwrap_or_default();

        Ok(lines.join("\n"))
    }

    async fn get_failure_records(&self, message_id: &str) -> StorageResult<Vec<FailureRecord>> {
        let name = self.log_name(message_id)?;
        Ok(self.read_records(&name).await?.unwrap_or_default())
    }

    async fn mark_as_final(&self, message_id: &str) -> StorageResult<()> {
        let name = self.log_name(message_id)?;
        let container = self.blobs.container();

        self.ensure_log(&name)
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        let mut metadata = self.blobs.get_properties(&name).await?.metadata;
        metadata.insert(IS_FINAL.to_string(), "true".to_string());
        self.blobs
            .set_metadata(&name, metadata)
            .await
            .map_err(|e| e.into_write_error(container, name.as_str()))?;

        info!(message_id, "Marked message as final");
        Ok(())
    }

    async fn error_count(&self, message_id: &str) -> StorageResult<u32> {
        let name = self.log_name(message_id)?;
        Ok(self
            .properties_if_exists(&name)
            .await?
            .map(|properties| cached_count(&properties.metadata))
            .unwrap_or(0))
    }

    async fn recompute_error_count(&self, message_id: &str) -> StorageResult<u32> {
        let name = self.log_name(message_id)?;
        let Some(properties) = self.properties_if_exists(&name).await? else {
            return Ok(0);
        };
        let Some(records) = self.read_records(&name).await? else {
            return Ok(0);
        };

        let count = u32::try_from(records.len()).unwrap_or(u32::MAX);
        let cached = cached_count(&properties.metadata);
        if cached != count {
            warn!(
                message_id,
                cached, count, "Cached error count differs from the error log"
            );
        }

        let mut metadata = properties.metadata;
        metadata.insert(ERROR_COUNT.to_string(), count.to_string());
        self.blobs
            .set_metadata(&name, metadata)
            .await
            .map_err(|e| e.into_write_error(self.blobs.container(), name.as_str()))?;

        Ok(count)
    }
}
