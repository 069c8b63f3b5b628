use async_trait::async_trait;

use crate::domain::{
    errors::StorageResult,
    models::{FailureInfo, FailureRecord},
};

/// Port for tracking failed delivery attempts per message
#[async_trait]
pub trait ErrorTracker: Send + Sync + 'static {
    /// Record one failure for the message
    async fn register_error(&self, message_id: &str, failure: FailureInfo) -> StorageResult<()>;

    /// Forget everything about the message; unknown ids succeed
    async fn clean_up(&self, message_id: &str) -> StorageResult<()>;

    /// Whether no more delivery attempts should be made
    async fn has_exceeded_limit(&self, message_id: &str) -> StorageResult<bool>;

    /// The stored log lines joined by newlines
    async fn get_full_description(&self, message_id: &str) -> StorageResult<String>;

    /// All recorded failures in the order they were registered
    async fn get_failure_records(&self, message_id: &str) -> StorageResult<Vec<FailureRecord>>;

    /// Flag the message as final regardless of its failure count
    async fn mark_as_final(&self, message_id: &str) -> StorageResult<()>;

    /// Cached failure counter kept in the log's metadata
    async fn error_count(&self, message_id: &str) -> StorageResult<u32>;

    /// Count the records in the log and store that number as the cached counter
    async fn recompute_error_count(&self, message_id: &str) -> StorageResult<u32>;
}
