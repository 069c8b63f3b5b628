mod error_tracker_impl;
mod payload_store_impl;
mod snapshot_archive_impl;

pub use error_tracker_impl::{BlobErrorTracker, ErrorTrackerSettings};
pub use payload_store_impl::{BlobPayloadStore, PayloadStoreOptions};
pub use snapshot_archive_impl::{BlobSnapshotArchive, JSON_CONTENT_TYPE};
