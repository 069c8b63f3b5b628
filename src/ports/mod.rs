pub mod clock;
pub mod services;
pub mod storage;

// Re-export all port traits for convenience
pub use clock::Clock;
pub use services::{ErrorTracker, PayloadReader, PayloadStore, SnapshotArchive};
pub use storage::{BlobByteStream, BlobDownload, BlobItemStream, BlobStore};
