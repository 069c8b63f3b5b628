pub mod error_tracker;
pub mod payload_store;
pub mod snapshot_archive;

pub use error_tracker::ErrorTracker;
pub use payload_store::{PayloadReader, PayloadStore};
pub use snapshot_archive::SnapshotArchive;
