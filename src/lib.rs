pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;
pub mod services;

// Re-export key types for convenience

// Domain types - blob model, saga snapshots, failure records and value objects
pub use domain::{
    // Models
    BlobItem,
    BlobKind,
    BlobProperties,
    // Value objects
    BlobName,
    ContainerName,
    DomainValidationError,
    DynSagaData,
    FailureInfo,
    FailureRecord,
    Metadata,
    PayloadId,
    SagaData,
    SagaDataRegistry,
    SagaSnapshot,
    SnapshotDocument,
    SnapshotDocumentRef,
    // Errors
    StorageError,
    StorageResult,
    TimeRange,
};

// Port types - interfaces for external systems
pub use ports::{
    // Storage port
    BlobDownload,
    BlobItemStream,
    BlobStore,
    Clock,
    // Service ports
    ErrorTracker,
    PayloadReader,
    PayloadStore,
    SnapshotArchive,
};

// Service implementations - adapter logic on top of a blob store
pub use services::{
    BlobErrorTracker, BlobPayloadStore, BlobSnapshotArchive, ErrorTrackerSettings,
    PayloadStoreOptions,
};

// Application factory and configuration
pub use app::{
    create_app_from_env, create_in_memory_app, AppBuilder, AppConfig, AppDependencies, AppError,
    AppServices, StorageBackend,
};

// Adapter types - infrastructure implementations
pub use adapters::outbound::{
    clock::{ManualClock, SystemClock},
    storage::{InMemoryBlobStore, ObjectStoreBlobStore},
};

// Public facade for easy construction
pub mod prelude {
    pub use crate::{
        create_in_memory_app, AppBuilder, AppServices, BlobErrorTracker, BlobPayloadStore,
        BlobSnapshotArchive, BlobStore, ErrorTracker, FailureInfo, InMemoryBlobStore, Metadata,
        ObjectStoreBlobStore, PayloadId, PayloadStore, SagaData, SagaDataRegistry,
        SnapshotArchive, StorageError, TimeRange,
    };
}
