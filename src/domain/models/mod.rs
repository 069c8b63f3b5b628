pub mod blob;
pub mod failure;
pub mod metadata;
pub mod saga;
pub mod time_range;

pub use blob::*;
pub use failure::*;
pub use saga::{
    DynSagaData, SagaCodecError, SagaData, SagaDataRegistry, SagaSnapshot, SnapshotDocument,
    SnapshotDocumentRef,
};
pub use time_range::*;
