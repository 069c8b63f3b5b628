mod blob_name;
mod container_name;
mod payload_id;

pub use blob_name::BlobName;
pub use container_name::ContainerName;
pub use payload_id::PayloadId;
