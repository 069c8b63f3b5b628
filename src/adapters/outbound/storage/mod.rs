// Infrastructure error mapping
pub mod error;

// Blob store implementations
pub mod apache_object_store_adapter;
pub mod in_memory_blob_store;

// Cloud backends for the object_store adapter
pub mod cloud;

// Re-export key types
pub use apache_object_store_adapter::ObjectStoreBlobStore;
pub use cloud::{create_azure_store, create_s3_store, AzureConfig, S3Config};
pub use in_memory_blob_store::InMemoryBlobStore;
