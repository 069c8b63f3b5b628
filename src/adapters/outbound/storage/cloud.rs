use anyhow::{Context, Result};
use object_store::{
    aws::{AmazonS3Builder, S3ConditionalPut},
    azure::MicrosoftAzureBuilder,
    ObjectStore as ObjectStoreBackend,
};
use std::sync::Arc;

/// Configuration for an S3 (or S3-compatible) backend
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
    /// Needed for plain-http endpoints such as a local MinIO
    pub allow_http: bool,
}

/// Create an S3 store from configuration
///
/// Conditional puts use ETag matching so append-blob creation stays
/// create-if-absent on S3.
pub fn create_s3_store(config: S3Config) -> Result<Arc<dyn ObjectStoreBackend>> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_conditional_put(S3ConditionalPut::ETagMatch)
        .with_allow_http(config.allow_http);

    if let Some(access_key) = &config.access_key {
        builder = builder.with_access_key_id(access_key);
    }

    if let Some(secret_key) = &config.secret_key {
        builder = builder.with_secret_access_key(secret_key);
    }

    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    let store = builder.build().context("Failed to build S3 store")?;

    Ok(Arc::new(store))
}

/// Configuration for an Azure Blob Storage backend
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub account: String,
    pub access_key: Option<String>,
    /// Storage container holding every adapter's prefix
    pub container: String,
    /// Talk to a local Azurite instance instead of the public endpoint
    pub use_emulator: bool,
}

/// Create an Azure Blob Storage store from configuration
pub fn create_azure_store(config: AzureConfig) -> Result<Arc<dyn ObjectStoreBackend>> {
    let mut builder = MicrosoftAzureBuilder::new()
        .with_account(&config.account)
        .with_container_name(&config.container)
        .with_use_emulator(config.use_emulator);

    if let Some(access_key) = &config.access_key {
        builder = builder.with_access_key(access_key);
    }

    let store = builder
        .build()
        .with_context(|| format!("Failed to build Azure store for account '{}'", config.account))?;

    Ok(Arc::new(store))
}
