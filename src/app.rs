use object_store::{memory::InMemory, ObjectStore as ObjectStoreBackend};
use std::sync::Arc;
use tracing::info;

use crate::{
    adapters::outbound::{
        clock::SystemClock,
        storage::{
            create_azure_store, create_s3_store, AzureConfig, InMemoryBlobStore,
            ObjectStoreBlobStore, S3Config,
        },
    },
    domain::{errors::StorageError, models::SagaDataRegistry, value_objects::ContainerName},
    ports::{storage::BlobStore, Clock},
    services::{
        BlobErrorTracker, BlobPayloadStore, BlobSnapshotArchive, ErrorTrackerSettings,
        PayloadStoreOptions,
    },
};

pub const DEFAULT_PAYLOAD_CONTAINER: &str = "payloads";
pub const DEFAULT_SNAPSHOT_CONTAINER: &str = "snapshots";
pub const DEFAULT_ERROR_CONTAINER: &str = "errors";
pub const DEFAULT_DESTINATION_ADDRESS: &str = "input-queue";
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub payload_container: String,
    pub snapshot_container: String,
    pub error_container: String,
    /// Queue whose failed messages the error tracker records
    pub destination_address: String,
    pub max_delivery_attempts: u32,
    pub payload_options: PayloadStoreOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::InMemory,
            payload_container: DEFAULT_PAYLOAD_CONTAINER.to_string(),
            snapshot_container: DEFAULT_SNAPSHOT_CONTAINER.to_string(),
            error_container: DEFAULT_ERROR_CONTAINER.to_string(),
            destination_address: DEFAULT_DESTINATION_ADDRESS.to_string(),
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            payload_options: PayloadStoreOptions::default(),
        }
    }
}

impl AppConfig {
    /// Read the configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, AppError> {
        let storage_backend = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") => StorageBackend::S3 {
                bucket: required_env("S3_BUCKET")?,
                region: required_env("S3_REGION")?,
                access_key: std::env::var("S3_ACCESS_KEY").ok(),
                secret_key: std::env::var("S3_SECRET_KEY").ok(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                allow_http: flag_env("S3_ALLOW_HTTP"),
            },
            Ok("azure") => StorageBackend::Azure {
                account: required_env("AZURE_STORAGE_ACCOUNT")?,
                access_key: std::env::var("AZURE_STORAGE_ACCESS_KEY").ok(),
                container: required_env("AZURE_STORAGE_CONTAINER")?,
                use_emulator: flag_env("AZURE_USE_EMULATOR"),
            },
            Ok("object-store-memory") => StorageBackend::ObjectStoreMemory,
            Ok("memory") | Err(_) => StorageBackend::InMemory,
            Ok(other) => {
                return Err(AppError::Configuration {
                    message: format!("Unknown STORAGE_BACKEND '{}'", other),
                })
            }
        };

        let defaults = Self::default();
        let max_delivery_attempts = match std::env::var("MAX_DELIVERY_ATTEMPTS") {
            Ok(value) => value.parse().map_err(|_| AppError::Configuration {
                message: format!("MAX_DELIVERY_ATTEMPTS must be a number, got '{}'", value),
            })?,
            Err(_) => defaults.max_delivery_attempts,
        };

        Ok(Self {
            storage_backend,
            payload_container: std::env::var("PAYLOAD_CONTAINER")
                .unwrap_or(defaults.payload_container),
            snapshot_container: std::env::var("SNAPSHOT_CONTAINER")
                .unwrap_or(defaults.snapshot_container),
            error_container: std::env::var("ERROR_CONTAINER").unwrap_or(defaults.error_container),
            destination_address: std::env::var("DESTINATION_ADDRESS")
                .unwrap_or(defaults.destination_address),
            max_delivery_attempts,
            payload_options: PayloadStoreOptions::builder()
                .update_last_read_time(
                    std::env::var("UPDATE_LAST_READ_TIME")
                        .map(|v| v.to_lowercase() != "false")
                        .unwrap_or(true),
                )
                .build(),
        })
    }
}

fn required_env(name: &str) -> Result<String, AppError> {
    std::env::var(name).map_err(|_| AppError::Configuration {
        message: format!("{} environment variable required", name),
    })
}

fn flag_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Storage backend configuration
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Process-local blob store with native append blobs
    InMemory,
    /// `object_store`'s in-memory backend behind the generic adapter
    ObjectStoreMemory,
    S3 {
        bucket: String,
        region: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        endpoint: Option<String>,
        allow_http: bool,
    },
    Azure {
        account: String,
        access_key: Option<String>,
        container: String,
        use_emulator: bool,
    },
}

/// Application dependencies container
pub struct AppDependencies {
    pub payload_blobs: Arc<dyn BlobStore>,
    pub snapshot_blobs: Arc<dyn BlobStore>,
    pub error_blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
}

/// Application services container
pub struct AppServices {
    pub payload_store: Arc<BlobPayloadStore>,
    pub snapshot_archive: Arc<BlobSnapshotArchive>,
    pub error_tracker: Arc<BlobErrorTracker>,
}

/// Application builder for dependency injection
pub struct AppBuilder {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    registry: SagaDataRegistry,
}

impl AppBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
            registry: SagaDataRegistry::new(),
        }
    }

    /// Configure the application with custom settings
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure storage backend
    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage_backend = backend;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Saga data variants the snapshot archive can read back
    pub fn with_saga_registry(mut self, registry: SagaDataRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_destination_address(mut self, address: impl Into<String>) -> Self {
        self.config.destination_address = address.into();
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.config.max_delivery_attempts = attempts;
        self
    }

    /// Build the application dependencies
    pub fn build_dependencies(&self) -> Result<AppDependencies, AppError> {
        let payload = container_name(&self.config.payload_container)?;
        let snapshots = container_name(&self.config.snapshot_container)?;
        let errors = container_name(&self.config.error_container)?;

        let (payload_blobs, snapshot_blobs, error_blobs): (
            Arc<dyn BlobStore>,
            Arc<dyn BlobStore>,
            Arc<dyn BlobStore>,
        ) = match &self.config.storage_backend {
            StorageBackend::InMemory => {
                let account = InMemoryBlobStore::new(payload);
                let snapshot_blobs = account.container_handle(snapshots);
                let error_blobs = account.container_handle(errors);
                (
                    Arc::new(account),
                    Arc::new(snapshot_blobs),
                    Arc::new(error_blobs),
                )
            }
            backend => {
                let store = create_backend(backend)?;
                (
                    Arc::new(ObjectStoreBlobStore::new(store.clone(), payload)),
                    Arc::new(ObjectStoreBlobStore::new(store.clone(), snapshots)),
                    Arc::new(ObjectStoreBlobStore::new(store, errors)),
                )
            }
        };

        Ok(AppDependencies {
            payload_blobs,
            snapshot_blobs,
            error_blobs,
            clock: self.clock.clone(),
        })
    }

    /// Build the complete application with services
    pub async fn build(self) -> Result<AppServices, AppError> {
        let deps = self.build_dependencies()?;

        let payload_store = BlobPayloadStore::new(
            deps.payload_blobs,
            deps.clock.clone(),
            self.config.payload_options,
        );

        let snapshot_archive =
            BlobSnapshotArchive::open(deps.snapshot_blobs, Arc::new(self.registry)).await?;

        let error_tracker = BlobErrorTracker::new(
            deps.error_blobs,
            deps.clock,
            ErrorTrackerSettings::builder()
                .destination_address(self.config.destination_address.clone())
                .max_delivery_attempts(self.config.max_delivery_attempts)
                .build(),
        );

        info!(
            backend = ?self.config.storage_backend,
            destination = %self.config.destination_address,
            "Blob storage adapters ready"
        );

        Ok(AppServices {
            payload_store: Arc::new(payload_store),
            snapshot_archive: Arc::new(snapshot_archive),
            error_tracker: Arc::new(error_tracker),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn container_name(value: &str) -> Result<ContainerName, AppError> {
    ContainerName::new(value).map_err(|e| AppError::Configuration {
        message: format!("Invalid container name '{}': {}", value, e),
    })
}

fn create_backend(backend: &StorageBackend) -> Result<Arc<dyn ObjectStoreBackend>, AppError> {
    let store = match backend {
        StorageBackend::InMemory | StorageBackend::ObjectStoreMemory => {
            return Ok(Arc::new(InMemory::new()))
        }
        StorageBackend::S3 {
            bucket,
            region,
            access_key,
            secret_key,
            endpoint,
            allow_http,
        } => create_s3_store(S3Config {
            bucket: bucket.clone(),
            region: region.clone(),
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
            endpoint: endpoint.clone(),
            allow_http: *allow_http,
        }),
        StorageBackend::Azure {
            account,
            access_key,
            container,
            use_emulator,
        } => create_azure_store(AzureConfig {
            account: account.clone(),
            access_key: access_key.clone(),
            container: container.clone(),
            use_emulator: *use_emulator,
        }),
    };

    store.map_err(|e| AppError::StorageInit {
        message: format!("{:#}", e),
    })
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage initialization error: {message}")]
    StorageInit { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Create an in-memory application for testing and development
pub async fn create_in_memory_app() -> Result<AppServices, AppError> {
    AppBuilder::new()
        .with_storage_backend(StorageBackend::InMemory)
        .build()
        .await
}

/// Create application from environment variables
pub async fn create_app_from_env() -> Result<AppServices, AppError> {
    AppBuilder::new()
        .with_config(AppConfig::from_env()?)
        .build()
        .await
}
