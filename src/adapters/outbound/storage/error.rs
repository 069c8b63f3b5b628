use std::sync::Arc;

use crate::domain::errors::StorageError;

/// Convert an `object_store` error raised while working on `name` into a domain error
pub fn map_object_store_error(err: object_store::Error, container: &str, name: &str) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::not_found(container, name),
        other => StorageError::Io {
            container: container.to_string(),
            name: Some(name.to_string()),
            message: format!("Object store operation failed: {}", other),
            source: Some(Arc::new(other)),
        },
    }
}

/// Convert an `object_store` error raised by a container-wide operation
pub fn map_container_error(err: object_store::Error, container: &str) -> StorageError {
    StorageError::Io {
        container: container.to_string(),
        name: None,
        message: format!("Object store operation failed: {}", err),
        source: Some(Arc::new(err)),
    }
}

/// Readers built on top of blob streams surface storage failures as I/O errors
impl From<StorageError> for std::io::Error {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::ObjectNotFound { .. } | StorageError::ContainerNotFound { .. } => {
                std::io::ErrorKind::NotFound
            }
            StorageError::Malformed { .. } | StorageError::ValidationError { .. } => {
                std::io::ErrorKind::InvalidData
            }
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
