use std::sync::Arc;

use crate::domain::models::BlobKind;

/// Underlying cause of a storage failure, shared so the error stays `Clone`
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during storage operations
#[derive(Debug, Clone)]
pub enum StorageError {
    /// The container addressed by an adapter does not exist
    ContainerNotFound { container: String },

    /// Object not found
    ObjectNotFound { container: String, name: String },

    /// Operation needs a different kind of blob (e.g. appending to a block blob)
    WrongBlobKind {
        container: String,
        name: String,
        expected: BlobKind,
        actual: BlobKind,
    },

    /// Transport, auth or serialization failure while talking to the store
    Io {
        container: String,
        name: Option<String>,
        message: String,
        source: Option<ErrorSource>,
    },

    /// A stored record could not be decoded
    Malformed {
        container: String,
        name: String,
        message: String,
        source: Option<ErrorSource>,
    },

    /// Validation error
    ValidationError { message: String },
}

impl StorageError {
    /// Build an `Io` error for a named object, keeping the cause
    pub fn io<E>(container: &str, name: &str, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Io {
            container: container.to_string(),
            name: Some(name.to_string()),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Build a `Malformed` error for a named object
    pub fn malformed(container: &str, name: &str, message: impl Into<String>) -> Self {
        StorageError::Malformed {
            container: container.to_string(),
            name: name.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(container: &str, name: &str) -> Self {
        StorageError::ObjectNotFound {
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether this error means the referenced object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ObjectNotFound { .. })
    }

    /// Wrap any failure as an `Io` error for the given write
    pub fn into_write_error(self, container: &str, name: &str) -> Self {
        match self {
            StorageError::Io { .. } => self,
            other => StorageError::Io {
                container: container.to_string(),
                name: Some(name.to_string()),
                message: format!("Could not write to blob named '{}'", name),
                source: Some(Arc::new(other)),
            },
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ContainerNotFound { container } => {
                write!(f, "Container not found: {}", container)
            }
            StorageError::ObjectNotFound { container, name } => {
                write!(
                    f,
                    "Could not find blob named '{}' in the '{}' container",
                    name, container
                )
            }
            StorageError::WrongBlobKind {
                container,
                name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Blob '{}' in the '{}' container is a {} blob, expected a {} blob",
                    name, container, actual, expected
                )
            }
            StorageError::Io {
                container,
                name,
                message,
                ..
            } => match name {
                Some(name) => write!(
                    f,
                    "Storage I/O error on blob '{}' in the '{}' container: {}",
                    name, container, message
                ),
                None => write!(
                    f,
                    "Storage I/O error on the '{}' container: {}",
                    container, message
                ),
            },
            StorageError::Malformed {
                container,
                name,
                message,
                ..
            } => {
                write!(
                    f,
                    "Malformed content in blob '{}' in the '{}' container: {}",
                    name, container, message
                )
            }
            StorageError::ValidationError { message } => {
                write!(f, "Validation error: {}", message)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io { source, .. } | StorageError::Malformed { source, .. } => source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_write_error_keeps_cause() {
        let cause = StorageError::not_found("payloads", "data-abc.dat");
        let err = cause.into_write_error("payloads", "data-abc.dat");

        assert!(matches!(err, StorageError::Io { .. }));
        assert!(err.to_string().contains("data-abc.dat"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_not_found_message_names_container() {
        let err = StorageError::not_found("snapshots", "abc/0000000001/data.json");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Could not find blob named 'abc/0000000001/data.json' in the 'snapshots' container"
        );
    }
}
