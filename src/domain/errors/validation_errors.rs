/// Validation errors for domain value objects
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    // BlobName validation errors
    EmptyBlobName,
    BlobNameTooLong {
        actual: usize,
        max: usize,
    },
    InvalidBlobNameCharacter(char),
    BlobNameStartsWithSlash,
    BlobNameContainsDoubleSlash,

    // ContainerName validation errors
    ContainerNameTooShort {
        actual: usize,
        min: usize,
    },
    ContainerNameTooLong {
        actual: usize,
        max: usize,
    },
    ContainerNameInvalidStart,
    ContainerNameInvalidEnd,
    ContainerNameInvalidCharacter(char),
    ContainerNameConsecutiveHyphens,

    // Identifier validation errors (payload ids, message ids, addresses)
    EmptyIdentifier {
        kind: &'static str,
    },
    InvalidIdentifierCharacter {
        kind: &'static str,
        character: char,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // BlobName errors
            ValidationError::EmptyBlobName => write!(f, "Blob name cannot be empty"),
            ValidationError::BlobNameTooLong { actual, max } => {
                write!(f, "Blob name too long: {} bytes (max: {})", actual, max)
            }
            ValidationError::InvalidBlobNameCharacter(c) => {
                write!(f, "Invalid character in blob name: '{}'", c.escape_default())
            }
            ValidationError::BlobNameStartsWithSlash => {
                write!(f, "Blob name cannot start with '/'")
            }
            ValidationError::BlobNameContainsDoubleSlash => {
                write!(f, "Blob name cannot contain '//'")
            }

            // ContainerName errors
            ValidationError::ContainerNameTooShort { actual, min } => {
                write!(
                    f,
                    "Container name too short: {} characters (min: {})",
                    actual, min
                )
            }
            ValidationError::ContainerNameTooLong { actual, max } => {
                write!(
                    f,
                    "Container name too long: {} characters (max: {})",
                    actual, max
                )
            }
            ValidationError::ContainerNameInvalidStart => {
                write!(f, "Container name must start with lowercase letter or number")
            }
            ValidationError::ContainerNameInvalidEnd => {
                write!(f, "Container name must end with lowercase letter or number")
            }
            ValidationError::ContainerNameInvalidCharacter(c) => {
                write!(
                    f,
                    "Invalid character in container name: '{}'. Only lowercase letters, numbers, and hyphens allowed",
                    c
                )
            }
            ValidationError::ContainerNameConsecutiveHyphens => {
                write!(f, "Container name cannot contain consecutive hyphens")
            }

            ValidationError::EmptyIdentifier { kind } => {
                write!(f, "{} cannot be empty", kind)
            }
            ValidationError::InvalidIdentifierCharacter { kind, character } => {
                write!(
                    f,
                    "Invalid character in {}: '{}'",
                    kind,
                    character.escape_default()
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for crate::domain::errors::StorageError {
    fn from(err: ValidationError) -> Self {
        crate::domain::errors::StorageError::ValidationError {
            message: err.to_string(),
        }
    }
}
