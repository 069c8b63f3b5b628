use crate::domain::{errors::ValidationError, value_objects::BlobName};

/// Caller-supplied identifier of a stored payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadId(String);

impl PayloadId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier { kind: "Payload ID" });
        }

        if let Some(c) = value.chars().find(|c| *c == '/' || c.is_control()) {
            return Err(ValidationError::InvalidIdentifierCharacter {
                kind: "payload ID",
                character: c,
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the blob holding this payload: `data-<lowercased id>.dat`
    pub fn blob_name(&self) -> Result<BlobName, ValidationError> {
        BlobName::new(format!("data-{}.dat", self.0.to_lowercase()))
    }

    /// Recover the id from a listed blob name.
    ///
    /// Strips the extension, splits the stem on `-` and keeps the last
    /// segment. Returns `None` when that segment is blank.
    pub fn from_blob_name(name: &BlobName) -> Option<Self> {
        let id = name.file_stem().split('-').last()?;
        Self::new(id).ok()
    }
}

impl std::fmt::Display for PayloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PayloadId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
