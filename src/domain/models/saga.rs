//! Saga state snapshots and their tagged JSON encoding.
//!
//! Saga data documents are JSON objects carrying a `"$type"` field next to the
//! state's own fields. Reading a document back dispatches on that tag against
//! the variants registered in a [`SagaDataRegistry`], so the concrete type is
//! recovered without the caller naming it.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{errors::ValidationError, models::Metadata, value_objects::BlobName};

/// Field holding the type tag in every saga data document
pub const TYPE_TAG: &str = "$type";

/// Saga state that can be archived
pub trait SagaData: Serialize + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static {
    /// Stable tag written into the serialized document
    const TYPE_NAME: &'static str;

    fn id(&self) -> Uuid;

    fn revision(&self) -> u32;
}

/// Object-safe view over any [`SagaData`]
pub trait DynSagaData: std::fmt::Debug + Send + Sync {
    fn saga_id(&self) -> Uuid;
    fn saga_revision(&self) -> u32;
    fn type_name(&self) -> &'static str;
    fn to_json(&self) -> serde_json::Result<Value>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: SagaData> DynSagaData for T {
    fn saga_id(&self) -> Uuid {
        SagaData::id(self)
    }

    fn saga_revision(&self) -> u32 {
        SagaData::revision(self)
    }

    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DynSagaData {
    pub fn is<T: SagaData>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: SagaData>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Errors raised while encoding or decoding saga data documents
#[derive(Debug, thiserror::Error)]
pub enum SagaCodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("saga data of type '{0}' did not serialize to a JSON object")]
    NotAnObject(&'static str),

    #[error("saga data of type '{0}' uses the reserved field '$type'")]
    ReservedField(&'static str),

    #[error("document has no '$type' field")]
    MissingTypeTag,

    #[error("no saga data type registered under '{0}'")]
    UnknownType(String),
}

type DecodeFn = fn(Value) -> serde_json::Result<Box<dyn DynSagaData>>;

fn decode_as<T: SagaData>(value: Value) -> serde_json::Result<Box<dyn DynSagaData>> {
    let data: T = serde_json::from_value(value)?;
    Ok(Box::new(data))
}

/// Set of saga data variants a snapshot archive can read back
#[derive(Clone, Default)]
pub struct SagaDataRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl SagaDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant; registering the same tag twice keeps the last one
    pub fn register<T: SagaData>(mut self) -> Self {
        self.decoders.insert(T::TYPE_NAME, decode_as::<T>);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Serialize saga data with its type tag
    pub fn encode(data: &dyn DynSagaData) -> Result<Vec<u8>, SagaCodecError> {
        let fields = match data.to_json()? {
            Value::Object(fields) => fields,
            _ => return Err(SagaCodecError::NotAnObject(data.type_name())),
        };

        if fields.contains_key(TYPE_TAG) {
            return Err(SagaCodecError::ReservedField(data.type_name()));
        }

        let mut tagged = Map::with_capacity(fields.len() + 1);
        tagged.insert(TYPE_TAG.to_string(), Value::String(data.type_name().to_string()));
        tagged.extend(fields);

        Ok(serde_json::to_vec(&Value::Object(tagged))?)
    }

    /// Deserialize a tagged document into the registered variant
    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn DynSagaData>, SagaCodecError> {
        let mut fields = match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(fields) => fields,
            _ => return Err(SagaCodecError::MissingTypeTag),
        };

        let type_name = match fields.remove(TYPE_TAG) {
            Some(Value::String(name)) => name,
            _ => return Err(SagaCodecError::MissingTypeTag),
        };

        let decode = self
            .decoders
            .get(type_name.as_str())
            .ok_or_else(|| SagaCodecError::UnknownType(type_name.clone()))?;

        Ok(decode(Value::Object(fields))?)
    }
}

impl std::fmt::Debug for SagaDataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDataRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// A saga state together with the audit metadata recorded with it
#[derive(Debug)]
pub struct SagaSnapshot {
    pub data: Box<dyn DynSagaData>,
    pub metadata: Metadata,
}

/// Which of the two documents of a snapshot a blob holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotDocument {
    Data,
    Metadata,
}

impl SnapshotDocument {
    pub fn file_name(&self) -> &'static str {
        match self {
            SnapshotDocument::Data => "data.json",
            SnapshotDocument::Metadata => "metadata.json",
        }
    }
}

/// Location of one snapshot document: `<id-hex>/<revision:010>/<document>.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotDocumentRef {
    pub saga_id: Uuid,
    pub revision: u32,
    pub document: SnapshotDocument,
}

impl SnapshotDocumentRef {
    pub fn new(saga_id: Uuid, revision: u32, document: SnapshotDocument) -> Self {
        Self {
            saga_id,
            revision,
            document,
        }
    }

    pub fn path(&self) -> String {
        format!(
            "{}/{:010}/{}",
            self.saga_id.simple(),
            self.revision,
            self.document.file_name()
        )
    }

    pub fn blob_name(&self) -> Result<BlobName, ValidationError> {
        BlobName::new(self.path())
    }

    /// Parse a listed blob name back into its snapshot coordinates
    pub fn parse(name: &BlobName) -> Option<Self> {
        let mut parts = name.as_str().split('/');
        let (id, revision, file) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || revision.len() != 10 {
            return None;
        }

        let document = match file {
            "data.json" => SnapshotDocument::Data,
            "metadata.json" => SnapshotDocument::Metadata,
            _ => return None,
        };

        Some(Self {
            saga_id: Uuid::try_parse(id).ok()?,
            revision: revision.parse().ok()?,
            document,
        })
    }
}
