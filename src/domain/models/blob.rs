use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::value_objects::BlobName;

/// Key-value metadata stored alongside a blob
pub type Metadata = HashMap<String, String>;

/// Kind of blob; append blobs only grow through appended blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Block,
    Append,
}

impl std::fmt::Display for BlobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobKind::Block => write!(f, "block"),
            BlobKind::Append => write!(f, "append"),
        }
    }
}

/// Entry produced when listing a container
#[derive(Debug, Clone, PartialEq)]
pub struct BlobItem {
    pub name: BlobName,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Properties of a single blob, fetched without its content
#[derive(Debug, Clone, PartialEq)]
pub struct BlobProperties {
    pub name: BlobName,
    pub size: u64,
    pub kind: BlobKind,
    pub etag: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}
