mod blob_store;

pub use blob_store::{BlobByteStream, BlobDownload, BlobItemStream, BlobStore};
