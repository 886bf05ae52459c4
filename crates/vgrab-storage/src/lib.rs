//! S3-compatible object store client.
//!
//! Targets B2/R2/MinIO style stores through a custom endpoint. Upload is
//! multipart with bounded in-flight parts; delete handles versioned
//! buckets; object names are deterministic per source URL so retries and
//! duplicate records land on the same key.

mod client;
mod config;
mod error;
mod keys;

pub use client::{ObjectStat, ObjectSummary, ObjectListing, StorageClient, UploadMetadata};
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use keys::{sanitize_filename, storage_key};
