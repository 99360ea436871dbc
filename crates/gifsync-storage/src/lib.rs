//! Blob storage for gif images.
//!
//! This crate provides:
//! - The `BlobStore` seam consumed by the retiming job
//! - An S3 implementation (gifs under `<name>.gif`)
//! - An in-memory implementation for development and tests

pub mod client;
pub mod error;
pub mod memory;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use store::{store_from_env, BlobStore, StorageBackend};
