//! gridstore: a chunked file storage engine.
//!
//! Uploads are split into fixed-size chunks persisted on a narrow key-value
//! storage medium, with file metadata tracked in a catalog on the same
//! medium. A file becomes visible atomically when its upload finalizes;
//! reads stream chunks back lazily with per-chunk integrity checks. The HTTP
//! layer, naming policy, and concrete medium are injected from outside.

pub mod catalog;
pub mod chunk_store;
pub mod config;
pub mod error;
pub mod medium;
pub mod models;
pub mod naming;
pub mod pipeline;
pub mod service;
pub mod streamer;

pub use catalog::MetadataCatalog;
pub use chunk_store::{ChunkStore, ChunkStream, ChunkWriter};
pub use config::Config;
pub use error::{Result, StoreError};
pub use medium::{LocalFsMedium, MemoryMedium, StorageMedium};
pub use models::{FileRecord, FileStatus};
pub use pipeline::UploadPipeline;
pub use service::FileStorage;
pub use streamer::{FileLookup, ReadStreamer};
