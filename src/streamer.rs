//! Read path: resolves a catalog entry and exposes its chunks as a lazy,
//! pull-based byte stream. The consumer may stop polling at any point (e.g.
//! client disconnect); dropping the stream releases it without touching the
//! chunks that were never pulled.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::MetadataCatalog;
use crate::chunk_store::{ChunkStore, ChunkStream};
use crate::error::{Result, StoreError};
use crate::models::FileRecord;

/// Content types served through the image-only entry point.
const IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// How to resolve the file to stream.
#[derive(Debug, Clone)]
pub enum FileLookup {
    ById(Uuid),
    ByName(String),
}

pub struct ReadStreamer {
    catalog: Arc<MetadataCatalog>,
    chunks: Arc<ChunkStore>,
}

impl ReadStreamer {
    pub fn new(catalog: Arc<MetadataCatalog>, chunks: Arc<ChunkStore>) -> Self {
        Self { catalog, chunks }
    }

    /// Resolves the record (`NotFound` when absent or not yet complete) and
    /// opens a fresh chunk stream. Zero-chunk files yield an empty stream.
    pub async fn open(&self, lookup: &FileLookup) -> Result<(FileRecord, ChunkStream)> {
        let record = self.resolve(lookup).await?;
        let body = self.body(&record).await?;
        Ok((record, body))
    }

    /// Image-only policy: anything but JPEG/PNG is rejected before any chunk
    /// is read; the file itself stays intact and readable via `open`.
    pub async fn open_image(&self, lookup: &FileLookup) -> Result<(FileRecord, ChunkStream)> {
        let record = self.resolve(lookup).await?;
        if !IMAGE_TYPES.contains(&record.content_type.as_str()) {
            return Err(StoreError::UnsupportedType(record.content_type));
        }
        let body = self.body(&record).await?;
        Ok((record, body))
    }

    async fn resolve(&self, lookup: &FileLookup) -> Result<FileRecord> {
        match lookup {
            FileLookup::ById(id) => self.catalog.find_by_id(*id).await,
            FileLookup::ByName(name) => self.catalog.find_by_name(name).await,
        }
    }

    async fn body(&self, record: &FileRecord) -> Result<ChunkStream> {
        if record.chunk_count == 0 {
            Ok(stream::empty().boxed())
        } else {
            self.chunks.open_read(record.file_id).await
        }
    }
}
