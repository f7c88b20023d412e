//! Engine facade the HTTP layer talks to. One medium handle is opened at
//! startup and shared across every component; all request-level concerns
//! (routing, marshaling, retries) stay outside.

use bytes::Bytes;
use futures::Stream;
use log::info;
use std::io;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::MetadataCatalog;
use crate::chunk_store::{ChunkStore, ChunkStream};
use crate::config::Config;
use crate::error::Result;
use crate::medium::StorageMedium;
use crate::models::FileRecord;
use crate::naming;
use crate::pipeline::UploadPipeline;
use crate::streamer::{FileLookup, ReadStreamer};

pub struct FileStorage {
    catalog: Arc<MetadataCatalog>,
    chunks: Arc<ChunkStore>,
    pipeline: UploadPipeline,
    streamer: ReadStreamer,
}

impl FileStorage {
    pub fn new(medium: Arc<dyn StorageMedium>, config: &Config) -> Self {
        let catalog = Arc::new(MetadataCatalog::new(medium.clone()));
        let chunks = Arc::new(ChunkStore::new(medium, config.chunk_size));
        let pipeline = UploadPipeline::new(catalog.clone(), chunks.clone(), config.name_retries);
        let streamer = ReadStreamer::new(catalog.clone(), chunks.clone());
        Self {
            catalog,
            chunks,
            pipeline,
            streamer,
        }
    }

    /// POST /upload: store one file with the default random-name policy.
    pub async fn upload<S>(
        &self,
        stream: S,
        original_name: &str,
        content_type: &str,
    ) -> Result<FileRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        self.pipeline
            .handle_upload(stream, original_name, content_type, naming::random_name)
            .await
    }

    /// Same as `upload` but with a caller-injected naming function.
    pub async fn upload_named<S, F>(
        &self,
        stream: S,
        original_name: &str,
        content_type: &str,
        naming: F,
    ) -> Result<FileRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
        F: Fn(&str) -> String,
    {
        self.pipeline
            .handle_upload(stream, original_name, content_type, naming)
            .await
    }

    /// GET /files: completed files, oldest first.
    pub async fn list(&self) -> Result<Vec<FileRecord>> {
        self.catalog.list().await
    }

    /// GET /files/:name metadata.
    pub async fn find_by_name(&self, name: &str) -> Result<FileRecord> {
        self.catalog.find_by_name(name).await
    }

    pub async fn find_by_id(&self, file_id: Uuid) -> Result<FileRecord> {
        self.catalog.find_by_id(file_id).await
    }

    /// GET /files/:name body.
    pub async fn open(&self, lookup: &FileLookup) -> Result<(FileRecord, ChunkStream)> {
        self.streamer.open(lookup).await
    }

    /// GET /image/:name body, JPEG/PNG only.
    pub async fn open_image(&self, lookup: &FileLookup) -> Result<(FileRecord, ChunkStream)> {
        self.streamer.open_image(lookup).await
    }

    /// DELETE /files/:id: record and chunks go together.
    pub async fn delete(&self, file_id: Uuid) -> Result<()> {
        let record = self.catalog.delete(file_id).await?;
        self.chunks.delete_all(file_id).await?;
        info!("deleted {} ('{}')", file_id, record.name);
        Ok(())
    }
}
