//! Upload coordination: reserves a catalog record, drains the inbound byte
//! stream into chunk-sized writes, and makes the file visible atomically by
//! finalizing the record with the counts reported by the chunk commit. Any
//! failure unwinds to "never happened": partial chunks and the pending
//! record are both erased before the original error is re-raised.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{info, warn};
use std::io;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::MetadataCatalog;
use crate::chunk_store::{ChunkStore, ChunkWriter};
use crate::error::{Result, StoreError};
use crate::models::FileRecord;

pub struct UploadPipeline {
    catalog: Arc<MetadataCatalog>,
    chunks: Arc<ChunkStore>,
    name_retries: u32,
}

impl UploadPipeline {
    pub fn new(catalog: Arc<MetadataCatalog>, chunks: Arc<ChunkStore>, name_retries: u32) -> Self {
        Self {
            catalog,
            chunks,
            name_retries,
        }
    }

    /// Stores one file from `stream`. Network read boundaries need not align
    /// with chunk boundaries; bytes are re-buffered to exact chunk size
    /// internally. A zero-byte stream commits as a `Complete` record with
    /// `chunk_count = 0`.
    pub async fn handle_upload<S, F>(
        &self,
        mut stream: S,
        original_name: &str,
        content_type: &str,
        naming: F,
    ) -> Result<FileRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
        F: Fn(&str) -> String,
    {
        let record = self.reserve_record(original_name, content_type, naming).await?;
        let file_id = record.file_id;

        let mut writer = match self.chunks.begin_write(file_id) {
            Ok(w) => w,
            Err(e) => {
                self.erase_pending(file_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.drain(&mut stream, &mut writer).await {
            if let Err(cleanup) = self.chunks.abort_write(writer).await {
                warn!("cleanup after failed upload of {}: {}", file_id, cleanup);
            }
            self.erase_pending(file_id).await;
            return Err(e);
        }

        let (chunk_count, size_bytes) = self.chunks.commit_write(writer);
        match self.catalog.finalize(file_id, size_bytes, chunk_count).await {
            Ok(done) => {
                info!(
                    "stored '{}' as {} ({} bytes, {} chunks)",
                    original_name, done.name, size_bytes, chunk_count
                );
                Ok(done)
            }
            Err(e) => {
                // Chunks are committed but the record never became visible;
                // remove both sides so nothing is half-stored.
                if let Err(cleanup) = self.chunks.delete_all(file_id).await {
                    warn!("cleanup after failed finalize of {}: {}", file_id, cleanup);
                }
                self.erase_pending(file_id).await;
                Err(e)
            }
        }
    }

    /// Reserves a unique storage name, retrying with a fresh proposal on
    /// `Conflict` up to the configured bound.
    async fn reserve_record<F>(
        &self,
        original_name: &str,
        content_type: &str,
        naming: F,
    ) -> Result<FileRecord>
    where
        F: Fn(&str) -> String,
    {
        for _ in 0..self.name_retries {
            let name = naming(original_name);
            match self.catalog.create(&name, original_name, content_type).await {
                Ok(record) => return Ok(record),
                Err(StoreError::Conflict(taken)) => {
                    warn!("storage name '{}' already taken, retrying", taken);
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NamingExhausted(self.name_retries))
    }

    async fn drain<S>(&self, stream: &mut S, writer: &mut ChunkWriter) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let chunk_size = self.chunks.chunk_size();
        let mut buf = BytesMut::with_capacity(chunk_size);
        while let Some(read) = stream.next().await {
            buf.extend_from_slice(&read?);
            while buf.len() >= chunk_size {
                let chunk = buf.split_to(chunk_size);
                self.chunks.write_chunk(writer, &chunk).await?;
            }
        }
        if !buf.is_empty() {
            self.chunks.write_chunk(writer, &buf).await?;
        }
        Ok(())
    }

    async fn erase_pending(&self, file_id: Uuid) {
        if let Err(e) = self.catalog.fail(file_id).await {
            warn!("failed to erase pending record {}: {}", file_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{MemoryMedium, StorageMedium};
    use futures::stream;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pipeline(chunk_size: usize) -> (Arc<MemoryMedium>, Arc<MetadataCatalog>, UploadPipeline) {
        let medium: Arc<MemoryMedium> = Arc::new(MemoryMedium::new());
        let shared: Arc<dyn StorageMedium> = medium.clone();
        let catalog = Arc::new(MetadataCatalog::new(shared.clone()));
        let chunks = Arc::new(ChunkStore::new(shared, chunk_size));
        let p = UploadPipeline::new(catalog.clone(), chunks, 3);
        (medium, catalog, p)
    }

    fn byte_stream(reads: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
        stream::iter(reads.into_iter().map(|r| Ok(Bytes::from_static(r))))
    }

    #[tokio::test]
    async fn upload_rebuffers_to_chunk_size() {
        let (_, catalog, p) = pipeline(4);
        // 10 bytes over misaligned reads -> chunks of 4, 4, 2.
        let record = p
            .handle_upload(
                byte_stream(vec![b"abc", b"defgh", b"ij"]),
                "notes.txt",
                "text/plain",
                |_| "aaaa.txt".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(record.size_bytes, 10);
        assert_eq!(record.chunk_count, 3);
        assert_eq!(catalog.find_by_name("aaaa.txt").await.unwrap(), record);
    }

    #[tokio::test]
    async fn zero_byte_upload_completes_empty() {
        let (_, catalog, p) = pipeline(4);
        let record = p
            .handle_upload(byte_stream(vec![]), "empty", "text/plain", |_| "e".to_string())
            .await
            .unwrap();
        assert_eq!(record.size_bytes, 0);
        assert_eq!(record.chunk_count, 0);
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_trace() {
        let (medium, catalog, p) = pipeline(4);
        let reads: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"0123456789")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client gone")),
        ];
        let err = p
            .handle_upload(stream::iter(reads), "big.bin", "application/octet-stream", |_| {
                "b.bin".to_string()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(medium.key_count(), 0);
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn name_conflicts_retry_then_succeed() {
        let (_, catalog, p) = pipeline(4);
        catalog.create("taken", "x", "text/plain").await.unwrap();

        let calls = AtomicU32::new(0);
        let record = p
            .handle_upload(byte_stream(vec![b"hi"]), "x", "text/plain", |_| {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => "taken".to_string(),
                    _ => "fresh".to_string(),
                }
            })
            .await
            .unwrap();

        assert_eq!(record.name, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_naming_fails() {
        let (_, catalog, p) = pipeline(4);
        catalog.create("stuck", "x", "text/plain").await.unwrap();

        let err = p
            .handle_upload(byte_stream(vec![b"hi"]), "x", "text/plain", |_| "stuck".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NamingExhausted(3)));
    }
}
