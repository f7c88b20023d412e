//! Chunk-level persistence: splits committed writes into `(file_id, seq)`
//! entries on the backing medium and reassembles them on read. Each chunk is
//! stored beside a SHA-256 checksum that is verified when the chunk is read
//! back.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::medium::StorageMedium;
use crate::models::keys;

/// Lazy sequence of chunk payloads in ascending sequence order.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

pub struct ChunkStore {
    medium: Arc<dyn StorageMedium>,
    chunk_size: usize,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

/// Write handle for one in-flight file. Sequence numbers start at 0 and are
/// gapless; consuming the handle via `commit_write`/`abort_write` is the only
/// way to end the write, so no chunk can be appended afterwards.
pub struct ChunkWriter {
    file_id: Uuid,
    next_seq: u32,
    total_bytes: u64,
    active: Arc<Mutex<HashSet<Uuid>>>,
    finished: bool,
}

impl ChunkWriter {
    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    pub fn chunks_written(&self) -> u32 {
        self.next_seq
    }

    fn finish(&mut self) {
        self.finished = true;
        self.active.lock().unwrap().remove(&self.file_id);
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        // A dropped handle must not wedge the id forever; chunk cleanup is
        // still the owner's job via abort_write.
        if !self.finished {
            self.active.lock().unwrap().remove(&self.file_id);
        }
    }
}

fn checksum_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl ChunkStore {
    pub fn new(medium: Arc<dyn StorageMedium>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            medium,
            chunk_size,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Allocates a write context for a new file. Fails with `AlreadyExists`
    /// when a write is already in flight for the id.
    pub fn begin_write(&self, file_id: Uuid) -> Result<ChunkWriter> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(file_id) {
            return Err(StoreError::AlreadyExists(file_id));
        }
        Ok(ChunkWriter {
            file_id,
            next_seq: 0,
            total_bytes: 0,
            active: self.active.clone(),
            finished: false,
        })
    }

    /// Appends one chunk under the next `(file_id, seq)` key. On a medium
    /// failure the caller must abort the write.
    pub async fn write_chunk(&self, writer: &mut ChunkWriter, data: &[u8]) -> Result<()> {
        if data.len() > self.chunk_size {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk of {} bytes exceeds limit {}", data.len(), self.chunk_size),
            )));
        }
        let seq = writer.next_seq;
        self.medium
            .put(&keys::chunk(writer.file_id, seq), data)
            .await?;
        self.medium
            .put(&keys::checksum(writer.file_id, seq), checksum_hex(data).as_bytes())
            .await?;
        writer.next_seq += 1;
        writer.total_bytes += data.len() as u64;
        Ok(())
    }

    /// Finalizes the write and returns the authoritative counts.
    pub fn commit_write(&self, mut writer: ChunkWriter) -> (u32, u64) {
        writer.finish();
        (writer.next_seq, writer.total_bytes)
    }

    /// Deletes everything persisted for this handle's file. Sweeps by key
    /// prefix rather than the sequence counter: a payload whose checksum put
    /// failed sits beyond `next_seq` and must be removed all the same.
    /// Attempts all deletions even if one fails, then reports the first
    /// failure.
    pub async fn abort_write(&self, mut writer: ChunkWriter) -> Result<()> {
        writer.finish();
        let mut first_err = None;
        for prefix in [
            keys::chunk_prefix(writer.file_id),
            keys::checksum_prefix(writer.file_id),
        ] {
            match self.medium.list_keys(&prefix).await {
                Ok(found) => {
                    for key in found {
                        if let Err(e) = self.medium.delete(&key).await {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Opens a fresh lazy read over the committed chunks of a file. Chunks
    /// are fetched from the medium one at a time as the consumer polls, so a
    /// slow or early-stopping consumer never pulls more than it drains.
    pub async fn open_read(&self, file_id: Uuid) -> Result<ChunkStream> {
        let chunk_keys = self.medium.list_keys(&keys::chunk_prefix(file_id)).await?;
        if chunk_keys.is_empty() {
            return Err(StoreError::NotFound(format!("no chunks for file {}", file_id)));
        }
        Ok(Self::stream_chunks(self.medium.clone(), file_id, chunk_keys))
    }

    fn stream_chunks(
        medium: Arc<dyn StorageMedium>,
        file_id: Uuid,
        chunk_keys: Vec<String>,
    ) -> ChunkStream {
        stream::iter(chunk_keys.into_iter().enumerate())
            .then(move |(i, key)| {
                let medium = medium.clone();
                async move {
                    let seq = i as u32;
                    let data = medium
                        .get(&key)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                    let expected = medium.get(&keys::checksum(file_id, seq)).await?;
                    match expected {
                        Some(sum) if sum == checksum_hex(&data).as_bytes() => {
                            Ok(Bytes::from(data))
                        }
                        _ => Err(StoreError::ChecksumMismatch { file_id, seq }),
                    }
                }
            })
            .boxed()
    }

    /// Removes every chunk and checksum for the id. Idempotent.
    pub async fn delete_all(&self, file_id: Uuid) -> Result<()> {
        for prefix in [keys::chunk_prefix(file_id), keys::checksum_prefix(file_id)] {
            for key in self.medium.list_keys(&prefix).await? {
                self.medium.delete(&key).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemoryMedium;
    use futures::TryStreamExt;

    fn store() -> (Arc<MemoryMedium>, ChunkStore) {
        let medium = Arc::new(MemoryMedium::new());
        let store = ChunkStore::new(medium.clone(), 8);
        (medium, store)
    }

    #[tokio::test]
    async fn write_commit_read_roundtrip() {
        let (_, store) = store();
        let id = Uuid::new_v4();

        let mut w = store.begin_write(id).unwrap();
        store.write_chunk(&mut w, b"12345678").await.unwrap();
        store.write_chunk(&mut w, b"tail").await.unwrap();
        let (count, total) = store.commit_write(w);
        assert_eq!(count, 2);
        assert_eq!(total, 12);

        let chunks: Vec<Bytes> = store.open_read(id).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 2);
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, b"12345678tail");
    }

    #[tokio::test]
    async fn duplicate_write_handle_rejected() {
        let (_, store) = store();
        let id = Uuid::new_v4();
        let w = store.begin_write(id).unwrap();
        assert!(matches!(
            store.begin_write(id),
            Err(StoreError::AlreadyExists(_))
        ));
        // After commit the id is free again.
        store.commit_write(w);
        assert!(store.begin_write(id).is_ok());
    }

    #[tokio::test]
    async fn oversized_chunk_rejected() {
        let (_, store) = store();
        let mut w = store.begin_write(Uuid::new_v4()).unwrap();
        assert!(matches!(
            store.write_chunk(&mut w, b"way too large for 8").await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn abort_removes_partial_chunks() {
        let (medium, store) = store();
        let id = Uuid::new_v4();
        let mut w = store.begin_write(id).unwrap();
        store.write_chunk(&mut w, b"partial").await.unwrap();
        store.abort_write(w).await.unwrap();

        assert_eq!(medium.key_count(), 0);
        assert!(matches!(
            store.open_read(id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn abort_sweeps_chunks_beyond_the_sequence_counter() {
        let (medium, store) = store();
        let id = Uuid::new_v4();
        let w = store.begin_write(id).unwrap();
        // A payload that landed without its checksum, as after a mid-write
        // medium failure; the handle's counter never advanced past it.
        medium.put(&keys::chunk(id, 0), b"stranded").await.unwrap();
        store.abort_write(w).await.unwrap();
        assert_eq!(medium.key_count(), 0);
    }

    #[tokio::test]
    async fn open_read_unknown_file_is_not_found() {
        let (_, store) = store();
        assert!(matches!(
            store.open_read(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn corrupted_chunk_fails_checksum() {
        let (medium, store) = store();
        let id = Uuid::new_v4();
        let mut w = store.begin_write(id).unwrap();
        store.write_chunk(&mut w, b"payload").await.unwrap();
        store.commit_write(w);

        medium.put(&keys::chunk(id, 0), b"tampered").await.unwrap();

        let err = store
            .open_read(id)
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { seq: 0, .. }));
    }

    #[tokio::test]
    async fn delete_all_is_idempotent() {
        let (medium, store) = store();
        let id = Uuid::new_v4();
        let mut w = store.begin_write(id).unwrap();
        store.write_chunk(&mut w, b"abc").await.unwrap();
        store.commit_write(w);

        store.delete_all(id).await.unwrap();
        assert_eq!(medium.key_count(), 0);
        store.delete_all(id).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_writer_frees_the_id() {
        let (_, store) = store();
        let id = Uuid::new_v4();
        drop(store.begin_write(id).unwrap());
        assert!(store.begin_write(id).is_ok());
    }
}
