//! File record catalog persisted on the backing medium: record JSON under
//! `files/{id}` plus a `names/{name}` index enforcing name uniqueness.
//! Lookups always hit the medium; there is no in-process cache.

use log::warn;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::medium::StorageMedium;
use crate::models::{keys, FileRecord, FileStatus};

pub struct MetadataCatalog {
    medium: Arc<dyn StorageMedium>,
    /// Serializes name reservation so two concurrent creates of the same
    /// name cannot both pass the uniqueness check.
    create_lock: Mutex<()>,
}

fn encode(record: &FileRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record)
        .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn decode(data: &[u8]) -> Result<FileRecord> {
    serde_json::from_slice(data)
        .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

impl MetadataCatalog {
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            medium,
            create_lock: Mutex::new(()),
        }
    }

    async fn load(&self, file_id: Uuid) -> Result<FileRecord> {
        let data = self
            .medium
            .get(&keys::record(file_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file {}", file_id)))?;
        decode(&data)
    }

    async fn save(&self, record: &FileRecord) -> Result<()> {
        self.medium
            .put(&keys::record(record.file_id), &encode(record)?)
            .await?;
        Ok(())
    }

    /// Creates a `Pending` record. Fails with `Conflict` when the storage
    /// name is already taken.
    pub async fn create(
        &self,
        name: &str,
        original_name: &str,
        content_type: &str,
    ) -> Result<FileRecord> {
        let _guard = self.create_lock.lock().await;
        if self.medium.get(&keys::name_index(name)).await?.is_some() {
            return Err(StoreError::Conflict(name.to_string()));
        }
        let record = FileRecord::new(name, original_name, content_type);
        self.save(&record).await?;
        if let Err(e) = self
            .medium
            .put(&keys::name_index(name), record.file_id.to_string().as_bytes())
            .await
        {
            // Without the index the record is unreachable; erase it rather
            // than leak it on the medium.
            if let Err(cleanup) = self.medium.delete(&keys::record(record.file_id)).await {
                warn!(
                    "failed to erase record {} after name index write error: {}",
                    record.file_id, cleanup
                );
            }
            return Err(e.into());
        }
        Ok(record)
    }

    /// `Pending -> Complete` with the authoritative counts from the chunk
    /// store commit. This is the only transition to `Complete`, so a record
    /// can never be visible with a wrong size.
    pub async fn finalize(&self, file_id: Uuid, size_bytes: u64, chunk_count: u32) -> Result<FileRecord> {
        let mut record = self.load(file_id).await?;
        if record.status != FileStatus::Pending {
            return Err(StoreError::InvalidState {
                id: file_id,
                expected: FileStatus::Pending.as_str(),
                found: record.status.as_str(),
            });
        }
        record.size_bytes = size_bytes;
        record.chunk_count = chunk_count;
        record.status = FileStatus::Complete;
        self.save(&record).await?;
        Ok(record)
    }

    /// `Pending -> Failed`, then erases the record and its name index:
    /// failed uploads leave no trace in the catalog.
    pub async fn fail(&self, file_id: Uuid) -> Result<()> {
        let record = self.load(file_id).await?;
        if record.status != FileStatus::Pending {
            return Err(StoreError::InvalidState {
                id: file_id,
                expected: FileStatus::Pending.as_str(),
                found: record.status.as_str(),
            });
        }
        self.medium.delete(&keys::name_index(&record.name)).await?;
        self.medium.delete(&keys::record(file_id)).await?;
        Ok(())
    }

    /// Returns the record only when `Complete`; in-flight uploads are
    /// indistinguishable from absent files.
    pub async fn find_by_id(&self, file_id: Uuid) -> Result<FileRecord> {
        let record = self.load(file_id).await?;
        if record.status != FileStatus::Complete {
            return Err(StoreError::NotFound(format!("file {}", file_id)));
        }
        Ok(record)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<FileRecord> {
        let data = self
            .medium
            .get(&keys::name_index(name))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file '{}'", name)))?;
        let id_str = String::from_utf8_lossy(&data).into_owned();
        let file_id = Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        match self.find_by_id(file_id).await {
            Err(StoreError::NotFound(_)) => Err(StoreError::NotFound(format!("file '{}'", name))),
            other => other,
        }
    }

    /// All `Complete` records, oldest upload first. Ties on `created_at`
    /// fall back to id order so the listing is stable.
    pub async fn list(&self) -> Result<Vec<FileRecord>> {
        let mut records = Vec::new();
        for key in self.medium.list_keys(keys::RECORD_PREFIX).await? {
            if let Some(data) = self.medium.get(&key).await? {
                let record = decode(&data)?;
                if record.status == FileStatus::Complete {
                    records.push(record);
                }
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(records)
    }

    /// Removes a `Complete` record and its name index. The caller is
    /// responsible for deleting the file's chunks alongside.
    pub async fn delete(&self, file_id: Uuid) -> Result<FileRecord> {
        let record = self.find_by_id(file_id).await?;
        let _guard = self.create_lock.lock().await;
        self.medium.delete(&keys::name_index(&record.name)).await?;
        self.medium.delete(&keys::record(file_id)).await?;
        Ok(record)
    }
}
