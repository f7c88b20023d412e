use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a stored file. Only `Complete` records are visible
/// through catalog lookups; `Pending` exists for the duration of an in-flight
/// upload and `Failed` only transiently while a failed upload is erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Complete,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: Uuid,
    /// Generated storage name, unique within the catalog.
    pub name: String,
    /// Client-supplied name, informational only.
    pub original_name: String,
    pub content_type: String,
    /// Total byte length, authoritative only once `status` is `Complete`.
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(name: &str, original_name: &str, content_type: &str) -> Self {
        FileRecord {
            file_id: Uuid::new_v4(),
            name: name.to_string(),
            original_name: original_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes: 0,
            chunk_count: 0,
            status: FileStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Key layout on the backing medium. Two logical collections (records and
/// chunks) plus a name index and per-chunk checksums. Sequence numbers are
/// zero-padded so lexicographic key order equals chunk order.
pub mod keys {
    use uuid::Uuid;

    pub const RECORD_PREFIX: &str = "files/";

    pub fn record(file_id: Uuid) -> String {
        format!("files/{}", file_id)
    }

    pub fn name_index(name: &str) -> String {
        format!("names/{}", name)
    }

    pub fn chunk(file_id: Uuid, seq: u32) -> String {
        format!("chunks/{}/{:08}", file_id, seq)
    }

    pub fn chunk_prefix(file_id: Uuid) -> String {
        format!("chunks/{}/", file_id)
    }

    pub fn checksum(file_id: Uuid, seq: u32) -> String {
        format!("sums/{}/{:08}", file_id, seq)
    }

    pub fn checksum_prefix(file_id: Uuid) -> String {
        format!("sums/{}/", file_id)
    }
}
