use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the storage engine. Component errors propagate
/// unchanged; the upload pipeline runs cleanup before re-raising them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("name already taken: {0}")]
    Conflict(String),

    #[error("write already in progress for file {0}")]
    AlreadyExists(Uuid),

    #[error("invalid state for file {id}: expected {expected}, found {found}")]
    InvalidState {
        id: Uuid,
        expected: &'static str,
        found: &'static str,
    },

    #[error("storage medium I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for chunk {seq} of file {file_id}")]
    ChecksumMismatch { file_id: Uuid, seq: u32 },

    #[error("could not reserve a unique storage name after {0} attempts")]
    NamingExhausted(u32),

    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
