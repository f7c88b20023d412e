//! Narrow interface to the durable byte-storage medium.
//!
//! The engine never touches a concrete store directly; every component takes
//! an `Arc<dyn StorageMedium>` opened once at startup. Keys are flat strings,
//! values are opaque byte blobs (see `models::keys` for the layout).

use async_trait::async_trait;
use std::io;

pub mod localfs;
pub mod memory;

pub use localfs::LocalFsMedium;
pub use memory::MemoryMedium;

#[async_trait]
pub trait StorageMedium: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> io::Result<()>;

    /// Returns `None` when the key is absent.
    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Idempotent: deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> io::Result<()>;

    /// All keys starting with `prefix`, in ascending lexicographic order.
    async fn list_keys(&self, prefix: &str) -> io::Result<Vec<String>>;
}
