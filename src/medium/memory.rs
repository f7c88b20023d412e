//! In-memory medium for tests and local development.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::sync::RwLock;

use super::StorageMedium;

/// `BTreeMap` keeps keys ordered, so prefix listing is a range scan.
#[derive(Default)]
pub struct MemoryMedium {
    map: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, handy for no-orphan assertions in tests.
    pub fn key_count(&self) -> usize {
        self.map.read().unwrap().len()
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
        self.map
            .write()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> io::Result<Vec<String>> {
        let map = self.map.read().unwrap();
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
