use anyhow::Result;
use dotenv::dotenv;
use std::env;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1MB
pub const DEFAULT_NAME_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct Config {
    /// Maximum chunk payload size; only the final chunk of a file may be
    /// shorter.
    pub chunk_size: usize,
    /// Root directory for the local-filesystem medium.
    pub data_dir: String,
    /// Fresh-name attempts before an upload fails with NamingExhausted.
    pub name_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let chunk_size = match env::var("GRIDSTORE_CHUNK_SIZE") {
            Ok(v) => v.parse()?,
            Err(_) => DEFAULT_CHUNK_SIZE,
        };
        let data_dir = env::var("GRIDSTORE_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let name_retries = match env::var("GRIDSTORE_NAME_RETRIES") {
            Ok(v) => v.parse()?,
            Err(_) => DEFAULT_NAME_RETRIES,
        };
        Ok(Self {
            chunk_size,
            data_dir,
            name_retries,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            data_dir: "data".to_string(),
            name_retries: DEFAULT_NAME_RETRIES,
        }
    }
}
