//! Default storage-name generation: 16 random bytes rendered as hex, with
//! the original file extension preserved. The random source is the OS RNG,
//! so proposals are collision-resistant; the catalog's unique-name check
//! catches the rest.

use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

pub fn random_name(original_name: &str) -> String {
    let mut buf = [0u8; 16];
    OsRng.fill_bytes(&mut buf);
    let stem = hex::encode(buf);
    match Path::new(original_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}
