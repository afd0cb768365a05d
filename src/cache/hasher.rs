//! Streaming BLAKE3 content hashing for cache keys

use crate::error::StorageError;
use crate::types::ContentHash;
use blake3::Hasher;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_CHUNK: usize = 8 * 1024;

/// Hash the full byte stream of a file in fixed-size reads.
pub fn compute_file_hash(path: &Path) -> Result<ContentHash, StorageError> {
    let mut file = File::open(path).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to open {:?} for hashing: {}", path, e),
        ))
    })?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(*hasher.finalize().as_bytes())
}
