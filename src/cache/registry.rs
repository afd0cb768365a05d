//! On-disk registry of uploaded inputs, keyed by content hash.

use super::CacheEntry;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRegistry {
    pub version: u32,
    /// Lowercase hex content hash → entry
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl FileRegistry {
    /// Load the registry. A missing file yields an empty registry; so does a file
    /// that cannot be read or parsed, after logging a warning.
    pub fn load_from_disk(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = fs::read(path)
            .map_err(StorageError::from)
            .and_then(|bytes| {
                serde_json::from_slice::<FileRegistry>(&bytes)
                    .map_err(|e| StorageError::RegistryData(e.to_string()))
            });
        match parsed {
            Ok(registry) => registry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load cache registry, starting empty");
                Self::default()
            }
        }
    }

    /// Write via temp file + rename so readers never observe a partial registry.
    pub fn save_to_disk(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::RegistryData(format!("Failed to serialize registry: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &serialized)?;
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to replace registry {:?}: {}", path, e),
            ))
        })
    }

    pub fn get(&self, hash_hex: &str) -> Option<&CacheEntry> {
        self.entries.get(hash_hex)
    }

    pub fn get_by_path(&self, source_path: &Path) -> Option<&CacheEntry> {
        self.entries.values().find(|e| e.source_path == source_path)
    }

    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.content_hash.clone(), entry);
    }

    /// Drop entries whose source file no longer exists; returns removed hashes.
    pub fn prune_missing(&mut self) -> Vec<String> {
        let missing: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.source_path.exists())
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in &missing {
            self.entries.remove(hash);
        }
        missing
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
