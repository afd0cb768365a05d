//! Content Cache
//!
//! Content-addressed store that deduplicates input uploads. The key is the BLAKE3 hash
//! of the file bytes; a hit returns the existing entry without contacting the service.
//! The registry is persisted after every mutation and pruned of entries whose source
//! file has disappeared each time the cache is opened.

pub mod hasher;
pub mod registry;

use crate::config::FileLimits;
use crate::error::ApiError;
use crate::provider::FileUploader;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use registry::FileRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default upload purpose for input files
pub const DEFAULT_PURPOSE: &str = "user_data";

/// One uploaded input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Lowercase hex BLAKE3 of the file bytes
    pub content_hash: String,
    /// Service-side id returned by the upload
    pub reference_id: String,
    pub source_path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub mime_kind: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
}

/// Result of `ContentCache::cleanup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub initial: usize,
    pub removed: usize,
    pub current: usize,
}

/// Result of `ContentCache::stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub distinct_mime_kinds: usize,
}

/// MIME kind derived from the file extension.
pub fn mime_kind_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some(".yaml") | Some(".yml") => "application/yaml",
        Some(".json") => "application/json",
        Some(".pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

pub struct ContentCache {
    registry_path: PathBuf,
    registry: Mutex<FileRegistry>,
    uploader: Arc<dyn FileUploader>,
    limits: FileLimits,
}

impl ContentCache {
    /// Open the registry at `registry_path`, pruning entries whose source is gone.
    pub fn open(
        registry_path: impl Into<PathBuf>,
        limits: FileLimits,
        uploader: Arc<dyn FileUploader>,
    ) -> Result<Self, ApiError> {
        let registry_path = registry_path.into();
        let mut registry = FileRegistry::load_from_disk(&registry_path);

        let removed = registry.prune_missing();
        if !removed.is_empty() {
            info!(removed = removed.len(), "Pruned missing files from cache registry");
            registry.save_to_disk(&registry_path)?;
        }

        debug!(
            path = %registry_path.display(),
            entries = registry.len(),
            "Content cache opened"
        );

        Ok(Self {
            registry_path,
            registry: Mutex::new(registry),
            uploader,
            limits,
        })
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// Check existence, type, size and extension. Returns the file size.
    pub fn validate_file(&self, path: &Path) -> Result<u64, ApiError> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| ApiError::Validation(format!("File not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(ApiError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let size = metadata.len();
        if size > self.limits.max_file_size_bytes() {
            return Err(ApiError::Validation(format!(
                "File too large: {:.1}MB > {}MB",
                size as f64 / (1024.0 * 1024.0),
                self.limits.max_file_size_mb
            )));
        }

        let extension = extension_of(path).unwrap_or_default();
        if !self
            .limits
            .supported_file_types
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(&extension))
        {
            return Err(ApiError::Validation(format!(
                "Unsupported file type: '{}'. Supported types: {}",
                extension,
                self.limits.supported_file_types.join(", ")
            )));
        }

        Ok(size)
    }

    /// Return the cache entry for `path`, uploading only when its content is unknown.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn acquire(&self, path: &Path, purpose: &str) -> Result<CacheEntry, ApiError> {
        let size = self.validate_file(path)?;
        let source_path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let hash_hex = hex::encode(hash_path(&source_path).await?);

        if let Some(entry) = self.registry.lock().get(&hash_hex).cloned() {
            info!(reference_id = %entry.reference_id, "Using cached upload");
            return Ok(entry);
        }

        info!(size, "Uploading input file");
        let reference_id = self
            .uploader
            .upload(&source_path, purpose)
            .await
            .map_err(|e| match e {
                ApiError::Upload(msg) => ApiError::Upload(msg),
                other => ApiError::Upload(other.to_string()),
            })?;

        let entry = CacheEntry {
            content_hash: hash_hex,
            reference_id,
            file_name: source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_kind: mime_kind_for(&source_path).to_string(),
            source_path,
            size,
            purpose: purpose.to_string(),
            created_at: Utc::now(),
        };

        {
            let mut registry = self.registry.lock();
            let mut updated = registry.clone();
            updated.insert(entry.clone());
            // Memory only changes once the new registry is on disk.
            updated.save_to_disk(&self.registry_path).map_err(|e| {
                ApiError::Upload(format!(
                    "Uploaded {} but could not record it: {}",
                    entry.file_name, e
                ))
            })?;
            *registry = updated;
        }
        info!(reference_id = %entry.reference_id, "Input file uploaded");
        Ok(entry)
    }

    /// True when no entry exists for this path or the file's hash no longer matches.
    /// A path that does not exist has nothing to re-upload and reports false.
    pub async fn has_file_changed(&self, path: &Path) -> Result<bool, ApiError> {
        if !path.exists() {
            return Ok(false);
        }
        let source_path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let current = hex::encode(hash_path(&source_path).await?);
        let registry = self.registry.lock();
        Ok(match registry.get_by_path(&source_path) {
            Some(entry) => entry.content_hash != current,
            None => true,
        })
    }

    /// Prune entries whose source is gone and persist the registry.
    pub fn cleanup(&self) -> Result<CleanupReport, ApiError> {
        let mut registry = self.registry.lock();
        let initial = registry.len();
        let removed = registry.prune_missing().len();
        registry.save_to_disk(&self.registry_path)?;
        if removed > 0 {
            warn!(removed, "Removed cache entries for missing files");
        }
        Ok(CleanupReport {
            initial,
            removed,
            current: registry.len(),
        })
    }

    pub fn stats(&self) -> CacheStats {
        let registry = self.registry.lock();
        let mime_kinds: HashSet<&str> = registry
            .entries
            .values()
            .map(|e| e.mime_kind.as_str())
            .collect();
        CacheStats {
            total_files: registry.len(),
            total_bytes: registry.entries.values().map(|e| e.size).sum(),
            distinct_mime_kinds: mime_kinds.len(),
        }
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.registry.lock().entries.values().cloned().collect()
    }
}

async fn hash_path(path: &Path) -> Result<crate::types::ContentHash, ApiError> {
    let owned = path.to_path_buf();
    let hash = tokio::task::spawn_blocking(move || hasher::compute_file_hash(&owned))
        .await
        .map_err(|e| ApiError::Upload(format!("Hashing task failed: {}", e)))??;
    Ok(hash)
}
