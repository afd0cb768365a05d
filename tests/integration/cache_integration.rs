//! Content cache behavior across process restarts

use super::test_utils::{write_spec, CountingUploader};
use std::sync::Arc;
use testsmith::cache::{ContentCache, DEFAULT_PURPOSE};
use testsmith::config::FileLimits;
use testsmith::error::ApiError;
use tempfile::TempDir;

fn open(registry: &std::path::Path, uploader: Arc<CountingUploader>) -> ContentCache {
    ContentCache::open(registry, FileLimits::default(), uploader).unwrap()
}

#[tokio::test]
async fn test_same_content_uploads_once_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let registry = temp_dir.path().join("file_registry.json");
    let spec = write_spec(temp_dir.path(), "api.yaml");
    let uploader = Arc::new(CountingUploader::new());

    let first = open(&registry, uploader.clone())
        .acquire(&spec, DEFAULT_PURPOSE)
        .await
        .unwrap();
    let second = open(&registry, uploader.clone())
        .acquire(&spec, DEFAULT_PURPOSE)
        .await
        .unwrap();

    assert_eq!(uploader.upload_count(), 1);
    assert_eq!(first.reference_id, second.reference_id);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.mime_kind, "application/yaml");
}

#[tokio::test]
async fn test_reopen_prunes_entries_for_deleted_sources() {
    let temp_dir = TempDir::new().unwrap();
    let registry = temp_dir.path().join("file_registry.json");
    let keep = write_spec(temp_dir.path(), "keep.yaml");
    let gone = temp_dir.path().join("gone.json");
    std::fs::write(&gone, "{\"openapi\": \"3.0.0\"}").unwrap();
    let uploader = Arc::new(CountingUploader::new());

    {
        let cache = open(&registry, uploader.clone());
        cache.acquire(&keep, DEFAULT_PURPOSE).await.unwrap();
        cache.acquire(&gone, DEFAULT_PURPOSE).await.unwrap();
        assert_eq!(cache.stats().total_files, 2);
    }
    std::fs::remove_file(&gone).unwrap();

    let cache = open(&registry, uploader);
    let stats = cache.stats();
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.distinct_mime_kinds, 1);

    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&registry).unwrap()).unwrap();
    assert_eq!(persisted["entries"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversized_file_is_rejected_without_upload() {
    let temp_dir = TempDir::new().unwrap();
    let big = temp_dir.path().join("big.json");
    std::fs::write(&big, vec![b' '; 2 * 1024 * 1024]).unwrap();
    let uploader = Arc::new(CountingUploader::new());
    let limits = FileLimits {
        max_file_size_mb: 1,
        ..FileLimits::default()
    };
    let cache =
        ContentCache::open(temp_dir.path().join("r.json"), limits, uploader.clone()).unwrap();

    let err = cache.acquire(&big, DEFAULT_PURPOSE).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_cleanup_reports_counts() {
    let temp_dir = TempDir::new().unwrap();
    let registry = temp_dir.path().join("file_registry.json");
    let a = write_spec(temp_dir.path(), "a.yaml");
    let b = temp_dir.path().join("b.yml");
    std::fs::write(&b, "openapi: 3.1.0\n").unwrap();
    let cache = open(&registry, Arc::new(CountingUploader::new()));
    cache.acquire(&a, DEFAULT_PURPOSE).await.unwrap();
    cache.acquire(&b, DEFAULT_PURPOSE).await.unwrap();

    std::fs::remove_file(&b).unwrap();
    let report = cache.cleanup().unwrap();
    assert_eq!(report.initial, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(report.current, 1);
}
