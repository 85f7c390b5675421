//! Tests for job log artifacts.

use custodian_storage::{FileSystemLogStore, LogStore, MemoryLogStore};
use tempfile::TempDir;

#[tokio::test]
async fn test_filesystem_log_append_and_read() {
    let temp_dir = TempDir::new().unwrap();
    let logs = FileSystemLogStore::new(temp_dir.path()).unwrap();

    let reference = logs.create_log("job-1").await.unwrap();
    assert!(reference.ends_with(".log"));
    logs.append(&reference, "first").await.unwrap();
    logs.append(&reference, "second\n").await.unwrap();

    assert_eq!(
        logs.read(&reference).await.unwrap(),
        vec!["first".to_string(), "second".to_string()]
    );
}

#[tokio::test]
async fn test_filesystem_log_reallocation_keeps_lines() {
    let temp_dir = TempDir::new().unwrap();
    let logs = FileSystemLogStore::new(temp_dir.path()).unwrap();

    let first = logs.create_log("job-1").await.unwrap();
    logs.append(&first, "kept").await.unwrap();
    let second = logs.create_log("job-1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(logs.read(&second).await.unwrap(), vec!["kept".to_string()]);
}

#[tokio::test]
async fn test_filesystem_log_is_sharded() {
    let temp_dir = TempDir::new().unwrap();
    let logs = FileSystemLogStore::new(temp_dir.path()).unwrap();

    let reference = logs.create_log("job-2").await.unwrap();
    let relative = std::path::Path::new(&reference)
        .strip_prefix(temp_dir.path())
        .unwrap();
    assert_eq!(relative.components().count(), 3);
}

#[tokio::test]
async fn test_unknown_reference_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let logs = FileSystemLogStore::new(temp_dir.path()).unwrap();
    assert!(logs.append("/elsewhere/x.log", "line").await.is_err());

    let memory = MemoryLogStore::new();
    assert!(memory.append("memory://nope", "line").await.is_err());
}

#[tokio::test]
async fn test_memory_log_store() {
    let logs = MemoryLogStore::new();
    let reference = logs.create_log("job-3").await.unwrap();
    logs.append(&reference, "hello").await.unwrap();
    assert_eq!(logs.read(&reference).await.unwrap(), vec!["hello".to_string()]);
}
