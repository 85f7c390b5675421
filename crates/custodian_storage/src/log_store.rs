//! Append-only job log artifacts.

use async_trait::async_trait;
use custodian_error::{CustodianResult, StoreError, StoreErrorKind};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Allocates and appends to job log artifacts.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Allocate an artifact for `name` and return its reference.
    ///
    /// Allocating the same name twice returns the same reference and keeps
    /// what was already written.
    async fn create_log(&self, name: &str) -> CustodianResult<String>;

    /// Append one line.
    async fn append(&self, reference: &str, line: &str) -> CustodianResult<()>;

    /// Every line written so far.
    async fn read(&self, reference: &str) -> CustodianResult<Vec<String>>;
}

/// Log artifacts stored as files.
///
/// Layout: `{base_path}/{hash[0:2]}/{hash[2:4]}/{hash}.log`, where `hash` is
/// the SHA-256 of the artifact name.
#[derive(Debug, Clone)]
pub struct FileSystemLogStore {
    base_path: PathBuf,
}

impl FileSystemLogStore {
    /// Create a log store rooted at `base_path`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> CustodianResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StoreError::new(StoreErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        tracing::info!(path = %base_path.display(), "Created filesystem log store");
        Ok(Self { base_path })
    }

    fn compute_hash(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn get_path(&self, name: &str) -> PathBuf {
        let hash = Self::compute_hash(name);
        self.base_path
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.log", hash))
    }

    fn resolve(&self, reference: &str) -> CustodianResult<PathBuf> {
        let path = PathBuf::from(reference);
        if !path.starts_with(&self.base_path) {
            return Err(StoreError::not_found("log artifact", reference).into());
        }
        Ok(path)
    }
}

#[async_trait]
impl LogStore for FileSystemLogStore {
    #[tracing::instrument(skip(self))]
    async fn create_log(&self, name: &str) -> CustodianResult<String> {
        let path = self.get_path(name);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::new(StoreErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                StoreError::new(StoreErrorKind::Write(format!("{}: {}", path.display(), e)))
            })?;

        tracing::debug!(path = %path.display(), "Allocated log artifact");
        Ok(path.to_string_lossy().to_string())
    }

    async fn append(&self, reference: &str, line: &str) -> CustodianResult<()> {
        let path = self.resolve(reference)?;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| open_error(&path, reference, e))?;

        let mut buf = line.trim_end_matches('\n').to_string();
        buf.push('\n');
        file.write_all(buf.as_bytes()).await.map_err(|e| {
            StoreError::new(StoreErrorKind::Write(format!("{}: {}", path.display(), e)))
        })?;
        Ok(())
    }

    async fn read(&self, reference: &str) -> CustodianResult<Vec<String>> {
        let path = self.resolve(reference)?;
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| open_error(&path, reference, e))?;
        Ok(body.lines().map(str::to_string).collect())
    }
}

fn open_error(path: &Path, reference: &str, e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::not_found("log artifact", reference)
    } else {
        StoreError::new(StoreErrorKind::Read(format!("{}: {}", path.display(), e)))
    }
}

/// Log artifacts kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogStore {
    logs: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryLogStore {
    /// An empty log store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn create_log(&self, name: &str) -> CustodianResult<String> {
        let reference = format!("memory://{}", name);
        self.logs
            .write()
            .await
            .entry(reference.clone())
            .or_default();
        Ok(reference)
    }

    async fn append(&self, reference: &str, line: &str) -> CustodianResult<()> {
        let mut logs = self.logs.write().await;
        let lines = logs
            .get_mut(reference)
            .ok_or_else(|| StoreError::not_found("log artifact", reference))?;
        lines.push(line.trim_end_matches('\n').to_string());
        Ok(())
    }

    async fn read(&self, reference: &str) -> CustodianResult<Vec<String>> {
        self.logs
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::not_found("log artifact", reference).into())
    }
}
