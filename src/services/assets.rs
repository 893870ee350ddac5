//! Cover image storage on the local filesystem

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, AppResult};

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// An uploaded cover waiting to be stored
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub bytes: Vec<u8>,
    /// Lowercase extension without the dot
    pub extension: String,
}

impl CoverUpload {
    /// Build an upload from the multipart file name, rejecting unknown
    /// image types and empty bodies.
    pub fn from_filename(file_name: &str, bytes: Vec<u8>) -> AppResult<Self> {
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Cover file is empty".to_string()));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| AppError::BadRequest("Cover file has no extension".to_string()))?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unsupported cover type '{}', expected one of {}",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        Ok(Self { bytes, extension })
    }
}

/// Where cover files go. Not transactional: callers clean up after
/// themselves on failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store the upload and return its public path
    async fn save(&self, upload: &CoverUpload) -> AppResult<String>;

    /// Release a stored file. Missing files and the default cover are no-ops.
    async fn delete(&self, path: &str) -> AppResult<()>;
}

pub struct LocalAssetStore {
    dir: PathBuf,
    default_cover: String,
}

impl LocalAssetStore {
    pub fn new(dir: impl Into<PathBuf>, default_cover: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_cover: default_cover.into(),
        }
    }

    /// Resolve a stored path, refusing anything that escapes the upload dir.
    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let candidate = Path::new(path);
        let inside = candidate.starts_with(&self.dir)
            && candidate
                .components()
                .all(|c| !matches!(c, Component::ParentDir));
        if !inside {
            return Err(AppError::Storage(format!(
                "Refusing to touch {} outside {}",
                path,
                self.dir.display()
            )));
        }
        Ok(candidate.to_path_buf())
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn save(&self, upload: &CoverUpload) -> AppResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot create {}: {}", self.dir.display(), e)))?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("cover_{}_{}.{}", Utc::now().timestamp(), &id[..8], upload.extension);
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot write {}: {}", path.display(), e)))?;

        let public = path.to_string_lossy().replace('\\', "/");
        tracing::debug!("Stored cover {} ({} bytes)", public, upload.bytes.len());
        Ok(public)
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        if path.is_empty() || path == self.default_cover {
            return Ok(());
        }

        let resolved = self.resolve(path)?;
        match tokio::fs::remove_file(&resolved).await {
            Ok(()) => {
                tracing::debug!("Removed cover {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Cannot remove {}: {}", path, e))),
        }
    }
}
