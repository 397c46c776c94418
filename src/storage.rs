//! Artifact storage for uploaded and generated files.
//!
//! Files are named by a fresh UUID plus the original extension, never by
//! the client-supplied file name:
//!
//! ```text
//! <root>/uploads/documents/<uuid>.<ext>
//! <root>/generated/documents/<uuid>.<ext>
//! ```
//!
//! Records hold the root-relative path returned by the `save_*` methods.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const UPLOAD_DIR: &str = "uploads/documents";
pub const GENERATED_DIR: &str = "generated/documents";

#[derive(Debug, Error)]
pub enum StorageError {
    /// The record points at a file that is no longer on disk.
    #[error("artifact missing: {0}")]
    Missing(String),

    #[error("invalid artifact reference: {0}")]
    InvalidReference(String),

    #[error("artifact I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file written by [`ArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Root-relative path.
    pub reference: String,
    /// SHA-256 of the bytes, hex encoded.
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store uploaded bytes under a fresh name.
    pub async fn save_upload(
        &self,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        self.save(UPLOAD_DIR, extension, bytes).await
    }

    /// Store a rendered artifact under a fresh name.
    pub async fn save_generated(
        &self,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        self.save(GENERATED_DIR, Some(extension), bytes).await
    }

    async fn save(
        &self,
        dir: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        let name = match extension.filter(|e| !e.is_empty()) {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let reference = format!("{}/{}", dir, name);
        let path = self.root.join(&reference);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| io_error(&path, source))?;

        tracing::debug!(reference = %reference, size = bytes.len(), "stored artifact");
        Ok(StoredArtifact {
            reference,
            checksum: format!("{:x}", Sha256::digest(bytes)),
            size: bytes.len() as u64,
        })
    }

    /// Absolute path for a stored reference. References that escape the
    /// root are rejected.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(reference);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if reference.is_empty() || escapes {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(rel))
    }

    pub async fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::Missing(reference.to_string()))
            }
            Err(source) => Err(io_error(&path, source)),
        }
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&path, source)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
