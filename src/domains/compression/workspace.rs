//! Request-scoped scratch directory.
//!
//! Each `compress` call owns one uniquely named directory under the configured
//! temp root. The directory is removed when the `Workspace` is dropped, so every
//! exit path (including `?` early returns) releases it. Removal is best-effort.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::errors::DomainResult;

pub struct Workspace {
    dir: TempDir,
    request_id: Uuid,
}

impl Workspace {
    /// Create a fresh workspace for `request_id` under `temp_root`.
    pub fn create(temp_root: &Path, request_id: Uuid) -> DomainResult<Self> {
        fs::create_dir_all(temp_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("docband-{}-", request_id))
            .tempdir_in(temp_root)?;
        log::debug!("Created workspace {} for request {}", dir.path().display(), request_id);
        Ok(Self { dir, request_id })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Path of a file inside the workspace (not created).
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> DomainResult<PathBuf> {
        let path = self.file(name);
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Remove the directory now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            log::warn!("Failed to clean up workspace {} for request {}: {}", path.display(), self.request_id, e);
        } else {
            log::debug!("Removed workspace {} for request {}", path.display(), self.request_id);
        }
    }
}
