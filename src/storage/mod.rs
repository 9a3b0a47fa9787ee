// Artifact storage
//
// Checkpoints and final model bundles are opaque blobs to this layer. The
// filesystem implementation writes through a temporary file and renames, so
// readers of the overwritten "best"/"final" paths never observe a partial
// write.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::errors::{TrainError, TrainResult};

pub trait ArtifactStorage: Send + Sync {
    fn save(&self, path: &Path, blob: &[u8]) -> TrainResult<()>;

    fn load(&self, path: &Path) -> TrainResult<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    fn remove(&self, path: &Path) -> TrainResult<()>;

    /// Relative paths under `dir`, in unspecified order.
    fn list(&self, dir: &Path) -> TrainResult<Vec<PathBuf>>;
}

/// Local-filesystem artifact storage rooted at a base directory.
pub struct FsArtifactStorage {
    root: PathBuf,
}

impl FsArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn persistence_error(path: &Path, err: impl Into<anyhow::Error>) -> TrainError {
        TrainError::ArtifactPersistence {
            path: path.display().to_string(),
            source: err.into(),
        }
    }
}

impl ArtifactStorage for FsArtifactStorage {
    fn save(&self, path: &Path, blob: &[u8]) -> TrainResult<()> {
        let full = self.resolve(path);
        let parent = full.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create artifact directory {}", parent.display()))
            .map_err(|e| Self::persistence_error(path, e))?;

        let tmp = full.with_extension("tmp");
        fs::write(&tmp, blob)
            .with_context(|| format!("Failed to write {}", tmp.display()))
            .map_err(|e| Self::persistence_error(path, e))?;
        fs::rename(&tmp, &full)
            .with_context(|| format!("Failed to move {} into place", tmp.display()))
            .map_err(|e| Self::persistence_error(path, e))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> TrainResult<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full)
            .with_context(|| format!("Failed to read artifact {}", full.display()))
            .map_err(|e| Self::persistence_error(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn remove(&self, path: &Path) -> TrainResult<()> {
        let full = self.resolve(path);
        if full.exists() {
            fs::remove_file(&full)
                .with_context(|| format!("Failed to remove {}", full.display()))
                .map_err(|e| Self::persistence_error(path, e))?;
        }
        Ok(())
    }

    fn list(&self, dir: &Path) -> TrainResult<Vec<PathBuf>> {
        let full = self.resolve(dir);
        if !full.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let read_dir = fs::read_dir(&full)
            .with_context(|| format!("Failed to read {}", full.display()))
            .map_err(|e| Self::persistence_error(dir, e))?;
        for entry in read_dir {
            let entry = entry
                .context("Failed to read directory entry")
                .map_err(|e| Self::persistence_error(dir, e))?;
            if entry.path().is_file() {
                entries.push(dir.join(entry.file_name()));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FsArtifactStorage::new(dir.path());

        let path = Path::new("job-1/final_model.json");
        storage.save(path, b"weights").unwrap();
        assert!(storage.exists(path));
        assert_eq!(storage.load(path).unwrap(), b"weights");

        // Overwrite in place
        storage.save(path, b"weights-v2").unwrap();
        assert_eq!(storage.load(path).unwrap(), b"weights-v2");

        storage.remove(path).unwrap();
        assert!(!storage.exists(path));
    }

    #[test]
    fn test_list_returns_files_in_directory() {
        let dir = TempDir::new().unwrap();
        let storage = FsArtifactStorage::new(dir.path());

        storage.save(Path::new("job-1/a.json"), b"a").unwrap();
        storage.save(Path::new("job-1/b.json"), b"b").unwrap();

        let mut listed = storage.list(Path::new("job-1")).unwrap();
        listed.sort();
        assert_eq!(listed, vec![PathBuf::from("job-1/a.json"), PathBuf::from("job-1/b.json")]);

        assert!(storage.list(Path::new("missing")).unwrap().is_empty());
    }
}
