use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Directory holding sealed archives until their single download.
#[derive(Debug, Clone)]
pub struct ArchiveStorage {
    directory: PathBuf,
}

impl ArchiveStorage {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `<directory>/<job_id>.zip`. Creation is exclusive, so an
    /// existing file is never overwritten.
    pub fn persist(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        self.ensure_directory()?;

        let path = self.directory.join(format!("{}.zip", job_id));

        // create_new gives O_CREAT | O_EXCL
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => {
                return Err(StorageError::WriteFile { path, source: e });
            }
        };

        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            let _ = std::fs::remove_file(&path);
            return Err(StorageError::WriteFile { path, source: e });
        }

        Ok(path)
    }

    /// Deletes a persisted archive. A file that is already gone is fine.
    pub fn release(path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}
