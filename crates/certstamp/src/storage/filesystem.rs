use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Filesystem-backed store for templates, uploaded archives, extracted
/// source PDFs and issued certificates.
#[derive(Debug, Clone)]
pub struct BatchStore {
    root: PathBuf,
}

impl BatchStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join("projects").join(project_id)
    }

    fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.root.join("batches").join(batch_id)
    }

    /// Path of a project's certificate template.
    pub fn template_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("template.pdf")
    }

    /// Path of a batch's uploaded archive.
    pub fn archive_path(&self, batch_id: &str) -> PathBuf {
        self.batch_dir(batch_id).join("archive.zip")
    }

    /// Path of an extracted source PDF awaiting issuance.
    pub fn source_path(&self, batch_id: &str, filename: &str) -> PathBuf {
        self.batch_dir(batch_id).join("source").join(filename)
    }

    /// Path of an issued (stamped) certificate PDF.
    pub fn issued_path(&self, batch_id: &str, filename: &str) -> PathBuf {
        self.batch_dir(batch_id).join("issued").join(filename)
    }

    pub fn write_template(&self, project_id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.template_path(project_id);
        write_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_archive(&self, batch_id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.archive_path(batch_id);
        write_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_source(
        &self,
        batch_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.source_path(batch_id, filename);
        write_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_issued(
        &self,
        batch_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.issued_path(batch_id, filename);
        write_file(&path, bytes)?;
        Ok(path)
    }

    pub fn read_source(&self, batch_id: &str, filename: &str) -> Result<Vec<u8>, StorageError> {
        read_file(&self.source_path(batch_id, filename))
    }

    pub fn read_issued(&self, batch_id: &str, filename: &str) -> Result<Vec<u8>, StorageError> {
        read_file(&self.issued_path(batch_id, filename))
    }

    /// Removes everything stored for a batch. Missing directories are
    /// not an error.
    pub fn remove_batch(&self, batch_id: &str) -> Result<(), StorageError> {
        let dir = self.batch_dir(batch_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: dir,
                source: e,
            }),
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, bytes).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}
