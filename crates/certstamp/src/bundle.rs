//! Batch archive inspection.
//!
//! A batch upload is a single ZIP containing one spreadsheet manifest
//! and the recipient PDFs. This module only looks inside the archive;
//! validation lives in [`crate::manifest`] and persistence in the
//! intake flow.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use thiserror::Error;

/// Spreadsheet extensions recognized as the manifest entry.
const MANIFEST_EXTENSIONS: &[&str] = &["xlsx", "xls", "ods"];

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Failed to open batch archive: {0}")]
    OpenArchive(String),

    #[error("Archive contains no manifest spreadsheet (.xlsx, .xls or .ods)")]
    MissingManifest,

    #[error("Failed to read '{name}' from archive: {reason}")]
    ReadEntry { name: String, reason: String },
}

/// An opened batch archive.
pub struct BatchBundle {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
    manifest_name: String,
    pdf_filenames: HashSet<String>,
}

impl BatchBundle {
    /// Opens the archive and indexes its manifest and PDF entries.
    ///
    /// Entry names are reduced to their basenames: archives produced by
    /// different tools nest files under a top-level directory or not.
    pub fn open(bytes: Vec<u8>) -> Result<Self, BundleError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| BundleError::OpenArchive(e.to_string()))?;

        let mut manifest_name = None;
        let mut pdf_filenames = HashSet::new();

        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| BundleError::OpenArchive(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let base = basename(&name);
            // macOS archives ship AppleDouble shadows of every file.
            if base.starts_with("._") || base.starts_with('.') {
                continue;
            }

            match extension(&base) {
                Some(ext) if ext == "pdf" => {
                    pdf_filenames.insert(base);
                }
                Some(ext) if MANIFEST_EXTENSIONS.contains(&ext.as_str()) => {
                    if manifest_name.is_none() {
                        manifest_name = Some(name);
                    }
                }
                _ => {}
            }
        }

        let manifest_name = manifest_name.ok_or(BundleError::MissingManifest)?;

        Ok(Self {
            archive,
            manifest_name,
            pdf_filenames,
        })
    }

    /// Archive path of the manifest spreadsheet.
    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// Basenames of every PDF in the archive.
    pub fn pdf_filenames(&self) -> &HashSet<String> {
        &self.pdf_filenames
    }

    /// Reads the manifest spreadsheet bytes.
    pub fn read_manifest(&mut self) -> Result<Vec<u8>, BundleError> {
        let name = self.manifest_name.clone();
        self.read_entry(&name)
    }

    /// Reads a PDF by basename, wherever it sits in the archive tree.
    pub fn read_pdf(&mut self, filename: &str) -> Result<Vec<u8>, BundleError> {
        let full_name = self
            .entry_name_for(filename)
            .ok_or_else(|| BundleError::ReadEntry {
                name: filename.to_string(),
                reason: "not found in archive".to_string(),
            })?;
        self.read_entry(&full_name)
    }

    fn entry_name_for(&self, filename: &str) -> Option<String> {
        (0..self.archive.len())
            .filter_map(|i| self.archive.name_for_index(i))
            .find(|name| basename(name) == filename)
            .map(|name| name.to_string())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, BundleError> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| BundleError::ReadEntry {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| BundleError::ReadEntry {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }
}

fn basename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).to_string()
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}
