//! Manifest validation: spreadsheet parsing and ZIP cross-checking.

pub mod validator;

pub use validator::{validate_manifest, ManifestValidation, ValidationLimits};

use serde::{Deserialize, Serialize};

/// How manifest column headers are recognized.
///
/// `Exact` matches normalized headers (lowercased, spaces stripped)
/// against a small allow-list. `Substring` preserves the legacy
/// containment behavior for manifests authored against older releases,
/// at the cost of accepting headers like `old_certificate_id_backup`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMatching {
    #[default]
    Exact,
    Substring,
}

impl std::str::FromStr for HeaderMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(HeaderMatching::Exact),
            "substring" => Ok(HeaderMatching::Substring),
            other => Err(format!(
                "unknown header matching mode '{}' (expected 'exact' or 'substring')",
                other
            )),
        }
    }
}

/// One accepted manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub certificate_id: String,
    pub filename: String,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
}

/// One estimation chunk of the batch breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchChunk {
    /// 1-based position of this chunk.
    pub batch_number: u32,
    pub certificate_count: u32,
    /// Estimated processing time for this chunk, in minutes.
    pub estimated_minutes: u32,
}

/// Outcome of validating a manifest against a ZIP's PDF file list.
/// Immutable once computed; persisted verbatim on the batch record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationResult {
    /// True iff `errors` is empty and `missing_pdfs` is empty.
    /// Extra PDFs are tolerated (surfaced via `warnings`).
    pub is_valid: bool,
    /// Number of non-empty data rows in the manifest.
    pub total_entries: u32,
    pub valid_records: u32,
    pub invalid_records: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Manifest filenames with no matching PDF in the archive.
    pub missing_pdfs: Vec<String>,
    /// Archive PDFs with no matching manifest row.
    pub extra_pdfs: Vec<String>,
    /// Whole-batch processing estimate, in minutes.
    pub estimated_processing_time: u32,
    pub batch_breakdown: Vec<BatchChunk>,
}

impl ValidationResult {
    /// A failed result carrying a single error and zero counts.
    pub fn failed(error: String) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }
}
