//! Manifest/ZIP cross-validation and batch-breakdown estimation.
//!
//! The validator never returns an error: every failure mode degrades
//! into a failed [`ValidationResult`] carrying human-readable messages,
//! so the caller can persist and display it.

use std::collections::HashSet;
use std::io::Cursor;

use calamine::{Data, Reader};

use super::{BatchChunk, HeaderMatching, ManifestEntry, ValidationResult};

/// How many missing/extra filenames a summary line spells out.
const SUMMARY_FILENAMES: usize = 5;

/// Validator knobs; mirrors the corresponding [`crate::config::Config`]
/// fields so the validator stays independent of the config module.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_certificates: usize,
    pub batch_size: usize,
    pub minutes_per_certificate: f64,
    pub header_matching: HeaderMatching,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_certificates: crate::config::DEFAULT_MAX_CERTIFICATES,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            minutes_per_certificate: crate::config::DEFAULT_MINUTES_PER_CERTIFICATE,
            header_matching: HeaderMatching::default(),
        }
    }
}

/// Validation report plus the accepted manifest rows.
///
/// `entries` holds every accepted row (first occurrence wins on
/// duplicates); certificate records are only created from it when
/// `result.is_valid` is true.
#[derive(Debug, Clone)]
pub struct ManifestValidation {
    pub result: ValidationResult,
    pub entries: Vec<ManifestEntry>,
}

impl ManifestValidation {
    pub(crate) fn failed(error: String) -> Self {
        Self {
            result: ValidationResult::failed(error),
            entries: Vec::new(),
        }
    }
}

/// Validates manifest spreadsheet bytes against the set of PDF
/// basenames found in the batch archive.
pub fn validate_manifest(
    manifest_bytes: &[u8],
    pdf_filenames: &HashSet<String>,
    limits: &ValidationLimits,
) -> ManifestValidation {
    let mut workbook = match calamine::open_workbook_auto_from_rs(Cursor::new(manifest_bytes)) {
        Ok(wb) => wb,
        Err(e) => {
            return ManifestValidation::failed(format!(
                "Unable to read manifest spreadsheet: {}",
                e
            ));
        }
    };

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            return ManifestValidation::failed(format!(
                "Unable to read the first manifest sheet: {}",
                e
            ));
        }
        None => return ManifestValidation::failed("Manifest has no sheets".to_string()),
    };

    let mut rows = range.rows();
    let header_row = match rows.next() {
        Some(row) => row,
        None => return ManifestValidation::failed("Manifest has no rows".to_string()),
    };

    let columns = match discover_columns(header_row, limits.header_matching) {
        Ok(columns) => columns,
        Err(message) => return ManifestValidation::failed(message),
    };

    let mut errors = Vec::new();
    let mut entries: Vec<ManifestEntry> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_filenames: HashSet<String> = HashSet::new();
    let mut total_entries: u32 = 0;

    for (index, row) in rows.enumerate() {
        // 1-based spreadsheet row number, accounting for the header.
        let row_number = index + 2;

        if row.iter().all(cell_is_blank) {
            continue;
        }
        total_entries += 1;

        let certificate_id = cell_string(row.get(columns.certificate_id));
        let filename = cell_string(row.get(columns.filename));

        if certificate_id.is_empty() {
            errors.push(format!("Row {}: missing certificate ID", row_number));
            continue;
        }
        if filename.is_empty() {
            errors.push(format!("Row {}: missing filename", row_number));
            continue;
        }

        if !seen_ids.insert(certificate_id.clone()) {
            errors.push(format!(
                "Row {}: duplicate certificate ID '{}'",
                row_number, certificate_id
            ));
            continue;
        }
        if !seen_filenames.insert(filename.clone()) {
            errors.push(format!(
                "Row {}: duplicate filename '{}'",
                row_number, filename
            ));
            continue;
        }

        let recipient_name = columns
            .recipient_name
            .map(|col| cell_string(row.get(col)))
            .filter(|v| !v.is_empty());
        let recipient_email = columns
            .recipient_email
            .map(|col| cell_string(row.get(col)))
            .filter(|v| !v.is_empty());

        entries.push(ManifestEntry {
            certificate_id,
            filename,
            recipient_name,
            recipient_email,
        });
    }

    if total_entries == 0 {
        errors.push("Manifest has no data rows".to_string());
    }

    let accepted = entries.len();
    if accepted > limits.max_certificates {
        // Reported counts still reflect the parsed data; the list is
        // deliberately not truncated.
        errors.push(format!(
            "Manifest contains {} certificates, exceeding the maximum of {} per batch",
            accepted, limits.max_certificates
        ));
    }

    let missing_pdfs: Vec<String> = entries
        .iter()
        .filter(|e| !pdf_filenames.contains(&e.filename))
        .map(|e| e.filename.clone())
        .collect();

    let manifest_filenames: HashSet<&String> = entries.iter().map(|e| &e.filename).collect();
    let mut extra_pdfs: Vec<String> = pdf_filenames
        .iter()
        .filter(|name| !manifest_filenames.contains(name))
        .cloned()
        .collect();
    extra_pdfs.sort();

    if !missing_pdfs.is_empty() {
        errors.push(format!(
            "{} manifest {} no matching PDF in the archive: {}",
            missing_pdfs.len(),
            if missing_pdfs.len() == 1 {
                "entry has"
            } else {
                "entries have"
            },
            summarize_filenames(&missing_pdfs)
        ));
    }

    let mut warnings = Vec::new();
    if !extra_pdfs.is_empty() {
        warnings.push(format!(
            "{} archive {} no matching manifest entry: {}",
            extra_pdfs.len(),
            if extra_pdfs.len() == 1 {
                "PDF has"
            } else {
                "PDFs have"
            },
            summarize_filenames(&extra_pdfs)
        ));
    }

    let valid_records = (accepted - missing_pdfs.len()) as u32;
    let invalid_records = accepted as u32 - valid_records;
    let estimated_processing_time = estimate_minutes(valid_records, limits.minutes_per_certificate);
    let batch_breakdown = compute_breakdown(valid_records, limits);
    let is_valid = errors.is_empty() && missing_pdfs.is_empty();

    ManifestValidation {
        result: ValidationResult {
            is_valid,
            total_entries,
            valid_records,
            invalid_records,
            errors,
            warnings,
            missing_pdfs,
            extra_pdfs,
            estimated_processing_time,
            batch_breakdown,
        },
        entries,
    }
}

#[derive(Debug)]
struct ColumnMap {
    certificate_id: usize,
    filename: usize,
    recipient_name: Option<usize>,
    recipient_email: Option<usize>,
}

const ID_HEADERS: &[&str] = &["certificateid", "certificate_id"];
const FILENAME_HEADERS: &[&str] = &["filename", "file_name"];
const NAME_HEADERS: &[&str] = &["name", "recipientname", "recipient_name", "recipient"];
const EMAIL_HEADERS: &[&str] = &["email", "recipientemail", "recipient_email"];

fn discover_columns(
    header_row: &[Data],
    matching: HeaderMatching,
) -> Result<ColumnMap, String> {
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| normalize_header(&cell_string(Some(cell))))
        .collect();

    let find = |candidates: &[&str]| -> Option<usize> {
        headers.iter().position(|header| {
            !header.is_empty()
                && match matching {
                    HeaderMatching::Exact => candidates.contains(&header.as_str()),
                    HeaderMatching::Substring => {
                        candidates.iter().any(|c| header.contains(c))
                    }
                }
        })
    };

    let certificate_id = find(ID_HEADERS).ok_or_else(|| {
        "Manifest is missing a certificate ID column (expected 'certificateId' or 'certificate_id')"
            .to_string()
    })?;
    let filename = find(FILENAME_HEADERS).ok_or_else(|| {
        "Manifest is missing a filename column (expected 'filename' or 'file_name')".to_string()
    })?;

    Ok(ColumnMap {
        certificate_id,
        filename,
        recipient_name: find(NAME_HEADERS),
        recipient_email: find(EMAIL_HEADERS),
    })
}

/// Lowercases and strips whitespace so 'Certificate ID' and
/// 'certificate_id' compare equal to their allow-list forms.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn cell_is_blank(cell: &Data) -> bool {
    cell_string(Some(cell)).is_empty()
}

/// Converts a spreadsheet cell to a trimmed string. Numeric cells are
/// rendered without a trailing '.0' so IDs like 1024 survive Excel's
/// float representation.
fn cell_string(cell: Option<&Data>) -> String {
    let cell = match cell {
        Some(cell) => cell,
        None => return String::new(),
    };
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) => String::new(),
    }
}

fn summarize_filenames(filenames: &[String]) -> String {
    let shown: Vec<&str> = filenames
        .iter()
        .take(SUMMARY_FILENAMES)
        .map(|s| s.as_str())
        .collect();
    if filenames.len() > SUMMARY_FILENAMES {
        format!("{}, ...", shown.join(", "))
    } else {
        shown.join(", ")
    }
}

fn estimate_minutes(records: u32, minutes_per_certificate: f64) -> u32 {
    (records as f64 * minutes_per_certificate).ceil() as u32
}

fn compute_breakdown(valid_records: u32, limits: &ValidationLimits) -> Vec<BatchChunk> {
    let batch_size = limits.batch_size as u32;
    let mut breakdown = Vec::new();
    let mut remaining = valid_records;
    let mut batch_number = 1;

    while remaining > 0 {
        let certificate_count = remaining.min(batch_size);
        breakdown.push(BatchChunk {
            batch_number,
            certificate_count,
            estimated_minutes: estimate_minutes(certificate_count, limits.minutes_per_certificate),
        });
        remaining -= certificate_count;
        batch_number += 1;
    }

    breakdown
}
