//! Batch intake: archive inspection, manifest validation and record
//! creation.
//!
//! Intake never loses an upload. A batch row is written even when
//! validation fails, carrying the full report, so the uploader can see
//! exactly what was wrong.

use crate::bundle::BatchBundle;
use crate::config::Config;
use crate::db::{self, batch_repo, certificate_repo, project_repo};
use crate::db::{BatchRecord, BatchStatus, CertificateRecord};
use crate::error::Result;
use crate::manifest::validator::{validate_manifest, ManifestValidation, ValidationLimits};
use crate::manifest::ValidationResult;
use crate::storage::BatchStore;

use super::OrchestratorError;

/// Result of ingesting one uploaded archive.
#[derive(Debug)]
pub struct IntakeOutcome {
    pub batch: BatchRecord,
    /// Certificate rows created from the manifest. Empty when the
    /// batch failed validation.
    pub certificates: Vec<CertificateRecord>,
}

/// Validates an uploaded batch archive against `project_id` and
/// persists the batch, its artifacts and (when valid) its certificates.
pub fn ingest_batch(
    db: &db::Database,
    store: &BatchStore,
    config: &Config,
    project_id: &str,
    archive_bytes: Vec<u8>,
) -> Result<IntakeOutcome> {
    let _span = tracing::info_span!("intake.ingest", project_id = %project_id).entered();

    let project = project_repo::find_by_id(db, project_id)?
        .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
    if !project.is_ready_for_batches() {
        return Err(OrchestratorError::ProjectNotReady(project_id.to_string()).into());
    }

    let limits = ValidationLimits {
        max_certificates: config.max_certificates_per_batch,
        batch_size: config.processing_batch_size,
        minutes_per_certificate: config.minutes_per_certificate,
        header_matching: config.header_matching,
    };

    // The bundle consumes its bytes; keep a copy for the archive store.
    let (validation, manifest_name, bundle) = match BatchBundle::open(archive_bytes.clone()) {
        Ok(mut bundle) => match bundle.read_manifest() {
            Ok(manifest_bytes) => {
                let validation =
                    validate_manifest(&manifest_bytes, bundle.pdf_filenames(), &limits);
                let manifest_name = bundle.manifest_name().to_string();
                (validation, Some(manifest_name), Some(bundle))
            }
            Err(e) => (ManifestValidation::failed(e.to_string()), None, None),
        },
        Err(e) => (ManifestValidation::failed(e.to_string()), None, None),
    };

    let status = if validation.result.is_valid {
        BatchStatus::Pending
    } else {
        BatchStatus::Failed
    };

    let mut batch = BatchRecord::new(project_id, status, validation.result.clone());
    batch.manifest_name = manifest_name;

    let archive_path = store.write_archive(&batch.id, &archive_bytes)?;
    batch.archive_path = Some(archive_path.display().to_string());

    if !validation.result.is_valid {
        tracing::info!(
            batch_id = %batch.id,
            errors = validation.result.errors.len(),
            "Batch rejected by validation"
        );
        batch_repo::insert(db, &batch)?;
        return Ok(IntakeOutcome {
            batch,
            certificates: Vec::new(),
        });
    }

    // Extraction failure after a clean validation means the archive is
    // unreadable after all; the batch flips to failed.
    let mut bundle = bundle.expect("valid batches always have an open bundle");
    if let Err(e) = extract_sources(store, &batch.id, &mut bundle, &validation) {
        tracing::warn!(batch_id = %batch.id, error = %e, "Source extraction failed");
        batch.status = BatchStatus::Failed;
        batch.validation = ValidationResult::failed(e.to_string());
        batch_repo::insert(db, &batch)?;
        return Ok(IntakeOutcome {
            batch,
            certificates: Vec::new(),
        });
    }

    let certificates: Vec<CertificateRecord> = validation
        .entries
        .iter()
        .map(|entry| CertificateRecord::from_manifest_entry(&batch.id, project_id, entry))
        .collect();

    batch_repo::insert(db, &batch)?;
    certificate_repo::insert_many(db, &certificates)?;

    tracing::info!(
        batch_id = %batch.id,
        certificates = certificates.len(),
        "Batch accepted"
    );

    Ok(IntakeOutcome {
        batch,
        certificates,
    })
}

fn extract_sources(
    store: &BatchStore,
    batch_id: &str,
    bundle: &mut BatchBundle,
    validation: &ManifestValidation,
) -> Result<()> {
    for entry in &validation.entries {
        let bytes = bundle
            .read_pdf(&entry.filename)
            .map_err(|e| OrchestratorError::ArchiveUnreadable(e.to_string()))?;
        store.write_source(batch_id, &entry.filename, &bytes)?;
    }
    Ok(())
}
