//! The issuance service: batch drains, per-certificate reprocessing
//! and status reporting.
//!
//! A batch is drained sequentially by exactly one task at a time. The
//! in-process active set enforces exclusivity; a [`ProcessingGuard`]
//! releases the claim on every exit path, including panics.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::broadcast::{IssuanceEvent, IssuancePayload, ProgressBroadcaster};
use crate::config::Config;
use crate::db::{self, batch_repo, certificate_repo, project_repo};
use crate::db::{
    BatchRecord, BatchStatus, CertificateRecord, CertificateStatus, ProjectRecord,
};
use crate::error::Result;
use crate::stamper::{CertificateStamper, QrPlacement};
use crate::storage::BatchStore;

use super::intake::{self, IntakeOutcome};
use super::OrchestratorError;

/// Snapshot of a batch and its certificates.
#[derive(Debug)]
pub struct BatchStatusReport {
    pub batch: BatchRecord,
    pub certificates: Vec<CertificateRecord>,
    pub status_counts: BTreeMap<String, u32>,
    /// Whether a drain for this batch is running right now.
    pub is_processing: bool,
}

struct Inner {
    db: db::Database,
    store: BatchStore,
    stamper: CertificateStamper,
    broadcaster: ProgressBroadcaster,
    config: Config,
    active_batches: Mutex<HashSet<String>>,
}

/// Coordinates validation, stamping, persistence and progress events.
#[derive(Clone)]
pub struct Issuer {
    inner: Arc<Inner>,
}

/// Releases a batch's processing claim when dropped.
struct ProcessingGuard {
    batch_id: String,
    active: Arc<Inner>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.active_batches.lock() {
            active.remove(&self.batch_id);
        }
    }
}

impl Issuer {
    pub fn new(db: db::Database, config: Config) -> Self {
        let store = BatchStore::new(config.data_dir.clone());
        Self {
            inner: Arc::new(Inner {
                db,
                store,
                stamper: CertificateStamper::new(),
                broadcaster: ProgressBroadcaster::default(),
                config,
                active_batches: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn store(&self) -> &BatchStore {
        &self.inner.store
    }

    pub fn db(&self) -> &db::Database {
        &self.inner.db
    }

    /// Subscribes to progress events for all batches.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<IssuanceEvent> {
        self.inner.broadcaster.subscribe()
    }

    // ---- projects -------------------------------------------------

    pub fn create_project(&self, issuer_name: &str) -> Result<ProjectRecord> {
        let project = ProjectRecord::new(issuer_name);
        project_repo::insert(&self.inner.db, &project)?;
        Ok(project)
    }

    /// Stores the template PDF and QR placement for a project.
    pub fn configure_template(
        &self,
        project_id: &str,
        template_pdf: &[u8],
        qr_x: f64,
        qr_y: f64,
    ) -> Result<ProjectRecord> {
        project_repo::find_by_id(&self.inner.db, project_id)?
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        // Reject out-of-range placements before anything is stored.
        QrPlacement::new(qr_x, qr_y)?;

        let path = self.inner.store.write_template(project_id, template_pdf)?;
        project_repo::update_template(
            &self.inner.db,
            project_id,
            &path.display().to_string(),
            qr_x,
            qr_y,
        )?;
        self.require_project(project_id)
    }

    // ---- intake ---------------------------------------------------

    /// Validates and persists an uploaded batch archive.
    pub fn upload_batch(&self, project_id: &str, archive_bytes: Vec<u8>) -> Result<IntakeOutcome> {
        intake::ingest_batch(
            &self.inner.db,
            &self.inner.store,
            &self.inner.config,
            project_id,
            archive_bytes,
        )
    }

    // ---- batch processing -----------------------------------------

    /// Starts draining a batch in the background. Returns once the
    /// claim is taken; progress streams through [`Issuer::subscribe`].
    pub fn start_batch_processing(&self, batch_id: &str) -> Result<()> {
        let (batch, guard) = self.claim_for_start(batch_id)?;
        let issuer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = issuer.drain(batch, guard).await {
                tracing::error!(error = %e, "Batch drain failed");
            }
        });
        Ok(())
    }

    /// Drains a batch on the current task. Same semantics as
    /// [`Issuer::start_batch_processing`] but awaitable.
    pub async fn process_batch(&self, batch_id: &str) -> Result<()> {
        let (batch, guard) = self.claim_for_start(batch_id)?;
        self.drain(batch, guard).await
    }

    fn claim_for_start(&self, batch_id: &str) -> Result<(BatchRecord, ProcessingGuard)> {
        let batch = self.require_batch(batch_id)?;
        match batch.status {
            BatchStatus::Processing => {
                return Err(OrchestratorError::AlreadyProcessing(batch_id.to_string()).into());
            }
            BatchStatus::Completed => {
                return Err(OrchestratorError::AlreadyCompleted(batch_id.to_string()).into());
            }
            BatchStatus::Failed if !batch.validation.is_valid => {
                return Err(OrchestratorError::BatchNotValid(batch_id.to_string()).into());
            }
            _ => {}
        }
        let guard = self.acquire_guard(batch_id)?;
        Ok((batch, guard))
    }

    fn acquire_guard(&self, batch_id: &str) -> Result<ProcessingGuard> {
        let mut active = self
            .inner
            .active_batches
            .lock()
            .map_err(|_| db::DatabaseError::LockPoisoned)?;
        if !active.insert(batch_id.to_string()) {
            return Err(OrchestratorError::AlreadyProcessing(batch_id.to_string()).into());
        }
        Ok(ProcessingGuard {
            batch_id: batch_id.to_string(),
            active: Arc::clone(&self.inner),
        })
    }

    async fn drain(&self, batch: BatchRecord, _guard: ProcessingGuard) -> Result<()> {
        tracing::info!(batch_id = %batch.id, project_id = %batch.project_id, "Draining batch");

        batch_repo::update_status(&self.inner.db, &batch.id, BatchStatus::Processing)?;
        batch_repo::reset_processed(&self.inner.db, &batch.id)?;
        self.emit(
            &batch.project_id,
            &batch.id,
            IssuancePayload::BatchStarted {
                total_certificates: batch.total_certificates,
            },
        );

        match self.drain_pending(&batch).await {
            Ok(()) => {
                batch_repo::update_status(&self.inner.db, &batch.id, BatchStatus::Completed)?;
                self.emit(&batch.project_id, &batch.id, IssuancePayload::BatchCompleted);
                tracing::info!(batch_id = %batch.id, "Batch completed");
                Ok(())
            }
            Err(e) => {
                batch_repo::update_status(&self.inner.db, &batch.id, BatchStatus::Failed)?;
                self.emit(
                    &batch.project_id,
                    &batch.id,
                    IssuancePayload::BatchFailed {
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn drain_pending(&self, batch: &BatchRecord) -> Result<()> {
        let (project, placement) = self.project_placement(&batch.project_id)?;
        let certificates = certificate_repo::pending_by_batch(&self.inner.db, &batch.id)?;
        let total = certificates.len();

        for (index, certificate) in certificates.into_iter().enumerate() {
            self.process_certificate(&project, &placement, certificate)?;
            batch_repo::increment_processed(&self.inner.db, &batch.id)?;
            if index + 1 < total {
                self.inner.config.pacing.pause().await;
            }
        }
        Ok(())
    }

    fn project_placement(&self, project_id: &str) -> Result<(ProjectRecord, QrPlacement)> {
        let project = self.require_project(project_id)?;
        let (x, y) = match (project.qr_x, project.qr_y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(OrchestratorError::ProjectNotReady(project_id.to_string()).into()),
        };
        let placement = QrPlacement::new(x, y)?;
        Ok((project, placement))
    }

    /// Issues one certificate. Stamping failures are recorded on the
    /// certificate and do not abort the batch; only persistence
    /// failures bubble up.
    fn process_certificate(
        &self,
        project: &ProjectRecord,
        placement: &QrPlacement,
        mut certificate: CertificateRecord,
    ) -> Result<CertificateStatus> {
        certificate.status = CertificateStatus::InProgress;
        certificate.processing_started_at = Some(Utc::now());
        certificate.processing_completed_at = None;
        certificate.error_message = None;
        certificate_repo::update(&self.inner.db, &certificate)?;
        self.emit(
            &project.id,
            &certificate.batch_id,
            IssuancePayload::CertificateStarted {
                certificate_id: certificate.certificate_id.clone(),
            },
        );

        let verification_url = self.verification_url(&certificate.certificate_id, None);
        let stamped = self
            .inner
            .store
            .read_source(&certificate.batch_id, &certificate.filename)
            .map_err(crate::error::CertstampError::from)
            .and_then(|source| {
                Ok(self
                    .inner
                    .stamper
                    .stamp(&source, placement, &verification_url)?)
            });

        match stamped {
            Ok(output) => {
                let issued_path = self.inner.store.write_issued(
                    &certificate.batch_id,
                    &certificate.filename,
                    &output.pdf_bytes,
                )?;
                certificate.status = CertificateStatus::Issued;
                certificate.issued_pdf_path = Some(issued_path.display().to_string());
                certificate.qr_code_data = Some(output.qr_data_url);
                certificate.verification_url = Some(verification_url);
                certificate.error_message = None;
            }
            Err(e) => {
                tracing::warn!(
                    certificate_id = %certificate.certificate_id,
                    error = %e,
                    "Certificate issuance failed"
                );
                certificate.status = CertificateStatus::Failed;
                certificate.error_message = Some(e.to_string());
            }
        }
        certificate.processing_completed_at = Some(Utc::now());
        certificate_repo::update(&self.inner.db, &certificate)?;

        self.emit(
            &project.id,
            &certificate.batch_id,
            IssuancePayload::CertificateCompleted {
                certificate_id: certificate.certificate_id.clone(),
                status: certificate.status,
                error: certificate.error_message.clone(),
            },
        );
        Ok(certificate.status)
    }

    // ---- per-certificate operations -------------------------------

    /// Retries a failed certificate after the configured delay.
    pub async fn retry_certificate(&self, id: &str) -> Result<CertificateRecord> {
        let certificate = self.require_certificate(id)?;
        if certificate.status != CertificateStatus::Failed {
            return Err(OrchestratorError::NotFailed {
                id: id.to_string(),
                status: certificate.status.to_string(),
            }
            .into());
        }
        self.reprocess(certificate).await
    }

    /// Reissues a certificate regardless of its current status.
    pub async fn reissue_certificate(&self, id: &str) -> Result<CertificateRecord> {
        let certificate = self.require_certificate(id)?;
        self.reprocess(certificate).await
    }

    async fn reprocess(&self, mut certificate: CertificateRecord) -> Result<CertificateRecord> {
        reset_certificate(&mut certificate);
        certificate_repo::update(&self.inner.db, &certificate)?;

        let delay = self.inner.config.retry_delay_ms;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let (project, placement) = self.project_placement(&certificate.project_id)?;
        self.process_certificate(&project, &placement, certificate.clone())?;
        self.require_certificate(&certificate.id)
    }

    /// Re-derives the verification URL (cache-busted) and QR preview
    /// of an issued certificate. The stamped PDF is left untouched.
    pub fn republish_certificate(&self, id: &str) -> Result<CertificateRecord> {
        let mut certificate = self.require_certificate(id)?;
        if certificate.status != CertificateStatus::Issued {
            return Err(OrchestratorError::NotIssued {
                id: id.to_string(),
                status: certificate.status.to_string(),
            }
            .into());
        }

        let url = self.verification_url(
            &certificate.certificate_id,
            Some(Utc::now().timestamp()),
        );
        certificate.qr_code_data = Some(self.inner.stamper.preview_data_url(&url)?);
        certificate.verification_url = Some(url);
        certificate_repo::update(&self.inner.db, &certificate)?;

        self.emit(
            &certificate.project_id,
            &certificate.batch_id,
            IssuancePayload::CertificateRepublished {
                certificate_id: certificate.certificate_id.clone(),
            },
        );
        Ok(certificate)
    }

    // ---- bulk operations ------------------------------------------

    /// Retries the failed certificates among `ids` through the
    /// single-certificate path. Rejected outright when none of the
    /// requested certificates is failed. Returns how many were
    /// reprocessed.
    pub async fn bulk_retry_certificates(&self, ids: &[String]) -> Result<usize> {
        let mut failed = Vec::new();
        for id in ids {
            let certificate = self.require_certificate(id)?;
            if certificate.status == CertificateStatus::Failed {
                failed.push(certificate);
            }
        }
        if failed.is_empty() {
            return Err(OrchestratorError::NoFailedCertificates.into());
        }

        let queued = failed.len();
        for certificate in failed {
            self.reprocess(certificate).await?;
        }
        Ok(queued)
    }

    /// Reissues every certificate in `ids` regardless of status, one
    /// at a time through the single-certificate path.
    pub async fn bulk_reissue_certificates(&self, ids: &[String]) -> Result<usize> {
        let mut certificates = Vec::new();
        for id in ids {
            certificates.push(self.require_certificate(id)?);
        }

        let queued = certificates.len();
        for certificate in certificates {
            self.reprocess(certificate).await?;
        }
        Ok(queued)
    }

    // ---- status and recovery --------------------------------------

    pub fn get_batch_status(&self, batch_id: &str) -> Result<BatchStatusReport> {
        let batch = self.require_batch(batch_id)?;
        let certificates = certificate_repo::list_by_batch(&self.inner.db, batch_id)?;
        let status_counts = certificate_repo::status_counts(&self.inner.db, batch_id)?;
        let is_processing = self
            .inner
            .active_batches
            .lock()
            .map(|active| active.contains(batch_id))
            .unwrap_or(false);
        Ok(BatchStatusReport {
            batch,
            certificates,
            status_counts,
            is_processing,
        })
    }

    /// Fails batches left in `processing` by a previous run. Run once
    /// at startup, before any drain starts. Returns how many batches
    /// were recovered.
    pub fn recover_stale_batches(&self) -> Result<usize> {
        let stale = batch_repo::list_by_status(&self.inner.db, BatchStatus::Processing)?;
        for batch in &stale {
            tracing::warn!(batch_id = %batch.id, "Failing batch interrupted by restart");
            for mut certificate in certificate_repo::list_by_batch(&self.inner.db, &batch.id)? {
                if certificate.status == CertificateStatus::InProgress {
                    certificate.status = CertificateStatus::Failed;
                    certificate.error_message =
                        Some("Processing interrupted by restart".to_string());
                    certificate.processing_completed_at = Some(Utc::now());
                    certificate_repo::update(&self.inner.db, &certificate)?;
                }
            }
            batch_repo::update_status(&self.inner.db, &batch.id, BatchStatus::Failed)?;
        }
        Ok(stale.len())
    }

    // ---- helpers --------------------------------------------------

    fn verification_url(&self, certificate_id: &str, cache_bust: Option<i64>) -> String {
        let base = self.inner.config.verification_base_url.trim_end_matches('/');
        match cache_bust {
            Some(t) => format!("{}/verify/{}?t={}", base, certificate_id, t),
            None => format!("{}/verify/{}", base, certificate_id),
        }
    }

    fn emit(&self, project_id: &str, batch_id: &str, payload: IssuancePayload) {
        self.inner
            .broadcaster
            .send(IssuanceEvent::new(project_id, batch_id, payload));
    }

    fn require_project(&self, id: &str) -> Result<ProjectRecord> {
        Ok(project_repo::find_by_id(&self.inner.db, id)?
            .ok_or_else(|| OrchestratorError::ProjectNotFound(id.to_string()))?)
    }

    fn require_batch(&self, id: &str) -> Result<BatchRecord> {
        Ok(batch_repo::find_by_id(&self.inner.db, id)?
            .ok_or_else(|| OrchestratorError::BatchNotFound(id.to_string()))?)
    }

    fn require_certificate(&self, id: &str) -> Result<CertificateRecord> {
        Ok(certificate_repo::find_by_id(&self.inner.db, id)?
            .ok_or_else(|| OrchestratorError::CertificateNotFound(id.to_string()))?)
    }
}

fn reset_certificate(certificate: &mut CertificateRecord) {
    certificate.status = CertificateStatus::Pending;
    certificate.error_message = None;
    certificate.issued_pdf_path = None;
    certificate.qr_code_data = None;
    certificate.verification_url = None;
    certificate.processing_started_at = None;
    certificate.processing_completed_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CertstampError;

    fn test_issuer() -> (tempfile::TempDir, Issuer) {
        let dir = tempfile::tempdir().unwrap();
        let db = db::Database::open_in_memory().expect("Failed to create test database");
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            pacing: super::super::Pacing::None,
            retry_delay_ms: 0,
            ..Config::default()
        };
        (dir, Issuer::new(db, config))
    }

    fn orchestrator_err(result: Result<impl std::fmt::Debug>) -> OrchestratorError {
        match result.unwrap_err() {
            CertstampError::Orchestrator(e) => e,
            other => panic!("expected orchestrator error, got {}", other),
        }
    }

    #[test]
    fn test_create_project() {
        let (_dir, issuer) = test_issuer();
        let project = issuer.create_project("Acme Training").unwrap();
        assert_eq!(project.issuer_name, "Acme Training");
        assert!(!project.is_ready_for_batches());
    }

    #[test]
    fn test_configure_template_rejects_bad_placement() {
        let (_dir, issuer) = test_issuer();
        let project = issuer.create_project("Acme").unwrap();
        let result = issuer.configure_template(&project.id, b"%PDF-", 120.0, 10.0);
        assert!(matches!(
            result,
            Err(CertstampError::Stamp(crate::error::StampError::InvalidPlacement { .. }))
        ));
    }

    #[test]
    fn test_configure_template_unknown_project() {
        let (_dir, issuer) = test_issuer();
        let err = orchestrator_err(issuer.configure_template("missing", b"%PDF-", 10.0, 10.0));
        assert!(matches!(err, OrchestratorError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_process_unknown_batch() {
        let (_dir, issuer) = test_issuer();
        let err = orchestrator_err(issuer.process_batch("missing").await);
        assert!(matches!(err, OrchestratorError::BatchNotFound(_)));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (_dir, issuer) = test_issuer();
        {
            let _guard = issuer.acquire_guard("b1").unwrap();
            let err = orchestrator_err(issuer.acquire_guard("b1").map(|_| ()));
            assert!(matches!(err, OrchestratorError::AlreadyProcessing(_)));
        }
        // Dropped, so the claim can be taken again.
        let _guard = issuer.acquire_guard("b1").unwrap();
    }

    #[tokio::test]
    async fn test_retry_requires_failed_certificate() {
        let (_dir, issuer) = test_issuer();
        let err = orchestrator_err(issuer.retry_certificate("missing").await);
        assert!(matches!(err, OrchestratorError::CertificateNotFound(_)));
    }

    #[test]
    fn test_verification_url_shapes() {
        let (_dir, issuer) = test_issuer();
        assert_eq!(
            issuer.verification_url("C-001", None),
            "http://localhost:5000/verify/C-001"
        );
        assert_eq!(
            issuer.verification_url("C-001", Some(1700000000)),
            "http://localhost:5000/verify/C-001?t=1700000000"
        );
    }

    #[test]
    fn test_recover_stale_batches_without_stale_batches() {
        let (_dir, issuer) = test_issuer();
        assert_eq!(issuer.recover_stale_batches().unwrap(), 0);
    }
}
