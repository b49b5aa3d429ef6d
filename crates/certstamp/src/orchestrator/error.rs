use thiserror::Error;

/// Errors surfaced by issuance operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project {0} has no template or QR placement configured")]
    ProjectNotReady(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("Batch {0} is already being processed")]
    AlreadyProcessing(String),

    #[error("Batch {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Batch {0} failed validation and cannot be processed")]
    BatchNotValid(String),

    #[error("None of the requested certificates is failed; nothing to retry")]
    NoFailedCertificates,

    #[error("Certificate {id} is not issued (status: {status}); republish requires an issued certificate")]
    NotIssued { id: String, status: String },

    #[error("Certificate {id} is not failed (status: {status}); retry requires a failed certificate")]
    NotFailed { id: String, status: String },

    #[error("Batch archive became unreadable: {0}")]
    ArchiveUnreadable(String),
}
