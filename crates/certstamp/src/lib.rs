pub mod broadcast;
pub mod bundle;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod stamper;
pub mod storage;

pub use broadcast::{IssuanceEvent, IssuancePayload, ProgressBroadcaster};
pub use bundle::{BatchBundle, BundleError};
pub use config::Config;
pub use db::{
    BatchRecord, BatchStatus, CertificateRecord, CertificateStatus, Database, DatabaseError,
    ProjectRecord,
};
pub use error::{CertstampError, ConfigError, Result, StampError, StorageError};
pub use manifest::{
    validate_manifest, HeaderMatching, ManifestEntry, ValidationLimits, ValidationResult,
};
pub use orchestrator::{BatchStatusReport, IntakeOutcome, Issuer, OrchestratorError, Pacing};
pub use stamper::{CertificateStamper, QrPlacement, StampOutput};
pub use storage::BatchStore;
