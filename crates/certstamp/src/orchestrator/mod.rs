//! Issuance orchestration: intake, batch drains, retries and status.

mod error;
mod intake;
mod pacing;
mod service;

pub use error::OrchestratorError;
pub use intake::IntakeOutcome;
pub use pacing::Pacing;
pub use service::{BatchStatusReport, Issuer};
