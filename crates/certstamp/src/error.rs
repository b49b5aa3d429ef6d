use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertstampError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stamping error: {0}")]
    Stamp(#[from] StampError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] crate::orchestrator::OrchestratorError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {variable}: '{value}' ({reason})")]
    InvalidValue {
        variable: String,
        value: String,
        reason: String,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Failed to parse PDF: {0}")]
    PdfParsing(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("Invalid QR placement ({x}, {y}): coordinates must be within 0..=100")]
    InvalidPlacement { x: f64, y: f64 },

    #[error("Failed to render QR code: {0}")]
    QrRender(String),

    #[error("Failed to serialize stamped PDF: {0}")]
    Serialize(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CertstampError>;
