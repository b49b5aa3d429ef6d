//! Batch repository — CRUD operations for the `batches` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::manifest::ValidationResult;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// Lifecycle of a batch: `pending → processing → {completed, failed}`.
/// A batch that failed validation is created directly in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    fn parse(s: &str, batch_id: &str) -> Self {
        match s {
            "pending" => BatchStatus::Pending,
            "processing" => BatchStatus::Processing,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            other => {
                log::warn!(
                    "Unknown batch status '{}' for batch {}, defaulting to Failed",
                    other,
                    batch_id
                );
                BatchStatus::Failed
            }
        }
    }
}

/// A batch row: one validated ZIP upload and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: String,
    pub project_id: String,
    pub status: BatchStatus,
    pub total_certificates: u32,
    pub processed_certificates: u32,
    pub archive_path: Option<String>,
    pub manifest_name: Option<String>,
    pub validation: ValidationResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn new(project_id: &str, status: BatchStatus, validation: ValidationResult) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            status,
            total_certificates: validation.valid_records,
            processed_certificates: 0,
            archive_path: None,
            manifest_name: None,
            validation,
            created_at: now,
            updated_at: now,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let id: String = row.get("id")?;
        let status = BatchStatus::parse(&row.get::<_, String>("status")?, &id);
        let validation_json: String = row.get("validation")?;
        let validation = serde_json::from_str(&validation_json).unwrap_or_else(|e| {
            log::warn!("Unreadable validation payload for batch {}: {}", id, e);
            ValidationResult::default()
        });

        Ok(Self {
            id,
            project_id: row.get("project_id")?,
            status,
            total_certificates: row.get("total_certificates")?,
            processed_certificates: row.get("processed_certificates")?,
            archive_path: row.get("archive_path")?,
            manifest_name: row.get("manifest_name")?,
            validation,
            created_at: parse_timestamp(&row.get::<_, String>("created_at")?),
            updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?),
        })
    }
}

/// Inserts a new batch row.
pub fn insert(db: &Database, batch: &BatchRecord) -> Result<(), DatabaseError> {
    let validation_json = serde_json::to_string(&batch.validation).unwrap_or_default();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO batches (id, project_id, status, total_certificates,
             processed_certificates, archive_path, manifest_name, validation,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                batch.id,
                batch.project_id,
                batch.status.as_str(),
                batch.total_certificates,
                batch.processed_certificates,
                batch.archive_path,
                batch.manifest_name,
                validation_json,
                format_timestamp(batch.created_at),
                format_timestamp(batch.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a batch by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<BatchRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM batches WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], BatchRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists batches currently in the given status, oldest first.
pub fn list_by_status(db: &Database, status: BatchStatus) -> Result<Vec<BatchRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM batches WHERE status = ?1 ORDER BY created_at ASC")?;
        let rows: Vec<BatchRecord> = stmt
            .query_map(params![status.as_str()], BatchRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Updates only the status and updated_at of a batch.
pub fn update_status(db: &Database, id: &str, status: BatchStatus) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE batches SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Resets the processed-certificates counter. Done at the start of a
/// drain so the counter always reflects the current run.
pub fn reset_processed(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE batches SET processed_certificates = 0, updated_at = ?2 WHERE id = ?1",
            params![id, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Bumps the processed-certificates counter by one.
pub fn increment_processed(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE batches SET processed_certificates = processed_certificates + 1,
             updated_at = ?2 WHERE id = ?1",
            params![id, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}
