//! Project repository — CRUD operations for the `projects` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// A project row: issuer identity plus template/placement setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub issuer_name: String,
    pub template_path: Option<String>,
    pub qr_x: Option<f64>,
    pub qr_y: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(issuer_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            issuer_name: issuer_name.to_string(),
            template_path: None,
            qr_x: None,
            qr_y: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A batch upload is only accepted once both the template PDF and
    /// the QR placement are configured.
    pub fn is_ready_for_batches(&self) -> bool {
        self.template_path.is_some() && self.qr_x.is_some() && self.qr_y.is_some()
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            issuer_name: row.get("issuer_name")?,
            template_path: row.get("template_path")?,
            qr_x: row.get("qr_x")?,
            qr_y: row.get("qr_y")?,
            created_at: parse_timestamp(&row.get::<_, String>("created_at")?),
            updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?),
        })
    }
}

/// Inserts a new project row.
pub fn insert(db: &Database, project: &ProjectRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO projects (id, issuer_name, template_path, qr_x, qr_y, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.id,
                project.issuer_name,
                project.template_path,
                project.qr_x,
                project.qr_y,
                format_timestamp(project.created_at),
                format_timestamp(project.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a project by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ProjectRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM projects WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ProjectRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Updates the template reference and QR placement for a project.
pub fn update_template(
    db: &Database,
    id: &str,
    template_path: &str,
    qr_x: f64,
    qr_y: f64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE projects SET template_path = ?2, qr_x = ?3, qr_y = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, template_path, qr_x, qr_y, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Deletes a project. Batches and certificates cascade.
pub fn delete(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(())
    })
}
