//! Certificate repository — CRUD operations for the `certificates` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::manifest::ManifestEntry;

use super::{format_timestamp, parse_timestamp, parse_timestamp_opt, Database, DatabaseError};

/// Per-certificate state machine: `pending → in-progress → {issued, failed}`.
/// Retry/reissue reset a terminal certificate back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateStatus {
    Pending,
    InProgress,
    Issued,
    Failed,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::InProgress => "in-progress",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Failed => "failed",
        }
    }

    fn parse(s: &str, certificate_id: &str) -> Self {
        match s {
            "pending" => CertificateStatus::Pending,
            "in-progress" => CertificateStatus::InProgress,
            "issued" => CertificateStatus::Issued,
            "failed" => CertificateStatus::Failed,
            other => {
                log::warn!(
                    "Unknown certificate status '{}' for certificate {}, defaulting to Failed",
                    other,
                    certificate_id
                );
                CertificateStatus::Failed
            }
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certificate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub id: String,
    pub batch_id: String,
    pub project_id: String,
    /// Business identifier from the manifest; unique within a batch.
    pub certificate_id: String,
    /// Expected recipient PDF filename inside the batch ZIP.
    pub filename: String,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub status: CertificateStatus,
    pub issued_pdf_path: Option<String>,
    /// `data:image/png;base64,` preview of the verification QR code.
    pub qr_code_data: Option<String>,
    pub verification_url: Option<String>,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificateRecord {
    /// Creates a pending certificate from an accepted manifest row.
    pub fn from_manifest_entry(batch_id: &str, project_id: &str, entry: &ManifestEntry) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            project_id: project_id.to_string(),
            certificate_id: entry.certificate_id.clone(),
            filename: entry.filename.clone(),
            recipient_name: entry.recipient_name.clone(),
            recipient_email: entry.recipient_email.clone(),
            status: CertificateStatus::Pending,
            issued_pdf_path: None,
            qr_code_data: None,
            verification_url: None,
            error_message: None,
            processing_started_at: None,
            processing_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let certificate_id: String = row.get("certificate_id")?;
        let status = CertificateStatus::parse(&row.get::<_, String>("status")?, &certificate_id);

        Ok(Self {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            project_id: row.get("project_id")?,
            certificate_id,
            filename: row.get("filename")?,
            recipient_name: row.get("recipient_name")?,
            recipient_email: row.get("recipient_email")?,
            status,
            issued_pdf_path: row.get("issued_pdf_path")?,
            qr_code_data: row.get("qr_code_data")?,
            verification_url: row.get("verification_url")?,
            error_message: row.get("error_message")?,
            processing_started_at: parse_timestamp_opt(row.get("processing_started_at")?),
            processing_completed_at: parse_timestamp_opt(row.get("processing_completed_at")?),
            created_at: parse_timestamp(&row.get::<_, String>("created_at")?),
            updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?),
        })
    }
}

/// Inserts a new certificate row.
pub fn insert(db: &Database, cert: &CertificateRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO certificates (id, batch_id, project_id, certificate_id, filename,
             recipient_name, recipient_email, status, issued_pdf_path, qr_code_data,
             verification_url, error_message, processing_started_at, processing_completed_at,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                cert.id,
                cert.batch_id,
                cert.project_id,
                cert.certificate_id,
                cert.filename,
                cert.recipient_name,
                cert.recipient_email,
                cert.status.as_str(),
                cert.issued_pdf_path,
                cert.qr_code_data,
                cert.verification_url,
                cert.error_message,
                cert.processing_started_at.map(format_timestamp),
                cert.processing_completed_at.map(format_timestamp),
                format_timestamp(cert.created_at),
                format_timestamp(cert.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Inserts the full set of certificates derived from a validated batch.
pub fn insert_many(db: &Database, certs: &[CertificateRecord]) -> Result<(), DatabaseError> {
    for cert in certs {
        insert(db, cert)?;
    }
    Ok(())
}

/// Updates an existing certificate row. All fields except `id` and
/// `created_at` are overwritten.
pub fn update(db: &Database, cert: &CertificateRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE certificates SET status=?2, issued_pdf_path=?3, qr_code_data=?4,
             verification_url=?5, error_message=?6, processing_started_at=?7,
             processing_completed_at=?8, updated_at=?9
             WHERE id=?1",
            params![
                cert.id,
                cert.status.as_str(),
                cert.issued_pdf_path,
                cert.qr_code_data,
                cert.verification_url,
                cert.error_message,
                cert.processing_started_at.map(format_timestamp),
                cert.processing_completed_at.map(format_timestamp),
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    })
}

/// Finds a certificate by its record ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<CertificateRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM certificates WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], CertificateRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all certificates of a batch in creation order.
pub fn list_by_batch(db: &Database, batch_id: &str) -> Result<Vec<CertificateRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM certificates WHERE batch_id = ?1 ORDER BY rowid ASC")?;
        let rows: Vec<CertificateRecord> = stmt
            .query_map(params![batch_id], CertificateRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists the pending certificates of a batch in creation order.
pub fn pending_by_batch(
    db: &Database,
    batch_id: &str,
) -> Result<Vec<CertificateRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM certificates WHERE batch_id = ?1 AND status = 'pending'
             ORDER BY rowid ASC",
        )?;
        let rows: Vec<CertificateRecord> = stmt
            .query_map(params![batch_id], CertificateRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Groups a batch's certificates by status label.
pub fn status_counts(db: &Database, batch_id: &str) -> Result<BTreeMap<String, u32>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM certificates WHERE batch_id = ?1 GROUP BY status",
        )?;
        let mut counts = BTreeMap::new();
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count);
        }
        Ok(counts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::batch_repo::{self, BatchRecord, BatchStatus};
    use crate::db::project_repo::{self, ProjectRecord};
    use crate::manifest::ValidationResult;

    fn test_db_with_batch() -> (Database, String, String) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let project = ProjectRecord::new("Acme");
        project_repo::insert(&db, &project).unwrap();
        let batch = BatchRecord::new(&project.id, BatchStatus::Pending, ValidationResult::default());
        batch_repo::insert(&db, &batch).unwrap();
        (db, project.id, batch.id)
    }

    fn sample_entry(certificate_id: &str, filename: &str) -> ManifestEntry {
        ManifestEntry {
            certificate_id: certificate_id.to_string(),
            filename: filename.to_string(),
            recipient_name: Some("Jane Doe".to_string()),
            recipient_email: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (db, project_id, batch_id) = test_db_with_batch();
        let cert = CertificateRecord::from_manifest_entry(
            &batch_id,
            &project_id,
            &sample_entry("C1", "a.pdf"),
        );
        insert(&db, &cert).unwrap();

        let found = find_by_id(&db, &cert.id).unwrap().unwrap();
        assert_eq!(found.certificate_id, "C1");
        assert_eq!(found.filename, "a.pdf");
        assert_eq!(found.status, CertificateStatus::Pending);
        assert!(found.processing_started_at.is_none());
        assert!(found.processing_completed_at.is_none());
    }

    #[test]
    fn test_update() {
        let (db, project_id, batch_id) = test_db_with_batch();
        let mut cert = CertificateRecord::from_manifest_entry(
            &batch_id,
            &project_id,
            &sample_entry("C1", "a.pdf"),
        );
        insert(&db, &cert).unwrap();

        cert.status = CertificateStatus::Issued;
        cert.issued_pdf_path = Some("batches/b1/issued/a.pdf".to_string());
        cert.verification_url = Some("http://localhost:5000/verify/C1".to_string());
        cert.processing_started_at = Some(Utc::now());
        cert.processing_completed_at = Some(Utc::now());
        update(&db, &cert).unwrap();

        let found = find_by_id(&db, &cert.id).unwrap().unwrap();
        assert_eq!(found.status, CertificateStatus::Issued);
        assert!(found.issued_pdf_path.is_some());
        assert!(found.processing_started_at.is_some());
        assert!(found.processing_completed_at.is_some());
    }

    #[test]
    fn test_list_by_batch_preserves_creation_order() {
        let (db, project_id, batch_id) = test_db_with_batch();
        for i in 0..5 {
            let cert = CertificateRecord::from_manifest_entry(
                &batch_id,
                &project_id,
                &sample_entry(&format!("C{}", i), &format!("f{}.pdf", i)),
            );
            insert(&db, &cert).unwrap();
        }

        let listed = list_by_batch(&db, &batch_id).unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.certificate_id.as_str()).collect();
        assert_eq!(ids, vec!["C0", "C1", "C2", "C3", "C4"]);
    }

    #[test]
    fn test_pending_by_batch_excludes_terminal() {
        let (db, project_id, batch_id) = test_db_with_batch();
        let mut issued = CertificateRecord::from_manifest_entry(
            &batch_id,
            &project_id,
            &sample_entry("C1", "a.pdf"),
        );
        insert(&db, &issued).unwrap();
        issued.status = CertificateStatus::Issued;
        update(&db, &issued).unwrap();

        let pending = CertificateRecord::from_manifest_entry(
            &batch_id,
            &project_id,
            &sample_entry("C2", "b.pdf"),
        );
        insert(&db, &pending).unwrap();

        let listed = pending_by_batch(&db, &batch_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].certificate_id, "C2");
    }

    #[test]
    fn test_status_counts() {
        let (db, project_id, batch_id) = test_db_with_batch();
        for (i, status) in [
            CertificateStatus::Issued,
            CertificateStatus::Issued,
            CertificateStatus::Failed,
            CertificateStatus::Pending,
        ]
        .iter()
        .enumerate()
        {
            let mut cert = CertificateRecord::from_manifest_entry(
                &batch_id,
                &project_id,
                &sample_entry(&format!("C{}", i), &format!("f{}.pdf", i)),
            );
            insert(&db, &cert).unwrap();
            cert.status = *status;
            update(&db, &cert).unwrap();
        }

        let counts = status_counts(&db, &batch_id).unwrap();
        assert_eq!(counts.get("issued"), Some(&2));
        assert_eq!(counts.get("failed"), Some(&1));
        assert_eq!(counts.get("pending"), Some(&1));
        assert_eq!(counts.get("in-progress"), None);
    }

    #[test]
    fn test_insert_many() {
        let (db, project_id, batch_id) = test_db_with_batch();
        let certs: Vec<CertificateRecord> = (0..3)
            .map(|i| {
                CertificateRecord::from_manifest_entry(
                    &batch_id,
                    &project_id,
                    &sample_entry(&format!("C{}", i), &format!("f{}.pdf", i)),
                )
            })
            .collect();
        insert_many(&db, &certs).unwrap();

        assert_eq!(list_by_batch(&db, &batch_id).unwrap().len(), 3);
    }
}
