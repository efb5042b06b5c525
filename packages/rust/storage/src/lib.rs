//! Turso Embedded / libSQL storage layer for PactLens.
//!
//! The [`Storage`] struct wraps a libSQL database holding documents, their
//! extracted text, and analysis records.
//!
//! **Write rules:**
//! - Analysis records are unique per document (`UNIQUE(document_id)`).
//! - [`Storage::update_partial_analysis`] only touches rows whose `score` is
//!   still `NULL`, so a terminal record can never be overwritten.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use pactlens_shared::{
    AnalysisRecord, CallerId, ContractType, Document, DocumentId, Extraction, PactLensError,
    Result,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: impl std::fmt::Display) -> PactLensError {
    PactLensError::Persistence(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PactLensError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PactLensError::Persistence(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PactLensError::Persistence(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert a document together with its extracted text.
    pub async fn insert_document(&self, document: &Document, extraction: &Extraction) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "INSERT INTO documents (id, owner, filename, content_hash, detected_type, selected_party, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                document.id.to_string(),
                document.owner.as_str(),
                document.filename.as_str(),
                document.content_hash.as_str(),
                document.detected_type.map(|t| t.as_str()),
                document.selected_party.as_deref(),
                document.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(db_err)?;
        tx.execute(
            "INSERT INTO extractions (document_id, text, pages, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                extraction.document_id.to_string(),
                extraction.text.as_str(),
                extraction.pages,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Get a document by ID.
    pub async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner, filename, content_hash, detected_type, selected_party, created_at
                 FROM documents WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_document(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List an owner's documents, newest first.
    pub async fn list_documents(&self, owner: &CallerId) -> Result<Vec<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner, filename, content_hash, detected_type, selected_party, created_at
                 FROM documents WHERE owner = ?1 ORDER BY created_at DESC",
                params![owner.as_str()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_document(&row)?);
        }
        Ok(results)
    }

    /// Get the extracted text of a document.
    pub async fn get_extraction(&self, document_id: &DocumentId) -> Result<Option<Extraction>> {
        let mut rows = self
            .conn
            .query(
                "SELECT text, pages FROM extractions WHERE document_id = ?1",
                params![document_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Extraction {
                document_id: document_id.clone(),
                text: row.get::<String>(0).map_err(db_err)?,
                pages: row.get::<u32>(1).unwrap_or(0),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Set the denormalized contract type unless one is already stored.
    /// Returns whether a row changed.
    pub async fn set_document_type_if_unset(
        &self,
        id: &DocumentId,
        detected_type: ContractType,
    ) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE documents SET detected_type = ?1 WHERE id = ?2 AND detected_type IS NULL",
                params![detected_type.as_str(), id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    /// Record (or clear) the party the owner represents.
    pub async fn set_selected_party(&self, id: &DocumentId, party: Option<&str>) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE documents SET selected_party = ?1 WHERE id = ?2",
                params![party, id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete a document, its extraction, and its analysis. Returns whether it existed.
    pub async fn delete_document(&self, id: &DocumentId) -> Result<bool> {
        self.check_writable()?;
        let id = id.to_string();
        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute("DELETE FROM analyses WHERE document_id = ?1", params![id.as_str()])
            .await
            .map_err(db_err)?;
        tx.execute("DELETE FROM extractions WHERE document_id = ?1", params![id.as_str()])
            .await
            .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Analysis operations
    // -----------------------------------------------------------------------

    /// Most recent analysis record for a document.
    pub async fn find_latest_analysis(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<AnalysisRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, document_id, detected_type, parties_json, score, favorable, clauses_json,
                        risks_json, opportunities_json, summary, recommendations,
                        negotiation_points_json, created_at, updated_at
                 FROM analyses WHERE document_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                params![document_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_analysis(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Insert a new analysis record.
    ///
    /// Returns `false` when a record for the same document already exists.
    pub async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<bool> {
        self.check_writable()?;
        let result = self
            .conn
            .execute(
                "INSERT INTO analyses (id, document_id, detected_type, parties_json, score, favorable,
                    clauses_json, risks_json, opportunities_json, summary, recommendations,
                    negotiation_points_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(document_id) DO NOTHING",
                params![
                    record.id.as_str(),
                    record.document_id.to_string(),
                    record.detected_type.map(|t| t.as_str()),
                    to_json(&record.parties)?,
                    record.score.map(i64::from),
                    record.favorable.map(i64::from),
                    to_json(&record.clauses)?,
                    to_json(&record.risks)?,
                    to_json(&record.opportunities)?,
                    record.summary.as_deref(),
                    record.recommendations.as_deref(),
                    to_json(&record.negotiation_points)?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(result > 0)
    }

    /// Overwrite a partial analysis record in place, matched by id.
    ///
    /// Returns `false` when no partial record with that id exists, which
    /// includes the case where it already became terminal.
    pub async fn update_partial_analysis(&self, record: &AnalysisRecord) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE analyses SET
                    detected_type = ?1, parties_json = ?2, score = ?3, favorable = ?4,
                    clauses_json = ?5, risks_json = ?6, opportunities_json = ?7, summary = ?8,
                    recommendations = ?9, negotiation_points_json = ?10, updated_at = ?11
                 WHERE id = ?12 AND score IS NULL",
                params![
                    record.detected_type.map(|t| t.as_str()),
                    to_json(&record.parties)?,
                    record.score.map(i64::from),
                    record.favorable.map(i64::from),
                    to_json(&record.clauses)?,
                    to_json(&record.risks)?,
                    to_json(&record.opportunities)?,
                    record.summary.as_deref(),
                    record.recommendations.as_deref(),
                    to_json(&record.negotiation_points)?,
                    record.updated_at.to_rfc3339(),
                    record.id.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PactLensError::Persistence(format!("encode: {e}")))
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| PactLensError::Persistence(format!("corrupt {column}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PactLensError::Persistence(format!("invalid date: {e}")))
}

fn parse_id(raw: &str) -> Result<DocumentId> {
    raw.parse()
        .map_err(|e| PactLensError::Persistence(format!("invalid document id {raw}: {e}")))
}

/// Convert a database row to a [`Document`].
fn row_to_document(row: &libsql::Row) -> Result<Document> {
    Ok(Document {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        owner: CallerId(row.get::<String>(1).map_err(db_err)?),
        filename: row.get::<String>(2).map_err(db_err)?,
        content_hash: row.get::<String>(3).map_err(db_err)?,
        detected_type: row.get::<String>(4).ok().map(ContractType::from),
        selected_party: row.get::<String>(5).ok(),
        created_at: parse_timestamp(&row.get::<String>(6).map_err(db_err)?)?,
    })
}

/// Convert a database row to an [`AnalysisRecord`].
fn row_to_analysis(row: &libsql::Row) -> Result<AnalysisRecord> {
    Ok(AnalysisRecord {
        id: row.get::<String>(0).map_err(db_err)?,
        document_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
        detected_type: row.get::<String>(2).ok().map(ContractType::from),
        parties: from_json("parties_json", &row.get::<String>(3).map_err(db_err)?)?,
        score: row.get::<i64>(4).ok().map(|v| v.clamp(0, 100) as u8),
        favorable: row.get::<i64>(5).ok().map(|v| v != 0),
        clauses: from_json("clauses_json", &row.get::<String>(6).map_err(db_err)?)?,
        risks: from_json("risks_json", &row.get::<String>(7).map_err(db_err)?)?,
        opportunities: from_json("opportunities_json", &row.get::<String>(8).map_err(db_err)?)?,
        summary: row.get::<String>(9).ok(),
        recommendations: row.get::<String>(10).ok(),
        negotiation_points: from_json(
            "negotiation_points_json",
            &row.get::<String>(11).map_err(db_err)?,
        )?,
        created_at: parse_timestamp(&row.get::<String>(12).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(13).map_err(db_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactlens_shared::{Party, Risk, Severity, hash_text};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("pl_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn seed_document(storage: &Storage, owner: &str) -> DocumentId {
        let text = "This Agreement is between Acme Corp and John Smith.";
        let id = DocumentId::new();
        let document = Document {
            id: id.clone(),
            owner: CallerId::new(owner),
            filename: "contract.pdf".into(),
            content_hash: hash_text(text),
            detected_type: None,
            selected_party: None,
            created_at: Utc::now(),
        };
        let extraction = Extraction {
            document_id: id.clone(),
            text: text.into(),
            pages: 3,
        };
        storage
            .insert_document(&document, &extraction)
            .await
            .expect("insert document");
        id
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("pl_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn document_and_extraction_roundtrip() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;

        let document = storage.get_document(&id).await.unwrap().expect("document");
        assert_eq!(document.owner.as_str(), "alice");
        assert!(document.detected_type.is_none());

        let extraction = storage.get_extraction(&id).await.unwrap().expect("extraction");
        assert_eq!(extraction.pages, 3);
        assert!(extraction.text.contains("Acme Corp"));
        assert_eq!(extraction.content_hash(), document.content_hash);

        let listed = storage.list_documents(&CallerId::new("alice")).await.unwrap();
        assert_eq!(listed.len(), 1);
        let other = storage.list_documents(&CallerId::new("bob")).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn document_type_is_only_set_once() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;

        assert!(
            storage
                .set_document_type_if_unset(&id, ContractType::Employment)
                .await
                .unwrap()
        );
        assert!(
            !storage
                .set_document_type_if_unset(&id, ContractType::Nda)
                .await
                .unwrap()
        );
        let document = storage.get_document(&id).await.unwrap().unwrap();
        assert_eq!(document.detected_type, Some(ContractType::Employment));
    }

    #[tokio::test]
    async fn selected_party_roundtrip() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;
        storage.set_selected_party(&id, Some("Acme Corp")).await.unwrap();
        let document = storage.get_document(&id).await.unwrap().unwrap();
        assert_eq!(document.selected_party.as_deref(), Some("Acme Corp"));
    }

    #[tokio::test]
    async fn partial_record_updates_in_place_until_terminal() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;

        let mut record = AnalysisRecord::partial(
            id.clone(),
            Some(ContractType::Employment),
            vec![Party::new("Acme Inc", "Employer", "Hiring company")],
        );
        assert!(storage.insert_analysis(&record).await.unwrap());

        record.score = Some(80);
        record.favorable = Some(true);
        record.risks.push(Risk {
            kind: "Termination".into(),
            severity: Severity::Medium,
            excerpt: "either party may terminate".into(),
            note: "short notice".into(),
        });
        assert!(storage.update_partial_analysis(&record).await.unwrap());

        let stored = storage.find_latest_analysis(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.score, Some(80));
        assert_eq!(stored.favorable, Some(true));
        assert_eq!(stored.parties[0].name, "Acme Inc");
        assert_eq!(stored.risks.len(), 1);

        // Terminal now: a second update must not match.
        record.score = Some(10);
        assert!(!storage.update_partial_analysis(&record).await.unwrap());
        let stored = storage.find_latest_analysis(&id).await.unwrap().unwrap();
        assert_eq!(stored.score, Some(80));
    }

    #[tokio::test]
    async fn second_insert_for_same_document_is_rejected() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;

        let first = AnalysisRecord::partial(id.clone(), None, vec![]);
        let second = AnalysisRecord::partial(id.clone(), None, vec![]);
        assert!(storage.insert_analysis(&first).await.unwrap());
        assert!(!storage.insert_analysis(&second).await.unwrap());

        let stored = storage.find_latest_analysis(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn delete_cascades_to_analysis() {
        let storage = test_storage().await;
        let id = seed_document(&storage, "alice").await;
        storage
            .insert_analysis(&AnalysisRecord::partial(id.clone(), None, vec![]))
            .await
            .unwrap();

        assert!(storage.delete_document(&id).await.unwrap());
        assert!(storage.get_document(&id).await.unwrap().is_none());
        assert!(storage.get_extraction(&id).await.unwrap().is_none());
        assert!(storage.find_latest_analysis(&id).await.unwrap().is_none());
        assert!(!storage.delete_document(&id).await.unwrap());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("pl_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        let id = seed_document(&rw, "alice").await;
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.set_selected_party(&id, Some("Acme Corp")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
