//! libSQL document store (local file, offline mode).
//!
//! Items are stored as JSON documents grouped into collections, one per
//! dataset. Each document is addressed by an opaque [`DocHandle`] assigned on
//! insert. The [`DocumentStore`] trait is the seam the pipeline writes
//! through; [`Storage`] is the libSQL implementation.

mod batch;
mod migrations;

use std::future::Future;
use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use newsmirror_shared::{NewsMirrorError, Result};
use uuid::Uuid;

pub use batch::{DocHandle, StoredDocument, WriteBatch, WriteOp};

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// A collection-oriented document store with atomic batch writes.
pub trait DocumentStore: Send + Sync {
    /// All documents currently stored in `collection`.
    fn list_documents(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<StoredDocument>>> + Send;

    /// Apply every operation in `batch` atomically. Returns the number of
    /// operations applied.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<usize>> + Send;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NewsMirrorError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
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
                        NewsMirrorError::Persistence(format!(
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

    async fn load_collection(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT handle, body FROM documents WHERE collection = ?1
                 ORDER BY created_at, handle",
                params![collection],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let handle = row.get::<String>(0).map_err(storage_err)?;
            let body = row.get::<String>(1).map_err(storage_err)?;
            let body = serde_json::from_str(&body).map_err(|e| {
                NewsMirrorError::parse(format!("document {handle} has invalid JSON: {e}"))
            })?;
            results.push(StoredDocument {
                handle: DocHandle::new(handle),
                body,
            });
        }
        Ok(results)
    }

    async fn apply_batch(&self, batch: WriteBatch) -> Result<usize> {
        let collection = batch.collection().to_string();
        let ops = batch.into_ops();
        let total = ops.len();
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        for op in ops {
            let applied = match op {
                WriteOp::Insert { body } => {
                    let handle = Uuid::now_v7().to_string();
                    tx.execute(
                        "INSERT INTO documents (handle, collection, body, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            handle.as_str(),
                            collection.as_str(),
                            body.to_string(),
                            now.as_str(),
                            now.as_str()
                        ],
                    )
                    .await
                    .map(|_| ())
                    .map_err(storage_err)
                }
                WriteOp::Update { handle, body } => tx
                    .execute(
                        "UPDATE documents SET body = ?1, updated_at = ?2
                         WHERE handle = ?3 AND collection = ?4",
                        params![
                            body.to_string(),
                            now.as_str(),
                            handle.as_str(),
                            collection.as_str()
                        ],
                    )
                    .await
                    .map_err(storage_err)
                    .and_then(|affected| {
                        if affected == 0 {
                            Err(NewsMirrorError::Persistence(format!(
                                "document {handle} not found in '{collection}'"
                            )))
                        } else {
                            Ok(())
                        }
                    }),
                WriteOp::Delete { handle } => tx
                    .execute(
                        "DELETE FROM documents WHERE handle = ?1 AND collection = ?2",
                        params![handle.as_str(), collection.as_str()],
                    )
                    .await
                    .map(|_| ())
                    .map_err(storage_err),
            };

            if let Err(e) = applied {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }

        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(%collection, ops = total, "batch committed");
        Ok(total)
    }
}

impl DocumentStore for Storage {
    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        self.load_collection(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.apply_batch(batch).await
    }
}

fn storage_err(e: libsql::Error) -> NewsMirrorError {
    NewsMirrorError::Persistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("nm_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn seed(storage: &Storage, collection: &str, ids: &[u64]) -> Vec<StoredDocument> {
        let mut batch = WriteBatch::new(collection);
        for id in ids {
            batch.insert(json!({ "id": id }));
        }
        storage.commit(batch).await.expect("seed");
        storage.list_documents(collection).await.expect("list")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("nm_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_assigns_handles_per_collection() {
        let storage = test_storage().await;
        let stories = seed(&storage, "stories", &[1, 2]).await;
        let jobs = seed(&storage, "jobs", &[9]).await;

        assert_eq!(stories.len(), 2);
        assert_eq!(jobs.len(), 1);
        assert_ne!(stories[0].handle, stories[1].handle);
        assert_eq!(jobs[0].body["id"], 9);
        assert_eq!(storage.load_collection("stories").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_by_handle() {
        let storage = test_storage().await;
        let docs = seed(&storage, "stories", &[1, 2]).await;

        let mut batch = WriteBatch::new("stories");
        batch
            .delete(docs[0].handle.clone())
            .update(docs[1].handle.clone(), json!({ "id": 2, "title": "new" }));
        let applied = storage.commit(batch).await.expect("commit");
        assert_eq!(applied, 2);

        let after = storage.list_documents("stories").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].handle, docs[1].handle);
        assert_eq!(after[0].body["title"], "new");
    }

    #[tokio::test]
    async fn update_of_missing_handle_rolls_back_batch() {
        let storage = test_storage().await;
        let docs = seed(&storage, "stories", &[1]).await;

        let mut batch = WriteBatch::new("stories");
        batch
            .insert(json!({ "id": 5 }))
            .update(DocHandle::new("no-such-handle"), json!({ "id": 6 }));
        let err = storage.commit(batch).await.unwrap_err();
        assert!(matches!(err, NewsMirrorError::Persistence(_)));

        let after = storage.list_documents("stories").await.unwrap();
        assert_eq!(after, docs);
    }

    #[tokio::test]
    async fn handles_do_not_cross_collections() {
        let storage = test_storage().await;
        let jobs = seed(&storage, "jobs", &[1]).await;

        let mut batch = WriteBatch::new("stories");
        batch.update(jobs[0].handle.clone(), json!({ "id": 1, "title": "x" }));
        assert!(storage.commit(batch).await.is_err());
        assert_eq!(
            storage.list_documents("jobs").await.unwrap()[0].body,
            json!({ "id": 1 })
        );
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let storage = test_storage().await;
        let applied = storage.commit(WriteBatch::new("jobs")).await.unwrap();
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn empty_collection_lists_nothing() {
        let storage = test_storage().await;
        assert!(storage.list_documents("jobs").await.unwrap().is_empty());
    }
}
