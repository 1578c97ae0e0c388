//! PostgreSQL-backed tuple store
//!
//! Tuples live in a single `document_tuples` table keyed by
//! `(object_id, relation, subject_id)`:
//! - Idempotent inserts via `ON CONFLICT DO NOTHING`
//! - One transaction per batch, so a failed or abandoned batch rolls back
//! - Committed rows are visible to every check issued afterwards

use crate::{error::AuthzError, models::*, repository::TupleStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS document_tuples (
    object_id   TEXT        NOT NULL,
    relation    TEXT        NOT NULL,
    subject_id  TEXT        NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (object_id, relation, subject_id)
)
"#;

const CREATE_SUBJECT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_document_tuples_subject
    ON document_tuples (subject_id, relation)
"#;

const INSERT_TUPLE: &str = r#"
INSERT INTO document_tuples (object_id, relation, subject_id, created_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (object_id, relation, subject_id) DO NOTHING
"#;

const DELETE_TUPLE: &str = r#"
DELETE FROM document_tuples
WHERE object_id = $1
  AND relation = $2
  AND subject_id = $3
"#;

/// PostgreSQL-backed tuple store
pub struct PostgresTupleStore {
    pool: PgPool,
}

impl PostgresTupleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create with connection string
    ///
    /// # Errors
    ///
    /// `StorageError` if the database cannot be reached.
    pub async fn from_connection_string(connection_string: &str) -> Result<Self, AuthzError> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| AuthzError::StorageError(format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tuple table and its subject index if they are missing.
    ///
    /// # Errors
    ///
    /// `StorageError` if either statement fails; the transaction is rolled back.
    pub async fn ensure_schema(&self) -> Result<(), AuthzError> {
        let mut tx = self.begin().await?;

        for statement in [CREATE_TABLE, CREATE_SUBJECT_INDEX] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| AuthzError::StorageError(format!("Failed to create schema: {}", e)))?;
        }

        Self::commit(tx).await?;
        info!("document_tuples schema is ready");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AuthzError> {
        self.pool
            .begin()
            .await
            .map_err(|e| AuthzError::StorageError(format!("Failed to start transaction: {}", e)))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AuthzError> {
        tx.commit()
            .await
            .map_err(|e| AuthzError::StorageError(format!("Failed to commit transaction: {}", e)))
    }

    fn row_to_tuple(row: &PgRow) -> Result<StoredTuple, AuthzError> {
        let column =
            |e: sqlx::Error| AuthzError::StorageError(format!("Malformed tuple row: {}", e));

        let object_id: String = row.try_get("object_id").map_err(column)?;
        let relation: String = row.try_get("relation").map_err(column)?;
        let subject_id: String = row.try_get("subject_id").map_err(column)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(column)?;

        Ok(StoredTuple {
            tuple: Tuple::new(
                Subject::user(&subject_id),
                relation.parse()?,
                ObjectRef::document(&object_id),
            ),
            created_at,
        })
    }
}

#[async_trait]
impl TupleStore for PostgresTupleStore {
    async fn write(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        debug!("Writing {} tuple(s) to PostgreSQL", tuples.len());

        // Dropping the transaction before commit rolls every insert back
        let mut tx = self.begin().await?;
        let now = Utc::now();

        for tuple in tuples {
            sqlx::query(INSERT_TUPLE)
                .bind(tuple.object.id())
                .bind(tuple.relation.as_str())
                .bind(tuple.subject.id())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AuthzError::StorageError(format!("Failed to write tuple {}: {}", tuple, e))
                })?;
        }

        Self::commit(tx).await?;
        debug!("Tuple batch written");
        Ok(())
    }

    async fn delete(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        debug!("Deleting {} tuple(s) from PostgreSQL", tuples.len());

        let mut tx = self.begin().await?;

        for tuple in tuples {
            sqlx::query(DELETE_TUPLE)
                .bind(tuple.object.id())
                .bind(tuple.relation.as_str())
                .bind(tuple.subject.id())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AuthzError::StorageError(format!("Failed to delete tuple {}: {}", tuple, e))
                })?;
        }

        Self::commit(tx).await?;
        debug!("Tuple batch deleted");
        Ok(())
    }

    async fn exists(
        &self,
        subject: &Subject,
        relation: Relation,
        object: &ObjectRef,
    ) -> Result<bool, AuthzError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM document_tuples
                WHERE object_id = $1
                  AND relation = $2
                  AND subject_id = $3
            )
            "#,
        )
        .bind(object.id())
        .bind(relation.as_str())
        .bind(subject.id())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuthzError::StorageError(format!("Failed to check tuple existence: {}", e)))
    }

    async fn read(&self, filter: &TupleFilter) -> Result<Vec<StoredTuple>, AuthzError> {
        debug!("Reading tuples: {:?}", filter);

        // NULL parameters act as wildcards
        let rows = sqlx::query(
            r#"
            SELECT object_id, relation, subject_id, created_at
            FROM document_tuples
            WHERE ($1::TEXT IS NULL OR object_id = $1)
              AND ($2::TEXT IS NULL OR relation = $2)
              AND ($3::TEXT IS NULL OR subject_id = $3)
            ORDER BY object_id, relation, subject_id
            "#,
        )
        .bind(filter.object.as_ref().map(ObjectRef::id))
        .bind(filter.relation.map(Relation::as_str))
        .bind(filter.subject.as_ref().map(Subject::id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthzError::StorageError(format!("Failed to read tuples: {}", e)))?;

        let tuples = rows
            .iter()
            .map(Self::row_to_tuple)
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Found {} tuples", tuples.len());
        Ok(tuples)
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<u64, AuthzError> {
        let result = sqlx::query("DELETE FROM document_tuples WHERE object_id = $1")
            .bind(object.id())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AuthzError::StorageError(format!("Failed to delete tuples of {}: {}", object, e))
            })?;

        info!("Removed {} tuple(s) of {}", result.rows_affected(), object);
        Ok(result.rows_affected())
    }
}
