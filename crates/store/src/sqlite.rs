//! SQLite document store.
//!
//! Uses a single table keyed by full document path:
//!
//! ```text
//! documents(path PRIMARY KEY, parent, doc_id, data JSON, sort_keys JSON, updated_at)
//! ```
//!
//! `parent` is the collection path, indexed, so a collection query is one
//! index scan. Filters, ordering and limits run in SQL over `json_extract`.
//! Timestamps are stored as written in `data`, and `sort_keys` holds a
//! fixed-width UTC rendering of each timestamp field so text order is
//! chronological order. Rows that come back are passed through
//! [`Query::apply`] once more, which keeps results identical to the
//! in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diarist_core::document::{
    CollectionRef, Direction, Document, DocumentRef, DocumentStore, FilterOp, Query, Snapshot, WriteMode,
    merge_documents,
};
use diarist_core::error::StoreError;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

/// A positional SQL argument.
#[derive(Debug, Clone, PartialEq)]
enum SqlArg {
    Text(String),
    Int(i64),
    Real(f64),
}

impl SqliteDocumentStore {
    /// Open (creating if missing) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database lives and dies with its connection, so pin
        // it to one that never expires.
        let ephemeral = path.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if ephemeral { 1 } else { 4 })
            .idle_timeout(if ephemeral { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if ephemeral { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite document store initialized at {path}");
        Ok(store)
    }

    /// Open a database file, creating its parent directory.
    pub async fn open_file(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path        TEXT PRIMARY KEY NOT NULL,
                parent      TEXT NOT NULL,
                doc_id      TEXT NOT NULL,
                data        TEXT NOT NULL,
                sort_keys   TEXT NOT NULL DEFAULT '{}',
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("documents table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("parent index: {e}")))?;

        self.add_sort_keys_column().await?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Databases created before `sort_keys` existed get the column and a backfill.
    async fn add_sort_keys_column(&self) -> Result<(), StoreError> {
        let columns = sqlx::query("SELECT name FROM pragma_table_info('documents')")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("table info: {e}")))?;
        let present = columns
            .iter()
            .any(|row| row.try_get::<String, _>("name").is_ok_and(|name| name == "sort_keys"));
        if present {
            return Ok(());
        }

        sqlx::query("ALTER TABLE documents ADD COLUMN sort_keys TEXT NOT NULL DEFAULT '{}'")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("sort_keys column: {e}")))?;

        let rows = sqlx::query("SELECT path, data FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("backfill read: {e}")))?;
        let mut backfilled = 0usize;
        for row in rows {
            let path: String = row
                .try_get("path")
                .map_err(|e| StoreError::MigrationFailed(format!("path column: {e}")))?;
            let raw: String = row
                .try_get("data")
                .map_err(|e| StoreError::MigrationFailed(format!("data column: {e}")))?;
            let Ok(data) = Self::decode(&path, &raw) else {
                warn!(path = %path, "Leaving corrupted document without sort keys");
                continue;
            };
            sqlx::query("UPDATE documents SET sort_keys = ?1 WHERE path = ?2")
                .bind(Self::encode(&sort_keys(&data))?)
                .bind(&path)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("backfill {path}: {e}")))?;
            backfilled += 1;
        }
        info!(documents = backfilled, "Backfilled sort keys");
        Ok(())
    }

    fn decode(path: &str, raw: &str) -> Result<Document, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(data: &Document) -> Result<String, StoreError> {
        serde_json::to_string(data).map_err(|e| StoreError::Storage(format!("serialize document: {e}")))
    }
}

/// Fixed-width UTC text for an RFC 3339 timestamp, or `None` for any other string.
fn instant_key(s: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string())
}

/// Sort keys for every top-level timestamp field of `data`.
fn sort_keys(data: &Document) -> Document {
    data.iter()
        .filter_map(|(field, value)| {
            let key = instant_key(value.as_str()?)?;
            Some((field.clone(), Value::String(key)))
        })
        .collect()
}

fn json_path(field: &str) -> Result<String, StoreError> {
    if field.is_empty() || field.contains('"') || field.contains('\\') {
        return Err(StoreError::QueryFailed(format!("unsupported field name {field:?}")));
    }
    Ok(format!("$.\"{field}\""))
}

fn comparison(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Gt => ">",
        FilterOp::Gte => ">=",
        FilterOp::Lt => "<",
        FilterOp::Lte => "<=",
    }
}

fn direction(direction: Direction) -> &'static str {
    match direction {
        Direction::Ascending => "ASC",
        Direction::Descending => "DESC",
    }
}

/// Translate `query` into SQL over one collection.
///
/// Returns `None` when no document can match. Ordering is exact for fields
/// whose values share one scalar type across the collection.
fn build_query(parent: &str, query: &Query) -> Result<Option<(String, Vec<SqlArg>)>, StoreError> {
    // Sort key when the field holds a timestamp, raw value otherwise.
    const KEY: &str = "COALESCE(json_extract(sort_keys, ?), json_extract(data, ?))";

    let mut sql = String::from("SELECT doc_id, path, data FROM documents WHERE parent = ?");
    let mut args = vec![SqlArg::Text(parent.to_string())];

    for filter in &query.filters {
        let path = json_path(&filter.field)?;
        let op = comparison(filter.op);
        match &filter.value {
            Value::Null => {
                sql.push_str(" AND json_type(data, ?) = 'null'");
                args.push(SqlArg::Text(path));
                if matches!(filter.op, FilterOp::Gt | FilterOp::Lt) {
                    return Ok(None);
                }
            }
            Value::Bool(b) => {
                sql.push_str(&format!(" AND json_type(data, ?) IN ('true', 'false') AND json_extract(data, ?) {op} ?"));
                args.extend([SqlArg::Text(path.clone()), SqlArg::Text(path), SqlArg::Int(i64::from(*b))]);
            }
            Value::Number(n) => {
                let operand = match n.as_i64() {
                    Some(i) => SqlArg::Int(i),
                    None => SqlArg::Real(n.as_f64().unwrap_or(f64::NAN)),
                };
                sql.push_str(&format!(" AND json_type(data, ?) IN ('integer', 'real') AND json_extract(data, ?) {op} ?"));
                args.extend([SqlArg::Text(path.clone()), SqlArg::Text(path), operand]);
            }
            Value::String(s) => {
                let operand = instant_key(s).unwrap_or_else(|| s.clone());
                sql.push_str(&format!(" AND json_type(data, ?) = 'text' AND {KEY} {op} ?"));
                args.extend([
                    SqlArg::Text(path.clone()),
                    SqlArg::Text(path.clone()),
                    SqlArg::Text(path),
                    SqlArg::Text(operand),
                ]);
            }
            Value::Array(_) | Value::Object(_) => return Ok(None),
        }
    }

    if let Some((field, dir)) = &query.order_by {
        let path = json_path(field)?;
        let dir = direction(*dir);
        sql.push_str(&format!(" AND json_type(data, ?) <> 'null' ORDER BY {KEY} {dir}, doc_id {dir}"));
        args.extend([SqlArg::Text(path.clone()), SqlArg::Text(path.clone()), SqlArg::Text(path)]);
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        args.push(SqlArg::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    Ok(Some((sql, args)))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        doc.validate()?;
        let path = doc.path();
        let row = sqlx::query("SELECT data FROM documents WHERE path = ?1")
            .bind(&path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get {path}: {e}")))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("data")
                    .map_err(|e| StoreError::QueryFailed(format!("data column: {e}")))?;
                Self::decode(&path, &raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, doc: &DocumentRef, data: Document, mode: WriteMode) -> Result<(), StoreError> {
        doc.validate()?;
        let path = doc.path();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let body = match mode {
            WriteMode::Overwrite => data,
            WriteMode::Merge => {
                let existing = sqlx::query("SELECT data FROM documents WHERE path = ?1")
                    .bind(&path)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("get {path}: {e}")))?;
                match existing {
                    Some(row) => {
                        let raw: String = row
                            .try_get("data")
                            .map_err(|e| StoreError::QueryFailed(format!("data column: {e}")))?;
                        let mut current = Self::decode(&path, &raw)?;
                        merge_documents(&mut current, data);
                        current
                    }
                    None => data,
                }
            }
        };

        sqlx::query(
            r#"
            INSERT INTO documents (path, parent, doc_id, data, sort_keys, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(path) DO UPDATE SET
                data = excluded.data,
                sort_keys = excluded.sort_keys,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&path)
        .bind(doc.parent().path())
        .bind(doc.id())
        .bind(Self::encode(&body)?)
        .bind(Self::encode(&sort_keys(&body))?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("write {path}: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit {path}: {e}")))?;
        Ok(())
    }

    async fn create(&self, doc: &DocumentRef, data: Document) -> Result<(), StoreError> {
        doc.validate()?;
        let path = doc.path();
        let inserted = sqlx::query(
            "INSERT INTO documents (path, parent, doc_id, data, sort_keys, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&path)
        .bind(doc.parent().path())
        .bind(doc.id())
        .bind(Self::encode(&data)?)
        .bind(Self::encode(&sort_keys(&data))?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if e.as_database_error().is_some_and(|db| db.is_unique_violation()) => {
                Err(StoreError::AlreadyExists(path))
            }
            Err(e) => Err(StoreError::Storage(format!("create {path}: {e}"))),
        }
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        doc.validate()?;
        sqlx::query("DELETE FROM documents WHERE path = ?1")
            .bind(doc.path())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("delete {}: {e}", doc.path())))?;
        Ok(())
    }

    async fn query(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        collection.validate()?;
        let parent = collection.path();
        let Some((sql, args)) = build_query(&parent, query)? else {
            return Ok(Vec::new());
        };
        debug!(sql = %sql, "Collection query");

        let mut q = sqlx::query(&sql);
        for arg in args {
            q = match arg {
                SqlArg::Text(s) => q.bind(s),
                SqlArg::Int(i) => q.bind(i),
                SqlArg::Real(f) => q.bind(f),
            };
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("query {parent}: {e}")))?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let path: String = row
                .try_get("path")
                .map_err(|e| StoreError::QueryFailed(format!("path column: {e}")))?;
            let id: String = row
                .try_get("doc_id")
                .map_err(|e| StoreError::QueryFailed(format!("doc_id column: {e}")))?;
            let raw: String = row
                .try_get("data")
                .map_err(|e| StoreError::QueryFailed(format!("data column: {e}")))?;
            match Self::decode(&path, &raw) {
                Ok(data) => snapshots.push(Snapshot::new(id, data)),
                Err(e) => warn!(error = %e, "Skipping corrupted document"),
            }
        }
        Ok(query.apply(snapshots))
    }

    async fn list_ids(&self, collection: &CollectionRef) -> Result<Vec<String>, StoreError> {
        collection.validate()?;
        let prefix = format!("{}/", collection.path());
        // '0' sorts right after '/', so this is exactly the paths under `prefix`.
        let upper = format!("{}0", collection.path());
        let start = i64::try_from(prefix.chars().count() + 1).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT
                CASE WHEN instr(rest, '/') = 0 THEN rest ELSE substr(rest, 1, instr(rest, '/') - 1) END AS id
            FROM (SELECT substr(path, ?1) AS rest FROM documents WHERE path >= ?2 AND path < ?3)
            ORDER BY id
            "#,
        )
        .bind(start)
        .bind(&prefix)
        .bind(&upper)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list {prefix}: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))
            })
            .collect()
    }
}
