//! SQLite document store
//!
//! Every collection shares one `documents` table keyed by `(collection, id)`
//! with the body kept as JSON text. Filters compile to `json_extract` and
//! `json_each` expressions so lists and counts run inside SQLite.

pub mod migrations;

use super::query::{Filter, FilterValue, OrderBy};
use super::{
    BatchWrite, Collection, Document, DocumentStore, Fields, Query, StoreError, StoreResult,
    WriteBatch, merge_fields,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SELECT_DOCUMENT: &str = "SELECT id, data, version, created_at, updated_at FROM documents";

/// Write transactions take the write lock up front. A deferred transaction
/// that reads first cannot upgrade once another connection has committed,
/// and SQLite reports that as BUSY without waiting on `busy_timeout`.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("sqlite: {}", error))
}

fn stamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn into_document(self) -> StoreResult<Document> {
        let data: Fields = serde_json::from_str(&self.data)?;
        Ok(Document {
            id: self.id,
            data,
            version: self.version.max(0) as u64,
            created_at: parse_stamp(&self.created_at)?,
            updated_at: parse_stamp(&self.updated_at)?,
        })
    }
}

fn parse_stamp(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", text, e)))
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and migrate it
    pub async fn connect(db_path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to open {}: {}", db_path.display(), e)))?;

        debug!("Connected to SQLite database: {}", db_path.display());
        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single long-lived connection keeps
    /// the data alive for the lifetime of the store.
    pub async fn connect_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_error)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        debug!("Connected to in-memory SQLite database");
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        migrations::migrate_up(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn schema_version(&self) -> StoreResult<Option<i64>> {
        migrations::get_current_version(&self.pool).await
    }
}

async fn fetch_document(
    conn: &mut SqliteConnection,
    collection: &Collection,
    id: &str,
) -> StoreResult<Option<Document>> {
    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        "{} WHERE collection = ? AND id = ?",
        SELECT_DOCUMENT
    ))
    .bind(collection.path())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;

    row.map(DocumentRow::into_document).transpose()
}

/// Read, merge and write back under a version guard
async fn apply_update(
    conn: &mut SqliteConnection,
    collection: &Collection,
    id: &str,
    fields: &Fields,
    expected_version: Option<u64>,
) -> StoreResult<Document> {
    let mut doc = fetch_document(conn, collection, id)
        .await?
        .ok_or_else(|| StoreError::not_found(collection, id))?;

    if expected_version.is_some_and(|expected| expected != doc.version) {
        return Err(StoreError::conflict(collection, id));
    }

    merge_fields(&mut doc.data, fields);
    let previous_version = doc.version;
    doc.version += 1;
    doc.updated_at = Utc::now();

    let result = sqlx::query(
        "UPDATE documents SET data = ?, version = ?, updated_at = ? \
         WHERE collection = ? AND id = ? AND version = ?",
    )
    .bind(serde_json::to_string(&doc.data)?)
    .bind(doc.version as i64)
    .bind(stamp(&doc.updated_at))
    .bind(collection.path())
    .bind(id)
    .bind(previous_version as i64)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::conflict(collection, id));
    }
    Ok(doc)
}

async fn apply_delete(conn: &mut SqliteConnection, collection: &Collection, id: &str) -> StoreResult<()> {
    sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
        .bind(collection.path())
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn push_field(builder: &mut QueryBuilder<'_, Sqlite>, field: &str) {
    match field {
        "id" => {
            builder.push("id");
        }
        "createdAt" => {
            builder.push("created_at");
        }
        "updatedAt" => {
            builder.push("updated_at");
        }
        _ => {
            builder.push("json_extract(data, ");
            builder.push_bind(json_path(field));
            builder.push(")");
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &FilterValue) {
    match value {
        FilterValue::String(s) => {
            builder.push_bind(s.clone());
        }
        FilterValue::Integer(i) => {
            builder.push_bind(*i);
        }
        FilterValue::Number(n) => {
            builder.push_bind(*n);
        }
        // json_extract yields 1/0 for JSON booleans
        FilterValue::Boolean(b) => {
            builder.push_bind(i64::from(*b));
        }
        FilterValue::Null => {
            builder.push("NULL");
        }
    }
}

/// `COALESCE(field <op> value, when_missing)` so that every predicate is
/// two-valued and `NOT` behaves like the in-memory matcher
fn push_comparison(
    builder: &mut QueryBuilder<'_, Sqlite>,
    field: &str,
    op: &str,
    value: &FilterValue,
    when_missing: u8,
) {
    if *value == FilterValue::Null {
        builder.push("(");
        push_field(builder, field);
        builder.push(match op {
            "=" => " IS NULL)",
            "!=" => " IS NOT NULL)",
            _ => " IS NULL AND 0)",
        });
        return;
    }
    builder.push("COALESCE(");
    push_field(builder, field);
    builder.push(format!(" {} ", op));
    push_value(builder, value);
    builder.push(format!(", {})", when_missing));
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Eq(field, value) => push_comparison(builder, field, "=", value, 0),
        Filter::Ne(field, value) => push_comparison(builder, field, "!=", value, 1),
        Filter::Gt(field, value) => push_comparison(builder, field, ">", value, 0),
        Filter::Ge(field, value) => push_comparison(builder, field, ">=", value, 0),
        Filter::Lt(field, value) => push_comparison(builder, field, "<", value, 0),
        Filter::Le(field, value) => push_comparison(builder, field, "<=", value, 0),
        Filter::ArrayContains(field, value) => {
            builder.push("(json_type(data, ");
            builder.push_bind(json_path(field));
            builder.push(") = 'array' AND EXISTS (SELECT 1 FROM json_each(data, ");
            builder.push_bind(json_path(field));
            builder.push(") WHERE json_each.value = ");
            push_value(builder, value);
            builder.push("))");
        }
        Filter::In(field, values) => {
            let alternatives = values.iter().map(|v| Filter::Eq(field.clone(), v.clone())).collect();
            push_filter(builder, &Filter::Or(alternatives));
        }
        Filter::And(filters) => push_joined(builder, filters, " AND ", "1"),
        Filter::Or(filters) => push_joined(builder, filters, " OR ", "0"),
        Filter::Not(inner) => {
            builder.push("NOT ");
            push_filter(builder, inner);
        }
    }
}

fn push_joined(builder: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter], separator: &str, empty: &str) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}

fn push_where<'a>(builder: &mut QueryBuilder<'a, Sqlite>, collection: &Collection, query: &Query) {
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.path());
    if let Some(filter) = &query.filter {
        builder.push(" AND ");
        push_filter(builder, filter);
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, order: &OrderBy) {
    push_field(builder, order.field());
    builder.push(if order.is_desc() { " DESC" } else { " ASC" });
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &Collection, id: &str, fields: Fields) -> StoreResult<Document> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, data, version, created_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(collection.path())
        .bind(id)
        .bind(serde_json::to_string(&fields)?)
        .bind(stamp(&now))
        .bind(stamp(&now))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Document {
                id: id.to_string(),
                data: fields,
                version: 1,
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::conflict(collection, id))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn get(&self, collection: &Collection, id: &str) -> StoreResult<Option<Document>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        fetch_document(&mut conn, collection, id).await
    }

    async fn list(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<Document>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_DOCUMENT);
        push_where(&mut builder, collection, query);

        builder.push(" ORDER BY ");
        for order in query.orderby.clauses() {
            push_order(&mut builder, order);
            builder.push(", ");
        }
        builder.push("id ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::from(limit));
        }

        debug!("SQLite list: {}", builder.sql());
        builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(DocumentRow::into_document)
            .collect()
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        fields: Fields,
        expected_version: Option<u64>,
    ) -> StoreResult<Document> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await.map_err(db_error)?;
        let doc = apply_update(&mut tx, collection, id, &fields, expected_version).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(doc)
    }

    async fn delete(&self, collection: &Collection, id: &str) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        apply_delete(&mut conn, collection, id).await
    }

    async fn count(&self, collection: &Collection, query: &Query) -> StoreResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents");
        push_where(&mut builder, collection, query);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await.map_err(db_error)?;
        for write in batch {
            match write {
                BatchWrite::Update { collection, id, fields } => {
                    apply_update(&mut tx, collection, id, fields, None).await?;
                }
                BatchWrite::Delete { collection, id } => {
                    apply_delete(&mut tx, collection, id).await?;
                }
            }
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::connect_memory().await.unwrap();
        for (id, data) in [
            ("k1", json!({"name": "Launch", "clientId": "c1", "brandIds": ["b1", "b2"], "status": "active"})),
            ("k2", json!({"name": "Awareness", "clientId": "c1", "brandIds": ["b2"], "status": "paused"})),
            ("k3", json!({"name": "Retention", "clientId": "c2", "brandIds": [], "status": "active"})),
        ] {
            store.insert(&Collection::Campaigns, id, fields(data)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_migrations_are_applied_once() {
        let store = SqliteStore::connect_memory().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), Some(2));

        migrations::migrate_up(store.pool()).await.unwrap();
        assert!(migrations::get_pending_migrations(store.pool()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_in_sql() {
        let store = seeded().await;

        let names: Vec<String> = store
            .list(&Collection::Campaigns, &Query::by_name().where_eq("clientId", "c1"))
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Awareness", "Launch"]);

        let with_b1 = store
            .list(&Collection::Campaigns, &Query::new().filter(Filter::array_contains("brandIds", "b1")))
            .await
            .unwrap();
        assert_eq!(with_b1.len(), 1);
        assert_eq!(with_b1[0].id, "k1");

        let not_active = store
            .count(&Collection::Campaigns, &Query::new().filter(Filter::not(Filter::eq("status", "active"))))
            .await
            .unwrap();
        assert_eq!(not_active, 1);
    }

    #[tokio::test]
    async fn test_null_and_missing_fields() {
        let store = seeded().await;
        store
            .update(&Collection::Campaigns, "k1", fields(json!({"rewardProgramId": "r1"})), None)
            .await
            .unwrap();

        let unset = store
            .count(&Collection::Campaigns, &Query::new().where_eq("rewardProgramId", FilterValue::Null))
            .await
            .unwrap();
        assert_eq!(unset, 2);

        let not_r1 = store
            .count(&Collection::Campaigns, &Query::new().filter(Filter::ne("rewardProgramId", "r1")))
            .await
            .unwrap();
        assert_eq!(not_r1, 2);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_checks_precondition() {
        let store = seeded().await;
        let before = store.get(&Collection::Campaigns, "k1").await.unwrap().unwrap();

        let after = store
            .update(&Collection::Campaigns, "k1", fields(json!({"status": "completed"})), Some(before.version))
            .await
            .unwrap();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.get_str("name"), Some("Launch"));

        let err = store
            .update(&Collection::Campaigns, "k1", fields(json!({"status": "draft"})), Some(before.version))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let err = store
            .update(&Collection::Campaigns, "nope", Fields::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = seeded().await;
        let err = store
            .insert(&Collection::Campaigns, "k1", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = seeded().await;
        let mut batch = WriteBatch::new();
        batch
            .delete(Collection::Campaigns, "k1")
            .delete(Collection::Campaigns, "k2")
            .update(Collection::Campaigns, "ghost", fields(json!({"name": "x"})));

        assert!(store.commit(&batch).await.is_err());
        assert_eq!(store.count(&Collection::Campaigns, &Query::all()).await.unwrap(), 3);

        let mut batch = WriteBatch::new();
        batch.delete(Collection::Campaigns, "k1").delete(Collection::Campaigns, "k2");
        store.commit(&batch).await.unwrap();
        assert_eq!(store.count(&Collection::Campaigns, &Query::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insights.db");

        let store = SqliteStore::connect(&path).await.unwrap();
        store
            .insert(&Collection::responses("s1"), "r1", fields(json!({"answers": {"q1": "yes"}})))
            .await
            .unwrap();
        store.pool().close().await;

        let reopened = SqliteStore::connect(&path).await.unwrap();
        let doc = reopened.get(&Collection::responses("s1"), "r1").await.unwrap().unwrap();
        assert_eq!(doc.get("answers"), Some(&json!({"q1": "yes"})));
        assert!(reopened.get(&Collection::responses("s2"), "r1").await.unwrap().is_none());
    }
}
