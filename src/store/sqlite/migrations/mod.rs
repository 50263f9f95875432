//! Embedded schema migrations for the SQLite document store

use super::db_error;
use crate::store::{StoreError, StoreResult};
use log::{debug, info};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};

/// A single forward migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
}

/// Migration status in the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

pub fn load_migrations() -> BTreeMap<i64, Migration> {
    let mut migrations = BTreeMap::new();

    migrations.insert(1, Migration {
        version: 1,
        name: "documents".to_string(),
        up_sql: include_str!("001_documents/up.sql").to_string(),
    });

    migrations.insert(2, Migration {
        version: 2,
        name: "indexes".to_string(),
        up_sql: include_str!("002_indexes/up.sql").to_string(),
    });

    migrations
}

pub async fn init_migration_table(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            checksum TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    Ok(())
}

pub async fn get_applied_migrations(pool: &SqlitePool) -> StoreResult<Vec<AppliedMigration>> {
    sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, name, checksum FROM schema_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

/// Hex SHA-256 of the migration text, stable across toolchains
pub fn calculate_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Applied migrations must still exist and be unmodified
pub async fn validate_migrations(pool: &SqlitePool) -> StoreResult<()> {
    let available = load_migrations();

    for applied in get_applied_migrations(pool).await? {
        let Some(migration) = available.get(&applied.version) else {
            return Err(StoreError::Unavailable(format!(
                "applied migration {} '{}' is unknown to this build",
                applied.version, applied.name
            )));
        };
        let expected = calculate_checksum(&migration.up_sql);
        if applied.checksum != expected {
            return Err(StoreError::Unavailable(format!(
                "migration {} checksum mismatch (applied {}, expected {})",
                applied.version, applied.checksum, expected
            )));
        }
    }

    Ok(())
}

pub async fn get_pending_migrations(pool: &SqlitePool) -> StoreResult<Vec<Migration>> {
    let applied: HashSet<i64> = get_applied_migrations(pool)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    Ok(load_migrations()
        .into_values()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

pub async fn get_current_version(pool: &SqlitePool) -> StoreResult<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(db_error)?;
    Ok(version)
}

/// Bring the schema up to date, one transaction per migration
pub async fn migrate_up(pool: &SqlitePool) -> StoreResult<()> {
    init_migration_table(pool).await?;
    validate_migrations(pool).await?;

    for migration in get_pending_migrations(pool).await? {
        debug!("Applying migration {} '{}'", migration.version, migration.name);
        let mut tx = pool.begin().await.map_err(db_error)?;

        sqlx::raw_sql(&migration.up_sql)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query("INSERT INTO schema_migrations (version, name, checksum) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(&migration.name)
            .bind(calculate_checksum(&migration.up_sql))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        info!("Applied migration {} '{}'", migration.version, migration.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_migrations() {
        let migrations = load_migrations();
        assert!(migrations.contains_key(&1));
        assert!(migrations.contains_key(&2));
        assert!(migrations[&1].up_sql.contains("CREATE TABLE IF NOT EXISTS documents"));
    }

    #[test]
    fn test_calculate_checksum() {
        let sql = "CREATE TABLE test (id INTEGER);";
        assert_eq!(calculate_checksum(sql), calculate_checksum(sql));
        assert_ne!(calculate_checksum(sql), calculate_checksum("CREATE TABLE test2 (id INTEGER);"));
        assert_eq!(
            calculate_checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
