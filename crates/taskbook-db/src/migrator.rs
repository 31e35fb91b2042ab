use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use taskbook_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::migrations::{Change, Migration};

/// Bookkeeping table holding one row per applied migration.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// A row of `schema_migrations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: u64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// State of a registered migration against a particular database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: &'static str,
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Applies and reverts an ordered set of migrations.
///
/// Each migration runs in its own transaction together with its bookkeeping
/// row, so a failure leaves the schema at the last migration that committed.
pub struct Migrator<'a> {
    migrations: &'a [Migration],
}

impl<'a> Migrator<'a> {
    /// Fails unless versions are strictly ascending and each fits in
    /// SQLite's signed 64-bit integer.
    pub fn new(migrations: &'a [Migration]) -> Result<Self> {
        for migration in migrations {
            to_sql_version(migration.version)?;
        }
        for pair in migrations.windows(2) {
            if pair[0].version >= pair[1].version {
                return Err(Error::migration(
                    pair[1].version,
                    format!(
                        "registered after {} ({}); versions must be strictly ascending",
                        pair[0].version, pair[0].name
                    ),
                ));
            }
        }
        Ok(Self { migrations })
    }

    pub fn migrations(&self) -> &'a [Migration] {
        self.migrations
    }

    /// Apply every pending migration. Returns the versions applied by this
    /// call; empty when the database is already up to date.
    pub fn migrate(&self, conn: &mut Connection) -> Result<Vec<u64>> {
        self.apply_pending(conn, None)
    }

    /// Apply pending migrations up to and including `target`.
    pub fn migrate_to(&self, conn: &mut Connection, target: u64) -> Result<Vec<u64>> {
        if !self.migrations.iter().any(|m| m.version == target) {
            return Err(Error::NotFound(format!("migration version {target}")));
        }
        self.apply_pending(conn, Some(target))
    }

    fn apply_pending(&self, conn: &mut Connection, target: Option<u64>) -> Result<Vec<u64>> {
        ensure_migrations_table(conn)?;
        let applied = applied_versions(conn)?;
        self.warn_unknown(&applied);

        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.contains_key(&m.version))
            .filter(|m| target.is_none_or(|t| m.version <= t));

        let mut done = Vec::new();
        for migration in pending {
            info!(
                version = migration.version,
                "applying migration {}", migration.name
            );
            let tx = begin(conn, migration.version)?;
            run_changes(&tx, migration.version, migration.up)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                params![to_sql_version(migration.version)?, migration.name],
            )
            .map_err(|e| Error::migration(migration.version, format!("failed to record: {e}")))?;
            tx.commit()
                .map_err(|e| Error::migration(migration.version, format!("commit failed: {e}")))?;
            done.push(migration.version);
        }

        if done.is_empty() {
            info!("schema is up to date");
        }
        Ok(done)
    }

    /// Revert the `steps` most recently applied migrations, newest first.
    pub fn rollback(&self, conn: &mut Connection, steps: usize) -> Result<Vec<u64>> {
        ensure_migrations_table(conn)?;
        let applied = applied_versions(conn)?;

        let mut reverted = Vec::new();
        for version in applied.keys().rev().take(steps).copied() {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == version)
                .ok_or_else(|| {
                    Error::migration(version, "applied but not registered; cannot roll back")
                })?;

            info!(version, "rolling back migration {}", migration.name);
            let tx = begin(conn, version)?;
            run_changes(&tx, version, migration.down)?;
            tx.execute(
                "DELETE FROM schema_migrations WHERE version = ?1",
                params![to_sql_version(version)?],
            )
            .map_err(|e| Error::migration(version, format!("failed to unrecord: {e}")))?;
            tx.commit()
                .map_err(|e| Error::migration(version, format!("commit failed: {e}")))?;
            reverted.push(version);
        }

        if reverted.is_empty() {
            info!("nothing to roll back");
        }
        Ok(reverted)
    }

    /// Every registered migration with its applied state.
    pub fn status(&self, conn: &Connection) -> Result<Vec<MigrationStatus>> {
        let applied = if migrations_table_exists(conn)? {
            applied_versions(conn)?
        } else {
            BTreeMap::new()
        };
        self.warn_unknown(&applied);

        Ok(self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name,
                applied_at: applied.get(&m.version).map(|a| a.applied_at),
            })
            .collect())
    }

    fn warn_unknown(&self, applied: &BTreeMap<u64, AppliedMigration>) {
        for record in applied.values() {
            if !self.migrations.iter().any(|m| m.version == record.version) {
                warn!(
                    version = record.version,
                    "database has migration {} applied that is not registered", record.name
                );
            }
        }
    }
}

/// Highest applied version, or `None` for a database never migrated.
pub fn current_version(conn: &Connection) -> Result<Option<u64>> {
    if !migrations_table_exists(conn)? {
        return Ok(None);
    }
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;
    Ok(version.map(from_sql_version))
}

/// Rows of `schema_migrations`, ascending by version.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    if !migrations_table_exists(conn)? {
        return Ok(Vec::new());
    }
    Ok(applied_versions(conn)?.into_values().collect())
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| Error::Database(format!("failed to create {MIGRATIONS_TABLE}: {e}")))
}

fn migrations_table_exists(conn: &Connection) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![MIGRATIONS_TABLE],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| Error::Database(format!("failed to inspect schema: {e}")))
}

fn applied_versions(conn: &Connection) -> Result<BTreeMap<u64, AppliedMigration>> {
    let mut stmt = conn
        .prepare("SELECT version, name, applied_at FROM schema_migrations ORDER BY version")
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: from_sql_version(row.get(0)?),
                name: row.get(1)?,
                applied_at: parse_datetime(row.get::<_, String>(2)?),
            })
        })
        .map_err(|e| Error::Database(format!("failed to query applied migrations: {e}")))?;

    let mut applied = BTreeMap::new();
    for row in rows {
        let record =
            row.map_err(|e| Error::Database(format!("failed to read migration row: {e}")))?;
        applied.insert(record.version, record);
    }
    Ok(applied)
}

fn begin(conn: &mut Connection, version: u64) -> Result<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| Error::migration(version, format!("failed to begin transaction: {e}")))
}

fn run_changes(tx: &Transaction<'_>, version: u64, changes: &[Change]) -> Result<()> {
    for change in changes {
        for sql in change.statements() {
            debug!(version, "{sql}");
            tx.execute_batch(&sql)
                .map_err(|e| Error::migration(version, e.to_string()))?;
        }
    }
    Ok(())
}

fn to_sql_version(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| Error::migration(version, "version exceeds the largest value SQLite can store"))
}

fn from_sql_version(version: i64) -> u64 {
    version as u64
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
