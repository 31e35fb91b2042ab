use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};
use taskbook_common::{Error, Result};
use taskbook_config::DatabaseConfig;
use tracing::{info, warn};

use crate::migrations::MIGRATIONS;
use crate::migrator::{self, AppliedMigration, MigrationStatus, Migrator};
use crate::snapshot::{SchemaSnapshot, SnapshotDiff};

/// Handle to the taskbook SQLite database.
///
/// Opening never migrates; callers decide when to run [`Database::migrate`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        Self::with_connection(conn, config)
    }

    /// Open a database that must already exist. Used by commands that only
    /// inspect the schema, so a mistyped path fails instead of creating an
    /// empty database.
    pub fn open_existing(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        if !db_path.is_file() {
            return Err(Error::NotFound(format!(
                "database {}",
                db_path.display()
            )));
        }
        info!("opening existing database at {}", db_path.display());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        Self::with_connection(conn, config)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        Self::with_connection(conn, &DatabaseConfig::default())
    }

    fn with_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self> {
        let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!(
            "PRAGMA journal_mode={}; PRAGMA foreign_keys={foreign_keys};",
            config.journal_mode
        ))
        .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    fn migrator() -> Result<Migrator<'static>> {
        Migrator::new(MIGRATIONS)
    }

    /// Apply every pending migration; returns the versions applied.
    pub fn migrate(&self) -> Result<Vec<u64>> {
        let mut conn = self.connection()?;
        Self::migrator()?.migrate(&mut conn)
    }

    pub fn migrate_to(&self, version: u64) -> Result<Vec<u64>> {
        let mut conn = self.connection()?;
        Self::migrator()?.migrate_to(&mut conn, version)
    }

    /// Revert the `steps` most recent migrations; returns the versions reverted.
    pub fn rollback(&self, steps: usize) -> Result<Vec<u64>> {
        let mut conn = self.connection()?;
        Self::migrator()?.rollback(&mut conn, steps)
    }

    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let conn = self.connection()?;
        Self::migrator()?.status(&conn)
    }

    pub fn version(&self) -> Result<Option<u64>> {
        let conn = self.connection()?;
        migrator::current_version(&conn)
    }

    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.connection()?;
        migrator::applied_migrations(&conn)
    }

    pub fn snapshot(&self) -> Result<SchemaSnapshot> {
        let conn = self.connection()?;
        SchemaSnapshot::capture(&conn)
    }

    /// Compare a committed snapshot against the schema produced by running
    /// every migration on a scratch database.
    pub fn verify_snapshot(committed: &str) -> Result<SnapshotDiff> {
        let committed = SchemaSnapshot::parse(committed)?;

        let scratch = Self::in_memory()?;
        scratch.migrate()?;
        let expected = scratch.snapshot()?;

        let diff = committed.diff(&expected);
        if !diff.is_clean() {
            warn!(
                missing = diff.missing.len(),
                unexpected = diff.unexpected.len(),
                "committed schema snapshot differs from migrations"
            );
        }
        Ok(diff)
    }

    /// Run `f` against the raw connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.connection()?;
        f(&conn)
    }
}
