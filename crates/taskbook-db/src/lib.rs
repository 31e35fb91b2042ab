pub mod database;
pub mod migrations;
pub mod migrator;
pub mod schema;
pub mod snapshot;

pub use database::Database;
pub use migrations::{Change, MIGRATIONS, Migration};
pub use migrator::{AppliedMigration, MigrationStatus, Migrator};
pub use schema::{ColumnDef, ColumnKind, IndexDef, TableDef, catalog};
pub use snapshot::{SchemaSnapshot, SnapshotDiff};
