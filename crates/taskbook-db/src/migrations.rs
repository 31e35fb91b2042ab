//! Migration system for tracking and applying database schema changes.
//!
//! Each migration has a version number and the change records that move the
//! schema forward (`up`) and back (`down`). Versions are timestamps taken
//! when the migration was written, so registry order is creation order.
//! Applied versions are tracked in the `schema_migrations` table.

use crate::schema::{ColumnDef, IndexDef, POINTS, SCORES, TODOS, TableDef, quote};

/// One incremental schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Create a table together with its declared indexes.
    CreateTable(&'static TableDef),
    DropTable(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static ColumnDef,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
    CreateIndex(&'static IndexDef),
    DropIndex(&'static str),
}

impl Change {
    /// SQL statements implementing this change, in execution order.
    pub fn statements(&self) -> Vec<String> {
        match self {
            Change::CreateTable(table) => std::iter::once(table.create_sql())
                .chain(table.indexes.iter().map(IndexDef::create_sql))
                .collect(),
            Change::DropTable(name) => vec![format!("DROP TABLE {}", quote(name))],
            Change::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote(table),
                quote(column.name),
                column.kind.sql_type()
            )],
            Change::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote(table),
                quote(column)
            )],
            Change::CreateIndex(index) => vec![index.create_sql()],
            Change::DropIndex(name) => vec![format!("DROP INDEX {}", quote(name))],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub name: &'static str,
    pub up: &'static [Change],
    pub down: &'static [Change],
}

/// Every migration, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 20202806225100,
        name: "create_todos",
        up: &[Change::CreateTable(&TODOS)],
        down: &[Change::DropTable("todos")],
    },
    Migration {
        version: 20203006230600,
        name: "create_scores",
        up: &[Change::CreateTable(&SCORES)],
        down: &[Change::DropTable("scores")],
    },
    Migration {
        version: 20203006230700,
        name: "create_points",
        up: &[Change::CreateTable(&POINTS)],
        down: &[Change::DropTable("points")],
    },
];

pub fn latest_version() -> Option<u64> {
    MIGRATIONS.last().map(|m| m.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_versions_strictly_ascend() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(latest_version(), Some(20203006230700));
    }

    #[test]
    fn create_table_includes_indexes() {
        let statements = Change::CreateTable(&TODOS).statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE \"todos\""));
        assert!(statements[1].starts_with("CREATE INDEX \"index_todos_on_order\""));
    }

    #[test]
    fn every_down_drops_what_up_created() {
        for migration in MIGRATIONS {
            let created: Vec<_> = migration
                .up
                .iter()
                .filter_map(|c| match c {
                    Change::CreateTable(t) => Some(t.name),
                    _ => None,
                })
                .collect();
            let dropped: Vec<_> = migration
                .down
                .iter()
                .filter_map(|c| match c {
                    Change::DropTable(name) => Some(*name),
                    _ => None,
                })
                .collect();
            assert_eq!(created, dropped, "{}", migration.name);
        }
    }

    #[test]
    fn column_changes_render_alter_table() {
        const DUE_AT: ColumnDef = ColumnDef::new("due_at", crate::schema::ColumnKind::DateTime);
        assert_eq!(
            Change::AddColumn {
                table: "todos",
                column: &DUE_AT,
            }
            .statements(),
            vec!["ALTER TABLE \"todos\" ADD COLUMN \"due_at\" DATETIME".to_string()]
        );
        assert_eq!(
            Change::DropColumn {
                table: "todos",
                column: "due_at",
            }
            .statements(),
            vec!["ALTER TABLE \"todos\" DROP COLUMN \"due_at\"".to_string()]
        );
    }

    #[test]
    fn drop_statements_quote_identifiers() {
        assert_eq!(
            Change::DropIndex("index_todos_on_order").statements(),
            vec!["DROP INDEX \"index_todos_on_order\"".to_string()]
        );
    }
}
