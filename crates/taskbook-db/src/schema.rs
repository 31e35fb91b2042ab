//! Static table definitions for the taskbook schema.
//!
//! Tables are declared once here and rendered to SQLite DDL by the
//! migrations that create them. Every non-id column is nullable and no
//! database-level constraints are declared beyond the primary key.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// System-assigned surrogate key.
    Id,
    DateTime,
    Text,
    Boolean,
    Integer,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Id => "INTEGER PRIMARY KEY",
            ColumnKind::DateTime => "DATETIME",
            ColumnKind::Text => "TEXT",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Table this column points at by convention. Never rendered as a
    /// `REFERENCES` constraint.
    pub references: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            references: None,
        }
    }

    pub const fn association(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
            references: Some(table),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

impl IndexDef {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {} ON {} ({columns})",
            if self.unique { "UNIQUE " } else { "" },
            quote(self.name),
            quote(self.table),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub indexes: &'static [IndexDef],
}

impl TableDef {
    pub fn create_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE {} (\n", quote(self.name));
        for (i, column) in self.columns.iter().enumerate() {
            let sep = if i + 1 == self.columns.len() { "" } else { "," };
            let _ = writeln!(
                sql,
                "    {} {}{sep}",
                quote(column.name),
                column.kind.sql_type()
            );
        }
        sql.push(')');
        sql
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `(column, referenced table)` pairs declared on this table.
    pub fn associations(&self) -> Vec<(&'static str, &'static str)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.map(|table| (c.name, table)))
            .collect()
    }
}

/// Double-quote an identifier. `order` is a keyword, so every identifier is
/// quoted rather than only the reserved ones.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

const ID: ColumnDef = ColumnDef::new("id", ColumnKind::Id);
const CREATED_AT: ColumnDef = ColumnDef::new("created_at", ColumnKind::DateTime);
const UPDATED_AT: ColumnDef = ColumnDef::new("updated_at", ColumnKind::DateTime);

pub const TODOS: TableDef = TableDef {
    name: "todos",
    columns: &[
        ID,
        CREATED_AT,
        UPDATED_AT,
        ColumnDef::new("title", ColumnKind::Text),
        ColumnDef::new("completed", ColumnKind::Boolean),
        ColumnDef::new("order", ColumnKind::Integer),
    ],
    indexes: &[IndexDef {
        name: "index_todos_on_order",
        table: "todos",
        columns: &["order"],
        unique: false,
    }],
};

pub const SCORES: TableDef = TableDef {
    name: "scores",
    columns: &[
        ID,
        CREATED_AT,
        UPDATED_AT,
        ColumnDef::new("total_point", ColumnKind::Integer),
    ],
    indexes: &[],
};

pub const POINTS: TableDef = TableDef {
    name: "points",
    columns: &[
        ID,
        CREATED_AT,
        UPDATED_AT,
        ColumnDef::new("name", ColumnKind::Text),
        ColumnDef::new("count", ColumnKind::Integer),
        ColumnDef::association("score_id", "scores"),
    ],
    indexes: &[],
};

const CATALOG: &[TableDef] = &[TODOS, SCORES, POINTS];

/// All tables, in the order their migrations create them.
pub fn catalog() -> &'static [TableDef] {
    CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todos_ddl_quotes_reserved_order_column() {
        let sql = TODOS.create_sql();
        assert_eq!(
            sql,
            "CREATE TABLE \"todos\" (\n    \"id\" INTEGER PRIMARY KEY,\n    \"created_at\" DATETIME,\n    \"updated_at\" DATETIME,\n    \"title\" TEXT,\n    \"completed\" BOOLEAN,\n    \"order\" INTEGER\n)"
        );
    }

    #[test]
    fn order_index_is_not_unique() {
        let index = &TODOS.indexes[0];
        assert_eq!(
            index.create_sql(),
            "CREATE INDEX \"index_todos_on_order\" ON \"todos\" (\"order\")"
        );
    }

    #[test]
    fn associations_never_render_constraints() {
        assert_eq!(POINTS.associations(), vec![("score_id", "scores")]);
        let sql = POINTS.create_sql();
        assert!(!sql.contains("REFERENCES"));
        assert!(sql.contains("\"score_id\" INTEGER\n"));
    }

    #[test]
    fn no_column_is_declared_not_null() {
        for table in catalog() {
            assert!(!table.create_sql().contains("NOT NULL"), "{}", table.name);
        }
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn catalog_lists_tables_in_creation_order() {
        let names: Vec<_> = catalog().iter().map(|t| t.name).collect();
        assert_eq!(names, ["todos", "scores", "points"]);
        assert_eq!(
            TODOS.column("order").map(|c| c.kind),
            Some(ColumnKind::Integer)
        );
    }
}
