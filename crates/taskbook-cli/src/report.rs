use std::fmt::Write as _;
use std::path::Path;

use taskbook_db::{MigrationStatus, TableDef};

/// Render the migration status box printed by `taskbook status`.
pub fn status_table(db_path: &Path, version: Option<u64>, statuses: &[MigrationStatus]) -> String {
    let width = 70;
    let inner = width - 4; // "│ " + " │"

    let title = format!("taskbook v{}", env!("CARGO_PKG_VERSION"));
    let title_dashes = width - 2 - title.len() - 5; // 2 for ╭╮, 5 for "─── " + " "
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));
    let row = |s: &str| format!("│ {s:<inner$} │");

    let version = version.map_or_else(|| "none".to_string(), |v| v.to_string());
    let pending = statuses.iter().filter(|s| !s.is_applied()).count();

    let mut out = String::new();
    let _ = writeln!(out, "{top}");
    let _ = writeln!(out, "{}", row(&format!("Database    {}", db_path.display())));
    let _ = writeln!(out, "{}", row(&format!("Version     {version}")));
    let _ = writeln!(out, "{}", row(&format!("Pending     {pending}")));
    let _ = writeln!(out, "{}", row(&"─".repeat(inner)));
    for status in statuses {
        let state = match status.applied_at {
            Some(at) => format!("up    {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => "down".to_string(),
        };
        let _ = writeln!(
            out,
            "{}",
            row(&format!("{}  {:<16} {state}", status.version, status.name))
        );
    }
    let _ = writeln!(out, "{bottom}");
    out
}

/// Render the declared tables for `taskbook schema describe`.
pub fn describe_catalog(tables: &[TableDef]) -> String {
    let mut out = String::new();
    for table in tables {
        let _ = writeln!(out, "{}", table.name);
        for column in table.columns {
            let _ = write!(out, "  {:<12} {}", column.name, column.kind.sql_type());
            if let Some(target) = column.references {
                let _ = write!(out, "  -> {target} (association, not enforced)");
            }
            out.push('\n');
        }
        for index in table.indexes {
            let _ = writeln!(
                out,
                "  {}index {} ({})",
                if index.unique { "unique " } else { "" },
                index.name,
                index.columns.join(", ")
            );
        }
    }
    out
}
