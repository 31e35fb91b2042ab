//! Generated schema snapshot (`db/schema.sql`).
//!
//! A snapshot is the DDL of every user table and index in a database plus
//! the migration version it was taken at. It is regenerated from a live
//! database and compared against what the migrations produce; a committed
//! snapshot that has fallen behind is reported, never rewritten silently.

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use taskbook_common::{Error, Result};

use crate::migrator::{MIGRATIONS_TABLE, current_version};

const HEADER: &str = "\
-- This file is generated from the current state of the database by
-- `taskbook schema dump`. Edit the migrations instead of this file and
-- regenerate it.
--
";

const VERSION_PREFIX: &str = "-- version:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub version: Option<u64>,
    pub statements: Vec<String>,
}

impl SchemaSnapshot {
    /// Read the schema of `conn`. Tables come first, then indexes, each
    /// sorted by name. SQLite internals and the bookkeeping table are skipped.
    pub fn capture(conn: &Connection) -> Result<Self> {
        let mut stmt = conn
            .prepare(
                "SELECT sql FROM sqlite_master
                 WHERE sql IS NOT NULL
                   AND type IN ('table', 'index')
                   AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
                   AND tbl_name != ?1
                 ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, name",
            )
            .map_err(|e| Error::Database(format!("failed to prepare schema query: {e}")))?;

        let statements = stmt
            .query_map([MIGRATIONS_TABLE], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to read schema: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read schema row: {e}")))?;

        Ok(Self {
            version: current_version(conn)?,
            statements,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        match self.version {
            Some(v) => out.push_str(&format!("{VERSION_PREFIX} {v}\n")),
            None => out.push_str(&format!("{VERSION_PREFIX} none\n")),
        }
        for statement in &self.statements {
            out.push('\n');
            out.push_str(statement.trim());
            out.push_str(";\n");
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut version = None;
        let mut saw_version = false;
        let mut body = String::new();

        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix(VERSION_PREFIX) {
                let rest = rest.trim();
                version = match rest {
                    "none" => None,
                    v => Some(v.parse::<u64>().map_err(|e| {
                        Error::Snapshot(format!("invalid version {v:?}: {e}"))
                    })?),
                };
                saw_version = true;
            } else if !trimmed.starts_with("--") {
                body.push_str(line);
                body.push('\n');
            }
        }

        if !saw_version {
            return Err(Error::Snapshot("missing version header".into()));
        }

        let statements = body
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            version,
            statements,
        })
    }

    /// Names of the tables this snapshot creates.
    pub fn tables(&self) -> Vec<String> {
        self.statements
            .iter()
            .filter_map(|s| created_table_name(s))
            .collect()
    }

    /// Compare this (committed) snapshot against the `expected` one.
    pub fn diff(&self, expected: &SchemaSnapshot) -> SnapshotDiff {
        let ours: Vec<String> = self.statements.iter().map(|s| normalize(s)).collect();
        let theirs: Vec<String> = expected.statements.iter().map(|s| normalize(s)).collect();

        SnapshotDiff {
            committed_version: self.version,
            expected_version: expected.version,
            missing: expected
                .statements
                .iter()
                .zip(&theirs)
                .filter(|(_, n)| !ours.contains(n))
                .map(|(s, _)| s.clone())
                .collect(),
            unexpected: self
                .statements
                .iter()
                .zip(&ours)
                .filter(|(_, n)| !theirs.contains(n))
                .map(|(s, _)| s.clone())
                .collect(),
        }
    }
}

/// Differences between a committed snapshot and the migrated schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub committed_version: Option<u64>,
    pub expected_version: Option<u64>,
    /// Statements the migrations produce that the snapshot lacks.
    pub missing: Vec<String>,
    /// Statements in the snapshot that the migrations do not produce.
    pub unexpected: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_clean(&self) -> bool {
        self.committed_version == self.expected_version
            && self.missing.is_empty()
            && self.unexpected.is_empty()
    }

    pub fn missing_tables(&self) -> Vec<String> {
        self.missing
            .iter()
            .filter_map(|s| created_table_name(s))
            .collect()
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "snapshot is up to date");
        }
        let show = |v: Option<u64>| v.map_or_else(|| "none".to_string(), |v| v.to_string());
        writeln!(
            f,
            "snapshot is at version {}, migrations are at {}",
            show(self.committed_version),
            show(self.expected_version)
        )?;
        for s in &self.missing {
            writeln!(f, "  missing:    {}", first_line(s))?;
        }
        for s in &self.unexpected {
            writeln!(f, "  unexpected: {}", first_line(s))?;
        }
        Ok(())
    }
}

fn normalize(statement: &str) -> String {
    statement.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or("").trim_end_matches('(').trim()
}

fn created_table_name(statement: &str) -> Option<String> {
    let rest = normalize(statement);
    let rest = rest.strip_prefix("CREATE TABLE ")?;
    let rest = rest.strip_prefix("IF NOT EXISTS ").unwrap_or(rest);
    let name = rest
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()?
        .trim_matches('"');
    Some(name.to_string())
}
