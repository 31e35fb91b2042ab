use taskbook_config::DatabaseConfig;
use taskbook_common::Error;
use taskbook_db::{Database, MIGRATIONS, SchemaSnapshot};

const COMMITTED_SNAPSHOT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../db/schema.sql"));

fn config() -> DatabaseConfig {
    DatabaseConfig::default()
}

#[test]
fn version_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskbook.db");

    {
        let db = Database::open(&path, &config()).unwrap();
        assert_eq!(db.migrate().unwrap().len(), MIGRATIONS.len());
    }

    let db = Database::open(&path, &config()).unwrap();
    assert_eq!(db.version().unwrap(), Some(20203006230700));
    assert!(db.migrate().unwrap().is_empty());
    assert!(db.status().unwrap().iter().all(|s| s.is_applied()));
}

#[test]
fn open_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/data/taskbook.db");

    let db = Database::open(&path, &config()).unwrap();
    db.migrate().unwrap();
    assert!(path.is_file());
}

#[test]
fn open_existing_refuses_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo/missing.db");

    let err = Database::open_existing(&path, &config()).err().unwrap();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    assert!(!path.exists());
    assert!(!dir.path().join("typo").exists());
}

#[test]
fn open_existing_reads_migrated_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskbook.db");
    Database::open(&path, &config()).unwrap().migrate().unwrap();

    let db = Database::open_existing(&path, &config()).unwrap();
    assert_eq!(db.version().unwrap(), Some(20203006230700));
    assert_eq!(db.snapshot().unwrap().tables(), ["points", "scores", "todos"]);
}

#[test]
fn partially_migrated_database_resumes_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskbook.db");

    {
        let db = Database::open(&path, &config()).unwrap();
        db.migrate_to(20202806225100).unwrap();
    }

    let db = Database::open(&path, &config()).unwrap();
    assert_eq!(
        db.migrate().unwrap(),
        vec![20203006230600, 20203006230700]
    );
}

#[test]
fn committed_snapshot_lags_behind_migrations() {
    // The committed snapshot predates the scores and points migrations.
    let diff = Database::verify_snapshot(COMMITTED_SNAPSHOT).unwrap();

    assert!(!diff.is_clean());
    assert_eq!(diff.committed_version, Some(20202806225100));
    assert_eq!(diff.expected_version, Some(20203006230700));
    assert_eq!(diff.missing_tables(), ["points", "scores"]);
    assert!(diff.unexpected.is_empty());
}

#[test]
fn committed_snapshot_matches_first_migration() {
    let committed = SchemaSnapshot::parse(COMMITTED_SNAPSHOT).unwrap();

    let db = Database::in_memory().unwrap();
    db.migrate_to(20202806225100).unwrap();
    let captured = db.snapshot().unwrap();

    assert!(committed.diff(&captured).is_clean());
    assert_eq!(captured.render(), COMMITTED_SNAPSHOT);
}

#[test]
fn rollback_then_migrate_restores_identical_schema() {
    let db = Database::in_memory().unwrap();
    db.migrate().unwrap();
    let before = db.snapshot().unwrap();

    db.rollback(MIGRATIONS.len()).unwrap();
    assert_eq!(db.version().unwrap(), None);

    db.migrate().unwrap();
    assert_eq!(db.snapshot().unwrap(), before);
}
