// src/ingest.rs

//! Ingest sink: execute a generated SQL script against SQLite.
//!
//! A script is executed as a whole (semicolon-separated statements)
//! against `<resource>_<depth>.db` in the feed's `db/` directory. On
//! any failure the sink moves to the next depth, which names a fresh
//! database file, up to [`MAX_DEPTH`]. The depth counter resets on
//! every pipeline invocation. If all depths fail, the script stays out
//! of the stage manifest and is retried on a later run.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retries after the initial attempt; six databases may be touched.
pub const MAX_DEPTH: u32 = 5;

/// Database filename for a retry depth, e.g. `caiso_atl_ruc_00.db`.
pub fn db_name(resource: &str, depth: u32) -> String {
    format!("{resource}_{depth:02}.db")
}

/// Execute `sql_file` against the resource's database, walking the
/// retry depths on failure. Returns the path of the database that
/// accepted the script.
pub fn execute_script(resource: &str, sql_file: &Path, db_dir: &Path) -> Result<PathBuf> {
    let script = fs::read_to_string(sql_file).map_err(|e| Error::InputError {
        path: sql_file.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut last_error = String::new();
    for depth in 0..=MAX_DEPTH {
        let db_path = db_dir.join(db_name(resource, depth));
        debug!(
            resource,
            sql_file = %sql_file.display(),
            db = %db_path.display(),
            depth,
            "executing script"
        );
        match run_script(&db_path, &script) {
            Ok(()) => return Ok(db_path),
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    resource,
                    sql_file = %sql_file.display(),
                    db = %db_path.display(),
                    depth,
                    error = %last_error,
                    "script failed, advancing to next database"
                );
            }
        }
    }

    Err(Error::IngestError {
        script: sql_file.display().to_string(),
        attempts: MAX_DEPTH + 1,
        detail: last_error,
    })
}

/// Open, execute, commit, close. The connection is released on every
/// exit path; an error mid-script leaves the next depth untouched.
fn run_script(db_path: &Path, script: &str) -> Result<()> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    conn.execute_batch(script)?;
    conn.close().map_err(|(_, e)| Error::Database(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    const SCRIPT: &str = "CREATE TABLE IF NOT EXISTS t (v INTEGER, PRIMARY KEY (v));\n\
                          INSERT OR IGNORE INTO t (v) VALUES (1);\n";

    fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_db_name_zero_pads() {
        assert_eq!(db_name("caiso_atl_ruc", 0), "caiso_atl_ruc_00.db");
        assert_eq!(db_name("caiso_atl_ruc", 5), "caiso_atl_ruc_05.db");
    }

    #[test]
    fn test_executes_at_depth_zero() {
        let dir = tempfile::tempdir().unwrap();
        let sql = write_script(dir.path(), "a.sql", SCRIPT);

        let db = execute_script("feed", &sql, dir.path()).unwrap();
        assert_eq!(db, dir.path().join("feed_00.db"));

        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sql = write_script(dir.path(), "a.sql", SCRIPT);

        execute_script("feed", &sql, dir.path()).unwrap();
        execute_script("feed", &sql, dir.path()).unwrap();

        let conn = Connection::open(dir.path().join("feed_00.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_corrupt_db_retries_at_next_depth() {
        let dir = tempfile::tempdir().unwrap();
        let sql = write_script(dir.path(), "a.sql", SCRIPT);

        // not a SQLite file
        std::fs::write(dir.path().join("feed_00.db"), b"garbage").unwrap();

        let db = execute_script("feed", &sql, dir.path()).unwrap();
        assert_eq!(db, dir.path().join("feed_01.db"));
    }

    #[test]
    fn test_bad_script_exhausts_depths() {
        let dir = tempfile::tempdir().unwrap();
        let sql = write_script(dir.path(), "bad.sql", "NOT SQL AT ALL;");

        let result = execute_script("feed", &sql, dir.path());
        match result.unwrap_err() {
            Error::IngestError { attempts, .. } => assert_eq!(attempts, MAX_DEPTH + 1),
            other => panic!("expected IngestError, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_script_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute_script("feed", &dir.path().join("none.sql"), dir.path());
        assert!(matches!(result.unwrap_err(), Error::InputError { .. }));
    }
}
