//! Schema revisions.
//!
//! Each revision is a SQL batch embedded at compile time. Applied versions
//! are stamped into `schema_version`, so opening a database replays only
//! what it is missing, and a revision that fails leaves the file at the
//! last good version.

use rusqlite::Connection;

use crate::db::DbError;

struct Revision {
    version: i32,
    sql: &'static str,
}

const REVISIONS: &[Revision] = &[Revision {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Highest version stamped into this database, creating the bookkeeping
/// table on first contact. A fresh file reports 0.
fn stamped_version(conn: &Connection) -> Result<i32, DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    let version = conn.query_row(
        "SELECT IFNULL(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Bring the schema up to date, returning how many revisions ran.
///
/// A database stamped newer than this build refuses to open — running old
/// code against an unknown schema is how data gets mangled.
pub(crate) fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    let stamped = stamped_version(conn)?;
    let newest = REVISIONS.last().map_or(0, |r| r.version);
    if stamped > newest {
        return Err(DbError::Migration(format!(
            "database is at schema version {stamped}, newest this build knows is {newest}"
        )));
    }

    let mut ran = 0;
    for revision in REVISIONS.iter().filter(|r| r.version > stamped) {
        conn.execute_batch(revision.sql).map_err(|e| {
            DbError::Migration(format!("revision {} did not apply: {e}", revision.version))
        })?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [revision.version],
        )?;
        log::info!("Schema now at version {}", revision.version);
        ran += 1;
    }
    Ok(ran)
}
