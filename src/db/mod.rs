//! SQLite-backed store for profiles, intakes, and match suggestions.
//!
//! The database is touched only at stage ingress/egress: the pipeline loads
//! profiles and intakes up front, scores in memory, and writes suggestions
//! back in a single transaction. No locks are held during scoring.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub mod intakes;
pub mod profiles;
pub mod reviews;
pub mod suggestions;
pub mod types;

pub use types::*;

/// SQLite connection wrapper.
///
/// Intentionally NOT `Clone` or `Sync`; hold it behind a `std::sync::Mutex`
/// when sharing across threads.
pub struct MatchDb {
    conn: Connection,
}

impl MatchDb {
    /// Open (or create) a database at `path` and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::open_at(path.as_ref().to_path_buf())
    }

    /// In-memory database for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }
        let conn = Connection::open(&path)?;
        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        crate::migrations::run_migrations(&conn)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Run `work` as one exclusive write transaction.
    ///
    /// The write lock is taken up front so cycle persistence never
    /// deadlocks against a concurrent reader upgrading mid-write. Nothing
    /// becomes visible until `work` succeeds; on any error the whole write
    /// unwinds and the original error is surfaced (a rollback that itself
    /// fails is logged, not swallowed into a second error).
    pub fn with_transaction<F, T>(&self, work: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|source| DbError::Transaction {
                phase: "begin",
                source,
            })?;
        match work(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|source| DbError::Transaction {
                        phase: "commit",
                        source,
                    })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::error!("Rollback after failed write also failed: {rollback}");
                }
                Err(err)
            }
        }
    }
}
