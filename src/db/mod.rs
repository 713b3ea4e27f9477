//! Persistence gateway backed by SQLite.

pub mod deps;
pub mod settings;
pub mod tasks;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Savepoint name for [`Database::transaction`]. SQLite resolves nested
/// savepoints with the same name to the innermost one.
const SCOPE_SAVEPOINT: &str = "taskrank_scope";

/// Database handle wrapping a SQLite connection.
///
/// Each primitive operation commits on its own unless it runs inside
/// [`Database::transaction`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic, so a poisoned lock still guards a usable connection.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.lock();
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` as one atomic unit: everything it writes is rolled back if it
    /// returns an error. Scopes nest.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.with_conn(|conn| {
            conn.execute_batch(&format!("SAVEPOINT {}", SCOPE_SAVEPOINT))?;
            Ok(())
        })?;

        match f() {
            Ok(value) => {
                self.with_conn(|conn| {
                    conn.execute_batch(&format!("RELEASE {}", SCOPE_SAVEPOINT))?;
                    Ok(())
                })?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back transaction scope");
                let rollback = self.with_conn(|conn| {
                    conn.execute_batch(&format!(
                        "ROLLBACK TO {0}; RELEASE {0}",
                        SCOPE_SAVEPOINT
                    ))?;
                    Ok(())
                });
                if let Err(rollback_err) = rollback {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
