//! `SQLite` connection management.
//!
//! Wraps a single `rusqlite` connection with the pieces the history engine
//! relies on:
//! - nested transactions counted in one integer, with all-or-nothing rollback
//! - an error callback invoked on every failed statement
//! - cached statements for every query issued through the wrapper
//! - vacuum, raze, exclusive locking and page-cache trimming

use std::cell::Cell;
use std::path::Path;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::{OpenFlags, OptionalExtension, Params, Row};

use crate::error::StorageError;
use crate::{Error, Result};

/// Callback receiving the extended `SQLite` error code and the failing
/// statement, if any.
pub type ErrorCallback = Box<dyn Fn(i32, Option<&str>) + Send + 'static>;

/// Settings applied when a connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Page size in bytes. Only takes effect on a file with no pages yet.
    pub page_size: u32,
    /// Page cache size, in pages.
    pub cache_size: i64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            page_size: 4096,
            cache_size: 1000,
        }
    }
}

/// Database connection wrapper.
///
/// Not `Sync`: the transaction counter lives in a `Cell` and the engine
/// assumes a single owning thread.
pub struct Connection {
    inner: rusqlite::Connection,
    path: String,
    error_callback: Option<ErrorCallback>,
    transaction_nesting: Cell<usize>,
    needs_rollback: Cell<bool>,
}

impl Connection {
    /// Open a database at the given path.
    ///
    /// Creates the database file and parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(
        path: impl AsRef<Path>,
        options: ConnectionOptions,
        error_callback: Option<ErrorCallback>,
    ) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let inner = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Database(format!("failed to open database: {e}")))?;

        let conn = Self::wrap(inner, path.to_string_lossy().to_string(), error_callback);
        conn.configure(options)?;
        Ok(conn)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory(
        options: ConnectionOptions,
        error_callback: Option<ErrorCallback>,
    ) -> Result<Self> {
        let inner = rusqlite::Connection::open_in_memory().map_err(|e| {
            StorageError::Database(format!("failed to open in-memory database: {e}"))
        })?;

        let conn = Self::wrap(inner, ":memory:".to_string(), error_callback);
        conn.configure(options)?;
        Ok(conn)
    }

    fn wrap(
        inner: rusqlite::Connection,
        path: String,
        error_callback: Option<ErrorCallback>,
    ) -> Self {
        Self {
            inner,
            path,
            error_callback,
            transaction_nesting: Cell::new(0),
            needs_rollback: Cell::new(false),
        }
    }

    fn configure(&self, options: ConnectionOptions) -> Result<()> {
        // page_size must precede anything that allocates the first page.
        self.execute_batch(&format!(
            "
            PRAGMA page_size = {};
            PRAGMA cache_size = {};
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
            options.page_size, options.cache_size
        ))?;

        tracing::debug!(
            path = %self.path,
            page_size = options.page_size,
            cache_size = options.cache_size,
            "Database configured"
        );
        Ok(())
    }

    /// Report a failed statement through the error callback and convert it.
    fn fail(&self, err: &rusqlite::Error, sql: &str) -> Error {
        let code = match err {
            rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
            _ => rusqlite::ffi::SQLITE_ERROR,
        };

        tracing::warn!(code, sql, error = %err, "Statement failed");
        if let Some(callback) = &self.error_callback {
            callback(code, Some(sql));
        }

        StorageError::Database(err.to_string()).into()
    }

    /// Run a single statement and return the number of changed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.inner
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params))
            .map_err(|e| self.fail(&e, sql))
    }

    /// Run one or more statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner
            .execute_batch(sql)
            .map_err(|e| self.fail(&e, sql))
    }

    /// Query at most one row. A query producing no rows yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or the row mapping fails.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.inner
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.query_row(params, f).optional())
            .map_err(|e| self.fail(&e, sql))
    }

    /// Query all rows, mapping each one.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or any row mapping fails.
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.inner
            .prepare_cached(sql)
            .and_then(|mut stmt| {
                let rows = stmt.query_map(params, f)?.collect::<rusqlite::Result<Vec<T>>>();
                rows
            })
            .map_err(|e| self.fail(&e, sql))
    }

    /// Row id of the most recent successful insert.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    /// Whether a table (or view) with the given name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    pub fn does_table_exist(&self, table: &str) -> Result<bool> {
        let count: Option<i64> = self.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// Whether `table` has a column named `column`.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    pub fn does_column_exist(&self, table: &str, column: &str) -> Result<bool> {
        let count: Option<i64> = self.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    // ========== Transactions ==========

    /// Number of currently open (nested) transactions.
    #[must_use]
    pub fn transaction_nesting(&self) -> usize {
        self.transaction_nesting.get()
    }

    /// Begin a transaction. Only the outermost call starts a real one.
    ///
    /// # Errors
    ///
    /// Fails if an inner transaction already rolled back the chain, or if
    /// the `BEGIN` statement fails.
    pub fn begin_transaction(&self) -> Result<()> {
        if self.needs_rollback.get() {
            return Err(StorageError::Database(
                "transaction chain is marked for rollback".to_string(),
            )
            .into());
        }

        let nesting = self.transaction_nesting.get();
        if nesting == 0 {
            self.execute_batch("BEGIN TRANSACTION")?;
        }
        self.transaction_nesting.set(nesting + 1);
        Ok(())
    }

    /// Commit a transaction. Only the outermost call flushes to disk.
    ///
    /// # Errors
    ///
    /// Fails when no transaction is open, when the chain was marked for
    /// rollback (it is rolled back instead), or when `COMMIT` fails.
    pub fn commit_transaction(&self) -> Result<()> {
        let nesting = self.transaction_nesting.get();
        if nesting == 0 {
            tracing::warn!("Commit without an open transaction");
            return Err(StorageError::Database("no open transaction to commit".to_string()).into());
        }

        self.transaction_nesting.set(nesting - 1);
        if nesting > 1 {
            return if self.needs_rollback.get() {
                Err(StorageError::Database("transaction chain was rolled back".to_string()).into())
            } else {
                Ok(())
            };
        }

        if self.needs_rollback.get() {
            self.do_rollback();
            return Err(StorageError::Database("transaction chain was rolled back".to_string()).into());
        }

        let committed = self.execute_batch("COMMIT");
        if committed.is_err() && !self.inner.is_autocommit() {
            // A failed COMMIT can leave the transaction open.
            self.do_rollback();
        }
        committed
    }

    /// Roll back. An inner rollback poisons the whole chain; the outermost
    /// commit will then roll back everything since the outermost begin.
    pub fn rollback_transaction(&self) {
        let nesting = self.transaction_nesting.get();
        if nesting == 0 {
            tracing::warn!("Rollback without an open transaction");
            return;
        }

        self.transaction_nesting.set(nesting - 1);
        if nesting > 1 {
            self.needs_rollback.set(true);
            return;
        }

        self.do_rollback();
    }

    fn do_rollback(&self) {
        if let Err(e) = self.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "Rollback failed");
        }
        self.needs_rollback.set(false);
    }

    // ========== Maintenance ==========

    /// Switch to exclusive locking for the rest of the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma fails.
    pub fn set_exclusive_locking(&self) -> Result<()> {
        self.execute_batch("PRAGMA locking_mode=EXCLUSIVE")
    }

    /// Rebuild the file, releasing free pages.
    ///
    /// # Errors
    ///
    /// Fails inside a transaction or if `VACUUM` fails.
    pub fn vacuum(&self) -> Result<()> {
        if self.transaction_nesting.get() > 0 {
            return Err(
                StorageError::Database("cannot vacuum inside a transaction".to_string()).into(),
            );
        }
        self.execute_batch("VACUUM")
    }

    /// Shrink the page cache, then restore its configured size.
    pub fn trim_memory(&self, aggressively: bool) {
        let original = match self.cache_size() {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cache size");
                return;
            }
        };

        let shrunk = if aggressively { 1 } else { original / 2 };
        if let Err(e) = self.execute_batch(&format!("PRAGMA cache_size = {shrunk}")) {
            tracing::warn!(error = %e, "Could not shrink cache size");
        }
        if let Err(e) = self.execute_batch(&format!("PRAGMA cache_size = {original}")) {
            tracing::warn!(error = %e, "Could not restore cache size");
        }
    }

    /// Current `cache_size` pragma value.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn cache_size(&self) -> Result<i64> {
        Ok(self
            .query_row("PRAGMA cache_size", [], |row| row.get(0))?
            .unwrap_or_default())
    }

    /// Replace the file's content with an empty database, keeping the file.
    ///
    /// # Errors
    ///
    /// Fails inside a transaction, or when the backup cannot complete
    /// (e.g. another connection holds a lock).
    pub fn raze(&mut self) -> Result<()> {
        if self.transaction_nesting.get() > 0 {
            return Err(StorageError::Raze("cannot raze inside a transaction".to_string()).into());
        }

        let page_size: i64 = self
            .query_row("PRAGMA page_size", [], |row| row.get(0))?
            .unwrap_or(4096);

        let null_db = rusqlite::Connection::open_in_memory()
            .map_err(|e| StorageError::Raze(format!("failed to open empty database: {e}")))?;
        // Bumping schema_version forces the first page, fixing the page size.
        null_db
            .execute_batch(&format!(
                "PRAGMA page_size = {page_size}; PRAGMA schema_version = 1;"
            ))
            .map_err(|e| StorageError::Raze(format!("failed to prepare empty database: {e}")))?;

        self.inner.flush_prepared_statement_cache();
        let outcome =
            Backup::new(&null_db, &mut self.inner).and_then(|backup| backup.step(-1));

        match outcome {
            Ok(StepResult::Done) => {
                tracing::info!(path = %self.path, "Database razed");
                Ok(())
            }
            Ok(step) => Err(StorageError::Raze(format!("backup did not finish: {step:?}")).into()),
            Err(e) => {
                let err = self.fail(&e, "raze");
                Err(StorageError::Raze(err.to_string()).into())
            }
        }
    }

    /// Get the database path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("transaction_nesting", &self.transaction_nesting.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory() -> Connection {
        Connection::open_in_memory(ConnectionOptions::default(), None).unwrap()
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let conn = memory();
        assert_eq!(conn.path(), ":memory:");
        assert_eq!(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).unwrap(), Some(1));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dirs").join("History");

        let conn = Connection::open(&path, ConnectionOptions::default(), None).unwrap();
        assert!(path.exists());
        assert_eq!(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).unwrap(), Some(1));
    }

    #[test]
    fn test_query_row_no_rows_is_none() {
        let conn = memory();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .unwrap();

        let row: Option<i64> = conn
            .query_row("SELECT id FROM test WHERE id = ?", [7], |row| row.get(0))
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_nested_commit_only_outermost_flushes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");
        let conn = Connection::open(&path, ConnectionOptions::default(), None).unwrap();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .unwrap();

        let observer = rusqlite::Connection::open(&path).unwrap();
        let observed = || -> i64 {
            observer
                .query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0))
                .unwrap()
        };

        conn.begin_transaction().unwrap();
        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (id) VALUES (1)", []).unwrap();
        conn.commit_transaction().unwrap();
        assert_eq!(conn.transaction_nesting(), 1);
        assert_eq!(observed(), 0);

        conn.execute("INSERT INTO test (id) VALUES (2)", []).unwrap();
        conn.commit_transaction().unwrap();
        assert_eq!(conn.transaction_nesting(), 0);
        assert_eq!(observed(), 2);
    }

    #[test]
    fn test_inner_rollback_rolls_back_whole_chain() {
        let conn = memory();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .unwrap();

        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (id) VALUES (1)", []).unwrap();
        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (id) VALUES (2)", []).unwrap();
        conn.rollback_transaction();

        // No new nesting level while the chain is poisoned.
        assert!(conn.begin_transaction().is_err());
        assert_eq!(conn.transaction_nesting(), 1);

        assert!(conn.commit_transaction().is_err());
        assert_eq!(conn.transaction_nesting(), 0);
        assert_eq!(count(&conn), 0);

        // The connection recovers for the next chain.
        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (id) VALUES (3)", []).unwrap();
        conn.commit_transaction().unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_outermost_rollback() {
        let conn = memory();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .unwrap();

        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO test (id) VALUES (1)", []).unwrap();
        conn.rollback_transaction();

        assert_eq!(conn.transaction_nesting(), 0);
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_failed_commit_closes_transaction() {
        let conn = memory();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED);",
        )
        .unwrap();

        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO child (id, parent_id) VALUES (1, 42)", [])
            .unwrap();
        assert!(conn.commit_transaction().is_err());
        assert_eq!(conn.transaction_nesting(), 0);
        assert!(conn.inner.is_autocommit());

        conn.begin_transaction().unwrap();
        conn.execute("INSERT INTO parent (id) VALUES (42)", []).unwrap();
        conn.commit_transaction().unwrap();

        let children: Option<i64> = conn
            .query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, Some(0));
    }

    #[test]
    fn test_commit_without_transaction_fails() {
        let conn = memory();
        assert!(conn.commit_transaction().is_err());
        conn.rollback_transaction();
        assert_eq!(conn.transaction_nesting(), 0);
    }

    #[test]
    fn test_error_callback_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_code = Arc::new(AtomicI32::new(0));
        let callback: ErrorCallback = {
            let calls = Arc::clone(&calls);
            let last_code = Arc::clone(&last_code);
            Box::new(move |code, sql| {
                calls.fetch_add(1, Ordering::SeqCst);
                last_code.store(code, Ordering::SeqCst);
                assert!(sql.is_some());
            })
        };

        let conn = Connection::open_in_memory(ConnectionOptions::default(), Some(callback))
            .unwrap();
        assert!(conn.execute("INSERT INTO missing (id) VALUES (1)", []).is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(last_code.load(Ordering::SeqCst), rusqlite::ffi::SQLITE_ERROR);
    }

    #[test]
    fn test_does_table_and_column_exist() {
        let conn = memory();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();

        assert!(conn.does_table_exist("test").unwrap());
        assert!(!conn.does_table_exist("other").unwrap());
        assert!(conn.does_column_exist("test", "name").unwrap());
        assert!(!conn.does_column_exist("test", "missing").unwrap());
    }

    #[test]
    fn test_trim_memory_restores_cache_size() {
        let conn = memory();
        let before = conn.cache_size().unwrap();

        conn.trim_memory(false);
        assert_eq!(conn.cache_size().unwrap(), before);

        conn.trim_memory(true);
        assert_eq!(conn.cache_size().unwrap(), before);
    }

    #[test]
    fn test_vacuum_refused_in_transaction() {
        let conn = memory();
        conn.begin_transaction().unwrap();
        assert!(conn.vacuum().is_err());
        conn.commit_transaction().unwrap();
        conn.vacuum().unwrap();
    }

    #[test]
    fn test_raze_empties_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");
        let mut conn = Connection::open(&path, ConnectionOptions::default(), None).unwrap();
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY); INSERT INTO test VALUES (1);")
            .unwrap();

        conn.raze().unwrap();

        assert!(path.exists());
        assert!(!conn.does_table_exist("test").unwrap());
        conn.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_raze_refused_in_transaction() {
        let mut conn = memory();
        conn.begin_transaction().unwrap();
        let err = conn.raze().unwrap_err();
        assert!(err.to_string().contains("raze failed"));
        conn.commit_transaction().unwrap();
    }
}
