//! Key/value metadata table.
//!
//! Holds the schema version, the last compatible version and auxiliary keys.
//! Values live in a text column, so integers are cast on the way out.

use super::connection::Connection;
use crate::Result;

const VERSION_KEY: &str = "version";
const COMPATIBLE_VERSION_KEY: &str = "last_compatible_version";

/// Handle on the `meta` table of a connection.
#[derive(Debug, Clone, Copy)]
pub struct MetaTable<'c> {
    conn: &'c Connection,
}

impl<'c> MetaTable<'c> {
    /// Attach to the `meta` table of `conn`.
    #[must_use]
    pub const fn attach(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Whether the `meta` table exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    pub fn exists(&self) -> Result<bool> {
        self.conn.does_table_exist("meta")
    }

    /// Create the table if missing. A newly created table is stamped with
    /// `version` and `compatible_version`; an existing one is left alone.
    ///
    /// Returns `true` when the table was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created or stamped.
    pub fn init(&self, version: i32, compatible_version: i32) -> Result<bool> {
        if self.exists()? {
            return Ok(false);
        }

        self.conn.execute_batch(
            "CREATE TABLE meta (key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR)",
        )?;
        self.set_version_number(version)?;
        self.set_compatible_version_number(compatible_version)?;
        Ok(true)
    }

    /// Store an integer value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_value(&self, key: &str, value: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Read an integer value; `None` when the key is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn value(&self, key: &str) -> Result<Option<i64>> {
        self.conn.query_row(
            "SELECT CAST(value AS INTEGER) FROM meta WHERE key = ?",
            [key],
            |row| row.get(0),
        )
    }

    /// Persisted schema version, or 0 when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn version_number(&self) -> Result<i32> {
        self.int_value(VERSION_KEY)
    }

    /// Persist the schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_version_number(&self, version: i32) -> Result<()> {
        self.set_value(VERSION_KEY, i64::from(version))
    }

    /// Oldest code version able to read this file, or 0 when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn compatible_version_number(&self) -> Result<i32> {
        self.int_value(COMPATIBLE_VERSION_KEY)
    }

    /// Persist the last compatible version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_compatible_version_number(&self, version: i32) -> Result<()> {
        self.set_value(COMPATIBLE_VERSION_KEY, i64::from(version))
    }

    fn int_value(&self, key: &str) -> Result<i32> {
        let value = self.value(key)?.unwrap_or(0);
        Ok(i32::try_from(value).unwrap_or(i32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionOptions;

    fn setup() -> Connection {
        Connection::open_in_memory(ConnectionOptions::default(), None).unwrap()
    }

    #[test]
    fn test_init_creates_and_stamps() {
        let conn = setup();
        let meta = MetaTable::attach(&conn);

        assert!(!meta.exists().unwrap());
        assert!(meta.init(28, 16).unwrap());
        assert_eq!(meta.version_number().unwrap(), 28);
        assert_eq!(meta.compatible_version_number().unwrap(), 16);
    }

    #[test]
    fn test_init_leaves_existing_table() {
        let conn = setup();
        let meta = MetaTable::attach(&conn);
        meta.init(20, 16).unwrap();

        assert!(!meta.init(28, 16).unwrap());
        assert_eq!(meta.version_number().unwrap(), 20);
    }

    #[test]
    fn test_int_values() {
        let conn = setup();
        let meta = MetaTable::attach(&conn);
        meta.init(28, 16).unwrap();

        assert_eq!(meta.value("early_expiration_threshold").unwrap(), None);
        meta.set_value("early_expiration_threshold", 13_000_000_000_000_000)
            .unwrap();
        assert_eq!(
            meta.value("early_expiration_threshold").unwrap(),
            Some(13_000_000_000_000_000)
        );

        assert_eq!(meta.value("never-set").unwrap(), None);
    }
}
