//! Schema versions and the table-facet capability.
//!
//! The history file is split into facets, each owning a disjoint set of
//! tables. Facets share one connection and are composed by
//! [`crate::history::HistoryDatabase`].

use super::connection::Connection;
use crate::error::StorageError;
use crate::Result;

/// Version new databases are created with and old ones migrate to.
pub const SCHEMA_VERSION: i32 = 28;

/// Last compatible version stamped on new databases.
pub const COMPATIBLE_VERSION: i32 = 16;

/// Oldest on-disk version with a migration path.
pub const OLDEST_MIGRATABLE_VERSION: i32 = 15;

/// A cohesive subset of the schema plus the operations over it.
pub trait TableFacet<'c> {
    /// Attach the facet to a connection.
    fn attach(conn: &'c Connection) -> Self
    where
        Self: Sized;

    /// Connection the facet operates on.
    fn connection(&self) -> &'c Connection;

    /// Tables owned by this facet.
    fn table_names(&self) -> &'static [&'static str];

    /// Create missing tables and indices. Must be safe to call on a current
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a table or index cannot be created.
    fn init_tables(&self) -> Result<()>;

    /// Drop every table owned by this facet.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be dropped.
    fn drop_tables(&self) -> Result<()> {
        for table in self.table_names() {
            self.connection()
                .execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
        }
        Ok(())
    }

    /// Check that every owned table exists.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing table.
    fn verify_tables(&self) -> Result<()> {
        for table in self.table_names() {
            if !self.connection().does_table_exist(table)? {
                return Err(StorageError::Migration(format!("table '{table}' not found")).into());
            }
        }
        Ok(())
    }
}
