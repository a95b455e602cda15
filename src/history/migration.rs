//! Schema version checks and forward migrations.
//!
//! Each step transforms the data first and then bumps `meta.version`, so a
//! failure part way leaves the version of the last completed step. The
//! caller runs all of this inside one transaction.

use crate::error::StorageError;
use crate::observability::spans;
use crate::storage::{
    Connection, DownloadDatabase, MetaTable, TableFacet, UrlDatabase, VisitDatabase,
    VisitSegmentDatabase, COMPATIBLE_VERSION, EPOCH_DELTA_MICROS, OLDEST_MIGRATABLE_VERSION,
    SCHEMA_VERSION,
};
use crate::Result;

/// What a migration run did, beyond reaching the current version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// The file was new and has been created at the current version.
    pub created: bool,
    /// Version the file had before migrating.
    pub from_version: i32,
    /// Timestamps were shifted from the Unix epoch to the 1601 epoch.
    pub epoch_shifted: bool,
}

/// Bring the schema to [`SCHEMA_VERSION`].
///
/// A file without a `meta` table is treated as new: it is stamped and every
/// facet creates its tables. Files written by a newer release, or too old to
/// migrate, are rejected without modification.
///
/// # Errors
///
/// Returns `TooNew`, `TooOld`, or the error of the step that failed.
pub fn ensure_current_version(conn: &Connection) -> Result<MigrationReport> {
    let meta = MetaTable::attach(conn);

    if meta.init(SCHEMA_VERSION, COMPATIBLE_VERSION)? {
        tracing::info!(version = SCHEMA_VERSION, "Creating new history database");
        init_all_facets(conn)?;
        return Ok(MigrationReport {
            created: true,
            from_version: SCHEMA_VERSION,
            epoch_shifted: false,
        });
    }

    let version = meta.version_number()?;
    let compatible = meta.compatible_version_number()?;
    let mut report = MigrationReport {
        created: false,
        from_version: version,
        epoch_shifted: false,
    };

    if version > SCHEMA_VERSION || compatible > SCHEMA_VERSION {
        tracing::warn!(version, compatible, "History database is too new");
        return Err(StorageError::TooNew {
            found: version.max(compatible),
            current: SCHEMA_VERSION,
        }
        .into());
    }

    if version < OLDEST_MIGRATABLE_VERSION {
        tracing::warn!(version, "History database is too old");
        return Err(StorageError::TooOld {
            found: version,
            oldest: OLDEST_MIGRATABLE_VERSION,
        }
        .into());
    }

    if version == SCHEMA_VERSION {
        return Ok(report);
    }

    let span = spans::db_span("migrate", "meta");
    let _guard = span.enter();
    tracing::info!(
        current = version,
        target = SCHEMA_VERSION,
        "Migrating history database"
    );

    let mut current = version;

    if current < 16 {
        migrate_v16(conn, &meta)?;
        current = bump(&meta, 16)?;
    }

    if current < 17 {
        migrate_v17(conn)?;
        report.epoch_shifted = true;
        current = bump(&meta, 17)?;
    }

    // 18 through 20 were retired steps; only the version moves.
    while current < 20 {
        current = bump(&meta, current + 1)?;
    }

    if current < 21 {
        tracing::info!("Applying migration v21: visit duration");
        VisitDatabase::attach(conn).add_visit_duration_column()?;
        current = bump(&meta, 21)?;
    }

    if current < 22 {
        // Only touched tables this crate does not carry.
        current = bump(&meta, 22)?;
    }

    if current < 23 {
        tracing::info!("Applying migration v23: legacy download state");
        DownloadDatabase::attach(conn).migrate_downloads_state()?;
        current = bump(&meta, 23)?;
    }

    if current < 24 {
        tracing::info!("Applying migration v24: download paths and url chains");
        DownloadDatabase::attach(conn).migrate_reason_paths_and_danger_type()?;
        current = bump(&meta, 24)?;
    }

    if current < 25 {
        tracing::info!("Applying migration v25: segment presentation index");
        VisitSegmentDatabase::attach(conn).add_presentation_index_column()?;
        current = bump(&meta, 25)?;
    }

    if current < 26 {
        tracing::info!("Applying migration v26: download referrer");
        DownloadDatabase::attach(conn).migrate_referrer()?;
        current = bump(&meta, 26)?;
    }

    if current < 27 {
        tracing::info!("Applying migration v27: downloading extension");
        DownloadDatabase::attach(conn).migrate_downloaded_by_extension()?;
        current = bump(&meta, 27)?;
    }

    if current < 28 {
        tracing::info!("Applying migration v28: download validators");
        DownloadDatabase::attach(conn).migrate_validators()?;
        current = bump(&meta, 28)?;
    }

    debug_assert_eq!(current, SCHEMA_VERSION);
    tracing::info!(version = current, "History database migrated");
    Ok(report)
}

/// Create every facet's tables. Safe on an existing schema.
///
/// # Errors
///
/// Returns the first facet error.
pub fn init_all_facets(conn: &Connection) -> Result<()> {
    UrlDatabase::attach(conn).init_tables()?;
    VisitDatabase::attach(conn).init_tables()?;
    VisitSegmentDatabase::attach(conn).init_tables()?;
    DownloadDatabase::attach(conn).init_tables()
}

fn bump(meta: &MetaTable<'_>, version: i32) -> Result<i32> {
    meta.set_version_number(version)?;
    tracing::debug!(version, "Schema version bumped");
    Ok(version)
}

/// Migration v16: drop the starred table and `urls.starred_id`.
fn migrate_v16(conn: &Connection, meta: &MetaTable<'_>) -> Result<()> {
    tracing::info!("Applying migration v16: remove starred");

    if conn.does_column_exist("urls", "starred_id")? {
        UrlDatabase::attach(conn)
            .drop_starred_id_column()
            .map_err(|e| StorageError::Migration(format!("failed to drop starred_id: {e}")))?;
    }
    conn.execute_batch("DROP TABLE IF EXISTS starred")?;

    meta.set_compatible_version_number(16)
}

/// Migration v17: move stored times from the Unix epoch to the 1601 epoch.
fn migrate_v17(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v17: time epoch");

    for (table, column) in [
        ("urls", "last_visit_time"),
        ("visits", "visit_time"),
        ("segment_usage", "time_slot"),
    ] {
        if !conn.does_table_exist(table)? {
            continue;
        }
        conn.execute(
            &format!("UPDATE {table} SET {column} = {column} + ? WHERE {column} > 0"),
            [EPOCH_DELTA_MICROS],
        )
        .map_err(|e| StorageError::Migration(format!("failed to shift {table}.{column}: {e}")))?;
    }
    Ok(())
}
