//! Download facet: `downloads` and `downloads_url_chains`.
//!
//! Also carries the column migrations for downloads, since each of them
//! only touches tables this facet owns.

use std::collections::HashMap;

use rusqlite::{params, Row};

use super::connection::Connection;
use super::models::{
    DownloadId, DownloadRow, DownloadState, DANGER_TYPE_NOT_DANGEROUS, INTERRUPT_REASON_CRASH,
    INTERRUPT_REASON_NONE,
};
use super::schema::TableFacet;
use crate::error::StorageError;
use crate::Result;

const DOWNLOAD_COLUMNS: &str = "id, current_path, target_path, start_time, received_bytes,
    total_bytes, state, danger_type, interrupt_reason, end_time, opened, referrer, by_ext_id,
    by_ext_name, etag, last_modified";

/// A download row before its URL chain is attached, with the raw state.
fn row_to_download(row: &Row<'_>) -> rusqlite::Result<(DownloadRow, i32)> {
    let download = DownloadRow {
        id: row.get(0)?,
        current_path: row.get(1)?,
        target_path: row.get(2)?,
        url_chain: Vec::new(),
        start_time: row.get(3)?,
        received_bytes: row.get(4)?,
        total_bytes: row.get(5)?,
        state: DownloadState::InProgress,
        danger_type: row.get(7)?,
        interrupt_reason: row.get(8)?,
        end_time: row.get(9)?,
        opened: row.get(10)?,
        referrer: row.get(11)?,
        by_ext_id: row.get(12)?,
        by_ext_name: row.get(13)?,
        etag: row.get(14)?,
        last_modified: row.get(15)?,
    };
    Ok((download, row.get(6)?))
}

/// Handle on the download tables.
#[derive(Debug, Clone, Copy)]
pub struct DownloadDatabase<'c> {
    conn: &'c Connection,
}

impl<'c> TableFacet<'c> for DownloadDatabase<'c> {
    fn attach(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn table_names(&self) -> &'static [&'static str] {
        &["downloads", "downloads_url_chains"]
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY,
                current_path LONGVARCHAR NOT NULL,
                target_path LONGVARCHAR NOT NULL,
                start_time INTEGER NOT NULL,
                received_bytes INTEGER NOT NULL,
                total_bytes INTEGER NOT NULL,
                state INTEGER NOT NULL,
                danger_type INTEGER NOT NULL,
                interrupt_reason INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                opened INTEGER NOT NULL,
                referrer VARCHAR NOT NULL,
                by_ext_id VARCHAR NOT NULL,
                by_ext_name VARCHAR NOT NULL,
                etag VARCHAR NOT NULL,
                last_modified VARCHAR NOT NULL
            );

            CREATE TABLE IF NOT EXISTS downloads_url_chains (
                id INTEGER NOT NULL,
                chain_index INTEGER NOT NULL,
                url LONGVARCHAR NOT NULL,
                PRIMARY KEY (id, chain_index)
            );
            ",
        )
    }
}

impl DownloadDatabase<'_> {
    // ========== Rows ==========

    /// Store a new download with its URL chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already used or an insert fails.
    pub fn create_download(&self, download: &DownloadRow) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO downloads ({DOWNLOAD_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                download.id,
                download.current_path,
                download.target_path,
                download.start_time,
                download.received_bytes,
                download.total_bytes,
                download.state.as_i32(),
                download.danger_type,
                download.interrupt_reason,
                download.end_time,
                download.opened,
                download.referrer,
                download.by_ext_id,
                download.by_ext_name,
                download.etag,
                download.last_modified
            ],
        )?;

        for (index, url) in download.url_chain.iter().enumerate() {
            let index = i64::try_from(index).unwrap_or(i64::MAX);
            self.conn.execute(
                "INSERT INTO downloads_url_chains (id, chain_index, url) VALUES (?, ?, ?)",
                params![download.id, index, url],
            )?;
        }

        tracing::trace!(id = download.id, "Created download");
        Ok(())
    }

    /// Write the mutable fields of a stored download. The URL chain and
    /// start time never change after creation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the download does not exist, or a database error.
    pub fn update_download(&self, download: &DownloadRow) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE downloads SET current_path = ?, target_path = ?, received_bytes = ?,
             total_bytes = ?, state = ?, danger_type = ?, interrupt_reason = ?, end_time = ?,
             opened = ?, by_ext_id = ?, by_ext_name = ?, etag = ?, last_modified = ?
             WHERE id = ?",
            params![
                download.current_path,
                download.target_path,
                download.received_bytes,
                download.total_bytes,
                download.state.as_i32(),
                download.danger_type,
                download.interrupt_reason,
                download.end_time,
                download.opened,
                download.by_ext_id,
                download.by_ext_name,
                download.etag,
                download.last_modified,
                download.id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::not_found("download", download.id.to_string()).into());
        }
        Ok(())
    }

    /// All stored downloads, oldest first. Rows with an unknown state are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn query_downloads(&self) -> Result<Vec<DownloadRow>> {
        let rows = self.conn.query_rows(
            &format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads ORDER BY start_time, id"),
            [],
            row_to_download,
        )?;

        let mut chains: HashMap<DownloadId, Vec<String>> = HashMap::new();
        let links: Vec<(DownloadId, String)> = self.conn.query_rows(
            "SELECT id, url FROM downloads_url_chains ORDER BY id, chain_index",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        for (id, url) in links {
            chains.entry(id).or_default().push(url);
        }

        let mut downloads = Vec::with_capacity(rows.len());
        for (mut download, raw_state) in rows {
            let Some(state) = DownloadState::parse(raw_state) else {
                tracing::warn!(id = download.id, state = raw_state, "Skipping download with unknown state");
                continue;
            };
            download.state = state;
            download.url_chain = chains.remove(&download.id).unwrap_or_default();
            downloads.push(download);
        }
        Ok(downloads)
    }

    /// Rewrite rows still marked in progress as interrupted by a crash.
    /// Run once per open, before the session creates downloads of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn clean_up_in_progress_entries(&self) -> Result<usize> {
        let fixed = self.conn.execute(
            "UPDATE downloads SET state = ?, interrupt_reason = ? WHERE state = ?",
            params![
                DownloadState::Interrupted.as_i32(),
                INTERRUPT_REASON_CRASH,
                DownloadState::InProgress.as_i32()
            ],
        )?;
        if fixed > 0 {
            tracing::info!(count = fixed, "Marked stale in-progress downloads as interrupted");
        }
        Ok(fixed)
    }

    /// Remove a download and its URL chain. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn remove_download(&self, id: DownloadId) -> Result<()> {
        self.conn
            .execute("DELETE FROM downloads WHERE id = ?", [id])?;
        self.conn
            .execute("DELETE FROM downloads_url_chains WHERE id = ?", [id])?;
        Ok(())
    }

    /// Count stored downloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn download_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))?
            .unwrap_or(0))
    }

    /// Smallest id above every stored download; 1 for an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn next_download_id(&self) -> Result<DownloadId> {
        let max: Option<DownloadId> = self
            .conn
            .query_row("SELECT MAX(id) FROM downloads", [], |row| row.get(0))?
            .flatten();
        Ok(max.map_or(1, |id| id + 1))
    }

    // ========== Migrations ==========

    /// Rewrite the state value written by a buggy release as interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn migrate_downloads_state(&self) -> Result<()> {
        if !self.conn.does_table_exist("downloads")? {
            return Ok(());
        }
        self.conn.execute(
            "UPDATE downloads SET state = ? WHERE state = ?",
            params![
                DownloadState::Interrupted.as_i32(),
                DownloadState::LEGACY_BUG_VALUE
            ],
        )?;
        Ok(())
    }

    /// Split the single path into current and target paths, add danger
    /// type and interrupt reason, and move the URL into a one-entry chain.
    /// A table without the legacy `full_path` column is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails.
    pub fn migrate_reason_paths_and_danger_type(&self) -> Result<()> {
        if !self.conn.does_column_exist("downloads", "full_path")? {
            return Ok(());
        }
        self.conn.execute_batch(
            "
            ALTER TABLE downloads RENAME TO downloads_tmp;

            CREATE TABLE downloads (
                id INTEGER PRIMARY KEY,
                current_path LONGVARCHAR NOT NULL,
                target_path LONGVARCHAR NOT NULL,
                start_time INTEGER NOT NULL,
                received_bytes INTEGER NOT NULL,
                total_bytes INTEGER NOT NULL,
                state INTEGER NOT NULL,
                danger_type INTEGER NOT NULL,
                interrupt_reason INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                opened INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS downloads_url_chains (
                id INTEGER NOT NULL,
                chain_index INTEGER NOT NULL,
                url LONGVARCHAR NOT NULL,
                PRIMARY KEY (id, chain_index)
            );
            ",
        )?;

        self.conn.execute(
            "INSERT INTO downloads (id, current_path, target_path, start_time, received_bytes,
             total_bytes, state, danger_type, interrupt_reason, end_time, opened)
             SELECT id, full_path, full_path, start_time, received_bytes, total_bytes, state,
             ?, ?, end_time, opened FROM downloads_tmp",
            params![DANGER_TYPE_NOT_DANGEROUS, INTERRUPT_REASON_NONE],
        )?;
        self.conn.execute(
            "INSERT INTO downloads_url_chains (id, chain_index, url)
             SELECT id, 0, url FROM downloads_tmp",
            [],
        )?;
        self.conn.execute_batch("DROP TABLE downloads_tmp")
    }

    /// Add the `referrer` column.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be altered.
    pub fn migrate_referrer(&self) -> Result<()> {
        self.add_text_columns(&["referrer"])
    }

    /// Add the columns naming the extension that started a download.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be altered.
    pub fn migrate_downloaded_by_extension(&self) -> Result<()> {
        self.add_text_columns(&["by_ext_id", "by_ext_name"])
    }

    /// Add the HTTP validator columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be altered.
    pub fn migrate_validators(&self) -> Result<()> {
        self.add_text_columns(&["etag", "last_modified"])
    }

    fn add_text_columns(&self, columns: &[&str]) -> Result<()> {
        if !self.conn.does_table_exist("downloads")? {
            return Ok(());
        }
        for column in columns {
            if self.conn.does_column_exist("downloads", column)? {
                continue;
            }
            self.conn.execute_batch(&format!(
                "ALTER TABLE downloads ADD COLUMN {column} VARCHAR NOT NULL DEFAULT ''"
            ))?;
        }
        Ok(())
    }
}
