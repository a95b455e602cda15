//! URL facet: `urls`, `keyword_search_terms` and the temporary URL table.
//!
//! The temporary table supports "clear history": the caller copies the rows
//! worth keeping into `temp_urls`, swaps it in with
//! [`UrlDatabase::commit_temporary_url_table`], then recreates everything
//! else.

use rusqlite::{params, Row};

use super::connection::Connection;
use super::models::{KeywordId, KeywordSearchTermRow, UrlId, UrlRow};
use super::schema::TableFacet;
use super::time::Time;
use crate::error::StorageError;
use crate::Result;

const TEMPORARY_URL_TABLE: &str = "temp_urls";

fn url_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE {name} (
            id INTEGER PRIMARY KEY,
            url LONGVARCHAR,
            title LONGVARCHAR,
            visit_count INTEGER DEFAULT 0 NOT NULL,
            typed_count INTEGER DEFAULT 0 NOT NULL,
            last_visit_time INTEGER NOT NULL,
            hidden INTEGER DEFAULT 0 NOT NULL,
            favicon_id INTEGER DEFAULT 0 NOT NULL
        )"
    )
}

fn row_to_url(row: &Row<'_>) -> rusqlite::Result<UrlRow> {
    Ok(UrlRow {
        id: row.get(0)?,
        url: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        visit_count: row.get(3)?,
        typed_count: row.get(4)?,
        last_visit: row.get(5)?,
        hidden: row.get(6)?,
    })
}

/// Handle on the URL tables.
#[derive(Debug, Clone, Copy)]
pub struct UrlDatabase<'c> {
    conn: &'c Connection,
}

impl<'c> TableFacet<'c> for UrlDatabase<'c> {
    fn attach(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn table_names(&self) -> &'static [&'static str] {
        &["urls", "keyword_search_terms"]
    }

    fn init_tables(&self) -> Result<()> {
        if !self.conn.does_table_exist("urls")? {
            self.conn.execute_batch(&url_table_sql("urls"))?;
        }
        self.create_main_index()?;
        self.init_keyword_search_terms_table()?;
        self.create_supplementary_indices()
    }
}

impl UrlDatabase<'_> {
    fn create_main_index(&self) -> Result<()> {
        self.conn
            .execute_batch("CREATE INDEX IF NOT EXISTS urls_url_index ON urls (url)")
    }

    /// Create the keyword search term table if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn init_keyword_search_terms_table(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS keyword_search_terms (
                keyword_id INTEGER NOT NULL,
                url_id INTEGER NOT NULL,
                lower_term LONGVARCHAR NOT NULL,
                term LONGVARCHAR NOT NULL
            )",
        )
    }

    /// Drop the keyword search term table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be dropped.
    pub fn drop_keyword_search_terms_table(&self) -> Result<()> {
        self.conn
            .execute_batch("DROP TABLE IF EXISTS keyword_search_terms")
    }

    /// Indices over URL-related data that a temporary URL table swap does
    /// not carry over.
    ///
    /// # Errors
    ///
    /// Returns an error if an index cannot be created.
    pub fn create_supplementary_indices(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS keyword_search_terms_index1
                ON keyword_search_terms (keyword_id, lower_term);
            CREATE INDEX IF NOT EXISTS keyword_search_terms_index2
                ON keyword_search_terms (url_id);
            ",
        )
    }

    // ========== URL rows ==========

    /// Insert a URL row and return its id. `row.id` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_url(&self, row: &UrlRow) -> Result<UrlId> {
        self.conn.execute(
            "INSERT INTO urls (url, title, visit_count, typed_count, last_visit_time, hidden)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                row.url,
                row.title,
                row.visit_count,
                row.typed_count,
                row.last_visit,
                row.hidden
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        tracing::trace!(id, url = %row.url, "Inserted URL");
        Ok(id)
    }

    /// Get a URL row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn url_row(&self, id: UrlId) -> Result<Option<UrlRow>> {
        self.conn.query_row(
            "SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden
             FROM urls WHERE id = ?",
            [id],
            row_to_url,
        )
    }

    /// Get the URL row for an exact URL string.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn row_for_url(&self, url: &str) -> Result<Option<UrlRow>> {
        self.conn.query_row(
            "SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden
             FROM urls WHERE url = ?",
            [url],
            row_to_url,
        )
    }

    /// Overwrite the stored fields of URL `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the row does not exist, or a database error.
    pub fn update_url_row(&self, id: UrlId, row: &UrlRow) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE urls SET title = ?, visit_count = ?, typed_count = ?, last_visit_time = ?,
             hidden = ? WHERE id = ?",
            params![
                row.title,
                row.visit_count,
                row.typed_count,
                row.last_visit,
                row.hidden,
                id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::not_found("url", id.to_string()).into());
        }
        Ok(())
    }

    /// Delete URL `id` and its keyword search terms.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the row does not exist, or a database error.
    pub fn delete_url_row(&self, id: UrlId) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM urls WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(StorageError::not_found("url", id.to_string()).into());
        }
        self.delete_keyword_search_terms_for_url(id)
    }

    /// Count URL rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn url_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?
            .unwrap_or(0))
    }

    /// All URL rows ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_urls(&self) -> Result<Vec<UrlRow>> {
        self.conn.query_rows(
            "SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden
             FROM urls ORDER BY id",
            [],
            row_to_url,
        )
    }

    /// URL rows last visited strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn urls_visited_since(&self, since: Time) -> Result<Vec<UrlRow>> {
        self.conn.query_rows(
            "SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden
             FROM urls WHERE last_visit_time > ?",
            [since],
            row_to_url,
        )
    }

    // ========== Temporary URL table ==========

    /// Create an empty `temp_urls` table, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn create_temporary_url_table(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {TEMPORARY_URL_TABLE}"))?;
        self.conn
            .execute_batch(&url_table_sql(TEMPORARY_URL_TABLE))
    }

    /// Copy a row into `temp_urls`, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_temporary_url(&self, row: &UrlRow) -> Result<UrlId> {
        self.conn.execute(
            "INSERT INTO temp_urls (id, url, title, visit_count, typed_count, last_visit_time,
             hidden) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                row.id,
                row.url,
                row.title,
                row.visit_count,
                row.typed_count,
                row.last_visit,
                row.hidden
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace `urls` with `temp_urls` and rebuild the main index.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap fails.
    pub fn commit_temporary_url_table(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "DROP TABLE urls; ALTER TABLE {TEMPORARY_URL_TABLE} RENAME TO urls;"
        ))?;
        self.create_main_index()
    }

    /// Rebuild `urls` without the legacy `starred_id` column, keeping every
    /// row and id.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy or swap fails.
    pub fn drop_starred_id_column(&self) -> Result<()> {
        self.create_temporary_url_table()?;
        self.conn.execute_batch(&format!(
            "INSERT INTO {TEMPORARY_URL_TABLE}
                (id, url, title, visit_count, typed_count, last_visit_time, hidden, favicon_id)
             SELECT id, url, title, visit_count, typed_count, last_visit_time, hidden, favicon_id
             FROM urls"
        ))?;
        self.commit_temporary_url_table()
    }

    // ========== Keyword search terms ==========

    /// Record that `term` was searched for with `keyword_id`, landing on
    /// `url_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn set_keyword_search_terms_for_url(
        &self,
        url_id: UrlId,
        keyword_id: KeywordId,
        term: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO keyword_search_terms (keyword_id, url_id, lower_term, term)
             VALUES (?, ?, ?, ?)",
            params![keyword_id, url_id, term.to_lowercase(), term],
        )?;
        Ok(())
    }

    /// Search terms recorded for `url_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn keyword_search_terms_for_url(&self, url_id: UrlId) -> Result<Vec<KeywordSearchTermRow>> {
        self.conn.query_rows(
            "SELECT keyword_id, url_id, term FROM keyword_search_terms WHERE url_id = ?",
            [url_id],
            |row| {
                Ok(KeywordSearchTermRow {
                    keyword_id: row.get(0)?,
                    url_id: row.get(1)?,
                    term: row.get(2)?,
                })
            },
        )
    }

    /// Remove search terms recorded for `url_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_keyword_search_terms_for_url(&self, url_id: UrlId) -> Result<()> {
        self.conn
            .execute("DELETE FROM keyword_search_terms WHERE url_id = ?", [url_id])?;
        Ok(())
    }
}
