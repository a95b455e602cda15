//! Visit segment facet: `segments` and `segment_usage`.
//!
//! A segment groups visits to URLs that normalize to the same name; usage
//! is counted per segment per UTC day and scored with a recency boost.

use std::collections::BTreeMap;

use rusqlite::params;

use super::connection::Connection;
use super::models::{PageUsageData, SegmentId, UrlId};
use super::schema::TableFacet;
use super::time::Time;
use crate::error::StorageError;
use crate::Result;

/// Handle on the segment tables.
#[derive(Debug, Clone, Copy)]
pub struct VisitSegmentDatabase<'c> {
    conn: &'c Connection,
}

impl<'c> TableFacet<'c> for VisitSegmentDatabase<'c> {
    fn attach(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn table_names(&self) -> &'static [&'static str] {
        &["segments", "segment_usage"]
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS segments (
                id INTEGER PRIMARY KEY,
                name VARCHAR,
                url_id INTEGER NON NULL,
                pres_index INTEGER DEFAULT -1 NOT NULL
            );
            CREATE INDEX IF NOT EXISTS segments_name ON segments (name);
            CREATE INDEX IF NOT EXISTS segments_url_id ON segments (url_id);

            CREATE TABLE IF NOT EXISTS segment_usage (
                id INTEGER PRIMARY KEY,
                segment_id INTEGER NOT NULL,
                time_slot INTEGER NOT NULL,
                visit_count INTEGER DEFAULT 0 NOT NULL
            );
            CREATE INDEX IF NOT EXISTS segment_usage_time_slot_segment_id
                ON segment_usage (time_slot, segment_id);
            CREATE INDEX IF NOT EXISTS segments_usage_seg_id ON segment_usage (segment_id);
            ",
        )
    }
}

impl VisitSegmentDatabase<'_> {
    /// Add the `pres_index` column to a pre-v25 `segments` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be altered.
    pub fn add_presentation_index_column(&self) -> Result<()> {
        if !self.conn.does_table_exist("segments")?
            || self.conn.does_column_exist("segments", "pres_index")?
        {
            return Ok(());
        }
        self.conn.execute_batch(
            "ALTER TABLE segments ADD COLUMN pres_index INTEGER DEFAULT -1 NOT NULL",
        )
    }

    /// Normalized segment name for a URL: drops a leading `www.`, user
    /// info, port, query and fragment. `None` if `url` does not parse.
    #[must_use]
    pub fn compute_segment_name(url: &str) -> Option<String> {
        let mut parsed = url::Url::parse(url).ok()?;

        let stripped_host = parsed.host_str().and_then(|host| {
            let prefix = host.get(..4)?;
            (host.len() > 4 && prefix.eq_ignore_ascii_case("www.")).then(|| host[4..].to_string())
        });
        if let Some(host) = stripped_host {
            parsed.set_host(Some(&host)).ok()?;
        }

        let has_authority = !parsed.cannot_be_a_base()
            && parsed.scheme() != "file"
            && parsed.host_str().is_some_and(|host| !host.is_empty());
        if has_authority {
            parsed.set_username("").ok()?;
            parsed.set_password(None).ok()?;
            parsed.set_port(None).ok()?;
        }
        parsed.set_query(None);
        parsed.set_fragment(None);

        Some(parsed.to_string())
    }

    /// Id of the segment with this name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn segment_named(&self, name: &str) -> Result<Option<SegmentId>> {
        self.conn
            .query_row("SELECT id FROM segments WHERE name = ?", [name], |row| {
                row.get(0)
            })
    }

    /// Create a segment represented by `url_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_segment(&self, url_id: UrlId, name: &str) -> Result<SegmentId> {
        self.conn.execute(
            "INSERT INTO segments (name, url_id) VALUES (?, ?)",
            params![name, url_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Point a segment at a different representative URL.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the segment does not exist, or a database error.
    pub fn update_segment_representation_url(
        &self,
        segment_id: SegmentId,
        url_id: UrlId,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE segments SET url_id = ? WHERE id = ?",
            params![url_id, segment_id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("segment", segment_id.to_string()).into());
        }
        Ok(())
    }

    /// Representative URL of a segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn segment_representation_url(&self, segment_id: SegmentId) -> Result<Option<UrlId>> {
        self.conn.query_row(
            "SELECT url_id FROM segments WHERE id = ?",
            [segment_id],
            |row| row.get(0),
        )
    }

    /// Add `amount` visits to the segment's usage for the UTC day of `ts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or write fails.
    pub fn increase_segment_visit_count(
        &self,
        segment_id: SegmentId,
        ts: Time,
        amount: i32,
    ) -> Result<()> {
        let slot = ts.utc_midnight();
        let existing: Option<(i64, i64)> = self.conn.query_row(
            "SELECT id, visit_count FROM segment_usage WHERE time_slot = ? AND segment_id = ?",
            params![slot, segment_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match existing {
            Some((usage_id, count)) => {
                self.conn.execute(
                    "UPDATE segment_usage SET visit_count = ? WHERE id = ?",
                    params![count + i64::from(amount), usage_id],
                )?;
            }
            None => {
                self.conn.execute(
                    "INSERT INTO segment_usage (segment_id, time_slot, visit_count)
                     VALUES (?, ?, ?)",
                    params![segment_id, slot, amount],
                )?;
            }
        }
        Ok(())
    }

    /// Most used segments since `from_time`, best first, at most
    /// `max_results` of them.
    ///
    /// Each day contributes `1 + ln(visits)`, boosted by recency: 3x today,
    /// 2x a week ago, 1.5x three weeks ago, tending to 1x.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn query_segment_usage(
        &self,
        from_time: Time,
        max_results: usize,
    ) -> Result<Vec<PageUsageData>> {
        let today = Time::now().utc_midnight();
        let usage: Vec<(SegmentId, Time, i64)> = self.conn.query_rows(
            "SELECT segment_id, time_slot, visit_count FROM segment_usage
             WHERE time_slot >= ? ORDER BY segment_id",
            [from_time],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut scores: BTreeMap<SegmentId, f64> = BTreeMap::new();
        for (segment_id, slot, visit_count) in usage {
            #[allow(clippy::cast_precision_loss)]
            let day_score = 1.0 + (visit_count.max(1) as f64).ln();
            #[allow(clippy::cast_precision_loss)]
            let days_ago = today.days_since(slot).max(0) as f64;
            let recency_boost = 1.0 + 2.0 * (1.0 / (1.0 + days_ago / 7.0));
            *scores.entry(segment_id).or_default() += day_score * recency_boost;
        }

        let mut ranked: Vec<(SegmentId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(max_results);

        let mut results = Vec::with_capacity(ranked.len());
        for (segment_id, score) in ranked {
            let (url, title) = self
                .conn
                .query_row(
                    "SELECT urls.url, urls.title FROM urls
                     JOIN segments ON segments.url_id = urls.id WHERE segments.id = ?",
                    [segment_id],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        ))
                    },
                )?
                .unwrap_or_default();

            results.push(PageUsageData {
                segment_id,
                url,
                title,
                score,
            });
        }
        Ok(results)
    }

    /// Drop usage older than `older_than`, then segments left with no usage.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn delete_segment_data(&self, older_than: Time) -> Result<()> {
        self.conn.execute(
            "DELETE FROM segment_usage WHERE time_slot < ?",
            [older_than],
        )?;
        self.conn.execute(
            "DELETE FROM segments WHERE id NOT IN (SELECT segment_id FROM segment_usage)",
            [],
        )?;
        Ok(())
    }

    /// Remove segments represented by `url_id`, with their usage.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn delete_segment_for_url(&self, url_id: UrlId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM segment_usage WHERE segment_id IN
             (SELECT id FROM segments WHERE url_id = ?)",
            [url_id],
        )?;
        self.conn
            .execute("DELETE FROM segments WHERE url_id = ?", [url_id])?;
        Ok(())
    }

    /// Set the position a segment is shown at; -1 clears it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the segment does not exist, or a database error.
    pub fn set_segment_presentation_index(&self, segment_id: SegmentId, index: i32) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE segments SET pres_index = ? WHERE id = ?",
            params![index, segment_id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("segment", segment_id.to_string()).into());
        }
        Ok(())
    }

    /// Presentation index of a segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn segment_presentation_index(&self, segment_id: SegmentId) -> Result<Option<i32>> {
        self.conn.query_row(
            "SELECT pres_index FROM segments WHERE id = ?",
            [segment_id],
            |row| row.get(0),
        )
    }
}
