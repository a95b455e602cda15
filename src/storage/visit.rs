//! Visit facet: the `visits` table.

use rusqlite::{params, Row};

use super::connection::Connection;
use super::models::{SegmentId, UrlId, VisitId, VisitRow};
use super::schema::TableFacet;
use super::time::Time;
use crate::error::StorageError;
use crate::Result;

const VISIT_COLUMNS: &str =
    "id, url, visit_time, from_visit, transition, segment_id, visit_duration";

fn row_to_visit(row: &Row<'_>) -> rusqlite::Result<VisitRow> {
    Ok(VisitRow {
        id: row.get(0)?,
        url_id: row.get(1)?,
        visit_time: row.get(2)?,
        referring_visit: row.get::<_, Option<VisitId>>(3)?.unwrap_or(0),
        transition: row.get(4)?,
        segment_id: row.get::<_, Option<SegmentId>>(5)?.unwrap_or(0),
        visit_duration: row.get(6)?,
    })
}

/// Handle on the visit table.
#[derive(Debug, Clone, Copy)]
pub struct VisitDatabase<'c> {
    conn: &'c Connection,
}

impl<'c> TableFacet<'c> for VisitDatabase<'c> {
    fn attach(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn table_names(&self) -> &'static [&'static str] {
        &["visits"]
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY,
                url INTEGER NOT NULL,
                visit_time INTEGER NOT NULL,
                from_visit INTEGER,
                transition INTEGER DEFAULT 0 NOT NULL,
                segment_id INTEGER,
                is_indexed BOOLEAN,
                visit_duration INTEGER DEFAULT 0 NOT NULL
            );
            CREATE INDEX IF NOT EXISTS visits_url_index ON visits (url);
            CREATE INDEX IF NOT EXISTS visits_from_index ON visits (from_visit);
            CREATE INDEX IF NOT EXISTS visits_time_index ON visits (visit_time);
            ",
        )
    }
}

impl VisitDatabase<'_> {
    /// Add the `visit_duration` column to a pre-v21 `visits` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be altered.
    pub fn add_visit_duration_column(&self) -> Result<()> {
        if !self.conn.does_table_exist("visits")?
            || self.conn.does_column_exist("visits", "visit_duration")?
        {
            return Ok(());
        }
        self.conn.execute_batch(
            "ALTER TABLE visits ADD COLUMN visit_duration INTEGER DEFAULT 0 NOT NULL",
        )
    }

    /// Insert a visit and return its id. `visit.id` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_visit(&self, visit: &VisitRow) -> Result<VisitId> {
        self.conn.execute(
            "INSERT INTO visits (url, visit_time, from_visit, transition, segment_id,
             visit_duration) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                visit.url_id,
                visit.visit_time,
                visit.referring_visit,
                visit.transition,
                visit.segment_id,
                visit.visit_duration
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        tracing::trace!(id, url_id = visit.url_id, "Inserted visit");
        Ok(id)
    }

    /// Get a visit by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn visit_row(&self, id: VisitId) -> Result<Option<VisitRow>> {
        self.conn.query_row(
            &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?"),
            [id],
            row_to_visit,
        )
    }

    /// Overwrite a stored visit, identified by `visit.id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the visit does not exist, or a database error.
    pub fn update_visit_row(&self, visit: &VisitRow) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE visits SET url = ?, visit_time = ?, from_visit = ?, transition = ?,
             segment_id = ?, visit_duration = ? WHERE id = ?",
            params![
                visit.url_id,
                visit.visit_time,
                visit.referring_visit,
                visit.transition,
                visit.segment_id,
                visit.visit_duration,
                visit.id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::not_found("visit", visit.id.to_string()).into());
        }
        Ok(())
    }

    /// Delete a visit. Visits it referred to are re-pointed at its own
    /// referrer so the redirect chain stays connected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the visit does not exist, or a database error.
    pub fn delete_visit(&self, id: VisitId) -> Result<()> {
        let visit = self
            .visit_row(id)?
            .ok_or_else(|| StorageError::not_found("visit", id.to_string()))?;

        self.conn.execute(
            "UPDATE visits SET from_visit = ? WHERE from_visit = ?",
            params![visit.referring_visit, id],
        )?;
        self.conn.execute("DELETE FROM visits WHERE id = ?", [id])?;
        Ok(())
    }

    /// All visits to `url_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn visits_for_url(&self, url_id: UrlId) -> Result<Vec<VisitRow>> {
        self.conn.query_rows(
            &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE url = ? ORDER BY visit_time"),
            [url_id],
            row_to_visit,
        )
    }

    /// Visits in `[begin, end)`, newest first. A null `end` means no upper
    /// bound and `max_results == 0` means no limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn visits_in_range(&self, begin: Time, end: Time, max_results: usize) -> Result<Vec<VisitRow>> {
        let end = if end.is_null() {
            Time::from_internal_value(i64::MAX)
        } else {
            end
        };
        let limit = if max_results == 0 {
            -1
        } else {
            i64::try_from(max_results).unwrap_or(i64::MAX)
        };

        self.conn.query_rows(
            &format!(
                "SELECT {VISIT_COLUMNS} FROM visits WHERE visit_time >= ? AND visit_time < ?
                 ORDER BY visit_time DESC LIMIT ?"
            ),
            params![begin, end, limit],
            row_to_visit,
        )
    }

    /// Associate `segment_id` with a visit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the visit does not exist, or a database error.
    pub fn set_segment_id(&self, visit_id: VisitId, segment_id: SegmentId) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE visits SET segment_id = ? WHERE id = ?",
            params![segment_id, visit_id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("visit", visit_id.to_string()).into());
        }
        Ok(())
    }

    /// Segment of a visit: `None` when the visit does not exist, zero when
    /// it has no segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn segment_id(&self, visit_id: VisitId) -> Result<Option<SegmentId>> {
        Ok(self
            .conn
            .query_row(
                "SELECT segment_id FROM visits WHERE id = ?",
                [visit_id],
                |row| row.get::<_, Option<SegmentId>>(0),
            )?
            .map(|segment| segment.unwrap_or(0)))
    }

    /// Count all visits.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn visit_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?
            .unwrap_or(0))
    }

    /// Count visits strictly after `since` and at or before `until`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn visit_count_between(&self, since: Time, until: Time) -> Result<i64> {
        Ok(self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM visits WHERE visit_time > ? AND visit_time <= ?",
                params![since, until],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionOptions;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory(ConnectionOptions::default(), None).unwrap();
        VisitDatabase::attach(&conn).init_tables().unwrap();
        conn
    }

    fn at(value: i64) -> Time {
        Time::from_internal_value(value)
    }

    #[test]
    fn test_add_get_update() {
        let conn = setup();
        let visits = VisitDatabase::attach(&conn);

        let id = visits.add_visit(&VisitRow::new(1, at(100), 0)).unwrap();
        let mut visit = visits.visit_row(id).unwrap().unwrap();
        assert_eq!(visit.url_id, 1);
        assert_eq!(visit.segment_id, 0);
        assert_eq!(visit.referring_visit, 0);

        visit.visit_duration = 5_000_000;
        visits.update_visit_row(&visit).unwrap();
        assert_eq!(visits.visit_row(id).unwrap().unwrap().visit_duration, 5_000_000);

        assert!(visits.visit_row(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_delete_reconnects_referrers() {
        let conn = setup();
        let visits = VisitDatabase::attach(&conn);

        let first = visits.add_visit(&VisitRow::new(1, at(100), 0)).unwrap();
        let middle = visits
            .add_visit(&VisitRow::new(2, at(200), 0).with_referrer(first))
            .unwrap();
        let last = visits
            .add_visit(&VisitRow::new(3, at(300), 0).with_referrer(middle))
            .unwrap();

        visits.delete_visit(middle).unwrap();
        assert!(visits.visit_row(middle).unwrap().is_none());
        assert_eq!(visits.visit_row(last).unwrap().unwrap().referring_visit, first);
        assert!(visits.delete_visit(middle).is_err());
    }

    #[test]
    fn test_range_queries() {
        let conn = setup();
        let visits = VisitDatabase::attach(&conn);
        for t in [100, 200, 300, 400] {
            visits.add_visit(&VisitRow::new(1, at(t), 0)).unwrap();
        }

        let in_range = visits.visits_in_range(at(200), at(400), 0).unwrap();
        let times: Vec<i64> = in_range.iter().map(|v| v.visit_time.to_internal_value()).collect();
        assert_eq!(times, vec![300, 200]);

        let newest = visits.visits_in_range(at(0), Time::default(), 1).unwrap();
        assert_eq!(newest[0].visit_time, at(400));

        assert_eq!(visits.visits_for_url(1).unwrap().len(), 4);
        assert_eq!(visits.visit_count().unwrap(), 4);
        assert_eq!(visits.visit_count_between(at(100), at(300)).unwrap(), 2);
    }

    #[test]
    fn test_segment_id_column() {
        let conn = setup();
        let visits = VisitDatabase::attach(&conn);
        let id = visits.add_visit(&VisitRow::new(1, at(100), 0)).unwrap();

        assert_eq!(visits.segment_id(id).unwrap(), Some(0));
        visits.set_segment_id(id, 9).unwrap();
        assert_eq!(visits.segment_id(id).unwrap(), Some(9));

        assert_eq!(visits.segment_id(id + 1).unwrap(), None);
        assert!(visits.set_segment_id(id + 1, 9).is_err());
    }
}
