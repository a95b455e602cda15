//! The history database: one `SQLite` file holding URLs, visits, segments
//! and downloads.
//!
//! A [`HistoryDatabase`] is obtained from [`HistoryDatabase::builder`]; a
//! failed init yields no instance. It owns the connection, composes the
//! table facets, drives migration and exposes maintenance operations.
//! It is `Send` but not `Sync`: use it from one thread at a time, or hand it
//! to a [`HistoryThread`].

mod migration;
mod thread;

use std::cell::Cell;
use std::collections::HashSet;
use std::ops::Deref;
use std::path::Path;

use chrono::Duration;
use rand::Rng;

use crate::metrics::{AdvancedMetrics, DatabaseMetrics};
use crate::observability::spans;
use crate::storage::{
    Connection, ConnectionOptions, DownloadDatabase, ErrorCallback, MetaTable, SegmentId,
    TableFacet, Time, UrlDatabase, VisitDatabase, VisitId, VisitSegmentDatabase, SCHEMA_VERSION,
};
use crate::Result;

pub use migration::MigrationReport;
pub use thread::HistoryThread;

const EARLY_EXPIRATION_THRESHOLD_KEY: &str = "early_expiration_threshold";

/// Builder collecting everything needed before a history file is opened.
#[derive(Default)]
pub struct HistoryDatabaseBuilder {
    options: ConnectionOptions,
    error_callback: Option<ErrorCallback>,
}

impl HistoryDatabaseBuilder {
    /// Connection settings applied on open.
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Callback invoked with the extended `SQLite` error code and the
    /// failing statement whenever a statement fails.
    #[must_use]
    pub fn error_callback(mut self, callback: impl Fn(i32, Option<&str>) + Send + 'static) -> Self {
        self.error_callback = Some(Box::new(callback));
        self
    }

    /// Open (creating if needed) the history file at `path` and bring it to
    /// the current schema.
    ///
    /// All of init runs in one transaction: a file that is rejected or
    /// fails to migrate is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `TooNew`/`TooOld` for unsupported versions, or the open,
    /// migration or table creation error. Use [`crate::Error::init_status`]
    /// to classify it.
    pub fn init(self, path: impl AsRef<Path>) -> Result<HistoryDatabase> {
        let path = path.as_ref();
        let span = spans::db_span("init", "*");
        let _guard = span.enter();

        let conn = Connection::open(path, self.options, self.error_callback)?;
        HistoryDatabase::from_connection(conn)
    }

    /// Same as [`Self::init`] on a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn init_in_memory(self) -> Result<HistoryDatabase> {
        let conn = Connection::open_in_memory(self.options, self.error_callback)?;
        HistoryDatabase::from_connection(conn)
    }
}

impl std::fmt::Debug for HistoryDatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryDatabaseBuilder")
            .field("options", &self.options)
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}

/// An initialized history database.
#[derive(Debug)]
pub struct HistoryDatabase {
    conn: Connection,
    cached_early_expiration_threshold: Cell<Option<Time>>,
    needs_version_17_migration: bool,
}

impl HistoryDatabase {
    /// Start building a database.
    #[must_use]
    pub fn builder() -> HistoryDatabaseBuilder {
        HistoryDatabaseBuilder::default()
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let mut db = Self {
            conn,
            cached_early_expiration_threshold: Cell::new(None),
            needs_version_17_migration: false,
        };

        db.conn.begin_transaction()?;
        let report = match db.init_schema() {
            Ok(report) => report,
            Err(e) => {
                db.conn.rollback_transaction();
                tracing::warn!(path = %db.conn.path(), error = %e, "History database init failed");
                return Err(e);
            }
        };
        db.conn.commit_transaction()?;

        db.needs_version_17_migration = report.epoch_shifted;
        tracing::info!(
            path = %db.conn.path(),
            version = SCHEMA_VERSION,
            created = report.created,
            from_version = report.from_version,
            "History database ready"
        );
        Ok(db)
    }

    fn init_schema(&self) -> Result<MigrationReport> {
        let report = migration::ensure_current_version(self.connection())?;
        migration::init_all_facets(self.connection())?;
        // Anything still in progress belongs to a session that is gone.
        self.downloads().clean_up_in_progress_entries()?;
        Ok(report)
    }

    /// Bring the schema to the current version. A no-op on a database that
    /// is already current, which is always the case after init.
    ///
    /// # Errors
    ///
    /// Returns `TooNew`/`TooOld`, or the error of the failing step; the
    /// transaction is rolled back.
    pub fn ensure_current_version(&mut self) -> Result<()> {
        self.begin_transaction()?;
        let report = match migration::ensure_current_version(self.connection()) {
            Ok(report) => report,
            Err(e) => {
                self.rollback_transaction();
                return Err(e);
            }
        };
        self.commit_transaction()?;

        self.needs_version_17_migration |= report.epoch_shifted;
        Ok(())
    }

    /// Schema version this build writes.
    #[must_use]
    pub const fn current_version() -> i32 {
        SCHEMA_VERSION
    }

    /// Whether init shifted stored times from the Unix epoch to the 1601
    /// epoch. Dependent stores keyed on the old times need the same fix.
    #[must_use]
    pub const fn needs_version_17_migration(&self) -> bool {
        self.needs_version_17_migration
    }

    // ========== Facets ==========

    /// URL and keyword search term tables.
    #[must_use]
    pub fn urls(&self) -> UrlDatabase<'_> {
        UrlDatabase::attach(&self.conn)
    }

    /// Visit table.
    #[must_use]
    pub fn visits(&self) -> VisitDatabase<'_> {
        VisitDatabase::attach(&self.conn)
    }

    /// Segment tables.
    #[must_use]
    pub fn segments(&self) -> VisitSegmentDatabase<'_> {
        VisitSegmentDatabase::attach(&self.conn)
    }

    /// Download tables.
    #[must_use]
    pub fn downloads(&self) -> DownloadDatabase<'_> {
        DownloadDatabase::attach(&self.conn)
    }

    /// The `meta` key/value table.
    #[must_use]
    pub const fn meta(&self) -> MetaTable<'_> {
        MetaTable::attach(&self.conn)
    }

    /// Underlying connection, for fixtures that need raw SQL.
    #[must_use]
    pub(crate) const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path the database was opened from.
    #[must_use]
    pub fn path(&self) -> &str {
        self.conn.path()
    }

    // ========== Transactions ==========

    /// Begin a (possibly nested) transaction.
    ///
    /// # Errors
    ///
    /// Fails while an inner rollback is pending, or if `BEGIN` fails.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.begin_transaction()
    }

    /// Commit the innermost transaction. Only the outermost commit reaches
    /// disk.
    ///
    /// # Errors
    ///
    /// Fails without an open transaction, when the chain was rolled back,
    /// or if `COMMIT` fails.
    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.commit_transaction()
    }

    /// Roll back. Inside a nested chain this dooms the whole chain.
    pub fn rollback_transaction(&self) {
        self.conn.rollback_transaction();
    }

    /// Number of open nested transactions.
    #[must_use]
    pub fn transaction_nesting(&self) -> usize {
        self.conn.transaction_nesting()
    }

    /// Run `f` inside a transaction that is committed on every exit path,
    /// including when `f` returns an error. The closure's error is returned
    /// in preference to a commit error.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the begin/commit error.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.begin_transaction()?;
        let result = f(self);
        let committed = self.commit_transaction();

        match result {
            Ok(value) => committed.map(|()| value),
            Err(e) => {
                if let Err(commit_err) = committed {
                    tracing::warn!(error = %commit_err, "Commit after failed scope also failed");
                }
                Err(e)
            }
        }
    }

    // ========== Maintenance ==========

    /// Switch the connection to exclusive locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma fails.
    pub fn begin_exclusive_mode(&self) -> Result<()> {
        self.conn.set_exclusive_locking()
    }

    /// Drop and recreate every table except the URL and download tables.
    ///
    /// Used after swapping in a temporary URL table. On error the schema is
    /// in an unknown state and the database should not be used further.
    ///
    /// # Errors
    ///
    /// Returns the first drop or create error.
    pub fn recreate_all_tables_but_url(&self) -> Result<()> {
        let span = spans::db_span("recreate", "*");
        let _guard = span.enter();

        let visits = self.visits();
        visits.drop_tables()?;
        visits.init_tables()?;

        let urls = self.urls();
        urls.drop_keyword_search_terms_table()?;
        urls.init_keyword_search_terms_table()?;

        let segments = self.segments();
        segments.drop_tables()?;
        segments.init_tables()?;

        urls.create_supplementary_indices()?;
        tracing::info!("Recreated all tables but urls");
        Ok(())
    }

    /// Best-effort `VACUUM`. Skipped inside a transaction.
    pub fn vacuum(&self) {
        let span = spans::db_span("vacuum", "*");
        let _guard = span.enter();

        if self.transaction_nesting() > 0 {
            tracing::warn!(
                nesting = self.transaction_nesting(),
                "Skipping vacuum inside a transaction"
            );
            return;
        }
        if let Err(e) = self.conn.vacuum() {
            tracing::warn!(error = %e, "Vacuum failed");
        }
    }

    /// Release page cache memory.
    pub fn trim_memory(&self, aggressively: bool) {
        self.conn.trim_memory(aggressively);
    }

    /// Empty the file, keeping it in place. The schema is gone afterwards:
    /// reopen through [`Self::builder`] before further use.
    ///
    /// # Errors
    ///
    /// Fails inside a transaction or while another connection holds a lock.
    pub fn raze(&mut self) -> Result<()> {
        let span = spans::db_span("raze", "*");
        let _guard = span.enter();

        self.conn.raze()?;
        self.cached_early_expiration_threshold.set(None);
        self.needs_version_17_migration = false;
        Ok(())
    }

    // ========== Segments ==========

    /// Associate a visit with a segment. `false` when the visit does not
    /// exist or the write fails.
    #[must_use]
    pub fn set_segment_id(&self, visit_id: VisitId, segment_id: SegmentId) -> bool {
        match self.visits().set_segment_id(visit_id, segment_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(visit_id, segment_id, error = %e, "Could not set segment id");
                false
            }
        }
    }

    /// Segment of a visit; zero when the visit is missing, has no segment,
    /// or cannot be read.
    #[must_use]
    pub fn get_segment_id(&self, visit_id: VisitId) -> SegmentId {
        self.visits()
            .segment_id(visit_id)
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    // ========== Early expiration ==========

    /// Time before which history may be expired early. Read once from the
    /// `meta` table and cached; defaults to just after the null time.
    #[must_use]
    pub fn early_expiration_threshold(&self) -> Time {
        if let Some(threshold) = self.cached_early_expiration_threshold.get() {
            return threshold;
        }

        let value = match self.meta().value(EARLY_EXPIRATION_THRESHOLD_KEY) {
            Ok(value) => value.unwrap_or(1),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read early expiration threshold");
                1
            }
        };
        let threshold = Time::from_internal_value(value);
        self.cached_early_expiration_threshold.set(Some(threshold));
        threshold
    }

    /// Persist a new early expiration threshold, then cache it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the cache is left unchanged.
    pub fn update_early_expiration_threshold(&self, threshold: Time) -> Result<()> {
        self.meta()
            .set_value(EARLY_EXPIRATION_THRESHOLD_KEY, threshold.to_internal_value())?;
        self.cached_early_expiration_threshold.set(Some(threshold));
        Ok(())
    }

    // ========== Metrics ==========

    /// Gather size and activity figures for the file at `history_path`,
    /// publish them to the Prometheus gauges and log them. URL and host
    /// counts are only gathered on one run in three.
    ///
    /// Returns `None` (after logging) if anything cannot be read.
    pub fn compute_database_metrics(&self, history_path: &Path) -> Option<DatabaseMetrics> {
        let include_advanced = rand::thread_rng().gen_ratio(1, 3);
        match self.collect_metrics(history_path, include_advanced) {
            Ok(metrics) => {
                metrics.publish();
                tracing::info!(
                    file_mb = metrics.file_mb,
                    url_count = metrics.url_count,
                    visit_count = metrics.visit_count,
                    weekly_visit_count = metrics.weekly_visit_count,
                    monthly_visit_count = metrics.monthly_visit_count,
                    advanced = metrics.advanced.is_some(),
                    "History database metrics"
                );
                Some(metrics)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not compute database metrics");
                None
            }
        }
    }

    pub(crate) fn collect_metrics(
        &self,
        history_path: &Path,
        include_advanced: bool,
    ) -> Result<DatabaseMetrics> {
        let file_size = std::fs::metadata(history_path)?.len();
        let file_mb = i64::try_from(file_size / (1024 * 1024)).unwrap_or(i64::MAX);

        let now = Time::now();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);
        let unbounded = Time::from_internal_value(i64::MAX);

        let visits = self.visits();
        let weekly_visit_count = visits.visit_count_between(week_ago, unbounded)?;
        let monthly_visit_count =
            visits.visit_count_between(month_ago, week_ago)? + weekly_visit_count;

        let advanced = if include_advanced {
            Some(self.collect_advanced_metrics(week_ago, month_ago)?)
        } else {
            None
        };

        Ok(DatabaseMetrics {
            file_mb,
            url_count: self.urls().url_count()?,
            visit_count: visits.visit_count()?,
            weekly_visit_count,
            monthly_visit_count,
            advanced,
        })
    }

    fn collect_advanced_metrics(&self, week_ago: Time, month_ago: Time) -> Result<AdvancedMetrics> {
        let mut weekly_urls = 0_i64;
        let mut monthly_urls = 0_i64;
        let mut weekly_hosts = HashSet::new();
        let mut monthly_hosts = HashSet::new();

        for row in self.urls().urls_visited_since(month_ago)? {
            let host = url::Url::parse(&row.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();

            monthly_urls += 1;
            if row.last_visit > week_ago {
                weekly_urls += 1;
                weekly_hosts.insert(host.clone());
            }
            monthly_hosts.insert(host);
        }

        Ok(AdvancedMetrics {
            weekly_url_count: weekly_urls,
            weekly_host_count: i64::try_from(weekly_hosts.len()).unwrap_or(i64::MAX),
            monthly_url_count: monthly_urls,
            monthly_host_count: i64::try_from(monthly_hosts.len()).unwrap_or(i64::MAX),
        })
    }
}

/// Guard form of [`HistoryDatabase::with_transaction`]: begins a
/// transaction on creation and commits it when dropped.
#[derive(Debug)]
pub struct TransactionScoper<'a> {
    db: &'a HistoryDatabase,
    began: bool,
}

impl<'a> TransactionScoper<'a> {
    /// Begin a transaction on `db`. A failed begin is logged and the guard
    /// then commits nothing.
    #[must_use]
    pub fn new(db: &'a HistoryDatabase) -> Self {
        let began = match db.begin_transaction() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Scoped transaction could not begin");
                false
            }
        };
        Self { db, began }
    }
}

impl Deref for TransactionScoper<'_> {
    type Target = HistoryDatabase;

    fn deref(&self) -> &HistoryDatabase {
        self.db
    }
}

impl Drop for TransactionScoper<'_> {
    fn drop(&mut self) {
        if !self.began {
            return;
        }
        if let Err(e) = self.db.commit_transaction() {
            tracing::warn!(error = %e, "Scoped transaction commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DownloadRow, DownloadState, UrlRow, VisitRow};
    use crate::Error;
    use tempfile::TempDir;

    fn setup() -> HistoryDatabase {
        HistoryDatabase::builder().init_in_memory().unwrap()
    }

    fn add_visit(db: &HistoryDatabase, url: &str, when: Time) -> VisitId {
        let url_id = match db.urls().row_for_url(url).unwrap() {
            Some(row) => row.id,
            None => db
                .urls()
                .add_url(&UrlRow::new(url).with_visits(1, when))
                .unwrap(),
        };
        db.visits().add_visit(&VisitRow::new(url_id, when, 0)).unwrap()
    }

    #[test]
    fn test_current_version() {
        let db = setup();
        assert_eq!(HistoryDatabase::current_version(), 28);
        assert_eq!(db.meta().version_number().unwrap(), 28);
        assert!(!db.needs_version_17_migration());
        assert_eq!(db.transaction_nesting(), 0);
    }

    #[test]
    fn test_ensure_current_version_idempotent() {
        let mut db = setup();
        db.ensure_current_version().unwrap();
        db.ensure_current_version().unwrap();
        assert_eq!(db.meta().version_number().unwrap(), 28);
        assert_eq!(db.transaction_nesting(), 0);
    }

    #[test]
    fn test_segment_id_round_trip() {
        let db = setup();
        let visit = add_visit(&db, "http://example.com/", Time::now());

        assert_eq!(db.get_segment_id(visit), 0);
        assert!(db.set_segment_id(visit, 12));
        assert_eq!(db.get_segment_id(visit), 12);

        assert!(!db.set_segment_id(visit + 100, 12));
        assert_eq!(db.get_segment_id(visit + 100), 0);
    }

    #[test]
    fn test_early_expiration_threshold() {
        let db = setup();
        assert_eq!(db.early_expiration_threshold(), Time::from_internal_value(1));

        let threshold = Time::now();
        db.update_early_expiration_threshold(threshold).unwrap();
        assert_eq!(db.early_expiration_threshold(), threshold);
        assert_eq!(
            db.meta().value(EARLY_EXPIRATION_THRESHOLD_KEY).unwrap(),
            Some(threshold.to_internal_value())
        );
    }

    #[test]
    fn test_early_expiration_threshold_is_cached() {
        let db = setup();
        let first = db.early_expiration_threshold();

        db.meta()
            .set_value(EARLY_EXPIRATION_THRESHOLD_KEY, 999)
            .unwrap();
        assert_eq!(db.early_expiration_threshold(), first);
    }

    #[test]
    fn test_with_transaction_commits_on_error() {
        let db = setup();

        let result: Result<()> = db.with_transaction(|db| {
            db.urls().add_url(&UrlRow::new("http://kept.example/"))?;
            Err(Error::internal("caller gave up"))
        });

        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(db.transaction_nesting(), 0);
        assert!(db.urls().row_for_url("http://kept.example/").unwrap().is_some());
    }

    #[test]
    fn test_with_transaction_nests() {
        let db = setup();
        let id = db
            .with_transaction(|outer| {
                assert_eq!(outer.transaction_nesting(), 1);
                outer.with_transaction(|inner| {
                    assert_eq!(inner.transaction_nesting(), 2);
                    inner.urls().add_url(&UrlRow::new("http://nested.example/"))
                })
            })
            .unwrap();

        assert_eq!(db.transaction_nesting(), 0);
        assert!(db.urls().url_row(id).unwrap().is_some());
    }

    #[test]
    fn test_transaction_scoper() {
        let db = setup();
        {
            let scoped = TransactionScoper::new(&db);
            assert_eq!(scoped.transaction_nesting(), 1);
            scoped.urls().add_url(&UrlRow::new("http://scoped.example/")).unwrap();
        }
        assert_eq!(db.transaction_nesting(), 0);
        assert_eq!(db.urls().url_count().unwrap(), 1);
    }

    #[test]
    fn test_recreate_all_tables_but_url() {
        let db = setup();
        let visit = add_visit(&db, "http://example.com/", Time::from_internal_value(5_000));
        let url_id = db.visits().visit_row(visit).unwrap().unwrap().url_id;
        db.urls()
            .add_url(
                &UrlRow::new("http://other.example/")
                    .with_title("Other")
                    .with_visits(3, Time::from_internal_value(7_000))
                    .with_typed_count(2),
            )
            .unwrap();
        db.urls()
            .set_keyword_search_terms_for_url(url_id, 1, "Example")
            .unwrap();
        let segment = db.segments().create_segment(url_id, "http://example.com/").unwrap();
        db.segments()
            .increase_segment_visit_count(segment, Time::now(), 1)
            .unwrap();
        let mut download = DownloadRow::new(1, "/tmp/a", "http://example.com/a")
            .with_state(DownloadState::Complete);
        download.url_chain.push("http://cdn.example.com/a".to_string());
        download.etag = "\"v1\"".to_string();
        download.referrer = "http://example.com/".to_string();
        db.downloads().create_download(&download).unwrap();

        let urls_before = db.urls().all_urls().unwrap();
        let downloads_before = db.downloads().query_downloads().unwrap();

        db.recreate_all_tables_but_url().unwrap();

        assert_eq!(db.urls().all_urls().unwrap(), urls_before);
        assert_eq!(db.downloads().query_downloads().unwrap(), downloads_before);
        assert_eq!(downloads_before, vec![download]);
        assert_eq!(db.visits().visit_count().unwrap(), 0);
        assert!(db.urls().keyword_search_terms_for_url(url_id).unwrap().is_empty());
        assert_eq!(db.segments().segment_named("http://example.com/").unwrap(), None);
    }

    #[test]
    fn test_downloads_started_this_session_stay_in_progress() {
        let db = setup();
        assert!(db.downloads().query_downloads().unwrap().is_empty());

        db.downloads()
            .create_download(&DownloadRow::new(1, "/tmp/live.iso", "http://example.com/live.iso"))
            .unwrap();

        let first = db.downloads().query_downloads().unwrap();
        assert_eq!(first[0].state, DownloadState::InProgress);
        assert_eq!(first[0].interrupt_reason, crate::storage::INTERRUPT_REASON_NONE);

        db.recreate_all_tables_but_url().unwrap();
        assert_eq!(db.downloads().query_downloads().unwrap(), first);
    }

    #[test]
    fn test_vacuum_inside_transaction_is_skipped() {
        let db = setup();
        db.begin_transaction().unwrap();
        db.vacuum();
        db.commit_transaction().unwrap();
        db.vacuum();
        db.trim_memory(true);
    }

    #[test]
    fn test_collect_metrics() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");
        let db = HistoryDatabase::builder().init(&path).unwrap();

        let now = Time::now();
        add_visit(&db, "http://a.example/one", now);
        add_visit(&db, "http://a.example/two", now - Duration::days(2));
        add_visit(&db, "http://b.example/", now - Duration::days(20));
        add_visit(&db, "http://c.example/", now - Duration::days(90));

        let metrics = db.collect_metrics(&path, true).unwrap();
        assert_eq!(metrics.url_count, 4);
        assert_eq!(metrics.visit_count, 4);
        assert_eq!(metrics.weekly_visit_count, 2);
        assert_eq!(metrics.monthly_visit_count, 3);
        assert_eq!(
            metrics.advanced,
            Some(AdvancedMetrics {
                weekly_url_count: 2,
                weekly_host_count: 1,
                monthly_url_count: 3,
                monthly_host_count: 2,
            })
        );

        let basic = db.collect_metrics(&path, false).unwrap();
        assert!(basic.advanced.is_none());
    }

    #[test]
    fn test_metrics_missing_file() {
        let db = setup();
        assert!(db
            .compute_database_metrics(Path::new("/nonexistent/History"))
            .is_none());
    }

    #[test]
    fn test_raze_then_reinit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");

        let mut db = HistoryDatabase::builder().init(&path).unwrap();
        add_visit(&db, "http://example.com/", Time::now());
        db.raze().unwrap();
        assert!(!db.connection().does_table_exist("urls").unwrap());
        drop(db);

        let db = HistoryDatabase::builder().init(&path).unwrap();
        assert_eq!(db.meta().version_number().unwrap(), 28);
        assert_eq!(db.urls().url_count().unwrap(), 0);
    }

    #[test]
    fn test_raze_refused_in_transaction() {
        let mut db = setup();
        db.begin_transaction().unwrap();
        assert!(db.raze().is_err());
        db.commit_transaction().unwrap();
    }
}
