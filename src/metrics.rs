//! Prometheus gauges for history database size and activity.

use once_cell::sync::Lazy;
use prometheus::{register_int_gauge, IntGauge};
use serde::Serialize;

/// Size of the history file in whole megabytes.
pub static DATABASE_FILE_MB: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_database_file_mb", "History database file size in MB").unwrap()
});

/// Rows in `urls`.
pub static URL_TABLE_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_url_table_count", "Number of rows in the urls table").unwrap()
});

/// Rows in `visits`.
pub static VISIT_TABLE_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_visit_table_count", "Number of rows in the visits table")
        .unwrap()
});

/// Visits in the last 7 days.
pub static WEEKLY_VISIT_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_weekly_visit_count", "Visits in the last 7 days").unwrap()
});

/// Visits in the last 30 days.
pub static MONTHLY_VISIT_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_monthly_visit_count", "Visits in the last 30 days").unwrap()
});

/// URLs last visited in the last 7 days.
pub static WEEKLY_URL_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_weekly_url_count", "URLs visited in the last 7 days").unwrap()
});

/// Distinct hosts among URLs last visited in the last 7 days.
pub static WEEKLY_HOST_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_weekly_host_count", "Hosts visited in the last 7 days").unwrap()
});

/// URLs last visited in the last 30 days.
pub static MONTHLY_URL_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_monthly_url_count", "URLs visited in the last 30 days").unwrap()
});

/// Distinct hosts among URLs last visited in the last 30 days.
pub static MONTHLY_HOST_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("navhist_monthly_host_count", "Hosts visited in the last 30 days")
        .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*DATABASE_FILE_MB;
    let _ = &*URL_TABLE_COUNT;
    let _ = &*VISIT_TABLE_COUNT;
    let _ = &*WEEKLY_VISIT_COUNT;
    let _ = &*MONTHLY_VISIT_COUNT;
    let _ = &*WEEKLY_URL_COUNT;
    let _ = &*WEEKLY_HOST_COUNT;
    let _ = &*MONTHLY_URL_COUNT;
    let _ = &*MONTHLY_HOST_COUNT;

    tracing::debug!("Prometheus metrics initialized");
}

/// Size and activity figures for one history database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseMetrics {
    /// File size in whole megabytes.
    pub file_mb: i64,
    /// Rows in `urls`.
    pub url_count: i64,
    /// Rows in `visits`.
    pub visit_count: i64,
    /// Visits in the last 7 days.
    pub weekly_visit_count: i64,
    /// Visits in the last 30 days.
    pub monthly_visit_count: i64,
    /// URL and host figures; only gathered on a sample of runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedMetrics>,
}

/// URL and host counts over the last week and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdvancedMetrics {
    /// URLs last visited in the last 7 days.
    pub weekly_url_count: i64,
    /// Distinct hosts of those URLs.
    pub weekly_host_count: i64,
    /// URLs last visited in the last 30 days.
    pub monthly_url_count: i64,
    /// Distinct hosts of those URLs.
    pub monthly_host_count: i64,
}

impl DatabaseMetrics {
    /// Copy these figures into the process-wide gauges.
    pub fn publish(&self) {
        DATABASE_FILE_MB.set(self.file_mb);
        URL_TABLE_COUNT.set(self.url_count);
        VISIT_TABLE_COUNT.set(self.visit_count);
        WEEKLY_VISIT_COUNT.set(self.weekly_visit_count);
        MONTHLY_VISIT_COUNT.set(self.monthly_visit_count);

        if let Some(advanced) = self.advanced {
            WEEKLY_URL_COUNT.set(advanced.weekly_url_count);
            WEEKLY_HOST_COUNT.set(advanced.weekly_host_count);
            MONTHLY_URL_COUNT.set(advanced.monthly_url_count);
            MONTHLY_HOST_COUNT.set(advanced.monthly_host_count);
        }
    }
}
