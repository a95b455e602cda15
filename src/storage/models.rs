//! Data models for storage operations.
//!
//! This module defines the rows stored by each table facet:
//! - URLs and their keyword search terms
//! - Visits
//! - Segment usage results
//! - Downloads

use serde::{Deserialize, Serialize};

use super::time::Time;

/// Row id in `urls`.
pub type UrlId = i64;
/// Row id in `visits`.
pub type VisitId = i64;
/// Row id in `segments`. Zero means "no segment".
pub type SegmentId = i64;
/// Id of a search keyword (template).
pub type KeywordId = i64;
/// Row id in `downloads`.
pub type DownloadId = i64;

/// A URL with its aggregate visit statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRow {
    /// Database primary key; zero until stored.
    pub id: UrlId,

    /// The full URL.
    pub url: String,

    /// Page title.
    pub title: String,

    /// Number of visits.
    pub visit_count: i32,

    /// Number of times the URL was typed.
    pub typed_count: i32,

    /// Time of the most recent visit.
    pub last_visit: Time,

    /// Hidden rows are not shown in history UI.
    pub hidden: bool,
}

impl UrlRow {
    /// Create an unsaved row for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            title: String::new(),
            visit_count: 0,
            typed_count: 0,
            last_visit: Time::default(),
            hidden: false,
        }
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set visit statistics.
    #[must_use]
    pub const fn with_visits(mut self, visit_count: i32, last_visit: Time) -> Self {
        self.visit_count = visit_count;
        self.last_visit = last_visit;
        self
    }

    /// Set the typed count.
    #[must_use]
    pub const fn with_typed_count(mut self, typed_count: i32) -> Self {
        self.typed_count = typed_count;
        self
    }
}

/// A single visit to a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRow {
    /// Database primary key; zero until stored.
    pub id: VisitId,

    /// The visited URL.
    pub url_id: UrlId,

    /// When the visit happened.
    pub visit_time: Time,

    /// Visit this one was navigated from, or zero.
    pub referring_visit: VisitId,

    /// Page transition bitmask.
    pub transition: i32,

    /// Segment this visit counts toward, or zero.
    pub segment_id: SegmentId,

    /// Time spent on the page, in microseconds.
    pub visit_duration: i64,
}

impl VisitRow {
    /// Create an unsaved visit.
    #[must_use]
    pub const fn new(url_id: UrlId, visit_time: Time, transition: i32) -> Self {
        Self {
            id: 0,
            url_id,
            visit_time,
            referring_visit: 0,
            transition,
            segment_id: 0,
            visit_duration: 0,
        }
    }

    /// Set the referring visit.
    #[must_use]
    pub const fn with_referrer(mut self, referring_visit: VisitId) -> Self {
        self.referring_visit = referring_visit;
        self
    }
}

/// A search term entered for a keyword, attached to the resulting URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSearchTermRow {
    /// Keyword the term was entered for.
    pub keyword_id: KeywordId,

    /// URL the search landed on.
    pub url_id: UrlId,

    /// The term as typed.
    pub term: String,
}

/// Aggregated usage of one segment, as returned by segment queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUsageData {
    /// Segment id.
    pub segment_id: SegmentId,

    /// Representative URL.
    pub url: String,

    /// Representative title.
    pub title: String,

    /// Recency-weighted score; higher is more used.
    pub score: f64,
}

/// State of a download as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Download was still running when last written.
    InProgress,
    /// Download finished.
    Complete,
    /// Download was cancelled.
    Cancelled,
    /// Download stopped with an interrupt reason.
    Interrupted,
}

impl DownloadState {
    /// On-disk value of a state written by a release with a state-mapping bug.
    pub const LEGACY_BUG_VALUE: i32 = 3;

    /// Convert state to its on-disk value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::InProgress => 0,
            Self::Complete => 1,
            Self::Cancelled => 2,
            Self::Interrupted => 4,
        }
    }

    /// Parse the on-disk value.
    #[must_use]
    pub const fn parse(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::InProgress),
            1 => Some(Self::Complete),
            2 => Some(Self::Cancelled),
            4 => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// Interrupt reason meaning "not interrupted".
pub const INTERRUPT_REASON_NONE: i32 = 0;
/// Interrupt reason for downloads cut short by a crash or shutdown.
pub const INTERRUPT_REASON_CRASH: i32 = 50;
/// Danger type meaning "not dangerous".
pub const DANGER_TYPE_NOT_DANGEROUS: i32 = 0;

/// Persistent metadata for one download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRow {
    /// Database primary key.
    pub id: DownloadId,

    /// Where the bytes currently are (possibly an intermediate file).
    pub current_path: String,

    /// Where the file will end up.
    pub target_path: String,

    /// Redirect chain; the last entry is the final URL.
    pub url_chain: Vec<String>,

    /// Referrer URL.
    pub referrer: String,

    /// When the download started.
    pub start_time: Time,

    /// When the download ended, or null.
    pub end_time: Time,

    /// Bytes received so far.
    pub received_bytes: i64,

    /// Expected size, or zero when unknown.
    pub total_bytes: i64,

    /// Download state.
    pub state: DownloadState,

    /// Danger classification.
    pub danger_type: i32,

    /// Why the download was interrupted.
    pub interrupt_reason: i32,

    /// Whether the user opened the file.
    pub opened: bool,

    /// Id of the extension that started the download.
    pub by_ext_id: String,

    /// Name of the extension that started the download.
    pub by_ext_name: String,

    /// HTTP `ETag` of the resource.
    pub etag: String,

    /// HTTP `Last-Modified` of the resource.
    pub last_modified: String,
}

impl DownloadRow {
    /// Create an in-progress download for a single URL.
    #[must_use]
    pub fn new(id: DownloadId, target_path: impl Into<String>, url: impl Into<String>) -> Self {
        let target_path = target_path.into();
        Self {
            id,
            current_path: target_path.clone(),
            target_path,
            url_chain: vec![url.into()],
            referrer: String::new(),
            start_time: Time::now(),
            end_time: Time::default(),
            received_bytes: 0,
            total_bytes: 0,
            state: DownloadState::InProgress,
            danger_type: DANGER_TYPE_NOT_DANGEROUS,
            interrupt_reason: INTERRUPT_REASON_NONE,
            opened: false,
            by_ext_id: String::new(),
            by_ext_name: String::new(),
            etag: String::new(),
            last_modified: String::new(),
        }
    }

    /// Set the state.
    #[must_use]
    pub const fn with_state(mut self, state: DownloadState) -> Self {
        self.state = state;
        self
    }
}
