//! `SQLite` storage for navigation history.
//!
//! This module provides:
//! - A connection wrapper with nested transactions and an error callback
//! - The `meta` key/value table holding schema versions
//! - One facet per group of tables: URLs, visits, segments, downloads
//! - The on-disk timestamp type

mod connection;
mod download;
mod meta_table;
mod models;
mod schema;
mod segment;
mod time;
mod url;
mod visit;

pub use connection::{Connection, ConnectionOptions, ErrorCallback};
pub use download::DownloadDatabase;
pub use meta_table::MetaTable;
pub use models::{
    DownloadId, DownloadRow, DownloadState, KeywordId, KeywordSearchTermRow, PageUsageData,
    SegmentId, UrlId, UrlRow, VisitId, VisitRow, DANGER_TYPE_NOT_DANGEROUS,
    INTERRUPT_REASON_CRASH, INTERRUPT_REASON_NONE,
};
pub use schema::{TableFacet, COMPATIBLE_VERSION, OLDEST_MIGRATABLE_VERSION, SCHEMA_VERSION};
pub use segment::VisitSegmentDatabase;
pub use time::{Time, EPOCH_DELTA_MICROS};
pub use url::UrlDatabase;
pub use visit::VisitDatabase;
