//! navhist library
//!
//! Transactional, versioned `SQLite` storage for browser navigation history:
//! URLs, visits, visit segments and downloads in one file, migrated forward
//! from any supported schema version on open.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod observability;
pub mod storage;

pub use config::Config;
pub use error::{Error, InitStatus, Result, StorageError};
pub use history::{HistoryDatabase, HistoryDatabaseBuilder, HistoryThread, TransactionScoper};
