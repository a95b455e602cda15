//! Configuration management for navhist.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`NAVHIST_*`)
//! - Built-in defaults

mod settings;

pub use settings::Config;
