//! navhist - navigation history store
//!
//! Command-line entry point for inspecting and maintaining a history file.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use clap::{Parser, Subcommand};
use navhist::metrics::init_metrics;
use navhist::observability::{init_tracing, TracingConfig};
use navhist::{Config, Error, HistoryDatabase, Result};

/// navhist - navigation history store
#[derive(Parser, Debug)]
#[command(name = "navhist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the history database
    #[arg(short, long, env = "NAVHIST_DATA_DIR", default_value = "./data")]
    data_dir: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NAVHIST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "NAVHIST_LOG_JSON")]
    log_json: bool,

    /// Page cache size, in pages
    #[arg(long, env = "NAVHIST_CACHE_SIZE", default_value = "1000")]
    cache_size: i64,

    /// Page size in bytes for new files
    #[arg(long, env = "NAVHIST_PAGE_SIZE", default_value = "4096")]
    page_size: u32,

    /// Hold an exclusive lock on the file while running
    #[arg(long, env = "NAVHIST_EXCLUSIVE")]
    exclusive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the history file
    Init,
    /// Print size and activity metrics as JSON
    Info,
    /// Rebuild the file to release free pages
    Vacuum,
    /// Release page cache memory
    Trim {
        /// Shrink the cache as far as possible
        #[arg(long)]
        aggressive: bool,
    },
    /// Empty the file, then recreate an empty schema
    Raze,
    /// Keep URLs, drop visits, segments and search terms
    ClearHistory,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    tracing::info!("navhist v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        data_dir: cli.data_dir,
        log_level: cli.log_level,
        log_json: cli.log_json,
        cache_size: cli.cache_size,
        page_size: cli.page_size,
        exclusive: cli.exclusive,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    let path = config.database_path();
    let mut db = HistoryDatabase::builder()
        .options(config.connection_options())
        .error_callback(|code, sql| {
            tracing::error!(code, sql = sql.unwrap_or_default(), "SQLite error");
        })
        .init(&path)
        .map_err(|e| {
            tracing::error!(status = ?e.init_status(), path = %path.display(), "Could not open history");
            e
        })?;

    if config.exclusive {
        db.begin_exclusive_mode()?;
    }

    match cli.command {
        Command::Init => {
            tracing::info!(
                version = HistoryDatabase::current_version(),
                migrated_epoch = db.needs_version_17_migration(),
                "History database initialized"
            );
        }
        Command::Info => {
            init_metrics();
            let metrics = db
                .compute_database_metrics(&path)
                .ok_or_else(|| Error::internal("could not compute database metrics"))?;
            let json = serde_json::to_string_pretty(&metrics)
                .map_err(|e| Error::internal(format!("failed to encode metrics: {e}")))?;
            println!("{json}");
        }
        Command::Vacuum => db.vacuum(),
        Command::Trim { aggressive } => db.trim_memory(aggressive),
        Command::Raze => {
            db.raze()?;
            drop(db);
            HistoryDatabase::builder()
                .options(config.connection_options())
                .init(&path)?;
            tracing::info!(path = %path.display(), "History database razed and recreated");
        }
        Command::ClearHistory => {
            clear_history(&db)?;
            db.vacuum();
        }
    }

    Ok(())
}

/// Swap the URL table through its temporary copy, then recreate the rest.
fn clear_history(db: &HistoryDatabase) -> Result<()> {
    db.with_transaction(|db| {
        let urls = db.urls();
        urls.create_temporary_url_table()?;
        for row in urls.all_urls()? {
            urls.add_temporary_url(&row)?;
        }
        urls.commit_temporary_url_table()?;
        db.recreate_all_tables_but_url()
    })?;

    tracing::info!("History cleared");
    Ok(())
}
