pub mod config;
pub mod dates;
pub mod db {
    pub mod connection;
    pub mod models;
    pub mod postgres;
}
pub mod env_file;
pub mod event;
pub mod mapping;
pub mod pipeline;
pub mod schema;
pub mod secrets;
pub mod spreadsheet;
pub mod table;
pub mod warehouse;
pub mod services {
    pub mod deploy;
    pub mod ingest;
    pub mod refresh;
    pub mod staging;
    pub mod upsert;
}
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::db::postgres::UpsertStrategy;
use crate::event::{Event, Outcome};
use crate::pipeline::Context;
use clap::{Args, Parser, Subcommand};
use http::StatusCode;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// Spreadsheet-to-warehouse ETL for laundry production metrics.
#[derive(Debug, Parser)]
#[command(name = "laundry-etl", version)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Trigger payload as JSON; `-` reads stdin
    #[arg(long, global = true, value_name = "PATH")]
    event: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create tables, staging tables and upsert routines
    DeploySchema,
    /// Read a workbook and append its rows to the staging tables
    Ingest(IngestArgs),
    /// Merge every staging table into its main table
    Upsert(UpsertArgs),
    /// Request a refresh of the reporting dataset
    Refresh,
    /// Ingest, upsert and refresh in one go
    Run {
        #[command(flatten)]
        ingest: IngestArgs,
        #[command(flatten)]
        upsert: UpsertArgs,
    },
}

#[derive(Debug, Args)]
struct IngestArgs {
    /// Workbook to read; defaults to the event's input_path
    path: Option<PathBuf>,
    /// Worksheet name; defaults to the first sheet
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Debug, Args)]
struct UpsertArgs {
    /// Merge through the database-side routines
    #[arg(long)]
    routines: bool,
}

impl UpsertArgs {
    fn strategy(&self) -> UpsertStrategy {
        if self.routines {
            UpsertStrategy::Routines
        } else {
            UpsertStrategy::Application
        }
    }
}

fn dispatch(cli: Cli) -> Outcome {
    let event = match cli.event.as_deref().map(Event::load).transpose() {
        Ok(event) => event.unwrap_or_default(),
        Err(e) => return Outcome::failure(StatusCode::BAD_REQUEST, "Configuration error", e),
    };
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => return Outcome::failure(StatusCode::BAD_REQUEST, "Configuration error", e),
    };
    info!(
        "Config loaded (connect_retries={}, connect_retry_delay={}s, connect_timeout={}s, mapping={})",
        config.connect_retries.get(),
        config.connect_retry_delay.as_secs(),
        config.connect_timeout.as_secs(),
        config
            .mapping_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "embedded".to_string())
    );

    let ctx = Context { config, event };
    match cli.command {
        Command::DeploySchema => pipeline::deploy_schema(&ctx),
        Command::Ingest(args) => pipeline::ingest(&ctx, args.path, args.sheet.as_deref()),
        Command::Upsert(args) => pipeline::upsert(&ctx, args.strategy()),
        Command::Refresh => pipeline::refresh(&ctx),
        Command::Run { ingest, upsert } => {
            pipeline::run(&ctx, ingest.path, ingest.sheet.as_deref(), upsert.strategy())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded_env = match env_file::load(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            return ExitCode::FAILURE;
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "laundry-etl {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    let outcome = dispatch(cli);
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("failed to render outcome: {}", e),
    }
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        if let Some(err) = outcome.body.error.as_deref() {
            error!("fatal: {}", err);
        }
        ExitCode::FAILURE
    }
}
