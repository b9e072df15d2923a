//! # CLI Argument Definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cachet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Inspect and maintain a SurrealDB-backed cache store")]
pub struct Cli {
    /// Config file (TOML). `CACHET__*` environment variables override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache partition (database) to operate on.
    #[arg(short, long, global = true)]
    pub partition: Option<String>,

    /// Full backend URL, e.g. `ws://127.0.0.1:8000` or `mem://`.
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Console log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a segment name without connecting
    CheckSegment { name: String },
    #[command(flatten)]
    Store(StoreCommand),
}

/// Subcommands that need a started connection.
#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Connect, print the backend version and disconnect
    Ping,
    /// Print a cached value as JSON
    Get { segment: String, id: String },
    /// Store a JSON value
    Set {
        segment: String,
        id: String,
        /// Value as JSON text, e.g. '{"user":"ada"}' or '"plain"'
        value: String,
        /// Lifetime in milliseconds
        #[arg(short, long)]
        ttl: i64,
    },
    /// Remove a cached value
    Drop { segment: String, id: String },
    /// Delete expired records of a segment
    Purge { segment: String },
}
