//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};

use crate::cli::commands::{import::ImportArgs, purge::PurgeArgs};

#[derive(Parser)]
#[command(name = "partsync")]
#[command(author, version, about = "CSV part-inventory synchronizer")]
#[command(
    long_about = "Synchronizes CSV part-inventory batches into an InvenTree-style backend \
via its REST API. Every entity is resolved-or-created against a composite-key cache, so \
re-running the same batch never duplicates records."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "PARTSYNC_LOG")]
    pub log_level: String,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a directory of part CSV files into the backend
    Import(ImportArgs),

    /// Delete all synchronized entities from the backend
    Purge(PurgeArgs),
}
