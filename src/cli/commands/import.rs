//! `partsync import` command - Sync a directory of part CSV files

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::args::GlobalOpts;
use crate::core::{Config, EntityCache, EntityResolver, WriteMode};
use crate::ingest::{BatchSummary, Pipeline};
use crate::store::{BackingStore, HttpStore, MemoryStore, ShadowDbWriter};

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Directory containing the part CSV files
    pub directory: PathBuf,

    /// Ingest against an in-memory store; nothing reaches the backend
    #[arg(long)]
    pub dry_run: bool,

    /// Write created entities as database flat files into this directory
    /// instead of POSTing them (pk counters are still seeded from the
    /// live backend)
    #[arg(long, value_name = "DIR", conflicts_with = "dry_run")]
    pub shadow: Option<PathBuf>,

    /// Also create a stock item for every supplier part
    #[arg(long)]
    pub with_stock: bool,

    /// Bound the entity cache to at most this many entries per kind
    #[arg(long, value_name = "N")]
    pub cache_limit: Option<usize>,
}

pub fn run(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();

    if args.dry_run {
        let pipeline = execute(MemoryStore::new(), WriteMode::Live, &config, &args)?;
        if !global.quiet {
            println!();
            println!("Would create:");
            for kind in crate::core::EntityKind::ALL {
                let count = pipeline.resolver().store().count(kind);
                if count > 0 {
                    println!("  {:>5}  {}", style(count).cyan(), kind);
                }
            }
        }
        return Ok(());
    }

    // Credentials are checked before any file or network I/O.
    let missing = config.validate_required();
    if !missing.is_empty() {
        return Err(miette::miette!(
            "missing configuration: {}",
            missing.join(", ")
        ));
    }

    let mode = if args.shadow.is_some() {
        WriteMode::Shadow
    } else {
        WriteMode::Live
    };
    let store = HttpStore::connect(&config).map_err(|err| miette::miette!("{err}"))?;
    execute(store, mode, &config, &args)?;

    if let Some(ref dir) = args.shadow {
        if !global.quiet {
            println!(
                "{} Shadow tables written to {}",
                style("✓").green(),
                style(dir.display()).cyan()
            );
        }
    }
    Ok(())
}

fn execute<S: BackingStore>(
    store: S,
    mode: WriteMode,
    config: &Config,
    args: &ImportArgs,
) -> Result<Pipeline<S>> {
    let cache = match args.cache_limit {
        Some(limit) => EntityCache::bounded(limit),
        None => EntityCache::new(),
    };
    let shadow_dir = args
        .shadow
        .clone()
        .or_else(|| config.shadow_output.clone())
        .unwrap_or_else(|| PathBuf::from("shadow_out"));
    let site_url = config.site_url();
    let shadow = ShadowDbWriter::new(shadow_dir, &site_url);
    let resolver = EntityResolver::new(store, cache, shadow, mode);
    let mut pipeline = Pipeline::new(resolver, &site_url, args.with_stock);

    let summary = pipeline
        .process_directory(&args.directory)
        .map_err(|err| miette::miette!("{err}"))?;
    print_summary(&summary);
    if summary.files_ok == 0 && summary.files_failed > 0 {
        return Err(miette::miette!("every input file failed"));
    }
    Ok(pipeline)
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "{} {} file(s) processed, {} row(s) synced",
        style("✓").green(),
        style(summary.files_ok).cyan(),
        style(summary.rows_ok).cyan()
    );
    if summary.rows_skipped > 0 {
        println!(
            "{} {} row(s) skipped",
            style("!").yellow(),
            style(summary.rows_skipped).yellow()
        );
    }
    if summary.files_failed > 0 {
        println!(
            "{} {} file(s) failed",
            style("✗").red(),
            style(summary.files_failed).red()
        );
    }
}
