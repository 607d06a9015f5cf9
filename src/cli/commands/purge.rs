//! `partsync purge` command - Delete all synchronized entities

use console::style;
use miette::Result;

use crate::cli::args::GlobalOpts;
use crate::core::{Config, EntityKind};
use crate::store::{BackingStore, HttpStore};
use tracing::warn;

/// Deletion order: dependents strictly before the entities they point at,
/// so the backend never refuses a delete over a dangling reference.
const PURGE_ORDER: [EntityKind; 12] = [
    EntityKind::StockItem,
    EntityKind::BomItem,
    EntityKind::PartRelated,
    EntityKind::Parameter,
    EntityKind::Attachment,
    EntityKind::SupplierPart,
    EntityKind::ManufacturerPart,
    EntityKind::Part,
    EntityKind::ParameterTemplate,
    EntityKind::Company,
    EntityKind::StockLocation,
    EntityKind::PartCategory,
];

#[derive(clap::Args, Debug)]
pub struct PurgeArgs {
    /// Actually delete; without this flag the command only reports what
    /// it would remove
    #[arg(long)]
    pub yes: bool,
}

pub fn run(args: PurgeArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let missing = config.validate_required();
    if !missing.is_empty() {
        return Err(miette::miette!(
            "missing configuration: {}",
            missing.join(", ")
        ));
    }

    let store = HttpStore::connect(&config).map_err(|err| miette::miette!("{err}"))?;

    let mut total_deleted = 0usize;
    let mut total_failed = 0usize;
    for kind in PURGE_ORDER {
        let mut records = match store.list(kind) {
            Ok(records) => records,
            Err(err) => {
                warn!(%kind, error = %err, "listing failed; skipping kind");
                total_failed += 1;
                continue;
            }
        };
        if records.is_empty() {
            continue;
        }
        if !args.yes {
            println!(
                "  {:>5}  {}",
                style(records.len()).yellow(),
                kind
            );
            continue;
        }
        // Children before parents for self-referential trees.
        records.sort_by_key(|record| std::cmp::Reverse(record.pk));
        let mut deleted = 0usize;
        for record in &records {
            match store.delete(kind, record.pk) {
                Ok(()) => deleted += 1,
                Err(err) => {
                    warn!(%kind, pk = record.pk, error = %err, "delete failed");
                    total_failed += 1;
                }
            }
        }
        total_deleted += deleted;
        if !global.quiet {
            println!(
                "{} Deleted {} of {} {}",
                style("✓").green(),
                style(deleted).cyan(),
                records.len(),
                kind
            );
        }
    }

    if !args.yes {
        println!();
        println!(
            "Dry listing only; re-run with {} to delete",
            style("partsync purge --yes").yellow()
        );
        return Ok(());
    }

    if total_failed > 0 {
        return Err(miette::miette!(
            "purge incomplete: {total_deleted} deleted, {total_failed} failure(s)"
        ));
    }
    if !global.quiet {
        println!(
            "{} Purge complete: {} entities removed",
            style("✓").green(),
            style(total_deleted).cyan()
        );
    }
    Ok(())
}
