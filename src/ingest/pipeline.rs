//! Row ingestion pipeline
//!
//! Per row, in fixed order: category path, part, parameters, suppliers and
//! manufacturers, optional stock. Two phases per file: phase 1 ingests every
//! row (recording forward relations), phase 2 drains the pending-relation
//! ledger once all of the file's parts exist.
//!
//! Failure policy: a row without a category or part is skipped; parameter
//! and supplier failures are logged and the row continues (a part with
//! missing parameters is still useful inventory data). Only transport-level
//! backing-store failures abort the current file, and never the batch.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::core::error::SyncError;
use crate::core::kind::EntityKind;
use crate::core::relations::{PendingRelations, RelationStats};
use crate::core::resolver::{EntityResolver, WriteMode};
use crate::ingest::row::SheetRow;
use crate::ingest::value::parse_parameter_value;
use crate::store::{BackingStore, Pk};

/// Outcome of one input file.
#[derive(Debug, Default)]
pub struct FileSummary {
    pub rows: usize,
    pub rows_ok: usize,
    pub rows_skipped: usize,
    pub parameter_errors: usize,
    pub supplier_errors: usize,
    pub relations: RelationStats,
}

/// Outcome of a whole directory batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub files_ok: usize,
    pub files_failed: usize,
    pub rows_ok: usize,
    pub rows_skipped: usize,
}

struct RowOutcome {
    parameter_errors: usize,
    supplier_errors: usize,
}

pub struct Pipeline<S: BackingStore> {
    resolver: EntityResolver<S>,
    relations: PendingRelations,
    site_url: String,
    with_stock: bool,
    stock_location: Option<Pk>,
}

impl<S: BackingStore> Pipeline<S> {
    pub fn new(resolver: EntityResolver<S>, site_url: impl Into<String>, with_stock: bool) -> Self {
        Self {
            resolver,
            relations: PendingRelations::new(),
            site_url: site_url.into(),
            with_stock,
            stock_location: None,
        }
    }

    pub fn resolver(&self) -> &EntityResolver<S> {
        &self.resolver
    }

    /// Process every `.csv` file under `dir`, in path order. A file failure
    /// is logged and the batch moves on to the next file.
    pub fn process_directory(&mut self, dir: &Path) -> Result<BatchSummary, SyncError> {
        if !dir.is_dir() {
            return Err(SyncError::File {
                path: dir.display().to_string(),
                message: "not a directory".to_string(),
            });
        }
        let mut files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        let mut summary = BatchSummary::default();
        for file in files {
            match self.process_file(&file) {
                Ok(file_summary) => {
                    summary.files_ok += 1;
                    summary.rows_ok += file_summary.rows_ok;
                    summary.rows_skipped += file_summary.rows_skipped;
                }
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "file failed; continuing batch");
                    summary.files_failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Process one CSV file: phase 1 over all rows, then phase 2 relation
    /// drain, then a cumulative shadow flush.
    pub fn process_file(&mut self, path: &Path) -> Result<FileSummary, SyncError> {
        let mut reader =
            csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(path)
                .map_err(|err| SyncError::File {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
        let headers: Arc<Vec<String>> = Arc::new(
            reader
                .headers()
                .map_err(|err| SyncError::File {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?
                .iter()
                .map(str::to_string)
                .collect(),
        );

        let mut summary = FileSummary::default();
        for record in reader.records() {
            let record = record.map_err(|err| SyncError::File {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
            summary.rows += 1;
            let row = SheetRow::new(Arc::clone(&headers), &record);
            match self.ingest_row(&row) {
                Ok(outcome) => {
                    summary.rows_ok += 1;
                    summary.parameter_errors += outcome.parameter_errors;
                    summary.supplier_errors += outcome.supplier_errors;
                }
                Err(err) if err.is_file_fatal() => return Err(err),
                Err(err) => {
                    warn!(row = summary.rows, error = %err, "row skipped");
                    summary.rows_skipped += 1;
                }
            }
        }

        // Phase 2: every part of this file now exists, so forward
        // references by name can be resolved.
        summary.relations = self.relations.resolve_all(&mut self.resolver);

        self.resolver.flush_shadow()?;
        info!(
            file = %path.display(),
            rows_ok = summary.rows_ok,
            rows_skipped = summary.rows_skipped,
            "file processed"
        );
        Ok(summary)
    }

    fn ingest_row(&mut self, row: &SheetRow) -> Result<RowOutcome, SyncError> {
        let name = row
            .get("NAME")
            .ok_or_else(|| SyncError::InvalidData("row has no NAME".to_string()))?
            .to_string();

        // --- stage a: category -------------------------------------------
        let category_path = match (row.get("CATEGORY"), row.get("TYPE")) {
            (Some(category), Some(kind)) => format!("{category} / {kind}"),
            (Some(category), None) => category.to_string(),
            (None, _) => String::new(),
        };
        let category_pk = self
            .resolver
            .resolve_category_path(&category_path)
            .map_err(|err| SyncError::CategoryResolutionFailed {
                path: category_path.clone(),
                source: Box::new(err),
            })?;

        // --- stage b: part -----------------------------------------------
        let part_pk = self.create_part(row, &name, category_pk)?;

        // --- stage c: parameters -----------------------------------------
        let parameter_errors = self.create_parameters(row, part_pk);

        // --- stage d: suppliers and manufacturers ------------------------
        let supplier_errors = self.create_suppliers_and_manufacturers(row, part_pk);

        info!(part = %name, pk = part_pk, "row processed");
        Ok(RowOutcome {
            parameter_errors,
            supplier_errors,
        })
    }

    fn create_part(&mut self, row: &SheetRow, name: &str, category_pk: Pk) -> Result<Pk, SyncError> {
        let description = row.get("DESCRIPTION").unwrap_or("");
        let part_type = row.get("TYPE").unwrap_or("");
        let is_virtual = matches!(part_type.to_lowercase().as_str(), "generic" | "critical");
        let revision = row.get("REVISION").unwrap_or("0");
        let designator = row.get("DESIGNATOR [str]").unwrap_or("");

        let mut payload = json!({
            "name": name,
            "category": category_pk,
            "description": description,
            "virtual": is_virtual,
            "revision": revision,
        });
        if self.resolver.mode() == WriteMode::Shadow {
            // The shadow writer derives the IPN itself; the live backend
            // gets it patched in below instead.
            payload["designator"] = json!(designator);
        }

        let part_pk = self
            .resolver
            .resolve(EntityKind::Part, &payload)
            .map_err(|err| SyncError::PartCreationFailed {
                name: name.to_string(),
                source: Box::new(err),
            })?;

        if self.resolver.mode() == WriteMode::Live {
            let link = format!("{}/part/{part_pk}/", self.site_url);
            let ipn = crate::store::shadow::format_ipn(designator, part_pk);
            for (field, value) in [("link", link.clone()), ("IPN", ipn)] {
                match self
                    .resolver
                    .store()
                    .patch(&format!("part/{part_pk}/"), &json!({ field: value }))
                {
                    Ok(Some(_)) => {}
                    Ok(None) => warn!(part = part_pk, field, "patch refused"),
                    Err(err) => warn!(part = part_pk, field, error = %err, "patch failed"),
                }
            }
        }

        // Datasheet: virtual parts link to themselves, specific parts to
        // their datasheet URL. Routed through the resolver so re-runs do
        // not stack duplicate attachments.
        let datasheet = if is_virtual {
            Some(format!("{}/part/{part_pk}/", self.site_url))
        } else {
            row.get("DATASHEET_LINK").map(str::to_string)
        };
        if let Some(link) = datasheet {
            let attachment = json!({
                "link": link,
                "comment": "datasheet",
                "model_type": "part",
                "model_id": part_pk,
            });
            if let Err(err) = self.resolver.resolve(EntityKind::Attachment, &attachment) {
                warn!(part = part_pk, error = %err, "datasheet attachment failed");
            }
        }

        for related in row.related_part_names() {
            if let Err(err) = self.relations.record(part_pk, related) {
                warn!(part = part_pk, error = %err, "pending relation skipped");
            }
        }

        Ok(part_pk)
    }

    fn create_parameters(&mut self, row: &SheetRow, part_pk: Pk) -> usize {
        let mut errors = 0;
        for cell in row.parameter_cells() {
            let template = json!({"name": cell.name});
            let template_pk = match self.resolver.resolve(EntityKind::ParameterTemplate, &template)
            {
                Ok(pk) => pk,
                Err(err) => {
                    warn!(template = %cell.name, error = %err, "parameter template failed");
                    errors += 1;
                    continue;
                }
            };

            let (display, numeric) = parse_parameter_value(cell.value.unwrap_or(""), &cell.unit);
            let parameter = json!({
                "part": part_pk,
                "template": template_pk,
                "data": display,
                "data_numeric": numeric,
            });
            if let Err(err) = self.resolver.resolve(EntityKind::Parameter, &parameter) {
                warn!(template = %cell.name, part = part_pk, error = %err, "parameter failed");
                errors += 1;
            }
        }
        errors
    }

    fn create_suppliers_and_manufacturers(&mut self, row: &SheetRow, part_pk: Pk) -> usize {
        let Some(manufacturer_name) = row.get("MANUFACTURER") else {
            return 0;
        };
        let mut errors = 0;

        let manufacturer = json!({
            "name": manufacturer_name,
            "is_supplier": false,
            "is_manufacturer": true,
        });
        let manufacturer_pk = match self.resolver.resolve(EntityKind::Company, &manufacturer) {
            Ok(pk) => pk,
            Err(err) => {
                warn!(manufacturer = %manufacturer_name, error = %err, "manufacturer failed");
                return 1;
            }
        };

        if let Some(mpn) = row.get("MPN") {
            let manufacturer_part = json!({
                "part": part_pk,
                "manufacturer": manufacturer_pk,
                "MPN": mpn,
            });
            if let Err(err) = self
                .resolver
                .resolve(EntityKind::ManufacturerPart, &manufacturer_part)
            {
                warn!(mpn = %mpn, error = %err, "manufacturer part failed");
                errors += 1;
            }
        }

        for (column, index) in row.supplier_columns() {
            let Some(supplier_name) = row.get(&column) else {
                continue;
            };
            let supplier = json!({
                "name": supplier_name,
                "is_supplier": true,
                "is_manufacturer": false,
            });
            let supplier_pk = match self.resolver.resolve(EntityKind::Company, &supplier) {
                Ok(pk) => pk,
                Err(err) => {
                    warn!(supplier = %supplier_name, error = %err, "supplier failed");
                    errors += 1;
                    continue;
                }
            };

            let sku = row.get(&format!("SKU{index}")).unwrap_or("");
            let supplier_part = json!({
                "part": part_pk,
                "supplier": supplier_pk,
                "SKU": sku,
            });
            let supplier_part_pk = match self.resolver.resolve(EntityKind::SupplierPart, &supplier_part)
            {
                Ok(pk) => pk,
                Err(err) => {
                    warn!(supplier = %supplier_name, sku, error = %err, "supplier part failed");
                    errors += 1;
                    continue;
                }
            };

            if self.with_stock {
                errors += self.create_stock_item(part_pk, supplier_part_pk);
            }
        }
        errors
    }

    fn create_stock_item(&mut self, part_pk: Pk, supplier_part_pk: Pk) -> usize {
        let location = match self.stock_location {
            Some(pk) => pk,
            None => {
                let default = json!({
                    "name": "Default",
                    "description": "Default stock location for all parts",
                });
                match self.resolver.resolve(EntityKind::StockLocation, &default) {
                    Ok(pk) => {
                        self.stock_location = Some(pk);
                        pk
                    }
                    Err(err) => {
                        warn!(error = %err, "default stock location failed");
                        return 1;
                    }
                }
            }
        };
        let stock = json!({
            "part": part_pk,
            "supplier_part": supplier_part_pk,
            "quantity": 10000,
            "location": location,
        });
        match self.resolver.resolve(EntityKind::StockItem, &stock) {
            Ok(_) => 0,
            Err(err) => {
                warn!(part = part_pk, error = %err, "stock item failed");
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::EntityCache;
    use crate::store::{MemoryStore, ShadowDbWriter};
    use std::io::Write;
    use tempfile::TempDir;

    const SHEET: &str = "\
NAME,CATEGORY,TYPE,REVISION,DESIGNATOR [str],DESCRIPTION,Resistance [Ω],Tolerance [%],MANUFACTURER,MPN,SUPPLIER1,SKU1,DATASHEET_LINK,RELATEDPARTS
R_10k,Passives,generic,0,R,10k resistor,10k,1,Yageo,RC0805FR-0710KL,Mouser,603-RC0805FR,http://ds.example/10k.pdf,R_22k
R_22k,Passives,generic,0,R,22k resistor,22k,1,Yageo,RC0805FR-0722KL,Mouser,603-RC0805FR22,http://ds.example/22k.pdf,
";

    fn pipeline(store: MemoryStore, with_stock: bool) -> Pipeline<MemoryStore> {
        let resolver = EntityResolver::new(
            store,
            EntityCache::new(),
            ShadowDbWriter::new("unused", "http://site"),
            WriteMode::Live,
        );
        Pipeline::new(resolver, "http://site", with_stock)
    }

    fn write_sheet(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn ingests_a_file_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "resistors.csv", SHEET);
        let mut pipeline = pipeline(MemoryStore::new(), false);

        let summary = pipeline.process_file(&path).unwrap();
        assert_eq!(summary.rows_ok, 2);
        assert_eq!(summary.rows_skipped, 0);
        assert_eq!(summary.parameter_errors, 0);
        assert_eq!(summary.relations, RelationStats { resolved: 1, skipped: 0, failed: 0 });

        let store = pipeline.resolver().store();
        // Passives (structural) + generic (leaf), shared by both rows.
        assert_eq!(store.count(EntityKind::PartCategory), 2);
        assert_eq!(store.count(EntityKind::Part), 2);
        // Resistance + Tolerance templates, shared.
        assert_eq!(store.count(EntityKind::ParameterTemplate), 2);
        assert_eq!(store.count(EntityKind::Parameter), 4);
        // One manufacturer, one supplier.
        assert_eq!(store.count(EntityKind::Company), 2);
        assert_eq!(store.count(EntityKind::ManufacturerPart), 2);
        assert_eq!(store.count(EntityKind::SupplierPart), 2);
        assert_eq!(store.count(EntityKind::Attachment), 2);
        // Forward reference R_10k -> R_22k resolved in phase 2.
        assert_eq!(store.count(EntityKind::PartRelated), 1);
        // Stock is opt-in.
        assert_eq!(store.count(EntityKind::StockItem), 0);
    }

    #[test]
    fn reprocessing_the_same_file_creates_nothing_new() {
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "resistors.csv", SHEET);
        let mut pipeline = pipeline(MemoryStore::new(), false);

        pipeline.process_file(&path).unwrap();
        let creates_after_first: Vec<usize> = EntityKind::ALL
            .iter()
            .map(|&kind| pipeline.resolver().store().create_calls(kind))
            .collect();

        pipeline.process_file(&path).unwrap();
        let creates_after_second: Vec<usize> = EntityKind::ALL
            .iter()
            .map(|&kind| pipeline.resolver().store().create_calls(kind))
            .collect();
        assert_eq!(creates_after_first, creates_after_second);
    }

    #[test]
    fn numeric_parameter_values_are_decoded() {
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "resistors.csv", SHEET);
        let mut pipeline = pipeline(MemoryStore::new(), false);
        pipeline.process_file(&path).unwrap();

        let parameters = pipeline.resolver().store().records(EntityKind::Parameter);
        let resistance: Vec<f64> = parameters
            .iter()
            .filter_map(|record| record.get("data_numeric").and_then(|v| v.as_f64()))
            .collect();
        assert!(resistance.contains(&10_000.0));
        assert!(resistance.contains(&22_000.0));
    }

    #[test]
    fn row_without_name_is_skipped_not_fatal() {
        let sheet = "\
NAME,CATEGORY,TYPE,DESCRIPTION,MANUFACTURER
,Passives,generic,orphan,Yageo
C_100n,Passives,generic,cap,Yageo
";
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "mixed.csv", sheet);
        let mut pipeline = pipeline(MemoryStore::new(), false);
        let summary = pipeline.process_file(&path).unwrap();
        assert_eq!(summary.rows_ok, 1);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(pipeline.resolver().store().count(EntityKind::Part), 1);
    }

    #[test]
    fn missing_category_row_is_skipped() {
        let sheet = "\
NAME,CATEGORY,TYPE,DESCRIPTION,MANUFACTURER
R_1,nan,nan,no category,Yageo
";
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "bad.csv", sheet);
        let mut pipeline = pipeline(MemoryStore::new(), false);
        let summary = pipeline.process_file(&path).unwrap();
        assert_eq!(summary.rows_ok, 0);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(pipeline.resolver().store().count(EntityKind::Part), 0);
    }

    #[test]
    fn outage_during_listing_aborts_the_file_but_not_the_batch() {
        let tmp = TempDir::new().unwrap();
        write_sheet(&tmp, "a.csv", SHEET);
        let store = MemoryStore::new();
        store.fail_list_for(EntityKind::PartCategory);
        let mut pipeline = pipeline(store, false);
        let summary = pipeline.process_directory(tmp.path()).unwrap();
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_ok, 0);
    }

    #[test]
    fn with_stock_creates_one_item_per_supplier_part() {
        let tmp = TempDir::new().unwrap();
        let path = write_sheet(&tmp, "resistors.csv", SHEET);
        let mut pipeline = pipeline(MemoryStore::new(), true);
        pipeline.process_file(&path).unwrap();

        let store = pipeline.resolver().store();
        assert_eq!(store.count(EntityKind::StockLocation), 1);
        assert_eq!(store.count(EntityKind::StockItem), 2);
        let stock = store.records(EntityKind::StockItem);
        assert_eq!(stock[0].get("quantity").and_then(|v| v.as_i64()), Some(10000));
    }

    #[test]
    fn process_directory_handles_multiple_files() {
        let tmp = TempDir::new().unwrap();
        write_sheet(&tmp, "a.csv", SHEET);
        write_sheet(
            &tmp,
            "b.csv",
            "\
NAME,CATEGORY,TYPE,DESCRIPTION,MANUFACTURER
C_100n,Passives,generic,cap,Samsung
",
        );
        write_sheet(&tmp, "notes.txt", "not a csv");
        let mut pipeline = pipeline(MemoryStore::new(), false);
        let summary = pipeline.process_directory(tmp.path()).unwrap();
        assert_eq!(summary.files_ok, 2);
        assert_eq!(summary.rows_ok, 3);
        assert_eq!(pipeline.resolver().store().count(EntityKind::Part), 3);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let mut pipeline = pipeline(MemoryStore::new(), false);
        let err = pipeline
            .process_directory(Path::new("/nonexistent/batch"))
            .unwrap_err();
        assert!(matches!(err, SyncError::File { .. }));
    }
}
