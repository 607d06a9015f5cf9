//! Shadow-database writer: flat-file substitute for live creation
//!
//! When bulk-importing, per-row HTTP creates are replaced by synthetic pk
//! assignment and buffered rows that flush to CSV files matching the
//! backend's physical table layout. The writer never checks the cache; the
//! resolver is solely responsible for not creating the same key twice.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::kind::EntityKind;
use crate::store::{BackingStore, Pk, StoreError};

/// Flat-file tables the shadow writer can stand in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowTable {
    Part,
    PartParameter,
    PartRelated,
    ManufacturerPart,
    Attachment,
}

impl ShadowTable {
    pub const ALL: [ShadowTable; 5] = [
        ShadowTable::Part,
        ShadowTable::PartParameter,
        ShadowTable::PartRelated,
        ShadowTable::ManufacturerPart,
        ShadowTable::Attachment,
    ];

    /// Which table (if any) buffers creates for this entity kind. Kinds
    /// without a table fall through to the live store even in shadow mode.
    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Part => Some(ShadowTable::Part),
            EntityKind::Parameter => Some(ShadowTable::PartParameter),
            EntityKind::PartRelated => Some(ShadowTable::PartRelated),
            EntityKind::ManufacturerPart => Some(ShadowTable::ManufacturerPart),
            EntityKind::Attachment => Some(ShadowTable::Attachment),
            _ => None,
        }
    }

    fn kind(self) -> EntityKind {
        match self {
            ShadowTable::Part => EntityKind::Part,
            ShadowTable::PartParameter => EntityKind::Parameter,
            ShadowTable::PartRelated => EntityKind::PartRelated,
            ShadowTable::ManufacturerPart => EntityKind::ManufacturerPart,
            ShadowTable::Attachment => EntityKind::Attachment,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ShadowTable::Part => "part_part.csv",
            ShadowTable::PartParameter => "part_partparameter.csv",
            ShadowTable::PartRelated => "part_partrelated.csv",
            ShadowTable::ManufacturerPart => "company_manufacturerpart.csv",
            ShadowTable::Attachment => "common_attachment.csv",
        }
    }

    /// Fixed output column order, matching the backend's table layout.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ShadowTable::Part => &[
                "id", "name", "description", "keywords", "IPN", "link", "image",
                "minimum_stock", "units", "trackable", "purchaseable", "salable", "active",
                "notes", "bom_checksum", "bom_checked_date", "bom_checked_by_id",
                "category_id", "default_location_id", "default_supplier_id", "is_template",
                "variant_of_id", "assembly", "component", "virtual", "revision",
                "creation_date", "creation_user_id", "level", "lft", "rght", "tree_id",
                "default_expiry", "base_cost", "multiple", "metadata", "barcode_data",
                "barcode_hash", "last_stocktake", "responsible_owner_id", "locked",
                "revision_of_id", "testable",
            ],
            ShadowTable::PartParameter => &[
                "id", "data", "part_id", "template_id", "data_numeric", "metadata",
            ],
            ShadowTable::PartRelated => &["id", "part_1_id", "part_2_id", "metadata", "note"],
            ShadowTable::ManufacturerPart => &[
                "id", "MPN", "link", "description", "manufacturer_id", "part_id", "metadata",
                "barcode_data", "barcode_hash", "notes",
            ],
            ShadowTable::Attachment => &[
                "id", "model_id", "attachment", "link", "comment", "upload_date",
                "file_size", "model_type", "upload_user_id", "metadata",
            ],
        }
    }
}

/// Internal part number: designator code, zero-padded pk, pk suffix.
pub fn format_ipn(designator: &str, pk: Pk) -> String {
    format!("{designator}{pk:06}-{pk}")
}

type ShadowRow = HashMap<&'static str, String>;

/// Accumulates denormalized rows per table and assigns synthetic pks above
/// the live store's current maximum, so shadow pks never collide upstream.
pub struct ShadowDbWriter {
    out_dir: PathBuf,
    site_url: String,
    rows: HashMap<ShadowTable, Vec<ShadowRow>>,
    id_upper_limit: HashMap<ShadowTable, Pk>,
    seeded: bool,
}

impl ShadowDbWriter {
    pub fn new(out_dir: impl Into<PathBuf>, site_url: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            site_url: site_url.into(),
            rows: HashMap::new(),
            id_upper_limit: HashMap::new(),
            seeded: false,
        }
    }

    /// Seed the per-table id counters from the live store's current maximum
    /// pk. Done lazily on first use and memoized for the process lifetime.
    pub fn ensure_seeded<S: BackingStore + ?Sized>(&mut self, store: &S) -> Result<(), StoreError> {
        if self.seeded {
            return Ok(());
        }
        for table in ShadowTable::ALL {
            let upper = store
                .list(table.kind())?
                .iter()
                .map(|record| record.pk)
                .max()
                .unwrap_or(0);
            self.id_upper_limit.insert(table, upper);
        }
        info!(limits = ?self.id_upper_limit, "seeded shadow id counters");
        self.seeded = true;
        Ok(())
    }

    /// Seed the counters at explicit values (tests, offline replays).
    pub fn seed_at(&mut self, limits: &[(ShadowTable, Pk)]) {
        for &(table, upper) in limits {
            self.id_upper_limit.insert(table, upper);
        }
        self.seeded = true;
    }

    /// Assign the next synthetic pk for `kind` and buffer its row.
    ///
    /// Does not consult any cache: calling this twice for the same key
    /// produces two rows. The resolver guarantees that never happens.
    pub fn create(&mut self, kind: EntityKind, payload: &Value) -> Result<Pk, StoreError> {
        let Some(table) = ShadowTable::for_kind(kind) else {
            return Err(StoreError::Unsupported(kind.as_str()));
        };
        let pk = self.next_pk(table);
        let row = match table {
            ShadowTable::Part => self.part_row(pk, payload),
            ShadowTable::PartParameter => parameter_row(pk, payload),
            ShadowTable::PartRelated => related_row(pk, payload),
            ShadowTable::ManufacturerPart => self.manufacturer_part_row(pk, payload),
            ShadowTable::Attachment => attachment_row(pk, payload),
        };
        self.rows.entry(table).or_default().push(row);
        Ok(pk)
    }

    /// Rewrite every non-empty buffer to its flat file. An empty buffer is
    /// skipped entirely - no header-only files - so flush may be called
    /// cumulatively after each input file or once at the very end.
    pub fn flush(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.out_dir)?;
        for table in ShadowTable::ALL {
            let rows = match self.rows.get(&table) {
                Some(rows) if !rows.is_empty() => rows,
                _ => {
                    debug!(file = table.file_name(), "no buffered rows; skipping");
                    continue;
                }
            };
            let path = self.out_dir.join(table.file_name());
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(table.columns())?;
            for row in rows {
                let record: Vec<&str> = table
                    .columns()
                    .iter()
                    .map(|col| row.get(col).map(String::as_str).unwrap_or(""))
                    .collect();
                writer.write_record(&record)?;
            }
            writer.flush()?;
            info!(path = %path.display(), rows = rows.len(), "wrote shadow table");
        }
        Ok(())
    }

    /// Drop buffered rows (counters keep running so pks stay monotonic).
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    pub fn row_count(&self, table: ShadowTable) -> usize {
        self.rows.get(&table).map(Vec::len).unwrap_or(0)
    }

    fn next_pk(&mut self, table: ShadowTable) -> Pk {
        if !self.seeded {
            warn!(?table, "shadow counters used without seeding; starting at 0");
            self.seeded = true;
        }
        let counter = self.id_upper_limit.entry(table).or_insert(0);
        *counter += 1;
        *counter
    }

    fn part_row(&self, pk: Pk, payload: &Value) -> ShadowRow {
        let designator = text(payload, "designator");
        let mut row = ShadowRow::new();
        row.insert("id", pk.to_string());
        row.insert("name", text(payload, "name"));
        row.insert("description", text(payload, "description"));
        row.insert("IPN", format_ipn(&designator, pk));
        row.insert("link", format!("{}/part/{pk}/", self.site_url));
        row.insert("minimum_stock", "0".to_string());
        row.insert("trackable", "false".to_string());
        row.insert("purchaseable", "true".to_string());
        row.insert("salable", "false".to_string());
        row.insert("active", "true".to_string());
        row.insert("notes", text(payload, "notes"));
        row.insert("category_id", text(payload, "category"));
        row.insert("is_template", "false".to_string());
        row.insert("assembly", "false".to_string());
        row.insert("component", "false".to_string());
        row.insert(
            "virtual",
            payload
                .get("virtual")
                .and_then(Value::as_bool)
                .unwrap_or(false)
                .to_string(),
        );
        row.insert("revision", text_or(payload, "revision", "0"));
        row.insert("creation_date", Utc::now().format("%Y-%m-%d").to_string());
        row.insert("creation_user_id", "1".to_string());
        row.insert("level", "0".to_string());
        row.insert("lft", pk.to_string());
        row.insert("rght", (pk + 1).to_string());
        row.insert("tree_id", "1".to_string());
        row.insert("default_expiry", "0".to_string());
        row.insert("base_cost", "0.000000".to_string());
        row.insert("multiple", "1".to_string());
        row.insert("metadata", "{}".to_string());
        row.insert("locked", "false".to_string());
        row.insert("testable", "false".to_string());
        row
    }

    fn manufacturer_part_row(&self, pk: Pk, payload: &Value) -> ShadowRow {
        let mut row = ShadowRow::new();
        row.insert("id", pk.to_string());
        row.insert("MPN", text(payload, "MPN"));
        row.insert(
            "link",
            format!("{}/company/manufacturer-part/{pk}/", self.site_url),
        );
        row.insert("description", text(payload, "description"));
        row.insert("manufacturer_id", text(payload, "manufacturer"));
        row.insert("part_id", text(payload, "part"));
        row.insert("metadata", "{}".to_string());
        row
    }
}

fn parameter_row(pk: Pk, payload: &Value) -> ShadowRow {
    let mut row = ShadowRow::new();
    row.insert("id", pk.to_string());
    row.insert("data", text(payload, "data"));
    row.insert("part_id", text(payload, "part"));
    row.insert("template_id", text(payload, "template"));
    row.insert("data_numeric", text(payload, "data_numeric"));
    row.insert("metadata", "{}".to_string());
    row
}

fn related_row(pk: Pk, payload: &Value) -> ShadowRow {
    let mut row = ShadowRow::new();
    row.insert("id", pk.to_string());
    row.insert("part_1_id", text(payload, "part_1"));
    row.insert("part_2_id", text(payload, "part_2"));
    row.insert("metadata", "{}".to_string());
    row.insert("note", text(payload, "note"));
    row
}

fn attachment_row(pk: Pk, payload: &Value) -> ShadowRow {
    let mut row = ShadowRow::new();
    row.insert("id", pk.to_string());
    row.insert("model_id", text(payload, "model_id"));
    row.insert("link", text(payload, "link"));
    row.insert("comment", text(payload, "comment"));
    row.insert("upload_date", Utc::now().format("%Y-%m-%d").to_string());
    row.insert("model_type", text(payload, "model_type"));
    row.insert("upload_user_id", "1".to_string());
    row.insert("metadata", "{}".to_string());
    row
}

/// Stringified payload field, empty when absent or null.
fn text(payload: &Value, field: &str) -> String {
    match payload.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn text_or(payload: &Value, field: &str, default: &str) -> String {
    let value = text(payload, field);
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
