//! Header-indexed view over one input CSV row
//!
//! The input contract: fixed columns NAME, DESCRIPTION, CATEGORY, TYPE,
//! REVISION, `DESIGNATOR [str]`, DATASHEET_LINK, MANUFACTURER, MPN, plus
//! dynamic SUPPLIERn/SKUn pairs and a comma-separated RELATEDPARTS column.
//! Every column strictly between DESCRIPTION and MANUFACTURER is a
//! parameter; a unit may ride along in square brackets in the header.

use std::sync::Arc;

/// One parameter column: template name, optional unit, cell value.
#[derive(Debug, PartialEq, Eq)]
pub struct ParameterCell<'a> {
    pub name: String,
    pub unit: String,
    pub value: Option<&'a str>,
}

pub struct SheetRow {
    headers: Arc<Vec<String>>,
    values: Vec<String>,
}

impl SheetRow {
    pub fn new(headers: Arc<Vec<String>>, record: &csv::StringRecord) -> Self {
        let values = record.iter().map(str::to_string).collect();
        Self { headers, values }
    }

    /// Cell value by column name; empty and literal `nan` cells count as
    /// absent, matching the spreadsheet exports this tool ingests.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        let cell = self.values.get(idx)?.trim();
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
            None
        } else {
            Some(cell)
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == column)
    }

    /// The parameter columns: everything strictly between the DESCRIPTION
    /// and MANUFACTURER markers, in sheet order. Empty when either marker
    /// is missing or they are adjacent.
    pub fn parameter_cells(&self) -> Vec<ParameterCell<'_>> {
        let (Some(start), Some(end)) = (
            self.column_index("DESCRIPTION"),
            self.column_index("MANUFACTURER"),
        ) else {
            return Vec::new();
        };
        if end <= start + 1 {
            return Vec::new();
        }
        (start + 1..end)
            .filter_map(|idx| {
                let header = self.headers.get(idx)?.trim();
                if header.is_empty() {
                    return None;
                }
                let (name, unit) = split_unit(header);
                if name.is_empty() {
                    return None;
                }
                let value = self.values.get(idx).map(String::as_str).and_then(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                        None
                    } else {
                        Some(cell)
                    }
                });
                Some(ParameterCell { name, unit, value })
            })
            .collect()
    }

    /// Numbered supplier columns (`SUPPLIER1`, `SUPPLIER2`, ...) with their
    /// numeric suffix, in sheet order.
    pub fn supplier_columns(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|header| {
                let suffix = header.strip_prefix("SUPPLIER")?;
                if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                Some((header.clone(), suffix.to_string()))
            })
            .collect()
    }

    /// Related part names from the comma-separated RELATEDPARTS column.
    pub fn related_part_names(&self) -> Vec<&str> {
        self.get("RELATEDPARTS")
            .map(|cell| {
                cell.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Split a `Name [unit]` header into name and unit.
fn split_unit(header: &str) -> (String, String) {
    match (header.find('['), header.rfind(']')) {
        (Some(open), Some(close)) if close > open => {
            let name = header[..open].trim().to_string();
            let unit = header[open + 1..close].trim().to_string();
            (name, unit)
        }
        _ => (header.trim().to_string(), String::new()),
    }
}
