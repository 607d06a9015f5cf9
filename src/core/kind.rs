//! Entity kinds and their composite-key identifier schema
//!
//! Every component that needs a deduplication key for an entity derives it
//! from the same table here. The cache and the shadow writer must compute
//! the identical key for the same payload, so this is the only place the
//! identifier fields are spelled out.

use serde_json::Value;

use crate::core::error::SyncError;
use crate::store::EntityRecord;

/// Closed set of entity kinds the synchronizer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Attachment,
    BomItem,
    Company,
    ManufacturerPart,
    Parameter,
    ParameterTemplate,
    Part,
    PartCategory,
    PartRelated,
    StockItem,
    StockLocation,
    SupplierPart,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Attachment,
        EntityKind::BomItem,
        EntityKind::Company,
        EntityKind::ManufacturerPart,
        EntityKind::Parameter,
        EntityKind::ParameterTemplate,
        EntityKind::Part,
        EntityKind::PartCategory,
        EntityKind::PartRelated,
        EntityKind::StockItem,
        EntityKind::StockLocation,
        EntityKind::SupplierPart,
    ];

    /// Ordered identifier fields whose values form the composite key.
    ///
    /// Payload fields outside this list are creation-time data only and
    /// never participate in deduplication.
    pub fn identifier_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Attachment => &["link", "model_id"],
            EntityKind::BomItem => &["part", "sub_part"],
            EntityKind::Company => &["name"],
            EntityKind::ManufacturerPart => &["MPN"],
            EntityKind::Parameter => &["part", "template"],
            EntityKind::ParameterTemplate => &["name"],
            EntityKind::Part => &["name", "category", "revision"],
            EntityKind::PartCategory => &["name", "parent"],
            EntityKind::PartRelated => &["part_1", "part_2"],
            EntityKind::StockItem => &["part", "supplier_part"],
            EntityKind::StockLocation => &["name"],
            EntityKind::SupplierPart => &["SKU"],
        }
    }

    /// REST collection route for this kind, relative to the API base.
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityKind::Attachment => "attachment/",
            EntityKind::BomItem => "bom/",
            EntityKind::Company => "company/",
            EntityKind::ManufacturerPart => "company/part/manufacturer/",
            EntityKind::Parameter => "part/parameter/",
            EntityKind::ParameterTemplate => "part/parameter/template/",
            EntityKind::Part => "part/",
            EntityKind::PartCategory => "part/category/",
            EntityKind::PartRelated => "part/related/",
            EntityKind::StockItem => "stock/",
            EntityKind::StockLocation => "stock/location/",
            EntityKind::SupplierPart => "company/part/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Attachment => "attachment",
            EntityKind::BomItem => "bom-item",
            EntityKind::Company => "company",
            EntityKind::ManufacturerPart => "manufacturer-part",
            EntityKind::Parameter => "parameter",
            EntityKind::ParameterTemplate => "parameter-template",
            EntityKind::Part => "part",
            EntityKind::PartCategory => "part-category",
            EntityKind::PartRelated => "part-related",
            EntityKind::StockItem => "stock-item",
            EntityKind::StockLocation => "stock-location",
            EntityKind::SupplierPart => "supplier-part",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered tuple of stringified identifier values for one entity instance.
///
/// Stable for the lifetime of the process: once a key maps to a pk, it must
/// always resolve to that pk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<String>);

impl CompositeKey {
    /// Derive the key for `kind` from a creation payload.
    ///
    /// Fails with [`SyncError::InvalidIdentifier`] when any identifier field
    /// is absent from the payload. A JSON `null` counts as present (a root
    /// category legitimately has `parent: null`).
    pub fn from_payload(kind: EntityKind, payload: &Value) -> Result<Self, SyncError> {
        let mut values = Vec::with_capacity(kind.identifier_fields().len());
        for &field in kind.identifier_fields() {
            match payload.get(field) {
                Some(value) => values.push(stringify(value)),
                None => {
                    return Err(SyncError::InvalidIdentifier { kind, field });
                }
            }
        }
        Ok(CompositeKey(values))
    }

    /// Derive the key from a backing-store record, or `None` when the record
    /// does not carry every identifier field (such records cannot collide
    /// with anything we create and are skipped during cache population).
    pub fn from_record(kind: EntityKind, record: &EntityRecord) -> Option<Self> {
        let mut values = Vec::with_capacity(kind.identifier_fields().len());
        for field in kind.identifier_fields() {
            values.push(stringify(record.fields.get(*field)?));
        }
        Some(CompositeKey(values))
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(" | "))
    }
}

/// Canonical string form of one identifier value.
///
/// Both payloads and fetched records go through this, so `category: 7` in a
/// payload matches `"category": 7` in an API listing.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_kind_has_identifiers() {
        for kind in EntityKind::ALL {
            let fields = kind.identifier_fields();
            assert!(!fields.is_empty(), "{kind} has no identifier fields");
            assert!(fields.len() <= 3, "{kind} has too many identifier fields");
        }
    }

    #[test]
    fn key_from_payload_orders_fields() {
        let payload = json!({
            "revision": "0",
            "category": 12,
            "name": "10k 0805",
            "description": "ignored",
        });
        let key = CompositeKey::from_payload(EntityKind::Part, &payload).unwrap();
        assert_eq!(key.values(), ["10k 0805", "12", "0"]);
    }

    #[test]
    fn key_ignores_non_identifier_fields() {
        let a = json!({"name": "Yageo", "is_manufacturer": true});
        let b = json!({"name": "Yageo", "is_manufacturer": false, "website": "x"});
        let ka = CompositeKey::from_payload(EntityKind::Company, &a).unwrap();
        let kb = CompositeKey::from_payload(EntityKind::Company, &b).unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn missing_identifier_field_is_an_error() {
        let payload = json!({"name": "R1", "category": 3});
        let err = CompositeKey::from_payload(EntityKind::Part, &payload).unwrap_err();
        match err {
            SyncError::InvalidIdentifier { kind, field } => {
                assert_eq!(kind, EntityKind::Part);
                assert_eq!(field, "revision");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn null_parent_is_a_valid_identifier_value() {
        let payload = json!({"name": "Passives", "parent": null});
        let key = CompositeKey::from_payload(EntityKind::PartCategory, &payload).unwrap();
        assert_eq!(key.values(), ["Passives", ""]);
    }
}
