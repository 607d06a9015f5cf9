//! Pending-relation ledger
//!
//! Part relations in the input reference their target by name, and the
//! target may be defined later in the same file. Relations are recorded
//! during row ingestion and drained in a second pass once every part of the
//! batch exists.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::error::SyncError;
use crate::core::kind::EntityKind;
use crate::core::resolver::EntityResolver;
use crate::store::{BackingStore, Pk};

#[derive(Debug, Clone)]
pub struct PendingRelation {
    pub source: Pk,
    pub target_name: String,
}

/// Outcome of draining the ledger.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RelationStats {
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Accumulates forward references until the batch's parts all exist.
#[derive(Debug, Default)]
pub struct PendingRelations {
    entries: Vec<PendingRelation>,
}

impl PendingRelations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a relation from `source` to the part named `target_name`.
    ///
    /// An empty or NaN target is invalid data; the caller skips the
    /// relation, it is never fatal to the row.
    pub fn record(&mut self, source: Pk, target_name: &str) -> Result<(), SyncError> {
        let target_name = target_name.trim();
        if target_name.is_empty() || target_name.eq_ignore_ascii_case("nan") {
            return Err(SyncError::InvalidData(format!(
                "empty relation target for part {source}"
            )));
        }
        debug!(source, target_name, "recorded pending relation");
        self.entries.push(PendingRelation {
            source,
            target_name: target_name.to_string(),
        });
        Ok(())
    }

    /// Resolve every recorded relation against the now-complete Part cache.
    ///
    /// Unknown target names are logged and skipped. The ledger is cleared
    /// unconditionally, even on partial failure, so the next batch starts
    /// clean. Must run strictly after all rows of the batch created their
    /// parts.
    pub fn resolve_all<S: BackingStore>(
        &mut self,
        resolver: &mut EntityResolver<S>,
    ) -> RelationStats {
        let entries: Vec<PendingRelation> = self.entries.drain(..).collect();
        if entries.is_empty() {
            return RelationStats::default();
        }
        info!(count = entries.len(), "resolving pending part relations");

        let part_names = resolver.part_names();
        let mut stats = RelationStats::default();
        for relation in entries {
            let Some(&target) = part_names.get(&relation.target_name) else {
                warn!(
                    target = %relation.target_name,
                    source = relation.source,
                    "related part not found; skipping relation"
                );
                stats.skipped += 1;
                continue;
            };
            let payload = json!({"part_1": relation.source, "part_2": target});
            match resolver.resolve(EntityKind::PartRelated, &payload) {
                Ok(_) => stats.resolved += 1,
                Err(err) => {
                    warn!(
                        source = relation.source,
                        target, error = %err,
                        "failed to create part relation"
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::EntityCache;
    use crate::core::resolver::WriteMode;
    use crate::store::{MemoryStore, ShadowDbWriter};
    use serde_json::json;

    fn resolver() -> EntityResolver<MemoryStore> {
        EntityResolver::new(
            MemoryStore::new(),
            EntityCache::new(),
            ShadowDbWriter::new("unused", "http://site"),
            WriteMode::Live,
        )
    }

    #[test]
    fn empty_target_is_invalid_data() {
        let mut ledger = PendingRelations::new();
        for target in ["", "  ", "nan"] {
            let err = ledger.record(1, target).unwrap_err();
            assert!(matches!(err, SyncError::InvalidData(_)));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_targets_are_skipped_and_ledger_clears() {
        let mut resolver = resolver();
        let p1 = resolver
            .resolve(EntityKind::Part, &json!({"name": "P1", "category": 1, "revision": "0"}))
            .unwrap();
        let p2 = resolver
            .resolve(EntityKind::Part, &json!({"name": "P2", "category": 1, "revision": "0"}))
            .unwrap();
        let py = resolver
            .resolve(EntityKind::Part, &json!({"name": "Y", "category": 1, "revision": "0"}))
            .unwrap();

        let mut ledger = PendingRelations::new();
        ledger.record(p1, "X").unwrap(); // X never ingested
        ledger.record(p2, "Y").unwrap();

        let stats = ledger.resolve_all(&mut resolver);
        assert_eq!(stats, RelationStats { resolved: 1, skipped: 1, failed: 0 });
        assert!(ledger.is_empty());

        let relations = resolver.store().records(EntityKind::PartRelated);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].get("part_1").unwrap().as_i64(), Some(p2));
        assert_eq!(relations[0].get("part_2").unwrap().as_i64(), Some(py));
    }

    #[test]
    fn duplicate_relations_resolve_to_one_entity() {
        let mut resolver = resolver();
        let p1 = resolver
            .resolve(EntityKind::Part, &json!({"name": "P1", "category": 1, "revision": "0"}))
            .unwrap();
        resolver
            .resolve(EntityKind::Part, &json!({"name": "P2", "category": 1, "revision": "0"}))
            .unwrap();

        let mut ledger = PendingRelations::new();
        ledger.record(p1, "P2").unwrap();
        ledger.record(p1, "P2").unwrap();
        let stats = ledger.resolve_all(&mut resolver);
        assert_eq!(stats.resolved, 2);
        assert_eq!(resolver.store().count(EntityKind::PartRelated), 1);
        assert_eq!(resolver.store().create_calls(EntityKind::PartRelated), 1);
    }

    #[test]
    fn ledger_clears_even_when_creation_fails() {
        let store = MemoryStore::new();
        store.fail_create_for(EntityKind::PartRelated);
        let mut resolver = EntityResolver::new(
            store,
            EntityCache::new(),
            ShadowDbWriter::new("unused", "http://site"),
            WriteMode::Live,
        );
        let p1 = resolver
            .resolve(EntityKind::Part, &json!({"name": "P1", "category": 1, "revision": "0"}))
            .unwrap();
        resolver
            .resolve(EntityKind::Part, &json!({"name": "P2", "category": 1, "revision": "0"}))
            .unwrap();

        let mut ledger = PendingRelations::new();
        ledger.record(p1, "P2").unwrap();
        let stats = ledger.resolve_all(&mut resolver);
        assert_eq!(stats.failed, 1);
        assert!(ledger.is_empty());
    }
}
