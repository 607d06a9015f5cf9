//! Entity resolver: the resolve-or-create contract
//!
//! Maps a semantically-keyed payload to a persistent identifier, creating
//! the entity on first encounter and reusing the pk on every subsequent
//! encounter. Exactly one create call reaches a backing store per distinct
//! composite key for the lifetime of the resolver.

use serde_json::{json, Value};
use tracing::{debug, warn};

use std::collections::{HashMap, HashSet};

use crate::core::cache::EntityCache;
use crate::core::error::SyncError;
use crate::core::kind::{CompositeKey, EntityKind};
use crate::store::{BackingStore, Pk, ShadowDbWriter, ShadowTable, StoreError};

/// Where newly created entities go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write through to the live backing store.
    Live,
    /// Accumulate in the shadow writer; kinds the shadow writer does not
    /// model still write through.
    Shadow,
}

pub struct EntityResolver<S: BackingStore> {
    store: S,
    cache: EntityCache,
    shadow: ShadowDbWriter,
    mode: WriteMode,
    /// Kinds whose full collection has already been fetched on a miss.
    /// After that one fetch the cache is trusted outright.
    refreshed: HashSet<EntityKind>,
}

impl<S: BackingStore> EntityResolver<S> {
    pub fn new(store: S, cache: EntityCache, shadow: ShadowDbWriter, mode: WriteMode) -> Self {
        Self {
            store,
            cache,
            shadow,
            mode,
            refreshed: HashSet::new(),
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Return the existing or newly created pk for this payload.
    ///
    /// Strict order, each step short-circuiting: composite key, cache
    /// lookup, one-time full fetch of the kind, create through the active
    /// write path. Payload fields outside the key are creation-time data
    /// only; once a key is cached, later payload changes are ignored.
    pub fn resolve(&mut self, kind: EntityKind, payload: &Value) -> Result<Pk, SyncError> {
        let key = CompositeKey::from_payload(kind, payload)?;

        if let Some(pk) = self.cache.lookup(kind, &key) {
            return Ok(pk);
        }

        // One bulk round-trip buys freshness for the whole kind. The merge
        // must not displace locally created entries, so absorb, not rebuild.
        if !self.refreshed.contains(&kind) {
            let records = self.store.list(kind)?;
            self.cache.absorb(kind, &records);
            self.refreshed.insert(kind);
            if let Some(pk) = self.cache.lookup(kind, &key) {
                debug!(%kind, %key, pk, "found upstream after refresh");
                return Ok(pk);
            }
        }

        let pk = self.create(kind, payload, &key)?;
        debug!(%kind, %key, pk, "created");
        self.cache.insert(kind, key, pk);
        Ok(pk)
    }

    fn create(
        &mut self,
        kind: EntityKind,
        payload: &Value,
        key: &CompositeKey,
    ) -> Result<Pk, SyncError> {
        let result = match self.mode {
            WriteMode::Live => self.store.create(kind, payload),
            WriteMode::Shadow if ShadowTable::for_kind(kind).is_some() => {
                self.shadow.ensure_seeded(&self.store)?;
                self.shadow.create(kind, payload)
            }
            WriteMode::Shadow => self.store.create(kind, payload),
        };
        match result {
            Ok(pk) => Ok(pk),
            Err(StoreError::Rejected { kind, message }) => Err(SyncError::EntityCreationFailed {
                kind,
                key: key.to_string(),
                message,
            }),
            Err(err) => Err(SyncError::BackingStoreUnavailable(err)),
        }
    }

    /// Resolve a slash-delimited category path to its leaf category pk,
    /// creating every missing level. All levels except the last are created
    /// as structural (organizational-only) nodes.
    pub fn resolve_category_path(&mut self, path: &str) -> Result<Pk, SyncError> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && !segment.eq_ignore_ascii_case("nan"))
            .collect();
        if segments.is_empty() {
            return Err(SyncError::InvalidCategoryPath(path.to_string()));
        }

        let mut parent: Option<Pk> = None;
        for (idx, segment) in segments.iter().enumerate() {
            let is_last = idx == segments.len() - 1;
            let payload = json!({
                "name": segment,
                "structural": !is_last,
                "parent": parent,
            });
            let pk = self.resolve(EntityKind::PartCategory, &payload)?;
            parent = Some(pk);
        }
        // The loop ran at least once, so parent is always set here.
        parent.ok_or_else(|| SyncError::InvalidCategoryPath(path.to_string()))
    }

    /// Projection of the Part cache as name -> pk, for resolving relations
    /// recorded by part name. Name is the first identifier field of a Part
    /// key; when two revisions share a name the lower pk wins, matching the
    /// upstream listing order dependence this replaces.
    pub fn part_names(&self) -> HashMap<String, Pk> {
        let mut names: HashMap<String, Pk> = HashMap::new();
        for (key, pk) in self.cache.entries(EntityKind::Part) {
            if let Some(name) = key.values().first() {
                names
                    .entry(name.clone())
                    .and_modify(|existing| {
                        if pk < *existing {
                            *existing = pk;
                        }
                    })
                    .or_insert(pk);
            }
        }
        names
    }

    /// Flush shadow buffers to flat files. A no-op in live mode.
    pub fn flush_shadow(&self) -> Result<(), SyncError> {
        if self.mode == WriteMode::Shadow {
            self.shadow.flush()?;
        }
        Ok(())
    }

    /// Pre-warm the cache for the given kinds; per-kind failures are logged
    /// inside and do not abort.
    pub fn populate_cache(&mut self, kinds: &[EntityKind]) {
        self.cache.populate(&self.store, kinds);
        for &kind in kinds {
            if self.cache.contains_kind(kind) {
                self.refreshed.insert(kind);
            } else {
                warn!(%kind, "cache populate failed; will retry on first miss");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn resolver(store: MemoryStore) -> EntityResolver<MemoryStore> {
        let shadow = ShadowDbWriter::new("unused", "http://site");
        EntityResolver::new(store, EntityCache::new(), shadow, WriteMode::Live)
    }

    fn shadow_resolver(store: MemoryStore) -> EntityResolver<MemoryStore> {
        let shadow = ShadowDbWriter::new("unused", "http://site");
        EntityResolver::new(store, EntityCache::new(), shadow, WriteMode::Shadow)
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut resolver = resolver(MemoryStore::new());
        let payload = json!({"name": "10k 0805", "category": 3, "revision": "0"});
        let first = resolver.resolve(EntityKind::Part, &payload).unwrap();
        for _ in 0..4 {
            assert_eq!(resolver.resolve(EntityKind::Part, &payload).unwrap(), first);
        }
        assert_eq!(resolver.store().create_calls(EntityKind::Part), 1);
        // One refresh on the first miss, then the cache is trusted.
        assert_eq!(resolver.store().list_calls(EntityKind::Part), 1);
    }

    #[test]
    fn non_identifier_fields_do_not_split_keys() {
        let mut resolver = resolver(MemoryStore::new());
        let a = json!({"name": "C1", "category": 1, "revision": "0", "description": "x"});
        let b = json!({"name": "C1", "category": 1, "revision": "0", "description": "drifted"});
        let pk_a = resolver.resolve(EntityKind::Part, &a).unwrap();
        let pk_b = resolver.resolve(EntityKind::Part, &b).unwrap();
        assert_eq!(pk_a, pk_b);
        assert_eq!(resolver.store().create_calls(EntityKind::Part), 1);
    }

    #[test]
    fn identifier_fields_do_split_keys() {
        let mut resolver = resolver(MemoryStore::new());
        let a = json!({"name": "C1", "category": 1, "revision": "0"});
        let b = json!({"name": "C1", "category": 1, "revision": "1"});
        let pk_a = resolver.resolve(EntityKind::Part, &a).unwrap();
        let pk_b = resolver.resolve(EntityKind::Part, &b).unwrap();
        assert_ne!(pk_a, pk_b);
        assert_eq!(resolver.store().create_calls(EntityKind::Part), 2);
    }

    #[test]
    fn interleaved_kinds_stay_isolated() {
        let mut resolver = resolver(MemoryStore::new());
        let part = json!({"name": "10k 0805", "category": 3, "revision": "0"});
        let first = resolver.resolve(EntityKind::Part, &part).unwrap();
        resolver
            .resolve(EntityKind::Company, &json!({"name": "Yageo"}))
            .unwrap();
        let second = resolver.resolve(EntityKind::Part, &part).unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.store().create_calls(EntityKind::Part), 1);
        assert_eq!(resolver.store().create_calls(EntityKind::Company), 1);
    }

    #[test]
    fn existing_upstream_entity_is_reused_not_recreated() {
        let store = MemoryStore::new();
        let existing = store.seed(EntityKind::Company, json!({"name": "Yageo"}));
        let mut resolver = resolver(store);
        let pk = resolver
            .resolve(EntityKind::Company, &json!({"name": "Yageo", "is_manufacturer": true}))
            .unwrap();
        assert_eq!(pk, existing);
        assert_eq!(resolver.store().create_calls(EntityKind::Company), 0);
    }

    #[test]
    fn missing_identifier_field_fails_without_store_traffic() {
        let mut resolver = resolver(MemoryStore::new());
        let err = resolver
            .resolve(EntityKind::Part, &json!({"name": "x", "category": 1}))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier { .. }));
        assert_eq!(resolver.store().list_calls(EntityKind::Part), 0);
    }

    #[test]
    fn rejected_create_maps_to_creation_failed() {
        let store = MemoryStore::new();
        store.fail_create_for(EntityKind::Company);
        let mut resolver = resolver(store);
        let err = resolver
            .resolve(EntityKind::Company, &json!({"name": "Nope"}))
            .unwrap_err();
        assert!(matches!(err, SyncError::EntityCreationFailed { .. }));
    }

    #[test]
    fn category_path_round_trip() {
        let mut resolver = resolver(MemoryStore::new());
        let leaf = resolver.resolve_category_path("A/B/C").unwrap();
        assert_eq!(resolver.store().create_calls(EntityKind::PartCategory), 3);

        let records = resolver.store().records(EntityKind::PartCategory);
        let by_name = |name: &str| {
            records
                .iter()
                .find(|r| r.get("name").and_then(|v| v.as_str()) == Some(name))
                .unwrap()
        };
        let a = by_name("A");
        let b = by_name("B");
        let c = by_name("C");
        assert!(a.get("parent").unwrap().is_null());
        assert_eq!(b.get("parent").unwrap().as_i64(), Some(a.pk));
        assert_eq!(c.get("parent").unwrap().as_i64(), Some(b.pk));
        assert_eq!(a.get("structural").unwrap().as_bool(), Some(true));
        assert_eq!(b.get("structural").unwrap().as_bool(), Some(true));
        assert_eq!(c.get("structural").unwrap().as_bool(), Some(false));
        assert_eq!(c.pk, leaf);

        // Re-resolving creates nothing new and returns the same leaf.
        let again = resolver.resolve_category_path("A/B/C").unwrap();
        assert_eq!(again, leaf);
        assert_eq!(resolver.store().create_calls(EntityKind::PartCategory), 3);
    }

    #[test]
    fn category_path_trims_and_drops_nan_segments() {
        let mut resolver = resolver(MemoryStore::new());
        let leaf = resolver
            .resolve_category_path(" Passives / Resistor / nan / generic ")
            .unwrap();
        assert_eq!(resolver.store().create_calls(EntityKind::PartCategory), 3);
        let again = resolver
            .resolve_category_path("Passives/Resistor/generic")
            .unwrap();
        assert_eq!(leaf, again);
    }

    #[test]
    fn empty_category_path_is_invalid() {
        let mut resolver = resolver(MemoryStore::new());
        for path in ["", " / / ", "nan/nan"] {
            let err = resolver.resolve_category_path(path).unwrap_err();
            assert!(matches!(err, SyncError::InvalidCategoryPath(_)));
        }
    }

    #[test]
    fn shadow_mode_assigns_pks_above_upstream_maximum() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.seed(
                EntityKind::Part,
                json!({"name": format!("old{i}"), "category": 1, "revision": "0"}),
            );
        }
        let mut resolver = shadow_resolver(store);
        let payload = json!({"name": "new", "category": 1, "revision": "0"});
        let pk = resolver.resolve(EntityKind::Part, &payload).unwrap();
        assert_eq!(pk, 4);
        // No create reached the live store; the row is buffered.
        assert_eq!(resolver.store().create_calls(EntityKind::Part), 0);
        assert_eq!(resolver.resolve(EntityKind::Part, &payload).unwrap(), pk);
    }

    #[test]
    fn shadow_mode_falls_through_for_unsupported_kinds() {
        let mut resolver = shadow_resolver(MemoryStore::new());
        resolver
            .resolve(EntityKind::Company, &json!({"name": "Yageo"}))
            .unwrap();
        assert_eq!(resolver.store().create_calls(EntityKind::Company), 1);
    }

    #[test]
    fn shadow_entries_survive_the_refresh_of_another_miss() {
        // A second distinct key for the same kind triggers no second fetch,
        // and the locally created entry must not be displaced.
        let mut resolver = shadow_resolver(MemoryStore::new());
        let first = json!({"name": "a", "category": 1, "revision": "0"});
        let second = json!({"name": "b", "category": 1, "revision": "0"});
        let pk_a = resolver.resolve(EntityKind::Part, &first).unwrap();
        let pk_b = resolver.resolve(EntityKind::Part, &second).unwrap();
        assert_ne!(pk_a, pk_b);
        assert_eq!(resolver.resolve(EntityKind::Part, &first).unwrap(), pk_a);
        // One listing from the miss refresh, one from counter seeding.
        assert_eq!(resolver.store().list_calls(EntityKind::Part), 2);
    }

    #[test]
    fn part_names_projects_first_identifier_field() {
        let mut resolver = resolver(MemoryStore::new());
        let pk = resolver
            .resolve(
                EntityKind::Part,
                &json!({"name": "LED red", "category": 2, "revision": "0"}),
            )
            .unwrap();
        let names = resolver.part_names();
        assert_eq!(names.get("LED red"), Some(&pk));
    }
}
