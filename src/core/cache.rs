//! In-memory composite-key -> pk cache, one map per entity kind
//!
//! The cache is constructed once per run and injected into the resolver;
//! nothing here is process-global. The only correctness requirement is
//! "never hold two different pks for one key" - a missing entry just costs
//! a future backing-store fetch, so eviction is always safe.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::core::kind::{CompositeKey, EntityKind};
use crate::store::{BackingStore, EntityRecord, Pk};

#[derive(Debug, Clone, Copy)]
struct Slot {
    pk: Pk,
    last_used: u64,
}

/// Composite-key lookup cache for resolved entities.
#[derive(Debug, Default)]
pub struct EntityCache {
    maps: HashMap<EntityKind, HashMap<CompositeKey, Slot>>,
    /// When set, a kind's map is trimmed to half once it grows past this.
    max_per_kind: Option<usize>,
    tick: u64,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that bulk-evicts the least-recently-used half of a kind's
    /// entries whenever that kind exceeds `max_per_kind` after an insert.
    /// Coarse on purpose: amortized O(1) per insert beats strict LRU here.
    pub fn bounded(max_per_kind: usize) -> Self {
        Self {
            max_per_kind: Some(max_per_kind.max(2)),
            ..Self::default()
        }
    }

    /// Look up the pk for `key`, bumping its recency on a hit.
    pub fn lookup(&mut self, kind: EntityKind, key: &CompositeKey) -> Option<Pk> {
        self.tick += 1;
        let tick = self.tick;
        let slot = self.maps.get_mut(&kind)?.get_mut(key)?;
        slot.last_used = tick;
        debug!(%kind, %key, pk = slot.pk, "cache hit");
        Some(slot.pk)
    }

    /// Store a new `key -> pk` mapping.
    ///
    /// Re-inserting the same pk for an existing key is a no-op. Inserting a
    /// *different* pk for an existing key violates the resolver contract;
    /// the first mapping wins and the conflict is logged.
    pub fn insert(&mut self, kind: EntityKind, key: CompositeKey, pk: Pk) {
        self.tick += 1;
        let tick = self.tick;
        let map = self.maps.entry(kind).or_default();
        if let Some(existing) = map.get(&key) {
            if existing.pk != pk {
                error!(
                    %kind, %key, existing = existing.pk, attempted = pk,
                    "conflicting pk insert; keeping first mapping"
                );
            }
            return;
        }
        map.insert(key, Slot { pk, last_used: tick });
        if let Some(max) = self.max_per_kind {
            if self.maps.get(&kind).map(HashMap::len).unwrap_or(0) > max {
                self.evict_lru_half(kind);
            }
        }
    }

    /// Merge backing-store records into the kind's map without displacing
    /// existing entries. Ensures the map exists even when `records` is empty,
    /// so "zero instances" is distinguishable from "never fetched".
    pub fn absorb(&mut self, kind: EntityKind, records: &[EntityRecord]) {
        self.maps.entry(kind).or_default();
        for record in records {
            match CompositeKey::from_record(kind, record) {
                Some(key) => self.insert(kind, key, record.pk),
                None => {
                    debug!(%kind, pk = record.pk, "record missing identifier fields; skipped");
                }
            }
        }
    }

    /// Bulk-fetch `kinds` from the backing store into the cache.
    ///
    /// One kind's fetch failure is logged and does not stop the others.
    pub fn populate<S: BackingStore + ?Sized>(&mut self, store: &S, kinds: &[EntityKind]) {
        for &kind in kinds {
            match store.list(kind) {
                Ok(records) => {
                    self.absorb(kind, &records);
                    debug!(%kind, entries = self.len(kind), "cache populated");
                }
                Err(err) => {
                    warn!(%kind, error = %err, "populate failed for kind; continuing");
                }
            }
        }
    }

    /// Number of cached entries for `kind` (0 when never fetched).
    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map(HashMap::len).unwrap_or(0)
    }

    /// Whether the kind has a (possibly empty) map at all.
    pub fn contains_kind(&self, kind: EntityKind) -> bool {
        self.maps.contains_key(&kind)
    }

    /// Iterate the cached `(key, pk)` pairs for one kind.
    pub fn entries(&self, kind: EntityKind) -> impl Iterator<Item = (&CompositeKey, Pk)> {
        self.maps
            .get(&kind)
            .into_iter()
            .flat_map(|map| map.iter().map(|(key, slot)| (key, slot.pk)))
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }

    fn evict_lru_half(&mut self, kind: EntityKind) {
        let Some(map) = self.maps.get_mut(&kind) else {
            return;
        };
        let mut ticks: Vec<u64> = map.values().map(|slot| slot.last_used).collect();
        ticks.sort_unstable();
        let cutoff = ticks[ticks.len() / 2];
        let before = map.len();
        map.retain(|_, slot| slot.last_used >= cutoff);
        debug!(%kind, evicted = before - map.len(), "bulk LRU eviction");
    }
}
