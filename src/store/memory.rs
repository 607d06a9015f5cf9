//! In-memory backing store for dry runs and tests
//!
//! Behaves like the live backend at the [`BackingStore`] seam: sequential pk
//! assignment per kind, full-collection listings, patch accepted and
//! discarded. Call counters let tests assert the resolver's round-trip
//! economy (exactly one create per key, one listing per kind).

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::core::kind::EntityKind;
use crate::store::{BackingStore, EntityRecord, Pk, StoreError};

#[derive(Default)]
struct Inner {
    rows: HashMap<EntityKind, Vec<EntityRecord>>,
    next_pk: HashMap<EntityKind, Pk>,
    list_calls: HashMap<EntityKind, usize>,
    create_calls: HashMap<EntityKind, usize>,
    fail_list: Vec<EntityKind>,
    fail_create: Vec<EntityKind>,
}

/// Single-threaded in-memory store (interior mutability because the
/// [`BackingStore`] operations take `&self`, mirroring a remote API).
#[derive(Default)]
pub struct MemoryStore {
    inner: RefCell<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load an entity as if it already existed upstream.
    pub fn seed(&self, kind: EntityKind, payload: Value) -> Pk {
        let mut inner = self.inner.borrow_mut();
        let pk = Self::allocate(&mut inner, kind);
        let fields = payload.as_object().cloned().unwrap_or_default();
        inner
            .rows
            .entry(kind)
            .or_default()
            .push(EntityRecord { pk, fields });
        pk
    }

    /// Make subsequent `list` calls for `kind` fail (network-outage stand-in).
    pub fn fail_list_for(&self, kind: EntityKind) {
        self.inner.borrow_mut().fail_list.push(kind);
    }

    /// Make subsequent `create` calls for `kind` be rejected.
    pub fn fail_create_for(&self, kind: EntityKind) {
        self.inner.borrow_mut().fail_create.push(kind);
    }

    pub fn list_calls(&self, kind: EntityKind) -> usize {
        *self.inner.borrow().list_calls.get(&kind).unwrap_or(&0)
    }

    pub fn create_calls(&self, kind: EntityKind) -> usize {
        *self.inner.borrow().create_calls.get(&kind).unwrap_or(&0)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.inner
            .borrow()
            .rows
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Snapshot of the stored records for one kind.
    pub fn records(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.inner
            .borrow()
            .rows
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn allocate(inner: &mut Inner, kind: EntityKind) -> Pk {
        let next = inner.next_pk.entry(kind).or_insert(0);
        *next += 1;
        *next
    }
}

impl BackingStore for MemoryStore {
    fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError> {
        let mut inner = self.inner.borrow_mut();
        *inner.list_calls.entry(kind).or_default() += 1;
        if inner.fail_list.contains(&kind) {
            return Err(StoreError::Malformed {
                endpoint: kind.endpoint().to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(inner.rows.get(&kind).cloned().unwrap_or_default())
    }

    fn create(&self, kind: EntityKind, payload: &Value) -> Result<Pk, StoreError> {
        let mut inner = self.inner.borrow_mut();
        *inner.create_calls.entry(kind).or_default() += 1;
        if inner.fail_create.contains(&kind) {
            return Err(StoreError::Rejected {
                kind,
                message: "simulated rejection".to_string(),
            });
        }
        let pk = Self::allocate(&mut inner, kind);
        let fields = payload.as_object().cloned().unwrap_or_default();
        inner
            .rows
            .entry(kind)
            .or_default()
            .push(EntityRecord { pk, fields });
        Ok(pk)
    }

    fn patch(&self, _path: &str, payload: &Value) -> Result<Option<Value>, StoreError> {
        Ok(Some(payload.clone()))
    }

    fn delete(&self, kind: EntityKind, pk: Pk) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(rows) = inner.rows.get_mut(&kind) {
            rows.retain(|record| record.pk != pk);
        }
        Ok(())
    }
}
