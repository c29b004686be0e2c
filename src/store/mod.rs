//! # Entity Store
//!
//! The persistence seam: a nid-keyed map of entities with a generation
//! counter for cache invalidation and an explicit load-phase bracket that
//! suppresses per-write generation churn during bulk imports.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::entity::Entity;
use crate::Result;

// ============================================================================
// EntityStore trait
// ============================================================================

/// Contract between the engine and whatever holds the entities.
///
/// "Quietly" means without per-entity change notification — bulk writes
/// announce themselves once, at the end of the load phase, not once per
/// entity.
pub trait EntityStore {
    /// Insert or replace the entity under its derived nid.
    fn put_entity_quietly(&self, entity: Entity) -> Result<()>;

    /// Entity under `nid`, if present.
    fn entity(&self, nid: i32) -> Option<Entity>;

    fn contains(&self, nid: i32) -> bool {
        self.entity(nid).is_some()
    }

    fn entity_count(&self) -> usize;

    /// Open a load-phase bracket. Brackets nest; the store defers generation
    /// advancement until the outermost bracket closes.
    fn begin_load_phase(&self);

    /// Close one load-phase bracket.
    fn end_load_phase(&self);

    fn in_load_phase(&self) -> bool;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store. Cheap to clone — clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entities: RwLock<HashMap<i32, Entity>>,
    load_phase_depth: AtomicU32,
    generation: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic change counter. Stable across reads; bumped per write
    /// outside a load phase, and exactly once when the outermost load phase
    /// closes.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn nids(&self) -> Vec<i32> {
        self.inner.entities.read().keys().copied().collect()
    }
}

impl EntityStore for MemoryStore {
    fn put_entity_quietly(&self, entity: Entity) -> Result<()> {
        let nid = entity.nid();
        self.inner.entities.write().insert(nid, entity);
        if !self.in_load_phase() {
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn entity(&self, nid: i32) -> Option<Entity> {
        self.inner.entities.read().get(&nid).cloned()
    }

    fn contains(&self, nid: i32) -> bool {
        self.inner.entities.read().contains_key(&nid)
    }

    fn entity_count(&self) -> usize {
        self.inner.entities.read().len()
    }

    fn begin_load_phase(&self) {
        let depth = self.inner.load_phase_depth.fetch_add(1, Ordering::AcqRel);
        debug!(target: "termgraph::store", depth = depth + 1, "load phase opened");
    }

    fn end_load_phase(&self) {
        let previous = self.inner.load_phase_depth.fetch_sub(1, Ordering::AcqRel);
        debug!(target: "termgraph::store", depth = previous.saturating_sub(1), "load phase closed");
        if previous == 1 {
            // Outermost bracket: one generation bump for the whole import.
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn in_load_phase(&self) -> bool {
        self.inner.load_phase_depth.load(Ordering::Acquire) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ConceptEntity, ConceptVersion};
    use crate::model::PublicId;

    fn concept() -> Entity {
        Entity::Concept(ConceptEntity {
            public_id: PublicId::random(),
            versions: vec![ConceptVersion { stamp_nid: 1 }],
        })
    }

    #[test]
    fn put_and_get_by_nid() {
        let store = MemoryStore::new();
        let entity = concept();
        let nid = entity.nid();

        store.put_entity_quietly(entity.clone()).unwrap();
        assert!(store.contains(nid));
        assert_eq!(store.entity(nid), Some(entity));
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let store = MemoryStore::new();
        let shadow = store.clone();
        store.put_entity_quietly(concept()).unwrap();
        assert_eq!(shadow.entity_count(), 1);
    }

    #[test]
    fn generation_quiet_during_load_phase() {
        let store = MemoryStore::new();
        let before = store.generation();

        store.begin_load_phase();
        assert!(store.in_load_phase());
        store.put_entity_quietly(concept()).unwrap();
        store.put_entity_quietly(concept()).unwrap();
        assert_eq!(store.generation(), before);

        store.end_load_phase();
        assert!(!store.in_load_phase());
        assert_eq!(store.generation(), before + 1);
    }

    #[test]
    fn load_phase_brackets_nest() {
        let store = MemoryStore::new();
        let before = store.generation();

        store.begin_load_phase();
        store.begin_load_phase();
        store.end_load_phase();
        assert!(store.in_load_phase());
        assert_eq!(store.generation(), before);

        store.end_load_phase();
        assert_eq!(store.generation(), before + 1);
    }

    #[test]
    fn writes_outside_load_phase_bump_generation() {
        let store = MemoryStore::new();
        let before = store.generation();
        store.put_entity_quietly(concept()).unwrap();
        assert_eq!(store.generation(), before + 1);
    }
}
