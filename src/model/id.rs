//! Stable identities: 128-bit vertex ids, merged public ids, nid derivation.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

// ============================================================================
// VertexId
// ============================================================================

/// Stable 128-bit vertex identity, globally unique and independent of the
/// vertex's position inside any graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexId {
    pub msb: u64,
    pub lsb: u64,
}

impl VertexId {
    pub fn new(msb: u64, lsb: u64) -> Self {
        Self { msb, lsb }
    }

    /// Fresh random identity (uuid v4).
    pub fn random() -> Self {
        Uuid::new_v4().into()
    }

    pub fn as_uuid(self) -> Uuid {
        Uuid::from_u64_pair(self.msb, self.lsb)
    }
}

impl From<Uuid> for VertexId {
    fn from(uuid: Uuid) -> Self {
        let (msb, lsb) = uuid.as_u64_pair();
        Self { msb, lsb }
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_uuid())
    }
}

// ============================================================================
// PublicId
// ============================================================================

/// Public identity of an entity: one or more uuids, merged over time as
/// duplicate records of the same real-world component are reconciled.
///
/// The first uuid is the primary identity and drives nid derivation; merged
/// uuids are retained so that older references still resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicId {
    uuids: SmallVec<[Uuid; 2]>,
}

impl PublicId {
    pub fn new(primary: Uuid) -> Self {
        Self { uuids: smallvec::smallvec![primary] }
    }

    /// Fresh single-uuid identity.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4())
    }

    pub fn uuids(&self) -> &[Uuid] {
        &self.uuids
    }

    /// Deterministic small integer identifier for fast in-process references.
    pub fn nid(&self) -> i32 {
        nid_for_uuid(self.uuids[0])
    }

    /// Absorb another identity's uuids, preserving order and skipping
    /// duplicates. The primary uuid (and therefore the nid) never changes.
    pub fn merge(&mut self, other: &PublicId) {
        for uuid in other.uuids() {
            if !self.uuids.contains(uuid) {
                self.uuids.push(*uuid);
            }
        }
    }

    /// True when the two identities share at least one uuid.
    pub fn intersects(&self, other: &PublicId) -> bool {
        self.uuids.iter().any(|u| other.uuids.contains(u))
    }
}

impl From<Uuid> for PublicId {
    fn from(uuid: Uuid) -> Self {
        Self::new(uuid)
    }
}

impl std::fmt::Display for PublicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, uuid) in self.uuids.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{uuid}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Nid derivation
// ============================================================================

/// Derive the deterministic i32 nid from a uuid.
///
/// Folds the two 64-bit halves with an odd-constant multiply, then folds the
/// result down to 32 bits. Zero is reserved (an absent reference), so the rare
/// uuid that folds to zero maps to a fixed non-zero substitute instead.
pub fn nid_for_uuid(uuid: Uuid) -> i32 {
    let (msb, lsb) = uuid.as_u64_pair();
    let mixed = (msb ^ lsb.rotate_left(31)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let folded = ((mixed >> 32) ^ mixed) as u32 as i32;
    if folded == 0 { i32::MIN + 1 } else { folded }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nid_is_deterministic() {
        let uuid = Uuid::new_v4();
        assert_eq!(nid_for_uuid(uuid), nid_for_uuid(uuid));
        assert_ne!(nid_for_uuid(uuid), 0);
    }

    #[test]
    fn merge_keeps_primary_and_nid() {
        let mut a = PublicId::random();
        let b = PublicId::random();
        let nid_before = a.nid();

        a.merge(&b);
        assert_eq!(a.nid(), nid_before);
        assert_eq!(a.uuids().len(), 2);
        assert!(a.intersects(&b));

        // Merging again is a no-op.
        a.merge(&b);
        assert_eq!(a.uuids().len(), 2);
    }

    #[test]
    fn vertex_id_uuid_roundtrip() {
        let id = VertexId::random();
        assert_eq!(VertexId::from(id.as_uuid()), id);
    }
}
