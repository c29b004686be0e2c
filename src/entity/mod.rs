//! # Entities
//!
//! The four chronology kinds a terminology store holds: concepts, semantics,
//! patterns, and stamps. Each entity pairs a public identity with a version
//! list; every version is anchored to a STAMP that records who committed what,
//! when, and on which path.
//!
//! These are plain DTOs. Field references are stored as resolved nids — the
//! bulk loader is responsible for turning wire-format public ids into nids
//! before an entity reaches the store.

use serde::{Deserialize, Serialize};

use crate::model::{FieldValue, PublicId, Stamp};

// ============================================================================
// Kinds
// ============================================================================

/// Discriminates the four chronology kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Concept,
    Semantic,
    Pattern,
    Stamp,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Concept => "concept",
            EntityKind::Semantic => "semantic",
            EntityKind::Pattern => "pattern",
            EntityKind::Stamp => "stamp",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Concept
// ============================================================================

/// A concept: pure identity plus version history. Concepts carry no payload
/// of their own — their content lives in the semantics that point at them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEntity {
    pub public_id: PublicId,
    pub versions: Vec<ConceptVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptVersion {
    pub stamp_nid: i32,
}

// ============================================================================
// Semantic
// ============================================================================

/// A semantic: a typed assertion about a referenced component, shaped by a
/// pattern. The pattern's field definitions give meaning and type to the
/// positional `fields` of each version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEntity {
    pub public_id: PublicId,
    pub pattern_nid: i32,
    pub referenced_component_nid: i32,
    pub versions: Vec<SemanticVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub stamp_nid: i32,
    pub fields: Vec<FieldValue>,
}

// ============================================================================
// Pattern
// ============================================================================

/// A pattern: the schema for a family of semantics. Each version fixes the
/// purpose and meaning of the assertion plus an ordered field layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEntity {
    pub public_id: PublicId,
    pub versions: Vec<PatternVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVersion {
    pub stamp_nid: i32,
    pub referenced_component_purpose_nid: i32,
    pub referenced_component_meaning_nid: i32,
    pub field_definitions: Vec<FieldDefinition>,
}

/// One slot of a pattern's field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub meaning_nid: i32,
    pub purpose_nid: i32,
    pub data_type_nid: i32,
}

// ============================================================================
// Stamp chronology
// ============================================================================

/// A stamp chronology: the versioning coordinates themselves, stored as an
/// entity so that every version record can reference its stamp by nid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampEntity {
    pub public_id: PublicId,
    pub versions: Vec<Stamp>,
}

// ============================================================================
// Entity
// ============================================================================

/// Any of the four chronology kinds, as stored and retrieved by an
/// [`EntityStore`](crate::store::EntityStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Concept(ConceptEntity),
    Semantic(SemanticEntity),
    Pattern(PatternEntity),
    Stamp(StampEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Concept(_) => EntityKind::Concept,
            Entity::Semantic(_) => EntityKind::Semantic,
            Entity::Pattern(_) => EntityKind::Pattern,
            Entity::Stamp(_) => EntityKind::Stamp,
        }
    }

    pub fn public_id(&self) -> &PublicId {
        match self {
            Entity::Concept(e) => &e.public_id,
            Entity::Semantic(e) => &e.public_id,
            Entity::Pattern(e) => &e.public_id,
            Entity::Stamp(e) => &e.public_id,
        }
    }

    /// The entity's nid, derived from its primary uuid.
    pub fn nid(&self) -> i32 {
        self.public_id().nid()
    }

    pub fn version_count(&self) -> usize {
        match self {
            Entity::Concept(e) => e.versions.len(),
            Entity::Semantic(e) => e.versions.len(),
            Entity::Pattern(e) => e.versions.len(),
            Entity::Stamp(e) => e.versions.len(),
        }
    }
}

impl From<ConceptEntity> for Entity {
    fn from(e: ConceptEntity) -> Self { Entity::Concept(e) }
}
impl From<SemanticEntity> for Entity {
    fn from(e: SemanticEntity) -> Self { Entity::Semantic(e) }
}
impl From<PatternEntity> for Entity {
    fn from(e: PatternEntity) -> Self { Entity::Pattern(e) }
}
impl From<StampEntity> for Entity {
    fn from(e: StampEntity) -> Self { Entity::Stamp(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nid_follows_primary_uuid() {
        let id = PublicId::random();
        let entity = Entity::Concept(ConceptEntity {
            public_id: id.clone(),
            versions: vec![ConceptVersion { stamp_nid: 5 }],
        });
        assert_eq!(entity.nid(), id.nid());
        assert_eq!(entity.kind(), EntityKind::Concept);
        assert_eq!(entity.version_count(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let entity = Entity::Semantic(SemanticEntity {
            public_id: PublicId::random(),
            pattern_nid: 10,
            referenced_component_nid: 20,
            versions: vec![SemanticVersion {
                stamp_nid: 30,
                fields: vec![FieldValue::Int(1), FieldValue::String("x".into())],
            }],
        });
        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
