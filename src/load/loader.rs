//! Multi-pass bulk loader.
//!
//! Non-semantic chronologies commit in the first pass — their cross-
//! references are identity-only, and a nid can be derived from a public id
//! without the referent being present. Semantics are the dependency-carrying
//! kind: a semantic may reference a pattern or component delivered later in
//! the stream (or by another semantic), so unresolved semantics are deferred
//! and the pending set is replayed until it empties, stops shrinking, or the
//! pass cap trips.

use tracing::{debug, info, warn};

use super::archive::{
    Archive, ConceptMessage, MessageKind, PatternMessage, SemanticMessage, StampMessage,
};
use crate::entity::{
    ConceptEntity, ConceptVersion, Entity, FieldDefinition, PatternEntity, PatternVersion,
    SemanticEntity, SemanticVersion, StampEntity,
};
use crate::store::EntityStore;
use crate::{Error, Result};

/// Upper bound on semantic retry passes. A well-formed archive needs one pass
/// per level of its deepest dependency chain; hitting the cap means the
/// archive is circular or absurdly deep.
pub const MAX_PASSES: usize = 100;

// ============================================================================
// ImportSummary
// ============================================================================

/// What an import actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub concepts: u64,
    pub semantics: u64,
    pub patterns: u64,
    pub stamps: u64,
    /// Total passes over the stream, the first (non-semantic) pass included.
    pub passes: usize,
}

impl ImportSummary {
    pub fn total(&self) -> u64 {
        self.concepts + self.semantics + self.patterns + self.stamps
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entities ({} concepts, {} semantics, {} patterns, {} stamps) in {} passes",
            self.total(),
            self.concepts,
            self.semantics,
            self.patterns,
            self.stamps,
            self.passes,
        )
    }
}

// ============================================================================
// Load-phase guard
// ============================================================================

/// Brackets the store's load phase for the lifetime of one import, closing it
/// on every exit path.
struct LoadPhase<'a, S: EntityStore>(&'a S);

impl<'a, S: EntityStore> LoadPhase<'a, S> {
    fn open(store: &'a S) -> Self {
        store.begin_load_phase();
        Self(store)
    }
}

impl<S: EntityStore> Drop for LoadPhase<'_, S> {
    fn drop(&mut self) {
        self.0.end_load_phase();
    }
}

// ============================================================================
// BulkLoader
// ============================================================================

/// Replays a changeset archive into an entity store.
pub struct BulkLoader<'a, S: EntityStore> {
    store: &'a S,
}

impl<'a, S: EntityStore> BulkLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Import with dependency-driven retries. Commits are immediate, so a
    /// semantic resolved mid-pass can unblock later messages in the same
    /// pass. Fails if the pending set stops shrinking, the pass cap trips, or
    /// the imported total disagrees with the manifest.
    pub fn load(&self, archive: &Archive) -> Result<ImportSummary> {
        let _phase = LoadPhase::open(self.store);
        let mut summary = ImportSummary::default();

        let pending = self.first_pass(archive, &mut summary)?;
        summary.passes = 1;
        self.drain_semantics(pending, &mut summary)?;
        self.reconcile(archive, &summary)?;
        info!(target: "termgraph::load", %summary, "import complete");
        Ok(summary)
    }

    /// Import an archive whose messages are promised to arrive in dependency
    /// order. Strictly one pass in stream order — every message, semantic or
    /// not, commits at its stream position, and the first unresolved
    /// reference fails the import instead of deferring.
    pub fn load_ordered(&self, archive: &Archive) -> Result<ImportSummary> {
        let _phase = LoadPhase::open(self.store);
        let mut summary = ImportSummary { passes: 1, ..ImportSummary::default() };

        for message in archive.messages() {
            match message.kind {
                MessageKind::ConceptChronology => {
                    let decoded = ConceptMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(concept_entity(&decoded))?;
                    summary.concepts += 1;
                }
                MessageKind::StampChronology => {
                    let decoded = StampMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(stamp_entity(&decoded))?;
                    summary.stamps += 1;
                }
                MessageKind::PatternChronology => {
                    let decoded = PatternMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(pattern_entity(&decoded))?;
                    summary.patterns += 1;
                }
                MessageKind::SemanticChronology => {
                    let decoded = SemanticMessage::decode(&message.payload)?;
                    self.commit_semantic(&decoded)?;
                    summary.semantics += 1;
                }
            }
        }
        self.reconcile(archive, &summary)?;
        info!(target: "termgraph::load", %summary, "ordered import complete");
        Ok(summary)
    }

    /// Pass 1: decode everything, commit every non-semantic chronology, and
    /// collect the semantic messages for the retry passes.
    fn first_pass(
        &self,
        archive: &Archive,
        summary: &mut ImportSummary,
    ) -> Result<Vec<SemanticMessage>> {
        let mut pending = Vec::new();
        for message in archive.messages() {
            match message.kind {
                MessageKind::ConceptChronology => {
                    let decoded = ConceptMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(concept_entity(&decoded))?;
                    summary.concepts += 1;
                }
                MessageKind::StampChronology => {
                    let decoded = StampMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(stamp_entity(&decoded))?;
                    summary.stamps += 1;
                }
                MessageKind::PatternChronology => {
                    let decoded = PatternMessage::decode(&message.payload)?;
                    self.store.put_entity_quietly(pattern_entity(&decoded))?;
                    summary.patterns += 1;
                }
                MessageKind::SemanticChronology => {
                    pending.push(SemanticMessage::decode(&message.payload)?);
                }
            }
        }
        info!(
            target: "termgraph::load",
            committed = summary.total(),
            deferred = pending.len(),
            "first pass complete"
        );
        Ok(pending)
    }

    /// Retry passes over the pending semantics, stream order preserved, until
    /// the set empties or reaches a fixed point.
    fn drain_semantics(
        &self,
        mut pending: Vec<SemanticMessage>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        while !pending.is_empty() {
            if summary.passes >= MAX_PASSES {
                return Err(Error::UnresolvedReference(format!(
                    "{} semantic messages still unresolved after {MAX_PASSES} passes",
                    pending.len()
                )));
            }
            summary.passes += 1;
            let before = pending.len();
            let mut deferred = Vec::new();
            for message in pending {
                match self.commit_semantic(&message) {
                    Ok(()) => summary.semantics += 1,
                    Err(Error::UnresolvedReference(reason)) => {
                        debug!(
                            target: "termgraph::load",
                            semantic = %message.public_id,
                            %reason,
                            "deferring semantic"
                        );
                        deferred.push(message);
                    }
                    Err(other) => return Err(other),
                }
            }
            info!(
                target: "termgraph::load",
                pass = summary.passes,
                committed = before - deferred.len(),
                deferred = deferred.len(),
                "semantic pass complete"
            );
            if deferred.len() == before {
                // Fixed point: nothing left in the stream can satisfy these.
                warn!(
                    target: "termgraph::load",
                    unresolved = deferred.len(),
                    "import reached a fixed point with unresolved semantics"
                );
                let sample = deferred
                    .first()
                    .map(|m| m.public_id.to_string())
                    .unwrap_or_default();
                return Err(Error::UnresolvedReference(format!(
                    "{} semantic messages cannot be resolved (first: {sample})",
                    deferred.len()
                )));
            }
            pending = deferred;
        }
        Ok(())
    }

    /// Commit one semantic, or report which reference is still missing.
    fn commit_semantic(&self, message: &SemanticMessage) -> Result<()> {
        let pattern_nid = message.pattern.nid();
        if !self.store.contains(pattern_nid) {
            return Err(Error::UnresolvedReference(format!(
                "pattern {} not yet in store",
                message.pattern
            )));
        }
        let referenced_component_nid = message.referenced_component.nid();
        if !self.store.contains(referenced_component_nid) {
            return Err(Error::UnresolvedReference(format!(
                "referenced component {} not yet in store",
                message.referenced_component
            )));
        }
        self.store.put_entity_quietly(Entity::Semantic(SemanticEntity {
            public_id: message.public_id.clone(),
            pattern_nid,
            referenced_component_nid,
            versions: message
                .versions
                .iter()
                .map(|v| SemanticVersion {
                    stamp_nid: v.stamp.nid(),
                    fields: v.fields.clone(),
                })
                .collect(),
        }))
    }

    fn reconcile(&self, archive: &Archive, summary: &ImportSummary) -> Result<()> {
        let expected = archive.manifest().total_count;
        if summary.total() != expected {
            return Err(Error::CountMismatch { expected, imported: summary.total() });
        }
        Ok(())
    }
}

fn concept_entity(message: &ConceptMessage) -> Entity {
    Entity::Concept(ConceptEntity {
        public_id: message.public_id.clone(),
        versions: message
            .version_stamps
            .iter()
            .map(|stamp| ConceptVersion { stamp_nid: stamp.nid() })
            .collect(),
    })
}

fn stamp_entity(message: &StampMessage) -> Entity {
    Entity::Stamp(StampEntity {
        public_id: message.public_id.clone(),
        versions: message.versions.clone(),
    })
}

fn pattern_entity(message: &PatternMessage) -> Entity {
    Entity::Pattern(PatternEntity {
        public_id: message.public_id.clone(),
        versions: message
            .versions
            .iter()
            .map(|v| PatternVersion {
                stamp_nid: v.stamp.nid(),
                referenced_component_purpose_nid: v.referenced_component_purpose.nid(),
                referenced_component_meaning_nid: v.referenced_component_meaning.nid(),
                field_definitions: v
                    .field_definitions
                    .iter()
                    .map(|f| FieldDefinition {
                        meaning_nid: f.meaning.nid(),
                        purpose_nid: f.purpose.nid(),
                        data_type_nid: f.data_type.nid(),
                    })
                    .collect(),
            })
            .collect(),
    })
}
