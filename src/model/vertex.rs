//! A single node in an axiom graph or tree.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{FieldValue, VertexId};
use crate::{Error, Result};

/// Sentinel for a vertex that has not yet been placed in a graph. Only legal
/// inside a builder; built structures never contain unassigned vertices.
pub const UNASSIGNED_INDEX: i32 = -1;

/// A vertex: stable identity, position index, a "meaning" concept reference,
/// and a property map keyed by concept nid.
///
/// Properties live in two tiers. The *committed* tier is immutable once the
/// owning structure is built; the *uncommitted* tier is a mutable overlay
/// staged ahead of a commit, folded into committed storage by
/// [`commit_properties`](Vertex::commit_properties).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    id: VertexId,
    index: i32,
    meaning: i32,
    committed: HashMap<i32, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uncommitted: Option<HashMap<i32, FieldValue>>,
}

impl Vertex {
    pub fn new(id: VertexId, meaning: i32) -> Self {
        Self {
            id,
            index: UNASSIGNED_INDEX,
            meaning,
            committed: HashMap::new(),
            uncommitted: None,
        }
    }

    /// Vertex with a fresh random identity.
    pub fn anonymous(meaning: i32) -> Self {
        Self::new(VertexId::random(), meaning)
    }

    pub fn with_property(mut self, key: i32, value: impl Into<FieldValue>) -> Self {
        self.committed.insert(key, value.into());
        self
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Position within the owning structure; [`UNASSIGNED_INDEX`] inside a
    /// builder before placement.
    pub fn index(&self) -> i32 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: i32) {
        self.index = index;
    }

    /// The concept this vertex "is" — AND, SOME, a role, a filler concept.
    pub fn meaning(&self) -> i32 {
        self.meaning
    }

    /// Read a property, staged overlay first, then committed storage.
    pub fn property(&self, key: i32) -> Option<&FieldValue> {
        if let Some(overlay) = &self.uncommitted {
            if let Some(value) = overlay.get(&key) {
                return Some(value);
            }
        }
        self.committed.get(&key)
    }

    pub fn committed_properties(&self) -> &HashMap<i32, FieldValue> {
        &self.committed
    }

    pub fn uncommitted_properties(&self) -> Option<&HashMap<i32, FieldValue>> {
        self.uncommitted.as_ref()
    }

    pub fn has_uncommitted(&self) -> bool {
        self.uncommitted.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Stage a property write in the uncommitted overlay.
    pub fn stage_property(&mut self, key: i32, value: impl Into<FieldValue>) {
        self.uncommitted
            .get_or_insert_with(HashMap::new)
            .insert(key, value.into());
    }

    /// Fold the staged overlay into committed storage, last writer wins per
    /// key, and clear the overlay.
    ///
    /// Not thread-safe. Callers that stage edits from multiple threads must
    /// serialize this externally.
    pub fn commit_properties(&mut self) {
        if let Some(overlay) = self.uncommitted.take() {
            self.committed.extend(overlay);
        }
    }

    /// Structural equivalence: same meaning and committed properties,
    /// regardless of identity and index.
    ///
    /// Defined only for committed states — errors if either side carries
    /// staged properties.
    pub fn equivalent(&self, other: &Vertex) -> Result<bool> {
        if self.has_uncommitted() || other.has_uncommitted() {
            return Err(Error::Structural(
                "vertex equivalence is undefined while properties are staged; \
                 call commit_properties() first"
                    .into(),
            ));
        }
        Ok(self.meaning == other.meaning && self.committed == other.committed)
    }

    /// Order-independent hash of meaning + committed properties, the per-vertex
    /// input to the correlation matcher's subtree hashing.
    pub fn content_hash(&self) -> u64 {
        let mut state = DefaultHasher::new();
        self.meaning.hash(&mut state);
        let mut folded: u64 = 0;
        for (key, value) in &self.committed {
            let mut entry = DefaultHasher::new();
            key.hash(&mut entry);
            value.hash_content(&mut entry);
            folded ^= entry.finish();
        }
        state.write_u64(folded);
        state.finish()
    }
}

/// Equality covers identity, meaning, and both property tiers — but not the
/// position index, which is an artifact of the owning structure.
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.meaning == other.meaning
            && self.committed == other.committed
            && self.uncommitted == other.uncommitted
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] meaning:{}", self.index, self.meaning)?;
        if !self.committed.is_empty() {
            let mut keys: Vec<i32> = self.committed.keys().copied().collect();
            keys.sort_unstable();
            write!(f, " {{")?;
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: {}", self.committed[key])?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
