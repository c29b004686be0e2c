//! Field values — the tagged union carried by vertex properties and the
//! fields of semantic versions.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{DiGraph, DiTree};

// ============================================================================
// Stamp
// ============================================================================

/// STAMP — {status, time, author, module, path}, the versioning unit attached
/// to every entity version. All five coordinates except `time` are concept
/// nids; `time` is epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub status: i32,
    pub time: i64,
    pub author: i32,
    pub module: i32,
    pub path: i32,
}

impl Stamp {
    pub fn new(status: i32, time: i64, author: i32, module: i32, path: i32) -> Self {
        Self { status, time, author, module, path }
    }

    /// Commit time as a UTC timestamp. Out-of-range values clamp to the epoch.
    pub fn time_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.time).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "s:{} t:{} a:{} m:{} p:{}",
            self.status,
            self.time_utc().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.author,
            self.module,
            self.path,
        )
    }
}

// ============================================================================
// FieldValue
// ============================================================================

/// Value of a vertex property or semantic field.
///
/// Covers the full terminology field system:
/// - References: ConceptRef, SemanticRef, PatternRef (nids)
/// - Provenance: an inline STAMP snapshot
/// - Scalars: Int, Long, Float, Bytes, String (opaque passthrough)
/// - Structures: a nested axiom tree or graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    ConceptRef(i32),
    SemanticRef(i32),
    PatternRef(i32),
    Stamp(Stamp),
    Int(i32),
    Long(i64),
    Float(f32),
    Bytes(Vec<u8>),
    String(String),
    DiTree(Box<DiTree>),
    DiGraph(Box<DiGraph>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::ConceptRef(_) => "CONCEPT",
            FieldValue::SemanticRef(_) => "SEMANTIC",
            FieldValue::PatternRef(_) => "PATTERN",
            FieldValue::Stamp(_) => "STAMP",
            FieldValue::Int(_) => "INT",
            FieldValue::Long(_) => "LONG",
            FieldValue::Float(_) => "FLOAT",
            FieldValue::Bytes(_) => "BYTES",
            FieldValue::String(_) => "STRING",
            FieldValue::DiTree(_) => "DITREE",
            FieldValue::DiGraph(_) => "DIGRAPH",
        }
    }

    /// The referenced nid, for the three reference variants.
    pub fn as_nid(&self) -> Option<i32> {
        match self {
            FieldValue::ConceptRef(nid)
            | FieldValue::SemanticRef(nid)
            | FieldValue::PatternRef(nid) => Some(*nid),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Long(l) => Some(*l),
            FieldValue::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&DiTree> {
        match self {
            FieldValue::DiTree(t) => Some(t),
            _ => None,
        }
    }

    /// Content hash contribution, used by the correlation matcher. Floats hash
    /// by bit pattern; nested structures fold in every vertex and edge.
    pub fn hash_content<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FieldValue::ConceptRef(n)
            | FieldValue::SemanticRef(n)
            | FieldValue::PatternRef(n)
            | FieldValue::Int(n) => n.hash(state),
            FieldValue::Long(l) => l.hash(state),
            FieldValue::Float(f) => f.to_bits().hash(state),
            FieldValue::Stamp(s) => s.hash(state),
            FieldValue::Bytes(b) => b.hash(state),
            FieldValue::String(s) => s.hash(state),
            FieldValue::DiTree(t) => t.hash_content(state),
            FieldValue::DiGraph(g) => g.hash_content(state),
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { FieldValue::Int(v) }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { FieldValue::Long(v) }
}
impl From<f32> for FieldValue {
    fn from(v: f32) -> Self { FieldValue::Float(v) }
}
impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { FieldValue::String(v.to_owned()) }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self { FieldValue::String(v) }
}
impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self { FieldValue::Bytes(v) }
}
impl From<Stamp> for FieldValue {
    fn from(v: Stamp) -> Self { FieldValue::Stamp(v) }
}
impl From<DiTree> for FieldValue {
    fn from(v: DiTree) -> Self { FieldValue::DiTree(Box::new(v)) }
}
impl From<DiGraph> for FieldValue {
    fn from(v: DiGraph) -> Self { FieldValue::DiGraph(Box::new(v)) }
}

// ============================================================================
// Display
// ============================================================================

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::ConceptRef(n) => write!(f, "concept({n})"),
            FieldValue::SemanticRef(n) => write!(f, "semantic({n})"),
            FieldValue::PatternRef(n) => write!(f, "pattern({n})"),
            FieldValue::Stamp(s) => write!(f, "stamp({s})"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Long(l) => write!(f, "{l}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bytes(b) => write!(f, "<bytes[{}]>", b.len()),
            FieldValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            FieldValue::DiTree(t) => write!(f, "<tree[{}]>", t.vertex_count()),
            FieldValue::DiGraph(g) => write!(f, "<graph[{}]>", g.vertex_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::DefaultHasher;

    fn content_hash(v: &FieldValue) -> u64 {
        let mut state = DefaultHasher::new();
        v.hash_content(&mut state);
        state.finish()
    }

    #[test]
    fn test_field_value_from() {
        assert_eq!(FieldValue::from(42), FieldValue::Int(42));
        assert_eq!(FieldValue::from(42i64), FieldValue::Long(42));
        assert_eq!(FieldValue::from("hello"), FieldValue::String("hello".into()));
    }

    #[test]
    fn test_same_payload_different_variant_hashes_differently() {
        assert_ne!(
            content_hash(&FieldValue::ConceptRef(7)),
            content_hash(&FieldValue::SemanticRef(7)),
        );
        assert_eq!(
            content_hash(&FieldValue::ConceptRef(7)),
            content_hash(&FieldValue::ConceptRef(7)),
        );
    }

    #[test]
    fn test_stamp_time_utc() {
        let stamp = Stamp::new(1, 0, 2, 3, 4);
        assert_eq!(stamp.time_utc(), DateTime::UNIX_EPOCH);
        assert_eq!(Stamp::new(1, i64::MAX, 2, 3, 4).time_utc(), DateTime::UNIX_EPOCH);
    }
}
