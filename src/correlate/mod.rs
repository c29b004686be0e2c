//! # Isomorphism & Correlation
//!
//! Structural comparison of axiom trees and the correlation merge: given a
//! resident tree and an incoming revision of the same expression, produce a
//! merged tree that carries the incoming structure while preserving the
//! resident identities (and index positions) of every vertex whose subtree
//! content survived the revision.
//!
//! Matching is hash-driven: each vertex gets a subtree hash folding its own
//! content with the multiset of its children's subtree hashes, so equal
//! subtrees match wherever they sit. Candidate collisions are verified with
//! [`Vertex::equivalent`] before a match is claimed.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hasher};

use tracing::warn;

use crate::graph::{DiTree, DiTreeBuilder};
use crate::model::Vertex;
use crate::{Error, Result};

/// Marker for an incoming vertex with no resident counterpart.
const UNMATCHED: i32 = -1;

// ============================================================================
// Alert sink
// ============================================================================

/// Receiver for non-fatal anomalies raised during comparison and merge —
/// hash collisions, uncorrelated roots. Callers that need the messages
/// (tests, validation reports) supply their own sink; everything else uses
/// [`LogAlertSink`].
pub trait AlertSink {
    fn alert(&mut self, message: &str);
}

/// Routes alerts to the log as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&mut self, message: &str) {
        warn!(target: "termgraph::correlate", "{message}");
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Position-wise equality check: same shape, same root, equivalent vertex at
/// every index. The cheap pre-pass before hash correlation.
///
/// Errors if either tree carries staged (uncommitted) properties.
pub fn fast_equal(a: &DiTree, b: &DiTree) -> Result<bool> {
    if a.vertex_count() != b.vertex_count() || a.root() != b.root() {
        return Ok(false);
    }
    for (va, vb) in a.vertices().iter().zip(b.vertices()) {
        if !va.equivalent(vb)? {
            return Ok(false);
        }
    }
    for index in 0..a.vertex_count() as i32 {
        if a.predecessor(index) != b.predecessor(index) {
            return Ok(false);
        }
        let mut sa: Vec<i32> = a.successors_of(index).to_vec();
        let mut sb: Vec<i32> = b.successors_of(index).to_vec();
        sa.sort_unstable();
        sb.sort_unstable();
        if sa != sb {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True when the trees express the same content regardless of vertex
/// identity, index assignment, and sibling order. Failures inside the
/// comparison (staged properties, cyclic structure) are routed to `sink`
/// and reported as "not isomorphic".
pub fn isomorphic(a: &DiTree, b: &DiTree, sink: &mut dyn AlertSink) -> bool {
    match isomorphic_inner(a, b) {
        Ok(result) => result,
        Err(error) => {
            sink.alert(&format!("isomorphism check failed: {error}"));
            false
        }
    }
}

fn isomorphic_inner(a: &DiTree, b: &DiTree) -> Result<bool> {
    if a.vertex_count() != b.vertex_count() {
        return Ok(false);
    }
    if fast_equal(a, b)? {
        return Ok(true);
    }
    let hashes_a = subtree_hashes(a)?;
    let hashes_b = subtree_hashes(b)?;
    if hashes_a[a.root() as usize] != hashes_b[b.root() as usize] {
        return Ok(false);
    }
    let mut sorted_a = hashes_a;
    let mut sorted_b = hashes_b;
    sorted_a.sort_unstable();
    sorted_b.sort_unstable();
    Ok(sorted_a == sorted_b)
}

/// Bottom-up subtree hash per vertex: own content folded with the
/// order-independent multiset of child subtree hashes. Orphans unreachable
/// from the root hash by content alone.
fn subtree_hashes(tree: &DiTree) -> Result<Vec<u64>> {
    let count = tree.vertex_count();
    let mut hashes = vec![0u64; count];
    let mut computed = vec![false; count];
    let mut on_path = vec![false; count];

    // Iterative post-order: push unexpanded, expand children, hash on re-pop.
    let mut stack: Vec<(i32, bool)> = vec![(tree.root(), false)];
    while let Some((index, expanded)) = stack.pop() {
        let slot = index as usize;
        if expanded {
            let mut folded: u64 = 0;
            for &child in tree.successors_of(index) {
                folded ^= hashes[child as usize].wrapping_mul(0x9E37_79B9_7F4A_7C15);
            }
            let vertex = tree
                .vertex(index)
                .ok_or_else(|| Error::Correlation(format!("no vertex at index {index}")))?;
            let mut state = DefaultHasher::new();
            state.write_u64(vertex.content_hash());
            state.write_u64(folded);
            hashes[slot] = state.finish();
            computed[slot] = true;
            on_path[slot] = false;
        } else {
            if on_path[slot] {
                return Err(Error::Correlation(format!(
                    "cycle through vertex {index} while hashing subtrees"
                )));
            }
            if computed[slot] {
                continue;
            }
            on_path[slot] = true;
            stack.push((index, true));
            for &child in tree.successors_of(index) {
                if !computed[child as usize] {
                    stack.push((child, false));
                }
            }
        }
    }

    for vertex in tree.vertices() {
        let slot = vertex.index() as usize;
        if !computed[slot] {
            hashes[slot] = vertex.content_hash();
        }
    }
    Ok(hashes)
}

// ============================================================================
// Correlation merge
// ============================================================================

/// Match each incoming vertex of `that` to a resident vertex of `this` with
/// an equal subtree hash (verified equivalent), preferring the candidate at
/// the same index, then the lowest unclaimed index. Each resident vertex is
/// claimed at most once.
///
/// Returns one entry per incoming vertex: the matched resident index, or -1.
/// Deterministic for a given pair of trees.
pub fn correlation_solution(this: &DiTree, that: &DiTree) -> Result<Vec<i32>> {
    let this_hashes = subtree_hashes(this)?;
    let that_hashes = subtree_hashes(that)?;

    // Candidate lists are ascending by construction.
    let mut by_hash: HashMap<u64, Vec<i32>> = HashMap::new();
    for (index, &hash) in this_hashes.iter().enumerate() {
        by_hash.entry(hash).or_default().push(index as i32);
    }

    let mut claimed = vec![false; this.vertex_count()];
    let mut solution = vec![UNMATCHED; that.vertex_count()];
    for (that_index, &hash) in that_hashes.iter().enumerate() {
        let Some(candidates) = by_hash.get(&hash) else {
            continue;
        };
        let incoming = that
            .vertex(that_index as i32)
            .ok_or_else(|| Error::Correlation(format!("no vertex at index {that_index}")))?;
        let mut usable = Vec::new();
        for &candidate in candidates {
            if claimed[candidate as usize] {
                continue;
            }
            let resident = this.vertex(candidate).ok_or_else(|| {
                Error::Correlation(format!("no vertex at index {candidate}"))
            })?;
            // Hash equality is a candidate filter, not proof.
            if resident.equivalent(incoming)? {
                usable.push(candidate);
            }
        }
        let pick = usable
            .iter()
            .copied()
            .find(|&c| c == that_index as i32)
            .or_else(|| usable.first().copied());
        if let Some(chosen) = pick {
            claimed[chosen as usize] = true;
            solution[that_index] = chosen;
        }
    }
    Ok(solution)
}

/// Merge an incoming revision onto a resident tree.
///
/// The result carries `that`'s structure (edges, root, vertex content for
/// unmatched vertices) while every matched vertex keeps the resident vertex
/// from `this` — identity included. Matched vertices are renumbered by
/// rank-compacting their resident indices; unmatched vertices follow in
/// incoming order. When the trees are already position-wise equal the
/// resident tree is returned unchanged.
pub fn correlate(this: &DiTree, that: &DiTree, sink: &mut dyn AlertSink) -> Result<DiTree> {
    if fast_equal(this, that)? {
        return Ok(this.clone());
    }
    let solution = correlation_solution(this, that)?;
    if solution[that.root() as usize] == UNMATCHED {
        sink.alert("roots did not correlate; merged tree reroots on the incoming structure");
    }
    merge_with_solution(this, that, &solution)
}

fn merge_with_solution(this: &DiTree, that: &DiTree, solution: &[i32]) -> Result<DiTree> {
    // Rank-compact: matched vertices ordered by resident index, unmatched
    // appended in incoming order.
    let mut order: Vec<(i64, usize)> = solution
        .iter()
        .enumerate()
        .map(|(that_index, &matched)| {
            let key = if matched >= 0 {
                i64::from(matched)
            } else {
                this.vertex_count() as i64 + that_index as i64
            };
            (key, that_index)
        })
        .collect();
    order.sort_unstable();
    let mut dest = vec![0i32; solution.len()];
    for (rank, &(_, that_index)) in order.iter().enumerate() {
        dest[that_index] = rank as i32;
    }

    let mut builder = DiTreeBuilder::new();
    for (that_index, incoming) in that.vertices().iter().enumerate() {
        let matched = solution[that_index];
        let mut vertex: Vertex = if matched >= 0 {
            this.vertex(matched)
                .ok_or_else(|| Error::Correlation(format!("no vertex at index {matched}")))?
                .clone()
        } else {
            incoming.clone()
        };
        vertex.set_index(dest[that_index]);
        builder.add_vertex(vertex)?;
    }
    for that_index in 0..that.vertex_count() as i32 {
        let parent = dest[that_index as usize];
        for &child in that.successors_of(that_index) {
            builder.add_edge(dest[child as usize], parent)?;
        }
    }
    builder.set_root(dest[that.root() as usize])?;
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VertexId;

    #[derive(Default)]
    struct CollectSink(Vec<String>);

    impl AlertSink for CollectSink {
        fn alert(&mut self, message: &str) {
            self.0.push(message.to_owned());
        }
    }

    fn role_prop() -> crate::model::FieldValue {
        crate::model::FieldValue::ConceptRef(777)
    }

    /// root(1) → and(2) → {some(3)·role, filler(4)}
    fn resident() -> DiTree {
        let mut builder = DiTreeBuilder::new();
        let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        let some = builder
            .add_vertex(Vertex::anonymous(3).with_property(100, role_prop()))
            .unwrap();
        let filler = builder.add_vertex(Vertex::anonymous(4)).unwrap();
        builder.set_root(root).unwrap();
        builder.add_edge(and, root).unwrap();
        builder.add_edge(some, and).unwrap();
        builder.add_edge(filler, and).unwrap();
        builder.build().unwrap()
    }

    /// Same content as `resident()` but fresh identities and reordered
    /// construction, so indices differ.
    fn incoming_relabelled() -> DiTree {
        let mut builder = DiTreeBuilder::new();
        let filler = builder.add_vertex(Vertex::anonymous(4)).unwrap();
        let some = builder
            .add_vertex(Vertex::anonymous(3).with_property(100, role_prop()))
            .unwrap();
        let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        builder.set_root(root).unwrap();
        builder.add_edge(and, root).unwrap();
        builder.add_edge(some, and).unwrap();
        builder.add_edge(filler, and).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn fast_equal_is_positional() {
        let a = resident();
        assert!(fast_equal(&a, &a).unwrap());
        assert!(!fast_equal(&a, &incoming_relabelled()).unwrap());
    }

    #[test]
    fn isomorphism_ignores_identity_and_position() {
        let mut sink = CollectSink::default();
        assert!(isomorphic(&resident(), &incoming_relabelled(), &mut sink));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn isomorphism_rejects_different_content() {
        let a = resident();
        let mut builder = DiTreeBuilder::new();
        let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let other = builder.add_vertex(Vertex::anonymous(99)).unwrap();
        builder.set_root(root).unwrap();
        builder.add_edge(other, root).unwrap();
        let b = builder.build().unwrap();

        let mut sink = CollectSink::default();
        assert!(!isomorphic(&a, &b, &mut sink));
    }

    #[test]
    fn correlate_fast_path_returns_resident() {
        let a = resident();
        let merged = correlate(&a, &a.clone(), &mut LogAlertSink).unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn correlate_preserves_resident_identities() {
        let this = resident();
        let that = incoming_relabelled();
        let merged = correlate(&this, &that, &mut LogAlertSink).unwrap();

        assert_eq!(merged.vertex_count(), 4);
        // Every merged vertex keeps a resident identity.
        let resident_ids: Vec<VertexId> = this.vertices().iter().map(|v| v.id()).collect();
        for vertex in merged.vertices() {
            assert!(resident_ids.contains(&vertex.id()), "fresh identity leaked in");
        }
        // Matched vertices rank-compact back onto the resident layout.
        for (index, vertex) in merged.vertices().iter().enumerate() {
            assert_eq!(vertex.index(), index as i32);
            assert_eq!(vertex.meaning(), this.vertex(index as i32).unwrap().meaning());
        }
        assert_eq!(merged.root(), this.root());
    }

    #[test]
    fn correlate_appends_unmatched_vertices() {
        let this = resident();

        // Incoming adds one new leaf under "and".
        let mut builder = DiTreeBuilder::new();
        let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        let some = builder
            .add_vertex(Vertex::anonymous(3).with_property(100, role_prop()))
            .unwrap();
        let filler = builder.add_vertex(Vertex::anonymous(4)).unwrap();
        let extra = builder.add_vertex(Vertex::anonymous(5)).unwrap();
        builder.set_root(root).unwrap();
        builder.add_edge(and, root).unwrap();
        builder.add_edge(some, and).unwrap();
        builder.add_edge(filler, and).unwrap();
        builder.add_edge(extra, and).unwrap();
        let that = builder.build().unwrap();

        let merged = correlate(&this, &that, &mut LogAlertSink).unwrap();
        assert_eq!(merged.vertex_count(), 5);
        // The fresh vertex lands after every matched one.
        let fresh = merged
            .vertices()
            .iter()
            .find(|v| v.meaning() == 5)
            .expect("new leaf present");
        assert_eq!(fresh.index(), 4);
        // Subtree match fails above the changed vertex, so ancestors of the
        // new leaf get fresh matches only where content still agrees.
        let leaf_some = merged.vertices().iter().find(|v| v.meaning() == 3).unwrap();
        assert_eq!(leaf_some.id(), this.vertex(2).unwrap().id());
    }

    #[test]
    fn correlation_solution_is_deterministic() {
        let this = resident();
        let that = incoming_relabelled();
        let first = correlation_solution(&this, &that).unwrap();
        let second = correlation_solution(&this, &that).unwrap();
        assert_eq!(first, second);
        // Relabelled copy matches completely.
        assert!(first.iter().all(|&m| m >= 0));
    }

    #[test]
    fn staged_properties_surface_through_the_sink() {
        let mut builder = DiTreeBuilder::new();
        let mut vertex = Vertex::anonymous(1);
        vertex.stage_property(1, 10);
        let root = builder.add_vertex(vertex).unwrap();
        builder.set_root(root).unwrap();
        let staged = builder.build().unwrap();

        let mut sink = CollectSink::default();
        assert!(!isomorphic(&staged, &staged.clone(), &mut sink));
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].contains("staged"));
    }
}
