//! # Immutable Graph & Tree Structures
//!
//! Arena-style adjacency: vertices live in an index-addressed sequence owned
//! by the structure, edges are integer index lists. Multi-parent vertices and
//! cycles are representable in [`DiGraph`]; [`DiTree`] specializes to a single
//! root, one predecessor per vertex, and no reachable cycles.
//!
//! Builders own growable state and are single-writer; `build()` freezes a
//! snapshot that is safe to share across threads without locking.

pub mod digraph;
pub mod ditree;

pub use digraph::{DiGraph, DiGraphBuilder};
pub use ditree::{DiTree, DiTreeBuilder};

use crate::model::{Vertex, UNASSIGNED_INDEX};
use crate::{Error, Result};

/// Read-only adjacency view shared by [`DiGraph`] and [`DiTree`] — the seam
/// the traversal engine walks over.
pub trait GraphAdjacency {
    fn vertex_count(&self) -> usize;

    /// Vertex at `index`, or None when out of range.
    fn vertex(&self, index: i32) -> Option<&Vertex>;

    /// Child indices of `index`; empty for a leaf.
    fn successors_of(&self, index: i32) -> &[i32];
}

/// Place a vertex into a builder's slot vector per the shared contract:
/// unassigned index → append at the next sequential slot; assigned index →
/// no-op if the slot already holds the same vertex, placeholder-grow if the
/// slot is beyond the end, reject if the slot holds a different vertex.
///
/// Returns the index the vertex occupies.
pub(crate) fn place_vertex(slots: &mut Vec<Option<Vertex>>, mut vertex: Vertex) -> Result<i32> {
    if vertex.index() == UNASSIGNED_INDEX {
        let index = slots.len() as i32;
        vertex.set_index(index);
        slots.push(Some(vertex));
        return Ok(index);
    }
    if vertex.index() < 0 {
        return Err(Error::Structural(format!(
            "vertex index {} is negative and not the unassigned sentinel",
            vertex.index()
        )));
    }

    let index = vertex.index();
    let slot = index as usize;
    if slot >= slots.len() {
        slots.resize_with(slot + 1, || None);
    }
    match &slots[slot] {
        Some(existing) if existing.id() == vertex.id() => Ok(index),
        Some(existing) => Err(Error::Structural(format!(
            "slot {index} already occupied by vertex {}, refusing {}",
            existing.id(),
            vertex.id()
        ))),
        None => {
            slots[slot] = Some(vertex);
            Ok(index)
        }
    }
}

/// Bounds-checked occupancy test for builder slot vectors.
pub(crate) fn occupied(slots: &[Option<Vertex>], index: i32) -> bool {
    index >= 0 && (index as usize) < slots.len() && slots[index as usize].is_some()
}

pub(crate) const EMPTY_INDICES: &[i32] = &[];
