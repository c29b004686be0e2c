//! General directed graph: multiple roots, multi-parent vertices, cycles
//! permitted.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{occupied, place_vertex, GraphAdjacency, EMPTY_INDICES};
use crate::model::Vertex;
use crate::{Error, Result};

type IndexList = SmallVec<[i32; 4]>;

// ============================================================================
// DiGraph
// ============================================================================

/// Immutable directed graph of vertices. Once built, safe to share and read
/// concurrently without locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiGraph {
    vertices: Vec<Vertex>,
    successors: HashMap<i32, IndexList>,
    predecessors: HashMap<i32, IndexList>,
    roots: Vec<i32>,
}

impl DiGraph {
    /// Assemble from already-validated parts. Used by the builder's freeze and
    /// the binary decoder; every adjacency index must be a valid vertex index
    /// and every vertex's stored index must equal its position.
    pub(crate) fn from_parts(
        vertices: Vec<Vertex>,
        successors: HashMap<i32, IndexList>,
        predecessors: HashMap<i32, IndexList>,
        roots: Vec<i32>,
    ) -> Result<Self> {
        let count = vertices.len() as i32;
        let in_range = |index: i32| index >= 0 && index < count;

        for (position, vertex) in vertices.iter().enumerate() {
            if vertex.index() != position as i32 {
                return Err(Error::Structural(format!(
                    "vertex at position {position} carries index {}",
                    vertex.index()
                )));
            }
        }
        for (&source, targets) in successors.iter().chain(predecessors.iter()) {
            if !in_range(source) || targets.iter().any(|&t| !in_range(t)) {
                return Err(Error::Structural(format!(
                    "adjacency entry for {source} references an index outside 0..{count}"
                )));
            }
        }
        if roots.iter().any(|&r| !in_range(r)) {
            return Err(Error::Structural("root index out of range".into()));
        }
        Ok(Self { vertices, successors, predecessors, roots })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, index: i32) -> Option<&Vertex> {
        usize::try_from(index).ok().and_then(|i| self.vertices.get(i))
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn successors_of(&self, index: i32) -> &[i32] {
        self.successors.get(&index).map_or(EMPTY_INDICES, |list| list)
    }

    /// Parent indices of `index`; a vertex may have 0, 1, or many parents.
    pub fn predecessors_of(&self, index: i32) -> &[i32] {
        self.predecessors.get(&index).map_or(EMPTY_INDICES, |list| list)
    }

    pub fn roots(&self) -> &[i32] {
        &self.roots
    }

    pub(crate) fn successor_map(&self) -> &HashMap<i32, IndexList> {
        &self.successors
    }

    pub(crate) fn predecessor_map(&self) -> &HashMap<i32, IndexList> {
        &self.predecessors
    }

    /// Order-independent content hash over vertices and edges.
    pub fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.vertices.len().hash(state);
        let mut folded: u64 = 0;
        for vertex in &self.vertices {
            folded ^= vertex.content_hash().rotate_left(vertex.index() as u32 % 63);
        }
        state.write_u64(folded);
        let mut edges: u64 = 0;
        for (&source, targets) in &self.successors {
            for &target in targets {
                edges ^= ((source as u64) << 32 | (target as u64 & 0xFFFF_FFFF))
                    .wrapping_mul(0x9E37_79B9_7F4A_7C15);
            }
        }
        state.write_u64(edges);
    }
}

impl GraphAdjacency for DiGraph {
    fn vertex_count(&self) -> usize {
        DiGraph::vertex_count(self)
    }
    fn vertex(&self, index: i32) -> Option<&Vertex> {
        DiGraph::vertex(self, index)
    }
    fn successors_of(&self, index: i32) -> &[i32] {
        DiGraph::successors_of(self, index)
    }
}

// ============================================================================
// DiGraphBuilder
// ============================================================================

/// Staging arena for a [`DiGraph`]. Single-writer; `build()` may be called
/// repeatedly, each snapshot independent of later mutations.
#[derive(Debug, Default)]
pub struct DiGraphBuilder {
    vertices: Vec<Option<Vertex>>,
    successors: HashMap<i32, IndexList>,
    predecessors: HashMap<i32, IndexList>,
    roots: Vec<i32>,
}

impl DiGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, assigning the next sequential index if unassigned.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<i32> {
        place_vertex(&mut self.vertices, vertex)
    }

    /// Record `child` as a successor of `parent` and `parent` as one of
    /// `child`'s predecessors. Absent endpoints are ignored — the graph
    /// builder does not grow adjacency for vertices that were never added.
    pub fn add_edge(&mut self, child: i32, parent: i32) {
        if !occupied(&self.vertices, child) || !occupied(&self.vertices, parent) {
            return;
        }
        self.successors.entry(parent).or_default().push(child);
        self.predecessors.entry(child).or_default().push(parent);
    }

    /// Designate an additional root. The vertex must already be added.
    pub fn add_root(&mut self, index: i32) -> Result<()> {
        if !occupied(&self.vertices, index) {
            return Err(Error::Structural(format!("no vertex at index {index} to root")));
        }
        if !self.roots.contains(&index) {
            self.roots.push(index);
        }
        Ok(())
    }

    pub fn vertex(&self, index: i32) -> Option<&Vertex> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.vertices.get(i))
            .and_then(|slot| slot.as_ref())
    }

    /// Freeze the current state into an immutable graph. Rejects placeholder
    /// slots left by out-of-order `add_vertex` calls.
    pub fn build(&self) -> Result<DiGraph> {
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for (position, slot) in self.vertices.iter().enumerate() {
            match slot {
                Some(vertex) => vertices.push(vertex.clone()),
                None => {
                    return Err(Error::Structural(format!(
                        "vertex slot {position} was never filled"
                    )))
                }
            }
        }
        DiGraph::from_parts(
            vertices,
            self.successors.clone(),
            self.predecessors.clone(),
            self.roots.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_multi_parent_graph() {
        let mut builder = DiGraphBuilder::new();
        let a = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let b = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        let shared = builder.add_vertex(Vertex::anonymous(3)).unwrap();
        builder.add_root(a).unwrap();
        builder.add_root(b).unwrap();
        builder.add_edge(shared, a);
        builder.add_edge(shared, b);

        let graph = builder.build().unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.roots(), &[a, b]);
        assert_eq!(graph.predecessors_of(shared), &[a, b]);
        assert_eq!(graph.successors_of(a), &[shared]);
    }

    #[test]
    fn edge_to_absent_vertex_is_ignored() {
        let mut builder = DiGraphBuilder::new();
        let a = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        builder.add_edge(99, a);
        builder.add_edge(a, 99);
        builder.add_root(a).unwrap();

        let graph = builder.build().unwrap();
        assert!(graph.successors_of(a).is_empty());
        assert!(graph.predecessors_of(a).is_empty());
    }

    #[test]
    fn build_rejects_unfilled_placeholder() {
        let mut builder = DiGraphBuilder::new();
        let mut vertex = Vertex::anonymous(1);
        vertex.set_index(2); // leaves slots 0 and 1 as placeholders
        builder.add_vertex(vertex).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn cycles_are_permitted() {
        let mut builder = DiGraphBuilder::new();
        let a = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let b = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        builder.add_root(a).unwrap();
        builder.add_edge(b, a);
        builder.add_edge(a, b);

        let graph = builder.build().unwrap();
        assert_eq!(graph.successors_of(a), &[b]);
        assert_eq!(graph.successors_of(b), &[a]);
    }

    #[test]
    fn snapshots_are_independent() {
        let mut builder = DiGraphBuilder::new();
        let a = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        builder.add_root(a).unwrap();
        let first = builder.build().unwrap();

        let b = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        builder.add_edge(b, a);
        let second = builder.build().unwrap();

        assert_eq!(first.vertex_count(), 1);
        assert_eq!(second.vertex_count(), 2);
        assert!(first.successors_of(a).is_empty());
    }
}
