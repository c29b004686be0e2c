//! Directed tree: single root, one predecessor per vertex, no reachable
//! cycles. Specialization of the general directed graph.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{occupied, place_vertex, GraphAdjacency, EMPTY_INDICES};
use crate::model::{Vertex, UNASSIGNED_INDEX};
use crate::traverse::MAX_DFS_DEPTH;
use crate::{Error, Result};

type IndexList = SmallVec<[i32; 4]>;

/// Tombstone marker in the old→new index map built by `compress()`.
const REMOVED: i32 = -1;

// ============================================================================
// DiTree
// ============================================================================

/// Immutable directed tree. Once built, safe to share and read concurrently
/// without locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiTree {
    vertices: Vec<Vertex>,
    successors: HashMap<i32, IndexList>,
    predecessors: HashMap<i32, i32>,
    root: i32,
}

impl DiTree {
    /// Assemble from already-validated parts. Used by the builder's freeze and
    /// the binary decoder.
    pub(crate) fn from_parts(
        vertices: Vec<Vertex>,
        successors: HashMap<i32, IndexList>,
        predecessors: HashMap<i32, i32>,
        root: i32,
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
        for (&source, targets) in &successors {
            if !in_range(source) || targets.iter().any(|&t| !in_range(t)) {
                return Err(Error::Structural(format!(
                    "successor entry for {source} references an index outside 0..{count}"
                )));
            }
        }
        for (&child, &parent) in &predecessors {
            if !in_range(child) || !in_range(parent) {
                return Err(Error::Structural(format!(
                    "predecessor entry {child}→{parent} references an index outside 0..{count}"
                )));
            }
            // Each predecessor claim must be mirrored by the successor map.
            if !successors.get(&parent).is_some_and(|list| list.contains(&child)) {
                return Err(Error::Structural(format!(
                    "predecessor entry {child}→{parent} has no matching successor edge"
                )));
            }
        }
        for (&parent, targets) in &successors {
            for &child in targets {
                if predecessors.get(&child) != Some(&parent) {
                    return Err(Error::Structural(format!(
                        "successor edge {parent}→{child} contradicts the predecessor map"
                    )));
                }
            }
        }
        if !in_range(root) {
            return Err(Error::Structural(format!("root index {root} out of range")));
        }
        if predecessors.contains_key(&root) {
            return Err(Error::Structural(format!(
                "root vertex {root} carries a predecessor"
            )));
        }
        Ok(Self { vertices, successors, predecessors, root })
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

    pub fn root(&self) -> i32 {
        self.root
    }

    pub fn successors_of(&self, index: i32) -> &[i32] {
        self.successors.get(&index).map_or(EMPTY_INDICES, |list| list)
    }

    /// The single parent of `index`; None means `index` is the root (or an
    /// orphan left behind by a builder mutation).
    pub fn predecessor(&self, index: i32) -> Option<i32> {
        self.predecessors.get(&index).copied()
    }

    pub(crate) fn successor_map(&self) -> &HashMap<i32, IndexList> {
        &self.successors
    }

    pub(crate) fn predecessor_map(&self) -> &HashMap<i32, i32> {
        &self.predecessors
    }

    /// Remove the vertex at `index` **and all of its transitive successors**,
    /// returning a new builder holding the surviving subset, renumbered dense.
    ///
    /// The tree itself is immutable; call `build()` on the returned builder
    /// for the trimmed snapshot. Removing the root is rejected.
    pub fn remove_vertex(&self, index: i32) -> Result<DiTreeBuilder> {
        if index == self.root {
            return Err(Error::Structural("cannot remove the root vertex".into()));
        }
        if self.vertex(index).is_none() {
            return Err(Error::Structural(format!("no vertex at index {index}")));
        }

        // Solution vector: keep everything, then mark the doomed subtree.
        let mut solution: Vec<i32> = (0..self.vertices.len() as i32).collect();
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            if solution[current as usize] == REMOVED {
                continue;
            }
            solution[current as usize] = REMOVED;
            stack.extend_from_slice(self.successors_of(current));
        }

        let mut builder = DiTreeBuilder::new();
        let mut index_map = HashMap::new();
        builder.add_vertexes_with_map(self, &solution, Some(&mut index_map), &[self.root])?;
        let new_root = index_map[&self.root];
        builder.set_root(new_root)?;
        Ok(builder)
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
        for (&child, &parent) in &self.predecessors {
            edges ^= (((child as u64) << 32) | (parent as u64 & 0xFFFF_FFFF))
                .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        }
        state.write_u64(edges);
        self.root.hash(state);
    }

    fn fmt_subtree(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        index: i32,
        depth: usize,
    ) -> std::fmt::Result {
        if depth > MAX_DFS_DEPTH {
            return writeln!(f, "{:indent$}…", "", indent = depth * 2);
        }
        let Some(vertex) = self.vertex(index) else {
            return Ok(());
        };
        writeln!(f, "{:indent$}{vertex}", "", indent = depth * 2)?;
        for &child in self.successors_of(index) {
            self.fmt_subtree(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DiTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_subtree(f, self.root, 0)
    }
}

impl GraphAdjacency for DiTree {
    fn vertex_count(&self) -> usize {
        DiTree::vertex_count(self)
    }
    fn vertex(&self, index: i32) -> Option<&Vertex> {
        DiTree::vertex(self, index)
    }
    fn successors_of(&self, index: i32) -> &[i32] {
        DiTree::successors_of(self, index)
    }
}

// ============================================================================
// DiTreeBuilder
// ============================================================================

/// Staging arena for a [`DiTree`]. Single-writer; `build()` may be called
/// repeatedly, each snapshot independent of later mutations.
#[derive(Debug, Default)]
pub struct DiTreeBuilder {
    vertices: Vec<Option<Vertex>>,
    successors: HashMap<i32, IndexList>,
    predecessors: HashMap<i32, i32>,
    root: Option<i32>,
}

impl DiTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, assigning the next sequential index if unassigned.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<i32> {
        place_vertex(&mut self.vertices, vertex)
    }

    /// Record `child` as a successor of `parent` and `parent` as `child`'s
    /// single predecessor. Both endpoints must already be added — the tree
    /// builder rejects edges to absent vertices. Re-parenting a child without
    /// detaching it first leaves the maps contradictory; `build()` rejects
    /// that state.
    pub fn add_edge(&mut self, child: i32, parent: i32) -> Result<()> {
        if !occupied(&self.vertices, child) {
            return Err(Error::Structural(format!(
                "edge child {child} has not been added to this builder"
            )));
        }
        if !occupied(&self.vertices, parent) {
            return Err(Error::Structural(format!(
                "edge parent {parent} has not been added to this builder"
            )));
        }
        self.successors.entry(parent).or_default().push(child);
        self.predecessors.insert(child, parent);
        Ok(())
    }

    /// Designate the root. The vertex must already be added.
    pub fn set_root(&mut self, index: i32) -> Result<()> {
        if !occupied(&self.vertices, index) {
            return Err(Error::Structural(format!("no vertex at index {index} to root")));
        }
        self.root = Some(index);
        Ok(())
    }

    pub fn root(&self) -> Option<i32> {
        self.root
    }

    pub fn vertex(&self, index: i32) -> Option<&Vertex> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.vertices.get(i))
            .and_then(|slot| slot.as_ref())
    }

    /// Occupied slots — tombstones and placeholders excluded.
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn successors_of(&self, index: i32) -> &[i32] {
        self.successors.get(&index).map_or(EMPTY_INDICES, |list| list)
    }

    /// Detach the single vertex at `index` without touching its descendants:
    /// remove it from its parent's successor list and tombstone its slot.
    /// Descendants become unreachable from the root but remain present until
    /// `compress()`. Removing the root is rejected.
    pub fn remove_not_recursive(&mut self, index: i32) -> Result<()> {
        if self.root == Some(index) {
            return Err(Error::Structural("cannot remove the root vertex".into()));
        }
        if !occupied(&self.vertices, index) {
            return Err(Error::Structural(format!("no vertex at index {index}")));
        }
        if let Some(parent) = self.predecessors.remove(&index) {
            if let Some(siblings) = self.successors.get_mut(&parent) {
                siblings.retain(|&mut s| s != index);
            }
        }
        self.successors.remove(&index);
        self.vertices[index as usize] = None;
        Ok(())
    }

    /// Drop tombstoned slots and renumber the remaining vertices to a dense
    /// 0..N-1 sequence preserving relative order, rewriting the successor and
    /// predecessor maps and the root under the new numbering.
    ///
    /// All collections are rebuilt first and swapped in together, so the
    /// builder never holds a half-renumbered state.
    pub fn compress(&mut self) {
        let mut remap = vec![REMOVED; self.vertices.len()];
        let mut next = 0i32;
        for (old, slot) in self.vertices.iter().enumerate() {
            if slot.is_some() {
                remap[old] = next;
                next += 1;
            }
        }

        let mut vertices: Vec<Option<Vertex>> = Vec::with_capacity(next as usize);
        for (old, slot) in self.vertices.iter().enumerate() {
            if let Some(vertex) = slot {
                let mut vertex = vertex.clone();
                vertex.set_index(remap[old]);
                vertices.push(Some(vertex));
            }
        }

        let mut successors: HashMap<i32, IndexList> = HashMap::new();
        for (&source, targets) in &self.successors {
            let mapped_source = remap[source as usize];
            if mapped_source == REMOVED {
                continue;
            }
            let mapped: IndexList = targets
                .iter()
                .map(|&t| remap[t as usize])
                .filter(|&t| t != REMOVED)
                .collect();
            if !mapped.is_empty() {
                successors.insert(mapped_source, mapped);
            }
        }

        let mut predecessors: HashMap<i32, i32> = HashMap::new();
        for (&child, &parent) in &self.predecessors {
            let (mapped_child, mapped_parent) = (remap[child as usize], remap[parent as usize]);
            if mapped_child != REMOVED && mapped_parent != REMOVED {
                predecessors.insert(mapped_child, mapped_parent);
            }
        }

        let root = self.root.map(|r| remap[r as usize]).filter(|&r| r != REMOVED);

        // Atomic swap of all collections.
        self.vertices = vertices;
        self.successors = successors;
        self.predecessors = predecessors;
        self.root = root;
    }

    /// Copy a filtered subtree from `source`, rooted at `start`, into this
    /// builder. `solution[i] >= 0` means "include source vertex i"; see
    /// [`add_vertexes_with_map`](Self::add_vertexes_with_map).
    ///
    /// Returns the destination index of the copied `start` vertex.
    pub fn add_vertexes_from_solution(
        &mut self,
        source: &DiTree,
        solution: &[i32],
        start: i32,
    ) -> Result<i32> {
        let dests = self.add_vertexes_with_map(source, solution, None, &[start])?;
        Ok(dests[0])
    }

    /// Depth-first filtered copy from `source` into this builder, starting at
    /// each of `starts` in turn.
    ///
    /// Every included vertex receives a fresh, sequential destination index —
    /// source indices are never reused. Children excluded by the solution are
    /// skipped before recursing, so an excluded vertex cuts off its whole
    /// subtree. When `index_map` is given, it is filled with
    /// source-index → destination-index entries so callers can translate
    /// source-space references into destination space.
    pub fn add_vertexes_with_map(
        &mut self,
        source: &DiTree,
        solution: &[i32],
        mut index_map: Option<&mut HashMap<i32, i32>>,
        starts: &[i32],
    ) -> Result<Vec<i32>> {
        if solution.len() != source.vertex_count() {
            return Err(Error::Structural(format!(
                "solution length {} does not match source vertex count {}",
                solution.len(),
                source.vertex_count()
            )));
        }
        let mut dests = Vec::with_capacity(starts.len());
        for &start in starts {
            let Some(&included) = solution.get(start as usize) else {
                return Err(Error::Structural(format!("start index {start} out of range")));
            };
            if included < 0 {
                return Err(Error::Structural(format!(
                    "start index {start} is excluded by the solution"
                )));
            }
            dests.push(self.copy_filtered(source, solution, &mut index_map, start, 1)?);
        }
        Ok(dests)
    }

    fn copy_filtered(
        &mut self,
        source: &DiTree,
        solution: &[i32],
        index_map: &mut Option<&mut HashMap<i32, i32>>,
        src_index: i32,
        depth: usize,
    ) -> Result<i32> {
        // Filtered copy shares the traversal engine's recursion bound.
        if depth > MAX_DFS_DEPTH {
            return Err(Error::DepthLimitExceeded { depth, limit: MAX_DFS_DEPTH });
        }
        let mut vertex = source
            .vertex(src_index)
            .ok_or_else(|| Error::Structural(format!("source has no vertex at {src_index}")))?
            .clone();
        vertex.set_index(UNASSIGNED_INDEX);
        let dest = self.add_vertex(vertex)?;
        if let Some(map) = index_map.as_deref_mut() {
            map.insert(src_index, dest);
        }
        for &child in source.successors_of(src_index) {
            if solution[child as usize] >= 0 {
                let child_dest =
                    self.copy_filtered(source, solution, index_map, child, depth + 1)?;
                self.add_edge(child_dest, dest)?;
            }
        }
        Ok(dest)
    }

    /// Freeze the current state into an immutable tree.
    ///
    /// Requires a designated root and a dense vertex sequence — tombstones
    /// left by `remove_not_recursive` must be cleared with `compress()` first.
    pub fn build(&self) -> Result<DiTree> {
        let root = self
            .root
            .ok_or_else(|| Error::Structural("tree builder has no root".into()))?;
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for (position, slot) in self.vertices.iter().enumerate() {
            match slot {
                Some(vertex) => vertices.push(vertex.clone()),
                None => {
                    return Err(Error::Structural(format!(
                        "vertex slot {position} is empty; call compress() before build()"
                    )))
                }
            }
        }
        DiTree::from_parts(
            vertices,
            self.successors.clone(),
            self.predecessors.clone(),
            root,
        )
    }
}
