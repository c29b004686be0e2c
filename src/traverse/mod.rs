//! # Traversal Engine
//!
//! Breadth-first and depth-first walkers over any [`GraphAdjacency`]
//! structure, with per-invocation bookkeeping in [`VisitData`]: discovery and
//! finish order, distances, the traversal predecessor chain, leaf and
//! role-marker index sets, and the secondary-path (revisit) record.
//!
//! Traversal is synchronous and single-threaded; `VisitData` is created fresh
//! per call and discarded after.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::graph::GraphAdjacency;
use crate::model::Vertex;
use crate::{Error, Result};

/// Hard recursion bound for depth-first walks. A breach signals a cyclic or
/// otherwise malformed structure; the walker reports the offending depth
/// directly because the structure's own string form depends on a successful
/// traversal and cannot appear in the error.
pub const MAX_DFS_DEPTH: usize = 100;

// ============================================================================
// Reserved axiom-set markers
// ============================================================================

/// Reserved meaning nid: root of a necessary-condition axiom set.
pub const NECESSARY_SET_NID: i32 = -101;
/// Reserved meaning nid: root of a sufficient-condition axiom set.
pub const SUFFICIENT_SET_NID: i32 = -102;
/// Reserved meaning nid: root of a property axiom set.
pub const PROPERTY_SET_NID: i32 = -103;
/// Reserved meaning nid: root of an inclusion axiom set.
pub const INCLUSION_SET_NID: i32 = -104;

/// The four reserved axiom-set roles a vertex's meaning can mark. Resolved
/// once per vertex during traversal instead of a conditional chain at every
/// consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetMarker {
    NecessarySet,
    SufficientSet,
    PropertySet,
    InclusionSet,
}

impl SetMarker {
    pub const ALL: [SetMarker; 4] = [
        SetMarker::NecessarySet,
        SetMarker::SufficientSet,
        SetMarker::PropertySet,
        SetMarker::InclusionSet,
    ];

    pub fn from_meaning(nid: i32) -> Option<SetMarker> {
        match nid {
            NECESSARY_SET_NID => Some(SetMarker::NecessarySet),
            SUFFICIENT_SET_NID => Some(SetMarker::SufficientSet),
            PROPERTY_SET_NID => Some(SetMarker::PropertySet),
            INCLUSION_SET_NID => Some(SetMarker::InclusionSet),
            _ => None,
        }
    }

    pub fn nid(self) -> i32 {
        match self {
            SetMarker::NecessarySet => NECESSARY_SET_NID,
            SetMarker::SufficientSet => SUFFICIENT_SET_NID,
            SetMarker::PropertySet => PROPERTY_SET_NID,
            SetMarker::InclusionSet => INCLUSION_SET_NID,
        }
    }

    fn ordinal(self) -> usize {
        match self {
            SetMarker::NecessarySet => 0,
            SetMarker::SufficientSet => 1,
            SetMarker::PropertySet => 2,
            SetMarker::InclusionSet => 3,
        }
    }
}

// ============================================================================
// IndexBits
// ============================================================================

/// Compact index set, one bit per vertex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct IndexBits {
    words: Vec<u64>,
}

impl IndexBits {
    fn with_capacity(bits: usize) -> Self {
        Self { words: vec![0; bits.div_ceil(64)] }
    }

    fn set(&mut self, index: i32) {
        if index >= 0 {
            let (word, bit) = (index as usize / 64, index as usize % 64);
            if word < self.words.len() {
                self.words[word] |= 1 << bit;
            }
        }
    }

    fn contains(&self, index: i32) -> bool {
        if index < 0 {
            return false;
        }
        let (word, bit) = (index as usize / 64, index as usize % 64);
        word < self.words.len() && self.words[word] & (1 << bit) != 0
    }

    fn indexes(&self) -> Vec<i32> {
        let mut out = Vec::new();
        for (word_index, &word) in self.words.iter().enumerate() {
            let mut remaining = word;
            while remaining != 0 {
                let bit = remaining.trailing_zeros() as usize;
                out.push((word_index * 64 + bit) as i32);
                remaining &= remaining - 1;
            }
        }
        out
    }
}

// ============================================================================
// VisitData
// ============================================================================

/// Per-traversal bookkeeping, sized to the walked structure's vertex count.
/// Created fresh for each traversal invocation; never persisted or shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitData {
    distance: Vec<i32>,
    discovery: Vec<i32>,
    finish: Vec<i32>,
    predecessor: Vec<i32>,
    leaves: IndexBits,
    markers: [IndexBits; 4],
    revisits: Vec<(i32, i32)>,
    clock: i32,
}

impl VisitData {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            distance: vec![-1; vertex_count],
            discovery: vec![-1; vertex_count],
            finish: vec![-1; vertex_count],
            predecessor: vec![-1; vertex_count],
            leaves: IndexBits::with_capacity(vertex_count),
            markers: std::array::from_fn(|_| IndexBits::with_capacity(vertex_count)),
            revisits: Vec::new(),
            clock: 0,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.distance.len()
    }

    pub fn visited(&self, index: i32) -> bool {
        self.discovery_time(index) >= 0
    }

    /// Distance from the traversal start, -1 if unreached.
    pub fn distance(&self, index: i32) -> i32 {
        self.get(&self.distance, index)
    }

    /// Discovery sequence number, -1 if unreached.
    pub fn discovery_time(&self, index: i32) -> i32 {
        self.get(&self.discovery, index)
    }

    /// Finish sequence number, -1 if unreached.
    pub fn finish_time(&self, index: i32) -> i32 {
        self.get(&self.finish, index)
    }

    /// The vertex this one was reached from, None for the start vertex and
    /// unreached vertices.
    pub fn traversal_predecessor(&self, index: i32) -> Option<i32> {
        let p = self.get(&self.predecessor, index);
        (p >= 0).then_some(p)
    }

    pub fn is_leaf(&self, index: i32) -> bool {
        self.leaves.contains(index)
    }

    /// Indices of all vertices found to have no successors, ascending.
    pub fn leaf_vertex_indexes(&self) -> Vec<i32> {
        self.leaves.indexes()
    }

    /// Indices whose meaning matched the given reserved marker, ascending.
    pub fn marker_vertex_indexes(&self, marker: SetMarker) -> Vec<i32> {
        self.markers[marker.ordinal()].indexes()
    }

    pub fn has_marker(&self, index: i32, marker: SetMarker) -> bool {
        self.markers[marker.ordinal()].contains(index)
    }

    /// Secondary paths: `(parent, child)` edges whose child was already
    /// discovered when the edge was examined — multi-parent vertices or
    /// cycles. Recorded, not re-walked.
    pub fn revisits(&self) -> &[(i32, i32)] {
        &self.revisits
    }

    /// Number of distinct vertices discovered.
    pub fn visit_count(&self) -> usize {
        self.discovery.iter().filter(|&&d| d >= 0).count()
    }

    fn get(&self, array: &[i32], index: i32) -> i32 {
        usize::try_from(index)
            .ok()
            .and_then(|i| array.get(i).copied())
            .unwrap_or(-1)
    }

    fn discover(&mut self, index: i32, distance: i32, predecessor: i32) {
        let slot = index as usize;
        self.distance[slot] = distance;
        self.predecessor[slot] = predecessor;
        self.discovery[slot] = self.clock;
        self.clock += 1;
    }

    fn start_vertex(&mut self, index: i32, vertex: &Vertex, is_leaf: bool) {
        if is_leaf {
            self.leaves.set(index);
        }
        if let Some(marker) = SetMarker::from_meaning(vertex.meaning()) {
            self.markers[marker.ordinal()].set(index);
        }
    }

    fn finish_vertex(&mut self, index: i32) {
        self.finish[index as usize] = self.clock;
        self.clock += 1;
    }
}

// ============================================================================
// Breadth-first
// ============================================================================

/// Breadth-first walk from `start`, recording into `visit`.
pub fn breadth_first<A: GraphAdjacency>(
    graph: &A,
    start: i32,
    visit: &mut VisitData,
) -> Result<()> {
    breadth_first_with(graph, start, visit, |_| {}, |_| {})
}

/// Breadth-first walk with per-vertex start/end hooks (invoked in dequeue
/// order, start before successors are examined, end after).
pub fn breadth_first_with<A, S, E>(
    graph: &A,
    start: i32,
    visit: &mut VisitData,
    mut on_start: S,
    mut on_end: E,
) -> Result<()>
where
    A: GraphAdjacency,
    S: FnMut(&Vertex),
    E: FnMut(&Vertex),
{
    check_preconditions(graph, start, visit)?;

    let mut queue = VecDeque::new();
    visit.discover(start, 0, -1);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let vertex = graph
            .vertex(current)
            .ok_or_else(|| Error::Structural(format!("no vertex at index {current}")))?;
        let successors = graph.successors_of(current);
        visit.start_vertex(current, vertex, successors.is_empty());
        on_start(vertex);

        let distance = visit.distance(current);
        for &next in successors {
            if visit.visited(next) {
                // Secondary path — multi-parent or cycle. Recorded, not re-enqueued.
                visit.revisits.push((current, next));
            } else {
                visit.discover(next, distance + 1, current);
                queue.push_back(next);
            }
        }

        on_end(vertex);
        visit.finish_vertex(current);
    }
    Ok(())
}

// ============================================================================
// Depth-first
// ============================================================================

/// Depth-first walk from `start`, recording into `visit`.
pub fn depth_first<A: GraphAdjacency>(
    graph: &A,
    start: i32,
    visit: &mut VisitData,
) -> Result<()> {
    depth_first_with(graph, start, visit, |_| {}, |_| {})
}

/// Depth-first walk with per-vertex start/end hooks. Exceeding
/// [`MAX_DFS_DEPTH`] levels raises [`Error::DepthLimitExceeded`].
pub fn depth_first_with<A, S, E>(
    graph: &A,
    start: i32,
    visit: &mut VisitData,
    mut on_start: S,
    mut on_end: E,
) -> Result<()>
where
    A: GraphAdjacency,
    S: FnMut(&Vertex),
    E: FnMut(&Vertex),
{
    check_preconditions(graph, start, visit)?;
    visit.discover(start, 0, -1);
    dfs_walk(graph, start, 1, visit, &mut on_start, &mut on_end)
}

fn dfs_walk<A, S, E>(
    graph: &A,
    current: i32,
    depth: usize,
    visit: &mut VisitData,
    on_start: &mut S,
    on_end: &mut E,
) -> Result<()>
where
    A: GraphAdjacency,
    S: FnMut(&Vertex),
    E: FnMut(&Vertex),
{
    if depth > MAX_DFS_DEPTH {
        return Err(Error::DepthLimitExceeded { depth, limit: MAX_DFS_DEPTH });
    }
    let vertex = graph
        .vertex(current)
        .ok_or_else(|| Error::Structural(format!("no vertex at index {current}")))?;
    let successors = graph.successors_of(current);
    visit.start_vertex(current, vertex, successors.is_empty());
    on_start(vertex);

    let distance = visit.distance(current);
    for &next in successors {
        if visit.visited(next) {
            visit.revisits.push((current, next));
        } else {
            visit.discover(next, distance + 1, current);
            dfs_walk(graph, next, depth + 1, visit, on_start, on_end)?;
        }
    }

    let vertex = graph
        .vertex(current)
        .ok_or_else(|| Error::Structural(format!("no vertex at index {current}")))?;
    on_end(vertex);
    visit.finish_vertex(current);
    Ok(())
}

fn check_preconditions<A: GraphAdjacency>(
    graph: &A,
    start: i32,
    visit: &VisitData,
) -> Result<()> {
    if visit.vertex_count() != graph.vertex_count() {
        return Err(Error::Structural(format!(
            "visit data sized for {} vertices, structure has {}",
            visit.vertex_count(),
            graph.vertex_count()
        )));
    }
    if graph.vertex(start).is_none() {
        return Err(Error::Structural(format!("traversal start {start} out of range")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DiGraphBuilder, DiTree, DiTreeBuilder};

    /// root → {a, b}; a → {leaf1, leaf2}
    fn fixture() -> DiTree {
        let mut builder = DiTreeBuilder::new();
        let root = builder.add_vertex(Vertex::anonymous(SUFFICIENT_SET_NID)).unwrap();
        let a = builder.add_vertex(Vertex::anonymous(10)).unwrap();
        let b = builder.add_vertex(Vertex::anonymous(NECESSARY_SET_NID)).unwrap();
        let l1 = builder.add_vertex(Vertex::anonymous(11)).unwrap();
        let l2 = builder.add_vertex(Vertex::anonymous(12)).unwrap();
        builder.set_root(root).unwrap();
        builder.add_edge(a, root).unwrap();
        builder.add_edge(b, root).unwrap();
        builder.add_edge(l1, a).unwrap();
        builder.add_edge(l2, a).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn bfs_covers_every_vertex_once() {
        let tree = fixture();
        let mut visit = VisitData::new(tree.vertex_count());
        breadth_first(&tree, tree.root(), &mut visit).unwrap();

        assert_eq!(visit.visit_count(), 5);
        assert_eq!(visit.distance(0), 0);
        assert_eq!(visit.distance(3), 2);
        assert_eq!(visit.leaf_vertex_indexes(), vec![2, 3, 4]);
        assert!(visit.revisits().is_empty());
        // BFS discovers level by level.
        assert!(visit.discovery_time(1) < visit.discovery_time(3));
    }

    #[test]
    fn dfs_covers_every_vertex_once() {
        let tree = fixture();
        let mut visit = VisitData::new(tree.vertex_count());
        depth_first(&tree, tree.root(), &mut visit).unwrap();

        assert_eq!(visit.visit_count(), 5);
        assert_eq!(visit.leaf_vertex_indexes(), vec![2, 3, 4]);
        // DFS finishes a child subtree before the sibling starts.
        assert!(visit.finish_time(3) < visit.discovery_time(2));
        assert_eq!(visit.traversal_predecessor(3), Some(1));
        assert_eq!(visit.traversal_predecessor(tree.root()), None);
    }

    #[test]
    fn markers_populated_on_vertex_start() {
        let tree = fixture();
        let mut visit = VisitData::new(tree.vertex_count());
        breadth_first(&tree, tree.root(), &mut visit).unwrap();

        assert_eq!(visit.marker_vertex_indexes(SetMarker::SufficientSet), vec![0]);
        assert_eq!(visit.marker_vertex_indexes(SetMarker::NecessarySet), vec![2]);
        assert!(visit.marker_vertex_indexes(SetMarker::PropertySet).is_empty());
        assert!(visit.has_marker(0, SetMarker::SufficientSet));
    }

    #[test]
    fn hooks_fire_in_order() {
        let tree = fixture();
        let mut visit = VisitData::new(tree.vertex_count());
        let order = std::cell::RefCell::new(Vec::new());
        breadth_first_with(
            &tree,
            tree.root(),
            &mut visit,
            |v| order.borrow_mut().push(("start", v.index())),
            |v| order.borrow_mut().push(("end", v.index())),
        )
        .unwrap();

        let order = order.into_inner();
        assert_eq!(order.len(), 10);
        assert_eq!(order[0], ("start", 0));
        assert_eq!(order[1], ("end", 0));
    }

    #[test]
    fn secondary_path_recorded_not_rewalked() {
        let mut builder = DiGraphBuilder::new();
        let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let a = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        let b = builder.add_vertex(Vertex::anonymous(3)).unwrap();
        let shared = builder.add_vertex(Vertex::anonymous(4)).unwrap();
        builder.add_root(root).unwrap();
        builder.add_edge(a, root);
        builder.add_edge(b, root);
        builder.add_edge(shared, a);
        builder.add_edge(shared, b);
        let graph = builder.build().unwrap();

        let mut visit = VisitData::new(graph.vertex_count());
        breadth_first(&graph, root, &mut visit).unwrap();

        assert_eq!(visit.visit_count(), 4);
        assert_eq!(visit.revisits(), &[(b, shared)]);
    }

    #[test]
    fn dfs_depth_guard_trips_on_cycle() {
        let mut builder = DiGraphBuilder::new();
        let a = builder.add_vertex(Vertex::anonymous(1)).unwrap();
        let b = builder.add_vertex(Vertex::anonymous(2)).unwrap();
        builder.add_root(a).unwrap();
        builder.add_edge(b, a);
        builder.add_edge(a, b);
        let graph = builder.build().unwrap();

        // Two-vertex cycle: BFS records the revisit and terminates.
        let mut visit = VisitData::new(graph.vertex_count());
        breadth_first(&graph, a, &mut visit).unwrap();
        assert_eq!(visit.revisits(), &[(b, a)]);

        // A self-successor chain long enough to trip the guard needs more
        // vertices than the limit; build a 150-deep path instead.
        let mut deep = DiGraphBuilder::new();
        let mut previous = deep.add_vertex(Vertex::anonymous(0)).unwrap();
        deep.add_root(previous).unwrap();
        for meaning in 1..150 {
            let next = deep.add_vertex(Vertex::anonymous(meaning)).unwrap();
            deep.add_edge(next, previous);
            previous = next;
        }
        let chain = deep.build().unwrap();

        let mut visit = VisitData::new(chain.vertex_count());
        let err = depth_first(&chain, 0, &mut visit).unwrap_err();
        match err {
            Error::DepthLimitExceeded { depth, limit } => {
                assert_eq!(depth, 101);
                assert_eq!(limit, MAX_DFS_DEPTH);
            }
            other => panic!("expected depth limit error, got {other}"),
        }
    }

    #[test]
    fn visit_data_sizing_checked() {
        let tree = fixture();
        let mut undersized = VisitData::new(2);
        assert!(breadth_first(&tree, tree.root(), &mut undersized).is_err());
    }
}
