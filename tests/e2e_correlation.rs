//! End-to-end: correlating an incoming revision of an axiom tree against the
//! resident version.

use pretty_assertions::assert_eq;

use termgraph::correlate::{correlation_solution, fast_equal};
use termgraph::{
    correlate, isomorphic, AlertSink, DiTree, DiTreeBuilder, FieldValue, LogAlertSink, Vertex,
    VertexId,
};

#[derive(Default)]
struct CollectSink(Vec<String>);

impl AlertSink for CollectSink {
    fn alert(&mut self, message: &str) {
        self.0.push(message.to_owned());
    }
}

fn resident() -> DiTree {
    let mut builder = DiTreeBuilder::new();
    let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
    let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
    let left = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(10)))
        .unwrap();
    let right = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(20)))
        .unwrap();
    builder.set_root(root).unwrap();
    builder.add_edge(and, root).unwrap();
    builder.add_edge(left, and).unwrap();
    builder.add_edge(right, and).unwrap();
    builder.build().unwrap()
}

/// Same expression, rebuilt from scratch with fresh identities and children
/// added in the opposite order.
fn incoming_equivalent() -> DiTree {
    let mut builder = DiTreeBuilder::new();
    let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
    let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
    let right = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(20)))
        .unwrap();
    let left = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(10)))
        .unwrap();
    builder.set_root(root).unwrap();
    builder.add_edge(and, root).unwrap();
    builder.add_edge(right, and).unwrap();
    builder.add_edge(left, and).unwrap();
    builder.build().unwrap()
}

#[test]
fn equivalent_revision_is_isomorphic_but_not_fast_equal() {
    let this = resident();
    let that = incoming_equivalent();

    assert!(!fast_equal(&this, &that).unwrap());
    let mut sink = CollectSink::default();
    assert!(isomorphic(&this, &that, &mut sink));
    assert!(isomorphic(&that, &this, &mut sink)); // symmetric
    assert!(isomorphic(&this, &this, &mut sink)); // reflexive
    assert!(sink.0.is_empty());
}

#[test]
fn correlation_keeps_every_resident_identity_for_an_equivalent_revision() {
    let this = resident();
    let that = incoming_equivalent();

    let merged = correlate(&this, &that, &mut LogAlertSink).unwrap();

    let resident_ids: Vec<VertexId> = this.vertices().iter().map(|v| v.id()).collect();
    let merged_ids: Vec<VertexId> = merged.vertices().iter().map(|v| v.id()).collect();
    for id in &merged_ids {
        assert!(resident_ids.contains(id));
    }
    assert_eq!(merged.vertex_count(), this.vertex_count());
    assert_eq!(merged.root(), this.root());
    // The siblings swapped positions in the incoming tree, but each keeps the
    // resident index it correlates to.
    let value_at = |tree: &DiTree, index: i32| {
        tree.vertex(index).unwrap().property(1).and_then(FieldValue::as_nid)
    };
    assert_eq!(value_at(&merged, 2), value_at(&this, 2));
    assert_eq!(value_at(&merged, 3), value_at(&this, 3));
}

#[test]
fn changed_leaf_gets_a_fresh_identity_and_the_rest_survive() {
    let this = resident();

    // Revision swaps one filler concept: 20 → 30.
    let mut builder = DiTreeBuilder::new();
    let root = builder.add_vertex(Vertex::anonymous(1)).unwrap();
    let and = builder.add_vertex(Vertex::anonymous(2)).unwrap();
    let left = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(10)))
        .unwrap();
    let changed = builder
        .add_vertex(Vertex::anonymous(3).with_property(1, FieldValue::ConceptRef(30)))
        .unwrap();
    builder.set_root(root).unwrap();
    builder.add_edge(and, root).unwrap();
    builder.add_edge(left, and).unwrap();
    builder.add_edge(changed, and).unwrap();
    let that = builder.build().unwrap();

    let merged = correlate(&this, &that, &mut LogAlertSink).unwrap();

    // The unchanged leaf keeps its resident identity; everything above the
    // change (whose subtree hash shifted) and the changed leaf are fresh.
    let unchanged = merged
        .vertices()
        .iter()
        .find(|v| v.property(1).and_then(FieldValue::as_nid) == Some(10))
        .unwrap();
    assert_eq!(unchanged.id(), this.vertex(2).unwrap().id());

    let fresh = merged
        .vertices()
        .iter()
        .find(|v| v.property(1).and_then(FieldValue::as_nid) == Some(30))
        .unwrap();
    assert!(this.vertices().iter().all(|v| v.id() != fresh.id()));
    assert_eq!(merged.vertex_count(), 4);
}

#[test]
fn self_correlation_is_the_identity() {
    let tree = resident();
    let merged = correlate(&tree, &tree.clone(), &mut LogAlertSink).unwrap();
    assert_eq!(merged, tree);
}

#[test]
fn solution_is_stable_across_invocations() {
    let this = resident();
    let that = incoming_equivalent();
    let a = correlation_solution(&this, &that).unwrap();
    let b = correlation_solution(&this, &that).unwrap();
    assert_eq!(a, b);
    // Fully matched: four incoming vertices, four resident claims.
    assert!(a.iter().all(|&m| m >= 0));
    let mut claims = a.clone();
    claims.sort_unstable();
    claims.dedup();
    assert_eq!(claims.len(), a.len());
}

#[test]
fn uncorrelated_root_raises_an_alert_but_still_merges() {
    let this = resident();

    // Entirely different expression: nothing matches.
    let mut builder = DiTreeBuilder::new();
    let root = builder.add_vertex(Vertex::anonymous(90)).unwrap();
    let leaf = builder.add_vertex(Vertex::anonymous(91)).unwrap();
    builder.set_root(root).unwrap();
    builder.add_edge(leaf, root).unwrap();
    let that = builder.build().unwrap();

    let mut sink = CollectSink::default();
    let merged = correlate(&this, &that, &mut sink).unwrap();

    assert_eq!(sink.0.len(), 1);
    assert!(sink.0[0].contains("root"));
    assert_eq!(merged.vertex_count(), 2);
    assert_eq!(merged.vertex(merged.root()).unwrap().meaning(), 90);
}
