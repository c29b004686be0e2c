//! # Binary Codec
//!
//! Fixed-layout binary encoding for vertices, trees, graphs, and the wire
//! primitives the changeset archive is built from. Big-endian integers, a
//! leading format-version byte on every top-level structure, and one tag byte
//! per field value.
//!
//! Encoding is deterministic: property maps are written in ascending key
//! order, so equal structures encode to equal bytes.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::graph::{DiGraph, DiGraphBuilder, DiTree, DiTreeBuilder};
use crate::model::{FieldValue, PublicId, Stamp, Vertex, VertexId};
use crate::{Error, Result};

type IndexList = SmallVec<[i32; 4]>;

/// Version byte written ahead of every tree, graph, and archive payload.
pub const FORMAT_VERSION: u8 = 1;

// Field value tags. Zero is reserved as "never valid" so an all-zero buffer
// cannot decode silently.
const TAG_CONCEPT_REF: u8 = 1;
const TAG_SEMANTIC_REF: u8 = 2;
const TAG_PATTERN_REF: u8 = 3;
const TAG_STAMP: u8 = 4;
const TAG_INT: u8 = 5;
const TAG_LONG: u8 = 6;
const TAG_FLOAT: u8 = 7;
const TAG_BYTES: u8 = 8;
const TAG_STRING: u8 = 9;
const TAG_DITREE: u8 = 10;
const TAG_DIGRAPH: u8 = 11;

/// Truncation guard: every read checks remaining bytes up front so a short
/// buffer yields a codec error instead of a panic.
fn ensure(buf: &impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::Codec(format!(
            "truncated buffer: need {needed} bytes for {what}, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_version(buf: &mut impl Buf, what: &str) -> Result<()> {
    ensure(buf, 1, "format version")?;
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(Error::Codec(format!(
            "unsupported {what} format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    Ok(())
}

// ============================================================================
// Primitives
// ============================================================================

pub fn write_stamp(buf: &mut BytesMut, stamp: &Stamp) {
    buf.put_i32(stamp.status);
    buf.put_i64(stamp.time);
    buf.put_i32(stamp.author);
    buf.put_i32(stamp.module);
    buf.put_i32(stamp.path);
}

pub fn read_stamp(buf: &mut impl Buf) -> Result<Stamp> {
    ensure(buf, 24, "stamp")?;
    Ok(Stamp {
        status: buf.get_i32(),
        time: buf.get_i64(),
        author: buf.get_i32(),
        module: buf.get_i32(),
        path: buf.get_i32(),
    })
}

pub fn write_public_id(buf: &mut BytesMut, id: &PublicId) {
    buf.put_u32(id.uuids().len() as u32);
    for uuid in id.uuids() {
        buf.put_slice(uuid.as_bytes());
    }
}

pub fn read_public_id(buf: &mut impl Buf) -> Result<PublicId> {
    ensure(buf, 4, "public id uuid count")?;
    let count = buf.get_u32() as usize;
    if count == 0 {
        return Err(Error::Codec("public id with zero uuids".into()));
    }
    ensure(buf, count * 16, "public id uuids")?;
    let mut id = PublicId::new(take_uuid(buf));
    for _ in 1..count {
        id.merge(&PublicId::new(take_uuid(buf)));
    }
    Ok(id)
}

fn take_uuid(buf: &mut impl Buf) -> Uuid {
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Uuid::from_bytes(raw)
}

fn write_blob(buf: &mut BytesMut, blob: &[u8]) {
    buf.put_u32(blob.len() as u32);
    buf.put_slice(blob);
}

fn read_blob(buf: &mut impl Buf, what: &str) -> Result<Vec<u8>> {
    ensure(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, what)?;
    let mut blob = vec![0u8; len];
    buf.copy_to_slice(&mut blob);
    Ok(blob)
}

// ============================================================================
// Field values
// ============================================================================

pub fn write_field_value(buf: &mut BytesMut, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::ConceptRef(n) => {
            buf.put_u8(TAG_CONCEPT_REF);
            buf.put_i32(*n);
        }
        FieldValue::SemanticRef(n) => {
            buf.put_u8(TAG_SEMANTIC_REF);
            buf.put_i32(*n);
        }
        FieldValue::PatternRef(n) => {
            buf.put_u8(TAG_PATTERN_REF);
            buf.put_i32(*n);
        }
        FieldValue::Stamp(stamp) => {
            buf.put_u8(TAG_STAMP);
            write_stamp(buf, stamp);
        }
        FieldValue::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_i32(*i);
        }
        FieldValue::Long(l) => {
            buf.put_u8(TAG_LONG);
            buf.put_i64(*l);
        }
        FieldValue::Float(v) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f32(*v);
        }
        FieldValue::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            write_blob(buf, b);
        }
        FieldValue::String(s) => {
            buf.put_u8(TAG_STRING);
            write_blob(buf, s.as_bytes());
        }
        FieldValue::DiTree(tree) => {
            buf.put_u8(TAG_DITREE);
            write_tree(buf, tree)?;
        }
        FieldValue::DiGraph(graph) => {
            buf.put_u8(TAG_DIGRAPH);
            write_graph(buf, graph)?;
        }
    }
    Ok(())
}

pub fn read_field_value(buf: &mut impl Buf) -> Result<FieldValue> {
    ensure(buf, 1, "field value tag")?;
    let tag = buf.get_u8();
    let value = match tag {
        TAG_CONCEPT_REF => {
            ensure(buf, 4, "concept ref")?;
            FieldValue::ConceptRef(buf.get_i32())
        }
        TAG_SEMANTIC_REF => {
            ensure(buf, 4, "semantic ref")?;
            FieldValue::SemanticRef(buf.get_i32())
        }
        TAG_PATTERN_REF => {
            ensure(buf, 4, "pattern ref")?;
            FieldValue::PatternRef(buf.get_i32())
        }
        TAG_STAMP => FieldValue::Stamp(read_stamp(buf)?),
        TAG_INT => {
            ensure(buf, 4, "int")?;
            FieldValue::Int(buf.get_i32())
        }
        TAG_LONG => {
            ensure(buf, 8, "long")?;
            FieldValue::Long(buf.get_i64())
        }
        TAG_FLOAT => {
            ensure(buf, 4, "float")?;
            FieldValue::Float(buf.get_f32())
        }
        TAG_BYTES => FieldValue::Bytes(read_blob(buf, "bytes value")?),
        TAG_STRING => {
            let raw = read_blob(buf, "string value")?;
            FieldValue::String(String::from_utf8(raw).map_err(|e| {
                Error::Codec(format!("string value is not valid utf-8: {e}"))
            })?)
        }
        TAG_DITREE => FieldValue::DiTree(Box::new(read_tree(buf)?)),
        TAG_DIGRAPH => FieldValue::DiGraph(Box::new(read_graph(buf)?)),
        other => return Err(Error::Codec(format!("unknown field value tag {other}"))),
    };
    Ok(value)
}

// ============================================================================
// Vertices
// ============================================================================

/// Encode one vertex: identity, index, meaning, then committed properties in
/// ascending key order. Staged properties are a serialization error — commit
/// or discard them first.
pub fn write_vertex(buf: &mut BytesMut, vertex: &Vertex) -> Result<()> {
    if vertex.has_uncommitted() {
        return Err(Error::Codec(format!(
            "vertex {} has staged properties; commit before encoding",
            vertex.id()
        )));
    }
    let id = vertex.id();
    buf.put_u64(id.msb);
    buf.put_u64(id.lsb);
    buf.put_i32(vertex.index());
    buf.put_i32(vertex.meaning());

    let properties = vertex.committed_properties();
    buf.put_u32(properties.len() as u32);
    let mut keys: Vec<i32> = properties.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        buf.put_i32(key);
        write_field_value(buf, &properties[&key])?;
    }
    Ok(())
}

pub fn read_vertex(buf: &mut impl Buf) -> Result<Vertex> {
    ensure(buf, 28, "vertex header")?;
    let id = VertexId::new(buf.get_u64(), buf.get_u64());
    let index = buf.get_i32();
    let meaning = buf.get_i32();
    let count = buf.get_u32() as usize;

    let mut vertex = Vertex::new(id, meaning);
    vertex.set_index(index);
    for _ in 0..count {
        ensure(buf, 4, "property key")?;
        let key = buf.get_i32();
        let value = read_field_value(buf)?;
        vertex = vertex.with_property(key, value);
    }
    Ok(vertex)
}

// ============================================================================
// Trees
// ============================================================================

pub fn write_tree(buf: &mut BytesMut, tree: &DiTree) -> Result<()> {
    buf.put_u8(FORMAT_VERSION);
    buf.put_u32(tree.vertex_count() as u32);
    for vertex in tree.vertices() {
        write_vertex(buf, vertex)?;
    }

    let successors = tree.successor_map();
    buf.put_u32(successors.len() as u32);
    let mut sources: Vec<i32> = successors.keys().copied().collect();
    sources.sort_unstable();
    for source in sources {
        buf.put_i32(source);
        let targets = &successors[&source];
        buf.put_u32(targets.len() as u32);
        for &target in targets {
            buf.put_i32(target);
        }
    }

    let predecessors = tree.predecessor_map();
    buf.put_u32(predecessors.len() as u32);
    let mut children: Vec<i32> = predecessors.keys().copied().collect();
    children.sort_unstable();
    for child in children {
        buf.put_i32(child);
        buf.put_i32(predecessors[&child]);
    }

    buf.put_i32(tree.root());
    Ok(())
}

pub fn read_tree(buf: &mut impl Buf) -> Result<DiTree> {
    read_version(buf, "tree")?;
    ensure(buf, 4, "tree vertex count")?;
    let count = buf.get_u32() as usize;
    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        vertices.push(read_vertex(buf)?);
    }

    let successors = read_successor_map(buf)?;

    ensure(buf, 4, "tree predecessor count")?;
    let entries = buf.get_u32() as usize;
    ensure(buf, entries * 8, "tree predecessors")?;
    let mut predecessors = HashMap::with_capacity(entries);
    for _ in 0..entries {
        let child = buf.get_i32();
        let parent = buf.get_i32();
        predecessors.insert(child, parent);
    }

    ensure(buf, 4, "tree root")?;
    let root = buf.get_i32();
    DiTree::from_parts(vertices, successors, predecessors, root)
}

fn read_successor_map(buf: &mut impl Buf) -> Result<HashMap<i32, IndexList>> {
    ensure(buf, 4, "successor entry count")?;
    let entries = buf.get_u32() as usize;
    let mut successors: HashMap<i32, IndexList> = HashMap::with_capacity(entries);
    for _ in 0..entries {
        ensure(buf, 8, "successor entry")?;
        let source = buf.get_i32();
        let len = buf.get_u32() as usize;
        ensure(buf, len * 4, "successor targets")?;
        let mut targets = IndexList::with_capacity(len);
        for _ in 0..len {
            targets.push(buf.get_i32());
        }
        successors.insert(source, targets);
    }
    Ok(successors)
}

// ============================================================================
// Graphs
// ============================================================================

pub fn write_graph(buf: &mut BytesMut, graph: &DiGraph) -> Result<()> {
    buf.put_u8(FORMAT_VERSION);
    buf.put_u32(graph.vertex_count() as u32);
    for vertex in graph.vertices() {
        write_vertex(buf, vertex)?;
    }
    write_adjacency(buf, graph.successor_map());
    write_adjacency(buf, graph.predecessor_map());
    buf.put_u32(graph.roots().len() as u32);
    for &root in graph.roots() {
        buf.put_i32(root);
    }
    Ok(())
}

fn write_adjacency(buf: &mut BytesMut, adjacency: &HashMap<i32, IndexList>) {
    buf.put_u32(adjacency.len() as u32);
    let mut sources: Vec<i32> = adjacency.keys().copied().collect();
    sources.sort_unstable();
    for source in sources {
        buf.put_i32(source);
        let targets = &adjacency[&source];
        buf.put_u32(targets.len() as u32);
        for &target in targets {
            buf.put_i32(target);
        }
    }
}

pub fn read_graph(buf: &mut impl Buf) -> Result<DiGraph> {
    read_version(buf, "graph")?;
    ensure(buf, 4, "graph vertex count")?;
    let count = buf.get_u32() as usize;
    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        vertices.push(read_vertex(buf)?);
    }
    let successors = read_successor_map(buf)?;
    let predecessors = read_successor_map(buf)?;

    ensure(buf, 4, "graph root count")?;
    let roots_len = buf.get_u32() as usize;
    ensure(buf, roots_len * 4, "graph roots")?;
    let mut roots = Vec::with_capacity(roots_len);
    for _ in 0..roots_len {
        roots.push(buf.get_i32());
    }
    DiGraph::from_parts(vertices, successors, predecessors, roots)
}

// ============================================================================
// Byte-level helpers
// ============================================================================

pub fn encode_tree(tree: &DiTree) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    write_tree(&mut buf, tree)?;
    Ok(buf.freeze())
}

pub fn decode_tree(bytes: &[u8]) -> Result<DiTree> {
    let mut buf = bytes;
    let tree = read_tree(&mut buf)?;
    if !buf.is_empty() {
        return Err(Error::Codec(format!(
            "{} trailing bytes after tree",
            buf.len()
        )));
    }
    Ok(tree)
}

pub fn encode_graph(graph: &DiGraph) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    write_graph(&mut buf, graph)?;
    Ok(buf.freeze())
}

pub fn decode_graph(bytes: &[u8]) -> Result<DiGraph> {
    let mut buf = bytes;
    let graph = read_graph(&mut buf)?;
    if !buf.is_empty() {
        return Err(Error::Codec(format!(
            "{} trailing bytes after graph",
            buf.len()
        )));
    }
    Ok(graph)
}
