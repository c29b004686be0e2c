//! # termgraph — Versioned Entity Graph Engine
//!
//! Immutable, content-addressed graphs and trees whose vertices encode
//! description-logic axioms for a biomedical terminology knowledge base,
//! plus the dependency-resolving bulk loader that reconstructs entities
//! (and their STAMP-versioned history) from a serialized changeset archive.
//!
//! ## Design Principles
//!
//! 1. **Arena graphs**: vertices are owned by the enclosing immutable structure
//!    and referenced only by integer index — no reference cycles, ever
//! 2. **Builder/product split**: `DiTreeBuilder`/`DiGraphBuilder` own growable
//!    state; `build()` is a defensive freeze into an immutable snapshot
//! 3. **Clean DTOs**: `Vertex`, `FieldValue`, `Entity` cross all boundaries
//! 4. **Trait seams**: `EntityStore`, `GraphAdjacency`, `AlertSink` are the
//!    contracts between the engine and its collaborators
//!
//! ## Quick Start
//!
//! ```rust
//! use termgraph::{DiTreeBuilder, Vertex};
//!
//! # fn example() -> termgraph::Result<()> {
//! let mut builder = DiTreeBuilder::new();
//! let root = builder.add_vertex(Vertex::anonymous(100))?;
//! let child = builder.add_vertex(Vertex::anonymous(200))?;
//! builder.set_root(root)?;
//! builder.add_edge(child, root)?;
//!
//! let tree = builder.build()?;
//! assert_eq!(tree.vertex_count(), 2);
//! assert_eq!(tree.successors_of(root), &[child]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod traverse;
pub mod correlate;
pub mod codec;
pub mod entity;
pub mod store;
pub mod load;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    FieldValue, PublicId, Stamp, Vertex, VertexId,
    nid_for_uuid, UNASSIGNED_INDEX,
};

// ============================================================================
// Re-exports: Graph structures
// ============================================================================

pub use graph::{
    DiGraph, DiGraphBuilder, DiTree, DiTreeBuilder, GraphAdjacency,
};

// ============================================================================
// Re-exports: Traversal + correlation
// ============================================================================

pub use traverse::{breadth_first, depth_first, SetMarker, VisitData, MAX_DFS_DEPTH};
pub use correlate::{correlate, isomorphic, AlertSink, LogAlertSink};

// ============================================================================
// Re-exports: Entities, store, loader
// ============================================================================

pub use entity::{
    ConceptEntity, Entity, EntityKind, PatternEntity, SemanticEntity, StampEntity,
};
pub use store::{EntityStore, MemoryStore};
pub use load::{Archive, ArchiveWriter, BulkLoader, ImportSummary, Manifest, MessageKind};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed builder or structure state: edge to an absent vertex, removing
    /// the root, index out of bounds, staged properties where committed state
    /// is required. Fatal and local to the operation.
    #[error("structural violation: {0}")]
    Structural(String),

    /// Depth-first traversal exceeded the recursion safety bound — the walked
    /// structure is almost certainly cyclic or otherwise malformed.
    #[error("depth-first traversal exceeded {limit} levels at depth {depth}")]
    DepthLimitExceeded { depth: usize, limit: usize },

    /// A referenced pattern or component is not yet present in the store.
    /// Recoverable inside the loader via deferral; fatal only at fixed point.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Manifest-declared entity count disagrees with the imported count.
    #[error("import count mismatch: manifest declared {expected}, imported {imported}")]
    CountMismatch { expected: u64, imported: u64 },

    /// Internal failure in the isomorphism matcher. Reported to the alert sink
    /// by `isomorphic()`; surfaced as an error only from `correlate()`.
    #[error("correlation failure: {0}")]
    Correlation(String),

    /// Malformed binary encoding: truncated buffer, unknown field tag,
    /// unsupported format version.
    #[error("codec error: {0}")]
    Codec(String),

    /// Malformed changeset archive: bad magic, missing manifest, unset
    /// message kind tag.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
