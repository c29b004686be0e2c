//! # Entity Graph Model
//!
//! Clean DTOs for the terminology graph: identities, field values, stamps,
//! and the vertex type that graphs and trees are built from.
//!
//! Design rule: this module is pure data — no I/O, no store access, no wire
//! format. The binary encoding lives in `codec`, persistence in `store`.

pub mod id;
pub mod field;
pub mod vertex;

pub use id::{nid_for_uuid, PublicId, VertexId};
pub use field::{FieldValue, Stamp};
pub use vertex::{Vertex, UNASSIGNED_INDEX};
