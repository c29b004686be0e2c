//! # Changeset Archive & Bulk Loader
//!
//! The ingest path: a framed binary archive of chronology messages
//! ([`Archive`], [`ArchiveWriter`]) and the multi-pass loader
//! ([`BulkLoader`]) that replays one into an [`EntityStore`], deferring
//! semantics whose pattern or referenced component has not arrived yet and
//! retrying until the dependency graph reaches a fixed point.

mod archive;
mod loader;

pub use archive::{
    Archive, ArchiveWriter, ChronologyMessage, ConceptMessage, DependencyEntry,
    FieldDefinitionMessage, Manifest, MessageKind, PatternMessage, PatternVersionMessage,
    SemanticMessage, SemanticVersionMessage, StampMessage, ARCHIVE_MAGIC, ARCHIVE_VERSION,
};
pub use loader::{BulkLoader, ImportSummary, MAX_PASSES};
