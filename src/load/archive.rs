//! Framed changeset archive: magic, manifest, then kind-tagged
//! length-delimited chronology messages.
//!
//! Wire messages reference other components by public id only — nids are an
//! in-process artifact and never cross the wire. Field values inside semantic
//! versions are the exception: they are encoded with the standard field
//! codec, references already resolved to nids by the exporting store.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    read_field_value, read_public_id, read_stamp, write_field_value, write_public_id,
    write_stamp, FORMAT_VERSION,
};
use crate::model::{FieldValue, PublicId, Stamp};
use crate::{Error, Result};

/// Leading magic of every changeset archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"TGAR";
pub const ARCHIVE_VERSION: u8 = 1;

// ============================================================================
// Message kinds
// ============================================================================

/// Chronology kind tag carried ahead of every framed message. Zero is
/// reserved as "unset" and rejected on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    ConceptChronology = 1,
    SemanticChronology = 2,
    PatternChronology = 3,
    StampChronology = 4,
}

impl MessageKind {
    pub fn from_tag(tag: u8) -> Result<MessageKind> {
        match tag {
            0 => Err(Error::Archive(
                "message kind tag 0 (unset) — archive was written by a broken exporter".into(),
            )),
            1 => Ok(MessageKind::ConceptChronology),
            2 => Ok(MessageKind::SemanticChronology),
            3 => Ok(MessageKind::PatternChronology),
            4 => Ok(MessageKind::StampChronology),
            other => Err(Error::Archive(format!("unknown message kind tag {other}"))),
        }
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Archive self-description: the declared entity total the loader reconciles
/// against, plus the module dependencies the content was exported against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    pub total_count: u64,
    pub dependencies: Vec<DependencyEntry>,
}

/// One module this archive's content depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEntry {
    pub public_id: PublicId,
    pub description: String,
}

// ============================================================================
// Wire messages
// ============================================================================

/// A framed message: kind tag plus its still-encoded payload. Payloads are
/// decoded lazily, per kind, by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct ChronologyMessage {
    pub kind: MessageKind,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMessage {
    pub public_id: PublicId,
    /// One stamp reference per version.
    pub version_stamps: Vec<PublicId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StampMessage {
    pub public_id: PublicId,
    pub versions: Vec<Stamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternMessage {
    pub public_id: PublicId,
    pub versions: Vec<PatternVersionMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternVersionMessage {
    pub stamp: PublicId,
    pub referenced_component_purpose: PublicId,
    pub referenced_component_meaning: PublicId,
    pub field_definitions: Vec<FieldDefinitionMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinitionMessage {
    pub meaning: PublicId,
    pub purpose: PublicId,
    pub data_type: PublicId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMessage {
    pub public_id: PublicId,
    pub pattern: PublicId,
    pub referenced_component: PublicId,
    pub versions: Vec<SemanticVersionMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticVersionMessage {
    pub stamp: PublicId,
    pub fields: Vec<FieldValue>,
}

fn payload_version(buf: &mut impl Buf, what: &str) -> Result<()> {
    if buf.remaining() < 1 {
        return Err(Error::Archive(format!("{what} payload is empty")));
    }
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(Error::Archive(format!(
            "unsupported {what} payload version {version}"
        )));
    }
    Ok(())
}

fn need(buf: &impl Buf, bytes: usize, what: &str) -> Result<()> {
    if buf.remaining() < bytes {
        return Err(Error::Archive(format!("{what} payload truncated")));
    }
    Ok(())
}

impl ConceptMessage {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        write_public_id(&mut buf, &self.public_id);
        buf.put_u32(self.version_stamps.len() as u32);
        for stamp in &self.version_stamps {
            write_public_id(&mut buf, stamp);
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<ConceptMessage> {
        payload_version(&mut buf, "concept")?;
        let public_id = read_public_id(&mut buf)?;
        need(&buf, 4, "concept")?;
        let count = buf.get_u32() as usize;
        let mut version_stamps = Vec::with_capacity(count);
        for _ in 0..count {
            version_stamps.push(read_public_id(&mut buf)?);
        }
        Ok(ConceptMessage { public_id, version_stamps })
    }
}

impl StampMessage {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        write_public_id(&mut buf, &self.public_id);
        buf.put_u32(self.versions.len() as u32);
        for version in &self.versions {
            write_stamp(&mut buf, version);
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<StampMessage> {
        payload_version(&mut buf, "stamp")?;
        let public_id = read_public_id(&mut buf)?;
        need(&buf, 4, "stamp")?;
        let count = buf.get_u32() as usize;
        let mut versions = Vec::with_capacity(count);
        for _ in 0..count {
            versions.push(read_stamp(&mut buf)?);
        }
        Ok(StampMessage { public_id, versions })
    }
}

impl PatternMessage {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        write_public_id(&mut buf, &self.public_id);
        buf.put_u32(self.versions.len() as u32);
        for version in &self.versions {
            write_public_id(&mut buf, &version.stamp);
            write_public_id(&mut buf, &version.referenced_component_purpose);
            write_public_id(&mut buf, &version.referenced_component_meaning);
            buf.put_u32(version.field_definitions.len() as u32);
            for field in &version.field_definitions {
                write_public_id(&mut buf, &field.meaning);
                write_public_id(&mut buf, &field.purpose);
                write_public_id(&mut buf, &field.data_type);
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<PatternMessage> {
        payload_version(&mut buf, "pattern")?;
        let public_id = read_public_id(&mut buf)?;
        need(&buf, 4, "pattern")?;
        let version_count = buf.get_u32() as usize;
        let mut versions = Vec::with_capacity(version_count);
        for _ in 0..version_count {
            let stamp = read_public_id(&mut buf)?;
            let referenced_component_purpose = read_public_id(&mut buf)?;
            let referenced_component_meaning = read_public_id(&mut buf)?;
            need(&buf, 4, "pattern")?;
            let field_count = buf.get_u32() as usize;
            let mut field_definitions = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                field_definitions.push(FieldDefinitionMessage {
                    meaning: read_public_id(&mut buf)?,
                    purpose: read_public_id(&mut buf)?,
                    data_type: read_public_id(&mut buf)?,
                });
            }
            versions.push(PatternVersionMessage {
                stamp,
                referenced_component_purpose,
                referenced_component_meaning,
                field_definitions,
            });
        }
        Ok(PatternMessage { public_id, versions })
    }
}

impl SemanticMessage {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        write_public_id(&mut buf, &self.public_id);
        write_public_id(&mut buf, &self.pattern);
        write_public_id(&mut buf, &self.referenced_component);
        buf.put_u32(self.versions.len() as u32);
        for version in &self.versions {
            write_public_id(&mut buf, &version.stamp);
            buf.put_u32(version.fields.len() as u32);
            for field in &version.fields {
                write_field_value(&mut buf, field)?;
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<SemanticMessage> {
        payload_version(&mut buf, "semantic")?;
        let public_id = read_public_id(&mut buf)?;
        let pattern = read_public_id(&mut buf)?;
        let referenced_component = read_public_id(&mut buf)?;
        need(&buf, 4, "semantic")?;
        let version_count = buf.get_u32() as usize;
        let mut versions = Vec::with_capacity(version_count);
        for _ in 0..version_count {
            let stamp = read_public_id(&mut buf)?;
            need(&buf, 4, "semantic")?;
            let field_count = buf.get_u32() as usize;
            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                fields.push(read_field_value(&mut buf)?);
            }
            versions.push(SemanticVersionMessage { stamp, fields });
        }
        Ok(SemanticMessage { public_id, pattern, referenced_component, versions })
    }
}

// ============================================================================
// ArchiveWriter
// ============================================================================

/// Builds a changeset archive message by message.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    manifest: Manifest,
    messages: Vec<ChronologyMessage>,
}

impl ArchiveWriter {
    /// `total_count` is the entity total the manifest will declare; the
    /// loader fails the import if the archive delivers a different number.
    pub fn new(total_count: u64) -> Self {
        Self {
            manifest: Manifest { total_count, dependencies: Vec::new() },
            messages: Vec::new(),
        }
    }

    pub fn add_dependency(&mut self, public_id: PublicId, description: impl Into<String>) {
        self.manifest.dependencies.push(DependencyEntry {
            public_id,
            description: description.into(),
        });
    }

    pub fn push_concept(&mut self, message: &ConceptMessage) -> Result<()> {
        self.push(MessageKind::ConceptChronology, message.encode()?);
        Ok(())
    }

    pub fn push_semantic(&mut self, message: &SemanticMessage) -> Result<()> {
        self.push(MessageKind::SemanticChronology, message.encode()?);
        Ok(())
    }

    pub fn push_pattern(&mut self, message: &PatternMessage) -> Result<()> {
        self.push(MessageKind::PatternChronology, message.encode()?);
        Ok(())
    }

    pub fn push_stamp(&mut self, message: &StampMessage) -> Result<()> {
        self.push(MessageKind::StampChronology, message.encode()?);
        Ok(())
    }

    fn push(&mut self, kind: MessageKind, payload: Bytes) {
        self.messages.push(ChronologyMessage { kind, payload });
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn finish(self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(&ARCHIVE_MAGIC);
        buf.put_u8(ARCHIVE_VERSION);
        buf.put_u64(self.manifest.total_count);
        buf.put_u32(self.manifest.dependencies.len() as u32);
        for dependency in &self.manifest.dependencies {
            write_public_id(&mut buf, &dependency.public_id);
            let description = dependency.description.as_bytes();
            buf.put_u32(description.len() as u32);
            buf.put_slice(description);
        }
        buf.put_u32(self.messages.len() as u32);
        for message in &self.messages {
            buf.put_u8(message.kind as u8);
            buf.put_u32(message.payload.len() as u32);
            buf.put_slice(&message.payload);
        }
        buf.freeze()
    }

    pub fn write_to<W: Write>(self, mut writer: W) -> Result<()> {
        writer.write_all(&self.finish())?;
        Ok(())
    }
}

// ============================================================================
// Archive
// ============================================================================

/// A parsed changeset archive: manifest plus the framed messages in stream
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    manifest: Manifest,
    messages: Vec<ChronologyMessage>,
}

impl Archive {
    pub fn from_bytes(bytes: &[u8]) -> Result<Archive> {
        let mut buf = bytes;
        need(&buf, 5, "archive header")?;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != ARCHIVE_MAGIC {
            return Err(Error::Archive(format!("bad magic {magic:02x?}")));
        }
        let version = buf.get_u8();
        if version != ARCHIVE_VERSION {
            return Err(Error::Archive(format!("unsupported archive version {version}")));
        }

        need(&buf, 12, "manifest")?;
        let total_count = buf.get_u64();
        let dependency_count = buf.get_u32() as usize;
        let mut dependencies = Vec::with_capacity(dependency_count);
        for _ in 0..dependency_count {
            let public_id = read_public_id(&mut buf)
                .map_err(|e| Error::Archive(format!("bad dependency entry: {e}")))?;
            need(&buf, 4, "dependency description")?;
            let len = buf.get_u32() as usize;
            need(&buf, len, "dependency description")?;
            let mut raw = vec![0u8; len];
            buf.copy_to_slice(&mut raw);
            let description = String::from_utf8(raw)
                .map_err(|e| Error::Archive(format!("dependency description not utf-8: {e}")))?;
            dependencies.push(DependencyEntry { public_id, description });
        }

        need(&buf, 4, "message count")?;
        let message_count = buf.get_u32() as usize;
        let mut messages = Vec::with_capacity(message_count);
        for _ in 0..message_count {
            need(&buf, 5, "message frame")?;
            let kind = MessageKind::from_tag(buf.get_u8())?;
            let len = buf.get_u32() as usize;
            need(&buf, len, "message payload")?;
            let payload = Bytes::copy_from_slice(&buf[..len]);
            buf.advance(len);
            messages.push(ChronologyMessage { kind, payload });
        }
        if !buf.is_empty() {
            return Err(Error::Archive(format!(
                "{} trailing bytes after last message",
                buf.len()
            )));
        }
        Ok(Archive {
            manifest: Manifest { total_count, dependencies },
            messages,
        })
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Archive> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Archive::from_bytes(&bytes)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn messages(&self) -> &[ChronologyMessage] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_roundtrip() {
        let mut writer = ArchiveWriter::new(2);
        writer.add_dependency(PublicId::random(), "base module");
        writer
            .push_stamp(&StampMessage {
                public_id: PublicId::random(),
                versions: vec![Stamp::new(1, 1000, 2, 3, 4)],
            })
            .unwrap();
        writer
            .push_concept(&ConceptMessage {
                public_id: PublicId::random(),
                version_stamps: vec![PublicId::random()],
            })
            .unwrap();
        let bytes = writer.finish();

        let archive = Archive::from_bytes(&bytes).unwrap();
        assert_eq!(archive.manifest().total_count, 2);
        assert_eq!(archive.manifest().dependencies.len(), 1);
        assert_eq!(archive.messages().len(), 2);
        assert_eq!(archive.messages()[0].kind, MessageKind::StampChronology);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut writer = ArchiveWriter::new(0);
        writer.add_dependency(PublicId::random(), "x");
        let mut bytes = writer.finish().to_vec();
        bytes[0] = b'X';
        assert!(matches!(Archive::from_bytes(&bytes), Err(Error::Archive(_))));
    }

    #[test]
    fn unset_kind_tag_rejected() {
        assert!(MessageKind::from_tag(0).is_err());
        assert!(MessageKind::from_tag(9).is_err());
        assert_eq!(MessageKind::from_tag(2).unwrap(), MessageKind::SemanticChronology);
    }

    #[test]
    fn semantic_message_roundtrip() {
        let message = SemanticMessage {
            public_id: PublicId::random(),
            pattern: PublicId::random(),
            referenced_component: PublicId::random(),
            versions: vec![SemanticVersionMessage {
                stamp: PublicId::random(),
                fields: vec![FieldValue::String("text".into()), FieldValue::ConceptRef(7)],
            }],
        };
        let decoded = SemanticMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn pattern_message_roundtrip() {
        let message = PatternMessage {
            public_id: PublicId::random(),
            versions: vec![PatternVersionMessage {
                stamp: PublicId::random(),
                referenced_component_purpose: PublicId::random(),
                referenced_component_meaning: PublicId::random(),
                field_definitions: vec![FieldDefinitionMessage {
                    meaning: PublicId::random(),
                    purpose: PublicId::random(),
                    data_type: PublicId::random(),
                }],
            }],
        };
        let decoded = PatternMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}
