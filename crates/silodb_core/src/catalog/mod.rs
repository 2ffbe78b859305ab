//! Type catalog: schemas, per-type metadata and the type-file header codec.
//!
//! Each registered type owns one fixed-record file. The file starts with a
//! header carrying the persisted schema; the engine compares it against the
//! declared schema on registration and flags the type stale on mismatch.

pub mod migration;

use crate::error::{DbError, DbResult};
use crate::types::{Oid, Tid};
use silodb_codec::{FieldKind, RecordLayout};

/// Magic bytes at the start of every type file.
pub const TYPE_MAGIC: [u8; 4] = *b"SILO";
/// Current type-file format version.
pub const TYPE_FORMAT: u32 = 1;
/// Byte offset of `number_of_records` within the header; rewritten in place
/// on every OID allocation.
pub const COUNT_OFFSET: u64 = 20;

const FLAG_UNIQUE: u8 = 0b0000_0001;
const FLAG_INDEXED: u8 = 0b0000_0010;
const FLAG_VERSION: u8 = 0b0000_0100;

/// Whether a type holds user objects or an engine-internal structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeKind {
    /// Application objects; visited by compaction and bulk loads.
    User = 0,
    /// Engine-internal bookkeeping; skipped by compaction renumbering.
    SystemIndex = 1,
}

impl TypeKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::User),
            1 => Some(Self::SystemIndex),
            _ => None,
        }
    }
}

/// A declared field in a type schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Field name, unique within the type.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
    /// Reject saves that would duplicate this field's value.
    pub unique: bool,
    /// Maintain an in-memory index over this field.
    pub indexed: bool,
    /// This field is the optimistic-concurrency tick counter.
    pub version: bool,
    /// Target type name for `Ref`, `RefList` and reference-valued `Dict`
    /// fields.
    pub target_type: Option<String>,
}

impl FieldDesc {
    /// Creates a plain field.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unique: false,
            indexed: false,
            version: false,
            target_type: None,
        }
    }

    /// Marks the field unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the field indexed.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Marks the field as the tick counter. Must be of kind `UInt`.
    #[must_use]
    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    /// Sets the reference target type.
    #[must_use]
    pub fn target(mut self, type_name: impl Into<String>) -> Self {
        self.target_type = Some(type_name.into());
        self
    }
}

/// A declared type schema: what [`Persist::type_desc`](crate::Persist::type_desc)
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDesc {
    /// Type name; also the stem of the type's file.
    pub name: String,
    /// Fields in storage order.
    pub fields: Vec<FieldDesc>,
}

impl TypeDesc {
    /// Creates a schema.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldDesc>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// A field as persisted: declared properties plus its computed slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
    /// Byte offset of the field's slot within a record.
    pub offset: usize,
    /// Unique flag.
    pub unique: bool,
    /// Indexed flag.
    pub indexed: bool,
    /// Tick-counter flag.
    pub version: bool,
    /// Reference target type name.
    pub target_type: Option<String>,
}

/// Persisted metadata for one registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    tid: Tid,
    type_name: String,
    kind: TypeKind,
    fields: Vec<FieldInfo>,
    layout: RecordLayout,
    header_size: u32,
    number_of_records: u32,
    schema_stale: bool,
}

impl TypeInfo {
    /// Builds fresh metadata for a newly registered type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when the schema is malformed: duplicate field
    /// names, more than one version field, or a version field that is not
    /// `UInt`.
    pub fn from_desc(desc: &TypeDesc, tid: Tid, kind: TypeKind) -> DbResult<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut version_count = 0usize;
        for field in &desc.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DbError::invalid_format(
                    format!("schema for '{}'", desc.name),
                    format!("duplicate field '{}'", field.name),
                ));
            }
            if field.version {
                version_count += 1;
                if field.kind != FieldKind::UInt {
                    return Err(DbError::invalid_format(
                        format!("schema for '{}'", desc.name),
                        format!("version field '{}' must be uint", field.name),
                    ));
                }
            }
        }
        if version_count > 1 {
            return Err(DbError::invalid_format(
                format!("schema for '{}'", desc.name),
                "more than one version field",
            ));
        }

        let kinds: Vec<FieldKind> = desc.fields.iter().map(|f| f.kind).collect();
        let layout = RecordLayout::new(&kinds);
        let fields = desc
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| FieldInfo {
                name: f.name.clone(),
                kind: f.kind,
                offset: layout.slot(i).map_or(0, |s| s.offset),
                unique: f.unique,
                indexed: f.indexed,
                version: f.version,
                target_type: f.target_type.clone(),
            })
            .collect();

        let mut info = Self {
            tid,
            type_name: desc.name.clone(),
            kind,
            fields,
            layout,
            header_size: 0,
            number_of_records: 0,
            schema_stale: false,
        };
        info.header_size = info.encode_header().len() as u32;
        Ok(info)
    }

    /// The type's numeric identifier.
    #[must_use]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// The type's name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// User or system type.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Fields in storage order.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Slot layout for this type's records.
    #[must_use]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Fixed record length in bytes.
    #[must_use]
    pub fn record_length(&self) -> u32 {
        self.layout.record_length() as u32
    }

    /// Header size in bytes; records start at this offset.
    #[must_use]
    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    /// Highest OID ever allocated for this type.
    #[must_use]
    pub fn number_of_records(&self) -> u32 {
        self.number_of_records
    }

    /// Sets the allocation high-water mark (recovery and compaction only).
    pub fn set_number_of_records(&mut self, count: u32) {
        self.number_of_records = count;
    }

    /// Allocates the next OID.
    pub fn allocate_oid(&mut self) -> Oid {
        self.number_of_records += 1;
        Oid::new(self.number_of_records)
    }

    /// True when the persisted schema differs from the declared one and the
    /// type has not been migrated yet.
    #[must_use]
    pub fn is_schema_stale(&self) -> bool {
        self.schema_stale
    }

    /// Marks the type stale (set when registration detects a mismatch).
    pub fn set_schema_stale(&mut self, stale: bool) {
        self.schema_stale = stale;
    }

    /// Byte offset of a record within the type file.
    #[must_use]
    pub fn record_offset(&self, oid: Oid) -> u64 {
        u64::from(self.header_size)
            + u64::from(oid.as_u32() - 1) * u64::from(self.record_length())
    }

    /// Index of a field by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// A field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of the tick-counter field, if the schema declares one.
    #[must_use]
    pub fn version_field(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.version)
    }

    /// Compares the persisted schema against a declared one.
    ///
    /// Returns `None` when they match, otherwise a human-readable summary of
    /// the first difference.
    #[must_use]
    pub fn schema_diff(&self, desc: &TypeDesc) -> Option<String> {
        if self.fields.len() != desc.fields.len() {
            return Some(format!(
                "field count changed from {} to {}",
                self.fields.len(),
                desc.fields.len()
            ));
        }
        for (stored, declared) in self.fields.iter().zip(&desc.fields) {
            if stored.name != declared.name {
                return Some(format!(
                    "field '{}' renamed or reordered to '{}'",
                    stored.name, declared.name
                ));
            }
            if stored.kind != declared.kind {
                return Some(format!(
                    "field '{}' retyped from {} to {}",
                    stored.name,
                    stored.kind.name(),
                    declared.kind.name()
                ));
            }
            if stored.unique != declared.unique
                || stored.indexed != declared.indexed
                || stored.version != declared.version
                || stored.target_type != declared.target_type
            {
                return Some(format!("field '{}' flags changed", stored.name));
            }
        }
        None
    }

    /// Encodes the file header.
    #[must_use]
    pub fn encode_header(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TYPE_MAGIC);
        buf.extend_from_slice(&TYPE_FORMAT.to_le_bytes());
        buf.extend_from_slice(&self.tid.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.record_length().to_le_bytes());
        buf.extend_from_slice(&self.header_size.to_le_bytes());
        buf.extend_from_slice(&self.number_of_records.to_le_bytes());
        buf.push(self.kind as u8);
        write_str(&mut buf, &self.type_name);
        buf.extend_from_slice(&(self.fields.len() as u16).to_le_bytes());
        for field in &self.fields {
            write_str(&mut buf, &field.name);
            buf.push(field.kind.as_tag());
            let mut flags = 0u8;
            if field.unique {
                flags |= FLAG_UNIQUE;
            }
            if field.indexed {
                flags |= FLAG_INDEXED;
            }
            if field.version {
                flags |= FLAG_VERSION;
            }
            buf.push(flags);
            write_str(&mut buf, field.target_type.as_deref().unwrap_or(""));
        }
        buf
    }

    /// Decodes a file header.
    ///
    /// `buf` must hold at least the full header; callers read the fixed
    /// preamble first to learn `header_size`, then pass the complete slice.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when the magic, format version, kind tag or
    /// any field entry is malformed.
    pub fn decode_header(buf: &[u8]) -> DbResult<Self> {
        let context = "type file header";
        let mut r = Reader::new(buf, context);

        let magic = r.bytes(4)?;
        if magic != TYPE_MAGIC {
            return Err(DbError::invalid_format(context, "bad magic"));
        }
        let format = r.u32()?;
        if format != TYPE_FORMAT {
            return Err(DbError::invalid_format(
                context,
                format!("unsupported format {format}"),
            ));
        }
        let tid = Tid::new(r.u32()?);
        let record_length = r.u32()?;
        let header_size = r.u32()?;
        let number_of_records = r.u32()?;
        let kind = TypeKind::from_tag(r.u8()?)
            .ok_or_else(|| DbError::invalid_format(context, "bad type kind"))?;
        let type_name = r.string()?;
        let field_count = r.u16()?;

        let mut descs = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name = r.string()?;
            let kind_tag = r.u8()?;
            let kind = FieldKind::from_tag(kind_tag).ok_or_else(|| {
                DbError::invalid_format(context, format!("bad field kind tag {kind_tag}"))
            })?;
            let flags = r.u8()?;
            let target = r.string()?;
            descs.push(FieldDesc {
                name,
                kind,
                unique: flags & FLAG_UNIQUE != 0,
                indexed: flags & FLAG_INDEXED != 0,
                version: flags & FLAG_VERSION != 0,
                target_type: if target.is_empty() { None } else { Some(target) },
            });
        }

        let desc = TypeDesc::new(type_name, descs);
        let mut info = Self::from_desc(&desc, tid, kind)?;
        if info.record_length() != record_length {
            return Err(DbError::invalid_format(
                context,
                format!(
                    "record length {} does not match layout ({})",
                    record_length,
                    info.record_length()
                ),
            ));
        }
        if info.header_size != header_size {
            return Err(DbError::invalid_format(
                context,
                format!(
                    "header size {} does not match layout ({})",
                    header_size, info.header_size
                ),
            ));
        }
        info.number_of_records = number_of_records;
        Ok(info)
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], context: &'static str) -> Self {
        Self { buf, pos: 0, context }
    }

    fn bytes(&mut self, len: usize) -> DbResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| DbError::invalid_format(self.context, "truncated"))?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| DbError::invalid_format(self.context, "truncated"))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> DbResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> DbResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> DbResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> DbResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DbError::invalid_format(self.context, "invalid utf-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_desc() -> TypeDesc {
        TypeDesc::new(
            "Person",
            vec![
                FieldDesc::new("Name", FieldKind::Text).unique().indexed(),
                FieldDesc::new("Age", FieldKind::Int).indexed(),
                FieldDesc::new("tickCount", FieldKind::UInt).version(),
                FieldDesc::new("Home", FieldKind::Ref).target("Address"),
            ],
        )
    }

    #[test]
    fn header_round_trip() {
        let info = TypeInfo::from_desc(&person_desc(), Tid::new(3), TypeKind::User).unwrap();
        let header = info.encode_header();
        assert_eq!(header.len(), info.header_size() as usize);

        let decoded = TypeInfo::decode_header(&header).unwrap();
        assert_eq!(decoded.tid(), Tid::new(3));
        assert_eq!(decoded.type_name(), "Person");
        assert_eq!(decoded.fields(), info.fields());
        assert_eq!(decoded.record_length(), info.record_length());
        assert_eq!(decoded.number_of_records(), 0);
    }

    #[test]
    fn count_offset_points_at_number_of_records() {
        let mut info = TypeInfo::from_desc(&person_desc(), Tid::new(1), TypeKind::User).unwrap();
        info.set_number_of_records(0x0403_0201);
        let header = info.encode_header();
        let at = COUNT_OFFSET as usize;
        assert_eq!(&header[at..at + 4], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn record_offsets_are_one_based() {
        let info = TypeInfo::from_desc(&person_desc(), Tid::new(1), TypeKind::User).unwrap();
        assert_eq!(info.record_offset(Oid::new(1)), u64::from(info.header_size()));
        assert_eq!(
            info.record_offset(Oid::new(3)),
            u64::from(info.header_size()) + 2 * u64::from(info.record_length())
        );
    }

    #[test]
    fn version_field_lookup() {
        let info = TypeInfo::from_desc(&person_desc(), Tid::new(1), TypeKind::User).unwrap();
        assert_eq!(info.version_field(), Some(2));
        assert_eq!(info.field_index("Age"), Some(1));
        assert_eq!(info.field_index("Missing"), None);
    }

    #[test]
    fn schema_diff_detects_changes() {
        let info = TypeInfo::from_desc(&person_desc(), Tid::new(1), TypeKind::User).unwrap();
        assert!(info.schema_diff(&person_desc()).is_none());

        let mut added = person_desc();
        added.fields.push(FieldDesc::new("Email", FieldKind::Text));
        assert!(info.schema_diff(&added).unwrap().contains("field count"));

        let mut retyped = person_desc();
        retyped.fields[1].kind = FieldKind::Text;
        assert!(info.schema_diff(&retyped).unwrap().contains("retyped"));
    }

    #[test]
    fn duplicate_fields_rejected() {
        let desc = TypeDesc::new(
            "Bad",
            vec![
                FieldDesc::new("X", FieldKind::Int),
                FieldDesc::new("X", FieldKind::Int),
            ],
        );
        assert!(TypeInfo::from_desc(&desc, Tid::new(1), TypeKind::User).is_err());
    }

    #[test]
    fn non_uint_version_rejected() {
        let desc = TypeDesc::new(
            "Bad",
            vec![FieldDesc::new("tick", FieldKind::Int).version()],
        );
        assert!(TypeInfo::from_desc(&desc, Tid::new(1), TypeKind::User).is_err());
    }

    #[test]
    fn truncated_header_rejected() {
        let info = TypeInfo::from_desc(&person_desc(), Tid::new(1), TypeKind::User).unwrap();
        let header = info.encode_header();
        assert!(TypeInfo::decode_header(&header[..10]).is_err());
    }
}
