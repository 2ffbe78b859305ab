//! Dynamic field value model.
//!
//! Records in SiloDB are fixed-length rows of typed fields. At the codec
//! boundary a field is one of the [`FieldValue`] variants; which variants a
//! field accepts is fixed by its [`FieldKind`] in the type schema.

use std::fmt;

/// A reference to a persisted object: its OID within its type's file plus
/// the TID identifying that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// 1-based object identifier within the target type's file.
    pub oid: u32,
    /// Numeric identifier of the target type.
    pub tid: u32,
}

impl ObjectRef {
    /// Creates a new object reference.
    #[must_use]
    pub const fn new(oid: u32, tid: u32) -> Self {
        Self { oid, tid }
    }

    /// The null reference (no persisted identity).
    pub const NULL: Self = Self { oid: 0, tid: 0 };

    /// Returns true if this is the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.oid == 0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}#{}", self.tid, self.oid)
    }
}

/// A reference into the shared raw pool: offset plus payload length.
///
/// Variable-size field payloads (text, lists, dictionaries, documents) are
/// stored out of line in the pool; the record holds only this indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRef {
    /// Byte offset of the payload within the pool.
    pub offset: u64,
    /// Payload length in bytes.
    pub len: u32,
}

impl RawRef {
    /// Creates a new raw-pool reference.
    #[must_use]
    pub const fn new(offset: u64, len: u32) -> Self {
        Self { offset, len }
    }
}

/// The declared kind of a field in a type schema.
///
/// The kind fixes the field's inline width within a record. Scalars are
/// stored inline; variable-size kinds store a [`RawRef`] inline and the
/// payload in the raw pool; `Ref` stores an [`ObjectRef`] inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    /// Boolean scalar.
    Bool = 1,
    /// Signed 64-bit integer scalar.
    Int = 2,
    /// Unsigned 64-bit integer scalar (also the tick-count kind).
    UInt = 3,
    /// 64-bit floating point scalar.
    Real = 4,
    /// UTF-8 text, raw-pool backed.
    Text = 5,
    /// Opaque bytes, raw-pool backed.
    Bytes = 6,
    /// Reference to a single persisted object.
    Ref = 7,
    /// Array of references to persisted objects, raw-pool backed.
    RefList = 8,
    /// Array of scalar values, raw-pool backed.
    List = 9,
    /// Dictionary of scalar keys to scalar-or-reference values, raw-pool backed.
    Dict = 10,
    /// Opaque CBOR document, raw-pool backed.
    Document = 11,
}

impl FieldKind {
    /// Inline width of this kind within a record, in bytes.
    ///
    /// Every slot starts with a one-byte null flag. Scalars follow with
    /// their payload; `Ref` packs oid+tid; variable-size kinds pack a
    /// raw-pool offset (u64) and length (u32).
    #[must_use]
    pub const fn inline_width(self) -> usize {
        match self {
            Self::Bool => 1 + 1,
            Self::Int | Self::UInt | Self::Real => 1 + 8,
            Self::Ref => 1 + 8,
            Self::Text
            | Self::Bytes
            | Self::RefList
            | Self::List
            | Self::Dict
            | Self::Document => 1 + 12,
        }
    }

    /// Returns true if this kind stores its payload in the raw pool.
    #[must_use]
    pub const fn is_raw_backed(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Bytes | Self::RefList | Self::List | Self::Dict | Self::Document
        )
    }

    /// Returns true if this kind carries references to other persisted
    /// objects (a "complex" field in schema terms).
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Ref | Self::RefList | Self::Dict)
    }

    /// Converts a tag byte to a kind.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::UInt),
            4 => Some(Self::Real),
            5 => Some(Self::Text),
            6 => Some(Self::Bytes),
            7 => Some(Self::Ref),
            8 => Some(Self::RefList),
            9 => Some(Self::List),
            10 => Some(Self::Dict),
            11 => Some(Self::Document),
            _ => None,
        }
    }

    /// Converts this kind to its tag byte.
    #[must_use]
    pub const fn as_tag(self) -> u8 {
        self as u8
    }

    /// Human-readable kind name (for error messages).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Real => "real",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Ref => "ref",
            Self::RefList => "ref-list",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Document => "document",
        }
    }
}

/// A dynamic field value.
///
/// This is the unit the storage engine stages into records and the criteria
/// engine compares against literals.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Null (absent) value; valid for any field kind.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value.
    UInt(u64),
    /// Floating point value.
    Real(f64),
    /// UTF-8 text value.
    Text(String),
    /// Opaque byte string.
    Bytes(Vec<u8>),
    /// Reference to a persisted object.
    Ref(ObjectRef),
    /// Array of references to persisted objects.
    RefList(Vec<ObjectRef>),
    /// Array of scalar values.
    List(Vec<FieldValue>),
    /// Dictionary of key-value pairs.
    Dict(Vec<(FieldValue, FieldValue)>),
    /// Opaque CBOR document payload.
    Document(Vec<u8>),
}

impl FieldValue {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Gets this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Gets this value as a signed integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this value as an unsigned integer, if it is one.
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this value as a float, if it is one.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Gets this value as text, if it is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Gets this value as an object reference, if it is one.
    #[must_use]
    pub fn as_ref_value(&self) -> Option<ObjectRef> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Gets this value as a reference list, if it is one.
    #[must_use]
    pub fn as_ref_list(&self) -> Option<&[ObjectRef]> {
        match self {
            Self::RefList(refs) => Some(refs),
            _ => None,
        }
    }

    /// Human-readable name of this value's runtime kind (for errors).
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Ref(_) => "ref",
            Self::RefList(_) => "ref-list",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Document(_) => "document",
        }
    }

    /// Returns true if this value is acceptable for a field of `kind`.
    ///
    /// `Null` is acceptable everywhere.
    #[must_use]
    pub fn conforms_to(&self, kind: FieldKind) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(_) => kind == FieldKind::Bool,
            Self::Int(_) => kind == FieldKind::Int,
            Self::UInt(_) => kind == FieldKind::UInt,
            Self::Real(_) => kind == FieldKind::Real,
            Self::Text(_) => kind == FieldKind::Text,
            Self::Bytes(_) => kind == FieldKind::Bytes,
            Self::Ref(_) => kind == FieldKind::Ref,
            Self::RefList(_) => kind == FieldKind::RefList,
            Self::List(_) => kind == FieldKind::List,
            Self::Dict(_) => kind == FieldKind::Dict,
            Self::Document(_) => kind == FieldKind::Document,
        }
    }

    /// The default (zero) value for a field kind, used by migration when a
    /// retyped field cannot be converted.
    #[must_use]
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool => Self::Bool(false),
            FieldKind::Int => Self::Int(0),
            FieldKind::UInt => Self::UInt(0),
            FieldKind::Real => Self::Real(0.0),
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::Bytes => Self::Bytes(Vec::new()),
            FieldKind::Ref => Self::Null,
            FieldKind::RefList => Self::RefList(Vec::new()),
            FieldKind::List => Self::List(Vec::new()),
            FieldKind::Dict => Self::Dict(Vec::new()),
            FieldKind::Document => Self::Null,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<f64> for FieldValue {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<ObjectRef> for FieldValue {
    fn from(r: ObjectRef) -> Self {
        Self::Ref(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_round_trip() {
        for kind in [
            FieldKind::Bool,
            FieldKind::Int,
            FieldKind::UInt,
            FieldKind::Real,
            FieldKind::Text,
            FieldKind::Bytes,
            FieldKind::Ref,
            FieldKind::RefList,
            FieldKind::List,
            FieldKind::Dict,
            FieldKind::Document,
        ] {
            assert_eq!(FieldKind::from_tag(kind.as_tag()), Some(kind));
        }
        assert_eq!(FieldKind::from_tag(0), None);
        assert_eq!(FieldKind::from_tag(99), None);
    }

    #[test]
    fn inline_widths() {
        assert_eq!(FieldKind::Bool.inline_width(), 2);
        assert_eq!(FieldKind::Int.inline_width(), 9);
        assert_eq!(FieldKind::Ref.inline_width(), 9);
        assert_eq!(FieldKind::Text.inline_width(), 13);
        assert_eq!(FieldKind::Document.inline_width(), 13);
    }

    #[test]
    fn null_conforms_to_everything() {
        assert!(FieldValue::Null.conforms_to(FieldKind::Bool));
        assert!(FieldValue::Null.conforms_to(FieldKind::Text));
        assert!(FieldValue::Null.conforms_to(FieldKind::Ref));
    }

    #[test]
    fn conformance_is_exact() {
        assert!(FieldValue::Int(1).conforms_to(FieldKind::Int));
        assert!(!FieldValue::Int(1).conforms_to(FieldKind::UInt));
        assert!(!FieldValue::Text("x".into()).conforms_to(FieldKind::Bytes));
    }

    #[test]
    fn null_object_ref() {
        assert!(ObjectRef::NULL.is_null());
        assert!(!ObjectRef::new(1, 1).is_null());
    }

    #[test]
    fn complex_kinds() {
        assert!(FieldKind::Ref.is_complex());
        assert!(FieldKind::RefList.is_complex());
        assert!(FieldKind::Dict.is_complex());
        assert!(!FieldKind::Text.is_complex());
    }
}
