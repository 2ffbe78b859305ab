//! # SiloDB Codec
//!
//! Fixed-record field codec and dynamic value model for SiloDB.
//!
//! SiloDB stores each type's objects as fixed-length records in a flat file.
//! This crate owns the byte layout of those records:
//!
//! - [`FieldValue`] / [`FieldKind`] - the dynamic value model
//! - [`RecordLayout`] - per-type slot offsets computed from the schema
//! - [`encode_record`] / [`decode_record`] - whole-record conversion
//! - [`encode_field_into`] / [`decode_field`] - single-slot random access,
//!   used by partial saves and field-level scans
//! - [`RawPool`] - the shared pool variable-size payloads are stored through
//! - [`encode_document`] / [`decode_document`] - CBOR document payloads
//!
//! The codec has no knowledge of OIDs beyond embedding [`ObjectRef`]s, and
//! no knowledge of files: callers hand it buffers and a pool.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod layout;
mod record;
mod value;

pub use document::{decode_document, encode_document};
pub use error::{CodecError, CodecResult};
pub use layout::{is_tombstoned, FieldSlot, RecordLayout, STATUS_LIVE, TOMBSTONE_BIT};
pub use record::{
    decode_field, decode_payload, decode_record, encode_field_into, encode_payload,
    encode_record, slot_raw_ref, RawPool,
};
pub use value::{FieldKind, FieldValue, ObjectRef, RawRef};
