//! Record and field encoding.
//!
//! Each field slot begins with a one-byte presence flag (0 = null), followed
//! by the kind's inline payload. Scalars and object references are stored
//! inline; variable-size kinds store a [`RawRef`] inline and their payload
//! envelope in the raw pool. Little-endian throughout.

use crate::error::{CodecError, CodecResult};
use crate::layout::{FieldSlot, RecordLayout, STATUS_LIVE};
use crate::value::{FieldKind, FieldValue, ObjectRef, RawRef};
use bytes::BufMut;

/// Presence flag for a null slot.
const FLAG_NULL: u8 = 0;
/// Presence flag for a populated slot.
const FLAG_PRESENT: u8 = 1;

/// The raw-pool contract the codec writes variable-size payloads through.
///
/// The pool is an append-mostly byte arena shared by all types of one
/// database. `free` is advisory: freed space may be reused but is only
/// reclaimed by compaction.
pub trait RawPool {
    /// Stores a payload and returns its pool reference.
    fn write(&mut self, payload: &[u8]) -> CodecResult<RawRef>;

    /// Reads a payload back by reference.
    fn read(&self, raw: RawRef) -> CodecResult<Vec<u8>>;

    /// Marks a payload's space as reusable.
    fn free(&mut self, raw: RawRef) -> CodecResult<()>;
}

/// Encodes a full record from field values.
///
/// Values must appear in schema order and conform to the layout's kinds.
/// Variable-size payloads are written to `pool` as a side effect.
///
/// # Errors
///
/// Returns `KindMismatch` when a value does not conform to its slot, or a
/// pool error when a payload write fails.
pub fn encode_record(
    layout: &RecordLayout,
    values: &[FieldValue],
    pool: &mut dyn RawPool,
) -> CodecResult<Vec<u8>> {
    if values.len() != layout.field_count() {
        return Err(CodecError::invalid_structure(format!(
            "expected {} field values, got {}",
            layout.field_count(),
            values.len()
        )));
    }

    let mut buf = vec![0u8; layout.record_length()];
    buf[0] = STATUS_LIVE;

    for (i, value) in values.iter().enumerate() {
        let slot = layout.slot(i).ok_or(CodecError::UnexpectedEof)?;
        encode_field_into(&mut buf, slot, value, pool)?;
    }

    Ok(buf)
}

/// Encodes a single field value into its slot within a record buffer.
///
/// This is the narrow-write path: `save_partial` rewrites one slot without
/// re-encoding the rest of the record.
///
/// # Errors
///
/// Returns `KindMismatch` when the value does not conform to the slot.
pub fn encode_field_into(
    buf: &mut [u8],
    slot: FieldSlot,
    value: &FieldValue,
    pool: &mut dyn RawPool,
) -> CodecResult<()> {
    if !value.conforms_to(slot.kind) {
        return Err(CodecError::KindMismatch {
            expected: slot.kind.name(),
            actual: value.kind_name(),
        });
    }

    let out = buf
        .get_mut(slot.offset..slot.offset + slot.width())
        .ok_or(CodecError::UnexpectedEof)?;

    if value.is_null() {
        out.fill(0);
        out[0] = FLAG_NULL;
        return Ok(());
    }
    out[0] = FLAG_PRESENT;

    match (slot.kind, value) {
        (FieldKind::Bool, FieldValue::Bool(b)) => out[1] = u8::from(*b),
        (FieldKind::Int, FieldValue::Int(n)) => out[1..9].copy_from_slice(&n.to_le_bytes()),
        (FieldKind::UInt, FieldValue::UInt(n)) => out[1..9].copy_from_slice(&n.to_le_bytes()),
        (FieldKind::Real, FieldValue::Real(r)) => {
            out[1..9].copy_from_slice(&r.to_bits().to_le_bytes());
        }
        (FieldKind::Ref, FieldValue::Ref(r)) => {
            out[1..5].copy_from_slice(&r.oid.to_le_bytes());
            out[5..9].copy_from_slice(&r.tid.to_le_bytes());
        }
        (kind, value) if kind.is_raw_backed() => {
            let payload = encode_payload(kind, value)?;
            let raw = pool.write(&payload)?;
            out[1..9].copy_from_slice(&raw.offset.to_le_bytes());
            out[9..13].copy_from_slice(&raw.len.to_le_bytes());
        }
        _ => unreachable!("conformance checked above"),
    }

    Ok(())
}

/// Decodes a single field value from its slot within a record buffer.
///
/// # Errors
///
/// Returns an error when the buffer is too short or a pool read fails.
pub fn decode_field(buf: &[u8], slot: FieldSlot, pool: &dyn RawPool) -> CodecResult<FieldValue> {
    let data = buf
        .get(slot.offset..slot.offset + slot.width())
        .ok_or(CodecError::UnexpectedEof)?;

    if data[0] == FLAG_NULL {
        return Ok(FieldValue::Null);
    }

    Ok(match slot.kind {
        FieldKind::Bool => FieldValue::Bool(data[1] != 0),
        FieldKind::Int => FieldValue::Int(i64::from_le_bytes(take8(&data[1..])?)),
        FieldKind::UInt => FieldValue::UInt(u64::from_le_bytes(take8(&data[1..])?)),
        FieldKind::Real => FieldValue::Real(f64::from_bits(u64::from_le_bytes(take8(&data[1..])?))),
        FieldKind::Ref => {
            let oid = u32::from_le_bytes(take4(&data[1..])?);
            let tid = u32::from_le_bytes(take4(&data[5..])?);
            FieldValue::Ref(ObjectRef::new(oid, tid))
        }
        kind => {
            let raw = decode_raw_ref(&data[1..])?;
            let payload = pool.read(raw)?;
            decode_payload(kind, &payload)?
        }
    })
}

/// Decodes a full record into field values.
///
/// # Errors
///
/// Returns an error when the buffer is shorter than the layout's record
/// length or any field fails to decode.
pub fn decode_record(
    layout: &RecordLayout,
    buf: &[u8],
    pool: &dyn RawPool,
) -> CodecResult<Vec<FieldValue>> {
    if buf.len() < layout.record_length() {
        return Err(CodecError::UnexpectedEof);
    }

    let mut values = Vec::with_capacity(layout.field_count());
    for slot in layout.slots() {
        values.push(decode_field(buf, *slot, pool)?);
    }
    Ok(values)
}

/// Reads the raw-pool reference stored in a slot, if the slot is raw-backed
/// and non-null.
///
/// Used by delete and update paths to free superseded payloads.
///
/// # Errors
///
/// Returns an error when the buffer is too short.
pub fn slot_raw_ref(buf: &[u8], slot: FieldSlot) -> CodecResult<Option<RawRef>> {
    if !slot.kind.is_raw_backed() {
        return Ok(None);
    }
    let data = buf
        .get(slot.offset..slot.offset + slot.width())
        .ok_or(CodecError::UnexpectedEof)?;
    if data[0] == FLAG_NULL {
        return Ok(None);
    }
    Ok(Some(decode_raw_ref(&data[1..])?))
}

fn decode_raw_ref(data: &[u8]) -> CodecResult<RawRef> {
    let offset = u64::from_le_bytes(take8(data)?);
    let len = u32::from_le_bytes(take4(&data[8..])?);
    Ok(RawRef::new(offset, len))
}

fn take8(data: &[u8]) -> CodecResult<[u8; 8]> {
    data.get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or(CodecError::UnexpectedEof)
}

fn take4(data: &[u8]) -> CodecResult<[u8; 4]> {
    data.get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(CodecError::UnexpectedEof)
}

// ---------------------------------------------------------------------------
// Raw-pool payload envelopes
// ---------------------------------------------------------------------------

/// Encodes the raw-pool payload for a variable-size field value.
///
/// # Errors
///
/// Returns `KindMismatch` when the value does not match the kind.
pub fn encode_payload(kind: FieldKind, value: &FieldValue) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    match (kind, value) {
        (FieldKind::Text, FieldValue::Text(s)) => buf.put_slice(s.as_bytes()),
        (FieldKind::Bytes, FieldValue::Bytes(b)) => buf.put_slice(b),
        (FieldKind::Document, FieldValue::Document(b)) => buf.put_slice(b),
        (FieldKind::RefList, FieldValue::RefList(refs)) => {
            buf.put_u32_le(refs.len() as u32);
            for r in refs {
                buf.put_u32_le(r.oid);
                buf.put_u32_le(r.tid);
            }
        }
        (FieldKind::List, FieldValue::List(items)) => {
            buf.put_u32_le(items.len() as u32);
            for item in items {
                encode_tagged(&mut buf, item)?;
            }
        }
        (FieldKind::Dict, FieldValue::Dict(pairs)) => {
            buf.put_u32_le(pairs.len() as u32);
            for (key, val) in pairs {
                encode_tagged(&mut buf, key)?;
                encode_tagged(&mut buf, val)?;
            }
        }
        _ => {
            return Err(CodecError::KindMismatch {
                expected: kind.name(),
                actual: value.kind_name(),
            })
        }
    }
    Ok(buf)
}

/// Decodes a raw-pool payload back into a field value.
///
/// # Errors
///
/// Returns an error when the payload is malformed.
pub fn decode_payload(kind: FieldKind, payload: &[u8]) -> CodecResult<FieldValue> {
    Ok(match kind {
        FieldKind::Text => FieldValue::Text(
            String::from_utf8(payload.to_vec()).map_err(|_| CodecError::InvalidUtf8)?,
        ),
        FieldKind::Bytes => FieldValue::Bytes(payload.to_vec()),
        FieldKind::Document => FieldValue::Document(payload.to_vec()),
        FieldKind::RefList => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()?;
            let mut refs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let oid = cursor.read_u32()?;
                let tid = cursor.read_u32()?;
                refs.push(ObjectRef::new(oid, tid));
            }
            FieldValue::RefList(refs)
        }
        FieldKind::List => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_tagged(&mut cursor)?);
            }
            FieldValue::List(items)
        }
        FieldKind::Dict => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()?;
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = decode_tagged(&mut cursor)?;
                let val = decode_tagged(&mut cursor)?;
                pairs.push((key, val));
            }
            FieldValue::Dict(pairs)
        }
        _ => {
            return Err(CodecError::invalid_structure(format!(
                "{} fields have no raw payload",
                kind.name()
            )))
        }
    })
}

// Tag bytes for self-describing values inside List/Dict payloads.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_UINT: u8 = 3;
const TAG_REAL: u8 = 4;
const TAG_TEXT: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_REF: u8 = 7;
const TAG_LIST: u8 = 9;
const TAG_DICT: u8 = 10;

fn encode_tagged(buf: &mut Vec<u8>, value: &FieldValue) -> CodecResult<()> {
    match value {
        FieldValue::Null => buf.put_u8(TAG_NULL),
        FieldValue::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        FieldValue::Int(n) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*n);
        }
        FieldValue::UInt(n) => {
            buf.put_u8(TAG_UINT);
            buf.put_u64_le(*n);
        }
        FieldValue::Real(r) => {
            buf.put_u8(TAG_REAL);
            buf.put_u64_le(r.to_bits());
        }
        FieldValue::Text(s) => {
            buf.put_u8(TAG_TEXT);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
        FieldValue::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            buf.put_u32_le(b.len() as u32);
            buf.put_slice(b);
        }
        FieldValue::Ref(r) => {
            buf.put_u8(TAG_REF);
            buf.put_u32_le(r.oid);
            buf.put_u32_le(r.tid);
        }
        FieldValue::List(items) => {
            buf.put_u8(TAG_LIST);
            buf.put_u32_le(items.len() as u32);
            for item in items {
                encode_tagged(buf, item)?;
            }
        }
        FieldValue::Dict(pairs) => {
            buf.put_u8(TAG_DICT);
            buf.put_u32_le(pairs.len() as u32);
            for (key, val) in pairs {
                encode_tagged(buf, key)?;
                encode_tagged(buf, val)?;
            }
        }
        FieldValue::RefList(_) | FieldValue::Document(_) => {
            return Err(CodecError::invalid_structure(format!(
                "{} values cannot nest inside list or dict payloads",
                value.kind_name()
            )))
        }
    }
    Ok(())
}

fn decode_tagged(cursor: &mut Cursor<'_>) -> CodecResult<FieldValue> {
    let tag = cursor.read_u8()?;
    Ok(match tag {
        TAG_NULL => FieldValue::Null,
        TAG_BOOL => FieldValue::Bool(cursor.read_u8()? != 0),
        TAG_INT => FieldValue::Int(cursor.read_i64()?),
        TAG_UINT => FieldValue::UInt(cursor.read_u64()?),
        TAG_REAL => FieldValue::Real(f64::from_bits(cursor.read_u64()?)),
        TAG_TEXT => {
            let len = cursor.read_u32()? as usize;
            let bytes = cursor.read_bytes(len)?;
            FieldValue::Text(String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?)
        }
        TAG_BYTES => {
            let len = cursor.read_u32()? as usize;
            FieldValue::Bytes(cursor.read_bytes(len)?)
        }
        TAG_REF => {
            let oid = cursor.read_u32()?;
            let tid = cursor.read_u32()?;
            FieldValue::Ref(ObjectRef::new(oid, tid))
        }
        TAG_LIST => {
            let count = cursor.read_u32()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_tagged(cursor)?);
            }
            FieldValue::List(items)
        }
        TAG_DICT => {
            let count = cursor.read_u32()?;
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = decode_tagged(cursor)?;
                let val = decode_tagged(cursor)?;
                pairs.push((key, val));
            }
            FieldValue::Dict(pairs)
        }
        other => return Err(CodecError::InvalidKindTag(other)),
    })
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<Vec<u8>> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?
            .to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        let b = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(
            self.read_bytes(4)?.try_into().map_err(|_| CodecError::UnexpectedEof)?,
        ))
    }

    fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(
            self.read_bytes(8)?.try_into().map_err(|_| CodecError::UnexpectedEof)?,
        ))
    }

    fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(
            self.read_bytes(8)?.try_into().map_err(|_| CodecError::UnexpectedEof)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal in-memory raw pool for codec tests.
    #[derive(Default)]
    struct TestPool {
        payloads: HashMap<u64, Vec<u8>>,
        next: u64,
    }

    impl RawPool for TestPool {
        fn write(&mut self, payload: &[u8]) -> CodecResult<RawRef> {
            let offset = self.next;
            self.next += 1;
            self.payloads.insert(offset, payload.to_vec());
            Ok(RawRef::new(offset, payload.len() as u32))
        }

        fn read(&self, raw: RawRef) -> CodecResult<Vec<u8>> {
            self.payloads
                .get(&raw.offset)
                .cloned()
                .ok_or_else(|| CodecError::raw_pool("missing payload"))
        }

        fn free(&mut self, raw: RawRef) -> CodecResult<()> {
            self.payloads.remove(&raw.offset);
            Ok(())
        }
    }

    fn layout() -> RecordLayout {
        RecordLayout::new(&[
            FieldKind::Text,
            FieldKind::Int,
            FieldKind::UInt,
            FieldKind::Ref,
        ])
    }

    #[test]
    fn record_round_trip() {
        let layout = layout();
        let mut pool = TestPool::default();

        let values = vec![
            FieldValue::Text("Alice".into()),
            FieldValue::Int(30),
            FieldValue::UInt(1),
            FieldValue::Ref(ObjectRef::new(7, 3)),
        ];

        let buf = encode_record(&layout, &values, &mut pool).unwrap();
        assert_eq!(buf.len(), layout.record_length());
        assert_eq!(buf[0], STATUS_LIVE);

        let decoded = decode_record(&layout, &buf, &pool).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn null_fields_round_trip() {
        let layout = layout();
        let mut pool = TestPool::default();

        let values = vec![
            FieldValue::Null,
            FieldValue::Null,
            FieldValue::UInt(0),
            FieldValue::Null,
        ];

        let buf = encode_record(&layout, &values, &mut pool).unwrap();
        let decoded = decode_record(&layout, &buf, &pool).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn single_field_decode_without_full_record() {
        let layout = layout();
        let mut pool = TestPool::default();

        let values = vec![
            FieldValue::Text("Bob".into()),
            FieldValue::Int(-5),
            FieldValue::UInt(9),
            FieldValue::Null,
        ];
        let buf = encode_record(&layout, &values, &mut pool).unwrap();

        let age = decode_field(&buf, layout.slot(1).unwrap(), &pool).unwrap();
        assert_eq!(age, FieldValue::Int(-5));
    }

    #[test]
    fn single_field_overwrite_in_place() {
        let layout = layout();
        let mut pool = TestPool::default();

        let values = vec![
            FieldValue::Text("Bob".into()),
            FieldValue::Int(1),
            FieldValue::UInt(0),
            FieldValue::Null,
        ];
        let mut buf = encode_record(&layout, &values, &mut pool).unwrap();

        let slot = layout.slot(1).unwrap();
        encode_field_into(&mut buf, slot, &FieldValue::Int(99), &mut pool).unwrap();

        let decoded = decode_record(&layout, &buf, &pool).unwrap();
        assert_eq!(decoded[0], FieldValue::Text("Bob".into()));
        assert_eq!(decoded[1], FieldValue::Int(99));
    }

    #[test]
    fn kind_mismatch_rejected() {
        let layout = RecordLayout::new(&[FieldKind::Int]);
        let mut pool = TestPool::default();

        let result = encode_record(&layout, &[FieldValue::Text("no".into())], &mut pool);
        assert!(matches!(result, Err(CodecError::KindMismatch { .. })));
    }

    #[test]
    fn wrong_value_count_rejected() {
        let layout = RecordLayout::new(&[FieldKind::Int, FieldKind::Bool]);
        let mut pool = TestPool::default();

        let result = encode_record(&layout, &[FieldValue::Int(1)], &mut pool);
        assert!(matches!(result, Err(CodecError::InvalidStructure { .. })));
    }

    #[test]
    fn ref_list_payload_round_trip() {
        let layout = RecordLayout::new(&[FieldKind::RefList]);
        let mut pool = TestPool::default();

        let refs = vec![ObjectRef::new(1, 2), ObjectRef::new(3, 2), ObjectRef::new(9, 4)];
        let buf =
            encode_record(&layout, &[FieldValue::RefList(refs.clone())], &mut pool).unwrap();

        let decoded = decode_record(&layout, &buf, &pool).unwrap();
        assert_eq!(decoded[0], FieldValue::RefList(refs));
    }

    #[test]
    fn nested_list_and_dict_round_trip() {
        let layout = RecordLayout::new(&[FieldKind::List, FieldKind::Dict]);
        let mut pool = TestPool::default();

        let list = FieldValue::List(vec![
            FieldValue::Int(1),
            FieldValue::Text("two".into()),
            FieldValue::List(vec![FieldValue::Bool(true), FieldValue::Null]),
        ]);
        let dict = FieldValue::Dict(vec![
            (FieldValue::Text("a".into()), FieldValue::Int(1)),
            (
                FieldValue::Text("member".into()),
                FieldValue::Ref(ObjectRef::new(4, 7)),
            ),
        ]);

        let buf = encode_record(&layout, &[list.clone(), dict.clone()], &mut pool).unwrap();
        let decoded = decode_record(&layout, &buf, &pool).unwrap();
        assert_eq!(decoded[0], list);
        assert_eq!(decoded[1], dict);
    }

    #[test]
    fn slot_raw_ref_reports_payload_location() {
        let layout = RecordLayout::new(&[FieldKind::Int, FieldKind::Text]);
        let mut pool = TestPool::default();

        let buf = encode_record(
            &layout,
            &[FieldValue::Int(1), FieldValue::Text("payload".into())],
            &mut pool,
        )
        .unwrap();

        assert_eq!(slot_raw_ref(&buf, layout.slot(0).unwrap()).unwrap(), None);
        let raw = slot_raw_ref(&buf, layout.slot(1).unwrap()).unwrap().unwrap();
        assert_eq!(pool.read(raw).unwrap(), b"payload");
    }

    #[test]
    fn truncated_payload_fails_cleanly() {
        let result = decode_payload(FieldKind::RefList, &[1, 0, 0, 0, 5]);
        assert!(matches!(result, Err(CodecError::UnexpectedEof)));
    }
}
