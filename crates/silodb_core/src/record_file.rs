//! Per-type fixed-record file.
//!
//! One file per registered type: a schema header followed by fixed-length
//! records. A record's position is a pure function of its OID, so reads and
//! narrow writes never scan.

use crate::catalog::{TypeInfo, COUNT_OFFSET};
use crate::error::{DbError, DbResult};
use crate::types::Oid;
use silodb_codec::{
    decode_field, encode_field_into, is_tombstoned, slot_raw_ref, FieldSlot, FieldValue,
    RawPool, RawRef, TOMBSTONE_BIT,
};
use silodb_storage::StorageBackend;

/// Length of the fixed header preamble read first to learn `header_size`.
const PREAMBLE_LEN: usize = 20;

/// An open type file: backend plus the persisted type metadata.
pub struct RecordFile {
    backend: Box<dyn StorageBackend>,
    info: TypeInfo,
}

impl RecordFile {
    /// Initializes a fresh type file, writing its header.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn create(mut backend: Box<dyn StorageBackend>, info: TypeInfo) -> DbResult<Self> {
        backend.write_at(0, &info.encode_header())?;
        backend.flush()?;
        Ok(Self { backend, info })
    }

    /// Opens an existing type file, decoding its header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when the header is malformed.
    pub fn open(backend: Box<dyn StorageBackend>) -> DbResult<Self> {
        let preamble = backend.read_at(0, PREAMBLE_LEN)?;
        let header_size = u32::from_le_bytes([
            preamble[16],
            preamble[17],
            preamble[18],
            preamble[19],
        ]);
        let header = backend.read_at(0, header_size as usize)?;
        let info = TypeInfo::decode_header(&header)?;
        Ok(Self { backend, info })
    }

    /// The type's metadata.
    #[must_use]
    pub fn info(&self) -> &TypeInfo {
        &self.info
    }

    /// Mutable access to the type's metadata.
    pub fn info_mut(&mut self) -> &mut TypeInfo {
        &mut self.info
    }

    /// Replaces backend and metadata after a compaction or migration
    /// rewrite.
    pub fn replace(&mut self, backend: Box<dyn StorageBackend>, info: TypeInfo) {
        self.backend = backend;
        self.info = info;
    }

    /// Splits the file into its backend and metadata (compaction swaps).
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn StorageBackend>, TypeInfo) {
        (self.backend, self.info)
    }

    fn ensure_in_range(&self, oid: Oid) -> DbResult<()> {
        if oid.is_none() || oid.as_u32() > self.info.number_of_records() {
            return Err(DbError::InvalidOid {
                type_name: self.info.type_name().to_string(),
                oid,
                count: self.info.number_of_records(),
            });
        }
        Ok(())
    }

    /// Reads a record's full byte image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs and storage errors.
    pub fn read_record(&self, oid: Oid) -> DbResult<Vec<u8>> {
        self.ensure_in_range(oid)?;
        let offset = self.info.record_offset(oid);
        Ok(self
            .backend
            .read_at(offset, self.info.record_length() as usize)?)
    }

    /// Writes a record's full byte image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs, `InvalidFormat` when the
    /// image length is wrong, and storage errors.
    pub fn write_record(&mut self, oid: Oid, image: &[u8]) -> DbResult<()> {
        self.ensure_in_range(oid)?;
        if image.len() != self.info.record_length() as usize {
            return Err(DbError::invalid_format(
                format!("record image for '{}'", self.info.type_name()),
                format!(
                    "expected {} bytes, got {}",
                    self.info.record_length(),
                    image.len()
                ),
            ));
        }
        let offset = self.info.record_offset(oid);
        Ok(self.backend.write_at(offset, image)?)
    }

    /// Reads a record's status byte.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs and storage errors.
    pub fn read_status(&self, oid: Oid) -> DbResult<u8> {
        self.ensure_in_range(oid)?;
        let offset = self.info.record_offset(oid);
        Ok(self.backend.read_at(offset, 1)?[0])
    }

    /// Returns true if the record is live (in range and not tombstoned).
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn is_live(&self, oid: Oid) -> DbResult<bool> {
        if oid.is_none() || oid.as_u32() > self.info.number_of_records() {
            return Ok(false);
        }
        Ok(!is_tombstoned(self.read_status(oid)?))
    }

    /// Sets the tombstone bit on a record's status byte.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs and storage errors.
    pub fn mark_tombstoned(&mut self, oid: Oid) -> DbResult<()> {
        let status = self.read_status(oid)?;
        let offset = self.info.record_offset(oid);
        Ok(self.backend.write_at(offset, &[status | TOMBSTONE_BIT])?)
    }

    /// Rewrites the header's `number_of_records` field in place.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn persist_count(&mut self) -> DbResult<()> {
        let count = self.info.number_of_records();
        Ok(self
            .backend
            .write_at(COUNT_OFFSET, &count.to_le_bytes())?)
    }

    /// Reads a contiguous window of records starting at `start`, clamped to
    /// the allocation high-water mark. Returns the raw bytes and how many
    /// records they hold.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn read_window(&self, start: Oid, want: u32) -> DbResult<(Vec<u8>, u32)> {
        let total = self.info.number_of_records();
        if start.is_none() || start.as_u32() > total {
            return Ok((Vec::new(), 0));
        }
        let count = want.min(total - start.as_u32() + 1);
        let offset = self.info.record_offset(start);
        let len = count as usize * self.info.record_length() as usize;
        Ok((self.backend.read_at(offset, len)?, count))
    }

    /// Reads one field of one record without touching the rest of the
    /// record. This is the scan path of the criteria engine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs and codec or storage
    /// errors.
    pub fn read_field(&self, oid: Oid, field: usize, pool: &dyn RawPool) -> DbResult<FieldValue> {
        self.ensure_in_range(oid)?;
        let slot = self
            .info
            .layout()
            .slot(field)
            .ok_or_else(|| DbError::invalid_criteria("field index out of range"))?;
        let offset = self.info.record_offset(oid) + slot.offset as u64;
        let bytes = self.backend.read_at(offset, slot.width())?;
        let local = FieldSlot {
            kind: slot.kind,
            offset: 0,
        };
        Ok(decode_field(&bytes, local, pool)?)
    }

    /// Overwrites one field of one live record. This is the narrow-write
    /// path of partial saves.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOid` for out-of-range OIDs and codec or storage
    /// errors.
    pub fn write_field(
        &mut self,
        oid: Oid,
        field: usize,
        value: &FieldValue,
        pool: &mut dyn RawPool,
    ) -> DbResult<()> {
        self.ensure_in_range(oid)?;
        let slot = self
            .info
            .layout()
            .slot(field)
            .ok_or_else(|| DbError::invalid_criteria("field index out of range"))?;
        let mut bytes = vec![0u8; slot.width()];
        let local = FieldSlot {
            kind: slot.kind,
            offset: 0,
        };
        encode_field_into(&mut bytes, local, value, pool)?;
        let offset = self.info.record_offset(oid) + slot.offset as u64;
        Ok(self.backend.write_at(offset, &bytes)?)
    }

    /// Collects the raw-pool references held by a record's populated
    /// variable-size slots, so delete and update paths can free them.
    ///
    /// # Errors
    ///
    /// Returns storage or codec errors.
    pub fn raw_refs(&self, oid: Oid) -> DbResult<Vec<RawRef>> {
        let image = self.read_record(oid)?;
        let mut refs = Vec::new();
        for slot in self.info.layout().slots() {
            if let Some(raw) = slot_raw_ref(&image, *slot)? {
                refs.push(raw);
            }
        }
        Ok(refs)
    }

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn flush(&mut self) -> DbResult<()> {
        Ok(self.backend.flush()?)
    }

    /// Forces file contents to durable storage.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn sync(&mut self) -> DbResult<()> {
        Ok(self.backend.sync()?)
    }

    #[cfg(test)]
    fn backend_snapshot(&self) -> Vec<u8> {
        let size = self.backend.size().unwrap();
        self.backend.read_at(0, size as usize).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDesc, TypeDesc, TypeKind};
    use crate::rawpool::SharedPool;
    use crate::types::Tid;
    use silodb_codec::{encode_record, FieldKind};
    use silodb_storage::InMemoryBackend;

    fn open_fixture() -> (RecordFile, SharedPool) {
        let desc = TypeDesc::new(
            "Person",
            vec![
                FieldDesc::new("Name", FieldKind::Text),
                FieldDesc::new("Age", FieldKind::Int),
            ],
        );
        let info = TypeInfo::from_desc(&desc, Tid::new(1), TypeKind::User).unwrap();
        let file = RecordFile::create(Box::new(InMemoryBackend::new()), info).unwrap();
        let pool = SharedPool::open(Box::new(InMemoryBackend::new())).unwrap();
        (file, pool)
    }

    fn put(file: &mut RecordFile, pool: &mut SharedPool, name: &str, age: i64) -> Oid {
        let oid = file.info_mut().allocate_oid();
        let image = encode_record(
            file.info().layout(),
            &[FieldValue::Text(name.into()), FieldValue::Int(age)],
            pool,
        )
        .unwrap();
        file.write_record(oid, &image).unwrap();
        file.persist_count().unwrap();
        oid
    }

    #[test]
    fn write_and_read_back() {
        let (mut file, mut pool) = open_fixture();
        let oid = put(&mut file, &mut pool, "Alice", 30);
        assert_eq!(oid, Oid::new(1));

        let image = file.read_record(oid).unwrap();
        let values =
            silodb_codec::decode_record(file.info().layout(), &image, &pool).unwrap();
        assert_eq!(values[0], FieldValue::Text("Alice".into()));
        assert_eq!(values[1], FieldValue::Int(30));
    }

    #[test]
    fn oids_are_dense_and_one_based() {
        let (mut file, mut pool) = open_fixture();
        for i in 1..=5 {
            let oid = put(&mut file, &mut pool, "P", i);
            assert_eq!(oid.as_u32(), i as u32);
        }
        assert_eq!(file.info().number_of_records(), 5);
    }

    #[test]
    fn out_of_range_oid_rejected() {
        let (file, _pool) = open_fixture();
        assert!(matches!(
            file.read_record(Oid::new(1)),
            Err(DbError::InvalidOid { .. })
        ));
        assert!(matches!(
            file.read_record(Oid::NONE),
            Err(DbError::InvalidOid { .. })
        ));
    }

    #[test]
    fn tombstone_flips_liveness_only() {
        let (mut file, mut pool) = open_fixture();
        let oid = put(&mut file, &mut pool, "Alice", 30);

        assert!(file.is_live(oid).unwrap());
        file.mark_tombstoned(oid).unwrap();
        assert!(!file.is_live(oid).unwrap());

        // the payload bytes survive under the tombstone
        let image = file.read_record(oid).unwrap();
        let values =
            silodb_codec::decode_record(file.info().layout(), &image, &pool).unwrap();
        assert_eq!(values[0], FieldValue::Text("Alice".into()));
    }

    #[test]
    fn field_level_read_and_write() {
        let (mut file, mut pool) = open_fixture();
        let oid = put(&mut file, &mut pool, "Alice", 30);

        assert_eq!(
            file.read_field(oid, 1, &pool).unwrap(),
            FieldValue::Int(30)
        );

        file.write_field(oid, 1, &FieldValue::Int(31), &mut pool)
            .unwrap();
        assert_eq!(
            file.read_field(oid, 1, &pool).unwrap(),
            FieldValue::Int(31)
        );
        assert_eq!(
            file.read_field(oid, 0, &pool).unwrap(),
            FieldValue::Text("Alice".into())
        );
    }

    #[test]
    fn count_survives_reopen() {
        let desc = TypeDesc::new("T", vec![FieldDesc::new("X", FieldKind::Int)]);
        let info = TypeInfo::from_desc(&desc, Tid::new(2), TypeKind::User).unwrap();
        let mut file = RecordFile::create(Box::new(InMemoryBackend::new()), info).unwrap();
        let mut pool = SharedPool::open(Box::new(InMemoryBackend::new())).unwrap();

        for i in 0..3 {
            let oid = file.info_mut().allocate_oid();
            let image =
                encode_record(file.info().layout(), &[FieldValue::Int(i)], &mut pool).unwrap();
            file.write_record(oid, &image).unwrap();
        }
        file.persist_count().unwrap();

        // reopen over the same bytes
        let data = file.backend_snapshot();
        let reopened = RecordFile::open(Box::new(InMemoryBackend::with_data(data))).unwrap();
        assert_eq!(reopened.info().number_of_records(), 3);
        assert_eq!(reopened.info().type_name(), "T");
    }

    #[test]
    fn window_clamps_to_allocated_records() {
        let (mut file, mut pool) = open_fixture();
        for i in 0..4 {
            put(&mut file, &mut pool, "P", i);
        }
        let (bytes, count) = file.read_window(Oid::new(3), 10).unwrap();
        assert_eq!(count, 2);
        assert_eq!(bytes.len(), 2 * file.info().record_length() as usize);

        let (bytes, count) = file.read_window(Oid::new(9), 10).unwrap();
        assert_eq!(count, 0);
        assert!(bytes.is_empty());
    }
}
