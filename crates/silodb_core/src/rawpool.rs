//! Shared raw pool.
//!
//! One pool file per database stores every variable-size field payload
//! (text, bytes, lists, dictionaries, documents) for all types. Records
//! hold `RawRef` indirections into it.
//!
//! The pool is append-mostly: freed space is tracked in memory and reused
//! for equal-or-smaller payloads, but only compaction rewrites the file and
//! returns space to the filesystem. The free list is rebuilt implicitly on
//! reopen (as empty), which merely forfeits reuse until the next compaction.

use crate::error::{DbError, DbResult};
use silodb_codec::{CodecError, CodecResult, RawPool, RawRef};
use silodb_storage::StorageBackend;

const POOL_MAGIC: [u8; 4] = *b"SPOL";
const POOL_FORMAT: u32 = 1;
const POOL_HEADER_LEN: u64 = 8;

/// The database-wide payload pool.
pub struct SharedPool {
    backend: Box<dyn StorageBackend>,
    free: Vec<RawRef>,
}

impl SharedPool {
    /// Opens a pool over a backend, initializing the header on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when an existing file does not carry the pool
    /// magic, or storage errors.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> DbResult<Self> {
        if backend.size()? == 0 {
            let mut header = Vec::with_capacity(POOL_HEADER_LEN as usize);
            header.extend_from_slice(&POOL_MAGIC);
            header.extend_from_slice(&POOL_FORMAT.to_le_bytes());
            backend.append(&header)?;
            backend.flush()?;
        } else {
            let header = backend.read_at(0, POOL_HEADER_LEN as usize)?;
            if header[..4] != POOL_MAGIC {
                return Err(DbError::invalid_format("raw pool", "bad magic"));
            }
            let format = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if format != POOL_FORMAT {
                return Err(DbError::invalid_format(
                    "raw pool",
                    format!("unsupported format {format}"),
                ));
            }
        }
        Ok(Self {
            backend,
            free: Vec::new(),
        })
    }

    /// Total pool size in bytes, header included.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn size(&self) -> DbResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn flush(&mut self) -> DbResult<()> {
        Ok(self.backend.flush()?)
    }

    /// Forces pool contents to durable storage.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn sync(&mut self) -> DbResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Replaces the pool's backend with a freshly compacted one.
    pub fn replace_backend(&mut self, backend: Box<dyn StorageBackend>) {
        self.backend = backend;
        self.free.clear();
    }

    /// Consumes the pool, yielding its backend (compaction swaps).
    #[must_use]
    pub fn into_backend(self) -> Box<dyn StorageBackend> {
        self.backend
    }

    fn take_free_slot(&mut self, len: u32) -> Option<RawRef> {
        let pos = self.free.iter().position(|r| r.len >= len)?;
        Some(self.free.swap_remove(pos))
    }
}

impl RawPool for SharedPool {
    fn write(&mut self, payload: &[u8]) -> CodecResult<RawRef> {
        let len = payload.len() as u32;
        if let Some(slot) = self.take_free_slot(len) {
            self.backend
                .write_at(slot.offset, payload)
                .map_err(|e| CodecError::raw_pool(e.to_string()))?;
            return Ok(RawRef::new(slot.offset, len));
        }
        let offset = self
            .backend
            .append(payload)
            .map_err(|e| CodecError::raw_pool(e.to_string()))?;
        Ok(RawRef::new(offset, len))
    }

    fn read(&self, raw: RawRef) -> CodecResult<Vec<u8>> {
        if raw.offset < POOL_HEADER_LEN {
            return Err(CodecError::raw_pool("payload offset inside pool header"));
        }
        self.backend
            .read_at(raw.offset, raw.len as usize)
            .map_err(|e| CodecError::raw_pool(e.to_string()))
    }

    fn free(&mut self, raw: RawRef) -> CodecResult<()> {
        if raw.len > 0 {
            self.free.push(raw);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silodb_storage::InMemoryBackend;

    fn pool() -> SharedPool {
        SharedPool::open(Box::new(InMemoryBackend::new())).unwrap()
    }

    #[test]
    fn write_read_round_trip() {
        let mut pool = pool();
        let raw = pool.write(b"hello").unwrap();
        assert_eq!(pool.read(raw).unwrap(), b"hello");
    }

    #[test]
    fn payloads_do_not_overlap() {
        let mut pool = pool();
        let a = pool.write(b"aaaa").unwrap();
        let b = pool.write(b"bbbbbb").unwrap();
        assert_eq!(pool.read(a).unwrap(), b"aaaa");
        assert_eq!(pool.read(b).unwrap(), b"bbbbbb");
    }

    #[test]
    fn freed_space_is_reused() {
        let mut pool = pool();
        let a = pool.write(b"0123456789").unwrap();
        pool.free(a).unwrap();
        let b = pool.write(b"xyz").unwrap();
        assert_eq!(b.offset, a.offset);
        assert_eq!(pool.read(b).unwrap(), b"xyz");
    }

    #[test]
    fn small_free_slot_not_used_for_larger_payload() {
        let mut pool = pool();
        let a = pool.write(b"ab").unwrap();
        pool.free(a).unwrap();
        let b = pool.write(b"longer payload").unwrap();
        assert_ne!(b.offset, a.offset);
    }

    #[test]
    fn rejects_header_offsets() {
        let pool = pool();
        assert!(pool.read(RawRef::new(0, 4)).is_err());
    }

    #[test]
    fn reopen_validates_magic() {
        let backend = InMemoryBackend::with_data(b"JUNKxxxx".to_vec());
        assert!(matches!(
            SharedPool::open(Box::new(backend)),
            Err(DbError::InvalidFormat { .. })
        ));
    }
}
