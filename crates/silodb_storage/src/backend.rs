//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for SiloDB.
///
/// Storage backends are **opaque byte stores**. They provide positioned
/// reads and writes, appends, and durability control. SiloDB owns all file
/// format interpretation - backends do not understand type headers, records,
/// or the raw pool.
///
/// Record files are updated in place, so unlike a pure log store the backend
/// must support `write_at` anywhere within (or immediately past) the current
/// size.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `write_at` never disturbs bytes outside `[offset, offset + data.len())`
/// - `append` returns the offset where data was written
/// - `sync` ensures all written data is durable
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral databases
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size,
    /// or if an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, overwriting existing bytes.
    ///
    /// Writing at or past the current size extends the storage; any gap
    /// between the old size and `offset` reads back as zero bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush` - after it returns, all
    /// previously written data survives process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Used for redo-log truncation after a checkpoint and for compaction
    /// file swaps.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size, or
    /// if the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Grows the storage to `new_size`, zero-filling the extension.
    ///
    /// A no-op when the storage is already at least `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    fn set_len(&mut self, new_size: u64) -> StorageResult<()>;
}
