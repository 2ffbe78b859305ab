//! Undo log.
//!
//! Before any record or allocation high-water mark is mutated, its
//! pre-image is appended here and synced. A completed operation writes a
//! commit frame and resets the log; a crash leaves the log populated, and
//! recovery rolls every uncommitted pre-image back into the data files.
//!
//! Frames are length-prefixed. A torn tail (a frame whose declared length
//! runs past end of file, or an unknown tag) ends parsing: everything
//! before it is intact, everything after never happened.

use crate::error::{DbError, DbResult};
use crate::types::{Oid, Tid, TxId};
use silodb_storage::StorageBackend;

const LOG_MAGIC: [u8; 4] = *b"SLOG";
const LOG_FORMAT: u32 = 1;
const LOG_HEADER_LEN: u64 = 8;

const TAG_BEGIN: u8 = 1;
const TAG_SNAPSHOT: u8 = 2;
const TAG_IMAGE: u8 = 3;
const TAG_COMMIT: u8 = 4;

/// One undo-log frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// An operation or transaction started.
    Begin {
        /// Owning transaction.
        txid: TxId,
    },
    /// A type's allocation high-water mark before the operation touched it.
    TypeSnapshot {
        /// Owning transaction.
        txid: TxId,
        /// The type whose count is snapshotted.
        tid: Tid,
        /// `number_of_records` before any allocation by this transaction.
        number_of_records: u32,
    },
    /// A record's full byte image before the operation overwrote it.
    RecordImage {
        /// Owning transaction.
        txid: TxId,
        /// The record's type.
        tid: Tid,
        /// The record's OID.
        oid: Oid,
        /// Pre-image bytes, exactly one record long.
        image: Vec<u8>,
    },
    /// The operation completed; its pre-images must not be rolled back.
    Commit {
        /// Owning transaction.
        txid: TxId,
    },
}

impl LogEntry {
    /// The transaction this frame belongs to.
    #[must_use]
    pub fn txid(&self) -> TxId {
        match self {
            Self::Begin { txid }
            | Self::TypeSnapshot { txid, .. }
            | Self::RecordImage { txid, .. }
            | Self::Commit { txid } => *txid,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Self::Begin { txid } => {
                payload.push(TAG_BEGIN);
                payload.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::TypeSnapshot {
                txid,
                tid,
                number_of_records,
            } => {
                payload.push(TAG_SNAPSHOT);
                payload.extend_from_slice(&txid.as_u64().to_le_bytes());
                payload.extend_from_slice(&tid.as_u32().to_le_bytes());
                payload.extend_from_slice(&number_of_records.to_le_bytes());
            }
            Self::RecordImage {
                txid,
                tid,
                oid,
                image,
            } => {
                payload.push(TAG_IMAGE);
                payload.extend_from_slice(&txid.as_u64().to_le_bytes());
                payload.extend_from_slice(&tid.as_u32().to_le_bytes());
                payload.extend_from_slice(&oid.as_u32().to_le_bytes());
                payload.extend_from_slice(&(image.len() as u32).to_le_bytes());
                payload.extend_from_slice(image);
            }
            Self::Commit { txid } => {
                payload.push(TAG_COMMIT);
                payload.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
        }
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    fn decode(payload: &[u8], offset: u64) -> DbResult<Self> {
        let fail = |detail: &str| DbError::log_corrupted(offset, detail.to_string());
        let tag = *payload.first().ok_or_else(|| fail("empty frame"))?;
        let body = &payload[1..];
        let u64_at = |at: usize| -> DbResult<u64> {
            let bytes: [u8; 8] = body
                .get(at..at + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| fail("truncated frame"))?;
            Ok(u64::from_le_bytes(bytes))
        };
        let u32_at = |at: usize| -> DbResult<u32> {
            let bytes: [u8; 4] = body
                .get(at..at + 4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| fail("truncated frame"))?;
            Ok(u32::from_le_bytes(bytes))
        };

        match tag {
            TAG_BEGIN => Ok(Self::Begin {
                txid: TxId::new(u64_at(0)?),
            }),
            TAG_SNAPSHOT => Ok(Self::TypeSnapshot {
                txid: TxId::new(u64_at(0)?),
                tid: Tid::new(u32_at(8)?),
                number_of_records: u32_at(12)?,
            }),
            TAG_IMAGE => {
                let txid = TxId::new(u64_at(0)?);
                let tid = Tid::new(u32_at(8)?);
                let oid = Oid::new(u32_at(12)?);
                let len = u32_at(16)? as usize;
                let image = body
                    .get(20..20 + len)
                    .ok_or_else(|| fail("truncated record image"))?
                    .to_vec();
                Ok(Self::RecordImage {
                    txid,
                    tid,
                    oid,
                    image,
                })
            }
            TAG_COMMIT => Ok(Self::Commit {
                txid: TxId::new(u64_at(0)?),
            }),
            _ => Err(fail("unknown frame tag")),
        }
    }
}

/// The undo-log file.
pub struct UndoLog {
    backend: Box<dyn StorageBackend>,
}

impl UndoLog {
    /// Opens the log, initializing the header on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when an existing file does not carry the log
    /// magic, or storage errors.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> DbResult<Self> {
        if backend.size()? == 0 {
            let mut header = Vec::with_capacity(LOG_HEADER_LEN as usize);
            header.extend_from_slice(&LOG_MAGIC);
            header.extend_from_slice(&LOG_FORMAT.to_le_bytes());
            backend.append(&header)?;
            backend.flush()?;
        } else {
            let header = backend.read_at(0, LOG_HEADER_LEN as usize)?;
            if header[..4] != LOG_MAGIC {
                return Err(DbError::invalid_format("undo log", "bad magic"));
            }
        }
        Ok(Self { backend })
    }

    /// Returns true if the log holds no frames.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.backend.size()? <= LOG_HEADER_LEN)
    }

    /// Appends one frame.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn append(&mut self, entry: &LogEntry) -> DbResult<()> {
        self.backend.append(&entry.encode())?;
        Ok(())
    }

    /// Forces appended frames to durable storage.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn sync(&mut self) -> DbResult<()> {
        self.backend.flush()?;
        Ok(self.backend.sync()?)
    }

    /// Discards every frame, leaving only the header.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn reset(&mut self) -> DbResult<()> {
        self.backend.truncate(LOG_HEADER_LEN)?;
        Ok(self.backend.sync()?)
    }

    /// Parses every intact frame in order.
    ///
    /// Parsing stops silently at a torn tail; a structurally bad frame in
    /// the middle also ends the intact prefix, which is all recovery may
    /// trust.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn read_all(&self) -> DbResult<Vec<LogEntry>> {
        let size = self.backend.size()?;
        let mut entries = Vec::new();
        let mut pos = LOG_HEADER_LEN;
        while pos + 4 <= size {
            let len_bytes = self.backend.read_at(pos, 4)?;
            let len = u64::from(u32::from_le_bytes([
                len_bytes[0],
                len_bytes[1],
                len_bytes[2],
                len_bytes[3],
            ]));
            if pos + 4 + len > size {
                break;
            }
            let payload = self.backend.read_at(pos + 4, len as usize)?;
            match LogEntry::decode(&payload, pos) {
                Ok(entry) => entries.push(entry),
                Err(_) => break,
            }
            pos += 4 + len;
        }
        Ok(entries)
    }

    /// Truncates the log to a byte length (crash-simulation hook for
    /// recovery tests).
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn truncate_to(&mut self, len: u64) -> DbResult<()> {
        Ok(self.backend.truncate(len.max(LOG_HEADER_LEN))?)
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn size(&self) -> DbResult<u64> {
        Ok(self.backend.size()?)
    }
}
