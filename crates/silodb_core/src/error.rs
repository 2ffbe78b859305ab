//! Error types for the SiloDB core engine.

use crate::types::Oid;
use thiserror::Error;

/// Result alias for core operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by the SiloDB engine.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] silodb_storage::StorageError),

    /// Record or payload codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] silodb_codec::CodecError),

    /// Filesystem failure outside the storage backend.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted schema for a type no longer matches the declared one
    /// and automatic migration was not requested.
    #[error("schema changed for type '{type_name}': {detail}")]
    SchemaChanged {
        /// Name of the affected type.
        type_name: String,
        /// What differs between the stored and declared schemas.
        detail: String,
    },

    /// Optimistic concurrency check failed: the record's stored tick no
    /// longer matches the tick the object was loaded with.
    #[error(
        "optimistic concurrency conflict on '{type_name}' {oid}: \
         stored tick {stored_tick}, object tick {object_tick}"
    )]
    OptimisticConcurrency {
        /// Name of the affected type.
        type_name: String,
        /// OID of the contested record.
        oid: Oid,
        /// Tick currently persisted.
        stored_tick: u64,
        /// Tick the caller's object carries.
        object_tick: u64,
    },

    /// A unique-flagged field already holds the staged value on another
    /// record.
    #[error("unique constraint violated on '{type_name}.{field}'")]
    UniqueConstraint {
        /// Name of the affected type.
        type_name: String,
        /// The unique-flagged field.
        field: String,
    },

    /// A record's bytes could not be decoded.
    #[error("corrupted record at '{type_name}' {oid}: {detail}")]
    RecordCorrupted {
        /// Name of the affected type.
        type_name: String,
        /// OID of the bad record.
        oid: Oid,
        /// Decode failure detail.
        detail: String,
    },

    /// An OID outside `1..=number_of_records` was addressed.
    #[error("invalid {oid} for type '{type_name}' ({count} records)")]
    InvalidOid {
        /// Name of the affected type.
        type_name: String,
        /// The out-of-range OID.
        oid: Oid,
        /// Number of records currently allocated.
        count: u32,
    },

    /// The requested object does not exist (tombstoned or never saved).
    #[error("no live object at '{type_name}' {oid}")]
    NotFound {
        /// Name of the affected type.
        type_name: String,
        /// OID that resolved to nothing.
        oid: Oid,
    },

    /// A type was addressed that has never been registered.
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// A filter expression has no criteria translation.
    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// A criteria clause is malformed (unknown field, bad path, wrong
    /// literal kind).
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Another process holds the database directory's lock file.
    #[error("database at '{0}' is locked by another process")]
    DatabaseLocked(String),

    /// The database directory exists and `error_if_exists` was set.
    #[error("database at '{0}' already exists")]
    AlreadyExists(String),

    /// A file header or log frame failed its structural checks.
    #[error("invalid format in {context}: {detail}")]
    InvalidFormat {
        /// Which file or structure was being read.
        context: String,
        /// What failed.
        detail: String,
    },

    /// The undo log contains a frame that cannot be parsed; recovery stops
    /// at the last intact entry.
    #[error("undo log corrupted at offset {offset}: {detail}")]
    LogCorrupted {
        /// Byte offset of the bad frame.
        offset: u64,
        /// What failed.
        detail: String,
    },

    /// An operation was attempted on a handle that was already closed.
    #[error("database handle is closed")]
    Closed,
}

impl DbError {
    /// Creates a `SchemaChanged` error.
    pub fn schema_changed(type_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaChanged {
            type_name: type_name.into(),
            detail: detail.into(),
        }
    }

    /// Creates a `UniqueConstraint` error.
    pub fn unique_constraint(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UniqueConstraint {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates a `RecordCorrupted` error.
    pub fn record_corrupted(
        type_name: impl Into<String>,
        oid: Oid,
        detail: impl Into<String>,
    ) -> Self {
        Self::RecordCorrupted {
            type_name: type_name.into(),
            oid,
            detail: detail.into(),
        }
    }

    /// Creates an `InvalidFormat` error.
    pub fn invalid_format(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidFormat {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Creates an `UnsupportedPredicate` error.
    pub fn unsupported_predicate(detail: impl Into<String>) -> Self {
        Self::UnsupportedPredicate(detail.into())
    }

    /// Creates an `InvalidCriteria` error.
    pub fn invalid_criteria(detail: impl Into<String>) -> Self {
        Self::InvalidCriteria(detail.into())
    }

    /// Creates a `LogCorrupted` error.
    pub fn log_corrupted(offset: u64, detail: impl Into<String>) -> Self {
        Self::LogCorrupted {
            offset,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = DbError::OptimisticConcurrency {
            type_name: "Person".into(),
            oid: Oid::new(4),
            stored_tick: 3,
            object_tick: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("Person"));
        assert!(msg.contains("oid:4"));
        assert!(msg.contains("stored tick 3"));

        let err = DbError::unique_constraint("Person", "Name");
        assert_eq!(err.to_string(), "unique constraint violated on 'Person.Name'");
    }

    #[test]
    fn storage_errors_convert() {
        let storage = silodb_storage::StorageError::Corrupted("bad".into());
        let err: DbError = storage.into();
        assert!(matches!(err, DbError::Storage(_)));
    }
}
