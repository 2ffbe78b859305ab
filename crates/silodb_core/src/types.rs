//! Core identifier types for SiloDB.

use std::fmt;

/// Object identifier: the 1-based position of a record within its type's
/// file.
///
/// OIDs are dense and never reused; a deleted record's OID stays tombstoned
/// until compaction renumbers the file. `Oid::NONE` (zero) means "no
/// persisted identity yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(pub u32);

impl Oid {
    /// The transient marker: an object that has never been saved.
    pub const NONE: Self = Self(0);

    /// Creates a new OID.
    #[must_use]
    pub const fn new(oid: u32) -> Self {
        Self(oid)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true if this is the transient marker.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

/// Type identifier: the numeric key assigned to a registered type.
///
/// TIDs are process-unique per database handle, assigned on first save of a
/// type, and persisted in the type's file header. Complex-object references
/// are tagged with the target's TID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub u32);

impl Tid {
    /// Creates a new TID.
    #[must_use]
    pub const fn new(tid: u32) -> Self {
        Self(tid)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Identifier for one transaction's entries in the undo log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u64);

impl TxId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_none_marker() {
        assert!(Oid::NONE.is_none());
        assert!(!Oid::new(1).is_none());
    }

    #[test]
    fn oid_ordering() {
        assert!(Oid::new(1) < Oid::new(2));
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", Oid::new(7)), "oid:7");
        assert_eq!(format!("{}", Tid::new(3)), "tid:3");
        assert_eq!(format!("{}", TxId::new(12)), "txn:12");
    }
}
