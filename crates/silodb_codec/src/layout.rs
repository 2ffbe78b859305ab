//! Fixed-length record layout.
//!
//! A record is one status byte followed by fixed-width field slots in schema
//! order. The layout is a pure function of the ordered field kinds, so two
//! processes that agree on the schema agree on every byte offset.

use crate::value::FieldKind;

/// Bit within the status byte marking a logically deleted record.
pub const TOMBSTONE_BIT: u8 = 0b0000_0001;

/// Status byte value of a freshly written live record.
pub const STATUS_LIVE: u8 = 0;

/// Returns true if a status byte marks a tombstoned record.
#[must_use]
pub const fn is_tombstoned(status: u8) -> bool {
    status & TOMBSTONE_BIT != 0
}

/// One field's position within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    /// The field's declared kind.
    pub kind: FieldKind,
    /// Byte offset of the slot from the start of the record.
    pub offset: usize,
}

impl FieldSlot {
    /// Inline width of this slot in bytes.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.kind.inline_width()
    }
}

/// The byte layout of a type's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    slots: Vec<FieldSlot>,
    record_length: usize,
}

impl RecordLayout {
    /// Computes the layout for an ordered list of field kinds.
    #[must_use]
    pub fn new(kinds: &[FieldKind]) -> Self {
        let mut slots = Vec::with_capacity(kinds.len());
        let mut offset = 1; // status byte
        for &kind in kinds {
            slots.push(FieldSlot { kind, offset });
            offset += kind.inline_width();
        }
        Self {
            slots,
            record_length: offset,
        }
    }

    /// Total record length in bytes, status byte included.
    #[must_use]
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Number of field slots.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slot for field index `i`, if in range.
    #[must_use]
    pub fn slot(&self, i: usize) -> Option<FieldSlot> {
        self.slots.get(i).copied()
    }

    /// All slots in schema order.
    #[must_use]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layout_is_just_the_status_byte() {
        let layout = RecordLayout::new(&[]);
        assert_eq!(layout.record_length(), 1);
        assert_eq!(layout.field_count(), 0);
    }

    #[test]
    fn offsets_are_cumulative() {
        let layout = RecordLayout::new(&[FieldKind::Bool, FieldKind::Int, FieldKind::Text]);

        assert_eq!(layout.slot(0).unwrap().offset, 1);
        assert_eq!(layout.slot(1).unwrap().offset, 3);
        assert_eq!(layout.slot(2).unwrap().offset, 12);
        assert_eq!(layout.record_length(), 1 + 2 + 9 + 13);
    }

    #[test]
    fn slot_out_of_range() {
        let layout = RecordLayout::new(&[FieldKind::Int]);
        assert!(layout.slot(1).is_none());
    }

    #[test]
    fn tombstone_bit() {
        assert!(!is_tombstoned(STATUS_LIVE));
        assert!(is_tombstoned(TOMBSTONE_BIT));
        assert!(is_tombstoned(TOMBSTONE_BIT | 0b10));
    }
}
