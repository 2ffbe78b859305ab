//! Client-side transaction buffers.
//!
//! A transaction stages operations without touching the engine; nothing it
//! holds is visible to reads until commit. Commit applies every staged
//! operation under a single undo-log scope, so a crash mid-commit rolls
//! the whole batch back on the next open. Rolling back is simply dropping
//! the buffer.

use crate::object::ObjectGraph;
use crate::types::{Oid, TxId};
use silodb_codec::FieldValue;

/// One staged operation.
#[derive(Debug)]
pub(crate) enum StagedOp {
    /// A full object-graph save.
    Save {
        /// The staged graph.
        graph: ObjectGraph,
        /// Root node index within the graph.
        root: usize,
    },
    /// A tombstone delete.
    Delete {
        /// The record's type.
        type_name: String,
        /// The record's OID.
        oid: Oid,
        /// Tick the caller loaded the object with, for the commit-time
        /// concurrency check.
        expected_tick: Option<u64>,
    },
    /// A narrow field overwrite.
    SavePartial {
        /// The record's type.
        type_name: String,
        /// The record's OID.
        oid: Oid,
        /// Field name / staged value pairs.
        fields: Vec<(String, FieldValue)>,
    },
}

/// A buffer of operations applied atomically at commit.
#[derive(Debug)]
pub struct Transaction {
    id: TxId,
    ops: Vec<StagedOp>,
}

impl Transaction {
    pub(crate) fn new(id: TxId) -> Self {
        Self {
            id,
            ops: Vec::new(),
        }
    }

    /// The transaction's identifier.
    #[must_use]
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Stages a graph save.
    pub fn stage_save(&mut self, graph: ObjectGraph, root: usize) {
        self.ops.push(StagedOp::Save { graph, root });
    }

    /// Stages a delete.
    pub fn stage_delete(
        &mut self,
        type_name: impl Into<String>,
        oid: Oid,
        expected_tick: Option<u64>,
    ) {
        self.ops.push(StagedOp::Delete {
            type_name: type_name.into(),
            oid,
            expected_tick,
        });
    }

    /// Stages a partial save.
    pub fn stage_save_partial(
        &mut self,
        type_name: impl Into<String>,
        oid: Oid,
        fields: Vec<(String, FieldValue)>,
    ) {
        self.ops.push(StagedOp::SavePartial {
            type_name: type_name.into(),
            oid,
            fields,
        });
    }

    pub(crate) fn into_ops(self) -> Vec<StagedOp> {
        self.ops
    }
}
