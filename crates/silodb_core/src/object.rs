//! Dynamic object model.
//!
//! Typed application objects cross into the engine as an [`ObjectGraph`]:
//! an arena of [`ObjectNode`]s whose reference-kinded fields hold arena
//! indices instead of pointers. The arena makes circular object graphs
//! representable with plain owned data; the engine's per-operation
//! reference cache keeps traversal over them terminating.

use crate::catalog::TypeDesc;
use crate::error::{DbError, DbResult};
use crate::types::Oid;
use silodb_codec::FieldValue;

/// One field's value inside an [`ObjectNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    /// A plain value: scalar, text, bytes, list, scalar dict or document.
    Scalar(FieldValue),
    /// A single sub-object: arena index, or `None` for a null reference.
    Sub(Option<usize>),
    /// A list of sub-objects by arena index.
    SubList(Vec<usize>),
    /// A dictionary whose values are sub-objects by arena index.
    SubDict(Vec<(FieldValue, usize)>),
}

impl ObjectValue {
    /// Returns the plain value, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&FieldValue> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// One object staged in the graph: its type, persisted identity (if any)
/// and field values in schema order.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    /// Name of the node's type.
    pub type_name: String,
    /// Persisted identity; `Oid::NONE` for a never-saved object.
    pub oid: Oid,
    /// Tick the object was loaded with, if its schema has a version field.
    pub tick: Option<u64>,
    /// Field values in schema order.
    pub values: Vec<ObjectValue>,
}

impl ObjectNode {
    /// Creates a node for a never-saved object.
    #[must_use]
    pub fn new(type_name: impl Into<String>, values: Vec<ObjectValue>) -> Self {
        Self {
            type_name: type_name.into(),
            oid: Oid::NONE,
            tick: None,
            values,
        }
    }

    /// Creates a node carrying a persisted identity.
    #[must_use]
    pub fn with_identity(
        type_name: impl Into<String>,
        oid: Oid,
        tick: Option<u64>,
        values: Vec<ObjectValue>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            oid,
            tick,
            values,
        }
    }
}

/// Arena of object nodes forming one (possibly cyclic) object graph.
#[derive(Debug, Default, Clone)]
pub struct ObjectGraph {
    nodes: Vec<ObjectNode>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its arena index.
    pub fn add(&mut self, node: ObjectNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A node by arena index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCriteria` when the index is out of range.
    pub fn node(&self, index: usize) -> DbResult<&ObjectNode> {
        self.nodes
            .get(index)
            .ok_or_else(|| DbError::invalid_criteria(format!("graph index {index} out of range")))
    }

    /// Mutable access to a node by arena index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCriteria` when the index is out of range.
    pub fn node_mut(&mut self, index: usize) -> DbResult<&mut ObjectNode> {
        self.nodes
            .get_mut(index)
            .ok_or_else(|| DbError::invalid_criteria(format!("graph index {index} out of range")))
    }

    /// All nodes in arena order.
    #[must_use]
    pub fn nodes(&self) -> &[ObjectNode] {
        &self.nodes
    }
}

/// Conversion between a typed application object and the dynamic graph.
///
/// Implementations declare their schema once and convert in both
/// directions. Sub-objects of the implementing type must themselves
/// implement `Persist` and be staged into the same graph; circular
/// references are expressed by reusing an already-added node's index.
pub trait Persist: Sized {
    /// The type's declared schema. Must be stable across calls.
    fn type_desc() -> TypeDesc;

    /// Schemas of this type and of every sub-object type it can stage.
    /// Override for types with sub-objects so one registration covers the
    /// whole graph.
    fn type_descs() -> Vec<TypeDesc> {
        vec![Self::type_desc()]
    }

    /// Stages this object (and its sub-objects) into `graph`, returning the
    /// root node's arena index.
    fn to_graph(&self, graph: &mut ObjectGraph) -> usize;

    /// Rebuilds a typed object from the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error when the node's values do not fit the type.
    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self>;

    /// The object's persisted OID, `Oid::NONE` before first save.
    fn oid(&self) -> Oid;

    /// Stores the OID assigned by a save.
    fn set_oid(&mut self, oid: Oid);

    /// The tick this object was loaded with, if the schema has a version
    /// field.
    fn tick(&self) -> Option<u64> {
        None
    }

    /// Stores the tick assigned by a save.
    fn set_tick(&mut self, _tick: u64) {}
}

/// A fully staged row: what the saver hands to the codec and the index
/// manager once every sub-object in the node has a persisted identity.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// The row's OID.
    pub oid: Oid,
    /// The tick written with this row, if the schema has a version field.
    pub tick: Option<u64>,
    /// Field values in schema order, references resolved to `FieldValue`.
    pub values: Vec<FieldValue>,
}
