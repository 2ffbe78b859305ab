//! # SiloDB Core
//!
//! Embedded object database engine for SiloDB.
//!
//! This crate provides:
//! - Per-type record files with OID-addressed fixed-length records
//! - A shared payload pool for variable-size field values
//! - Undo logging for crash recovery and transactional rollback
//! - Optimistic concurrency through per-record tick versions
//! - A criteria engine with in-memory field indexes
//! - Fail-closed schema verification and by-name migration
//! - Compaction that renumbers records and reclaims pool space

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod criteria;
pub mod database;
pub mod dir;
pub mod engine;
pub mod error;
pub mod index;
pub mod object;
pub mod query;
pub mod rawpool;
pub mod record_file;
mod refcache;
pub mod transaction;
pub mod txlog;
pub mod types;

pub use catalog::{FieldDesc, TypeDesc};
pub use config::Config;
pub use criteria::{Criteria, CriteriaOp, WhereClause, OID_FIELD};
pub use database::Database;
pub use engine::Engine;
pub use error::{DbError, DbResult};
pub use object::{ObjectGraph, ObjectInfo, ObjectNode, ObjectValue, Persist};
pub use query::{field, lit, path, translate, FilterExpr};
pub use transaction::Transaction;
pub use types::{Oid, Tid, TxId};

pub use silodb_codec::{FieldKind, FieldValue, ObjectRef};
