//! The storage engine.
//!
//! The engine owns every mutable structure of one open database: the type
//! catalog and its record files, the shared raw pool, the undo log and the
//! in-memory indexes. It is single-threaded by construction; the
//! [`Database`](crate::Database) facade serializes access through one lock.
//!
//! Every mutating operation follows the same discipline: append pre-images
//! to the undo log, sync, apply to the data files, write a commit frame,
//! reset the log. A crash at any point leaves either a committed state or
//! a log whose uncommitted pre-images recovery rolls back on next open.

mod loader;
mod resolve;
mod saver;
mod shrink;

use crate::catalog::{migration, TypeDesc, TypeInfo, TypeKind};
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{DbError, DbResult};
use crate::index::IndexManager;
use crate::rawpool::SharedPool;
use crate::record_file::RecordFile;
use crate::transaction::{StagedOp, Transaction};
use crate::txlog::{LogEntry, UndoLog};
use crate::types::{Oid, Tid, TxId};
use silodb_codec::{decode_record, FieldValue};
use silodb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

pub use crate::criteria::matches::RefResolver;

/// Where an engine keeps its bytes.
enum Location {
    Disk(DatabaseDir),
    Memory,
}

/// One open database.
pub struct Engine {
    pub(crate) config: Config,
    location: Location,
    pub(crate) by_name: HashMap<String, Tid>,
    pub(crate) files: HashMap<Tid, RecordFile>,
    pub(crate) pool: SharedPool,
    pub(crate) log: UndoLog,
    pub(crate) indexes: IndexManager,
    next_tid: u32,
    next_txid: u64,
}

impl Engine {
    /// Opens (and optionally creates) an on-disk database, running crash
    /// recovery and rebuilding indexes.
    ///
    /// # Errors
    ///
    /// Returns locking, format and storage errors.
    pub fn open(path: impl AsRef<Path>, config: Config) -> DbResult<Self> {
        let config = config.normalized();
        let dir = DatabaseDir::open(path, &config)?;
        let pool = SharedPool::open(Box::new(FileBackend::open(&dir.pool_file())?))?;
        let log = UndoLog::open(Box::new(FileBackend::open(&dir.log_file())?))?;
        let type_paths = dir.list_type_files()?;

        let mut engine = Self {
            config,
            location: Location::Disk(dir),
            by_name: HashMap::new(),
            files: HashMap::new(),
            pool,
            log,
            indexes: IndexManager::new(),
            next_tid: 1,
            next_txid: 1,
        };

        for path in type_paths {
            let file = RecordFile::open(Box::new(FileBackend::open(&path)?))?;
            let info = file.info();
            tracing::debug!(
                type_name = info.type_name(),
                tid = info.tid().as_u32(),
                records = info.number_of_records(),
                "opened type file"
            );
            engine.next_tid = engine.next_tid.max(info.tid().as_u32() + 1);
            engine.by_name.insert(info.type_name().to_string(), info.tid());
            engine.indexes.register_type(info);
            engine.files.insert(info.tid(), file);
        }

        engine.recover()?;
        engine.rebuild_all_indexes()?;
        Ok(engine)
    }

    /// Opens an ephemeral in-memory database.
    ///
    /// # Errors
    ///
    /// Returns storage errors (none occur with memory backends in practice).
    pub fn in_memory(config: Config) -> DbResult<Self> {
        Ok(Self {
            config: config.normalized(),
            location: Location::Memory,
            by_name: HashMap::new(),
            files: HashMap::new(),
            pool: SharedPool::open(Box::new(InMemoryBackend::new()))?,
            log: UndoLog::open(Box::new(InMemoryBackend::new()))?,
            indexes: IndexManager::new(),
            next_tid: 1,
            next_txid: 1,
        })
    }

    // -----------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------

    /// Registers a type, or verifies an already-registered one.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` when the persisted schema no longer matches
    /// the declared one; the type is marked stale and every operation on it
    /// fails until [`Self::migrate_type`] runs.
    pub fn register_type(&mut self, desc: &TypeDesc) -> DbResult<Tid> {
        if let Some(&tid) = self.by_name.get(&desc.name) {
            let file = self
                .files
                .get_mut(&tid)
                .ok_or_else(|| DbError::UnknownType(desc.name.clone()))?;
            if let Some(diff) = file.info().schema_diff(desc) {
                file.info_mut().set_schema_stale(true);
                return Err(DbError::schema_changed(&desc.name, diff));
            }
            file.info_mut().set_schema_stale(false);
            return Ok(tid);
        }

        let tid = Tid::new(self.next_tid);
        let info = TypeInfo::from_desc(desc, tid, TypeKind::User)?;
        let backend = self.create_type_backend(&desc.name)?;
        let file = RecordFile::create(backend, info)?;
        tracing::info!(type_name = %desc.name, tid = tid.as_u32(), "registered type");

        self.next_tid += 1;
        self.by_name.insert(desc.name.clone(), tid);
        self.indexes.register_type(file.info());
        self.files.insert(tid, file);
        Ok(tid)
    }

    /// Rewrites a stale type's file under a new schema.
    ///
    /// Fields are matched by name; surviving values convert, added fields
    /// come out null, removed fields are dropped. OIDs, tombstones and the
    /// allocation high-water mark are preserved.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for an unregistered type, and storage or codec
    /// errors from the rewrite.
    pub fn migrate_type(&mut self, desc: &TypeDesc) -> DbResult<()> {
        let tid = self.tid_of(&desc.name)?;
        let old_info = self
            .files
            .get(&tid)
            .ok_or_else(|| DbError::UnknownType(desc.name.clone()))?
            .info()
            .clone();
        let mut new_info = TypeInfo::from_desc(desc, tid, old_info.kind())?;
        let mapping = migration::field_mapping(&old_info, &new_info);

        let rewrite_backend = self.create_rewrite_backend(&desc.name)?;
        new_info.set_number_of_records(old_info.number_of_records());
        let mut rewrite = RecordFile::create(rewrite_backend, new_info.clone())?;
        rewrite.persist_count()?;

        for raw_oid in 1..=old_info.number_of_records() {
            let oid = Oid::new(raw_oid);
            let (live, old_values) = {
                let file = self
                    .files
                    .get(&tid)
                    .ok_or_else(|| DbError::UnknownType(desc.name.clone()))?;
                let image = file.read_record(oid)?;
                if silodb_codec::is_tombstoned(image[0]) {
                    (false, Vec::new())
                } else {
                    (true, decode_record(old_info.layout(), &image, &self.pool)?)
                }
            };
            let new_values = if live {
                migration::convert_record(&old_info, &new_info, &mapping, &old_values)
            } else {
                vec![FieldValue::Null; new_info.fields().len()]
            };
            let image = silodb_codec::encode_record(
                new_info.layout(),
                &new_values,
                &mut self.pool,
            )?;
            rewrite.write_record(oid, &image)?;
            if !live {
                rewrite.mark_tombstoned(oid)?;
            }
        }
        rewrite.flush()?;
        rewrite.sync()?;

        self.swap_type_file(&desc.name, tid, rewrite)?;
        self.indexes.clear_type(tid);
        if let Some(file) = self.files.get(&tid) {
            self.indexes.register_type(file.info());
        }
        self.rebuild_type_index(tid)?;
        tracing::info!(type_name = %desc.name, "migrated type");
        Ok(())
    }

    /// The TID of a registered type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` when the type has never been registered.
    pub fn tid_of(&self, type_name: &str) -> DbResult<Tid> {
        self.by_name
            .get(type_name)
            .copied()
            .ok_or_else(|| DbError::UnknownType(type_name.to_string()))
    }

    /// Metadata of a registered type.
    #[must_use]
    pub fn type_info(&self, type_name: &str) -> Option<&TypeInfo> {
        let tid = self.by_name.get(type_name)?;
        self.files.get(tid).map(RecordFile::info)
    }

    /// Number of live (non-tombstoned) records of a type. Zero for a type
    /// that was never registered.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn count_live(&self, type_name: &str) -> DbResult<u32> {
        let Some(&tid) = self.by_name.get(type_name) else {
            return Ok(0);
        };
        let file = self
            .files
            .get(&tid)
            .ok_or_else(|| DbError::UnknownType(type_name.to_string()))?;
        let mut live = 0;
        for oid in 1..=file.info().number_of_records() {
            if file.is_live(Oid::new(oid))? {
                live += 1;
            }
        }
        Ok(live)
    }

    pub(crate) fn file(&self, tid: Tid) -> DbResult<&RecordFile> {
        self.files
            .get(&tid)
            .ok_or_else(|| DbError::UnknownType(format!("{tid}")))
    }

    pub(crate) fn file_mut(&mut self, tid: Tid) -> DbResult<&mut RecordFile> {
        self.files
            .get_mut(&tid)
            .ok_or_else(|| DbError::UnknownType(format!("{tid}")))
    }

    pub(crate) fn ensure_not_stale(&self, tid: Tid) -> DbResult<()> {
        let file = self.file(tid)?;
        if file.info().is_schema_stale() {
            return Err(DbError::schema_changed(
                file.info().type_name(),
                "type is stale; migrate before using it",
            ));
        }
        Ok(())
    }

    fn create_type_backend(&self, type_name: &str) -> DbResult<Box<dyn StorageBackend>> {
        match &self.location {
            Location::Disk(dir) => Ok(Box::new(FileBackend::open_with_create_dirs(
                &dir.type_file(type_name),
            )?)),
            Location::Memory => Ok(Box::new(InMemoryBackend::new())),
        }
    }

    pub(crate) fn create_rewrite_backend(
        &self,
        type_name: &str,
    ) -> DbResult<Box<dyn StorageBackend>> {
        match &self.location {
            Location::Disk(dir) => {
                let path = dir.type_file_rewrite(type_name);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(Box::new(FileBackend::open(&path)?))
            }
            Location::Memory => Ok(Box::new(InMemoryBackend::new())),
        }
    }

    pub(crate) fn create_pool_rewrite_backend(&self) -> DbResult<Box<dyn StorageBackend>> {
        match &self.location {
            Location::Disk(dir) => {
                let path = dir.pool_file_rewrite();
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(Box::new(FileBackend::open(&path)?))
            }
            Location::Memory => Ok(Box::new(InMemoryBackend::new())),
        }
    }

    /// Installs a finished rewrite file as a type's live file. On disk this
    /// renames over the original and reopens.
    pub(crate) fn swap_type_file(
        &mut self,
        type_name: &str,
        tid: Tid,
        rewrite: RecordFile,
    ) -> DbResult<()> {
        let (backend, info) = rewrite.into_parts();
        match &self.location {
            Location::Disk(dir) => {
                drop(backend);
                std::fs::rename(dir.type_file_rewrite(type_name), dir.type_file(type_name))?;
                let reopened = Box::new(FileBackend::open(&dir.type_file(type_name))?);
                self.file_mut(tid)?.replace(reopened, info);
            }
            Location::Memory => {
                self.file_mut(tid)?.replace(backend, info);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Operation lifecycle
    // -----------------------------------------------------------------

    pub(crate) fn begin_op(&mut self) -> DbResult<TxId> {
        let txid = TxId::new(self.next_txid);
        self.next_txid += 1;
        self.log.append(&LogEntry::Begin { txid })?;
        Ok(txid)
    }

    pub(crate) fn finish_op(&mut self, txid: TxId, touched: &BTreeSet<Tid>) -> DbResult<()> {
        if self.config.sync_on_commit {
            self.pool.sync()?;
            for tid in touched {
                if let Some(file) = self.files.get_mut(tid) {
                    file.flush()?;
                    file.sync()?;
                }
            }
        }
        self.log.append(&LogEntry::Commit { txid })?;
        if self.config.sync_on_commit {
            self.log.sync()?;
        }
        self.log.reset()
    }

    pub(crate) fn abort_op(&mut self) -> DbResult<()> {
        let entries = self.log.read_all()?;
        self.rollback_uncommitted(&entries)?;
        self.log.reset()
    }

    /// Rolls uncommitted pre-images back into the data files, newest first,
    /// then rebuilds the indexes of every touched type.
    fn rollback_uncommitted(&mut self, entries: &[LogEntry]) -> DbResult<()> {
        let committed: HashSet<TxId> = entries
            .iter()
            .filter_map(|e| match e {
                LogEntry::Commit { txid } => Some(*txid),
                _ => None,
            })
            .collect();

        let mut touched = BTreeSet::new();
        for entry in entries.iter().rev() {
            if committed.contains(&entry.txid()) {
                continue;
            }
            match entry {
                LogEntry::RecordImage {
                    tid, oid, image, ..
                } => {
                    if let Some(file) = self.files.get_mut(tid) {
                        file.write_record(*oid, image)?;
                        touched.insert(*tid);
                    }
                }
                LogEntry::TypeSnapshot {
                    tid,
                    number_of_records,
                    ..
                } => {
                    if let Some(file) = self.files.get_mut(tid) {
                        file.info_mut().set_number_of_records(*number_of_records);
                        file.persist_count()?;
                        touched.insert(*tid);
                    }
                }
                LogEntry::Begin { .. } | LogEntry::Commit { .. } => {}
            }
        }

        for tid in &touched {
            if let Some(file) = self.files.get_mut(tid) {
                file.flush()?;
                file.sync()?;
            }
            self.rebuild_type_index(*tid)?;
        }
        Ok(())
    }

    fn recover(&mut self) -> DbResult<()> {
        if self.log.is_empty()? {
            return Ok(());
        }
        let entries = self.log.read_all()?;
        tracing::info!(frames = entries.len(), "undo log present, recovering");
        self.rollback_uncommitted(&entries)?;
        self.log.reset()?;
        tracing::info!("recovery complete");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Indexes
    // -----------------------------------------------------------------

    pub(crate) fn rebuild_all_indexes(&mut self) -> DbResult<()> {
        let tids: Vec<Tid> = self.files.keys().copied().collect();
        for tid in tids {
            self.rebuild_type_index(tid)?;
        }
        Ok(())
    }

    pub(crate) fn rebuild_type_index(&mut self, tid: Tid) -> DbResult<()> {
        let Some(file) = self.files.get(&tid) else {
            return Ok(());
        };
        let info = file.info().clone();
        self.indexes.clear_type(tid);
        self.indexes.register_type(&info);
        if !info.fields().iter().any(|f| f.indexed) {
            return Ok(());
        }
        for raw_oid in 1..=info.number_of_records() {
            let oid = Oid::new(raw_oid);
            let file = self.file(tid)?;
            if !file.is_live(oid)? {
                continue;
            }
            let image = file.read_record(oid)?;
            let values = decode_record(info.layout(), &image, &self.pool)?;
            self.indexes.apply_write(&info, oid, None, &values);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Starts a client-side transaction buffer.
    #[must_use]
    pub fn begin_transaction(&mut self) -> Transaction {
        let id = TxId::new(self.next_txid);
        self.next_txid += 1;
        Transaction::new(id)
    }

    /// Applies every staged operation of a transaction under one undo-log
    /// commit scope: a crash mid-commit rolls all of them back together.
    ///
    /// Returns the root OIDs assigned to staged saves, in staging order.
    ///
    /// # Errors
    ///
    /// On any failure the already-applied operations of this transaction
    /// are rolled back before the error returns.
    pub fn commit_transaction(&mut self, tx: Transaction) -> DbResult<Vec<Oid>> {
        let txid = self.begin_op()?;
        let mut touched = BTreeSet::new();
        let mut deferred = Vec::new();
        let mut roots = Vec::new();

        let result = (|| -> DbResult<()> {
            for op in tx.into_ops() {
                match op {
                    StagedOp::Save { mut graph, root } => {
                        let oid = saver::save_root_in(
                            self,
                            txid,
                            &mut graph,
                            root,
                            &mut touched,
                            &mut deferred,
                        )?;
                        roots.push(oid);
                    }
                    StagedOp::Delete {
                        type_name,
                        oid,
                        expected_tick,
                    } => {
                        saver::delete_in(
                            self,
                            txid,
                            &type_name,
                            oid,
                            expected_tick,
                            &mut touched,
                            &mut deferred,
                        )?;
                    }
                    StagedOp::SavePartial {
                        type_name,
                        oid,
                        fields,
                    } => {
                        saver::save_partial_in(
                            self,
                            txid,
                            &type_name,
                            oid,
                            &fields,
                            &mut touched,
                            &mut deferred,
                        )?;
                    }
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.finish_op(txid, &touched)?;
                self.free_deferred(deferred)?;
                Ok(roots)
            }
            Err(e) => {
                self.abort_op()?;
                Err(e)
            }
        }
    }

    /// Frees pool payloads superseded by a committed operation. Deferred
    /// until after commit so an abort can still restore the pre-images
    /// that reference them.
    fn free_deferred(&mut self, deferred: Vec<silodb_codec::RawRef>) -> DbResult<()> {
        for raw in deferred {
            silodb_codec::RawPool::free(&mut self.pool, raw)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // One-shot operations
    // -----------------------------------------------------------------

    /// Saves an object graph, inserting or updating each node by its OID.
    /// Returns the root's OID and writes assigned OIDs and ticks back into
    /// the graph's nodes.
    ///
    /// # Errors
    ///
    /// Returns concurrency, unique-constraint, schema and storage errors;
    /// partial effects are rolled back first.
    pub fn save_root(&mut self, graph: &mut crate::ObjectGraph, root: usize) -> DbResult<Oid> {
        let txid = self.begin_op()?;
        let mut touched = BTreeSet::new();
        let mut deferred = Vec::new();
        match saver::save_root_in(self, txid, graph, root, &mut touched, &mut deferred) {
            Ok(oid) => {
                self.finish_op(txid, &touched)?;
                self.free_deferred(deferred)?;
                Ok(oid)
            }
            Err(e) => {
                self.abort_op()?;
                Err(e)
            }
        }
    }

    /// Tombstones one record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a dead or unallocated OID, concurrency errors
    /// when `expected_tick` does not match, and storage errors.
    pub fn delete(
        &mut self,
        type_name: &str,
        oid: Oid,
        expected_tick: Option<u64>,
    ) -> DbResult<()> {
        let txid = self.begin_op()?;
        let mut touched = BTreeSet::new();
        let mut deferred = Vec::new();
        match saver::delete_in(self, txid, type_name, oid, expected_tick, &mut touched, &mut deferred)
        {
            Ok(()) => {
                self.finish_op(txid, &touched)?;
                self.free_deferred(deferred)
            }
            Err(e) => {
                self.abort_op()?;
                Err(e)
            }
        }
    }

    /// Overwrites the named fields of one live record without re-encoding
    /// the rest of it. A dot-path like `"Home.City"` follows the stored
    /// reference and writes the sub-record it points at. Partial saves
    /// bypass the tick check and do not bump the tick.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a dead record, unique-constraint errors, and
    /// storage errors.
    pub fn save_partial(
        &mut self,
        type_name: &str,
        oid: Oid,
        fields: &[(String, FieldValue)],
    ) -> DbResult<()> {
        let txid = self.begin_op()?;
        let mut touched = BTreeSet::new();
        let mut deferred = Vec::new();
        match saver::save_partial_in(self, txid, type_name, oid, fields, &mut touched, &mut deferred)
        {
            Ok(()) => {
                self.finish_op(txid, &touched)?;
                self.free_deferred(deferred)
            }
            Err(e) => {
                self.abort_op()?;
                Err(e)
            }
        }
    }
}

impl RefResolver for Engine {
    fn resolve_ref(
        &self,
        r: silodb_codec::ObjectRef,
    ) -> DbResult<Option<Vec<(String, FieldValue)>>> {
        if r.is_null() {
            return Ok(None);
        }
        let tid = Tid::new(r.tid);
        let Some(file) = self.files.get(&tid) else {
            return Ok(None);
        };
        let oid = Oid::new(r.oid);
        if !file.is_live(oid)? {
            return Ok(None);
        }
        let image = file.read_record(oid)?;
        let values = decode_record(file.info().layout(), &image, &self.pool)?;
        Ok(Some(
            file.info()
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .zip(values)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDesc;
    use crate::object::{ObjectGraph, ObjectNode, ObjectValue};
    use silodb_codec::FieldKind;

    fn person_desc() -> TypeDesc {
        TypeDesc::new(
            "Person",
            vec![
                FieldDesc::new("Name", FieldKind::Text).unique().indexed(),
                FieldDesc::new("Age", FieldKind::Int).indexed(),
                FieldDesc::new("TickCount", FieldKind::UInt).version(),
            ],
        )
    }

    fn person_graph(name: &str, age: i64) -> (ObjectGraph, usize) {
        let mut graph = ObjectGraph::new();
        let root = graph.add(ObjectNode::new(
            "Person",
            vec![
                ObjectValue::Scalar(name.into()),
                ObjectValue::Scalar(age.into()),
                ObjectValue::Scalar(FieldValue::Null),
            ],
        ));
        (graph, root)
    }

    fn person_update_graph(oid: Oid, tick: u64, name: &str, age: i64) -> (ObjectGraph, usize) {
        let mut graph = ObjectGraph::new();
        let root = graph.add(ObjectNode::with_identity(
            "Person",
            oid,
            Some(tick),
            vec![
                ObjectValue::Scalar(name.into()),
                ObjectValue::Scalar(age.into()),
                ObjectValue::Scalar(FieldValue::UInt(tick)),
            ],
        ));
        (graph, root)
    }

    fn age_of(engine: &mut Engine, oid: Oid) -> i64 {
        let (graph, root) = engine.load_graph("Person", oid).unwrap().unwrap();
        graph.node(root).unwrap().values[1]
            .as_scalar()
            .and_then(FieldValue::as_int)
            .unwrap()
    }

    #[test]
    fn log_is_reset_after_every_operation() {
        let mut engine = Engine::in_memory(Config::default()).unwrap();
        engine.register_type(&person_desc()).unwrap();
        let (mut graph, root) = person_graph("Ada", 36);
        engine.save_root(&mut graph, root).unwrap();
        assert!(engine.log.is_empty().unwrap());
    }

    #[test]
    fn crash_before_commit_rolls_an_insert_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut engine = Engine::open(&path, Config::default()).unwrap();
            engine.register_type(&person_desc()).unwrap();
            let (mut graph, root) = person_graph("Ada", 36);
            engine.save_root(&mut graph, root).unwrap();

            // apply a second insert but never write its commit frame
            let txid = engine.begin_op().unwrap();
            let mut touched = BTreeSet::new();
            let mut deferred = Vec::new();
            let (mut graph, root) = person_graph("Bob", 41);
            saver::save_root_in(&mut engine, txid, &mut graph, root, &mut touched, &mut deferred)
                .unwrap();
            let tid = engine.tid_of("Person").unwrap();
            assert_eq!(engine.file(tid).unwrap().info().number_of_records(), 2);
            // engine drops here without finish_op: the crash
        }

        let mut engine = Engine::open(&path, Config::default()).unwrap();
        let tid = engine.tid_of("Person").unwrap();
        assert_eq!(engine.file(tid).unwrap().info().number_of_records(), 1);
        assert_eq!(engine.count_live("Person").unwrap(), 1);
        assert_eq!(age_of(&mut engine, Oid::new(1)), 36);
        assert!(engine.log.is_empty().unwrap());
    }

    #[test]
    fn crash_before_commit_rolls_an_update_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let oid;
        {
            let mut engine = Engine::open(&path, Config::default()).unwrap();
            engine.register_type(&person_desc()).unwrap();
            let (mut graph, root) = person_graph("Ada", 36);
            oid = engine.save_root(&mut graph, root).unwrap();

            let txid = engine.begin_op().unwrap();
            let mut touched = BTreeSet::new();
            let mut deferred = Vec::new();
            let (mut graph, root) = person_update_graph(oid, 1, "Ada", 99);
            saver::save_root_in(&mut engine, txid, &mut graph, root, &mut touched, &mut deferred)
                .unwrap();
            assert_eq!(age_of(&mut engine, oid), 99);
        }

        let mut engine = Engine::open(&path, Config::default()).unwrap();
        assert_eq!(age_of(&mut engine, oid), 36);
        // the pre-crash tick still matches, so the caller's copy can save
        let (mut graph, root) = person_update_graph(oid, 1, "Ada", 40);
        engine.save_root(&mut graph, root).unwrap();
        assert_eq!(age_of(&mut engine, oid), 40);
    }

    #[test]
    fn crash_before_commit_rolls_a_delete_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let oid;
        {
            let mut engine = Engine::open(&path, Config::default()).unwrap();
            engine.register_type(&person_desc()).unwrap();
            let (mut graph, root) = person_graph("Ada", 36);
            oid = engine.save_root(&mut graph, root).unwrap();

            let txid = engine.begin_op().unwrap();
            let mut touched = BTreeSet::new();
            let mut deferred = Vec::new();
            saver::delete_in(
                &mut engine,
                txid,
                "Person",
                oid,
                None,
                &mut touched,
                &mut deferred,
            )
            .unwrap();
            let tid = engine.tid_of("Person").unwrap();
            assert!(!engine.file(tid).unwrap().is_live(oid).unwrap());
        }

        let engine = Engine::open(&path, Config::default()).unwrap();
        let tid = engine.tid_of("Person").unwrap();
        assert!(engine.file(tid).unwrap().is_live(oid).unwrap());
    }

    #[test]
    fn torn_commit_frame_rolls_the_operation_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut engine = Engine::open(&path, Config::default()).unwrap();
            engine.register_type(&person_desc()).unwrap();
            let (mut graph, root) = person_graph("Ada", 36);
            engine.save_root(&mut graph, root).unwrap();

            // replay the commit sequence by hand, then tear its tail off
            let txid = engine.begin_op().unwrap();
            let mut touched = BTreeSet::new();
            let mut deferred = Vec::new();
            let (mut graph, root) = person_graph("Bob", 41);
            saver::save_root_in(&mut engine, txid, &mut graph, root, &mut touched, &mut deferred)
                .unwrap();
            engine.log.append(&LogEntry::Commit { txid }).unwrap();
            engine.log.sync().unwrap();
            let size = engine.log.size().unwrap();
            engine.log.truncate_to(size - 3).unwrap();
        }

        let engine = Engine::open(&path, Config::default()).unwrap();
        assert_eq!(engine.count_live("Person").unwrap(), 1);
    }

    #[test]
    fn failed_save_leaves_no_partial_graph() {
        let mut engine = Engine::in_memory(Config::default()).unwrap();
        engine.register_type(&person_desc()).unwrap();
        let (mut graph, root) = person_graph("Ada", 36);
        engine.save_root(&mut graph, root).unwrap();

        // a graph whose second node violates the unique name
        let mut graph = ObjectGraph::new();
        let ok = graph.add(ObjectNode::new(
            "Person",
            vec![
                ObjectValue::Scalar("Bob".into()),
                ObjectValue::Scalar(41i64.into()),
                ObjectValue::Scalar(FieldValue::Null),
            ],
        ));
        let _dup = graph.add(ObjectNode::new(
            "Person",
            vec![
                ObjectValue::Scalar("Ada".into()),
                ObjectValue::Scalar(99i64.into()),
                ObjectValue::Scalar(FieldValue::Null),
            ],
        ));
        // both nodes go through one transaction so the duplicate fails
        // after the first insert has already been applied
        let mut tx = engine.begin_transaction();
        tx.stage_save(graph.clone(), ok);
        tx.stage_save(graph, 1);
        let err = engine.commit_transaction(tx).unwrap_err();
        assert!(matches!(err, DbError::UniqueConstraint { .. }));

        assert_eq!(engine.count_live("Person").unwrap(), 1);
        assert!(engine.log.is_empty().unwrap());
        let hits = engine
            .resolve(&crate::criteria::Criteria::Where(
                crate::criteria::WhereClause::new(
                    "Person",
                    "Name",
                    crate::criteria::CriteriaOp::Equal,
                    FieldValue::Text("Bob".into()),
                ),
            ))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn recovery_rebuilds_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut engine = Engine::open(&path, Config::default()).unwrap();
            engine.register_type(&person_desc()).unwrap();
            let (mut graph, root) = person_graph("Ada", 36);
            engine.save_root(&mut graph, root).unwrap();

            let txid = engine.begin_op().unwrap();
            let mut touched = BTreeSet::new();
            let mut deferred = Vec::new();
            let (mut graph, root) = person_graph("Bob", 41);
            saver::save_root_in(&mut engine, txid, &mut graph, root, &mut touched, &mut deferred)
                .unwrap();
        }

        let engine = Engine::open(&path, Config::default()).unwrap();
        // the rolled-back insert must not linger in the age index
        let hits = engine
            .resolve(&crate::criteria::Criteria::Where(
                crate::criteria::WhereClause::new(
                    "Person",
                    "Age",
                    crate::criteria::CriteriaOp::Equal,
                    FieldValue::Int(41),
                ),
            ))
            .unwrap();
        assert!(hits.is_empty());
    }
}
