//! The public database handle.
//!
//! [`Database`] is a thread-safe facade over the single-threaded engine:
//! one `parking_lot` mutex serializes every operation. Typed objects cross
//! the boundary through their [`Persist`] implementation; schemas are
//! verified on every operation, so a type whose declaration drifted from
//! its stored schema fails with `SchemaChanged` until [`Database::migrate`]
//! runs.

use crate::config::Config;
use crate::criteria::Criteria;
use crate::engine::Engine;
use crate::error::{DbError, DbResult};
use crate::object::{ObjectGraph, Persist};
use crate::query::{translate, FilterExpr};
use crate::transaction::Transaction;
use crate::types::Oid;
use parking_lot::Mutex;
use silodb_codec::FieldValue;
use std::path::Path;

/// An open object database.
pub struct Database {
    inner: Mutex<Option<Engine>>,
}

impl Database {
    /// Opens (and optionally creates) a database directory, running crash
    /// recovery first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` when another process holds the directory,
    /// `AlreadyExists` under [`Config::error_if_exists`], and storage or
    /// format errors.
    pub fn open(path: impl AsRef<Path>, config: Config) -> DbResult<Self> {
        Ok(Self {
            inner: Mutex::new(Some(Engine::open(path, config)?)),
        })
    }

    /// Opens an ephemeral in-memory database.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn open_in_memory(config: Config) -> DbResult<Self> {
        Ok(Self {
            inner: Mutex::new(Some(Engine::in_memory(config)?)),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Engine) -> DbResult<R>) -> DbResult<R> {
        let mut guard = self.inner.lock();
        let engine = guard.as_mut().ok_or(DbError::Closed)?;
        f(engine)
    }

    fn register_in<T: Persist>(engine: &mut Engine) -> DbResult<()> {
        for desc in T::type_descs() {
            engine.register_type(&desc)?;
        }
        Ok(())
    }

    /// Registers a type's schema (and its sub-object schemas) up front.
    ///
    /// Registration also happens implicitly on first use; calling it
    /// explicitly surfaces `SchemaChanged` at startup instead of mid-run.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` when the declared schema no longer matches
    /// the stored one.
    pub fn register<T: Persist>(&self) -> DbResult<()> {
        self.with(|engine| Self::register_in::<T>(engine))
    }

    /// Saves one object and everything it references, inserting or
    /// updating each by its OID. The object's OID and tick are written
    /// back on success.
    ///
    /// # Errors
    ///
    /// Returns `OptimisticConcurrency` when the object's tick is stale,
    /// `UniqueConstraint` on a duplicate unique value, `SchemaChanged` for
    /// a drifted schema, and storage errors. Partial effects roll back.
    pub fn save<T: Persist>(&self, object: &mut T) -> DbResult<Oid> {
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            let mut graph = ObjectGraph::new();
            let root = object.to_graph(&mut graph);
            {
                let node = graph.node_mut(root)?;
                node.oid = object.oid();
                node.tick = object.tick();
            }
            let oid = engine.save_root(&mut graph, root)?;
            object.set_oid(oid);
            if let Some(tick) = graph.node(root)?.tick {
                object.set_tick(tick);
            }
            Ok(oid)
        })
    }

    /// Overwrites the named fields of one stored record without loading
    /// it. A dot-path like `"Home.City"` follows the stored reference and
    /// writes the sub-record it points at. Partial saves skip the tick
    /// check and do not bump the tick.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a dead record or a null reference along a
    /// path, `UniqueConstraint` on a duplicate unique value, and storage
    /// errors.
    pub fn save_partial<T: Persist>(
        &self,
        oid: Oid,
        fields: &[(String, FieldValue)],
    ) -> DbResult<()> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            engine.save_partial(&type_name, oid, fields)
        })
    }

    /// Deletes one object, checking its tick first when the schema has a
    /// version field.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a dead or never-saved object,
    /// `OptimisticConcurrency` on a stale tick, and storage errors.
    pub fn delete<T: Persist>(&self, object: &T) -> DbResult<()> {
        let type_name = T::type_desc().name;
        let oid = object.oid();
        let tick = object.tick();
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            engine.delete(&type_name, oid, tick)
        })
    }

    /// Deletes one record by OID without a tick check.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a dead OID and storage errors.
    pub fn delete_by_oid<T: Persist>(&self, oid: Oid) -> DbResult<()> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            engine.delete(&type_name, oid, None)
        })
    }

    /// Loads one object by OID, or `None` for a dead or never-allocated
    /// one.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` for a drifted schema, `RecordCorrupted` for
    /// undecodable bytes (unless repair mode tombstones them), and storage
    /// errors.
    pub fn load_by_oid<T: Persist>(&self, oid: Oid) -> DbResult<Option<T>> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            match engine.load_graph(&type_name, oid)? {
                Some((graph, root)) => Ok(Some(T::from_graph(&graph, root)?)),
                None => Ok(None),
            }
        })
    }

    /// Loads every live object of a type, in OID order.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::load_by_oid`].
    pub fn load_all<T: Persist>(&self) -> DbResult<Vec<T>> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            let (graph, roots) = engine.load_all_graph(&type_name)?;
            roots
                .into_iter()
                .map(|root| T::from_graph(&graph, root))
                .collect()
        })
    }

    /// Loads the objects matching a filter expression, in OID order.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPredicate` for expression shapes with no
    /// criteria translation, plus the load errors of
    /// [`Self::load_by_oid`].
    pub fn query<T: Persist>(&self, filter: &FilterExpr) -> DbResult<Vec<T>> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            let criteria = translate(&type_name, filter)?;
            let oids = engine.resolve(&criteria)?;
            let (graph, roots) = engine.load_oids_graph(&type_name, &oids)?;
            roots
                .into_iter()
                .map(|root| T::from_graph(&graph, root))
                .collect()
        })
    }

    /// Resolves a filter to matching OIDs without materializing objects.
    ///
    /// # Errors
    ///
    /// Returns translation and resolution errors.
    pub fn query_oids<T: Persist>(&self, filter: &FilterExpr) -> DbResult<Vec<Oid>> {
        let type_name = T::type_desc().name;
        self.with(|engine| {
            Self::register_in::<T>(engine)?;
            let criteria = translate(&type_name, filter)?;
            engine.resolve(&criteria)
        })
    }

    /// Resolves a hand-built criteria tree to matching OIDs.
    ///
    /// # Errors
    ///
    /// Returns resolution errors.
    pub fn resolve(&self, criteria: &Criteria) -> DbResult<Vec<Oid>> {
        self.with(|engine| engine.resolve(criteria))
    }

    /// Number of live objects of a type; zero before first registration.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn count<T: Persist>(&self) -> DbResult<u32> {
        let type_name = T::type_desc().name;
        self.with(|engine| engine.count_live(&type_name))
    }

    /// Migrates a type whose stored schema drifted from its declaration,
    /// rewriting its file under the declared schema. OIDs, tombstones and
    /// ticks survive; fields are matched by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for a never-registered type and storage or
    /// codec errors from the rewrite.
    pub fn migrate<T: Persist>(&self) -> DbResult<()> {
        self.with(|engine| engine.migrate_type(&T::type_desc()))
    }

    /// Compacts the database: renumbers live records densely, drops
    /// tombstones and rewrites the payload pool. Held OIDs are invalidated.
    ///
    /// # Errors
    ///
    /// Returns storage errors; the originals stay in place on failure.
    pub fn shrink(&self) -> DbResult<()> {
        self.with(Engine::shrink)
    }

    /// Starts a transaction buffer. Staged operations stay invisible until
    /// [`Self::commit`].
    ///
    /// # Errors
    ///
    /// Returns `Closed` after [`Self::close`].
    pub fn begin(&self) -> DbResult<Transaction> {
        self.with(|engine| Ok(engine.begin_transaction()))
    }

    /// Stages a typed save into a transaction. The object's OID is
    /// assigned at commit and returned from [`Self::commit`] in staging
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` when the type's declared schema no longer
    /// matches the stored one.
    pub fn stage_save<T: Persist>(&self, tx: &mut Transaction, object: &T) -> DbResult<()> {
        self.with(|engine| Self::register_in::<T>(engine))?;
        let mut graph = ObjectGraph::new();
        let root = object.to_graph(&mut graph);
        {
            let node = graph.node_mut(root)?;
            node.oid = object.oid();
            node.tick = object.tick();
        }
        tx.stage_save(graph, root);
        Ok(())
    }

    /// Applies a transaction's staged operations atomically, returning the
    /// root OID of each staged save in staging order.
    ///
    /// # Errors
    ///
    /// On any failure every already-applied operation of the transaction
    /// is rolled back before the error returns.
    pub fn commit(&self, tx: Transaction) -> DbResult<Vec<Oid>> {
        self.with(|engine| engine.commit_transaction(tx))
    }

    /// Discards a transaction's staged operations. Nothing was applied, so
    /// this is just a drop.
    pub fn rollback(&self, tx: Transaction) {
        drop(tx);
    }

    /// Closes the database, releasing the directory lock. Every later
    /// operation returns `Closed`.
    pub fn close(&self) {
        self.inner.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_handle_rejects_operations() {
        let db = Database::open_in_memory(Config::default()).unwrap();
        db.close();
        assert!(matches!(db.begin(), Err(DbError::Closed)));
    }
}
