//! Load paths: materializing stored records back into object graphs.
//!
//! Loading mirrors saving. A record materializes as an [`ObjectNode`] whose
//! reference fields hold arena indices; the per-operation [`LoadCache`]
//! enters each identity before its sub-objects load, so cycles and diamond
//! references resolve to one node. Bulk loads read records through a
//! prefetch window instead of one read per record.

use super::Engine;
use crate::error::{DbError, DbResult};
use crate::object::{ObjectGraph, ObjectNode, ObjectValue};
use crate::refcache::LoadCache;
use crate::types::{Oid, Tid};
use silodb_codec::{decode_record, is_tombstoned, FieldValue, ObjectRef};

impl Engine {
    /// Loads one live object and everything it references into a graph.
    /// Returns `None` for a dead or never-allocated OID.
    ///
    /// # Errors
    ///
    /// Returns `SchemaChanged` for a stale type and `RecordCorrupted` for
    /// an undecodable record (which repair mode tombstones instead).
    pub fn load_graph(
        &mut self,
        type_name: &str,
        oid: Oid,
    ) -> DbResult<Option<(ObjectGraph, usize)>> {
        let tid = self.tid_of(type_name)?;
        self.ensure_not_stale(tid)?;
        if !self.file(tid)?.is_live(oid)? {
            return Ok(None);
        }

        let mut graph = ObjectGraph::new();
        let mut cache = LoadCache::new();
        match load_node(self, &mut graph, &mut cache, tid, oid) {
            Ok(root) => Ok(Some((graph, root))),
            Err(e @ DbError::RecordCorrupted { .. }) if self.config.repair_mode => {
                tracing::warn!(type_name, %oid, error = %e, "tombstoning corrupt record");
                self.file_mut(tid)?.mark_tombstoned(oid)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads the OIDs produced by a criteria resolution into one shared
    /// graph, returning the root index per OID in input order. Dead OIDs
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::load_graph`].
    pub fn load_oids_graph(
        &mut self,
        type_name: &str,
        oids: &[Oid],
    ) -> DbResult<(ObjectGraph, Vec<usize>)> {
        let tid = self.tid_of(type_name)?;
        self.ensure_not_stale(tid)?;

        let mut graph = ObjectGraph::new();
        let mut cache = LoadCache::new();
        let mut roots = Vec::with_capacity(oids.len());
        for &oid in oids {
            if !self.file(tid)?.is_live(oid)? {
                continue;
            }
            match load_node(self, &mut graph, &mut cache, tid, oid) {
                Ok(root) => roots.push(root),
                Err(e @ DbError::RecordCorrupted { .. }) if self.config.repair_mode => {
                    tracing::warn!(type_name, %oid, error = %e, "tombstoning corrupt record");
                    self.file_mut(tid)?.mark_tombstoned(oid)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((graph, roots))
    }

    /// Loads every live object of a type, prefetching record images in
    /// windows sized by [`Config::prefetch_percent`](crate::Config).
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::load_graph`].
    pub fn load_all_graph(&mut self, type_name: &str) -> DbResult<(ObjectGraph, Vec<usize>)> {
        let Some(&tid) = self.by_name.get(type_name) else {
            return Ok((ObjectGraph::new(), Vec::new()));
        };
        self.ensure_not_stale(tid)?;
        let info = self.file(tid)?.info().clone();
        let total = info.number_of_records();
        let record_length = info.record_length() as usize;
        let window = 1.max(
            (u64::from(total) * u64::from(self.config.prefetch_percent) / 100) as u32,
        );

        let mut graph = ObjectGraph::new();
        let mut cache = LoadCache::new();
        let mut roots = Vec::new();
        let mut next = 1u32;
        while next <= total {
            let (bytes, count) = self.file(tid)?.read_window(Oid::new(next), window)?;
            for i in 0..count {
                let oid = Oid::new(next + i);
                let image = &bytes[i as usize * record_length..(i as usize + 1) * record_length];
                if is_tombstoned(image[0]) {
                    continue;
                }
                // a record already materialized as someone's sub-object
                // comes straight out of the cache
                match load_node_from_image(self, &mut graph, &mut cache, tid, oid, image) {
                    Ok(root) => roots.push(root),
                    Err(e @ DbError::RecordCorrupted { .. }) if self.config.repair_mode => {
                        tracing::warn!(type_name, %oid, error = %e, "tombstoning corrupt record");
                        self.file_mut(tid)?.mark_tombstoned(oid)?;
                    }
                    Err(e) => return Err(e),
                }
            }
            if count == 0 {
                break;
            }
            next += count;
        }
        Ok((graph, roots))
    }
}

fn load_node(
    engine: &Engine,
    graph: &mut ObjectGraph,
    cache: &mut LoadCache,
    tid: Tid,
    oid: Oid,
) -> DbResult<usize> {
    if let Some(index) = cache.get(tid, oid) {
        return Ok(index);
    }
    let image = engine.file(tid)?.read_record(oid)?;
    load_node_from_image(engine, graph, cache, tid, oid, &image)
}

fn load_node_from_image(
    engine: &Engine,
    graph: &mut ObjectGraph,
    cache: &mut LoadCache,
    tid: Tid,
    oid: Oid,
    image: &[u8],
) -> DbResult<usize> {
    if let Some(index) = cache.get(tid, oid) {
        return Ok(index);
    }
    let info = engine.file(tid)?.info().clone();
    let raw = decode_record(info.layout(), image, &engine.pool).map_err(|e| {
        DbError::record_corrupted(info.type_name(), oid, e.to_string())
    })?;
    let tick = info
        .version_field()
        .and_then(|vi| raw.get(vi).and_then(FieldValue::as_uint));

    // the node is cached before sub-objects load so cycles terminate here
    let index = graph.add(ObjectNode::with_identity(
        info.type_name(),
        oid,
        tick,
        Vec::new(),
    ));
    cache.insert(tid, oid, index);

    let mut values = Vec::with_capacity(raw.len());
    for (field, value) in info.fields().iter().zip(raw) {
        let staged = if field.kind.is_complex() && field.target_type.is_some() {
            match value {
                FieldValue::Null => ObjectValue::Sub(None),
                FieldValue::Ref(r) => ObjectValue::Sub(load_ref(
                    engine,
                    graph,
                    cache,
                    info.type_name(),
                    &field.name,
                    r,
                )?),
                FieldValue::RefList(refs) => {
                    let mut children = Vec::with_capacity(refs.len());
                    for r in refs {
                        if let Some(child) =
                            load_ref(engine, graph, cache, info.type_name(), &field.name, r)?
                        {
                            children.push(child);
                        }
                    }
                    ObjectValue::SubList(children)
                }
                FieldValue::Dict(entries) => {
                    let mut pairs = Vec::with_capacity(entries.len());
                    for (key, v) in entries {
                        let FieldValue::Ref(r) = v else { continue };
                        if let Some(child) =
                            load_ref(engine, graph, cache, info.type_name(), &field.name, r)?
                        {
                            pairs.push((key, child));
                        }
                    }
                    ObjectValue::SubDict(pairs)
                }
                other => ObjectValue::Scalar(other),
            }
        } else {
            ObjectValue::Scalar(value)
        };
        values.push(staged);
    }
    graph.node_mut(index)?.values = values;
    Ok(index)
}

/// Resolves one stored reference to an arena index, or `None` when it is
/// null or dangling (missing type, unallocated OID or tombstoned record).
fn load_ref(
    engine: &Engine,
    graph: &mut ObjectGraph,
    cache: &mut LoadCache,
    owner_type: &str,
    owner_field: &str,
    r: ObjectRef,
) -> DbResult<Option<usize>> {
    if r.is_null() {
        return Ok(None);
    }
    let target_tid = Tid::new(r.tid);
    let Some(file) = engine.files.get(&target_tid) else {
        tracing::warn!(
            owner_type,
            owner_field,
            tid = r.tid,
            oid = r.oid,
            "dangling reference to unknown type"
        );
        return Ok(None);
    };
    let target_oid = Oid::new(r.oid);
    if !file.is_live(target_oid)? {
        tracing::warn!(
            owner_type,
            owner_field,
            tid = r.tid,
            oid = r.oid,
            "dangling reference to dead record"
        );
        return Ok(None);
    }
    Ok(Some(load_node(engine, graph, cache, target_tid, target_oid)?))
}
