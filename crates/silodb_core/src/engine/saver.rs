//! Save, delete and partial-save paths.
//!
//! A graph save walks nodes depth-first. Each node's OID is assigned (or
//! confirmed) and entered into the save cache *before* its sub-objects are
//! visited, so a circular reference back to a node mid-save resolves to
//! its OID instead of recursing. Per node the order is: dispatch
//! insert-or-update, tick check, sub-object resolution, unique checks,
//! undo-log pre-images, then the data-file write and index maintenance.

use super::Engine;
use crate::criteria::{Criteria, CriteriaOp, WhereClause};
use crate::error::{DbError, DbResult};
use crate::object::{ObjectGraph, ObjectValue};
use crate::refcache::SaveCache;
use crate::txlog::LogEntry;
use crate::types::{Oid, Tid, TxId};
use silodb_codec::{
    decode_record, encode_record, slot_raw_ref, FieldValue, ObjectRef, RawRef,
};
use std::collections::BTreeSet;

pub(crate) fn save_root_in(
    engine: &mut Engine,
    txid: TxId,
    graph: &mut ObjectGraph,
    root: usize,
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<Oid> {
    let mut cache = SaveCache::new();
    save_node(engine, txid, graph, root, &mut cache, touched, deferred)
}

fn save_node(
    engine: &mut Engine,
    txid: TxId,
    graph: &mut ObjectGraph,
    index: usize,
    cache: &mut SaveCache,
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<Oid> {
    if let Some(oid) = cache.get(index) {
        return Ok(oid);
    }

    let (type_name, node_oid, node_tick) = {
        let node = graph.node(index)?;
        (node.type_name.clone(), node.oid, node.tick)
    };
    let tid = engine.tid_of(&type_name)?;
    engine.ensure_not_stale(tid)?;
    let info = engine.file(tid)?.info().clone();

    if graph.node(index)?.values.len() != info.fields().len() {
        return Err(DbError::invalid_format(
            format!("object graph node for '{type_name}'"),
            format!(
                "expected {} field values, got {}",
                info.fields().len(),
                graph.node(index)?.values.len()
            ),
        ));
    }

    // insert-or-update dispatch on the node's persisted identity
    let existing = if node_oid.is_none() {
        false
    } else {
        if !engine.file(tid)?.is_live(node_oid)? {
            return Err(DbError::NotFound {
                type_name: type_name.clone(),
                oid: node_oid,
            });
        }
        true
    };

    let version_idx = info.version_field();
    let mut new_tick = None;
    if let Some(vi) = version_idx {
        if existing {
            let stored = engine
                .file(tid)?
                .read_field(node_oid, vi, &engine.pool)?
                .as_uint()
                .unwrap_or(0);
            let carried = node_tick.unwrap_or(0);
            if stored != carried {
                return Err(DbError::OptimisticConcurrency {
                    type_name: type_name.clone(),
                    oid: node_oid,
                    stored_tick: stored,
                    object_tick: carried,
                });
            }
            new_tick = Some(stored + 1);
        } else {
            new_tick = Some(1);
        }
    }

    let oid = if existing {
        node_oid
    } else {
        let before = engine.file(tid)?.info().number_of_records();
        engine.log.append(&LogEntry::TypeSnapshot {
            txid,
            tid,
            number_of_records: before,
        })?;
        engine.file_mut(tid)?.info_mut().allocate_oid()
    };
    cache.insert(index, oid);
    {
        let node = graph.node_mut(index)?;
        node.oid = oid;
        if new_tick.is_some() {
            node.tick = new_tick;
        }
    }

    // resolve sub-objects to references, recursing through the cache
    let staged = graph.node(index)?.values.clone();
    let mut values = Vec::with_capacity(staged.len());
    for value in staged {
        values.push(match value {
            ObjectValue::Scalar(v) => v,
            ObjectValue::Sub(None) => FieldValue::Null,
            ObjectValue::Sub(Some(child)) => {
                FieldValue::Ref(child_ref(engine, txid, graph, child, cache, touched, deferred)?)
            }
            ObjectValue::SubList(children) => {
                let mut refs = Vec::with_capacity(children.len());
                for child in children {
                    refs.push(child_ref(engine, txid, graph, child, cache, touched, deferred)?);
                }
                FieldValue::RefList(refs)
            }
            ObjectValue::SubDict(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (key, child) in pairs {
                    let r = child_ref(engine, txid, graph, child, cache, touched, deferred)?;
                    entries.push((key, FieldValue::Ref(r)));
                }
                FieldValue::Dict(entries)
            }
        });
    }
    if let (Some(vi), Some(tick)) = (version_idx, new_tick) {
        values[vi] = FieldValue::UInt(tick);
    }

    // unique checks run against committed state plus this operation's
    // already-applied nodes; the record's own OID is tolerated on update
    for (i, field) in info.fields().iter().enumerate() {
        if !field.unique || values[i].is_null() {
            continue;
        }
        let clause = WhereClause::new(&type_name, &field.name, CriteriaOp::Equal, values[i].clone());
        let hits = engine.resolve(&Criteria::Where(clause))?;
        if hits.iter().any(|hit| *hit != oid) {
            return Err(DbError::unique_constraint(&type_name, &field.name));
        }
    }

    let (old_image, old_values) = if existing {
        let file = engine.file(tid)?;
        let image = file.read_record(oid)?;
        let values = decode_record(info.layout(), &image, &engine.pool)?;
        (Some(image), Some(values))
    } else {
        (None, None)
    };

    if let Some(image) = &old_image {
        engine.log.append(&LogEntry::RecordImage {
            txid,
            tid,
            oid,
            image: image.clone(),
        })?;
        for slot in info.layout().slots() {
            if let Some(raw) = slot_raw_ref(image, *slot)? {
                deferred.push(raw);
            }
        }
    }
    if engine.config.sync_on_commit {
        engine.log.sync()?;
    }

    let new_image = encode_record(info.layout(), &values, &mut engine.pool)?;
    let file = engine.file_mut(tid)?;
    file.write_record(oid, &new_image)?;
    if !existing {
        file.persist_count()?;
    }
    engine
        .indexes
        .apply_write(&info, oid, old_values.as_deref(), &values);
    touched.insert(tid);

    tracing::trace!(
        type_name = %type_name,
        oid = oid.as_u32(),
        update = existing,
        "saved object"
    );
    Ok(oid)
}

fn child_ref(
    engine: &mut Engine,
    txid: TxId,
    graph: &mut ObjectGraph,
    child: usize,
    cache: &mut SaveCache,
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<ObjectRef> {
    let child_oid = save_node(engine, txid, graph, child, cache, touched, deferred)?;
    let child_tid = engine.tid_of(&graph.node(child)?.type_name)?;
    Ok(ObjectRef::new(child_oid.as_u32(), child_tid.as_u32()))
}

pub(crate) fn delete_in(
    engine: &mut Engine,
    txid: TxId,
    type_name: &str,
    oid: Oid,
    expected_tick: Option<u64>,
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<()> {
    let tid = engine.tid_of(type_name)?;
    engine.ensure_not_stale(tid)?;
    let info = engine.file(tid)?.info().clone();

    if !engine.file(tid)?.is_live(oid)? {
        return Err(DbError::NotFound {
            type_name: type_name.to_string(),
            oid,
        });
    }

    if let (Some(vi), Some(carried)) = (info.version_field(), expected_tick) {
        let stored = engine
            .file(tid)?
            .read_field(oid, vi, &engine.pool)?
            .as_uint()
            .unwrap_or(0);
        if stored != carried {
            return Err(DbError::OptimisticConcurrency {
                type_name: type_name.to_string(),
                oid,
                stored_tick: stored,
                object_tick: carried,
            });
        }
    }

    let image = engine.file(tid)?.read_record(oid)?;
    let old_values = decode_record(info.layout(), &image, &engine.pool)?;

    engine.log.append(&LogEntry::RecordImage {
        txid,
        tid,
        oid,
        image: image.clone(),
    })?;
    if engine.config.sync_on_commit {
        engine.log.sync()?;
    }

    engine.file_mut(tid)?.mark_tombstoned(oid)?;
    engine.indexes.apply_delete(&info, oid, &old_values);
    for slot in info.layout().slots() {
        if let Some(raw) = slot_raw_ref(&image, *slot)? {
            deferred.push(raw);
        }
    }
    touched.insert(tid);

    tracing::trace!(type_name, oid = oid.as_u32(), "deleted object");
    Ok(())
}

pub(crate) fn save_partial_in(
    engine: &mut Engine,
    txid: TxId,
    type_name: &str,
    oid: Oid,
    fields: &[(String, FieldValue)],
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<()> {
    let root_tid = engine.tid_of(type_name)?;

    // a dot-path like "Home.City" writes the referenced sub-record, so
    // every leaf is resolved to its owning record before anything runs
    let mut staged: Vec<((Tid, Oid), Vec<(usize, FieldValue)>)> = Vec::new();
    for (path, value) in fields {
        let (tid, target, leaf) = resolve_partial_path(engine, root_tid, oid, path)?;
        match staged.iter_mut().find(|(key, _)| *key == (tid, target)) {
            Some((_, writes)) => writes.push((leaf, value.clone())),
            None => staged.push(((tid, target), vec![(leaf, value.clone())])),
        }
    }
    for ((tid, target), writes) in staged {
        apply_partial(engine, txid, tid, target, &writes, touched, deferred)?;
    }
    Ok(())
}

/// Walks a partial-save path through stored references, returning the
/// record and field slot the leaf write lands on.
fn resolve_partial_path(
    engine: &Engine,
    mut tid: Tid,
    mut oid: Oid,
    path: &str,
) -> DbResult<(Tid, Oid, usize)> {
    let mut segments = path.split('.').peekable();
    loop {
        engine.ensure_not_stale(tid)?;
        let file = engine.file(tid)?;
        let info = file.info();
        if !file.is_live(oid)? {
            return Err(DbError::NotFound {
                type_name: info.type_name().to_string(),
                oid,
            });
        }
        let segment = segments
            .next()
            .ok_or_else(|| DbError::invalid_criteria(format!("empty field path '{path}'")))?;
        let i = info.field_index(segment).ok_or_else(|| {
            DbError::invalid_criteria(format!(
                "unknown field '{}.{segment}'",
                info.type_name()
            ))
        })?;
        if segments.peek().is_none() {
            if info.fields()[i].version {
                return Err(DbError::invalid_criteria(
                    "the version field cannot be written through a partial save",
                ));
            }
            return Ok((tid, oid, i));
        }

        let field = &info.fields()[i];
        let Some(target) = field.target_type.as_deref() else {
            return Err(DbError::invalid_criteria(format!(
                "'{}.{segment}' is not a reference field",
                info.type_name()
            )));
        };
        let r = match file.read_field(oid, i, &engine.pool)? {
            FieldValue::Ref(r) if !r.is_null() => r,
            FieldValue::Ref(_) | FieldValue::Null => {
                return Err(DbError::NotFound {
                    type_name: target.to_string(),
                    oid: Oid::NONE,
                });
            }
            _ => {
                return Err(DbError::invalid_criteria(format!(
                    "'{}.{segment}' does not hold a single reference",
                    info.type_name()
                )));
            }
        };
        tid = Tid::new(r.tid);
        oid = Oid::new(r.oid);
    }
}

fn apply_partial(
    engine: &mut Engine,
    txid: TxId,
    tid: Tid,
    oid: Oid,
    writes: &[(usize, FieldValue)],
    touched: &mut BTreeSet<Tid>,
    deferred: &mut Vec<RawRef>,
) -> DbResult<()> {
    let info = engine.file(tid)?.info().clone();
    let old_image = engine.file(tid)?.read_record(oid)?;
    let old_values = decode_record(info.layout(), &old_image, &engine.pool)?;

    // unique checks before anything is written
    for (i, value) in writes {
        let field = &info.fields()[*i];
        if !field.unique || value.is_null() {
            continue;
        }
        let clause = WhereClause::new(
            info.type_name(),
            &field.name,
            CriteriaOp::Equal,
            value.clone(),
        );
        let hits = engine.resolve(&Criteria::Where(clause))?;
        if hits.iter().any(|hit| *hit != oid) {
            return Err(DbError::unique_constraint(info.type_name(), &field.name));
        }
    }

    engine.log.append(&LogEntry::RecordImage {
        txid,
        tid,
        oid,
        image: old_image.clone(),
    })?;
    if engine.config.sync_on_commit {
        engine.log.sync()?;
    }

    let mut new_values = old_values.clone();
    for (i, value) in writes {
        if let Some(slot) = info.layout().slot(*i) {
            if let Some(raw) = slot_raw_ref(&old_image, slot)? {
                deferred.push(raw);
            }
        }
        let file = engine
            .files
            .get_mut(&tid)
            .ok_or_else(|| DbError::UnknownType(info.type_name().to_string()))?;
        file.write_field(oid, *i, value, &mut engine.pool)?;
        new_values[*i] = value.clone();
    }
    engine
        .indexes
        .apply_write(&info, oid, Some(&old_values), &new_values);
    touched.insert(tid);

    tracing::trace!(type_name = info.type_name(), oid = oid.as_u32(), "partial save");
    Ok(())
}
