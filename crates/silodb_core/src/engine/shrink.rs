//! Compaction.
//!
//! Shrink rewrites every type file and the shared pool into rewrite files,
//! renumbering live records densely from OID 1 and dropping tombstones and
//! orphaned payloads, then swaps the rewrites over the originals and
//! rebuilds the indexes. Stored references are remapped to the new OIDs; a
//! reference whose target was tombstoned comes out null (or is removed from
//! its list or dictionary).

use super::{Engine, Location};
use crate::catalog::TypeKind;
use crate::error::DbResult;
use crate::rawpool::SharedPool;
use crate::record_file::RecordFile;
use crate::types::{Oid, Tid};
use silodb_codec::{decode_record, encode_record, FieldValue, ObjectRef};
use std::collections::HashMap;

type OidMaps = HashMap<Tid, HashMap<u32, u32>>;

impl Engine {
    /// Compacts the database in place.
    ///
    /// Live records are renumbered densely per type; after a shrink, OIDs
    /// run 1..=count again and the pool holds only referenced payloads.
    /// Existing `Oid` handles held by the application are invalidated.
    ///
    /// # Errors
    ///
    /// Returns storage and codec errors; on error the original files are
    /// left in place.
    pub fn shrink(&mut self) -> DbResult<()> {
        let mut tids: Vec<Tid> = self.files.keys().copied().collect();
        tids.sort_unstable();

        // old-to-new OID map per type; only user types renumber
        let mut maps: OidMaps = HashMap::new();
        for &tid in &tids {
            let file = self.file(tid)?;
            let renumber = file.info().kind() == TypeKind::User;
            let mut map = HashMap::new();
            let mut next = 1u32;
            for raw_oid in 1..=file.info().number_of_records() {
                if !file.is_live(Oid::new(raw_oid))? {
                    continue;
                }
                map.insert(raw_oid, if renumber { next } else { raw_oid });
                next += 1;
            }
            maps.insert(tid, map);
        }

        let mut new_pool = SharedPool::open(self.create_pool_rewrite_backend()?)?;
        let mut rewrites: Vec<(String, Tid, RecordFile)> = Vec::with_capacity(tids.len());
        for &tid in &tids {
            let old_info = self.file(tid)?.info().clone();
            let map = &maps[&tid];
            let renumber = old_info.kind() == TypeKind::User;

            let mut new_info = old_info.clone();
            new_info.set_number_of_records(if renumber {
                map.len() as u32
            } else {
                old_info.number_of_records()
            });
            new_info.set_schema_stale(false);
            let backend = self.create_rewrite_backend(old_info.type_name())?;
            let mut rewrite = RecordFile::create(backend, new_info)?;
            rewrite.persist_count()?;

            for raw_oid in 1..=old_info.number_of_records() {
                let Some(&new_oid) = map.get(&raw_oid) else {
                    continue;
                };
                let image = self.file(tid)?.read_record(Oid::new(raw_oid))?;
                let values = decode_record(old_info.layout(), &image, &self.pool)?;
                let remapped: Vec<FieldValue> =
                    values.into_iter().map(|v| remap_value(v, &maps)).collect();
                let new_image =
                    encode_record(old_info.layout(), &remapped, &mut new_pool)?;
                rewrite.write_record(Oid::new(new_oid), &new_image)?;
            }
            rewrite.flush()?;
            rewrite.sync()?;
            rewrites.push((old_info.type_name().to_string(), tid, rewrite));
        }
        new_pool.flush()?;
        new_pool.sync()?;

        // swap window: the pool and file renames are not atomic together
        match &self.location {
            Location::Disk(dir) => {
                let pool_rewrite = dir.pool_file_rewrite();
                let pool_path = dir.pool_file();
                drop(new_pool);
                std::fs::rename(&pool_rewrite, &pool_path)?;
                let reopened =
                    Box::new(silodb_storage::FileBackend::open(&pool_path)?);
                self.pool.replace_backend(reopened);
            }
            Location::Memory => {
                self.pool.replace_backend(new_pool.into_backend());
            }
        }
        for (type_name, tid, rewrite) in rewrites {
            self.swap_type_file(&type_name, tid, rewrite)?;
        }

        self.rebuild_all_indexes()?;
        tracing::info!("shrink complete");
        Ok(())
    }
}

fn remap_ref(r: ObjectRef, maps: &OidMaps) -> Option<ObjectRef> {
    if r.is_null() {
        return Some(r);
    }
    let new_oid = *maps.get(&Tid::new(r.tid))?.get(&r.oid)?;
    Some(ObjectRef::new(new_oid, r.tid))
}

/// Remaps the references inside one stored value. Targets missing from the
/// maps were tombstoned: single references null out, list and dictionary
/// entries drop.
fn remap_value(value: FieldValue, maps: &OidMaps) -> FieldValue {
    match value {
        FieldValue::Ref(r) => match remap_ref(r, maps) {
            Some(mapped) => FieldValue::Ref(mapped),
            None => FieldValue::Null,
        },
        FieldValue::RefList(refs) => FieldValue::RefList(
            refs.into_iter()
                .filter_map(|r| remap_ref(r, maps))
                .collect(),
        ),
        FieldValue::Dict(entries) => FieldValue::Dict(
            entries
                .into_iter()
                .filter_map(|(key, v)| match v {
                    FieldValue::Ref(r) => {
                        remap_ref(r, maps).map(|mapped| (key, FieldValue::Ref(mapped)))
                    }
                    other => Some((key, other)),
                })
                .collect(),
        ),
        other => other,
    }
}
