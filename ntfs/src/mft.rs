//! MFT record cache and enumeration.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::warn;
use ntfs_ds::DataStorage;
use ntfs_err::{Error, Result};

use crate::cluster::ClusterAccessor;
use crate::inode;
use crate::nonresident::NonResidentView;
use crate::record::MftRecord;

const MAX_PATH_DEPTH: usize = 64;

/// Decodes MFT records on demand and remembers them by record number.
/// The cache is insert-only and purely an optimization: dropping it (or
/// never populating it) changes performance, not correctness.
pub struct MftEnumerator {
    view: NonResidentView,
    record_size: u32,
    cache: RefCell<HashMap<u64, Arc<MftRecord>>>,
}

impl MftEnumerator {
    pub fn new(view: NonResidentView, record_size: u32) -> Self {
        Self { view, record_size, cache: RefCell::new(HashMap::new()) }
    }

    pub fn record_count(&self) -> u64 {
        self.view.len() / self.record_size as u64
    }

    pub fn get_record<DS: DataStorage>(&self, ds: &DS, accessor: &ClusterAccessor, record_number: u64) -> Result<Arc<MftRecord>> {
        if let Some(cached) = self.cache.borrow().get(&record_number) {
            return Ok(cached.clone());
        }

        let offset = record_number * self.record_size as u64;
        if offset + self.record_size as u64 > self.view.len() {
            return Err(Error::Overrun);
        }
        let buffer = self.view.slice(ds, accessor, offset, offset + self.record_size as u64)?;
        let record = Arc::new(MftRecord::parse(record_number, buffer)?);
        self.cache.borrow_mut().insert(record_number, record.clone());
        Ok(record)
    }

    /// Walks `$FILE_NAME.parent_reference` back to the root, verifying
    /// each hop's sequence number. A stale reference or an unreadable
    /// parent yields a partial path prefixed with `$ORPHAN` rather than
    /// an error.
    pub fn get_path<DS: DataStorage>(&self, ds: &DS, accessor: &ClusterAccessor, record: &MftRecord) -> Result<String> {
        if record.record_number() == inode::ROOT {
            return Ok(String::from("\\"));
        }

        let orphan = |mut components: Vec<String>| {
            components.push("$ORPHAN".to_string());
            components.reverse();
            format!("\\{}", components.join("\\"))
        };

        let mut components = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(record.record_number());

        let mut fn_info = match record.preferred_filename_information() {
            Ok(info) => info,
            Err(_) => return Ok(format!("\\$ORPHAN\\{}", record.record_number())),
        };
        components.push(fn_info.filename.clone());

        loop {
            let parent_number = fn_info.parent_reference.record_number();
            if parent_number == inode::ROOT {
                break;
            }
            if components.len() >= MAX_PATH_DEPTH || !visited.insert(parent_number) {
                return Err(Error::CorruptFilesystem("cycle in parent chain"));
            }

            let parent = match self.get_record(ds, accessor, parent_number) {
                Ok(p) => p,
                Err(_) => return Ok(orphan(components)),
            };
            if parent.sequence_number() != fn_info.parent_reference.sequence() {
                return Ok(orphan(components));
            }

            fn_info = match parent.preferred_filename_information() {
                Ok(info) => info,
                Err(_) => return Ok(orphan(components)),
            };
            components.push(fn_info.filename.clone());
        }

        components.reverse();
        Ok(format!("\\{}", components.join("\\")))
    }

    /// Lazily yields every in-use record from 16 up to the end of the
    /// table. Unreadable records are skipped with a warning rather than
    /// aborting the whole enumeration.
    pub fn enumerate<'a, DS: DataStorage>(&'a self, ds: &'a DS, accessor: &'a ClusterAccessor) -> impl Iterator<Item = Arc<MftRecord>> + 'a {
        let total = self.record_count();
        (inode::FIRST_USER..total).filter_map(move |n| match self.get_record(ds, accessor, n) {
            Ok(r) if r.is_in_use() => Some(r),
            Ok(_) => None,
            Err(e) => {
                warn!("skipping unreadable MFT record {n}: {e}");
                None
            }
        })
    }
}
