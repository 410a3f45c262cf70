//! Directory/file handles layered over `FileSystem`.

use std::sync::Arc;

use ntfs_ds::DataStorage;
use ntfs_err::{Error, Result};

use crate::attribute::AttributeValue;
use crate::filesystem::FileSystem;
use crate::inode;
use crate::record::MftRecord;
use crate::timestamp;

/// A lightweight handle: an MFT record plus a back-reference to the
/// filesystem it came from. Cheap to clone; directory navigation and
/// file reads both go through it.
pub struct Entry<'fs, DS: DataStorage> {
    fs: &'fs FileSystem<DS>,
    record: Arc<MftRecord>,
}

impl<DS: DataStorage> Clone for Entry<'_, DS> {
    fn clone(&self) -> Self {
        Self { fs: self.fs, record: self.record.clone() }
    }
}

impl<'fs, DS: DataStorage> Entry<'fs, DS> {
    pub(crate) fn new(fs: &'fs FileSystem<DS>, record: Arc<MftRecord>) -> Self {
        Self { fs, record }
    }

    pub fn record_number(&self) -> u64 {
        self.record.record_number()
    }

    pub fn is_directory(&self) -> bool {
        self.record.is_directory()
    }

    pub fn is_file(&self) -> bool {
        self.record.is_file()
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.record.preferred_filename_information()?.filename)
    }

    /// 0 for directories; the logical `$DATA` size for files, or the
    /// `$FILE_NAME` logical size if the record has no `$DATA` attribute.
    pub fn size(&self) -> u64 {
        if self.is_directory() {
            return 0;
        }
        match self.record.data_attribute() {
            Ok(attribute) => match attribute.value {
                AttributeValue::Resident(value) => value.len() as u64,
                AttributeValue::NonResident(nonresident) => nonresident.data_size,
            },
            Err(_) => self.record.preferred_filename_information().map(|i| i.logical_size).unwrap_or(0),
        }
    }

    /// `$STANDARD_INFORMATION` timestamps, as `(unix_seconds, nanos)`.
    pub fn created(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.standard_information()?.created))
    }

    pub fn modified(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.standard_information()?.modified))
    }

    pub fn changed(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.standard_information()?.changed))
    }

    pub fn accessed(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.standard_information()?.accessed))
    }

    /// `$FILE_NAME` timestamps, which track the last rename rather than
    /// the last content change and are cheaper to trust against a
    /// `$STANDARD_INFORMATION` value an attacker may have forged.
    pub fn filename_created(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.preferred_filename_information()?.created))
    }

    pub fn filename_modified(&self) -> Result<(i64, u32)> {
        Ok(timestamp::filetime_to_unix(self.record.preferred_filename_information()?.modified))
    }

    pub fn file_attributes(&self) -> Result<u32> {
        Ok(self.record.standard_information()?.file_attributes)
    }

    pub fn full_path(&self) -> Result<String> {
        self.fs.path(&self.record)
    }

    pub fn parent(&self) -> Result<Entry<'fs, DS>> {
        if self.record.record_number() == inode::ROOT {
            return Err(Error::NoParent("root has no parent"));
        }
        let parent_record = self.fs.parent(&self.record)?;
        Ok(Entry::new(self.fs, parent_record))
    }

    /// Children of a directory; always empty for a file.
    pub fn children(&self) -> Result<Vec<Entry<'fs, DS>>> {
        Ok(self.fs.children(&self.record)?.into_iter().map(|r| Entry::new(self.fs, r)).collect())
    }

    /// Case-insensitive (ASCII only) lookup of a single path component
    /// among this directory's children, across every `$FILE_NAME`
    /// namespace the child has.
    pub fn child(&self, name: &str) -> Result<Entry<'fs, DS>> {
        let wanted = name.to_ascii_lowercase();
        for child in self.children()? {
            for filename in child.record.filename_informations() {
                if filename.filename.to_ascii_lowercase() == wanted {
                    return Ok(child);
                }
            }
        }
        Err(Error::ChildNotFound)
    }

    /// Resolves a `\`- or `/`-separated relative path from this entry.
    /// Mixing separators within one path is rejected.
    pub fn entry_at(&self, path: &str) -> Result<Entry<'fs, DS>> {
        if path.is_empty() {
            return Ok(self.clone());
        }
        let (head, rest) = split_path(path)?;
        if head.is_empty() {
            // A leading separator: strip it and resolve the remainder
            // from here, rather than stopping at this entry.
            return self.entry_at(rest);
        }
        let child = self.child(head)?;
        if rest.is_empty() {
            return Ok(child);
        }
        if !child.is_directory() {
            return Err(Error::DirectoryDoesNotExist);
        }
        child.entry_at(rest)
    }

    /// Reads up to `len` bytes starting at `offset` from the unnamed
    /// `$DATA` stream, clipped to the attribute's logical size.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let attribute = self.record.data_attribute()?;
        match attribute.value {
            AttributeValue::Resident(value) => {
                let start = (offset as usize).min(value.len());
                let end = start.saturating_add(len).min(value.len());
                Ok(value[start..end].to_vec())
            }
            AttributeValue::NonResident(nonresident) => {
                let view = crate::nonresident::NonResidentView::new(nonresident.runlist, self.fs.cluster_size());
                let start = offset.min(nonresident.data_size);
                let end = (offset.saturating_add(len as u64)).min(nonresident.data_size).min(view.len());
                if start >= end {
                    return Ok(Vec::new());
                }
                view.slice(self.fs.data_storage(), self.fs.cluster_accessor(), start, end)
            }
        }
    }
}

fn split_path(path: &str) -> Result<(&str, &str)> {
    let has_backslash = path.contains('\\');
    let has_forward_slash = path.contains('/');
    if has_backslash && has_forward_slash {
        return Err(Error::UnsupportedPath);
    }
    let separator = if has_backslash {
        '\\'
    } else if has_forward_slash {
        '/'
    } else {
        return Ok((path, ""));
    };
    match path.find(separator) {
        Some(idx) => Ok((&path[..idx], &path[idx + 1..])),
        None => Ok((path, "")),
    }
}
