//! Directory index resolution ($INDEX_ROOT + $INDEX_ALLOCATION).
//!
//! Full B+-tree descent isn't needed for correctness: every directory
//! entry exists in some leaf, and `$INDEX_ROOT` plus a linear scan of
//! every `$INDEX_ALLOCATION` block together cover all of them. Child
//! VCN pointers embedded in node entries are read but never followed.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use ntfs_ds::DataStorage;
use ntfs_err::Result;
use zerocopy::{little_endian::U16, little_endian::U32, little_endian::U64, FromBytes, Immutable, KnownLayout};

use crate::attribute::{self, AttributeValue};
use crate::cluster::ClusterAccessor;
use crate::fixup::{self, MultiSectorHeader};
use crate::mft::MftEnumerator;
use crate::nonresident::NonResidentView;
use crate::record::{parse_filename_information, MftRecord, MftReference};

const INDEX_ENTRY_FLAG_END: u16 = 0x02;

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct IndexRootHeader {
    attribute_type: U32,
    collation_rule: U32,
    index_block_size: U32,
    clusters_per_index_block: u8,
    reserved: [u8; 3],
}

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct IndexHeader {
    entries_offset: U32,
    index_length: U32,
    allocated_size: U32,
    flags: u8,
    reserved: [u8; 3],
}

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct IndexAllocationHeader {
    multi_sector: MultiSectorHeader,
    lsn: U64,
    this_vcn: U64,
    index_header: IndexHeader,
}

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct IndexEntryHeader {
    mft_reference: U64,
    length: U16,
    key_length: U16,
    flags: U16,
    reserved: U16,
}

/// Collects every (mft_reference) pointed to by `entries`, starting at
/// offset 0 of `entries`, into `out`. Later namespace entries for a
/// record already seen do not overwrite the first one.
fn parse_entries(entries: &[u8], out: &mut BTreeMap<u64, MftReference>) -> Result<()> {
    let header_size = size_of::<IndexEntryHeader>();
    let mut pos = 0usize;
    loop {
        let Some(header_bytes) = entries.get(pos..pos + header_size) else {
            break;
        };
        let (header, _) = IndexEntryHeader::ref_from_prefix(header_bytes).expect("fixed-size slice");
        let flags = header.flags.get();
        let length = header.length.get() as usize;

        if flags & INDEX_ENTRY_FLAG_END != 0 || length < header_size {
            break;
        }
        let Some(entry) = entries.get(pos..pos + length) else {
            break;
        };

        let key_length = header.key_length.get() as usize;
        if key_length > 0 {
            if let Some(key_bytes) = entry.get(header_size..header_size + key_length) {
                if let Ok(fn_info) = parse_filename_information(key_bytes) {
                    let mft_reference = MftReference(header.mft_reference.get());
                    // The root directory's self-referential "." entry isn't a real child.
                    if !(mft_reference.record_number() == crate::inode::ROOT && fn_info.filename == ".") {
                        out.entry(mft_reference.record_number()).or_insert(mft_reference);
                    }
                }
            }
        }

        pos += length;
    }
    Ok(())
}

/// Resolves the full set of distinct children of `record`, merging
/// `$INDEX_ROOT` and every `$INDEX_ALLOCATION` block. Records that fail
/// to decode are dropped with a warning instead of failing the whole
/// listing.
pub fn children<DS: DataStorage>(
    ds: &DS,
    accessor: &ClusterAccessor,
    mft: &MftEnumerator,
    record: &MftRecord,
) -> Result<Vec<Arc<MftRecord>>> {
    if !record.is_directory() {
        return Ok(Vec::new());
    }

    let mut refs: BTreeMap<u64, MftReference> = BTreeMap::new();
    let mut index_block_size = None;

    if let Ok(root_attr) = record.attribute(attribute::TYPE_INDEX_ROOT) {
        if let AttributeValue::Resident(value) = &root_attr.value {
            if let Ok((root_header, rest)) = IndexRootHeader::ref_from_prefix(value) {
                index_block_size = Some(root_header.index_block_size.get());
                if let Ok((index_header, _)) = IndexHeader::ref_from_prefix(rest) {
                    let entries_start = size_of::<IndexRootHeader>() + index_header.entries_offset.get() as usize;
                    if let Some(entries) = value.get(entries_start..) {
                        if let Err(e) = parse_entries(entries, &mut refs) {
                            warn!("dropping $INDEX_ROOT entries for record {}: {e}", record.record_number());
                        }
                    }
                }
            }
        }
    }

    if let Ok(alloc_attr) = record.attribute(attribute::TYPE_INDEX_ALLOCATION) {
        if let AttributeValue::NonResident(nonresident) = &alloc_attr.value {
            let block_size = index_block_size.unwrap_or(4096) as u64;
            let view = NonResidentView::new(nonresident.runlist.clone(), accessor.cluster_size());
            let total_len = view.len();
            let mut block_start = 0u64;

            while block_start < total_len {
                let block_end = (block_start + block_size).min(total_len);
                match view.slice(ds, accessor, block_start, block_end) {
                    Ok(mut block) => {
                        if let Err(e) = fixup::apply(&mut block) {
                            warn!("dropping unreadable index block at vcn {}: {e}", block_start / block_size);
                        } else {
                            let header_base = size_of::<IndexAllocationHeader>() - size_of::<IndexHeader>();
                            if let Ok((index_header, _)) = IndexHeader::ref_from_prefix(&block[header_base..]) {
                                let entries_start = header_base + index_header.entries_offset.get() as usize;
                                if let Some(entries) = block.get(entries_start..) {
                                    if let Err(e) = parse_entries(entries, &mut refs) {
                                        warn!("dropping index block entries for record {}: {e}", record.record_number());
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => warn!("failed to read index block at vcn {}: {e}", block_start / block_size),
                }
                block_start += block_size;
            }
        }
    }

    let mut children = Vec::with_capacity(refs.len());
    for (record_number, _) in refs {
        match mft.get_record(ds, accessor, record_number) {
            Ok(r) => children.push(r),
            Err(e) => warn!("dropping child record {record_number}: {e}"),
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_index_entry(buf: &mut Vec<u8>, mft_reference: u64, filename: &str) {
        let name_utf16: Vec<u8> = filename.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let key_length = (66 + name_utf16.len()) as u16;
        let header_size = size_of::<IndexEntryHeader>();
        let length = ((header_size + key_length as usize).div_ceil(8) * 8) as u16;

        let start = buf.len();
        buf.resize(start + length as usize, 0);
        buf[start..start + 8].copy_from_slice(&mft_reference.to_le_bytes());
        buf[start + 8..start + 10].copy_from_slice(&length.to_le_bytes());
        buf[start + 10..start + 12].copy_from_slice(&key_length.to_le_bytes());
        // flags = 0 (leaf, not end)

        let key_start = start + header_size;
        buf[key_start + 64] = filename.encode_utf16().count() as u8; // filename_length
        buf[key_start + 65] = 1; // Win32 namespace
        buf[key_start + 66..key_start + 66 + name_utf16.len()].copy_from_slice(&name_utf16);
    }

    fn push_end_entry(buf: &mut Vec<u8>) {
        let header_size = size_of::<IndexEntryHeader>();
        let start = buf.len();
        buf.resize(start + header_size, 0);
        buf[start + 8..start + 10].copy_from_slice(&(header_size as u16).to_le_bytes());
        buf[start + 12..start + 14].copy_from_slice(&INDEX_ENTRY_FLAG_END.to_le_bytes());
    }

    #[test]
    fn collects_entries_until_end_marker() {
        let mut buf = Vec::new();
        push_index_entry(&mut buf, 16, "a.txt");
        push_index_entry(&mut buf, 17, "b.txt");
        push_end_entry(&mut buf);

        let mut refs = BTreeMap::new();
        parse_entries(&buf, &mut refs).unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains_key(&16));
        assert!(refs.contains_key(&17));
    }

    #[test]
    fn does_not_overwrite_first_seen_reference() {
        let mut buf = Vec::new();
        push_index_entry(&mut buf, 16, "a.txt");
        push_index_entry(&mut buf, 16, "A.TXT"); // DOS alias of the same record
        push_end_entry(&mut buf);

        let mut refs = BTreeMap::new();
        parse_entries(&buf, &mut refs).unwrap();
        assert_eq!(refs.len(), 1);
    }

    /// The node header of an `$INDEX_ALLOCATION` block starts after the
    /// multi-sector header, the `$LogFile` LSN and the VCN: 8 + 8 + 8 = 24
    /// bytes in, not 16. Getting this wrong makes every block with VCN 0
    /// read its `IndexHeader` out of the VCN field itself.
    #[test]
    fn index_allocation_header_base_is_24_bytes() {
        assert_eq!(size_of::<IndexAllocationHeader>() - size_of::<IndexHeader>(), 24);
    }

    /// Builds a whole "INDX" block (multi-sector header, LSN, VCN, node
    /// header, entries) and checks that entries are found at the true
    /// offset rather than at the VCN field.
    #[test]
    fn parses_entries_from_an_index_allocation_block() {
        let mut entries = Vec::new();
        push_index_entry(&mut entries, 16, "a.txt");
        push_end_entry(&mut entries);

        let header_base = size_of::<IndexAllocationHeader>() - size_of::<IndexHeader>();
        let entries_offset = size_of::<IndexHeader>() as u32;
        let mut block = vec![0u8; header_base + entries_offset as usize + entries.len()];
        block[0..4].copy_from_slice(b"INDX");
        // this_vcn, at offset 16, is deliberately non-zero garbage: if the
        // node header were (wrongly) read starting here, entries_offset
        // would come out wrong and no entries would be found.
        block[16..24].copy_from_slice(&7u64.to_le_bytes());
        block[header_base..header_base + 4].copy_from_slice(&entries_offset.to_le_bytes());
        block[header_base + entries_offset as usize..].copy_from_slice(&entries);

        let (index_header, _) = IndexHeader::ref_from_prefix(&block[header_base..]).unwrap();
        let entries_start = header_base + index_header.entries_offset.get() as usize;
        let mut refs = BTreeMap::new();
        parse_entries(&block[entries_start..], &mut refs).unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs.contains_key(&16));
    }
}
