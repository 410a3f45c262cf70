//! MFT record (FILE record) parsing.

use ntfs_err::{Error, Result};
use zerocopy::{little_endian::U16, little_endian::U32, little_endian::U64, FromBytes, Immutable, KnownLayout};

use crate::attribute::{self, Attribute, AttributeIter, AttributeValue};
use crate::fixup;

pub const FLAG_IN_USE: u16 = 0x0001;
pub const FLAG_DIRECTORY: u16 = 0x0002;

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct RecordHeader {
    multi_sector: fixup::MultiSectorHeader,
    lsn: U64,
    sequence_number: U16,
    link_count: U16,
    first_attribute_offset: U16,
    flags: U16,
    used_size: U32,
    allocated_size: U32,
    base_file_record_segment: U64,
    next_attribute_id: U16,
    padding: U16,
    mft_record_number: U32,
}

/// A 48-bit record number packed with a 16-bit sequence number, used to
/// reference an MFT record while detecting whether it has since been
/// reused for something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MftReference(pub u64);

impl MftReference {
    pub fn record_number(&self) -> u64 {
        self.0 & 0x0000_FFFF_FFFF_FFFF
    }

    pub fn sequence(&self) -> u16 {
        (self.0 >> 48) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
}

impl Namespace {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Namespace::Win32,
            2 => Namespace::Dos,
            3 => Namespace::Win32AndDos,
            _ => Namespace::Posix,
        }
    }
}

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct RawFileNameInformation {
    parent_reference: U64,
    created: U64,
    modified: U64,
    changed: U64,
    accessed: U64,
    allocated_size: U64,
    logical_size: U64,
    flags: U32,
    reparse_tag: U32,
    filename_length: u8,
    namespace: u8,
}

#[derive(Debug, Clone)]
pub struct FileNameInformation {
    pub parent_reference: MftReference,
    pub created: u64,
    pub modified: u64,
    pub changed: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub logical_size: u64,
    pub flags: u32,
    pub namespace: Namespace,
    pub filename: String,
}

pub(crate) fn parse_filename_information(buf: &[u8]) -> Result<FileNameInformation> {
    let (raw, rest) = RawFileNameInformation::ref_from_prefix(buf).map_err(|_| Error::InvalidRecord("$FILE_NAME truncated"))?;
    let name_len = raw.filename_length as usize * 2;
    let name_bytes = rest.get(..name_len).ok_or(Error::InvalidRecord("$FILE_NAME name truncated"))?;
    Ok(FileNameInformation {
        parent_reference: MftReference(raw.parent_reference.get()),
        created: raw.created.get(),
        modified: raw.modified.get(),
        changed: raw.changed.get(),
        accessed: raw.accessed.get(),
        allocated_size: raw.allocated_size.get(),
        logical_size: raw.logical_size.get(),
        flags: raw.flags.get(),
        namespace: Namespace::from_u8(raw.namespace),
        filename: attribute::decode_utf16(name_bytes),
    })
}

#[derive(Debug, Clone)]
pub struct StandardInformation {
    pub created: u64,
    pub modified: u64,
    pub changed: u64,
    pub accessed: u64,
    pub file_attributes: u32,
}

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct RawStandardInformation {
    created: U64,
    modified: U64,
    changed: U64,
    accessed: U64,
    file_attributes: U32,
}

impl StandardInformation {
    // The NTFS 1.2 layout is 48 bytes; 3.x appends quota/usn fields this
    // crate has no use for, so `ref_from_prefix` ignoring the remainder
    // of `buf` is exactly what we want.
    fn parse(buf: &[u8]) -> Result<Self> {
        let (raw, _rest) = RawStandardInformation::ref_from_prefix(buf)
            .map_err(|_| Error::InvalidRecord("$STANDARD_INFORMATION truncated"))?;
        Ok(Self {
            created: raw.created.get(),
            modified: raw.modified.get(),
            changed: raw.changed.get(),
            accessed: raw.accessed.get(),
            file_attributes: raw.file_attributes.get(),
        })
    }
}

/// A decoded MFT record. Owns its 1024 (or so) byte buffer; attributes
/// are parsed lazily on every call rather than cached on the struct.
pub struct MftRecord {
    record_number: u64,
    sequence_number: u16,
    flags: u16,
    base_file_record_segment: MftReference,
    buffer: Vec<u8>,
    first_attribute_offset: u16,
    used_size: u32,
}

impl MftRecord {
    /// Applies the fixup, validates the magic, and parses the header.
    /// `buffer` must be exactly one MFT record in size.
    pub fn parse(record_number: u64, mut buffer: Vec<u8>) -> Result<Self> {
        fixup::apply(&mut buffer)?;
        let (header, _) =
            RecordHeader::ref_from_prefix(&buffer).map_err(|_| Error::InvalidRecord("record header truncated"))?;
        if &header.multi_sector.signature == b"BAAD" {
            return Err(Error::InvalidRecord("record marked BAAD"));
        }
        if &header.multi_sector.signature != b"FILE" {
            return Err(Error::InvalidRecord("bad MFT record magic"));
        }
        let first_attribute_offset = header.first_attribute_offset.get();
        let used_size = header.used_size.get();
        let sequence_number = header.sequence_number.get();
        let flags = header.flags.get();
        let base_file_record_segment = MftReference(header.base_file_record_segment.get());

        Ok(Self {
            record_number,
            sequence_number,
            flags,
            base_file_record_segment,
            buffer,
            first_attribute_offset,
            used_size,
        })
    }

    pub fn record_number(&self) -> u64 {
        self.record_number
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & FLAG_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn base_file_record_segment(&self) -> MftReference {
        self.base_file_record_segment
    }

    pub fn attributes(&self) -> AttributeIter<'_> {
        let start = self.first_attribute_offset as usize;
        let limit = (self.used_size as usize).saturating_sub(start);
        AttributeIter::new(&self.buffer[start.min(self.buffer.len())..], limit)
    }

    pub fn attribute(&self, type_code: u32) -> Result<Attribute> {
        for attribute in self.attributes() {
            let attribute = attribute?;
            if attribute.type_code == type_code {
                return Ok(attribute);
            }
        }
        Err(Error::AttributeNotFound)
    }

    /// The default, unnamed `$DATA` stream; named alternate data streams
    /// are out of scope.
    pub fn data_attribute(&self) -> Result<Attribute> {
        for attribute in self.attributes() {
            let attribute = attribute?;
            if attribute.type_code == attribute::TYPE_DATA && !attribute.is_named() {
                return Ok(attribute);
            }
        }
        Err(Error::AttributeNotFound)
    }

    pub fn standard_information(&self) -> Result<StandardInformation> {
        let attribute = self.attribute(attribute::TYPE_STANDARD_INFORMATION)?;
        match &attribute.value {
            AttributeValue::Resident(value) => StandardInformation::parse(value),
            AttributeValue::NonResident(_) => Err(Error::InvalidRecord("$STANDARD_INFORMATION is non-resident")),
        }
    }

    pub fn filename_informations(&self) -> Vec<FileNameInformation> {
        self.attributes()
            .filter_map(|a| a.ok())
            .filter(|a| a.type_code == attribute::TYPE_FILE_NAME)
            .filter_map(|a| match &a.value {
                AttributeValue::Resident(value) => parse_filename_information(value).ok(),
                AttributeValue::NonResident(_) => None,
            })
            .collect()
    }

    /// Picks one `$FILE_NAME` namespace to represent this record: Win32
    /// first, then POSIX, then DOS, then whatever is left.
    pub fn preferred_filename_information(&self) -> Result<FileNameInformation> {
        let infos = self.filename_informations();
        infos
            .iter()
            .find(|i| i.namespace == Namespace::Win32 || i.namespace == Namespace::Win32AndDos)
            .or_else(|| infos.iter().find(|i| i.namespace == Namespace::Posix))
            .or_else(|| infos.iter().find(|i| i.namespace == Namespace::Dos))
            .or_else(|| infos.first())
            .cloned()
            .ok_or(Error::NoParent("record has no $FILE_NAME attribute"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_resident_attribute(buf: &mut Vec<u8>, type_code: u32, value: &[u8]) {
        let header_len = 24; // common header (16) + resident header (8)
        let record_length = (header_len + value.len()).div_ceil(8) * 8;
        let start = buf.len();
        buf.resize(start + record_length, 0);
        buf[start..start + 4].copy_from_slice(&type_code.to_le_bytes());
        buf[start + 4..start + 8].copy_from_slice(&(record_length as u32).to_le_bytes());
        buf[start + 8] = 0; // resident
        buf[start + 16..start + 20].copy_from_slice(&(value.len() as u32).to_le_bytes());
        buf[start + 20..start + 22].copy_from_slice(&(header_len as u16).to_le_bytes());
        buf[start + header_len..start + header_len + value.len()].copy_from_slice(value);
    }

    fn build_record(flags: u16, attributes: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        buf[0..4].copy_from_slice(b"FILE");
        buf[4..6].copy_from_slice(&48u16.to_le_bytes()); // usa_offset
        buf[6..8].copy_from_slice(&1u16.to_le_bytes()); // usa_count: 1 -> no striped sectors
        buf[20..22].copy_from_slice(&56u16.to_le_bytes()); // first_attribute_offset
        buf[22..24].copy_from_slice(&flags.to_le_bytes());

        let mut attrs = Vec::new();
        attributes(&mut attrs);
        attrs.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        buf[24..28].copy_from_slice(&(56 + attrs.len() as u32).to_le_bytes()); // used_size
        buf[56..56 + attrs.len()].copy_from_slice(&attrs);
        buf
    }

    #[test]
    fn parses_header_flags() {
        let buf = build_record(FLAG_IN_USE | FLAG_DIRECTORY, |_| {});
        let record = MftRecord::parse(5, buf).unwrap();
        assert!(record.is_in_use());
        assert!(record.is_directory());
        assert_eq!(record.record_number(), 5);
    }

    #[test]
    fn reads_a_resident_data_attribute() {
        let buf = build_record(FLAG_IN_USE, |attrs| {
            push_resident_attribute(attrs, attribute::TYPE_DATA, b"hello world");
        });
        let record = MftRecord::parse(16, buf).unwrap();
        let attribute = record.data_attribute().unwrap();
        assert!(matches!(attribute.value, AttributeValue::Resident(v) if v == b"hello world"));
    }

    #[test]
    fn missing_attribute_is_not_found() {
        let buf = build_record(FLAG_IN_USE, |_| {});
        let record = MftRecord::parse(16, buf).unwrap();
        assert!(matches!(record.data_attribute(), Err(Error::AttributeNotFound)));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = build_record(FLAG_IN_USE, |_| {});
        buf[0..4].copy_from_slice(b"BAAD");
        assert!(matches!(MftRecord::parse(16, buf), Err(Error::InvalidRecord(_))));
    }
}
