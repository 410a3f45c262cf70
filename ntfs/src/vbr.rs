//! Volume Boot Record parsing.

use ntfs_err::{Error, Result};
use zerocopy::{little_endian::U16, little_endian::U32, little_endian::U64, FromBytes, Immutable, KnownLayout};

#[repr(C)]
#[derive(FromBytes, Immutable, KnownLayout)]
struct RawVbr {
    jump: [u8; 3],
    oem_id: [u8; 8],
    bytes_per_sector: U16,
    sectors_per_cluster: u8,
    reserved_sectors: U16,
    zero0: [u8; 5],
    media_descriptor: u8,
    zero1: U16,
    sectors_per_track: U16,
    number_of_heads: U16,
    hidden_sectors: U32,
    unused0: U32,
    unused1: U32,
    total_sectors: U64,
    mft_lcn: U64,
    mftmirr_lcn: U64,
    clusters_per_file_record_segment: i8,
    unused2: [u8; 3],
    clusters_per_index_buffer: i8,
    unused3: [u8; 3],
    volume_serial_number: U64,
    checksum: U32,
    bootstrap_code: [u8; 426],
    end_of_sector_marker: [u8; 2],
}

/// Decoded VBR fields this crate cares about. Everything else (boot
/// code, the sector checksum) is read and discarded.
pub struct Vbr {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mftmirr_lcn: u64,
    clusters_per_file_record_segment: i8,
    clusters_per_index_buffer: i8,
}

impl Vbr {
    /// Parses the first 512 bytes of a volume.
    pub fn parse(sector0: &[u8]) -> Result<Self> {
        let (raw, _) = RawVbr::ref_from_prefix(sector0).map_err(|_| Error::CorruptFilesystem("VBR sector truncated"))?;
        if &raw.oem_id[0..4] != b"NTFS" {
            return Err(Error::CorruptFilesystem("VBR OEM id is not NTFS"));
        }
        if raw.bytes_per_sector.get() == 0 || raw.sectors_per_cluster == 0 {
            return Err(Error::CorruptFilesystem("VBR geometry fields are zero"));
        }
        // A negative value encodes a record/block size of 2^|value| bytes;
        // magnitudes beyond 31 would overflow the u32 byte size these
        // fields are converted to below.
        if raw.clusters_per_file_record_segment < -31 || raw.clusters_per_index_buffer < -31 {
            return Err(Error::CorruptFilesystem("VBR record/index size field out of range"));
        }
        Ok(Self {
            bytes_per_sector: raw.bytes_per_sector.get(),
            sectors_per_cluster: raw.sectors_per_cluster,
            total_sectors: raw.total_sectors.get(),
            mft_lcn: raw.mft_lcn.get(),
            mftmirr_lcn: raw.mftmirr_lcn.get(),
            clusters_per_file_record_segment: raw.clusters_per_file_record_segment,
            clusters_per_index_buffer: raw.clusters_per_index_buffer,
        })
    }

    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// A positive value is a cluster count; a negative value `n` means
    /// `2^(-n)` bytes, used on volumes where a record is smaller than a
    /// cluster.
    pub fn mft_record_size(&self, cluster_size: u32) -> u32 {
        signed_cluster_count_to_bytes(self.clusters_per_file_record_segment, cluster_size)
    }

    pub fn index_block_size(&self, cluster_size: u32) -> u32 {
        signed_cluster_count_to_bytes(self.clusters_per_index_buffer, cluster_size)
    }
}

fn signed_cluster_count_to_bytes(value: i8, cluster_size: u32) -> u32 {
    if value > 0 {
        value as u32 * cluster_size
    } else {
        1u32 << (-(value as i32)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sector(oem_id: &[u8; 8]) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        sector[3..11].copy_from_slice(oem_id);
        sector[11..13].copy_from_slice(&512u16.to_le_bytes());
        sector[13] = 8; // sectors_per_cluster
        sector[0x30..0x38].copy_from_slice(&786432u64.to_le_bytes()); // mft_lcn
        sector[0x38..0x40].copy_from_slice(&2u64.to_le_bytes()); // mftmirr_lcn
        sector[0x40] = 0xF6; // -10 -> 1024-byte records
        sector[0x44] = 0x01; // 1 cluster per index buffer
        sector
    }

    #[test]
    fn parses_a_well_formed_vbr() {
        let vbr = Vbr::parse(&sample_sector(b"NTFS    ")).unwrap();
        assert_eq!(vbr.cluster_size(), 4096);
        assert_eq!(vbr.mft_record_size(4096), 1024);
        assert_eq!(vbr.index_block_size(4096), 4096);
    }

    #[test]
    fn rejects_an_out_of_range_record_size_field() {
        let mut sector = sample_sector(b"NTFS    ");
        sector[0x40] = i8::MIN as u8; // would overflow the 2^|n| conversion
        assert!(matches!(Vbr::parse(&sector), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn rejects_wrong_oem_id() {
        assert!(matches!(Vbr::parse(&sample_sector(b"FAT32   ")), Err(Error::CorruptFilesystem(_))));
    }
}
