//! Update sequence array handling ("fixup").
//!
//! MFT records and index allocation blocks both begin with the same
//! multi-sector header: a 4-byte signature, an offset to the update
//! sequence array and the array's element count. NTFS stripes the last
//! two bytes of every on-disk 512-byte sector with a copy of the array's
//! first entry so a torn multi-sector write is detectable; reading a
//! record means undoing that before touching anything past the header.

use ntfs_err::{Error, Result};

/// Sectors are fixed at 512 bytes for the purpose of the update sequence
/// array, independent of the volume's actual physical sector size.
const SECTOR_STRIDE: usize = 512;

#[repr(C)]
#[derive(zerocopy::FromBytes, zerocopy::Immutable, zerocopy::KnownLayout)]
pub struct MultiSectorHeader {
    pub signature: [u8; 4],
    pub usa_offset: zerocopy::little_endian::U16,
    pub usa_count: zerocopy::little_endian::U16,
}

/// Applies the update sequence array in place, replacing each sector's
/// striped tail with its real bytes. Fails if a sector's striped tail
/// doesn't match the array's signature entry, which means the record was
/// only partially written.
pub fn apply(buffer: &mut [u8]) -> Result<()> {
    if buffer.len() < 8 {
        return Err(Error::InvalidRecord("buffer too small for multi-sector header"));
    }
    let usa_offset = u16::from_le_bytes([buffer[4], buffer[5]]) as usize;
    let usa_count = u16::from_le_bytes([buffer[6], buffer[7]]) as usize;
    if usa_count == 0 {
        return Ok(());
    }
    if usa_offset.checked_add(usa_count * 2).is_none_or(|end| end > buffer.len()) {
        return Err(Error::InvalidRecord("update sequence array out of range"));
    }

    let signature = [buffer[usa_offset], buffer[usa_offset + 1]];
    for i in 0..usa_count - 1 {
        let sector_tail = (i + 1) * SECTOR_STRIDE;
        if sector_tail > buffer.len() {
            break;
        }
        let tail = sector_tail - 2;
        if buffer[tail] != signature[0] || buffer[tail + 1] != signature[1] {
            return Err(Error::InvalidRecord("fixup signature mismatch, torn write"));
        }
        let entry = usa_offset + (i + 1) * 2;
        buffer[tail] = buffer[entry];
        buffer[tail + 1] = buffer[entry + 1];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_record(sectors: usize, signature: [u8; 2], originals: &[[u8; 2]]) -> Vec<u8> {
        let usa_offset = 48u16;
        let usa_count = (sectors + 1) as u16;
        let mut buf = vec![0u8; sectors * SECTOR_STRIDE];
        buf[0..4].copy_from_slice(b"FILE");
        buf[4..6].copy_from_slice(&usa_offset.to_le_bytes());
        buf[6..8].copy_from_slice(&usa_count.to_le_bytes());
        let usa_offset = usa_offset as usize;
        buf[usa_offset..usa_offset + 2].copy_from_slice(&signature);
        for (i, original) in originals.iter().enumerate() {
            let entry = usa_offset + 2 + i * 2;
            buf[entry..entry + 2].copy_from_slice(original);
            let tail = (i + 1) * SECTOR_STRIDE - 2;
            buf[tail..tail + 2].copy_from_slice(&signature);
        }
        buf
    }

    #[test]
    fn restores_striped_tails() {
        let mut buf = build_record(2, [0xAB, 0xCD], &[[1, 2], [3, 4]]);
        apply(&mut buf).unwrap();
        assert_eq!(&buf[510..512], &[1, 2]);
        assert_eq!(&buf[1022..1024], &[3, 4]);
    }

    #[test]
    fn rejects_torn_write() {
        let mut buf = build_record(2, [0xAB, 0xCD], &[[1, 2], [3, 4]]);
        buf[510] = 0x00;
        assert!(matches!(apply(&mut buf), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn decode_is_deterministic() {
        let original = build_record(2, [0xAB, 0xCD], &[[1, 2], [3, 4]]);
        let mut a = original.clone();
        let mut b = original;
        apply(&mut a).unwrap();
        apply(&mut b).unwrap();
        assert_eq!(a, b);
    }
}
