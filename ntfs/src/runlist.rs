//! Mapping pairs ("runlist") decoding for non-resident attributes.
//!
//! A runlist is a sequence of variable-width (length, lcn-delta) pairs,
//! terminated by a zero header byte. Each pair describes a run of
//! consecutive clusters; the lcn is stored as a signed delta from the
//! previous run's lcn so that nearby runs encode to a handful of bytes.
//! A delta byte count of zero marks a sparse run: no clusters are
//! allocated for it and reads should be zero-filled.

use ntfs_err::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Absolute logical cluster number. Meaningless when `sparse`.
    pub lcn: i64,
    pub length: u64,
    pub sparse: bool,
}

/// Decodes a mapping pairs byte stream up to (and including) its
/// terminating zero byte.
pub fn decode(bytes: &[u8]) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut prev_lcn: i64 = 0;

    loop {
        let Some(&header) = bytes.get(pos) else {
            return Err(Error::CorruptFilesystem("runlist not terminated"));
        };
        pos += 1;
        if header == 0 {
            break;
        }

        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if pos + length_size + offset_size > bytes.len() {
            return Err(Error::CorruptFilesystem("runlist entry truncated"));
        }

        let length = read_uint(&bytes[pos..pos + length_size]);
        pos += length_size;
        if length == 0 {
            return Err(Error::CorruptFilesystem("runlist run length is zero"));
        }

        if offset_size == 0 {
            runs.push(Run { lcn: 0, length, sparse: true });
        } else {
            let delta = read_int(&bytes[pos..pos + offset_size]);
            pos += offset_size;
            let lcn = prev_lcn + delta;
            prev_lcn = lcn;
            runs.push(Run { lcn, length, sparse: false });
        }
    }

    Ok(runs)
}

fn read_uint(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as u64) << (i * 8);
    }
    value
}

fn read_int(bytes: &[u8]) -> i64 {
    let mut value = read_uint(bytes) as i64;
    if let Some(&last) = bytes.last() {
        if last & 0x80 != 0 && bytes.len() < 8 {
            value -= 1i64 << (bytes.len() * 8);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_run() {
        // header 0x21: length field 1 byte, offset field 2 bytes.
        let bytes = [0x21, 0x0A, 0x04, 0x00, 0x00];
        let runs = decode(&bytes).unwrap();
        assert_eq!(runs, vec![Run { lcn: 4, length: 10, sparse: false }]);
    }

    #[test]
    fn decodes_back_to_back_runs_with_negative_delta() {
        // Run A at lcn 100 len 5, then run B length 3 delta -20 -> lcn 80.
        let bytes = [0x21, 0x05, 0x64, 0x00, 0x21, 0x03, 0xEC, 0xFF, 0x00];
        let runs = decode(&bytes).unwrap();
        assert_eq!(runs[0], Run { lcn: 100, length: 5, sparse: false });
        assert_eq!(runs[1], Run { lcn: 80, length: 3, sparse: false });
    }

    #[test]
    fn decodes_a_sparse_run_in_the_middle() {
        // (10,1) normal, (_,1) sparse, (30,1) normal via delta +20.
        let bytes = [0x11, 0x01, 0x0A, 0x01, 0x01, 0x11, 0x01, 0x14, 0x00];
        let runs = decode(&bytes).unwrap();
        assert_eq!(runs[0], Run { lcn: 10, length: 1, sparse: false });
        assert_eq!(runs[1], Run { lcn: 0, length: 1, sparse: true });
        assert_eq!(runs[2], Run { lcn: 30, length: 1, sparse: false });
    }

    #[test]
    fn rejects_unterminated_runlist() {
        let bytes = [0x21, 0x05, 0x64];
        assert!(matches!(decode(&bytes), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn rejects_zero_length_run() {
        let bytes = [0x21, 0x00, 0x64, 0x00, 0x00];
        assert!(matches!(decode(&bytes), Err(Error::CorruptFilesystem(_))));
    }
}
