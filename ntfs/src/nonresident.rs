//! Byte-stream view over a non-resident attribute's runlist.

use ntfs_ds::DataStorage;
use ntfs_err::{Error, Result};

use crate::cluster::ClusterAccessor;
use crate::runlist::Run;

/// Presents a runlist as one contiguous, seekable byte stream, filling
/// sparse runs with zeros. Holds no storage reference; `slice`/`read_byte`
/// take the `DataStorage` and `ClusterAccessor` to read through.
#[derive(Clone)]
pub struct NonResidentView {
    runs: Vec<Run>,
    cluster_size: u32,
    len: u64,
}

impl NonResidentView {
    pub fn new(runs: Vec<Run>, cluster_size: u32) -> Self {
        let len = runs.iter().map(|r| r.length * cluster_size as u64).sum();
        Self { runs, cluster_size, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_byte<DS: DataStorage>(&self, ds: &DS, accessor: &ClusterAccessor, index: u64) -> Result<u8> {
        Ok(self.slice(ds, accessor, index, index + 1)?[0])
    }

    /// Reads the half-open byte range `[start, stop)`, accumulating runs
    /// that span it into one contiguous buffer.
    pub fn slice<DS: DataStorage>(&self, ds: &DS, accessor: &ClusterAccessor, start: u64, stop: u64) -> Result<Vec<u8>> {
        if start > stop || stop > self.len {
            return Err(Error::Overrun);
        }
        let cluster_size = self.cluster_size as u64;
        let mut out = Vec::with_capacity((stop - start) as usize);
        let mut run_start_byte = 0u64;

        for run in &self.runs {
            let run_end_byte = run_start_byte + run.length * cluster_size;
            if stop <= run_start_byte {
                break;
            }
            if start < run_end_byte {
                let seg_start = start.max(run_start_byte);
                let seg_stop = stop.min(run_end_byte);
                if run.sparse {
                    out.resize(out.len() + (seg_stop - seg_start) as usize, 0);
                } else {
                    let rel_start = seg_start - run_start_byte;
                    let rel_stop = seg_stop - run_start_byte;
                    let cluster_off_start = rel_start / cluster_size;
                    let cluster_off_end = rel_stop.div_ceil(cluster_size);
                    let cluster_start = (run.lcn as u64).wrapping_add(cluster_off_start);
                    let cluster_end = (run.lcn as u64).wrapping_add(cluster_off_end);

                    let mut buf = vec![0u8; ((cluster_end - cluster_start) * cluster_size) as usize];
                    accessor.read_range(ds, cluster_start, cluster_end, &mut buf)?;

                    let trim_start = (rel_start - cluster_off_start * cluster_size) as usize;
                    let trim_len = (seg_stop - seg_start) as usize;
                    out.extend_from_slice(&buf[trim_start..trim_start + trim_len]);
                }
            }
            run_start_byte = run_end_byte;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemStorage(Vec<u8>);
    impl DataStorage for MemStorage {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }
        fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            buffer.copy_from_slice(&self.0[start..start + buffer.len()]);
            Ok(())
        }
        fn write(&self, _offset: u64, _buffer: &[u8]) -> Result<()> {
            unimplemented!()
        }
    }

    fn storage_with_cluster_markers(cluster_count: u64, cluster_size: u64) -> MemStorage {
        let mut data = vec![0u8; (cluster_count * cluster_size) as usize];
        for c in 0..cluster_count {
            data[(c * cluster_size) as usize] = c as u8;
        }
        MemStorage(data)
    }

    #[test]
    fn slices_across_two_runs() {
        let ds = storage_with_cluster_markers(8, 4);
        let accessor = ClusterAccessor::new(4).unwrap();
        let runs = vec![Run { lcn: 0, length: 2, sparse: false }, Run { lcn: 4, length: 2, sparse: false }];
        let view = NonResidentView::new(runs, 4);
        assert_eq!(view.len(), 16);
        // crosses the run boundary at byte 8
        let data = view.slice(&ds, &accessor, 6, 10).unwrap();
        assert_eq!(data, vec![0, 0, 4, 0]);
    }

    #[test]
    fn sparse_run_reads_as_zero() {
        let ds = storage_with_cluster_markers(4, 4);
        let accessor = ClusterAccessor::new(4).unwrap();
        let runs = vec![
            Run { lcn: 0, length: 1, sparse: false },
            Run { lcn: 0, length: 1, sparse: true },
            Run { lcn: 1, length: 1, sparse: false },
        ];
        let view = NonResidentView::new(runs, 4);
        let data = view.slice(&ds, &accessor, 0, 12).unwrap();
        assert_eq!(&data[0..4], &[0, 0, 0, 0]);
        assert_eq!(&data[4..8], &[0, 0, 0, 0]);
        assert_eq!(&data[8..12], &[1, 0, 0, 0]);
    }

    #[test]
    fn overrun_past_total_length() {
        let ds = storage_with_cluster_markers(1, 4);
        let accessor = ClusterAccessor::new(4).unwrap();
        let view = NonResidentView::new(vec![Run { lcn: 0, length: 1, sparse: false }], 4);
        assert!(matches!(view.slice(&ds, &accessor, 0, 5), Err(Error::Overrun)));
    }
}
