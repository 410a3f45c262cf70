//! Cluster-granularity access to the underlying `DataStorage`.
//!
//! Everything above this layer addresses the volume in clusters (or in
//! byte ranges derived from clusters via a runlist); this is the one
//! place that turns a cluster index into a byte offset and issues the
//! actual read.

use ntfs_ds::DataStorage;
use ntfs_err::{Error, Result};

/// Stateless view over a volume's cluster geometry. Holds no storage
/// reference of its own; every method takes the `DataStorage` it should
/// read from, so a single accessor can serve several open handles.
pub struct ClusterAccessor {
    cluster_size: u32,
}

impl ClusterAccessor {
    pub fn new(cluster_size: u32) -> Result<Self> {
        if cluster_size == 0 {
            return Err(Error::CorruptFilesystem("cluster size is zero"));
        }
        Ok(Self { cluster_size })
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    /// Volume length in whole clusters. The volume length must be an
    /// exact multiple of the cluster size; a remainder means either the
    /// cluster size or the storage length was derived wrong upstream.
    pub fn cluster_count<DS: DataStorage>(&self, ds: &DS) -> Result<u64> {
        let len = ds.len();
        if len % self.cluster_size as u64 != 0 {
            return Err(Error::CorruptFilesystem("volume length is not a multiple of the cluster size"));
        }
        Ok(len / self.cluster_size as u64)
    }

    pub fn read<DS: DataStorage>(&self, ds: &DS, cluster: u64, buffer: &mut [u8]) -> Result<()> {
        self.read_range(ds, cluster, cluster + 1, buffer)
    }

    /// Reads the half-open cluster range `[start, end)` into `buffer`,
    /// which must be exactly `(end - start) * cluster_size` bytes.
    pub fn read_range<DS: DataStorage>(&self, ds: &DS, start: u64, end: u64, buffer: &mut [u8]) -> Result<()> {
        if end < start {
            return Err(Error::Overrun);
        }
        let cluster_size = self.cluster_size as u64;
        let byte_len = (end - start) * cluster_size;
        if buffer.len() as u64 != byte_len {
            return Err(Error::Overrun);
        }
        let byte_start = start * cluster_size;
        if byte_start.checked_add(byte_len).is_none_or(|e| e > ds.len()) {
            return Err(Error::Overrun);
        }
        ds.read(byte_start, buffer)
    }
}
