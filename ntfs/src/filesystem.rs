//! Filesystem facade: bootstrap, and the low-level operations `Entry`
//! is built on top of.

use std::sync::Arc;

use log::warn;
use ntfs_ds::DataStorage;
use ntfs_err::{Error, Result};

use crate::attribute::AttributeValue;
use crate::cluster::ClusterAccessor;
use crate::entry::Entry;
use crate::index;
use crate::inode;
use crate::mft::MftEnumerator;
use crate::nonresident::NonResidentView;
use crate::record::MftRecord;
use crate::runlist::Run;
use crate::vbr::Vbr;

/// Tunables for opening a volume. All fields are optional overrides;
/// `Default` defers entirely to what the VBR reports.
#[derive(Default, Clone, Copy)]
pub struct OpenOptions {
    /// Force a cluster size instead of trusting `bytes_per_sector *
    /// sectors_per_cluster` from the VBR. Mainly useful against images
    /// with a VBR that lies about its own geometry.
    pub cluster_size_override: Option<u32>,
}

pub struct FileSystem<DS: DataStorage> {
    data_storage: DS,
    cluster_accessor: ClusterAccessor,
    mft: MftEnumerator,
    mft_record_size: u32,
}

impl<DS: DataStorage> FileSystem<DS> {
    pub fn open(data_storage: DS, options: OpenOptions) -> Result<Self> {
        let mut sector0 = [0u8; 512];
        data_storage.read(0, &mut sector0)?;
        let vbr = Vbr::parse(&sector0)?;

        let cluster_size = options.cluster_size_override.unwrap_or_else(|| vbr.cluster_size());
        let cluster_accessor = ClusterAccessor::new(cluster_size)?;
        let mft_record_size = vbr.mft_record_size(cluster_size);

        let mft_view = match Self::bootstrap_mft(&data_storage, &cluster_accessor, &vbr, mft_record_size) {
            Ok(view) => view,
            Err(e) => {
                warn!("primary $MFT unreadable ({e}), falling back to $MFTMirr");
                Self::bootstrap_mftmirr(&cluster_accessor, &vbr, mft_record_size)?
            }
        };

        let mft = MftEnumerator::new(mft_view, mft_record_size);
        mft.get_record(&data_storage, &cluster_accessor, inode::FIRST_USER)
            .map_err(|_| Error::CorruptFilesystem("first user record unreadable"))?;

        Ok(Self { data_storage, cluster_accessor, mft, mft_record_size })
    }

    fn bootstrap_mft(ds: &DS, accessor: &ClusterAccessor, vbr: &Vbr, record_size: u32) -> Result<NonResidentView> {
        let clusters = (record_size as u64).div_ceil(accessor.cluster_size() as u64);
        let mut buf = vec![0u8; (clusters * accessor.cluster_size() as u64) as usize];
        accessor.read_range(ds, vbr.mft_lcn, vbr.mft_lcn + clusters, &mut buf)?;
        buf.truncate(record_size as usize);

        let record0 = MftRecord::parse(inode::MFT, buf)?;
        let data_attribute = record0.data_attribute()?;
        let AttributeValue::NonResident(nonresident) = data_attribute.value else {
            return Err(Error::CorruptFilesystem("$MFT's $DATA must be non-resident"));
        };

        let view = NonResidentView::new(nonresident.runlist, accessor.cluster_size());
        let last = view.len().checked_sub(1).ok_or(Error::CorruptFilesystem("$MFT is empty"))?;
        view.slice(ds, accessor, last, last + 1)?; // force the whole runlist to resolve
        Ok(view)
    }

    /// `$MFTMirr` holds a raw backup of the first four MFT records at a
    /// fixed cluster, with no attribute indirection of its own; read it
    /// directly rather than through a `$DATA` runlist that may itself be
    /// unreadable.
    fn bootstrap_mftmirr(accessor: &ClusterAccessor, vbr: &Vbr, record_size: u32) -> Result<NonResidentView> {
        let clusters = (record_size as u64 * 4).div_ceil(accessor.cluster_size() as u64);
        let runs = vec![Run { lcn: vbr.mftmirr_lcn as i64, length: clusters, sparse: false }];
        Ok(NonResidentView::new(runs, accessor.cluster_size()))
    }

    pub(crate) fn data_storage(&self) -> &DS {
        &self.data_storage
    }

    pub(crate) fn cluster_accessor(&self) -> &ClusterAccessor {
        &self.cluster_accessor
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_accessor.cluster_size()
    }

    pub fn mft_record_size(&self) -> u32 {
        self.mft_record_size
    }

    pub fn root(&self) -> Result<Entry<'_, DS>> {
        let record = self.record(inode::ROOT)?;
        Ok(Entry::new(self, record))
    }

    pub fn record(&self, record_number: u64) -> Result<Arc<MftRecord>> {
        self.mft.get_record(&self.data_storage, &self.cluster_accessor, record_number)
    }

    pub fn entry(&self, record: Arc<MftRecord>) -> Entry<'_, DS> {
        Entry::new(self, record)
    }

    pub(crate) fn parent(&self, record: &MftRecord) -> Result<Arc<MftRecord>> {
        if record.record_number() == inode::ROOT {
            return Err(Error::NoParent("root has no parent"));
        }
        let fn_info = record.preferred_filename_information()?;
        let parent = self.record(fn_info.parent_reference.record_number())?;
        if parent.sequence_number() != fn_info.parent_reference.sequence() {
            return Err(Error::NoParent("parent reference is stale"));
        }
        Ok(parent)
    }

    pub(crate) fn children(&self, record: &MftRecord) -> Result<Vec<Arc<MftRecord>>> {
        index::children(&self.data_storage, &self.cluster_accessor, &self.mft, record)
    }

    pub(crate) fn path(&self, record: &MftRecord) -> Result<String> {
        self.mft.get_path(&self.data_storage, &self.cluster_accessor, record)
    }

    /// Every in-use record from record 16 onward, skipping ones that
    /// fail to decode.
    pub fn enumerate(&self) -> impl Iterator<Item = Entry<'_, DS>> {
        self.mft.enumerate(&self.data_storage, &self.cluster_accessor).map(move |r| Entry::new(self, r))
    }
}
