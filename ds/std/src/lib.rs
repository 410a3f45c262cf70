// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs::File,
    os::unix::fs::FileExt,
    path::Path,
};

use log::debug;
use memmap2::Mmap;
use ntfs_ds::{DataStorage, Result};

/// `DataStorage` backed by plain positioned reads/writes on a `File`.
///
/// Works on block devices as well as regular files, at the cost of a
/// user/kernel copy per access.
pub struct FileDataStorage {
    file: File,
    len: u64,
}

impl FileDataStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        debug!("opened {} ({len} bytes) for positioned I/O", path.as_ref().display());
        Ok(Self { file, len })
    }
}

impl DataStorage for FileDataStorage {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(buffer, offset)?;
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        self.file.write_all_at(buffer, offset)?;
        Ok(())
    }
}

/// `DataStorage` backed by a read-only memory mapping of an image file.
///
/// Preferred over `FileDataStorage` for volume images: the interpreter
/// walks the MFT and directory indices with many small, scattered reads,
/// and mmap turns those into page-cache hits with no syscall per access.
///
/// # Safety
///
/// Safe as long as nothing else modifies the backing file while the
/// mapping is alive; this crate never writes through the mapping itself
/// (`write` always returns `Io`/`PermissionDenied`, matching the core's
/// read-only scope).
pub struct MmapDataStorage {
    mmap: Mmap,
}

impl MmapDataStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: caller guarantees the file is not modified for the
        // lifetime of this mapping; see struct docs.
        let mmap = unsafe { Mmap::map(&file) }?;
        debug!("mapped {} ({} bytes)", path.as_ref().display(), mmap.len());
        Ok(Self { mmap })
    }
}

impl DataStorage for MmapDataStorage {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        if end > self.mmap.len() {
            return Err(ntfs_err::Error::Overrun);
        }
        buffer.copy_from_slice(&self.mmap[start..end]);
        Ok(())
    }

    fn write(&self, _offset: u64, _buffer: &[u8]) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mapping is read-only").into())
    }
}
