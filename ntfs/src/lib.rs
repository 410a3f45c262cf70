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

//! Read-only NTFS interpreter: VBR, MFT bootstrap, attribute and
//! runlist decoding, and directory index resolution, with no
//! dependency on a particular operating system's filesystem layer.
//!
//! Writing, `$LogFile` replay, compression/`$EFS`, alternate data
//! streams other than the unnamed `$DATA`, security descriptors, and
//! reparse point following are all out of scope; see [`FileSystem`]
//! for what is in scope.

mod attribute;
mod cluster;
mod entry;
mod filesystem;
mod fixup;
mod index;
mod inode;
mod mft;
mod nonresident;
mod record;
mod runlist;
mod timestamp;
mod vbr;

pub use entry::Entry;
pub use filesystem::{FileSystem, OpenOptions};
pub use record::{FileNameInformation, MftReference, MftRecord, Namespace, StandardInformation};

pub use ntfs_err::{Error, Result};
