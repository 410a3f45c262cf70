//! Error taxonomy shared by the `ds` and `ntfs` crates.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// VBR signature wrong, both MFT and MFTMirr unreadable, or a cycle in
    /// the parent chain.
    #[error("corrupt filesystem: {0}")]
    CorruptFilesystem(&'static str),
    /// Read past the end of a buffer or a non-resident data view.
    #[error("read past end of buffer")]
    Overrun,
    /// MFT record magic was not "FILE", or its fixup didn't verify.
    #[error("invalid MFT record: {0}")]
    InvalidRecord(&'static str),
    /// The queried attribute type is absent from the record.
    #[error("attribute not found")]
    AttributeNotFound,
    /// Record is the root, has no $FILE_NAME, or its parent reference is
    /// stale.
    #[error("no parent: {0}")]
    NoParent(&'static str),
    /// No child of a directory matches the requested name in any namespace.
    #[error("child not found")]
    ChildNotFound,
    /// A path mixed `/` and `\` separators.
    #[error("unsupported path")]
    UnsupportedPath,
    /// A path component resolved to a file where a directory was required.
    #[error("directory does not exist")]
    DirectoryDoesNotExist,
    /// Propagated I/O failure from the underlying `DataStorage`.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
