use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result of a capability call, before it is attributed to an operation.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Result of a filesystem or handle operation.
pub type Result<T> = std::result::Result<T, PathError>;

/// The kind of failure, independent of the operation that produced it.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FsError {
    /// The requested file or directory could not be found
    #[error("entry not found")]
    NotFound,
    /// An entry with that name already exists
    #[error("entry already exists")]
    AlreadyExists,
    /// A path component that had to be a directory was not one
    #[error("not a directory")]
    NotADirectory,
    /// The target is a directory but the operation needs a file
    #[error("is a directory")]
    IsADirectory,
    /// The name is empty, contains a separator or is too long
    #[error("invalid name")]
    NameInvalid,
    /// A child was created under something that isn't a directory
    #[error("parent is not a directory")]
    ParentNotDirectory,
    /// The capability is absent on this handle
    #[error("operation not supported")]
    Unsupported,
    /// The handle was already closed
    #[error("file already closed")]
    Closed,
    /// Two different objects were supplied for one capability
    #[error("conflicting trait")]
    ConflictingTrait,
    /// A trait or modifier name was not recognized
    #[error("unknown trait")]
    UnknownTrait,
    /// Negative or out-of-bounds seek, or an unknown origin
    #[error("invalid seek")]
    InvalidSeek,
    /// Read at or after the end of the content. Iterators treat this as
    /// normal termination.
    #[error("end of data")]
    EndOfData,
    /// Symlink resolution went deeper than the configured limit
    #[error("too many levels of symbolic links")]
    TooManySymlinks,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
    /// Caller was not allowed to perform this operation
    #[error("permission denied")]
    PermissionDenied,
    /// Something failed in the host filesystem
    #[error("io error")]
    IOError,
}

impl From<io::Error> for FsError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::NotADirectory => FsError::NotADirectory,
            io::ErrorKind::IsADirectory => FsError::IsADirectory,
            io::ErrorKind::InvalidInput => FsError::InvalidInput,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            io::ErrorKind::UnexpectedEof => FsError::EndOfData,
            io::ErrorKind::Unsupported => FsError::Unsupported,
            _ => FsError::IOError,
        }
    }
}

impl From<FsError> for io::ErrorKind {
    fn from(kind: FsError) -> Self {
        match kind {
            FsError::NotFound => io::ErrorKind::NotFound,
            FsError::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsError::NotADirectory | FsError::ParentNotDirectory => io::ErrorKind::NotADirectory,
            FsError::IsADirectory => io::ErrorKind::IsADirectory,
            FsError::Unsupported => io::ErrorKind::Unsupported,
            FsError::EndOfData => io::ErrorKind::UnexpectedEof,
            FsError::PermissionDenied => io::ErrorKind::PermissionDenied,
            FsError::NameInvalid
            | FsError::InvalidSeek
            | FsError::InvalidInput
            | FsError::ConflictingTrait
            | FsError::UnknownTrait => io::ErrorKind::InvalidInput,
            FsError::Closed | FsError::TooManySymlinks | FsError::IOError => io::ErrorKind::Other,
        }
    }
}

/// Operation identifiers, used to attribute errors and to match
/// injected failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    Open,
    Create,
    OpenFile,
    Mkdir,
    MkdirAll,
    Symlink,
    Readlink,
    Stat,
    Lstat,
    Chdir,
    Getwd,
    Chmod,
    Chown,
    ReadDir,
    Read,
    Write,
    ReadAt,
    WriteAt,
    Seek,
    SetLen,
    Close,
}

impl Op {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Op::Open => "open",
            Op::Create => "create",
            Op::OpenFile => "openfile",
            Op::Mkdir => "mkdir",
            Op::MkdirAll => "mkdirall",
            Op::Symlink => "symlink",
            Op::Readlink => "readlink",
            Op::Stat => "stat",
            Op::Lstat => "lstat",
            Op::Chdir => "chdir",
            Op::Getwd => "getwd",
            Op::Chmod => "chmod",
            Op::Chown => "chown",
            Op::ReadDir => "readdir",
            Op::Read => "read",
            Op::Write => "write",
            Op::ReadAt => "readat",
            Op::WriteAt => "writeat",
            Op::Seek => "seek",
            Op::SetLen => "truncate",
            Op::Close => "close",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`FsError`] attributed to the operation and the path it was
/// requested for.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{op} {}: {kind}", .path.display())]
pub struct PathError {
    pub op: Op,
    pub path: PathBuf,
    #[source]
    pub kind: FsError,
}

impl PathError {
    pub fn new(op: Op, path: impl Into<PathBuf>, kind: FsError) -> Self {
        Self {
            op,
            path: path.into(),
            kind,
        }
    }

    pub fn kind(&self) -> FsError {
        self.kind
    }

    /// `true` when the error only signals the end of a read or a listing.
    pub fn is_eof(&self) -> bool {
        self.kind == FsError::EndOfData
    }
}

impl From<PathError> for io::Error {
    fn from(err: PathError) -> Self {
        io::Error::new(err.kind.into(), err)
    }
}

/// Attaches an operation and a path to a bare [`FsError`].
pub trait ResultExt<T> {
    fn with_path(self, op: Op, path: &Path) -> Result<T>;
}

impl<T> ResultExt<T> for FsResult<T> {
    fn with_path(self, op: Op, path: &Path) -> Result<T> {
        self.map_err(|kind| PathError::new(op, path, kind))
    }
}
