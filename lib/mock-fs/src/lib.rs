//! A filesystem test double.
//!
//! [`mem_fs::FileSystem`] keeps a tree of directories, regular files and
//! symlinks in memory and exposes it through the [`FileSystem`] trait, the
//! same surface [`host_fs::FileSystem`] provides over the real disk. Open
//! files are [`VirtualFile`]s whose supported operations are assembled from
//! capability objects (see [`mem_fs::capability`]), so tests can hand out
//! files that are read-only, unseekable, or backed by their own readers.
//!
//! A [`FailureInjector`] can be installed to make any call fail on demand.
//!
//! ```
//! use mock_fs::{mem_fs, FileSystem, VirtualFile};
//! use std::path::Path;
//!
//! let fs = mem_fs::FileSystem::default();
//! fs.mkdir(Path::new("/data"), 0o755).unwrap();
//!
//! let mut file = fs.create(Path::new("/data/hello.txt")).unwrap();
//! file.write(b"hello").unwrap();
//! file.close().unwrap();
//!
//! assert_eq!(fs.stat(Path::new("/data/hello.txt")).unwrap().len(), 5);
//! ```

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

pub mod config;
mod error;
pub mod fault;
#[cfg(all(unix, feature = "host-fs"))]
pub mod host_fs;
pub mod mem_fs;
pub mod ops;

pub use config::Config;
pub use error::{FsError, FsResult, Op, PathError, Result, ResultExt};
pub use fault::{Arg, Call, FailureInjector, FailurePlan};
pub use mem_fs::capability::{
    Capability, Closer, DirReader, Modifiers, Reader, ReaderAt, Seeker, Sizer, TraitSet, Writer,
    WriterAt,
};
pub use mem_fs::ContentStore;

/// The operation set shared by the in-memory and the host filesystem.
pub trait FileSystem: fmt::Debug + Send + Sync {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;
    /// Creates `path` and any missing parents. Existing directories along
    /// the way are fine.
    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()>;
    /// Creates `link` pointing at `target`. The target is stored as given
    /// and does not have to exist.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    /// The literal target of the symlink at `path`, one level only.
    fn read_link(&self, path: &Path) -> Result<PathBuf>;
    /// Metadata of `path`, following symlinks.
    fn stat(&self, path: &Path) -> Result<Metadata>;
    /// Metadata of `path` itself, even if it is a symlink.
    fn lstat(&self, path: &Path) -> Result<Metadata>;
    fn chdir(&self, path: &Path) -> Result<()>;
    fn getwd(&self) -> Result<PathBuf>;
    fn chmod(&self, path: &Path, mode: u32) -> Result<()>;
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;
    /// Every entry of the directory at `path`, sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    fn new_open_options(&self) -> OpenOptions<'_>;

    /// Opens an existing entry for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn VirtualFile + Send + Sync>> {
        self.new_open_options()
            .read(true)
            .with_op(Op::Open)
            .open(path)
    }

    /// Creates or truncates a regular file and opens it for reading and
    /// writing.
    fn create(&self, path: &Path) -> Result<Box<dyn VirtualFile + Send + Sync>> {
        self.new_open_options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .with_op(Op::Create)
            .open(path)
    }

    fn open_file(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn VirtualFile + Send + Sync>> {
        self.new_open_options()
            .flags(flags)
            .mode(mode)
            .with_op(Op::OpenFile)
            .open(path)
    }
}

pub trait FileOpener {
    fn open(
        &self,
        path: &Path,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync>>;
}

#[derive(Debug, Clone)]
pub struct OpenOptionsConfig {
    read: bool,
    write: bool,
    create_new: bool,
    create: bool,
    append: bool,
    truncate: bool,
    mode: Option<u32>,
    traits: TraitSet,
    op: Op,
}

impl OpenOptionsConfig {
    pub const fn read(&self) -> bool {
        self.read
    }

    pub const fn write(&self) -> bool {
        self.write
    }

    pub const fn create_new(&self) -> bool {
        self.create_new
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    pub const fn append(&self) -> bool {
        self.append
    }

    pub const fn truncate(&self) -> bool {
        self.truncate
    }

    pub const fn mode(&self) -> Option<u32> {
        self.mode
    }

    /// Capability objects supplied for this open only.
    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    /// The operation errors from this open are attributed to.
    pub const fn op(&self) -> Op {
        self.op
    }

    /// Whether the open may change the contents of an existing entry.
    /// Creating a missing entry doesn't count.
    pub const fn would_mutate(&self) -> bool {
        self.write || self.append || self.truncate
    }
}

pub struct OpenOptions<'a> {
    opener: &'a dyn FileOpener,
    conf: OpenOptionsConfig,
}

impl fmt::Debug for OpenOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("conf", &self.conf)
            .finish_non_exhaustive()
    }
}

impl<'a> OpenOptions<'a> {
    pub fn new(opener: &'a dyn FileOpener) -> Self {
        Self {
            opener,
            conf: OpenOptionsConfig {
                read: false,
                write: false,
                create_new: false,
                create: false,
                append: false,
                truncate: false,
                mode: None,
                traits: TraitSet::default(),
                op: Op::Open,
            },
        }
    }

    pub fn get_config(&self) -> OpenOptionsConfig {
        self.conf.clone()
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.conf.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.conf.write = write;
        self
    }

    pub fn append(&mut self, append: bool) -> &mut Self {
        self.conf.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.conf.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.conf.create = create;
        self
    }

    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.conf.create_new = create_new;
        self
    }

    /// Permission bits for a file created by this open.
    pub fn mode(&mut self, mode: u32) -> &mut Self {
        self.conf.mode = Some(mode);
        self
    }

    /// Extra capability objects for this open. They are merged into the
    /// entry's own bundle for the returned handle only.
    pub fn traits(&mut self, traits: TraitSet) -> &mut Self {
        self.conf.traits = std::mem::take(&mut self.conf.traits).merge(traits);
        self
    }

    /// Sets everything `flags` describes.
    pub fn flags(&mut self, flags: OpenFlags) -> &mut Self {
        self.conf.read = flags.contains(OpenFlags::READ);
        self.conf.write = flags.intersects(OpenFlags::WRITE | OpenFlags::APPEND);
        self.conf.append = flags.contains(OpenFlags::APPEND);
        self.conf.truncate = flags.contains(OpenFlags::TRUNC);
        self.conf.create = flags.contains(OpenFlags::CREATE);
        self.conf.create_new = flags.contains(OpenFlags::CREATE | OpenFlags::EXCL);
        self
    }

    pub(crate) fn with_op(&mut self, op: Op) -> &mut Self {
        self.conf.op = op;
        self
    }

    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<Box<dyn VirtualFile + Send + Sync>> {
        self.opener.open(path.as_ref(), &self.conf)
    }
}

bitflags! {
    /// Flags accepted by [`FileSystem::open_file`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Writes go to the end of the file. Implies `WRITE`.
        const APPEND = 1 << 2;
        /// Create the file if it doesn't exist.
        const CREATE = 1 << 3;
        /// Together with `CREATE`, fail if the file already exists.
        const EXCL = 1 << 4;
        const TRUNC = 1 << 5;
    }
}

/// An open file or directory.
///
/// Once [`VirtualFile::close`] succeeded every method fails with
/// [`FsError::Closed`], except [`VirtualFile::name`].
pub trait VirtualFile: fmt::Debug {
    /// The path this handle was opened with.
    fn name(&self) -> &Path;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    /// Up to `n` directory entries sorted by name, or all remaining ones
    /// when `n <= 0`. See [`mem_fs::DirCursor`] for the exhaustion rules.
    fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry>>;

    fn stat(&self) -> Result<Metadata>;

    /// Change the size of the file, if the `len` is greater than the current size
    /// the extra bytes will be allocated and zeroed
    fn set_len(&mut self, len: u64) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Indicates if the file is opened or closed.
    fn is_open(&self) -> bool {
        true
    }
}

impl io::Read for dyn VirtualFile + Send + Sync {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match VirtualFile::read(self, buf) {
            Ok(read) => Ok(read),
            Err(err) if err.is_eof() => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl io::Write for dyn VirtualFile + Send + Sync {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        VirtualFile::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Seeks follow [`VirtualFile::seek`]: the target must lie inside the
/// content, with offset 0 the only exception. `SeekFrom::End(0)` and
/// `stream_position()` therefore fail with `InvalidInput` on a non-empty
/// file whose cursor sits at the end, e.g. right after writing.
impl io::Seek for dyn VirtualFile + Send + Sync {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(offset) => (
                i64::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                Whence::Start,
            ),
            io::SeekFrom::Current(offset) => (offset, Whence::Current),
            io::SeekFrom::End(offset) => (offset, Whence::End),
        };
        VirtualFile::seek(self, offset, whence).map_err(Into::into)
    }
}

/// Origin of a seek.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Whence {
    Start,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = FsError;

    fn try_from(whence: i32) -> FsResult<Self> {
        match whence {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => Err(FsError::InvalidSeek),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    pub ft: FileType,
    /// Permission bits. Stored, never enforced.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub len: u64,
    /// Last modification, in nanoseconds since the UNIX epoch.
    pub modified: u64,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.ft.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.ft.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.ft.is_symlink()
    }

    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn file_type(&self) -> FileType {
        self.ft
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileType {
    pub dir: bool,
    pub file: bool,
    pub symlink: bool,
}

impl FileType {
    pub fn new_dir() -> Self {
        Self {
            dir: true,
            ..Default::default()
        }
    }

    pub fn new_file() -> Self {
        Self {
            file: true,
            ..Default::default()
        }
    }

    pub fn new_symlink() -> Self {
        Self {
            symlink: true,
            ..Default::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.dir
    }
    pub fn is_file(&self) -> bool {
        self.file
    }
    pub fn is_symlink(&self) -> bool {
        self.symlink
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// The full path of the entry.
    pub path: PathBuf,
    pub metadata: FsResult<Metadata>,
}

impl DirEntry {
    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }

    pub fn metadata(&self) -> FsResult<Metadata> {
        self.metadata
    }

    pub fn file_type(&self) -> FsResult<FileType> {
        let metadata = self.metadata?;
        Ok(metadata.file_type())
    }

    pub fn file_name(&self) -> OsString {
        self.path
            .file_name()
            .unwrap_or(self.path.as_os_str())
            .to_owned()
    }
}
