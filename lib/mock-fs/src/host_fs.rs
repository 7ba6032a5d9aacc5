//! The [`crate::FileSystem`] operations against the real disk.
//!
//! Everything happens below a host directory chosen at construction, which
//! plays the role of `/`. The working directory is virtual and shared by
//! all clones. Paths are normalized lexically before they reach the host,
//! so `..` never climbs out of the root; symlink targets on the other hand
//! are handed to the host verbatim.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use tracing::debug;

use crate::mem_fs::capability::seek_within;
use crate::mem_fs::DirCursor;
use crate::{
    DirEntry, FileOpener, FileType, FsError, FsResult, Metadata, Op, OpenOptions,
    OpenOptionsConfig, PathError, Result, ResultExt, VirtualFile, Whence,
};

#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
    cwd: Arc<Mutex<PathBuf>>,
}

impl FileSystem {
    /// A filesystem whose `/` is the host directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cwd: Arc::new(Mutex::new(PathBuf::from("/"))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The absolute, normalized form of `path` inside this filesystem.
    fn virtual_path(&self, path: &Path) -> FsResult<PathBuf> {
        if path.as_os_str().is_empty() {
            return Err(FsError::NotFound);
        }

        let mut resolved = if path.is_absolute() {
            PathBuf::from("/")
        } else {
            self.cwd.lock().clone()
        };
        for component in path.components() {
            match component {
                Component::RootDir => resolved = PathBuf::from("/"),
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(name) => resolved.push(name),
                Component::Prefix(_) => return Err(FsError::InvalidInput),
            }
        }
        Ok(resolved)
    }

    fn host_path(&self, path: &Path) -> FsResult<PathBuf> {
        let virtual_path = self.virtual_path(path)?;
        let relative = virtual_path.strip_prefix("/").unwrap_or(&virtual_path);
        Ok(self.root.join(relative))
    }

    fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let virtual_path = self.virtual_path(path)?;
        let host_path = self.host_path(path)?;
        list_host_dir(&host_path, &virtual_path)
    }
}

fn list_host_dir(host_path: &Path, virtual_path: &Path) -> FsResult<Vec<DirEntry>> {
    let mut entries = fs::read_dir(host_path)?
        .map(|entry| {
            let entry = entry?;
            let metadata = entry.metadata()?;
            Ok(DirEntry {
                path: virtual_path.join(entry.file_name()),
                metadata: Ok(metadata.into()),
            })
        })
        .collect::<std::result::Result<Vec<DirEntry>, io::Error>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

impl From<fs::Metadata> for Metadata {
    fn from(metadata: fs::Metadata) -> Self {
        let filetype = metadata.file_type();
        Metadata {
            ft: FileType {
                dir: filetype.is_dir(),
                file: filetype.is_file(),
                symlink: filetype.is_symlink(),
            },
            mode: metadata.mode() & 0o7777,
            uid: metadata.uid(),
            gid: metadata.gid(),
            len: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |time| time.as_nanos() as u64),
        }
    }
}

impl crate::FileSystem for FileSystem {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let host_path = self.host_path(path).with_path(Op::Mkdir, path)?;
        fs::DirBuilder::new()
            .mode(mode)
            .create(host_path)
            .map_err(FsError::from)
            .with_path(Op::Mkdir, path)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let host_path = self.host_path(path).with_path(Op::MkdirAll, path)?;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(host_path)
            .map_err(FsError::from)
            .with_path(Op::MkdirAll, path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let host_link = self.host_path(link).with_path(Op::Symlink, link)?;
        std::os::unix::fs::symlink(target, host_link)
            .map_err(FsError::from)
            .with_path(Op::Symlink, link)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let host_path = self.host_path(path).with_path(Op::Readlink, path)?;
        fs::read_link(host_path)
            .map_err(FsError::from)
            .with_path(Op::Readlink, path)
    }

    fn stat(&self, path: &Path) -> Result<Metadata> {
        let host_path = self.host_path(path).with_path(Op::Stat, path)?;
        fs::metadata(host_path)
            .map(Into::into)
            .map_err(FsError::from)
            .with_path(Op::Stat, path)
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        let host_path = self.host_path(path).with_path(Op::Lstat, path)?;
        fs::symlink_metadata(host_path)
            .map(Into::into)
            .map_err(FsError::from)
            .with_path(Op::Lstat, path)
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        let virtual_path = self.virtual_path(path).with_path(Op::Chdir, path)?;
        let metadata = self.stat(path).map_err(|err| PathError { op: Op::Chdir, ..err })?;
        if !metadata.is_dir() {
            return Err(PathError::new(Op::Chdir, path, FsError::NotADirectory));
        }
        *self.cwd.lock() = virtual_path;
        Ok(())
    }

    fn getwd(&self) -> Result<PathBuf> {
        Ok(self.cwd.lock().clone())
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        let host_path = self.host_path(path).with_path(Op::Chmod, path)?;
        fs::set_permissions(host_path, fs::Permissions::from_mode(mode))
            .map_err(FsError::from)
            .with_path(Op::Chmod, path)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        let host_path = self.host_path(path).with_path(Op::Chown, path)?;
        std::os::unix::fs::chown(host_path, Some(uid), Some(gid))
            .map_err(FsError::from)
            .with_path(Op::Chown, path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.list(path).with_path(Op::ReadDir, path)
    }

    fn new_open_options(&self) -> OpenOptions<'_> {
        OpenOptions::new(self)
    }
}

impl FileOpener for FileSystem {
    fn open(
        &self,
        path: &Path,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync>> {
        let op = conf.op();
        if !conf.traits().is_empty() {
            return Err(PathError::new(op, path, FsError::Unsupported));
        }

        let virtual_path = self.virtual_path(path).with_path(op, path)?;
        let host_path = self.host_path(path).with_path(op, path)?;

        if fs::metadata(&host_path).is_ok_and(|metadata| metadata.is_dir()) {
            if conf.would_mutate() {
                return Err(PathError::new(op, path, FsError::IsADirectory));
            }
            return Ok(Box::new(File {
                name: path.to_path_buf(),
                host_path,
                virtual_path,
                backing: Some(Backing::Dir(DirCursor::default())),
            }));
        }

        let file = fs::OpenOptions::new()
            .read(conf.read())
            .write(conf.write())
            .append(conf.append())
            .truncate(conf.truncate())
            .create(conf.create())
            .create_new(conf.create_new())
            .mode(conf.mode().unwrap_or(0o644))
            .open(&host_path)
            .map_err(FsError::from)
            .with_path(op, path)?;
        debug!(path = %path.display(), host = %host_path.display(), "opened host file");

        Ok(Box::new(File {
            name: path.to_path_buf(),
            host_path,
            virtual_path,
            backing: Some(Backing::File(file)),
        }))
    }
}

#[derive(Debug)]
enum Backing {
    File(fs::File),
    Dir(DirCursor),
}

/// A file or directory opened on the host.
#[derive(Debug)]
pub struct File {
    name: PathBuf,
    host_path: PathBuf,
    virtual_path: PathBuf,
    /// `None` once closed.
    backing: Option<Backing>,
}

impl File {
    fn file(&self) -> FsResult<&fs::File> {
        match &self.backing {
            Some(Backing::File(file)) => Ok(file),
            Some(Backing::Dir(_)) => Err(FsError::Unsupported),
            None => Err(FsError::Closed),
        }
    }

    fn file_mut(&mut self) -> FsResult<&mut fs::File> {
        match &mut self.backing {
            Some(Backing::File(file)) => Ok(file),
            Some(Backing::Dir(_)) => Err(FsError::Unsupported),
            None => Err(FsError::Closed),
        }
    }
}

fn end_of_data(read: usize, requested: usize) -> FsResult<usize> {
    if read == 0 && requested > 0 {
        Err(FsError::EndOfData)
    } else {
        Ok(read)
    }
}

impl VirtualFile for File {
    fn name(&self) -> &Path {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let requested = buf.len();
        self.file_mut()
            .and_then(|file| Ok(file.read(buf)?))
            .and_then(|read| end_of_data(read, requested))
            .with_path(Op::Read, &self.name)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file_mut()
            .and_then(|file| Ok(file.write(buf)?))
            .with_path(Op::Write, &self.name)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let requested = buf.len();
        self.file()
            .and_then(|file| Ok(file.read_at(buf, offset)?))
            .and_then(|read| end_of_data(read, requested))
            .with_path(Op::ReadAt, &self.name)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        self.file()
            .and_then(|file| Ok(file.write_at(buf, offset)?))
            .with_path(Op::WriteAt, &self.name)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.file_mut()
            .and_then(|file| {
                let cursor = file.stream_position()?;
                let size = file.metadata()?.len();
                let target = seek_within(cursor, size, offset, whence)?;
                Ok(file.seek(SeekFrom::Start(target))?)
            })
            .with_path(Op::Seek, &self.name)
    }

    fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry>> {
        let (host_path, virtual_path) = (&self.host_path, &self.virtual_path);
        match &mut self.backing {
            Some(Backing::Dir(cursor)) => cursor.read(n, || list_host_dir(host_path, virtual_path)),
            Some(Backing::File(_)) => Err(FsError::Unsupported),
            None => Err(FsError::Closed),
        }
        .with_path(Op::ReadDir, &self.name)
    }

    fn stat(&self) -> Result<Metadata> {
        match &self.backing {
            Some(Backing::File(file)) => file.metadata().map(Into::into).map_err(FsError::from),
            Some(Backing::Dir(_)) => fs::metadata(&self.host_path)
                .map(Into::into)
                .map_err(FsError::from),
            None => Err(FsError::Closed),
        }
        .with_path(Op::Stat, &self.name)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file_mut()
            .and_then(|file| Ok(file.set_len(len)?))
            .with_path(Op::SetLen, &self.name)
    }

    fn close(&mut self) -> Result<()> {
        match self.backing.take() {
            Some(Backing::File(mut file)) => file.flush().map_err(FsError::from),
            Some(Backing::Dir(_)) => Ok(()),
            None => Err(FsError::Closed),
        }
        .with_path(Op::Close, &self.name)
    }

    fn is_open(&self) -> bool {
        self.backing.is_some()
    }
}
