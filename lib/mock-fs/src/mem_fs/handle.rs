use std::fmt;
use std::path::{Path, PathBuf};

use super::capability::{Capability, Composed};
use super::filesystem::FileSystem;
use super::node::Inode;
use crate::{
    Arg, Call, DirEntry, FsError, Metadata, Op, PathError, Result, ResultExt, VirtualFile, Whence,
};

/// An open entry of a [`FileSystem`].
///
/// Each handle owns its capability view, so cursors, listing positions and
/// the closed state are never shared between two opens of the same entry.
pub struct FileHandle {
    inode: Inode,
    name: PathBuf,
    filesystem: FileSystem,
    view: Composed,
}

impl FileHandle {
    pub(super) fn new(inode: Inode, name: PathBuf, filesystem: FileSystem, view: Composed) -> Self {
        Self {
            inode,
            name,
            filesystem,
            view,
        }
    }

    /// Whether this handle can perform `capability`. Closing is always
    /// supported, at least once.
    pub fn supports(&self, capability: Capability) -> bool {
        self.view.supports(capability)
    }

    fn intercept(&self, op: Op, args: &[Arg<'_>]) -> Result<()> {
        self.filesystem
            .intercept(&Call::new(op, Some(self.name.as_path()), args))
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("inode", &self.inode)
            .field("name", &self.name)
            .field("closed", &self.view.is_closed())
            .finish()
    }
}

impl VirtualFile for FileHandle {
    fn name(&self) -> &Path {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.intercept(Op::Read, &[Arg::Len(buf.len() as u64)])?;
        self.view.read(buf).with_path(Op::Read, &self.name)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.intercept(Op::Write, &[Arg::Len(buf.len() as u64)])?;
        let written = self.view.write(buf).with_path(Op::Write, &self.name)?;
        self.filesystem.touch(self.inode);
        Ok(written)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.intercept(Op::ReadAt, &[Arg::Len(buf.len() as u64), Arg::Offset(offset)])?;
        self.view
            .read_at(buf, offset)
            .with_path(Op::ReadAt, &self.name)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        self.intercept(Op::WriteAt, &[Arg::Len(buf.len() as u64), Arg::Offset(offset)])?;
        let written = self
            .view
            .write_at(buf, offset)
            .with_path(Op::WriteAt, &self.name)?;
        self.filesystem.touch(self.inode);
        Ok(written)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.intercept(Op::Seek, &[Arg::Seek(offset, whence)])?;
        self.view
            .seek(offset, whence)
            .with_path(Op::Seek, &self.name)
    }

    fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry>> {
        self.intercept(Op::ReadDir, &[Arg::Count(n)])?;
        let filesystem = &self.filesystem;
        let inode = self.inode;
        self.view
            .read_dir(n, || filesystem.list(inode))
            .with_path(Op::ReadDir, &self.name)
    }

    fn stat(&self) -> Result<Metadata> {
        self.intercept(Op::Stat, &[])?;
        if self.view.is_closed() {
            return Err(PathError::new(Op::Stat, &self.name, FsError::Closed));
        }

        let mut metadata = self
            .filesystem
            .metadata(self.inode)
            .with_path(Op::Stat, &self.name)?;
        if let Ok(len) = self.view.size() {
            metadata.len = len;
        }
        Ok(metadata)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.intercept(Op::SetLen, &[Arg::Len(len)])?;
        self.view.set_len(len).with_path(Op::SetLen, &self.name)?;
        self.filesystem.touch(self.inode);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.intercept(Op::Close, &[])?;
        self.view.close().with_path(Op::Close, &self.name)
    }

    fn is_open(&self) -> bool {
        !self.view.is_closed()
    }
}
