//! This module contains the [`FileSystem`] type itself.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::capability::{Capability, Modifiers, TraitSet};
use super::content::ContentStore;
use super::handle::FileHandle;
use super::node::{FileSystemInner, Inode, NodeKind, ROOT_INODE};
use crate::{
    Arg, Call, Config, DirEntry, FailureInjector, FileOpener, FsError, FsResult, Metadata, Op,
    OpenOptions, OpenOptionsConfig, Result, ResultExt, VirtualFile,
};

/// The in-memory file system!
///
/// This `FileSystem` type can be cloned, it's a light copy of the
/// `FileSystemInner` (which is behind a `Arc` + `RwLock`), so every clone
/// sees the same tree.
#[derive(Clone)]
pub struct FileSystem {
    inner: Arc<RwLock<FileSystemInner>>,
    injector: Option<Arc<dyn FailureInjector>>,
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl FileSystem {
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FileSystemInner::new(config))),
            injector: None,
        }
    }

    /// Consult `injector` before every operation on this filesystem and on
    /// the handles it opens from now on.
    pub fn with_failure_injector(mut self, injector: Arc<dyn FailureInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn config(&self) -> Config {
        self.inner.read().config.clone()
    }

    /// Creates a regular file whose capabilities come entirely from
    /// `traits`, with no content store behind it.
    pub fn insert_file(&self, path: &Path, traits: TraitSet) -> Result<()> {
        self.intercept(&Call::new(Op::Create, None, &[Arg::Path(path)]))?;

        let mut inner = self.inner.write();
        let (dir, name) = inner.resolve_parent(inner.cwd, path).with_path(Op::Create, path)?;
        let mode = inner.config.file_mode;
        inner
            .create_child(dir, name, NodeKind::File, mode, traits)
            .with_path(Op::Create, path)?;
        Ok(())
    }

    pub(super) fn intercept(&self, call: &Call<'_>) -> Result<()> {
        match self.injector.as_ref().and_then(|injector| injector.inject(call)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(super) fn touch(&self, inode: Inode) {
        self.inner.write().touch(inode);
    }

    pub(super) fn list(&self, dir: Inode) -> FsResult<Vec<DirEntry>> {
        self.inner.read().list(dir)
    }

    pub(super) fn metadata(&self, inode: Inode) -> FsResult<Metadata> {
        self.inner.read().metadata(inode)
    }

    fn open_handle(&self, path: &Path, conf: &OpenOptionsConfig) -> FsResult<FileHandle> {
        let mut inner = self.inner.write();
        let base = inner.cwd;

        let (inode, created) = if conf.create() || conf.create_new() {
            let (dir, name) = inner.resolve_parent(base, path)?;
            match inner.lookup_child(dir, name) {
                Ok(_) if conf.create_new() => return Err(FsError::AlreadyExists),
                Ok(_) => (inner.resolve(dir, Path::new(name), true)?, false),
                Err(FsError::NotFound) => {
                    let traits = if conf.traits().has_data() {
                        conf.traits().clone()
                    } else {
                        TraitSet::random_access(Arc::new(ContentStore::new()))
                            .merge(conf.traits().clone())
                    };
                    let mode = conf.mode().unwrap_or(inner.config.file_mode);
                    (
                        inner.create_child(dir, name, NodeKind::File, mode, traits)?,
                        true,
                    )
                }
                Err(err) => return Err(err),
            }
        } else {
            (inner.resolve(base, path, true)?, false)
        };

        let node = inner.node(inode)?;
        if node.is_dir() && conf.would_mutate() {
            return Err(FsError::IsADirectory);
        }

        // Traits supplied for a freshly created file already are its bundle.
        let extra = if created {
            TraitSet::default()
        } else {
            conf.traits().clone()
        };
        let capabilities = node.capabilities.with_extra(extra)?;

        let narrow = match (conf.read(), conf.write() || conf.append()) {
            (_, false) => Modifiers::READ_ONLY,
            (false, true) => Modifiers::WRITE_ONLY,
            (true, true) => Modifiers::empty(),
        };
        let mut view = capabilities.compose(narrow, conf.append());
        trace!(
            inode,
            path = %path.display(),
            ?narrow,
            seekable = view.supports(Capability::Seeker),
            "opened"
        );
        drop(inner);

        // Truncation goes through the view, so read-only entries and
        // handles refuse it, and runs without the tree lock.
        if conf.truncate() && !created {
            view.set_len(0)?;
            self.touch(inode);
        }

        Ok(FileHandle::new(inode, path.to_path_buf(), self.clone(), view))
    }
}

impl FileSystemInner {
    fn mkdir_all(&mut self, path: &Path, mode: u32) -> FsResult<()> {
        let mut current = self.cwd;

        for component in path.components() {
            current = match component {
                Component::RootDir => ROOT_INODE,
                Component::CurDir => current,
                Component::ParentDir => self.resolve(current, Path::new(".."), true)?,
                Component::Prefix(_) => return Err(FsError::InvalidInput),
                Component::Normal(name) => {
                    let name = name.to_str().ok_or(FsError::NameInvalid)?;
                    match self.resolve(current, Path::new(name), true) {
                        Ok(inode) if self.node(inode)?.is_dir() => inode,
                        Ok(_) => return Err(FsError::NotADirectory),
                        Err(FsError::NotFound) => self.create_child(
                            current,
                            name,
                            NodeKind::directory(),
                            mode,
                            TraitSet::new(),
                        )?,
                        Err(err) => return Err(err),
                    }
                }
            };
        }

        Ok(())
    }
}

impl crate::FileSystem for FileSystem {
    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        self.intercept(&Call::new(Op::Mkdir, None, &[Arg::Path(path), Arg::Mode(mode)]))?;

        let mut inner = self.inner.write();
        let (dir, name) = inner.resolve_parent(inner.cwd, path).with_path(Op::Mkdir, path)?;
        inner
            .create_child(dir, name, NodeKind::directory(), mode, TraitSet::new())
            .with_path(Op::Mkdir, path)?;
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        self.intercept(&Call::new(Op::MkdirAll, None, &[Arg::Path(path), Arg::Mode(mode)]))?;

        self.inner
            .write()
            .mkdir_all(path, mode)
            .with_path(Op::MkdirAll, path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.intercept(&Call::new(Op::Symlink, None, &[Arg::Path(link), Arg::Target(target)]))?;

        if target.as_os_str().is_empty() {
            return Err(FsError::NotFound).with_path(Op::Symlink, link);
        }

        let mut inner = self.inner.write();
        let (dir, name) = inner.resolve_parent(inner.cwd, link).with_path(Op::Symlink, link)?;
        let mode = inner.config.symlink_mode;
        let kind = NodeKind::Symlink {
            target: target.to_path_buf(),
        };
        inner
            .create_child(dir, name, kind, mode, TraitSet::new())
            .with_path(Op::Symlink, link)?;
        debug!(link = %link.display(), target = %target.display(), "symlink created");
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        self.intercept(&Call::new(Op::Readlink, None, &[Arg::Path(path)]))?;

        let inner = self.inner.read();
        let inode = inner.resolve(inner.cwd, path, false).with_path(Op::Readlink, path)?;
        match &inner.node(inode).with_path(Op::Readlink, path)?.kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(FsError::InvalidInput).with_path(Op::Readlink, path),
        }
    }

    fn stat(&self, path: &Path) -> Result<Metadata> {
        self.intercept(&Call::new(Op::Stat, None, &[Arg::Path(path)]))?;

        let inner = self.inner.read();
        inner
            .resolve(inner.cwd, path, true)
            .and_then(|inode| inner.metadata(inode))
            .with_path(Op::Stat, path)
    }

    fn lstat(&self, path: &Path) -> Result<Metadata> {
        self.intercept(&Call::new(Op::Lstat, None, &[Arg::Path(path)]))?;

        let inner = self.inner.read();
        inner
            .resolve(inner.cwd, path, false)
            .and_then(|inode| inner.metadata(inode))
            .with_path(Op::Lstat, path)
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        self.intercept(&Call::new(Op::Chdir, None, &[Arg::Path(path)]))?;

        let mut inner = self.inner.write();
        let inode = inner.resolve(inner.cwd, path, true).with_path(Op::Chdir, path)?;
        if !inner.node(inode).with_path(Op::Chdir, path)?.is_dir() {
            return Err(FsError::NotADirectory).with_path(Op::Chdir, path);
        }
        inner.cwd = inode;
        Ok(())
    }

    fn getwd(&self) -> Result<PathBuf> {
        self.intercept(&Call::new(Op::Getwd, None, &[]))?;

        let inner = self.inner.read();
        inner
            .path_of(inner.cwd)
            .map(Path::to_path_buf)
            .with_path(Op::Getwd, Path::new(""))
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.intercept(&Call::new(Op::Chmod, None, &[Arg::Path(path), Arg::Mode(mode)]))?;

        let mut inner = self.inner.write();
        let inode = inner.resolve(inner.cwd, path, true).with_path(Op::Chmod, path)?;
        inner.node_mut(inode).with_path(Op::Chmod, path)?.mode = mode;
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        self.intercept(&Call::new(
            Op::Chown,
            None,
            &[Arg::Path(path), Arg::Owner { uid, gid }],
        ))?;

        let mut inner = self.inner.write();
        let inode = inner.resolve(inner.cwd, path, true).with_path(Op::Chown, path)?;
        let node = inner.node_mut(inode).with_path(Op::Chown, path)?;
        node.uid = uid;
        node.gid = gid;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.intercept(&Call::new(Op::ReadDir, None, &[Arg::Path(path)]))?;

        let inner = self.inner.read();
        inner
            .resolve(inner.cwd, path, true)
            .and_then(|inode| inner.list(inode))
            .with_path(Op::ReadDir, path)
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
        self.intercept(&Call::new(op, None, &[Arg::Path(path), Arg::Options(conf)]))?;

        let handle = self.open_handle(path, conf).with_path(op, path)?;
        Ok(Box::new(handle))
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner.read(), formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::FileSystem;
    use crate::{
        Config, FileSystem as _, FsError, Op, OpenFlags, VirtualFile, Whence,
    };
    use std::path::PathBuf;
    use pretty_assertions::assert_eq;

    macro_rules! path {
        ($s:expr) => {
            std::path::Path::new($s)
        };
    }

    fn read_all(file: &mut Box<dyn VirtualFile + Send + Sync>) -> Vec<u8> {
        let mut contents = Vec::new();
        let mut buf = [0; 4];
        loop {
            match file.read(&mut buf) {
                Ok(n) => contents.extend_from_slice(&buf[..n]),
                Err(err) if err.is_eof() => break contents,
                Err(err) => panic!("read failed: {err}"),
            }
        }
    }

    #[test]
    fn test_new_filesystem() {
        let fs = FileSystem::default();
        assert_eq!(fs.getwd(), Ok(PathBuf::from("/")));

        let root = fs.stat(path!("/")).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.mode, 0o755);
    }

    #[test]
    fn test_mkdir() {
        let fs = FileSystem::default();

        assert_eq!(fs.mkdir(path!("/foo"), 0o700), Ok(()));
        assert_eq!(fs.stat(path!("/foo")).unwrap().mode, 0o700);
        assert_eq!(
            fs.mkdir(path!("/foo"), 0o700).map_err(|e| e.kind()),
            Err(FsError::AlreadyExists)
        );
        assert_eq!(
            fs.mkdir(path!("/bar/baz"), 0o700).map_err(|e| e.kind()),
            Err(FsError::NotFound)
        );
        assert_eq!(
            fs.mkdir(path!("/"), 0o700).map_err(|e| e.kind()),
            Err(FsError::AlreadyExists)
        );
    }

    #[test]
    fn test_mkdir_all() {
        let fs = FileSystem::default();

        assert_eq!(fs.mkdir_all(path!("/a/b/c"), 0o755), Ok(()));
        assert!(fs.stat(path!("/a/b/c")).unwrap().is_dir());
        assert_eq!(fs.mkdir_all(path!("/a/b/c"), 0o755), Ok(()), "existing is fine");

        fs.create(path!("/a/file")).unwrap();
        let err = fs.mkdir_all(path!("/a/file/d"), 0o755).unwrap_err();
        assert_eq!(err.kind(), FsError::NotADirectory);
        assert_eq!(err.op, Op::MkdirAll);
    }

    #[test]
    fn test_mkdir_all_through_symlink() {
        let fs = FileSystem::default();
        fs.mkdir(path!("/real"), 0o755).unwrap();
        fs.symlink(path!("/real"), path!("/alias")).unwrap();

        fs.mkdir_all(path!("/alias/x/y"), 0o755).unwrap();
        assert!(fs.stat(path!("/real/x/y")).unwrap().is_dir());
    }

    #[test]
    fn test_create_write_read() {
        let fs = FileSystem::default();

        let mut file = fs.create(path!("/hello.txt")).unwrap();
        assert_eq!(file.write(b"hello, "), Ok(7));
        assert_eq!(file.write(b"world"), Ok(5));
        assert_eq!(file.stat().unwrap().len(), 12);
        file.close().unwrap();

        let mut file = fs.open(path!("/hello.txt")).unwrap();
        assert_eq!(read_all(&mut file), b"hello, world".to_vec());
    }

    #[test]
    fn test_open_missing() {
        let fs = FileSystem::default();
        let err = fs.open(path!("/nope")).unwrap_err();

        assert_eq!(err.kind(), FsError::NotFound);
        assert_eq!(err.op, Op::Open);
        assert_eq!(err.path, PathBuf::from("/nope"));
    }

    #[test]
    fn test_read_only_open_disables_writes() {
        let fs = FileSystem::default();
        fs.create(path!("/f")).unwrap().write(b"abc").unwrap();

        let mut file = fs.open(path!("/f")).unwrap();
        let err = file.write(b"x").unwrap_err();
        assert_eq!(err.kind(), FsError::Unsupported);
        assert_eq!(err.op, Op::Write);
        assert_eq!(
            file.write_at(b"x", 0).map_err(|e| e.kind()),
            Err(FsError::Unsupported)
        );
        assert_eq!(file.seek(1, Whence::Start), Ok(1));
    }

    #[test]
    fn test_write_only_open_disables_reads() {
        let fs = FileSystem::default();
        let mut file = fs
            .open_file(path!("/f"), OpenFlags::WRITE | OpenFlags::CREATE, 0o600)
            .unwrap();

        assert_eq!(file.write(b"abc"), Ok(3));
        let mut buf = [0; 3];
        assert_eq!(
            file.read(&mut buf).map_err(|e| e.kind()),
            Err(FsError::Unsupported)
        );
        assert_eq!(
            file.read_at(&mut buf, 0).map_err(|e| e.kind()),
            Err(FsError::Unsupported)
        );
        assert_eq!(fs.stat(path!("/f")).unwrap().mode, 0o600);
    }

    #[test]
    fn test_create_new() {
        let fs = FileSystem::default();
        let flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCL;

        fs.open_file(path!("/f"), flags, 0o644).unwrap();
        let err = fs.open_file(path!("/f"), flags, 0o644).unwrap_err();
        assert_eq!(err.kind(), FsError::AlreadyExists);
        assert_eq!(err.op, Op::OpenFile);
    }

    #[test]
    fn test_create_truncates() {
        let fs = FileSystem::default();
        fs.create(path!("/f")).unwrap().write(b"long content").unwrap();

        let mut file = fs.create(path!("/f")).unwrap();
        assert_eq!(file.stat().unwrap().len(), 0);
        file.write(b"new").unwrap();
        assert_eq!(fs.stat(path!("/f")).unwrap().len(), 3);
    }

    #[test]
    fn test_append() {
        let fs = FileSystem::default();
        fs.create(path!("/log")).unwrap().write(b"one\n").unwrap();

        let mut file = fs
            .open_file(path!("/log"), OpenFlags::APPEND, 0)
            .unwrap();
        file.write(b"two\n").unwrap();

        let mut file = fs.open(path!("/log")).unwrap();
        assert_eq!(read_all(&mut file), b"one\ntwo\n".to_vec());
    }

    #[test]
    fn test_create_in_missing_dir() {
        let fs = FileSystem::default();
        let err = fs.create(path!("/missing/f")).unwrap_err();
        assert_eq!(err.kind(), FsError::NotFound);
        assert_eq!(err.op, Op::Create);
    }

    #[test]
    fn test_directories_cannot_be_written() {
        let fs = FileSystem::default();
        fs.mkdir(path!("/d"), 0o755).unwrap();

        assert_eq!(
            fs.create(path!("/d")).map_err(|e| e.kind()).err(),
            Some(FsError::IsADirectory)
        );

        let mut dir = fs.open(path!("/d")).unwrap();
        let mut buf = [0; 1];
        assert_eq!(
            dir.read(&mut buf).map_err(|e| e.kind()),
            Err(FsError::Unsupported)
        );
        assert_eq!(dir.read_dir(-1), Ok(Vec::new()));
    }

    #[test]
    fn test_chdir_and_relative_paths() {
        let fs = FileSystem::default();
        fs.mkdir_all(path!("/a/b"), 0o755).unwrap();
        fs.create(path!("/a/b/f")).unwrap();

        fs.chdir(path!("/a")).unwrap();
        assert_eq!(fs.getwd(), Ok(PathBuf::from("/a")));
        assert!(fs.stat(path!("b/f")).unwrap().is_file());

        fs.chdir(path!("b")).unwrap();
        assert_eq!(fs.getwd(), Ok(PathBuf::from("/a/b")));
        fs.mkdir(path!("../c"), 0o755).unwrap();
        assert!(fs.stat(path!("/a/c")).unwrap().is_dir());

        assert_eq!(
            fs.chdir(path!("f")).map_err(|e| e.kind()),
            Err(FsError::NotADirectory)
        );
        assert_eq!(fs.getwd(), Ok(PathBuf::from("/a/b")));
    }

    #[test]
    fn test_chdir_through_symlink_reports_real_path() {
        let fs = FileSystem::default();
        fs.mkdir(path!("/real"), 0o755).unwrap();
        fs.symlink(path!("real"), path!("/alias")).unwrap();

        fs.chdir(path!("/alias")).unwrap();
        assert_eq!(fs.getwd(), Ok(PathBuf::from("/real")));
    }

    #[test]
    fn test_chmod_chown() {
        let fs = FileSystem::default();
        fs.create(path!("/f")).unwrap();

        fs.chmod(path!("/f"), 0o400).unwrap();
        fs.chown(path!("/f"), 1000, 100).unwrap();

        let metadata = fs.stat(path!("/f")).unwrap();
        assert_eq!((metadata.mode, metadata.uid, metadata.gid), (0o400, 1000, 100));

        // Not enforced.
        fs.create(path!("/f")).unwrap().write(b"x").unwrap();
    }

    #[test]
    fn test_stat_and_lstat() {
        let fs = FileSystem::default();
        fs.create(path!("/f")).unwrap().write(b"12345").unwrap();
        fs.symlink(path!("/f"), path!("/l")).unwrap();

        let followed = fs.stat(path!("/l")).unwrap();
        assert!(followed.is_file());
        assert_eq!(followed.len(), 5);

        let link = fs.lstat(path!("/l")).unwrap();
        assert!(link.is_symlink());
        assert_eq!(link.mode, 0o777);
    }

    #[test]
    fn test_read_link_on_regular_file() {
        let fs = FileSystem::default();
        fs.create(path!("/f")).unwrap();

        let err = fs.read_link(path!("/f")).unwrap_err();
        assert_eq!(err.kind(), FsError::InvalidInput);
        assert_eq!(err.op, Op::Readlink);
    }

    #[test]
    fn test_read_dir() {
        let fs = FileSystem::default();
        fs.mkdir(path!("/d"), 0o755).unwrap();
        fs.create(path!("/d/b")).unwrap();
        fs.mkdir(path!("/d/a"), 0o755).unwrap();

        let entries = fs.read_dir(path!("/d")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path()).collect();
        assert_eq!(names, vec![PathBuf::from("/d/a"), PathBuf::from("/d/b")]);
        assert!(entries[0].metadata.unwrap().is_dir());

        assert_eq!(
            fs.read_dir(path!("/d/b")).map_err(|e| e.kind()),
            Err(FsError::NotADirectory)
        );
    }

    #[test]
    fn test_config_applies_to_new_entries() {
        let fs = FileSystem::with_config(Config::default().with_owner(7, 8));
        fs.create(path!("/f")).unwrap();

        let metadata = fs.stat(path!("/f")).unwrap();
        assert_eq!((metadata.uid, metadata.gid, metadata.mode), (7, 8, 0o644));
    }

    #[test]
    fn test_clones_share_the_tree() {
        let fs = FileSystem::default();
        let other = fs.clone();
        other.mkdir(path!("/shared"), 0o755).unwrap();

        assert!(fs.stat(path!("/shared")).is_ok());
    }

    #[test]
    fn test_debug_output() {
        let fs = FileSystem::default();
        fs.mkdir(path!("/etc"), 0o755).unwrap();
        fs.create(path!("/etc/hosts")).unwrap();

        let dump = format!("{fs:?}");
        assert!(dump.contains("etc"));
        assert!(dump.contains("hosts"));
    }
}
