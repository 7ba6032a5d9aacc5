use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use slab::Slab;
use tracing::debug;

use super::capability::{Capabilities, TraitSet};
use super::time;
use crate::{Config, DirEntry, FileType, FsError, FsResult, Metadata};

pub(super) type Inode = usize;
pub(super) const ROOT_INODE: Inode = 0;

#[derive(Debug)]
pub(super) enum NodeKind {
    File,
    Directory { children: BTreeMap<String, Inode> },
    Symlink { target: PathBuf },
}

impl NodeKind {
    pub(super) fn directory() -> Self {
        NodeKind::Directory {
            children: BTreeMap::new(),
        }
    }

    fn file_type(&self) -> FileType {
        match self {
            NodeKind::File => FileType::new_file(),
            NodeKind::Directory { .. } => FileType::new_dir(),
            NodeKind::Symlink { .. } => FileType::new_symlink(),
        }
    }
}

#[derive(Debug)]
pub(super) struct Node {
    pub(super) inode: Inode,
    pub(super) name: String,
    /// Full path from the root, fixed at creation.
    pub(super) path: PathBuf,
    /// `None` for the root only.
    pub(super) parent: Option<Inode>,
    pub(super) kind: NodeKind,
    pub(super) capabilities: Capabilities,
    pub(super) mode: u32,
    pub(super) uid: u32,
    pub(super) gid: u32,
    pub(super) modified: u64,
}

impl Node {
    pub(super) fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    fn metadata(&self) -> Metadata {
        let len = match &self.kind {
            NodeKind::File => self.capabilities.size().unwrap_or(0),
            NodeKind::Directory { .. } => 0,
            NodeKind::Symlink { target } => target.as_os_str().len() as u64,
        };

        Metadata {
            ft: self.kind.file_type(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            len,
            modified: self.modified,
        }
    }
}

pub(super) struct FileSystemInner {
    pub(super) storage: Slab<Node>,
    pub(super) cwd: Inode,
    pub(super) config: Config,
}

impl FileSystemInner {
    pub(super) fn new(config: Config) -> Self {
        let mut storage = Slab::new();
        let root = storage.vacant_entry();
        let inode = root.key();
        root.insert(Node {
            inode,
            name: "/".to_string(),
            path: PathBuf::from("/"),
            parent: None,
            kind: NodeKind::directory(),
            capabilities: Capabilities::empty(true),
            mode: config.dir_mode,
            uid: config.uid,
            gid: config.gid,
            modified: time(),
        });

        Self {
            storage,
            cwd: ROOT_INODE,
            config,
        }
    }

    pub(super) fn node(&self, inode: Inode) -> FsResult<&Node> {
        self.storage.get(inode).ok_or(FsError::NotFound)
    }

    pub(super) fn node_mut(&mut self, inode: Inode) -> FsResult<&mut Node> {
        self.storage.get_mut(inode).ok_or(FsError::NotFound)
    }

    fn validate_name(&self, name: &str) -> FsResult<()> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\0'])
            || name.len() > self.config.max_name_len;
        if invalid {
            Err(FsError::NameInvalid)
        } else {
            Ok(())
        }
    }

    /// Registers a new entry called `name` under the directory `parent`.
    pub(super) fn create_child(
        &mut self,
        parent: Inode,
        name: &str,
        kind: NodeKind,
        mode: u32,
        traits: TraitSet,
    ) -> FsResult<Inode> {
        self.validate_name(name)?;

        let parent_node = self.node(parent)?;
        let NodeKind::Directory { children } = &parent_node.kind else {
            return Err(FsError::ParentNotDirectory);
        };
        if children.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        let path = parent_node.path.join(name);

        let capabilities = Capabilities::build(traits, matches!(kind, NodeKind::Directory { .. }))?;
        let now = time();
        let entry = self.storage.vacant_entry();
        let inode = entry.key();
        debug!(inode, path = %path.display(), ?kind, "creating entry");
        entry.insert(Node {
            inode,
            name: name.to_string(),
            path,
            parent: Some(parent),
            kind,
            capabilities,
            mode,
            uid: self.config.uid,
            gid: self.config.gid,
            modified: now,
        });

        let parent_node = self.node_mut(parent)?;
        if let NodeKind::Directory { children } = &mut parent_node.kind {
            children.insert(name.to_string(), inode);
        }
        parent_node.modified = now;

        Ok(inode)
    }

    pub(super) fn lookup_child(&self, dir: Inode, name: &str) -> FsResult<Inode> {
        match &self.node(dir)?.kind {
            NodeKind::Directory { children } => {
                children.get(name).copied().ok_or(FsError::NotFound)
            }
            _ => Err(FsError::NotADirectory),
        }
    }

    pub(super) fn metadata(&self, inode: Inode) -> FsResult<Metadata> {
        Ok(self.node(inode)?.metadata())
    }

    /// The children of `dir`, sorted by name.
    pub(super) fn list(&self, dir: Inode) -> FsResult<Vec<DirEntry>> {
        let NodeKind::Directory { children } = &self.node(dir)?.kind else {
            return Err(FsError::NotADirectory);
        };

        children
            .values()
            .map(|inode| {
                let child = self.node(*inode)?;
                Ok(DirEntry {
                    path: child.path.clone(),
                    metadata: Ok(child.metadata()),
                })
            })
            .collect()
    }

    pub(super) fn touch(&mut self, inode: Inode) {
        if let Some(node) = self.storage.get_mut(inode) {
            node.modified = time();
        }
    }

    pub(super) fn path_of(&self, inode: Inode) -> FsResult<&Path> {
        Ok(&self.node(inode)?.path)
    }
}

impl fmt::Debug for FileSystemInner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            formatter,
            "\n{inode:<8}    {ty:<4}    name",
            inode = "inode",
            ty = "type",
        )?;

        fn debug(
            inode: Inode,
            slf: &FileSystemInner,
            formatter: &mut fmt::Formatter<'_>,
            indentation: usize,
        ) -> fmt::Result {
            let Some(node) = slf.storage.get(inode) else {
                return Ok(());
            };

            write!(
                formatter,
                "{inode:<8}    {ty:<4}   {indentation_symbol:indentation_width$}{name}",
                inode = node.inode,
                ty = match node.kind {
                    NodeKind::File => "file",
                    NodeKind::Directory { .. } => "dir",
                    NodeKind::Symlink { .. } => "link",
                },
                name = node.name,
                indentation_symbol = " ",
                indentation_width = indentation * 2 + 1,
            )?;

            match &node.kind {
                NodeKind::Symlink { target } => writeln!(formatter, " -> {}", target.display()),
                NodeKind::File => writeln!(formatter),
                NodeKind::Directory { children } => {
                    writeln!(formatter)?;
                    children
                        .values()
                        .try_for_each(|child| debug(*child, slf, formatter, indentation + 1))
                }
            }
        }

        debug(ROOT_INODE, self, formatter, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inner() -> FileSystemInner {
        FileSystemInner::new(Config::default())
    }

    #[test]
    fn test_root() {
        let fs = inner();
        let root = fs.node(ROOT_INODE).unwrap();

        assert!(root.parent.is_none());
        assert!(root.is_dir());
        assert_eq!(root.path, PathBuf::from("/"));
        assert_eq!(fs.cwd, ROOT_INODE);
    }

    #[test]
    fn test_create_child() {
        let mut fs = inner();
        let dir = fs
            .create_child(ROOT_INODE, "dir", NodeKind::directory(), 0o755, TraitSet::new())
            .unwrap();
        let file = fs
            .create_child(dir, "file", NodeKind::File, 0o644, TraitSet::new())
            .unwrap();

        assert_eq!(fs.lookup_child(ROOT_INODE, "dir"), Ok(dir));
        assert_eq!(fs.lookup_child(dir, "file"), Ok(file));
        assert_eq!(fs.path_of(file).unwrap(), Path::new("/dir/file"));
        assert_eq!(fs.node(file).unwrap().parent, Some(dir));
        assert_eq!(fs.lookup_child(dir, "nope"), Err(FsError::NotFound));
        assert_eq!(fs.lookup_child(file, "x"), Err(FsError::NotADirectory));
    }

    #[test]
    fn test_create_child_errors() {
        let mut fs = inner();
        let file = fs
            .create_child(ROOT_INODE, "file", NodeKind::File, 0o644, TraitSet::new())
            .unwrap();

        for name in ["", ".", "..", "a/b"] {
            assert_eq!(
                fs.create_child(ROOT_INODE, name, NodeKind::File, 0o644, TraitSet::new()),
                Err(FsError::NameInvalid),
                "name {name:?}",
            );
        }
        let long = "x".repeat(256);
        assert_eq!(
            fs.create_child(ROOT_INODE, &long, NodeKind::File, 0o644, TraitSet::new()),
            Err(FsError::NameInvalid),
        );
        assert_eq!(
            fs.create_child(file, "child", NodeKind::File, 0o644, TraitSet::new()),
            Err(FsError::ParentNotDirectory),
        );
        assert_eq!(
            fs.create_child(ROOT_INODE, "file", NodeKind::directory(), 0o755, TraitSet::new()),
            Err(FsError::AlreadyExists),
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let mut fs = inner();
        for name in ["b", "c", "a"] {
            fs.create_child(ROOT_INODE, name, NodeKind::File, 0o644, TraitSet::new())
                .unwrap();
        }

        let names: Vec<_> = fs
            .list(ROOT_INODE)
            .unwrap()
            .iter()
            .map(|entry| entry.path.clone())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }

    #[test]
    fn test_symlink_metadata() {
        let mut fs = inner();
        let link = fs
            .create_child(
                ROOT_INODE,
                "link",
                NodeKind::Symlink {
                    target: PathBuf::from("/target"),
                },
                0o777,
                TraitSet::new(),
            )
            .unwrap();

        let metadata = fs.metadata(link).unwrap();
        assert!(metadata.is_symlink());
        assert_eq!(metadata.len(), 7);
        assert_eq!(metadata.mode, 0o777);
    }

    #[test]
    fn test_debug_dump() {
        let mut fs = inner();
        let dir = fs
            .create_child(ROOT_INODE, "dir", NodeKind::directory(), 0o755, TraitSet::new())
            .unwrap();
        fs.create_child(
            dir,
            "link",
            NodeKind::Symlink {
                target: PathBuf::from("../x"),
            },
            0o777,
            TraitSet::new(),
        )
        .unwrap();

        let dump = format!("{fs:?}");
        assert!(dump.contains("dir"));
        assert!(dump.contains("link -> ../x"));
    }
}
