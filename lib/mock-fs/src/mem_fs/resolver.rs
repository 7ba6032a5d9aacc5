use std::path::{Component, Path};

use tracing::trace;

use super::node::{FileSystemInner, Inode, NodeKind, ROOT_INODE};
use crate::{FsError, FsResult};

impl FileSystemInner {
    /// Walks `path` from `base`, or from the root when `path` is absolute.
    ///
    /// Symlinks in the middle of the path are always followed, relative to
    /// the directory holding the link. A symlink in the final position is
    /// followed only when `follow_final` is set.
    pub(super) fn resolve(&self, base: Inode, path: &Path, follow_final: bool) -> FsResult<Inode> {
        self.resolve_at_depth(base, path, follow_final, 0)
    }

    /// Splits `path` into the directory that holds its final component
    /// and the name of that component. The entry itself doesn't have to
    /// exist.
    pub(super) fn resolve_parent<'p>(
        &self,
        base: Inode,
        path: &'p Path,
    ) -> FsResult<(Inode, &'p str)> {
        let name = match path.components().next_back() {
            Some(Component::Normal(name)) => name.to_str().ok_or(FsError::NameInvalid)?,
            Some(Component::RootDir) => return Err(FsError::AlreadyExists),
            Some(_) => return Err(FsError::NameInvalid),
            None => return Err(FsError::NotFound),
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.resolve(base, parent, true)?,
            _ => base,
        };
        if !self.node(dir)?.is_dir() {
            return Err(FsError::ParentNotDirectory);
        }

        Ok((dir, name))
    }

    fn resolve_at_depth(
        &self,
        base: Inode,
        path: &Path,
        follow_final: bool,
        depth: u16,
    ) -> FsResult<Inode> {
        if path.as_os_str().is_empty() {
            return Err(FsError::NotFound);
        }

        let mut current = base;
        let mut components = path.components().peekable();

        while let Some(component) = components.next() {
            let is_last = components.peek().is_none();

            current = match component {
                Component::RootDir => ROOT_INODE,
                Component::CurDir => current,
                Component::ParentDir => {
                    let node = self.node(current)?;
                    if !node.is_dir() {
                        return Err(FsError::NotADirectory);
                    }
                    node.parent.unwrap_or(ROOT_INODE)
                }
                Component::Prefix(_) => return Err(FsError::InvalidInput),
                Component::Normal(name) => {
                    let name = name.to_str().ok_or(FsError::NameInvalid)?;
                    let child = self.lookup_child(current, name)?;

                    match &self.node(child)?.kind {
                        NodeKind::Symlink { target } if follow_final || !is_last => {
                            self.follow(child, target, depth)?
                        }
                        _ => child,
                    }
                }
            };
        }

        Ok(current)
    }

    fn follow(&self, link: Inode, target: &Path, depth: u16) -> FsResult<Inode> {
        if depth >= self.config.max_symlinks {
            trace!(link, depth, "giving up on symlink resolution");
            return Err(FsError::TooManySymlinks);
        }

        let dir = self.node(link)?.parent.unwrap_or(ROOT_INODE);
        trace!(link, target = %target.display(), depth, "following symlink");
        self.resolve_at_depth(dir, target, true, depth + 1)
    }
}
