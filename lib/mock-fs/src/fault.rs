//! Failure injection.
//!
//! A [`FailureInjector`] installed on a filesystem is consulted before every
//! filesystem and handle operation. Returning an error makes the operation
//! fail with exactly that error, without touching the tree.
//!
//! ```
//! use mock_fs::{mem_fs, FailurePlan, FileSystem, FsError, Op};
//! use std::{path::Path, sync::Arc};
//!
//! let plan = Arc::new(FailurePlan::new().fail_once(Op::Mkdir, FsError::PermissionDenied));
//! let fs = mem_fs::FileSystem::default().with_failure_injector(plan);
//!
//! let err = fs.mkdir(Path::new("/a"), 0o755).unwrap_err();
//! assert_eq!(err.kind(), FsError::PermissionDenied);
//! fs.mkdir(Path::new("/a"), 0o755).unwrap();
//! ```

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::{FsError, Op, OpenOptionsConfig, PathError, Whence};

/// One argument of an intercepted call.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Path(&'a Path),
    /// What a new symlink points at.
    Target(&'a Path),
    Mode(u32),
    Owner { uid: u32, gid: u32 },
    Options(&'a OpenOptionsConfig),
    /// Length of the buffer handed to a read or a write, or the new size
    /// of a truncate.
    Len(u64),
    Offset(u64),
    Seek(i64, Whence),
    /// Entry count requested from a directory listing.
    Count(isize),
}

/// An intercepted call: the operation, the handle it targets if any, and
/// its arguments.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub op: Op,
    /// Name of the handle for handle operations.
    pub target: Option<&'a Path>,
    pub args: &'a [Arg<'a>],
}

impl<'a> Call<'a> {
    pub fn new(op: Op, target: Option<&'a Path>, args: &'a [Arg<'a>]) -> Self {
        Self { op, target, args }
    }

    /// The handle name, or else the first path argument.
    pub fn path(&self) -> Option<&'a Path> {
        self.target.or_else(|| {
            self.args.iter().find_map(|arg| match arg {
                Arg::Path(path) => Some(*path),
                _ => None,
            })
        })
    }
}

pub trait FailureInjector: Send + Sync {
    /// Returns the error to fail `call` with, or `None` to let it run.
    fn inject(&self, call: &Call<'_>) -> Option<PathError>;
}

impl<F> FailureInjector for F
where
    F: Fn(&Call<'_>) -> Option<PathError> + Send + Sync,
{
    fn inject(&self, call: &Call<'_>) -> Option<PathError> {
        self(call)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    op: Op,
    path: Option<PathBuf>,
    kind: FsError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

impl Rule {
    fn matches(&self, call: &Call<'_>) -> bool {
        self.op == call.op
            && self
                .path
                .as_deref()
                .is_none_or(|path| call.path() == Some(path))
    }
}

/// A rule-based [`FailureInjector`].
///
/// Rules are checked in insertion order and the first match wins. A rule
/// that runs out of failures is dropped.
#[derive(Debug, Default)]
pub struct FailurePlan {
    rules: Mutex<Vec<Rule>>,
    injected: Mutex<Vec<(Op, PathBuf)>>,
}

impl FailurePlan {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rule(self, rule: Rule) -> Self {
        self.rules.lock().push(rule);
        self
    }

    /// Fail every `op` with `kind`.
    pub fn fail(self, op: Op, kind: FsError) -> Self {
        self.with_rule(Rule {
            op,
            path: None,
            kind,
            remaining: None,
        })
    }

    /// Fail every `op` on `path` with `kind`.
    pub fn fail_at(self, op: Op, path: impl Into<PathBuf>, kind: FsError) -> Self {
        self.with_rule(Rule {
            op,
            path: Some(path.into()),
            kind,
            remaining: None,
        })
    }

    /// Fail the next `op` only.
    pub fn fail_once(self, op: Op, kind: FsError) -> Self {
        self.fail_times(op, None, kind, 1)
    }

    /// Fail the next `times` calls of `op`, on `path` if given.
    pub fn fail_times(self, op: Op, path: Option<PathBuf>, kind: FsError, times: usize) -> Self {
        if times == 0 {
            return self;
        }
        self.with_rule(Rule {
            op,
            path,
            kind,
            remaining: Some(times),
        })
    }

    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    /// Every call that was failed so far.
    pub fn injected(&self) -> Vec<(Op, PathBuf)> {
        self.injected.lock().clone()
    }
}

impl FailureInjector for FailurePlan {
    fn inject(&self, call: &Call<'_>) -> Option<PathError> {
        let mut rules = self.rules.lock();
        let position = rules.iter().position(|rule| rule.matches(call))?;

        let kind = rules[position].kind;
        if let Some(remaining) = &mut rules[position].remaining {
            *remaining -= 1;
            if *remaining == 0 {
                rules.remove(position);
            }
        }
        drop(rules);

        let path = call.path().map(Path::to_path_buf).unwrap_or_default();
        debug!(op = %call.op, path = %path.display(), %kind, "injecting failure");
        self.injected.lock().push((call.op, path.clone()));

        Some(PathError::new(call.op, path, kind))
    }
}
