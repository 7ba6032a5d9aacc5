use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use mock_fs::{
    mem_fs, ops, Arg, Call, Capability, Closer, ContentStore, DirEntry, DirReader, FailurePlan,
    FileSystem, FsError, FsResult, Modifiers, Op, OpenFlags, PathError, Reader, ReaderAt, Sizer,
    TraitSet, VirtualFile, Whence, Writer, WriterAt,
};
use pretty_assertions::assert_eq;

macro_rules! path {
    ($s:expr) => {
        Path::new($s)
    };
}

/// Hands out the same bytes forever and counts how often it was closed.
#[derive(Default)]
struct Stream {
    closed: AtomicUsize,
}

impl Reader for Stream {
    fn read(&self, buf: &mut [u8]) -> FsResult<usize> {
        buf.fill(b'z');
        Ok(buf.len())
    }

    fn as_closer(&self) -> Option<&dyn Closer> {
        Some(self)
    }
}

impl Closer for Stream {
    fn close(&self) -> FsResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Swallows everything written to it.
#[derive(Default)]
struct Sink {
    written: AtomicUsize,
}

impl Writer for Sink {
    fn write(&self, buf: &[u8]) -> FsResult<usize> {
        self.written.fetch_add(buf.len(), Ordering::SeqCst);
        Ok(buf.len())
    }
}

struct FailingCloser;

impl Closer for FailingCloser {
    fn close(&self) -> FsResult<()> {
        Err(FsError::IOError)
    }
}

/// Content that lists the root of its own filesystem whenever it gets
/// truncated.
#[derive(Default)]
struct Reentrant {
    store: ContentStore,
    fs: OnceLock<mem_fs::FileSystem>,
    listed: AtomicUsize,
}

impl ReaderAt for Reentrant {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.store.read_at(buf, offset)
    }
}

impl WriterAt for Reentrant {
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.store.write_at(buf, offset)
    }

    fn set_len(&self, len: u64) -> FsResult<()> {
        if let Some(fs) = self.fs.get() {
            fs.read_dir(Path::new("/")).map_err(|e| e.kind())?;
            self.listed.fetch_add(1, Ordering::SeqCst);
        }
        self.store.set_len(len)
    }
}

impl Sizer for Reentrant {
    fn size(&self) -> u64 {
        self.store.size()
    }
}

struct FixedListing;

impl DirReader for FixedListing {
    fn read_dir(&self, _n: isize) -> FsResult<Vec<DirEntry>> {
        Ok(vec![DirEntry {
            path: PathBuf::from("/virtual/only"),
            metadata: Err(FsError::NotFound),
        }])
    }
}

#[test]
fn custom_reader_without_seeking() {
    let stream = Arc::new(Stream::default());
    let fs = mem_fs::FileSystem::default();
    fs.insert_file(path!("/zzz"), TraitSet::new().reader(stream.clone()))
        .unwrap();

    let mut file = fs.open(path!("/zzz")).unwrap();
    let mut buf = [0; 3];
    assert_eq!(file.read(&mut buf), Ok(3));
    assert_eq!(&buf, b"zzz");

    // No sizer and no random access: nothing to seek or stat a length from.
    assert_eq!(
        file.seek(0, Whence::Start).map_err(|e| e.kind()),
        Err(FsError::Unsupported)
    );
    assert_eq!(
        file.read_at(&mut buf, 0).map_err(|e| e.kind()),
        Err(FsError::Unsupported)
    );
    assert_eq!(file.stat().unwrap().len(), 0);

    file.close().unwrap();
    assert_eq!(stream.closed.load(Ordering::SeqCst), 1);
    assert_eq!(file.close().map_err(|e| e.kind()), Err(FsError::Closed));
    assert_eq!(stream.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn each_open_closes_the_shared_object_once() {
    let stream = Arc::new(Stream::default());
    let fs = mem_fs::FileSystem::default();
    fs.insert_file(path!("/s"), TraitSet::new().reader(stream.clone()))
        .unwrap();

    for _ in 0..3 {
        let mut file = fs.open(path!("/s")).unwrap();
        file.close().unwrap();
    }
    assert_eq!(stream.closed.load(Ordering::SeqCst), 3);
}

#[test]
fn close_reports_the_closer_error_but_still_closes() {
    let fs = mem_fs::FileSystem::default();
    fs.insert_file(
        path!("/f"),
        TraitSet::random_access(Arc::new(ContentStore::new())).closer(Arc::new(FailingCloser)),
    )
    .unwrap();

    let mut file = fs.open(path!("/f")).unwrap();
    let err = file.close().unwrap_err();
    assert_eq!(err.kind(), FsError::IOError);
    assert_eq!(err.op, Op::Close);
    assert!(!file.is_open());
    assert_eq!(file.close().map_err(|e| e.kind()), Err(FsError::Closed));
}

#[test]
fn truncation_may_call_back_into_the_filesystem() {
    let content = Arc::new(Reentrant::default());
    let fs = mem_fs::FileSystem::default();
    let _ = content.fs.set(fs.clone());
    fs.insert_file(path!("/r"), TraitSet::random_access(content.clone()))
        .unwrap();

    ops::write_file(&fs, "/r", "data").unwrap();
    assert_eq!(content.listed.load(Ordering::SeqCst), 1);
    assert_eq!(ops::read_to_string(&fs, "/r").unwrap(), "data");
}

#[test]
fn write_only_sink() {
    let sink = Arc::new(Sink::default());
    let fs = mem_fs::FileSystem::default();
    fs.insert_file(path!("/sink"), TraitSet::new().writer(sink.clone()))
        .unwrap();

    let mut file = fs
        .new_open_options()
        .write(true)
        .open(path!("/sink"))
        .unwrap();
    assert_eq!(file.write(b"12345"), Ok(5));
    assert_eq!(sink.written.load(Ordering::SeqCst), 5);

    let mut buf = [0; 1];
    assert_eq!(file.read(&mut buf).map_err(|e| e.kind()), Err(FsError::Unsupported));
    assert_eq!(
        file.set_len(0).map_err(|e| e.kind()),
        Err(FsError::Unsupported)
    );
}

#[test]
fn conflicting_traits_are_rejected() {
    let fs = mem_fs::FileSystem::default();

    let err = fs
        .insert_file(
            path!("/twice"),
            TraitSet::new()
                .reader(Arc::new(Stream::default()))
                .merge(TraitSet::new().reader(Arc::new(Stream::default()))),
        )
        .unwrap_err();
    assert_eq!(err.kind(), FsError::ConflictingTrait);
    assert!(!ops::exists(&fs, "/twice"));

    // Same for a reader supplied at open time on top of an existing one.
    fs.insert_file(path!("/s"), TraitSet::new().reader(Arc::new(Stream::default())))
        .unwrap();
    let err = fs
        .new_open_options()
        .read(true)
        .traits(TraitSet::new().reader(Arc::new(Stream::default())))
        .open(path!("/s"))
        .unwrap_err();
    assert_eq!(err.kind(), FsError::ConflictingTrait);
}

#[test]
fn open_time_traits_apply_to_that_handle_only() {
    let fs = mem_fs::FileSystem::default();
    ops::write_file(&fs, "/data", "0123456789").unwrap();

    let mut narrowed = fs
        .new_open_options()
        .read(true)
        .traits(TraitSet::new().modifiers(Modifiers::NO_SEEKER))
        .open(path!("/data"))
        .unwrap();
    assert_eq!(
        narrowed.seek(1, Whence::Start).map_err(|e| e.kind()),
        Err(FsError::Unsupported)
    );

    let mut plain = fs.open(path!("/data")).unwrap();
    assert_eq!(plain.seek(1, Whence::Start), Ok(1));
}

#[test]
fn modifiers_by_name() {
    let modifiers = Modifiers::from_str("read-only, no-seeker").unwrap();
    assert!(modifiers.disables(Capability::Writer));
    assert!(modifiers.disables(Capability::Seeker));
    assert!(!modifiers.disables(Capability::Reader));

    assert_eq!(Modifiers::from_str("bogus"), Err(FsError::UnknownTrait));
}

#[test]
fn directories_with_supplied_listings() {
    let fs = mem_fs::FileSystem::default();
    fs.mkdir(path!("/real"), 0o755).unwrap();
    ops::touch(&fs, "/real/child").unwrap();

    let mut dir = fs
        .new_open_options()
        .read(true)
        .traits(TraitSet::new().dir_reader(Arc::new(FixedListing)))
        .open(path!("/real"))
        .unwrap();
    let entries = dir.read_dir(-1).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path(), PathBuf::from("/virtual/only"));

    let mut dir = fs
        .new_open_options()
        .read(true)
        .traits(TraitSet::new().modifiers(Modifiers::NO_DIR_READER))
        .open(path!("/real"))
        .unwrap();
    assert_eq!(
        dir.read_dir(-1).map_err(|e| e.kind()),
        Err(FsError::Unsupported)
    );
}

#[test]
fn open_file_with_flags() {
    let fs = mem_fs::FileSystem::default();

    let mut file = fs
        .open_file(
            path!("/log"),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND,
            0o600,
        )
        .unwrap();
    file.write(b"a").unwrap();
    file.close().unwrap();
    assert_eq!(fs.stat(path!("/log")).unwrap().mode, 0o600);

    let mut file = fs
        .open_file(path!("/log"), OpenFlags::APPEND, 0o600)
        .unwrap();
    file.write(b"b").unwrap();
    file.close().unwrap();
    assert_eq!(ops::read_to_string(&fs, "/log").unwrap(), "ab");

    let err = fs
        .open_file(path!("/log"), OpenFlags::CREATE | OpenFlags::EXCL, 0o600)
        .unwrap_err();
    assert_eq!(err.kind(), FsError::AlreadyExists);
    assert_eq!(err.op, Op::OpenFile);
}

#[test]
fn injected_failures_on_filesystem_calls() {
    let plan = Arc::new(
        FailurePlan::new()
            .fail_once(Op::Mkdir, FsError::PermissionDenied)
            .fail_at(Op::Stat, "/secret", FsError::PermissionDenied),
    );
    let fs = mem_fs::FileSystem::default().with_failure_injector(plan.clone());

    let err = fs.mkdir(path!("/a"), 0o755).unwrap_err();
    assert_eq!(err.kind(), FsError::PermissionDenied);
    assert_eq!(err.path, PathBuf::from("/a"));
    assert!(!ops::exists(&fs, "/a"));

    fs.mkdir(path!("/a"), 0o755).unwrap();
    fs.mkdir(path!("/secret"), 0o755).unwrap();
    assert!(ops::is_dir(&fs, "/a"));
    assert!(!ops::exists(&fs, "/secret"));

    assert_eq!(
        plan.injected(),
        vec![
            (Op::Mkdir, PathBuf::from("/a")),
            (Op::Stat, PathBuf::from("/secret"))
        ]
    );

    plan.clear();
    assert!(ops::is_dir(&fs, "/secret"));
}

#[test]
fn injected_failures_on_handles() {
    let plan = Arc::new(FailurePlan::new().fail_times(
        Op::Write,
        Some(PathBuf::from("/flaky")),
        FsError::IOError,
        2,
    ));
    let fs = mem_fs::FileSystem::default().with_failure_injector(plan.clone());

    let mut file = fs.create(path!("/flaky")).unwrap();
    for _ in 0..2 {
        let err = file.write(b"x").unwrap_err();
        assert_eq!(err.kind(), FsError::IOError);
        assert_eq!(err.op, Op::Write);
    }
    assert_eq!(file.write(b"x"), Ok(1));

    // Other files are not affected.
    ops::write_file(&fs, "/steady", "ok").unwrap();
    assert_eq!(plan.injected().len(), 2);
}

#[test]
fn injector_sees_the_arguments() {
    fn deny_large_writes(call: &Call<'_>) -> Option<PathError> {
        let too_large = call
            .args
            .iter()
            .any(|arg| matches!(arg, Arg::Len(len) if *len > 4));
        let path = call.path().unwrap_or(Path::new(""));
        (call.op == Op::Write && too_large)
            .then(|| PathError::new(call.op, path, FsError::InvalidInput))
    }

    let fs = mem_fs::FileSystem::default().with_failure_injector(Arc::new(deny_large_writes));
    let mut file = fs.create(path!("/f")).unwrap();

    assert_eq!(file.write(b"tiny"), Ok(4));
    assert_eq!(
        file.write(b"too large").map_err(|e| e.kind()),
        Err(FsError::InvalidInput)
    );
    assert_eq!(file.stat().unwrap().len(), 4);
}

#[test]
#[tracing_test::traced_test]
fn io_traits_over_handles() {
    use std::io::{Read, Seek, SeekFrom, Write};

    let fs = mem_fs::FileSystem::default();
    let mut file = fs.create(path!("/io")).unwrap();
    file.write_all(b"hello world").unwrap();

    let position = Seek::seek(&mut file, SeekFrom::Start(6)).unwrap();
    assert_eq!(position, 6);

    let mut rest = String::new();
    file.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "world");

    // The cursor sits at the end, which is not a valid seek target.
    let err = file.stream_position().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    assert_eq!(Seek::seek(&mut file, SeekFrom::Start(0)).unwrap(), 0);
}
