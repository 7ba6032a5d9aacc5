//! Capability traits and the composer that turns a set of them into the
//! operation surface of an open handle.
//!
//! An entry carries a [`Capabilities`] bundle, built once from a
//! [`TraitSet`] when the entry is created. Every open then calls
//! [`Capabilities::compose`] to get a [`Composed`] view: the supplied
//! objects minus whatever the modifiers disable, plus the pieces that can
//! be synthesized (a cursor-backed seeker/reader/writer, a listing over the
//! directory children, and close tracking).

use super::dir_reader::DirCursor;
use crate::{DirEntry, FsError, FsResult, Whence};
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

pub trait Reader: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> FsResult<usize>;

    /// Objects that also need closing return themselves here.
    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait Writer: Send + Sync {
    fn write(&self, buf: &[u8]) -> FsResult<usize>;

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait ReaderAt: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`. Reading at or after the
    /// end fails with [`FsError::EndOfData`]; a short read is not an error.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait WriterAt: Send + Sync {
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize>;

    /// Change the size of the content, zero-filling on growth.
    fn set_len(&self, _len: u64) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait Seeker: Send + Sync {
    fn seek(&self, offset: i64, whence: Whence) -> FsResult<u64>;

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait Sizer: Send + Sync {
    fn size(&self) -> u64;

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait DirReader: Send + Sync {
    fn read_dir(&self, n: isize) -> FsResult<Vec<DirEntry>>;

    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

pub trait Closer: Send + Sync {
    fn close(&self) -> FsResult<()>;
}

/// One discrete operation surface a handle may support.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Reader,
    Writer,
    ReaderAt,
    WriterAt,
    Seeker,
    Sizer,
    DirReader,
    Closer,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Reader => "reader",
            Capability::Writer => "writer",
            Capability::ReaderAt => "reader-at",
            Capability::WriterAt => "writer-at",
            Capability::Seeker => "seeker",
            Capability::Sizer => "sizer",
            Capability::DirReader => "dir-reader",
            Capability::Closer => "closer",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Flags that forcibly disable capabilities, whatever was supplied.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Modifiers: u16 {
        /// Disables writer and writer-at.
        const READ_ONLY = 1 << 0;
        /// Disables reader and reader-at.
        const WRITE_ONLY = 1 << 1;
        const NO_SEEKER = 1 << 2;
        const NO_SIZER = 1 << 3;
        const NO_READER = 1 << 4;
        const NO_WRITER = 1 << 5;
        /// Disables both random-access capabilities.
        const NO_AT = 1 << 6;
        const NO_DIR_READER = 1 << 7;
    }
}

impl Modifiers {
    /// Whether these modifiers switch `capability` off.
    pub fn disables(self, capability: Capability) -> bool {
        let mask = match capability {
            Capability::Reader => Self::WRITE_ONLY | Self::NO_READER,
            Capability::Writer => Self::READ_ONLY | Self::NO_WRITER,
            Capability::ReaderAt => Self::WRITE_ONLY | Self::NO_AT,
            Capability::WriterAt => Self::READ_ONLY | Self::NO_AT,
            Capability::Seeker => Self::NO_SEEKER,
            Capability::Sizer => Self::NO_SIZER,
            Capability::DirReader => Self::NO_DIR_READER,
            Capability::Closer => Self::empty(),
        };
        self.intersects(mask)
    }

    fn from_kebab(name: &str) -> Option<Self> {
        Some(match name {
            "read-only" => Self::READ_ONLY,
            "write-only" => Self::WRITE_ONLY,
            "no-seeker" => Self::NO_SEEKER,
            "no-sizer" => Self::NO_SIZER,
            "no-reader" => Self::NO_READER,
            "no-writer" => Self::NO_WRITER,
            "no-at" => Self::NO_AT,
            "no-dir-reader" => Self::NO_DIR_READER,
            _ => return None,
        })
    }
}

/// Parses a comma separated list such as `"read-only,no-seeker"`.
impl FromStr for Modifiers {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Modifiers::empty(), |acc, name| {
                Modifiers::from_kebab(name)
                    .map(|flag| acc | flag)
                    .ok_or(FsError::UnknownTrait)
            })
    }
}

/// The caller-supplied building blocks of a capability bundle: one
/// optional slot per capability plus the modifier flags.
///
/// Filling a slot twice with the same object is fine. Filling it with a
/// different object is remembered and reported as
/// [`FsError::ConflictingTrait`] when the bundle gets built.
///
/// A [`Sizer`] is also asked for the length by `stat` while the filesystem
/// is locked, so it must not call back into the same filesystem.
#[derive(Clone, Default)]
pub struct TraitSet {
    reader: Option<Arc<dyn Reader>>,
    writer: Option<Arc<dyn Writer>>,
    reader_at: Option<Arc<dyn ReaderAt>>,
    writer_at: Option<Arc<dyn WriterAt>>,
    seeker: Option<Arc<dyn Seeker>>,
    sizer: Option<Arc<dyn Sizer>>,
    dir_reader: Option<Arc<dyn DirReader>>,
    closer: Option<Arc<dyn Closer>>,
    modifiers: Modifiers,
    conflicts: Vec<Capability>,
}

fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn fill<T: ?Sized>(
    slot: &mut Option<Arc<T>>,
    value: Arc<T>,
    capability: Capability,
    conflicts: &mut Vec<Capability>,
) {
    match slot {
        Some(existing) if same_instance(existing, &value) => {}
        Some(_) => conflicts.push(capability),
        None => *slot = Some(value),
    }
}

impl TraitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Random access reads and writes plus a size, all served by the same
    /// object. This is what a regular file gets by default.
    pub fn random_access<T>(store: Arc<T>) -> Self
    where
        T: ReaderAt + WriterAt + Sizer + 'static,
    {
        Self::new()
            .reader_at(store.clone())
            .writer_at(store.clone())
            .sizer(store)
    }

    pub fn reader(mut self, reader: Arc<dyn Reader>) -> Self {
        fill(&mut self.reader, reader, Capability::Reader, &mut self.conflicts);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn Writer>) -> Self {
        fill(&mut self.writer, writer, Capability::Writer, &mut self.conflicts);
        self
    }

    pub fn reader_at(mut self, reader_at: Arc<dyn ReaderAt>) -> Self {
        fill(
            &mut self.reader_at,
            reader_at,
            Capability::ReaderAt,
            &mut self.conflicts,
        );
        self
    }

    pub fn writer_at(mut self, writer_at: Arc<dyn WriterAt>) -> Self {
        fill(
            &mut self.writer_at,
            writer_at,
            Capability::WriterAt,
            &mut self.conflicts,
        );
        self
    }

    pub fn seeker(mut self, seeker: Arc<dyn Seeker>) -> Self {
        fill(&mut self.seeker, seeker, Capability::Seeker, &mut self.conflicts);
        self
    }

    pub fn sizer(mut self, sizer: Arc<dyn Sizer>) -> Self {
        fill(&mut self.sizer, sizer, Capability::Sizer, &mut self.conflicts);
        self
    }

    pub fn dir_reader(mut self, dir_reader: Arc<dyn DirReader>) -> Self {
        fill(
            &mut self.dir_reader,
            dir_reader,
            Capability::DirReader,
            &mut self.conflicts,
        );
        self
    }

    pub fn closer(mut self, closer: Arc<dyn Closer>) -> Self {
        fill(&mut self.closer, closer, Capability::Closer, &mut self.conflicts);
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Folds `other` into `self` slot by slot, under the same conflict
    /// rule as the individual setters.
    pub fn merge(mut self, other: TraitSet) -> Self {
        let TraitSet {
            reader,
            writer,
            reader_at,
            writer_at,
            seeker,
            sizer,
            dir_reader,
            closer,
            modifiers,
            conflicts,
        } = other;

        if let Some(reader) = reader {
            self = self.reader(reader);
        }
        if let Some(writer) = writer {
            self = self.writer(writer);
        }
        if let Some(reader_at) = reader_at {
            self = self.reader_at(reader_at);
        }
        if let Some(writer_at) = writer_at {
            self = self.writer_at(writer_at);
        }
        if let Some(seeker) = seeker {
            self = self.seeker(seeker);
        }
        if let Some(sizer) = sizer {
            self = self.sizer(sizer);
        }
        if let Some(dir_reader) = dir_reader {
            self = self.dir_reader(dir_reader);
        }
        if let Some(closer) = closer {
            self = self.closer(closer);
        }
        self.modifiers |= modifiers;
        self.conflicts.extend(conflicts);
        self
    }

    pub fn get_modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// No objects and no modifiers.
    pub fn is_empty(&self) -> bool {
        self.filled().is_empty() && self.modifiers.is_empty() && self.conflicts.is_empty()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.filled().contains(&capability)
    }

    /// Whether any slot that reads, writes or sizes content is filled.
    pub fn has_data(&self) -> bool {
        self.reader.is_some()
            || self.writer.is_some()
            || self.reader_at.is_some()
            || self.writer_at.is_some()
            || self.sizer.is_some()
    }

    pub fn validate(&self) -> FsResult<()> {
        match self.conflicts.first() {
            Some(capability) => {
                trace!(%capability, "two different objects supplied for one capability");
                Err(FsError::ConflictingTrait)
            }
            None => Ok(()),
        }
    }

    fn filled(&self) -> Vec<Capability> {
        let slots = [
            (self.reader.is_some(), Capability::Reader),
            (self.writer.is_some(), Capability::Writer),
            (self.reader_at.is_some(), Capability::ReaderAt),
            (self.writer_at.is_some(), Capability::WriterAt),
            (self.seeker.is_some(), Capability::Seeker),
            (self.sizer.is_some(), Capability::Sizer),
            (self.dir_reader.is_some(), Capability::DirReader),
            (self.closer.is_some(), Capability::Closer),
        ];
        slots
            .into_iter()
            .filter_map(|(present, capability)| present.then_some(capability))
            .collect()
    }

    /// Every object in the set that also implements closing, each one
    /// once even when it fills several slots.
    fn closers(&self) -> Vec<&dyn Closer> {
        let candidates = [
            self.closer.as_deref().map(|closer| closer as &dyn Closer),
            self.reader.as_deref().and_then(|c| c.as_closer()),
            self.writer.as_deref().and_then(|c| c.as_closer()),
            self.reader_at.as_deref().and_then(|c| c.as_closer()),
            self.writer_at.as_deref().and_then(|c| c.as_closer()),
            self.seeker.as_deref().and_then(|c| c.as_closer()),
            self.sizer.as_deref().and_then(|c| c.as_closer()),
            self.dir_reader.as_deref().and_then(|c| c.as_closer()),
        ];

        let mut closers: Vec<&dyn Closer> = Vec::new();
        for closer in candidates.into_iter().flatten() {
            if !closers.iter().any(|seen| std::ptr::addr_eq(*seen, closer)) {
                closers.push(closer);
            }
        }
        closers
    }
}

impl fmt::Debug for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitSet")
            .field("capabilities", &self.filled())
            .field("modifiers", &self.modifiers)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

#[derive(Clone)]
enum ReadStrategy {
    Supplied(Arc<dyn Reader>),
    Cursor(Arc<dyn ReaderAt>),
    Unavailable,
}

#[derive(Clone)]
enum WriteStrategy {
    Supplied(Arc<dyn Writer>),
    Cursor(Arc<dyn WriterAt>),
    Unavailable,
}

#[derive(Clone)]
enum SeekStrategy {
    Supplied(Arc<dyn Seeker>),
    /// Tracks the cursor locally, bounded by the size.
    Cursor(Arc<dyn Sizer>),
    Unavailable,
}

#[derive(Clone)]
enum ListStrategy {
    Supplied(Arc<dyn DirReader>),
    /// Lists the children of the directory entry.
    Children,
    Unavailable,
}

/// A validated capability bundle with its synthesis decisions made.
#[derive(Clone)]
pub struct Capabilities {
    traits: TraitSet,
    directory: bool,
    read: ReadStrategy,
    write: WriteStrategy,
    seek: SeekStrategy,
    list: ListStrategy,
}

impl Capabilities {
    /// Validates `traits` and decides what gets synthesized. `directory`
    /// enables the synthesized listing over the entry's children.
    pub fn build(traits: TraitSet, directory: bool) -> FsResult<Self> {
        traits.validate()?;

        // Sequential access is cursor-backed unless the caller brought
        // their own seeker, whose position we can't observe.
        let read = match (&traits.reader, &traits.reader_at, &traits.seeker) {
            (Some(reader), _, _) => ReadStrategy::Supplied(reader.clone()),
            (None, Some(reader_at), None) => ReadStrategy::Cursor(reader_at.clone()),
            _ => ReadStrategy::Unavailable,
        };
        let write = match (&traits.writer, &traits.writer_at, &traits.seeker) {
            (Some(writer), _, _) => WriteStrategy::Supplied(writer.clone()),
            (None, Some(writer_at), None) => WriteStrategy::Cursor(writer_at.clone()),
            _ => WriteStrategy::Unavailable,
        };
        let random_access = traits.reader_at.is_some() || traits.writer_at.is_some();
        let seek = match (&traits.seeker, &traits.sizer) {
            (Some(seeker), _) => SeekStrategy::Supplied(seeker.clone()),
            (None, Some(sizer)) if random_access => SeekStrategy::Cursor(sizer.clone()),
            _ => SeekStrategy::Unavailable,
        };
        let list = match &traits.dir_reader {
            Some(dir_reader) => ListStrategy::Supplied(dir_reader.clone()),
            None if directory && !traits.modifiers.contains(Modifiers::NO_DIR_READER) => {
                ListStrategy::Children
            }
            None => ListStrategy::Unavailable,
        };

        trace!(?traits, directory, "capability bundle built");

        Ok(Self {
            traits,
            directory,
            read,
            write,
            seek,
            list,
        })
    }

    /// A bundle with nothing supplied. Directories still get their listing.
    pub fn empty(directory: bool) -> Self {
        Self {
            traits: TraitSet::default(),
            directory,
            read: ReadStrategy::Unavailable,
            write: WriteStrategy::Unavailable,
            seek: SeekStrategy::Unavailable,
            list: if directory {
                ListStrategy::Children
            } else {
                ListStrategy::Unavailable
            },
        }
    }

    /// A bundle that also holds `extra`, for one particular open.
    pub fn with_extra(&self, extra: TraitSet) -> FsResult<Self> {
        if extra.is_empty() {
            return Ok(self.clone());
        }
        Self::build(self.traits.clone().merge(extra), self.directory)
    }

    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    pub fn modifiers(&self) -> Modifiers {
        self.traits.modifiers
    }

    /// Size as reported by the supplied sizer, if any.
    pub fn size(&self) -> Option<u64> {
        self.traits.sizer.as_ref().map(|sizer| sizer.size())
    }


    /// Builds the per-handle view. `narrow` is applied on top of the
    /// bundle's own modifiers.
    pub fn compose(&self, narrow: Modifiers, append: bool) -> Composed {
        let mask = self.traits.modifiers | narrow;
        let keep = |capability: Capability| !mask.disables(capability);

        let reader = match &self.read {
            ReadStrategy::Supplied(r) if keep(Capability::Reader) => {
                Some(ReadVia::Supplied(r.clone()))
            }
            ReadStrategy::Cursor(at) if keep(Capability::Reader) => {
                Some(ReadVia::Cursor(at.clone()))
            }
            _ => None,
        };
        let writer = match &self.write {
            WriteStrategy::Supplied(w) if keep(Capability::Writer) => {
                Some(WriteVia::Supplied(w.clone()))
            }
            WriteStrategy::Cursor(at) if keep(Capability::Writer) => {
                Some(WriteVia::Cursor(at.clone()))
            }
            _ => None,
        };
        let seeker = match &self.seek {
            SeekStrategy::Supplied(s) if keep(Capability::Seeker) => {
                Some(SeekVia::Supplied(s.clone()))
            }
            SeekStrategy::Cursor(sizer) if keep(Capability::Seeker) => {
                Some(SeekVia::Cursor(sizer.clone()))
            }
            _ => None,
        };
        let dir_reader = match &self.list {
            ListStrategy::Supplied(d) if keep(Capability::DirReader) => {
                Some(ListVia::Supplied(d.clone()))
            }
            ListStrategy::Children if keep(Capability::DirReader) => {
                Some(ListVia::Children(DirCursor::default()))
            }
            _ => None,
        };

        Composed {
            reader,
            writer,
            reader_at: self
                .traits
                .reader_at
                .clone()
                .filter(|_| keep(Capability::ReaderAt)),
            writer_at: self
                .traits
                .writer_at
                .clone()
                .filter(|_| keep(Capability::WriterAt)),
            seeker,
            sizer: self.traits.sizer.clone().filter(|_| keep(Capability::Sizer)),
            dir_reader,
            truncate: !mask.disables(Capability::WriterAt),
            append,
            cursor: 0,
            closed: false,
            source: self.traits.clone(),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("traits", &self.traits)
            .field("directory", &self.directory)
            .finish()
    }
}

enum ReadVia {
    Supplied(Arc<dyn Reader>),
    Cursor(Arc<dyn ReaderAt>),
}

enum WriteVia {
    Supplied(Arc<dyn Writer>),
    Cursor(Arc<dyn WriterAt>),
}

enum SeekVia {
    Supplied(Arc<dyn Seeker>),
    Cursor(Arc<dyn Sizer>),
}

enum ListVia {
    Supplied(Arc<dyn DirReader>),
    Children(DirCursor),
}

/// The capability view owned by one open handle.
///
/// Every call fails with [`FsError::Closed`] once [`Composed::close`] ran,
/// and with [`FsError::Unsupported`] when the capability is missing.
pub struct Composed {
    reader: Option<ReadVia>,
    writer: Option<WriteVia>,
    reader_at: Option<Arc<dyn ReaderAt>>,
    writer_at: Option<Arc<dyn WriterAt>>,
    seeker: Option<SeekVia>,
    sizer: Option<Arc<dyn Sizer>>,
    dir_reader: Option<ListVia>,
    truncate: bool,
    append: bool,
    cursor: u64,
    closed: bool,
    source: TraitSet,
}

impl Composed {
    fn ensure_open(&self) -> FsResult<()> {
        if self.closed {
            Err(FsError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Reader => self.reader.is_some(),
            Capability::Writer => self.writer.is_some(),
            Capability::ReaderAt => self.reader_at.is_some(),
            Capability::WriterAt => self.writer_at.is_some(),
            Capability::Seeker => self.seeker.is_some(),
            Capability::Sizer => self.sizer.is_some(),
            Capability::DirReader => self.dir_reader.is_some(),
            Capability::Closer => true,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        self.ensure_open()?;
        match self.reader.as_ref().ok_or(FsError::Unsupported)? {
            ReadVia::Supplied(reader) => reader.read(buf),
            ReadVia::Cursor(reader_at) => {
                let read = reader_at.read_at(buf, self.cursor)?;
                self.cursor += read as u64;
                Ok(read)
            }
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        self.ensure_open()?;
        match self.writer.as_ref().ok_or(FsError::Unsupported)? {
            WriteVia::Supplied(writer) => writer.write(buf),
            WriteVia::Cursor(writer_at) => {
                if self.append {
                    if let Some(sizer) = &self.source.sizer {
                        self.cursor = sizer.size();
                    }
                }
                let written = writer_at.write_at(buf, self.cursor)?;
                self.cursor += written as u64;
                Ok(written)
            }
        }
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.ensure_open()?;
        self.reader_at
            .as_ref()
            .ok_or(FsError::Unsupported)?
            .read_at(buf, offset)
    }

    pub fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.ensure_open()?;
        self.writer_at
            .as_ref()
            .ok_or(FsError::Unsupported)?
            .write_at(buf, offset)
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> FsResult<u64> {
        self.ensure_open()?;
        match self.seeker.as_ref().ok_or(FsError::Unsupported)? {
            SeekVia::Supplied(seeker) => seeker.seek(offset, whence),
            SeekVia::Cursor(sizer) => {
                self.cursor = seek_within(self.cursor, sizer.size(), offset, whence)?;
                Ok(self.cursor)
            }
        }
    }

    pub fn size(&self) -> FsResult<u64> {
        self.ensure_open()?;
        Ok(self.sizer.as_ref().ok_or(FsError::Unsupported)?.size())
    }

    /// Lists up to `n` entries. `load` fetches the children the first
    /// time a synthesized listing is consulted.
    pub fn read_dir<F>(&mut self, n: isize, load: F) -> FsResult<Vec<DirEntry>>
    where
        F: FnOnce() -> FsResult<Vec<DirEntry>>,
    {
        self.ensure_open()?;
        match self.dir_reader.as_mut().ok_or(FsError::Unsupported)? {
            ListVia::Supplied(dir_reader) => dir_reader.read_dir(n),
            ListVia::Children(cursor) => cursor.read(n, load),
        }
    }

    pub fn set_len(&mut self, len: u64) -> FsResult<()> {
        self.ensure_open()?;
        if !self.truncate {
            return Err(FsError::Unsupported);
        }
        match &self.source.writer_at {
            Some(writer_at) => writer_at.set_len(len),
            None => Err(FsError::Unsupported),
        }
    }

    /// Marks the view closed, then forwards to every supplied object that
    /// implements closing. The first forwarding error is returned, but the
    /// view stays closed either way.
    pub fn close(&mut self) -> FsResult<()> {
        self.ensure_open()?;
        self.closed = true;

        let mut result = Ok(());
        for closer in self.source.closers() {
            if let Err(err) = closer.close() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

/// Resolves a seek against a cursor and a size. Offset 0 is always
/// reachable; anything else has to land inside the content.
pub(crate) fn seek_within(cursor: u64, size: u64, offset: i64, whence: Whence) -> FsResult<u64> {
    let base = match whence {
        Whence::Start => 0i128,
        Whence::Current => i128::from(cursor),
        Whence::End => i128::from(size),
    };
    let target = base + i128::from(offset);

    if target == 0 {
        return Ok(0);
    }
    if target < 0 || target >= i128::from(size) {
        return Err(FsError::InvalidSeek);
    }
    u64::try_from(target).map_err(|_| FsError::InvalidSeek)
}
