use super::capability::{ReaderAt, Sizer, WriterAt};
use crate::{FsError, FsResult};
use parking_lot::RwLock;

/// A growable byte buffer that backs regular files by default.
///
/// All access is positional, so any number of handles can share one
/// store and keep their own cursors.
#[derive(Debug, Default)]
pub struct ContentStore {
    buffer: RwLock<Vec<u8>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: RwLock::new(contents.into()),
        }
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let buffer = self.buffer.read();
        let start = usize::try_from(offset).map_err(|_| FsError::EndOfData)?;
        if start >= buffer.len() {
            return Err(FsError::EndOfData);
        }

        let available = &buffer[start..];
        let read = available.len().min(buf.len());
        buf[..read].copy_from_slice(&available[..read]);
        Ok(read)
    }

    /// Writes at `offset`, growing the buffer and zero-filling any gap
    /// between the old end and `offset`.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        let start = usize::try_from(offset).map_err(|_| FsError::InvalidInput)?;
        let end = start.checked_add(buf.len()).ok_or(FsError::InvalidInput)?;

        let mut buffer = self.buffer.write();
        if end > buffer.len() {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    pub fn size(&self) -> u64 {
        self.buffer.read().len() as u64
    }

    pub fn set_len(&self, len: u64) -> FsResult<()> {
        let len = usize::try_from(len).map_err(|_| FsError::InvalidInput)?;
        self.buffer.write().resize(len, 0);
        Ok(())
    }

    /// A copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.read().clone()
    }
}

impl ReaderAt for ContentStore {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        ContentStore::read_at(self, buf, offset)
    }
}

impl WriterAt for ContentStore {
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        ContentStore::write_at(self, buf, offset)
    }

    fn set_len(&self, len: u64) -> FsResult<()> {
        ContentStore::set_len(self, len)
    }
}

impl Sizer for ContentStore {
    fn size(&self) -> u64 {
        ContentStore::size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_at() {
        let store = ContentStore::with_contents(b"Hello".to_vec());
        let mut buf = [0; 3];

        assert_eq!(store.read_at(&mut buf, 1), Ok(3));
        assert_eq!(&buf, b"ell");

        assert_eq!(store.read_at(&mut buf, 3), Ok(2), "short read is not an error");
        assert_eq!(&buf[..2], b"lo");

        assert_eq!(store.read_at(&mut buf, 5), Err(FsError::EndOfData));
        assert_eq!(store.read_at(&mut buf, 50), Err(FsError::EndOfData));
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let store = ContentStore::with_contents(b"Hello".to_vec());

        assert_eq!(store.write_at(b"World", 6), Ok(5));
        assert_eq!(store.to_vec(), b"Hello\0World".to_vec());
        assert_eq!(store.size(), 11);
    }

    #[test]
    fn test_overwrite_in_place() {
        let store = ContentStore::with_contents(b"abcdef".to_vec());

        assert_eq!(store.write_at(b"XY", 2), Ok(2));
        assert_eq!(store.to_vec(), b"abXYef".to_vec());
        assert_eq!(store.size(), 6);
    }

    #[test]
    fn test_set_len() {
        let store = ContentStore::with_contents(b"abcdef".to_vec());

        store.set_len(2).unwrap();
        assert_eq!(store.to_vec(), b"ab".to_vec());

        store.set_len(4).unwrap();
        assert_eq!(store.to_vec(), b"ab\0\0".to_vec());
    }
}
