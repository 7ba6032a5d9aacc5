use crate::{DirEntry, FsError, FsResult};

/// Stateful listing over a snapshot of a directory.
///
/// The snapshot is taken, and sorted by name, on the first read. Later
/// changes to the directory are not observed by this cursor.
#[derive(Debug, Default)]
pub struct DirCursor {
    entries: Option<Vec<DirEntry>>,
    position: usize,
}

impl DirCursor {
    /// Returns up to `n` entries, or every remaining one when `n <= 0`.
    ///
    /// A positive `n` with nothing left fails with
    /// [`FsError::EndOfData`], and keeps failing on every later call.
    /// A non-positive `n` never fails for exhaustion; it yields an empty
    /// list instead.
    pub fn read<F>(&mut self, n: isize, load: F) -> FsResult<Vec<DirEntry>>
    where
        F: FnOnce() -> FsResult<Vec<DirEntry>>,
    {
        if self.entries.is_none() {
            let mut entries = load()?;
            entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            self.entries = Some(entries);
        }
        let entries = self.entries.as_deref().unwrap_or_default();
        let remaining = &entries[self.position.min(entries.len())..];

        if n <= 0 {
            self.position = entries.len();
            return Ok(remaining.to_vec());
        }
        if remaining.is_empty() {
            return Err(FsError::EndOfData);
        }

        let take = remaining.len().min(n.unsigned_abs());
        self.position += take;
        Ok(remaining[..take].to_vec())
    }
}
