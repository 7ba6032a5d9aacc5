//! Common [`FileSystem`] operations built on top of the trait methods.

use std::path::Path;

use crate::{FileSystem, FsError, Op, PathError, Result};

/// Does this item exists?
pub fn exists<F>(fs: &F, path: impl AsRef<Path>) -> bool
where
    F: FileSystem + ?Sized,
{
    fs.stat(path.as_ref()).is_ok()
}

/// Does this path refer to a directory?
pub fn is_dir<F>(fs: &F, path: impl AsRef<Path>) -> bool
where
    F: FileSystem + ?Sized,
{
    matches!(fs.stat(path.as_ref()), Ok(meta) if meta.is_dir())
}

/// Does this path refer to a file?
pub fn is_file<F>(fs: &F, path: impl AsRef<Path>) -> bool
where
    F: FileSystem + ?Sized,
{
    matches!(fs.stat(path.as_ref()), Ok(meta) if meta.is_file())
}

/// Make sure a directory (and all its parents) exist.
pub fn create_dir_all<F>(fs: &F, path: impl AsRef<Path>) -> Result<()>
where
    F: FileSystem + ?Sized,
{
    fs.mkdir_all(path.as_ref(), 0o755)
}

/// Create a file if it doesn't already exist, leaving its contents alone.
pub fn touch<F>(fs: &F, path: impl AsRef<Path>) -> Result<()>
where
    F: FileSystem + ?Sized,
{
    fs.new_open_options()
        .create(true)
        .write(true)
        .open(path)?
        .close()
}

/// Write a buffer to a file, replacing whatever was there.
pub fn write_file<F>(fs: &F, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Result<()>
where
    F: FileSystem + ?Sized,
{
    let path = path.as_ref();
    let mut file = fs.create(path)?;

    let mut data = data.as_ref();
    while !data.is_empty() {
        match file.write(data)? {
            0 => return Err(PathError::new(Op::Write, path, FsError::IOError)),
            written => data = &data[written..],
        }
    }

    file.close()
}

/// Read a file's contents into memory.
pub fn read_file<F>(fs: &F, path: impl AsRef<Path>) -> Result<Vec<u8>>
where
    F: FileSystem + ?Sized,
{
    let mut file = fs.open(path.as_ref())?;
    let mut contents = Vec::new();
    let mut buf = [0; 4096];

    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => contents.extend_from_slice(&buf[..read]),
            Err(err) if err.is_eof() => break,
            Err(err) => return Err(err),
        }
    }

    file.close()?;
    Ok(contents)
}

/// Read a file's contents as a UTF-8 string.
pub fn read_to_string<F>(fs: &F, path: impl AsRef<Path>) -> Result<String>
where
    F: FileSystem + ?Sized,
{
    let path = path.as_ref();
    let contents = read_file(fs, path)?;
    String::from_utf8(contents).map_err(|_| PathError::new(Op::Read, path, FsError::InvalidInput))
}
