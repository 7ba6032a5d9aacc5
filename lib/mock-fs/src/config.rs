//! Limits and defaults applied by a [`crate::mem_fs::FileSystem`].

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(default))]
pub struct Config {
    /// How many symlinks a single resolution may follow before it gives
    /// up with [`crate::FsError::TooManySymlinks`].
    pub max_symlinks: u16,
    pub max_name_len: usize,
    /// Owner stamped on every new entry.
    pub uid: u32,
    pub gid: u32,
    pub dir_mode: u32,
    pub file_mode: u32,
    pub symlink_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_symlinks: 40,
            max_name_len: 255,
            uid: 0,
            gid: 0,
            dir_mode: 0o755,
            file_mode: 0o644,
            symlink_mode: 0o777,
        }
    }
}

impl Config {
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_max_symlinks(mut self, max_symlinks: u16) -> Self {
        self.max_symlinks = max_symlinks;
        self
    }
}
