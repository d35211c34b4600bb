//! Filesystem operations.

use crate::HalResult;
use std::path::Path;

pub trait FileOps {
    fn path_exists(&self, path: &Path) -> HalResult<bool>;
    /// Missing file is `Ok(None)`.
    fn read_to_string(&self, path: &Path) -> HalResult<Option<String>>;
    /// Owning user name, `None` when the path is missing.
    fn owner(&self, path: &Path) -> HalResult<Option<String>>;

    /// Write atomically (temp file + rename) and set the mode.
    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> HalResult<()>;
    fn create_dir_all(&self, path: &Path, mode: u32) -> HalResult<()>;
    fn chown(&self, path: &Path, user: &str, group: &str, recursive: bool) -> HalResult<()>;
    fn rename(&self, from: &Path, to: &Path) -> HalResult<()>;
    fn remove_file(&self, path: &Path) -> HalResult<()>;
    /// Copy a file and set the destination mode (like `install -m`).
    fn install_file(&self, src: &Path, dst: &Path, mode: u32) -> HalResult<()>;
}
