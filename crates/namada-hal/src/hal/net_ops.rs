//! Network downloads.

use crate::HalResult;

pub trait NetOps {
    /// Fetch `url` fully into memory.
    fn fetch(&self, url: &str) -> HalResult<Vec<u8>>;
}
