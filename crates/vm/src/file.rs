//! The file abstraction memory-mapped and lazily loaded pages read from.

use alloc::sync::Arc;

use crate::IoError;

/// An open file handle.
///
/// Closing a handle is dropping it. Implementations take the file system's own lock
/// around each transfer, so the pager may call them while holding its locks.
pub trait File: Send + Sync {
    /// Opens a new, independent handle to the same file.
    ///
    /// A mapping keeps its own handle so the process closing its descriptor does not
    /// tear the mapping down.
    fn reopen(&self) -> Result<Arc<dyn File>, IoError>;

    /// Reads up to `buffer.len()` bytes starting at `offset`, returning the count read.
    fn read_at(&self, buffer: &mut [u8], offset: u64) -> Result<usize, IoError>;

    /// Writes up to `buffer.len()` bytes starting at `offset`, returning the count written.
    fn write_at(&self, buffer: &[u8], offset: u64) -> Result<usize, IoError>;

    /// Returns the file length in bytes.
    fn len(&self) -> u64;

    /// Returns true if the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
