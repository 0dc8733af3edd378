//! The synchronous I/O provider seam consumed by channel workers.

use std::io;

/// A blocking I/O backend: open-and-size plus read-range.
///
/// One provider instance is shared by every channel worker, so implementations
/// must be `Send + Sync`; per-resource state belongs in [`File`](Self::File).
/// Closing is dropping the file handle.
///
/// Workers call these from their own threads and may block in them; the
/// caller thread never does.
pub trait IoProvider: Send + Sync + 'static {
    /// Per-resource state, e.g. an open file or connection.
    type File: Send + 'static;

    /// Opens `path` and reports its total content size in bytes.
    fn open(&self, path: &str) -> io::Result<(Self::File, u64)>;

    /// Reads exactly `dst.len()` bytes at `offset` into `dst`, returning the
    /// count. A short read must surface as an error (the engine treats any
    /// return other than `Ok(dst.len())` as a failed request).
    fn read(&self, file: &mut Self::File, offset: u64, dst: &mut [u8]) -> io::Result<usize>;
}
