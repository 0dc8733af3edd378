//! Local-filesystem backend for [`fetchlane`].
//!
//! [`FsProvider`] implements [`IoProvider`] over `std::fs`: open-and-size via
//! `File::open` plus metadata, read-range via seek + `read_exact`. A short
//! read (file truncated under a running request) surfaces as
//! `UnexpectedEof`, which the engine reports as a failed request.
//!
//! # Example
//!
//! ```no_run
//! use fetchlane::{Loader, Request};
//! use fetchlane_fs::FsProvider;
//!
//! let mut loader = Loader::new(FsProvider::new());
//! loader
//!     .send(
//!         Request::new("assets/level1.dat", |resp| {
//!             if resp.fetched() {
//!                 // consume resp.data()
//!             }
//!         })
//!         .with_buffer(vec![0; 64 * 1024]),
//!     )
//!     .unwrap();
//! loop {
//!     loader.pump();
//!     // ... rest of the frame ...
//! }
//! ```

use fetchlane::IoProvider;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Serves request paths from the local filesystem, optionally rooted at a
/// base directory.
#[derive(Debug, Default, Clone)]
pub struct FsProvider {
    root: Option<PathBuf>,
}

impl FsProvider {
    /// Resolves request paths as-is (relative to the process working
    /// directory).
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolves request paths under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl IoProvider for FsProvider {
    type File = File;

    fn open(&self, path: &str) -> io::Result<(File, u64)> {
        let file = File::open(self.resolve(path))?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn read(&self, file: &mut File, offset: u64, dst: &mut [u8]) -> io::Result<usize> {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(dst.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_reports_size_and_read_is_positioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"0123456789")
            .unwrap();

        let provider = FsProvider::with_root(dir.path());
        let (mut file, size) = provider.open("data.bin").unwrap();
        assert_eq!(size, 10);

        let mut buf = [0u8; 4];
        assert_eq!(provider.read(&mut file, 4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"4567");
        // Reads are absolute, not sequential.
        assert_eq!(provider.read(&mut file, 0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FsProvider::with_root(dir.path());
        assert!(provider.open("nope.bin").is_err());
    }

    #[test]
    fn test_read_past_end_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::File::create(&path).unwrap().write_all(b"ab").unwrap();

        let provider = FsProvider::with_root(dir.path());
        let (mut file, _) = provider.open("small.bin").unwrap();
        let mut buf = [0u8; 4];
        assert!(provider.read(&mut file, 0, &mut buf).is_err());
    }
}
