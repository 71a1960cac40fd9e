//! # Object Image
//!
//! Read-only view of an object file's raw bytes. Images loaded from disk are
//! backed by a shared read-only memory mapping; images built in memory (by
//! [`crate::writer::ObjectWriter`] or tests) own a byte buffer instead.

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::{elf, Error, Result};

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// Immutable bytes of one object file
pub struct ObjectImage {
    backing: Backing,
    path: Option<PathBuf>,
}

impl ObjectImage {
    /// Map `path` read-only.
    ///
    /// The file descriptor is closed before returning; the mapping lives until
    /// the image is dropped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let meta = file.metadata().map_err(io_err)?;
        if !meta.is_file() {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        // SAFETY: the mapping is read-only; the caller must not truncate the
        // file while the image is alive.
        let map = unsafe { MmapOptions::new().len(meta.len() as usize).map(&file) }.map_err(
            |source| Error::Map {
                what: "object file",
                source,
            },
        )?;

        tracing::debug!(path = %path.display(), len = map.len(), "mapped object image");

        Ok(Self {
            backing: Backing::Mapped(map),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap bytes already in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(bytes),
            path: None,
        }
    }

    /// Raw bytes of the object
    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(map) => &map[..],
            Backing::Owned(buf) => &buf[..],
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether the image holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source path for file-backed images
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the bytes come from a file mapping
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// Bounds-checked sub-slice, `MalformedObject` if out of range
    pub fn range(&self, offset: u64, len: u64, what: &str) -> Result<&[u8]> {
        elf::slice(self.bytes(), offset, len, what)
    }
}

impl std::fmt::Debug for ObjectImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectImage")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_maps_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x7fELF-and-some-bytes").unwrap();
        file.flush().unwrap();

        let image = ObjectImage::load(file.path()).unwrap();
        assert!(image.is_mapped());
        assert_eq!(image.bytes(), b"\x7fELF-and-some-bytes");
        assert_eq!(image.path(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ObjectImage::load("/definitely/not/here/simple.o").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.exit_code(), libc::ENOENT);
    }

    #[test]
    fn test_load_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ObjectImage::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_range_is_bounds_checked() {
        let image = ObjectImage::from_bytes(vec![1, 2, 3, 4]);
        assert_eq!(image.range(1, 2, "probe").unwrap(), &[2, 3]);
        assert!(matches!(
            image.range(3, 2, "probe"),
            Err(Error::MalformedObject(_))
        ));
    }
}
