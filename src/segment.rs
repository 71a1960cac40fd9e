//! # Executable Segment Builder
//!
//! Copies `.text` into a fresh anonymous mapping and flips it from
//! read/write to read/execute. A region is either staged (writable, not
//! executable) or live (executable, not writable); the types make the
//! transition one-way.

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::image::ObjectImage;
use crate::structure::Structure;
use crate::{Error, Result};

/// Memory page granularity of the running system
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Round `n` up to a multiple of the page size
pub fn page_align(n: usize) -> usize {
    let page = page_size();
    (n + (page - 1)) & !(page - 1)
}

/// Writable, non-executable copy of the code
pub struct StagedSegment {
    map: MmapMut,
    code_len: usize,
    text_index: usize,
}

impl StagedSegment {
    /// Allocate a read/write region and copy `.text` into it.
    pub fn stage(image: &ObjectImage, structure: &Structure) -> Result<Self> {
        let text = structure.require_section(".text")?;
        if !text.header.has_file_data() {
            return Err(Error::malformed(".text has no file contents"));
        }
        let code = structure.section_data(image, text.header)?;

        // An empty .text still gets one page so the mapping is valid.
        let map_len = page_align(code.len().max(1));
        let mut map = MmapOptions::new()
            .len(map_len)
            .map_anon()
            .map_err(|source| Error::Map {
                what: "executable region",
                source,
            })?;
        map[..code.len()].copy_from_slice(code);

        tracing::debug!(
            code_len = code.len(),
            map_len,
            "staged .text in writable region"
        );

        Ok(Self {
            map,
            code_len: code.len(),
            text_index: text.index,
        })
    }

    /// Staged bytes, `[0, code_len)` is the copied `.text`
    pub fn bytes(&self) -> &[u8] {
        &self.map[..self.code_len]
    }

    /// Length of the mapping (page aligned)
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_len == 0
    }

    /// Make the region read+execute. The region is never writable again.
    ///
    /// On failure the region is unmapped before the error is returned.
    pub fn seal(self) -> Result<ExecutableSegment> {
        let Self {
            map,
            code_len,
            text_index,
        } = self;
        let map = map.make_exec().map_err(|source| Error::Protect { source })?;
        tracing::debug!(base = ?map.as_ptr(), len = map.len(), "region is now read+execute");
        Ok(ExecutableSegment {
            map,
            code_len,
            text_index,
        })
    }
}

/// Read/execute copy of an object's `.text`
pub struct ExecutableSegment {
    map: Mmap,
    code_len: usize,
    text_index: usize,
}

impl ExecutableSegment {
    /// Start address of the loaded code
    pub fn base(&self) -> *const u8 {
        self.map.as_ptr()
    }

    /// Length of the mapping (page aligned)
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_len == 0
    }

    /// Size of the copied `.text`
    pub fn code_len(&self) -> usize {
        self.code_len
    }

    /// Section index of the `.text` this segment was built from
    pub fn text_index(&self) -> usize {
        self.text_index
    }

    /// The loaded code bytes
    pub fn code(&self) -> &[u8] {
        &self.map[..self.code_len]
    }

    /// Whether `offset` falls inside the copied code
    pub fn contains(&self, offset: u64) -> bool {
        offset < self.code_len as u64
    }
}

impl std::fmt::Debug for ExecutableSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableSegment")
            .field("base", &self.base())
            .field("len", &self.len())
            .field("code_len", &self.code_len)
            .finish()
    }
}

/// Stage `.text` and seal it executable in one step
pub fn materialize(image: &ObjectImage, structure: &Structure) -> Result<ExecutableSegment> {
    StagedSegment::stage(image, structure)?.seal()
}
