//! Superpage descriptors and buffer partitioning.

use crate::error::{Error, Result};

/// A region of the DMA buffer handed to the card as one transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superpage {
    /// Byte offset into the DMA buffer.
    pub offset: usize,
    /// Region size in bytes.
    pub size: usize,
    /// Bytes the card has written so far.
    pub received: usize,
}

impl Superpage {
    /// Fresh, empty superpage.
    pub const fn new(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            received: 0,
        }
    }

    /// Whether the card has completely filled the region.
    #[inline]
    pub const fn is_filled(&self) -> bool {
        self.received >= self.size
    }
}

/// How the DMA buffer is divided into superpages and pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperpageLayout {
    buffer_size: usize,
    superpage_size: usize,
    page_size: usize,
}

impl SuperpageLayout {
    /// Build a layout. The buffer must hold at least one superpage and the
    /// superpage must be a whole number of pages.
    pub fn new(buffer_size: usize, superpage_size: usize, page_size: usize) -> Result<Self> {
        if page_size == 0 || superpage_size == 0 || superpage_size % page_size != 0 {
            return Err(Error::Config(format!(
                "superpage size {superpage_size} is not a multiple of page size {page_size}"
            )));
        }
        if buffer_size / superpage_size < 1 {
            return Err(Error::Config(format!(
                "buffer too small: {buffer_size} bytes cannot hold a {superpage_size} byte superpage"
            )));
        }
        Ok(Self {
            buffer_size,
            superpage_size,
            page_size,
        })
    }

    /// Number of superpages in the buffer. Trailing bytes are unused.
    pub fn count(&self) -> usize {
        self.buffer_size / self.superpage_size
    }

    /// Superpage size in bytes.
    pub fn superpage_size(&self) -> usize {
        self.superpage_size
    }

    /// DMA page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages in one superpage.
    pub fn pages_per_superpage(&self) -> usize {
        self.superpage_size / self.page_size
    }

    /// Offset of superpage `index`.
    pub fn offset(&self, index: usize) -> usize {
        index * self.superpage_size
    }

    /// All superpage offsets, ascending.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count()).map(|i| self.offset(i))
    }

    /// Whether `offset` is the start of one of this layout's superpages.
    pub fn contains(&self, offset: usize) -> bool {
        offset % self.superpage_size == 0 && offset / self.superpage_size < self.count()
    }
}
