//! Memory-mapped DMA buffer.
//!
//! The buffer is one contiguous mapping, normally a file on a hugetlbfs
//! mount so the card can be given physically contiguous hugepages. Pages are
//! accessed through [`PageView`], a bounds-checked window with volatile word
//! access, since the card (or the emulator) writes into the mapping behind
//! the compiler's back.

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io;
use std::marker::PhantomData;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Word size the generator and verifier operate on.
pub const WORD_SIZE: usize = std::mem::size_of::<u32>();

/// An owned memory mapping used as the DMA target.
pub struct DmaBuffer {
    ptr: NonNull<u8>,
    len: usize,
    /// Backing file, removed on drop when set.
    remove_on_drop: Option<PathBuf>,
    path: Option<PathBuf>,
}

// SAFETY: the mapping is owned by this struct and only accessed through
// volatile reads/writes on disjoint superpages handed out by the queues.
unsafe impl Send for DmaBuffer {}
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    /// Map `len` bytes of anonymous memory.
    pub fn anonymous(len: usize) -> Result<Self> {
        use nix::libc::{mmap, MAP_ANONYMOUS, MAP_SHARED, PROT_READ, PROT_WRITE};
        use std::ptr::null_mut;

        if len == 0 {
            return Err(Error::Config("DMA buffer length must be > 0".to_string()));
        }

        // SAFETY: anonymous mapping, no fd involved
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED | MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        let ptr = check_mapping(ptr, "anonymous mmap failed")?;

        Ok(Self {
            ptr,
            len,
            remove_on_drop: None,
            path: None,
        })
    }

    /// Map `len` bytes of the file at `path`, creating and sizing it.
    pub fn map_file(path: &Path, len: usize, remove_on_drop: bool) -> Result<Self> {
        use nix::libc::{mmap, MAP_SHARED, PROT_READ, PROT_WRITE};
        use std::ptr::null_mut;

        if len == 0 {
            return Err(Error::Config("DMA buffer length must be > 0".to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::buffer(format!("failed to open {}", path.display()), e))?;
        file.set_len(len as u64)
            .map_err(|e| Error::buffer(format!("failed to size {}", path.display()), e))?;

        // SAFETY: fd is valid for the duration of the call; the mapping
        // outlives the file handle.
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        let ptr = check_mapping(ptr, &format!("failed to map {}", path.display()))?;

        tracing::debug!(path = %path.display(), len, "mapped DMA buffer");

        Ok(Self {
            ptr,
            len,
            remove_on_drop: remove_on_drop.then(|| path.to_path_buf()),
            path: Some(path.to_path_buf()),
        })
    }

    /// Mapping length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length buffers are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Userspace address of the first byte.
    pub fn base_address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Window of `len` bytes starting at `offset`.
    pub fn view(&self, offset: usize, len: usize) -> Result<PageView<'_>> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| Error::Config(format!("page view {offset}+{len} overflows")))?;
        if end > self.len {
            return Err(Error::Config(format!(
                "page view {offset}..{end} outside buffer of {} bytes",
                self.len
            )));
        }
        if offset % WORD_SIZE != 0 || len % WORD_SIZE != 0 {
            return Err(Error::Config(format!(
                "page view {offset}+{len} not aligned to {WORD_SIZE} bytes"
            )));
        }
        // SAFETY: offset is within the mapping, checked above
        let ptr = unsafe { self.ptr.as_ptr().add(offset) }.cast::<u32>();
        Ok(PageView {
            ptr,
            words: len / WORD_SIZE,
            _buffer: PhantomData,
        })
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("len", &self.len)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        // SAFETY: we own the mapping
        unsafe {
            nix::libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        if let Some(path) = self.remove_on_drop.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove pages file");
            }
        }
    }
}

fn check_mapping(ptr: *mut nix::libc::c_void, what: &str) -> Result<NonNull<u8>> {
    if ptr == nix::libc::MAP_FAILED {
        return Err(Error::buffer(what, io::Error::last_os_error()));
    }
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| Error::buffer(what, io::Error::other("mmap returned null")))
}

/// Bounds-checked window into a [`DmaBuffer`].
#[derive(Clone, Copy)]
pub struct PageView<'a> {
    ptr: *mut u32,
    words: usize,
    _buffer: PhantomData<&'a DmaBuffer>,
}

// SAFETY: same reasoning as DmaBuffer; the view borrows the buffer.
unsafe impl Send for PageView<'_> {}
unsafe impl Sync for PageView<'_> {}

impl PageView<'_> {
    /// Number of 32-bit words in the view.
    #[inline]
    pub fn len_words(&self) -> usize {
        self.words
    }

    /// Length in bytes.
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.words * WORD_SIZE
    }

    /// Volatile read of word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn word(&self, index: usize) -> u32 {
        assert!(index < self.words, "word {index} out of range ({})", self.words);
        // SAFETY: index checked, pointer aligned and inside the mapping
        unsafe { self.ptr.add(index).read_volatile() }
    }

    /// Volatile write of word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn write_word(&self, index: usize, value: u32) {
        assert!(index < self.words, "word {index} out of range ({})", self.words);
        // SAFETY: index checked, pointer aligned and inside the mapping
        unsafe { self.ptr.add(index).write_volatile(value) }
    }

    /// Set every word to `value`.
    pub fn fill(&self, value: u32) {
        for i in 0..self.words {
            // SAFETY: i < words
            unsafe { self.ptr.add(i).write_volatile(value) }
        }
    }

    /// Append the raw bytes of the view to `out`.
    pub fn copy_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.len_bytes());
        for i in 0..self.words {
            out.extend_from_slice(&self.word(i).to_ne_bytes());
        }
    }
}
