//! Linear memory abstraction.
//!
//! A linear memory is always a whole number of 64 KiB pages. It can only be
//! grown, and only in page units. The inspector and the host functions work
//! against the [`LinearMemory`] trait so they do not care whether the bytes
//! live in a plain `Vec` ([`HostMemory`]) or inside an engine's store.

use crate::{Error, Result};

/// WebAssembly page size in bytes.
pub const PAGE_SIZE: usize = 0x10000;

/// Largest page count a 32-bit linear memory can address.
pub const MAX_PAGES: u32 = 0x10000;

/// Read and grow access to a page-granular linear memory.
pub trait LinearMemory {
    /// Current size in bytes. Always a multiple of [`PAGE_SIZE`].
    fn byte_len(&self) -> usize;

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Grows the memory by `delta` pages and returns the previous page count.
    ///
    /// On failure the memory is left untouched.
    fn grow(&mut self, delta: u32) -> Result<u32>;

    /// Current size in pages.
    fn page_count(&self) -> u32 {
        (self.byte_len() / PAGE_SIZE) as u32
    }
}

/// Checks that `offset..offset + len` lies inside a memory of `size` bytes.
pub(crate) fn check_bounds(offset: usize, len: usize, size: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(Error::OutOfBounds { offset, len, size }),
    }
}

/// A borrowed snapshot of memory bytes, as engines hand out while the store is
/// borrowed. It cannot grow.
impl LinearMemory for [u8] {
    fn byte_len(&self) -> usize {
        self.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let end = check_bounds(offset, buf.len(), self.len())?;
        buf.copy_from_slice(&self[offset..end]);
        Ok(())
    }

    fn grow(&mut self, delta: u32) -> Result<u32> {
        Err(Error::GrowRefused {
            current: self.page_count(),
            delta,
        })
    }
}

/// Host-allocated linear memory backed by a `Vec<u8>`.
///
/// Mirrors what an embedder gets when it creates the memory itself and hands
/// it to the module as an import: an initial size fixed at creation and an
/// optional maximum that bounds growth.
#[derive(Debug, Clone)]
pub struct HostMemory {
    bytes: Vec<u8>,
    maximum_pages: Option<u32>,
}

impl HostMemory {
    /// Allocates `initial_pages` zeroed pages.
    pub fn new(initial_pages: u32, maximum_pages: Option<u32>) -> Result<Self> {
        let ceiling = maximum_pages.unwrap_or(MAX_PAGES);
        if ceiling > MAX_PAGES {
            return Err(Error::Config(format!(
                "maximum of {ceiling} pages exceeds the 32-bit limit of {MAX_PAGES}"
            )));
        }
        if initial_pages > ceiling {
            return Err(Error::Config(format!(
                "initial size of {initial_pages} pages exceeds maximum of {ceiling}"
            )));
        }
        Ok(Self {
            bytes: vec![0; initial_pages as usize * PAGE_SIZE],
            maximum_pages,
        })
    }

    /// Writes `data` at `offset`. Used to seed memory contents.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = check_bounds(offset, data.len(), self.bytes.len())?;
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Read-only view of the whole memory.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl LinearMemory for HostMemory {
    fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let end = check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn grow(&mut self, delta: u32) -> Result<u32> {
        let current = self.page_count();
        let ceiling = self.maximum_pages.unwrap_or(MAX_PAGES);
        let new = current
            .checked_add(delta)
            .filter(|pages| *pages <= ceiling)
            .ok_or(Error::GrowRefused { current, delta })?;
        // New pages are zero-initialised.
        self.bytes.resize(new as usize * PAGE_SIZE, 0);
        Ok(current)
    }
}
