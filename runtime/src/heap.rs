//! Bump allocator behind the `env.malloc` import.
//!
//! Allocation hands out the current cursor and advances it. Nothing is ever
//! freed; `reset` rewinds the whole heap at once.

use crate::{Error, Result};

/// Monotonic allocator over a region of linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpAllocator {
    base: u32,
    next: u32,
}

impl BumpAllocator {
    /// Creates an allocator whose first allocation starts at `base`.
    pub const fn new(base: u32) -> Self {
        Self { base, next: base }
    }

    /// Reserves `size` bytes and returns their offset.
    ///
    /// `limit` is the current memory size in bytes. When the request does not
    /// fit, the cursor stays where it was.
    pub fn malloc(&mut self, size: u32, limit: usize) -> Result<u32> {
        let offset = self.next;
        let end = offset.checked_add(size).filter(|end| *end as usize <= limit);
        match end {
            Some(end) => {
                self.next = end;
                Ok(offset)
            }
            None => Err(Error::HeapExhausted {
                requested: size,
                offset,
                limit,
            }),
        }
    }

    /// Offset the next allocation will return.
    pub fn cursor(&self) -> u32 {
        self.next
    }

    /// Bytes handed out since creation or the last reset.
    pub fn used(&self) -> u32 {
        self.next - self.base
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

impl Default for BumpAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_previous_offset_and_advances() {
        let mut heap = BumpAllocator::new(16);
        assert_eq!(heap.malloc(8, 1024).unwrap(), 16);
        assert_eq!(heap.malloc(4, 1024).unwrap(), 24);
        assert_eq!(heap.cursor(), 28);
        assert_eq!(heap.used(), 12);
    }

    #[test]
    fn zero_sized_requests_share_the_cursor() {
        let mut heap = BumpAllocator::default();
        assert_eq!(heap.malloc(0, 16).unwrap(), 0);
        assert_eq!(heap.malloc(0, 16).unwrap(), 0);
    }

    #[test]
    fn exhaustion_fails_without_moving_the_cursor() {
        let mut heap = BumpAllocator::new(0);
        heap.malloc(10, 16).unwrap();

        let err = heap.malloc(7, 16).unwrap_err();
        assert!(matches!(
            err,
            Error::HeapExhausted {
                requested: 7,
                offset: 10,
                limit: 16
            }
        ));
        assert_eq!(heap.cursor(), 10);
        // An exact fit still succeeds.
        assert_eq!(heap.malloc(6, 16).unwrap(), 10);
    }

    #[test]
    fn overflowing_requests_are_refused() {
        let mut heap = BumpAllocator::new(u32::MAX - 1);
        assert!(heap.malloc(4, usize::MAX).is_err());
        assert_eq!(heap.cursor(), u32::MAX - 1);
    }

    #[test]
    fn reset_rewinds_to_base() {
        let mut heap = BumpAllocator::new(32);
        heap.malloc(64, 4096).unwrap();
        heap.reset();
        assert_eq!(heap.malloc(1, 4096).unwrap(), 32);
    }
}
