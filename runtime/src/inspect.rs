//! Memory inspector: the read-only report shown after load and after every
//! grow attempt.

use core::fmt;

use tracing::{debug, warn};

use crate::memory::{LinearMemory, PAGE_SIZE};
use crate::{Error, Result};

/// Number of leading bytes the report decodes.
pub const FIRST_WORD: usize = 4;

/// Snapshot of a linear memory's size and leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectionReport {
    /// Memory size in bytes.
    pub byte_length: usize,
    /// Memory size in 64 KiB pages.
    pub pages: u32,
    /// Bytes `0..4` read as a little-endian `u32`.
    pub first_int: u32,
    /// Bytes `0..4` as they are stored.
    pub first_bytes: [u8; FIRST_WORD],
}

impl InspectionReport {
    /// Builds a report from a byte length and the memory's leading word.
    pub fn from_parts(byte_length: usize, first_bytes: [u8; FIRST_WORD]) -> Self {
        Self {
            byte_length,
            pages: (byte_length / PAGE_SIZE) as u32,
            first_int: u32::from_le_bytes(first_bytes),
            first_bytes,
        }
    }
}

impl fmt::Display for InspectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.first_bytes;
        write!(
            f,
            "memory: {} bytes, pages: {}, first int: {}, first bytes: [{a},{b},{c},{d}]",
            self.byte_length, self.pages, self.first_int
        )
    }
}

/// Produces an [`InspectionReport`] without touching the memory.
pub fn inspect<M: LinearMemory + ?Sized>(memory: &M) -> Result<InspectionReport> {
    let len = memory.byte_len();
    if len < FIRST_WORD {
        return Err(Error::MemoryTooSmall { len });
    }
    let mut first_bytes = [0u8; FIRST_WORD];
    memory.read(0, &mut first_bytes)?;
    Ok(InspectionReport::from_parts(len, first_bytes))
}

/// Grows the memory by exactly one page, then re-inspects it.
///
/// A refused grow is returned as [`Error::GrowRefused`] and logged; the
/// memory is unchanged in that case and can still be inspected.
pub fn grow_and_inspect<M: LinearMemory + ?Sized>(memory: &mut M) -> Result<InspectionReport> {
    match memory.grow(1) {
        Ok(previous) => {
            debug!(previous, current = memory.page_count(), "memory grew by one page");
            inspect(memory)
        }
        Err(err) => {
            warn!(pages = memory.page_count(), error = %err, "memory refused to grow");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HostMemory;

    #[test]
    fn ten_zeroed_pages() {
        let mem = HostMemory::new(10, None).unwrap();
        let report = inspect(&mem).unwrap();

        assert_eq!(
            report,
            InspectionReport {
                byte_length: 655_360,
                pages: 10,
                first_int: 0,
                first_bytes: [0, 0, 0, 0],
            }
        );
    }

    #[test]
    fn one_grow_adds_one_page() {
        let mut mem = HostMemory::new(10, None).unwrap();
        let report = grow_and_inspect(&mut mem).unwrap();

        assert_eq!(report.byte_length, 720_896);
        assert_eq!(report.pages, 11);
    }

    #[test]
    fn first_int_is_little_endian() {
        let mut mem = HostMemory::new(1, None).unwrap();
        mem.write(0, &[1, 0, 0, 0]).unwrap();
        assert_eq!(inspect(&mem).unwrap().first_int, 1);

        mem.write(0, &[0x78, 0x56, 0x34, 0x12]).unwrap();
        let report = inspect(&mem).unwrap();
        assert_eq!(report.first_int, 0x1234_5678);
        assert_eq!(report.first_bytes, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn refused_grow_keeps_previous_report() {
        let mut mem = HostMemory::new(1, Some(1)).unwrap();
        mem.write(0, &[9, 0, 0, 0]).unwrap();
        let before = inspect(&mem).unwrap();

        assert!(matches!(
            grow_and_inspect(&mut mem),
            Err(Error::GrowRefused { current: 1, delta: 1 })
        ));
        assert_eq!(inspect(&mem).unwrap(), before);
    }

    #[test]
    fn empty_memory_cannot_be_inspected() {
        let mem = HostMemory::new(0, None).unwrap();
        assert!(matches!(inspect(&mem), Err(Error::MemoryTooSmall { len: 0 })));
    }

    #[test]
    fn display_matches_demo_layout() {
        let report = InspectionReport::from_parts(65_536, [72, 101, 108, 108]);
        assert_eq!(
            report.to_string(),
            "memory: 65536 bytes, pages: 1, first int: 1819043144, first bytes: [72,101,108,108]"
        );
    }
}
