//! # Configuration
//!
//! Page geometry and directory tuning knobs. All values are fixed at page
//! creation and immutable for the lifetime of a page.

mod constants;

pub use constants::{
    DIR_SLOT_SIZE, HEAP_NO_USER_LOW, MAX_HEAP_NO, MAX_OWNED, MIN_OWNED, OWNED_REBUILD_GROUP,
};

use eyre::{bail, Result};

/// Supported page sizes. Every size is a power of two, which the record
/// next-pointer arithmetic relies on (relative pointers wrap modulo the
/// page size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Kb4,
    Kb8,
    Kb16,
    Kb32,
    Kb64,
}

pub const DEFAULT_PAGE_SIZE: PageSize = PageSize::Kb16;

impl PageSize {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            PageSize::Kb4 => 4096,
            PageSize::Kb8 => 8192,
            PageSize::Kb16 => 16384,
            PageSize::Kb32 => 32768,
            PageSize::Kb64 => 65536,
        }
    }

    pub fn from_bytes(bytes: usize) -> Result<Self> {
        Ok(match bytes {
            4096 => PageSize::Kb4,
            8192 => PageSize::Kb8,
            16384 => PageSize::Kb16,
            32768 => PageSize::Kb32,
            65536 => PageSize::Kb64,
            other => bail!("unsupported page size: {other}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes_round_trip() {
        for size in [
            PageSize::Kb4,
            PageSize::Kb8,
            PageSize::Kb16,
            PageSize::Kb32,
            PageSize::Kb64,
        ] {
            assert_eq!(PageSize::from_bytes(size.bytes()).unwrap(), size);
        }
    }

    #[test]
    fn odd_page_size_rejected() {
        assert!(PageSize::from_bytes(12345).is_err());
        assert!(PageSize::from_bytes(2048).is_err());
    }

    #[test]
    fn page_sizes_are_powers_of_two() {
        for size in [
            PageSize::Kb4,
            PageSize::Kb8,
            PageSize::Kb16,
            PageSize::Kb32,
            PageSize::Kb64,
        ] {
            assert!(size.bytes().is_power_of_two());
        }
    }
}
