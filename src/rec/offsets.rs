//! # Record Offsets Cache
//!
//! Decoding a record's header yields one end offset per field; everything a
//! page operation needs afterwards — field slices, record size, external
//! flags — derives from that array in O(1). [`RecOffsets`] caches the
//! decoded form.
//!
//! Each end-offset entry carries two flag bits above the offset value:
//!
//! ```text
//! bit 31  NULL      field is SQL-null (offset equals the previous end)
//! bit 30  EXTERNAL  field is stored off-page behind a 20-byte reference
//! ```
//!
//! Construction reuses the caller's `RecOffsets` in place: the backing
//! `SmallVec` keeps its capacity across refills, so hot paths decode
//! without allocating. Records with more fields than the inline capacity
//! spill to the heap once and stay there.

use smallvec::SmallVec;

/// Field is SQL-null.
pub const OFFS_NULL: u32 = 1 << 31;
/// Field is stored externally.
pub const OFFS_EXTERNAL: u32 = 1 << 30;
const OFFS_MASK: u32 = OFFS_EXTERNAL - 1;

/// Inline capacity covering typical index widths without allocation.
const INLINE_FIELDS: usize = 20;

/// Decoded per-field offsets of one record. Valid only until the record
/// moves or the page mutates; page offsets and heap numbers are the stable
/// identifiers, not this cache.
#[derive(Debug, Clone, Default)]
pub struct RecOffsets {
    compact: bool,
    any_external: bool,
    extra_size: u16,
    ends: SmallVec<[u32; INLINE_FIELDS]>,
}

impl RecOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a refill, retaining the backing capacity.
    pub(crate) fn reset(&mut self, compact: bool, extra_size: usize) {
        self.compact = compact;
        self.any_external = false;
        self.extra_size = extra_size as u16;
        self.ends.clear();
    }

    pub(crate) fn set_extra_size(&mut self, extra_size: usize) {
        self.extra_size = extra_size as u16;
    }

    pub(crate) fn push_end(&mut self, end: u32) {
        if end & OFFS_EXTERNAL != 0 {
            self.any_external = true;
        }
        self.ends.push(end);
    }

    #[inline]
    pub fn n_fields(&self) -> usize {
        self.ends.len()
    }

    #[inline]
    pub fn is_compact(&self) -> bool {
        self.compact
    }

    /// Whether any field of the record is stored externally.
    #[inline]
    pub fn any_external(&self) -> bool {
        self.any_external
    }

    /// Header bytes before the record origin.
    #[inline]
    pub fn extra_size(&self) -> usize {
        self.extra_size as usize
    }

    /// Data bytes from the origin to the end of the last field.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.ends.last().map_or(0, |e| (e & OFFS_MASK) as usize)
    }

    /// Total record footprint: header plus data.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.extra_size() + self.data_size()
    }

    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        self.ends[i] & OFFS_NULL != 0
    }

    #[inline]
    pub fn is_external(&self, i: usize) -> bool {
        self.ends[i] & OFFS_EXTERNAL != 0
    }

    /// Data bounds of field `i`, relative to the record origin. A NULL
    /// field yields an empty range in the compact format and its
    /// placeholder range in the redundant format.
    pub fn field_bounds(&self, i: usize) -> (usize, usize) {
        let start = if i == 0 {
            0
        } else {
            (self.ends[i - 1] & OFFS_MASK) as usize
        };
        let end = (self.ends[i] & OFFS_MASK) as usize;
        (start, end)
    }

    /// Field `i` of the record at `origin` in `page`. `None` for SQL-null.
    pub fn field_slice<'p>(&self, page: &'p [u8], origin: usize, i: usize) -> Option<&'p [u8]> {
        if self.is_null(i) {
            return None;
        }
        let (start, end) = self.field_bounds(i);
        Some(&page[origin + start..origin + end])
    }

    /// Number of externally stored fields among the first `n`.
    pub fn n_extern_in_first(&self, n: usize) -> usize {
        self.ends[..n.min(self.ends.len())]
            .iter()
            .filter(|e| *e & OFFS_EXTERNAL != 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecOffsets {
        let mut offs = RecOffsets::new();
        offs.reset(true, 7);
        offs.push_end(4); // fixed int
        offs.push_end(9); // "hello"
        offs.push_end(9 | OFFS_NULL); // null
        offs.push_end(29 | OFFS_EXTERNAL); // 20-byte overflow ref
        offs
    }

    #[test]
    fn sizes_add_up() {
        let offs = sample();
        assert_eq!(offs.n_fields(), 4);
        assert_eq!(offs.extra_size(), 7);
        assert_eq!(offs.data_size(), 29);
        assert_eq!(offs.total_size(), 36);
    }

    #[test]
    fn field_bounds_ignore_flag_bits() {
        let offs = sample();
        assert_eq!(offs.field_bounds(0), (0, 4));
        assert_eq!(offs.field_bounds(1), (4, 9));
        assert_eq!(offs.field_bounds(2), (9, 9));
        assert_eq!(offs.field_bounds(3), (9, 29));
    }

    #[test]
    fn null_and_external_flags() {
        let offs = sample();
        assert!(!offs.is_null(0));
        assert!(offs.is_null(2));
        assert!(offs.is_external(3));
        assert!(offs.any_external());
        assert_eq!(offs.n_extern_in_first(3), 0);
        assert_eq!(offs.n_extern_in_first(4), 1);
    }

    #[test]
    fn null_field_slice_is_none() {
        let offs = sample();
        let page = vec![0xabu8; 256];
        assert!(offs.field_slice(&page, 100, 2).is_none());
        assert_eq!(offs.field_slice(&page, 100, 0).unwrap().len(), 4);
    }

    #[test]
    fn reset_reuses_capacity() {
        let mut offs = sample();
        let cap_before = offs.ends.capacity();
        offs.reset(false, 8);
        assert_eq!(offs.n_fields(), 0);
        assert!(!offs.any_external());
        assert_eq!(offs.ends.capacity(), cap_before);
    }
}
