//! # Record Header Accessors
//!
//! Every record carries a bit-packed header immediately before its origin.
//! The two record formats pack the same logical fields differently, so the
//! accessors live behind the [`RecFmt`] capability trait with one
//! implementation per format. Page operations read the page's format flag
//! once and monomorphize on it; no per-record dispatch happens.
//!
//! ## Compact header, from the origin backward
//!
//! ```text
//! origin-1..origin-2   next pointer: u16, big-endian, origin-relative,
//!                      wraps modulo the page size; 0 = end of list
//! origin-3..origin-4   heap_no (13 bits) << 3 | status (3 bits)
//! origin-5             info bits (high nibble) | n_owned (low nibble)
//! ```
//!
//! ## Redundant header, from the origin backward
//!
//! ```text
//! origin-1..origin-2   next pointer: u16, big-endian, absolute; 0 = end
//! origin-3..origin-4   n_fields (10 bits) << 1 | 1-byte-offsets flag
//! origin-4..origin-5   heap_no (13 bits) << 3, sharing origin-4 with the
//!                      three high bits of the n_fields word
//! origin-6             info bits (high nibble) | n_owned (low nibble)
//! ```
//!
//! Redundant records carry no status bits: the sentinels are recognized by
//! their fixed offsets and node pointers by the page level.

use crate::page::layout;
use crate::rec::{RecInfo, RecStatus};

const N_OWNED_MASK: u8 = 0x0f;
const INFO_MASK: u8 = 0xf0;
const HEAP_NO_SHIFT: u16 = 3;
const STATUS_MASK: u16 = 0x7;

#[inline]
fn read_u16(page: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([page[at], page[at + 1]])
}

#[inline]
fn write_u16(page: &mut [u8], at: usize, val: u16) {
    page[at..at + 2].copy_from_slice(&val.to_be_bytes());
}

/// Capability set of one record format. All offsets are record origins
/// (absolute within the page frame).
pub trait RecFmt: Copy + 'static {
    const COMPACT: bool;
    /// Fixed header bytes between the variable header part and the origin.
    const EXTRA_BYTES: usize;
    /// Origin of the infimum sentinel.
    const INFIMUM: usize;
    /// Origin of the supremum sentinel.
    const SUPREMUM: usize;
    /// First byte of the user record heap on an empty page.
    const HEAP_START: usize;

    /// Absolute origin of the successor record, or 0 at the end of a list.
    fn next_offs(page: &[u8], rec: usize) -> usize;
    fn set_next_offs(page: &mut [u8], rec: usize, next: usize);

    fn n_owned(page: &[u8], rec: usize) -> u8;
    fn set_n_owned(page: &mut [u8], rec: usize, n: u8);

    fn heap_no(page: &[u8], rec: usize) -> u16;
    fn set_heap_no(page: &mut [u8], rec: usize, heap_no: u16);

    fn info_bits(page: &[u8], rec: usize) -> RecInfo;
    fn set_info_bits(page: &mut [u8], rec: usize, info: RecInfo);

    fn status(page: &[u8], rec: usize) -> RecStatus;

    #[inline]
    fn is_infimum(rec: usize) -> bool {
        rec == Self::INFIMUM
    }

    #[inline]
    fn is_supremum(rec: usize) -> bool {
        rec == Self::SUPREMUM
    }

    #[inline]
    fn is_user(rec: usize) -> bool {
        rec != Self::INFIMUM && rec != Self::SUPREMUM
    }
}

/// The modern record format (`compact_format = true`).
#[derive(Debug, Clone, Copy)]
pub struct Compact;

/// The legacy record format.
#[derive(Debug, Clone, Copy)]
pub struct Redundant;

impl Compact {
    /// Sets the 3-bit status, preserving the heap number.
    pub fn set_status(page: &mut [u8], rec: usize, status: RecStatus) {
        let word = read_u16(page, rec - 4);
        write_u16(page, rec - 4, (word & !STATUS_MASK) | status as u16);
    }
}

impl RecFmt for Compact {
    const COMPACT: bool = true;
    const EXTRA_BYTES: usize = layout::COMPACT_EXTRA_BYTES;
    const INFIMUM: usize = layout::COMPACT_INFIMUM;
    const SUPREMUM: usize = layout::COMPACT_SUPREMUM;
    const HEAP_START: usize = layout::COMPACT_HEAP_START;

    #[inline]
    fn next_offs(page: &[u8], rec: usize) -> usize {
        let field = read_u16(page, rec - 2) as usize;
        if field == 0 {
            return 0;
        }
        // Relative pointer, wrapping modulo the (power of two) page size.
        (rec + field) & (page.len() - 1)
    }

    #[inline]
    fn set_next_offs(page: &mut [u8], rec: usize, next: usize) {
        let field = if next == 0 {
            0
        } else {
            (next.wrapping_sub(rec) & 0xffff) as u16
        };
        write_u16(page, rec - 2, field);
    }

    #[inline]
    fn n_owned(page: &[u8], rec: usize) -> u8 {
        page[rec - 5] & N_OWNED_MASK
    }

    #[inline]
    fn set_n_owned(page: &mut [u8], rec: usize, n: u8) {
        debug_assert!(n <= N_OWNED_MASK);
        page[rec - 5] = (page[rec - 5] & INFO_MASK) | (n & N_OWNED_MASK);
    }

    #[inline]
    fn heap_no(page: &[u8], rec: usize) -> u16 {
        read_u16(page, rec - 4) >> HEAP_NO_SHIFT
    }

    #[inline]
    fn set_heap_no(page: &mut [u8], rec: usize, heap_no: u16) {
        let word = read_u16(page, rec - 4);
        write_u16(
            page,
            rec - 4,
            (heap_no << HEAP_NO_SHIFT) | (word & STATUS_MASK),
        );
    }

    #[inline]
    fn info_bits(page: &[u8], rec: usize) -> RecInfo {
        RecInfo::from_bits_truncate(page[rec - 5] & INFO_MASK)
    }

    #[inline]
    fn set_info_bits(page: &mut [u8], rec: usize, info: RecInfo) {
        page[rec - 5] = (page[rec - 5] & N_OWNED_MASK) | info.bits();
    }

    #[inline]
    fn status(page: &[u8], rec: usize) -> RecStatus {
        let bits = (read_u16(page, rec - 4) & STATUS_MASK) as u8;
        RecStatus::from_bits(bits).unwrap_or(RecStatus::Ordinary)
    }
}

impl Redundant {
    pub fn n_fields(page: &[u8], rec: usize) -> usize {
        ((read_u16(page, rec - 4) & 0x07fe) >> 1) as usize
    }

    pub fn set_n_fields(page: &mut [u8], rec: usize, n: usize) {
        debug_assert!(n <= 1023);
        let word = read_u16(page, rec - 4);
        write_u16(page, rec - 4, (word & !0x07fe) | ((n as u16) << 1));
    }

    /// Whether the per-field end offsets are one byte each.
    pub fn one_byte_offsets(page: &[u8], rec: usize) -> bool {
        page[rec - 3] & 0x01 != 0
    }

    pub fn set_one_byte_offsets(page: &mut [u8], rec: usize, short: bool) {
        if short {
            page[rec - 3] |= 0x01;
        } else {
            page[rec - 3] &= !0x01;
        }
    }

    /// Raw end-offset word of field `i` in the 1-byte form (null flag in
    /// the high bit).
    pub fn field_end_info_1(page: &[u8], rec: usize, i: usize) -> u8 {
        page[rec - (layout::REDUNDANT_EXTRA_BYTES + 1 + i)]
    }

    pub fn set_field_end_info_1(page: &mut [u8], rec: usize, i: usize, info: u8) {
        page[rec - (layout::REDUNDANT_EXTRA_BYTES + 1 + i)] = info;
    }

    /// Raw end-offset word of field `i` in the 2-byte form (null flag in
    /// the high bit, external flag in the next).
    pub fn field_end_info_2(page: &[u8], rec: usize, i: usize) -> u16 {
        read_u16(page, rec - (layout::REDUNDANT_EXTRA_BYTES + 2 * i + 2))
    }

    pub fn set_field_end_info_2(page: &mut [u8], rec: usize, i: usize, info: u16) {
        write_u16(
            page,
            rec - (layout::REDUNDANT_EXTRA_BYTES + 2 * i + 2),
            info,
        );
    }
}

impl RecFmt for Redundant {
    const COMPACT: bool = false;
    const EXTRA_BYTES: usize = layout::REDUNDANT_EXTRA_BYTES;
    const INFIMUM: usize = layout::REDUNDANT_INFIMUM;
    const SUPREMUM: usize = layout::REDUNDANT_SUPREMUM;
    const HEAP_START: usize = layout::REDUNDANT_HEAP_START;

    #[inline]
    fn next_offs(page: &[u8], rec: usize) -> usize {
        read_u16(page, rec - 2) as usize
    }

    #[inline]
    fn set_next_offs(page: &mut [u8], rec: usize, next: usize) {
        debug_assert!(next < page.len());
        write_u16(page, rec - 2, next as u16);
    }

    #[inline]
    fn n_owned(page: &[u8], rec: usize) -> u8 {
        page[rec - 6] & N_OWNED_MASK
    }

    #[inline]
    fn set_n_owned(page: &mut [u8], rec: usize, n: u8) {
        debug_assert!(n <= N_OWNED_MASK);
        page[rec - 6] = (page[rec - 6] & INFO_MASK) | (n & N_OWNED_MASK);
    }

    #[inline]
    fn heap_no(page: &[u8], rec: usize) -> u16 {
        (read_u16(page, rec - 5) & 0xfff8) >> HEAP_NO_SHIFT
    }

    #[inline]
    fn set_heap_no(page: &mut [u8], rec: usize, heap_no: u16) {
        let word = read_u16(page, rec - 5);
        write_u16(
            page,
            rec - 5,
            (heap_no << HEAP_NO_SHIFT) | (word & 0x0007),
        );
    }

    #[inline]
    fn info_bits(page: &[u8], rec: usize) -> RecInfo {
        RecInfo::from_bits_truncate(page[rec - 6] & INFO_MASK)
    }

    #[inline]
    fn set_info_bits(page: &mut [u8], rec: usize, info: RecInfo) {
        page[rec - 6] = (page[rec - 6] & N_OWNED_MASK) | info.bits();
    }

    #[inline]
    fn status(page: &[u8], rec: usize) -> RecStatus {
        if rec == Self::INFIMUM {
            RecStatus::Infimum
        } else if rec == Self::SUPREMUM {
            RecStatus::Supremum
        } else {
            RecStatus::Ordinary
        }
    }
}
