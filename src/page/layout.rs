//! # On-Disk Page Layout
//!
//! Byte-exact layout contract with existing data files. All multi-byte
//! fields are big-endian. From low address to high:
//!
//! ```text
//! Offset     Content
//! ------     -------
//! 0          File header (38 bytes): checksum, page number, prev/next,
//!            LSN, page kind, space id. Opaque to this core except the
//!            kind tag, which page creation stamps.
//! 38         Page header (56 bytes): directory/heap/list bookkeeping,
//!            max trx id, level, index id, two 10-byte segment headers.
//! 94         Infimum and supremum pseudo-records (format-dependent size),
//!            copied verbatim from the literal constants below.
//! ...        User record heap, growing upward from heap_top.
//! ...        Free region.
//! tail-8-2n  Page directory: n slots of 2 bytes, slot 0 at the highest
//!            address (tail-8-2), growing downward as slots are added.
//! tail-8     Trailer (8 bytes): checksum + LSN low word. Untouched here.
//! ```

/// File-header field offsets. The buffer pool owns most of these; the page
/// core only stamps the kind tag and reads the page number for
/// diagnostics.
pub mod fil {
    pub const CHECKSUM: usize = 0;
    pub const PAGE_NO: usize = 4;
    pub const PREV: usize = 8;
    pub const NEXT: usize = 12;
    pub const LSN: usize = 16;
    pub const KIND: usize = 24;
    pub const SPACE_ID: usize = 34;
    /// End of the file header; the page header starts here.
    pub const HEADER_END: usize = 38;
    /// Trailer bytes reserved at the page tail.
    pub const TRAILER_SIZE: usize = 8;

    /// Page kind tag for B-tree index pages.
    pub const KIND_INDEX: u16 = 17855;
    /// Page kind tag for R-tree index pages.
    pub const KIND_RTREE: u16 = 17854;
}

/// Start of the page header field block.
pub const PAGE_HEADER: usize = fil::HEADER_END;

/// Size of the page header field block (see `page::PageHeader`).
pub const PAGE_HEADER_SIZE: usize = 56;

/// Length of the prefix of the page header that page creation resets.
/// Level and index id (and the segment headers) lie beyond it and survive
/// an empty-page rebuild.
pub const PAGE_HEADER_RESET_END: usize = 26;

/// First byte after the page header: the sentinel records start here.
pub const PAGE_DATA: usize = PAGE_HEADER + PAGE_HEADER_SIZE;

/// Number of bytes in the fixed header suffix of a compact record.
pub const COMPACT_EXTRA_BYTES: usize = 5;

/// Number of bytes in the fixed header of a redundant record.
pub const REDUNDANT_EXTRA_BYTES: usize = 6;

/// Origin of the compact infimum record.
pub const COMPACT_INFIMUM: usize = PAGE_DATA + COMPACT_EXTRA_BYTES;

/// Origin of the compact supremum record.
pub const COMPACT_SUPREMUM: usize = PAGE_DATA + 2 * COMPACT_EXTRA_BYTES + 8;

/// First heap byte on a compact page.
pub const COMPACT_HEAP_START: usize = COMPACT_SUPREMUM + 8;

/// Origin of the redundant infimum record (one extra byte for its 1-byte
/// end-offset entry).
pub const REDUNDANT_INFIMUM: usize = PAGE_DATA + 1 + REDUNDANT_EXTRA_BYTES;

/// Origin of the redundant supremum record.
pub const REDUNDANT_SUPREMUM: usize = PAGE_DATA + 2 + 2 * REDUNDANT_EXTRA_BYTES + 8;

/// First heap byte on a redundant page ("supremum\0" is 9 data bytes).
pub const REDUNDANT_HEAP_START: usize = REDUNDANT_SUPREMUM + 9;

/// The infimum and supremum of an empty compact page, copied verbatim at
/// page creation. Header fields read: n_owned=1; heap_no=0 status=infimum
/// and heap_no=1 status=supremum in the 13+3 bit word; the infimum next
/// pointer is the relative distance to the supremum origin.
pub const INFIMUM_SUPREMUM_COMPACT: [u8; 26] = [
    // infimum record
    0x01, // info bits 0, n_owned 1
    0x00, 0x02, // heap_no 0, status infimum
    0x00, 0x0d, // next: +13 to the supremum origin
    b'i', b'n', b'f', b'i', b'm', b'u', b'm', 0x00,
    // supremum record
    0x01, // info bits 0, n_owned 1
    0x00, 0x0b, // heap_no 1, status supremum
    0x00, 0x00, // next: end of list
    b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm',
];

/// The infimum and supremum of an empty redundant page. Header fields
/// read: one field with a 1-byte end offset; n_owned=1; the infimum next
/// pointer is the absolute supremum origin.
pub const INFIMUM_SUPREMUM_REDUNDANT: [u8; 31] = [
    // infimum record
    0x08, // end offset of the single 8-byte field
    0x01, // info bits 0, n_owned 1
    0x00, 0x00, // heap_no 0
    0x03, // n_fields 1, 1-byte offsets
    0x00, 0x74, // next: absolute offset of the supremum
    b'i', b'n', b'f', b'i', b'm', b'u', b'm', 0x00,
    // supremum record
    0x09, // end offset of the single 9-byte field
    0x01, // info bits 0, n_owned 1
    0x00, 0x08, // heap_no 1
    0x03, // n_fields 1, 1-byte offsets
    0x00, 0x00, // next: end of list
    b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm', 0x00,
];

const _: () = assert!(PAGE_DATA == 94);
const _: () = assert!(COMPACT_INFIMUM == 99);
const _: () = assert!(COMPACT_SUPREMUM == 112);
const _: () = assert!(COMPACT_HEAP_START == 120);
const _: () = assert!(REDUNDANT_INFIMUM == 101);
const _: () = assert!(REDUNDANT_SUPREMUM == 116);
const _: () = assert!(REDUNDANT_HEAP_START == 125);
const _: () = assert!(PAGE_DATA + INFIMUM_SUPREMUM_COMPACT.len() == COMPACT_HEAP_START);
const _: () = assert!(PAGE_DATA + INFIMUM_SUPREMUM_REDUNDANT.len() == REDUNDANT_HEAP_START);
// The literal next pointer inside the redundant infimum must equal the
// supremum origin.
const _: () = assert!(REDUNDANT_SUPREMUM == 0x74);
// The literal next pointer inside the compact infimum is origin-relative.
const _: () = assert!(COMPACT_SUPREMUM - COMPACT_INFIMUM == 0x0d);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_strings_are_literal() {
        assert_eq!(
            &INFIMUM_SUPREMUM_COMPACT[5..13],
            b"infimum\0",
            "compact infimum data"
        );
        assert_eq!(
            &INFIMUM_SUPREMUM_COMPACT[18..26],
            b"supremum",
            "compact supremum data"
        );
        assert_eq!(&INFIMUM_SUPREMUM_REDUNDANT[7..15], b"infimum\0");
        assert_eq!(&INFIMUM_SUPREMUM_REDUNDANT[22..31], b"supremum\0");
    }

    #[test]
    fn compact_sentinel_status_bits() {
        // heap_no (13 bits) << 3 | status (3 bits)
        let infimum_word = u16::from_be_bytes([
            INFIMUM_SUPREMUM_COMPACT[1],
            INFIMUM_SUPREMUM_COMPACT[2],
        ]);
        assert_eq!(infimum_word >> 3, 0, "infimum heap_no");
        assert_eq!(infimum_word & 0x7, 2, "infimum status");

        let supremum_word = u16::from_be_bytes([
            INFIMUM_SUPREMUM_COMPACT[14],
            INFIMUM_SUPREMUM_COMPACT[15],
        ]);
        assert_eq!(supremum_word >> 3, 1, "supremum heap_no");
        assert_eq!(supremum_word & 0x7, 3, "supremum status");
    }

    #[test]
    fn redundant_sentinel_heap_numbers() {
        let infimum_word = u16::from_be_bytes([
            INFIMUM_SUPREMUM_REDUNDANT[2],
            INFIMUM_SUPREMUM_REDUNDANT[3],
        ]);
        assert_eq!((infimum_word & 0xfff8) >> 3, 0);

        let supremum_word = u16::from_be_bytes([
            INFIMUM_SUPREMUM_REDUNDANT[17],
            INFIMUM_SUPREMUM_REDUNDANT[18],
        ]);
        assert_eq!((supremum_word & 0xfff8) >> 3, 1);
    }
}
