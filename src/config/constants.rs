//! # Directory and Heap Constants
//!
//! These values are part of the on-disk contract and are interdependent;
//! the compile-time assertions below pin the relationships.
//!
//! ```text
//! MIN_OWNED (4) ──┬─> split produces buckets of ⌊(MAX_OWNED+1)/2⌋ ≥ MIN_OWNED
//!                 └─> merge of MIN_OWNED-1 + MIN_OWNED must fit: ≤ MAX_OWNED
//! MAX_OWNED (8) ──-> n_owned is a 4-bit field, so MAX_OWNED + 1 ≤ 15
//! MAX_HEAP_NO ────-> heap numbers are 13-bit, capping records per page
//! ```

/// Minimum records owned by an interior directory slot.
pub const MIN_OWNED: usize = 4;

/// Maximum records owned by any directory slot. A slot reaching
/// `MAX_OWNED + 1` is split before the owning operation returns.
pub const MAX_OWNED: usize = 8;

/// Bucket size the bulk-load directory rebuild assigns per slot.
pub const OWNED_REBUILD_GROUP: usize = (MAX_OWNED + 1) / 2;

/// Width of one directory slot entry: a big-endian absolute page offset.
pub const DIR_SLOT_SIZE: usize = 2;

/// Heap numbers 0 and 1 are the infimum and supremum; user records start
/// here.
pub const HEAP_NO_USER_LOW: u16 = 2;

/// Heap numbers are stored in 13 bits, so a page can never hold more than
/// 8191 records regardless of its byte size.
pub const MAX_HEAP_NO: u16 = 0x1fff;

const _: () = assert!(
    MAX_OWNED + 1 <= 15,
    "n_owned is a 4-bit field; a slot must be split before the count would overflow"
);

const _: () = assert!(
    (MAX_OWNED + 1) / 2 >= MIN_OWNED,
    "splitting an overfull slot must leave both halves at or above MIN_OWNED"
);

const _: () = assert!(
    2 * MIN_OWNED - 1 <= MAX_OWNED,
    "merging a deficient slot into a minimum neighbor must not overflow MAX_OWNED"
);
