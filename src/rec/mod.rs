//! # Physical Records
//!
//! A record is a variable-length byte range on an index page: a *header*
//! immediately precedes an *origin* at which the user field data begins.
//! Two on-disk shapes exist and every page uses exactly one of them,
//! chosen at page creation:
//!
//! - **Compact** (modern): null bitmap + variable-length prefixes stored in
//!   reverse before a fixed 5-byte header suffix; fixed-length NOT NULL
//!   fields contribute zero header bytes.
//! - **Redundant** (legacy): per-field end offsets (1 or 2 bytes each) with
//!   null/external flag bits, before a fixed 6-byte header.
//!
//! ## Module structure
//!
//! - `header`: bit-packed header accessors behind the [`RecFmt`] capability
//!   trait (one implementation per shape, monomorphized at the
//!   page-operation level — no per-record dynamic dispatch)
//! - `offsets`: the per-record offsets cache for O(1) field access
//! - `codec`: encode/decode between tuples and record bytes

pub mod codec;
pub mod header;
pub mod offsets;

pub use codec::{converted_size, ExternRef, EXTERN_REF_SIZE};
pub use header::{Compact, RecFmt, Redundant};
pub use offsets::RecOffsets;

use bitflags::bitflags;
use smallvec::SmallVec;

/// Record type stored in the 3-bit status field of compact records.
/// Redundant records have no status bits; sentinels are recognized by
/// their fixed page offsets and node pointers by the page level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecStatus {
    Ordinary = 0,
    NodePtr = 1,
    Infimum = 2,
    Supremum = 3,
}

impl RecStatus {
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => RecStatus::Ordinary,
            1 => RecStatus::NodePtr,
            2 => RecStatus::Infimum,
            3 => RecStatus::Supremum,
            _ => return None,
        })
    }
}

bitflags! {
    /// Record info bits. Stored in the high nibble of the flags byte,
    /// sharing it with the 4-bit n_owned count.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecInfo: u8 {
        /// Predefined minimum record of a non-leaf level.
        const MIN_REC = 0x10;
        /// Delete-marked.
        const DELETED = 0x20;
    }
}

/// One field value of a tuple about to be encoded.
#[derive(Debug, Clone, Copy)]
pub struct TupleField<'a> {
    bytes: Option<&'a [u8]>,
    external: bool,
}

impl<'a> TupleField<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes: Some(bytes),
            external: false,
        }
    }

    pub fn null() -> Self {
        Self {
            bytes: None,
            external: false,
        }
    }

    /// Externally stored field. `bytes` holds any inline prefix followed by
    /// the 20-byte overflow reference.
    pub fn external(bytes: &'a [u8]) -> Self {
        Self {
            bytes: Some(bytes),
            external: true,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    #[inline]
    pub fn bytes(&self) -> Option<&'a [u8]> {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.map_or(0, <[u8]>::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A data tuple: field values plus the status and info bits the encoded
/// record will carry. Borrowed views only; the encoder copies the bytes
/// into the page.
#[derive(Debug, Clone)]
pub struct Tuple<'a> {
    pub status: RecStatus,
    pub info: RecInfo,
    fields: SmallVec<[TupleField<'a>; 8]>,
}

impl<'a> Tuple<'a> {
    pub fn new(fields: impl IntoIterator<Item = TupleField<'a>>) -> Self {
        Self {
            status: RecStatus::Ordinary,
            info: RecInfo::empty(),
            fields: fields.into_iter().collect(),
        }
    }

    /// Node-pointer tuple: key prefix fields plus the child page number.
    pub fn node_ptr(keys: impl IntoIterator<Item = TupleField<'a>>, child: &'a [u8; 4]) -> Self {
        let mut fields: SmallVec<[TupleField<'a>; 8]> = keys.into_iter().collect();
        fields.push(TupleField::new(child));
        Self {
            status: RecStatus::NodePtr,
            info: RecInfo::empty(),
            fields,
        }
    }

    pub fn with_info(mut self, info: RecInfo) -> Self {
        self.info = info;
        self
    }

    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn field(&self, i: usize) -> &TupleField<'a> {
        &self.fields[i]
    }

    #[inline]
    pub fn fields(&self) -> &[TupleField<'a>] {
        &self.fields
    }
}
