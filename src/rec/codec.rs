//! # Field Codec
//!
//! Converts between data tuples and physical record bytes, in both record
//! formats, and decodes record headers into [`RecOffsets`] arrays.
//!
//! ## Compact length prefixes
//!
//! A variable-length field stores its actual length before the null bitmap,
//! in reverse field order walking away from the origin:
//!
//! - one byte when the column maximum is at most 255 bytes, or when the
//!   actual length is below 128 and the field is stored in-page;
//! - otherwise two bytes, high bit set, second-highest bit mirroring the
//!   external-storage flag: `1exxxxxx xxxxxxxx`.
//!
//! Fixed-length NOT NULL fields contribute no header bytes at all; NULL
//! fields contribute only their bit in the bitmap.
//!
//! ## Redundant end offsets
//!
//! Every field stores its end offset, 1 byte each when the record has no
//! external fields and at most 127 data bytes, else 2 bytes each. The high
//! bit flags SQL-null; in the 2-byte form the next bit flags external
//! storage. NULL fields of fixed length keep their placeholder bytes
//! (zeroed), so end offsets stay monotone.
//!
//! Malformed input is a programmer bug by contract; this layer asserts
//! arity and leaves structural checking to page validation.

use std::cmp::Ordering;

use eyre::{ensure, Result};

use crate::dict::{IndexDef, NODE_PTR_SIZE};
use crate::rec::header::{Compact, RecFmt, Redundant};
use crate::rec::offsets::{RecOffsets, OFFS_EXTERNAL, OFFS_NULL};
use crate::rec::{RecStatus, Tuple};

/// Size of an external (overflow) field reference.
pub const EXTERN_REF_SIZE: usize = 20;

/// Largest data size a redundant record may have while using 1-byte end
/// offsets.
const ONE_BYTE_OFFS_LIMIT: usize = 0x7f;

const NULL_MASK_1: u8 = 0x80;
const NULL_MASK_2: u16 = 0x8000;
const EXTERN_MASK_2: u16 = 0x4000;

/// Reference to an externally stored field value: the overflow page chain
/// start and the stored length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternRef {
    pub space_id: u32,
    pub page_no: u32,
    pub offset: u32,
    pub len: u64,
}

impl ExternRef {
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.space_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.page_no.to_be_bytes());
        buf[8..12].copy_from_slice(&self.offset.to_be_bytes());
        buf[12..20].copy_from_slice(&self.len.to_be_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            space_id: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            page_no: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            offset: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            len: u64::from_be_bytes(buf[12..20].try_into().unwrap()),
        }
    }

    pub fn to_bytes(&self) -> [u8; EXTERN_REF_SIZE] {
        let mut buf = [0u8; EXTERN_REF_SIZE];
        self.write_to(&mut buf);
        buf
    }
}

/// Number of data fields the encoded record stores, including the child
/// page number of a node pointer.
fn encoded_field_count(index: &IndexDef, tuple: &Tuple<'_>) -> usize {
    match tuple.status {
        RecStatus::NodePtr => index.n_node_ptr_fields(),
        _ => index.n_fields(),
    }
}

fn check_arity(index: &IndexDef, tuple: &Tuple<'_>) -> Result<()> {
    let want = encoded_field_count(index, tuple);
    ensure!(
        tuple.n_fields() == want,
        "tuple has {} fields, the {} record needs {}",
        tuple.n_fields(),
        if tuple.status == RecStatus::NodePtr {
            "node-pointer"
        } else {
            "ordinary"
        },
        want
    );
    if tuple.status == RecStatus::NodePtr {
        let child = tuple.field(want - 1);
        ensure!(
            !child.is_null() && child.len() == NODE_PTR_SIZE,
            "node pointer child field must be {NODE_PTR_SIZE} bytes"
        );
    }
    Ok(())
}

/// Is field `i` of this tuple the appended node-pointer child?
fn is_child_field(tuple: &Tuple<'_>, i: usize) -> bool {
    tuple.status == RecStatus::NodePtr && i == tuple.n_fields() - 1
}

// ---------------------------------------------------------------------------
// Converted sizes
// ---------------------------------------------------------------------------

/// Header and data sizes of the compact encoding of `tuple`.
fn compact_sizes(index: &IndexDef, tuple: &Tuple<'_>) -> (usize, usize) {
    let mut extra = Compact::EXTRA_BYTES + index.null_bitmap_bytes();
    let mut data = 0usize;

    for i in 0..tuple.n_fields() {
        let value = tuple.field(i);
        if is_child_field(tuple, i) {
            data += NODE_PTR_SIZE;
            continue;
        }
        let field = index.field(i);
        if value.is_null() {
            continue;
        }
        let len = value.len();
        if field.fixed_len.is_some() {
            // Fixed-length NOT NULL fields carry no length prefix.
        } else if value.is_external() {
            extra += 2;
        } else if len < 128 || !field.big {
            extra += 1;
        } else {
            extra += 2;
        }
        data += len;
    }

    (extra, data)
}

/// Header and data sizes of the redundant encoding of `tuple`, plus the
/// chosen offset width.
fn redundant_sizes(index: &IndexDef, tuple: &Tuple<'_>) -> (usize, usize, bool) {
    let n_fields = tuple.n_fields();
    let mut data = 0usize;
    let mut any_external = false;

    for i in 0..n_fields {
        let value = tuple.field(i);
        if value.is_null() {
            // NULL fixed-length fields keep their placeholder bytes.
            data += index.field(i).fixed_len.unwrap_or(0) as usize;
        } else {
            data += value.len();
            any_external |= value.is_external();
        }
    }

    let one_byte = !any_external && data <= ONE_BYTE_OFFS_LIMIT;
    let per_field = if one_byte { 1 } else { 2 };
    (Redundant::EXTRA_BYTES + n_fields * per_field, data, one_byte)
}

/// Total size the record encoding of `tuple` will occupy, header included.
pub fn converted_size(index: &IndexDef, tuple: &Tuple<'_>, compact: bool) -> usize {
    let (extra, data) = converted_sizes(index, tuple, compact);
    extra + data
}

/// Header and data sizes of the record encoding of `tuple`.
pub fn converted_sizes(index: &IndexDef, tuple: &Tuple<'_>, compact: bool) -> (usize, usize) {
    if compact {
        match tuple.status {
            RecStatus::Infimum | RecStatus::Supremum => (Compact::EXTRA_BYTES, 8),
            _ => compact_sizes(index, tuple),
        }
    } else {
        let (extra, data, _) = redundant_sizes(index, tuple);
        (extra, data)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn encode_compact(index: &IndexDef, tuple: &Tuple<'_>, buf: &mut [u8]) -> usize {
    let (extra, data) = compact_sizes(index, tuple);
    debug_assert!(buf.len() >= extra + data);
    let origin = extra;

    // Fixed header suffix: zero it, then stamp status and info bits. The
    // heap number, n_owned and next pointer belong to the page insert.
    buf[origin - Compact::EXTRA_BYTES..origin].fill(0);
    Compact::set_status(buf, origin, tuple.status);
    Compact::set_info_bits(buf, origin, tuple.info);

    // The variable header part sits below the fixed suffix: the null
    // bitmap first, then length prefixes in reverse field order. Positions
    // are computed at use so records without a variable part never index
    // below the buffer start.
    let bitmap_bytes = index.null_bitmap_bytes();
    let var_base = origin - Compact::EXTRA_BYTES;
    buf[var_base - bitmap_bytes..var_base].fill(0);

    let mut lens_used = 0usize;
    let mut null_bit = 0usize;
    let mut end = origin;

    for i in 0..tuple.n_fields() {
        let value = tuple.field(i);

        if is_child_field(tuple, i) {
            buf[end..end + NODE_PTR_SIZE].copy_from_slice(value.bytes().unwrap());
            end += NODE_PTR_SIZE;
            break;
        }

        let field = index.field(i);
        if field.nullable {
            if value.is_null() {
                buf[var_base - 1 - null_bit / 8] |= 1 << (null_bit % 8);
                null_bit += 1;
                continue;
            }
            null_bit += 1;
        }

        let bytes = value.bytes().expect("only nullable fields can be null");
        let len = bytes.len();
        if field.fixed_len.is_some() {
            debug_assert_eq!(len, field.fixed_len.unwrap() as usize);
        } else {
            let at = var_base - bitmap_bytes - 1 - lens_used;
            if value.is_external() {
                buf[at] = (len >> 8) as u8 | 0xc0;
                buf[at - 1] = len as u8;
                lens_used += 2;
            } else if len < 128 || !field.big {
                buf[at] = len as u8;
                lens_used += 1;
            } else {
                buf[at] = (len >> 8) as u8 | 0x80;
                buf[at - 1] = len as u8;
                lens_used += 2;
            }
        }

        buf[end..end + len].copy_from_slice(bytes);
        end += len;
    }

    origin
}

fn encode_redundant(index: &IndexDef, tuple: &Tuple<'_>, buf: &mut [u8]) -> usize {
    let (extra, data, one_byte) = redundant_sizes(index, tuple);
    debug_assert!(buf.len() >= extra + data);
    let origin = extra;

    buf[origin - Redundant::EXTRA_BYTES..origin].fill(0);
    Redundant::set_n_fields(buf, origin, tuple.n_fields());
    Redundant::set_one_byte_offsets(buf, origin, one_byte);
    Redundant::set_info_bits(buf, origin, tuple.info);

    let mut end = 0usize;
    for i in 0..tuple.n_fields() {
        let value = tuple.field(i);
        let info = if value.is_null() {
            let placeholder = index.field(i).fixed_len.unwrap_or(0) as usize;
            buf[origin + end..origin + end + placeholder].fill(0);
            end += placeholder;
            if one_byte {
                end as u16 | NULL_MASK_1 as u16
            } else {
                end as u16 | NULL_MASK_2
            }
        } else {
            let bytes = value.bytes().unwrap();
            buf[origin + end..origin + end + bytes.len()].copy_from_slice(bytes);
            end += bytes.len();
            let mut info = end as u16;
            if value.is_external() {
                debug_assert!(!one_byte);
                info |= EXTERN_MASK_2;
            }
            info
        };
        if one_byte {
            Redundant::set_field_end_info_1(buf, origin, i, info as u8);
        } else {
            Redundant::set_field_end_info_2(buf, origin, i, info);
        }
    }

    origin
}

/// Encodes `tuple` at the start of `buf` and returns the origin offset
/// (equal to the header size). `buf` must hold at least
/// [`converted_size`] bytes. The heap number, owned count and next pointer
/// are left zero for the page insert to fill in.
pub fn encode_into(index: &IndexDef, tuple: &Tuple<'_>, compact: bool, buf: &mut [u8]) -> Result<usize> {
    check_arity(index, tuple)?;
    for (i, value) in tuple.fields().iter().enumerate() {
        if value.is_null() && !is_child_field(tuple, i) {
            ensure!(
                index.field(i).nullable,
                "field {i} is NOT NULL but the tuple stores SQL-null"
            );
        }
    }
    Ok(if compact {
        encode_compact(index, tuple, buf)
    } else {
        encode_redundant(index, tuple, buf)
    })
}

// ---------------------------------------------------------------------------
// Offset decoding
// ---------------------------------------------------------------------------

fn init_offsets_compact(page: &[u8], rec: usize, index: &IndexDef, out: &mut RecOffsets) {
    let status = Compact::status(page, rec);
    out.reset(true, Compact::EXTRA_BYTES);

    match status {
        RecStatus::Infimum | RecStatus::Supremum => {
            // Sentinels store a single 8-byte literal field.
            out.push_end(8);
            return;
        }
        _ => {}
    }

    let n_fields = if status == RecStatus::NodePtr {
        index.n_node_ptr_fields()
    } else {
        index.n_fields()
    };

    let bitmap_bytes = index.null_bitmap_bytes();
    let var_base = rec - Compact::EXTRA_BYTES;
    let mut lens_used = 0usize;
    let mut null_bit = 0usize;
    let mut offs = 0u32;

    for i in 0..n_fields {
        if status == RecStatus::NodePtr && i == n_fields - 1 {
            offs += NODE_PTR_SIZE as u32;
            out.push_end(offs);
            break;
        }

        let field = index.field(i);
        if field.nullable {
            let null = page[var_base - 1 - null_bit / 8] & (1 << (null_bit % 8)) != 0;
            null_bit += 1;
            if null {
                out.push_end(offs | OFFS_NULL);
                continue;
            }
        }

        if let Some(fixed) = field.fixed_len {
            offs += fixed as u32;
            out.push_end(offs);
            continue;
        }

        let at = var_base - bitmap_bytes - 1 - lens_used;
        let mut len = page[at] as u32;
        lens_used += 1;
        let mut flags = 0;
        if field.big && len & 0x80 != 0 {
            len = (len << 8) | page[at - 1] as u32;
            lens_used += 1;
            if len & 0x4000 != 0 {
                flags = OFFS_EXTERNAL;
            }
            len &= 0x3fff;
        }
        offs += len;
        out.push_end(offs | flags);
    }

    out.set_extra_size(Compact::EXTRA_BYTES + bitmap_bytes + lens_used);
}

fn init_offsets_redundant(page: &[u8], rec: usize, out: &mut RecOffsets) {
    let n_fields = Redundant::n_fields(page, rec);
    let one_byte = Redundant::one_byte_offsets(page, rec);
    let per_field = if one_byte { 1 } else { 2 };
    out.reset(false, Redundant::EXTRA_BYTES + n_fields * per_field);

    for i in 0..n_fields {
        let end = if one_byte {
            let info = Redundant::field_end_info_1(page, rec, i);
            let mut end = (info & !NULL_MASK_1) as u32;
            if info & NULL_MASK_1 != 0 {
                end |= OFFS_NULL;
            }
            end
        } else {
            let info = Redundant::field_end_info_2(page, rec, i);
            let mut end = (info & !(NULL_MASK_2 | EXTERN_MASK_2)) as u32;
            if info & NULL_MASK_2 != 0 {
                end |= OFFS_NULL;
            }
            if info & EXTERN_MASK_2 != 0 {
                end |= OFFS_EXTERNAL;
            }
            end
        };
        out.push_end(end);
    }
}

/// Decodes the header of the record at `rec` into `out`, reusing its
/// backing storage. The redundant format stores its own field count; the
/// compact format takes it from the index and the record status.
pub fn init_offsets(page: &[u8], rec: usize, index: &IndexDef, compact: bool, out: &mut RecOffsets) {
    if compact {
        init_offsets_compact(page, rec, index, out);
    } else {
        init_offsets_redundant(page, rec, out);
    }
}

/// Counts the externally stored fields among the first `n` of the record
/// at `rec`.
pub fn n_extern_in_first(page: &[u8], rec: usize, index: &IndexDef, compact: bool, n: usize) -> usize {
    let mut offsets = RecOffsets::new();
    init_offsets(page, rec, index, compact, &mut offsets);
    offsets.n_extern_in_first(n)
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn compare_field(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Compares two records field by field: SQL-null sorts first, field bytes
/// compare lexicographically with the shorter value first on a tie.
pub fn compare_records(
    a_page: &[u8],
    a_rec: usize,
    a_offs: &RecOffsets,
    b_page: &[u8],
    b_rec: usize,
    b_offs: &RecOffsets,
) -> Ordering {
    let n = a_offs.n_fields().min(b_offs.n_fields());
    for i in 0..n {
        let ord = compare_field(
            a_offs.field_slice(a_page, a_rec, i),
            b_offs.field_slice(b_page, b_rec, i),
        );
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a_offs.n_fields().cmp(&b_offs.n_fields())
}

/// Compares a tuple against an encoded record, with the same field rules
/// as [`compare_records`].
pub fn compare_tuple_record(
    tuple: &Tuple<'_>,
    page: &[u8],
    rec: usize,
    offs: &RecOffsets,
) -> Ordering {
    let n = tuple.n_fields().min(offs.n_fields());
    for i in 0..n {
        let ord = compare_field(tuple.field(i).bytes(), offs.field_slice(page, rec, i));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    tuple.n_fields().cmp(&offs.n_fields())
}
