//! # Index Descriptors
//!
//! The record codec is schema-dependent: field types are not stored per
//! record, so every encode/decode needs the index definition. This module
//! is the contract with the (out-of-scope) dictionary layer: the caller
//! supplies an [`IndexDef`] listing the fields in index order, each with
//! its fixed length, nullability, column maximum length and "big" flag.
//!
//! ## Field classes
//!
//! | Class | Header cost (compact) | Examples |
//! |-------|------------------------|----------|
//! | fixed, NOT NULL | none | INT, BIGINT, CHAR(n) in a fixed charset |
//! | fixed, nullable | 1 null bit | nullable INT |
//! | variable, max ≤ 255 | 1 length byte | VARCHAR(40) |
//! | variable, big | 1–2 length bytes | VARCHAR(2000), BLOB |
//!
//! A "big" column (maximum length above 255 bytes, or a BLOB-like type)
//! may be stored externally, in which case the in-page value carries a
//! 20-byte overflow reference after any inline prefix.

use eyre::{ensure, Result};

/// One field of an index, in index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// `Some(n)` for fixed-length fields of `n` bytes, `None` for
    /// variable-length fields.
    pub fixed_len: Option<u16>,
    pub nullable: bool,
    /// Column maximum length in bytes.
    pub max_len: u16,
    /// Whether the column can exceed 255 bytes or be stored externally.
    /// Big columns use the two-byte length-prefix form when the actual
    /// length is 128 or more, or when stored off-page.
    pub big: bool,
}

impl FieldDef {
    /// Fixed-length NOT NULL field.
    pub fn fixed(len: u16) -> Self {
        Self {
            fixed_len: Some(len),
            nullable: false,
            max_len: len,
            big: false,
        }
    }

    /// Variable-length NOT NULL field with the given maximum.
    pub fn variable(max_len: u16) -> Self {
        Self {
            fixed_len: None,
            nullable: false,
            max_len,
            big: max_len > 255,
        }
    }

    /// Variable-length field that may be stored externally regardless of
    /// its declared maximum.
    pub fn big(max_len: u16) -> Self {
        Self {
            fixed_len: None,
            nullable: false,
            max_len,
            big: true,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Clustered index: strict key ordering on every level.
    Clustered,
    /// Secondary index: leaf pages carry a maximum transaction id.
    Secondary,
    /// Spatial (R-tree) index: adjacent non-leaf records may compare equal.
    Spatial,
}

/// Descriptor for the index a page belongs to. Immutable once built.
#[derive(Debug, Clone)]
pub struct IndexDef {
    id: u64,
    kind: IndexKind,
    temporary: bool,
    /// Record format of the index's pages; validation cross-checks it
    /// against each page's format flag.
    compact: bool,
    fields: Vec<FieldDef>,
    n_nullable: usize,
    /// Number of key fields stored in node-pointer records (the child page
    /// number is appended as one more field).
    n_node_ptr_keys: usize,
}

/// Size of the child page number stored in node-pointer records.
pub const NODE_PTR_SIZE: usize = 4;

impl IndexDef {
    pub fn new(id: u64, kind: IndexKind, fields: Vec<FieldDef>) -> Result<Self> {
        ensure!(!fields.is_empty(), "an index needs at least one field");
        ensure!(fields.len() <= 1023, "too many fields: {}", fields.len());
        for (i, f) in fields.iter().enumerate() {
            ensure!(
                f.big || f.max_len <= 255,
                "field {i} has max_len {} but is not marked big",
                f.max_len
            );
            if let Some(fixed) = f.fixed_len {
                ensure!(
                    fixed == f.max_len && !f.big,
                    "field {i}: fixed length {fixed} conflicts with max_len/big"
                );
            }
        }
        let n_nullable = fields.iter().filter(|f| f.nullable).count();
        let n_node_ptr_keys = fields.len();
        Ok(Self {
            id,
            kind,
            temporary: false,
            compact: true,
            fields,
            n_nullable,
            n_node_ptr_keys,
        })
    }

    /// Marks the index as using the legacy redundant record format.
    pub fn redundant(mut self) -> Self {
        self.compact = false;
        self
    }

    #[inline]
    pub fn is_compact(&self) -> bool {
        self.compact
    }

    /// Restricts node-pointer records to the first `n` key fields.
    pub fn with_node_ptr_keys(mut self, n: usize) -> Result<Self> {
        ensure!(
            n >= 1 && n <= self.fields.len(),
            "node pointer key count {n} out of range"
        );
        self.n_node_ptr_keys = n;
        Ok(self)
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    #[inline]
    pub fn is_clustered(&self) -> bool {
        self.kind == IndexKind::Clustered
    }

    #[inline]
    pub fn is_secondary(&self) -> bool {
        self.kind == IndexKind::Secondary
    }

    #[inline]
    pub fn is_spatial(&self) -> bool {
        self.kind == IndexKind::Spatial
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn n_nullable(&self) -> usize {
        self.n_nullable
    }

    #[inline]
    pub fn field(&self, i: usize) -> &FieldDef {
        &self.fields[i]
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Field count of a node-pointer record: the key prefix plus the child
    /// page number.
    #[inline]
    pub fn n_node_ptr_fields(&self) -> usize {
        self.n_node_ptr_keys + 1
    }

    #[inline]
    pub fn n_node_ptr_keys(&self) -> usize {
        self.n_node_ptr_keys
    }

    /// Bytes of null bitmap a compact record of this index carries.
    #[inline]
    pub fn null_bitmap_bytes(&self) -> usize {
        self.n_nullable.div_ceil(8)
    }
}
