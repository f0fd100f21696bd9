//! # BurrowDB Page Core
//!
//! The index-page and physical-record core of an on-disk B-tree storage
//! engine: the fixed-size page holding variable-length sorted records,
//! and the codec that serializes and parses those records. Every key
//! lookup, insert, delete, split and merge of the engine runs through
//! this crate, and its byte layout is a compatibility contract with
//! existing data files.
//!
//! ## Page anatomy
//!
//! ```text
//! ┌──────────────────────────────────────────────┐ 0
//! │ File header (page no, prev/next, kind tag)    │
//! ├──────────────────────────────────────────────┤ 38
//! │ Page header (slots, heap, free list, n_recs,  │
//! │ max trx id, level, index id)                  │
//! ├──────────────────────────────────────────────┤ 94
//! │ Infimum ─> r1 ─> r2 ─> … ─> rn ─> Supremum    │
//! │   (singly-linked, ascending key order)        │
//! ├──────────────────────────────────────────────┤ heap_top
//! │ Free region                                   │
//! ├──────────────────────────────────────────────┤
//! │ Page directory (2-byte slots, grows down)     │
//! ├──────────────────────────────────────────────┤ tail-8
//! │ Trailer                                       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Sparse directory slots own runs of 4–8 list records, making the sorted
//! list binary-searchable. Records come in two on-disk shapes, chosen per
//! page: the modern *compact* format (null bitmap + variable-length
//! prefixes) and the legacy *redundant* format (explicit per-field end
//! offsets).
//!
//! ## Module overview
//!
//! - [`page`]: page views, directory, record list, bulk operations,
//!   validation
//! - [`rec`]: record header accessors, offsets cache, field codec
//! - [`dict`]: index descriptor contract supplied by the caller
//! - [`mtr`]: redo-log sink contract (page create, bulk list deletes)
//! - [`memory`]: pooled scratch frames for page reorganization
//! - [`config`]: page sizes and directory tuning constants
//!
//! ## Concurrency model
//!
//! Single-threaded per page: the caller holds an exclusive latch across
//! every mutating operation, and all operations here are synchronous.
//! Each mutation bumps the frame's modify clock so optimistic readers
//! elsewhere in the engine can invalidate themselves.
//!
//! ## Error model
//!
//! Operations return `eyre::Result`; programmatically relevant failures
//! carry a typed [`PageError`] root cause. `NoSpace` means "split the
//! page" and is routine; `Corruption` is fatal for the page.
//!
//! ```ignore
//! use burrowdb::{IndexPageMut, PageBuf, PageError};
//!
//! let mut buf = PageBuf::new(page_size);
//! let mut page = IndexPageMut::create(&mut buf, true, false, &mut log)?;
//! match page.insert_tuple_after(&index, cursor, &tuple) {
//!     Ok(rec) => { /* inserted at `rec` */ }
//!     Err(err) if matches!(err.downcast_ref(), Some(PageError::NoSpace { .. })) => {
//!         // split the page and retry
//!     }
//!     Err(err) => return Err(err),
//! }
//! ```

#[macro_use]
mod macros;

pub mod config;
pub mod dict;
mod error;
pub mod memory;
pub mod mtr;
pub mod page;
pub mod rec;

pub use config::{PageSize, DEFAULT_PAGE_SIZE, MAX_OWNED, MIN_OWNED};
pub use dict::{FieldDef, IndexDef, IndexKind};
pub use error::PageError;
pub use memory::{FramePool, PooledFrame};
pub use mtr::{LogContext, LogRecord, MemoryLog, NoopLog};
pub use page::bulk::{copy_list_end, copy_list_start, move_list_end, move_list_start};
pub use page::{IndexPage, IndexPageMut, PageBuf, PageDirection};
pub use rec::{ExternRef, RecInfo, RecOffsets, RecStatus, Tuple, TupleField, EXTERN_REF_SIZE};
