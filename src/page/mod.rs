//! # Index Pages
//!
//! An index page is a fixed-size byte frame holding variable-length records
//! in a singly-linked sorted list, bracketed by the infimum and supremum
//! sentinels, with a sparse directory of 2-byte slots at the page tail for
//! binary search. See [`layout`] for the exact byte map.
//!
//! ## View types
//!
//! The frame is exclusively owned by a [`PageBuf`] (the buffer-pool handle
//! contract: bytes plus a modify clock). Operations go through borrowed
//! views:
//!
//! ```text
//! PageBuf ──borrow──> IndexPage<'a>     read-only accessors
//!         ──borrow──> IndexPageMut<'a>  mutating operations, bumps the
//!                                       modify clock before each mutation
//! ```
//!
//! Records are exposed as origin offsets (`usize`) into the frame, never
//! as long-lived references: offsets and heap numbers are the stable
//! identifiers across mutations.
//!
//! ## Format dispatch
//!
//! Each page stores its record format in the high bit of `n_heap`. Public
//! operations read the flag once and monomorphize on [`Compact`] or
//! [`Redundant`](crate::rec::Redundant); the generic bodies live in the
//! sibling modules (`dir`, `list`, `bulk`, `validate`).
//!
//! ## Module organization
//!
//! - `layout`: byte offsets and sentinel literals
//! - `dir`: directory slot maintenance and lookups
//! - `list`: record list insert/delete/traversal
//! - `bulk`: multi-record copy/move/delete and reorganization
//! - `validate`: structural consistency checking

pub mod bulk;
pub mod dir;
pub mod layout;
pub mod list;
pub mod validate;

use eyre::{ensure, Result};
use zerocopy::big_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PageSize, DIR_SLOT_SIZE, HEAP_NO_USER_LOW, MAX_HEAP_NO, MIN_OWNED};
use crate::dict::IndexDef;
use crate::mtr::{LogContext, LogRecord};
use crate::rec::{Compact, RecFmt, Redundant};
use layout::{fil, PAGE_DATA, PAGE_HEADER, PAGE_HEADER_RESET_END, PAGE_HEADER_SIZE};

/// High bit of the stored `n_heap` word: the page uses the compact record
/// format.
const COMPACT_FLAG: u16 = 0x8000;

/// Insert-direction statistics kept in the page header to guide future
/// split points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Left,
    Right,
    SameRec,
    SamePage,
    NoDirection,
}

impl PageDirection {
    pub fn to_raw(self) -> u16 {
        match self {
            PageDirection::Left => 1,
            PageDirection::Right => 2,
            PageDirection::SameRec => 3,
            PageDirection::SamePage => 4,
            PageDirection::NoDirection => 5,
        }
    }

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            1 => PageDirection::Left,
            2 => PageDirection::Right,
            3 => PageDirection::SameRec,
            4 => PageDirection::SamePage,
            _ => PageDirection::NoDirection,
        }
    }
}

/// The page header field block at offset 38, big-endian on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    n_dir_slots: U16,
    heap_top: U16,
    /// Next heap number; the high bit flags the compact format.
    n_heap: U16,
    /// Head of the free list of deleted records (0 = empty).
    free: U16,
    /// Bytes occupied by deleted records.
    garbage: U16,
    /// Origin of the last inserted record (0 = unknown).
    last_insert: U16,
    direction: U16,
    n_direction: U16,
    n_recs: U16,
    max_trx_id: U64,
    /// 0 for leaf pages.
    level: U16,
    index_id: U64,
    seg_leaf: [u8; 10],
    seg_top: [u8; 10],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    be_accessors! {
        n_dir_slots: u16,
        heap_top: u16,
        free: u16,
        garbage: u16,
        last_insert: u16,
        direction: u16,
        n_direction: u16,
        n_recs: u16,
        max_trx_id: u64,
        level: u16,
        index_id: u64,
    }

    /// Raw `n_heap` word including the format flag.
    #[inline]
    pub fn n_heap_raw(&self) -> u16 {
        self.n_heap.get()
    }

    #[inline]
    pub fn set_n_heap_raw(&mut self, val: u16) {
        self.n_heap = U16::new(val);
    }
}

/// An exclusively owned page frame with its modify clock. This is the
/// contract the buffer pool fulfills; here it owns the bytes directly.
#[derive(Debug)]
pub struct PageBuf {
    data: Box<[u8]>,
    modify_clock: u64,
}

impl PageBuf {
    /// A zeroed frame of the given size. Zero bytes do not form a valid
    /// index page; follow with [`IndexPageMut::create`].
    pub fn new(size: PageSize) -> Self {
        Self {
            data: vec![0u8; size.bytes()].into_boxed_slice(),
            modify_clock: 0,
        }
    }

    /// Wraps existing frame bytes, e.g. read back from disk.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        PageSize::from_bytes(data.len())?;
        Ok(Self {
            data: data.into_boxed_slice(),
            modify_clock: 0,
        })
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Counter invalidating optimistic readers; incremented at the start
    /// of every mutating page operation.
    #[inline]
    pub fn modify_clock(&self) -> u64 {
        self.modify_clock
    }

    pub(crate) fn touch(&mut self) {
        self.modify_clock += 1;
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Read-only view of an index page.
#[derive(Debug, Clone, Copy)]
pub struct IndexPage<'a> {
    data: &'a [u8],
}

/// Mutable view of an index page; every operation bumps the frame's
/// modify clock.
#[derive(Debug)]
pub struct IndexPageMut<'a> {
    buf: &'a mut PageBuf,
}

impl<'a> IndexPage<'a> {
    /// Validated view over raw frame bytes.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        PageSize::from_bytes(data.len())?;
        let page = Self { data };
        let kind = page.kind();
        ensure!(
            kind == fil::KIND_INDEX || kind == fil::KIND_RTREE,
            "not an index page: kind tag {kind}"
        );
        Ok(page)
    }

    #[inline]
    pub(crate) fn wrap(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Raw frame bytes. Record accessors index into this slice by origin
    /// offset.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn header(&self) -> &'a PageHeader {
        PageHeader::ref_from_bytes(&self.data[PAGE_HEADER..PAGE_DATA])
            .expect("page header block is always in bounds")
    }

    #[inline]
    pub fn kind(&self) -> u16 {
        u16::from_be_bytes([self.data[fil::KIND], self.data[fil::KIND + 1]])
    }

    #[inline]
    pub fn is_rtree(&self) -> bool {
        self.kind() == fil::KIND_RTREE
    }

    /// Page number from the file header, used in diagnostics.
    #[inline]
    pub fn page_no(&self) -> u32 {
        u32::from_be_bytes(self.data[fil::PAGE_NO..fil::PAGE_NO + 4].try_into().unwrap())
    }

    #[inline]
    pub fn is_compact(&self) -> bool {
        self.header().n_heap_raw() & COMPACT_FLAG != 0
    }

    /// Next heap number to assign; heap numbers 0 and 1 are the sentinels.
    #[inline]
    pub fn n_heap(&self) -> u16 {
        self.header().n_heap_raw() & !COMPACT_FLAG
    }

    #[inline]
    pub fn n_dir_slots(&self) -> usize {
        self.header().n_dir_slots() as usize
    }

    #[inline]
    pub fn heap_top(&self) -> usize {
        self.header().heap_top() as usize
    }

    /// Head of the deleted-record free list, 0 when empty.
    #[inline]
    pub fn free_head(&self) -> usize {
        self.header().free() as usize
    }

    #[inline]
    pub fn garbage_bytes(&self) -> usize {
        self.header().garbage() as usize
    }

    #[inline]
    pub fn last_insert(&self) -> usize {
        self.header().last_insert() as usize
    }

    #[inline]
    pub fn direction(&self) -> PageDirection {
        PageDirection::from_raw(self.header().direction())
    }

    #[inline]
    pub fn n_direction(&self) -> usize {
        self.header().n_direction() as usize
    }

    #[inline]
    pub fn n_recs(&self) -> usize {
        self.header().n_recs() as usize
    }

    #[inline]
    pub fn max_trx_id(&self) -> u64 {
        self.header().max_trx_id()
    }

    #[inline]
    pub fn level(&self) -> u16 {
        self.header().level()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.level() == 0
    }

    #[inline]
    pub fn index_id(&self) -> u64 {
        self.header().index_id()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_recs() == 0
    }

    #[inline]
    pub fn infimum(&self) -> usize {
        if self.is_compact() {
            Compact::INFIMUM
        } else {
            Redundant::INFIMUM
        }
    }

    #[inline]
    pub fn supremum(&self) -> usize {
        if self.is_compact() {
            Compact::SUPREMUM
        } else {
            Redundant::SUPREMUM
        }
    }

    #[inline]
    pub(crate) fn heap_start(&self) -> usize {
        if self.is_compact() {
            Compact::HEAP_START
        } else {
            Redundant::HEAP_START
        }
    }

    /// Bytes occupied by user records (garbage excluded).
    pub fn data_size(&self) -> usize {
        self.heap_top() - self.heap_start() - self.garbage_bytes()
    }

    /// Directory space to reserve for `n` records: one slot per
    /// `MIN_OWNED` in the worst case.
    #[inline]
    fn dir_reserved(n: usize) -> usize {
        DIR_SLOT_SIZE * n / MIN_OWNED
    }

    /// Maximum record payload that still fits after `n_new` more inserts,
    /// accounting for worst-case directory growth over live and freed
    /// records alike.
    pub fn max_insert_size(&self, n_new: usize) -> usize {
        let heap_start = self.heap_start();
        let free_space_empty =
            self.page_size() - fil::TRAILER_SIZE - 2 * DIR_SLOT_SIZE - heap_start;
        let heap_footprint = self.heap_top() - heap_start;
        let reservable =
            self.n_recs() + (self.n_heap() as usize - HEAP_NO_USER_LOW as usize) + n_new;
        let occupied = heap_footprint + Self::dir_reserved(reservable);
        free_space_empty.saturating_sub(occupied)
    }
}

impl<'a> IndexPageMut<'a> {
    /// Initializes `buf` as an empty index page and logs the creation.
    pub fn create<L: LogContext>(
        buf: &'a mut PageBuf,
        compact: bool,
        rtree: bool,
        log: &mut L,
    ) -> Result<Self> {
        let mut page = Self { buf };
        log.log(LogRecord::PageCreate { compact, rtree });
        page.init(compact, rtree);
        Ok(page)
    }

    /// View over an already-initialized frame.
    pub fn open(buf: &'a mut PageBuf) -> Result<Self> {
        IndexPage::new(buf.bytes())?;
        Ok(Self { buf })
    }

    #[inline]
    pub fn as_ref(&self) -> IndexPage<'_> {
        IndexPage::wrap(self.buf.bytes())
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.buf.data_mut()
    }

    #[inline]
    pub(crate) fn touch(&mut self) {
        self.buf.touch();
    }

    #[inline]
    pub(crate) fn header_mut(&mut self) -> &mut PageHeader {
        PageHeader::mut_from_bytes(&mut self.buf.data_mut()[PAGE_HEADER..PAGE_DATA])
            .expect("page header block is always in bounds")
    }

    /// Rebuilds the frame as an empty page of the given format. The level,
    /// index id and file header fields other than the kind tag survive.
    fn init(&mut self, compact: bool, rtree: bool) {
        self.touch();
        let psize = self.buf.page_size();
        let data = self.buf.data_mut();

        let kind = if rtree { fil::KIND_RTREE } else { fil::KIND_INDEX };
        data[fil::KIND..fil::KIND + 2].copy_from_slice(&kind.to_be_bytes());

        // Reset the bookkeeping prefix of the page header; level, index id
        // and the segment headers keep their values.
        data[PAGE_HEADER..PAGE_HEADER + PAGE_HEADER_RESET_END].fill(0);

        let (heap_start, infimum, supremum): (usize, usize, usize) = if compact {
            data[PAGE_DATA..PAGE_DATA + layout::INFIMUM_SUPREMUM_COMPACT.len()]
                .copy_from_slice(&layout::INFIMUM_SUPREMUM_COMPACT);
            (Compact::HEAP_START, Compact::INFIMUM, Compact::SUPREMUM)
        } else {
            data[PAGE_DATA..PAGE_DATA + layout::INFIMUM_SUPREMUM_REDUNDANT.len()]
                .copy_from_slice(&layout::INFIMUM_SUPREMUM_REDUNDANT);
            (
                Redundant::HEAP_START,
                Redundant::INFIMUM,
                Redundant::SUPREMUM,
            )
        };

        // Wipe the heap and directory area, then write the two sentinel
        // slots at the tail.
        data[heap_start..psize - fil::TRAILER_SIZE].fill(0);
        let slot0 = psize - fil::TRAILER_SIZE - DIR_SLOT_SIZE;
        let slot1 = slot0 - DIR_SLOT_SIZE;
        data[slot0..slot0 + 2].copy_from_slice(&(infimum as u16).to_be_bytes());
        data[slot1..slot1 + 2].copy_from_slice(&(supremum as u16).to_be_bytes());

        let header = self.header_mut();
        header.set_n_dir_slots(2);
        header.set_direction(PageDirection::NoDirection.to_raw());
        header.set_heap_top(heap_start as u16);
        let mut n_heap_raw = HEAP_NO_USER_LOW;
        if compact {
            n_heap_raw |= COMPACT_FLAG;
        }
        header.set_n_heap_raw(n_heap_raw);
    }

    /// Empties the page in place, preserving the format, level and (for
    /// secondary leaf pages of durable tables) the max trx id.
    pub fn create_empty<L: LogContext>(&mut self, index: &IndexDef, log: &mut L) {
        let view = self.as_ref();
        let compact = view.is_compact();
        let rtree = view.is_rtree();
        let max_trx_id = if index.is_secondary() && !index.is_temporary() && view.is_leaf() {
            view.max_trx_id()
        } else {
            0
        };

        log.log(LogRecord::PageCreate { compact, rtree });
        self.init(compact, rtree);
        if max_trx_id != 0 {
            self.set_max_trx_id(max_trx_id);
        }
    }

    pub fn set_max_trx_id(&mut self, trx_id: u64) {
        self.header_mut().set_max_trx_id(trx_id);
    }

    pub fn set_level(&mut self, level: u16) {
        self.header_mut().set_level(level);
    }

    pub fn set_index_id(&mut self, id: u64) {
        self.header_mut().set_index_id(id);
    }

    /// Stamps the file-header page number (normally the buffer pool's job;
    /// exposed for diagnostics and tests).
    pub fn set_page_no(&mut self, page_no: u32) {
        self.data_mut()[fil::PAGE_NO..fil::PAGE_NO + 4].copy_from_slice(&page_no.to_be_bytes());
    }

    pub(crate) fn set_n_heap(&mut self, n_heap: u16) {
        let compact = self.as_ref().is_compact();
        let mut raw = n_heap;
        if compact {
            raw |= COMPACT_FLAG;
        }
        self.header_mut().set_n_heap_raw(raw);
    }

    /// Bump-allocates `need` bytes from the free region between the heap
    /// top and the directory. Returns the block offset and its heap
    /// number, or `None` when the region (or the 13-bit heap number
    /// space) is exhausted. The free list is not consulted here; reuse is
    /// the insert layer's decision.
    pub fn alloc_heap(&mut self, need: usize) -> Option<(usize, u16)> {
        let view = self.as_ref();
        let heap_no = view.n_heap();
        if heap_no > MAX_HEAP_NO {
            return None;
        }
        if view.max_insert_size(1) < need {
            return None;
        }
        let top = view.heap_top();
        self.header_mut().set_heap_top((top + need) as u16);
        self.set_n_heap(heap_no + 1);
        Some((top, heap_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PAGE_SIZE;
    use crate::mtr::{MemoryLog, NoopLog};

    fn create_page(buf: &mut PageBuf, compact: bool) -> IndexPageMut<'_> {
        IndexPageMut::create(buf, compact, false, &mut NoopLog).unwrap()
    }

    #[test]
    fn header_struct_is_56_bytes() {
        assert_eq!(std::mem::size_of::<PageHeader>(), PAGE_HEADER_SIZE);
    }

    #[test]
    fn create_builds_empty_compact_page() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let page = create_page(&mut buf, true);
        let view = page.as_ref();

        assert!(view.is_compact());
        assert_eq!(view.n_recs(), 0);
        assert_eq!(view.n_dir_slots(), 2);
        assert_eq!(view.n_heap(), 2);
        assert_eq!(view.heap_top(), Compact::HEAP_START);
        assert_eq!(view.free_head(), 0);
        assert_eq!(view.direction(), PageDirection::NoDirection);
        assert_eq!(view.kind(), fil::KIND_INDEX);
        assert_eq!(
            Compact::next_offs(view.data(), Compact::INFIMUM),
            Compact::SUPREMUM
        );
    }

    #[test]
    fn create_builds_empty_redundant_page() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let page = create_page(&mut buf, false);
        let view = page.as_ref();

        assert!(!view.is_compact());
        assert_eq!(view.heap_top(), Redundant::HEAP_START);
        assert_eq!(
            Redundant::next_offs(view.data(), Redundant::INFIMUM),
            Redundant::SUPREMUM
        );
    }

    #[test]
    fn create_logs_page_create() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut log = MemoryLog::default();
        IndexPageMut::create(&mut buf, true, true, &mut log).unwrap();
        assert_eq!(
            log.records,
            vec![LogRecord::PageCreate {
                compact: true,
                rtree: true
            }]
        );
        assert_eq!(IndexPage::new(buf.bytes()).unwrap().kind(), fil::KIND_RTREE);
    }

    #[test]
    fn create_bumps_modify_clock() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        assert_eq!(buf.modify_clock(), 0);
        create_page(&mut buf, true);
        assert_eq!(buf.modify_clock(), 1);
    }

    #[test]
    fn open_rejects_uninitialized_frame() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        assert!(IndexPageMut::open(&mut buf).is_err());
    }

    #[test]
    fn alloc_heap_advances_top_and_heap_no() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = create_page(&mut buf, true);

        let (off, heap_no) = page.alloc_heap(32).unwrap();
        assert_eq!(off, Compact::HEAP_START);
        assert_eq!(heap_no, 2);

        let (off2, heap_no2) = page.alloc_heap(16).unwrap();
        assert_eq!(off2, Compact::HEAP_START + 32);
        assert_eq!(heap_no2, 3);
        assert_eq!(page.as_ref().n_heap(), 4);
    }

    #[test]
    fn alloc_heap_refuses_oversized_request() {
        let mut buf = PageBuf::new(PageSize::Kb4);
        let mut page = create_page(&mut buf, true);
        assert!(page.alloc_heap(5000).is_none());
        // A failed allocation leaves the header untouched.
        assert_eq!(page.as_ref().heap_top(), Compact::HEAP_START);
        assert_eq!(page.as_ref().n_heap(), 2);
    }

    #[test]
    fn create_empty_preserves_level_and_secondary_leaf_trx_id() {
        use crate::dict::{FieldDef, IndexKind};
        let index = IndexDef::new(9, IndexKind::Secondary, vec![FieldDef::fixed(4)]).unwrap();

        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = create_page(&mut buf, true);
        page.set_max_trx_id(777);
        page.set_index_id(9);
        page.alloc_heap(100).unwrap();

        page.create_empty(&index, &mut NoopLog);
        let view = page.as_ref();
        assert_eq!(view.max_trx_id(), 777);
        assert_eq!(view.index_id(), 9);
        assert_eq!(view.heap_top(), Compact::HEAP_START);
        assert_eq!(view.n_heap(), 2);
    }

    #[test]
    fn create_empty_clears_trx_id_on_non_leaf() {
        use crate::dict::{FieldDef, IndexKind};
        let index = IndexDef::new(9, IndexKind::Secondary, vec![FieldDef::fixed(4)]).unwrap();

        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = create_page(&mut buf, true);
        page.set_level(1);
        page.set_max_trx_id(777);
        page.create_empty(&index, &mut NoopLog);
        assert_eq!(page.as_ref().max_trx_id(), 0);
        assert_eq!(page.as_ref().level(), 1);
    }

    #[test]
    fn max_insert_size_shrinks_with_heap_use() {
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = create_page(&mut buf, true);
        let before = page.as_ref().max_insert_size(1);
        page.alloc_heap(100).unwrap();
        let after = page.as_ref().max_insert_size(1);
        assert!(after < before);
        assert!(before - after >= 100);
    }
}
