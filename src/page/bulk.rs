//! # Bulk Record Operations
//!
//! B-tree splits and merges move whole record ranges between pages. The
//! operations here work on list segments:
//!
//! - `copy_list_end` / `copy_list_start`: copy a segment onto another
//!   page, appending after its last user record. Per-record inserts are
//!   not redo-logged; the caller logs the destination page whole.
//! - `delete_list_end` / `delete_list_start`: drop a segment, emitting a
//!   single log record naming the cut offset.
//! - `move_list_end` / `move_list_start`: copy, then delete the source
//!   segment.
//! - `reorganize`: rebuild the page from a snapshot to reclaim garbage
//!   bytes (the only way deleted record bytes are ever recovered).
//!
//! Large copies onto an empty page skip per-insert ownership updates and
//! rebuild the directory in one pass at the end, the way bulk index loads
//! do.
//!
//! This crate operates on uncompressed frames only, so the
//! `CompressOverflow` disposition of the error contract is never produced
//! here; callers of a compressed-page port would fall back to
//! [`reorganize`](IndexPageMut::reorganize).

use eyre::{ensure, Result};

use crate::config::MAX_OWNED;
use crate::dict::IndexDef;
use crate::error::{corruption, PageError};
use crate::memory::FramePool;
use crate::mtr::{LogContext, LogRecord};
use crate::page::{IndexPage, IndexPageMut};
use crate::rec::codec;
use crate::rec::{Compact, RecFmt, RecOffsets, Redundant};

/// Copies of more than this many records onto an empty page use the
/// one-pass directory rebuild instead of incremental slot splits.
const DIR_REBUILD_THRESHOLD: usize = MAX_OWNED;

fn ensure_same_format(dst: &IndexPageMut<'_>, src: IndexPage<'_>) -> Result<()> {
    ensure!(
        dst.as_ref().is_compact() == src.is_compact(),
        PageError::Precondition("bulk copy between different record formats".into())
    );
    Ok(())
}

fn copy_range_fmt<F: RecFmt>(
    dst: &mut IndexPageMut<'_>,
    src: IndexPage<'_>,
    index: &IndexDef,
    first: usize,
    stop: usize,
) -> Result<()> {
    let mut count = 0usize;
    {
        let mut rec = first;
        while rec != stop {
            if rec == 0 {
                return Err(corruption(src.page_no(), "copy range is not list-connected"));
            }
            count += 1;
            rec = F::next_offs(src.data(), rec);
        }
    }
    if count == 0 {
        return Ok(());
    }

    let fast = dst.as_ref().is_empty() && count > DIR_REBUILD_THRESHOLD;
    let mut offsets = RecOffsets::new();
    let mut cur2 = dst.as_ref().prev_rec_fmt::<F>(F::SUPREMUM)?;
    let mut cur1 = first;
    while cur1 != stop {
        codec::init_offsets(src.data(), cur1, index, F::COMPACT, &mut offsets);
        cur2 = dst.insert_rec_after::<F>(index, cur2, src.data(), cur1, &offsets, !fast)?;
        cur1 = F::next_offs(src.data(), cur1);
    }
    if fast {
        dst.rebuild_dir::<F>()?;
    }

    // A leaf of a durable secondary index keeps the larger of the two
    // max trx ids, so MVCC checks above this core stay conservative.
    if index.is_secondary() && !index.is_temporary() && dst.as_ref().is_leaf() {
        let merged = src.max_trx_id().max(dst.as_ref().max_trx_id());
        if merged != 0 {
            dst.set_max_trx_id(merged);
        }
    }
    Ok(())
}

/// Copies records from `rec` (inclusive) to the supremum of `src` onto
/// `dst`, appending after its last user record in list order.
pub fn copy_list_end(
    dst: &mut IndexPageMut<'_>,
    src: IndexPage<'_>,
    index: &IndexDef,
    rec: usize,
) -> Result<()> {
    ensure_same_format(dst, src)?;
    if src.is_compact() {
        let first = if Compact::is_infimum(rec) {
            Compact::next_offs(src.data(), rec)
        } else {
            rec
        };
        copy_range_fmt::<Compact>(dst, src, index, first, Compact::SUPREMUM)
    } else {
        let first = if Redundant::is_infimum(rec) {
            Redundant::next_offs(src.data(), rec)
        } else {
            rec
        };
        copy_range_fmt::<Redundant>(dst, src, index, first, Redundant::SUPREMUM)
    }
}

/// Copies records from the first user record of `src` up to `rec`
/// (exclusive) onto `dst`, appending after its last user record.
pub fn copy_list_start(
    dst: &mut IndexPageMut<'_>,
    src: IndexPage<'_>,
    index: &IndexDef,
    rec: usize,
) -> Result<()> {
    ensure_same_format(dst, src)?;
    if src.is_compact() {
        let first = Compact::next_offs(src.data(), Compact::INFIMUM);
        copy_range_fmt::<Compact>(dst, src, index, first, rec)
    } else {
        let first = Redundant::next_offs(src.data(), Redundant::INFIMUM);
        copy_range_fmt::<Redundant>(dst, src, index, first, rec)
    }
}

/// Moves the list end starting at `split_rec` (inclusive) from `src` to
/// `dst`. On failure the source page is untouched.
pub fn move_list_end<L: LogContext>(
    dst: &mut IndexPageMut<'_>,
    src: &mut IndexPageMut<'_>,
    index: &IndexDef,
    split_rec: usize,
    log: &mut L,
) -> Result<()> {
    copy_list_end(dst, src.as_ref(), index, split_rec)?;
    src.delete_list_end(index, split_rec, log)
}

/// Moves the list start up to `split_rec` (exclusive) from `src` to
/// `dst`. On failure the source page is untouched.
pub fn move_list_start<L: LogContext>(
    dst: &mut IndexPageMut<'_>,
    src: &mut IndexPageMut<'_>,
    index: &IndexDef,
    split_rec: usize,
    log: &mut L,
) -> Result<()> {
    copy_list_start(dst, src.as_ref(), index, split_rec)?;
    src.delete_list_start(index, split_rec, log)
}

impl<'a> IndexPageMut<'a> {
    /// Deletes records from `rec` (inclusive) to the supremum. Deleting
    /// everything re-creates the page empty; otherwise the whole segment
    /// is unlinked at once, chained onto the free list, and a single
    /// `ListEndDelete` record is logged.
    pub fn delete_list_end<L: LogContext>(
        &mut self,
        index: &IndexDef,
        rec: usize,
        log: &mut L,
    ) -> Result<()> {
        if self.as_ref().is_compact() {
            self.delete_list_end_fmt::<Compact, L>(index, rec, log)
        } else {
            self.delete_list_end_fmt::<Redundant, L>(index, rec, log)
        }
    }

    fn delete_list_end_fmt<F: RecFmt, L: LogContext>(
        &mut self,
        index: &IndexDef,
        rec: usize,
        log: &mut L,
    ) -> Result<()> {
        if F::is_supremum(rec) {
            return Ok(());
        }
        {
            let view = self.as_ref();
            if F::is_infimum(rec) || F::next_offs(view.data(), F::INFIMUM) == rec {
                self.create_empty(index, log);
                return Ok(());
            }
        }

        self.touch();
        self.header_mut().set_last_insert(0);
        log.log(LogRecord::ListEndDelete { cut: rec as u16 });

        let (prev, last_rec, size, count, new_owned, slot_index) = {
            let view = self.as_ref();
            let data = view.data();
            let prev = view.prev_rec_fmt::<F>(rec)?;
            let last_rec = view.prev_rec_fmt::<F>(F::SUPREMUM)?;

            // Sum the sizes and count of the records being cut.
            let mut offsets = RecOffsets::new();
            let mut size = 0usize;
            let mut count = 0usize;
            let mut cursor = rec;
            while cursor != F::SUPREMUM {
                if cursor == 0 {
                    return Err(corruption(view.page_no(), "cut segment leaves the list"));
                }
                codec::init_offsets(data, cursor, index, F::COMPACT, &mut offsets);
                size += offsets.total_size();
                count += 1;
                cursor = F::next_offs(data, cursor);
            }

            // The cut point's owner: surviving bucket records plus the
            // supremum become the new last bucket.
            let mut owner_rec = rec;
            let mut skipped = 0usize;
            while F::n_owned(data, owner_rec) == 0 {
                skipped += 1;
                owner_rec = F::next_offs(data, owner_rec);
                if owner_rec == 0 {
                    return Err(corruption(view.page_no(), "cut segment has no owner"));
                }
            }
            let new_owned = F::n_owned(data, owner_rec) as usize - skipped;
            let slot_index = view.find_owner_slot_fmt::<F>(owner_rec)?;
            (prev, last_rec, size, count, new_owned, slot_index)
        };
        debug_assert!(slot_index > 0);

        self.set_slot_rec(slot_index, F::SUPREMUM);
        F::set_n_owned(self.data_mut(), F::SUPREMUM, new_owned as u8);
        self.header_mut().set_n_dir_slots(slot_index as u16 + 1);

        // Unlink the segment and chain it onto the free list in one move.
        let free = self.as_ref().free_head();
        {
            let data = self.data_mut();
            F::set_next_offs(data, prev, F::SUPREMUM);
            F::set_next_offs(data, last_rec, free);
        }
        let header = self.header_mut();
        header.set_free(rec as u16);
        let garbage = header.garbage();
        header.set_garbage(garbage + size as u16);
        let n_recs = header.n_recs();
        header.set_n_recs(n_recs - count as u16);
        Ok(())
    }

    /// Deletes records from the first user record up to `rec`
    /// (exclusive). One `ListStartDelete` record is logged; the records
    /// are then unlinked individually without further logging.
    pub fn delete_list_start<L: LogContext>(
        &mut self,
        index: &IndexDef,
        rec: usize,
        log: &mut L,
    ) -> Result<()> {
        if self.as_ref().is_compact() {
            self.delete_list_start_fmt::<Compact, L>(index, rec, log)
        } else {
            self.delete_list_start_fmt::<Redundant, L>(index, rec, log)
        }
    }

    fn delete_list_start_fmt<F: RecFmt, L: LogContext>(
        &mut self,
        index: &IndexDef,
        rec: usize,
        log: &mut L,
    ) -> Result<()> {
        if F::is_infimum(rec) {
            return Ok(());
        }
        if F::is_supremum(rec) {
            self.create_empty(index, log);
            return Ok(());
        }

        log.log(LogRecord::ListStartDelete { cut: rec as u16 });

        loop {
            let first = F::next_offs(self.as_ref().data(), F::INFIMUM);
            if first == rec {
                return Ok(());
            }
            if first == 0 || first == F::SUPREMUM {
                return Err(corruption(
                    self.as_ref().page_no(),
                    "cut point vanished while deleting the list start",
                ));
            }
            self.delete_rec_fmt::<F>(index, first)?;
        }
    }

    /// Rebuilds the page from a pooled snapshot, re-inserting every user
    /// record to squeeze out garbage bytes. Contents and header facts
    /// (format, level, index id, secondary-leaf max trx id) survive;
    /// deleted-record bytes do not.
    pub fn reorganize<L: LogContext>(
        &mut self,
        index: &IndexDef,
        pool: &FramePool,
        log: &mut L,
    ) -> Result<()> {
        ensure!(
            pool.frame_size() == self.as_ref().page_size(),
            PageError::Precondition("frame pool sized for a different page".into())
        );

        let mut snapshot = pool.acquire();
        snapshot.copy_from_slice(self.as_ref().data());
        let src = IndexPage::wrap(&snapshot[..]);

        self.create_empty(index, log);
        if let Some(first) = src.first_user_rec() {
            copy_list_end(self, src, index, first)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PAGE_SIZE;
    use crate::dict::{FieldDef, IndexKind};
    use crate::mtr::{MemoryLog, NoopLog};
    use crate::page::PageBuf;
    use crate::rec::{Tuple, TupleField};

    fn int_index() -> IndexDef {
        IndexDef::new(1, IndexKind::Clustered, vec![FieldDef::fixed(4)]).unwrap()
    }

    fn fill_keys(page: &mut IndexPageMut<'_>, index: &IndexDef, keys: impl Iterator<Item = u32>) -> Vec<usize> {
        let mut cur = page.as_ref().infimum();
        let mut recs = Vec::new();
        for key in keys {
            let bytes = key.to_be_bytes();
            let tuple = Tuple::new([TupleField::new(&bytes)]);
            cur = page.insert_tuple_after(index, cur, &tuple).unwrap();
            recs.push(cur);
        }
        recs
    }

    fn user_keys(view: IndexPage<'_>, index: &IndexDef) -> Vec<u32> {
        let mut keys = Vec::new();
        let mut offsets = RecOffsets::new();
        let mut rec = view.next_rec(view.infimum()).unwrap();
        while rec != view.supremum() {
            view.rec_offsets(index, rec, &mut offsets);
            let bytes = offsets.field_slice(view.data(), rec, 0).unwrap();
            keys.push(u32::from_be_bytes(bytes.try_into().unwrap()));
            rec = view.next_rec(rec).unwrap();
        }
        keys
    }

    #[test]
    fn copy_list_end_appends_to_empty_page() {
        let index = int_index();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut src = IndexPageMut::create(&mut src_buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut src, &index, 1..=50);

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();

        copy_list_end(&mut dst, src.as_ref(), &index, recs[29]).unwrap();

        assert_eq!(user_keys(dst.as_ref(), &index), (30..=50).collect::<Vec<_>>());
        assert_eq!(user_keys(src.as_ref(), &index), (1..=50).collect::<Vec<_>>());
        dst.as_ref().validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn copy_list_start_appends_prefix() {
        let index = int_index();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut src = IndexPageMut::create(&mut src_buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut src, &index, 10..=20);

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();
        fill_keys(&mut dst, &index, 1..=3);

        copy_list_start(&mut dst, src.as_ref(), &index, recs[5]).unwrap();

        assert_eq!(
            user_keys(dst.as_ref(), &index),
            vec![1, 2, 3, 10, 11, 12, 13, 14]
        );
        dst.as_ref().validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn delete_list_end_cuts_and_logs_once() {
        let index = int_index();
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = IndexPageMut::create(&mut buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut page, &index, 1..=50);
        let garbage_before = page.as_ref().garbage_bytes();

        let mut log = MemoryLog::default();
        page.delete_list_end(&index, recs[29], &mut log).unwrap();

        let view = page.as_ref();
        assert_eq!(view.n_recs(), 29);
        assert_eq!(user_keys(view, &index), (1..=29).collect::<Vec<_>>());
        assert_eq!(
            log.records,
            vec![LogRecord::ListEndDelete {
                cut: recs[29] as u16
            }]
        );
        // The cut chain heads the free list and is garbage-accounted.
        assert_eq!(view.free_head(), recs[29]);
        assert_eq!(view.garbage_bytes(), garbage_before + 21 * 9);
        view.validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn delete_list_end_from_first_user_recreates_page() {
        let index = int_index();
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = IndexPageMut::create(&mut buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut page, &index, 1..=10);
        page.set_max_trx_id(5);

        let mut log = MemoryLog::default();
        page.delete_list_end(&index, recs[0], &mut log).unwrap();

        let view = page.as_ref();
        assert_eq!(view.n_recs(), 0);
        assert_eq!(view.n_heap(), 2);
        assert_eq!(view.garbage_bytes(), 0);
        assert_eq!(
            log.records,
            vec![LogRecord::PageCreate {
                compact: true,
                rtree: false
            }]
        );
        view.validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn delete_list_start_unlinks_prefix() {
        let index = int_index();
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = IndexPageMut::create(&mut buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut page, &index, 1..=20);

        let mut log = MemoryLog::default();
        page.delete_list_start(&index, recs[7], &mut log).unwrap();

        let view = page.as_ref();
        assert_eq!(user_keys(view, &index), (9..=20).collect::<Vec<_>>());
        assert_eq!(
            log.records,
            vec![LogRecord::ListStartDelete {
                cut: recs[7] as u16
            }]
        );
        view.validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn move_list_end_splits_between_pages() {
        let index = int_index();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut src = IndexPageMut::create(&mut src_buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut src, &index, 1..=40);

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();

        let mut log = MemoryLog::default();
        move_list_end(&mut dst, &mut src, &index, recs[19], &mut log).unwrap();

        assert_eq!(user_keys(src.as_ref(), &index), (1..=19).collect::<Vec<_>>());
        assert_eq!(user_keys(dst.as_ref(), &index), (20..=40).collect::<Vec<_>>());
        src.as_ref().validate(&index, u64::MAX).unwrap();
        dst.as_ref().validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn move_list_start_merges_left() {
        let index = int_index();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut src = IndexPageMut::create(&mut src_buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut src, &index, 21..=40);

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();
        fill_keys(&mut dst, &index, 1..=20);

        let mut log = MemoryLog::default();
        move_list_start(&mut dst, &mut src, &index, recs[10], &mut log).unwrap();

        assert_eq!(user_keys(dst.as_ref(), &index), (1..=31).collect::<Vec<_>>());
        assert_eq!(user_keys(src.as_ref(), &index), (32..=40).collect::<Vec<_>>());
        src.as_ref().validate(&index, u64::MAX).unwrap();
        dst.as_ref().validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn secondary_leaf_copy_propagates_max_trx_id() {
        let index = IndexDef::new(2, IndexKind::Secondary, vec![FieldDef::fixed(4)]).unwrap();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut src = IndexPageMut::create(&mut src_buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut src, &index, 1..=10);
        src.set_max_trx_id(900);

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();
        dst.set_max_trx_id(350);

        copy_list_end(&mut dst, src.as_ref(), &index, recs[0]).unwrap();
        assert_eq!(dst.as_ref().max_trx_id(), 900);
    }

    #[test]
    fn reorganize_reclaims_garbage() {
        let index = int_index();
        let mut buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut page = IndexPageMut::create(&mut buf, true, false, &mut NoopLog).unwrap();
        let recs = fill_keys(&mut page, &index, 1..=30);
        for rec in recs.iter().skip(1).step_by(2) {
            page.delete_rec(&index, *rec).unwrap();
        }
        let heap_top_before = page.as_ref().heap_top();
        assert!(page.as_ref().garbage_bytes() > 0);

        let pool = FramePool::new(DEFAULT_PAGE_SIZE, 1);
        page.reorganize(&index, &pool, &mut NoopLog).unwrap();

        let view = page.as_ref();
        assert_eq!(view.garbage_bytes(), 0);
        assert!(view.heap_top() < heap_top_before);
        assert_eq!(view.free_head(), 0);
        assert_eq!(
            user_keys(view, &index),
            (1..=30).step_by(2).collect::<Vec<_>>()
        );
        assert_eq!(pool.available(), 1);
        view.validate(&index, u64::MAX).unwrap();
    }

    #[test]
    fn copy_between_formats_is_rejected() {
        let index = int_index();
        let mut src_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let src = IndexPageMut::create(&mut src_buf, false, false, &mut NoopLog).unwrap();
        let src_view = src.as_ref();

        let mut dst_buf = PageBuf::new(DEFAULT_PAGE_SIZE);
        let mut dst = IndexPageMut::create(&mut dst_buf, true, false, &mut NoopLog).unwrap();

        let err = copy_list_end(&mut dst, src_view, &index, src_view.infimum()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PageError>(),
            Some(PageError::Precondition(_))
        ));
    }
}
