//! # Record List
//!
//! User records form a singly-linked list from the infimum to the
//! supremum, kept in ascending key order by the callers that pick the
//! insert position. This module maintains the list and everything a
//! single-record mutation touches: heap placement (free-list reuse or
//! bump allocation), the owning slot's count, the insert-direction
//! statistics and the garbage accounting.
//!
//! ## Insert
//!
//! ```text
//! 1. Encode the tuple into per-operation arena scratch
//! 2. Place the bytes: head of the free list if the cell fits, else
//!    bump-allocate from the heap (NoSpace when the free region is gone)
//! 3. Stamp heap number, clear n_owned, splice after the cursor
//! 4. Bump the owner's n_owned; split the slot at MAX_OWNED + 1
//! ```
//!
//! ## Delete
//!
//! ```text
//! 1. Unlink from the list, repointing the slot if it targeted the record
//! 2. Push onto the LIFO free list (the next-pointer field doubles as the
//!    free-list link); bytes stay until reorganization reclaims them
//! 3. Decrement the owner's n_owned; balance the slot at MIN_OWNED - 1
//! ```
//!
//! Single-record inserts and deletes are not redo-logged by this core;
//! only page creation and the bulk list deletes carry log records.

use std::cmp::Ordering;

use bumpalo::Bump;
use eyre::{ensure, Result};

use crate::config::{MAX_OWNED, MIN_OWNED};
use crate::dict::IndexDef;
use crate::error::{corruption, PageError};
use crate::page::{IndexPage, IndexPageMut, PageDirection};
use crate::rec::codec;
use crate::rec::{Compact, RecFmt, RecOffsets, RecStatus, Redundant, Tuple};

impl<'a> IndexPage<'a> {
    /// Successor of `rec` in list order, `None` at the supremum.
    pub fn next_rec(&self, rec: usize) -> Option<usize> {
        let next = if self.is_compact() {
            Compact::next_offs(self.data(), rec)
        } else {
            Redundant::next_offs(self.data(), rec)
        };
        (next != 0).then_some(next)
    }

    /// First user record, `None` on an empty page.
    pub fn first_user_rec(&self) -> Option<usize> {
        let first = self.next_rec(self.infimum())?;
        (first != self.supremum()).then_some(first)
    }

    pub(crate) fn prev_rec_fmt<F: RecFmt>(&self, rec: usize) -> Result<usize> {
        ensure!(
            !F::is_infimum(rec),
            PageError::Precondition("the infimum has no predecessor".into())
        );
        let slot_no = self.find_owner_slot_fmt::<F>(rec)?;
        let data = self.data();
        let mut cursor = if slot_no == 0 {
            F::INFIMUM
        } else {
            self.slot_rec(slot_no - 1)
        };
        loop {
            let next = F::next_offs(data, cursor);
            if next == rec {
                return Ok(cursor);
            }
            if next == 0 {
                return Err(corruption(
                    self.page_no(),
                    format!("record {rec} unreachable from its slot bracket"),
                ));
            }
            cursor = next;
        }
    }

    /// Predecessor of `rec`: found by walking forward from the previous
    /// slot's record, O(bucket).
    pub fn prev_rec(&self, rec: usize) -> Result<usize> {
        if self.is_compact() {
            self.prev_rec_fmt::<Compact>(rec)
        } else {
            self.prev_rec_fmt::<Redundant>(rec)
        }
    }

    /// Decodes the offsets of the record at `rec`, reusing `out`.
    pub fn rec_offsets(&self, index: &IndexDef, rec: usize, out: &mut RecOffsets) {
        codec::init_offsets(self.data(), rec, index, self.is_compact(), out);
    }

    fn lower_bound_fmt<F: RecFmt>(&self, index: &IndexDef, tuple: &Tuple<'_>) -> Result<usize> {
        let data = self.data();
        let mut offsets = RecOffsets::new();

        // Directory binary search narrows to one slot bracket; the slots
        // point to later records as the index grows, matching list order.
        let mut lo = 0usize;
        let mut hi = self.n_dir_slots() - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            let rec = self.slot_rec(mid);
            codec::init_offsets(data, rec, index, F::COMPACT, &mut offsets);
            if codec::compare_tuple_record(tuple, data, rec, &offsets) == Ordering::Less {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        // Walk the bracket to the last record not above the key.
        let mut cursor = self.slot_rec(lo);
        loop {
            let next = F::next_offs(data, cursor);
            if next == 0 {
                return Err(corruption(self.page_no(), "record list ends before supremum"));
            }
            if F::is_supremum(next) {
                return Ok(cursor);
            }
            codec::init_offsets(data, next, index, F::COMPACT, &mut offsets);
            if codec::compare_tuple_record(tuple, data, next, &offsets) == Ordering::Less {
                return Ok(cursor);
            }
            cursor = next;
        }
    }

    /// The last record comparing less than or equal to `tuple` (the
    /// infimum when every record is greater). The result is the insert
    /// position for the tuple; full search policy with tie-breaks belongs
    /// to the B-tree layer, which relies on the slot ordering exercised
    /// here.
    pub fn lower_bound(&self, index: &IndexDef, tuple: &Tuple<'_>) -> Result<usize> {
        if self.is_compact() {
            self.lower_bound_fmt::<Compact>(index, tuple)
        } else {
            self.lower_bound_fmt::<Redundant>(index, tuple)
        }
    }
}

impl<'a> IndexPageMut<'a> {
    /// Encodes `tuple` and inserts it after `cur`, returning the new
    /// record's origin. Fails with [`PageError::NoSpace`] when neither the
    /// free list head nor the heap can hold the record.
    pub fn insert_tuple_after(
        &mut self,
        index: &IndexDef,
        cur: usize,
        tuple: &Tuple<'_>,
    ) -> Result<usize> {
        ensure!(
            matches!(tuple.status, RecStatus::Ordinary | RecStatus::NodePtr),
            PageError::Precondition("only ordinary and node-pointer tuples can be inserted".into())
        );
        let compact = self.as_ref().is_compact();
        let size = codec::converted_size(index, tuple, compact);

        // Per-operation scratch, released on every exit path.
        let arena = Bump::new();
        let buf = arena.alloc_slice_fill_copy(size, 0u8);
        let origin = codec::encode_into(index, tuple, compact, buf)?;
        let mut offsets = RecOffsets::new();
        codec::init_offsets(buf, origin, index, compact, &mut offsets);

        if compact {
            self.insert_rec_after::<Compact>(index, cur, buf, origin, &offsets, true)
        } else {
            self.insert_rec_after::<Redundant>(index, cur, buf, origin, &offsets, true)
        }
    }

    /// Places `rec_size` bytes: the head of the free list when the freed
    /// cell is large enough (slack stays garbage), else a heap
    /// allocation.
    fn place_rec<F: RecFmt>(&mut self, index: &IndexDef, rec_size: usize) -> Result<(usize, u16)> {
        let reuse = {
            let view = self.as_ref();
            let free = view.free_head();
            if free == 0 {
                None
            } else {
                let mut free_offsets = RecOffsets::new();
                codec::init_offsets(view.data(), free, index, F::COMPACT, &mut free_offsets);
                if free_offsets.total_size() < rec_size {
                    None
                } else {
                    Some((
                        free - free_offsets.extra_size(),
                        F::heap_no(view.data(), free),
                        F::next_offs(view.data(), free),
                    ))
                }
            }
        };

        if let Some((start, heap_no, next_free)) = reuse {
            let garbage = self.as_ref().garbage_bytes() - rec_size;
            let header = self.header_mut();
            header.set_free(next_free as u16);
            header.set_garbage(garbage as u16);
            return Ok((start, heap_no));
        }

        self.alloc_heap(rec_size)
            .ok_or_else(|| PageError::NoSpace { need: rec_size }.into())
    }

    /// Core insert: places a copy of the encoded record after `cur` and
    /// splices it in. With `maintain_owner` false the owned counts are
    /// left for a later directory rebuild (bulk-load fast path).
    pub(crate) fn insert_rec_after<F: RecFmt>(
        &mut self,
        index: &IndexDef,
        cur: usize,
        src: &[u8],
        src_rec: usize,
        offsets: &RecOffsets,
        maintain_owner: bool,
    ) -> Result<usize> {
        ensure!(
            !F::is_supremum(cur),
            PageError::Precondition("cannot insert after the supremum".into())
        );
        self.touch();

        let rec_size = offsets.total_size();
        let (dst_start, heap_no) = self.place_rec::<F>(index, rec_size)?;

        // Copy header and data; the list fields are stamped below.
        let src_start = src_rec - offsets.extra_size();
        self.data_mut()[dst_start..dst_start + rec_size]
            .copy_from_slice(&src[src_start..src_start + rec_size]);
        let new_rec = dst_start + offsets.extra_size();

        let old_next = {
            let data = self.data_mut();
            F::set_heap_no(data, new_rec, heap_no);
            F::set_n_owned(data, new_rec, 0);
            let old_next = F::next_offs(data, cur);
            F::set_next_offs(data, new_rec, old_next);
            F::set_next_offs(data, cur, new_rec);
            old_next
        };

        // Insert-direction statistics for split-point heuristics.
        {
            let view = self.as_ref();
            let last = view.last_insert();
            let direction = view.direction();
            let n_direction = view.n_direction() as u16;
            let header = self.header_mut();
            if last == 0 {
                header.set_direction(PageDirection::NoDirection.to_raw());
                header.set_n_direction(0);
            } else if last == cur && direction != PageDirection::Left {
                header.set_direction(PageDirection::Right.to_raw());
                header.set_n_direction(n_direction + 1);
            } else if old_next == last && direction != PageDirection::Right {
                header.set_direction(PageDirection::Left.to_raw());
                header.set_n_direction(n_direction + 1);
            } else {
                header.set_direction(PageDirection::NoDirection.to_raw());
                header.set_n_direction(0);
            }
            header.set_last_insert(new_rec as u16);
            let n_recs = header.n_recs();
            header.set_n_recs(n_recs + 1);
        }

        if !maintain_owner {
            return Ok(new_rec);
        }

        // The new record joins its successor's bucket. Splitting inside
        // the same operation keeps the MAX_OWNED + 1 state unobservable.
        let owner = {
            let data = self.as_ref().data();
            let mut owner = new_rec;
            while F::n_owned(data, owner) == 0 {
                owner = F::next_offs(data, owner);
                if owner == 0 {
                    return Err(corruption(
                        self.as_ref().page_no(),
                        "inserted record has no downstream owner",
                    ));
                }
            }
            owner
        };
        let n_owned = F::n_owned(self.as_ref().data(), owner) as usize;
        F::set_n_owned(self.data_mut(), owner, n_owned as u8 + 1);
        if n_owned == MAX_OWNED {
            let slot_no = self.as_ref().find_owner_slot_fmt::<F>(owner)?;
            self.dir_split_slot::<F>(slot_no);
        }

        Ok(new_rec)
    }

    /// Unlinks and frees the user record at `rec`.
    pub fn delete_rec(&mut self, index: &IndexDef, rec: usize) -> Result<()> {
        if self.as_ref().is_compact() {
            self.delete_rec_fmt::<Compact>(index, rec)
        } else {
            self.delete_rec_fmt::<Redundant>(index, rec)
        }
    }

    pub(crate) fn delete_rec_fmt<F: RecFmt>(&mut self, index: &IndexDef, rec: usize) -> Result<()> {
        ensure!(
            F::is_user(rec),
            PageError::Precondition("cannot delete a sentinel record".into())
        );
        self.touch();

        let (rec_size, slot_no, owner_rec, owner_count, prev, next) = {
            let view = self.as_ref();
            let mut offsets = RecOffsets::new();
            codec::init_offsets(view.data(), rec, index, F::COMPACT, &mut offsets);
            let slot_no = view.find_owner_slot_fmt::<F>(rec)?;
            let owner_rec = view.slot_rec(slot_no);
            let owner_count = F::n_owned(view.data(), owner_rec) as usize;
            let prev = view.prev_rec_fmt::<F>(rec)?;
            let next = F::next_offs(view.data(), rec);
            (offsets.total_size(), slot_no, owner_rec, owner_count, prev, next)
        };

        {
            let data = self.data_mut();
            F::set_next_offs(data, prev, next);
        }

        // If the slot targeted the deleted record, its predecessor takes
        // over the bucket; the predecessor shares the slot because owned
        // counts never drop below two before a delete.
        if owner_rec == rec {
            self.set_slot_rec(slot_no, prev);
            F::set_n_owned(self.data_mut(), prev, owner_count as u8 - 1);
        } else {
            F::set_n_owned(self.data_mut(), owner_rec, owner_count as u8 - 1);
        }

        // LIFO free-list push; the next-pointer field becomes the link.
        let free = self.as_ref().free_head();
        F::set_next_offs(self.data_mut(), rec, free);
        {
            let header = self.header_mut();
            header.set_free(rec as u16);
            let garbage = header.garbage();
            header.set_garbage(garbage + rec_size as u16);
            let n_recs = header.n_recs();
            header.set_n_recs(n_recs - 1);
            // The last-insert hint may point at the freed record; drop it.
            header.set_last_insert(0);
        }

        if owner_count - 1 < MIN_OWNED {
            self.dir_balance_slot::<F>(slot_no);
        }
        Ok(())
    }
}
