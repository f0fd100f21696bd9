//! # Page Directory
//!
//! The directory is a packed array of 2-byte slots at the page tail,
//! indexed from the end: slot 0 occupies the two bytes just before the
//! trailer and always points at the infimum; the last slot always points
//! at the supremum. Each slot stores the absolute origin of the record
//! that *owns* the run of list records ending at it; the owned count lives
//! in that record's `n_owned` field.
//!
//! ```text
//!        infimum ── r1 ── r2 ── r3 ── r4 ── r5 ── r6 ── supremum
//! owns:     1                    4                    3
//!           ▲                    ▲                    ▲
//!        slot 0               slot 1               slot 2
//! ```
//!
//! Ownership counts stay within `MIN_OWNED..=MAX_OWNED` (slot 0 exactly 1,
//! slot 1 and the supremum slot may own fewer): inserts split an overfull
//! slot, deletes balance a deficient one against its upper neighbor,
//! merging the two when the neighbor cannot give a record away.

use eyre::Result;

use crate::config::{DIR_SLOT_SIZE, MAX_OWNED, MIN_OWNED, OWNED_REBUILD_GROUP};
use crate::error::corruption;
use crate::page::layout::fil;
use crate::page::{IndexPage, IndexPageMut};
use crate::rec::{Compact, RecFmt, Redundant};

impl<'a> IndexPage<'a> {
    /// Byte address of slot `i`. Slot 0 is tail-most; higher indexes grow
    /// toward the heap.
    #[inline]
    pub(crate) fn slot_addr(&self, i: usize) -> usize {
        self.page_size() - fil::TRAILER_SIZE - (i + 1) * DIR_SLOT_SIZE
    }

    /// Record origin stored in slot `i`.
    #[inline]
    pub fn slot_rec(&self, i: usize) -> usize {
        debug_assert!(i < self.n_dir_slots());
        let at = self.slot_addr(i);
        u16::from_be_bytes([self.data()[at], self.data()[at + 1]]) as usize
    }

    pub(crate) fn find_owner_slot_fmt<F: RecFmt>(&self, rec: usize) -> Result<usize> {
        let data = self.data();
        let mut owner = rec;
        while F::n_owned(data, owner) == 0 {
            owner = F::next_offs(data, owner);
            if owner == 0 {
                return Err(corruption(
                    self.page_no(),
                    format!("record {rec} reaches the end of the list without an owner"),
                ));
            }
        }
        for i in (0..self.n_dir_slots()).rev() {
            if self.slot_rec(i) == owner {
                return Ok(i);
            }
        }
        Err(corruption(
            self.page_no(),
            format!("owner {owner} of record {rec} is in no directory slot"),
        ))
    }

    /// The slot owning `rec`: walk forward to the nearest record with a
    /// nonzero owned count, then find its slot.
    pub fn find_owner_slot(&self, rec: usize) -> Result<usize> {
        if self.is_compact() {
            self.find_owner_slot_fmt::<Compact>(rec)
        } else {
            self.find_owner_slot_fmt::<Redundant>(rec)
        }
    }

    fn nth_rec_fmt<F: RecFmt>(&self, nth: usize) -> Result<usize> {
        if nth == 0 {
            return Ok(F::INFIMUM);
        }
        let data = self.data();
        let mut before = 0usize;
        for i in 0..self.n_dir_slots() {
            let own = F::n_owned(data, self.slot_rec(i)) as usize;
            if before + own > nth {
                // Start from the previous bucket's last record and step in.
                let mut rec = self.slot_rec(i - 1);
                for _ in 0..nth - before + 1 {
                    rec = F::next_offs(data, rec);
                    if rec == 0 {
                        return Err(corruption(
                            self.page_no(),
                            "record list ends inside an owned bucket",
                        ));
                    }
                }
                return Ok(rec);
            }
            before += own;
        }
        Err(corruption(
            self.page_no(),
            format!("record index {nth} lies past the supremum"),
        ))
    }

    /// The `nth` record in list order; the infimum is the 0th.
    pub fn nth_rec(&self, nth: usize) -> Result<usize> {
        if self.is_compact() {
            self.nth_rec_fmt::<Compact>(nth)
        } else {
            self.nth_rec_fmt::<Redundant>(nth)
        }
    }

    fn n_recs_before_fmt<F: RecFmt>(&self, rec: usize) -> Result<usize> {
        let slot_no = self.find_owner_slot_fmt::<F>(rec)?;
        if slot_no == 0 {
            return Ok(0);
        }
        let data = self.data();
        let mut before = 0usize;
        for i in 0..slot_no {
            before += F::n_owned(data, self.slot_rec(i)) as usize;
        }
        let mut cursor = self.slot_rec(slot_no - 1);
        let mut steps = 0usize;
        while cursor != rec {
            cursor = F::next_offs(data, cursor);
            steps += 1;
            if cursor == 0 {
                return Err(corruption(
                    self.page_no(),
                    format!("record {rec} is not inside its owner's bucket"),
                ));
            }
        }
        // List position, then drop the infimum from the count.
        Ok((before - 1 + steps).saturating_sub(1))
    }

    /// Number of user records preceding `rec` in list order, computed by
    /// summing whole slot buckets and walking the tail. Inverse of
    /// [`nth_rec`](Self::nth_rec) for user records.
    pub fn n_recs_before(&self, rec: usize) -> Result<usize> {
        if self.is_compact() {
            self.n_recs_before_fmt::<Compact>(rec)
        } else {
            self.n_recs_before_fmt::<Redundant>(rec)
        }
    }
}

impl<'a> IndexPageMut<'a> {
    pub(crate) fn set_slot_rec(&mut self, i: usize, rec: usize) {
        let at = self.as_ref().slot_addr(i);
        self.data_mut()[at..at + DIR_SLOT_SIZE].copy_from_slice(&(rec as u16).to_be_bytes());
    }

    /// Opens slot `start + 1` by shifting all later slots one entry toward
    /// the heap. The new slot's record and owned count are the caller's
    /// responsibility.
    pub(crate) fn dir_add_slot(&mut self, start: usize) {
        let view = self.as_ref();
        let n_slots = view.n_dir_slots();
        debug_assert!(start < n_slots - 1);
        let lo = view.slot_addr(n_slots - 1);
        let len = (n_slots - 1 - start) * DIR_SLOT_SIZE;
        self.data_mut().copy_within(lo..lo + len, lo - DIR_SLOT_SIZE);
        self.header_mut().set_n_dir_slots(n_slots as u16 + 1);
    }

    /// Removes slot `slot_no`; the next slot up inherits its records.
    pub(crate) fn dir_delete_slot<F: RecFmt>(&mut self, slot_no: usize) {
        let view = self.as_ref();
        let n_slots = view.n_dir_slots();
        debug_assert!(slot_no > 0 && slot_no + 1 < n_slots);

        let rec = view.slot_rec(slot_no);
        let up_rec = view.slot_rec(slot_no + 1);
        let lo = view.slot_addr(n_slots - 1);
        let len = (n_slots - 1 - slot_no) * DIR_SLOT_SIZE;

        let data = self.data_mut();
        let n_owned = F::n_owned(data, rec);
        F::set_n_owned(data, rec, 0);
        let up_owned = F::n_owned(data, up_rec);
        F::set_n_owned(data, up_rec, n_owned + up_owned);

        data.copy_within(lo..lo + len, lo + DIR_SLOT_SIZE);
        data[lo..lo + DIR_SLOT_SIZE].fill(0);
        self.header_mut().set_n_dir_slots(n_slots as u16 - 1);
    }

    /// Splits slot `slot_no`, which owns one record too many: a new slot
    /// is inserted below it pointing at the bucket midpoint.
    pub(crate) fn dir_split_slot<F: RecFmt>(&mut self, slot_no: usize) {
        let view = self.as_ref();
        debug_assert!(slot_no > 0);
        let slot_rec = view.slot_rec(slot_no);
        let prev_rec = view.slot_rec(slot_no - 1);
        let data = view.data();

        let n_owned = F::n_owned(data, slot_rec) as usize;
        debug_assert_eq!(n_owned, MAX_OWNED + 1);

        let mut mid = prev_rec;
        for _ in 0..n_owned / 2 {
            mid = F::next_offs(data, mid);
        }

        self.dir_add_slot(slot_no - 1);
        // The added slot is now slot_no; the old slot moved to slot_no + 1.
        self.set_slot_rec(slot_no, mid);
        let data = self.data_mut();
        F::set_n_owned(data, mid, (n_owned / 2) as u8);
        F::set_n_owned(data, slot_rec, (n_owned - n_owned / 2) as u8);
    }

    /// Balances slot `slot_no`, which owns one record too few: borrow one
    /// record from the upper neighbor, or merge into it when it cannot
    /// spare any. No-op on the supremum slot, which has no upper neighbor
    /// and is allowed to run low.
    pub(crate) fn dir_balance_slot<F: RecFmt>(&mut self, slot_no: usize) {
        let view = self.as_ref();
        debug_assert!(slot_no > 0);
        if slot_no == view.n_dir_slots() - 1 {
            return;
        }

        let old_rec = view.slot_rec(slot_no);
        let up_rec = view.slot_rec(slot_no + 1);
        let data = view.data();
        let n_owned = F::n_owned(data, old_rec) as usize;
        let up_owned = F::n_owned(data, up_rec) as usize;

        if up_owned > MIN_OWNED {
            let new_rec = F::next_offs(data, old_rec);
            let data = self.data_mut();
            F::set_n_owned(data, old_rec, 0);
            F::set_n_owned(data, new_rec, n_owned as u8 + 1);
            F::set_n_owned(data, up_rec, up_owned as u8 - 1);
            self.set_slot_rec(slot_no, new_rec);
        } else {
            self.dir_delete_slot::<F>(slot_no);
        }
    }

    /// Rebuilds the whole directory from the record list, assigning
    /// ownership in groups of [`OWNED_REBUILD_GROUP`]. Used after bulk
    /// loads instead of incremental splits.
    pub(crate) fn rebuild_dir<F: RecFmt>(&mut self) -> Result<()> {
        let page_no = self.as_ref().page_no();

        // First pass: clear every user record's owned count.
        {
            let data = self.data_mut();
            let mut rec = F::next_offs(data, F::INFIMUM);
            while rec != F::SUPREMUM {
                if rec == 0 {
                    return Err(corruption(page_no, "record list broken during rebuild"));
                }
                F::set_n_owned(data, rec, 0);
                rec = F::next_offs(data, rec);
            }
            F::set_n_owned(data, F::INFIMUM, 1);
        }
        self.set_slot_rec(0, F::INFIMUM);

        // Second pass: collect the bucket boundary records.
        let (mut boundaries, mut tail_count) = {
            let data = self.as_ref().data();
            let mut boundaries: Vec<usize> = Vec::new();
            let mut count = 0usize;
            let mut rec = F::next_offs(data, F::INFIMUM);
            while rec != F::SUPREMUM {
                count += 1;
                if count == OWNED_REBUILD_GROUP {
                    boundaries.push(rec);
                    count = 0;
                }
                rec = F::next_offs(data, rec);
            }
            (boundaries, count)
        };

        // Fold a tiny trailing bucket into the previous one when the
        // combined count still fits, mirroring what incremental inserts
        // would have produced.
        if !boundaries.is_empty() && tail_count + 1 + OWNED_REBUILD_GROUP <= MAX_OWNED {
            boundaries.pop();
            tail_count += OWNED_REBUILD_GROUP;
        }

        for (i, &rec) in boundaries.iter().enumerate() {
            self.set_slot_rec(i + 1, rec);
            F::set_n_owned(self.data_mut(), rec, OWNED_REBUILD_GROUP as u8);
        }
        let n_slots = boundaries.len() + 2;
        self.set_slot_rec(n_slots - 1, F::SUPREMUM);
        F::set_n_owned(self.data_mut(), F::SUPREMUM, tail_count as u8 + 1);
        self.header_mut().set_n_dir_slots(n_slots as u16);
        Ok(())
    }
}
