//! # Page Validation
//!
//! Structural consistency checks, run at page boundaries in debug flows
//! and after recovery. [`IndexPage::validate`] needs the index descriptor
//! and checks everything: field-level record sanity, key ordering, slot
//! ownership, record overlap and the free list. The two `simple_validate`
//! variants check only what the page itself encodes, so salvage code can
//! sanity-check pages whose schema is not at hand.
//!
//! Any violation is reported as [`Corruption`](crate::PageError) with the
//! page number and reason; the page must not be written back.

use std::cmp::Ordering;

use bumpalo::Bump;
use eyre::{ensure, Result};

use crate::config::{HEAP_NO_USER_LOW, MAX_OWNED, MIN_OWNED};
use crate::dict::IndexDef;
use crate::error::{corruption, PageError};
use crate::page::layout::fil;
use crate::page::IndexPage;
use crate::rec::codec;
use crate::rec::{Compact, RecFmt, RecOffsets, RecStatus, Redundant};

impl<'a> IndexPage<'a> {
    /// Schema-free structural check of a compact page.
    pub fn simple_validate_new(&self) -> Result<()> {
        ensure!(
            self.is_compact(),
            PageError::Precondition("simple_validate_new needs a compact page".into())
        );
        self.simple_validate_fmt::<Compact>()
    }

    /// Schema-free structural check of a redundant page.
    pub fn simple_validate_old(&self) -> Result<()> {
        ensure!(
            !self.is_compact(),
            PageError::Precondition("simple_validate_old needs a redundant page".into())
        );
        self.simple_validate_fmt::<Redundant>()
    }

    fn check_heap_dir_overlap(&self) -> Result<()> {
        let n_slots = self.n_dir_slots();
        if n_slots > self.page_size() / 4 {
            return Err(corruption(
                self.page_no(),
                format!("nonsensical number of dir slots: {n_slots}"),
            ));
        }
        let heap_top = self.heap_top();
        let last_slot = self.slot_addr(n_slots - 1);
        if heap_top > last_slot {
            return Err(corruption(
                self.page_no(),
                format!("record heap ({heap_top}) overlaps the directory ({last_slot})"),
            ));
        }
        Ok(())
    }

    fn simple_validate_fmt<F: RecFmt>(&self) -> Result<()> {
        let page_no = self.page_no();
        let data = self.data();
        self.check_heap_dir_overlap()?;

        let n_slots = self.n_dir_slots();
        let heap_top = self.heap_top();
        let mut count = 0usize;
        let mut own_count = 1usize;
        let mut slot_no = 0usize;
        let mut rec = F::INFIMUM;

        loop {
            if rec > heap_top {
                return Err(corruption(
                    page_no,
                    format!("record {rec} is above the heap top {heap_top}"),
                ));
            }

            let owned = F::n_owned(data, rec) as usize;
            if owned != 0 {
                if owned != own_count {
                    return Err(corruption(
                        page_no,
                        format!("record {rec} owns {owned}, walked {own_count}"),
                    ));
                }
                if self.slot_rec(slot_no) != rec {
                    return Err(corruption(
                        page_no,
                        format!("slot {slot_no} does not point to owner {rec}"),
                    ));
                }
                own_count = 0;
                if !F::is_supremum(rec) {
                    slot_no += 1;
                    if slot_no >= n_slots {
                        return Err(corruption(page_no, "more owners than directory slots"));
                    }
                }
            }

            if F::is_supremum(rec) {
                break;
            }

            let next = F::next_offs(data, rec);
            if next < fil::HEADER_END || next >= self.page_size() {
                return Err(corruption(
                    page_no,
                    format!("nonsensical next offset {next} for record {rec}"),
                ));
            }
            count += 1;
            if count > self.page_size() {
                return Err(corruption(page_no, "record list appears to be circular"));
            }
            rec = next;
            own_count += 1;
        }

        if F::n_owned(data, F::SUPREMUM) == 0 {
            return Err(corruption(page_no, "supremum owns no records"));
        }
        if slot_no != n_slots - 1 {
            return Err(corruption(
                page_no,
                format!("walked {} slots, directory has {n_slots}", slot_no + 1),
            ));
        }
        if self.n_recs() + HEAP_NO_USER_LOW as usize != count + 1 {
            return Err(corruption(
                page_no,
                format!("n_recs {} disagrees with list length {count}", self.n_recs()),
            ));
        }

        // Free-list chain: in bounds, inside the heap, terminating.
        let mut rec = self.free_head();
        while rec != 0 {
            if rec < fil::HEADER_END || rec >= self.page_size() {
                return Err(corruption(
                    page_no,
                    format!("free list record at nonsensical offset {rec}"),
                ));
            }
            if rec > heap_top {
                return Err(corruption(
                    page_no,
                    format!("free list record {rec} is above the heap top"),
                ));
            }
            count += 1;
            if count > self.page_size() {
                return Err(corruption(page_no, "free list appears to be circular"));
            }
            rec = F::next_offs(data, rec);
        }

        if self.n_heap() as usize != count + 1 {
            return Err(corruption(
                page_no,
                format!("n_heap {} disagrees with record count {}", self.n_heap(), count + 1),
            ));
        }
        Ok(())
    }

    /// Full consistency check against the index descriptor. `sys_max_trx_id`
    /// bounds the stored max trx id of secondary leaf pages; pass
    /// `u64::MAX` when the transaction system is not at hand.
    pub fn validate(&self, index: &IndexDef, sys_max_trx_id: u64) -> Result<()> {
        if self.is_compact() {
            self.validate_fmt::<Compact>(index, sys_max_trx_id)
        } else {
            self.validate_fmt::<Redundant>(index, sys_max_trx_id)
        }
    }

    fn slot_owned_in_bounds(&self, slot_no: usize, owned: usize) -> bool {
        let last = self.n_dir_slots() - 1;
        if slot_no == 0 {
            owned == 1
        } else if slot_no == last || slot_no == 1 {
            // The supremum slot has no neighbor to balance with, and the
            // first user slot may run low right after a list-end cut.
            (1..=MAX_OWNED).contains(&owned)
        } else {
            (MIN_OWNED..=MAX_OWNED).contains(&owned)
        }
    }

    fn validate_fmt<F: RecFmt>(&self, index: &IndexDef, sys_max_trx_id: u64) -> Result<()> {
        let page_no = self.page_no();
        let data = self.data();

        if self.is_compact() != index.is_compact() {
            return Err(corruption(page_no, "record format flag disagrees with the index"));
        }
        self.simple_validate_fmt::<F>()?;

        if index.is_secondary() && !index.is_temporary() && self.is_leaf() && !self.is_empty() {
            let max_trx_id = self.max_trx_id();
            if max_trx_id == 0 || max_trx_id > sys_max_trx_id {
                return Err(corruption(
                    page_no,
                    format!("max trx id {max_trx_id} out of bounds (system {sys_max_trx_id})"),
                ));
            }
        }

        // Overlap bitmap: one byte per page byte, arena-scratch for the
        // duration of the check.
        let arena = Bump::new();
        let used = arena.alloc_slice_fill_copy(self.page_size(), 0u8);

        let n_slots = self.n_dir_slots();
        let mut offsets = RecOffsets::new();
        let mut old_offsets = RecOffsets::new();
        let mut old_rec: Option<usize> = None;
        let mut data_size = 0usize;
        let mut count = 0usize;
        let mut own_count = 1usize;
        let mut slot_no = 0usize;
        let mut rec = F::INFIMUM;

        loop {
            codec::init_offsets(data, rec, index, F::COMPACT, &mut offsets);

            if F::COMPACT && F::is_user(rec) {
                match F::status(data, rec) {
                    RecStatus::Ordinary if !self.is_leaf() => {
                        return Err(corruption(page_no, "ordinary record on a non-leaf page"));
                    }
                    RecStatus::NodePtr if self.is_leaf() => {
                        return Err(corruption(page_no, "node pointer record on a leaf page"));
                    }
                    RecStatus::Infimum | RecStatus::Supremum => {
                        return Err(corruption(
                            page_no,
                            format!("user record {rec} carries a sentinel status"),
                        ));
                    }
                    _ => {}
                }
            }

            // Field-level sanity: the record must lie inside the page.
            let start = rec - offsets.extra_size();
            let size = offsets.total_size();
            if start + size >= self.page_size() || size >= self.page_size() {
                return Err(corruption(
                    page_no,
                    format!("record {rec} extends outside the page"),
                ));
            }

            let owned = F::n_owned(data, rec) as usize;
            if owned > MAX_OWNED {
                return Err(corruption(
                    page_no,
                    format!("record {rec} owns too many records: {owned}"),
                ));
            }
            let heap_no = F::heap_no(data, rec);
            if heap_no >= self.n_heap() {
                return Err(corruption(
                    page_no,
                    format!("heap number {heap_no} of record {rec} too large"),
                ));
            }

            // Keys ascend along the list; spatial non-leaf levels may
            // repeat a key.
            if let Some(old) = old_rec {
                if !F::is_supremum(rec) {
                    let ord =
                        codec::compare_records(data, rec, &offsets, data, old, &old_offsets);
                    let equal_ok = index.is_spatial() && !self.is_leaf();
                    if ord == Ordering::Less || (ord == Ordering::Equal && !equal_ok) {
                        return Err(corruption(
                            page_no,
                            format!("records out of order: {old} vs {rec}"),
                        ));
                    }
                }
            }

            if F::is_user(rec) {
                data_size += size;
            }

            for byte in &mut used[start..start + size] {
                if *byte != 0 {
                    return Err(corruption(
                        page_no,
                        format!("record {rec} overlaps another record"),
                    ));
                }
                *byte = 1;
            }

            if owned != 0 {
                if owned != own_count {
                    return Err(corruption(
                        page_no,
                        format!("record {rec} owns {owned}, walked {own_count}"),
                    ));
                }
                if self.slot_rec(slot_no) != rec {
                    return Err(corruption(
                        page_no,
                        format!("slot {slot_no} does not point to owner {rec}"),
                    ));
                }
                if !self.slot_owned_in_bounds(slot_no, owned) {
                    return Err(corruption(
                        page_no,
                        format!("slot {slot_no} ownership count {owned} out of bounds"),
                    ));
                }
                own_count = 0;
                if !F::is_supremum(rec) {
                    slot_no += 1;
                    if slot_no >= n_slots {
                        return Err(corruption(page_no, "more owners than directory slots"));
                    }
                }
            }

            if F::is_supremum(rec) {
                break;
            }

            count += 1;
            own_count += 1;
            if F::is_user(rec) {
                old_rec = Some(rec);
                std::mem::swap(&mut offsets, &mut old_offsets);
            }
            rec = F::next_offs(data, rec);
        }

        if slot_no != n_slots - 1 {
            return Err(corruption(page_no, "slot walk did not end at the supremum slot"));
        }
        if self.n_recs() + HEAP_NO_USER_LOW as usize != count + 1 {
            return Err(corruption(
                page_no,
                format!("n_recs {} disagrees with list length", self.n_recs()),
            ));
        }
        if data_size != self.data_size() {
            return Err(corruption(
                page_no,
                format!(
                    "summed record bytes {data_size} disagree with data size {}",
                    self.data_size()
                ),
            ));
        }

        // Free-list records must also stay in bounds and off the live
        // records' bytes.
        let mut free_count = 0usize;
        let mut rec = self.free_head();
        while rec != 0 {
            if rec < fil::HEADER_END || rec >= self.page_size() {
                return Err(corruption(
                    page_no,
                    format!("free list record at nonsensical offset {rec}"),
                ));
            }
            codec::init_offsets(data, rec, index, F::COMPACT, &mut offsets);
            let start = rec - offsets.extra_size();
            let size = offsets.total_size();
            if start + size >= self.page_size() {
                return Err(corruption(page_no, "free record extends outside the page"));
            }
            for byte in &mut used[start..start + size] {
                if *byte != 0 {
                    return Err(corruption(page_no, "free record overlaps another record"));
                }
                *byte = 1;
            }
            free_count += 1;
            if free_count > self.page_size() {
                return Err(corruption(page_no, "free list appears to be circular"));
            }
            rec = F::next_offs(data, rec);
        }

        if self.n_heap() as usize != count + free_count + 1 {
            return Err(corruption(
                page_no,
                format!("n_heap {} disagrees with live + free records", self.n_heap()),
            ));
        }
        Ok(())
    }
}
