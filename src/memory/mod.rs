//! # Scratch Frame Pool
//!
//! Page reorganization needs a page-sized snapshot buffer for every call.
//! This pool keeps reusable frames so steady-state reorganizes allocate
//! nothing, with lock sharding to keep concurrent pages off each other's
//! mutex.
//!
//! `PooledFrame` uses `ManuallyDrop` instead of `Option` so the buffer is
//! always valid until drop, when it returns to its shard.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PageSize;

const FRAME_POOL_SHARD_COUNT: usize = 8;

/// A pool of reusable page-sized scratch frames.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<FramePoolInner>,
}

struct FramePoolInner {
    frame_size: usize,
    shards: [Mutex<Vec<Box<[u8]>>>; FRAME_POOL_SHARD_COUNT],
    /// Round-robin counter distributing acquires across shards.
    next_shard: AtomicUsize,
}

impl FramePool {
    /// Pre-allocates `initial_capacity` frames of the given page size.
    pub fn new(page_size: PageSize, initial_capacity: usize) -> Self {
        let frame_size = page_size.bytes();
        let shards: [Mutex<Vec<Box<[u8]>>>; FRAME_POOL_SHARD_COUNT] =
            std::array::from_fn(|_| Mutex::new(Vec::new()));

        let per_shard = initial_capacity / FRAME_POOL_SHARD_COUNT;
        let remainder = initial_capacity % FRAME_POOL_SHARD_COUNT;
        for (i, shard) in shards.iter().enumerate() {
            let count = per_shard + usize::from(i < remainder);
            let mut guard = shard.lock();
            for _ in 0..count {
                guard.push(vec![0u8; frame_size].into_boxed_slice());
            }
        }

        Self {
            inner: Arc::new(FramePoolInner {
                frame_size,
                shards,
                next_shard: AtomicUsize::new(0),
            }),
        }
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.inner.frame_size
    }

    /// Takes a frame from the pool, allocating a fresh one if the chosen
    /// shard is empty. The frame returns to its shard on drop; contents
    /// are whatever the last user left.
    pub fn acquire(&self) -> PooledFrame {
        let shard_idx =
            self.inner.next_shard.fetch_add(1, Ordering::Relaxed) % FRAME_POOL_SHARD_COUNT;
        let frame = self.inner.shards[shard_idx].lock().pop();
        let frame =
            frame.unwrap_or_else(|| vec![0u8; self.inner.frame_size].into_boxed_slice());

        PooledFrame {
            frame: ManuallyDrop::new(frame),
            pool: Arc::clone(&self.inner),
            shard_idx,
        }
    }

    /// Frames currently parked across all shards.
    pub fn available(&self) -> usize {
        self.inner.shards.iter().map(|s| s.lock().len()).sum()
    }
}

/// A scratch frame that returns to its pool when dropped.
pub struct PooledFrame {
    frame: ManuallyDrop<Box<[u8]>>,
    pool: Arc<FramePoolInner>,
    shard_idx: usize,
}

impl std::fmt::Debug for PooledFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledFrame")
            .field("shard_idx", &self.shard_idx)
            .field("len", &self.frame.len())
            .finish()
    }
}

impl Deref for PooledFrame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl DerefMut for PooledFrame {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.frame
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        // SAFETY: take runs once, in drop; the frame is valid until here.
        let frame = unsafe { ManuallyDrop::take(&mut self.frame) };
        self.pool.shards[self.shard_idx].lock().push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PAGE_SIZE;

    #[test]
    fn acquire_and_return() {
        let pool = FramePool::new(DEFAULT_PAGE_SIZE, 2);
        assert_eq!(pool.available(), 2);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 0);
        assert_eq!(a.len(), DEFAULT_PAGE_SIZE.bytes());

        // Empty pool allocates rather than blocking.
        let c = pool.acquire();
        assert_eq!(c.len(), DEFAULT_PAGE_SIZE.bytes());

        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn frames_are_writable_scratch() {
        let pool = FramePool::new(DEFAULT_PAGE_SIZE, 1);
        let mut frame = pool.acquire();
        frame[0] = 0xab;
        frame[16383] = 0xcd;
        assert_eq!(frame[0], 0xab);
    }

    #[test]
    fn pool_clone_shares_frames() {
        let pool = FramePool::new(DEFAULT_PAGE_SIZE, 2);
        let clone = pool.clone();
        let _frame = pool.acquire();
        assert_eq!(clone.available(), 1);
    }
}
