//! Emulated physical memory for software simulation.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use spin::Mutex;

use super::PAGE_SIZE;
use crate::{PhysicalAddress, PhysicalMemory};

/// Emulated physical memory for software simulation.
///
/// This provides a fixed pool of page frames backed by a host buffer, so the frame
/// table and eviction paths can be exercised without hardware. Frame `n` lives at
/// physical address `n * PAGE_SIZE`.
pub struct EmulatedMemory {
    /// The underlying memory buffer, leaked from a boxed slice so frame pointers can
    /// be handed out without borrowing `self`.
    base: NonNull<u8>,
    /// Number of frames in the buffer.
    frames: usize,
    /// Free frames and the allocation bitmap used to catch double frees.
    state: Mutex<PoolState>,
}

struct PoolState {
    free: Vec<PhysicalAddress>,
    allocated: Vec<bool>,
}

// SAFETY: The buffer is only reached through raw pointers handed out per frame; the
// pool bookkeeping is behind a mutex.
unsafe impl Send for EmulatedMemory {}
// SAFETY: See above.
unsafe impl Sync for EmulatedMemory {}

impl EmulatedMemory {
    /// Creates an emulated memory region holding `frames` page frames.
    pub fn new(frames: usize) -> Self {
        let buffer: Box<[u8]> = vec![0u8; frames * PAGE_SIZE].into_boxed_slice();
        let base = NonNull::new(Box::into_raw(buffer).cast::<u8>()).unwrap_or(NonNull::dangling());

        // Hand out low addresses first so tests see a predictable order.
        let free = (0..frames)
            .rev()
            .map(|index| PhysicalAddress::new(index * PAGE_SIZE))
            .collect();

        Self {
            base,
            frames,
            state: Mutex::new(PoolState {
                free,
                allocated: vec![false; frames],
            }),
        }
    }

    /// Returns the total number of frames in the pool.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Returns the number of frames currently free.
    pub fn free_frames(&self) -> usize {
        self.state.lock().free.len()
    }

    fn index_of(&self, frame: PhysicalAddress) -> usize {
        assert!(frame.is_page_aligned(), "frame address must be page-aligned");
        let index = frame.as_usize() / PAGE_SIZE;
        assert!(index < self.frames, "frame {frame} not within emulated memory");
        index
    }
}

impl PhysicalMemory for EmulatedMemory {
    fn alloc_page(&self) -> Option<PhysicalAddress> {
        let mut state = self.state.lock();
        let frame = state.free.pop()?;
        let index = frame.as_usize() / PAGE_SIZE;
        state.allocated[index] = true;
        Some(frame)
    }

    fn free_page(&self, frame: PhysicalAddress) {
        let index = self.index_of(frame);
        let mut state = self.state.lock();
        assert!(state.allocated[index], "double free of frame {frame}");
        state.allocated[index] = false;
        state.free.push(frame);
    }

    fn frame_ptr(&self, frame: PhysicalAddress) -> NonNull<u8> {
        let index = self.index_of(frame);
        // SAFETY: `index < frames`, so the offset stays inside the leaked buffer.
        unsafe { self.base.add(index * PAGE_SIZE) }
    }
}

impl Drop for EmulatedMemory {
    fn drop(&mut self) {
        let len = self.frames * PAGE_SIZE;
        // SAFETY: `base` and `len` describe the slice leaked in `new`.
        unsafe {
            drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                self.base.as_ptr(),
                len,
            )));
        }
    }
}
