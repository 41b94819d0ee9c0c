//! The process-wide half of the virtual memory subsystem.
//!
//! [`VirtualMemory`] owns the raw frame allocator, the frame table and the swap table.
//! Address spaces hold an `Arc` to it and call back into it whenever a page needs a
//! frame or gives one up.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::slice;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::address_space::{SpaceId, SpaceInner, SpaceState};
use crate::frame::{FrameFlag, FrameId, FrameOwner, FrameTable};
use crate::page::Page;
use crate::swap::SwapTable;
use crate::{BlockDevice, Mmu, PAGE_SIZE, PhysicalAddress, PhysicalMemory, VmError};

/// A snapshot of subsystem counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmStats {
    /// Frames currently tracked by the frame table.
    pub resident_frames: usize,
    /// Frames reclaimed by eviction since start-up.
    pub evictions: usize,
    /// Swap slots holding evicted pages.
    pub swap_used: usize,
    /// Total swap slots.
    pub swap_capacity: usize,
}

/// Frame and swap management shared by every address space.
///
/// Lock order is: the caller's address spaces, then the frame table, then, by
/// `try_lock` only, any other address space.
pub struct VirtualMemory {
    memory: Box<dyn PhysicalMemory>,
    frames: Mutex<FrameTable>,
    swap: SwapTable,
    next_space: AtomicU64,
    evictions: AtomicUsize,
}

impl VirtualMemory {
    /// Creates the subsystem on top of a raw frame allocator and a swap device.
    pub fn new(memory: Box<dyn PhysicalMemory>, swap_device: Box<dyn BlockDevice>) -> Self {
        Self {
            memory,
            frames: Mutex::new(FrameTable::new()),
            swap: SwapTable::new(swap_device),
            next_space: AtomicU64::new(1),
            evictions: AtomicUsize::new(0),
        }
    }

    pub fn swap(&self) -> &SwapTable {
        &self.swap
    }

    pub fn stats(&self) -> VmStats {
        VmStats {
            resident_frames: self.frames.lock().len(),
            evictions: self.evictions.load(Ordering::Acquire),
            swap_used: self.swap.used(),
            swap_capacity: self.swap.capacity(),
        }
    }

    pub(crate) fn next_space_id(&self) -> SpaceId {
        SpaceId::new(self.next_space.fetch_add(1, Ordering::Relaxed))
    }

    /// Runs `f` over the bytes of `frame`.
    ///
    /// Callers hold either the owning address space's lock or an unbound frame, so
    /// nobody else touches the bytes meanwhile.
    pub(crate) fn with_frame<R>(&self, frame: PhysicalAddress, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let ptr = self.memory.frame_ptr(frame);
        // SAFETY: `frame_ptr` points at PAGE_SIZE bytes that stay valid until the frame
        // is freed, and the caller has exclusive use of the frame (see above).
        let bytes = unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), PAGE_SIZE) };
        f(bytes)
    }

    /// Returns the physical address of a tracked frame.
    pub(crate) fn frame_address(&self, id: FrameId) -> PhysicalAddress {
        self.frames.lock().get(id).address()
    }

    /// Obtains an unbound frame, evicting a resident page if physical memory is full.
    ///
    /// `locked` lists the address spaces the caller already holds locked; their pages
    /// are eligible victims too.
    pub(crate) fn allocate_frame(
        &self,
        locked: &mut [(SpaceId, &mut SpaceState)],
    ) -> Result<FrameId, VmError> {
        // Address spaces upgraded during the scan; dropped only after the frame lock
        // is released since the last reference tears the space down.
        let mut upgraded = Vec::new();
        let result = {
            let mut frames = self.frames.lock();
            match self.memory.alloc_page() {
                Some(address) => Ok(frames.insert(address)),
                None => self.evict(&mut frames, locked, &mut upgraded),
            }
        };
        drop(upgraded);
        result
    }

    /// Clock scan: a frame whose accessed bit is set gets a second chance, the first one
    /// found clear is reclaimed. Two full sweeps clear every accessed bit, so the scan
    /// is bounded.
    fn evict(
        &self,
        frames: &mut FrameTable,
        locked: &mut [(SpaceId, &mut SpaceState)],
        upgraded: &mut Vec<Arc<SpaceInner>>,
    ) -> Result<FrameId, VmError> {
        let budget = 2 * frames.len() + 1;
        let mut swap_full = false;

        for _ in 0..budget {
            let Some(id) = frames.advance() else {
                break;
            };
            let frame = frames.get(id);
            if frame.flags.atomic_test(FrameFlag::Pinned) {
                continue;
            }
            let Some(owner) = frame.owner().cloned() else {
                continue;
            };

            let held = locked.iter_mut().find(|(space, _)| *space == owner.space);
            let outcome = if let Some((_, state)) = held {
                self.try_evict(frames, id, &owner, state)
            } else {
                let Some(inner) = owner.handle.upgrade() else {
                    continue;
                };
                let outcome = match inner.state.try_lock() {
                    Some(mut other) => self.try_evict(frames, id, &owner, &mut other),
                    None => Ok(false),
                };
                upgraded.push(inner);
                outcome
            };

            match outcome {
                Ok(true) => {
                    self.evictions.fetch_add(1, Ordering::AcqRel);
                    #[cfg(feature = "detailed-logging")]
                    log::trace!("evicted {} of space {} from {:?}", owner.page, owner.space, id);
                    return Ok(id);
                }
                Ok(false) => {}
                Err(VmError::SwapExhausted) => swap_full = true,
                Err(err) => return Err(err),
            }
        }

        log::debug!(
            "eviction found no victim among {} frames (swap full: {})",
            frames.len(),
            swap_full
        );
        Err(if swap_full {
            VmError::SwapExhausted
        } else {
            VmError::OutOfMemory
        })
    }

    /// Evicts `id` unless its page was accessed since the last sweep.
    fn try_evict(
        &self,
        frames: &mut FrameTable,
        id: FrameId,
        owner: &FrameOwner,
        state: &mut SpaceState,
    ) -> Result<bool, VmError> {
        let address = owner.page;
        if state.mmu.is_accessed(address) {
            state.mmu.set_accessed(address, false);
            return Ok(false);
        }

        let dirty = state.mmu.is_dirty(address);
        let page = state
            .spt
            .get_mut(address)
            .unwrap_or_else(|| panic!("{id:?} bound to unregistered page {address}"));
        let frame = frames.get(id).address();
        self.with_frame(frame, |bytes| page.evict(bytes, dirty, &self.swap))?;

        state.mmu.clear_mapping(address);
        frames.unbind(id, page);
        Ok(true)
    }

    /// Links a populated frame and its page.
    pub(crate) fn bind(&self, id: FrameId, owner: FrameOwner, page: &mut Page) {
        self.frames.lock().bind(id, owner, page);
    }

    /// Returns an unbound frame to the raw allocator.
    pub(crate) fn release_frame(&self, id: FrameId) {
        let address = self.frames.lock().remove(id);
        self.memory.free_page(address);
    }

    pub(crate) fn set_pinned(&self, id: FrameId, pinned: bool) {
        let frames = self.frames.lock();
        let flags = &frames.get(id).flags;
        if pinned {
            flags.atomic_set(FrameFlag::Pinned);
        } else {
            flags.atomic_clear(FrameFlag::Pinned);
        }
    }

    /// Frees everything a removed page holds: its frame, translation and swap slot.
    ///
    /// File-backed contents are discarded; callers that need writeback do it first.
    pub(crate) fn destroy_page(&self, mmu: &mut dyn Mmu, mut page: Page) {
        if let Some(id) = page.frame() {
            mmu.clear_mapping(page.address());
            let address = {
                let mut frames = self.frames.lock();
                frames.unbind(id, &mut page);
                frames.remove(id)
            };
            self.memory.free_page(address);
        }
        page.release_backing(&self.swap);
    }
}

#[cfg(not(any(test, feature = "software-emulation")))]
static VIRTUAL_MEMORY: spin::Once<Arc<VirtualMemory>> = spin::Once::new();

#[cfg(any(test, feature = "software-emulation"))]
std::thread_local! {
    static VIRTUAL_MEMORY: spin::Once<Arc<VirtualMemory>> = const { spin::Once::new() };
}

/// Initializes the global subsystem.
///
/// This function must be called exactly once during kernel start-up.
///
/// # Panics
///
/// Panics if the subsystem is already initialized.
pub fn init_subsystem(
    memory: Box<dyn PhysicalMemory>,
    swap_device: Box<dyn BlockDevice>,
) -> Arc<VirtualMemory> {
    let install = |cell: &spin::Once<Arc<VirtualMemory>>| {
        if cell.get().is_some() {
            panic!("virtual memory subsystem already initialized");
        }
        let vm = cell.call_once(|| Arc::new(VirtualMemory::new(memory, swap_device)));
        log::debug!("virtual memory subsystem initialized");
        vm.clone()
    };

    #[cfg(not(any(test, feature = "software-emulation")))]
    {
        install(&VIRTUAL_MEMORY)
    }

    #[cfg(any(test, feature = "software-emulation"))]
    {
        VIRTUAL_MEMORY.with(install)
    }
}

/// Returns the global subsystem.
///
/// # Panics
///
/// Panics if [`init_subsystem`] has not been called yet.
pub fn current() -> Arc<VirtualMemory> {
    let get = |cell: &spin::Once<Arc<VirtualMemory>>| {
        cell.get()
            .cloned()
            .expect("virtual memory not initialized; call init_subsystem during start-up")
    };

    #[cfg(not(any(test, feature = "software-emulation")))]
    {
        get(&VIRTUAL_MEMORY)
    }

    #[cfg(any(test, feature = "software-emulation"))]
    {
        VIRTUAL_MEMORY.with(get)
    }
}
