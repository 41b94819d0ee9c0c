//! The raw physical page allocator the frame table is layered on.

use core::ptr::NonNull;

use crate::PhysicalAddress;

/// A free-list allocator that hands out page-aligned physical frames.
///
/// The frame table calls [`alloc_page`](Self::alloc_page) first and only falls back to
/// eviction when it returns `None`. Implementations must be safe to call from any
/// thread; the frame table serializes its own calls under the global frame lock but
/// other kernel subsystems may share the allocator.
pub trait PhysicalMemory: Send + Sync {
    /// Allocates one frame, or returns `None` when physical memory is exhausted.
    fn alloc_page(&self) -> Option<PhysicalAddress>;

    /// Returns a frame obtained from [`alloc_page`](Self::alloc_page).
    fn free_page(&self, frame: PhysicalAddress);

    /// Returns a kernel pointer to the first byte of `frame`.
    ///
    /// The pointed-to region is [`PAGE_SIZE`](crate::PAGE_SIZE) bytes long and stays
    /// valid until the frame is freed.
    fn frame_ptr(&self, frame: PhysicalAddress) -> NonNull<u8>;
}
