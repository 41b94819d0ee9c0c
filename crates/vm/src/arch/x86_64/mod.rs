//! x86_64 page-table entry encoding.
//!
//! The pager only needs leaf entries: a frame address plus the present, writable,
//! user, accessed and dirty bits. Bits are named through the `x86_64` crate.

mod entry;
mod flags;

pub use entry::PageEntry;
pub use flags::PageFlags;

/// Physical address width assumed for frames handed out by the raw allocator.
pub const MAX_PHYSICAL_BITS: usize = 48;

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Returns true if `addr` fits in [`MAX_PHYSICAL_BITS`].
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr >> MAX_PHYSICAL_BITS == 0
}

/// Returns true if `addr` is canonical: bits 48-63 replicate bit 47.
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    (((addr << 16) as isize) >> 16) as usize == addr
}
