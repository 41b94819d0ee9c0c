//! Software emulation implementation for testing and development.
//!
//! This module provides a software-emulated architecture that can run on any host.
//! It's designed for testing and development without requiring actual hardware access.
//!
//! Unlike a scale model, the emulation keeps the real x86_64 page geometry (4 KiB pages,
//! 48-bit canonical addresses) because swap slots are sized in disk sectors and the
//! stack-growth window is defined in bytes. Only the entry encoding and physical memory
//! are simulated.

mod entry;
mod flags;
mod memory;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use memory::EmulatedMemory;

/// Maximum number of bits in a physical address for software emulation.
pub const MAX_PHYSICAL_BITS: usize = 32;

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
