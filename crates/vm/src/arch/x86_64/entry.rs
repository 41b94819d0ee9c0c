//! Leaf page-table entry for x86_64.

use x86_64::PhysAddr;

use super::flags::PageFlags;
use crate::PhysicalAddress;

/// One 64-bit leaf entry: frame address in bits 12-51, flags in the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(u64);

impl PageEntry {
    const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

    /// Builds an entry mapping `frame` with `flags`.
    pub fn new(frame: PhysicalAddress, flags: PageFlags) -> Self {
        let frame = PhysAddr::new(frame.as_usize() as u64);
        debug_assert!(frame.as_u64() & 0xFFF == 0, "physical address must be page-aligned");
        Self(frame.as_u64() | (flags.as_usize() as u64 & !Self::ADDRESS_MASK))
    }

    /// Returns the mapped frame, or `None` if the entry is not present.
    pub fn address(self) -> Option<PhysicalAddress> {
        self.is_present()
            .then(|| PhysicalAddress::new((self.0 & Self::ADDRESS_MASK) as usize))
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from((self.0 & !Self::ADDRESS_MASK) as usize)
    }

    /// Replaces the flag bits, keeping the frame.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = (self.0 & Self::ADDRESS_MASK) | (flags.as_usize() as u64 & !Self::ADDRESS_MASK);
    }

    pub fn is_present(self) -> bool {
        self.flags().is_present()
    }
}
