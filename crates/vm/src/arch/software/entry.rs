//! Leaf page-table entry for software emulation.

use super::flags::PageFlags;
use crate::PhysicalAddress;

/// One emulated leaf entry: frame address in bits 12-31, flags in bits 0-11.
///
/// Emulated memory stays below 4 GiB, so the upper half is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(usize);

impl PageEntry {
    const ADDRESS_MASK: usize = 0xFFFF_F000;
    const FLAGS_MASK: usize = 0xFFF;

    /// Builds an entry mapping `frame` with `flags`.
    pub fn new(frame: PhysicalAddress, flags: PageFlags) -> Self {
        debug_assert!(frame.is_page_aligned(), "physical address must be page-aligned");
        Self((frame.as_usize() & Self::ADDRESS_MASK) | (flags.as_usize() & Self::FLAGS_MASK))
    }

    /// Returns the mapped frame, or `None` if the entry is not present.
    pub fn address(self) -> Option<PhysicalAddress> {
        self.is_present()
            .then(|| PhysicalAddress::new(self.0 & Self::ADDRESS_MASK))
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from(self.0 & Self::FLAGS_MASK)
    }

    /// Replaces the flag bits, keeping the frame.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = (self.0 & Self::ADDRESS_MASK) | (flags.as_usize() & Self::FLAGS_MASK);
    }

    pub fn is_present(self) -> bool {
        self.flags().is_present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_address_and_flags() {
        let mut flags = PageFlags::empty();
        flags.set_present(true);
        flags.set_writable(true);
        let entry = PageEntry::new(PhysicalAddress::new(0x7000), flags);

        assert_eq!(entry.address(), Some(PhysicalAddress::new(0x7000)));
        assert!(entry.flags().is_writable());
    }

    #[test]
    fn not_present_entry_has_no_address() {
        let entry = PageEntry::new(PhysicalAddress::new(0x7000), PageFlags::empty());
        assert_eq!(entry.address(), None);
    }

    #[test]
    fn set_flags_preserves_address() {
        let mut flags = PageFlags::empty();
        flags.set_present(true);
        let mut entry = PageEntry::new(PhysicalAddress::new(0x3000), flags);

        flags.set_dirty(true);
        entry.set_flags(flags);

        assert_eq!(entry.address(), Some(PhysicalAddress::new(0x3000)));
        assert!(entry.flags().is_dirty());
    }
}
