//! Architecture-independent translation table.
//!
//! This module provides the `PageDirectory` type, a flat table of architecture
//! `PageEntry` values keyed by page address. It implements [`Mmu`] for hosts without
//! a paging unit and for kernels that shadow the hardware tables.

use alloc::collections::BTreeMap;

use crate::{
    Mmu, PhysicalAddress, VirtualAddress, VmError,
    arch::{PageEntry, PageFlags},
};

/// A translation table owned by one address space.
///
/// Entries are only stored for mapped pages; a missing entry reads as not present.
#[derive(Default)]
pub struct PageDirectory {
    entries: BTreeMap<VirtualAddress, PageEntry>,
}

impl PageDirectory {
    /// Creates an empty page directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of present translations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no translation is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the raw entry for `page`.
    pub fn entry(&self, page: VirtualAddress) -> Option<PageEntry> {
        self.entries.get(&page).copied()
    }

    fn update(&mut self, page: VirtualAddress, f: impl FnOnce(&mut PageFlags)) {
        if let Some(entry) = self.entries.get_mut(&page) {
            let mut flags = entry.flags();
            f(&mut flags);
            entry.set_flags(flags);
        }
    }

    fn flags(&self, page: VirtualAddress) -> PageFlags {
        self.entries
            .get(&page)
            .map(|entry| entry.flags())
            .unwrap_or_default()
    }
}

impl Mmu for PageDirectory {
    /// # Panics
    /// Panics if either address is not page-aligned.
    fn set_mapping(
        &mut self,
        page: VirtualAddress,
        frame: PhysicalAddress,
        writable: bool,
    ) -> Result<(), VmError> {
        assert!(page.is_page_aligned(), "virtual address must be page-aligned");
        assert!(frame.is_page_aligned(), "physical address must be page-aligned");

        let mut flags = PageFlags::empty();
        flags.set_present(true);
        flags.set_user(true);
        flags.set_writable(writable);
        self.entries.insert(page, PageEntry::new(frame, flags));
        Ok(())
    }

    fn clear_mapping(&mut self, page: VirtualAddress) {
        self.entries.remove(&page);
    }

    fn translate(&self, page: VirtualAddress) -> Option<PhysicalAddress> {
        self.entries.get(&page).and_then(|entry| entry.address())
    }

    fn is_dirty(&self, page: VirtualAddress) -> bool {
        self.flags(page).is_dirty()
    }

    fn set_dirty(&mut self, page: VirtualAddress, dirty: bool) {
        self.update(page, |flags| flags.set_dirty(dirty));
    }

    fn is_accessed(&self, page: VirtualAddress) -> bool {
        self.flags(page).is_accessed()
    }

    fn set_accessed(&mut self, page: VirtualAddress, accessed: bool) {
        self.update(page, |flags| flags.set_accessed(accessed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAGE_SIZE;

    fn page(n: usize) -> VirtualAddress {
        VirtualAddress::new(0x1000_0000 + n * PAGE_SIZE)
    }

    #[test]
    fn map_single_page() {
        let mut dir = PageDirectory::new();
        let phys = PhysicalAddress::new(0x2000);

        dir.set_mapping(page(0), phys, true).unwrap();

        assert_eq!(dir.translate(page(0)), Some(phys));
        assert!(dir.is_present(page(0)));
        assert!(dir.entry(page(0)).unwrap().flags().is_writable());
        assert!(dir.entry(page(0)).unwrap().flags().is_user());
    }

    #[test]
    fn clear_mapped_page() {
        let mut dir = PageDirectory::new();
        dir.set_mapping(page(0), PhysicalAddress::new(0x2000), false)
            .unwrap();
        dir.clear_mapping(page(0));

        assert_eq!(dir.translate(page(0)), None);
        assert!(dir.is_empty());
    }

    #[test]
    fn clear_unmapped_page_is_noop() {
        let mut dir = PageDirectory::new();
        dir.clear_mapping(page(3));
        assert_eq!(dir.len(), 0);
    }

    #[test]
    fn accessed_and_dirty_bits() {
        let mut dir = PageDirectory::new();
        dir.set_mapping(page(1), PhysicalAddress::new(0x4000), true)
            .unwrap();
        assert!(!dir.is_dirty(page(1)));
        assert!(!dir.is_accessed(page(1)));

        dir.set_accessed(page(1), true);
        dir.set_dirty(page(1), true);
        assert!(dir.is_accessed(page(1)));
        assert!(dir.is_dirty(page(1)));
        assert_eq!(dir.translate(page(1)), Some(PhysicalAddress::new(0x4000)));

        dir.set_dirty(page(1), false);
        assert!(!dir.is_dirty(page(1)));
    }

    #[test]
    fn bits_of_unmapped_pages_read_clear() {
        let mut dir = PageDirectory::new();
        dir.set_dirty(page(2), true);
        assert!(!dir.is_dirty(page(2)));
        assert!(!dir.is_present(page(2)));
    }

    #[test]
    #[should_panic(expected = "virtual address must be page-aligned")]
    fn map_rejects_unaligned_page() {
        let mut dir = PageDirectory::new();
        let _ = dir.set_mapping(page(0) + 1, PhysicalAddress::new(0x2000), true);
    }
}
