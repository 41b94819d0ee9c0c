//! The supplemental page table.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::page::Page;
use crate::{PAGE_SIZE, VirtualAddress, VmError};

/// Per-address-space record of every registered page, resident or not.
///
/// Keys are always page-aligned. Every method accepts any address inside a page and
/// rounds it down first, so a misaligned address behaves exactly like the start of its
/// page.
#[derive(Default)]
pub struct SupplementalPageTable {
    pages: BTreeMap<VirtualAddress, Page>,
}

impl SupplementalPageTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if no page is registered.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Returns true if a page is registered at the page containing `address`.
    pub fn contains(&self, address: VirtualAddress) -> bool {
        self.pages.contains_key(&address.page_base())
    }

    /// Adds `page`, keyed by its own address.
    pub(crate) fn insert(&mut self, page: Page) -> Result<(), VmError> {
        let key = page.address();
        debug_assert!(key.is_page_aligned());
        if self.pages.contains_key(&key) {
            return Err(VmError::AlreadyMapped);
        }
        self.pages.insert(key, page);
        Ok(())
    }

    pub(crate) fn get(&self, address: VirtualAddress) -> Option<&Page> {
        self.pages.get(&address.page_base())
    }

    pub(crate) fn get_mut(&mut self, address: VirtualAddress) -> Option<&mut Page> {
        self.pages.get_mut(&address.page_base())
    }

    /// Detaches the page containing `address`. The caller releases its resources.
    pub(crate) fn remove(&mut self, address: VirtualAddress) -> Option<Page> {
        self.pages.remove(&address.page_base())
    }

    /// Returns true if any page lies in `[start, start + pages * PAGE_SIZE)`.
    pub(crate) fn overlaps(&self, start: VirtualAddress, pages: usize) -> bool {
        let start = start.page_base();
        let end = start.as_usize() + pages * PAGE_SIZE;
        self.pages
            .range(start..)
            .next()
            .is_some_and(|(key, _)| key.as_usize() < end)
    }

    /// Returns the registered page addresses in ascending order.
    pub(crate) fn addresses(&self) -> Vec<VirtualAddress> {
        self.pages.keys().copied().collect()
    }
}
