//! The hardware translation table, as seen by the pager.

use crate::{PhysicalAddress, VirtualAddress, VmError};

/// The per-address-space virtual-to-physical translation structure.
///
/// All addresses passed in are page-aligned. The accessed and dirty bits are set by
/// the CPU on real hardware; the pager only reads and clears them, except when the
/// kernel touches user memory through its own mapping of the frame.
pub trait Mmu: Send {
    /// Installs a translation from `page` to `frame`.
    fn set_mapping(
        &mut self,
        page: VirtualAddress,
        frame: PhysicalAddress,
        writable: bool,
    ) -> Result<(), VmError>;

    /// Removes the translation for `page`, if any.
    fn clear_mapping(&mut self, page: VirtualAddress);

    /// Returns the frame `page` translates to.
    fn translate(&self, page: VirtualAddress) -> Option<PhysicalAddress>;

    /// Returns true if `page` has a present translation.
    fn is_present(&self, page: VirtualAddress) -> bool {
        self.translate(page).is_some()
    }

    /// Returns the dirty bit of `page`'s translation.
    fn is_dirty(&self, page: VirtualAddress) -> bool;

    /// Sets or clears the dirty bit of `page`'s translation.
    fn set_dirty(&mut self, page: VirtualAddress, dirty: bool);

    /// Returns the accessed bit of `page`'s translation.
    fn is_accessed(&self, page: VirtualAddress) -> bool;

    /// Sets or clears the accessed bit of `page`'s translation.
    fn set_accessed(&mut self, page: VirtualAddress, accessed: bool);
}
