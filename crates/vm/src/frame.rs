//! The frame table.
//!
//! Every physical frame holding user data has a slot in a global arena. A [`Page`]
//! refers to its frame by [`FrameId`]; the frame refers back to the page by its owning
//! address space and page address. The two halves of the link are only ever changed
//! together, through [`FrameTable::bind`] and [`FrameTable::unbind`].

use alloc::sync::Weak;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::address_space::{SpaceId, SpaceInner};
use crate::page::Page;
use crate::{PhysicalAddress, VirtualAddress};

/// Handle of a frame in the frame table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// Returns the arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlag {
    /// Frame backs a buffer a system call is using; never evict it.
    Pinned = 1 << 0,
}

/// Atomic flags for a physical memory frame.
#[derive(Default)]
pub struct FrameFlags(AtomicU64);

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with all flags cleared.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the given flag atomically.
    pub fn atomic_set(&self, flag: FrameFlag) {
        let mask = flag as u64;
        self.0.fetch_or(mask, Ordering::AcqRel);
    }

    /// Clears the given flag atomically.
    pub fn atomic_clear(&self, flag: FrameFlag) {
        let mask = !(flag as u64);
        self.0.fetch_and(mask, Ordering::AcqRel);
    }

    /// Tests if the given flag is set, atomically.
    pub fn atomic_test(&self, flag: FrameFlag) -> bool {
        let mask = flag as u64;
        let value = self.0.load(Ordering::Acquire);
        (value & mask) != 0
    }
}

/// The page a frame currently backs.
#[derive(Clone)]
pub(crate) struct FrameOwner {
    pub(crate) space: SpaceId,
    pub(crate) handle: Weak<SpaceInner>,
    pub(crate) page: VirtualAddress,
}

/// Holds metadata for a physical frame backing user memory.
pub(crate) struct Frame {
    address: PhysicalAddress,
    owner: Option<FrameOwner>,
    /// Flags identifying the state of this frame.
    pub(crate) flags: FrameFlags,
}

impl Frame {
    pub(crate) fn address(&self) -> PhysicalAddress {
        self.address
    }

    pub(crate) fn owner(&self) -> Option<&FrameOwner> {
        self.owner.as_ref()
    }
}

/// Arena of frames plus the clock hand used for victim selection.
#[derive(Default)]
pub(crate) struct FrameTable {
    slots: Vec<Option<Frame>>,
    vacant: Vec<usize>,
    hand: usize,
    live: usize,
}

impl FrameTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of frames in the table, bound or not.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Tracks a frame fresh from the raw allocator. It starts unbound.
    pub(crate) fn insert(&mut self, address: PhysicalAddress) -> FrameId {
        let frame = Frame {
            address,
            owner: None,
            flags: FrameFlags::new(),
        };
        self.live += 1;
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(frame);
                FrameId(index)
            }
            None => {
                self.slots.push(Some(frame));
                FrameId(self.slots.len() - 1)
            }
        }
    }

    /// Stops tracking an unbound frame and returns its address for the raw allocator.
    ///
    /// # Panics
    /// Panics if the frame is unknown (a double free) or still bound.
    pub(crate) fn remove(&mut self, id: FrameId) -> PhysicalAddress {
        let frame = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("double free of {id:?}"));
        assert!(frame.owner.is_none(), "freeing {id:?} while still bound");
        self.vacant.push(id.0);
        self.live -= 1;
        frame.address
    }

    /// # Panics
    /// Panics if the frame is not in the table.
    pub(crate) fn get(&self, id: FrameId) -> &Frame {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("{id:?} is not in the frame table"))
    }

    /// Links `id` and `page` in both directions.
    ///
    /// # Panics
    /// Panics if either side is already linked.
    pub(crate) fn bind(&mut self, id: FrameId, owner: FrameOwner, page: &mut Page) {
        assert_eq!(page.address(), owner.page, "owner does not name this page");
        assert!(
            page.frame().is_none(),
            "page {} already resident in {:?}",
            page.address(),
            page.frame()
        );
        let frame = self.frame_mut(id);
        assert!(frame.owner.is_none(), "{id:?} is already bound");
        frame.owner = Some(owner);
        page.set_frame(Some(id));
    }

    /// Breaks the link between `id` and `page`.
    ///
    /// # Panics
    /// Panics if the two are not linked to each other.
    pub(crate) fn unbind(&mut self, id: FrameId, page: &mut Page) {
        assert_eq!(
            page.frame(),
            Some(id),
            "page {} is not resident in {id:?}",
            page.address()
        );
        let frame = self.frame_mut(id);
        let owner = frame
            .owner
            .take()
            .unwrap_or_else(|| panic!("{id:?} is not bound"));
        assert_eq!(owner.page, page.address(), "{id:?} backs a different page");
        frame.flags.atomic_clear(FrameFlag::Pinned);
        page.set_frame(None);
    }

    /// Advances the clock hand and returns the frame it passed over.
    pub(crate) fn advance(&mut self) -> Option<FrameId> {
        if self.live == 0 {
            return None;
        }
        loop {
            let index = self.hand % self.slots.len();
            self.hand = index + 1;
            if self.slots[index].is_some() {
                return Some(FrameId(index));
            }
        }
    }

    fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("{id:?} is not in the frame table"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{LoadAux, PageType};

    fn owner(page: VirtualAddress) -> FrameOwner {
        FrameOwner {
            space: SpaceId::new(1),
            handle: Weak::new(),
            page,
        }
    }

    fn page(address: usize) -> Page {
        Page::new(
            VirtualAddress::new(address),
            true,
            PageType::Anonymous,
            None,
            LoadAux::default(),
        )
    }

    #[test]
    fn flags_set_and_clear() {
        let flags = FrameFlags::new();
        flags.atomic_set(FrameFlag::Pinned);
        assert!(flags.atomic_test(FrameFlag::Pinned));
        flags.atomic_clear(FrameFlag::Pinned);
        assert!(!flags.atomic_test(FrameFlag::Pinned));
    }

    #[test]
    fn reuses_vacant_slots() {
        let mut table = FrameTable::new();
        let a = table.insert(PhysicalAddress::new(0x1000));
        let b = table.insert(PhysicalAddress::new(0x2000));
        assert_eq!(table.remove(a), PhysicalAddress::new(0x1000));

        let c = table.insert(PhysicalAddress::new(0x3000));
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn bind_links_both_sides() {
        let mut table = FrameTable::new();
        let id = table.insert(PhysicalAddress::new(0x1000));
        let mut page = page(0x40_0000);

        table.bind(id, owner(page.address()), &mut page);
        assert_eq!(page.frame(), Some(id));
        assert_eq!(table.get(id).owner().unwrap().page, page.address());

        table.unbind(id, &mut page);
        assert_eq!(page.frame(), None);
        assert!(table.get(id).owner().is_none());
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn binding_a_bound_frame_panics() {
        let mut table = FrameTable::new();
        let id = table.insert(PhysicalAddress::new(0x1000));
        let mut first = page(0x40_0000);
        let mut second = page(0x40_1000);

        table.bind(id, owner(first.address()), &mut first);
        table.bind(id, owner(second.address()), &mut second);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_remove_panics() {
        let mut table = FrameTable::new();
        let id = table.insert(PhysicalAddress::new(0x1000));
        table.remove(id);
        table.remove(id);
    }

    #[test]
    fn clock_hand_wraps_and_skips_vacant_slots() {
        let mut table = FrameTable::new();
        let a = table.insert(PhysicalAddress::new(0x1000));
        let b = table.insert(PhysicalAddress::new(0x2000));
        let c = table.insert(PhysicalAddress::new(0x3000));
        table.remove(b);

        assert_eq!(table.advance(), Some(a));
        assert_eq!(table.advance(), Some(c));
        assert_eq!(table.advance(), Some(a));
    }

    #[test]
    fn empty_table_has_no_candidates() {
        let mut table = FrameTable::new();
        assert_eq!(table.advance(), None);
        assert_eq!(table.len(), 0);
    }
}
