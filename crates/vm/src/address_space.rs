//! Address space management.
//!
//! An [`AddressSpace`] is one process's view of memory: its supplemental page table,
//! its hardware translation table and its memory mappings, all behind one lock.
//! Everything it holds is released when it is dropped.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::frame::{FrameId, FrameOwner};
use crate::mmap::{self, Mapping};
use crate::page::{Page, PageKind};
use crate::{
    File, InitFn, KERNEL_BASE, LoadAux, MappingId, Mmu, PAGE_SIZE, PageType,
    SupplementalPageTable, SwapSlot, VirtualAddress, VirtualMemory, VmError, load_file_slice,
};

/// Identifies an address space for the lifetime of its [`VirtualMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(u64);

impl SpaceId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot of one registered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub address: VirtualAddress,
    /// The page's type, or the type it will take once populated.
    pub page_type: PageType,
    pub writable: bool,
    /// False until the page's initializer has run.
    pub initialized: bool,
    pub resident: bool,
    /// The page was created by stack growth.
    pub stack: bool,
    pub swap_slot: Option<SwapSlot>,
    pub mapping: Option<MappingId>,
}

impl PageInfo {
    fn of(page: &Page) -> Self {
        Self {
            address: page.address(),
            page_type: page.page_type(),
            writable: page.is_writable(),
            initialized: page.is_initialized(),
            resident: page.frame().is_some(),
            stack: page.is_stack(),
            swap_slot: page.swap_slot(),
            mapping: page.mapping(),
        }
    }
}

/// Everything guarded by an address space's lock.
pub(crate) struct SpaceState {
    pub(crate) spt: SupplementalPageTable,
    pub(crate) mmu: Box<dyn Mmu>,
    pub(crate) mappings: BTreeMap<VirtualAddress, Mapping>,
    /// User stack pointer saved on kernel entry, for faults taken in kernel mode.
    pub(crate) user_stack_pointer: Option<VirtualAddress>,
    pub(crate) next_mapping: u64,
}

pub(crate) struct SpaceInner {
    pub(crate) id: SpaceId,
    pub(crate) vm: Arc<VirtualMemory>,
    pub(crate) state: Mutex<SpaceState>,
}

impl Drop for SpaceInner {
    fn drop(&mut self) {
        let vm = self.vm.clone();
        let id = self.id;
        let state = self.state.get_mut();

        let starts: Vec<_> = state.mappings.keys().copied().collect();
        for start in starts {
            if let Err(err) = mmap::unmap_locked(&vm, state, start) {
                log::warn!("space {id}: writeback of mapping at {start} failed: {err}");
            }
        }

        let pages = state.spt.len();
        for address in state.spt.addresses() {
            if let Some(page) = state.spt.remove(address) {
                vm.destroy_page(state.mmu.as_mut(), page);
            }
        }
        log::debug!("space {id}: torn down, released {pages} pages");
    }
}

/// A demand-paged user address space.
pub struct AddressSpace {
    pub(crate) inner: Arc<SpaceInner>,
}

impl AddressSpace {
    /// Creates an empty address space translating through `mmu`.
    pub fn new(vm: &Arc<VirtualMemory>, mmu: Box<dyn Mmu>) -> Self {
        let id = vm.next_space_id();
        log::debug!("space {id}: created");
        Self {
            inner: Arc::new(SpaceInner {
                id,
                vm: vm.clone(),
                state: Mutex::new(SpaceState {
                    spt: SupplementalPageTable::new(),
                    mmu,
                    mappings: BTreeMap::new(),
                    user_stack_pointer: None,
                    next_mapping: 1,
                }),
            }),
        }
    }

    pub fn id(&self) -> SpaceId {
        self.inner.id
    }

    pub(crate) fn vm(&self) -> &Arc<VirtualMemory> {
        &self.inner.vm
    }

    /// Registers a lazily populated page at the page containing `address`.
    ///
    /// No frame is allocated. `init` runs on the first access; `None` selects the
    /// default for `page_type` (zero fill, or reading the slice `aux` describes).
    pub fn register(
        &self,
        address: VirtualAddress,
        writable: bool,
        page_type: PageType,
        init: Option<InitFn>,
        aux: LoadAux,
    ) -> Result<(), VmError> {
        check_user(address)?;
        if page_type == PageType::FileBacked && aux.file.is_none() {
            return Err(VmError::NoBackingFile);
        }
        let page = Page::new(address, writable, page_type, init, aux);
        self.inner.state.lock().spt.insert(page)
    }

    /// Registers a zero-filled anonymous page.
    pub fn register_anonymous(&self, address: VirtualAddress, writable: bool) -> Result<(), VmError> {
        self.register(address, writable, PageType::Anonymous, None, LoadAux::default())
    }

    /// Registers the pages of an executable segment.
    ///
    /// Each page reads its share of `read_bytes` from `file` starting at `offset` and
    /// zeroes the rest; the segment becomes ordinary anonymous memory once loaded.
    /// Nothing is registered if any page of the segment is already taken.
    pub fn load_segment(
        &self,
        file: &Arc<dyn File>,
        offset: u64,
        address: VirtualAddress,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        if !address.is_page_aligned() || offset % PAGE_SIZE as u64 != 0 {
            return Err(VmError::Misaligned);
        }
        let total = read_bytes.checked_add(zero_bytes).ok_or(VmError::InvalidLength)?;
        if total == 0 || total % PAGE_SIZE != 0 {
            return Err(VmError::InvalidLength);
        }
        check_user_range(address, total)?;
        offset
            .checked_add(total as u64)
            .ok_or(VmError::InvalidLength)?;

        let pages = total / PAGE_SIZE;
        let mut state = self.inner.state.lock();
        if state.spt.overlaps(address, pages) {
            return Err(VmError::AlreadyMapped);
        }

        let mut remaining = read_bytes;
        for index in 0..pages {
            let page_read = remaining.min(PAGE_SIZE);
            let aux = LoadAux {
                file: Some(file.clone()),
                offset: offset + (index * PAGE_SIZE) as u64,
                read_bytes: page_read,
                zero_bytes: PAGE_SIZE - page_read,
            };
            let page = Page::new(
                address + index * PAGE_SIZE,
                writable,
                PageType::Anonymous,
                Some(load_file_slice),
                aux,
            );
            state.spt.insert(page)?;
            remaining -= page_read;
        }
        Ok(())
    }

    /// Describes the page containing `address`.
    pub fn lookup(&self, address: VirtualAddress) -> Option<PageInfo> {
        self.inner.state.lock().spt.get(address).map(PageInfo::of)
    }

    /// Returns the number of registered pages.
    pub fn page_count(&self) -> usize {
        self.inner.state.lock().spt.len()
    }

    /// Unregisters the page containing `address` and releases its frame and swap slot.
    ///
    /// File-backed contents are not written back.
    pub fn remove(&self, address: VirtualAddress) -> Result<(), VmError> {
        let mut state = self.inner.state.lock();
        let page = state.spt.remove(address).ok_or(VmError::NotMapped)?;
        self.vm().destroy_page(state.mmu.as_mut(), page);
        Ok(())
    }

    /// Makes the page containing `address` resident without a fault.
    pub fn claim(&self, address: VirtualAddress) -> Result<(), VmError> {
        let mut state = self.inner.state.lock();
        self.claim_locked(&mut state, address).map(|_| ())
    }

    /// Makes the page containing `address` resident and keeps it from being evicted
    /// until [`unpin`](Self::unpin).
    pub fn pin(&self, address: VirtualAddress) -> Result<(), VmError> {
        let mut state = self.inner.state.lock();
        let id = self.claim_locked(&mut state, address)?;
        self.vm().set_pinned(id, true);
        Ok(())
    }

    pub fn unpin(&self, address: VirtualAddress) {
        let state = self.inner.state.lock();
        if let Some(id) = state.spt.get(address).and_then(Page::frame) {
            self.vm().set_pinned(id, false);
        }
    }

    /// Records the user stack pointer saved on entry to the kernel.
    pub fn set_user_stack_pointer(&self, stack_pointer: VirtualAddress) {
        self.inner.state.lock().user_stack_pointer = Some(stack_pointer);
    }

    /// Populates a registered page into a fresh frame and maps it.
    ///
    /// Returns the page's frame, which is reused as-is when already resident.
    pub(crate) fn claim_locked(
        &self,
        state: &mut SpaceState,
        address: VirtualAddress,
    ) -> Result<FrameId, VmError> {
        let address = address.page_base();
        let page = state.spt.get(address).ok_or(VmError::NotMapped)?;
        if let Some(id) = page.frame() {
            return Ok(id);
        }

        let vm = self.vm();
        let id = vm.allocate_frame(&mut [(self.id(), &mut *state)])?;
        let frame = vm.frame_address(id);

        let page = state.spt.get_mut(address).ok_or(VmError::NotMapped)?;
        let populated = vm.with_frame(frame, |bytes| page.populate(bytes, vm.swap()));
        let writable = page.is_writable();
        if let Err(err) = populated.and_then(|()| state.mmu.set_mapping(address, frame, writable)) {
            vm.release_frame(id);
            return Err(err);
        }
        state.mmu.set_dirty(address, false);

        let owner = FrameOwner {
            space: self.id(),
            handle: Arc::downgrade(&self.inner),
            page: address,
        };
        let page = state.spt.get_mut(address).ok_or(VmError::NotMapped)?;
        vm.bind(id, owner, page);
        Ok(id)
    }

    /// Copies user memory starting at `source` into `buffer`, paging it in as needed.
    pub fn copy_from_user(&self, source: VirtualAddress, buffer: &mut [u8]) -> Result<(), VmError> {
        check_user_range(source, buffer.len())?;
        let mut state = self.inner.state.lock();
        let mut done = 0;
        while done < buffer.len() {
            let address = source + done;
            let count = (PAGE_SIZE - address.page_offset()).min(buffer.len() - done);
            let id = self.claim_locked(&mut state, address)?;
            let frame = self.vm().frame_address(id);
            let start = address.page_offset();
            self.vm().with_frame(frame, |bytes| {
                buffer[done..done + count].copy_from_slice(&bytes[start..start + count]);
            });
            state.mmu.set_accessed(address.page_base(), true);
            done += count;
        }
        Ok(())
    }

    /// Copies `buffer` into user memory starting at `destination`, paging it in as
    /// needed and marking the touched pages dirty.
    pub fn copy_to_user(&self, destination: VirtualAddress, buffer: &[u8]) -> Result<(), VmError> {
        check_user_range(destination, buffer.len())?;
        let mut state = self.inner.state.lock();
        let mut done = 0;
        while done < buffer.len() {
            let address = destination + done;
            let count = (PAGE_SIZE - address.page_offset()).min(buffer.len() - done);
            let writable = state
                .spt
                .get(address)
                .map(Page::is_writable)
                .ok_or(VmError::NotMapped)?;
            if !writable {
                return Err(VmError::ReadOnly);
            }
            let id = self.claim_locked(&mut state, address)?;
            let frame = self.vm().frame_address(id);
            let start = address.page_offset();
            self.vm().with_frame(frame, |bytes| {
                bytes[start..start + count].copy_from_slice(&buffer[done..done + count]);
            });
            state.mmu.set_accessed(address.page_base(), true);
            state.mmu.set_dirty(address.page_base(), true);
            done += count;
        }
        Ok(())
    }

    /// Builds a child address space with independent copies of this one's pages.
    ///
    /// Unpopulated pages are copied with their initializer and argument; anonymous
    /// pages are copied eagerly into fresh frames. Memory mappings and other
    /// file-backed pages are not inherited.
    pub fn duplicate(&self, mmu: Box<dyn Mmu>) -> Result<AddressSpace, VmError> {
        let vm = self.vm();
        let child = AddressSpace::new(vm, mmu);
        {
            let mut parent = self.inner.state.lock();
            let mut state = child.inner.state.lock();
            state.user_stack_pointer = parent.user_stack_pointer;

            for address in parent.spt.addresses() {
                let Some(page) = parent.spt.get(address) else {
                    continue;
                };
                if page.page_type() == PageType::FileBacked {
                    continue;
                }
                let (copy, copy_frame) = match page.kind() {
                    PageKind::Uninit(_) => (page.duplicate_uninit(), false),
                    PageKind::Anonymous(_) => (Some(page.duplicate_anonymous()), true),
                    PageKind::FileBacked(_) => (None, false),
                };
                let Some(copy) = copy else {
                    continue;
                };
                state.spt.insert(copy)?;
                if copy_frame {
                    self.copy_anonymous(&mut parent, &child, &mut state, address)?;
                }
            }
            log::debug!(
                "space {}: duplicated into space {} ({} pages)",
                self.id(),
                child.id(),
                state.spt.len()
            );
        }
        Ok(child)
    }

    /// Gives the child's page at `address` a frame holding the parent page's contents.
    fn copy_anonymous(
        &self,
        parent: &mut SpaceState,
        child: &AddressSpace,
        state: &mut SpaceState,
        address: VirtualAddress,
    ) -> Result<(), VmError> {
        let vm = self.vm();
        let id = vm.allocate_frame(&mut [(self.id(), &mut *parent), (child.id(), &mut *state)])?;
        let frame = vm.frame_address(id);

        let source = parent.spt.get(address).ok_or(VmError::NotMapped)?;
        let copied = match (source.frame(), source.swap_slot()) {
            (Some(source_id), _) => {
                let source_frame = vm.frame_address(source_id);
                vm.with_frame(source_frame, |from| {
                    vm.with_frame(frame, |to| to.copy_from_slice(from))
                });
                Ok(())
            }
            (None, Some(slot)) => vm
                .with_frame(frame, |to| vm.swap().read_page(slot, to))
                .map_err(VmError::from),
            (None, None) => {
                vm.with_frame(frame, |to| to.fill(0));
                Ok(())
            }
        };
        let writable = source.is_writable();
        if let Err(err) = copied.and_then(|()| state.mmu.set_mapping(address, frame, writable)) {
            vm.release_frame(id);
            return Err(err);
        }

        let owner = FrameOwner {
            space: child.id(),
            handle: Arc::downgrade(&child.inner),
            page: address,
        };
        let page = state.spt.get_mut(address).ok_or(VmError::NotMapped)?;
        vm.bind(id, owner, page);
        Ok(())
    }

    /// Releases every page, frame, swap slot and mapping of this address space,
    /// writing dirty mapped pages back to their files first.
    pub fn teardown(self) {
        drop(self);
    }
}

/// Rejects addresses a user page can never live at, including the whole null page.
pub(crate) fn check_user(address: VirtualAddress) -> Result<(), VmError> {
    if address.page_base().is_null() {
        return Err(VmError::NullAddress);
    }
    if address.is_kernel() {
        return Err(VmError::KernelAddress);
    }
    Ok(())
}

/// Rejects ranges that touch the null address or reach into kernel space.
pub(crate) fn check_user_range(start: VirtualAddress, length: usize) -> Result<(), VmError> {
    check_user(start)?;
    match start.as_usize().checked_add(length) {
        Some(end) if end <= KERNEL_BASE => Ok(()),
        _ => Err(VmError::KernelAddress),
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedMemory, MemFile, PageDirectory, RamDisk, SECTORS_PER_PAGE};
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn vm(frames: usize, swap_slots: usize) -> Arc<VirtualMemory> {
        Arc::new(VirtualMemory::new(
            Box::new(EmulatedMemory::new(frames)),
            Box::new(RamDisk::new(swap_slots * SECTORS_PER_PAGE)),
        ))
    }

    fn space(vm: &Arc<VirtualMemory>) -> AddressSpace {
        AddressSpace::new(vm, Box::new(PageDirectory::new()))
    }

    fn va(page: usize) -> VirtualAddress {
        VirtualAddress::new(0x1000_0000 + page * PAGE_SIZE)
    }

    static INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_init(frame: &mut [u8], aux: &LoadAux) -> Result<(), VmError> {
        INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        frame.fill(aux.offset as u8);
        Ok(())
    }

    #[test]
    fn register_rejects_bad_addresses() {
        let vm = vm(1, 1);
        let space = space(&vm);
        assert_eq!(
            space.register_anonymous(VirtualAddress::new(0x10), true),
            Err(VmError::NullAddress)
        );
        assert_eq!(
            space.register_anonymous(VirtualAddress::new(KERNEL_BASE), true),
            Err(VmError::KernelAddress)
        );
        assert_eq!(
            space.register(va(0), true, PageType::FileBacked, None, LoadAux::default()),
            Err(VmError::NoBackingFile)
        );
    }

    #[test]
    fn register_twice_is_already_mapped() {
        let vm = vm(1, 1);
        let space = space(&vm);
        space.register_anonymous(va(0) + 5, true).unwrap();
        assert_eq!(space.register_anonymous(va(0), false), Err(VmError::AlreadyMapped));

        let info = space.lookup(va(0) + 100).unwrap();
        assert_eq!(info.address, va(0));
        assert!(info.writable);
        assert!(!info.initialized);
        assert!(!info.resident);
    }

    #[test]
    fn lazy_page_initializes_exactly_once() {
        let vm = vm(2, 1);
        let space = space(&vm);
        let aux = LoadAux {
            offset: 0x5A,
            ..LoadAux::default()
        };
        space
            .register(va(0), true, PageType::Anonymous, Some(counting_init), aux)
            .unwrap();
        assert_eq!(vm.stats().resident_frames, 0);

        let before = INIT_CALLS.load(Ordering::SeqCst);
        space.claim(va(0)).unwrap();
        space.claim(va(0) + 8).unwrap();
        assert_eq!(INIT_CALLS.load(Ordering::SeqCst) - before, 1);

        let mut byte = [0u8];
        space.copy_from_user(va(0) + 9, &mut byte).unwrap();
        assert_eq!(byte[0], 0x5A);
        assert_eq!(vm.stats().resident_frames, 1);
        assert_eq!(space.lookup(va(0)).unwrap().page_type, PageType::Anonymous);
    }

    #[test]
    fn claim_unregistered_page_fails() {
        let vm = vm(1, 1);
        let space = space(&vm);
        assert_eq!(space.claim(va(3)), Err(VmError::NotMapped));
    }

    #[test]
    fn failed_population_releases_frame() {
        let vm = vm(1, 1);
        let space = space(&vm);
        let file = MemFile::new(b"abc");
        file.fail_reads(true);
        space
            .load_segment(&(file.clone() as Arc<dyn File>), 0, va(0), 3, PAGE_SIZE - 3, false)
            .unwrap();

        assert_eq!(space.claim(va(0)), Err(VmError::Io(crate::IoError::Device)));
        assert_eq!(vm.stats().resident_frames, 0);
        assert!(!space.lookup(va(0)).unwrap().initialized);

        file.fail_reads(false);
        space.claim(va(0)).unwrap();
        assert!(space.lookup(va(0)).unwrap().initialized);
    }

    #[test]
    fn load_segment_splits_file_bytes_across_pages() {
        let vm = vm(4, 1);
        let space = space(&vm);
        let contents: Vec<u8> = (0..PAGE_SIZE + 10).map(|i| (i % 251) as u8).collect();
        let file: Arc<dyn File> = MemFile::new(&contents);

        space
            .load_segment(&file, 0, va(0), PAGE_SIZE + 10, PAGE_SIZE - 10, true)
            .unwrap();
        assert_eq!(space.page_count(), 2);

        let mut buffer = vec![0xFFu8; 2 * PAGE_SIZE];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer[..PAGE_SIZE + 10], &contents[..]);
        assert!(buffer[PAGE_SIZE + 10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn load_segment_validates_geometry() {
        let vm = vm(1, 1);
        let space = space(&vm);
        let file: Arc<dyn File> = MemFile::new(b"x");
        assert_eq!(
            space.load_segment(&file, 0, va(0) + 1, 1, PAGE_SIZE - 1, false),
            Err(VmError::Misaligned)
        );
        assert_eq!(
            space.load_segment(&file, 0, va(0), 1, 10, false),
            Err(VmError::InvalidLength)
        );
        assert_eq!(
            space.load_segment(&file, 0, va(0), usize::MAX, 1, false),
            Err(VmError::InvalidLength)
        );
        assert_eq!(
            space.load_segment(&file, u64::MAX - 0xFFF, va(0), 1, PAGE_SIZE - 1, false),
            Err(VmError::InvalidLength)
        );
        assert_eq!(space.page_count(), 0);
        space.register_anonymous(va(1), true).unwrap();
        assert_eq!(
            space.load_segment(&file, 0, va(0), 1, 2 * PAGE_SIZE - 1, false),
            Err(VmError::AlreadyMapped)
        );
        assert_eq!(space.page_count(), 1);
    }

    #[test]
    fn copy_to_read_only_page_fails() {
        let vm = vm(1, 1);
        let space = space(&vm);
        space.register_anonymous(va(0), false).unwrap();
        assert_eq!(space.copy_to_user(va(0), b"x"), Err(VmError::ReadOnly));
    }

    #[test]
    fn copies_span_page_boundaries() {
        let vm = vm(2, 1);
        let space = space(&vm);
        space.register_anonymous(va(0), true).unwrap();
        space.register_anonymous(va(1), true).unwrap();

        space.copy_to_user(va(1) - 3, b"abcdef").unwrap();
        let mut buffer = [0u8; 6];
        space.copy_from_user(va(1) - 3, &mut buffer).unwrap();
        assert_eq!(&buffer, b"abcdef");
    }

    #[test]
    fn remove_frees_frame_and_slot() {
        let vm = vm(1, 2);
        let space = space(&vm);
        space.register_anonymous(va(0), true).unwrap();
        space.register_anonymous(va(1), true).unwrap();
        space.claim(va(0)).unwrap();
        space.claim(va(1)).unwrap();
        assert!(space.lookup(va(0)).unwrap().swap_slot.is_some());

        space.remove(va(0) + 1).unwrap();
        space.remove(va(1)).unwrap();
        assert_eq!(space.remove(va(1)), Err(VmError::NotMapped));

        let stats = vm.stats();
        assert_eq!(stats.resident_frames, 0);
        assert_eq!(stats.swap_used, 0);
    }

    #[test]
    fn duplicate_is_independent() {
        let vm = vm(4, 4);
        let parent = space(&vm);
        parent.register_anonymous(va(0), true).unwrap();
        parent.copy_to_user(va(0), b"parent").unwrap();

        let child = parent.duplicate(Box::new(PageDirectory::new())).unwrap();
        assert_ne!(child.id(), parent.id());
        assert!(child.lookup(va(0)).unwrap().resident);

        child.copy_to_user(va(0), b"CHILD!").unwrap();
        let mut buffer = [0u8; 6];
        parent.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, b"parent");

        parent.copy_to_user(va(0), b"PARENT").unwrap();
        child.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, b"CHILD!");
    }

    #[test]
    fn duplicate_copies_swapped_and_lazy_pages() {
        let vm = vm(2, 8);
        let parent = space(&vm);
        parent.register_anonymous(va(0), true).unwrap();
        parent.register_anonymous(va(1), true).unwrap();
        parent.register_anonymous(va(2), true).unwrap();
        parent.copy_to_user(va(0), b"swapped").unwrap();
        parent.claim(va(1)).unwrap();
        parent.claim(va(2)).unwrap();
        parent.register_anonymous(va(3), false).unwrap();

        let child = parent.duplicate(Box::new(PageDirectory::new())).unwrap();
        assert_eq!(child.page_count(), 4);
        assert!(!child.lookup(va(3)).unwrap().initialized);

        let mut buffer = [0u8; 7];
        child.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, b"swapped");
        parent.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, b"swapped");
    }

    #[test]
    fn duplicate_skips_mappings() {
        let vm = vm(2, 1);
        let parent = space(&vm);
        let file: Arc<dyn File> = MemFile::new(b"mapped");
        parent.mmap(va(0), 6, true, &file, 0).unwrap();
        parent.register_anonymous(va(4), true).unwrap();

        let child = parent.duplicate(Box::new(PageDirectory::new())).unwrap();
        assert!(child.lookup(va(0)).is_none());
        assert!(child.lookup(va(4)).is_some());
    }

    #[test]
    fn teardown_releases_everything() {
        let vm = vm(2, 2);
        let file = MemFile::new(&[0u8; 16]);
        let space = space(&vm);
        space
            .mmap(va(8), 16, true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();
        space.register_anonymous(va(0), true).unwrap();
        space.register_anonymous(va(1), true).unwrap();
        space.copy_to_user(va(8), b"dirty").unwrap();
        space.claim(va(0)).unwrap();
        space.claim(va(1)).unwrap();
        assert_eq!(file.open_handles(), 2);

        space.teardown();

        assert_eq!(&file.contents()[..5], b"dirty");
        let stats = vm.stats();
        assert_eq!(stats.resident_frames, 0);
        assert_eq!(stats.swap_used, 0);
        assert_eq!(file.open_handles(), 1);
    }
}
