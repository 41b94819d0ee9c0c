//! Memory-mapped files.

use alloc::sync::Arc;
use core::fmt;

use crate::address_space::{SpaceState, check_user_range};
use crate::page::{Page, PageKind};
use crate::{AddressSpace, File, LoadAux, PAGE_SIZE, VirtualAddress, VirtualMemory, VmError};

/// Identifies one `mmap` call within its address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingId(u64);

impl MappingId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MappingId({})", self.0)
    }
}

/// A live mapping: a run of consecutive file-backed pages sharing one file handle.
pub(crate) struct Mapping {
    id: MappingId,
    pages: usize,
    /// The mapping's own handle; dropping the last page's clone closes it.
    file: Arc<dyn File>,
}

impl AddressSpace {
    /// Maps `length` bytes of `file`, starting at `offset`, at `address`.
    ///
    /// The region is rounded up to whole pages; bytes past the end of the file read as
    /// zero. Pages are loaded on first access. The mapping holds its own handle, so
    /// the caller may close `file` right away.
    pub fn mmap(
        &self,
        address: VirtualAddress,
        length: usize,
        writable: bool,
        file: &Arc<dyn File>,
        offset: u64,
    ) -> Result<VirtualAddress, VmError> {
        if address.is_null() {
            return Err(VmError::NullAddress);
        }
        if !address.is_page_aligned() || offset % PAGE_SIZE as u64 != 0 {
            return Err(VmError::Misaligned);
        }
        if length == 0 || file.is_empty() {
            return Err(VmError::InvalidLength);
        }
        check_user_range(address, length).map_err(|_| VmError::InvalidLength)?;

        let pages = length.div_ceil(PAGE_SIZE);
        offset
            .checked_add((pages * PAGE_SIZE) as u64)
            .ok_or(VmError::InvalidLength)?;
        let mut state = self.inner.state.lock();
        if state.spt.overlaps(address, pages) {
            return Err(VmError::Overlap);
        }

        let file = file.reopen()?;
        let id = MappingId::new(state.next_mapping);
        state.next_mapping += 1;

        let available = file.len().saturating_sub(offset);
        let mut remaining = (length as u64).min(available) as usize;
        for index in 0..pages {
            let read_bytes = remaining.min(PAGE_SIZE);
            let aux = LoadAux {
                file: Some(file.clone()),
                offset: offset + (index * PAGE_SIZE) as u64,
                read_bytes,
                zero_bytes: PAGE_SIZE - read_bytes,
            };
            state
                .spt
                .insert(Page::mapped(address + index * PAGE_SIZE, writable, aux, id))?;
            remaining -= read_bytes;
        }
        state.mappings.insert(address, Mapping { id, pages, file });

        log::debug!(
            "space {}: mapped {} bytes ({} pages) at {} as {:?}",
            self.id(),
            length,
            pages,
            address,
            id
        );
        Ok(address)
    }

    /// Removes the mapping that starts at `address`, writing dirty pages back first.
    ///
    /// Every page is removed even if a writeback fails; the first failure is returned.
    pub fn munmap(&self, address: VirtualAddress) -> Result<(), VmError> {
        let mut state = self.inner.state.lock();
        unmap_locked(self.vm(), &mut state, address)
    }

    /// Returns the number of live mappings.
    pub fn mapping_count(&self) -> usize {
        self.inner.state.lock().mappings.len()
    }
}

/// Tears down the mapping starting at `start`.
pub(crate) fn unmap_locked(
    vm: &VirtualMemory,
    state: &mut SpaceState,
    start: VirtualAddress,
) -> Result<(), VmError> {
    let mapping = state.mappings.remove(&start).ok_or(VmError::NotMapped)?;
    let mut result = Ok(());

    for index in 0..mapping.pages {
        let address = start + index * PAGE_SIZE;
        let Some(page) = state.spt.get(address) else {
            continue;
        };
        if page.mapping() != Some(mapping.id) {
            continue;
        }
        if let (Some(id), PageKind::FileBacked(file)) = (page.frame(), page.kind())
            && state.mmu.is_dirty(address)
        {
            let frame = vm.frame_address(id);
            let written = vm.with_frame(frame, |bytes| file.write_back(bytes));
            if let Err(err) = written {
                log::warn!("writeback of {address} failed: {err}");
                result = result.and(Err(err));
            }
        }
        if let Some(page) = state.spt.remove(address) {
            vm.destroy_page(state.mmu.as_mut(), page);
        }
    }

    log::debug!("unmapped {:?} at {}", mapping.id, start);
    drop(mapping.file);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedMemory, MemFile, PageDirectory, RamDisk, SECTORS_PER_PAGE};
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    fn vm(frames: usize) -> Arc<VirtualMemory> {
        Arc::new(VirtualMemory::new(
            Box::new(EmulatedMemory::new(frames)),
            Box::new(RamDisk::new(4 * SECTORS_PER_PAGE)),
        ))
    }

    fn space(vm: &Arc<VirtualMemory>) -> AddressSpace {
        AddressSpace::new(vm, Box::new(PageDirectory::new()))
    }

    fn va(page: usize) -> VirtualAddress {
        VirtualAddress::new(0x2000_0000 + page * PAGE_SIZE)
    }

    fn contents(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8 + 1).collect()
    }

    #[test]
    fn maps_whole_pages_and_zeroes_the_tail() {
        let vm = vm(4);
        let space = space(&vm);
        let data = contents(2 * PAGE_SIZE + 100);
        let file: Arc<dyn File> = MemFile::new(&data);

        let mapped = space.mmap(va(0), data.len(), false, &file, 0).unwrap();
        assert_eq!(mapped, va(0));
        assert_eq!(space.page_count(), 3);
        assert_eq!(vm.stats().resident_frames, 0);

        let mut buffer = alloc::vec![0xEEu8; 3 * PAGE_SIZE];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer[..data.len()], &data[..]);
        assert!(buffer[data.len()..].iter().all(|&b| b == 0));
        assert_eq!(
            space.lookup(va(2)).unwrap().page_type,
            crate::PageType::FileBacked
        );
    }

    #[test]
    fn rejects_malformed_requests() {
        let vm = vm(1);
        let space = space(&vm);
        let file: Arc<dyn File> = MemFile::new(b"data");
        let empty: Arc<dyn File> = MemFile::new(b"");

        assert_eq!(
            space.mmap(VirtualAddress::new(0), 4, true, &file, 0),
            Err(VmError::NullAddress)
        );
        assert_eq!(space.mmap(va(0) + 1, 4, true, &file, 0), Err(VmError::Misaligned));
        assert_eq!(space.mmap(va(0), 4, true, &file, 3), Err(VmError::Misaligned));
        assert_eq!(space.mmap(va(0), 0, true, &file, 0), Err(VmError::InvalidLength));
        assert_eq!(space.mmap(va(0), 4, true, &empty, 0), Err(VmError::InvalidLength));
        assert_eq!(
            space.mmap(VirtualAddress::new(crate::KERNEL_BASE - PAGE_SIZE), 2 * PAGE_SIZE, true, &file, 0),
            Err(VmError::InvalidLength)
        );
        assert_eq!(
            space.mmap(va(0), 2 * PAGE_SIZE, true, &file, u64::MAX - 0xFFF),
            Err(VmError::InvalidLength)
        );
        assert_eq!(space.page_count(), 0);
        assert_eq!(space.mapping_count(), 0);
    }

    #[test]
    fn overlapping_mapping_is_rejected() {
        let vm = vm(1);
        let space = space(&vm);
        let file: Arc<dyn File> = MemFile::new(&contents(PAGE_SIZE));
        space.register_anonymous(va(1), true).unwrap();

        assert_eq!(space.mmap(va(0), 2 * PAGE_SIZE, true, &file, 0), Err(VmError::Overlap));
        assert_eq!(space.mapping_count(), 0);
        space.mmap(va(2), PAGE_SIZE, true, &file, 0).unwrap();
    }

    #[test]
    fn offset_selects_file_region() {
        let vm = vm(1);
        let space = space(&vm);
        let data = contents(3 * PAGE_SIZE);
        let file: Arc<dyn File> = MemFile::new(&data);

        space.mmap(va(0), PAGE_SIZE, false, &file, 2 * PAGE_SIZE as u64).unwrap();
        let mut buffer = [0u8; 16];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, &data[2 * PAGE_SIZE..2 * PAGE_SIZE + 16]);
    }

    #[test]
    fn munmap_writes_back_exactly_the_modified_page() {
        let vm = vm(4);
        let space = space(&vm);
        let data = contents(PAGE_SIZE + 50);
        let file = MemFile::new(&data);
        space
            .mmap(va(0), data.len(), true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();

        space.copy_to_user(va(1) + 10, b"hello").unwrap();
        let mut buffer = [0u8; 1];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        space.munmap(va(0)).unwrap();

        let mut expected = data.clone();
        expected[PAGE_SIZE + 10..PAGE_SIZE + 15].copy_from_slice(b"hello");
        assert_eq!(file.contents(), expected);
        assert_eq!(file.writes(), 1);
        assert_eq!(space.page_count(), 0);
        assert_eq!(vm.stats().resident_frames, 0);
    }

    #[test]
    fn munmap_of_untouched_mapping_writes_nothing() {
        let vm = vm(1);
        let space = space(&vm);
        let file = MemFile::new(&contents(100));
        space
            .mmap(va(0), 100, true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();

        space.munmap(va(0)).unwrap();
        assert_eq!(file.writes(), 0);
        assert_eq!(file.reads(), 0);
    }

    #[test]
    fn mapping_keeps_its_own_handle() {
        let vm = vm(1);
        let space = space(&vm);
        let file = MemFile::new(&contents(100));
        let handle: Arc<dyn File> = file.reopen().unwrap();
        space.mmap(va(0), 100, false, &handle, 0).unwrap();
        assert_eq!(file.open_handles(), 3);

        drop(handle);
        let mut buffer = [0u8; 4];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, &contents(4)[..]);

        space.munmap(va(0)).unwrap();
        assert_eq!(file.open_handles(), 1);
    }

    #[test]
    fn munmap_requires_mapping_start() {
        let vm = vm(1);
        let space = space(&vm);
        let file: Arc<dyn File> = MemFile::new(&contents(2 * PAGE_SIZE));
        space.mmap(va(0), 2 * PAGE_SIZE, true, &file, 0).unwrap();

        assert_eq!(space.munmap(va(1)), Err(VmError::NotMapped));
        assert_eq!(space.mapping_count(), 1);
        space.munmap(va(0)).unwrap();
        assert_eq!(space.munmap(va(0)), Err(VmError::NotMapped));
    }

    #[test]
    fn failed_writeback_still_unmaps_every_page() {
        let vm = vm(4);
        let space = space(&vm);
        let file = MemFile::new(&contents(2 * PAGE_SIZE));
        space
            .mmap(va(0), 2 * PAGE_SIZE, true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();
        space.copy_to_user(va(0), b"first").unwrap();
        space.copy_to_user(va(1), b"second").unwrap();

        file.fail_writes(true);
        assert_eq!(space.munmap(va(0)), Err(VmError::Io(crate::IoError::Device)));
        assert_eq!(file.writes(), 2);
        assert_eq!(file.contents(), contents(2 * PAGE_SIZE));
        assert_eq!(space.page_count(), 0);
        assert_eq!(space.mapping_count(), 0);
        assert_eq!(vm.stats().resident_frames, 0);
        assert_eq!(file.open_handles(), 1);
    }

    #[test]
    fn failed_eviction_writeback_keeps_the_page_resident() {
        let vm = vm(1);
        let space = space(&vm);
        let file = MemFile::new(&contents(PAGE_SIZE));
        space
            .mmap(va(0), PAGE_SIZE, true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();
        space.register_anonymous(va(4), true).unwrap();
        space.copy_to_user(va(0), b"dirty").unwrap();

        file.fail_writes(true);
        assert_eq!(space.claim(va(4)), Err(VmError::Io(crate::IoError::Device)));
        assert!(space.lookup(va(0)).unwrap().resident);
        assert!(!space.lookup(va(4)).unwrap().resident);
        assert_eq!(vm.stats().evictions, 0);

        file.fail_writes(false);
        space.claim(va(4)).unwrap();
        assert!(!space.lookup(va(0)).unwrap().resident);
        assert_eq!(&file.contents()[..5], b"dirty");
    }

    #[test]
    fn evicted_dirty_page_is_written_and_reloaded() {
        let vm = vm(1);
        let space = space(&vm);
        let file = MemFile::new(&contents(PAGE_SIZE));
        space
            .mmap(va(0), PAGE_SIZE, true, &(file.clone() as Arc<dyn File>), 0)
            .unwrap();
        space.register_anonymous(va(4), true).unwrap();

        space.copy_to_user(va(0), b"evict").unwrap();
        space.claim(va(4)).unwrap();
        assert!(!space.lookup(va(0)).unwrap().resident);
        assert_eq!(&file.contents()[..5], b"evict");

        let mut buffer = [0u8; 5];
        space.copy_from_user(va(0), &mut buffer).unwrap();
        assert_eq!(&buffer, b"evict");
    }
}
