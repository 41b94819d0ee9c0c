//! Swap space management.
//!
//! The swap device is carved into page-sized slots of [`SECTORS_PER_PAGE`] consecutive
//! sectors. A bitmap records which slots hold live evicted data: a bit is set exactly
//! while its slot belongs to some anonymous page.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::{BlockDevice, IoError, PAGE_SIZE, SECTOR_SIZE, SECTORS_PER_PAGE, VmError};

/// Index of a page-sized slot on the swap device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// Returns the slot index.
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the first device sector of this slot.
    const fn first_sector(self) -> u64 {
        (self.0 * SECTORS_PER_PAGE) as u64
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

/// One bit per slot, 64 slots per word.
struct SlotBitmap {
    words: Vec<u64>,
    slots: usize,
    used: usize,
}

impl SlotBitmap {
    fn new(slots: usize) -> Self {
        Self {
            words: vec![0; slots.div_ceil(64)],
            slots,
            used: 0,
        }
    }

    /// Claims the lowest clear bit.
    fn allocate(&mut self) -> Option<usize> {
        for (index, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros() as usize;
            let slot = index * 64 + bit;
            if slot >= self.slots {
                return None;
            }
            *word |= 1 << bit;
            self.used += 1;
            return Some(slot);
        }
        None
    }

    fn test(&self, slot: usize) -> bool {
        slot < self.slots && self.words[slot / 64] & (1 << (slot % 64)) != 0
    }

    /// Clears a set bit, returning false if it was already clear.
    fn clear(&mut self, slot: usize) -> bool {
        if !self.test(slot) {
            return false;
        }
        self.words[slot / 64] &= !(1 << (slot % 64));
        self.used -= 1;
        true
    }
}

/// The process-wide swap table.
///
/// Bit operations happen under the table's lock; device transfers do not, so a slot is
/// claimed before its sectors are written and released only after they are read back.
pub struct SwapTable {
    device: Box<dyn BlockDevice>,
    bitmap: Mutex<SlotBitmap>,
}

impl SwapTable {
    /// Creates a swap table covering every whole slot on `device`.
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        let slots = (device.sector_count() / SECTORS_PER_PAGE as u64) as usize;
        log::debug!(
            "swap: {} slots ({} KiB) on {} sectors",
            slots,
            slots * PAGE_SIZE / 1024,
            device.sector_count()
        );

        Self {
            device,
            bitmap: Mutex::new(SlotBitmap::new(slots)),
        }
    }

    /// Returns the number of slots on the device.
    pub fn capacity(&self) -> usize {
        self.bitmap.lock().slots
    }

    /// Returns the number of slots holding evicted pages.
    pub fn used(&self) -> usize {
        self.bitmap.lock().used
    }

    /// Returns true if `slot` currently holds evicted data.
    pub fn is_used(&self, slot: SwapSlot) -> bool {
        self.bitmap.lock().test(slot.0)
    }

    /// Claims the first free slot.
    pub fn allocate(&self) -> Result<SwapSlot, VmError> {
        self.bitmap
            .lock()
            .allocate()
            .map(SwapSlot)
            .ok_or(VmError::SwapExhausted)
    }

    /// Releases `slot`.
    ///
    /// # Panics
    /// Panics if the slot is not in use.
    pub fn free(&self, slot: SwapSlot) {
        assert!(self.bitmap.lock().clear(slot.0), "double free of {slot:?}");
    }

    /// Writes one page to `slot`.
    pub fn write_page(&self, slot: SwapSlot, page: &[u8]) -> Result<(), IoError> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let mut buffer = [0u8; SECTOR_SIZE];
        for (index, chunk) in page.chunks_exact(SECTOR_SIZE).enumerate() {
            buffer.copy_from_slice(chunk);
            self.device
                .write_sector(slot.first_sector() + index as u64, &buffer)?;
        }
        Ok(())
    }

    /// Reads one page from `slot` without releasing it.
    pub fn read_page(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), IoError> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let mut buffer = [0u8; SECTOR_SIZE];
        for (index, chunk) in page.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            self.device
                .read_sector(slot.first_sector() + index as u64, &mut buffer)?;
            chunk.copy_from_slice(&buffer);
        }
        Ok(())
    }

    /// Moves a page out to a fresh slot.
    ///
    /// The slot is released again if the device write fails.
    pub fn swap_out(&self, page: &[u8]) -> Result<SwapSlot, VmError> {
        let slot = self.allocate()?;
        if let Err(err) = self.write_page(slot, page) {
            self.free(slot);
            return Err(err.into());
        }
        Ok(slot)
    }

    /// Reads a page back from `slot` and releases the slot.
    ///
    /// On a read failure the slot stays allocated so the caller can keep it recorded.
    pub fn swap_in(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), VmError> {
        self.read_page(slot, page)?;
        self.free(slot);
        Ok(())
    }
}
