#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Polaris Virtual Memory (VM)
//!
//! The virtual memory crate gives every user process a demand-paged address space.
//! It provides:
//!
//! - A supplemental page table per address space recording what *should* live at each
//!   virtual page, independent of whether a physical frame currently backs it.
//! - A global frame table with clock (second-chance) eviction.
//! - A swap table that parks evicted anonymous pages on a block device.
//! - The page-fault resolver: stack growth, lazy population, swap-in.
//! - Memory-mapped files with dirty-page writeback on `munmap`.
//! - Address-space duplication for `fork`.
//! - Software emulation of every hardware collaborator for testing in non-kernel
//!   environments.

extern crate alloc;

mod address;
mod address_space;
mod arch;
mod block;
mod error;
mod fault;
mod file;
mod frame;
mod layout;
mod memory;
mod mmap;
mod mmu;
mod page;
mod page_directory;
mod spt;
mod swap;
mod vm;

#[cfg(any(test, feature = "software-emulation"))]
mod emulated;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::{AddressSpace, PageInfo, SpaceId};
pub use block::{BlockDevice, SECTOR_SIZE, SECTORS_PER_PAGE};
pub use error::{IoError, VmError};
pub use fault::PageFault;
pub use file::File;
pub use frame::{FrameFlag, FrameFlags, FrameId};
pub use layout::{KERNEL_BASE, MAX_STACK_SIZE, STACK_SLACK, USER_STACK_TOP};
pub use memory::PhysicalMemory;
pub use mmap::MappingId;
pub use mmu::Mmu;
pub use page::{InitFn, LoadAux, PageType, load_file_slice};
pub use page_directory::PageDirectory;
pub use spt::SupplementalPageTable;
pub use swap::{SwapSlot, SwapTable};
pub use vm::{VirtualMemory, VmStats, current, init_subsystem};

pub use arch::{PAGE_SIZE, PageEntry, PageFlags};

#[cfg(any(test, feature = "software-emulation"))]
pub use arch::EmulatedMemory;
#[cfg(any(test, feature = "software-emulation"))]
pub use emulated::{MemFile, RamDisk};
