//! Software stand-ins for the block device and file system.
//!
//! These let the pager run end to end on a host: a RAM-backed swap disk and an
//! in-memory file whose handles share one inode, with counters and failure switches
//! tests use to observe I/O.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::{BlockDevice, File, IoError, SECTOR_SIZE};

/// A RAM-backed block device.
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl RamDisk {
    /// Creates a zeroed disk of `sectors` sectors.
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sectors]),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent write fail with [`IoError::Device`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Returns the number of sectors written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }
}

impl BlockDevice for RamDisk {
    fn sector_count(&self) -> u64 {
        self.sectors.lock().len() as u64
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8; SECTOR_SIZE]) -> Result<(), IoError> {
        let sectors = self.sectors.lock();
        let sector = sectors.get(index as usize).ok_or(IoError::Device)?;
        buffer.copy_from_slice(sector);
        Ok(())
    }

    fn write_sector(&self, index: u64, buffer: &[u8; SECTOR_SIZE]) -> Result<(), IoError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(IoError::Device);
        }
        let mut sectors = self.sectors.lock();
        let sector = sectors.get_mut(index as usize).ok_or(IoError::Device)?;
        sector.copy_from_slice(buffer);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Shared state behind every handle of one [`MemFile`].
struct Inode {
    /// File contents; the lock stands in for the file system lock.
    data: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    open_handles: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// An in-memory file.
///
/// Writes never extend the file, matching a fixed-size file system. Every handle
/// opened with [`File::reopen`] shares the same contents and counters.
pub struct MemFile {
    inode: Arc<Inode>,
}

impl MemFile {
    /// Creates a file holding `contents` and returns its first handle.
    pub fn new(contents: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            inode: Arc::new(Inode {
                data: Mutex::new(contents.to_vec()),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
                open_handles: AtomicUsize::new(1),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        })
    }

    /// Returns a copy of the file contents.
    pub fn contents(&self) -> Vec<u8> {
        self.inode.data.lock().clone()
    }

    /// Returns the number of `read_at` calls across all handles.
    pub fn reads(&self) -> usize {
        self.inode.reads.load(Ordering::Acquire)
    }

    /// Returns the number of `write_at` calls across all handles.
    pub fn writes(&self) -> usize {
        self.inode.writes.load(Ordering::Acquire)
    }

    /// Returns the number of handles currently open on this file.
    pub fn open_handles(&self) -> usize {
        self.inode.open_handles.load(Ordering::Acquire)
    }

    /// Makes every subsequent read fail with [`IoError::Device`].
    pub fn fail_reads(&self, fail: bool) {
        self.inode.fail_reads.store(fail, Ordering::Release);
    }

    /// Makes every subsequent write fail with [`IoError::Device`].
    pub fn fail_writes(&self, fail: bool) {
        self.inode.fail_writes.store(fail, Ordering::Release);
    }
}

impl File for MemFile {
    fn reopen(&self) -> Result<Arc<dyn File>, IoError> {
        self.inode.open_handles.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemFile {
            inode: self.inode.clone(),
        }))
    }

    fn read_at(&self, buffer: &mut [u8], offset: u64) -> Result<usize, IoError> {
        if self.inode.fail_reads.load(Ordering::Acquire) {
            return Err(IoError::Device);
        }
        self.inode.reads.fetch_add(1, Ordering::AcqRel);
        let data = self.inode.data.lock();
        let start = (offset as usize).min(data.len());
        let count = buffer.len().min(data.len() - start);
        buffer[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn write_at(&self, buffer: &[u8], offset: u64) -> Result<usize, IoError> {
        self.inode.writes.fetch_add(1, Ordering::AcqRel);
        if self.inode.fail_writes.load(Ordering::Acquire) {
            return Err(IoError::Device);
        }
        let mut data = self.inode.data.lock();
        let start = (offset as usize).min(data.len());
        let count = buffer.len().min(data.len() - start);
        data[start..start + count].copy_from_slice(&buffer[..count]);
        Ok(count)
    }

    fn len(&self) -> u64 {
        self.inode.data.lock().len() as u64
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.inode.open_handles.fetch_sub(1, Ordering::AcqRel);
    }
}
