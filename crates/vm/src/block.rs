//! Block devices used as swap space.

use crate::IoError;
use crate::arch::PAGE_SIZE;

/// Size of one device sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Number of consecutive sectors that hold one page.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

/// A sector-addressed storage device.
///
/// Requests may block the calling thread while the transfer is in flight.
pub trait BlockDevice: Send + Sync {
    /// Returns the device capacity in sectors.
    fn sector_count(&self) -> u64;

    /// Reads sector `index` into `buffer`.
    fn read_sector(&self, index: u64, buffer: &mut [u8; SECTOR_SIZE]) -> Result<(), IoError>;

    /// Writes `buffer` to sector `index`.
    fn write_sector(&self, index: u64, buffer: &[u8; SECTOR_SIZE]) -> Result<(), IoError>;
}
