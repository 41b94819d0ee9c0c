//! Error types for the virtual memory subsystem.

use core::fmt;

/// Errors reported by a backing store (swap device or file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The device or file system rejected the request.
    Device,
    /// Fewer bytes were read than the page needs.
    ShortRead,
    /// Fewer bytes were written than the page holds.
    ShortWrite,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Device => f.write_str("device error"),
            IoError::ShortRead => f.write_str("short read"),
            IoError::ShortWrite => f.write_str("short write"),
        }
    }
}

/// Errors that can occur while resolving faults or managing an address space.
///
/// Every variant except the resource-exhaustion ones is the faulting process's fault:
/// the caller terminates that process and the kernel carries on. Kernel bugs (double
/// frees, inconsistent frame links) panic instead of surfacing here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// Access to the null page.
    NullAddress,
    /// User access to a kernel address.
    KernelAddress,
    /// No page is registered at the address.
    NotMapped,
    /// Write to a page registered read-only.
    ReadOnly,
    /// Write to a present, write-protected page.
    WriteProtected,
    /// A page is already registered at the address.
    AlreadyMapped,
    /// Address or file offset is not page-aligned.
    Misaligned,
    /// Zero-length mapping, empty file, or a range that leaves user space.
    InvalidLength,
    /// The requested range overlaps an existing page.
    Overlap,
    /// A file-backed page was requested without a file.
    NoBackingFile,
    /// The backing store failed.
    Io(IoError),
    /// No frame is free and none could be evicted.
    OutOfMemory,
    /// An anonymous page had to be evicted but every swap slot is in use.
    SwapExhausted,
}

impl VmError {
    /// Returns true for failures caused by memory pressure rather than a bad access.
    pub fn is_resource_exhaustion(self) -> bool {
        matches!(self, VmError::OutOfMemory | VmError::SwapExhausted)
    }
}

impl From<IoError> for VmError {
    fn from(err: IoError) -> Self {
        VmError::Io(err)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::NullAddress => f.write_str("null address"),
            VmError::KernelAddress => f.write_str("kernel address accessed from user mode"),
            VmError::NotMapped => f.write_str("address not mapped"),
            VmError::ReadOnly => f.write_str("write to read-only page"),
            VmError::WriteProtected => f.write_str("write to write-protected page"),
            VmError::AlreadyMapped => f.write_str("page already mapped"),
            VmError::Misaligned => f.write_str("address not page-aligned"),
            VmError::InvalidLength => f.write_str("invalid mapping length"),
            VmError::Overlap => f.write_str("mapping overlaps existing pages"),
            VmError::NoBackingFile => f.write_str("file-backed page without a file"),
            VmError::Io(err) => write!(f, "backing store error: {err}"),
            VmError::OutOfMemory => f.write_str("out of physical memory"),
            VmError::SwapExhausted => f.write_str("swap space exhausted"),
        }
    }
}
