//! Address types for physical and virtual memory management.
//!
//! This module provides architecture-independent wrappers around physical and virtual
//! addresses, with the page-rounding helpers the pager relies on.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{arch, layout};

/// Generates an address newtype with the page arithmetic both kinds share.
///
/// Each type supplies its own validating `new`; everything here goes through it.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// Returns true if the address is the first byte of a page.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.page_offset() == 0
            }

            /// Rounds down to the start of the page.
            #[inline]
            pub const fn page_base(self) -> Self {
                Self(self.0 & !(arch::PAGE_SIZE - 1))
            }

            /// Returns the byte offset within the page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (arch::PAGE_SIZE - 1)
            }

            /// Rounds up to the next page boundary.
            ///
            /// # Panics
            ///
            /// Panics if the rounded address is not valid for this address kind.
            #[inline]
            pub const fn page_ceil(self) -> Self {
                Self::new((self.0 + arch::PAGE_SIZE - 1) & !(arch::PAGE_SIZE - 1))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Identifies a frame handed out by the raw page allocator. The pager never\n\
     dereferences it directly; frame contents are reached through\n\
     [`PhysicalMemory::frame_ptr`](crate::PhysicalMemory::frame_ptr)."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the architecture's maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Keys of the supplemental page table are always page-aligned virtual addresses;\n\
     use [`VirtualAddress::page_base`] before lookups."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical for the architecture.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(arch::validate_virtual(addr), "address is not canonical");
        Self(addr)
    }

    /// Returns true if the address belongs to the kernel half of the address space.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= layout::KERNEL_BASE
    }

    /// Adds `offset` bytes, returning `None` on overflow or if the result is not canonical.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) if arch::validate_virtual(addr) => Some(Self(addr)),
            _ => None,
        }
    }

    /// Subtracts `offset` bytes, saturating at the null address.
    #[inline]
    pub const fn saturating_sub(self, offset: usize) -> Self {
        Self(self.0.saturating_sub(offset))
    }
}
