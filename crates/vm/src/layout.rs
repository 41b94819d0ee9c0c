//! User address-space layout.

use crate::arch::PAGE_SIZE;

/// First kernel virtual address. Everything below belongs to user space.
pub const KERNEL_BASE: usize = 0x80_0400_0000;

/// One past the highest user stack address; the stack grows down from here.
pub const USER_STACK_TOP: usize = 0x4748_0000;

/// Largest distance the user stack may grow below [`USER_STACK_TOP`].
pub const MAX_STACK_SIZE: usize = 1 << 20;

/// How far below the stack pointer an access still counts as a stack access.
///
/// `push` faults before the stack pointer moves, so the faulting address lies just
/// under it.
pub const STACK_SLACK: usize = PAGE_SIZE;
