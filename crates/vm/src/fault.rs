//! Page-fault resolution.

use crate::address_space::check_user;
use crate::page::Page;
use crate::{
    AddressSpace, MAX_STACK_SIZE, STACK_SLACK, USER_STACK_TOP, VirtualAddress, VmError,
};

/// What the trap handler knows about a page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// The faulting address.
    pub address: VirtualAddress,
    /// The access was a write.
    pub write: bool,
    /// The access came from user mode.
    pub user: bool,
    /// The page was not present, as opposed to a protection violation.
    pub not_present: bool,
    /// The stack pointer in the trap frame. Only meaningful for user-mode faults.
    pub stack_pointer: VirtualAddress,
}

/// Returns true if an access at `address` with the stack at `stack_pointer` should
/// grow the stack.
///
/// The access must fall in the stack region and no lower than [`STACK_SLACK`] below
/// the stack pointer, which covers `push` faulting before the pointer moves.
fn is_stack_access(address: VirtualAddress, stack_pointer: VirtualAddress) -> bool {
    let address = address.as_usize();
    address < USER_STACK_TOP
        && address >= USER_STACK_TOP - MAX_STACK_SIZE
        && address >= stack_pointer.as_usize().saturating_sub(STACK_SLACK)
}

impl AddressSpace {
    /// Resolves a page fault.
    ///
    /// On success the faulting access can be retried. Any error means the faulting
    /// process must be terminated; the kernel itself is unaffected.
    pub fn handle_fault(&self, fault: &PageFault) -> Result<(), VmError> {
        let result = self.resolve_fault(fault);
        match result {
            Ok(()) => {
                #[cfg(feature = "detailed-logging")]
                log::trace!(
                    "space {}: resolved {} fault at {}",
                    self.id(),
                    if fault.write { "write" } else { "read" },
                    fault.address
                );
            }
            Err(err) => log::warn!(
                "space {}: fatal {} {} fault at {}: {}",
                self.id(),
                if fault.user { "user" } else { "kernel" },
                if fault.write { "write" } else { "read" },
                fault.address,
                err
            ),
        }
        result
    }

    fn resolve_fault(&self, fault: &PageFault) -> Result<(), VmError> {
        check_user(fault.address)?;
        if !fault.not_present {
            return Err(VmError::WriteProtected);
        }

        let mut state = self.inner.state.lock();
        let stack_pointer = if fault.user {
            Some(fault.stack_pointer)
        } else {
            state.user_stack_pointer
        };
        if !state.spt.contains(fault.address)
            && stack_pointer.is_some_and(|sp| is_stack_access(fault.address, sp))
        {
            state.spt.insert(Page::stack(fault.address))?;
            log::debug!("space {}: stack grew to {}", self.id(), fault.address.page_base());
        }

        let page = state.spt.get(fault.address).ok_or(VmError::NotMapped)?;
        if fault.write && !page.is_writable() {
            return Err(VmError::ReadOnly);
        }
        self.claim_locked(&mut state, fault.address)?;
        Ok(())
    }
}
