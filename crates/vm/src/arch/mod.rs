//! Page-table entry encodings.
//!
//! Kernel builds on x86_64 use the hardware layout. Tests and the
//! `software-emulation` feature use the emulated layout together with
//! [`EmulatedMemory`](software::EmulatedMemory).

// Compiled on every x86_64 host so it is type-checked even by test builds.
#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(test), not(feature = "software-emulation")))]
pub use self::x86_64::*;

#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use self::software::*;
