#![cfg_attr(not(test), no_std)]

//! Kernel-side storage and program-loading core: the ATA PIO block driver,
//! the process-wide mounted volume, the fixed-address syscall table with its
//! bump-allocated program heap, and the ELF32 loader.
//!
//! The crate is a library so the loader and syscall layers can be exercised
//! by host tests; only the port-I/O driver and the raw load window are tied
//! to the machine.

extern crate alloc;

pub mod drivers;
pub mod exec;
pub mod fs;
pub mod syscall;
