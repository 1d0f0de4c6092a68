//! Program heap: a fixed 1 MiB arena with bump allocation.
//!
//! `free` is a no-op; the whole arena is reclaimed by resetting the bump
//! offset when the next program launches.

use alloc::vec;
use alloc::vec::Vec;
use core::ptr;

use lazy_static::lazy_static;
use spin::Mutex;

pub const PROGRAM_HEAP_SIZE: usize = 1024 * 1024;

const ALIGN: usize = 8;

struct Arena {
    storage: Vec<u8>,
    offset: usize,
}

lazy_static! {
    // The backing storage is allocated once and never grown, so handed-out
    // pointers stay valid until the next reset.
    static ref ARENA: Mutex<Arena> = Mutex::new(Arena {
        storage: vec![0u8; PROGRAM_HEAP_SIZE],
        offset: 0,
    });
}

/// Reset the bump offset; called before each program launch.
pub fn reset() {
    ARENA.lock().offset = 0;
}

/// Bump-allocate `size` bytes, 8-byte aligned. Null when the arena is
/// exhausted or `size` is zero.
pub fn alloc(size: u32) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }
    let mut arena = ARENA.lock();
    let offset = (arena.offset + ALIGN - 1) & !(ALIGN - 1);
    match offset.checked_add(size as usize) {
        Some(end) if end <= PROGRAM_HEAP_SIZE => {
            arena.offset = end;
            // Pointer stays inside the arena's fixed allocation.
            unsafe { arena.storage.as_mut_ptr().add(offset) }
        }
        _ => ptr::null_mut(),
    }
}

/// No-op by design of the bump arena.
pub fn free(_ptr: *mut u8) {}

pub fn used() -> usize {
    ARENA.lock().offset
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test body: the arena is process-global, and the harness runs
    // #[test] functions concurrently.
    #[test]
    fn bump_alloc_lifecycle() {
        reset();
        let a = alloc(10);
        let b = alloc(1);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(a as usize % ALIGN, 0);
        assert_eq!(b as usize % ALIGN, 0);
        // 10 bytes round up to 16 before the next block.
        assert_eq!(b as usize - a as usize, 16);

        assert!(alloc(0).is_null());
        assert!(alloc(PROGRAM_HEAP_SIZE as u32).is_null());
        free(core::ptr::null_mut());

        // A reset reclaims everything at once.
        reset();
        assert_eq!(used(), 0);
        let c = alloc(PROGRAM_HEAP_SIZE as u32);
        assert!(!c.is_null());
        assert!(alloc(1).is_null());
        reset();
    }
}
