//! ELF32 program loader.
//!
//! A linear pipeline with no retry: read the file into the fixed load
//! buffer, validate the header, bounds-check every PT_LOAD against the load
//! window, publish the syscall table, copy segments and zero their BSS
//! tails, then jump to the entry point. Validation and planning are pure;
//! nothing below the window is touched until a plan exists, so a rejected
//! image leaves memory untouched.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use lazy_static::lazy_static;
use log::{debug, error};
use spin::Mutex;
use xmas_elf::program::Type;
use xmas_elf::ElfFile;

use crate::fs;
use crate::syscall::table;

/// Programs larger than this do not load.
pub const ELF_MAX_FILE_SIZE: usize = 512 * 1024;

/// Loadable window for user programs: segments must fit inside it, and it
/// starts above the syscall table page.
pub const LOAD_WINDOW_START: u32 = 0x0011_0000;
pub const LOAD_WINDOW_END: u32 = 0x00A0_0000;

const EHDR_SIZE: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    NotElf,
    Not32Bit,
    WrongEndianness,
    NotExecutable,
    WrongArch,
    NoSegments,
    /// A PT_LOAD fell outside the window (or its file range outside the
    /// image); carries the attempted placement.
    LoadFailed { vaddr: u32, memsz: u32 },
    FileNotFound,
    FileTooLarge,
    FileRead,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::NotElf => f.write_str("Not an ELF file"),
            ElfError::Not32Bit => f.write_str("Not 32-bit"),
            ElfError::WrongEndianness => f.write_str("Wrong endianness"),
            ElfError::NotExecutable => f.write_str("Not executable"),
            ElfError::WrongArch => f.write_str("Wrong arch (need i386)"),
            ElfError::NoSegments => f.write_str("No segments"),
            ElfError::LoadFailed { vaddr, memsz } => write!(
                f,
                "Load failed: segment {:#010X}..{:#010X} outside {:#010X}..{:#010X}",
                vaddr,
                vaddr.wrapping_add(*memsz),
                LOAD_WINDOW_START,
                LOAD_WINDOW_END
            ),
            ElfError::FileNotFound => f.write_str("File not found"),
            ElfError::FileTooLarge => f.write_str("File too large"),
            ElfError::FileRead => f.write_str("Read error"),
        }
    }
}

/// One PT_LOAD, already bounds-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub vaddr: u32,
    pub offset: u32,
    pub filesz: u32,
    pub memsz: u32,
}

/// Validated copy plan for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub entry: u32,
    pub segments: Vec<Segment>,
}

fn read_le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

/// Header validation with one tagged error per failing check: magic,
/// class, endianness, type, machine, segment count, in that order.
pub fn validate(image: &[u8]) -> Result<(), ElfError> {
    if image.len() < EHDR_SIZE {
        return Err(ElfError::NotElf);
    }
    if image[0..4] != [0x7F, b'E', b'L', b'F'] {
        return Err(ElfError::NotElf);
    }
    if image[4] != 1 {
        return Err(ElfError::Not32Bit);
    }
    if image[5] != 1 {
        return Err(ElfError::WrongEndianness);
    }
    if read_le_u16(image, 16) != 2 {
        return Err(ElfError::NotExecutable);
    }
    if read_le_u16(image, 18) != 3 {
        return Err(ElfError::WrongArch);
    }
    if read_le_u16(image, 44) == 0 {
        return Err(ElfError::NoSegments);
    }
    Ok(())
}

/// Validate and bounds-check an image into a [`LoadPlan`]. Pure: no memory
/// outside the image is touched.
pub fn plan_load(image: &[u8]) -> Result<LoadPlan, ElfError> {
    validate(image)?;

    // The program-header table itself must lie inside the image.
    let phoff = u32::from_le_bytes([image[28], image[29], image[30], image[31]]) as usize;
    let phentsize = read_le_u16(image, 42) as usize;
    let phnum = read_le_u16(image, 44) as usize;
    match phoff.checked_add(phentsize * phnum) {
        Some(end) if end <= image.len() => {}
        _ => return Err(ElfError::NotElf),
    }

    let elf = ElfFile::new(image).map_err(|_| ElfError::NotElf)?;
    let mut segments = Vec::new();

    for ph in elf.program_iter() {
        if ph.get_type() != Ok(Type::Load) {
            continue;
        }
        let vaddr = ph.virtual_addr() as u32;
        let offset = ph.offset() as u32;
        let filesz = ph.file_size() as u32;
        // A malformed memsz below filesz would truncate the copy; clamp it.
        let memsz = (ph.mem_size() as u32).max(filesz);

        let out_of_window = vaddr < LOAD_WINDOW_START
            || vaddr
                .checked_add(memsz)
                .map(|end| end > LOAD_WINDOW_END)
                .unwrap_or(true);
        if out_of_window {
            return Err(ElfError::LoadFailed { vaddr, memsz });
        }

        let in_image = offset
            .checked_add(filesz)
            .map(|end| end as usize <= image.len())
            .unwrap_or(false);
        if !in_image {
            return Err(ElfError::LoadFailed { vaddr, memsz });
        }

        segments.push(Segment {
            vaddr,
            offset,
            filesz,
            memsz,
        });
    }

    Ok(LoadPlan {
        entry: elf.header.pt2.entry_point() as u32,
        segments,
    })
}

/// Execute a plan against a window of memory: copy each segment's file
/// bytes and zero the `[filesz, memsz)` tail. `window` models the address
/// range starting at `window_base`; the kernel passes the real load window,
/// tests pass a buffer.
pub fn copy_segments(plan: &LoadPlan, image: &[u8], window: &mut [u8], window_base: u32) {
    for seg in &plan.segments {
        let at = (seg.vaddr - window_base) as usize;
        let filesz = seg.filesz as usize;
        let memsz = seg.memsz as usize;
        let offset = seg.offset as usize;
        window[at..at + filesz].copy_from_slice(&image[offset..offset + filesz]);
        window[at + filesz..at + memsz].fill(0);
    }
}

/// Publish the syscall table, copy the image into the load window and call
/// the entry point. Returns the program's exit status.
///
/// # Safety
/// Only valid in the real kernel address space: the load window must be
/// identity-mapped writable memory, and `plan.entry` must be the entry of a
/// freestanding `extern "C" fn() -> i32` program linked against it.
pub unsafe fn launch(plan: &LoadPlan, image: &[u8]) -> i32 {
    table::install();

    let window = core::slice::from_raw_parts_mut(
        LOAD_WINDOW_START as usize as *mut u8,
        (LOAD_WINDOW_END - LOAD_WINDOW_START) as usize,
    );
    copy_segments(plan, image, window, LOAD_WINDOW_START);

    let entry: extern "C" fn() -> i32 = core::mem::transmute(plan.entry as usize);
    entry()
}

lazy_static! {
    /// Scratch image buffer, overwritten by every launch.
    static ref ELF_BUFFER: Mutex<Vec<u8>> = Mutex::new(vec![0u8; ELF_MAX_FILE_SIZE]);
}

/// Load and run the program at `path` on the mounted volume.
///
/// # Safety
/// See [`launch`].
pub unsafe fn exec(path: &str) -> Result<i32, ElfError> {
    let mut buffer = ELF_BUFFER.lock();

    let size = fs::with_volume(|v| -> Result<usize, ElfError> {
        let stat = v.stat(path).map_err(|_| ElfError::FileNotFound)?;
        if stat.is_dir {
            return Err(ElfError::FileNotFound);
        }
        if stat.size as usize > ELF_MAX_FILE_SIZE {
            return Err(ElfError::FileTooLarge);
        }
        v.read(path, &mut buffer).map_err(|_| ElfError::FileRead)
    })
    .ok_or(ElfError::FileNotFound)??;

    let image = &buffer[..size];
    let plan = plan_load(image).map_err(|e| {
        error!("{}", e);
        e
    })?;

    debug!("running {} (entry {:#010X})", path, plan.entry);
    let status = launch(&plan, image);
    debug!("{} exited with status {}", path, status);
    Ok(status)
}
