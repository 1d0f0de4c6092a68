//! The fixed-address syscall table: the kernel↔program ABI.
//!
//! A `#[repr(C)]` block of magic, version and function pointers written to
//! physical `0x0010_0000` immediately before each program launch. Field
//! order is ABI: any layout change requires a version bump. Programs check
//! the magic and version before calling anything.

use alloc::format;
use alloc::vec::Vec;

use log::error;

use super::heap;
use crate::drivers::console::{clock, console, keyboard};
use crate::fs;

pub const SYSCALL_TABLE_ADDR: usize = 0x0010_0000;
pub const SYSCALL_MAGIC: u32 = 0xA105_C411;
/// Version 1 carried the console/keyboard/timer block; version 2 added the
/// file, cursor, key-polling and heap slots.
pub const SYSCALL_VERSION: u32 = 2;

/// Longest NUL-terminated string a program may pass through the table.
const MAX_CSTR: usize = 4096;

#[repr(C)]
pub struct SyscallTable {
    pub magic: u32,
    pub version: u32,

    pub print: extern "C" fn(*const u8),
    pub print_color: extern "C" fn(*const u8, u8),
    pub putchar: extern "C" fn(u8),
    pub clear: extern "C" fn(),
    pub getchar: extern "C" fn() -> u8,
    pub read_line: extern "C" fn(*mut u8, i32),
    pub sleep: extern "C" fn(u32),
    pub get_ticks: extern "C" fn() -> u32,

    pub file_exists: extern "C" fn(*const u8) -> i32,
    pub file_read: extern "C" fn(*const u8, *mut u8, u32) -> i32,
    pub file_write: extern "C" fn(*const u8, *const u8, u32) -> i32,
    pub file_remove: extern "C" fn(*const u8) -> i32,
    pub file_mkdir: extern "C" fn(*const u8) -> i32,
    pub is_dir: extern "C" fn(*const u8) -> i32,
    pub list_dir: extern "C" fn(*const u8, Option<extern "C" fn(*const u8, u32, u8)>) -> i32,

    pub set_cursor: extern "C" fn(i32, i32),
    pub get_cursor: extern "C" fn(*mut i32, *mut i32),
    pub get_screen_width: extern "C" fn() -> i32,
    pub get_screen_height: extern "C" fn() -> i32,

    pub key_pressed: extern "C" fn() -> i32,
    pub get_key_nonblock: extern "C" fn() -> i32,

    pub malloc: extern "C" fn(u32) -> *mut u8,
    pub free: extern "C" fn(*mut u8),
}

/// Borrow a program-supplied NUL-terminated string.
///
/// # Safety
/// `ptr` must point at readable memory holding a terminator within
/// [`MAX_CSTR`] bytes.
unsafe fn cstr<'a>(ptr: *const u8) -> &'a str {
    if ptr.is_null() {
        return "";
    }
    let mut len = 0;
    while len < MAX_CSTR && *ptr.add(len) != 0 {
        len += 1;
    }
    core::str::from_utf8(core::slice::from_raw_parts(ptr, len)).unwrap_or("")
}

extern "C" fn sys_print(s: *const u8) {
    if let Some(con) = console() {
        con.print(unsafe { cstr(s) });
    }
}

extern "C" fn sys_print_color(s: *const u8, color: u8) {
    if let Some(con) = console() {
        con.print_color(unsafe { cstr(s) }, color);
    }
}

extern "C" fn sys_putchar(c: u8) {
    if let Some(con) = console() {
        con.putchar(c);
    }
}

extern "C" fn sys_clear() {
    if let Some(con) = console() {
        con.clear();
    }
}

extern "C" fn sys_getchar() -> u8 {
    keyboard().map(|k| k.getchar()).unwrap_or(0)
}

extern "C" fn sys_read_line(buf: *mut u8, max: i32) {
    if buf.is_null() || max <= 0 {
        return;
    }
    let out = unsafe { core::slice::from_raw_parts_mut(buf, max as usize) };
    let len = match keyboard() {
        Some(k) => k.read_line(&mut out[..max as usize - 1]).min(max as usize - 1),
        None => 0,
    };
    out[len] = 0;
}

extern "C" fn sys_sleep(ms: u32) {
    if let Some(clk) = clock() {
        clk.sleep_ms(ms);
    }
}

extern "C" fn sys_get_ticks() -> u32 {
    clock().map(|clk| clk.ticks()).unwrap_or(0)
}

extern "C" fn sys_file_exists(path: *const u8) -> i32 {
    let path = unsafe { cstr(path) };
    fs::with_volume(|v| v.exists(path) as i32).unwrap_or(0)
}

extern "C" fn sys_file_read(path: *const u8, buf: *mut u8, max: u32) -> i32 {
    if buf.is_null() {
        return -1;
    }
    let path = unsafe { cstr(path) };
    let out = unsafe { core::slice::from_raw_parts_mut(buf, max as usize) };
    fs::with_volume(|v| match v.read(path, out) {
        Ok(n) => n as i32,
        Err(e) => {
            error!("{}", e);
            -1
        }
    })
    .unwrap_or(-1)
}

extern "C" fn sys_file_write(path: *const u8, data: *const u8, size: u32) -> i32 {
    let path = unsafe { cstr(path) };
    let data = if data.is_null() || size == 0 {
        &[][..]
    } else {
        unsafe { core::slice::from_raw_parts(data, size as usize) }
    };
    fs::with_volume(|v| match v.write(path, data) {
        Ok(()) => 0,
        Err(_) => -1,
    })
    .unwrap_or(-1)
}

extern "C" fn sys_file_remove(path: *const u8) -> i32 {
    let path = unsafe { cstr(path) };
    fs::with_volume(|v| match v.rm(path) {
        Ok(()) => 0,
        Err(_) => -1,
    })
    .unwrap_or(-1)
}

extern "C" fn sys_file_mkdir(path: *const u8) -> i32 {
    let path = unsafe { cstr(path) };
    fs::with_volume(|v| match v.mkdir(path) {
        Ok(()) => 0,
        Err(_) => -1,
    })
    .unwrap_or(-1)
}

extern "C" fn sys_is_dir(path: *const u8) -> i32 {
    let path = unsafe { cstr(path) };
    fs::with_volume(|v| v.is_dir(path) as i32).unwrap_or(0)
}

extern "C" fn sys_list_dir(
    path: *const u8,
    callback: Option<extern "C" fn(*const u8, u32, u8)>,
) -> i32 {
    let path = unsafe { cstr(path) };
    let items = match fs::with_volume(|v| v.list_dir(path)) {
        Some(Ok(items)) => items,
        _ => return -1,
    };

    for item in items {
        if item.name == "." || item.name == ".." {
            continue;
        }
        let is_dir = item.entry.is_dir();
        match callback {
            Some(cb) => {
                // Hand the name over as a NUL-terminated buffer.
                let mut name: Vec<u8> = item.name.into_bytes();
                name.push(0);
                cb(name.as_ptr(), item.entry.file_size(), is_dir as u8);
            }
            None => {
                // No callback: render the listing onto the console, the
                // way the shell's ls does.
                if let Some(con) = console() {
                    if is_dir {
                        con.print_color(&item.name, 0x09);
                        con.print_color("/", 0x09);
                    } else {
                        con.print_color(&item.name, 0x0F);
                        con.print_color(&format!("  {}", item.entry.file_size()), 0x08);
                    }
                    con.putchar(b'\n');
                }
            }
        }
    }
    0
}

extern "C" fn sys_set_cursor(x: i32, y: i32) {
    if let Some(con) = console() {
        con.set_cursor(x, y);
    }
}

extern "C" fn sys_get_cursor(x: *mut i32, y: *mut i32) {
    if let Some(con) = console() {
        let (cx, cy) = con.cursor();
        unsafe {
            if !x.is_null() {
                *x = cx;
            }
            if !y.is_null() {
                *y = cy;
            }
        }
    }
}

extern "C" fn sys_get_screen_width() -> i32 {
    console().map(|con| con.width()).unwrap_or(80)
}

extern "C" fn sys_get_screen_height() -> i32 {
    console().map(|con| con.height()).unwrap_or(25)
}

extern "C" fn sys_key_pressed() -> i32 {
    keyboard().map(|k| k.key_pressed() as i32).unwrap_or(0)
}

extern "C" fn sys_get_key_nonblock() -> i32 {
    keyboard().map(|k| k.get_key_nonblock()).unwrap_or(-1)
}

extern "C" fn sys_malloc(size: u32) -> *mut u8 {
    heap::alloc(size)
}

extern "C" fn sys_free(ptr: *mut u8) {
    heap::free(ptr);
}

/// Assemble the table value with every slot bound to its kernel shim.
pub fn build() -> SyscallTable {
    SyscallTable {
        magic: SYSCALL_MAGIC,
        version: SYSCALL_VERSION,
        print: sys_print,
        print_color: sys_print_color,
        putchar: sys_putchar,
        clear: sys_clear,
        getchar: sys_getchar,
        read_line: sys_read_line,
        sleep: sys_sleep,
        get_ticks: sys_get_ticks,
        file_exists: sys_file_exists,
        file_read: sys_file_read,
        file_write: sys_file_write,
        file_remove: sys_file_remove,
        file_mkdir: sys_file_mkdir,
        is_dir: sys_is_dir,
        list_dir: sys_list_dir,
        set_cursor: sys_set_cursor,
        get_cursor: sys_get_cursor,
        get_screen_width: sys_get_screen_width,
        get_screen_height: sys_get_screen_height,
        key_pressed: sys_key_pressed,
        get_key_nonblock: sys_get_key_nonblock,
        malloc: sys_malloc,
        free: sys_free,
    }
}

/// Install the table at [`SYSCALL_TABLE_ADDR`] and reset the program heap.
/// The magic is written first, then the version, then the slots in
/// declared order.
///
/// # Safety
/// Only valid where physical `0x0010_0000` is identity-mapped writable
/// memory reserved for the table.
pub unsafe fn install() {
    let table = SYSCALL_TABLE_ADDR as *mut SyscallTable;
    (*table).magic = SYSCALL_MAGIC;
    (*table).version = SYSCALL_VERSION;
    (*table).print = sys_print;
    (*table).print_color = sys_print_color;
    (*table).putchar = sys_putchar;
    (*table).clear = sys_clear;
    (*table).getchar = sys_getchar;
    (*table).read_line = sys_read_line;
    (*table).sleep = sys_sleep;
    (*table).get_ticks = sys_get_ticks;
    (*table).file_exists = sys_file_exists;
    (*table).file_read = sys_file_read;
    (*table).file_write = sys_file_write;
    (*table).file_remove = sys_file_remove;
    (*table).file_mkdir = sys_file_mkdir;
    (*table).is_dir = sys_is_dir;
    (*table).list_dir = sys_list_dir;
    (*table).set_cursor = sys_set_cursor;
    (*table).get_cursor = sys_get_cursor;
    (*table).get_screen_width = sys_get_screen_width;
    (*table).get_screen_height = sys_get_screen_height;
    (*table).key_pressed = sys_key_pressed;
    (*table).get_key_nonblock = sys_get_key_nonblock;
    (*table).malloc = sys_malloc;
    (*table).free = sys_free;

    heap::reset();
}
