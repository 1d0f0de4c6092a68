#![cfg_attr(not(test), no_std)]

//! FAT12/16/32 filesystem driver over a simple block device.
//!
//! The driver is built around an owned [`Volume`] value: it holds the parsed
//! BPB layout, the FAT table engine with its one-sector write-through cache,
//! a scratch sector buffer and the navigation state (current cluster and
//! current path). All operations take `&mut Volume`, so there is no hidden
//! global state in this crate.

extern crate alloc;

pub mod bpb;
pub mod device;
pub mod dir;
pub mod entry;
pub mod fat;
pub mod format;
pub mod ops;
pub mod path;
pub mod volume;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

pub use bpb::{BootSector, FatType, VolumeLayout};
pub use device::{BlockDevice, DeviceError, MemDevice, SectorIo, BLOCK_SIZE};
pub use dir::{DirItem, SlotPos};
pub use entry::{Attributes, DirEntryRaw, LfnEntryRaw, ATTR_LONG_NAME, DIR_ENTRY_SIZE};
pub use fat::FatTable;
pub use format::{format, FormatOptions};
pub use ops::{FileStat, VolumeInfo};
pub use volume::Volume;

/// FAT entry value of a free cluster.
pub const FREE_CLUSTER: u32 = 0x0000_0000;
/// Normalized end-of-chain threshold: any FAT entry read back as a value
/// at or above this marks the last cluster of a chain.
pub const END_OF_CLUSTER: u32 = 0x0FFF_FFF8;
/// The normalized end-of-chain sentinel returned by the FAT engine.
pub const EOC_SENTINEL: u32 = 0x0FFF_FFFF;
/// Valid data clusters live below the FAT32 reserved range.
pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// Cluster-count thresholds that decide the FAT variant (ECMA-107).
pub const MAX_CLUSTER_FAT12: u32 = 4085;
pub const MAX_CLUSTER_FAT16: u32 = 65525;

/// First byte of a deleted directory entry.
pub const DIR_ENTRY_UNUSED: u8 = 0xE5;
/// First byte of the end-of-directory terminator entry.
pub const DIR_ENTRY_LAST_AND_UNUSED: u8 = 0x00;
/// Order-byte mask marking the final (highest ordinal) LFN slot of a set.
pub const LAST_LONG_ENTRY: u8 = 0x40;

/// A single LFN slot carries up to 13 UCS-2 code units.
pub const LONG_NAME_LEN_CAP: usize = 13;
/// Longest long filename this driver will produce or decode.
pub const LONG_NAME_MAX: usize = 255;

pub const SPACE: u8 = 0x20;

/// Error type shared by every filesystem operation in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Sector transfer failed or timed out.
    Io,
    /// No free directory slot in a fixed FAT12/16 root region.
    DirectoryFull,
    /// No free cluster left in the FAT.
    DiskFull,
    NotFound,
    IsADirectory,
    NotADirectory,
    InvalidName,
    InvalidBpb,
    UnsupportedSectorSize,
    AlreadyExists,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::Io => "Read/write error",
            FsError::DirectoryFull => "Directory full or disk full",
            FsError::DiskFull => "Disk full",
            FsError::NotFound => "Not found",
            FsError::IsADirectory => "Is a directory",
            FsError::NotADirectory => "Not a directory",
            FsError::InvalidName => "Invalid filename",
            FsError::InvalidBpb => "Invalid BPB",
            FsError::UnsupportedSectorSize => "Unsupported sector size",
            FsError::AlreadyExists => "Already exists",
        };
        f.write_str(msg)
    }
}

impl From<DeviceError> for FsError {
    fn from(_: DeviceError) -> Self {
        FsError::Io
    }
}

/// True if `value` marks the end of a cluster chain.
#[inline]
pub fn is_end_of_chain(value: u32) -> bool {
    value >= END_OF_CLUSTER
}

/// Characters that may not appear in any file or directory name.
const ILLEGAL_NAME_CHARS: &str = "/\\:*?\"<>|";

/// Name validation applied before creating files or directories.
///
/// Rejects the empty name, the path separators and the dot entries; `.` and
/// `..` are directory-structure names, never user-created entries.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name == "/" || name == "." || name == ".." {
        return false;
    }
    !name.chars().any(|c| ILLEGAL_NAME_CHARS.contains(c))
}

/// True when `name` cannot be represented as a plain 8.3 short entry.
///
/// Conservative: any lowercase letter forces an LFN so the original case
/// survives a round trip.
pub fn needs_lfn(name: &str) -> bool {
    if name.bytes().any(|b| b.is_ascii_lowercase()) {
        return true;
    }
    match name.rfind('.') {
        None => name.len() > 8,
        Some(dot) => dot > 8 || name.len() - dot - 1 > 3,
    }
}

/// Derive the space-padded, upper-cased 11-byte short-name key.
///
/// Base and extension are silently truncated to 8 and 3 bytes. Collisions
/// between distinct long names mapping to the same key are not
/// disambiguated.
pub fn short_name_key(name: &str) -> [u8; 11] {
    let mut key = [SPACE; 11];
    let bytes = name.as_bytes();
    let dot = name.rfind('.');

    let base_end = dot.unwrap_or(bytes.len());
    let mut j = 0;
    for &b in &bytes[..base_end] {
        if j >= 8 {
            break;
        }
        key[j] = b.to_ascii_uppercase();
        j += 1;
    }

    if let Some(dot) = dot {
        let mut j = 8;
        for &b in &bytes[dot + 1..] {
            if j >= 11 {
                break;
            }
            key[j] = b.to_ascii_uppercase();
            j += 1;
        }
    }
    key
}

/// Checksum binding a set of LFN slots to their short entry (rotate right
/// and add over the 11 name bytes).
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in short_name.iter() {
        sum = (if sum & 1 != 0 { 0x80u8 } else { 0 })
            .wrapping_add(sum >> 1)
            .wrapping_add(b);
    }
    sum
}

/// Split a long name into the 13-unit chunks of its LFN slots, ordinal 1
/// first. The terminating code unit is `0x0000`, the rest of the final slot
/// is padded with `0xFFFF`.
pub fn long_name_units(name: &str) -> Vec<[u16; LONG_NAME_LEN_CAP]> {
    let mut units: Vec<u16> = name.encode_utf16().collect();
    let count = (units.len() + LONG_NAME_LEN_CAP - 1) / LONG_NAME_LEN_CAP;
    if units.len() < count * LONG_NAME_LEN_CAP {
        units.push(0x0000);
        while units.len() < count * LONG_NAME_LEN_CAP {
            units.push(0xFFFF);
        }
    }
    units
        .chunks(LONG_NAME_LEN_CAP)
        .map(|chunk| {
            let mut arr = [0u16; LONG_NAME_LEN_CAP];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect()
}

/// Split a path into its parent part and the final component.
///
/// `"/a/b"` -> `("/a", "b")`, `"/x"` -> `("/", "x")`, `"x"` -> `(".", "x")`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => (".", path),
    }
}

pub(crate) fn read_le_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

pub(crate) fn read_le_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

pub(crate) fn trimmed_label(raw: &[u8; 11]) -> String {
    let end = raw
        .iter()
        .rposition(|&b| b != SPACE && b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    raw[..end].iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_key_pads_and_uppercases() {
        assert_eq!(short_name_key("a.txt"), *b"A       TXT");
        assert_eq!(short_name_key("KERNEL.BIN"), *b"KERNEL  BIN");
        assert_eq!(short_name_key("noext"), *b"NOEXT      ");
        assert_eq!(short_name_key("averylongname.json"), *b"AVERYLONJSO");
    }

    #[test]
    fn needs_lfn_matches_8_3_rules() {
        assert!(!needs_lfn("KERNEL.BIN"));
        assert!(!needs_lfn("NOEXT"));
        assert!(needs_lfn("kernel.bin"));
        assert!(needs_lfn("LONGBASENAME.TXT"));
        assert!(needs_lfn("A.JSON"));
    }

    #[test]
    fn name_validation_rejects_specials() {
        assert!(is_valid_name("HELLO.TXT"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("."));
        assert!(!is_valid_name(".."));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("what?"));
        assert!(!is_valid_name("pipe|name"));
    }

    #[test]
    fn lfn_checksum_reference_value() {
        // Checksum of "FOO     BAR" computed with the reference algorithm.
        let mut sum: u8 = 0;
        for &b in b"FOO     BAR" {
            sum = (if sum & 1 != 0 { 0x80u8 } else { 0 })
                .wrapping_add(sum >> 1)
                .wrapping_add(b);
        }
        assert_eq!(lfn_checksum(b"FOO     BAR"), sum);
    }

    #[test]
    fn long_name_units_terminates_and_pads() {
        let units = long_name_units("document.txt"); // 12 chars -> one slot
        assert_eq!(units.len(), 1);
        assert_eq!(units[0][11], 't' as u16);
        assert_eq!(units[0][12], 0x0000);

        let units = long_name_units("exactlythirteen"); // 15 chars -> two slots
        assert_eq!(units.len(), 2);
        assert_eq!(units[1][1], 'n' as u16);
        assert_eq!(units[1][2], 0x0000);
        assert_eq!(units[1][12], 0xFFFF);
    }

    #[test]
    fn split_path_cases() {
        assert_eq!(split_path("/a/b"), ("/a", "b"));
        assert_eq!(split_path("/x"), ("/", "x"));
        assert_eq!(split_path("x"), (".", "x"));
        assert_eq!(split_path("a/b/c"), ("a/b", "c"));
    }
}
