//! Blank-filesystem formatter.
//!
//! Writes a conforming boot sector, both FAT copies with their reserved
//! entries, and an empty root directory. Exists so the test suites and the
//! host tooling can fabricate images of every variant and sector size; the
//! driver must mount what this produces.

use alloc::sync::Arc;
use alloc::vec;

use crate::bpb::{fat_type_for, FatType};
use crate::device::{BlockDevice, SectorIo};
use crate::{FsError, SPACE};

#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Volume size in logical sectors.
    pub total_sectors: u32,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    /// Requested variant; formatting fails if the geometry lands the
    /// cluster count in a different variant's range.
    pub fat_type: FatType,
    /// Root directory capacity for FAT12/16 (ignored on FAT32).
    pub root_entries: u16,
    pub volume_id: u32,
    pub label: &'static str,
}

impl FormatOptions {
    pub fn new(fat_type: FatType, total_sectors: u32) -> Self {
        Self {
            total_sectors,
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            fat_type,
            root_entries: 512,
            volume_id: 0x1234_5678,
            label: "NO NAME",
        }
    }
}

struct Geometry {
    reserved: u32,
    root_entries: u32,
    root_dir_sectors: u32,
    fat_size: u32,
}

fn compute_geometry(opts: &FormatOptions) -> Result<Geometry, FsError> {
    let bps = opts.bytes_per_sector as u32;
    match bps {
        512 | 1024 | 2048 | 4096 => {}
        _ => return Err(FsError::UnsupportedSectorSize),
    }
    if opts.sectors_per_cluster == 0 || opts.total_sectors == 0 {
        return Err(FsError::InvalidBpb);
    }

    let reserved: u32 = match opts.fat_type {
        FatType::Fat32 => 32,
        _ => 1,
    };
    let root_entries: u32 = match opts.fat_type {
        FatType::Fat32 => 0,
        _ => opts.root_entries as u32,
    };
    let root_dir_sectors = (root_entries * 32 + bps - 1) / bps;

    // Fixed-point iteration: a larger FAT shrinks the data region, which
    // shrinks the FAT again.
    let mut fat_size = 1u32;
    let clusters = loop {
        let data_start = reserved + 2 * fat_size + root_dir_sectors;
        if opts.total_sectors <= data_start {
            return Err(FsError::InvalidBpb);
        }
        let clusters = (opts.total_sectors - data_start) / opts.sectors_per_cluster as u32;
        let entries = clusters + 2;
        let bytes = match opts.fat_type {
            FatType::Fat12 => (entries * 3 + 1) / 2,
            FatType::Fat16 => entries * 2,
            FatType::Fat32 => entries * 4,
        };
        let needed = (bytes + bps - 1) / bps;
        if needed <= fat_size {
            break clusters;
        }
        fat_size = needed;
    };

    if fat_type_for(clusters) != opts.fat_type {
        return Err(FsError::InvalidBpb);
    }

    Ok(Geometry {
        reserved,
        root_entries,
        root_dir_sectors,
        fat_size,
    })
}

fn label_bytes(label: &str) -> [u8; 11] {
    let mut out = [SPACE; 11];
    for (i, b) in label.bytes().take(11).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    out
}

/// Write a blank filesystem onto `device`.
pub fn format(device: Arc<dyn BlockDevice>, opts: &FormatOptions) -> Result<(), FsError> {
    let geo = compute_geometry(opts)?;
    let bps = opts.bytes_per_sector as usize;
    let io = SectorIo::new(device, bps);

    // Boot sector.
    let mut boot = vec![0u8; bps];
    boot[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    boot[3..11].copy_from_slice(b"FATFSRS ");
    boot[11..13].copy_from_slice(&opts.bytes_per_sector.to_le_bytes());
    boot[13] = opts.sectors_per_cluster;
    boot[14..16].copy_from_slice(&(geo.reserved as u16).to_le_bytes());
    boot[16] = 2; // number of FATs
    boot[17..19].copy_from_slice(&(geo.root_entries as u16).to_le_bytes());
    if opts.fat_type != FatType::Fat32 && opts.total_sectors < 0x1_0000 {
        boot[19..21].copy_from_slice(&(opts.total_sectors as u16).to_le_bytes());
    } else {
        boot[32..36].copy_from_slice(&opts.total_sectors.to_le_bytes());
    }
    boot[21] = 0xF8; // media descriptor: fixed disk
    boot[24..26].copy_from_slice(&32u16.to_le_bytes()); // sectors per track
    boot[26..28].copy_from_slice(&64u16.to_le_bytes()); // heads

    let label = label_bytes(opts.label);
    match opts.fat_type {
        FatType::Fat32 => {
            boot[36..40].copy_from_slice(&geo.fat_size.to_le_bytes());
            boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
            boot[48..50].copy_from_slice(&1u16.to_le_bytes()); // FSInfo sector
            boot[64] = 0x80;
            boot[66] = 0x29;
            boot[67..71].copy_from_slice(&opts.volume_id.to_le_bytes());
            boot[71..82].copy_from_slice(&label);
            boot[82..90].copy_from_slice(b"FAT32   ");
        }
        _ => {
            boot[22..24].copy_from_slice(&(geo.fat_size as u16).to_le_bytes());
            boot[36] = 0x80;
            boot[38] = 0x29;
            boot[39..43].copy_from_slice(&opts.volume_id.to_le_bytes());
            boot[43..54].copy_from_slice(&label);
            boot[54..62].copy_from_slice(match opts.fat_type {
                FatType::Fat12 => b"FAT12   ",
                _ => b"FAT16   ",
            });
        }
    }
    boot[510] = 0x55;
    boot[511] = 0xAA;
    io.write_sector(0, &boot)?;

    // Both FAT copies, zeroed, with the reserved entries 0 and 1 (and the
    // FAT32 root-cluster EOC) in the first sector.
    let zeros = vec![0u8; bps];
    let mut fat_first = vec![0u8; bps];
    match opts.fat_type {
        FatType::Fat12 => fat_first[0..3].copy_from_slice(&[0xF8, 0xFF, 0xFF]),
        FatType::Fat16 => fat_first[0..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]),
        FatType::Fat32 => {
            fat_first[0..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0x0F]);
            fat_first[4..8].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0x0F]);
            // Root directory chain: cluster 2, single-cluster, EOC.
            fat_first[8..12].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0x0F]);
        }
    }
    for copy in 0..2u32 {
        let start = geo.reserved + copy * geo.fat_size;
        io.write_sector(start, &fat_first)?;
        for s in 1..geo.fat_size {
            io.write_sector(start + s, &zeros)?;
        }
    }

    // Empty root directory.
    let root_dir_sector = geo.reserved + 2 * geo.fat_size;
    match opts.fat_type {
        FatType::Fat32 => {
            // Root cluster 2 sits at the start of the data region.
            for s in 0..opts.sectors_per_cluster as u32 {
                io.write_sector(root_dir_sector + s, &zeros)?;
            }
        }
        _ => {
            for s in 0..geo.root_dir_sectors {
                io.write_sector(root_dir_sector + s, &zeros)?;
            }
        }
    }

    Ok(())
}
