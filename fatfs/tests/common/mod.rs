//! Shared fixtures: freshly formatted in-memory volumes of every variant.
#![allow(dead_code)]

use std::sync::Arc;

use fatfs::{format, FatType, FormatOptions, MemDevice, Volume};

pub fn volume_with(opts: &FormatOptions) -> (Arc<MemDevice>, Volume) {
    let blocks = opts.total_sectors * (opts.bytes_per_sector as u32 / 512);
    let dev = Arc::new(MemDevice::new(blocks));
    format(dev.clone(), opts).unwrap();
    let vol = Volume::mount(dev.clone()).unwrap();
    (dev, vol)
}

pub fn fat12_volume() -> (Arc<MemDevice>, Volume) {
    volume_with(&FormatOptions::new(FatType::Fat12, 2048))
}

/// 32 MiB FAT16 volume with two sectors per cluster.
pub fn fat16_volume() -> (Arc<MemDevice>, Volume) {
    let mut opts = FormatOptions::new(FatType::Fat16, 65536);
    opts.sectors_per_cluster = 2;
    volume_with(&opts)
}

pub fn fat32_volume() -> (Arc<MemDevice>, Volume) {
    volume_with(&FormatOptions::new(FatType::Fat32, 66600))
}

/// Walk a file's cluster chain through the public FAT accessors.
pub fn chain_of(vol: &mut Volume, first: u32) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut cluster = first;
    while cluster >= 2 && !fatfs::is_end_of_chain(cluster) {
        chain.push(cluster);
        cluster = vol.fat_get(cluster);
    }
    chain
}
