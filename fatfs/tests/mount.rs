//! Mount validation, geometry, sector-size support, durability.

mod common;

use std::sync::Arc;

use common::{fat16_volume, volume_with};
use fatfs::{FatType, FormatOptions, FsError, MemDevice, Volume};

#[test]
fn mounts_32_mib_fat16_image() {
    let (_dev, mut vol) = fat16_volume();

    assert_eq!(vol.fat_type(), FatType::Fat16);
    let layout = *vol.layout();
    assert_eq!(layout.bytes_per_sector, 512);
    assert_eq!(layout.sectors_per_cluster, 2);
    // ~65536 sectors at two per cluster, minus metadata.
    assert!(layout.total_clusters > 32_000 && layout.total_clusters < 32_768);
    assert_eq!(
        layout.data_start_sector,
        layout.root_dir_sector + layout.root_dir_sectors
    );

    // A freshly formatted volume lists exactly nothing.
    assert!(vol.list_dir("/").unwrap().is_empty());
    assert_eq!(vol.pwd(), "/");
}

#[test]
fn volume_label_is_trimmed() {
    let mut opts = FormatOptions::new(FatType::Fat12, 2048);
    opts.label = "DATA";
    let (_dev, vol) = volume_with(&opts);
    assert_eq!(vol.label(), "DATA");
}

#[test]
fn large_logical_sectors_round_trip() {
    for bps in [1024u16, 2048, 4096] {
        let mut opts = FormatOptions::new(FatType::Fat12, 1024);
        opts.bytes_per_sector = bps;
        let (_dev, mut vol) = volume_with(&opts);
        assert_eq!(vol.layout().bytes_per_sector, bps as usize);

        let data: Vec<u8> = (0..(bps as usize * 2 + 17)).map(|i| i as u8).collect();
        vol.write("/BLOB.BIN", &data).unwrap();
        let mut back = vec![0u8; data.len()];
        assert_eq!(vol.read("/BLOB.BIN", &mut back).unwrap(), data.len());
        assert_eq!(back, data, "bps {}", bps);
    }
}

#[test]
fn fat16_with_4096_byte_sectors() {
    let mut opts = FormatOptions::new(FatType::Fat16, 4400);
    opts.bytes_per_sector = 4096;
    let (_dev, mut vol) = volume_with(&opts);
    assert_eq!(vol.fat_type(), FatType::Fat16);

    vol.write("/F.TXT", b"sector size four kilobytes").unwrap();
    let mut buf = [0u8; 64];
    let n = vol.read("/F.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"sector size four kilobytes");
}

#[test]
fn rejects_blank_media() {
    let dev = Arc::new(MemDevice::new(64));
    assert!(Volume::mount(dev).is_err());
}

#[test]
fn rejects_unsupported_sector_size() {
    let dev = Arc::new(MemDevice::new(64));
    let mut boot = [0u8; 512];
    boot[11..13].copy_from_slice(&256u16.to_le_bytes());
    boot[13] = 1;
    boot[16] = 2;
    use fatfs::BlockDevice;
    dev.write_block(0, &boot).unwrap();
    assert_eq!(
        Volume::mount(dev).err(),
        Some(FsError::UnsupportedSectorSize)
    );
}

#[test]
fn rejects_invalid_bpb_fields() {
    let dev = Arc::new(MemDevice::new(64));
    let mut boot = [0u8; 512];
    boot[11..13].copy_from_slice(&512u16.to_le_bytes());
    boot[13] = 0; // sectors per cluster
    boot[16] = 2;
    use fatfs::BlockDevice;
    dev.write_block(0, &boot).unwrap();
    assert_eq!(Volume::mount(dev).err(), Some(FsError::InvalidBpb));
}

#[test]
fn changes_survive_remount() {
    let mut opts = FormatOptions::new(FatType::Fat12, 2048);
    opts.label = "PERSIST";
    let (dev, mut vol) = volume_with(&opts);

    vol.mkdir("/KEEP").unwrap();
    vol.write("/KEEP/NOTE.TXT", b"still here").unwrap();
    vol.unmount().unwrap();

    let mut vol = Volume::mount(dev).unwrap();
    assert_eq!(vol.label(), "PERSIST");
    let mut buf = [0u8; 32];
    let n = vol.read("/KEEP/NOTE.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"still here");
}

#[test]
fn info_reports_geometry_and_free_space() {
    let (_dev, mut vol) = fat16_volume();
    let before = vol.info();
    assert_eq!(before.fat_type, FatType::Fat16);
    assert_eq!(before.bytes_per_sector, 512);
    assert_eq!(before.free_clusters, before.total_clusters);

    vol.write("/X.BIN", &[0u8; 5000]).unwrap();
    let after = vol.info();
    assert!(after.free_clusters < before.free_clusters);
    assert_eq!(after.total_clusters, before.total_clusters);
}
