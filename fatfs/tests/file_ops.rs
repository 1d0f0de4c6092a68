//! File operation scenarios: create, write, read, remove.

mod common;

use common::{chain_of, fat12_volume, fat16_volume, fat32_volume};
use fatfs::{FsError, EOC_SENTINEL};

#[test]
fn touch_write_read_small_file() {
    let (_dev, mut vol) = fat16_volume();

    vol.touch("/A.TXT").unwrap();
    vol.write("/A.TXT", b"hello").unwrap();

    let mut buf = [0u8; 32];
    let n = vol.read("/A.TXT", &mut buf).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf[..5], b"hello");

    let stat = vol.stat("/A.TXT").unwrap();
    assert_eq!(stat.size, 5);
    assert!(!stat.is_dir);
    // Fresh volume: the write grabs the lowest free cluster.
    assert_eq!(stat.first_cluster, 2);
}

#[test]
fn touch_existing_file_is_a_no_op() {
    let (_dev, mut vol) = fat16_volume();
    vol.write("/KEEP.DAT", b"payload").unwrap();
    vol.touch("/KEEP.DAT").unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(vol.read("/KEEP.DAT", &mut buf).unwrap(), 7);
    assert_eq!(&buf[..7], b"payload");
}

#[test]
fn empty_file_has_no_chain() {
    let (_dev, mut vol) = fat16_volume();
    let free = vol.count_free_clusters();

    vol.touch("/E.TXT").unwrap();
    let mut buf = [0u8; 64];
    assert_eq!(vol.read("/E.TXT", &mut buf).unwrap(), 0);

    let stat = vol.stat("/E.TXT").unwrap();
    assert_eq!(stat.size, 0);
    assert_eq!(stat.first_cluster, 0);
    assert_eq!(vol.count_free_clusters(), free);
}

#[test]
fn multi_cluster_chain_links_in_order() {
    let (_dev, mut vol) = fat16_volume();
    let cluster_size = vol.layout().cluster_size();

    // Three full clusters plus one byte: chain length must be 4.
    let size = 3 * cluster_size + 1;
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    vol.write("/BIG", &data).unwrap();

    let first = vol.stat("/BIG").unwrap().first_cluster;
    let chain = chain_of(&mut vol, first);
    assert_eq!(chain.len(), 4);
    // First-fit allocation on a fresh volume yields consecutive clusters,
    // each linking to the next; the last carries the EOC mark.
    for pair in chain.windows(2) {
        assert_eq!(vol.fat_get(pair[0]), pair[1]);
    }
    assert_eq!(vol.fat_get(*chain.last().unwrap()), EOC_SENTINEL);

    let mut back = vec![0u8; size];
    assert_eq!(vol.read("/BIG", &mut back).unwrap(), size);
    assert_eq!(back, data);
}

#[test]
fn rewrite_does_not_leak_clusters() {
    let (_dev, mut vol) = fat16_volume();
    let cluster_size = vol.layout().cluster_size();
    let before = vol.count_free_clusters();

    let data = vec![0x5Au8; 2 * cluster_size + 10];
    let used = (data.len() + cluster_size - 1) / cluster_size;

    vol.write("/R.BIN", &data).unwrap();
    assert_eq!(vol.count_free_clusters(), before - used as u32);

    // Rewriting the same contents must not consume additional clusters.
    vol.write("/R.BIN", &data).unwrap();
    assert_eq!(vol.count_free_clusters(), before - used as u32);

    let mut back = vec![0u8; data.len()];
    vol.read("/R.BIN", &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn truncate_to_zero_releases_chain() {
    let (_dev, mut vol) = fat16_volume();
    let before = vol.count_free_clusters();

    vol.write("/T.BIN", &[1u8; 5000]).unwrap();
    assert!(vol.count_free_clusters() < before);

    vol.write("/T.BIN", &[]).unwrap();
    let stat = vol.stat("/T.BIN").unwrap();
    assert_eq!(stat.size, 0);
    assert_eq!(stat.first_cluster, 0);
    assert_eq!(vol.count_free_clusters(), before);
}

#[test]
fn rm_zeroes_chain_and_marks_entry_deleted() {
    let (dev, mut vol) = fat16_volume();
    let before = vol.count_free_clusters();

    vol.write("/TEMP", &[7u8; 3000]).unwrap();
    let first = vol.stat("/TEMP").unwrap().first_cluster;
    let chain = chain_of(&mut vol, first);
    assert!(!chain.is_empty());

    vol.rm("/TEMP").unwrap();
    for &c in &chain {
        assert_eq!(vol.fat_get(c), 0, "cluster {} still allocated", c);
    }
    assert!(!vol.exists("/TEMP"));
    assert_eq!(vol.count_free_clusters(), before);

    // The short entry's first byte must be the 0xE5 tombstone on disk.
    let root_sector = vol.layout().root_dir_sector;
    let mut raw = [0u8; 512];
    use fatfs::BlockDevice;
    dev.read_block(root_sector, &mut raw).unwrap();
    assert_eq!(raw[0], 0xE5);
}

#[test]
fn write_into_subdirectory() {
    let (_dev, mut vol) = fat32_volume();
    vol.mkdir("/DATA").unwrap();
    vol.write("/DATA/LOG.TXT", b"line one\n").unwrap();

    let mut buf = [0u8; 32];
    let n = vol.read("/DATA/LOG.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"line one\n");
}

#[test]
fn read_caps_at_buffer_length() {
    let (_dev, mut vol) = fat12_volume();
    vol.write("/CAP.TXT", b"0123456789").unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(vol.read("/CAP.TXT", &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
}

#[test]
fn error_paths() {
    let (_dev, mut vol) = fat16_volume();
    vol.mkdir("/D").unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(vol.read("/MISSING", &mut buf), Err(FsError::NotFound));
    assert_eq!(vol.read("/D", &mut buf), Err(FsError::IsADirectory));
    assert_eq!(vol.write("/D", b"x"), Err(FsError::IsADirectory));
    assert_eq!(vol.touch("/D"), Err(FsError::IsADirectory));
    assert_eq!(vol.touch("/bad|name"), Err(FsError::InvalidName));
    assert_eq!(vol.rm("/MISSING"), Err(FsError::NotFound));
}

#[test]
fn disk_full_write_rolls_back() {
    // Tiny FAT12 volume so a large write exhausts the free clusters.
    let mut opts = fatfs::FormatOptions::new(fatfs::FatType::Fat12, 256);
    opts.root_entries = 64;
    let (_dev, mut vol) = common::volume_with(&opts);

    let free = vol.count_free_clusters();
    let cluster_size = vol.layout().cluster_size();
    let too_big = vec![0xAAu8; (free as usize + 4) * cluster_size];

    assert_eq!(vol.write("/HUGE.BIN", &too_big), Err(FsError::DiskFull));
    // The partial chain was unwound and the created entry removed again.
    assert_eq!(vol.count_free_clusters(), free);
    assert!(!vol.exists("/HUGE.BIN"));
}
