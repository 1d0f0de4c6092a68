//! FAT engine invariants: round trips, the FAT12 sector straddle, and the
//! alloc/free balance.

mod common;

use common::{fat12_volume, fat16_volume, fat32_volume, volume_with};
use fatfs::{FatType, FormatOptions, Volume, EOC_SENTINEL};

fn round_trip(vol: &mut Volume, cluster: u32, value: u32) {
    vol.fat_set(cluster, value).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(cluster), value, "cluster {}", cluster);
}

#[test]
fn fat12_set_flush_get_round_trip() {
    let (_dev, mut vol) = fat12_volume();
    round_trip(&mut vol, 2, 0x123);
    round_trip(&mut vol, 3, 0xABC);
    // Adjacent entries share a byte; writing one must not clobber the other.
    assert_eq!(vol.fat_get(2), 0x123);

    // Every EOC encoding normalizes to the sentinel.
    vol.fat_set(4, 0xFF8).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(4), EOC_SENTINEL);
    vol.fat_set(5, 0xFFF).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(5), EOC_SENTINEL);
}

#[test]
fn fat12_entry_straddling_sector_boundary() {
    let (dev, mut vol) = fat12_volume();
    // With 512-byte sectors, cluster 341's entry occupies FAT bytes
    // 511..=512: the last byte of the first FAT sector and the first byte
    // of the second.
    let c = 341;
    assert_eq!(c + c / 2, 511);

    vol.fat_set(340, 0x111).unwrap();
    vol.fat_set(c, 0x5A5).unwrap();
    vol.fat_set(342, 0x222).unwrap();
    vol.fat_flush().unwrap();

    assert_eq!(vol.fat_get(340), 0x111);
    assert_eq!(vol.fat_get(c), 0x5A5);
    assert_eq!(vol.fat_get(342), 0x222);

    // Survives a cold cache: remount and read again.
    drop(vol);
    let mut vol = Volume::mount(dev).unwrap();
    assert_eq!(vol.fat_get(c), 0x5A5);
    assert_eq!(vol.fat_get(340), 0x111);
    assert_eq!(vol.fat_get(342), 0x222);
}

#[test]
fn fat12_boundary_straddle_with_1024_byte_sectors() {
    let mut opts = FormatOptions::new(FatType::Fat12, 2048);
    opts.bytes_per_sector = 1024;
    let (_dev, mut vol) = volume_with(&opts);

    // 682 * 1.5 = 1023: entry bytes 1023..=1024 straddle the boundary.
    let c = 682;
    assert_eq!(c + c / 2, 1023);
    vol.fat_set(c, 0x7E7).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(c), 0x7E7);
}

#[test]
fn fat16_round_trip_and_eoc() {
    let (_dev, mut vol) = fat16_volume();
    round_trip(&mut vol, 2, 0x1234);
    round_trip(&mut vol, 9, 0x00FE);

    vol.fat_set(3, 0xFFF8).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(3), EOC_SENTINEL);
}

#[test]
fn fat32_round_trip_preserves_reserved_bits() {
    let (_dev, mut vol) = fat32_volume();
    round_trip(&mut vol, 7, 0x0ABC_DEF0);

    // The top nibble of the stored dword must survive a 28-bit write.
    vol.fat_set(8, 0x0000_0005).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(8), 5);

    vol.fat_set(9, 0x0FFF_FFF8).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.fat_get(9), EOC_SENTINEL);
}

#[test]
fn alloc_then_free_restores_balance() {
    let (_dev, mut vol) = fat12_volume();
    let before = vol.count_free_clusters();

    let mut allocated = Vec::new();
    for _ in 0..5 {
        allocated.push(vol.alloc_cluster().expect("cluster available"));
    }
    assert_eq!(vol.count_free_clusters(), before - 5);

    // Fresh allocations carry the variant's EOC mark.
    for &c in &allocated {
        assert_eq!(vol.fat_get(c), EOC_SENTINEL);
    }

    for &c in &allocated {
        vol.fat_set(c, 0).unwrap();
    }
    vol.fat_flush().unwrap();
    assert_eq!(vol.count_free_clusters(), before);
}

#[test]
fn alloc_is_first_fit_from_cluster_two() {
    let (_dev, mut vol) = fat16_volume();
    assert_eq!(vol.alloc_cluster(), Some(2));
    assert_eq!(vol.alloc_cluster(), Some(3));
    vol.fat_set(2, 0).unwrap();
    vol.fat_flush().unwrap();
    assert_eq!(vol.alloc_cluster(), Some(2));
}
