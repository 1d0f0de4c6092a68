//! Directory engine: enumeration, lookup, slot allocation and LFN writing.
//!
//! On-disk layout of a named entry, low address to high:
//! `lfn(N) .. lfn(2) lfn(1) short-entry`. Enumeration accumulates LFN slots
//! keyed by their order byte until the short entry arrives; the final slot
//! of a set (order bit 6) resets the accumulator.
//!
//! The FAT12/16 root directory is a fixed sector region that cannot grow;
//! every other directory is a cluster chain extended on demand.

use alloc::string::String;
use alloc::vec::Vec;

use crate::entry::{Attributes, DirEntryRaw, LfnEntryRaw, DIR_ENTRY_SIZE};
use crate::volume::Volume;
use crate::{
    is_end_of_chain, lfn_checksum, long_name_units, needs_lfn, short_name_key, FatType, FsError,
    LONG_NAME_LEN_CAP,
};

/// One directory listing entry: decoded presentation name plus the raw
/// short entry behind it.
#[derive(Debug, Clone)]
pub struct DirItem {
    pub name: String,
    pub entry: DirEntryRaw,
}

/// Position of one 32-byte directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPos {
    pub sector: u32,
    pub index: usize,
}

/// Sector run of one directory, plus what is needed to grow it.
struct DirSpan {
    sectors: Vec<u32>,
    /// Last cluster of the chain; `None` for the fixed root region.
    last_cluster: Option<u32>,
    fixed_root: bool,
}

/// Longest LFN set is 20 slots of 13 units.
const LFN_UNIT_BUF: usize = 20 * LONG_NAME_LEN_CAP;

fn decode_lfn(units: &[u16; LFN_UNIT_BUF]) -> String {
    let end = units
        .iter()
        .position(|&u| u == 0x0000 || u == 0xFFFF)
        .unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

impl Volume {
    /// Collect the sectors of a directory, in entry order.
    fn dir_span(&mut self, dir_cluster: u32) -> Result<DirSpan, FsError> {
        if dir_cluster == 0 && self.layout.fat_type != FatType::Fat32 {
            let first = self.layout.root_dir_sector;
            return Ok(DirSpan {
                sectors: (first..first + self.layout.root_dir_sectors).collect(),
                last_cluster: None,
                fixed_root: true,
            });
        }

        let mut cluster = dir_cluster;
        if cluster < 2 && self.layout.fat_type == FatType::Fat32 {
            cluster = self.layout.root_cluster;
        }

        let mut sectors = Vec::new();
        let mut last = cluster;
        // Bounded by the cluster count so a corrupt FAT cannot loop forever.
        let mut remaining = self.layout.total_clusters;
        while cluster >= 2 && !is_end_of_chain(cluster) && remaining > 0 {
            let first = self.layout.first_sector_of_cluster(cluster);
            for s in 0..self.layout.sectors_per_cluster {
                sectors.push(first + s);
            }
            last = cluster;
            cluster = self.fat.next_cluster(cluster);
            remaining -= 1;
        }

        Ok(DirSpan {
            sectors,
            last_cluster: Some(last),
            fixed_root: false,
        })
    }

    /// Enumerate a directory. Deleted slots and the volume-ID entry are
    /// skipped; enumeration stops at the first `0x00` entry. `.` and `..`
    /// are reported; presentation layers drop them as they see fit.
    pub fn read_dir(&mut self, dir_cluster: u32) -> Result<Vec<DirItem>, FsError> {
        let span = self.dir_span(dir_cluster)?;
        let entries_per_sector = self.layout.dir_entries_per_sector();

        let mut items = Vec::new();
        let mut lfn_units = [0u16; LFN_UNIT_BUF];
        let mut has_lfn = false;

        'sectors: for &sector in &span.sectors {
            self.read_sector_buf(sector)?;
            for i in 0..entries_per_sector {
                let raw = DirEntryRaw::from_bytes(&self.sector_buf[i * DIR_ENTRY_SIZE..]);
                if raw.is_end() {
                    break 'sectors;
                }
                if raw.is_deleted() {
                    continue;
                }
                if raw.is_lfn() {
                    let lfn = LfnEntryRaw::from_bytes(raw.as_bytes());
                    let ord = lfn.ordinal();
                    if ord == 0 || ord > LFN_UNIT_BUF / LONG_NAME_LEN_CAP {
                        continue;
                    }
                    if lfn.is_last() {
                        lfn_units.fill(0);
                        has_lfn = true;
                    }
                    let at = (ord - 1) * LONG_NAME_LEN_CAP;
                    lfn_units[at..at + LONG_NAME_LEN_CAP].copy_from_slice(&lfn.units());
                    continue;
                }
                if raw.is_volume_id() {
                    continue;
                }

                let name = if has_lfn {
                    has_lfn = false;
                    decode_lfn(&lfn_units)
                } else {
                    raw.short_name()
                };
                items.push(DirItem { name, entry: raw });
            }
        }
        Ok(items)
    }

    /// Case-insensitive lookup of `name` (long or short form) in one
    /// directory.
    pub(crate) fn find_in_dir(
        &mut self,
        dir_cluster: u32,
        name: &str,
    ) -> Result<Option<DirEntryRaw>, FsError> {
        let items = self.read_dir(dir_cluster)?;
        Ok(items
            .into_iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
            .map(|item| item.entry))
    }

    /// Find `count` consecutive free slots (first byte `0x00` or `0xE5`),
    /// growing the directory by one zeroed cluster when the chain runs out.
    /// `Ok(None)` means the fixed root region is full, or no cluster was
    /// free to grow into.
    pub(crate) fn find_empty_slots(
        &mut self,
        dir_cluster: u32,
        count: usize,
    ) -> Result<Option<Vec<SlotPos>>, FsError> {
        let entries_per_sector = self.layout.dir_entries_per_sector();
        loop {
            let span = self.dir_span(dir_cluster)?;
            let mut run: Vec<SlotPos> = Vec::with_capacity(count);

            for &sector in &span.sectors {
                self.read_sector_buf(sector)?;
                for i in 0..entries_per_sector {
                    let raw = DirEntryRaw::from_bytes(&self.sector_buf[i * DIR_ENTRY_SIZE..]);
                    if raw.is_free() {
                        run.push(SlotPos { sector, index: i });
                        if run.len() == count {
                            return Ok(Some(run));
                        }
                    } else {
                        run.clear();
                    }
                }
            }

            if span.fixed_root {
                return Ok(None);
            }

            let new_cluster = match self.fat.alloc() {
                Some(c) => c,
                None => return Ok(None),
            };
            let last = span.last_cluster.unwrap_or(dir_cluster);
            self.fat.set(last, new_cluster)?;
            self.fat.flush()?;
            // Rescan; the run may now continue into the appended cluster.
        }
    }

    /// Read-modify-write one directory slot.
    pub(crate) fn write_slot(
        &mut self,
        pos: SlotPos,
        bytes: &[u8; DIR_ENTRY_SIZE],
    ) -> Result<(), FsError> {
        self.read_sector_buf(pos.sector)?;
        let off = pos.index * DIR_ENTRY_SIZE;
        self.sector_buf[off..off + DIR_ENTRY_SIZE].copy_from_slice(bytes);
        self.write_sector_buf(pos.sector)
    }

    /// Insert a named entry into a directory: LFN slots in descending
    /// ordinal order when the name needs them, then the short entry,
    /// committed by a dedicated final write to its recorded slot.
    pub(crate) fn create_entry(
        &mut self,
        dir_cluster: u32,
        name: &str,
        attr: Attributes,
        first_cluster: u32,
    ) -> Result<SlotPos, FsError> {
        let key = short_name_key(name);
        let entry = DirEntryRaw::new(&key, attr, first_cluster);

        if needs_lfn(name) {
            let units = long_name_units(name);
            let lfn_count = units.len();
            let slots = self
                .find_empty_slots(dir_cluster, lfn_count + 1)?
                .ok_or(FsError::DirectoryFull)?;

            let checksum = lfn_checksum(&key);
            for (i, slot_pos) in slots[..lfn_count].iter().enumerate() {
                let ordinal = (lfn_count - i) as u8;
                let slot = LfnEntryRaw::new(
                    ordinal,
                    i == 0,
                    &units[ordinal as usize - 1],
                    checksum,
                );
                self.write_slot(*slot_pos, slot.as_bytes())?;
            }

            let short_pos = slots[lfn_count];
            self.write_slot(short_pos, entry.as_bytes())?;
            Ok(short_pos)
        } else {
            let slots = self
                .find_empty_slots(dir_cluster, 1)?
                .ok_or(FsError::DirectoryFull)?;
            self.write_slot(slots[0], entry.as_bytes())?;
            Ok(slots[0])
        }
    }

    /// Locate the short entry with the exact 11-byte key and patch it in
    /// place. Returns whether a matching entry was found.
    pub(crate) fn patch_entry_by_key(
        &mut self,
        dir_cluster: u32,
        key: &[u8; 11],
        patch: impl FnOnce(&mut DirEntryRaw),
    ) -> Result<bool, FsError> {
        let span = self.dir_span(dir_cluster)?;
        let entries_per_sector = self.layout.dir_entries_per_sector();

        for &sector in &span.sectors {
            self.read_sector_buf(sector)?;
            for i in 0..entries_per_sector {
                let off = i * DIR_ENTRY_SIZE;
                let mut raw = DirEntryRaw::from_bytes(&self.sector_buf[off..]);
                if raw.is_deleted() || raw.is_lfn() {
                    continue;
                }
                if raw.name_key() == *key {
                    patch(&mut raw);
                    self.sector_buf[off..off + DIR_ENTRY_SIZE].copy_from_slice(raw.as_bytes());
                    self.write_sector_buf(sector)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
