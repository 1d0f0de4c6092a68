//! The mounted volume: owns the device handle, the derived layout, the FAT
//! engine and the navigation state.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error};

use crate::bpb::{BootSector, FatType, VolumeLayout};
use crate::device::{BlockDevice, SectorIo, BLOCK_SIZE};
use crate::fat::FatTable;
use crate::{trimmed_label, FsError};

pub struct Volume {
    pub(crate) io: SectorIo,
    pub(crate) layout: VolumeLayout,
    pub(crate) fat: FatTable,
    pub(crate) label: String,
    pub(crate) current_cluster: u32,
    pub(crate) current_path: String,
    pub(crate) sector_buf: Vec<u8>,
}

impl Volume {
    /// Mount the filesystem found at LBA 0 of `device`.
    ///
    /// Validates the BPB (sector size first, then the structural fields),
    /// derives the layout, determines the FAT variant from the cluster
    /// count, and positions the current directory at the root. The FAT
    /// cache starts invalid.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut boot = [0u8; BLOCK_SIZE];
        if device.read_block(0, &mut boot).is_err() {
            error!("failed to read boot sector");
            return Err(FsError::Io);
        }

        let bs = BootSector::parse(&boot).map_err(|e| {
            error!("{}", e);
            e
        })?;
        let layout = VolumeLayout::from_boot_sector(&bs)?;

        let io = SectorIo::new(device, layout.bytes_per_sector);
        let mut sector_buf = vec![0u8; layout.bytes_per_sector];

        // Extend to a full logical sector when the filesystem's native
        // sector is larger than a raw block.
        if layout.bytes_per_sector > BLOCK_SIZE {
            sector_buf[..BLOCK_SIZE].copy_from_slice(&boot);
            for i in 1..(layout.bytes_per_sector / BLOCK_SIZE) as u32 {
                let off = i as usize * BLOCK_SIZE;
                if io
                    .device()
                    .read_block(i, &mut sector_buf[off..off + BLOCK_SIZE])
                    .is_err()
                {
                    error!("failed to read full boot sector");
                    return Err(FsError::Io);
                }
            }
        }

        let label = match layout.fat_type {
            FatType::Fat32 => trimmed_label(&bs.label_32),
            _ => trimmed_label(&bs.label_16),
        };

        let fat = FatTable::new(io.clone(), layout);
        let current_cluster = layout.root_dir_cluster();

        debug!(
            "mounted {} volume: {} clusters, {} bytes/sector",
            layout.fat_type, layout.total_clusters, layout.bytes_per_sector
        );

        Ok(Self {
            io,
            layout,
            fat,
            label,
            current_cluster,
            current_path: String::from("/"),
            sector_buf,
        })
    }

    /// Flush pending FAT changes and consume the volume.
    pub fn unmount(mut self) -> Result<(), FsError> {
        self.fat.flush()
    }

    /// Flush the FAT cache without unmounting.
    pub fn flush(&mut self) -> Result<(), FsError> {
        self.fat.flush()
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn fat_type(&self) -> FatType {
        self.layout.fat_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn current_cluster(&self) -> u32 {
        self.current_cluster
    }

    /// Cluster number addressing the root directory in lookups: the FAT32
    /// root cluster, or the sentinel 0 for the fixed FAT12/16 root region.
    pub(crate) fn root_lookup_cluster(&self) -> u32 {
        self.layout.root_dir_cluster()
    }

    /// Free-cluster count from a full FAT scan.
    pub fn count_free_clusters(&mut self) -> u32 {
        self.fat.count_free()
    }

    /// Read a FAT entry (normalized; see [`FatTable::get`]).
    pub fn fat_get(&mut self, cluster: u32) -> u32 {
        self.fat.get(cluster)
    }

    /// Write a FAT entry (see [`FatTable::set`]).
    pub fn fat_set(&mut self, cluster: u32, value: u32) -> Result<(), FsError> {
        self.fat.set(cluster, value)
    }

    /// Flush the FAT cache.
    pub fn fat_flush(&mut self) -> Result<(), FsError> {
        self.fat.flush()
    }

    /// Allocate one zeroed cluster marked end-of-chain.
    pub fn alloc_cluster(&mut self) -> Option<u32> {
        self.fat.alloc()
    }

    pub(crate) fn read_sector_buf(&mut self, sector: u32) -> Result<(), FsError> {
        self.io.read_sector(sector, &mut self.sector_buf)?;
        Ok(())
    }

    pub(crate) fn write_sector_buf(&mut self, sector: u32) -> Result<(), FsError> {
        self.io.write_sector(sector, &self.sector_buf)?;
        Ok(())
    }
}
