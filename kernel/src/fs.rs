//! The process-wide mounted volume.
//!
//! Exactly one volume is mounted at a time; mounting another implicitly
//! unmounts (and flushes) the first. Everything that touches the filesystem
//! from syscall or loader context goes through [`with_volume`].

use alloc::sync::Arc;

use fatfs::{BlockDevice, FsError, Volume};
use lazy_static::lazy_static;
use log::error;
use spin::Mutex;

pub struct MountedVolume {
    pub drive: u8,
    pub volume: Volume,
}

lazy_static! {
    static ref MOUNTED: Mutex<Option<MountedVolume>> = Mutex::new(None);
}

/// Mount the filesystem on an arbitrary block device.
pub fn mount_device(device: Arc<dyn BlockDevice>, drive: u8) -> Result<(), FsError> {
    // Implicit unmount of the previous volume happens first, flushing its
    // FAT cache, whether or not the new mount succeeds.
    if let Some(old) = MOUNTED.lock().take() {
        let _ = old.volume.unmount();
    }

    let volume = Volume::mount(device)?;
    *MOUNTED.lock() = Some(MountedVolume { drive, volume });
    Ok(())
}

/// Mount one of the ATA drives.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn mount(drive: u8) -> Result<(), FsError> {
    use crate::drivers::ata;

    ata::init();
    let device = ata::AtaDrive::open(drive).ok_or_else(|| {
        error!("Drive not found");
        FsError::NotFound
    })?;
    mount_device(device, drive)
}

/// Flush and drop the mounted volume.
pub fn unmount() -> Result<(), FsError> {
    match MOUNTED.lock().take() {
        Some(mounted) => mounted.volume.unmount(),
        None => Ok(()),
    }
}

pub fn is_mounted() -> bool {
    MOUNTED.lock().is_some()
}

pub fn mounted_drive() -> Option<u8> {
    MOUNTED.lock().as_ref().map(|m| m.drive)
}

/// Run `f` against the mounted volume; `None` when nothing is mounted.
pub fn with_volume<R>(f: impl FnOnce(&mut Volume) -> R) -> Option<R> {
    let mut guard = MOUNTED.lock();
    match guard.as_mut() {
        Some(mounted) => Some(f(&mut mounted.volume)),
        None => {
            error!("No filesystem mounted");
            None
        }
    }
}
