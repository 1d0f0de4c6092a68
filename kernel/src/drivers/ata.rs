//! ATA PIO driver: two channels, master and slave each, 28-bit LBA, one
//! sector per command.
//!
//! All waits are bounded status polls; there is no interrupt path. Every
//! written sector is followed by a CACHE_FLUSH command. Drives are
//! identified once at init; positions answering with non-ATA signature
//! bytes (ATAPI/SATA) are treated as absent.

use alloc::string::String;
use alloc::sync::Arc;

use fatfs::{BlockDevice, DeviceError};
use lazy_static::lazy_static;
use log::info;
use spin::Mutex;

use super::port::{PortByte, PortWord};

const ATA_PRIMARY_IO: u16 = 0x1F0;
const ATA_PRIMARY_CTRL: u16 = 0x3F6;
const ATA_SECONDARY_IO: u16 = 0x170;
const ATA_SECONDARY_CTRL: u16 = 0x376;

// Status register bits.
const ATA_SR_BSY: u8 = 0x80;
const ATA_SR_DF: u8 = 0x20;
const ATA_SR_DRQ: u8 = 0x08;
const ATA_SR_ERR: u8 = 0x01;

// Commands.
const ATA_CMD_READ_PIO: u8 = 0x20;
const ATA_CMD_WRITE_PIO: u8 = 0x30;
const ATA_CMD_CACHE_FLUSH: u8 = 0xE7;
const ATA_CMD_IDENTIFY: u8 = 0xEC;

/// Bounded busy-wait budget for BSY/DRQ polling.
const POLL_BUDGET: u32 = 100_000;

const WORDS_PER_SECTOR: usize = 256;

struct Channel {
    data: PortWord,
    features: PortByte,
    sector_count: PortByte,
    lba_low: PortByte,
    lba_mid: PortByte,
    lba_high: PortByte,
    drive_head: PortByte,
    status_cmd: PortByte,
    ctrl: PortByte,
}

impl Channel {
    const fn new(io_base: u16, ctrl_base: u16) -> Self {
        Self {
            data: PortWord::new(io_base),
            features: PortByte::new(io_base + 1),
            sector_count: PortByte::new(io_base + 2),
            lba_low: PortByte::new(io_base + 3),
            lba_mid: PortByte::new(io_base + 4),
            lba_high: PortByte::new(io_base + 5),
            drive_head: PortByte::new(io_base + 6),
            status_cmd: PortByte::new(io_base + 7),
            ctrl: PortByte::new(ctrl_base),
        }
    }

    /// ~400ns settle delay: four alternate-status reads.
    fn io_wait(&self) {
        for _ in 0..4 {
            unsafe {
                self.ctrl.read();
            }
        }
    }

    fn status(&self) -> u8 {
        unsafe { self.status_cmd.read() }
    }

    fn soft_reset(&self) {
        unsafe {
            self.ctrl.write(0x04);
            self.io_wait();
            self.ctrl.write(0x00);
            self.io_wait();
        }
    }

    fn wait_bsy_clear(&self) -> Result<(), DeviceError> {
        for _ in 0..POLL_BUDGET {
            if self.status() & ATA_SR_BSY == 0 {
                return Ok(());
            }
        }
        Err(DeviceError::Timeout)
    }

    fn wait_drq(&self) -> Result<(), DeviceError> {
        for _ in 0..POLL_BUDGET {
            let status = self.status();
            if status & (ATA_SR_ERR | ATA_SR_DF) != 0 {
                return Err(DeviceError::DeviceFault);
            }
            if status & ATA_SR_DRQ != 0 {
                return Ok(());
            }
        }
        Err(DeviceError::Timeout)
    }

    /// Post-command poll: settle, wait out BSY, fail on ERR/DF.
    fn poll(&self) -> Result<(), DeviceError> {
        self.io_wait();
        self.wait_bsy_clear()?;
        if self.status() & (ATA_SR_ERR | ATA_SR_DF) != 0 {
            return Err(DeviceError::DeviceFault);
        }
        Ok(())
    }

    /// Select a drive and program a 28-bit LBA transfer.
    fn setup(&self, slave: u8, lba: u32, count: u8, command: u8) -> Result<(), DeviceError> {
        self.wait_bsy_clear()?;
        unsafe {
            self.drive_head
                .write(0xE0 | (slave << 4) | ((lba >> 24) as u8 & 0x0F));
        }
        self.io_wait();
        unsafe {
            self.features.write(0x00);
            self.sector_count.write(count);
            self.lba_low.write(lba as u8);
            self.lba_mid.write((lba >> 8) as u8);
            self.lba_high.write((lba >> 16) as u8);
            self.status_cmd.write(command);
        }
        Ok(())
    }
}

/// Everything IDENTIFY tells us about one drive position.
#[derive(Debug, Clone)]
pub struct DriveInfo {
    pub channel: u8,
    pub slave: u8,
    pub model: String,
    /// Addressable sectors (28-bit count, or the truncated 48-bit count).
    pub sectors: u32,
}

/// Model string words are byte-swapped on the wire; trailing spaces are
/// padding.
pub fn decode_model(identify: &[u16]) -> String {
    let mut model = String::with_capacity(40);
    for &word in &identify[27..47] {
        model.push((word >> 8) as u8 as char);
        model.push((word & 0xFF) as u8 as char);
    }
    while model.ends_with(' ') || model.ends_with('\0') {
        model.pop();
    }
    model
}

/// Sector count from the identify block: words 100+ when the 48-bit
/// feature bit (word 83, bit 10) is set, words 60-61 otherwise.
pub fn decode_sector_count(identify: &[u16]) -> u32 {
    let command_sets = ((identify[83] as u32) << 16) | identify[82] as u32;
    if command_sets & (1 << 26) != 0 {
        ((identify[103] as u32) << 16) | identify[102] as u32
    } else {
        ((identify[61] as u32) << 16) | identify[60] as u32
    }
}

struct Ata {
    channels: [Channel; 2],
    drives: [Option<DriveInfo>; 4],
    initialized: bool,
}

impl Ata {
    const fn new() -> Self {
        Self {
            channels: [
                Channel::new(ATA_PRIMARY_IO, ATA_PRIMARY_CTRL),
                Channel::new(ATA_SECONDARY_IO, ATA_SECONDARY_CTRL),
            ],
            drives: [None, None, None, None],
            initialized: false,
        }
    }

    fn identify(&mut self, channel: u8, slave: u8) -> Option<DriveInfo> {
        let ch = &self.channels[channel as usize];

        unsafe {
            ch.drive_head.write(0xA0 | (slave << 4));
        }
        ch.io_wait();
        unsafe {
            ch.sector_count.write(0);
            ch.lba_low.write(0);
            ch.lba_mid.write(0);
            ch.lba_high.write(0);
            ch.status_cmd.write(ATA_CMD_IDENTIFY);
        }
        ch.io_wait();

        if ch.status() == 0 {
            return None; // floating bus, nothing there
        }
        ch.wait_bsy_clear().ok()?;

        // ATAPI and SATA devices answer IDENTIFY with signature bytes in
        // the LBA registers; only plain ATA is supported.
        let (mid, high) = unsafe { (ch.lba_mid.read(), ch.lba_high.read()) };
        if mid != 0 || high != 0 {
            return None;
        }

        ch.wait_drq().ok()?;

        let mut identify = [0u16; 256];
        for word in identify.iter_mut() {
            *word = unsafe { ch.data.read() };
        }

        Some(DriveInfo {
            channel,
            slave,
            model: decode_model(&identify),
            sectors: decode_sector_count(&identify),
        })
    }

    fn transfer(
        &self,
        drive: u8,
        lba: u32,
        command: u8,
        mut per_sector: impl FnMut(&Channel, usize) -> Result<(), DeviceError>,
        count: u8,
    ) -> Result<(), DeviceError> {
        let info = self.drives[drive as usize]
            .as_ref()
            .ok_or(DeviceError::NotPresent)?;
        if lba > 0x0FFF_FFFF {
            return Err(DeviceError::OutOfRange);
        }
        if count == 0 {
            return Err(DeviceError::OutOfRange);
        }

        let ch = &self.channels[info.channel as usize];
        ch.setup(info.slave, lba, count, command)?;

        for sector in 0..count as usize {
            ch.poll()?;
            ch.wait_drq()?;
            per_sector(ch, sector)?;
        }
        Ok(())
    }
}

lazy_static! {
    static ref ATA: Mutex<Ata> = Mutex::new(Ata::new());
}

/// Reset both channels and identify the four drive positions. Safe to call
/// more than once; later calls are no-ops.
pub fn init() -> usize {
    let mut ata = ATA.lock();
    if ata.initialized {
        return ata.drives.iter().flatten().count();
    }

    ata.channels[0].soft_reset();
    ata.channels[1].soft_reset();

    let mut found = 0;
    for position in 0..4u8 {
        let (channel, slave) = (position / 2, position % 2);
        if let Some(info) = ata.identify(channel, slave) {
            info!(
                "ata{}: {} ({} sectors)",
                position, info.model, info.sectors
            );
            ata.drives[position as usize] = Some(info);
            found += 1;
        }
    }
    ata.initialized = true;
    found
}

pub fn drive_exists(drive: u8) -> bool {
    drive < 4 && ATA.lock().drives[drive as usize].is_some()
}

pub fn drive_info(drive: u8) -> Option<DriveInfo> {
    if drive >= 4 {
        return None;
    }
    ATA.lock().drives[drive as usize].clone()
}

/// Read `count` sectors starting at `lba` into `buf`.
pub fn read_sectors(drive: u8, lba: u32, count: u8, buf: &mut [u8]) -> Result<(), DeviceError> {
    if drive >= 4 {
        return Err(DeviceError::NotPresent);
    }
    let ata = ATA.lock();
    ata.transfer(
        drive,
        lba,
        ATA_CMD_READ_PIO,
        |ch, sector| {
            let base = sector * WORDS_PER_SECTOR * 2;
            for i in 0..WORDS_PER_SECTOR {
                let word = unsafe { ch.data.read() };
                buf[base + i * 2] = word as u8;
                buf[base + i * 2 + 1] = (word >> 8) as u8;
            }
            Ok(())
        },
        count,
    )
}

/// Write `count` sectors starting at `lba`; each sector is followed by a
/// cache flush.
pub fn write_sectors(drive: u8, lba: u32, count: u8, buf: &[u8]) -> Result<(), DeviceError> {
    if drive >= 4 {
        return Err(DeviceError::NotPresent);
    }
    let ata = ATA.lock();
    ata.transfer(
        drive,
        lba,
        ATA_CMD_WRITE_PIO,
        |ch, sector| {
            let base = sector * WORDS_PER_SECTOR * 2;
            for i in 0..WORDS_PER_SECTOR {
                let word = buf[base + i * 2] as u16 | ((buf[base + i * 2 + 1] as u16) << 8);
                unsafe {
                    ch.data.write(word);
                }
            }
            unsafe {
                ch.status_cmd.write(ATA_CMD_CACHE_FLUSH);
            }
            ch.poll()
        },
        count,
    )
}

/// One identified drive as a [`BlockDevice`] for the filesystem layer.
pub struct AtaDrive {
    drive: u8,
}

impl AtaDrive {
    pub fn open(drive: u8) -> Option<Arc<Self>> {
        if drive_exists(drive) {
            Some(Arc::new(Self { drive }))
        } else {
            None
        }
    }
}

impl BlockDevice for AtaDrive {
    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        read_sectors(self.drive, block_id, 1, buf)
    }

    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), DeviceError> {
        write_sectors(self.drive, block_id, 1, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_string_unswaps_and_trims() {
        let mut identify = [0u16; 256];
        // "QEMU HARDDISK" packed big-endian per word, space padded.
        let model = b"QEMU HARDDISK                           ";
        for i in 0..20 {
            identify[27 + i] = ((model[i * 2] as u16) << 8) | model[i * 2 + 1] as u16;
        }
        assert_eq!(decode_model(&identify), "QEMU HARDDISK");
    }

    #[test]
    fn sector_count_prefers_48_bit_words_when_supported() {
        let mut identify = [0u16; 256];
        identify[60] = 0x5678;
        identify[61] = 0x0012;
        assert_eq!(decode_sector_count(&identify), 0x0012_5678);

        identify[83] = 1 << 10;
        identify[102] = 0x4321;
        identify[103] = 0x0009;
        assert_eq!(decode_sector_count(&identify), 0x0009_4321);
    }
}
