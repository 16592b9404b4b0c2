//! Sector-level I/O abstraction the filesystem drivers are generic over
//! (spec.md §4.D). Mirrors the `RawBacking`/`FileSource` generic-trait
//! pattern used in `station-memory`/`station-libc`: the production
//! implementation goes through `station_storage::block`'s firmware
//! calls, while tests substitute an in-memory backing so the drivers
//! never need a real UEFI block device to exercise.

use alloc::vec;
use alloc::vec::Vec;

use station_storage::block::{self, BlockDevice, SECTOR_SIZE};
use station_hal::FirmwareServices;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeError {
    Io,
    NotFound,
    ReadOnlyVolume,
    InvalidFormat,
    NoSpace,
    NameConflict,
}

pub trait SectorIo {
    fn sector_size(&self) -> usize;
    fn total_sectors(&self) -> u64;
    fn read_sectors(&self, start_lba: u64, buf: &mut [u8]) -> Result<(), VolumeError>;
    fn write_sectors(&mut self, start_lba: u64, buf: &[u8]) -> Result<(), VolumeError>;

    fn read_sector(&self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), VolumeError> {
        self.read_sectors(lba, buf)
    }
}

/// Production adapter over a firmware-enumerated block device.
pub struct FirmwareBlockIo<'a> {
    pub fw: &'a FirmwareServices,
    pub device: BlockDevice,
}

impl<'a> SectorIo for FirmwareBlockIo<'a> {
    fn sector_size(&self) -> usize {
        self.device.block_size as usize
    }

    fn total_sectors(&self) -> u64 {
        self.device.last_block + 1
    }

    fn read_sectors(&self, start_lba: u64, buf: &mut [u8]) -> Result<(), VolumeError> {
        let count = (buf.len() / self.sector_size()) as u32;
        block::read_blocks(self.fw, &self.device, start_lba, count, buf).map_err(|_| VolumeError::Io)
    }

    fn write_sectors(&mut self, start_lba: u64, buf: &[u8]) -> Result<(), VolumeError> {
        let count = (buf.len() / self.sector_size()) as u32;
        block::write_blocks(self.fw, &self.device, start_lba, count, buf).map_err(|_| VolumeError::Io)
    }
}

/// Flat in-memory disk, 512-byte sectors, used by every driver's unit
/// tests.
pub struct MemoryDisk {
    sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl MemoryDisk {
    pub fn new(sector_count: usize) -> Self {
        Self {
            sectors: vec![[0u8; SECTOR_SIZE]; sector_count],
        }
    }
}

impl SectorIo for MemoryDisk {
    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn total_sectors(&self) -> u64 {
        self.sectors.len() as u64
    }

    fn read_sectors(&self, start_lba: u64, buf: &mut [u8]) -> Result<(), VolumeError> {
        let count = buf.len() / SECTOR_SIZE;
        for i in 0..count {
            let lba = start_lba as usize + i;
            let sector = self.sectors.get(lba).ok_or(VolumeError::Io)?;
            buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(sector);
        }
        Ok(())
    }

    fn write_sectors(&mut self, start_lba: u64, buf: &[u8]) -> Result<(), VolumeError> {
        let count = buf.len() / SECTOR_SIZE;
        for i in 0..count {
            let lba = start_lba as usize + i;
            let sector = self.sectors.get_mut(lba).ok_or(VolumeError::Io)?;
            sector.copy_from_slice(&buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        }
        Ok(())
    }
}
