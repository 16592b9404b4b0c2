//! Partition-relative sector I/O (spec.md §4.M step 5: "format the ESP
//! as FAT32"). The filesystem drivers in `station-fs` are generic over
//! `SectorIo` and address sector 0 as the start of the filesystem; this
//! adapter translates that into the ESP's actual LBA range on the
//! underlying device, so `fat32::format` never touches the GPT
//! structures surrounding it.

use station_fs::{SectorIo, VolumeError};

pub struct PartitionIo<'a, D: SectorIo> {
    inner: &'a mut D,
    start_lba: u64,
    sector_count: u64,
}

impl<'a, D: SectorIo> PartitionIo<'a, D> {
    pub fn new(inner: &'a mut D, start_lba: u64, sector_count: u64) -> Self {
        Self { inner, start_lba, sector_count }
    }
}

impl<'a, D: SectorIo> SectorIo for PartitionIo<'a, D> {
    fn sector_size(&self) -> usize {
        self.inner.sector_size()
    }

    fn total_sectors(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&self, start_lba: u64, buf: &mut [u8]) -> Result<(), VolumeError> {
        let count = (buf.len() / self.sector_size()) as u64;
        if start_lba + count > self.sector_count {
            return Err(VolumeError::Io);
        }
        self.inner.read_sectors(self.start_lba + start_lba, buf)
    }

    fn write_sectors(&mut self, start_lba: u64, buf: &[u8]) -> Result<(), VolumeError> {
        let count = (buf.len() / self.sector_size()) as u64;
        if start_lba + count > self.sector_count {
            return Err(VolumeError::Io);
        }
        self.inner.write_sectors(self.start_lba + start_lba, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_fs::device::MemoryDisk;

    #[test]
    fn reads_and_writes_are_offset_into_the_partition() {
        let mut disk = MemoryDisk::new(100);
        {
            let mut part = PartitionIo::new(&mut disk, 10, 20);
            part.write_sectors(0, &[0xAB; 512]).unwrap();
        }
        let mut buf = [0u8; 512];
        disk.read_sectors(10, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 512]);
        disk.read_sectors(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 512]);
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let mut disk = MemoryDisk::new(100);
        let mut part = PartitionIo::new(&mut disk, 10, 5);
        assert!(part.write_sectors(10, &[0u8; 512 * 6]).is_err());
    }
}
