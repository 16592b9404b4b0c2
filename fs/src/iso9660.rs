//! ISO 9660 raw image writer (spec.md §4.D). This isn't a directory
//! parser: the flasher hands it an already-built ISO image and this
//! module streams it onto a target block device sector by sector,
//! reporting progress as it goes. Refusing to target the boot device
//! is the caller's responsibility (`flasher` tracks which handle the
//! running firmware booted from); this module only refuses an image
//! that is larger than the destination.

use crate::device::{SectorIo, VolumeError};

const SECTOR_SIZE: usize = 512;

/// Streams `image` onto `dev` starting at LBA 0, `chunk_sectors` sectors
/// at a time, invoking `on_progress(sectors_written, total_sectors)`
/// after each chunk.
pub fn stream_image<D: SectorIo>(
    dev: &mut D,
    image: &[u8],
    mut on_progress: impl FnMut(u64, u64),
) -> Result<(), VolumeError> {
    let total_sectors = (image.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
    if total_sectors as u64 > dev.total_sectors() {
        return Err(VolumeError::NoSpace);
    }

    const CHUNK_SECTORS: usize = 128; // 64 KiB per write_sectors call
    let mut written_sectors = 0u64;
    let mut offset = 0usize;
    while offset < image.len() {
        let remaining = image.len() - offset;
        let chunk_len = remaining.min(CHUNK_SECTORS * SECTOR_SIZE);
        let padded_len = ((chunk_len + SECTOR_SIZE - 1) / SECTOR_SIZE) * SECTOR_SIZE;

        if padded_len == chunk_len {
            dev.write_sectors(written_sectors, &image[offset..offset + chunk_len])?;
        } else {
            let mut buf = alloc::vec![0u8; padded_len];
            buf[..chunk_len].copy_from_slice(&image[offset..offset + chunk_len]);
            dev.write_sectors(written_sectors, &buf)?;
        }

        offset += chunk_len;
        written_sectors += (padded_len / SECTOR_SIZE) as u64;
        on_progress(written_sectors, total_sectors as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    #[test]
    fn streams_full_image_and_reports_final_progress() {
        let mut disk = MemoryDisk::new(1024);
        let image = alloc::vec![0xABu8; 3 * SECTOR_SIZE + 17]; // unaligned tail
        let mut last = (0u64, 0u64);
        stream_image(&mut disk, &image, |done, total| last = (done, total)).unwrap();
        assert_eq!(last.0, last.1);

        let mut readback = alloc::vec![0u8; 4 * SECTOR_SIZE];
        disk.read_sectors(0, &mut readback).unwrap();
        assert_eq!(&readback[..image.len()], image.as_slice());
    }

    #[test]
    fn refuses_image_larger_than_destination() {
        let mut disk = MemoryDisk::new(1);
        let image = alloc::vec![0u8; 4 * SECTOR_SIZE];
        assert_eq!(stream_image(&mut disk, &image, |_, _| {}), Err(VolumeError::NoSpace));
    }
}
