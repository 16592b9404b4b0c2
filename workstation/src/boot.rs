//! Locates the workstation's own boot volume (spec.md §4.B boot-device
//! masking, §4.D volume detection) — the one filesystem `run_source` reads
//! application source from and `rebuild` writes the next boot image to.

use station_fs::FilesystemKind;
use station_hal::FirmwareServices;
use station_storage::block::{self, BlockDevice};

const MAX_DEVICES: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct MountedVolume {
    pub device: BlockDevice,
    pub kind: FilesystemKind,
}

/// Enumerates block devices and picks the one firmware flagged as the
/// boot device, detecting its filesystem. `None` means either no boot
/// device was reported (unusual, but not fatal — the launcher screen
/// still runs, just without compiler/rebuild support) or its filesystem
/// is unrecognized, e.g. a blank card the flasher has not written a
/// filesystem onto yet.
pub fn mount_boot_volume(fw: &FirmwareServices) -> Option<MountedVolume> {
    let mut devices = [BlockDevice {
        handle: station_hal::raw::Handle(core::ptr::null_mut()),
        removable: false,
        boot: false,
        block_size: 0,
        last_block: 0,
    }; MAX_DEVICES];
    let found = block::enumerate(fw, MAX_DEVICES, &mut devices).ok()?;

    let device = devices[..found].iter().copied().find(|d| d.boot)?;
    let io = station_fs::FirmwareBlockIo { fw, device };
    let kind = station_fs::detect(&io)?;
    Some(MountedVolume { device, kind })
}
