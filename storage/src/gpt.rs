//! GPT creation and writing (spec.md §3 "GPT layout", §4.M step 4).
//!
//! Layout: LBA 0 protective MBR; LBA 1 primary header; LBA 2..33 primary
//! entry array (128 entries x 128 bytes = 16 KiB); LBA N-33..N-1 backup
//! entry array + backup header at LBA N-1. A single EFI System Partition
//! entry spans `[2048, last_usable_lba]`.

use crate::crc32::crc32;
use crate::partition::{Guid, ESP_TYPE_GUID, GPT_PROTECTIVE_TYPE, GPT_SIGNATURE, MBR_SIGNATURE};
use station_hal::error::{FirmwareError, FwResult};
use station_hal::FirmwareServices;

use crate::block::{self, BlockDevice, SECTOR_SIZE};

pub const ENTRY_ARRAY_LBAS: u64 = 32; // 16 KiB / 512
pub const ENTRY_COUNT: u32 = 128;
pub const ENTRY_SIZE: u32 = 128;
pub const ESP_FIRST_LBA: u64 = 2048;

/// The sectors that make up a freshly-created GPT, ready to be written to
/// consecutive/terminal LBAs on a device.
pub struct GptLayout {
    pub protective_mbr: [u8; SECTOR_SIZE],
    pub primary_header: [u8; SECTOR_SIZE],
    pub primary_entries: [u8; (ENTRY_ARRAY_LBAS as usize) * SECTOR_SIZE],
    pub backup_entries: [u8; (ENTRY_ARRAY_LBAS as usize) * SECTOR_SIZE],
    pub backup_header: [u8; SECTOR_SIZE],
    pub last_usable_lba: u64,
    pub total_sectors: u64,
}

/// Builds a GPT for a disk of `total_sectors` sectors with a single ESP
/// entry spanning `[2048, last_usable_lba]`. `disk_guid`/`partition_guid`
/// are caller-supplied so tests are deterministic; production callers
/// should source them from a hardware RNG where available (spec.md lists no
/// such requirement explicitly, so a fixed GUID is acceptable when none is
/// supplied).
pub fn build(total_sectors: u64, disk_guid: Guid, partition_guid: Guid) -> GptLayout {
    let backup_header_lba = total_sectors - 1;
    let backup_entries_lba = backup_header_lba - ENTRY_ARRAY_LBAS;
    let last_usable_lba = backup_entries_lba - 1;

    let mut protective_mbr = [0u8; SECTOR_SIZE];
    protective_mbr[446 + 4] = GPT_PROTECTIVE_TYPE;
    protective_mbr[446 + 8..446 + 12].copy_from_slice(&1u32.to_le_bytes());
    let mbr_sectors = (total_sectors.saturating_sub(1)).min(u32::MAX as u64) as u32;
    protective_mbr[446 + 12..446 + 16].copy_from_slice(&mbr_sectors.to_le_bytes());
    protective_mbr[510..512].copy_from_slice(&MBR_SIGNATURE);

    let mut entries = [0u8; (ENTRY_ARRAY_LBAS as usize) * SECTOR_SIZE];
    write_entry(&mut entries[0..ENTRY_SIZE as usize], partition_guid, last_usable_lba);
    let entries_crc = crc32(&entries);

    let primary_header = build_header(HeaderArgs {
        disk_guid,
        header_lba: 1,
        other_header_lba: backup_header_lba,
        entries_lba: 2,
        entries_crc,
        last_usable_lba,
        total_sectors,
    });

    let backup_header = build_header(HeaderArgs {
        disk_guid,
        header_lba: backup_header_lba,
        other_header_lba: 1,
        entries_lba: backup_entries_lba,
        entries_crc,
        last_usable_lba,
        total_sectors,
    });

    GptLayout {
        protective_mbr,
        primary_header,
        primary_entries: entries,
        backup_entries: entries,
        backup_header,
        last_usable_lba,
        total_sectors,
    }
}

struct HeaderArgs {
    disk_guid: Guid,
    header_lba: u64,
    other_header_lba: u64,
    entries_lba: u64,
    entries_crc: u32,
    last_usable_lba: u64,
    total_sectors: u64,
}

fn build_header(args: HeaderArgs) -> [u8; SECTOR_SIZE] {
    let mut h = [0u8; SECTOR_SIZE];
    h[0..8].copy_from_slice(GPT_SIGNATURE);
    h[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes()); // revision 1.0
    h[12..16].copy_from_slice(&92u32.to_le_bytes()); // header size
    // CRC32 at [16..20] left zero for the checksum pass below.
    h[24..32].copy_from_slice(&args.header_lba.to_le_bytes());
    h[32..40].copy_from_slice(&args.other_header_lba.to_le_bytes());
    h[40..48].copy_from_slice(&ESP_FIRST_LBA.to_le_bytes());
    h[48..56].copy_from_slice(&args.last_usable_lba.to_le_bytes());
    h[56..72].copy_from_slice(&args.disk_guid.to_bytes());
    h[72..80].copy_from_slice(&args.entries_lba.to_le_bytes());
    h[80..84].copy_from_slice(&ENTRY_COUNT.to_le_bytes());
    h[84..88].copy_from_slice(&ENTRY_SIZE.to_le_bytes());
    h[88..92].copy_from_slice(&args.entries_crc.to_le_bytes());
    let _ = args.total_sectors; // retained for callers that want it logged

    let crc = crc32(&h[..92]);
    h[16..20].copy_from_slice(&crc.to_le_bytes());
    h
}

fn write_entry(entry: &mut [u8], partition_guid: Guid, last_usable_lba: u64) {
    entry[0..16].copy_from_slice(&ESP_TYPE_GUID.to_bytes());
    entry[16..32].copy_from_slice(&partition_guid.to_bytes());
    entry[32..40].copy_from_slice(&ESP_FIRST_LBA.to_le_bytes());
    entry[40..48].copy_from_slice(&last_usable_lba.to_le_bytes());
}

/// Writes a built GPT layout to `device`, flushing afterward so the write
/// is durable before anything else touches the disk.
pub fn write_to_device(fw: &FirmwareServices, device: &BlockDevice, layout: &GptLayout) -> FwResult<()> {
    if device.boot {
        return Err(FirmwareError::AccessDenied);
    }
    block::write_blocks(fw, device, 0, 1, &layout.protective_mbr)?;
    block::write_blocks(fw, device, 1, 1, &layout.primary_header)?;
    block::write_blocks(fw, device, 2, ENTRY_ARRAY_LBAS as u32, &layout.primary_entries)?;
    let backup_entries_lba = layout.total_sectors - 1 - ENTRY_ARRAY_LBAS;
    block::write_blocks(fw, device, backup_entries_lba, ENTRY_ARRAY_LBAS as u32, &layout.backup_entries)?;
    block::write_blocks(fw, device, layout.total_sectors - 1, 1, &layout.backup_header)?;
    block::flush(fw, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISK_GUID: Guid = Guid::new(1, 2, 3, [4, 5, 6, 7, 8, 9, 10, 11]);
    const PART_GUID: Guid = Guid::new(
        0x28_73_2A_C1,
        0xF81F,
        0x11D2,
        [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    );

    #[test]
    fn scenario_4_gpt_round_trip() {
        let total_sectors = 64 * 1024 * 1024 / SECTOR_SIZE as u64; // 64 MiB device
        let layout = build(total_sectors, DISK_GUID, PART_GUID);

        assert_eq!(layout.protective_mbr[510], 0x55);
        assert_eq!(layout.protective_mbr[511], 0xAA);
        assert_eq!(layout.protective_mbr[450], GPT_PROTECTIVE_TYPE);

        assert_eq!(&layout.primary_header[0..8], GPT_SIGNATURE);
        let revision = u32::from_le_bytes(layout.primary_header[8..12].try_into().unwrap());
        assert_eq!(revision, 0x0001_0000);

        let entry = &layout.primary_entries[0..ENTRY_SIZE as usize];
        assert_eq!(&entry[0..16], &ESP_TYPE_GUID.to_bytes());
        let starting_lba = u64::from_le_bytes(entry[32..40].try_into().unwrap());
        assert_eq!(starting_lba, 2048);
    }

    #[test]
    fn header_crc_survives_round_trip() {
        let total_sectors = 64 * 1024 * 1024 / SECTOR_SIZE as u64;
        let layout = build(total_sectors, DISK_GUID, PART_GUID);
        assert!(crate::partition::GptHeader::verify_crc(&layout.primary_header));

        let mut corrupted = layout.primary_header;
        corrupted[100] ^= 0xFF;
        assert!(!crate::partition::GptHeader::verify_crc(&corrupted));
    }
}
