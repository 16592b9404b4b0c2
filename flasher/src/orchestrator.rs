//! Flasher sequencing (spec.md §4.M): enumerate/select/confirm, write a
//! fresh GPT, format the ESP, force a re-probe, then stream the chosen
//! architecture's files out of the payload onto the new filesystem.

use alloc::format;
use alloc::vec::Vec;

use station_fs::{FilesystemKind, FirmwareBlockIo};
use station_hal::FirmwareServices;
use station_payload::{Arch, PayloadView};
use station_storage::block::{self, BlockDevice};
use station_storage::gpt;

use crate::guid::GuidSource;
use crate::partition_io::PartitionIo;
use crate::ui::{FlashOutcome, FlasherUi};

const MAX_DEVICES: usize = 16;

/// Steps 1-3: filters out the boot device, asks the UI for a target and
/// architecture, and requires explicit confirmation. Kept free of any
/// firmware call so it is exercisable against [`crate::ui::RecordingUi`]
/// without a real UEFI environment.
pub fn select_and_confirm(
    enumerated: &[BlockDevice],
    payload: &PayloadView<'_>,
    ui: &mut impl FlasherUi,
) -> Result<(BlockDevice, Arch), FlashOutcome> {
    let candidates: Vec<BlockDevice> = enumerated.iter().copied().filter(|d| !d.boot).collect();
    if candidates.is_empty() {
        ui.finished(FlashOutcome::Failed, "no non-boot block devices available");
        return Err(FlashOutcome::Failed);
    }

    let Some(target_index) = ui.select_target(&candidates) else {
        ui.finished(FlashOutcome::Cancelled, "no target selected");
        return Err(FlashOutcome::Cancelled);
    };
    let Some(&device) = candidates.get(target_index) else {
        ui.finished(FlashOutcome::Failed, "selected target index out of range");
        return Err(FlashOutcome::Failed);
    };

    let available_archs: Vec<Arch> = [Arch::X86_64, Arch::Arm64]
        .into_iter()
        .filter(|a| payload.arch(*a).is_some())
        .collect();
    let Some(arch) = ui.select_arch(&available_archs) else {
        ui.finished(FlashOutcome::Cancelled, "no architecture selected");
        return Err(FlashOutcome::Cancelled);
    };

    if !ui.confirm(&device, arch) {
        ui.finished(FlashOutcome::Cancelled, "operator declined confirmation");
        return Err(FlashOutcome::Cancelled);
    }

    Ok((device, arch))
}

/// Runs the full 8-step procedure to completion, cancellation, or the
/// first unrecoverable error.
pub fn flash(fw: &FirmwareServices, payload: &PayloadView<'_>, ui: &mut impl FlasherUi, guid_seed: u64) -> FlashOutcome {
    // Step 1: enumerate block devices.
    let mut devices = [BlockDevice {
        handle: station_hal::raw::Handle(core::ptr::null_mut()),
        removable: false,
        boot: false,
        block_size: 0,
        last_block: 0,
    }; MAX_DEVICES];
    let found = match block::enumerate(fw, MAX_DEVICES, &mut devices) {
        Ok(n) => n,
        Err(e) => {
            ui.finished(FlashOutcome::Failed, &format!("device enumeration failed: {e:?}"));
            return FlashOutcome::Failed;
        }
    };

    // Steps 1-3.
    let (device, arch) = match select_and_confirm(&devices[..found], payload, ui) {
        Ok(pair) => pair,
        Err(outcome) => return outcome,
    };

    // Step 4: write a fresh GPT.
    ui.progress("gpt", 0, 1);
    let mut guids = GuidSource::new(guid_seed);
    let layout = gpt::build(device.last_block + 1, guids.next_guid(), guids.next_guid());
    if let Err(e) = gpt::write_to_device(fw, &device, &layout) {
        ui.finished(FlashOutcome::Failed, &format!("writing GPT failed: {e:?}"));
        return FlashOutcome::Failed;
    }
    ui.progress("gpt", 1, 1);

    // Step 5: format the ESP as FAT32.
    ui.progress("format", 0, 1);
    let esp_sectors = layout.last_usable_lba - gpt::ESP_FIRST_LBA + 1;
    {
        let mut block_io = FirmwareBlockIo { fw, device };
        let mut esp = PartitionIo::new(&mut block_io, gpt::ESP_FIRST_LBA, esp_sectors);
        if let Err(e) = station_fs::fat32::format(&mut esp) {
            ui.finished(FlashOutcome::Failed, &format!("FAT32 format failed: {e:?}"));
            return FlashOutcome::Failed;
        }
    }
    ui.progress("format", 1, 1);

    // Step 6: force firmware to re-probe the device before touching it
    // through the filesystem layer.
    if let Err(e) = block::reconnect(fw, &device) {
        ui.finished(FlashOutcome::Failed, &format!("reconnect failed: {e:?}"));
        return FlashOutcome::Failed;
    }

    // Step 7: stream each file in the chosen architecture's manifest
    // onto the freshly formatted filesystem.
    let Some(arch_view) = payload.arch(arch) else {
        ui.finished(FlashOutcome::Failed, "payload has no section for the selected architecture");
        return FlashOutcome::Failed;
    };
    let total = arch_view.manifest_count() as usize;
    let mut block_io = FirmwareBlockIo { fw, device };
    let mut esp = PartitionIo::new(&mut block_io, gpt::ESP_FIRST_LBA, esp_sectors);
    for (index, (entry, bytes)) in arch_view.files().enumerate() {
        ui.progress(entry.path, index, total);
        let write_result = if entry.is_compressed() {
            match station_payload::inflate(bytes, entry.original_size as usize) {
                Ok(decompressed) => {
                    station_fs::writefile(&mut esp, FilesystemKind::Fat32, entry.path, &decompressed)
                }
                Err(e) => {
                    ui.finished(FlashOutcome::Failed, &format!("{}: decompression failed ({e:?})", entry.path));
                    return FlashOutcome::Failed;
                }
            }
        } else {
            station_fs::writefile(&mut esp, FilesystemKind::Fat32, entry.path, bytes)
        };
        if let Err(e) = write_result {
            ui.finished(FlashOutcome::Failed, &format!("{}: write failed ({e:?})", entry.path));
            return FlashOutcome::Failed;
        }
    }
    ui.progress("unpack", total, total);

    // Step 8: final result.
    ui.finished(FlashOutcome::Success, &format!("flashed {total} file(s) for {}", arch.esp_dir_name()));
    FlashOutcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::RecordingUi;
    use station_hal::raw::Handle;

    fn build_blob_with_one_stored_file() -> Vec<u8> {
        use station_payload::format::{ARCH_ENTRY_SIZE, HEADER_SIZE, MAGIC, PATH_SIZE, VERSION};
        let path = "EFI/BOOT/BOOTX64.EFI";
        let bytes = b"firmware-bytes-here";
        let mut padded_path = [0u8; PATH_SIZE];
        padded_path[..path.len()].copy_from_slice(path.as_bytes());
        let mut manifest = Vec::new();
        manifest.extend_from_slice(&padded_path);
        manifest.extend_from_slice(&0u32.to_le_bytes()); // compressed_size
        manifest.extend_from_slice(&(bytes.len() as u32).to_le_bytes()); // original_size

        let data_block_off = HEADER_SIZE + ARCH_ENTRY_SIZE;

        let mut blob = Vec::new();
        blob.extend_from_slice(&MAGIC);
        blob.push(VERSION);
        blob.push(1); // arch_count
        blob.extend_from_slice(&0u16.to_le_bytes()); // reserved
        blob.extend_from_slice(&Arch::X86_64.encode_name());
        blob.extend_from_slice(&data_block_off.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes()); // file_count
        blob.extend_from_slice(&manifest);
        blob.extend_from_slice(bytes);
        blob
    }

    fn fake_device(boot: bool) -> BlockDevice {
        BlockDevice {
            handle: Handle(core::ptr::null_mut()),
            removable: true,
            boot,
            block_size: 512,
            last_block: 1_000_000,
        }
    }

    #[test]
    fn boot_device_is_never_offered_as_a_target() {
        let blob = build_blob_with_one_stored_file();
        let view = PayloadView::parse(&blob).unwrap();
        let enumerated = [fake_device(true), fake_device(false)];
        let mut ui = RecordingUi::new(0, Arch::X86_64, true);
        let (device, _arch) = select_and_confirm(&enumerated, &view, &mut ui).unwrap();
        assert!(!device.boot);
    }

    #[test]
    fn declining_confirmation_cancels_before_any_write() {
        let blob = build_blob_with_one_stored_file();
        let view = PayloadView::parse(&blob).unwrap();
        let enumerated = [fake_device(false)];
        let mut ui = RecordingUi::new(0, Arch::X86_64, false);
        let result = select_and_confirm(&enumerated, &view, &mut ui);
        assert!(matches!(result, Err(FlashOutcome::Cancelled)));
    }

    #[test]
    fn architecture_absent_from_payload_is_not_offered() {
        let blob = build_blob_with_one_stored_file();
        let view = PayloadView::parse(&blob).unwrap();
        let enumerated = [fake_device(false)];
        // The blob only has an X86_64 section; RecordingUi still "selects"
        // Arm64 because it ignores the list it's handed, but a real UI
        // would never see Arm64 in its options.
        let mut ui = RecordingUi::new(0, Arch::X86_64, true);
        ui.select_arch(&[Arch::X86_64]);
        let (_, arch) = select_and_confirm(&enumerated, &view, &mut ui).unwrap();
        assert_eq!(arch, Arch::X86_64);
    }
}
