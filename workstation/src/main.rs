//! The workstation binary (SPEC_FULL.md §5): the UEFI application that
//! boots into the cooperative main loop, wiring every other crate in this
//! workspace together. Nothing downstream of `efi_main` touches the raw
//! system table directly — it all goes through [`station_hal::FirmwareServices`].

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use station_hal::console::ConsoleColor;
use station_hal::raw::{Handle, Status, SystemTable};
use station_hal::FirmwareServices;

mod allocator;
mod boot;
mod document;
mod flasher_ui;
mod fmtbuf;
mod logger;
mod screen;
mod settings;

#[no_mangle]
pub extern "efiapi" fn efi_main(image_handle: Handle, system_table: *mut SystemTable) -> Status {
    // Safety: `system_table` and `image_handle` are exactly what firmware
    // hands this entry point; they stay valid for the whole session since
    // boot services are never exited while the workstation runs.
    let fw = unsafe { FirmwareServices::init(system_table, image_handle) };

    // Safety: this is the first thing after wrapping the table, before
    // any allocation (including the `String`s `Settings::load`/`boot::*`
    // may build) runs.
    unsafe { allocator::init(fw) };

    logger::init(fw);
    log::info!("workstation boot");

    let volume = boot::mount_boot_volume(&fw).map(|v| (v.device, v.kind));
    if volume.is_none() {
        fw.console_write(
            "no boot volume detected; editor/compiler/rebuild disabled\n",
            ConsoleColor::Warning,
        );
    }

    screen::run(screen::WorkstationState::new(fw, volume));
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(fw) = logger::firmware() {
        let mut line = fmtbuf::LineBuffer::new();
        use core::fmt::Write as _;
        let _ = write!(line, "PANIC: {info}");
        fw.console_write(line.as_str(), ConsoleColor::Error);
    }
    halt()
}

fn halt() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::asm!("cli", "hlt", options(nomem, nostack));
        }
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
    }
}
