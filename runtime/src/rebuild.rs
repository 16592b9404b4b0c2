//! `rebuild` (spec.md §4.K): compiles the workstation's own C application
//! sources into a fresh firmware binary and writes it to the boot path,
//! without ever touching the image currently running.
//!
//! The engine crates in this workspace (`station-hal`, `station-fs`,
//! `station-cc`, ...) are the Rust substrate the bundled compiler and
//! runtime are implemented in; the files this module compiles are the
//! workstation's own C application layer (editor, browser, compiler UI,
//! flasher UI, image viewer) that live on the ESP as ordinary source text
//! and get rebuilt through the self-hosted compiler, exactly as tinycc-
//! style self-hosting toolchains rebuild themselves from their own source
//! tree.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use station_cc::{Arch, CompileOptions, CompileOutput, Compiler, OutputKind};
use station_fs::{FilesystemKind, SectorIo};

#[cfg(target_arch = "x86_64")]
const HOST_ARCH: Arch = Arch::X86_64;
#[cfg(target_arch = "aarch64")]
const HOST_ARCH: Arch = Arch::Arm64;

#[cfg(target_arch = "x86_64")]
const BOOT_IMAGE_PATH: &str = "/EFI/BOOT/BOOTX64.EFI";
#[cfg(target_arch = "aarch64")]
const BOOT_IMAGE_PATH: &str = "/EFI/BOOT/BOOTAA64.EFI";

#[cfg(target_arch = "x86_64")]
const NONLOCAL_EXIT_SOURCE_PATH: &str = "/src/rt/nonlocal_exit_x86_64.c";
#[cfg(target_arch = "aarch64")]
const NONLOCAL_EXIT_SOURCE_PATH: &str = "/src/rt/nonlocal_exit_arm64.c";

/// The workstation's own application-layer source files, compiled in this
/// fixed order every rebuild (spec.md §4.K step 4: "every workstation
/// source file listed in a hard-coded manifest").
pub const MANIFEST: &[&str] = &[
    "/src/app/editor.c",
    "/src/app/browser.c",
    "/src/app/compiler_ui.c",
    "/src/app/flasher_ui.c",
    "/src/app/image_viewer.c",
    "/src/app/main_loop.c",
];

/// The bundled compiler's own amalgamated source, compiled last among the
/// application files so the rebuilt image carries a self-hosted compiler
/// too (spec.md §4.K step 4: "the compiler's own unity source... with
/// `__UEFI__` defined").
pub const COMPILER_UNITY_SOURCE_PATH: &str = "/tools/tinycc/tcc_unity.c";

#[derive(Debug, Clone)]
pub enum RebuildResult {
    Ok,
    ErrorSummary(String),
}

/// Errors specific to the document-save precondition (spec.md §4.K step
/// 1: "if the current document buffer is modified, save it; abort on save
/// failure").
pub trait DocumentBuffer {
    fn is_modified(&self) -> bool;
    fn save(&mut self) -> Result<(), String>;
}

/// Runs the full rebuild procedure against `dev`, a mounted FAT32 ESP.
pub fn rebuild<D: SectorIo>(dev: &mut D, document: &mut impl DocumentBuffer) -> RebuildResult {
    if document.is_modified() {
        if let Err(e) = document.save() {
            return RebuildResult::ErrorSummary(alloc::format!("document save failed: {e}"));
        }
    }

    let mut options = CompileOptions::rebuild_defaults();
    options.include_paths.push("/src/tcc-headers".to_string());
    options.include_paths.push("/src".to_string());
    options.include_paths.push("/tools/tinycc".to_string());
    options.defines.push(("__UEFI__".to_string(), None));

    let mut combined = String::new();
    let mut files = Vec::new();
    files.extend_from_slice(MANIFEST);
    files.push(COMPILER_UNITY_SOURCE_PATH);
    files.push(NONLOCAL_EXIT_SOURCE_PATH);

    for path in &files {
        let bytes = match station_fs::readfile(dev, FilesystemKind::Fat32, path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return RebuildResult::ErrorSummary(alloc::format!("{path}: read failed ({e:?})"));
            }
        };
        let Ok(text) = core::str::from_utf8(&bytes) else {
            return RebuildResult::ErrorSummary(alloc::format!("{path}: not valid UTF-8"));
        };
        combined.push_str(text);
        combined.push('\n');
    }

    let mut compiler = Compiler::new(HOST_ARCH, options, OutputKind::FirmwareBinary);
    for (name, address) in crate::api::symbol_table() {
        compiler.register_symbol(*name, *address);
    }

    let output = match compiler.compile(&combined, "unity.c") {
        Ok(output) => output,
        Err(errors) => {
            let mut summary = String::new();
            for (i, e) in errors.iter().enumerate() {
                if i > 0 {
                    summary.push('\n');
                }
                summary.push_str(&alloc::format!("line {}: {}", e.line, e.message));
            }
            return RebuildResult::ErrorSummary(summary);
        }
    };

    let CompileOutput::FirmwareBinary(image) = output else {
        return RebuildResult::ErrorSummary(String::from("compiler produced an in-memory image, not a firmware binary"));
    };

    if let Err(e) = station_fs::writefile(dev, FilesystemKind::Fat32, BOOT_IMAGE_PATH, &image) {
        return RebuildResult::ErrorSummary(alloc::format!("writing {BOOT_IMAGE_PATH} failed: {e:?}"));
    }

    RebuildResult::Ok
}

/// Issues the cold reset a successful rebuild prompts for on 'R' (spec.md
/// §4.K step 6). Never returns.
pub fn reboot(fw: &station_hal::FirmwareServices) -> ! {
    fw.reset(station_hal::raw::ResetKind::Cold)
}
