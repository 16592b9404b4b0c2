//! Process-wide runtime environment (spec.md §4.J step 3: "Register the
//! workstation's API... memory operations, filesystem operations, boot
//! state pointer, and a libc subset").
//!
//! Compiled user code calls these entry points as bare C-ABI function
//! pointers with no hidden context argument, but the real implementations
//! in `station-libc`/`station-memory` all take an explicit context
//! (`&FirmwareAllocator`, `&Context`) because they have no firmware-global
//! state of their own. This module is the seam: a single process-wide
//! singleton (the `spin::Mutex` pattern used for shared state elsewhere in
//! this codebase) holds the live context, and [`crate::api`]'s `extern "C"`
//! trampolines look it up on every call.

use spin::Mutex;
use station_fs::FilesystemKind;
use station_hal::FirmwareServices;
use station_libc::{DiagnosticRing, FdTable};
use station_memory::FirmwareAllocator;
use station_nonlocal_exit::Context;
use station_storage::block::BlockDevice;

/// Size of the error-capture ring opened at `run_source` entry (spec.md
/// §4.J step 1). Generously larger than any single diagnostic a 200-line
/// C source is likely to produce.
pub const ERROR_RING_CAPACITY: usize = 4096;

/// The "boot state pointer" compiled code can read back (spec.md §4.J step
/// 3). There is no richer boot-session concept anywhere else in this
/// codebase to reuse, so this is deliberately minimal: enough for a
/// compiled program to tell it is still running under boot services and
/// which image loaded it, nothing more.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BootState {
    pub boot_image_handle: usize,
    /// Nonzero for as long as boot services are active (spec.md §5: "boot
    /// services are never exited" during a session).
    pub boot_services_active: u32,
}

/// Supplies whole-file reads to [`station_libc::FdTable`] by delegating to
/// whichever volume is currently mounted. `fw`/`device` are plain values
/// (both `Copy`), so this holds no borrow and can live inside the
/// singleton without any self-referential lifetime games.
pub struct VolumeFileSource {
    pub fw: FirmwareServices,
    pub device: BlockDevice,
    pub kind: FilesystemKind,
}

impl station_libc::fd::FileSource<FirmwareServices> for VolumeFileSource {
    fn read_whole_file(
        &self,
        path: &str,
        alloc: &station_memory::general::GeneralAllocator<FirmwareServices>,
    ) -> Option<(*mut u8, usize)> {
        let mut dev = station_fs::FirmwareBlockIo { fw: &self.fw, device: self.device };
        let bytes = station_fs::readfile(&mut dev, self.kind, path).ok()?;
        if bytes.is_empty() {
            let ptr = alloc.allocate(1);
            return Some((ptr, 0));
        }
        let ptr = alloc.allocate(bytes.len());
        if ptr.is_null() {
            return None;
        }
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        Some((ptr, bytes.len()))
    }
}

/// Everything the C-ABI trampolines in [`crate::api`] need to act on
/// behalf of one running compiled program.
pub struct RuntimeEnv {
    pub fw: FirmwareServices,
    pub allocator: FirmwareAllocator,
    pub ctx: Context,
    pub ring: DiagnosticRing<ERROR_RING_CAPACITY>,
    pub fd_table: FdTable,
    pub volume: Option<VolumeFileSource>,
}

impl RuntimeEnv {
    pub fn new(fw: FirmwareServices) -> Self {
        Self {
            fw,
            allocator: FirmwareAllocator::new(fw),
            ctx: Context::new(),
            ring: DiagnosticRing::new(),
            fd_table: FdTable::new(),
            volume: None,
        }
    }

    pub fn boot_state(&self) -> BootState {
        BootState {
            boot_image_handle: self.fw.boot_image_handle().0 as usize,
            boot_services_active: 1,
        }
    }
}

static ENV: Mutex<Option<RuntimeEnv>> = Mutex::new(None);

/// Installs `env` as the singleton, replacing whatever ran before it.
/// Called once per `run_source` invocation (spec.md §5: programs run to
/// completion one at a time, cooperatively, never concurrently).
pub fn install(env: RuntimeEnv) {
    *ENV.lock() = Some(env);
}

/// Tears the singleton down once a compiled program has finished, so a
/// dangling `FirmwareServices`/`Context` can never outlive the run that
/// owned it.
pub fn uninstall() {
    *ENV.lock() = None;
}

/// Runs `f` against the installed environment.
///
/// # Panics
/// Panics if no environment is installed: every [`crate::api`] trampoline
/// can only be reached from compiled code that `run_source` itself placed
/// and invoked, which always installs an environment first. A panic here
/// means a trampoline escaped its run, which is a runtime bug, not a
/// condition compiled user code can trigger.
pub fn with_env<R>(f: impl FnOnce(&mut RuntimeEnv) -> R) -> R {
    let mut guard = ENV.lock();
    let env = guard.as_mut().expect("runtime environment not installed");
    f(env)
}
