//! The Firmware Services Facade (spec.md §4.A).
//!
//! A single `FirmwareServices` handle wraps the system table pointer
//! (spec.md §9, "Pointer-as-global-table pattern") and exposes every
//! capability the rest of the workstation needs as a plain method call.
//! Nothing above this module ever dereferences `raw::SystemTable` itself.

use crate::console::{self, ConsoleColor};
use crate::error::{FirmwareError, FwResult};
use crate::graphics::{self, ActiveGraphicsMode};
use crate::keyboard::KeyEvent;
use crate::raw::protocols::{
    BlockIo, GraphicsOutput, SimpleFileSystem, BLOCK_IO_GUID, GRAPHICS_OUTPUT_GUID,
    SIMPLE_FILE_SYSTEM_GUID,
};
use crate::raw::{AllocateType, BootServices, Handle, MemoryType, ResetKind, Status, SystemTable};

/// Upper bound for the "executable, reachable via 32-bit relocations" pool
/// (spec.md §3/§4.E): addresses must stay below 2 GiB.
pub const EXEC_ALLOC_LIMIT: u64 = 0x7FFF_FFFF;

/// Vendor GUID the workstation's own variable-store reads/writes use
/// (spec.md §3 "Persisted state"). Distinct from any standard firmware
/// GUID namespace since these are application-private settings, not boot
/// configuration.
pub const STATION_VENDOR_GUID: crate::raw::protocols::ProtocolGuid = [
    0x3C, 0x17, 0x4A, 0x9E, 0x5D, 0x2B, 0x4F, 0x6A, 0x9C, 0x1D, 0x7E, 0x8B, 0x02, 0xA4, 0x55, 0x61,
];

/// Handle to the firmware-provided services. Copy because it is just a
/// borrowed pointer into the system table; the table itself outlives the
/// whole session (spec.md §5: "while boot services are active").
#[derive(Debug, Clone, Copy)]
pub struct FirmwareServices {
    system_table: *mut SystemTable,
    boot_image_handle: Handle,
}

unsafe impl Send for FirmwareServices {}
unsafe impl Sync for FirmwareServices {}

impl FirmwareServices {
    /// Wraps a system table pointer and the image handle firmware passed to
    /// `efi_main`, recording it so later enumerations can mask off the boot
    /// device (spec.md §4.B, "identifying the boot device").
    ///
    /// # Safety
    /// `system_table` must be a valid, live pointer for the remainder of
    /// the session.
    pub unsafe fn init(system_table: *mut SystemTable, boot_image_handle: Handle) -> Self {
        Self {
            system_table,
            boot_image_handle,
        }
    }

    fn st(&self) -> &SystemTable {
        unsafe { &*self.system_table }
    }

    fn bs(&self) -> &BootServices {
        unsafe { &*self.st().boot_services }
    }

    /// The handle through which this workstation's own image was loaded —
    /// used by the storage layer to mask off the boot device as
    /// non-writable.
    pub fn boot_image_handle(&self) -> Handle {
        self.boot_image_handle
    }

    /// Writes `text` to the console. Tolerates a null framebuffer by
    /// falling back silently (console::write already no-ops on null).
    pub fn console_write(&self, text: &str, color: ConsoleColor) {
        console::write(self.st().console_out, text, color);
    }

    /// Busy-waits for approximately `microseconds`.
    pub fn stall(&self, microseconds: usize) -> FwResult<()> {
        let status = unsafe { (self.bs().stall)(microseconds) };
        status_to_result(status)
    }

    /// Issues a reset. Never returns on success, by firmware contract.
    pub fn reset(&self, kind: ResetKind) -> ! {
        let rs = unsafe { &*self.st().runtime_services };
        unsafe { (rs.reset_system)(kind, Status::Success, 0, core::ptr::null()) }
    }

    /// Reads a variable-store value into `buf`, returning the number of
    /// bytes written. `NotFound` is the expected outcome on a first boot
    /// (spec.md §3: "tolerate a read-from-empty-store as initial
    /// defaults") — callers treat it as "use defaults", not a hard error.
    pub fn get_variable(&self, name: &str, buf: &mut [u8]) -> FwResult<usize> {
        let rs = unsafe { &*self.st().runtime_services };
        let encoded = encode_variable_name(name);
        let mut data_size = buf.len();
        let status = unsafe {
            (rs.get_variable)(
                encoded.as_ptr(),
                &STATION_VENDOR_GUID,
                core::ptr::null_mut(),
                &mut data_size,
                buf.as_mut_ptr(),
            )
        };
        status_to_result(status)?;
        Ok(data_size)
    }

    /// Writes `data` to the variable store under `name`, non-volatile and
    /// persisting across reboots (spec.md §3: "firmware variable store").
    pub fn set_variable(&self, name: &str, data: &[u8]) -> FwResult<()> {
        const EFI_VARIABLE_NON_VOLATILE: u32 = 0x0000_0001;
        const EFI_VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x0000_0002;
        let rs = unsafe { &*self.st().runtime_services };
        let encoded = encode_variable_name(name);
        let status = unsafe {
            (rs.set_variable)(
                encoded.as_ptr(),
                &STATION_VENDOR_GUID,
                EFI_VARIABLE_NON_VOLATILE | EFI_VARIABLE_BOOTSERVICE_ACCESS,
                data.len(),
                data.as_ptr(),
            )
        };
        status_to_result(status)
    }

    /// Allocates `size` bytes of general-purpose loader-data memory.
    /// Allocation failure is reported as a null pointer per spec.md §4.A,
    /// not as an error — callers that need `FwResult` wrap this themselves
    /// (see `station-memory`).
    pub fn allocate(&self, size: usize) -> *mut u8 {
        let mut ptr: *mut u8 = core::ptr::null_mut();
        let status = unsafe { (self.bs().allocate_pool)(MemoryType::LoaderData, size, &mut ptr) };
        if status.is_success() {
            ptr
        } else {
            core::ptr::null_mut()
        }
    }

    /// Frees memory obtained from `allocate`. Tolerates null.
    pub fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            let _ = (self.bs().free_pool)(ptr);
        }
    }

    /// Allocates `size` bytes of executable memory below the 2 GiB line
    /// (spec.md §4.E: "constrained to low 2 GB for reachable relocations").
    /// Returns null on failure.
    pub fn allocate_executable_below_2gb(&self, size: usize) -> *mut u8 {
        let pages = size.div_ceil(4096).max(1);
        let mut address = EXEC_ALLOC_LIMIT;
        let status = unsafe {
            (self.bs().allocate_pages)(
                AllocateType::MaxAddress,
                MemoryType::LoaderCode,
                pages,
                &mut address,
            )
        };
        if status.is_success() {
            address as *mut u8
        } else {
            core::ptr::null_mut()
        }
    }

    /// Probes the Graphics Output Protocol for its active mode.
    pub fn graphics_probe(&self) -> FwResult<ActiveGraphicsMode> {
        let gop = self.locate_protocol::<GraphicsOutput>(&GRAPHICS_OUTPUT_GUID)?;
        graphics::probe(gop)
    }

    /// Reads one keyboard event. In blocking mode this call only returns
    /// once an event is available (a real implementation waits on the
    /// firmware event-wait primitive before polling); a non-blocking poll
    /// returns `NotReady` immediately when nothing is queued.
    pub fn keyboard_read_event(&self, blocking: bool) -> FwResult<KeyEvent> {
        // Prefer the extended protocol (modifier state) when the firmware
        // wired one up via the system table directly; fall back to the
        // basic protocol when it did not (spec.md §3: modifiers "may be an
        // empty set when firmware does not supply modifier state").
        let ex_ptr = self.st().console_in_ex;
        if !ex_ptr.is_null() {
            loop {
                let mut data = crate::raw::protocols::KeyData {
                    key: crate::raw::protocols::InputKey {
                        scan_code: 0,
                        unicode_char: 0,
                    },
                    key_shift_state: crate::raw::protocols::ShiftState::empty(),
                };
                let status = unsafe { ((*ex_ptr).read_key_stroke_ex)(ex_ptr, &mut data) };
                if status.is_success() {
                    if let Some(event) = KeyEvent::from_extended(&data) {
                        return Ok(event);
                    }
                    continue;
                }
                if !blocking {
                    return Err(FirmwareError::NotReady);
                }
                self.stall(1000)?;
            }
        }
        let input = self.st().console_in;
        if input.is_null() {
            return Err(FirmwareError::NotFound);
        }
        loop {
            let mut key = crate::raw::protocols::InputKey {
                scan_code: 0,
                unicode_char: 0,
            };
            let status = unsafe { ((*input).read_key_stroke)(input, &mut key) };
            if status.is_success() {
                if let Some(event) = KeyEvent::from_simple(&key) {
                    return Ok(event);
                }
                continue;
            }
            if !blocking {
                return Err(FirmwareError::NotReady);
            }
            self.stall(1000)?;
        }
    }

    /// Enumerates handles exposing the Block I/O protocol, masking off the
    /// boot device per spec.md §4.B.
    pub fn enumerate_block_devices(&self, out: &mut [Handle]) -> FwResult<usize> {
        self.locate_handles(&BLOCK_IO_GUID, out)
    }

    /// Enumerates handles exposing the Simple File System protocol.
    pub fn enumerate_file_volumes(&self, out: &mut [Handle]) -> FwResult<usize> {
        self.locate_handles(&SIMPLE_FILE_SYSTEM_GUID, out)
    }

    /// Forces firmware to release and re-probe a device after its on-disk
    /// structures changed beneath a cached driver (spec.md §4.B
    /// "reconnect"): disconnect, then connect.
    pub fn reconnect_controller(&self, device: Handle) -> FwResult<()> {
        unsafe {
            let _ = (self.bs().disconnect_controller)(device, Handle(core::ptr::null_mut()), Handle(core::ptr::null_mut()));
            let status = (self.bs().connect_controller)(
                device,
                core::ptr::null(),
                core::ptr::null(),
                1,
            );
            status_to_result(status)
        }
    }

    /// Opens a Block I/O protocol instance on `device`.
    pub fn block_io(&self, device: Handle) -> FwResult<*mut BlockIo> {
        self.handle_protocol::<BlockIo>(device, &BLOCK_IO_GUID)
    }

    /// Opens a Simple File System protocol instance on `device`.
    pub fn simple_file_system(&self, device: Handle) -> FwResult<*mut SimpleFileSystem> {
        self.handle_protocol::<SimpleFileSystem>(device, &SIMPLE_FILE_SYSTEM_GUID)
    }

    fn locate_handles(&self, guid: &[u8; 16], out: &mut [Handle]) -> FwResult<usize> {
        let mut buffer: *mut Handle = core::ptr::null_mut();
        let mut count = 0usize;
        let status = unsafe { (self.bs().locate_handle_buffer)(guid, &mut count, &mut buffer) };
        status_to_result(status)?;
        let n = count.min(out.len());
        for (i, slot) in out.iter_mut().enumerate().take(n) {
            *slot = unsafe { *buffer.add(i) };
        }
        unsafe {
            let _ = (self.bs().free_pool)(buffer as *mut u8);
        }
        Ok(n)
    }

    fn handle_protocol<T>(&self, handle: Handle, guid: &[u8; 16]) -> FwResult<*mut T> {
        let mut interface: *mut core::ffi::c_void = core::ptr::null_mut();
        let status = unsafe { (self.bs().handle_protocol)(handle, guid, &mut interface) };
        status_to_result(status)?;
        Ok(interface.cast())
    }

    fn locate_protocol<T>(&self, guid: &[u8; 16]) -> FwResult<*mut T> {
        // Most firmware exposes exactly one GOP/console instance; reuse the
        // handle-buffer path and take the first hit.
        let mut handles = [Handle(core::ptr::null_mut()); 4];
        let n = self.locate_handles(guid, &mut handles)?;
        if n == 0 {
            return Err(FirmwareError::NotFound);
        }
        self.handle_protocol(handles[0], guid)
    }
}

fn status_to_result(status: Status) -> FwResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status.into())
    }
}

/// Encodes an ASCII variable name to null-terminated UCS-2, the form every
/// firmware variable-store call takes (mirrors the stack-buffer encoding
/// `console::write` uses for console text). Names used by this crate are
/// short, fixed, compile-time string literals, so 32 code units is ample.
fn encode_variable_name(name: &str) -> [u16; 32] {
    let mut out = [0u16; 32];
    for (i, unit) in name.encode_utf16().take(31).enumerate() {
        out[i] = unit;
    }
    out
}
