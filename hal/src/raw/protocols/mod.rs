//! Raw protocol bindings consumed by the facade: console I/O, graphics
//! output, block I/O, simple file system/file, loaded image. Grouped here
//! the way the firmware specification groups them — one struct of function
//! pointers per protocol, keyed by GUID at discovery time.

use super::{Handle, Status};
use core::ffi::c_void;

/// `EFI_GUID`-equivalent protocol identifier.
pub type ProtocolGuid = [u8; 16];

pub const GRAPHICS_OUTPUT_GUID: ProtocolGuid = [
    0x9d, 0x9a, 0x9e, 0x90, 0x95, 0x60, 0xd2, 0x11, 0x8e, 0x39, 0x00, 0xa0, 0xc9, 0x69, 0x72, 0x3b,
];
pub const BLOCK_IO_GUID: ProtocolGuid = [
    0x61, 0x1d, 0xb4, 0x96, 0xb4, 0x5f, 0xd2, 0x11, 0x94, 0xf3, 0x00, 0x90, 0x27, 0x3f, 0xc1, 0x4d,
];
pub const SIMPLE_FILE_SYSTEM_GUID: ProtocolGuid = [
    0x64, 0x36, 0x22, 0x96, 0x9f, 0x9f, 0xd2, 0x11, 0x9f, 0xc2, 0x00, 0x09, 0x92, 0xff, 0x2c, 0xb9,
];
pub const LOADED_IMAGE_GUID: ProtocolGuid = [
    0x6f, 0xcc, 0x81, 0x5d, 0x11, 0x36, 0x03, 0x4a, 0x96, 0x4f, 0xe5, 0xf8, 0x1e, 0xba, 0xb8, 0x3a,
];

#[repr(C)]
pub struct SimpleTextOutput {
    pub reset: unsafe extern "efiapi" fn(this: *mut Self, extended: u8) -> Status,
    pub output_string: unsafe extern "efiapi" fn(this: *mut Self, string: *const u16) -> Status,
    pub clear_screen: unsafe extern "efiapi" fn(this: *mut Self) -> Status,
    pub set_attribute: unsafe extern "efiapi" fn(this: *mut Self, attribute: usize) -> Status,
}

#[repr(C)]
pub struct InputKey {
    pub scan_code: u16,
    pub unicode_char: u16,
}

#[repr(C)]
pub struct SimpleTextInput {
    pub reset: unsafe extern "efiapi" fn(this: *mut Self, extended: u8) -> Status,
    pub read_key_stroke: unsafe extern "efiapi" fn(this: *mut Self, key: *mut InputKey) -> Status,
}

bitflags::bitflags! {
    /// Extended key-state shift bits, per the Simple Text Input Ex protocol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShiftState: u32 {
        const SHIFT_STATE_VALID    = 1 << 31;
        const RIGHT_SHIFT_PRESSED  = 1 << 0;
        const LEFT_SHIFT_PRESSED   = 1 << 1;
        const RIGHT_CONTROL_PRESSED = 1 << 2;
        const LEFT_CONTROL_PRESSED  = 1 << 3;
        const RIGHT_ALT_PRESSED    = 1 << 4;
        const LEFT_ALT_PRESSED     = 1 << 5;
    }
}

#[repr(C)]
pub struct KeyData {
    pub key: InputKey,
    pub key_shift_state: ShiftState,
}

#[repr(C)]
pub struct SimpleTextInputEx {
    pub reset: unsafe extern "efiapi" fn(this: *mut Self, extended: u8) -> Status,
    pub read_key_stroke_ex:
        unsafe extern "efiapi" fn(this: *mut Self, key_data: *mut KeyData) -> Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    BitMask,
    BltOnly,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GraphicsModeInfo {
    pub version: u32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub pixel_format: PixelFormat,
    pub pixels_per_scan_line: u32,
}

#[repr(C)]
pub struct GraphicsMode {
    pub max_mode: u32,
    pub mode: u32,
    pub info: *mut GraphicsModeInfo,
    pub size_of_info: usize,
    pub frame_buffer_base: u64,
    pub frame_buffer_size: usize,
}

#[repr(C)]
pub struct GraphicsOutput {
    pub query_mode: unsafe extern "efiapi" fn(
        this: *mut Self,
        mode_number: u32,
        size_of_info: *mut usize,
        info: *mut *mut GraphicsModeInfo,
    ) -> Status,
    pub set_mode: unsafe extern "efiapi" fn(this: *mut Self, mode_number: u32) -> Status,
    pub mode: *mut GraphicsMode,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockIoMedia {
    pub media_id: u32,
    pub removable_media: u8,
    pub media_present: u8,
    pub read_only: u8,
    pub block_size: u32,
    pub last_block: u64,
}

#[repr(C)]
pub struct BlockIo {
    pub media: *mut BlockIoMedia,
    pub reset: unsafe extern "efiapi" fn(this: *mut Self, extended: u8) -> Status,
    pub read_blocks: unsafe extern "efiapi" fn(
        this: *mut Self,
        media_id: u32,
        lba: u64,
        buffer_size: usize,
        buffer: *mut c_void,
    ) -> Status,
    pub write_blocks: unsafe extern "efiapi" fn(
        this: *mut Self,
        media_id: u32,
        lba: u64,
        buffer_size: usize,
        buffer: *const c_void,
    ) -> Status,
    pub flush_blocks: unsafe extern "efiapi" fn(this: *mut Self) -> Status,
}

#[repr(C)]
pub struct File {
    pub open: unsafe extern "efiapi" fn(
        this: *mut Self,
        new_handle: *mut *mut Self,
        file_name: *const u16,
        open_mode: u64,
        attributes: u64,
    ) -> Status,
    pub close: unsafe extern "efiapi" fn(this: *mut Self) -> Status,
    pub delete: unsafe extern "efiapi" fn(this: *mut Self) -> Status,
    pub read:
        unsafe extern "efiapi" fn(this: *mut Self, buffer_size: *mut usize, buffer: *mut c_void) -> Status,
    pub write: unsafe extern "efiapi" fn(
        this: *mut Self,
        buffer_size: *mut usize,
        buffer: *const c_void,
    ) -> Status,
    pub set_position: unsafe extern "efiapi" fn(this: *mut Self, position: u64) -> Status,
    pub get_position: unsafe extern "efiapi" fn(this: *mut Self, position: *mut u64) -> Status,
    pub get_info: unsafe extern "efiapi" fn(
        this: *mut Self,
        information_type: *const ProtocolGuid,
        buffer_size: *mut usize,
        buffer: *mut c_void,
    ) -> Status,
    pub set_info: unsafe extern "efiapi" fn(
        this: *mut Self,
        information_type: *const ProtocolGuid,
        buffer_size: usize,
        buffer: *const c_void,
    ) -> Status,
}

#[repr(C)]
pub struct SimpleFileSystem {
    pub open_volume: unsafe extern "efiapi" fn(this: *mut Self, root: *mut *mut File) -> Status,
}

#[repr(C)]
pub struct LoadedImage {
    pub revision: u32,
    pub parent_handle: Handle,
    pub device_handle: Handle,
}
