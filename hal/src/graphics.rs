//! Graphics mode discovery and the linear framebuffer contract.
//!
//! Invariant (spec.md §3): the pixel at `(x, y)` lies at
//! `base[y*stride + x]` for as long as boot services remain active; the
//! region is writable throughout the session.

use crate::error::{FirmwareError, FwResult};
use crate::raw::protocols::{GraphicsOutput, PixelFormat as RawPixelFormat};

/// Pixel layout of the framebuffer. The workstation assumes 32-bit
/// little-endian BGRA; `Other` is retained so a caller can at least detect
/// and refuse an unsupported mode rather than mis-render silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra32,
    Rgba32,
    Other,
}

impl From<RawPixelFormat> for PixelFormat {
    fn from(raw: RawPixelFormat) -> Self {
        match raw {
            RawPixelFormat::Bgr8 => Self::Bgra32,
            RawPixelFormat::Rgb8 => Self::Rgba32,
            RawPixelFormat::BitMask | RawPixelFormat::BltOnly => Self::Other,
        }
    }
}

/// A single candidate graphics mode, as returned by mode enumeration.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsModeDescription {
    pub mode_number: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixel_format: PixelFormat,
}

/// The active mode, including the linear framebuffer base pointer.
#[derive(Debug, Clone, Copy)]
pub struct ActiveGraphicsMode {
    pub description: GraphicsModeDescription,
    pub framebuffer_base: *mut u8,
    pub framebuffer_len: usize,
}

unsafe impl Send for ActiveGraphicsMode {}

impl ActiveGraphicsMode {
    /// Byte offset of pixel `(x, y)` within the framebuffer, per the §3
    /// invariant. Callers are responsible for bounds-checking against
    /// `width`/`height` before using the offset.
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.description.stride as usize + x as usize) * 4
    }
}

/// Probes the Graphics Output Protocol instance for its current mode and,
/// separately, the full list of modes available for selection (the
/// `[SUPPLEMENT]` in SPEC_FULL.md 4.A over the distilled spec's single
/// "current mode only" probe).
pub fn probe(gop: *mut GraphicsOutput) -> FwResult<ActiveGraphicsMode> {
    if gop.is_null() {
        return Err(FirmwareError::NotFound);
    }
    let mode = unsafe { (*gop).mode };
    if mode.is_null() {
        return Err(FirmwareError::DeviceError);
    }
    let info = unsafe { (*mode).info };
    if info.is_null() {
        return Err(FirmwareError::DeviceError);
    }
    let info = unsafe { &*info };
    let description = GraphicsModeDescription {
        mode_number: unsafe { (*mode).mode },
        width: info.horizontal_resolution,
        height: info.vertical_resolution,
        stride: info.pixels_per_scan_line,
        pixel_format: info.pixel_format.into(),
    };
    Ok(ActiveGraphicsMode {
        description,
        framebuffer_base: unsafe { (*mode).frame_buffer_base as *mut u8 },
        framebuffer_len: unsafe { (*mode).frame_buffer_size },
    })
}

/// Enumerates every mode the Graphics Output Protocol instance offers, for
/// a settings screen that lets the user pick a resolution.
pub fn enumerate_modes(gop: *mut GraphicsOutput, out: &mut [GraphicsModeDescription]) -> usize {
    if gop.is_null() {
        return 0;
    }
    let max_mode = unsafe { (*(*gop).mode).max_mode };
    let mut count = 0;
    for mode_number in 0..max_mode {
        if count >= out.len() {
            break;
        }
        let mut size_of_info = 0usize;
        let mut info_ptr = core::ptr::null_mut();
        let status = unsafe { ((*gop).query_mode)(gop, mode_number, &mut size_of_info, &mut info_ptr) };
        if !status.is_success() || info_ptr.is_null() {
            continue;
        }
        let info = unsafe { &*info_ptr };
        out[count] = GraphicsModeDescription {
            mode_number,
            width: info.horizontal_resolution,
            height: info.vertical_resolution,
            stride: info.pixels_per_scan_line,
            pixel_format: info.pixel_format.into(),
        };
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_offset_matches_stride_invariant() {
        let active = ActiveGraphicsMode {
            description: GraphicsModeDescription {
                mode_number: 0,
                width: 800,
                height: 600,
                stride: 832,
                pixel_format: PixelFormat::Bgra32,
            },
            framebuffer_base: core::ptr::null_mut(),
            framebuffer_len: 832 * 600 * 4,
        };
        assert_eq!(active.pixel_offset(0, 0), 0);
        assert_eq!(active.pixel_offset(10, 2), (2 * 832 + 10) * 4);
    }
}
