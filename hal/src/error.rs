//! Firmware error taxonomy.
//!
//! Every fallible operation in the workstation — firmware call, block I/O,
//! filesystem access — resolves to one of these variants. UI-presenting
//! callers translate a `FirmwareError` into a status-bar message; nothing
//! below the main loop ever panics on a firmware error.

use core::fmt;

/// Error taxonomy shared by every layer that talks to firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// Requested object does not exist (file, device, protocol).
    NotFound,
    /// Caller-supplied argument invalid.
    BadParameter,
    /// Operation not implemented for this target.
    Unsupported,
    /// Allocation or handle exhaustion.
    OutOfResources,
    /// Hardware-level I/O failure.
    DeviceError,
    /// Read-only volume, protected region, or boot device targeted by a
    /// destructive operation.
    AccessDenied,
    /// Caller must re-issue with a larger buffer.
    BufferTooSmall,
    /// No input available from a non-blocking poll.
    NotReady,
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::BadParameter => "bad parameter",
            Self::Unsupported => "unsupported",
            Self::OutOfResources => "out of resources",
            Self::DeviceError => "device error",
            Self::AccessDenied => "access denied",
            Self::BufferTooSmall => "buffer too small",
            Self::NotReady => "not ready",
        };
        f.write_str(s)
    }
}

/// Shorthand used throughout the workstation crates.
pub type FwResult<T> = Result<T, FirmwareError>;
