//! # Firmware Services Facade
//!
//! A uniform, language-neutral view of firmware-provided capabilities:
//! console I/O, memory allocation (data and executable), timer/stall,
//! graphics framebuffer discovery and mode selection, keyboard input (with
//! modifier state where available), block device enumeration, file-service
//! volumes, and reset/shutdown.
//!
//! Everything in [`raw`] is a direct binding to the firmware ABI; everything
//! else in this crate is a safe wrapper reachable only through
//! [`services::FirmwareServices`].
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod console;
pub mod error;
pub mod graphics;
pub mod keyboard;
pub mod raw;
pub mod services;

pub use error::{FirmwareError, FwResult};
pub use services::FirmwareServices;
