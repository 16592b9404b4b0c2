//! Flasher Orchestrator (spec.md §4.M): enumerates target media, writes
//! a fresh GPT and FAT32 filesystem, and unpacks a [`station_payload`]
//! blob onto it. Sequencing is independent of any concrete touch/display
//! driver — see [`ui::FlasherUi`].

#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

extern crate alloc;

pub mod guid;
pub mod orchestrator;
pub mod partition_io;
pub mod ui;

pub use guid::GuidSource;
pub use orchestrator::{flash, select_and_confirm};
pub use ui::{FlashOutcome, FlasherUi, RecordingUi};
