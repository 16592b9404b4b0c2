//! Code-Execution Runtime Wrapper and Self-Rebuild Driver (spec.md §4.J,
//! §4.K): places the bundled compiler's output into executable memory (or
//! writes it to the boot path) and exposes the workstation's API surface
//! to compiled code as plain C-ABI function pointers.

#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

extern crate alloc;

pub mod api;
pub mod env;
pub mod rebuild;
pub mod run_source;

pub use env::{BootState, RuntimeEnv};
pub use rebuild::{rebuild, DocumentBuffer, RebuildResult, MANIFEST};
pub use run_source::{run_source, RunOutcome};
