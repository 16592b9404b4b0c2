//! SURV payload format (spec.md §4.L): the packed, multi-architecture,
//! compressed blob a companion microcontroller's flasher writes onto a
//! target card's boot partition. This crate is the shared, `no_std`
//! half of the format — layout constants and a zero-copy reader — used
//! directly by the flasher. The producer-side `clap` tool that builds
//! these blobs from an ESP tree lives in the sibling `payload/pack`
//! crate, which depends on this one for the layout it writes.

#![no_std]

extern crate alloc;

pub mod format;
pub mod inflate;
pub mod reader;

pub use format::{Arch, STORE_THRESHOLD};
pub use inflate::{inflate, InflateError};
pub use reader::{ArchView, ManifestEntry, PayloadError, PayloadView};
