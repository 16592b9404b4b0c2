//! Libc Substitution Shim (spec.md §4.F): ~50 entry points the bundled
//! compiler's generated code links against in place of a real libc.
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod ctype;
pub mod fd;
pub mod mem;
pub mod parse;
pub mod printf;
pub mod ring;
pub mod sink;
pub mod string;
pub mod stubs;
pub mod term;

pub use fd::{FdTable, FileSource};
pub use printf::{vsnprintf, Arg};
pub use ring::DiagnosticRing;
pub use sink::OutputSink;
