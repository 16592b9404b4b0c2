//! Bundled C compiler core (spec.md §4.H, §4.I): a small, self-contained
//! C-subset compiler with ARM64 and x86_64 code generators, ARM64
//! relocation relaxation, and a PE32+ firmware binary writer.
//!
//! This crate has no dependency on firmware services — `station-hal` and
//! `station-memory` are only needed by the runtime layer that places
//! generated code in executable memory or writes a file to disk.

#![no_std]

extern crate alloc;

pub mod ast;
pub mod codegen_arm64;
pub mod codegen_x86_64;
pub mod compiler;
pub mod parser;
pub mod pe;
pub mod relax;
pub mod symbol;
pub mod token;

pub use codegen_arm64::Relocation;
pub use compiler::{Arch, CompileError, CompileOptions, CompileOutput, Compiler, OutputKind};
pub use symbol::SymbolRegistry;
