//! The retargetable compiler driver (spec.md §4.H): accepts source text,
//! a symbol registry for named externals, include paths, an output kind,
//! and drives tokenizer → parser → one of the two code generators →
//! (ARM64 only) relocation relaxation → output assembly.
//!
//! `run_source`/`rebuild` (spec.md §4.J, §4.K) are one layer up, in the
//! runtime crate, because they need `station-hal` and `station-memory` to
//! actually place code in executable memory or write a file — this crate
//! stays free of firmware-service dependencies so the compiler core can
//! be exercised with ordinary host unit tests.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::codegen_arm64::{Arm64Codegen, Relocation};
use crate::codegen_x86_64::X86_64Codegen;
use crate::pe;
use crate::relax;
use crate::symbol::SymbolRegistry;
use crate::token::Lexer;
use crate::parser::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Arm64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Generate code into a caller-supplied executable buffer and expose
    /// symbol lookup; used by `run_source`.
    Memory,
    /// Generate a standalone PE32+ firmware binary; used by `rebuild`.
    FirmwareBinary,
}

#[derive(Debug, Default, Clone)]
pub struct CompileOptions {
    pub nostdlib: bool,
    pub nostdinc: bool,
    pub werror: bool,
    pub subsystem_efiapp: bool,
    pub entry_symbol: Option<String>,
    pub include_paths: Vec<String>,
    pub defines: Vec<(String, Option<String>)>,
}

impl CompileOptions {
    /// `-nostdlib -nostdinc`, as `run_source` (spec.md §4.J step 2) sets.
    pub fn run_source_defaults() -> Self {
        Self {
            nostdlib: true,
            nostdinc: true,
            ..Default::default()
        }
    }

    /// `-nostdlib -nostdinc -Werror -Wl,-subsystem=efiapp -Wl,-e=efi_main`,
    /// as `rebuild` (spec.md §4.K step 2) sets.
    pub fn rebuild_defaults() -> Self {
        Self {
            nostdlib: true,
            nostdinc: true,
            werror: true,
            subsystem_efiapp: true,
            entry_symbol: Some(String::from("efi_main")),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

pub enum CompileOutput {
    /// Raw machine code plus each top-level function's byte offset into
    /// it, still registry-relative (not yet rebased to a load address).
    /// `relocations` is non-empty only for ARM64: the indirect
    /// `adrp`/`ldr :got:sym` sequences [`crate::codegen_arm64`] emits are
    /// left unrelaxed here, since the real load address isn't known until
    /// the runtime crate places `code` in executable memory. The caller
    /// must run [`crate::relax::relax`] against that real address before
    /// executing the buffer.
    Memory {
        code: Vec<u8>,
        entry_offsets: BTreeMap<String, usize>,
        relocations: Vec<Relocation>,
    },
    FirmwareBinary(Vec<u8>),
}

pub struct Compiler {
    arch: Arch,
    options: CompileOptions,
    output_kind: OutputKind,
    registry: SymbolRegistry,
}

impl Compiler {
    pub fn new(arch: Arch, options: CompileOptions, output_kind: OutputKind) -> Self {
        Self {
            arch,
            options,
            output_kind,
            registry: SymbolRegistry::new(),
        }
    }

    pub fn register_symbol(&mut self, name: impl Into<String>, address: u64) {
        self.registry.register(name, address);
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<u64> {
        self.registry.lookup(name)
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Lexes, parses and generates code for `source`. `filename` is woven
    /// in as a `#line 1 "<filename>"` directive so parse errors report
    /// positions against the caller's file (spec.md §4.J step 4).
    pub fn compile(&mut self, source: &str, filename: &str) -> Result<CompileOutput, Vec<CompileError>> {
        let full_source = alloc::format!("#line 1 \"{filename}\"\n{source}");
        let tokens = Lexer::new(&full_source).tokenize();
        let program = Parser::new(tokens)
            .parse_program()
            .map_err(|e| alloc::vec![CompileError { line: e.line, message: e.message }])?;

        if program.functions.is_empty() {
            return Err(alloc::vec![CompileError {
                line: 0,
                message: String::from("translation unit defines no functions"),
            }]);
        }

        match self.arch {
            Arch::X86_64 => self.compile_x86_64(&program),
            Arch::Arm64 => self.compile_arm64(&program),
        }
    }

    fn compile_x86_64(&mut self, program: &crate::ast::Program) -> Result<CompileOutput, Vec<CompileError>> {
        let mut gen = X86_64Codegen::new(&self.registry);
        let mut entries = BTreeMap::new();
        for func in &program.functions {
            let offset = gen
                .emit_function(func)
                .map_err(|e| alloc::vec![CompileError { line: 0, message: e.0 }])?;
            entries.insert(func.name.clone(), offset);
        }
        let code = gen.into_code();
        self.finish(code, entries, Vec::new(), pe::machine::AMD64)
    }

    fn compile_arm64(&mut self, program: &crate::ast::Program) -> Result<CompileOutput, Vec<CompileError>> {
        let mut gen = Arm64Codegen::new(&self.registry);
        let mut entries = BTreeMap::new();
        for func in &program.functions {
            let offset = gen
                .emit_function(func)
                .map_err(|e| alloc::vec![CompileError { line: 0, message: e.0 }])?;
            entries.insert(func.name.clone(), offset);
        }
        let (mut code, relocations) = gen.into_parts();

        match self.output_kind {
            OutputKind::FirmwareBinary => {
                let base_address = pe::image_base() + pe::code_virtual_address() as u64;
                relax::relax(&mut code, base_address, &relocations, &self.registry)
                    .map_err(|e| alloc::vec![CompileError { line: 0, message: e.0 }])?;
                self.finish(code, entries, Vec::new(), pe::machine::ARM64)
            }
            // Left unrelaxed: the runtime crate calls `relax::relax` again
            // once `code` has a real executable-memory address.
            OutputKind::Memory => self.finish(code, entries, relocations, pe::machine::ARM64),
        }
    }

    fn finish(
        &mut self,
        code: Vec<u8>,
        entries: BTreeMap<String, usize>,
        relocations: Vec<Relocation>,
        machine: u16,
    ) -> Result<CompileOutput, Vec<CompileError>> {
        match self.output_kind {
            OutputKind::Memory => {
                for (name, offset) in &entries {
                    self.registry.register(name.clone(), *offset as u64);
                }
                Ok(CompileOutput::Memory { code, entry_offsets: entries, relocations })
            }
            OutputKind::FirmwareBinary => {
                let entry_name = self.options.entry_symbol.as_deref().unwrap_or("main");
                let entry_offset = *entries.get(entry_name).ok_or_else(|| {
                    alloc::vec![CompileError {
                        line: 0,
                        message: alloc::format!("entry point '{entry_name}' not found"),
                    }]
                })?;
                let image = pe::write_firmware_binary(machine, &code, entry_offset as u32)
                    .map_err(|e| alloc::vec![CompileError { line: 0, message: String::from(e.0) }])?;
                Ok(CompileOutput::FirmwareBinary(image))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_return_constant_to_memory_output() {
        let mut compiler = Compiler::new(Arch::X86_64, CompileOptions::run_source_defaults(), OutputKind::Memory);
        let output = compiler.compile("int main(void) { return 42; }", "scenario1.c").unwrap();
        match output {
            CompileOutput::Memory { code, entry_offsets, relocations } => {
                assert!(!code.is_empty());
                assert_eq!(entry_offsets.get("main"), Some(&0));
                assert!(relocations.is_empty());
            }
            _ => panic!("expected Memory output"),
        }
    }

    #[test]
    fn arm64_memory_output_leaves_relocations_for_the_caller() {
        let mut compiler = Compiler::new(Arch::Arm64, CompileOptions::run_source_defaults(), OutputKind::Memory);
        compiler.register_symbol("exit", 0x2000);
        let output = compiler
            .compile("int main(void) { exit(1); return 0; }", "scenario.c")
            .unwrap();
        match output {
            CompileOutput::Memory { relocations, .. } => assert_eq!(relocations.len(), 1),
            _ => panic!("expected Memory output"),
        }
    }

    #[test]
    fn calling_unregistered_external_is_a_compile_error() {
        let mut compiler = Compiler::new(Arch::X86_64, CompileOptions::run_source_defaults(), OutputKind::Memory);
        let errors = compiler
            .compile("int main(void) { exit(7); return 0; }", "scenario2.c")
            .unwrap_err();
        assert!(errors[0].message.contains("exit"));
    }

    #[test]
    fn syntax_error_is_reported_on_line_one_after_line_directive_injection() {
        let mut compiler = Compiler::new(Arch::X86_64, CompileOptions::run_source_defaults(), OutputKind::Memory);
        let errors = compiler.compile("int main(void) { return ; }", "scenario3.c").unwrap_err();
        assert_eq!(errors[0].line, 1);
    }

    #[test]
    fn firmware_binary_output_requires_named_entry_point() {
        let mut compiler = Compiler::new(
            Arch::X86_64,
            CompileOptions::rebuild_defaults(),
            OutputKind::FirmwareBinary,
        );
        let errors = compiler.compile("int main(void) { return 0; }", "unity.c").unwrap_err();
        assert!(errors[0].message.contains("efi_main"));
    }

    #[test]
    fn firmware_binary_output_succeeds_with_matching_entry_point() {
        let mut compiler = Compiler::new(
            Arch::X86_64,
            CompileOptions::rebuild_defaults(),
            OutputKind::FirmwareBinary,
        );
        let output = compiler.compile("int efi_main(void) { return 0; }", "unity.c").unwrap();
        match output {
            CompileOutput::FirmwareBinary(image) => assert!(!image.is_empty()),
            _ => panic!("expected FirmwareBinary output"),
        }
    }

    #[test]
    fn arm64_firmware_binary_relaxes_external_calls() {
        let mut compiler = Compiler::new(
            Arch::Arm64,
            CompileOptions::rebuild_defaults(),
            OutputKind::FirmwareBinary,
        );
        compiler.register_symbol("exit", 0x1000_3000);
        let output = compiler
            .compile("int efi_main(void) { exit(1); return 0; }", "unity.c")
            .unwrap();
        match output {
            CompileOutput::FirmwareBinary(image) => assert!(!image.is_empty()),
            _ => panic!("expected FirmwareBinary output"),
        }
    }
}
