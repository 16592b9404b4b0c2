//! `run_source` (spec.md §4.J): compiles a C source buffer into executable
//! memory, registers the workstation's API surface, and invokes its
//! `main`, recovering from an `exit`-style nonlocal jump the same way a
//! direct return is handled.

use alloc::string::{String, ToString};
use station_cc::{Arch, CompileOptions, CompileOutput, Compiler, OutputKind};
use station_fs::FilesystemKind;
use station_hal::FirmwareServices;
use station_memory::executable::ExecutableAllocator;
use station_nonlocal_exit::{SaveOutcome, ZERO_CODE_SENTINEL};
use station_storage::block::BlockDevice;

use crate::env::{self, RuntimeEnv, VolumeFileSource};

#[cfg(target_arch = "x86_64")]
const HOST_ARCH: Arch = Arch::X86_64;
#[cfg(target_arch = "aarch64")]
const HOST_ARCH: Arch = Arch::Arm64;

/// Result of a single `run_source` invocation (spec.md §4.J: "{exit_code,
/// success, error_msg}").
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub success: bool,
    pub error_msg: String,
}

/// Compiles and runs `src` (originally read from `filename`), optionally
/// against a mounted volume for the registered filesystem operations.
///
/// # Safety
/// Calls into freshly generated machine code with a C-ABI `main` symbol
/// and trusts it to honor that calling convention; a malformed program
/// that clobbers callee-saved registers or does not return through the
/// expected path has undefined behavior, as with any JIT.
pub unsafe fn run_source(
    fw: &FirmwareServices,
    filename: &str,
    src: &str,
    volume: Option<(BlockDevice, FilesystemKind)>,
) -> RunOutcome {
    let mut runtime_env = RuntimeEnv::new(*fw);
    if let Some((device, kind)) = volume {
        runtime_env.volume = Some(VolumeFileSource { fw: *fw, device, kind });
    }
    env::install(runtime_env);

    let outcome = compile_and_invoke(fw, filename, src);

    env::uninstall();
    outcome
}

unsafe fn compile_and_invoke(fw: &FirmwareServices, filename: &str, src: &str) -> RunOutcome {
    let mut options = CompileOptions::run_source_defaults();
    options.include_paths.push("/include".to_string());
    let mut compiler = Compiler::new(HOST_ARCH, options, OutputKind::Memory);

    for (name, address) in crate::api::symbol_table() {
        compiler.register_symbol(*name, *address);
    }

    let output = match compiler.compile(src, filename) {
        Ok(output) => output,
        Err(errors) => {
            return RunOutcome {
                exit_code: -1,
                success: false,
                error_msg: join_errors(filename, &errors),
            };
        }
    };

    let CompileOutput::Memory { code, entry_offsets, relocations } = output else {
        return RunOutcome {
            exit_code: -1,
            success: false,
            error_msg: String::from("compiler produced a firmware binary, not an in-memory image"),
        };
    };

    let Some(&main_offset) = entry_offsets.get("main") else {
        return RunOutcome {
            exit_code: -1,
            success: false,
            error_msg: String::from("No main() function found"),
        };
    };

    let exec = ExecutableAllocator::new(fw);
    let base = exec.allocate(code.len());
    if base.is_null() {
        return RunOutcome {
            exit_code: -1,
            success: false,
            error_msg: String::from("failed to allocate executable memory for compiled code"),
        };
    }

    unsafe { core::ptr::copy_nonoverlapping(code.as_ptr(), base, code.len()) };

    // ARM64's indirect `adrp`/`ldr :got:sym` sequences were left unrelaxed
    // by the compiler (they need the real load address, not known until
    // now); relax exactly once, in place, before anything calls into the
    // buffer (see station-cc's `CompileOutput::Memory` doc comment).
    if matches!(HOST_ARCH, Arch::Arm64) {
        let code_slice = unsafe { core::slice::from_raw_parts_mut(base, code.len()) };
        let registry = symbol_registry_for_relax(&relocations, fw);
        if let Err(e) = station_cc::relax::relax(code_slice, base as u64, &relocations, &registry) {
            return RunOutcome {
                exit_code: -1,
                success: false,
                error_msg: e.0,
            };
        }
    }

    let main_ptr = unsafe { base.add(main_offset) };
    let main_fn: extern "C" fn() -> i32 = unsafe { core::mem::transmute(main_ptr) };

    // `Context::save`'s landing site must stay live across the whole
    // `main_fn()` call below (spec.md §5: "the landing site is always one
    // frame up from the user code's entry"), so it is called directly in
    // this function's own frame, not from inside a closure handed to
    // `with_env` — that closure (and `with_env` itself) would already have
    // returned by the time a nonlocal exit from deep inside `main_fn()`
    // tried to jump back to it, resuming into stack space some later call
    // had since reused. Only the raw `Context` pointer comes out of the
    // locked singleton; the lock itself is released well before `main_fn`
    // runs, since `main_fn`'s own libc-shim calls re-enter `with_env`.
    let ctx_ptr: *mut station_nonlocal_exit::Context = env::with_env(|runtime| {
        runtime.ctx.arm();
        &mut runtime.ctx as *mut _
    });
    let outcome = unsafe { (*ctx_ptr).save() };

    match outcome {
        SaveOutcome::DirectReturn => {
            let code = main_fn();
            env::with_env(|runtime| runtime.ctx.disarm());
            RunOutcome { exit_code: code, success: true, error_msg: String::new() }
        }
        SaveOutcome::NonlocalReturn { code } => {
            env::with_env(|runtime| runtime.ctx.disarm());
            let code = if code == ZERO_CODE_SENTINEL { 0 } else { code as i32 };
            RunOutcome { exit_code: code, success: true, error_msg: String::new() }
        }
    }
}

/// Rebuilds a lookup the relax pass can use to re-resolve absolute
/// addresses for the external symbols it relaxes against. The compiler's
/// own registry already holds these; `relax::relax` only needs read
/// access to it, so this simply re-registers the same entries the
/// compiler had (the compiler itself is already consumed by `compile`).
fn symbol_registry_for_relax(
    relocations: &[station_cc::Relocation],
    _fw: &FirmwareServices,
) -> station_cc::SymbolRegistry {
    // `compile` only left the call sites; the addresses were already baked
    // into each `Relocation` by the code generator's symbol lookup, so the
    // registry `relax` consults here only needs the same entries restated.
    let mut registry = station_cc::SymbolRegistry::new();
    for (name, address) in crate::api::symbol_table() {
        registry.register(*name, *address);
    }
    let _ = relocations;
    registry
}

fn join_errors(filename: &str, errors: &[station_cc::CompileError]) -> String {
    let mut out = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&alloc::format!("{filename}:{}: {}", e.line, e.message));
    }
    out
}
