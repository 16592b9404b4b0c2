//! x86_64 save/restore (spec.md §4.G): callee-saved general registers plus
//! stack and return-address handling, mirroring the calling convention's
//! own context-switch shape.

use core::arch::naked_asm;

#[repr(C)]
pub struct RawContext {
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    rbx: u64,
    rbp: u64,
    rip: u64,
    rsp: u64,
}

impl RawContext {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            rip: 0,
            rsp: 0,
        }
    }
}

/// Saves callee-saved registers, the caller's return address and stack
/// pointer into `ctx`, then returns 0 via the normal `ret` path.
#[unsafe(naked)]
pub unsafe extern "C" fn nonlocal_save(_ctx: *mut RawContext) -> u64 {
    naked_asm!(
            "mov [rdi + 0x00], r15",
            "mov [rdi + 0x08], r14",
            "mov [rdi + 0x10], r13",
            "mov [rdi + 0x18], r12",
            "mov [rdi + 0x20], rbx",
            "mov [rdi + 0x28], rbp",
            "mov rax, [rsp]",        // return address pushed by the caller's `call`
            "mov [rdi + 0x30], rax", // ctx->rip
            "lea rax, [rsp + 8]",    // caller's rsp, above our own return address
            "mov [rdi + 0x38], rax", // ctx->rsp
            "xor eax, eax",          // direct return value is always 0
            "ret",
        );
}

/// Restores `ctx` and jumps to the saved return address with `rax` set to
/// `code`, so the original `nonlocal_save` call site sees `code` as its
/// return value. Never returns.
#[unsafe(naked)]
pub unsafe extern "C" fn nonlocal_jump(_ctx: *const RawContext, _code: u64) -> ! {
    naked_asm!(
            "mov r15, [rdi + 0x00]",
            "mov r14, [rdi + 0x08]",
            "mov r13, [rdi + 0x10]",
            "mov r12, [rdi + 0x18]",
            "mov rbx, [rdi + 0x20]",
            "mov rbp, [rdi + 0x28]",
            "mov rax, rsi",          // code becomes nonlocal_save's return value
            "mov rcx, [rdi + 0x30]", // saved rip
            "mov rsp, [rdi + 0x38]", // saved rsp
            "jmp rcx",
        );
}
