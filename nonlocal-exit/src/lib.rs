//! Nonlocal Exit (spec.md §4.G): save/restore a machine context so the
//! libc shim's `exit`/`abort`/`_exit` can unwind out of user-compiled code
//! without returning through its call stack.
//!
//! Semantic contract (spec.md §8 property 7): the save routine returns zero
//! on its initial, direct return and returns the caller-supplied code on
//! the nonlocal return. The restore routine never returns. A caller-
//! supplied code of zero is substituted with 1 so the landing site's
//! predicate can always tell the two paths apart.
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

#[cfg(target_arch = "x86_64")]
mod x86_64_impl;
#[cfg(target_arch = "aarch64")]
mod aarch64_impl;

#[cfg(target_arch = "x86_64")]
use x86_64_impl::{nonlocal_jump, nonlocal_save, RawContext};
#[cfg(target_arch = "aarch64")]
use aarch64_impl::{nonlocal_jump, nonlocal_save, RawContext};

use core::sync::atomic::{AtomicBool, Ordering};

/// Sentinel substituted for a caller-supplied exit code of zero, so the
/// landing site can distinguish "initial call returned 0" from "nonlocal
/// exit requested code 0".
pub const ZERO_CODE_SENTINEL: u64 = 0xE0E0_0E0E;

/// A single armable nonlocal-exit context. The workstation keeps exactly
/// one of these live per compiled-and-run program (spec.md §4.J step 7:
/// "Arm the nonlocal-exit context").
pub struct Context {
    raw: RawContext,
    armed: AtomicBool,
}

/// Outcome of [`Context::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The initial, direct return from `save` — the caller should now run
    /// the protected code.
    DirectReturn,
    /// A nonlocal jump landed here with `code`. `code` is never zero; a
    /// requested code of zero arrives here as [`ZERO_CODE_SENTINEL`].
    NonlocalReturn { code: u64 },
}

impl Context {
    pub const fn new() -> Self {
        Self {
            raw: RawContext::zeroed(),
            armed: AtomicBool::new(false),
        }
    }

    /// Arms the context so a subsequent [`jump`](Self::jump) targets it.
    /// Must be called again after every `save`, since `jump` reads whatever
    /// was last saved.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Disarms the context. `jump` on a disarmed context is a programming
    /// error in the caller (spec.md gives it no defined behavior); this
    /// crate leaves enforcement to the libc shim, which checks `is_armed`
    /// before calling `jump`.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Saves the current machine state into this context. Returns
    /// [`SaveOutcome::DirectReturn`] on the initial call; if a later
    /// [`jump`](Self::jump) targets this context, control resumes here
    /// instead, and this call returns [`SaveOutcome::NonlocalReturn`].
    ///
    /// # Safety
    /// The context must outlive any later call to `jump` that targets it,
    /// and the stack frame active during `save` must still be live (i.e.
    /// the function that called `save` must not itself have returned) when
    /// `jump` is invoked.
    #[inline(never)]
    pub unsafe fn save(&mut self) -> SaveOutcome {
        let code = nonlocal_save(&mut self.raw);
        if code == 0 {
            SaveOutcome::DirectReturn
        } else {
            SaveOutcome::NonlocalReturn { code }
        }
    }

    /// Performs the nonlocal jump back to the last [`save`](Self::save)
    /// call on this context, substituting a zero code with
    /// [`ZERO_CODE_SENTINEL`]. Never returns.
    ///
    /// # Safety
    /// `self` must have been armed and successfully `save`d, and that save
    /// site's stack frame must still be on the stack.
    pub unsafe fn jump(&self, code: u64) -> ! {
        let effective = if code == 0 { ZERO_CODE_SENTINEL } else { code };
        nonlocal_jump(&self.raw, effective)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    #[test]
    fn direct_return_then_nonlocal_return_with_value() {
        let mut ctx = Context::new();
        ctx.arm();
        let outcome = unsafe { ctx.save() };
        match outcome {
            SaveOutcome::DirectReturn => {
                // Simulate user code performing a nonlocal exit with code 5.
                unsafe { ctx.jump(5) };
            }
            SaveOutcome::NonlocalReturn { code } => {
                assert_eq!(code, 5);
                ctx.disarm();
                return;
            }
        }
        unreachable!("jump never returns");
    }

    #[test]
    fn zero_code_arrives_as_sentinel() {
        let mut ctx = Context::new();
        ctx.arm();
        let outcome = unsafe { ctx.save() };
        match outcome {
            SaveOutcome::DirectReturn => {
                unsafe { ctx.jump(0) };
            }
            SaveOutcome::NonlocalReturn { code } => {
                assert_eq!(code, ZERO_CODE_SENTINEL);
                assert_ne!(code, 0);
                return;
            }
        }
        unreachable!("jump never returns");
    }
}
