//! Program termination (spec.md §4.F "Program termination"): `exit`,
//! `abort`, `_exit`. When the nonlocal-exit context is armed, jump to the
//! landing site with the requested code (0 substituted with the sentinel);
//! when not armed, there is no caller expecting a return, so spin forever.

use station_nonlocal_exit::Context;

/// Terminates the running compiled program. Never returns.
///
/// # Safety
/// `ctx` must be the same context most recently `save`d by the runtime
/// wrapper currently executing compiled code, and that save site's stack
/// frame must still be live.
pub unsafe fn exit(ctx: &Context, code: i32) -> ! {
    if ctx.is_armed() {
        unsafe { ctx.jump(code as u64) }
    } else {
        spin_forever()
    }
}

/// `abort` is `exit` with a fixed, recognizable nonzero code.
pub unsafe fn abort(ctx: &Context) -> ! {
    unsafe { exit(ctx, 134) } // matches the POSIX SIGABRT exit-status convention
}

/// `_exit` skips any libc-level cleanup this shim doesn't have anyway, so
/// it behaves identically to `exit` here.
pub unsafe fn sys_exit(ctx: &Context, code: i32) -> ! {
    unsafe { exit(ctx, code) }
}

fn spin_forever() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
