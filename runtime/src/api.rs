//! The C-ABI shim surface registered into the compiler's symbol table
//! before every `run_source`/`rebuild` compile (spec.md §4.J step 3).
//!
//! Every function here is `extern "C"` and takes only the arguments a call
//! site in compiled C can actually supply — no hidden allocator or context
//! parameter — and reaches the live [`crate::env::RuntimeEnv`] through
//! [`crate::env::with_env`]. `printf`/`snprintf` are registered with a
//! small fixed arity rather than true varargs: the bundled code generator
//! only emits fixed-argument calls (spec.md's C subset has no `...`
//! parameters), so every format argument beyond the format string itself
//! is passed as a plain `i64` and reinterpreted as [`station_libc::Arg::Signed`].

use station_libc::{fd, mem, printf, string, term, Arg};

/// Registers every entry point this module exposes into `compiler`,
/// returning the list `run_source`/`rebuild` feed to `Compiler::register_symbol`.
/// Addresses are the trampolines' own function-pointer values, reachable
/// because the compiled code and this runtime share one address space.
pub fn symbol_table() -> &'static [(&'static str, u64)] {
    static TABLE: spin::Once<[(&str, u64); 28]> = spin::Once::new();
    TABLE.call_once(|| [
        ("malloc", shim_malloc as u64),
        ("free", shim_free as u64),
        ("realloc", shim_realloc as u64),
        ("calloc", shim_calloc as u64),
        ("memcpy", shim_memcpy as u64),
        ("memmove", shim_memmove as u64),
        ("memset", shim_memset as u64),
        ("memcmp", shim_memcmp as u64),
        ("strlen", shim_strlen as u64),
        ("strcpy", shim_strcpy as u64),
        ("strcmp", shim_strcmp as u64),
        ("strcat", shim_strcat as u64),
        ("strchr", shim_strchr as u64),
        ("puts", shim_puts as u64),
        ("printf", shim_printf as u64),
        ("snprintf", shim_snprintf as u64),
        ("exit", shim_exit as u64),
        ("abort", shim_abort as u64),
        ("fb_width", fb_width as u64),
        ("fb_height", fb_height as u64),
        ("fb_set_pixel", fb_set_pixel as u64),
        ("kbd_read_key", kbd_read_key as u64),
        ("fs_open", fs_open as u64),
        ("fs_read", fs_read as u64),
        ("fs_lseek", fs_lseek as u64),
        ("fs_close", fs_close as u64),
        ("fs_write_file", fs_write_file as u64),
        ("boot_state", boot_state as u64),
    ])
}

extern "C" fn shim_malloc(size: usize) -> *mut u8 {
    crate::env::with_env(|env| mem::malloc(&env.allocator, size))
}

extern "C" fn shim_free(ptr: *mut u8) {
    crate::env::with_env(|env| mem::free(&env.allocator, ptr));
}

extern "C" fn shim_realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    crate::env::with_env(|env| mem::realloc(&env.allocator, ptr, size))
}

extern "C" fn shim_calloc(members: usize, size: usize) -> *mut u8 {
    crate::env::with_env(|env| mem::calloc(&env.allocator, members, size))
}

extern "C" fn shim_memcpy(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe { mem::memcpy(dst, src, n) }
}

extern "C" fn shim_memmove(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe { mem::memmove(dst, src, n) }
}

extern "C" fn shim_memset(dst: *mut u8, value: i32, n: usize) -> *mut u8 {
    unsafe { mem::memset(dst, value, n) }
}

extern "C" fn shim_memcmp(a: *const u8, b: *const u8, n: usize) -> i32 {
    unsafe { mem::memcmp(a, b, n) }
}

extern "C" fn shim_strlen(s: *const u8) -> usize {
    unsafe { string::strlen(s) }
}

extern "C" fn shim_strcpy(dst: *mut u8, src: *const u8) -> *mut u8 {
    unsafe { string::strcpy(dst, src) }
}

extern "C" fn shim_strcmp(a: *const u8, b: *const u8) -> i32 {
    unsafe { string::strcmp(a, b) }
}

extern "C" fn shim_strcat(dst: *mut u8, src: *const u8) -> *mut u8 {
    unsafe { string::strcat(dst, src) }
}

extern "C" fn shim_strchr(s: *const u8, c: i32) -> *mut u8 {
    unsafe { string::strchr(s, c as u8) }
}

extern "C" fn shim_puts(s: *const u8) -> i32 {
    let len = unsafe { string::strlen(s) };
    let bytes = unsafe { core::slice::from_raw_parts(s, len) };
    crate::env::with_env(|env| {
        let fw = env.fw;
        let mut sink = station_libc::sink::ConsoleAndRingSink::new(&fw, &mut env.ring);
        fd::write(&mut sink, fd::STDOUT, bytes);
        fd::write(&mut sink, fd::STDOUT, b"\n");
    });
    (len + 1) as i32
}

/// `fmt` plus up to three `i64` arguments, formatted straight to stdout
/// (scope limit: no true varargs, see the module doc comment).
extern "C" fn shim_printf(fmt: *const u8, a0: i64, a1: i64, a2: i64) -> i32 {
    let mut buf = [0u8; 512];
    let args = [Arg::Signed(a0), Arg::Signed(a1), Arg::Signed(a2)];
    let n = unsafe { printf::vsnprintf(&mut buf, fmt, &args) };
    let written = (n as usize).min(buf.len());
    crate::env::with_env(|env| {
        let fw = env.fw;
        let mut sink = station_libc::sink::ConsoleAndRingSink::new(&fw, &mut env.ring);
        fd::write(&mut sink, fd::STDOUT, &buf[..written]);
    });
    n
}

extern "C" fn shim_snprintf(buf: *mut u8, size: usize, fmt: *const u8, a0: i64, a1: i64, a2: i64) -> i32 {
    let out = unsafe { core::slice::from_raw_parts_mut(buf, size) };
    let args = [Arg::Signed(a0), Arg::Signed(a1), Arg::Signed(a2)];
    unsafe { printf::vsnprintf(out, fmt, &args) }
}

extern "C" fn shim_exit(code: i32) -> ! {
    crate::env::with_env(|env| {
        let ctx_ptr: *const station_nonlocal_exit::Context = &env.ctx;
        unsafe { term::exit(&*ctx_ptr, code) }
    })
}

extern "C" fn shim_abort() -> ! {
    crate::env::with_env(|env| {
        let ctx_ptr: *const station_nonlocal_exit::Context = &env.ctx;
        unsafe { term::abort(&*ctx_ptr) }
    })
}

extern "C" fn fb_width() -> i32 {
    crate::env::with_env(|env| {
        env.fw
            .graphics_probe()
            .map(|mode| mode.description.width as i32)
            .unwrap_or(0)
    })
}

extern "C" fn fb_height() -> i32 {
    crate::env::with_env(|env| {
        env.fw
            .graphics_probe()
            .map(|mode| mode.description.height as i32)
            .unwrap_or(0)
    })
}

extern "C" fn fb_set_pixel(x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    crate::env::with_env(|env| {
        let Ok(mode) = env.fw.graphics_probe() else { return };
        let offset = mode.pixel_offset(x as u32, y as u32);
        if offset + 4 > mode.framebuffer_len {
            return;
        }
        unsafe {
            let pixel = mode.framebuffer_base.add(offset) as *mut u32;
            pixel.write_volatile(color);
        }
    });
}

/// Blocking keyboard read (spec.md §5: keyboard reads are a cooperative
/// suspension point). Returns the normalized key code, or -1 if this
/// firmware exposes no usable input device at all.
extern "C" fn kbd_read_key() -> i32 {
    crate::env::with_env(|env| match env.fw.keyboard_read_event(true) {
        Ok(event) => i32::from(event.code),
        Err(_) => -1,
    })
}

extern "C" fn fs_open(path: *const u8) -> i32 {
    let path = unsafe { c_str(path) };
    crate::env::with_env(|env| {
        let Some(volume) = env.volume.as_ref() else { return -1 };
        env.fd_table.open(volume, &env.allocator, path)
    })
}

extern "C" fn fs_read(fd: i32, buf: *mut u8, len: usize) -> isize {
    let out = unsafe { core::slice::from_raw_parts_mut(buf, len) };
    crate::env::with_env(|env| env.fd_table.read(fd, out))
}

extern "C" fn fs_lseek(fd: i32, offset: i64, whence: i32) -> i64 {
    crate::env::with_env(|env| env.fd_table.lseek(fd, offset, whence))
}

extern "C" fn fs_close(fd: i32) -> i32 {
    crate::env::with_env(|env| env.fd_table.close(&env.allocator, fd))
}

/// One-shot whole-file write; there is no buffered write path through
/// `FdTable` (spec.md §4.F only specifies read-oriented descriptors).
extern "C" fn fs_write_file(path: *const u8, buf: *const u8, len: usize) -> i32 {
    let path = unsafe { c_str(path) };
    let data = unsafe { core::slice::from_raw_parts(buf, len) };
    crate::env::with_env(|env| {
        let Some(volume) = env.volume.as_ref() else { return -1 };
        let mut dev = station_fs::FirmwareBlockIo { fw: &volume.fw, device: volume.device };
        match station_fs::writefile(&mut dev, volume.kind, path, data) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    })
}

extern "C" fn boot_state() -> *const crate::env::BootState {
    crate::env::with_env(|env| {
        let state = env.boot_state();
        // Stashed as a leaked allocation so the pointer stays valid after
        // this call returns; a single `BootState` per run is negligible.
        let ptr = env.allocator.allocate(core::mem::size_of::<crate::env::BootState>())
            as *mut crate::env::BootState;
        if !ptr.is_null() {
            unsafe { ptr.write(state) };
        }
        ptr as *const crate::env::BootState
    })
}

unsafe fn c_str<'a>(ptr: *const u8) -> &'a str {
    let len = unsafe { string::strlen(ptr) };
    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    core::str::from_utf8(bytes).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_symbol_name_is_unique() {
        let table = symbol_table();
        for i in 0..table.len() {
            for j in (i + 1)..table.len() {
                assert_ne!(table[i].0, table[j].0, "duplicate symbol registration");
            }
        }
    }

    #[test]
    fn libc_subset_named_by_spec_is_registered() {
        let names: alloc::vec::Vec<&str> = symbol_table().iter().map(|(n, _)| *n).collect();
        for required in ["malloc", "free", "printf", "snprintf", "strlen", "strcmp", "memcpy", "memset", "puts"] {
            assert!(names.contains(&required), "missing required libc symbol {required}");
        }
    }
}
