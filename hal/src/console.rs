//! Text console output, tolerant of a firmware that offers no usable
//! console at all (spec.md §7: "Fatal errors during boot (no framebuffer
//! and no serial console) cannot be surfaced; the application silently
//! falls back to text-console mode.").

use crate::raw::protocols::SimpleTextOutput;

/// Color used for a `console_write`, distinguishing normal output from
/// diagnostics (spec.md 4.F sink: "writes to the framebuffer in appropriate
/// colors (normal vs. error)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleColor {
    Normal,
    Warning,
    Error,
}

/// UCS-2 attribute values the Simple Text Output protocol accepts; only
/// used locally to pick a color before writing.
fn attribute_for(color: ConsoleColor) -> usize {
    match color {
        ConsoleColor::Normal => 0x07,  // light gray on black
        ConsoleColor::Warning => 0x0E, // yellow on black
        ConsoleColor::Error => 0x0C,   // light red on black
    }
}

/// Writes `text` to the console, encoding to UCS-2 and chunking through a
/// small stack buffer (no allocation — this runs before the allocator is
/// necessarily available). A null `stdout` pointer is tolerated: the call
/// is simply a no-op, per the facade's "tolerates a null framebuffer"
/// guarantee.
pub fn write(stdout: *mut SimpleTextOutput, text: &str, color: ConsoleColor) {
    if stdout.is_null() {
        return;
    }
    unsafe {
        let _ = ((*stdout).set_attribute)(stdout, attribute_for(color));
    }

    let mut buf = [0u16; 128];
    let mut len = 0usize;
    let flush = |buf: &[u16], len: usize| {
        if len == 0 {
            return;
        }
        let mut terminated = [0u16; 129];
        terminated[..len].copy_from_slice(&buf[..len]);
        terminated[len] = 0;
        unsafe {
            let _ = ((*stdout).output_string)(stdout, terminated.as_ptr());
        }
    };

    for ch in text.chars() {
        if ch == '\n' {
            flush(&buf, len);
            len = 0;
            let crlf = [0x000Du16, 0x000A, 0];
            unsafe {
                let _ = ((*stdout).output_string)(stdout, crlf.as_ptr());
            }
            continue;
        }
        let mut encode_buf = [0u16; 2];
        for unit in ch.encode_utf16(&mut encode_buf) {
            if len == buf.len() {
                flush(&buf, len);
                len = 0;
            }
            buf[len] = *unit;
            len += 1;
        }
    }
    flush(&buf, len);
}
