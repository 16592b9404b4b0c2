//! A fixed-capacity `core::fmt::Write` sink used everywhere this crate
//! needs to format a line of console text without allocating (mirrors the
//! stack-buffer chunking `station_hal::console::write` itself uses).

use core::fmt::{self, Write};

pub const LINE_CAPACITY: usize = 256;

pub struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: [0; LINE_CAPACITY], len: 0 }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = LINE_CAPACITY - self.len;
        let n = bytes.len().min(remaining);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_truncated_at_capacity() {
        let mut line = LineBuffer::new();
        let _ = write!(line, "{}", "x".repeat(LINE_CAPACITY + 50));
        assert_eq!(line.as_str().len(), LINE_CAPACITY);
    }

    #[test]
    fn formats_arguments_like_any_fmt_write_sink() {
        let mut line = LineBuffer::new();
        let _ = write!(line, "{} of {}", 3, 10);
        assert_eq!(line.as_str(), "3 of 10");
    }
}
