//! Output sink multiplexing (spec.md §4.F): every formatted-output entry
//! point routes through `vsnprintf` plus a sink; the sink fans out to the
//! console and to a [`crate::ring::DiagnosticRing`] (used when the
//! compiler writes to the error stream).

/// Where formatted output (and raw fd 1/2 writes) actually land.
pub trait OutputSink {
    fn write_bytes(&mut self, bytes: &[u8], is_error: bool);
}

/// The workstation's standard sink: everything goes to the console, and
/// error-stream writes are additionally captured into a ring buffer so
/// `run_source`/`rebuild` can surface them as `error_msg` text.
pub struct ConsoleAndRingSink<'a, const N: usize> {
    fw: &'a station_hal::FirmwareServices,
    ring: &'a mut crate::ring::DiagnosticRing<N>,
}

impl<'a, const N: usize> ConsoleAndRingSink<'a, N> {
    pub fn new(fw: &'a station_hal::FirmwareServices, ring: &'a mut crate::ring::DiagnosticRing<N>) -> Self {
        Self { fw, ring }
    }
}

impl<'a, const N: usize> OutputSink for ConsoleAndRingSink<'a, N> {
    fn write_bytes(&mut self, bytes: &[u8], is_error: bool) {
        let color = if is_error {
            station_hal::console::ConsoleColor::Error
        } else {
            station_hal::console::ConsoleColor::Normal
        };
        if let Ok(text) = core::str::from_utf8(bytes) {
            self.fw.console_write(text, color);
        }
        if is_error {
            self.ring.write(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        out: std::vec::Vec<u8>,
        err: std::vec::Vec<u8>,
    }
    impl OutputSink for RecordingSink {
        fn write_bytes(&mut self, bytes: &[u8], is_error: bool) {
            if is_error {
                self.err.extend_from_slice(bytes);
            } else {
                self.out.extend_from_slice(bytes);
            }
        }
    }

    #[test]
    fn fd_write_routes_by_stream() {
        let mut sink = RecordingSink {
            out: std::vec::Vec::new(),
            err: std::vec::Vec::new(),
        };
        assert_eq!(crate::fd::write(&mut sink, crate::fd::STDOUT, b"hi"), 2);
        assert_eq!(crate::fd::write(&mut sink, crate::fd::STDERR, b"oops"), 4);
        assert_eq!(sink.out, b"hi");
        assert_eq!(sink.err, b"oops");
    }

    #[test]
    fn fd_write_to_other_fd_is_unsupported() {
        let mut sink = RecordingSink {
            out: std::vec::Vec::new(),
            err: std::vec::Vec::new(),
        };
        assert_eq!(crate::fd::write(&mut sink, 5, b"nope"), -1);
    }
}
