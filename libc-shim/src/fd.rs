//! In-memory file descriptor table (spec.md §4.F "File descriptors"):
//! `open` reads a whole file into memory via the filesystem facade and
//! hands back a slot index; `read`/`lseek`/`close` operate purely on that
//! slot. Descriptors 0/1/2 are reserved for standard streams.

use station_memory::general::{GeneralAllocator, RawBacking};

pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const STDERR: i32 = 2;
const MAX_SLOTS: usize = 32;
/// `FILE*` wrappers encode an fd as `fd + FILE_BIAS` so no heap allocation
/// is needed for a `FILE` structure (spec.md §4.F).
pub const FILE_BIAS: usize = 100;

#[derive(Clone, Copy)]
struct Slot {
    base: *mut u8,
    len: usize,
    pos: usize,
}

unsafe impl Send for Slot {}

/// Supplies whole-file contents on `open`. Implemented by the volume
/// facade in `station-fs`; kept as a trait here so this crate does not
/// depend on the filesystem crate.
pub trait FileSource<B: RawBacking> {
    /// Reads the whole file at `path` into memory obtained from `alloc`,
    /// returning its base pointer and length, or `None` if it does not
    /// exist.
    fn read_whole_file(&self, path: &str, alloc: &GeneralAllocator<B>) -> Option<(*mut u8, usize)>;
}

pub struct FdTable {
    slots: [Option<Slot>; MAX_SLOTS],
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_SLOTS],
        }
    }

    /// Opens `path`, returning a descriptor >= 3, or -1 if the file does
    /// not exist or the table is full.
    pub fn open<B: RawBacking>(
        &mut self,
        source: &impl FileSource<B>,
        alloc: &GeneralAllocator<B>,
        path: &str,
    ) -> i32 {
        let Some((base, len)) = source.read_whole_file(path, alloc) else {
            return -1;
        };
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Slot { base, len, pos: 0 });
                return (i + 3) as i32;
            }
        }
        alloc.free(base);
        -1
    }

    fn slot_mut(&mut self, fd: i32) -> Option<&mut Slot> {
        if fd < 3 {
            return None;
        }
        self.slots.get_mut((fd - 3) as usize)?.as_mut()
    }

    /// Reads up to `buf.len()` bytes, returning the count actually copied.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> isize {
        let Some(slot) = self.slot_mut(fd) else {
            return -1;
        };
        let remaining = slot.len - slot.pos;
        let n = remaining.min(buf.len());
        unsafe {
            crate::mem::memcpy(buf.as_mut_ptr(), slot.base.add(slot.pos), n);
        }
        slot.pos += n;
        n as isize
    }

    /// `SEEK_SET`/`SEEK_CUR`/`SEEK_END` are `0`/`1`/`2`, matching libc.
    pub fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> i64 {
        let Some(slot) = self.slot_mut(fd) else {
            return -1;
        };
        let base = match whence {
            0 => 0i64,
            1 => slot.pos as i64,
            2 => slot.len as i64,
            _ => return -1,
        };
        let new_pos = base + offset;
        if new_pos < 0 || new_pos as usize > slot.len {
            return -1;
        }
        slot.pos = new_pos as usize;
        new_pos
    }

    pub fn close<B: RawBacking>(&mut self, alloc: &GeneralAllocator<B>, fd: i32) -> i32 {
        if fd < 3 {
            return -1;
        }
        let idx = (fd - 3) as usize;
        let Some(slot) = self.slots.get_mut(idx) else {
            return -1;
        };
        if let Some(s) = slot.take() {
            alloc.free(s.base);
            0
        } else {
            -1
        }
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `buf` to fd 1/2 via `sink`; any other fd is unsupported
/// (spec.md §4.F: "write to other fds is unsupported").
pub fn write(sink: &mut impl crate::sink::OutputSink, fd: i32, buf: &[u8]) -> isize {
    if fd == STDOUT || fd == STDERR {
        sink.write_bytes(buf, fd == STDERR);
        buf.len() as isize
    } else {
        -1
    }
}

pub fn fd_to_file(fd: i32) -> *mut core::ffi::c_void {
    (fd as usize + FILE_BIAS) as *mut core::ffi::c_void
}

pub fn file_to_fd(file: *mut core::ffi::c_void) -> i32 {
    (file as usize).wrapping_sub(FILE_BIAS) as i32
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    struct LeakBacking;
    impl RawBacking for LeakBacking {
        fn alloc_raw(&self, size: usize) -> *mut u8 {
            unsafe { std::alloc::alloc(std::alloc::Layout::from_size_align(size.max(1), 16).unwrap()) }
        }
        fn free_raw(&self, _ptr: *mut u8) {}
    }

    struct FixedSource;
    impl FileSource<LeakBacking> for FixedSource {
        fn read_whole_file(&self, path: &str, alloc: &GeneralAllocator<LeakBacking>) -> Option<(*mut u8, usize)> {
            if path != "/hello.txt" {
                return None;
            }
            let data = b"Hello";
            let p = alloc.allocate(data.len());
            unsafe { crate::mem::memcpy(p, data.as_ptr(), data.len()) };
            Some((p, data.len()))
        }
    }

    #[test]
    fn open_read_close_round_trips_file_contents() {
        let alloc = GeneralAllocator::new(LeakBacking);
        let mut table = FdTable::new();
        let fd = table.open(&FixedSource, &alloc, "/hello.txt");
        assert!(fd >= 3);

        let mut buf = [0u8; 5];
        assert_eq!(table.read(fd, &mut buf), 5);
        assert_eq!(&buf, b"Hello");
        assert_eq!(table.read(fd, &mut buf), 0); // position at EOF now

        assert_eq!(table.close(&alloc, fd), 0);
        assert_eq!(table.close(&alloc, fd), -1); // double close fails
    }

    #[test]
    fn open_missing_file_returns_negative_one() {
        let alloc = GeneralAllocator::new(LeakBacking);
        let mut table = FdTable::new();
        assert_eq!(table.open(&FixedSource, &alloc, "/missing.txt"), -1);
    }

    #[test]
    fn lseek_set_cur_end() {
        let alloc = GeneralAllocator::new(LeakBacking);
        let mut table = FdTable::new();
        let fd = table.open(&FixedSource, &alloc, "/hello.txt");
        assert_eq!(table.lseek(fd, 2, 0), 2); // SEEK_SET
        assert_eq!(table.lseek(fd, 1, 1), 3); // SEEK_CUR
        assert_eq!(table.lseek(fd, 0, 2), 5); // SEEK_END
        assert_eq!(table.lseek(fd, 1, 2), -1); // past end of file is invalid
    }
}
