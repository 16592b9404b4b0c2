//! Memory entry points (spec.md §4.F "Memory"): copy, move, set, compare,
//! plus allocate/free/reallocate/clear routed through `station-memory`.

use station_memory::FirmwareAllocator;

/// Forward byte copy. Caller guarantees `dst`/`src` do not overlap
/// (`memmove` below handles the overlapping case).
pub unsafe fn memcpy(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe {
        core::ptr::copy_nonoverlapping(src, dst, n);
    }
    dst
}

/// Overlap-safe byte copy.
pub unsafe fn memmove(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    unsafe {
        core::ptr::copy(src, dst, n);
    }
    dst
}

pub unsafe fn memset(dst: *mut u8, value: i32, n: usize) -> *mut u8 {
    unsafe {
        core::ptr::write_bytes(dst, value as u8, n);
    }
    dst
}

/// Returns `<0`, `0`, or `>0` like C's `memcmp`, based on the first
/// differing byte (treated as unsigned).
pub unsafe fn memcmp(a: *const u8, b: *const u8, n: usize) -> i32 {
    for i in 0..n {
        let (x, y) = unsafe { (*a.add(i), *b.add(i)) };
        if x != y {
            return i32::from(x) - i32::from(y);
        }
    }
    0
}

pub fn malloc(alloc: &FirmwareAllocator, size: usize) -> *mut u8 {
    alloc.allocate(size)
}

pub fn free(alloc: &FirmwareAllocator, ptr: *mut u8) {
    alloc.free(ptr);
}

pub fn realloc(alloc: &FirmwareAllocator, ptr: *mut u8, size: usize) -> *mut u8 {
    alloc.reallocate(ptr, size)
}

pub fn calloc(alloc: &FirmwareAllocator, members: usize, size: usize) -> *mut u8 {
    alloc.allocate_calloc(members, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memcpy_copies_bytes() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        unsafe { memcpy(dst.as_mut_ptr(), src.as_ptr(), 4) };
        assert_eq!(dst, src);
    }

    #[test]
    fn memmove_handles_forward_overlap() {
        let mut buf = [1u8, 2, 3, 4, 5];
        unsafe {
            let p = buf.as_mut_ptr();
            memmove(p, p.add(1), 4);
        }
        assert_eq!(buf, [2, 3, 4, 5, 5]);
    }

    #[test]
    fn memcmp_orders_by_first_difference() {
        let a = [1u8, 2, 3];
        let b = [1u8, 2, 4];
        unsafe {
            assert!(memcmp(a.as_ptr(), b.as_ptr(), 3) < 0);
            assert_eq!(memcmp(a.as_ptr(), a.as_ptr(), 3), 0);
        }
    }
}
