//! The process-wide `#[global_allocator]` (spec.md §4.E), bridging Rust's
//! allocation facade to the firmware pool allocator through
//! [`station_memory::FirmwareAllocator`]. Grounded on the teacher's
//! `UefiAllocator`: an `UnsafeCell<Option<T>>` that starts uninitialized
//! (nothing may allocate before `efi_main` has a system table) and is
//! armed once, in place, as the very first thing `efi_main` does.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;

use station_hal::FirmwareServices;
use station_memory::FirmwareAllocator;

pub struct StationAllocator {
    inner: UnsafeCell<Option<FirmwareAllocator>>,
}

impl StationAllocator {
    pub const fn new() -> Self {
        Self { inner: UnsafeCell::new(None) }
    }

    /// # Safety
    /// Must run before any other allocation and exactly once per boot;
    /// `fw` must stay valid for the rest of the session (spec.md §5: boot
    /// services are never exited while the workstation runs).
    pub unsafe fn init(&self, fw: FirmwareServices) {
        unsafe {
            *self.inner.get() = Some(FirmwareAllocator::new(fw));
        }
    }
}

unsafe impl Sync for StationAllocator {}

unsafe impl GlobalAlloc for StationAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match unsafe { &*self.inner.get() } {
            Some(allocator) => allocator.allocate(layout.size()),
            None => core::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(allocator) = unsafe { &*self.inner.get() } {
            allocator.free(ptr);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        match unsafe { &*self.inner.get() } {
            Some(allocator) => allocator.reallocate(ptr, new_size),
            None => core::ptr::null_mut(),
        }
    }
}

#[global_allocator]
static ALLOCATOR: StationAllocator = StationAllocator::new();

/// Arms the global allocator. Must be the first thing `efi_main` does
/// after wrapping the system table, before anything on the heap path
/// (including `alloc::string::String` inside the services layer) runs.
///
/// # Safety
/// See [`StationAllocator::init`].
pub unsafe fn init(fw: FirmwareServices) {
    unsafe {
        ALLOCATOR.init(fw);
    }
}
