//! Heap Allocator (spec.md §4.E): a general-purpose allocator atop the
//! firmware pool allocator, plus a page-granular allocator for executable
//! code below 2 GiB.
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod executable;
pub mod general;

use general::RawBacking;
use station_hal::FirmwareServices;

pub use executable::ExecutableAllocator;
pub use general::{GeneralAllocator, ALLOC_MAGIC};

impl RawBacking for FirmwareServices {
    fn alloc_raw(&self, size: usize) -> *mut u8 {
        self.allocate(size)
    }

    fn free_raw(&self, ptr: *mut u8) {
        self.free(ptr);
    }
}

/// Convenience alias for the allocator as wired to real firmware services.
pub type FirmwareAllocator = GeneralAllocator<FirmwareServices>;
