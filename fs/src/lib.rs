//! Filesystem drivers (spec.md §4.D): FAT32 read/write/format, exFAT
//! read/write, NTFS read-only, and a raw ISO 9660 image writer, behind
//! a common volume facade.
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

extern crate alloc;

pub mod device;
pub mod exfat;
pub mod fat32;
pub mod iso9660;
pub mod ntfs;
pub mod volume;

pub use device::{FirmwareBlockIo, MemoryDisk, SectorIo, VolumeError};
pub use volume::{detect, readdir, readfile, rename, volume_info, writefile, Entry, FilesystemKind, VolumeInfo};
