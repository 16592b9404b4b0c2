//! Common volume facade (spec.md §4.D): the signature every filesystem
//! driver is reached through, plus the `FilesystemKind` identification
//! enum and the shared directory-sort rule (directories first, then
//! case-insensitive non-decreasing name order).

use alloc::string::String;
use alloc::vec::Vec;

use crate::device::{SectorIo, VolumeError};
use crate::fat32::{self, Fat32Volume};
use crate::iso9660;
use crate::ntfs::NtfsVolume;
use crate::exfat::ExFatVolume;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemKind {
    Fat32,
    ExFat,
    Ntfs,
    Iso9660,
}

/// Sniffs a device and reports which filesystem it holds, if any is
/// recognized. Order matters: FAT32 and exFAT boot sectors share the
/// 0x55AA signature position, so the more specific exFAT OEM string is
/// checked first.
pub fn detect(dev: &impl SectorIo) -> Option<FilesystemKind> {
    if crate::exfat::has_valid_exfat(dev) {
        Some(FilesystemKind::ExFat)
    } else if fat32::has_valid_fat32(dev) {
        Some(FilesystemKind::Fat32)
    } else if crate::ntfs::has_valid_ntfs(dev) {
        Some(FilesystemKind::Ntfs)
    } else {
        None
    }
}

pub struct VolumeInfo {
    pub kind: FilesystemKind,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// A generic directory entry surfaced by the facade, independent of the
/// underlying driver's on-disk representation.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub size: u32,
    pub is_directory: bool,
}

/// Directories first, then case-insensitive non-decreasing name order
/// within each group (testable property 10).
pub fn sort_entries(entries: &mut Vec<fat32::DirEntry>) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()))
    });
}

fn sort_generic(entries: &mut Vec<Entry>) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()))
    });
}

/// Dispatches a read of `path` (a bare filename; this facade has no
/// subdirectory traversal, matching the single-level scope of the
/// individual drivers) against whichever filesystem `dev` holds.
pub fn readfile<D: SectorIo>(dev: &mut D, kind: FilesystemKind, name: &str) -> Result<Vec<u8>, VolumeError> {
    match kind {
        FilesystemKind::Fat32 => Fat32Volume::open(dev)?.read_file(name),
        FilesystemKind::ExFat => ExFatVolume::open(dev)?.read_file(name),
        FilesystemKind::Ntfs => NtfsVolume::open(dev)?.read_file(name),
        FilesystemKind::Iso9660 => Err(VolumeError::ReadOnlyVolume),
    }
}

pub fn writefile<D: SectorIo>(dev: &mut D, kind: FilesystemKind, name: &str, data: &[u8]) -> Result<(), VolumeError> {
    match kind {
        FilesystemKind::Fat32 => Fat32Volume::open(dev)?.write_file(name, data),
        FilesystemKind::ExFat => ExFatVolume::open(dev)?.write_file(name, data),
        FilesystemKind::Ntfs => Err(VolumeError::ReadOnlyVolume),
        FilesystemKind::Iso9660 => Err(VolumeError::ReadOnlyVolume),
    }
}

pub fn readdir<D: SectorIo>(dev: &mut D, kind: FilesystemKind) -> Result<Vec<Entry>, VolumeError> {
    let mut entries: Vec<Entry> = match kind {
        FilesystemKind::Fat32 => Fat32Volume::open(dev)?
            .readdir()?
            .into_iter()
            .map(|e| Entry { name: e.name, size: e.size, is_directory: e.is_directory })
            .collect(),
        FilesystemKind::ExFat => ExFatVolume::open(dev)?
            .readdir()?
            .into_iter()
            .map(|e| Entry { name: e.name, size: e.size, is_directory: e.is_directory })
            .collect(),
        FilesystemKind::Ntfs => NtfsVolume::open(dev)?
            .readdir()?
            .into_iter()
            .map(|e| Entry { name: e.name, size: e.size, is_directory: e.is_directory })
            .collect(),
        FilesystemKind::Iso9660 => Vec::new(),
    };
    sort_generic(&mut entries);
    Ok(entries)
}

pub fn rename<D: SectorIo>(dev: &mut D, kind: FilesystemKind, old: &str, new: &str) -> Result<(), VolumeError> {
    match kind {
        FilesystemKind::Fat32 => Fat32Volume::open(dev)?.rename(old, new),
        FilesystemKind::ExFat => ExFatVolume::open(dev)?.rename(old, new),
        FilesystemKind::Ntfs => Err(VolumeError::ReadOnlyVolume),
        FilesystemKind::Iso9660 => Err(VolumeError::ReadOnlyVolume),
    }
}

pub fn file_size<D: SectorIo>(dev: &mut D, kind: FilesystemKind, name: &str) -> Result<u32, VolumeError> {
    readdir(dev, kind)?
        .into_iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(|e| e.size)
        .ok_or(VolumeError::NotFound)
}

pub fn volume_info<D: SectorIo>(dev: &mut D, kind: FilesystemKind) -> Result<VolumeInfo, VolumeError> {
    let (total_bytes, free_bytes) = match kind {
        FilesystemKind::Fat32 => Fat32Volume::open(dev)?.volume_info()?,
        FilesystemKind::ExFat => ExFatVolume::open(dev)?.volume_info()?,
        FilesystemKind::Ntfs => NtfsVolume::open(dev)?.volume_info()?,
        FilesystemKind::Iso9660 => (dev.total_sectors() * dev.sector_size() as u64, 0),
    };
    Ok(VolumeInfo { kind, total_bytes, free_bytes })
}

/// Streams a pre-built ISO 9660 image from `image` onto `dev`, sector by
/// sector, reporting progress via `on_progress(sectors_written, total)`.
/// `Iso9660` is a raw writer, not a parser: `readfile`/`writefile` on it
/// always fail with `ReadOnlyVolume` above, since nothing in this facade
/// interprets the image's own directory structure.
pub fn write_iso9660_image<D: SectorIo>(
    dev: &mut D,
    image: &[u8],
    on_progress: impl FnMut(u64, u64),
) -> Result<(), VolumeError> {
    iso9660::stream_image(dev, image, on_progress)
}
