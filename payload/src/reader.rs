//! Consumer-side payload parsing (spec.md §4.L): reads a mapped
//! (or otherwise byte-slice-accessible) SURV blob without ever copying
//! the whole thing into RAM — every accessor here hands back a pointer
//! into `data` rather than an owned buffer.

use crate::format::{
    Arch, ARCH_ENTRY_SIZE, HEADER_SIZE, MAGIC, MANIFEST_ENTRY_SIZE, PATH_SIZE, VERSION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    TooShort,
    BadMagic,
    UnsupportedVersion(u8),
    Truncated,
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, PayloadError> {
    let bytes = data.get(offset..offset + 4).ok_or(PayloadError::Truncated)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// A parsed, unowned view over a SURV payload blob.
pub struct PayloadView<'a> {
    data: &'a [u8],
    arch_count: u8,
}

impl<'a> PayloadView<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PayloadError> {
        if data.len() < HEADER_SIZE as usize {
            return Err(PayloadError::TooShort);
        }
        if data[0..4] != MAGIC {
            return Err(PayloadError::BadMagic);
        }
        let version = data[4];
        if version != VERSION {
            return Err(PayloadError::UnsupportedVersion(version));
        }
        let arch_count = data[5];
        // data[6..8] is the reserved zero field; not validated, per
        // spec.md §3 just reserving the space.
        Ok(Self { data, arch_count })
    }

    pub fn arch_count(&self) -> u32 {
        u32::from(self.arch_count)
    }

    /// Looks up the per-architecture section, or `None` if the payload
    /// was not built for `arch`.
    pub fn arch(&self, arch: Arch) -> Option<ArchView<'a>> {
        for i in 0..u32::from(self.arch_count) {
            let entry_off = HEADER_SIZE as usize + (i * ARCH_ENTRY_SIZE) as usize;
            let name = self.data.get(entry_off..entry_off + crate::format::ARCH_NAME_SIZE)?;
            if Arch::from_name(name) != Some(arch) {
                continue;
            }
            let data_block_off = read_u32(self.data, entry_off + 16).ok()?;
            let file_count = read_u32(self.data, entry_off + 20).ok()?;
            let manifest_size = file_count * MANIFEST_ENTRY_SIZE;
            return Some(ArchView {
                data: self.data,
                manifest_off: data_block_off,
                data_off: data_block_off + manifest_size,
                manifest_count: file_count,
            });
        }
        None
    }
}

/// One architecture's manifest plus the file-data region it describes.
pub struct ArchView<'a> {
    data: &'a [u8],
    manifest_count: u32,
    manifest_off: u32,
    data_off: u32,
}

/// One manifest entry, resolved against the blob's inline path field.
#[derive(Debug, Clone, Copy)]
pub struct ManifestEntry<'a> {
    pub path: &'a str,
    pub original_size: u32,
    pub compressed_size: u32,
}

impl ManifestEntry<'_> {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    pub fn stored_size(&self) -> u32 {
        if self.compressed_size != 0 {
            self.compressed_size
        } else {
            self.original_size
        }
    }
}

impl<'a> ArchView<'a> {
    pub fn manifest_count(&self) -> u32 {
        self.manifest_count
    }

    /// Iterates every file, pairing its manifest entry with the raw
    /// (still possibly compressed) bytes backing it. Cumulative data
    /// offsets are computed in one forward pass per spec.md §4.L, since
    /// no file's data offset is stored explicitly.
    pub fn files(&self) -> ArchFileIter<'a> {
        ArchFileIter {
            data: self.data,
            manifest_off: self.manifest_off,
            data_off: self.data_off,
            remaining: self.manifest_count,
            index: 0,
            cumulative: 0,
        }
    }

    /// Finds a single file by path, without materializing the whole
    /// manifest (useful for the flasher, which writes files one at a
    /// time rather than enumerating up front).
    pub fn find(&self, path: &str) -> Option<(ManifestEntry<'a>, &'a [u8])> {
        self.files().find(|(entry, _)| entry.path == path)
    }
}

pub struct ArchFileIter<'a> {
    data: &'a [u8],
    manifest_off: u32,
    data_off: u32,
    remaining: u32,
    index: u32,
    cumulative: u32,
}

impl<'a> Iterator for ArchFileIter<'a> {
    type Item = (ManifestEntry<'a>, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry_off = self.manifest_off as usize + (self.index * MANIFEST_ENTRY_SIZE) as usize;
        let path_bytes = self.data.get(entry_off..entry_off + PATH_SIZE)?;
        let compressed_size = read_u32(self.data, entry_off + PATH_SIZE).ok()?;
        let original_size = read_u32(self.data, entry_off + PATH_SIZE + 4).ok()?;

        let path_end = path_bytes.iter().position(|&b| b == 0).unwrap_or(path_bytes.len());
        let path = core::str::from_utf8(&path_bytes[..path_end]).ok()?;

        let stored = if compressed_size != 0 { compressed_size } else { original_size };
        let data_start = self.data_off as usize + self.cumulative as usize;
        let bytes = self.data.get(data_start..data_start + stored as usize)?;

        self.cumulative += stored;
        self.index += 1;
        self.remaining -= 1;

        Some((
            ManifestEntry { path, original_size, compressed_size },
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_fixture() -> alloc::vec::Vec<u8> {
        use alloc::vec::Vec;
        let files: &[(&str, &[u8], u32)] = &[
            ("EFI/BOOT/BOOTX64.EFI", b"stored-bytes", 0),
            ("EFI/BOOT/readme.txt", b"compressed!!", 6),
        ];
        let mut manifest = Vec::new();
        let mut data = Vec::new();
        for (path, bytes, compressed_size) in files {
            let mut padded_path = [0u8; PATH_SIZE];
            padded_path[..path.len()].copy_from_slice(path.as_bytes());
            manifest.extend_from_slice(&padded_path);
            manifest.extend_from_slice(&compressed_size.to_le_bytes());
            manifest.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            let stored_len = if *compressed_size != 0 { *compressed_size as usize } else { bytes.len() };
            data.extend_from_slice(&bytes[..stored_len]);
        }

        let data_block_off = HEADER_SIZE + ARCH_ENTRY_SIZE;

        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.push(1); // arch_count
        buf.extend_from_slice(&0u16.to_le_bytes()); // reserved

        buf.extend_from_slice(&Arch::X86_64.encode_name());
        buf.extend_from_slice(&data_block_off.to_le_bytes());
        buf.extend_from_slice(&(files.len() as u32).to_le_bytes());

        buf.extend_from_slice(&manifest);
        buf.extend_from_slice(&data);
        buf
    }

    #[test]
    fn parses_header_and_rejects_bad_magic() {
        let mut buf = build_fixture();
        assert!(PayloadView::parse(&buf).is_ok());
        buf[0] = b'X';
        assert_eq!(PayloadView::parse(&buf), Err(PayloadError::BadMagic));
    }

    #[test]
    fn missing_architecture_is_none() {
        let buf = build_fixture();
        let view = PayloadView::parse(&buf).unwrap();
        assert!(view.arch(Arch::Arm64).is_none());
    }

    #[test]
    fn walks_manifest_computing_cumulative_data_offsets() {
        let buf = build_fixture();
        let view = PayloadView::parse(&buf).unwrap();
        let arch = view.arch(Arch::X86_64).unwrap();
        let files: alloc::vec::Vec<_> = arch.files().collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0.path, "EFI/BOOT/BOOTX64.EFI");
        assert!(!files[0].0.is_compressed());
        assert_eq!(files[0].1, b"stored-bytes");
        assert_eq!(files[1].0.path, "EFI/BOOT/readme.txt");
        assert!(files[1].0.is_compressed());
        assert_eq!(files[1].1, b"compre"); // first 6 bytes per the fixture's compressed_size
    }

    #[test]
    fn find_locates_a_single_file_by_path() {
        let buf = build_fixture();
        let view = PayloadView::parse(&buf).unwrap();
        let arch = view.arch(Arch::X86_64).unwrap();
        let (entry, bytes) = arch.find("EFI/BOOT/BOOTX64.EFI").unwrap();
        assert_eq!(entry.original_size, 12);
        assert_eq!(bytes, b"stored-bytes");
        assert!(arch.find("nope").is_none());
    }
}
