//! NTFS driver: read-only MFT record parsing and non-resident `$DATA`
//! run-list resolution (spec.md §4.D). Mutation calls return
//! `ReadOnlyVolume`.
//!
//! Scope: directory enumeration reads a single `$INDEX_ROOT` attribute
//! (small, un-overflowed directories); large directories that spill
//! into `$INDEX_ALLOCATION` B-tree nodes aren't walked. Non-resident
//! data is resolved as a general sparse-aware run list, which covers
//! both contiguous and fragmented files.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::device::{SectorIo, VolumeError};

const SECTOR_SIZE: usize = 512;
const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_DATA: u32 = 0x80;
const ATTR_INDEX_ROOT: u32 = 0x90;
const ATTR_END: u32 = 0xFFFF_FFFF;
const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x1000_0000;
const ROOT_DIRECTORY_RECORD: u64 = 5;

pub fn has_valid_ntfs(dev: &impl SectorIo) -> bool {
    let mut sector = [0u8; SECTOR_SIZE];
    if dev.read_sector(0, &mut sector).is_err() {
        return false;
    }
    sector[510] == 0x55 && sector[511] == 0xAA && &sector[3..11] == b"NTFS    "
}

struct Layout {
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    mft_lba: u64,
    mft_record_size: u32,
    total_sectors: u64,
}

impl Layout {
    fn cluster_bytes(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    fn cluster_to_lba(&self, cluster: u64) -> u64 {
        cluster * self.sectors_per_cluster as u64
    }
}

pub struct NtfsVolume<'a, D: SectorIo> {
    dev: &'a mut D,
    layout: Layout,
}

impl<'a, D: SectorIo> NtfsVolume<'a, D> {
    pub fn open(dev: &'a mut D) -> Result<Self, VolumeError> {
        if !has_valid_ntfs(dev) {
            return Err(VolumeError::InvalidFormat);
        }
        let mut boot = [0u8; SECTOR_SIZE];
        dev.read_sector(0, &mut boot)?;
        let bytes_per_sector = u16::from_le_bytes(boot[11..13].try_into().unwrap()) as u32;
        let sectors_per_cluster = boot[13] as u32;
        let mft_cluster = u64::from_le_bytes(boot[0x30..0x38].try_into().unwrap());
        let clusters_per_record_raw = boot[0x40] as i8;
        let mft_record_size = if clusters_per_record_raw < 0 {
            1u32 << (-clusters_per_record_raw)
        } else {
            clusters_per_record_raw as u32 * bytes_per_sector * sectors_per_cluster
        };
        let total_sectors = u64::from_le_bytes(boot[0x28..0x30].try_into().unwrap());

        let layout = Layout {
            bytes_per_sector,
            sectors_per_cluster,
            mft_lba: mft_cluster * sectors_per_cluster as u64,
            mft_record_size,
            total_sectors,
        };
        Ok(Self { dev, layout })
    }

    fn read_record(&self, record_number: u64) -> Result<Vec<u8>, VolumeError> {
        let record_bytes = self.layout.mft_record_size as usize;
        let sectors_per_record = record_bytes / self.layout.bytes_per_sector as usize;
        let lba = self.layout.mft_lba + record_number * sectors_per_record as u64;
        let mut buf = vec![0u8; record_bytes];
        self.dev.read_sectors(lba, &mut buf)?;
        if &buf[0..4] != b"FILE" {
            return Err(VolumeError::InvalidFormat);
        }
        Ok(buf)
    }

    /// Walks a record's attribute list, invoking `f` with (type, header,
    /// content_bytes) for each attribute until `f` returns `Some`.
    fn find_attribute<T>(&self, record: &[u8], wanted: u32, mut f: impl FnMut(&[u8], bool) -> Option<T>) -> Option<T> {
        let first_attr_offset = u16::from_le_bytes(record[0x14..0x16].try_into().unwrap()) as usize;
        let mut offset = first_attr_offset;
        while offset + 4 <= record.len() {
            let attr_type = u32::from_le_bytes(record[offset..offset + 4].try_into().unwrap());
            if attr_type == ATTR_END {
                break;
            }
            let length = u32::from_le_bytes(record[offset + 4..offset + 8].try_into().unwrap()) as usize;
            if length == 0 || offset + length > record.len() {
                break;
            }
            if attr_type == wanted {
                let non_resident = record[offset + 8] != 0;
                let content = if non_resident {
                    &record[offset..offset + length]
                } else {
                    let value_length = u32::from_le_bytes(record[offset + 0x10..offset + 0x14].try_into().unwrap()) as usize;
                    let value_offset = u16::from_le_bytes(record[offset + 0x14..offset + 0x16].try_into().unwrap()) as usize;
                    &record[offset + value_offset..offset + value_offset + value_length]
                };
                if let Some(result) = f(content, non_resident) {
                    return Some(result);
                }
            }
            offset += length;
        }
        None
    }

    fn resolve_data(&self, record: &[u8]) -> Result<Vec<u8>, VolumeError> {
        let cluster_bytes = self.layout.cluster_bytes() as usize;
        self.find_attribute(record, ATTR_DATA, |content, non_resident| {
            if !non_resident {
                return Some(Ok(content.to_vec()));
            }
            let real_size = u64::from_le_bytes(content[0x30..0x38].try_into().unwrap()) as usize;
            let run_offset = u16::from_le_bytes(content[0x20..0x22].try_into().unwrap()) as usize;
            let runs = parse_data_runs(&content[run_offset..]);
            let mut out = Vec::with_capacity(real_size);
            let mut lcn: i64 = 0;
            for (length_clusters, offset_clusters) in runs {
                lcn += offset_clusters;
                if offset_clusters == 0 && length_clusters > 0 && out.len() + length_clusters as usize * cluster_bytes > real_size + cluster_bytes {
                    // sparse run (no LCN delta encoded): pad with zeros
                    out.resize(out.len() + length_clusters as usize * cluster_bytes, 0);
                    continue;
                }
                let lba = self.layout.cluster_to_lba(lcn as u64);
                let mut buf = vec![0u8; length_clusters as usize * cluster_bytes];
                if self.dev.read_sectors(lba, &mut buf).is_err() {
                    return Some(Err(VolumeError::Io));
                }
                out.extend_from_slice(&buf);
            }
            out.truncate(real_size);
            Some(Ok(out))
        })
        .unwrap_or(Err(VolumeError::NotFound))
    }

    pub fn readdir(&self) -> Result<Vec<DirEntry>, VolumeError> {
        let root = self.read_record(ROOT_DIRECTORY_RECORD)?;
        let entries = self
            .find_attribute(&root, ATTR_INDEX_ROOT, |content, _| Some(parse_index_root_entries(content)))
            .unwrap_or_default();
        Ok(entries)
    }

    fn find_file_name_entry(&self, name: &str) -> Result<DirEntry, VolumeError> {
        self.readdir()?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or(VolumeError::NotFound)
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, VolumeError> {
        let entry = self.find_file_name_entry(name)?;
        if entry.is_directory {
            return Err(VolumeError::InvalidFormat);
        }
        let record = self.read_record(entry.mft_record)?;
        self.resolve_data(&record)
    }

    pub fn volume_info(&self) -> Result<(u64, u64), VolumeError> {
        let total_bytes = self.layout.total_sectors * self.layout.bytes_per_sector as u64;
        Ok((total_bytes, 0))
    }
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    pub is_directory: bool,
    mft_record: u64,
}

/// Parses data runs out of a non-resident attribute's run-list bytes.
/// Returns `(length_in_clusters, signed_lcn_delta)` pairs.
fn parse_data_runs(runs: &[u8]) -> Vec<(i64, i64)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        let header = runs[i];
        if header == 0 {
            break;
        }
        let length_bytes = (header & 0x0F) as usize;
        let offset_bytes = ((header >> 4) & 0x0F) as usize;
        i += 1;
        if i + length_bytes + offset_bytes > runs.len() {
            break;
        }
        let length = read_le_signed(&runs[i..i + length_bytes]);
        i += length_bytes;
        let offset = if offset_bytes == 0 { 0 } else { read_le_signed(&runs[i..i + offset_bytes]) };
        i += offset_bytes;
        out.push((length, offset));
    }
    out
}

fn read_le_signed(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let mut value: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    let sign_bit = 1i64 << (bytes.len() * 8 - 1);
    if value & sign_bit != 0 {
        value -= sign_bit << 1;
    }
    value
}

/// Parses `$INDEX_ROOT` content into directory entries. Each index entry
/// embeds a `$FILE_NAME` attribute's content starting right after the
/// entry's own 16-byte header.
fn parse_index_root_entries(content: &[u8]) -> Vec<DirEntry> {
    let mut out = Vec::new();
    if content.len() < 0x20 {
        return out;
    }
    let index_header_offset = 0x10;
    let entries_offset = index_header_offset + u32::from_le_bytes(content[index_header_offset..index_header_offset + 4].try_into().unwrap()) as usize;
    let total_size = index_header_offset + u32::from_le_bytes(content[index_header_offset + 4..index_header_offset + 8].try_into().unwrap()) as usize;
    let mut offset = entries_offset;
    while offset + 16 <= content.len() && offset < total_size.min(content.len()) {
        let mft_record = u64::from_le_bytes(content[offset..offset + 8].try_into().unwrap()) & 0x0000_FFFF_FFFF_FFFF;
        let entry_length = u16::from_le_bytes(content[offset + 8..offset + 10].try_into().unwrap()) as usize;
        let flags = u16::from_le_bytes(content[offset + 12..offset + 14].try_into().unwrap());
        if flags & 0x0002 != 0 || entry_length < 16 {
            break; // last entry marker
        }
        let file_name_content = &content[offset + 16..offset + entry_length];
        if file_name_content.len() >= 66 {
            let file_flags = u32::from_le_bytes(file_name_content[56..60].try_into().unwrap());
            let name_length_chars = file_name_content[64] as usize;
            let name_start = 66;
            let name_end = name_start + name_length_chars * 2;
            if name_end <= file_name_content.len() {
                let utf16: Vec<u16> = file_name_content[name_start..name_end]
                    .chunks(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                let name = String::from_utf16_lossy(&utf16);
                let real_size = u64::from_le_bytes(file_name_content[48..56].try_into().unwrap());
                out.push(DirEntry {
                    name,
                    size: real_size as u32,
                    is_directory: file_flags & FILE_ATTRIBUTE_DIRECTORY != 0,
                    mft_record,
                });
            }
        }
        offset += entry_length;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn write_boot_sector(disk: &mut MemoryDisk, mft_cluster: u64, total_sectors: u64) {
        let mut boot = [0u8; SECTOR_SIZE];
        boot[3..11].copy_from_slice(b"NTFS    ");
        boot[11..13].copy_from_slice(&512u16.to_le_bytes());
        boot[13] = 8; // sectors per cluster
        boot[0x28..0x30].copy_from_slice(&total_sectors.to_le_bytes());
        boot[0x30..0x38].copy_from_slice(&mft_cluster.to_le_bytes());
        boot[0x40] = (-10i8) as u8; // 2^10 = 1024-byte MFT records
        boot[510] = 0x55;
        boot[511] = 0xAA;
        disk.write_sectors(0, &boot).unwrap();
    }

    #[test]
    fn has_valid_ntfs_checks_oem_id_and_boot_signature() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        write_boot_sector(&mut disk, 4, disk.total_sectors());
        assert!(has_valid_ntfs(&disk));
    }

    #[test]
    fn data_run_parsing_decodes_single_contiguous_run() {
        // header 0x21: length field 1 byte, offset field 2 bytes.
        let runs = [0x21, 0x10, 0x05, 0x00, 0x00];
        let parsed = parse_data_runs(&runs);
        assert_eq!(parsed, alloc::vec![(0x10, 0x05)]);
    }

    #[test]
    fn le_signed_decodes_negative_offsets() {
        // -1 encoded in a single byte is 0xFF.
        assert_eq!(read_le_signed(&[0xFF]), -1);
        assert_eq!(read_le_signed(&[0x00, 0x01]), 256);
    }
}
