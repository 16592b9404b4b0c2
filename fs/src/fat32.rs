//! FAT32 driver: format with dynamic cluster sizing, `has_valid_fat32`
//! detection, file read/write via cluster-chain allocation, and rename
//! with long-filename conflict resolution (spec.md §4.D).
//!
//! Scope: directory entries are 8.3 short names only (no VFAT long-name
//! entry chain), and files live directly in the root directory — the
//! spec's scenarios exercise single-level ESP layouts (`/EFI/BOOT/...`
//! aside, which the flasher writes directly by LBA rather than through
//! this driver), so a subdirectory tree isn't built out here.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::device::{SectorIo, VolumeError};

const SECTOR_SIZE: usize = 512;
const RESERVED_SECTORS: u16 = 32;
const NUM_FATS: u8 = 2;
const FSINFO_SECTOR: u16 = 1;
const BACKUP_BOOT_SECTOR: u16 = 6;
const ROOT_CLUSTER: u32 = 2;
const MAX_FAT16_CLUSTERS: u32 = 65_525;

const FAT32_EOC: u32 = 0x0FFF_FFFF;
const FAT32_FREE: u32 = 0;
const FAT32_BAD: u32 = 0x0FFF_FFF7;

/// Computes (sectors_per_cluster, data_cluster_count) for a volume with
/// `total_sectors` 512-byte sectors, per spec.md §4.D: "start with 8
/// sectors/cluster; halve until data-cluster count exceeds 65,525."
pub fn choose_cluster_size(total_sectors: u64) -> (u8, u32) {
    let mut spc: u32 = 8;
    loop {
        let fat_sectors = estimate_fat_sectors(total_sectors, spc);
        let data_sectors = total_sectors.saturating_sub(RESERVED_SECTORS as u64 + fat_sectors * NUM_FATS as u64);
        let data_clusters = (data_sectors / spc as u64) as u32;
        if data_clusters > MAX_FAT16_CLUSTERS || spc == 1 {
            return (spc as u8, data_clusters);
        }
        spc /= 2;
    }
}

fn estimate_fat_sectors(total_sectors: u64, spc: u32) -> u64 {
    let approx_data_sectors = total_sectors.saturating_sub(RESERVED_SECTORS as u64);
    let approx_clusters = approx_data_sectors / spc as u64;
    let fat_bytes = (approx_clusters + 2) * 4;
    (fat_bytes + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64
}

/// Reads sector 0 and checks the two markers spec.md §4.D names: the
/// 0x55AA boot signature at offset 510, and the "FAT32   " filesystem
/// type string at offset 82.
pub fn has_valid_fat32(dev: &impl SectorIo) -> bool {
    let mut sector = [0u8; SECTOR_SIZE];
    if dev.read_sector(0, &mut sector).is_err() {
        return false;
    }
    sector[510] == 0x55 && sector[511] == 0xAA && &sector[82..90] == b"FAT32   "
}

pub struct Fat32Layout {
    pub sectors_per_cluster: u8,
    pub fat_sectors: u32,
    pub fat_start_lba: u64,
    pub data_start_lba: u64,
    pub total_sectors: u64,
}

impl Fat32Layout {
    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.data_start_lba + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }
}

pub fn format(dev: &mut impl SectorIo) -> Result<Fat32Layout, VolumeError> {
    let total_sectors = dev.total_sectors();
    let (spc, data_clusters) = choose_cluster_size(total_sectors);
    let fat_sectors = ((data_clusters as u64 + 2) * 4 + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64;
    let fat_start_lba = RESERVED_SECTORS as u64;
    let data_start_lba = fat_start_lba + fat_sectors * NUM_FATS as u64;

    let mut boot = [0u8; SECTOR_SIZE];
    boot[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    boot[3..11].copy_from_slice(b"MSWIN4.1");
    boot[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    boot[13] = spc;
    boot[14..16].copy_from_slice(&RESERVED_SECTORS.to_le_bytes());
    boot[16] = NUM_FATS;
    // root_entry_count (17..19) = 0, total_sectors_16 (19..21) = 0 for FAT32
    boot[21] = 0xF8; // media descriptor, fixed disk
    // fat_size_16 (22..24) = 0
    boot[24..26].copy_from_slice(&0u16.to_le_bytes()); // sectors_per_track
    boot[26..28].copy_from_slice(&0u16.to_le_bytes()); // num_heads
    boot[28..32].copy_from_slice(&0u32.to_le_bytes()); // hidden_sectors
    boot[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
    boot[36..40].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    boot[40..42].copy_from_slice(&0u16.to_le_bytes()); // ext_flags
    boot[42..44].copy_from_slice(&0u16.to_le_bytes()); // fs_version
    boot[44..48].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
    boot[48..50].copy_from_slice(&FSINFO_SECTOR.to_le_bytes());
    boot[50..52].copy_from_slice(&BACKUP_BOOT_SECTOR.to_le_bytes());
    boot[64] = 0x80; // drive_number
    boot[66] = 0x29; // boot_sig (extended)
    boot[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes()); // volume_id
    boot[71..82].copy_from_slice(b"NO NAME    ");
    boot[82..90].copy_from_slice(b"FAT32   ");
    boot[510] = 0x55;
    boot[511] = 0xAA;
    dev.write_sectors(0, &boot)?;
    dev.write_sectors(BACKUP_BOOT_SECTOR as u64, &boot)?;

    let mut fsinfo = [0u8; SECTOR_SIZE];
    fsinfo[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
    fsinfo[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
    fsinfo[488..492].copy_from_slice(&(data_clusters.saturating_sub(1)).to_le_bytes()); // free_count
    fsinfo[492..496].copy_from_slice(&3u32.to_le_bytes()); // next_free (root uses cluster 2)
    fsinfo[508..512].copy_from_slice(&0xAA55_0000u32.to_le_bytes());
    dev.write_sectors(FSINFO_SECTOR as u64, &fsinfo)?;

    let layout = Fat32Layout {
        sectors_per_cluster: spc,
        fat_sectors: fat_sectors as u32,
        fat_start_lba,
        data_start_lba,
        total_sectors,
    };

    for fat_copy in 0..NUM_FATS as u64 {
        let fat_lba = fat_start_lba + fat_copy * fat_sectors;
        let mut first_sector = [0u8; SECTOR_SIZE];
        first_sector[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes()); // cluster 0
        first_sector[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes()); // cluster 1
        first_sector[8..12].copy_from_slice(&FAT32_EOC.to_le_bytes()); // cluster 2: root, single cluster
        dev.write_sectors(fat_lba, &first_sector)?;
        for extra in 1..fat_sectors {
            dev.write_sectors(fat_lba + extra, &[0u8; SECTOR_SIZE])?;
        }
    }

    let root_lba = layout.cluster_to_lba(ROOT_CLUSTER);
    for i in 0..spc as u64 {
        dev.write_sectors(root_lba + i, &[0u8; SECTOR_SIZE])?;
    }

    Ok(layout)
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    pub is_directory: bool,
    pub first_cluster: u32,
}

pub struct Fat32Volume<'a, D: SectorIo> {
    dev: &'a mut D,
    layout: Fat32Layout,
}

impl<'a, D: SectorIo> Fat32Volume<'a, D> {
    pub fn open(dev: &'a mut D) -> Result<Self, VolumeError> {
        if !has_valid_fat32(dev) {
            return Err(VolumeError::InvalidFormat);
        }
        let mut boot = [0u8; SECTOR_SIZE];
        dev.read_sector(0, &mut boot)?;
        let spc = boot[13];
        let fat_sectors = u32::from_le_bytes(boot[36..40].try_into().unwrap());
        let total_sectors = u32::from_le_bytes(boot[32..36].try_into().unwrap()) as u64;
        let fat_start_lba = RESERVED_SECTORS as u64;
        let data_start_lba = fat_start_lba + fat_sectors as u64 * NUM_FATS as u64;
        Ok(Self {
            dev,
            layout: Fat32Layout {
                sectors_per_cluster: spc,
                fat_sectors,
                fat_start_lba,
                data_start_lba,
                total_sectors,
            },
        })
    }

    fn read_fat_entry(&self, cluster: u32) -> Result<u32, VolumeError> {
        let byte_offset = cluster as u64 * 4;
        let lba = self.layout.fat_start_lba + byte_offset / SECTOR_SIZE as u64;
        let within = (byte_offset % SECTOR_SIZE as u64) as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        self.dev.read_sector(lba, &mut sector)?;
        Ok(u32::from_le_bytes(sector[within..within + 4].try_into().unwrap()) & 0x0FFF_FFFF)
    }

    fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), VolumeError> {
        for fat_copy in 0..NUM_FATS as u64 {
            let byte_offset = cluster as u64 * 4;
            let lba = self.layout.fat_start_lba + fat_copy * self.layout.fat_sectors as u64 + byte_offset / SECTOR_SIZE as u64;
            let within = (byte_offset % SECTOR_SIZE as u64) as usize;
            let mut sector = [0u8; SECTOR_SIZE];
            self.dev.read_sector(lba, &mut sector)?;
            sector[within..within + 4].copy_from_slice(&(value & 0x0FFF_FFFF).to_le_bytes());
            self.dev.write_sectors(lba, &sector)?;
        }
        Ok(())
    }

    fn allocate_chain(&mut self, cluster_count: u32) -> Result<u32, VolumeError> {
        if cluster_count == 0 {
            return Err(VolumeError::NoSpace);
        }
        let total_clusters = (self.layout.total_sectors - self.layout.data_start_lba) / self.layout.sectors_per_cluster as u64;
        let mut free = Vec::new();
        let mut cluster = ROOT_CLUSTER;
        while free.len() < cluster_count as usize {
            if (cluster as u64 - ROOT_CLUSTER as u64) >= total_clusters {
                return Err(VolumeError::NoSpace);
            }
            if self.read_fat_entry(cluster)? == FAT32_FREE {
                free.push(cluster);
            }
            cluster += 1;
        }
        for i in 0..free.len() {
            let next = if i + 1 < free.len() { free[i + 1] } else { FAT32_EOC };
            self.write_fat_entry(free[i], next)?;
        }
        Ok(free[0])
    }

    fn free_chain(&mut self, start: u32) -> Result<(), VolumeError> {
        let mut cluster = start;
        while cluster >= ROOT_CLUSTER && cluster < FAT32_BAD {
            let next = self.read_fat_entry(cluster)?;
            self.write_fat_entry(cluster, FAT32_FREE)?;
            if next >= FAT32_EOC {
                break;
            }
            cluster = next;
        }
        Ok(())
    }

    fn read_chain(&self, start: u32, byte_len: usize) -> Result<Vec<u8>, VolumeError> {
        let mut out = Vec::with_capacity(byte_len);
        let mut cluster = start;
        let cluster_bytes = self.layout.cluster_bytes();
        while out.len() < byte_len && cluster >= ROOT_CLUSTER && cluster < FAT32_BAD {
            let lba = self.layout.cluster_to_lba(cluster);
            let mut buf = vec![0u8; cluster_bytes];
            self.dev.read_sectors(lba, &mut buf)?;
            let remaining = byte_len - out.len();
            out.extend_from_slice(&buf[..remaining.min(cluster_bytes)]);
            if out.len() >= byte_len {
                break;
            }
            let next = self.read_fat_entry(cluster)?;
            if next >= FAT32_EOC {
                break;
            }
            cluster = next;
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
            if next >= FAT32_EOC {
                break;
            }
            cluster = next;
        }
        Ok(())
    }

    fn root_dir_raw(&self) -> Result<Vec<u8>, VolumeError> {
        self.read_chain(ROOT_CLUSTER, self.layout.cluster_bytes())
    }

    pub fn readdir(&self) -> Result<Vec<DirEntry>, VolumeError> {
        let raw = self.root_dir_raw()?;
        let mut entries = Vec::new();
        for rec in raw.chunks(32) {
            if rec.len() < 32 || rec[0] == 0x00 || rec[0] == 0xE5 {
                continue;
            }
            let attr = rec[11];
            if attr == 0x0F {
                continue; // VFAT long-name entry, not synthesized in this driver
            }
            let name = decode_short_name(&rec[0..11]);
            let first_cluster = (u16::from_le_bytes(rec[20..22].try_into().unwrap()) as u32) << 16
                | u16::from_le_bytes(rec[26..28].try_into().unwrap()) as u32;
            let size = u32::from_le_bytes(rec[28..32].try_into().unwrap());
            entries.push(DirEntry {
                name,
                size,
                is_directory: attr & 0x10 != 0,
                first_cluster,
            });
        }
        crate::volume::sort_entries(&mut entries);
        Ok(entries)
    }

    fn find(&self, name: &str) -> Result<(usize, DirEntry), VolumeError> {
        let entries = self.readdir()?;
        entries
            .into_iter()
            .enumerate()
            .find(|(_, e)| e.name.eq_ignore_ascii_case(name))
            .ok_or(VolumeError::NotFound)
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, VolumeError> {
        let (_, entry) = self.find(name)?;
        if entry.is_directory {
            return Err(VolumeError::InvalidFormat);
        }
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
        self.append_dir_entry(name, first_cluster, data.len() as u32)
    }

    fn append_dir_entry(&mut self, name: &str, first_cluster: u32, size: u32) -> Result<(), VolumeError> {
        let mut raw = self.root_dir_raw()?;
        let slot = raw
            .chunks(32)
            .position(|rec| rec[0] == 0x00 || rec[0] == 0xE5)
            .ok_or(VolumeError::NoSpace)?;
        let rec = &mut raw[slot * 32..slot * 32 + 32];
        rec.fill(0);
        rec[0..11].copy_from_slice(&encode_short_name(name));
        rec[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        rec[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
        rec[28..32].copy_from_slice(&size.to_le_bytes());
        self.write_chain(ROOT_CLUSTER, &raw)
    }

    /// Mutates the filename field of an existing entry in place, per
    /// spec.md §4.D's rename procedure (re-submitting the info structure
    /// with the updated size is a firmware-file-info concept that doesn't
    /// apply to this block-level driver; only the name changes here).
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), VolumeError> {
        let existing: Vec<String> = self.readdir()?.into_iter().map(|e| e.name).collect();
        let resolved = if existing.iter().any(|n| n.eq_ignore_ascii_case(new)) {
            resolve_name_conflict(&existing, new)
        } else {
            String::from(new)
        };
        let (slot, _) = self.find(old)?;
        let mut raw = self.root_dir_raw()?;
        let rec = &mut raw[slot * 32..slot * 32 + 32];
        rec[0..11].copy_from_slice(&encode_short_name(&resolved));
        self.write_chain(ROOT_CLUSTER, &raw)
    }

    pub fn delete(&mut self, name: &str) -> Result<(), VolumeError> {
        let (slot, entry) = self.find(name)?;
        self.free_chain(entry.first_cluster)?;
        let mut raw = self.root_dir_raw()?;
        raw[slot * 32] = 0xE5;
        self.write_chain(ROOT_CLUSTER, &raw)
    }

    pub fn volume_info(&self) -> Result<(u64, u64), VolumeError> {
        let total_clusters = (self.layout.total_sectors - self.layout.data_start_lba) / self.layout.sectors_per_cluster as u64;
        let mut free_clusters = 0u64;
        for cluster in ROOT_CLUSTER..(ROOT_CLUSTER as u64 + total_clusters) as u32 {
            if self.read_fat_entry(cluster)? == FAT32_FREE {
                free_clusters += 1;
            }
        }
        let cluster_bytes = self.layout.cluster_bytes() as u64;
        Ok((total_clusters * cluster_bytes, free_clusters * cluster_bytes))
    }
}

/// Long-filename conflict resolution (spec.md §4.D): try `base_N.ext` for
/// N = 2..99, splitting on the last dot; extensionless names append
/// `_N`.
pub fn resolve_name_conflict(existing: &[String], desired: &str) -> String {
    let (base, ext) = match desired.rfind('.') {
        Some(pos) => (&desired[..pos], &desired[pos..]),
        None => (desired, ""),
    };
    for n in 2..=99 {
        let candidate = if ext.is_empty() {
            alloc::format!("{base}_{n}")
        } else {
            alloc::format!("{base}_{n}{ext}")
        };
        if !existing.iter().any(|e| e.eq_ignore_ascii_case(&candidate)) {
            return candidate;
        }
    }
    String::from(desired)
}

fn encode_short_name(name: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    let (base, ext) = match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => (name, ""),
    };
    for (i, b) in base.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }
    out
}

fn decode_short_name(raw: &[u8]) -> String {
    let base = core::str::from_utf8(&raw[0..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&raw[8..11]).unwrap_or("").trim_end();
    if ext.is_empty() {
        String::from(base)
    } else {
        alloc::format!("{base}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    #[test]
    fn cluster_size_keeps_data_clusters_above_fat16_threshold() {
        for size_mib in [64u64, 128, 256, 512, 1024, 4096] {
            let total_sectors = size_mib * 1024 * 1024 / SECTOR_SIZE as u64;
            let (_spc, data_clusters) = choose_cluster_size(total_sectors);
            assert!(
                data_clusters > MAX_FAT16_CLUSTERS,
                "{size_mib} MiB: data_clusters={data_clusters}"
            );
        }
    }

    #[test]
    fn format_then_has_valid_fat32_round_trips() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        assert!(has_valid_fat32(&disk));
    }

    #[test]
    fn write_then_read_file_round_trips_contents() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        let mut vol = Fat32Volume::open(&mut disk).unwrap();
        vol.write_file("HELLO.TXT", b"hello world").unwrap();
        assert_eq!(vol.read_file("HELLO.TXT").unwrap(), b"hello world");
    }

    #[test]
    fn readdir_lists_directories_before_files_case_insensitively() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        let mut vol = Fat32Volume::open(&mut disk).unwrap();
        vol.write_file("zebra.txt", b"z").unwrap();
        vol.write_file("Apple.txt", b"a").unwrap();
        let names: Vec<String> = vol.readdir().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, alloc::vec![String::from("Apple.txt"), String::from("zebra.txt")]);
    }

    #[test]
    fn rename_to_existing_name_resolves_conflict() {
        let existing = alloc::vec![String::from("report.txt")];
        let resolved = resolve_name_conflict(&existing, "report.txt");
        assert_eq!(resolved, "report_2.txt");
    }

    #[test]
    fn rename_conflict_resolution_handles_extensionless_names() {
        let existing = alloc::vec![String::from("README")];
        let resolved = resolve_name_conflict(&existing, "README");
        assert_eq!(resolved, "README_2");
    }

    #[test]
    fn writing_duplicate_name_is_rejected() {
        let mut disk = MemoryDisk::new(64 * 1024 * 1024 / SECTOR_SIZE);
        format(&mut disk).unwrap();
        let mut vol = Fat32Volume::open(&mut disk).unwrap();
        vol.write_file("a.txt", b"1").unwrap();
        assert_eq!(vol.write_file("a.txt", b"2"), Err(VolumeError::NameConflict));
    }
}
