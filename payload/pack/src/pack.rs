//! Producer side of the SURV format (spec.md §4.L): walks each
//! architecture's ESP directory tree, compresses (or stores) every
//! file, and assembles the on-disk layout `station_payload::format`
//! documents.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use station_payload::format::{
    Arch, ARCH_ENTRY_SIZE, HEADER_SIZE, MAGIC, PATH_SIZE, STORE_THRESHOLD, VERSION,
};
use walkdir::WalkDir;

use crate::cli::PackArgs;

struct PackedFile {
    path: String,
    original_size: u32,
    compressed_size: u32,
    bytes: Vec<u8>,
}

struct PackedArch {
    arch: Arch,
    files: Vec<PackedFile>,
}

pub fn run(args: &PackArgs) -> Result<()> {
    let mut archs = Vec::new();
    for (name, dir) in &args.archs {
        let arch = parse_arch_name(name)?;
        archs.push(collect_arch(arch, dir)?);
    }

    let blob = assemble(&archs);

    if let Some(max) = args.max_size {
        if blob.len() as u64 > max {
            bail!(
                "packed blob is {} bytes, exceeds --max-size {} (partition capacity)",
                blob.len(),
                max
            );
        }
    }

    fs::write(&args.output, &blob)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "wrote {} ({} bytes, {} architecture(s))",
        args.output.display(),
        blob.len(),
        archs.len()
    );
    Ok(())
}

fn parse_arch_name(name: &str) -> Result<Arch> {
    match name {
        "x86_64" => Ok(Arch::X86_64),
        "arm64" | "aarch64" => Ok(Arch::Arm64),
        other => bail!("unknown architecture `{other}` (expected x86_64 or arm64)"),
    }
}

fn collect_arch(arch: Arch, root: &Path) -> Result<PackedArch> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir entries are always under root")
            .to_string_lossy()
            .replace('\\', "/");
        let raw = fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        files.push(pack_file(relative, raw)?);
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(PackedArch { arch, files })
}

fn pack_file(path: String, raw: Vec<u8>) -> Result<PackedFile> {
    if path.len() >= PATH_SIZE {
        bail!(
            "path `{path}` is {} bytes, exceeds the {PATH_SIZE}-byte inline path field",
            path.len()
        );
    }
    let original_size = raw.len() as u32;
    if raw.len() < STORE_THRESHOLD {
        return Ok(PackedFile { path, original_size, compressed_size: 0, bytes: raw });
    }
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;
    if compressed.len() >= raw.len() {
        // Compression didn't help; fall back to stored (compressed_size == 0).
        return Ok(PackedFile { path, original_size, compressed_size: 0, bytes: raw });
    }
    let compressed_size = compressed.len() as u32;
    Ok(PackedFile { path, original_size, compressed_size, bytes: compressed })
}

fn assemble(archs: &[PackedArch]) -> Vec<u8> {
    let arch_table_off = HEADER_SIZE;

    struct ArchLayout {
        data_block_off: u32,
        manifest: Vec<u8>,
        data: Vec<u8>,
    }

    let mut cursor = arch_table_off + archs.len() as u32 * ARCH_ENTRY_SIZE;
    let mut layouts = Vec::new();
    for packed in archs {
        let mut manifest = Vec::new();
        let mut data = Vec::new();
        for file in &packed.files {
            let mut padded_path = [0u8; PATH_SIZE];
            padded_path[..file.path.len()].copy_from_slice(file.path.as_bytes());
            manifest.extend_from_slice(&padded_path);
            manifest.extend_from_slice(&file.compressed_size.to_le_bytes());
            manifest.extend_from_slice(&file.original_size.to_le_bytes());
            data.extend_from_slice(&file.bytes);
        }

        let data_block_off = cursor;
        cursor += manifest.len() as u32 + data.len() as u32;

        layouts.push(ArchLayout { data_block_off, manifest, data });
    }

    let mut blob = Vec::new();
    blob.extend_from_slice(&MAGIC);
    blob.push(VERSION);
    blob.push(archs.len() as u8);
    blob.extend_from_slice(&0u16.to_le_bytes()); // reserved

    for (packed, layout) in archs.iter().zip(&layouts) {
        blob.extend_from_slice(&packed.arch.encode_name());
        blob.extend_from_slice(&layout.data_block_off.to_le_bytes());
        blob.extend_from_slice(&(packed.files.len() as u32).to_le_bytes());
    }
    debug_assert_eq!(blob.len() as u32, arch_table_off + archs.len() as u32 * ARCH_ENTRY_SIZE);

    for layout in &layouts {
        debug_assert_eq!(blob.len() as u32, layout.data_block_off);
        blob.extend_from_slice(&layout.manifest);
        blob.extend_from_slice(&layout.data);
    }

    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_is_stored_not_compressed() {
        let packed = pack_file("a.txt".to_string(), b"tiny".to_vec()).unwrap();
        assert_eq!(packed.compressed_size, 0);
        assert_eq!(packed.bytes, b"tiny");
    }

    #[test]
    fn large_compressible_file_shrinks() {
        let raw = vec![b'a'; STORE_THRESHOLD * 4];
        let packed = pack_file("b.bin".to_string(), raw.clone()).unwrap();
        assert_ne!(packed.compressed_size, 0);
        assert!((packed.bytes.len() as u32) < packed.original_size);
    }

    #[test]
    fn assembled_blob_round_trips_through_reader() {
        let archs = vec![PackedArch {
            arch: Arch::X86_64,
            files: vec![
                pack_file("EFI/BOOT/BOOTX64.EFI".to_string(), b"firmware-bytes".to_vec()).unwrap(),
            ],
        }];
        let blob = assemble(&archs);
        let view = station_payload::PayloadView::parse(&blob).unwrap();
        let arch = view.arch(Arch::X86_64).unwrap();
        let (entry, bytes) = arch.find("EFI/BOOT/BOOTX64.EFI").unwrap();
        assert_eq!(entry.original_size, 14);
        assert_eq!(bytes, b"firmware-bytes");
    }
}
