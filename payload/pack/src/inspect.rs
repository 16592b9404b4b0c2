//! Prints a SURV blob's manifest for debugging, without unpacking it.

use std::fs;

use anyhow::{Context, Result};
use station_payload::{Arch, PayloadView};

use crate::cli::InspectArgs;

pub fn run(args: &InspectArgs) -> Result<()> {
    let data = fs::read(&args.payload)
        .with_context(|| format!("reading {}", args.payload.display()))?;
    let view = PayloadView::parse(&data)
        .map_err(|e| anyhow::anyhow!("not a valid SURV payload: {e:?}"))?;

    println!("architectures: {}", view.arch_count());
    for arch in [Arch::X86_64, Arch::Arm64] {
        let Some(arch_view) = view.arch(arch) else { continue };
        println!("\n[{}] {} file(s)", arch.esp_dir_name(), arch_view.manifest_count());
        for (entry, _bytes) in arch_view.files() {
            let kind = if entry.is_compressed() { "deflate" } else { "stored" };
            println!(
                "  {:<40} {:>10} -> {:>10} ({kind})",
                entry.path, entry.original_size, entry.stored_size()
            );
        }
    }
    Ok(())
}
