//! Command-line interface definitions for `station-pack`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Builds and inspects SURV payload blobs for the workstation's flasher.
#[derive(Parser)]
#[command(name = "station-pack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pack one or more architecture directory trees into a SURV blob.
    Pack(PackArgs),
    /// Print a SURV blob's manifest without writing anything.
    Inspect(InspectArgs),
}

/// Arguments for the `pack` subcommand.
#[derive(Parser)]
pub struct PackArgs {
    /// One `arch=directory` pair per target architecture, e.g.
    /// `x86_64=./esp/x86_64` `arm64=./esp/arm64`.
    #[arg(long = "arch", required = true, value_parser = parse_arch_dir)]
    pub archs: Vec<(String, PathBuf)>,

    /// Where to write the packed blob.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Refuse to write a blob larger than this many bytes (partition
    /// capacity check, spec.md §4.L).
    #[arg(long)]
    pub max_size: Option<u64>,
}

fn parse_arch_dir(s: &str) -> Result<(String, PathBuf), String> {
    let (arch, dir) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ARCH=DIR, got `{s}`"))?;
    Ok((arch.to_string(), PathBuf::from(dir)))
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser)]
pub struct InspectArgs {
    /// Path to an existing SURV blob.
    pub payload: PathBuf,
}
