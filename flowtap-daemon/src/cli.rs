//! Command-line surface (`§6` "CLI/flag parsing").

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Passive Redis protocol observer")]
pub struct Cli {
    /// Path to a flowtap.toml config file. Missing fields fall back to
    /// spec-mandated defaults; a missing file falls back entirely.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Network interface to capture from, e.g. `eth0`. Required unless
    /// `--replay` is given.
    #[arg(long)]
    pub interface: Option<String>,

    /// Read packets from a pcap file instead of a live interface.
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Overrides the configured local host being observed.
    #[arg(long)]
    pub local_host: Option<Ipv4Addr>,

    /// Overrides the configured local port being observed.
    #[arg(long)]
    pub local_port: Option<u16>,

    /// Overrides only-in mode: drop the Out direction after classification.
    #[arg(long)]
    pub only_in: bool,

    /// Overrides the configured worker count.
    #[arg(long)]
    pub workers: Option<usize>,
}
