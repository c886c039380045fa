//! Command line and server configuration.

use crate::{enums::SortBy, service::DEFAULT_MAX_SLICES};

use clap::{Args, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dicom-tiles")]
#[command(about = "Tile DICOM slides and serve them to the labeling UI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split DICOM layers into PNG tiles laid out as <output>/<z>/<y>_<x>.png
    Extract(ExtractArgs),
    /// Run the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Directory of .dcm files, one per depth layer
    #[arg(long, required_unless_present = "manifest")]
    pub dicom_dir: Option<PathBuf>,

    /// JSON manifest of [{"z": .., "path": ..}] entries
    #[arg(long, conflicts_with = "dicom_dir")]
    pub manifest: Option<PathBuf>,

    /// Ordering of layers read from --dicom-dir
    #[arg(long, value_enum, default_value_t = SortBy::InstanceNumber)]
    pub sort_by: SortBy,

    #[arg(long, default_value = "data/microscope/png")]
    pub output: PathBuf,

    /// Worker threads, all cores if not given
    #[arg(long)]
    pub threads: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0", env = "DICOM_TILES_HOST")]
    pub host: String,

    #[arg(short, long, default_value_t = 51000, env = "DICOM_TILES_PORT")]
    pub port: u16,

    /// Root of extracted tiles
    #[arg(long, default_value = "data/microscope/png", env = "DICOM_TILES_ROOT")]
    pub tiles_root: PathBuf,

    /// Largest accepted DICOM upload
    #[arg(long, default_value_t = 64, env = "DICOM_TILES_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// Largest number of slices a scan may declare
    #[arg(long, default_value_t = DEFAULT_MAX_SLICES, env = "DICOM_TILES_MAX_SLICES")]
    pub max_slices: u32,
}

/// Settings the HTTP server is built from
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tiles_root: PathBuf,
    pub max_upload_bytes: usize,
    pub max_slices: u32,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }
}

impl From<&ServeArgs> for ServerConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            tiles_root: args.tiles_root.clone(),
            max_upload_bytes: args.max_upload_mb * 1024 * 1024,
            max_slices: args.max_slices,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:51000".to_string(),
            tiles_root: PathBuf::from("data/microscope/png"),
            max_upload_bytes: 64 * 1024 * 1024,
            max_slices: DEFAULT_MAX_SLICES,
        }
    }
}
