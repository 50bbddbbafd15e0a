//! Configuration settings for fmcore
//!
//! CLI arguments, the JSON settings file and their defaults.

use crate::error::{FileOperationError, IoResultExt, Result};
use crate::fs::TransferOptions;
use crate::system::DEFAULT_UPDATE_INTERVAL;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// fmcore - atomic file transfers and volume watching
#[derive(Parser, Debug, Clone)]
#[command(name = "fmcore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Atomic, resumable-step file copy/move and volume watching")]
#[command(long_about = r#"
fmcore copies and moves files so that the destination either appears
complete or not at all, and lists mounted volumes with their free space.

Examples:
  fmcore copy movie.mkv /backup                   # Chunked copy with progress
  fmcore move report.pdf /archive --name old.pdf  # Move and rename
  fmcore copy photos /backup --atomic             # Whole directory in one step
  fmcore drives --watch --interval 2s             # Print volumes as they change
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// JSON settings file
    #[arg(long, value_name = "FILE", env = "FMCORE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy a file or directory into a folder
    Copy(TransferArgs),

    /// Move a file or directory into a folder
    Move(TransferArgs),

    /// List mounted volumes
    Drives {
        /// Keep running and print the list whenever it changes
        #[arg(short, long)]
        watch: bool,

        /// Enumeration interval for --watch (e.g., 500ms, 2s)
        #[arg(long, value_name = "DURATION")]
        interval: Option<String>,
    },
}

/// Arguments shared by `copy` and `move`
#[derive(clap::Args, Debug, Clone)]
pub struct TransferArgs {
    /// Source file or directory
    #[arg(value_name = "SRC")]
    pub source: PathBuf,

    /// Destination folder
    #[arg(value_name = "DEST_DIR")]
    pub dest_dir: PathBuf,

    /// Name at the destination (default: source name)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Bytes per chunk step (e.g., 64K, 4M)
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// Transfer in a single call instead of chunk steps
    #[arg(long)]
    pub atomic: bool,

    /// Do not carry permissions and timestamps over
    #[arg(long)]
    pub no_preserve: bool,
}

/// Default chunk step
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Runtime settings, loaded from JSON and overridden by CLI flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transfer behavior
    pub transfer: TransferOptions,
    /// Bytes per chunk step
    pub chunk_size: u64,
    /// Volume enumeration period
    #[serde(with = "duration_text")]
    pub update_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transfer: TransferOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&text).map_err(|e| {
            FileOperationError::invalid(format!("invalid settings in {}: {}", path.display(), e))
        })
    }

    /// Settings file from `path`, or defaults when none was given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply per-transfer CLI overrides
    pub fn apply_transfer_args(&mut self, args: &TransferArgs) -> std::result::Result<(), String> {
        if let Some(chunk) = &args.chunk_size {
            let size = parse_size(chunk).map_err(|e| format!("Invalid chunk size: {}", e))?;
            if size == 0 {
                return Err("Invalid chunk size: must be greater than zero".to_string());
            }
            self.chunk_size = size;
        }
        if args.no_preserve {
            self.transfer.preserve_permissions = false;
            self.transfer.preserve_mtime = false;
        }
        Ok(())
    }
}

/// Parse a human-readable duration (e.g., "500ms", "2s", "1m")
pub fn parse_interval(text: &str) -> std::result::Result<Duration, String> {
    let interval = humantime::parse_duration(text.trim()).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

/// Durations in settings files are written as "1s", "250ms" and so on
mod duration_text {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_interval(&text).map_err(D::Error::custom)
    }
}

/// Parse human-readable size (e.g., "1M", "64K", "1.5G")
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else {
        (size.trim_end_matches('B'), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if num < 0.0 || !num.is_finite() {
        return Err(format!("Invalid number: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
