//! fmcore CLI - atomic file transfers and volume watching

use clap::Parser;
use fmcore::config::{parse_interval, CliArgs, Commands, Settings, TransferArgs};
use fmcore::core::{FileTransferEngine, TransferMode};
use fmcore::error::FileOperationError;
use fmcore::fs::FileSystemObject;
use fmcore::progress::TransferProgress;
use fmcore::system::{DiskInfo, DiskListObserver, EnumeratorError, SystemVolumes, VolumeEnumerator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Failures surfaced by the command line front end
#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Transfer(#[from] FileOperationError),

    #[error(transparent)]
    Enumerator(#[from] EnumeratorError),

    #[error("{0}")]
    Config(String),
}

type CliResult<T> = std::result::Result<T, CliError>;

fn main() {
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let default_level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> CliResult<()> {
    let settings = Settings::load(args.config.as_deref())?;

    match &args.command {
        Commands::Copy(transfer) => cmd_transfer(TransferMode::Copy, transfer, settings, args.quiet),
        Commands::Move(transfer) => cmd_transfer(TransferMode::Move, transfer, settings, args.quiet),
        Commands::Drives { watch, interval } => {
            let interval = match interval {
                Some(text) => parse_interval(text)
                    .map_err(|e| CliError::Config(format!("Invalid interval: {}", e)))?,
                None => settings.update_interval,
            };
            cmd_drives(*watch, interval, args.quiet)
        }
    }
}

fn cmd_transfer(
    mode: TransferMode,
    args: &TransferArgs,
    mut settings: Settings,
    quiet: bool,
) -> CliResult<()> {
    settings.apply_transfer_args(args).map_err(CliError::Config)?;

    let object = FileSystemObject::new(&args.source);
    if !object.exists() {
        return Err(FileOperationError::NotFound(args.source.clone()).into());
    }

    let atomic = args.atomic || object.is_dir();
    let total = object.size();
    let name = args.name.as_deref();
    let mut engine = FileTransferEngine::new(object).with_options(settings.transfer.clone());

    tracing::info!(
        "{} {} -> {} ({})",
        mode,
        args.source.display(),
        args.dest_dir.display(),
        if atomic { "atomic" } else { "chunked" }
    );

    if atomic {
        let bytes = match mode {
            TransferMode::Copy => engine.copy_atomically(&args.dest_dir, name)?,
            TransferMode::Move => engine.move_atomically(&args.dest_dir, name)?,
        };
        if !quiet {
            println!(
                "{} {}",
                if mode == TransferMode::Copy { "Copied" } else { "Moved" },
                humansize::format_size(bytes, humansize::BINARY)
            );
        }
        return Ok(());
    }

    let progress = if quiet {
        TransferProgress::disabled(total)
    } else {
        TransferProgress::new(&mode.to_string(), total)
    };

    loop {
        let step = match mode {
            TransferMode::Copy => engine.copy_chunk(settings.chunk_size, &args.dest_dir, name),
            TransferMode::Move => engine.move_chunk(settings.chunk_size, &args.dest_dir, name),
        };
        match step {
            Ok(status) => {
                progress.update(status.bytes_copied());
                if status.is_complete() {
                    break;
                }
            }
            Err(e) => {
                // Read failures leave the session open; give up on it here
                engine.cancel_copy()?;
                progress.finish_error(engine.last_error_message());
                return Err(e.into());
            }
        }
    }

    progress.finish_success("done");
    if !quiet {
        println!("{}", progress.summary_line());
    }
    Ok(())
}

/// Flags a pending redraw for the watch loop
#[derive(Default)]
struct RedrawFlag {
    dirty: AtomicBool,
}

impl DiskListObserver for RedrawFlag {
    fn drives_changed(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

fn cmd_drives(watch: bool, interval: std::time::Duration, quiet: bool) -> CliResult<()> {
    if !watch {
        let enumerator = VolumeEnumerator::manual(SystemVolumes::new(), interval);
        enumerator.update_synchronously();
        print_drives(&enumerator.drives());
        return Ok(());
    }

    let enumerator = VolumeEnumerator::with_source(SystemVolumes::new(), interval)?;
    let flag = Arc::new(RedrawFlag::default());
    enumerator.add_observer(flag.clone())?;

    if !quiet {
        println!("Watching volumes every {} (Ctrl+C to stop)", humantime::format_duration(interval));
    }

    loop {
        enumerator.wait_and_pump()?;
        if flag.dirty.swap(false, Ordering::SeqCst) {
            println!();
            print_drives(&enumerator.drives());
        }
    }
}

fn print_drives(drives: &[DiskInfo]) {
    println!(
        "{:<20} {:<28} {:>12} {:>12} {:<8}",
        "NAME", "MOUNT", "AVAILABLE", "TOTAL", "FS"
    );
    for disk in drives {
        println!(
            "{:<20} {:<28} {:>12} {:>12} {:<8}{}",
            disk.name,
            disk.root_path.display().to_string(),
            humansize::format_size(disk.bytes_available, humansize::BINARY),
            humansize::format_size(disk.total_bytes, humansize::BINARY),
            disk.file_system,
            if disk.is_removable { " (removable)" } else { "" }
        );
    }
}
