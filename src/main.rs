//! kicad-outputs: manufacturing and assembly output generator for KiCad projects
//!
//! Drives `kicad-cli` to produce the release package for a board and exposes
//! the individual BOM, image and bundling steps as subcommands.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use kicad_outputs::bom;
use kicad_outputs::bundle;
use kicad_outputs::compositor::Compositor;
use kicad_outputs::config::{self, Config};
use kicad_outputs::outputs::OutputJob;

/// Manufacturing and assembly output generator for KiCad projects.
///
/// Produces schematic PDFs, a grouped BOM, gerbers, drill and position
/// files, renders, a turntable animation, a STEP model and a release bundle.
#[derive(Parser, Debug)]
#[command(name = "kicad-outputs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, global = true, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate every configured deliverable for a board
    Build {
        /// Board file, with or without the .kicad_pcb extension
        #[arg(value_name = "BOARD")]
        board: PathBuf,

        /// Number of copper layers
        #[arg(short, long)]
        layers: u32,

        /// Output directory (overrides the configuration file)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Convert a python-bom XML export into a grouped BOM table
    Bom {
        /// XML exported with `kicad-cli sch export python-bom`
        #[arg(value_name = "XML")]
        xml: PathBuf,

        /// Output CSV file
        #[arg(value_name = "CSV")]
        csv: PathBuf,
    },

    /// Crop an image to its non-transparent pixels
    Crop {
        /// Source image
        #[arg(value_name = "SRC")]
        src: PathBuf,

        /// Destination image
        #[arg(value_name = "DST")]
        dst: PathBuf,
    },

    /// Crop frames to their shared bounds and assemble a looping GIF
    Animate {
        /// Destination .gif file
        #[arg(value_name = "DST")]
        dst: PathBuf,

        /// Frame images or glob patterns, in playback order
        #[arg(value_name = "FRAMES", required = true)]
        frames: Vec<String>,

        /// Frames per second (defaults to the configured framerate)
        #[arg(short, long)]
        framerate: Option<u32>,
    },

    /// Pack a directory into a .zip or .tar.gz archive
    Bundle {
        /// Directory to pack
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output archive
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Errors from expanding animation frame arguments.
#[derive(Debug, Error)]
enum FrameError {
    /// The argument is not a valid glob pattern.
    #[error("Invalid frame pattern '{pattern}'")]
    Pattern {
        /// The argument as given.
        pattern: String,
        /// Why it failed to compile.
        #[source]
        source: glob::PatternError,
    },

    /// A directory visited while matching could not be read.
    #[error(transparent)]
    Read(#[from] glob::GlobError),

    /// The pattern matched no files.
    #[error("No frames match '{0}'")]
    NoMatch(String),
}

/// Expands glob patterns in frame arguments.
///
/// Arguments without glob metacharacters are taken literally. Each pattern
/// contributes its matches sorted by path, and must match at least one file.
fn expand_frames(patterns: &[String]) -> Result<Vec<PathBuf>, FrameError> {
    let mut frames = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            frames.push(PathBuf::from(pattern));
            continue;
        }

        let paths = glob::glob(pattern).map_err(|source| FrameError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        let mut matches = paths.collect::<Result<Vec<_>, _>>()?;
        if matches.is_empty() {
            return Err(FrameError::NoMatch(pattern.clone()));
        }
        matches.sort();
        frames.extend(matches);
    }
    Ok(frames)
}

/// Formats an error followed by its chain of causes.
fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

type CommandResult = Result<(), Box<dyn Error>>;

fn run_build(
    cfg: Config,
    board: &Path,
    layers: u32,
    output_dir: Option<PathBuf>,
) -> CommandResult {
    let mut job = OutputJob::new(board, layers, cfg)?;
    if let Some(dir) = output_dir {
        job = job.with_output_dir(dir);
    }

    let summary = job.run()?;
    for path in &summary.produced {
        println!("{}", path.display());
    }
    if let Some(archive) = &summary.bundle {
        println!("{}", archive.display());
    }
    Ok(())
}

fn run_command(cfg: Config, command: Command) -> CommandResult {
    match command {
        Command::Build {
            board,
            layers,
            output_dir,
        } => run_build(cfg, &board, layers, output_dir),
        Command::Bom { xml, csv } => {
            let components = bom::load_components(&xml)?;
            bom::create_bom(&components, &csv)?;
            let dnf = bom::get_dnf_list(&components);
            if !dnf.is_empty() {
                println!("Not fitted: {}", dnf.join(","));
            }
            Ok(())
        }
        Command::Crop { src, dst } => {
            Compositor::new().crop_image(&src, &dst)?;
            Ok(())
        }
        Command::Animate {
            dst,
            frames,
            framerate,
        } => {
            let frames = expand_frames(&frames)?;
            info!(frames = frames.len(), "Assembling animation");
            let framerate = framerate.unwrap_or(cfg.animation.framerate);
            Compositor::new().make_animation(&frames, &dst, framerate)?;
            Ok(())
        }
        Command::Bundle { dir, archive } => {
            bundle::bundle(&dir, &archive, None)?;
            Ok(())
        }
    }
}

/// Entry point for kicad-outputs.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig file: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    if !args.quiet {
        eprintln!(
            "kicad-outputs {}  Copyright (C) 2026  The Embedded Society",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
        eprintln!("This is free software, licensed under GPL-3.0-or-later.");
        eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
        eprintln!();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting kicad-outputs");

    match run_command(cfg, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = error_chain(e.as_ref());
            error!(error = %message, "Failed");
            ExitCode::FAILURE
        }
    }
}
