//! Tessera CLI - image and video provenance tool.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tessera_core::{BackendKind, ChainFormat};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod exit_codes;
mod utils;

use commands::Output;
use config::Config;
use exit_codes::ExitCode;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Media provenance for images and video", long_about = None)]
#[command(after_help = exit_codes::HELP_TEXT)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// More log output on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Provenance artifact directory [default: provenance, env: TESSERA_DIR]
    #[arg(long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Key file [default: keys/tessera.key, env: TESSERA_KEY]
    #[arg(long, global = true, value_name = "PATH")]
    key: Option<PathBuf>,

    /// Signature backend: mldsa65, ed25519 or hardware [env: TESSERA_BACKEND]
    #[arg(long, global = true, value_name = "BACKEND")]
    backend: Option<BackendKind>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a file and write its provenance artifacts
    Sign {
        #[command(subcommand)]
        media: SignMedia,
    },

    /// Verify a file against stored provenance artifacts
    Verify {
        #[command(subcommand)]
        media: VerifyMedia,
    },
}

#[derive(Subcommand)]
enum SignMedia {
    /// Sign decoded pixels and record a perceptual fingerprint
    Image {
        /// Image to sign (JPEG, PNG, GIF or WebP)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Hash-chain every frame and sign the chain root
    Video {
        /// Video to sign
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        frames: FrameArgs,

        /// Chain file layout
        #[arg(long, value_enum, default_value_t = ChainFormatArg::Legacy)]
        chain_format: ChainFormatArg,
    },
}

#[derive(Subcommand)]
enum VerifyMedia {
    /// Check the pixel signature and grade visual similarity
    Image {
        /// Image to verify
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Recompute the frame chain and check the signed root
    Video {
        /// Video to verify
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        frames: FrameArgs,
    },
}

#[derive(Args)]
struct FrameArgs {
    /// Frame width after rescaling [default: 224, env: TESSERA_FRAME_WIDTH]
    #[arg(long)]
    width: Option<u32>,

    /// Frame height after rescaling [default: 224, env: TESSERA_FRAME_HEIGHT]
    #[arg(long)]
    height: Option<u32>,

    /// ffmpeg executable [default: ffmpeg, env: TESSERA_FFMPEG]
    #[arg(long, value_name = "BIN")]
    ffmpeg: Option<PathBuf>,

    /// Treat FILE as raw rgb24 frames of the given geometry (no ffmpeg)
    #[arg(long)]
    raw: bool,
}

impl FrameArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(width) = self.width {
            config.frame_width = width;
        }
        if let Some(height) = self.height {
            config.frame_height = height;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg = ffmpeg.clone();
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ChainFormatArg {
    /// Headerless digests, readable by every verifier
    Legacy,
    /// Header with version, hash algorithm and frame count
    Versioned,
}

impl From<ChainFormatArg> for ChainFormat {
    fn from(arg: ChainFormatArg) -> Self {
        match arg {
            ChainFormatArg::Legacy => ChainFormat::Legacy,
            ChainFormatArg::Versioned => ChainFormat::Versioned,
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, color: ColorChoice) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "tessera_core=info,tessera=info,warn",
        (false, _) => "tessera_core=debug,tessera=debug,info",
    };

    let ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stderr().is_terminal(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.dir {
        config.artifact_dir = dir;
    }
    if let Some(key) = cli.key {
        config.key_path = key;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let output = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Sign { media } => match media {
            SignMedia::Image { file } => commands::image::sign(file, &config, output),
            SignMedia::Video {
                file,
                frames,
                chain_format,
            } => {
                frames.apply(&mut config);
                commands::video::sign(file, &config, frames.raw, chain_format.into(), output)
            }
        },
        Commands::Verify { media } => match media {
            VerifyMedia::Image { file } => commands::image::verify(file, &config, output),
            VerifyMedia::Video { file, frames } => {
                frames.apply(&mut config);
                commands::video::verify(file, &config, frames.raw, output)
            }
        },
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet, cli.color);

    let exit = match run(cli) {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::ExitCode::from(exit.code)
}
