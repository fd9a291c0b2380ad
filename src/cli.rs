//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// A queue-driven orchestrator for external media download and transcode tools.
#[derive(Parser, Debug)]
#[command(name = "media-pipeline", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        default_value = "pipeline.yaml",
        env = "MEDIA_PIPELINE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every job in a manifest file to completion.
    Run(RunArgs),

    /// List the encoder names the transcoder binary reports.
    Encoders,

    /// Show the discovered presets and profiles for one encoder.
    Capabilities {
        /// Encoder name (e.g. h264_nvenc).
        encoder: String,
    },

    /// Test whether an encoder actually works on this machine.
    Check {
        /// Encoder name (e.g. hevc_vaapi).
        encoder: String,
    },

    /// Pick the fastest render device for a hardware encoder.
    #[command(name = "best-device")]
    BestDevice {
        /// Encoder name (e.g. h264_vaapi).
        encoder: String,
    },

    /// Validate the configuration file without running anything.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the parsed configuration.
    #[command(name = "config-show")]
    ConfigShow,
}

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the job manifest file.
    pub manifest: PathBuf,

    /// Override the configured concurrency cap for this run.
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}
