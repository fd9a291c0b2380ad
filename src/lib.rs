//! Media Pipeline - a queue-driven orchestrator for external media tools.
//!
//! This library supervises download and transcode child processes, extracts
//! fractional progress from their output, discovers what the transcoder
//! binary can do on the current machine, and schedules jobs through a
//! bounded-concurrency queue.

pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod manifest;
pub mod media;
pub mod process;
pub mod progress;
pub mod queue;

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands, RunArgs};
use crate::encoder::{catalog, CapabilityScanner};
use crate::queue::{JobState, Orchestrator};

/// Runs the pipeline with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    match cli.command {
        Commands::Run(args) => run_queue(args, &cli.config).await,
        Commands::Encoders => list_encoders(&cli.config).await,
        Commands::Capabilities { encoder } => show_capabilities(&cli.config, &encoder).await,
        Commands::Check { encoder } => check_encoder(&cli.config, &encoder).await,
        Commands::BestDevice { encoder } => best_device(&cli.config, &encoder).await,
        Commands::ConfigValidate => validate_config(&cli.config),
        Commands::ConfigShow => show_config(&cli.config),
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(())
}

/// Enqueues every manifest job and pumps the queue until it drains.
async fn run_queue(args: RunArgs, config_path: &Path) -> Result<()> {
    let mut config = config::loader::load_and_validate(config_path)?;
    if let Some(cap) = args.max_concurrent {
        config.queue.max_concurrent = cap;
    }

    let manifest = manifest::load(&args.manifest)?;
    info!(jobs = manifest.jobs.len(), "Manifest loaded");

    let config = Arc::new(RwLock::new(config));
    let orchestrator = Orchestrator::new(config.clone());

    for entry in &manifest.jobs {
        let spec = {
            let config = config.read().unwrap();
            entry.to_spec(&config)
        };
        let program = entry.program.display().to_string();
        let spec = spec.with_progress_fn(Arc::new(move |message: &str, _started, percent| {
            if percent >= 0.0 {
                debug!(job = %program, percent, "progress");
            } else {
                debug!(job = %program, message, "output");
            }
        }));
        let id = orchestrator.enqueue(spec)?;
        debug!(job_id = %id, "Enqueued from manifest");
    }

    orchestrator.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping engine");
                orchestrator.stop();
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if orchestrator.is_idle() {
                    break;
                }
            }
        }
    }

    let counts = orchestrator.counts();
    info!(
        completed = counts.completed,
        failed = counts.failed,
        queued = counts.queued,
        "Queue drained"
    );

    for snapshot in orchestrator.snapshots() {
        if snapshot.state == JobState::Failed {
            warn!(job_id = %snapshot.id, reason = %snapshot.last_message, "Job failed");
        }
    }

    Ok(())
}

/// Lists the raw encoder names the transcoder binary reports.
async fn list_encoders(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let scanner = CapabilityScanner::new(config.scanner_config());

    let mut encoders: Vec<String> = scanner.list_encoders().await.into_iter().collect();
    encoders.sort();

    if encoders.is_empty() {
        println!("No encoders reported (is the transcoder binary installed?)");
    } else {
        println!("{} encoder(s):", encoders.len());
        for name in encoders {
            println!("  {name}");
        }
    }
    Ok(())
}

/// Shows discovered presets/profiles for one catalog encoder.
async fn show_capabilities(config_path: &Path, encoder: &str) -> Result<()> {
    let desc = resolve_encoder(encoder)?;
    let config = config::loader::load_and_validate(config_path)?;
    let scanner = CapabilityScanner::new(config.scanner_config());

    let caps = scanner.capabilities(desc).await;
    println!("{} ({:?}/{})", desc.name, desc.backend, desc.codec);
    println!(
        "  presets:  {}",
        if caps.presets.is_empty() {
            "(none discovered)".to_string()
        } else {
            caps.presets.join(", ")
        }
    );
    println!(
        "  profiles: {}",
        if caps.profiles.is_empty() {
            "(none discovered)".to_string()
        } else {
            caps.profiles.join(", ")
        }
    );
    Ok(())
}

/// Probes whether one encoder actually works here.
async fn check_encoder(config_path: &Path, encoder: &str) -> Result<()> {
    let desc = resolve_encoder(encoder)?;
    let config = config::loader::load_and_validate(config_path)?;
    let scanner = CapabilityScanner::new(config.scanner_config());

    if scanner.is_available(desc).await {
        println!("{}: available", desc.name);
    } else {
        println!("{}: not available", desc.name);
    }
    Ok(())
}

/// Picks the fastest render device for a hardware encoder.
async fn best_device(config_path: &Path, encoder: &str) -> Result<()> {
    let desc = resolve_encoder(encoder)?;
    if !desc.backend.is_hardware() {
        println!("{}: software encoder, no device needed", desc.name);
        return Ok(());
    }

    let config = config::loader::load_and_validate(config_path)?;
    let scanner = CapabilityScanner::new(config.scanner_config());

    match scanner.best_device(desc).await {
        Some(choice) => match choice.encode_time {
            Some(elapsed) => println!(
                "{}: {} ({} ms benchmark)",
                desc.name,
                choice.device.display(),
                elapsed.as_millis()
            ),
            None => println!(
                "{}: {} (single candidate, benchmark skipped)",
                desc.name,
                choice.device.display()
            ),
        },
        None => println!("{}: no usable device", desc.name),
    }
    Ok(())
}

/// Validates the configuration file and reports any issues.
fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    println!("Configuration is valid.");
    println!(
        "  concurrency cap: {}, probe timeout: {}s",
        config.queue.max_concurrent, config.probe.timeout_seconds
    );
    Ok(())
}

/// Displays the parsed configuration.
fn show_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}

/// Looks an encoder up in the catalog, suggesting the closest name on a miss.
fn resolve_encoder(name: &str) -> Result<&'static encoder::EncoderDescriptor> {
    catalog::find(name).ok_or_else(|| {
        error::CapabilityError::UnknownEncoder {
            name: name.to_string(),
            suggestion: catalog::suggest(name).to_string(),
        }
        .into()
    })
}
