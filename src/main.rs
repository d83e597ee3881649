// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! clocktree command line tool
//!
//! Resolves experiment descriptions into exact clock schedules.
//!
//! # Usage
//!
//! ```bash
//! # Resolve and print ticks and bound outputs
//! clocktree resolve experiment.yaml
//!
//! # Only check that an experiment resolves
//! clocktree check experiment.yaml
//!
//! # Show effective configuration
//! clocktree --config clocktree.yaml config
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clocktree::{
    config::Config,
    experiment::ExperimentDescription,
    temporal::{ResolvedSchedule, Resolver, Timeline},
    validation::validate_description,
    Result, VERSION,
};

/// Exact timing resolver for triggered experiment hardware
#[derive(Parser)]
#[command(name = "clocktree")]
#[command(author = "Clocktree Contributors")]
#[command(version = VERSION)]
#[command(about = "Resolve device trees into hardware-valid clock schedules")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CLOCKTREE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an experiment and print its schedule
    Resolve {
        /// Experiment description (YAML or JSON)
        experiment: PathBuf,
    },

    /// Resolve and validate an experiment without printing the schedule
    Check {
        /// Experiment description (YAML or JSON)
        experiment: PathBuf,
    },

    /// Show effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Resolve { experiment } => {
            let schedule = resolve_file(&config, &experiment)?;
            print_schedule(&schedule, config.resolver.display_digits);
        }

        Commands::Check { experiment } => match resolve_file(&config, &experiment) {
            Ok(schedule) => {
                println!(
                    "{}: OK ({} devices)",
                    experiment.display(),
                    schedule.len()
                );
            }
            Err(e) => {
                error!(error = %e, "Experiment does not resolve");
                eprintln!("{}: {}", experiment.display(), e);
                std::process::exit(1);
            }
        },

        Commands::Config => {
            // Show effective configuration
            println!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Load, check, build and resolve one experiment description.
fn resolve_file(config: &Config, path: &Path) -> Result<ResolvedSchedule> {
    info!(version = VERSION, experiment = %path.display(), "Resolving experiment");

    let description = ExperimentDescription::load(path)?;
    validate_description(&description, &config.limits)?;
    let tree = description.build_tree()?;
    let schedule = Resolver::new(&config.resolver).resolve(&tree)?;
    Ok(schedule)
}

/// Human-readable summary of a schedule.
fn print_schedule(schedule: &ResolvedSchedule, digits: usize) {
    let show = |t: &clocktree::temporal::Instant| format!("{}s", t.to_display_seconds_with(digits));

    println!(
        "revision {} | granularity {} | {} devices",
        schedule.revision(),
        show(schedule.granularity()),
        schedule.len()
    );
    for wait in schedule.waits() {
        println!("wait '{}' at {}", wait.name, show(&wait.time));
    }

    for device in schedule.iter() {
        println!();
        println!(
            "{} [{}] min period {} | min trigger {}",
            device.name,
            device.role,
            show(&device.effective_min_period),
            show(&device.min_trigger)
        );
        match &device.timeline {
            Timeline::Clock { trigger, ticks, .. } => {
                if let Some(trigger) = trigger {
                    println!("  started by parent tick {} at {}", trigger.tick, show(&trigger.at));
                }
                for (i, tick) in ticks.iter().enumerate() {
                    println!("  tick {:>5}  {}", i, show(tick));
                }
            }
            Timeline::Terminal { outputs } => {
                for output in outputs {
                    let tick = output
                        .tick
                        .map_or_else(|| "static".to_string(), |t| format!("tick {}", t));
                    let sample = output
                        .sample
                        .map(|s| format!(" sample {}", s))
                        .unwrap_or_default();
                    println!(
                        "  {:<12} {}  instruction {}{}",
                        tick,
                        show(&output.time),
                        output.instruction,
                        sample
                    );
                }
            }
        }
    }
}
