// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! # firmguardctl
//!
//! Command-line tool to fingerprint a trusted firmware image and to scan the
//! running system for signs of firmware tampering against that fingerprint.

#![deny(
    nonstandard_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    unused_extern_crates,
    unused_import_braces
)]

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use firmguard::config::FirmguardConfig;
use log::{debug, error};
use serde_json::Value;
use std::path::PathBuf;
use std::process;

use crate::error::FirmguardctlError;
use crate::output::OutputHandler;

/// Firmware baseline builder and bootkit scanner
#[derive(Parser)]
#[command(
    name = "firmguardctl",
    version,
    about = "Build trusted firmware baselines and scan systems for bootkits",
    after_long_help = "CONFIGURATION SOURCES (highest to lowest priority):\n  \
        1. Command-line arguments\n  \
        2. Environment variables (FIRMGUARD_SCAN__EFIVARS_PATH, FIRMGUARD_FLASH__PROGRAMMER, etc.)\n  \
        3. Configuration files (--config, firmguard.toml, /etc/firmguard/firmguard.toml)\n  \
        4. Built-in defaults\n\n\
        EXIT STATUS:\n  \
        0 when the command completed, whatever risk a scan found\n  \
        1 when a file could not be read or written, or an input was invalid"
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress messages and logs
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available output formats
#[derive(Clone, Copy, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Build a baseline from a known-good firmware image
    BuildBaseline {
        /// Raw firmware image (SPI flash dump)
        #[arg(value_name = "FIRMWARE")]
        firmware: PathBuf,

        /// Where to write the baseline JSON
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// BIOS version to record instead of guessing it from the file name
        #[arg(long, value_name = "VERSION")]
        bios_version: Option<String>,
    },
    /// Compare the running system against a baseline
    Scan {
        /// Baseline JSON produced by build-baseline
        #[arg(short, long, value_name = "FILE")]
        baseline: PathBuf,

        /// Where to write the detection report JSON
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Run the configured recovery command when the risk is CRITICAL
        #[arg(long)]
        auto_recovery: bool,
    },
    /// Access the firmware flash chip through flashrom
    Flash {
        #[command(subcommand)]
        action: FlashAction,
    },
}

/// Flash chip actions
#[derive(Subcommand)]
pub(crate) enum FlashAction {
    /// Identify the flash chip
    Probe,
    /// Read the chip into a file and verify the copy
    Backup {
        /// Where to write the image
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Write an image to the chip and verify it by reading it back
    Restore {
        /// Known-good firmware image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Confirm that the flash chip will be overwritten
        #[arg(long)]
        yes: bool,

        /// Save the current chip contents here before writing
        #[arg(long, value_name = "FILE")]
        backup: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let output = OutputHandler::new(cli.format, cli.quiet);

    let config = match FirmguardConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            output.error(e.into());
            process::exit(1);
        }
    };
    debug!("Effective configuration: {config:?}");

    match execute_command(&cli.command, &config, &output).await {
        Ok(response) => output.success(response),
        Err(e) => {
            debug!("Command failed: {e:?}");
            output.error(e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let log_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    pretty_env_logger::formatted_builder()
        .filter_level(log_level)
        .target(pretty_env_logger::env_logger::Target::Stderr)
        .init();
}

async fn execute_command(
    command: &Commands,
    config: &FirmguardConfig,
    output: &OutputHandler,
) -> Result<Value, FirmguardctlError> {
    match command {
        Commands::BuildBaseline {
            firmware,
            output: baseline_path,
            bios_version,
        } => commands::baseline::execute(
            firmware,
            baseline_path,
            bios_version.as_deref(),
            &config.baseline,
            output,
        ),
        Commands::Scan {
            baseline,
            output: report_path,
            auto_recovery,
        } => {
            commands::scan::execute(
                baseline,
                report_path,
                *auto_recovery,
                config,
                output,
            )
            .await
        }
        Commands::Flash { action } => {
            commands::flash::execute(action, &config.flash, output).await
        }
    }
}
