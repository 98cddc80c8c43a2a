// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirmguardConfigError {
    // Error from config crate
    #[error("Error from the config crate: {0}")]
    Config(#[from] ConfigError),

    // Glob error
    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    // Region with an empty or inverted byte range
    #[error("Region '{name}' has an invalid range {start:#x}..{end:#x}")]
    InvalidRegion { name: String, start: u64, end: u64 },

    // Option set to a value that cannot work
    #[error("Invalid value for '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    // Missing configuration file passed on the command line
    #[error("Specified configuration file not found: {file}")]
    MissingConfigFile { file: String },

    // Missing configuration file set in FIRMGUARD_CONFIG
    #[error("Missing file {file} set in 'FIRMGUARD_CONFIG' environment variable")]
    MissingEnvConfigFile { file: String },
}
