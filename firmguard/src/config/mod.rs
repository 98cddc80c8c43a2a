// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Layered configuration for the baseline builder, the live-system scan and
//! the flashing tool wrapper.
//!
//! Sources are applied in this order, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. TOML configuration files
//! 3. Environment variables prefixed with `FIRMGUARD_`, using `__` to
//!    separate sections from options (e.g.
//!    `FIRMGUARD_SCAN__EFI_VARIABLE_TIMEOUT_MS=500`)
//!
//! Command line options are applied on top by the caller.
//!
//! ```toml
//! [baseline]
//! chunk_size = 4096
//!
//! [baseline.regions.boot_block]
//! start = 0x0
//! end = 0x10000
//!
//! [baseline.signatures]
//! dxe_core = "DXE_CORE"
//!
//! [scan]
//! efi_variable_timeout_ms = 2000
//!
//! [flash]
//! programmer = "internal"
//!
//! [recovery]
//! command = "/usr/libexec/firmguard/recover"
//! ```

mod error;
mod file_config;

pub use error::FirmguardConfigError;
pub use file_config::{
    FileConfigBuilder, DEFAULT_CONFIG, DEFAULT_SYS_CONFIG,
    DEFAULT_SYS_CONFIG_SNIPPETS_DIR, GLOBAL_CONFIG_OVERRIDE_ENV_VAR,
};

use crate::scan::RegionSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub static DEFAULT_CHUNK_SIZE: usize = 4096;
pub static DEFAULT_CERTIFICATE_LIMIT: usize = 50;
pub static DEFAULT_VOLUME_LIMIT: usize = 20;
pub static DEFAULT_VOLUME_HEADER_WINDOW: usize = 1024;
pub static DEFAULT_MIN_IMAGE_SIZE: usize = 4096;
pub static DEFAULT_INJECTION_POINTS: [u64; 4] = [0x0, 0xFFF0, 0x100000, 0x800000];
pub static DEFAULT_SUSPICIOUS_PATTERNS: [&str; 5] =
    ["bootkit", "malware", "rootkit", "keylogger", "backdoor"];

pub static DEFAULT_DMI_PATH: &str = "/sys/devices/virtual/dmi/id";
pub static DEFAULT_EFIVARS_PATH: &str = "/sys/firmware/efi/efivars";
pub static DEFAULT_EFI_VARIABLE_PREFIX: usize = 1024;
pub static DEFAULT_EFI_VARIABLE_TIMEOUT_MS: u64 = 2000;
pub static DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;
pub static DEFAULT_AUXILIARY_COMMANDS: [&str; 2] =
    ["fwupdmgr get-devices", "dmidecode -t bios"];

pub static DEFAULT_FLASHROM_PATH: &str = "flashrom";
pub static DEFAULT_PROGRAMMER: &str = "internal";
pub static DEFAULT_READ_TIMEOUT_SECS: u64 = 300;
pub static DEFAULT_WRITE_TIMEOUT_SECS: u64 = 600;
pub static DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;
pub static DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 600;

fn default_regions() -> BTreeMap<String, RegionSpec> {
    [
        ("boot_block", 0x0, 0x10000),
        ("nvram_region", 0x800000, 0x900000),
        ("dxe_region", 0x400000, 0x800000),
        ("recovery_region", 0x1000000, 0x1400000),
    ]
    .into_iter()
    .map(|(name, start, end)| (name.to_string(), RegionSpec { start, end }))
    .collect()
}

fn default_signatures() -> BTreeMap<String, String> {
    [
        ("ami_bios_guard", "_AMIPFAT"),
        ("ami_biosguard_config", "AMI_BIOS_GUARD_FLASH_CONFIGURATION"),
        ("asus_signature", "ASUS Tech.Inc."),
        ("secure_boot_ca", "ASUS Secure Boot Root CA"),
        ("secure_boot_db", "ASUS Secure Boot DB"),
        ("uefi_fv_header", "_FVH"),
        ("dxe_core", "DXE_CORE"),
        ("pei_core", "PEI_CORE"),
        ("smm_core", "SMM_CORE"),
    ]
    .into_iter()
    .map(|(name, literal)| (name.to_string(), literal.to_string()))
    .collect()
}

/// What the baseline builder looks for in an image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineProfile {
    pub regions: BTreeMap<String, RegionSpec>,
    pub signatures: BTreeMap<String, String>,
    pub chunk_size: usize,
    pub certificate_limit: usize,
    pub volume_limit: usize,
    pub volume_header_window: usize,
    pub min_image_size: usize,
    pub injection_points: Vec<u64>,
    pub suspicious_patterns: Vec<String>,
}

impl Default for BaselineProfile {
    fn default() -> Self {
        BaselineProfile {
            regions: default_regions(),
            signatures: default_signatures(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            certificate_limit: DEFAULT_CERTIFICATE_LIMIT,
            volume_limit: DEFAULT_VOLUME_LIMIT,
            volume_header_window: DEFAULT_VOLUME_HEADER_WINDOW,
            min_image_size: DEFAULT_MIN_IMAGE_SIZE,
            injection_points: DEFAULT_INJECTION_POINTS.to_vec(),
            suspicious_patterns: DEFAULT_SUSPICIOUS_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Where and how the live system is read
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub dmi_path: PathBuf,
    pub efivars_path: PathBuf,
    pub efi_variable_prefix: usize,
    pub efi_variable_timeout_ms: u64,
    pub tool_timeout_secs: u64,
    pub auxiliary_commands: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            dmi_path: PathBuf::from(DEFAULT_DMI_PATH),
            efivars_path: PathBuf::from(DEFAULT_EFIVARS_PATH),
            efi_variable_prefix: DEFAULT_EFI_VARIABLE_PREFIX,
            efi_variable_timeout_ms: DEFAULT_EFI_VARIABLE_TIMEOUT_MS,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            auxiliary_commands: DEFAULT_AUXILIARY_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    pub flashrom_path: String,
    pub programmer: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            flashrom_path: DEFAULT_FLASHROM_PATH.to_string(),
            programmer: DEFAULT_PROGRAMMER.to_string(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Command line run by `scan --auto-recovery` on a CRITICAL result
    pub command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            command: None,
            timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmguardConfig {
    pub baseline: BaselineProfile,
    pub scan: ScanConfig,
    pub flash: FlashConfig,
    pub recovery: RecoveryConfig,
}

impl FirmguardConfig {
    /// Load the configuration from `config_path` when given, otherwise from
    /// the default locations, then apply the environment.
    pub fn load(
        config_path: Option<&Path>,
    ) -> Result<Self, FirmguardConfigError> {
        let mut builder = FileConfigBuilder::new();
        match config_path {
            Some(path) => builder.required_file(path),
            None => builder.load_default_locations(),
        };
        let config = builder.build()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FirmguardConfigError> {
        for (name, region) in &self.baseline.regions {
            if region.start >= region.end {
                return Err(FirmguardConfigError::InvalidRegion {
                    name: name.clone(),
                    start: region.start,
                    end: region.end,
                });
            }
        }

        if self.baseline.chunk_size == 0 {
            return Err(FirmguardConfigError::InvalidOption {
                option: "baseline.chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.baseline.volume_header_window == 0 {
            return Err(FirmguardConfigError::InvalidOption {
                option: "baseline.volume_header_window".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some((name, _)) = self
            .baseline
            .signatures
            .iter()
            .find(|(_, literal)| literal.is_empty())
        {
            return Err(FirmguardConfigError::InvalidOption {
                option: format!("baseline.signatures.{name}"),
                reason: "signature literal is empty".to_string(),
            });
        }

        if self
            .baseline
            .suspicious_patterns
            .iter()
            .any(|p| p.trim().is_empty())
        {
            return Err(FirmguardConfigError::InvalidOption {
                option: "baseline.suspicious_patterns".to_string(),
                reason: "patterns must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
