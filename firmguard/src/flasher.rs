// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Access to the SPI flash chip holding the platform firmware.
//!
//! The chip is only reached through the [`FirmwareFlasher`] trait. The one
//! production implementation, [`FlashromFlasher`], runs the `flashrom` tool;
//! everything above it works on byte buffers and hashes.

use crate::algorithms::sha256_hex;
use crate::cmd_exec;
use crate::config::FlashConfig;
use crate::error::{Error, Result};
use crate::file_ops;
use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipInfo {
    pub name: Option<String>,
    pub size: Option<u64>,
}

#[async_trait]
pub trait FirmwareFlasher: Send + Sync {
    /// Identify the flash chip
    async fn probe(&self) -> Result<ChipInfo>;

    /// Read the whole chip
    async fn read(&self) -> Result<Vec<u8>>;

    /// Write `image` to the whole chip
    async fn write(&self, image: &[u8]) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOperation {
    Backup,
    Restore,
}

/// Result of a hash-verified flash round trip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub operation: RecoveryOperation,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<Box<RecoveryOutcome>>,
}

/// Drives the `flashrom` command line tool
pub struct FlashromFlasher {
    config: FlashConfig,
}

impl FlashromFlasher {
    pub fn new(config: FlashConfig) -> Self {
        FlashromFlasher { config }
    }

    async fn flashrom(
        &self,
        args: &[&str],
        timeout_secs: u64,
    ) -> Result<String> {
        let mut full_args = vec!["--programmer", self.config.programmer.as_str()];
        full_args.extend_from_slice(args);
        let output = cmd_exec::run(
            &self.config.flashrom_path,
            &full_args,
            Duration::from_secs(timeout_secs),
        )
        .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl FirmwareFlasher for FlashromFlasher {
    async fn probe(&self) -> Result<ChipInfo> {
        let timeout = self.config.probe_timeout_secs;
        let name = self.flashrom(&["--flash-name"], timeout).await?;
        let size = self.flashrom(&["--flash-size"], timeout).await?;

        Ok(ChipInfo {
            name: parse_flash_name(&name),
            size: parse_flash_size(&size),
        })
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let dump = dir.path().join("flash-read.bin");
        let dump_arg = dump.display().to_string();

        info!("Reading flash chip with {}", self.config.flashrom_path);
        let _ = self
            .flashrom(&["--read", dump_arg.as_str()], self.config.read_timeout_secs)
            .await?;

        tokio::fs::read(&dump).await.map_err(|e| Error::io(&dump, e))
    }

    async fn write(&self, image: &[u8]) -> Result<()> {
        let dir = tempfile::tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let staged = dir.path().join("flash-write.bin");
        tokio::fs::write(&staged, image)
            .await
            .map_err(|e| Error::io(&staged, e))?;
        let staged_arg = staged.display().to_string();

        warn!(
            "Writing {} bytes to the flash chip with {}",
            image.len(),
            self.config.flashrom_path
        );
        let _ = self
            .flashrom(
                &["--write", staged_arg.as_str(), "--verify"],
                self.config.write_timeout_secs,
            )
            .await?;
        Ok(())
    }
}

// flashrom prints `vendor="..." name="..."` as its last line
fn parse_flash_name(output: &str) -> Option<String> {
    let line = output.lines().rev().find(|l| !l.trim().is_empty())?;
    match line.split_once("name=\"") {
        Some((_, rest)) => rest.split('"').next().map(str::to_string),
        None => Some(line.trim().to_string()),
    }
}

fn parse_flash_size(output: &str) -> Option<u64> {
    output
        .lines()
        .rev()
        .find_map(|l| l.trim().parse::<u64>().ok())
}

/// Read the chip into `output` and confirm the file matches what was read
pub async fn backup_firmware(
    flasher: &dyn FirmwareFlasher,
    output: &Path,
) -> Result<RecoveryOutcome> {
    let image = flasher.read().await?;
    if image.is_empty() {
        return Err(Error::Validation(
            "flash chip read returned no data".to_string(),
        ));
    }
    let expected = sha256_hex(&image)?;

    file_ops::write_bytes_atomic(output, &image)?;
    let actual = sha256_hex(&file_ops::read_bytes(output)?)?;
    if actual != expected {
        return Err(Error::FlashVerification { expected, actual });
    }

    info!(
        "Backed up {} bytes of firmware to {} (sha256 {expected})",
        image.len(),
        output.display()
    );

    Ok(RecoveryOutcome {
        operation: RecoveryOperation::Backup,
        path: output.to_path_buf(),
        size: image.len() as u64,
        sha256: expected,
        verified: true,
        backup: None,
    })
}

/// Write the image at `image_path` to the chip and read it back.
///
/// When `backup` is given the current chip contents are saved there first.
/// A read-back that does not hash to the written image is an
/// [`Error::FlashVerification`].
pub async fn restore_firmware(
    flasher: &dyn FirmwareFlasher,
    image_path: &Path,
    backup: Option<&Path>,
) -> Result<RecoveryOutcome> {
    let image = file_ops::read_bytes(image_path)?;
    if image.is_empty() {
        return Err(Error::Validation(format!(
            "firmware image {} is empty",
            image_path.display()
        )));
    }
    let expected = sha256_hex(&image)?;

    let chip = flasher.probe().await?;
    if let Some(size) = chip.size {
        if size != image.len() as u64 {
            return Err(Error::Validation(format!(
                "image is {} bytes but the flash chip holds {size} bytes",
                image.len()
            )));
        }
    }

    let backup = match backup {
        Some(path) => Some(Box::new(backup_firmware(flasher, path).await?)),
        None => None,
    };

    flasher.write(&image).await?;
    let actual = sha256_hex(&flasher.read().await?)?;
    if actual != expected {
        error!("Flash read-back does not match the written image");
        return Err(Error::FlashVerification { expected, actual });
    }

    info!(
        "Restored {} to the flash chip (sha256 {expected})",
        image_path.display()
    );

    Ok(RecoveryOutcome {
        operation: RecoveryOperation::Restore,
        path: image_path.to_path_buf(),
        size: image.len() as u64,
        sha256: expected,
        verified: true,
        backup,
    })
}
