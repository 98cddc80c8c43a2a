// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! `build-baseline`: fingerprint a trusted firmware image

use crate::error::FirmguardctlError;
use crate::output::OutputHandler;
use firmguard::baseline::{BaselineBuilder, FirmwareBaseline};
use firmguard::config::BaselineProfile;
use serde_json::{json, Value};
use std::path::Path;

pub fn execute(
    firmware: &Path,
    output_path: &Path,
    bios_version: Option<&str>,
    profile: &BaselineProfile,
    output: &OutputHandler,
) -> Result<Value, FirmguardctlError> {
    output.progress(format!("Analyzing firmware image {}", firmware.display()));

    let mut builder = BaselineBuilder::new(profile);
    if let Some(version) = bios_version {
        builder = builder.bios_version(version);
    }
    let baseline = builder.build_from_file(firmware)?;
    baseline.save(output_path)?;

    output.progress(format!("Baseline saved to {}", output_path.display()));
    Ok(summary(&baseline, output_path))
}

fn summary(baseline: &FirmwareBaseline, saved_to: &Path) -> Value {
    json!({
        "baseline": saved_to.display().to_string(),
        "source_file": baseline.metadata.source_file,
        "firmware_size": baseline.metadata.firmware_size,
        "bios_version": baseline.metadata.bios_version,
        "full_sha256": baseline.hashes.full_sha256,
        "regions": baseline.hashes.regions.len(),
        "chunks": baseline.hashes.chunk_hashes.len(),
        "signatures": baseline.signatures.len(),
        "certificates": baseline.certificates.len(),
        "firmware_volumes": baseline.uefi_volumes.len(),
    })
}
