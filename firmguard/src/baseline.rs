// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Trusted firmware baselines.
//!
//! A [`FirmwareBaseline`] is built once from a known-good firmware dump and
//! persisted as JSON. Building is a pure function of the image bytes and the
//! [`BaselineProfile`]; only `created_timestamp` differs between two builds
//! of the same image.

use crate::algorithms::{hash_hex, HashAlgorithm};
use crate::config::BaselineProfile;
use crate::error::{Error, Result};
use crate::file_ops;
use crate::scan::{
    self, CertificateRecord, ChunkHash, RegionHash, VolumeRecord,
};
use crate::serialization::{
    deserialize_offset_map, deserialize_offsets, serialize_offset_map,
    serialize_offsets,
};
use chrono::{SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recorded when no BIOS version was given and none could be guessed
pub const UNKNOWN_BIOS_VERSION: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineMetadata {
    pub source_file: String,
    pub firmware_size: u64,
    pub created_timestamp: String,
    pub bios_version: String,
    #[serde(default)]
    pub analyzer_version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineHashes {
    pub full_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_sha1: Option<String>,
    #[serde(default)]
    pub regions: BTreeMap<String, RegionHash>,
    #[serde(default)]
    pub chunk_hashes: Vec<ChunkHash>,
}

/// Informational addresses and weak textual indicators
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootkitIndicators {
    #[serde(
        default,
        serialize_with = "serialize_offsets",
        deserialize_with = "deserialize_offsets"
    )]
    pub common_injection_points: Vec<u64>,
    /// Required: the comparator matches these against live-system text
    pub suspicious_patterns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareBaseline {
    pub metadata: BaselineMetadata,
    pub hashes: BaselineHashes,
    #[serde(
        default,
        serialize_with = "serialize_offset_map",
        deserialize_with = "deserialize_offset_map"
    )]
    pub signatures: BTreeMap<String, Vec<u64>>,
    #[serde(default)]
    pub certificates: BTreeMap<String, CertificateRecord>,
    #[serde(default)]
    pub uefi_volumes: BTreeMap<String, VolumeRecord>,
    pub bootkit_indicators: BootkitIndicators,
}

impl FirmwareBaseline {
    /// Read a persisted baseline.
    ///
    /// A file that cannot be read is an [`Error::Io`]; a file that is not a
    /// well formed baseline is an [`Error::Validation`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = file_ops::read_bytes(path)?;
        let baseline: FirmwareBaseline = serde_json::from_slice(&data)
            .map_err(|e| {
                Error::Validation(format!(
                    "{} is not a valid baseline: {e}",
                    path.display()
                ))
            })?;
        baseline.validate()?;
        Ok(baseline)
    }

    /// Persist the baseline, replacing `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        file_ops::write_json_atomic(path, self)
    }

    /// Check the structural consistency of the baseline
    pub fn validate(&self) -> Result<()> {
        let size = self.metadata.firmware_size;
        if size == 0 {
            return Err(Error::Validation(
                "baseline records an empty firmware image".to_string(),
            ));
        }

        let sha256_len = HashAlgorithm::Sha256.hex_len();
        let is_sha256 = |digest: &str| {
            digest.len() == sha256_len
                && digest.chars().all(|c| c.is_ascii_hexdigit())
        };

        if !is_sha256(&self.hashes.full_sha256) {
            return Err(Error::Validation(format!(
                "full_sha256 '{}' is not a SHA-256 digest",
                self.hashes.full_sha256
            )));
        }

        for (name, region) in &self.hashes.regions {
            if region.end_offset > size || region.start_offset >= region.end_offset
            {
                return Err(Error::Validation(format!(
                    "region {name} ({:#x}..{:#x}) lies outside the {size} byte image",
                    region.start_offset, region.end_offset
                )));
            }
        }

        if !self.hashes.chunk_hashes.is_empty() {
            let covered: u64 =
                self.hashes.chunk_hashes.iter().map(|c| c.size).sum();
            if covered != size {
                return Err(Error::Validation(format!(
                    "chunk hashes cover {covered} bytes of a {size} byte image"
                )));
            }
        }

        if let Some((id, _)) = self
            .certificates
            .iter()
            .find(|(_, cert)| cert.offset >= size)
        {
            return Err(Error::Validation(format!(
                "certificate {id} starts outside the image"
            )));
        }

        if let Some((id, _)) = self
            .uefi_volumes
            .iter()
            .find(|(_, volume)| volume.offset >= size)
        {
            return Err(Error::Validation(format!(
                "firmware volume {id} starts outside the image"
            )));
        }

        Ok(())
    }

    /// Certificates in scan order
    pub fn certificate_list(&self) -> Vec<&CertificateRecord> {
        self.certificates.values().collect()
    }

    /// Firmware volumes in scan order
    pub fn volume_list(&self) -> Vec<&VolumeRecord> {
        self.uefi_volumes.values().collect()
    }
}

/// Builds [`FirmwareBaseline`]s according to a [`BaselineProfile`].
pub struct BaselineBuilder<'a> {
    profile: &'a BaselineProfile,
    bios_version: Option<String>,
}

impl<'a> BaselineBuilder<'a> {
    pub fn new(profile: &'a BaselineProfile) -> Self {
        BaselineBuilder {
            profile,
            bios_version: None,
        }
    }

    /// Record this BIOS version instead of guessing one from the file name
    pub fn bios_version(mut self, version: impl Into<String>) -> Self {
        self.bios_version = Some(version.into());
        self
    }

    /// Read the image at `path` and build its baseline
    pub fn build_from_file(&self, path: &Path) -> Result<FirmwareBaseline> {
        let image = file_ops::read_bytes(path)?;
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.build(&image, &source_file)
    }

    /// Build the baseline of `image`.
    ///
    /// The scan passes only read the image and run concurrently.
    pub fn build(
        &self,
        image: &[u8],
        source_file: &str,
    ) -> Result<FirmwareBaseline> {
        if image.is_empty() {
            return Err(Error::Validation(format!(
                "firmware image {source_file} is empty"
            )));
        }
        if image.len() < self.profile.min_image_size {
            return Err(Error::Validation(format!(
                "firmware image {source_file} is {} bytes, smaller than the minimum of {} bytes",
                image.len(),
                self.profile.min_image_size
            )));
        }
        if self.profile.chunk_size == 0 {
            return Err(Error::Validation(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        info!(
            "Building baseline for {source_file} ({} bytes)",
            image.len()
        );

        let profile = self.profile;
        let (digests, (regions, (chunks, (signatures, (certs, volumes))))) =
            rayon::join(
                || full_digests(image),
                || {
                    rayon::join(
                        || scan::region_hashes(image, &profile.regions),
                        || {
                            rayon::join(
                                || {
                                    scan::chunk_hashes(
                                        image,
                                        profile.chunk_size,
                                    )
                                },
                                || {
                                    rayon::join(
                                        || {
                                            scan::signature_hits(
                                                image,
                                                &profile.signatures,
                                            )
                                        },
                                        || {
                                            rayon::join(
                                                || {
                                                    scan::scan_certificates(
                                                        image,
                                                        profile.certificate_limit,
                                                    )
                                                },
                                                || {
                                                    scan::scan_firmware_volumes(
                                                        image,
                                                        profile.volume_limit,
                                                        profile.volume_header_window,
                                                    )
                                                },
                                            )
                                        },
                                    )
                                },
                            )
                        },
                    )
                },
            );

        let (full_sha256, full_md5, full_sha1) = digests?;
        let regions = regions?;
        let chunks = chunks?;
        let certs = certs?;
        let volumes = volumes?;

        debug!(
            "{} region(s), {} chunk(s), {} signature(s), {} certificate(s), {} firmware volume(s)",
            regions.len(),
            chunks.len(),
            signatures.len(),
            certs.len(),
            volumes.len()
        );

        let bios_version = self
            .bios_version
            .clone()
            .unwrap_or_else(|| guess_bios_version(source_file));
        if bios_version == UNKNOWN_BIOS_VERSION {
            warn!(
                "No BIOS version found in {source_file}; scans against this baseline cannot detect a version rollback"
            );
        }

        Ok(FirmwareBaseline {
            metadata: BaselineMetadata {
                source_file: source_file.to_string(),
                firmware_size: image.len() as u64,
                created_timestamp: Utc::now()
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                bios_version,
                analyzer_version: ANALYZER_VERSION.to_string(),
            },
            hashes: BaselineHashes {
                full_sha256,
                full_md5: Some(full_md5),
                full_sha1: Some(full_sha1),
                regions,
                chunk_hashes: chunks,
            },
            signatures,
            certificates: numbered("cert", certs),
            uefi_volumes: numbered("fv", volumes),
            bootkit_indicators: BootkitIndicators {
                common_injection_points: profile.injection_points.clone(),
                suspicious_patterns: profile.suspicious_patterns.clone(),
            },
        })
    }
}

fn full_digests(image: &[u8]) -> Result<(String, String, String)> {
    Ok((
        hash_hex(HashAlgorithm::Sha256, image)?,
        hash_hex(HashAlgorithm::Md5, image)?,
        hash_hex(HashAlgorithm::Sha1, image)?,
    ))
}

// cert_000, cert_001, ... keep scan order when sorted
fn numbered<T>(prefix: &str, records: Vec<T>) -> BTreeMap<String, T> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| (format!("{prefix}_{index:03}"), record))
        .collect()
}

/// Guess the BIOS version from a firmware file name.
///
/// The name is split on `_` and `.`; the first token holding both a letter
/// and a digit wins, e.g. `G615LPAS_303.bin` gives `G615LPAS`.
pub fn guess_bios_version(file_name: &str) -> String {
    file_name
        .split(['_', '.'])
        .find(|token| {
            token.chars().any(|c| c.is_ascii_digit())
                && token.chars().any(|c| c.is_ascii_alphabetic())
        })
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_BIOS_VERSION.to_string())
}
