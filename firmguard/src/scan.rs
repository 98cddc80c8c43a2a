// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Byte-level scanning passes over a raw firmware image.
//!
//! Every pass takes a read-only view of the image and returns its own
//! output, so the passes can run in any order or concurrently.

use crate::algorithms::sha256_hex;
use crate::error::Result;
use crate::serialization::{deserialize_offset, serialize_offset};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ASN.1 SEQUENCE tag followed by a two byte long-form length
pub const DER_SEQUENCE_MARKER: [u8; 2] = [0x30, 0x82];

/// Signature of a UEFI firmware volume header
pub const FV_SIGNATURE: &[u8; 4] = b"_FVH";

/// Hits closer than this to the end of the image cannot hold a volume header
pub const FV_MIN_HEADER_LEN: usize = 48;

const CERT_MIN_LEN: usize = 100;
const CERT_MAX_LEN: usize = 4096;
const DER_HEADER_LEN: usize = 4;

/// Named byte range of the image, `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionHash {
    #[serde(
        serialize_with = "serialize_offset",
        deserialize_with = "deserialize_offset"
    )]
    pub start_offset: u64,
    #[serde(
        serialize_with = "serialize_offset",
        deserialize_with = "deserialize_offset"
    )]
    pub end_offset: u64,
    pub sha256: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHash {
    #[serde(
        serialize_with = "serialize_offset",
        deserialize_with = "deserialize_offset"
    )]
    pub offset: u64,
    pub size: u64,
    pub sha256: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    #[serde(
        serialize_with = "serialize_offset",
        deserialize_with = "deserialize_offset"
    )]
    pub offset: u64,
    /// Length of the DER structure including its four byte header
    pub length: u64,
    pub sha256: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    #[serde(
        serialize_with = "serialize_offset",
        deserialize_with = "deserialize_offset"
    )]
    pub offset: u64,
    pub header_hash: String,
}

/// Position of the first occurrence of `needle` at or after `start`
pub fn find_from(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    let (first, rest) = needle.split_first()?;
    if start >= haystack.len() || haystack.len() - start < needle.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    let mut pos = start;
    while pos <= last_start {
        let candidate = haystack[pos..=last_start]
            .iter()
            .position(|b| b == first)?
            + pos;
        if haystack[candidate + 1..candidate + needle.len()] == *rest {
            return Some(candidate);
        }
        pos = candidate + 1;
    }

    None
}

/// All occurrences of `needle`, overlapping ones included, in ascending order
pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut start = 0;
    while let Some(pos) = find_from(haystack, needle, start) {
        positions.push(pos);
        start = pos + 1;
    }
    positions
}

/// Hash every configured region that fits inside the image.
///
/// Regions whose end lies past the image are left out; vendors ship images
/// of different sizes and a missing region is not an error.
pub fn region_hashes(
    image: &[u8],
    regions: &BTreeMap<String, RegionSpec>,
) -> Result<BTreeMap<String, RegionHash>> {
    let image_len = image.len() as u64;
    let mut hashes = BTreeMap::new();

    for (name, region) in regions {
        if region.end > image_len || region.start >= region.end {
            debug!(
                "Skipping region {name} ({:#x}..{:#x}) outside image of {image_len} bytes",
                region.start, region.end
            );
            continue;
        }

        let data = &image[region.start as usize..region.end as usize];
        let _ = hashes.insert(
            name.clone(),
            RegionHash {
                start_offset: region.start,
                end_offset: region.end,
                sha256: sha256_hex(data)?,
                size: data.len() as u64,
            },
        );
    }

    Ok(hashes)
}

/// Hash consecutive `chunk_size` chunks; only the last one may be shorter
pub fn chunk_hashes(image: &[u8], chunk_size: usize) -> Result<Vec<ChunkHash>> {
    image
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| {
            Ok(ChunkHash {
                offset: (index * chunk_size) as u64,
                size: chunk.len() as u64,
                sha256: sha256_hex(chunk)?,
            })
        })
        .collect()
}

/// Locate every configured literal; names without any hit are omitted
pub fn signature_hits(
    image: &[u8],
    signatures: &BTreeMap<String, String>,
) -> BTreeMap<String, Vec<u64>> {
    signatures
        .iter()
        .filter_map(|(name, literal)| {
            let hits: Vec<u64> = find_all(image, literal.as_bytes())
                .into_iter()
                .map(|pos| pos as u64)
                .collect();
            if hits.is_empty() {
                None
            } else {
                debug!("Signature {name} found {} time(s)", hits.len());
                Some((name.clone(), hits))
            }
        })
        .collect()
}

/// Find DER certificates by their SEQUENCE header.
///
/// The two bytes after the `30 82` marker are read as a big-endian length
/// `L`. The record covers the four byte header plus `L` bytes and is kept
/// when `L > 100` and the whole record stays below 4096 bytes. The cursor
/// moves one byte past every marker, accepted or not, and the scan stops
/// after `limit` certificates.
pub fn scan_certificates(
    image: &[u8],
    limit: usize,
) -> Result<Vec<CertificateRecord>> {
    let mut certificates = Vec::new();
    let mut pos = 0;

    while certificates.len() < limit {
        let Some(hit) = find_from(image, &DER_SEQUENCE_MARKER, pos) else {
            break;
        };

        if hit + DER_HEADER_LEN < image.len() {
            let der_len =
                u16::from_be_bytes([image[hit + 2], image[hit + 3]]) as usize;
            let length = der_len + DER_HEADER_LEN;
            if der_len > CERT_MIN_LEN && length < CERT_MAX_LEN {
                let end = (hit + length).min(image.len());
                certificates.push(CertificateRecord {
                    offset: hit as u64,
                    length: length as u64,
                    sha256: sha256_hex(&image[hit..end])?,
                });
            }
        }

        pos = hit + 1;
    }

    Ok(certificates)
}

/// Find firmware volume headers and hash the `window` bytes starting at
/// each signature, or up to the end of the image when it is closer.
pub fn scan_firmware_volumes(
    image: &[u8],
    limit: usize,
    window: usize,
) -> Result<Vec<VolumeRecord>> {
    let mut volumes = Vec::new();
    let mut pos = 0;

    while volumes.len() < limit {
        let Some(hit) = find_from(image, FV_SIGNATURE, pos) else {
            break;
        };

        if hit + FV_MIN_HEADER_LEN < image.len() {
            let end = (hit + window).min(image.len());
            volumes.push(VolumeRecord {
                offset: hit as u64,
                header_hash: sha256_hex(&image[hit..end])?,
            });
        } else {
            debug!("Ignoring truncated firmware volume header at {hit:#x}");
        }

        pos = hit + 1;
    }

    Ok(volumes)
}
