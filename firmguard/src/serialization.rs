// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Serde helpers for byte offsets.
//!
//! Baselines store offsets as `0x`-prefixed lowercase hex strings so that
//! they can be compared by eye against hex dumps of the image. Plain JSON
//! integers are accepted on input as well.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOffset {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct WrappedOffset(#[serde(deserialize_with = "deserialize_offset")] u64);

pub fn format_offset(offset: u64) -> String {
    format!("{offset:#x}")
}

pub fn parse_offset(value: &str) -> Result<u64, std::num::ParseIntError> {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    }
}

pub fn serialize_offset<S>(offset: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_offset(*offset))
}

pub fn deserialize_offset<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawOffset::deserialize(deserializer)? {
        RawOffset::Number(n) => Ok(n),
        RawOffset::Text(s) => parse_offset(&s).map_err(|e| {
            serde::de::Error::custom(format!("invalid offset '{s}': {e}"))
        }),
    }
}

pub fn serialize_offsets<S>(
    offsets: &[u64],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    offsets
        .iter()
        .map(|o| format_offset(*o))
        .collect::<Vec<_>>()
        .serialize(serializer)
}

pub fn deserialize_offsets<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<WrappedOffset>::deserialize(deserializer)
        .map(|wrapped| wrapped.into_iter().map(|w| w.0).collect())
}

pub fn serialize_offset_map<S>(
    map: &BTreeMap<String, Vec<u64>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    map.iter()
        .map(|(name, offsets)| {
            (
                name.clone(),
                offsets.iter().map(|o| format_offset(*o)).collect::<Vec<_>>(),
            )
        })
        .collect::<BTreeMap<_, _>>()
        .serialize(serializer)
}

pub fn deserialize_offset_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Vec<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    BTreeMap::<String, Vec<WrappedOffset>>::deserialize(deserializer).map(
        |map| {
            map.into_iter()
                .map(|(name, offsets)| {
                    (name, offsets.into_iter().map(|w| w.0).collect())
                })
                .collect()
        },
    )
}
