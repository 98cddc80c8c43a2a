// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Whole-file reads and atomic writes.
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the target, so a reader never observes a half written
//! baseline, report or firmware image.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))
}

/// Atomically replace `path` with `data`
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = temp_file_beside(path)?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io(tmp.path(), e))?;
    let _ = tmp.persist(path)?;
    Ok(())
}

/// Atomically replace `path` with the pretty-printed JSON form of `value`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    write_bytes_atomic(path, &data)
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}
