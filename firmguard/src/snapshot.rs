// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Live-system readout.
//!
//! A [`LiveSystemSnapshot`] holds what the running platform reports about its
//! firmware: DMI/SMBIOS BIOS fields, the EFI variables exposed by the kernel
//! and the text printed by firmware-update tooling. Anything that cannot be
//! read is left out and reported as a [`PartialDataWarning`]; capturing a
//! snapshot never fails as a whole.

use crate::algorithms::sha256_hex;
use crate::cmd_exec;
use crate::config::ScanConfig;
use crate::error::PartialDataWarning;
use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// DMI fields read from the platform, in this order
pub const DMI_FIELDS: [&str; 3] = ["bios_vendor", "bios_version", "bios_date"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EfiVariable {
    /// Full size of the variable file in bytes
    pub size: u64,
    /// SHA-256 of the bounded prefix that was read
    pub sha256: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSystemSnapshot {
    pub dmi_fields: BTreeMap<String, String>,
    pub efi_variables: BTreeMap<String, EfiVariable>,
    pub auxiliary_tool_output: Option<String>,
}

impl LiveSystemSnapshot {
    pub fn bios_version(&self) -> Option<&str> {
        self.dmi_fields.get("bios_version").map(String::as_str)
    }

    /// DMI values and tool output joined into one lowercase string
    pub fn searchable_text(&self) -> String {
        let mut text = self
            .dmi_fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(output) = &self.auxiliary_tool_output {
            text.push('\n');
            text.push_str(output);
        }
        text.to_lowercase()
    }
}

/// A snapshot together with the data that could not be collected
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotCapture {
    pub snapshot: LiveSystemSnapshot,
    pub warnings: Vec<PartialDataWarning>,
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Read the live system
    async fn capture(&self) -> SnapshotCapture;
}

/// Reads the running system through sysfs and the configured tools
pub struct SysfsSnapshotProvider {
    config: ScanConfig,
}

impl SysfsSnapshotProvider {
    pub fn new(config: ScanConfig) -> Self {
        SysfsSnapshotProvider { config }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.efi_variable_timeout_ms)
    }

    async fn read_dmi_fields(
        &self,
        warnings: &mut Vec<PartialDataWarning>,
    ) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for field in DMI_FIELDS {
            let path = self.config.dmi_path.join(field);
            match tokio::time::timeout(
                self.read_timeout(),
                tokio::fs::read_to_string(&path),
            )
            .await
            {
                Ok(Ok(value)) => {
                    let _ = fields.insert(field.to_string(), value.trim().to_string());
                }
                Ok(Err(e)) => warnings.push(PartialDataWarning::new(
                    format!("dmi:{field}"),
                    format!("cannot read {}: {e}", path.display()),
                )),
                Err(_) => warnings.push(PartialDataWarning::new(
                    format!("dmi:{field}"),
                    format!("reading {} timed out", path.display()),
                )),
            }
        }
        fields
    }

    async fn read_efi_variables(
        &self,
        warnings: &mut Vec<PartialDataWarning>,
    ) -> BTreeMap<String, EfiVariable> {
        let mut variables = BTreeMap::new();
        let root = &self.config.efivars_path;

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                warnings.push(PartialDataWarning::new(
                    "efivars",
                    format!("cannot list {}: {e}", root.display()),
                ));
                return variables;
            }
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => paths.push(entry.path()),
                Ok(None) => break,
                Err(e) => {
                    warnings.push(PartialDataWarning::new(
                        "efivars",
                        format!("listing {} stopped early: {e}", root.display()),
                    ));
                    break;
                }
            }
        }
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };

            match tokio::time::timeout(
                self.read_timeout(),
                read_efi_variable(&path, self.config.efi_variable_prefix),
            )
            .await
            {
                Ok(Ok(Some(variable))) => {
                    let _ = variables.insert(name, variable);
                }
                Ok(Ok(None)) => {}
                Ok(Err(reason)) => warnings
                    .push(PartialDataWarning::new(format!("efivar:{name}"), reason)),
                Err(_) => warnings.push(PartialDataWarning::new(
                    format!("efivar:{name}"),
                    format!("read timed out after {:?}", self.read_timeout()),
                )),
            }
        }

        debug!(
            "Read {} EFI variable(s) from {}",
            variables.len(),
            root.display()
        );
        variables
    }

    async fn read_auxiliary_output(
        &self,
        warnings: &mut Vec<PartialDataWarning>,
    ) -> Option<String> {
        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        let mut collected: Vec<String> = Vec::new();

        for command in &self.config.auxiliary_commands {
            match cmd_exec::run_command_line(command, timeout).await {
                Ok(stdout) => collected.push(stdout),
                Err(e) => warnings.push(PartialDataWarning::new(
                    format!("tool:{command}"),
                    e.to_string(),
                )),
            }
        }

        if collected.is_empty() {
            None
        } else {
            Some(collected.join("\n"))
        }
    }
}

// Ok(None) for entries that are not regular files
async fn read_efi_variable(
    path: &Path,
    prefix_len: usize,
) -> Result<Option<EfiVariable>, String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("cannot stat {}: {e}", path.display()))?;
    if !metadata.is_file() {
        return Ok(None);
    }

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let mut prefix = Vec::with_capacity(prefix_len);
    let _ = file
        .take(prefix_len as u64)
        .read_to_end(&mut prefix)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;

    let sha256 = sha256_hex(&prefix)
        .map_err(|e| format!("cannot hash {}: {e}", path.display()))?;

    Ok(Some(EfiVariable {
        size: metadata.len(),
        sha256,
    }))
}

#[async_trait]
impl SnapshotProvider for SysfsSnapshotProvider {
    async fn capture(&self) -> SnapshotCapture {
        let mut warnings = Vec::new();

        let dmi_fields = self.read_dmi_fields(&mut warnings).await;
        let efi_variables = self.read_efi_variables(&mut warnings).await;
        let auxiliary_tool_output =
            self.read_auxiliary_output(&mut warnings).await;

        for warning in &warnings {
            warn!("Partial data: {warning}");
        }

        SnapshotCapture {
            snapshot: LiveSystemSnapshot {
                dmi_fields,
                efi_variables,
                auxiliary_tool_output,
            },
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_for(root: &Path, commands: Vec<String>) -> SysfsSnapshotProvider {
        SysfsSnapshotProvider::new(ScanConfig {
            dmi_path: root.join("dmi"),
            efivars_path: root.join("efivars"),
            efi_variable_prefix: 1024,
            efi_variable_timeout_ms: 2000,
            tool_timeout_secs: 5,
            auxiliary_commands: commands,
        })
    }

    #[tokio::test]
    async fn test_capture_reads_sysfs_layout() {
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let dmi = dir.path().join("dmi");
        let efivars = dir.path().join("efivars");
        std::fs::create_dir_all(&dmi).unwrap(); //#[allow_ci]
        std::fs::create_dir_all(&efivars).unwrap(); //#[allow_ci]
        std::fs::write(dmi.join("bios_vendor"), "American Megatrends Inc.\n")
            .unwrap(); //#[allow_ci]
        std::fs::write(dmi.join("bios_version"), "G615LP.303\n").unwrap(); //#[allow_ci]
        std::fs::write(dmi.join("bios_date"), "05/14/2025\n").unwrap(); //#[allow_ci]

        let large = vec![0x5Au8; 40000];
        std::fs::write(efivars.join("Payload-8be4df61"), &large).unwrap(); //#[allow_ci]
        std::fs::write(efivars.join("Boot0000-8be4df61"), b"\x07\x00\x00\x00boot")
            .unwrap(); //#[allow_ci]
        std::fs::create_dir(efivars.join("not-a-variable")).unwrap(); //#[allow_ci]

        let capture = provider_for(dir.path(), vec!["echo all devices idle".to_string()])
            .capture()
            .await;

        assert!(capture.warnings.is_empty(), "{:?}", capture.warnings);
        let snapshot = capture.snapshot;
        assert_eq!(snapshot.bios_version(), Some("G615LP.303"));
        assert_eq!(snapshot.dmi_fields["bios_vendor"], "American Megatrends Inc.");
        assert_eq!(snapshot.efi_variables.len(), 2);

        let payload = &snapshot.efi_variables["Payload-8be4df61"];
        assert_eq!(payload.size, 40000);
        assert_eq!(payload.sha256, sha256_hex(&large[..1024]).unwrap()); //#[allow_ci]
        assert_eq!(
            snapshot.auxiliary_tool_output.as_deref(),
            Some("all devices idle\n")
        );
    }

    #[tokio::test]
    async fn test_unreadable_variable_is_skipped() {
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let efivars = dir.path().join("efivars");
        std::fs::create_dir_all(&efivars).unwrap(); //#[allow_ci]
        std::fs::write(efivars.join("Boot0000-8be4df61"), b"\x07\x00\x00\x00boot")
            .unwrap(); //#[allow_ci]
        // the kernel can drop a variable between listing and reading it
        std::os::unix::fs::symlink(
            efivars.join("vanished"),
            efivars.join("Stale-8be4df61"),
        )
        .unwrap(); //#[allow_ci]

        let capture = provider_for(dir.path(), Vec::new()).capture().await;

        let variables = &capture.snapshot.efi_variables;
        assert_eq!(variables.len(), 1);
        assert_eq!(variables["Boot0000-8be4df61"].size, 8);

        let stale: Vec<&PartialDataWarning> = capture
            .warnings
            .iter()
            .filter(|w| w.source == "efivar:Stale-8be4df61")
            .collect();
        assert_eq!(stale.len(), 1);
        assert!(stale[0].reason.contains("cannot stat"));
        assert!(!capture.warnings.iter().any(|w| w.source == "efivars"));
    }

    #[tokio::test]
    async fn test_missing_sources_become_warnings() {
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let capture = provider_for(
            dir.path(),
            vec!["firmguard-no-such-tool get-devices".to_string()],
        )
        .capture()
        .await;

        let snapshot = &capture.snapshot;
        assert!(snapshot.dmi_fields.is_empty());
        assert!(snapshot.efi_variables.is_empty());
        assert!(snapshot.auxiliary_tool_output.is_none());
        assert!(snapshot.bios_version().is_none());

        let sources: Vec<&str> =
            capture.warnings.iter().map(|w| w.source.as_str()).collect();
        assert!(sources.contains(&"dmi:bios_version"));
        assert!(sources.contains(&"efivars"));
        assert!(sources.contains(&"tool:firmguard-no-such-tool get-devices"));
    }

    #[test]
    fn test_searchable_text_is_lowercase() {
        let snapshot = LiveSystemSnapshot {
            dmi_fields: BTreeMap::from([(
                "bios_vendor".to_string(),
                "RootKit Labs".to_string(),
            )]),
            efi_variables: BTreeMap::new(),
            auxiliary_tool_output: Some("Update PENDING".to_string()),
        };
        let text = snapshot.searchable_text();
        assert!(text.contains("rootkit labs"));
        assert!(text.contains("update pending"));
    }
}
