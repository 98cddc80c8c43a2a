// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! `scan`: compare the running system against a baseline
//!
//! The exit status only reflects whether the scan could be carried out. The
//! risk found is part of the report.

use crate::error::FirmguardctlError;
use crate::output::OutputHandler;
use firmguard::baseline::FirmwareBaseline;
use firmguard::cmd_exec;
use firmguard::config::{FirmguardConfig, RecoveryConfig};
use firmguard::detection::{compare, DetectionReport, RiskLevel};
use firmguard::file_ops;
use firmguard::snapshot::{SnapshotProvider, SysfsSnapshotProvider};
use log::{error, warn};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub async fn execute(
    baseline_path: &Path,
    report_path: &Path,
    auto_recovery: bool,
    config: &FirmguardConfig,
    output: &OutputHandler,
) -> Result<Value, FirmguardctlError> {
    let baseline = FirmwareBaseline::load(baseline_path)?;
    output.info(format!(
        "Loaded baseline of {} ({} bytes)",
        baseline.metadata.source_file, baseline.metadata.firmware_size
    ));

    if !running_as_root() {
        warn!("Not running as root: EFI variables and DMI fields may be incomplete");
    }

    output.progress("Reading live system firmware state");
    let provider = SysfsSnapshotProvider::new(config.scan.clone());
    let report = run_scan(&baseline, &provider).await?;

    file_ops::write_json_atomic(report_path, &report)?;
    output.progress(format!("Report saved to {}", report_path.display()));

    if auto_recovery {
        if report.risk_level == RiskLevel::Critical {
            run_recovery(&config.recovery, output).await;
        } else {
            output.info(format!(
                "Risk level {} does not require automatic recovery",
                report.risk_level
            ));
        }
    }

    Ok(serde_json::to_value(&report)?)
}

pub async fn run_scan(
    baseline: &FirmwareBaseline,
    provider: &dyn SnapshotProvider,
) -> Result<DetectionReport, FirmguardctlError> {
    let capture = provider.capture().await;
    let report = compare(baseline, &capture.snapshot)?;
    Ok(report.with_warnings(capture.warnings))
}

// A failed recovery is logged; the scan itself still completed.
async fn run_recovery(recovery: &RecoveryConfig, output: &OutputHandler) {
    let Some(command) = recovery.command.as_deref() else {
        warn!("Automatic recovery requested but no [recovery] command is configured");
        return;
    };

    output.progress(format!("CRITICAL risk: running recovery command '{command}'"));
    match cmd_exec::run_command_line(
        command,
        Duration::from_secs(recovery.timeout_secs),
    )
    .await
    {
        Ok(_) => output.progress("Recovery command finished"),
        Err(e) => error!("Recovery command failed: {e}"),
    }
}

fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmguard::baseline::BaselineBuilder;
    use firmguard::config::BaselineProfile;
    use firmguard::detection::RecommendedAction;
    use firmguard::error::PartialDataWarning;
    use firmguard::snapshot::{EfiVariable, LiveSystemSnapshot, SnapshotCapture};
    use std::collections::BTreeMap;

    struct FixedSnapshot(SnapshotCapture);

    #[async_trait::async_trait]
    impl SnapshotProvider for FixedSnapshot {
        async fn capture(&self) -> SnapshotCapture {
            self.0.clone()
        }
    }

    fn baseline() -> FirmwareBaseline {
        BaselineBuilder::new(&BaselineProfile::default())
            .bios_version("G615LP.303")
            .build(&[0u8; 8192], "G615LP.bin")
            .unwrap() //#[allow_ci]
    }

    #[tokio::test]
    async fn test_scan_carries_warnings() {
        let provider = FixedSnapshot(SnapshotCapture {
            snapshot: LiveSystemSnapshot {
                dmi_fields: BTreeMap::from([(
                    "bios_version".to_string(),
                    "G615LP.303".to_string(),
                )]),
                efi_variables: BTreeMap::new(),
                auxiliary_tool_output: None,
            },
            warnings: vec![PartialDataWarning::new("efivars", "permission denied")],
        });

        let report = run_scan(&baseline(), &provider).await.unwrap(); //#[allow_ci]
        assert_eq!(report.risk_level, RiskLevel::Clean);
        assert_eq!(report.recommended_action, RecommendedAction::Continue);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_flags_injected_variable() {
        let provider = FixedSnapshot(SnapshotCapture {
            snapshot: LiveSystemSnapshot {
                dmi_fields: BTreeMap::from([(
                    "bios_version".to_string(),
                    "G615LP.303".to_string(),
                )]),
                efi_variables: BTreeMap::from([(
                    "BootkitMarker".to_string(),
                    EfiVariable {
                        size: 10,
                        sha256: "00".repeat(32),
                    },
                )]),
                auxiliary_tool_output: Some("Malware loader staged".to_string()),
            },
            warnings: Vec::new(),
        });

        let report = run_scan(&baseline(), &provider).await.unwrap(); //#[allow_ci]
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(report.threats_detected.len(), 1);
        assert_eq!(report.modifications_found.len(), 1);
    }
}
