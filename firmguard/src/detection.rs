// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Comparison of a live system against a trusted baseline.
//!
//! [`compare`] is stateless: every call derives a fresh [`DetectionReport`]
//! from its two inputs. Missing snapshot data is never an error, it simply
//! yields no finding.

use crate::baseline::{FirmwareBaseline, UNKNOWN_BIOS_VERSION};
use crate::error::{PartialDataWarning, Result};
use crate::snapshot::LiveSystemSnapshot;
use chrono::{SecondsFormat, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EFI variable names containing one of these are suspicious
pub const SUSPICIOUS_VARIABLE_KEYWORDS: [&str; 5] =
    ["bootkit", "malware", "rootkit", "backdoor", "keylog"];

/// EFI variables larger than this may carry an injected payload
pub const LARGE_VARIABLE_THRESHOLD: u64 = 32768;

/// Tool output containing one of these reports a staged firmware update
pub const PENDING_UPDATE_MARKERS: [&str; 2] = ["pending", "needs reboot"];

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall assessment, ordered from `Clean` to `Critical`
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Clean,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Clean => "CLEAN",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    /// Derive the risk from the severities of all findings.
    ///
    /// A single CRITICAL finding decides on its own. Two or more HIGH
    /// findings give HIGH, a single one MEDIUM, and MEDIUM findings alone
    /// give LOW.
    pub fn from_severities<I>(severities: I) -> Self
    where
        I: IntoIterator<Item = Severity>,
    {
        let mut high = 0usize;
        let mut medium = false;
        for severity in severities {
            match severity {
                Severity::Critical => return RiskLevel::Critical,
                Severity::High => high += 1,
                Severity::Medium => medium = true,
                Severity::Low => {}
            }
        }

        match high {
            0 if medium => RiskLevel::Low,
            0 => RiskLevel::Clean,
            1 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Continue,
    Monitor,
    Investigate,
    RecoveryRecommended,
    ImmediateRecovery,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Continue => "CONTINUE",
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::Investigate => "INVESTIGATE",
            RecommendedAction::RecoveryRecommended => "RECOVERY_RECOMMENDED",
            RecommendedAction::ImmediateRecovery => "IMMEDIATE_RECOVERY",
        }
    }
}

impl From<RiskLevel> for RecommendedAction {
    fn from(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Critical => RecommendedAction::ImmediateRecovery,
            RiskLevel::High => RecommendedAction::RecoveryRecommended,
            RiskLevel::Medium => RecommendedAction::Investigate,
            RiskLevel::Low => RecommendedAction::Monitor,
            RiskLevel::Clean => RecommendedAction::Continue,
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    VersionMismatch,
    SuspiciousEfiVariables,
    PatternMatch,
    PendingFirmwareUpdate,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::VersionMismatch => "VERSION_MISMATCH",
            FindingKind::SuspiciousEfiVariables => "SUSPICIOUS_EFI_VARIABLES",
            FindingKind::PatternMatch => "PATTERN_MATCH",
            FindingKind::PendingFirmwareUpdate => "PENDING_FIRMWARE_UPDATE",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskIndicator {
    VersionRollback,
    UnauthorizedUpdate,
    EfiVariableInjection,
    PersistentMalware,
    KnownBootkitSignature,
}

impl RiskIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskIndicator::VersionRollback => "version_rollback",
            RiskIndicator::UnauthorizedUpdate => "unauthorized_update",
            RiskIndicator::EfiVariableInjection => "efi_variable_injection",
            RiskIndicator::PersistentMalware => "persistent_malware",
            RiskIndicator::KnownBootkitSignature => "known_bootkit_signature",
        }
    }
}

impl fmt::Display for RiskIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    pub risk_indicators: Vec<RiskIndicator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub scan_timestamp: String,
    pub baseline_source: String,
    pub threats_detected: Vec<Finding>,
    pub modifications_found: Vec<Finding>,
    pub risk_level: RiskLevel,
    pub recommended_action: RecommendedAction,
    #[serde(default)]
    pub warnings: Vec<PartialDataWarning>,
}

impl DetectionReport {
    /// Attach the data that could not be collected during the scan
    pub fn with_warnings(mut self, warnings: Vec<PartialDataWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// Compare a live-system snapshot against a baseline.
///
/// Fails only when the baseline itself is structurally invalid.
pub fn compare(
    baseline: &FirmwareBaseline,
    snapshot: &LiveSystemSnapshot,
) -> Result<DetectionReport> {
    baseline.validate()?;

    let mut modifications = Vec::new();
    let mut threats = Vec::new();
    let mut warnings = Vec::new();

    modifications.extend(check_version(baseline, snapshot, &mut warnings));
    modifications.extend(check_efi_variables(snapshot));
    threats.extend(check_patterns(baseline, snapshot));
    modifications.extend(check_pending_update(snapshot));

    for finding in threats.iter().chain(modifications.iter()) {
        info!("{} ({}): {}", finding.kind, finding.severity, finding.details);
    }

    let risk_level = RiskLevel::from_severities(
        threats.iter().chain(modifications.iter()).map(|f| f.severity),
    );
    let recommended_action = RecommendedAction::from(risk_level);
    info!("Risk level {risk_level}, recommended action {recommended_action}");

    Ok(DetectionReport {
        scan_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        baseline_source: baseline.metadata.source_file.clone(),
        threats_detected: threats,
        modifications_found: modifications,
        risk_level,
        recommended_action,
        warnings,
    })
}

// Containment rather than equality: vendors append suffixes to the version.
fn check_version(
    baseline: &FirmwareBaseline,
    snapshot: &LiveSystemSnapshot,
    warnings: &mut Vec<PartialDataWarning>,
) -> Option<Finding> {
    let expected = baseline.metadata.bios_version.as_str();
    if expected.is_empty() || expected == UNKNOWN_BIOS_VERSION {
        warn!(
            "Baseline of {} records no BIOS version, version rollback check skipped",
            baseline.metadata.source_file
        );
        warnings.push(PartialDataWarning::new(
            "baseline:bios_version",
            "baseline records no BIOS version; rebuild it with --bios-version to enable the rollback check",
        ));
        return None;
    }

    let Some(current) = snapshot.bios_version() else {
        debug!("Live system reports no BIOS version, skipping version check");
        return None;
    };

    if current.contains(expected) {
        return None;
    }

    Some(Finding {
        kind: FindingKind::VersionMismatch,
        severity: Severity::High,
        details: format!(
            "BIOS version changed: expected {expected}, got {current}"
        ),
        pattern: None,
        variables: None,
        risk_indicators: vec![
            RiskIndicator::VersionRollback,
            RiskIndicator::UnauthorizedUpdate,
        ],
    })
}

fn check_efi_variables(snapshot: &LiveSystemSnapshot) -> Option<Finding> {
    let mut flagged = Vec::new();
    for (name, variable) in &snapshot.efi_variables {
        let lower = name.to_lowercase();
        if SUSPICIOUS_VARIABLE_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(keyword))
        {
            flagged.push(name.clone());
        }
        if variable.size > LARGE_VARIABLE_THRESHOLD {
            flagged.push(format!("{name} (large_size: {})", variable.size));
        }
    }

    if flagged.is_empty() {
        return None;
    }

    Some(Finding {
        kind: FindingKind::SuspiciousEfiVariables,
        severity: Severity::High,
        details: format!("Found {} suspicious EFI variables", flagged.len()),
        pattern: None,
        variables: Some(flagged),
        risk_indicators: vec![
            RiskIndicator::EfiVariableInjection,
            RiskIndicator::PersistentMalware,
        ],
    })
}

fn check_patterns(
    baseline: &FirmwareBaseline,
    snapshot: &LiveSystemSnapshot,
) -> Vec<Finding> {
    let text = snapshot.searchable_text();
    baseline
        .bootkit_indicators
        .suspicious_patterns
        .iter()
        .filter(|pattern| !pattern.is_empty())
        .filter(|pattern| text.contains(pattern.to_lowercase().as_str()))
        .map(|pattern| Finding {
            kind: FindingKind::PatternMatch,
            severity: Severity::Critical,
            details: format!("Bootkit pattern '{pattern}' detected in firmware"),
            pattern: Some(pattern.clone()),
            variables: None,
            risk_indicators: vec![RiskIndicator::KnownBootkitSignature],
        })
        .collect()
}

fn check_pending_update(snapshot: &LiveSystemSnapshot) -> Option<Finding> {
    let output = snapshot.auxiliary_tool_output.as_ref()?.to_lowercase();
    if !PENDING_UPDATE_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
    {
        return None;
    }

    Some(Finding {
        kind: FindingKind::PendingFirmwareUpdate,
        severity: Severity::Medium,
        details: "Pending firmware update detected - verify legitimacy"
            .to_string(),
        pattern: None,
        variables: None,
        risk_indicators: vec![RiskIndicator::UnauthorizedUpdate],
    })
}
