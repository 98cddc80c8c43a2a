// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Error types for firmguardctl

use firmguard::config::FirmguardConfigError;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirmguardctlError {
    #[error("{0}")]
    Firmguard(#[from] firmguard::error::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] FirmguardConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirmguardctlError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    pub fn error_code(&self) -> &'static str {
        use firmguard::error::Error;

        match self {
            Self::Firmguard(Error::Io { .. }) => "IO_ERROR",
            Self::Firmguard(Error::Validation(_)) | Self::Validation(_) => {
                "VALIDATION_ERROR"
            }
            Self::Firmguard(Error::FlashVerification { .. }) => {
                "FLASH_VERIFICATION_ERROR"
            }
            Self::Firmguard(Error::Timeout { .. }) => "TIMEOUT_ERROR",
            Self::Firmguard(Error::Execution(..)) => "EXECUTION_ERROR",
            Self::Firmguard(_) => "FIRMGUARD_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "details": self.error_details()
            }
        })
    }

    fn error_details(&self) -> Value {
        use firmguard::error::Error;

        match self {
            Self::Firmguard(Error::Io { path, .. }) => serde_json::json!({
                "path": path.display().to_string()
            }),
            Self::Firmguard(Error::FlashVerification { expected, actual }) => {
                serde_json::json!({
                    "expected_sha256": expected,
                    "actual_sha256": actual
                })
            }
            _ => Value::Null,
        }
    }
}
