// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! `flash`: read, back up and restore the firmware flash chip

use crate::error::FirmguardctlError;
use crate::output::OutputHandler;
use crate::FlashAction;
use firmguard::config::FlashConfig;
use firmguard::flasher::{
    backup_firmware, restore_firmware, FirmwareFlasher, FlashromFlasher,
};
use serde_json::Value;

pub async fn execute(
    action: &FlashAction,
    config: &FlashConfig,
    output: &OutputHandler,
) -> Result<Value, FirmguardctlError> {
    let flasher = FlashromFlasher::new(config.clone());
    run(action, &flasher, output).await
}

async fn run(
    action: &FlashAction,
    flasher: &dyn FirmwareFlasher,
    output: &OutputHandler,
) -> Result<Value, FirmguardctlError> {
    match action {
        FlashAction::Probe => {
            let chip = flasher.probe().await?;
            Ok(serde_json::to_value(chip)?)
        }
        FlashAction::Backup { output: path } => {
            output.progress("Reading the flash chip, this can take several minutes");
            let outcome = backup_firmware(flasher, path).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        FlashAction::Restore { image, yes, backup } => {
            if !yes {
                return Err(FirmguardctlError::validation(
                    "restoring overwrites the flash chip; pass --yes to confirm",
                ));
            }
            output.progress(format!(
                "Writing {} to the flash chip, do not power off",
                image.display()
            ));
            let outcome =
                restore_firmware(flasher, image, backup.as_deref()).await?;
            Ok(serde_json::to_value(outcome)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmguard::error::Result;
    use firmguard::flasher::ChipInfo;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct MemoryFlasher(Mutex<Vec<u8>>);

    #[async_trait::async_trait]
    impl FirmwareFlasher for MemoryFlasher {
        async fn probe(&self) -> Result<ChipInfo> {
            Ok(ChipInfo {
                name: Some("MX25L25645G".to_string()),
                size: Some(self.0.lock().unwrap().len() as u64), //#[allow_ci]
            })
        }

        async fn read(&self) -> Result<Vec<u8>> {
            Ok(self.0.lock().unwrap().clone()) //#[allow_ci]
        }

        async fn write(&self, image: &[u8]) -> Result<()> {
            *self.0.lock().unwrap() = image.to_vec(); //#[allow_ci]
            Ok(())
        }
    }

    fn handler() -> OutputHandler {
        OutputHandler::new(crate::OutputFormat::Json, true)
    }

    #[tokio::test]
    async fn test_probe_reports_chip() {
        let flasher = MemoryFlasher(Mutex::new(vec![0u8; 2048]));
        let value = run(&FlashAction::Probe, &flasher, &handler())
            .await
            .unwrap(); //#[allow_ci]
        assert_eq!(value["name"], "MX25L25645G");
        assert_eq!(value["size"], 2048);
    }

    #[tokio::test]
    async fn test_restore_requires_confirmation() {
        let flasher = MemoryFlasher(Mutex::new(vec![0u8; 2048]));
        let action = FlashAction::Restore {
            image: PathBuf::from("/nonexistent/golden.bin"),
            yes: false,
            backup: None,
        };
        let result = run(&action, &flasher, &handler()).await;
        assert!(matches!(result, Err(FirmguardctlError::Validation(_))));
        assert_eq!(flasher.read().await.unwrap(), vec![0u8; 2048]); //#[allow_ci]
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
        let saved = dir.path().join("chip.bin");
        let flasher = MemoryFlasher(Mutex::new(vec![0x5Au8; 2048]));

        let value = run(
            &FlashAction::Backup {
                output: saved.clone(),
            },
            &flasher,
            &handler(),
        )
        .await
        .unwrap(); //#[allow_ci]
        assert_eq!(value["operation"], "backup");
        assert_eq!(value["verified"], true);

        flasher.write(&[0u8; 2048]).await.unwrap(); //#[allow_ci]
        let value = run(
            &FlashAction::Restore {
                image: saved,
                yes: true,
                backup: None,
            },
            &flasher,
            &handler(),
        )
        .await
        .unwrap(); //#[allow_ci]
        assert_eq!(value["operation"], "restore");
        assert_eq!(flasher.read().await.unwrap(), vec![0x5Au8; 2048]); //#[allow_ci]
    }
}
