use firmguard::config::{
    FileConfigBuilder, FirmguardConfigError, GLOBAL_CONFIG_OVERRIDE_ENV_VAR,
};

use std::{
    env,
    fs::File,
    io::Write,
    sync::{Arc, Mutex, OnceLock},
};
use tempfile::tempdir;

// Tests in this file set and unset process-wide environment variables
static TEST_MUTEX: OnceLock<Arc<Mutex<()>>> = OnceLock::new();

#[test]
fn test_env_var_override() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    let dir = tempdir().unwrap(); //#[allow_ci]
    let override_file_path = dir.path().join("override.toml");
    let mut override_file = File::create(&override_file_path).unwrap(); //#[allow_ci]
    writeln!(override_file, "[flash]\nprogrammer = \"ch341a_spi\"").unwrap(); //#[allow_ci]

    env::set_var(
        GLOBAL_CONFIG_OVERRIDE_ENV_VAR,
        override_file_path.to_str().unwrap(), //#[allow_ci]
    );

    let config = FileConfigBuilder::new()
        .file(dir.path().join("ignored.toml"))
        .build()
        .unwrap(); //#[allow_ci]

    assert_eq!(config.flash.programmer, "ch341a_spi");

    env::remove_var(GLOBAL_CONFIG_OVERRIDE_ENV_VAR);
}

#[test]
fn test_env_var_override_file_not_found() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    env::set_var(GLOBAL_CONFIG_OVERRIDE_ENV_VAR, "non_existent_file.toml");

    let result = FileConfigBuilder::new().build();

    assert!(matches!(
        result,
        Err(FirmguardConfigError::MissingEnvConfigFile { .. })
    ));

    env::remove_var(GLOBAL_CONFIG_OVERRIDE_ENV_VAR);
}

#[test]
fn test_prefixed_env_vars_override_files() {
    let _mutex = TEST_MUTEX.get_or_init(|| Arc::new(Mutex::new(()))).lock();
    let dir = tempdir().unwrap(); //#[allow_ci]
    let config_path = dir.path().join("firmguard.toml");
    let mut config_file = File::create(&config_path).unwrap(); //#[allow_ci]
    writeln!(
        config_file,
        "[scan]\nefi_variable_timeout_ms = 900\ntool_timeout_secs = 7"
    )
    .unwrap(); //#[allow_ci]

    env::set_var("FIRMGUARD_SCAN__EFI_VARIABLE_TIMEOUT_MS", "500");
    env::set_var("FIRMGUARD_BASELINE__CHUNK_SIZE", "8192");

    let config = FileConfigBuilder::new().file(&config_path).build();

    env::remove_var("FIRMGUARD_SCAN__EFI_VARIABLE_TIMEOUT_MS");
    env::remove_var("FIRMGUARD_BASELINE__CHUNK_SIZE");

    let config = config.unwrap(); //#[allow_ci]
    assert_eq!(config.scan.efi_variable_timeout_ms, 500);
    assert_eq!(config.scan.tool_timeout_secs, 7);
    assert_eq!(config.baseline.chunk_size, 8192);
}
