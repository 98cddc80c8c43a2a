// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors
use super::{FirmguardConfig, FirmguardConfigError};
use config::{Config, Environment, File, FileFormat};
use glob::glob;
use log::*;
use std::{
    env,
    path::{Path, PathBuf},
};

pub static GLOBAL_CONFIG_OVERRIDE_ENV_VAR: &str = "FIRMGUARD_CONFIG";
pub static DEFAULT_CONFIG: &str = "firmguard.toml";
pub static DEFAULT_SYS_CONFIG: &str = "/etc/firmguard/firmguard.toml";
pub static DEFAULT_SYS_CONFIG_SNIPPETS_DIR: &str =
    "/etc/firmguard/firmguard.conf.d";

static ENV_PREFIX: &str = "FIRMGUARD";

// A single file may be required or optional; snippet directories are
// always optional and their files are applied in name order.
#[derive(Debug)]
enum ConfigSource {
    File { path: PathBuf, required: bool },
    Directory(PathBuf),
}

#[derive(Debug, Default)]
pub struct FileConfigBuilder {
    sources: Vec<ConfigSource>,
}

impl FileConfigBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a configuration file that is silently ignored when missing.
    pub fn file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(ConfigSource::File {
            path: path.into(),
            required: false,
        });
        self
    }

    /// Adds a configuration file that must exist.
    pub fn required_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(ConfigSource::File {
            path: path.into(),
            required: true,
        });
        self
    }

    /// Adds every file in a directory as a configuration source.
    pub fn directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(ConfigSource::Directory(path.into()));
        self
    }

    /// Load the configuration files from the default locations.
    ///
    /// A `firmguard.toml` in the working directory takes precedence over the
    /// system-wide files.
    pub fn load_default_locations(&mut self) -> &mut Self {
        self.file(DEFAULT_SYS_CONFIG)
            .directory(DEFAULT_SYS_CONFIG_SNIPPETS_DIR)
            .file(DEFAULT_CONFIG)
    }

    /// Consumes the builder and attempts to load the configuration.
    ///
    /// When `FIRMGUARD_CONFIG` is set, the file it names replaces every
    /// file source added to the builder.
    pub fn build(&mut self) -> Result<FirmguardConfig, FirmguardConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&FirmguardConfig::default())?);

        let sources = match env::var(GLOBAL_CONFIG_OVERRIDE_ENV_VAR) {
            Ok(env_cfg) if !env_cfg.is_empty() => {
                let path = Path::new(&env_cfg);
                if !path.exists() {
                    warn!("Configuration set in {GLOBAL_CONFIG_OVERRIDE_ENV_VAR} environment variable not found");
                    return Err(FirmguardConfigError::MissingEnvConfigFile {
                        file: path.display().to_string(),
                    });
                }
                warn!(
                    "Configuration replaced by {}: {}",
                    GLOBAL_CONFIG_OVERRIDE_ENV_VAR,
                    path.display()
                );
                vec![ConfigSource::File {
                    path: path.to_path_buf(),
                    required: true,
                }]
            }
            _ => std::mem::take(&mut self.sources),
        };

        let mut loaded = 0;
        for (index, source) in sources.iter().enumerate() {
            match source {
                ConfigSource::File { path, required } => {
                    if !path.exists() {
                        if *required {
                            return Err(
                                FirmguardConfigError::MissingConfigFile {
                                    file: path.display().to_string(),
                                },
                            );
                        }
                        continue;
                    }

                    debug!(
                        "Loading configuration from FILE (#{}): {}",
                        index,
                        path.display()
                    );
                    builder = builder.add_source(
                        File::from(path.as_path())
                            .format(FileFormat::Toml)
                            .required(*required),
                    );
                    loaded += 1;
                }
                ConfigSource::Directory(path) => {
                    debug!(
                        "Loading configuration from DIRECTORY (#{}): {}",
                        index,
                        path.display()
                    );

                    let mut snippets = glob(
                        &path.join("*.toml").display().to_string(),
                    )?
                    .filter_map(|entry| entry.ok())
                    .collect::<Vec<_>>();
                    snippets.sort();
                    loaded += snippets.len();

                    builder = builder.add_source(
                        snippets
                            .into_iter()
                            .map(|path| {
                                File::from(path)
                                    .format(FileFormat::Toml)
                                    .required(false)
                            })
                            .collect::<Vec<_>>(),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: FirmguardConfig = builder.build()?.try_deserialize()?;

        if loaded == 0 {
            info!("No configuration files found, using defaults and environment variables");
        } else {
            debug!("File configuration build process finished.");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::RegionSpec;
    use std::io::Write;

    #[test]
    fn test_load_from_single_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let file_path = dir.path().join("firmguard.toml");
        let mut file = std::fs::File::create(&file_path)
            .expect("failed to create config file");
        writeln!(
            file,
            "[baseline]\nchunk_size = 8192\n\n[baseline.regions.me_region]\nstart = 0x1000\nend = 0x2000\n\n[flash]\nprogrammer = \"ch341a_spi\""
        )
        .expect("failed to write on config file");

        let config = FileConfigBuilder::new()
            .required_file(&file_path)
            .build()
            .expect("failed to build configuration");

        assert_eq!(config.baseline.chunk_size, 8192);
        assert_eq!(config.flash.programmer, "ch341a_spi");
        assert_eq!(
            config.baseline.regions["me_region"],
            RegionSpec {
                start: 0x1000,
                end: 0x2000
            }
        );
        // defaults are kept for everything else
        assert!(config.baseline.regions.contains_key("boot_block"));
        assert_eq!(config.baseline.certificate_limit, 50);
        assert_eq!(config.scan.tool_timeout_secs, 10);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(
            dir.path().join("10-scan.toml"),
            "[scan]\nefi_variable_timeout_ms = 500\n",
        )
        .expect("failed to write on config file");
        std::fs::write(
            dir.path().join("20-scan.toml"),
            "[scan]\nefi_variable_timeout_ms = 750\ntool_timeout_secs = 3\n",
        )
        .expect("failed to write on config file");
        // not a TOML snippet
        std::fs::write(dir.path().join("notes.txt"), "ignored")
            .expect("failed to write on notes file");

        let config = FileConfigBuilder::new()
            .directory(dir.path())
            .build()
            .expect("failed to build configuration");

        assert_eq!(config.scan.efi_variable_timeout_ms, 750);
        assert_eq!(config.scan.tool_timeout_secs, 3);
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let config = FileConfigBuilder::new()
            .file(dir.path().join("absent.toml"))
            .build()
            .expect("failed to build configuration");
        assert_eq!(config.baseline, FirmguardConfig::default().baseline);
    }

    #[test]
    fn test_missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let result = FileConfigBuilder::new()
            .required_file(dir.path().join("absent.toml"))
            .build();
        assert!(matches!(
            result,
            Err(FirmguardConfigError::MissingConfigFile { .. })
        ));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let file_path = dir.path().join("firmguard.toml");
        std::fs::write(&file_path, "[baseline\nchunk_size = ")
            .expect("failed to write on config file");
        let result = FileConfigBuilder::new().required_file(&file_path).build();
        assert!(matches!(result, Err(FirmguardConfigError::Config(_))));
    }
}
