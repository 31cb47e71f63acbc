//! Configuration file loading and saving

use super::file::{ConfigFile, CONFIG_FILE_NAME};
use crate::error::BundleSlimError;
use crate::infra::{FileSystem, RealFileSystem};
use anyhow::{Context, Result};
use std::path::Path;

/// Handles loading and saving configuration files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from .bundle-slim.toml in the given directory
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read, parsed, or validated is a fatal configuration error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bundle_slim::config::ConfigLoader;
    /// use std::path::Path;
    ///
    /// let config = ConfigLoader::load(Path::new("."))?;
    /// println!("Loaded config with mode: {}", config.mode);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(project_root: &Path) -> Result<ConfigFile> {
        Self::load_with_fs(project_root, &RealFileSystem)
    }

    /// Load config with a custom filesystem implementation
    pub fn load_with_fs<FS: FileSystem>(project_root: &Path, fs: &FS) -> Result<ConfigFile> {
        let config_path = project_root.join(CONFIG_FILE_NAME);

        let contents = match fs.read_to_string(&config_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                return Ok(ConfigFile::default());
            }
            Err(e) => {
                return Err(BundleSlimError::ConfigInvalid {
                    path: config_path,
                    reason: e.to_string(),
                })
                .context("Failed to read .bundle-slim.toml");
            }
        };

        let config: ConfigFile = toml_edit::de::from_str(&contents)
            .map_err(|e| BundleSlimError::ConfigInvalid {
                path: config_path.clone(),
                reason: e.to_string(),
            })
            .context("Failed to parse .bundle-slim.toml")?;

        config
            .validate()
            .map_err(|e| BundleSlimError::ConfigInvalid {
                path: config_path,
                reason: e.to_string(),
            })
            .context("Invalid run configuration")?;

        Ok(config)
    }

    /// Save config to .bundle-slim.toml in the given directory
    pub fn save(config: &ConfigFile, project_root: &Path) -> Result<()> {
        Self::save_with_fs(config, project_root, &RealFileSystem)
    }

    /// Save config with a custom filesystem implementation
    pub fn save_with_fs<FS: FileSystem>(
        config: &ConfigFile,
        project_root: &Path,
        fs: &FS,
    ) -> Result<()> {
        let config_path = project_root.join(CONFIG_FILE_NAME);

        let contents =
            toml_edit::ser::to_string_pretty(config).context("Failed to serialize config")?;

        fs.write(&config_path, contents)
            .context("Failed to write .bundle-slim.toml")?;

        Ok(())
    }

    /// Check if config file exists in project
    pub fn exists(project_root: &Path) -> bool {
        Self::exists_with_fs(project_root, &RealFileSystem)
    }

    /// Check for the config file with a custom filesystem implementation
    pub fn exists_with_fs<FS: FileSystem>(project_root: &Path, fs: &FS) -> bool {
        fs.exists(&project_root.join(CONFIG_FILE_NAME))
    }
}
