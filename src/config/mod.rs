//! Run configuration for bundle-slim
//!
//! This module provides:
//! - The `.bundle-slim.toml` file structure and its defaults
//! - Loading and saving through the [`FileSystem`](crate::infra::FileSystem) abstraction

pub mod file;
pub mod loader;

pub use file::{BuildSettings, ConfigFile, ServeSettings, CONFIG_FILE_NAME, DEFAULT_ENTRY_STEMS};
pub use loader::ConfigLoader;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_name_constant_is_correct() {
        assert_eq!(CONFIG_FILE_NAME, ".bundle-slim.toml");
    }
}
