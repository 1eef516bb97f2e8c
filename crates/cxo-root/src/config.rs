use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RootError, RootResult};

/// Container configuration.
///
/// With no `data_dir` the container keeps everything in memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Directory holding `objects/` and `roots/`.
    pub data_dir: Option<PathBuf>,
    /// Re-hash blobs read from disk.
    pub verify_reads: bool,
    /// `fsync` every blob and root pack write.
    pub sync_writes: bool,
    /// Largest object or root body accepted, in bytes.
    pub max_object_size: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            verify_reads: true,
            sync_writes: false,
            max_object_size: 16 * 1024 * 1024,
        }
    }
}

impl ContainerConfig {
    /// In-memory configuration with defaults.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persistent configuration rooted at `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> RootResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RootError::Config(e.to_string()))?;
        if config.max_object_size == 0 {
            return Err(RootError::Config("max_object_size must be positive".into()));
        }
        Ok(config)
    }
}
