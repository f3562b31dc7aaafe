//! Configuration types for mdstamp
//!
//! ```toml
//! [mdata]
//! xattr_key = "trusted.glusterfs.mdata"
//! brick_path = "/bricks/b1"
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{MdataError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default xattr key holding the persisted record
pub const DEFAULT_MDATA_KEY: &str = "trusted.glusterfs.mdata";

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MdataConfig {
    #[serde(default)]
    pub mdata: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Attribute store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Extended attribute key the record is stored under
    #[serde(default = "default_xattr_key")]
    pub xattr_key: String,
    /// Brick root used to resolve GFID handle paths
    #[serde(default)]
    pub brick_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            xattr_key: default_xattr_key(),
            brick_path: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_xattr_key() -> String {
    DEFAULT_MDATA_KEY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MdataConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| MdataError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| MdataError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let key = &self.mdata.xattr_key;
        if key.is_empty() || key.contains('\0') {
            return Err(MdataError::Config(format!("invalid xattr key {key:?}")));
        }
        if !key.contains('.') {
            return Err(MdataError::Config(format!(
                "xattr key {key:?} has no namespace prefix"
            )));
        }
        Ok(())
    }
}
