//! Run settings.
//!
//! Settings are passed explicitly to every entry point that needs them; there
//! is no process-wide state. They can be loaded from a TOML file, every
//! field is optional:
//!
//! ```toml
//! checksum = "sha256"
//! verbose = true
//! shell = "/bin/bash"
//! ```

use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sidecar algorithm for new backups and for catalogs that record none
    pub checksum: ChecksumAlgorithm,

    /// Show job script output and per-job decisions
    pub verbose: bool,

    /// Interpreter used to run job scripts locally
    pub shell: String,
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            checksum: ChecksumAlgorithm::default(),
            verbose: false,
            shell: default_shell(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::InvalidSettings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| EngineError::InvalidSettings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
