//! Import/export options and their RON configuration file

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeshIoError, MeshIoResult};

/// Default binary STL header signature
pub const DEFAULT_STL_HEADER: &str = "Binary STL file generated by marimocad";

/// Options applied while importing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Minimum percentage increase between two progress reports
    pub progress_step: u8,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { progress_step: 10 }
    }
}

/// Options applied while exporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// ASCII signature written into the 80-byte binary STL header
    /// (truncated to 80 bytes, zero padded)
    pub stl_header: String,
    /// Whether OBJ output starts with a comment block naming the generator and counts
    pub obj_header: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            stl_header: DEFAULT_STL_HEADER.to_string(),
            obj_header: true,
        }
    }
}

/// Complete configuration of a [`crate::MeshIo`] facade
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshIoConfig {
    pub import: ImportOptions,
    pub export: ExportOptions,
}

impl MeshIoConfig {
    /// Load a configuration from a RON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> MeshIoResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MeshIoError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ron_str(&content).map_err(|reason| MeshIoError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, String> {
        ron::from_str(content).map_err(|e| e.to_string())
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).map_err(|e| e.to_string())
    }
}
