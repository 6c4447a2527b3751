//! Engine configuration

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::error::CcdError;

/// What to do with uncommitted edits when auto-commit hits a transform
/// without an inverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInversePolicy {
    /// Log a warning and drop the edits
    #[default]
    Discard,
    /// Return `NoInverseAvailable` and keep the current view
    Fail,
}

/// Behaviour switches for [`crate::CcdImage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Commit pending edits before the view is re-derived (new range, new
    /// scaling, new plane). When off, pending edits are dropped.
    pub auto_commit: bool,
    pub on_missing_inverse: MissingInversePolicy,
    /// Plane selected at construction
    pub initial_plane: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            on_missing_inverse: MissingInversePolicy::Discard,
            initial_plane: 0,
        }
    }
}

impl EngineConfig {
    pub fn auto_commit() -> Self {
        Self {
            auto_commit: true,
            ..Self::default()
        }
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), CcdError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            .and_then(|json| std::fs::write(path, json))
            .map_err(|source| CcdError::Config {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Load from JSON file; missing fields take their defaults
    pub fn load_from_file(path: &Path) -> Result<Self, CcdError> {
        std::fs::read_to_string(path)
            .and_then(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .map_err(|source| CcdError::Config {
                path: path.to_path_buf(),
                source,
            })
    }
}
