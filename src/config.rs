//! Study session settings.
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none) is fine. Command-line flags are applied on top in `main`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{StudyError, StudyResult};
use crate::tree::display::SheetBounds;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub autoplay: AutoplayConfig,
    #[serde(default)]
    pub sheet: SheetBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable speaking UCI on stdin/stdout.
    pub path: PathBuf,
    pub args: Vec<String>,
    pub depth: u32,
    pub threads: u32,
    pub hash_mb: u32,
    /// Per-query limit; the query fails with a timeout past this.
    pub timeout_ms: u64,
    pub show_wdl: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            depth: 30,
            threads: 1,
            hash_mb: 16,
            timeout_ms: 60_000,
            show_wdl: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoplayConfig {
    pub depth: u32,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self { depth: 10 }
    }
}

impl StudyConfig {
    pub fn from_json(text: &str) -> StudyResult<Self> {
        serde_json::from_str(text).map_err(|e| StudyError::Record(format!("invalid config: {e}")))
    }

    pub fn load(path: &Path) -> StudyResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StudyError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> StudyResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StudyError::Record(format!("failed to serialize config: {e}")))
    }
}
