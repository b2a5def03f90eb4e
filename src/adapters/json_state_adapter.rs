//! Engine state persisted as a JSON file between live polls.

use crate::domain::engine::EngineState;
use crate::domain::error::OrtraderError;
use crate::ports::state_port::StateStore;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_error(&self, what: &str, e: impl std::fmt::Display) -> OrtraderError {
        OrtraderError::State {
            reason: format!("{what} {}: {e}", self.path.display()),
        }
    }
}

impl StateStore for JsonStateFile {
    /// A missing file means a fresh start. A corrupt one is an error: silently
    /// starting over could forget an open position.
    fn load(&self) -> Result<Option<EngineState>, OrtraderError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.state_error("failed to read", e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.state_error("failed to parse", e))
    }

    /// Writes a sibling temp file and renames it over the target.
    fn save(&self, state: &EngineState) -> Result<(), OrtraderError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|e| self.state_error("failed to serialize", e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.state_error("failed to write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.state_error("failed to replace", e))?;
        Ok(())
    }
}
