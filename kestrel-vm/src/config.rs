//! Engine configuration loaded by the embedding node.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{CapabilityVersion, Engine, DEFAULT_TIMEOUT_US};
use crate::error::{VmError, VmResult};

/// Tunables for engines created by one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget per invocation in microseconds; zero disables the
    /// deadline.
    pub timeout_us: u64,
    /// Instruction limit; zero leaves the budget to the embedder's
    /// per-invocation `set_execution_limits` call.
    pub max_instructions: u64,
    /// Memory limit in bytes; zero applies the default cushion.
    pub max_memory: u64,
    /// Capability version bitmask.
    pub version: u64,
    /// Directory containing `jslib/`; defaults to the working directory.
    pub lib_base: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_us: DEFAULT_TIMEOUT_US,
            max_instructions: 0,
            max_memory: 0,
            version: CapabilityVersion::DEFAULT.0,
            lib_base: None,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> VmResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| VmError::unexpected(format!("cannot read config {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| VmError::unexpected(format!("invalid config {}: {e}", path.display())))
    }

    /// Applies timeout, version mask, and (when set) limits to an engine.
    pub fn apply(&self, engine: &mut Engine) -> VmResult<()> {
        engine.set_timeout_us(self.timeout_us);
        engine.set_version(CapabilityVersion(self.version));
        if self.max_instructions > 0 {
            engine.set_execution_limits(self.max_instructions, self.max_memory)?;
        }
        Ok(())
    }
}
