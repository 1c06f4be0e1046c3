//! Session configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DebugResult;

/// Tunables for one debug session
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Steps returned by each `continue_debug` call
    pub steps_per_continue: u32,

    /// Total steps after which the session is ended with an error
    pub max_total_steps: Option<u64>,

    /// Log uniform and loop blocks found by function analysis
    pub log_control_flow: bool,

    /// Log every executed instruction at trace level
    pub trace_instructions: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            steps_per_continue: 100,
            max_total_steps: None,
            log_control_flow: false,
            trace_instructions: false,
        }
    }
}

impl DebuggerConfig {
    /// Parse a config from JSON text
    pub fn from_json_str(content: &str) -> DebugResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a config from a JSON file
    pub fn from_json_file(path: &Path) -> DebugResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
