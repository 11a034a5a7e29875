//! Compiler configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How the build context decides that two node instances are the same
/// computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DedupePolicy {
    /// Structurally equal nodes collapse to one generated value.
    #[default]
    Content,
    /// Only the same node instance is shared; content sharing is opt-in per node.
    Identity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerOptions {
    pub dedupe: DedupePolicy,
    /// Hoist expressions referenced more than once into a single variable.
    pub hoist_shared: bool,
    /// One indentation level of emitted flow code.
    pub indent: String,
    /// Parse assembled modules with naga before returning them.
    pub validate_output: bool,
    pub workgroup_size: [u32; 3],
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            dedupe: DedupePolicy::Content,
            hoist_shared: true,
            indent: "    ".to_string(),
            validate_output: false,
            workgroup_size: [64, 1, 1],
        }
    }
}

impl CompilerOptions {
    /// Parse options from JSON text; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse compiler options json")
    }

    pub fn with_dedupe(mut self, dedupe: DedupePolicy) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_output = validate;
        self
    }
}
