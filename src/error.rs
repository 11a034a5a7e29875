//! Error types for the shader graph compiler.

use thiserror::Error;

/// Fatal compilation errors. Any of these aborts the build; no partial shader
/// is handed to the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A node's type cannot be determined (unknown type name, bad join arity,
    /// impossible conversion, ...).
    #[error("type resolution failed at {}: {reason}", .node.as_deref().unwrap_or("<type system>"))]
    TypeResolution { node: Option<String>, reason: String },

    /// A node was re-entered while already being built.
    #[error("cycle detected at {node} (chain: {})", .chain.join(" -> "))]
    Cycle { node: String, chain: Vec<String> },

    /// No overload candidate matches the call arity.
    #[error("no overload of {node} accepts {arity} argument(s) ({candidates} candidate(s))")]
    OverloadResolution {
        node: String,
        arity: usize,
        candidates: usize,
    },

    /// The active backend or shader stage cannot express a construct.
    #[error("unsupported feature at {node} for backend {backend}: {feature}")]
    UnsupportedFeature {
        node: String,
        backend: String,
        feature: String,
    },

    /// Malformed serialized graph.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The assembled module was rejected by the validator.
    #[error("generated shader failed validation: {0}")]
    Validation(String),
}

impl CompileError {
    pub fn type_resolution(reason: impl Into<String>) -> Self {
        CompileError::TypeResolution {
            node: None,
            reason: reason.into(),
        }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        CompileError::UnsupportedFeature {
            node: String::new(),
            backend: String::new(),
            feature: feature.into(),
        }
    }

    /// Attach the offending node's label when the error does not carry one yet.
    pub fn at_node(self, label: &str) -> Self {
        match self {
            CompileError::TypeResolution { node: None, reason } => CompileError::TypeResolution {
                node: Some(label.to_string()),
                reason,
            },
            CompileError::UnsupportedFeature {
                node,
                backend,
                feature,
            } if node.is_empty() => CompileError::UnsupportedFeature {
                node: label.to_string(),
                backend,
                feature,
            },
            other => other,
        }
    }

    pub fn with_backend(self, name: &str) -> Self {
        match self {
            CompileError::UnsupportedFeature {
                node,
                backend,
                feature,
            } if backend.is_empty() => CompileError::UnsupportedFeature {
                node,
                backend: name.to_string(),
                feature,
            },
            other => other,
        }
    }
}

/// Result type alias using the compiler's error type.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Non-fatal diagnostic: a deprecated slot or property was used and a
/// documented fallback applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationWarning {
    pub slot: String,
    pub message: String,
}

impl ConfigurationWarning {
    pub fn new(slot: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.slot, self.message)
    }
}
