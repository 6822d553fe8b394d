use thiserror::Error;

use crate::javascript::TransformError;
use crate::stylesheets::StylesheetError;

/// Errors that abort a compilation step.
///
/// Source diagnostics (syntax, type and template problems) are never reported
/// through this type; they flow through the diagnostics pipeline instead.
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Compiler option '{option}' is invalid: {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Compilation has not been initialized")]
    NotInitialized,

    #[error("Program analysis failed: {0}")]
    Analysis(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Stylesheet(#[from] StylesheetError),
}

impl CompilationError {
    /// Configuration problems are surfaced before any build work happens
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompilationError::ConfigError(_)
                | CompilationError::InvalidOption { .. }
                | CompilationError::Analysis(_)
        )
    }
}

impl From<serde_json::Error> for CompilationError {
    fn from(error: serde_json::Error) -> Self {
        CompilationError::ConfigError(error.to_string())
    }
}
