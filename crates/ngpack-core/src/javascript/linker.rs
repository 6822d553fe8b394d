use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

use super::TransformError;

/// Marker present in every partially compiled declaration
pub const PARTIAL_DECLARATION_MARKER: &str = "ɵɵngDeclare";

static LINK_EXCLUDED_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\/]@angular[\\/](?:compiler|core)|\.tsx?$").expect("valid regex"));

/// Turns partial declarations of prebuilt libraries into full definitions
pub trait Linker: Send + Sync {
    fn link(&self, filename: &Path, source: &str, jit: bool) -> Result<String, TransformError>;
}

/// Creates the linker the first time a file needs it
pub trait LinkerFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Linker>, TransformError>;
}

/// Compiler packages contain the marker without needing linking, and
/// TypeScript sources are compiled directly.
pub fn requires_linking(path: &Path, source: &str) -> bool {
    if LINK_EXCLUDED_PATH.is_match(&path.to_string_lossy()) {
        return false;
    }
    source.contains(PARTIAL_DECLARATION_MARKER)
}
