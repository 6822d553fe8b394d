//! Source parser for tests

use ngpack_core::ast::statement::Statement;
use ngpack_core::ast::{Module, Spanned};
use ngpack_core::span::Span;
use ngpack_core::SourceParser;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Module holding `text` as one raw statement
pub fn raw_module(text: &str) -> Module {
    let span = Span::new(0, text.len());
    Module::new(vec![Statement::Raw(Spanned::new(text.to_string(), span))], span)
}

/// Parser returning registered trees by path. Any other file becomes a
/// single raw statement, so it emits its text unchanged.
#[derive(Debug, Default)]
pub struct FixtureParser {
    modules: RwLock<FxHashMap<PathBuf, Module>>,
}

impl FixtureParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, path: impl Into<PathBuf>, module: Module) -> Self {
        self.set_module(path, module);
        self
    }

    /// Register the tree returned for `path` from now on
    pub fn set_module(&self, path: impl Into<PathBuf>, module: Module) {
        self.modules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), module);
    }
}

impl SourceParser for FixtureParser {
    fn parse(&self, path: &Path, text: &str) -> Module {
        self.modules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
            .unwrap_or_else(|| raw_module(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngpack_core::CodeGenerator;

    #[test]
    fn test_unregistered_files_emit_their_text() {
        let parser = FixtureParser::new();
        let module = parser.parse(Path::new("/src/a.ts"), "export const a = 1;\n");

        assert_eq!(CodeGenerator::new().generate(&module), "export const a = 1;\n");
    }

    #[test]
    fn test_registered_module_wins() {
        let parser = FixtureParser::new().with_module("/src/a.ts", raw_module("registered();"));
        let module = parser.parse(Path::new("/src/a.ts"), "ignored();");

        assert_eq!(CodeGenerator::new().generate(&module), "registered();\n");
    }
}
