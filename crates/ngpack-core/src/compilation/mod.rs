//! Incremental compilation strategies
//!
//! A compilation is driven once per build: `initialize` creates the program
//! for the current sources, `collect_diagnostics` streams its diagnostics and
//! `create_file_emitter` hands out a closure the bundler calls per file.

mod aot;
mod jit;

pub use aot::AotCompilation;
pub use jit::JitCompilation;

use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CompilerOptions;
use crate::diagnostics::{Diagnostic, DiagnosticHandler};
use crate::errors::CompilationError;
use crate::fs::normalize_path;
use crate::program::{EmitOutput, HostOptions, SourceFile};

/// Adjusts parsed compiler options before the program is created
pub type OptionsTransformer = Arc<dyn Fn(CompilerOptions) -> CompilerOptions + Send + Sync>;

/// Insertion-ordered set of source files whose results must be recomputed
#[derive(Clone, Default)]
pub struct AffectedFileSet {
    files: IndexMap<PathBuf, Arc<SourceFile>>,
}

impl AffectedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the file was already present
    pub fn insert(&mut self, file: Arc<SourceFile>) -> bool {
        let key = normalize_path(&file.path);
        if self.files.contains_key(&key) {
            return false;
        }
        self.files.insert(key, file);
        true
    }

    /// True only for the same file object, not an older version of it
    pub fn contains(&self, file: &Arc<SourceFile>) -> bool {
        self.files
            .get(&normalize_path(&file.path))
            .map(|existing| Arc::ptr_eq(existing, file))
            .unwrap_or(false)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.files.values()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }
}

impl fmt::Debug for AffectedFileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.files.keys()).finish()
    }
}

/// Emits one file of the program it was created for
#[derive(Clone)]
pub struct FileEmitter {
    emit: Arc<dyn Fn(&Path) -> Option<EmitOutput> + Send + Sync>,
}

impl FileEmitter {
    pub fn new(emit: impl Fn(&Path) -> Option<EmitOutput> + Send + Sync + 'static) -> Self {
        FileEmitter {
            emit: Arc::new(emit),
        }
    }

    /// `None` when the file is not part of the program or has no output
    pub fn emit(&self, path: &Path) -> Option<EmitOutput> {
        (self.emit)(&normalize_path(path))
    }
}

impl fmt::Debug for FileEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEmitter").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct InitializeResult {
    pub affected_files: AffectedFileSet,
    pub compiler_options: CompilerOptions,
    /// Source files and their resources, for the watcher
    pub referenced_files: Vec<PathBuf>,
}

/// Shared contract of the ahead-of-time and just-in-time strategies
pub trait Compilation: Send {
    /// Create the program for the current sources. `prior_diagnostics` are
    /// project-file diagnostics reported first by `collect_diagnostics`.
    fn initialize(
        &mut self,
        root_names: &[PathBuf],
        compiler_options: &serde_json::Value,
        host_options: HostOptions,
        prior_diagnostics: Vec<Diagnostic>,
    ) -> Result<InitializeResult, CompilationError>;

    fn collect_diagnostics(&mut self, handler: &dyn DiagnosticHandler) -> Result<(), CompilationError>;

    fn create_file_emitter(&self) -> Result<FileEmitter, CompilationError>;
}

/// Parse and validate raw options, then apply the plugin's adjustments
pub(crate) fn load_compiler_options(
    value: &serde_json::Value,
    transformer: Option<&OptionsTransformer>,
) -> Result<CompilerOptions, CompilationError> {
    let options = CompilerOptions::from_value(value)?;
    let options = match transformer {
        Some(transform) => transform(options),
        None => options,
    };
    options.validate()?;
    Ok(options)
}
