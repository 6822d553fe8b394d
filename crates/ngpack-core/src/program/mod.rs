//! Contracts of the type checker and the framework compiler.
//!
//! Neither is implemented in this crate. A toolchain plugs in through
//! [`ProgramFactory`] and hands back immutable programs; compilations only
//! ever read from them.

pub mod host;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ast::Module;
use crate::codegen::CodeGenerator;
use crate::config::CompilerOptions;
use crate::diagnostics::{Diagnostic, DiagnosticFile};
use crate::errors::CompilationError;

pub use host::{CompilerHost, HostOptions, ResourceTransformer};

/// Suffix of the synthetic files generated for template type-checking
pub const TYPE_CHECK_SHIM_SUFFIX: &str = ".ngtypecheck.ts";

/// Content version of a source text
pub fn content_version(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// A parsed source file. The `Arc` allocation holding it is its identity:
/// a changed file is a new allocation, an unchanged one is shared between
/// successive programs.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    pub module: Module,
    pub version: String,
    pub is_declaration: bool,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>, module: Module) -> Self {
        let path = path.into();
        let text: Arc<str> = text.into();
        let is_declaration = path.to_string_lossy().ends_with(".d.ts");
        SourceFile {
            version: content_version(&text),
            path,
            text,
            module,
            is_declaration,
        }
    }

    pub fn diagnostic_file(&self) -> DiagnosticFile {
        DiagnosticFile::new(self.path.clone(), self.text.clone())
    }

    /// Original `.ts` path of a type-check shim
    pub fn shim_origin(&self) -> Option<PathBuf> {
        let name = self.path.to_string_lossy();
        name.strip_suffix(TYPE_CHECK_SHIM_SUFFIX)
            .map(|stem| PathBuf::from(format!("{}.ts", stem)))
    }
}

/// Output of emitting one file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmitOutput {
    pub content: String,
    pub map: Option<String>,
    pub dependencies: Vec<PathBuf>,
}

/// Tree rewrite applied during emit. Implementations return a new module and
/// never touch the input.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, file: &SourceFile, module: &Module) -> Module;
}

/// Transformers run before and after the type-erasing emit
#[derive(Clone, Default)]
pub struct EmitTransformers {
    pub before: Vec<Arc<dyn Transformer>>,
    pub after: Vec<Arc<dyn Transformer>>,
}

impl EmitTransformers {
    pub fn before(transformers: Vec<Arc<dyn Transformer>>) -> Self {
        EmitTransformers {
            before: transformers,
            after: Vec::new(),
        }
    }

    /// Append `other`'s transformers after this set's
    pub fn merge(mut self, other: EmitTransformers) -> Self {
        self.before.extend(other.before);
        self.after.extend(other.after);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Run every transformer in order and print the result
    pub fn apply(&self, file: &SourceFile) -> String {
        let mut module = file.module.clone();
        for transformer in self.before.iter().chain(self.after.iter()) {
            module = transformer.transform(file, &module);
        }
        CodeGenerator::new().generate(&module)
    }
}

impl fmt::Debug for EmitTransformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |list: &[Arc<dyn Transformer>]| {
            list.iter().map(|t| t.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("EmitTransformers")
            .field("before", &names(&self.before))
            .field("after", &names(&self.after))
            .finish()
    }
}

/// Hint for template diagnostics: a single changed file can be checked alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeFor {
    SingleFile,
    WholeProgram,
}

/// Parses source text into a module. Syntax problems are reported through the
/// program's syntactic diagnostics, so parsing itself cannot fail.
pub trait SourceParser: Send + Sync {
    fn parse(&self, path: &Path, text: &str) -> Module;
}

/// Type-checked program for one build
pub trait Program: Send + Sync {
    fn compiler_options(&self) -> &CompilerOptions;
    fn root_names(&self) -> &[PathBuf];
    fn source_files(&self) -> Vec<Arc<SourceFile>>;
    fn source_file(&self, path: &Path) -> Option<Arc<SourceFile>>;

    /// Next file whose semantic results changed since the previous program.
    /// Files for which `ignore` returns true are consumed without being
    /// returned. `None` once the traversal is exhausted.
    fn next_affected_file(
        &self,
        ignore: &mut dyn FnMut(&Arc<SourceFile>) -> bool,
    ) -> Option<Arc<SourceFile>>;

    fn options_diagnostics(&self) -> Vec<Diagnostic>;
    fn global_diagnostics(&self) -> Vec<Diagnostic>;
    fn syntactic_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic>;
    fn semantic_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic>;

    /// Emit `file` as JavaScript. Declaration files have no output.
    fn emit(&self, file: &SourceFile, transformers: &EmitTransformers) -> Option<EmitOutput> {
        if file.is_declaration {
            return None;
        }
        Some(EmitOutput {
            content: transformers.apply(file),
            map: None,
            dependencies: Vec::new(),
        })
    }
}

/// Framework compiler state attached to a program
pub trait FrameworkCompiler: Send + Sync {
    /// Whole-program template analysis; must run before any other query
    fn analyze(&self) -> Result<(), CompilationError>;

    fn options_diagnostics(&self) -> Vec<Diagnostic>;
    fn diagnostics_for_file(&self, file: &SourceFile, optimize_for: OptimizeFor)
        -> Vec<Diagnostic>;

    /// Transformers generating framework definitions during emit
    fn prepare_emit(&self) -> EmitTransformers;

    fn ignore_for_diagnostics(&self, file: &SourceFile) -> bool;
    fn ignore_for_emit(&self, file: &SourceFile) -> bool;

    /// True when the file's previous output is still valid
    fn safe_to_skip_emit(&self, file: &SourceFile) -> bool;
    fn record_successful_emit(&self, file: &SourceFile);

    /// Templates and stylesheets the file's components reference
    fn resource_dependencies(&self, _file: &SourceFile) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Program created with framework compilation enabled
pub trait FrameworkProgram: Send + Sync {
    fn compiler(&self) -> &dyn FrameworkCompiler;
    fn program(&self) -> Arc<dyn Program>;
}

/// Inputs for creating a program
pub struct ProgramRequest<'a> {
    pub root_names: &'a [PathBuf],
    pub options: &'a CompilerOptions,
    pub host: Arc<CompilerHost>,
}

/// Entry point of a type-checker toolchain
pub trait ProgramFactory: Send + Sync {
    /// Type-check-only program, reusing `old` where files are unchanged
    fn create_program(
        &self,
        request: ProgramRequest<'_>,
        old: Option<Arc<dyn Program>>,
    ) -> Result<Arc<dyn Program>, CompilationError>;

    fn create_framework_program(
        &self,
        request: ProgramRequest<'_>,
        old: Option<Arc<dyn FrameworkProgram>>,
    ) -> Result<Arc<dyn FrameworkProgram>, CompilationError>;
}
