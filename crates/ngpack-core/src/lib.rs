pub mod ast;
pub mod cache;
pub mod codegen;
pub mod compilation;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod fs;
pub mod javascript;
pub mod plugin;
pub mod program;
pub mod span;
pub mod stylesheets;
pub mod transformers;
pub mod worker_pool;

pub use cache::{LoadResult, LoadResultCache, Loader, OutputFile, SourceFileCache};
pub use codegen::CodeGenerator;
pub use compilation::{AotCompilation, Compilation, FileEmitter, InitializeResult, JitCompilation};
pub use config::{CompilerOptions, PluginOptions, ScriptTarget};
pub use di::Container;
pub use diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticHandler, Message};
pub use errors::CompilationError;
pub use javascript::{JavaScriptTransformer, TransformError};
pub use plugin::{BuildResult, CompilerPlugin, ProjectConfig};
pub use program::{
    EmitOutput, FrameworkCompiler, FrameworkProgram, Program, ProgramFactory, SourceFile, SourceParser,
};
pub use stylesheets::{StylesheetError, StylesheetPools, StylesheetPreprocessor, StylesheetWorkerPool};
pub use worker_pool::{WorkerError, WorkerPool};
