//! A scripted type-checker toolchain.
//!
//! Programs are built from the files the compiler host returns, so the
//! source-file cache, file replacements and the resource transformer are
//! exercised exactly as in a real build. Diagnostics come from markers in the
//! source text:
//!
//! ```text
//! // @syntax-error: <message>       syntactic error (TS1005)
//! // @semantic-error: <message>     semantic error (TS2322)
//! // @template-error: <message>     template error (NG2001)
//! // @template-warning: <message>   template warning (NG8113)
//! // @resource: ./app.html          component resource, read through the host
//! // @inline-style: a { color: $c } inline component style
//! ```
//!
//! Template markers are also honored inside resources. A file containing
//! `@Component` gets a `.ngtypecheck.ts` shim in framework programs.

use indexmap::IndexMap;
use ngpack_core::ast::Module;
use ngpack_core::diagnostics::DiagnosticFile;
use ngpack_core::program::{
    EmitTransformers, FrameworkCompiler, FrameworkProgram, OptimizeFor, Program, ProgramFactory,
    ProgramRequest, Transformer, TYPE_CHECK_SHIM_SUFFIX,
};
use ngpack_core::span::Span;
use ngpack_core::{CompilationError, CompilerOptions, Diagnostic, SourceFile};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use ngpack_core::fs::lexical_join;

const SYNTAX_ERROR: &str = "@syntax-error:";
const SEMANTIC_ERROR: &str = "@semantic-error:";
const TEMPLATE_ERROR: &str = "@template-error:";
const TEMPLATE_WARNING: &str = "@template-warning:";
const RESOURCE: &str = "@resource:";
const INLINE_STYLE: &str = "@inline-style:";
const COMPONENT: &str = "@Component";

pub const SYNTAX_ERROR_CODE: i64 = 1005;
pub const SEMANTIC_ERROR_CODE: i64 = 2322;
/// Framework codes are negative: `-99` followed by the `NG` number
pub const TEMPLATE_ERROR_CODE: i64 = -992001;
pub const TEMPLATE_WARNING_CODE: i64 = -998113;

/// What the toolchain has been asked to do so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainStats {
    pub programs_created: usize,
    /// Programs created with a previous program to reuse
    pub reused_old_program: usize,
    pub analyze_calls: usize,
    pub template_diagnostic_calls: Vec<(PathBuf, OptimizeFor)>,
    pub emitted: Vec<PathBuf>,
    /// Modified resources reported by the host, per framework program
    pub modified_resources: Vec<Vec<PathBuf>>,
}

#[derive(Default)]
struct ToolchainConfig {
    ignore_for_emit: FxHashSet<PathBuf>,
    must_emit: FxHashSet<PathBuf>,
    options_diagnostics: Vec<Diagnostic>,
    global_diagnostics: Vec<Diagnostic>,
    framework_options_diagnostics: Vec<Diagnostic>,
    analyze_error: Option<String>,
    emit_transformers: Vec<Arc<dyn Transformer>>,
}

#[derive(Default)]
struct Shared {
    config: Mutex<ToolchainConfig>,
    stats: Mutex<ToolchainStats>,
    /// Version of each file at its last successful emit
    emitted_versions: Mutex<FxHashMap<PathBuf, String>>,
}

/// Scripted [`ProgramFactory`]. Clones share configuration and statistics.
#[derive(Clone, Default)]
pub struct FakeToolchain {
    shared: Arc<Shared>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never emit `path`
    pub fn ignore_for_emit(&self, path: impl Into<PathBuf>) {
        self.config().ignore_for_emit.insert(path.into());
    }

    /// Treat `path` as never safe to skip, as if its output depended on a
    /// changed file
    pub fn require_emit(&self, path: impl Into<PathBuf>) {
        self.config().must_emit.insert(path.into());
    }

    pub fn add_options_diagnostic(&self, diagnostic: Diagnostic) {
        self.config().options_diagnostics.push(diagnostic);
    }

    pub fn add_global_diagnostic(&self, diagnostic: Diagnostic) {
        self.config().global_diagnostics.push(diagnostic);
    }

    pub fn add_framework_options_diagnostic(&self, diagnostic: Diagnostic) {
        self.config().framework_options_diagnostics.push(diagnostic);
    }

    /// Make template analysis fail with `message`, or succeed again with `None`
    pub fn fail_analysis(&self, message: Option<&str>) {
        self.config().analyze_error = message.map(str::to_string);
    }

    /// Transformer returned by the framework compiler's emit preparation
    pub fn add_emit_transformer(&self, transformer: Arc<dyn Transformer>) {
        self.config().emit_transformers.push(transformer);
    }

    pub fn stats(&self) -> ToolchainStats {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        *self.lock_stats() = ToolchainStats::default();
    }

    fn config(&self) -> MutexGuard<'_, ToolchainConfig> {
        lock(&self.shared.config)
    }

    fn lock_stats(&self) -> MutexGuard<'_, ToolchainStats> {
        lock(&self.shared.stats)
    }

    fn build(
        &self,
        request: ProgramRequest<'_>,
        old_files: Option<Vec<Arc<SourceFile>>>,
        with_shims: bool,
    ) -> Result<(FakeProgram, ComponentResources), CompilationError> {
        {
            let mut stats = self.lock_stats();
            stats.programs_created += 1;
            if old_files.is_some() {
                stats.reused_old_program += 1;
            }
            if with_shims {
                stats.modified_resources.push(request.host.modified_resource_files());
            }
        }

        let old_by_path: Option<FxHashMap<PathBuf, Arc<SourceFile>>> = old_files.map(|files| {
            files
                .into_iter()
                .map(|file| (file.path.clone(), file))
                .collect()
        });

        let mut files: IndexMap<PathBuf, Arc<SourceFile>> = IndexMap::new();
        for root in request.root_names {
            let file = request.host.get_source_file(root)?;
            files.insert(file.path.clone(), file);
        }

        let mut resources = ComponentResources::default();
        if with_shims {
            let components: Vec<Arc<SourceFile>> = files
                .values()
                .filter(|file| !file.is_declaration && file.text.contains(COMPONENT))
                .cloned()
                .collect();

            for component in components {
                let mut shim_text = String::new();
                let directory = component.path.parent().map(Path::to_path_buf).unwrap_or_default();

                for (_, url) in markers(&component.text, RESOURCE) {
                    let path = lexical_join(&directory, url);
                    match request.host.read_resource(&path, &component.path) {
                        Ok(text) => {
                            shim_text.push_str(&text);
                            shim_text.push('\n');
                            resources
                                .files
                                .entry(component.path.clone())
                                .or_default()
                                .push((path, text));
                        }
                        Err(error) => {
                            resources.errors.entry(component.path.clone()).or_default().push(
                                Diagnostic::error(TEMPLATE_ERROR_CODE, error.to_string())
                                    .at(component.diagnostic_file(), Span::dummy())
                                    .from_framework(),
                            );
                        }
                    }
                }

                for (_, style) in markers(&component.text, INLINE_STYLE) {
                    match request.host.transform_inline_style(style, &component.path) {
                        Ok(css) => {
                            shim_text.push_str(&css);
                            shim_text.push('\n');
                        }
                        Err(error) => {
                            resources.errors.entry(component.path.clone()).or_default().push(
                                Diagnostic::error(TEMPLATE_ERROR_CODE, error.to_string())
                                    .at(component.diagnostic_file(), Span::dummy())
                                    .from_framework(),
                            );
                        }
                    }
                }

                for marker in [TEMPLATE_ERROR, TEMPLATE_WARNING] {
                    for (_, message) in markers(&component.text, marker) {
                        shim_text.push_str(&format!("// {} {}\n", marker, message));
                    }
                }

                let shim_path = shim_path(&component.path);
                let reused = old_by_path
                    .as_ref()
                    .and_then(|old| old.get(&shim_path))
                    .filter(|old| *old.text == *shim_text)
                    .cloned();
                let shim = reused.unwrap_or_else(|| {
                    Arc::new(SourceFile::new(
                        shim_path.clone(),
                        shim_text,
                        Module::new(Vec::new(), Span::dummy()),
                    ))
                });
                files.insert(shim_path, shim);
            }
        }

        let pending: VecDeque<Arc<SourceFile>> = files
            .values()
            .filter(|file| match old_by_path.as_ref().and_then(|old| old.get(&file.path)) {
                Some(old) => old.version != file.version,
                None => true,
            })
            .cloned()
            .collect();
        debug!(files = files.len(), affected = pending.len(), "Built fake program");

        let program = FakeProgram {
            options: request.options.clone(),
            root_names: request.root_names.to_vec(),
            files,
            pending: Mutex::new(pending),
            shared: self.shared.clone(),
        };
        Ok((program, resources))
    }
}

impl ProgramFactory for FakeToolchain {
    fn create_program(
        &self,
        request: ProgramRequest<'_>,
        old: Option<Arc<dyn Program>>,
    ) -> Result<Arc<dyn Program>, CompilationError> {
        let old_files = old.map(|program| program.source_files());
        let (program, _) = self.build(request, old_files, false)?;
        Ok(Arc::new(program))
    }

    fn create_framework_program(
        &self,
        request: ProgramRequest<'_>,
        old: Option<Arc<dyn FrameworkProgram>>,
    ) -> Result<Arc<dyn FrameworkProgram>, CompilationError> {
        let old_files = old.map(|framework| framework.program().source_files());
        let (program, resources) = self.build(request, old_files, true)?;
        Ok(Arc::new(FakeFrameworkProgram {
            program: Arc::new(program),
            compiler: FakeCompiler {
                shared: self.shared.clone(),
                resources,
            },
        }))
    }
}

#[derive(Default)]
struct ComponentResources {
    files: FxHashMap<PathBuf, Vec<(PathBuf, String)>>,
    errors: FxHashMap<PathBuf, Vec<Diagnostic>>,
}

struct FakeProgram {
    options: CompilerOptions,
    root_names: Vec<PathBuf>,
    files: IndexMap<PathBuf, Arc<SourceFile>>,
    pending: Mutex<VecDeque<Arc<SourceFile>>>,
    shared: Arc<Shared>,
}

impl Program for FakeProgram {
    fn compiler_options(&self) -> &CompilerOptions {
        &self.options
    }

    fn root_names(&self) -> &[PathBuf] {
        &self.root_names
    }

    fn source_files(&self) -> Vec<Arc<SourceFile>> {
        self.files.values().cloned().collect()
    }

    fn source_file(&self, path: &Path) -> Option<Arc<SourceFile>> {
        self.files.get(path).cloned()
    }

    fn next_affected_file(
        &self,
        ignore: &mut dyn FnMut(&Arc<SourceFile>) -> bool,
    ) -> Option<Arc<SourceFile>> {
        loop {
            let next = lock(&self.pending).pop_front()?;
            if !ignore(&next) {
                return Some(next);
            }
        }
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.shared.config).options_diagnostics.clone()
    }

    fn global_diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.shared.config).global_diagnostics.clone()
    }

    fn syntactic_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic> {
        marker_diagnostics(&file.diagnostic_file(), SYNTAX_ERROR, SYNTAX_ERROR_CODE, false)
    }

    fn semantic_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic> {
        marker_diagnostics(&file.diagnostic_file(), SEMANTIC_ERROR, SEMANTIC_ERROR_CODE, false)
    }
}

struct FakeCompiler {
    shared: Arc<Shared>,
    resources: ComponentResources,
}

impl FrameworkCompiler for FakeCompiler {
    fn analyze(&self) -> Result<(), CompilationError> {
        lock(&self.shared.stats).analyze_calls += 1;
        match &lock(&self.shared.config).analyze_error {
            Some(message) => Err(CompilationError::Analysis(message.clone())),
            None => Ok(()),
        }
    }

    fn options_diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.shared.config).framework_options_diagnostics.clone()
    }

    fn diagnostics_for_file(&self, file: &SourceFile, optimize_for: OptimizeFor) -> Vec<Diagnostic> {
        lock(&self.shared.stats)
            .template_diagnostic_calls
            .push((file.path.clone(), optimize_for));

        let mut diagnostics = template_diagnostics(&file.diagnostic_file());
        if let Some(resources) = self.resources.files.get(&file.path) {
            for (path, text) in resources {
                diagnostics.extend(template_diagnostics(&DiagnosticFile::new(
                    path.clone(),
                    text.as_str(),
                )));
            }
        }
        if let Some(errors) = self.resources.errors.get(&file.path) {
            diagnostics.extend(errors.iter().cloned());
        }
        diagnostics
    }

    fn prepare_emit(&self) -> EmitTransformers {
        EmitTransformers::before(lock(&self.shared.config).emit_transformers.clone())
    }

    fn ignore_for_diagnostics(&self, file: &SourceFile) -> bool {
        is_shim(&file.path)
    }

    fn ignore_for_emit(&self, file: &SourceFile) -> bool {
        is_shim(&file.path)
            || file.is_declaration
            || lock(&self.shared.config).ignore_for_emit.contains(&file.path)
    }

    fn safe_to_skip_emit(&self, file: &SourceFile) -> bool {
        if lock(&self.shared.config).must_emit.contains(&file.path) {
            return false;
        }
        lock(&self.shared.emitted_versions).get(&file.path) == Some(&file.version)
    }

    fn record_successful_emit(&self, file: &SourceFile) {
        lock(&self.shared.emitted_versions).insert(file.path.clone(), file.version.clone());
        lock(&self.shared.stats).emitted.push(file.path.clone());
    }

    fn resource_dependencies(&self, file: &SourceFile) -> Vec<PathBuf> {
        self.resources
            .files
            .get(&file.path)
            .map(|resources| resources.iter().map(|(path, _)| path.clone()).collect())
            .unwrap_or_default()
    }
}

struct FakeFrameworkProgram {
    program: Arc<FakeProgram>,
    compiler: FakeCompiler,
}

impl FrameworkProgram for FakeFrameworkProgram {
    fn compiler(&self) -> &dyn FrameworkCompiler {
        &self.compiler
    }

    fn program(&self) -> Arc<dyn Program> {
        self.program.clone()
    }
}

/// Every `marker` in `text` with the byte offset of the marker and the
/// trimmed rest of its line
fn markers<'a>(text: &'a str, marker: &str) -> Vec<(usize, &'a str)> {
    let mut found = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if let Some(index) = line.find(marker) {
            found.push((offset + index, line[index + marker.len()..].trim()));
        }
        offset += line.len();
    }
    found
}

fn marker_diagnostics(file: &DiagnosticFile, marker: &str, code: i64, framework: bool) -> Vec<Diagnostic> {
    markers(&file.text, marker)
        .into_iter()
        .map(|(offset, message)| {
            let diagnostic = if code == TEMPLATE_WARNING_CODE {
                Diagnostic::warning(code, message)
            } else {
                Diagnostic::error(code, message)
            };
            let diagnostic = diagnostic.at(file.clone(), Span::with_length(offset, marker.len()));
            if framework {
                diagnostic.from_framework()
            } else {
                diagnostic
            }
        })
        .collect()
}

fn template_diagnostics(file: &DiagnosticFile) -> Vec<Diagnostic> {
    let mut diagnostics = marker_diagnostics(file, TEMPLATE_ERROR, TEMPLATE_ERROR_CODE, true);
    diagnostics.extend(marker_diagnostics(file, TEMPLATE_WARNING, TEMPLATE_WARNING_CODE, true));
    diagnostics
}

fn is_shim(path: &Path) -> bool {
    path.to_string_lossy().ends_with(TYPE_CHECK_SHIM_SUFFIX)
}

fn shim_path(path: &Path) -> PathBuf {
    let name = path.to_string_lossy();
    let stem = name.strip_suffix(".ts").unwrap_or(&name);
    PathBuf::from(format!("{}{}", stem, TYPE_CHECK_SHIM_SUFFIX))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
