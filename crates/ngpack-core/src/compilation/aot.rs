use indexmap::IndexSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span};

use super::{
    load_compiler_options, AffectedFileSet, Compilation, FileEmitter, InitializeResult,
    OptionsTransformer,
};
use crate::cache::DiagnosticCache;
use crate::diagnostics::{Diagnostic, DiagnosticHandler};
use crate::errors::CompilationError;
use crate::program::{
    CompilerHost, EmitTransformers, FrameworkCompiler, FrameworkProgram, HostOptions,
    OptimizeFor, Program, ProgramFactory, ProgramRequest, Transformer, TYPE_CHECK_SHIM_SUFFIX,
};
use crate::transformers::ReplaceBootstrapTransformer;

struct AotState {
    framework_program: Arc<dyn FrameworkProgram>,
    program: Arc<dyn Program>,
    affected_files: AffectedFileSet,
    template_diagnostics_optimization: OptimizeFor,
    prior_diagnostics: Vec<Diagnostic>,
}

/// Ahead-of-time strategy: templates are analyzed and type-checked at build
/// time and compiled into the emitted code.
pub struct AotCompilation {
    factory: Arc<dyn ProgramFactory>,
    options_transformer: Option<OptionsTransformer>,
    state: Option<AotState>,
    diagnostic_cache: DiagnosticCache,
}

impl AotCompilation {
    pub fn new(factory: Arc<dyn ProgramFactory>) -> Self {
        AotCompilation {
            factory,
            options_transformer: None,
            state: None,
            diagnostic_cache: DiagnosticCache::new(),
        }
    }

    pub fn with_options_transformer(mut self, transformer: OptionsTransformer) -> Self {
        self.options_transformer = Some(transformer);
        self
    }

    fn state(&self) -> Result<&AotState, CompilationError> {
        self.state.as_ref().ok_or(CompilationError::NotInitialized)
    }
}

/// Files whose diagnostics or output may differ from the previous build
fn find_affected_files(program: &dyn Program, compiler: &dyn FrameworkCompiler) -> AffectedFileSet {
    let span = info_span!("find_affected_files");
    let _guard = span.enter();

    let mut affected = AffectedFileSet::new();
    let mut shim_origins = Vec::new();

    loop {
        let next = program.next_affected_file(&mut |file| {
            let is_shim = file.path.to_string_lossy().ends_with(TYPE_CHECK_SHIM_SUFFIX);
            if is_shim && compiler.ignore_for_diagnostics(file) {
                // A changed shim means the component it checks is affected
                if let Some(origin) = file.shim_origin() {
                    shim_origins.push(origin);
                }
                return true;
            }
            false
        });

        for origin in shim_origins.drain(..) {
            if let Some(original) = program.source_file(&origin) {
                affected.insert(original);
            }
        }

        match next {
            Some(file) => {
                affected.insert(file);
            }
            None => break,
        }
    }

    for file in program.source_files() {
        if compiler.ignore_for_emit(&file) || compiler.safe_to_skip_emit(&file) {
            continue;
        }
        affected.insert(file);
    }

    debug!(count = affected.len(), "Computed affected files");
    affected
}

impl Compilation for AotCompilation {
    fn initialize(
        &mut self,
        root_names: &[PathBuf],
        compiler_options: &serde_json::Value,
        host_options: HostOptions,
        prior_diagnostics: Vec<Diagnostic>,
    ) -> Result<InitializeResult, CompilationError> {
        let mut options = load_compiler_options(compiler_options, self.options_transformer.as_ref())?;
        options.declaration = false;

        let host = Arc::new(CompilerHost::new(host_options));
        let old = self.state.as_ref().map(|state| state.framework_program.clone());
        let modified_resources = host.modified_resource_files();
        if !modified_resources.is_empty() {
            debug!(?modified_resources, "Component resources changed since the last build");
        }

        let framework_program = self.factory.create_framework_program(
            ProgramRequest {
                root_names,
                options: &options,
                host,
            },
            old,
        )?;

        {
            let span = info_span!("analyze");
            let _guard = span.enter();
            framework_program.compiler().analyze()?;
        }

        let program = framework_program.program();
        let compiler = framework_program.compiler();
        let affected_files = find_affected_files(program.as_ref(), compiler);

        let mut referenced = IndexSet::new();
        for file in program.source_files() {
            if compiler.ignore_for_emit(&file) {
                continue;
            }
            referenced.insert(file.path.clone());
            referenced.extend(compiler.resource_dependencies(&file));
        }

        let template_diagnostics_optimization = if affected_files.len() == 1 {
            OptimizeFor::SingleFile
        } else {
            OptimizeFor::WholeProgram
        };

        let pruned = self.diagnostic_cache.prune();
        info!(
            affected = affected_files.len(),
            files = program.source_files().len(),
            pruned,
            "Initialized ahead-of-time compilation"
        );

        self.state = Some(AotState {
            framework_program: framework_program.clone(),
            program,
            affected_files: affected_files.clone(),
            template_diagnostics_optimization,
            prior_diagnostics,
        });

        Ok(InitializeResult {
            affected_files,
            compiler_options: options,
            referenced_files: referenced.into_iter().collect(),
        })
    }

    fn collect_diagnostics(&mut self, handler: &dyn DiagnosticHandler) -> Result<(), CompilationError> {
        let state = self.state.as_ref().ok_or(CompilationError::NotInitialized)?;
        let span = info_span!("collect_diagnostics", strategy = "aot");
        let _guard = span.enter();

        let compiler = state.framework_program.compiler();
        let program = &state.program;

        for diagnostic in state.prior_diagnostics.iter().cloned() {
            handler.report(diagnostic);
        }
        for diagnostic in compiler
            .options_diagnostics()
            .into_iter()
            .chain(program.options_diagnostics())
            .chain(program.global_diagnostics())
        {
            handler.report(diagnostic);
        }

        let mut fresh = 0usize;
        for file in program.source_files() {
            if compiler.ignore_for_diagnostics(&file) {
                continue;
            }

            for diagnostic in program
                .syntactic_diagnostics(&file)
                .into_iter()
                .chain(program.semantic_diagnostics(&file))
            {
                handler.report(diagnostic);
            }

            if file.is_declaration {
                continue;
            }

            let cached = if state.affected_files.contains(&file) {
                None
            } else {
                self.diagnostic_cache.get(&file).map(<[Diagnostic]>::to_vec)
            };
            let template_diagnostics = match cached {
                Some(diagnostics) => diagnostics,
                None => {
                    fresh += 1;
                    let diagnostics = compiler
                        .diagnostics_for_file(&file, state.template_diagnostics_optimization);
                    self.diagnostic_cache.insert(&file, diagnostics.clone());
                    diagnostics
                }
            };
            for diagnostic in template_diagnostics {
                handler.report(diagnostic);
            }
        }

        debug!(fresh, "Collected template diagnostics");
        Ok(())
    }

    fn create_file_emitter(&self) -> Result<FileEmitter, CompilationError> {
        let state = self.state()?;
        let framework_program = state.framework_program.clone();
        let program = state.program.clone();

        let transformers = framework_program
            .compiler()
            .prepare_emit()
            .merge(EmitTransformers::before(vec![
                Arc::new(ReplaceBootstrapTransformer::new()) as Arc<dyn Transformer>
            ]));

        Ok(FileEmitter::new(move |path| {
            let file = program.source_file(path)?;
            let span = info_span!("emit", path = %path.display());
            let _guard = span.enter();

            let output = program.emit(&file, &transformers);
            framework_program.compiler().record_successful_emit(&file);
            output
        }))
    }
}
