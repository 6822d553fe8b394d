use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span};

use super::{
    load_compiler_options, AffectedFileSet, Compilation, FileEmitter, InitializeResult,
    OptionsTransformer,
};
use crate::diagnostics::{Diagnostic, DiagnosticHandler};
use crate::errors::CompilationError;
use crate::program::{
    CompilerHost, EmitTransformers, HostOptions, Program, ProgramFactory, ProgramRequest,
    Transformer,
};
use crate::transformers::{CtorParametersTransformer, JitResourceTransformer};

struct JitState {
    program: Arc<dyn Program>,
    prior_diagnostics: Vec<Diagnostic>,
}

/// Just-in-time strategy: the program is only type-checked; component
/// resources are turned into imports and templates compile at runtime.
pub struct JitCompilation {
    factory: Arc<dyn ProgramFactory>,
    options_transformer: Option<OptionsTransformer>,
    state: Option<JitState>,
}

impl JitCompilation {
    pub fn new(factory: Arc<dyn ProgramFactory>) -> Self {
        JitCompilation {
            factory,
            options_transformer: None,
            state: None,
        }
    }

    pub fn with_options_transformer(mut self, transformer: OptionsTransformer) -> Self {
        self.options_transformer = Some(transformer);
        self
    }
}

impl Compilation for JitCompilation {
    fn initialize(
        &mut self,
        root_names: &[PathBuf],
        compiler_options: &serde_json::Value,
        host_options: HostOptions,
        prior_diagnostics: Vec<Diagnostic>,
    ) -> Result<InitializeResult, CompilationError> {
        let options = load_compiler_options(compiler_options, self.options_transformer.as_ref())?;
        let host = Arc::new(CompilerHost::new(host_options));
        let old = self.state.as_ref().map(|state| state.program.clone());

        let program = self.factory.create_program(
            ProgramRequest {
                root_names,
                options: &options,
                host,
            },
            old,
        )?;

        let mut affected_files = AffectedFileSet::new();
        {
            let span = info_span!("find_affected_files");
            let _guard = span.enter();
            while let Some(file) = program.next_affected_file(&mut |_| false) {
                affected_files.insert(file);
            }
        }

        let referenced_files = program
            .source_files()
            .iter()
            .map(|file| file.path.clone())
            .collect();

        info!(
            affected = affected_files.len(),
            "Initialized just-in-time compilation"
        );

        self.state = Some(JitState {
            program,
            prior_diagnostics,
        });

        Ok(InitializeResult {
            affected_files,
            compiler_options: options,
            referenced_files,
        })
    }

    fn collect_diagnostics(&mut self, handler: &dyn DiagnosticHandler) -> Result<(), CompilationError> {
        let state = self.state.as_ref().ok_or(CompilationError::NotInitialized)?;
        let span = info_span!("collect_diagnostics", strategy = "jit");
        let _guard = span.enter();

        let program = &state.program;
        for diagnostic in state.prior_diagnostics.iter().cloned() {
            handler.report(diagnostic);
        }
        for diagnostic in program
            .options_diagnostics()
            .into_iter()
            .chain(program.global_diagnostics())
        {
            handler.report(diagnostic);
        }

        let files = program.source_files();
        for file in &files {
            for diagnostic in program.syntactic_diagnostics(file) {
                handler.report(diagnostic);
            }
        }
        for file in &files {
            for diagnostic in program.semantic_diagnostics(file) {
                handler.report(diagnostic);
            }
        }

        Ok(())
    }

    fn create_file_emitter(&self) -> Result<FileEmitter, CompilationError> {
        let state = self.state.as_ref().ok_or(CompilationError::NotInitialized)?;
        let program = state.program.clone();
        let transformers = EmitTransformers::before(vec![
            Arc::new(JitResourceTransformer::new()) as Arc<dyn Transformer>,
            Arc::new(CtorParametersTransformer::new()),
        ]);

        Ok(FileEmitter::new(move |path| {
            let file = program.source_file(path)?;
            program.emit(&file, &transformers)
        }))
    }
}
