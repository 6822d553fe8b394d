//! Bundler-facing adapter
//!
//! The host bundler drives a [`CompilerPlugin`] through its build lifecycle:
//! `on_start` once per build, `on_load` for every requested module and
//! `on_end` with the output files. Everything the plugin keeps between builds
//! lives in the [`Container`].

mod resources;

pub use resources::{StylesheetResourceTransformer, StylesheetResult};

use indexmap::IndexSet;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, info_span, warn};

use crate::cache::{cached_load, load_cache_key, LoadResult, Loader, OutputFile};
use crate::compilation::{AotCompilation, Compilation, FileEmitter, JitCompilation, OptionsTransformer};
use crate::config::{CompilerOptions, PluginOptions, ScriptTarget};
use crate::di::Container;
use crate::diagnostics::{Diagnostic, Location, Message, MessageCollector, Note};
use crate::fs::{lexical_join, normalize_path};
use crate::program::{HostOptions, ProgramFactory, SourceParser};
use crate::stylesheets::{BundlerResolver, StylesheetLanguage};
use crate::transformers::{parse_jit_uri, JitResourceKind, JitResourceOrigin};

const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];
const JAVASCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];

/// The project the plugin compiles, as read from its configuration file
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub tsconfig: PathBuf,
    pub root_names: Vec<PathBuf>,
    /// Raw `compilerOptions` object
    pub compiler_options: serde_json::Value,
    /// Problems found while reading the configuration file
    pub diagnostics: Vec<Diagnostic>,
}

/// Messages published at the start of a build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildResult {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
}

impl BuildResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Default)]
struct SetupState {
    first_build: AtomicBool,
    warnings: Mutex<Vec<Message>>,
}

pub struct CompilerPlugin {
    container: Arc<Container>,
    parser: Arc<dyn SourceParser>,
    project: ProjectConfig,
    compilation: Box<dyn Compilation>,
    stylesheets: Arc<StylesheetResourceTransformer>,
    setup: Arc<SetupState>,
    emitter: Option<FileEmitter>,
    compiler_options: Option<CompilerOptions>,
}

impl CompilerPlugin {
    /// The compilation strategy follows the container's `jit` option
    pub fn new(
        container: Arc<Container>,
        factory: Arc<dyn ProgramFactory>,
        parser: Arc<dyn SourceParser>,
        project: ProjectConfig,
    ) -> Self {
        let setup = Arc::new(SetupState {
            first_build: AtomicBool::new(true),
            warnings: Mutex::new(Vec::new()),
        });
        let transformer = options_transformer(container.options().clone(), project.tsconfig.clone(), setup.clone());

        let compilation: Box<dyn Compilation> = if container.options().jit {
            Box::new(JitCompilation::new(factory).with_options_transformer(transformer))
        } else {
            Box::new(AotCompilation::new(factory).with_options_transformer(transformer))
        };

        let stylesheets = Arc::new(stylesheet_transformer(&container, None));

        CompilerPlugin {
            container,
            parser,
            project,
            compilation,
            stylesheets,
            setup,
            emitter: None,
            compiler_options: None,
        }
    }

    /// Resolve stylesheet imports through the bundler
    pub fn with_bundler_resolver(mut self, resolver: Arc<dyn BundlerResolver>) -> Self {
        self.stylesheets = Arc::new(stylesheet_transformer(&self.container, Some(resolver)));
        self
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Options the current program was created with
    pub fn compiler_options(&self) -> Option<&CompilerOptions> {
        self.compiler_options.as_ref()
    }

    /// Create the program for the current sources and publish its
    /// diagnostics. Fatal errors become a single message and leave the
    /// previous emitter out of service.
    pub fn on_start(&mut self) -> BuildResult {
        let _span = info_span!("build_start", jit = self.container.options().jit).entered();
        let mut result = BuildResult::default();

        self.stylesheets.reset();
        self.emitter = None;

        let options = self.container.options();
        let mut host_options = HostOptions::new(self.container.file_system().clone(), self.parser.clone());
        host_options.file_replacements = options
            .file_replacements
            .iter()
            .map(|(from, to)| (normalize_path(from), normalize_path(to)))
            .collect();
        host_options.source_file_cache = self.container.source_file_cache().cloned();
        host_options.resource_transformer = Some(self.stylesheets.clone());
        if let Some(cache) = self.container.source_file_cache() {
            host_options.modified_files = lock(cache).modified_files().clone();
        }

        let initialized = self.compilation.initialize(
            &self.project.root_names,
            &self.project.compiler_options,
            host_options,
            self.project.diagnostics.clone(),
        );
        let initialized = match initialized {
            Ok(initialized) => initialized,
            Err(error) => {
                warn!(%error, "Compilation failed to initialize");
                result.errors.push(Message::text(error.to_string()));
                return result;
            }
        };
        info!(affected = initialized.affected_files.len(), "Compilation initialized");

        if let Some(cache) = self.container.source_file_cache() {
            let mut cache = lock(cache);
            let mut evicted = 0;
            for path in initialized.affected_files.paths() {
                if cache.remove_typescript_output(&path) {
                    evicted += 1;
                }
            }
            if evicted > 0 {
                debug!(evicted, "Dropped emitted output of affected files");
            }
        }
        self.compiler_options = Some(initialized.compiler_options);

        if self.setup.first_build.swap(false, Ordering::SeqCst) {
            result.warnings.append(&mut lock(&self.setup.warnings));
        }

        let collector = MessageCollector::new();
        if let Err(error) = self.compilation.collect_diagnostics(&collector) {
            result.errors.push(Message::text(error.to_string()));
        }
        let (errors, warnings) = collector.into_messages();
        result.errors.extend(errors);
        result.warnings.extend(warnings);
        result.warnings.extend(self.stylesheets.take_warnings());

        match self.compilation.create_file_emitter() {
            Ok(emitter) => self.emitter = Some(emitter),
            Err(error) => result.errors.push(Message::text(error.to_string())),
        }

        if let Some(cache) = self.container.source_file_cache() {
            let mut referenced: IndexSet<PathBuf> = initialized.referenced_files.into_iter().collect();
            referenced.extend(self.stylesheets.referenced_files());
            lock(cache).set_referenced_files(referenced.into_iter().collect());
        }

        debug!(
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Build start finished"
        );
        result
    }

    /// Serve a TypeScript or JavaScript module. `None` for other paths.
    pub fn on_load(&self, path: &Path, side_effects: Option<bool>) -> Option<LoadResult> {
        if has_extension(path, TYPESCRIPT_EXTENSIONS) {
            return Some(self.load_program_file(path));
        }

        if !has_extension(path, JAVASCRIPT_EXTENSIONS) {
            return None;
        }

        let allow_js = self.compiler_options.as_ref().map(|o| o.allow_js).unwrap_or(false);
        if allow_js && self.emitter.as_ref().is_some_and(|e| e.emit(path).is_some()) {
            return Some(self.load_program_file(path));
        }
        Some(self.load_javascript(path, side_effects))
    }

    /// Serve a virtual resource module created by the JIT resource
    /// transformer. `resolve_dir` is the directory of the importing file.
    pub fn on_load_virtual(&self, specifier: &str, resolve_dir: &Path) -> Option<LoadResult> {
        let resource = parse_jit_uri(specifier)?;
        let cache = self.container.source_file_cache().map(|cache| cache.as_ref());

        let result = match (resource.kind, resource.origin) {
            (kind, JitResourceOrigin::File) => {
                let path = normalize_path(&lexical_join(resolve_dir, &resource.specifier));
                let namespace = format!("angular:jit:{}", kind);
                let key = load_cache_key(&namespace, &path.to_string_lossy());
                cached_load(cache, &key, || Ok::<_, Infallible>(Some(self.load_resource_file(kind, &path))))
            }
            (kind, JitResourceOrigin::Inline) => {
                let Some(contents) = resource.inline_contents() else {
                    return Some(error_result(Message::text(format!(
                        "Invalid inline {} resource '{}'",
                        kind, resource.specifier
                    ))));
                };
                Ok(Some(match kind {
                    JitResourceKind::Template => LoadResult::new(contents, Loader::Text),
                    JitResourceKind::Style => self.render_style(&contents, None, &resolve_dir.join("inline")),
                }))
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(never) => match never {},
        };
        if let Some(result) = &result {
            self.stylesheets.add_resource_files(&result.resource_files);
        }
        result
    }

    /// Add the stylesheet resource files collected during this build
    pub fn on_end(&self, output_files: &mut Vec<OutputFile>) {
        let resource_files = self.stylesheets.take_resource_files();
        if !resource_files.is_empty() {
            debug!(count = resource_files.len(), "Adding stylesheet resource files");
        }
        output_files.extend(resource_files);
    }

    /// Forget results derived from changed files before the next build
    pub fn invalidate<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.container.invalidate(paths);
    }

    /// Files the bundler should watch: program sources, their resources and
    /// everything cached load results depend on
    pub fn watch_files(&self) -> Vec<PathBuf> {
        let Some(cache) = self.container.source_file_cache() else {
            return Vec::new();
        };
        let cache = lock(cache);
        let mut files: IndexSet<PathBuf> = cache.referenced_files().iter().cloned().collect();
        files.extend(cache.load_results().watch_files());
        files.into_iter().collect()
    }

    /// Terminate the worker pools
    pub fn dispose(&self) {
        self.container.shutdown();
    }

    fn load_program_file(&self, path: &Path) -> LoadResult {
        let request = normalize_path(path);
        let file = self.resolve_replacement(&request);
        let cache = self.container.source_file_cache();

        if let Some(contents) = cache.and_then(|cache| lock(cache).typescript_output(&file).map(<[u8]>::to_vec)) {
            return javascript_result(contents);
        }

        let Some(emitter) = &self.emitter else {
            return error_result(file_message("Compilation has not been initialized".to_string(), &request));
        };

        let Some(output) = emitter.emit(&file) else {
            return error_result(missing_file_message(&request, &file));
        };

        let transformed = self
            .container
            .javascript_transformer()
            .transform_data(&file, &output.content, true, None)
            .wait();
        match transformed {
            Ok(contents) => {
                if let Some(cache) = cache {
                    lock(cache).set_typescript_output(&file, contents.clone());
                }
                javascript_result(contents)
            }
            Err(error) => error_result(file_message(error.to_string(), &file)),
        }
    }

    fn load_javascript(&self, path: &Path, side_effects: Option<bool>) -> LoadResult {
        let path = normalize_path(path);
        let cache = self.container.source_file_cache();

        if let Some(contents) = cache.and_then(|cache| lock(cache).javascript_output(&path).map(<[u8]>::to_vec)) {
            return javascript_result(contents);
        }

        let transformed = self
            .container
            .javascript_transformer()
            .transform_file(&path, false, side_effects)
            .wait();
        match transformed {
            Ok(contents) => {
                if let Some(cache) = cache {
                    lock(cache).set_javascript_output(&path, contents.clone());
                }
                javascript_result(contents)
            }
            Err(error) => error_result(file_message(error.to_string(), &path)),
        }
    }

    fn load_resource_file(&self, kind: JitResourceKind, path: &Path) -> LoadResult {
        let data = match self.container.file_system().read_file(path) {
            Ok(data) => data,
            Err(error) => {
                return error_result(file_message(
                    format!("Could not read {} resource '{}': {}", kind, path.display(), error),
                    path,
                ))
            }
        };

        match kind {
            JitResourceKind::Template => {
                LoadResult::new(data, Loader::Text).with_watch_files(vec![path.to_path_buf()])
            }
            JitResourceKind::Style => self.render_style(&data, Some(path), path),
        }
    }

    fn render_style(&self, data: &str, stylesheet_file: Option<&Path>, containing_file: &Path) -> LoadResult {
        match self.stylesheets.render(data, stylesheet_file, containing_file) {
            Ok(rendered) => {
                let mut watch_files: IndexSet<PathBuf> = stylesheet_file.map(Path::to_path_buf).into_iter().collect();
                watch_files.extend(rendered.loaded_urls);

                let mut result = LoadResult::new(rendered.css, Loader::Text)
                    .with_watch_files(watch_files.into_iter().collect());
                result.warnings = rendered.warnings;
                result.resource_files = rendered.resource_files;
                result
            }
            Err(error) => {
                let mut result = error_result(error.to_message(stylesheet_file));
                result.watch_files = stylesheet_file.map(Path::to_path_buf).into_iter().collect();
                result
            }
        }
    }

    fn resolve_replacement(&self, path: &Path) -> PathBuf {
        self.container
            .options()
            .file_replacements
            .iter()
            .find(|(from, _)| normalize_path(from) == path)
            .map(|(_, to)| normalize_path(to))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

fn stylesheet_transformer(
    container: &Container,
    resolver: Option<Arc<dyn BundlerResolver>>,
) -> StylesheetResourceTransformer {
    let options = container.options();
    let inline_language = StylesheetLanguage::from_extension(&options.inline_style_language.to_ascii_lowercase())
        .unwrap_or(StylesheetLanguage::Css);
    let transformer =
        StylesheetResourceTransformer::new(container.stylesheet_pools().clone(), inline_language, options.sourcemap);
    match resolver {
        Some(resolver) => transformer.with_resolver(resolver),
        None => transformer,
    }
}

/// Adjust the project's compiler options to what the build pipeline expects
fn options_transformer(plugin: Arc<PluginOptions>, tsconfig: PathBuf, setup: Arc<SetupState>) -> OptionsTransformer {
    Arc::new(move |mut options: CompilerOptions| {
        if options.target.map_or(true, |target| target < ScriptTarget::Es2022) {
            options.target = Some(ScriptTarget::Es2022);
            options.use_define_for_class_fields.get_or_insert(false);

            if setup.first_build.load(Ordering::SeqCst) {
                let message = Message {
                    text: "TypeScript compiler options 'target' and 'useDefineForClassFields' are set to 'ES2022' and 'false' respectively by the build.".to_string(),
                    location: Some(Location::file(tsconfig.clone())),
                    notes: vec![Note::text(
                        "To control ECMA version and features use the Browserslist configuration.",
                    )],
                };
                let mut warnings = lock(&setup.warnings);
                if !warnings.contains(&message) {
                    warnings.push(message);
                }
            }
        }

        options.no_emit_on_error = false;
        options.inline_sources = plugin.sourcemap;
        options.inline_source_map = plugin.sourcemap;
        options.source_map = false;
        options.declaration = false;
        options.preserve_symlinks = plugin.preserve_symlinks;
        options
    })
}

fn missing_file_message(request: &Path, file: &Path) -> Message {
    let mut message = file_message(
        format!("File '{}' is missing from the TypeScript compilation.", file.display()),
        file,
    )
    .with_note(Note::text(
        "Ensure the file is part of the TypeScript program via the 'files' or 'include' property.",
    ));

    if request != file {
        message = message.with_note(Note::text(format!(
            "File is requested from a file replacement of '{}'.",
            request.display()
        )));
    }
    message
}

fn file_message(text: String, file: &Path) -> Message {
    Message {
        text,
        location: Some(Location::file(file)),
        notes: Vec::new(),
    }
}

fn error_result(message: Message) -> LoadResult {
    LoadResult {
        errors: vec![message],
        ..Default::default()
    }
}

fn javascript_result(contents: Vec<u8>) -> LoadResult {
    let contents = match String::from_utf8(contents) {
        Ok(contents) => contents,
        Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
    };
    LoadResult::new(contents, Loader::Js)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext))
        .unwrap_or(false)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
