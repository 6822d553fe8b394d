//! Mock implementations for testing

use ngpack_core::cache::OutputFile;
use ngpack_core::fs::FileSystem;
use ngpack_core::stylesheets::{
    BundlerResolver, ImportOptions, RenderContext, RenderOptions, RenderOutput, ResolveError,
    SourceSpan, StylesheetError, StylesheetPreprocessor, StylesheetWarning,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ngpack_core::fs::lexical_join;

/// A tiny stylesheet language for tests.
///
/// * `$name: value;` lines declare variables, later `$name` uses are replaced
/// * `@import 'url';` and `@use 'url';` inline the resolved file
/// * `@error message` fails the render at that line
/// * `@output-file path` adds an empty asset to the render's resource files
/// * `@panic` panics the worker
///
/// Every render is recorded with the options it was given.
pub struct RecordingPreprocessor {
    file_system: Arc<dyn FileSystem>,
    delay: Option<Duration>,
    renders: Mutex<Vec<RenderOptions>>,
}

impl RecordingPreprocessor {
    pub fn new(file_system: Arc<dyn FileSystem>) -> Self {
        RecordingPreprocessor {
            file_system,
            delay: None,
            renders: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before each render, to keep workers busy
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn renders(&self) -> Vec<RenderOptions> {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn render_source(
        &self,
        source: &str,
        url: Option<&Path>,
        context: &mut RenderContext<'_>,
        state: &mut RenderState,
    ) -> Result<String, StylesheetError> {
        let mut css = String::new();

        for (index, line) in source.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed == "@panic" {
                panic!("stylesheet preprocessor panicked");
            }

            if let Some(message) = trimmed.strip_prefix("@error ") {
                return Err(StylesheetError::Render {
                    message: message.to_string(),
                    span: Some(SourceSpan {
                        url: url.map(Path::to_path_buf),
                        line: index + 1,
                        column: line.len() - line.trim_start().len(),
                        length: trimmed.len(),
                        line_text: Some(line.to_string()),
                    }),
                });
            }

            if let Some(asset) = trimmed.strip_prefix("@output-file ") {
                state.resource_files.push(OutputFile::new(asset.trim(), Vec::new()));
                continue;
            }

            if let Some((from_import, specifier)) = import_specifier(trimmed) {
                let options = ImportOptions {
                    from_import,
                    containing_url: url.map(Path::to_path_buf),
                };
                match context.resolve_import(specifier, options) {
                    Ok(Some(path)) => {
                        let imported = self.file_system.read_file(&path).map_err(|error| {
                            StylesheetError::Io {
                                path: path.clone(),
                                message: error.to_string(),
                            }
                        })?;
                        state.loaded.push(path.clone());
                        let rendered = self.render_source(&imported, Some(&path), context, state)?;
                        css.push_str(&rendered);
                    }
                    Ok(None) => {
                        context.warn(
                            StylesheetWarning::new(format!("Can't find stylesheet to import: {}", specifier))
                                .at(SourceSpan {
                                    url: url.map(Path::to_path_buf),
                                    line: index + 1,
                                    column: 0,
                                    length: trimmed.len(),
                                    line_text: Some(line.to_string()),
                                }),
                        );
                    }
                    Err(error) => return Err(StylesheetError::render(error.to_string())),
                }
                continue;
            }

            if let Some((name, value)) = variable_declaration(trimmed) {
                state.variables.insert(name.to_string(), value.to_string());
                continue;
            }

            let mut output = line.to_string();
            let mut names: Vec<&String> = state.variables.keys().collect();
            // Longest first, so `$ab` is not rewritten by `$a`
            names.sort_by_key(|name| std::cmp::Reverse(name.len()));
            for name in names {
                output = output.replace(&format!("${}", name), &state.variables[name]);
            }
            css.push_str(&output);
            css.push('\n');
        }

        Ok(css)
    }
}

impl StylesheetPreprocessor for RecordingPreprocessor {
    fn render(
        &self,
        source: &str,
        options: &RenderOptions,
        context: &mut RenderContext<'_>,
    ) -> Result<RenderOutput, StylesheetError> {
        self.renders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(options.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut state = RenderState {
            loaded: options.url.iter().cloned().collect(),
            ..Default::default()
        };
        let css = self.render_source(source, options.url.as_deref(), context, &mut state)?;

        let source_map = options.source_map.then(|| {
            let sources: Vec<String> = state
                .loaded
                .iter()
                .map(|path| format!("\"{}\"", path.display()))
                .collect();
            format!("{{\"version\":3,\"sources\":[{}],\"mappings\":\"\"}}", sources.join(","))
        });

        Ok(RenderOutput {
            css: css.trim_end().to_string(),
            source_map,
            loaded_urls: state.loaded,
            resource_files: state.resource_files,
        })
    }
}

#[derive(Default)]
struct RenderState {
    variables: FxHashMap<String, String>,
    loaded: Vec<PathBuf>,
    resource_files: Vec<OutputFile>,
}

fn import_specifier(line: &str) -> Option<(bool, &str)> {
    let (from_import, rest) = if let Some(rest) = line.strip_prefix("@import ") {
        (true, rest)
    } else {
        (false, line.strip_prefix("@use ")?)
    };
    let specifier = rest
        .trim()
        .trim_end_matches(';')
        .trim_matches(|c| c == '\'' || c == '"');
    Some((from_import, specifier))
}

fn variable_declaration(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('$')?;
    let (name, value) = rest.split_once(':')?;
    Some((name.trim(), value.trim().trim_end_matches(';').trim()))
}

/// Bundler resolution over a fixed set of files and packages
#[derive(Debug, Default)]
pub struct MapResolver {
    files: FxHashSet<PathBuf>,
    packages: FxHashMap<String, PathBuf>,
    failures: FxHashMap<String, String>,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into());
        self
    }

    pub fn with_package(mut self, specifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.packages.insert(specifier.into(), path.into());
        self
    }

    /// Resolving `specifier` fails with `message`
    pub fn with_failure(mut self, specifier: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(specifier.into(), message.into());
        self
    }

    /// Every `(specifier, resolve_dir)` asked so far
    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl BundlerResolver for MapResolver {
    fn resolve(&self, specifier: &str, resolve_dir: &Path) -> Result<Option<PathBuf>, ResolveError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((specifier.to_string(), resolve_dir.to_path_buf()));

        if let Some(message) = self.failures.get(specifier) {
            return Err(ResolveError::Failed {
                url: specifier.to_string(),
                message: message.clone(),
            });
        }

        let relative = specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/');
        if relative {
            let path = lexical_join(resolve_dir, specifier);
            return Ok(self.files.contains(&path).then_some(path));
        }
        Ok(self.packages.get(specifier).cloned())
    }
}
