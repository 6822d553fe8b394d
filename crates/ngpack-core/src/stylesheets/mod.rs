//! Stylesheet preprocessing on dedicated worker threads
//!
//! Preprocessors run on their own threads because rendering is synchronous
//! and CPU bound. Import resolution still needs the bundler, which lives on
//! the coordinating side, so every worker is paired with an importer bridge
//! (see [`bridge`]) that lets the render block until an import is resolved.

pub mod bridge;
pub mod importer;
pub mod pool;

use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::cache::OutputFile;
use crate::diagnostics::{Location, Message, Note};

pub use bridge::{importer_bridge, ImportRequest, ImportResponse, ImporterSignal};
pub use importer::{BundlerResolver, BundlerStylesheetImporter};
pub use pool::{RenderTask, StylesheetWorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StylesheetLanguage {
    Css,
    Scss,
    Sass,
    Less,
}

impl StylesheetLanguage {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&extension)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "css" => Some(StylesheetLanguage::Css),
            "scss" => Some(StylesheetLanguage::Scss),
            "sass" => Some(StylesheetLanguage::Sass),
            "less" => Some(StylesheetLanguage::Less),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StylesheetLanguage::Css => "css",
            StylesheetLanguage::Scss => "scss",
            StylesheetLanguage::Sass => "sass",
            StylesheetLanguage::Less => "less",
        }
    }
}

impl fmt::Display for StylesheetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location inside a stylesheet, as reported by a preprocessor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub url: Option<PathBuf>,
    /// 1-based
    pub line: usize,
    /// 0-based
    pub column: usize,
    pub length: usize,
    pub line_text: Option<String>,
}

impl SourceSpan {
    fn to_location(&self, fallback: Option<&Path>) -> Option<Location> {
        let file = self.url.as_deref().or(fallback)?;
        Some(Location {
            file: file.to_path_buf(),
            line: Some(self.line),
            column: Some(self.column),
            length: Some(self.length),
            line_text: self.line_text.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetWarning {
    pub message: String,
    pub span: Option<SourceSpan>,
    pub deprecation: bool,
    pub stack: Option<String>,
}

impl StylesheetWarning {
    pub fn new(message: impl Into<String>) -> Self {
        StylesheetWarning {
            message: message.into(),
            span: None,
            deprecation: false,
            stack: None,
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn to_message(&self, file: Option<&Path>) -> Message {
        let mut message = Message::text(&self.message);
        message.location = self.span.as_ref().and_then(|span| span.to_location(file));
        if let Some(stack) = &self.stack {
            message.notes.push(Note::text(stack.clone()));
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StylesheetError {
    #[error("{message}")]
    Render {
        message: String,
        span: Option<SourceSpan>,
    },

    #[error("Failed to read '{}': {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Stylesheet worker pool was terminated")]
    Terminated,

    #[error("Stylesheet worker produced no result")]
    NoResult,

    #[error("No preprocessor registered for {0} stylesheets")]
    UnsupportedLanguage(StylesheetLanguage),

    #[error("Failed to start stylesheet worker: {0}")]
    Spawn(String),
}

impl StylesheetError {
    pub fn render(message: impl Into<String>) -> Self {
        StylesheetError::Render {
            message: message.into(),
            span: None,
        }
    }

    pub fn to_message(&self, file: Option<&Path>) -> Message {
        let mut message = Message::text(self.to_string());
        message.location = match self {
            StylesheetError::Render {
                span: Some(span), ..
            } => span.to_location(file),
            StylesheetError::Io { path, .. } => Some(Location::file(path.clone())),
            _ => None,
        };
        message
    }
}

/// Failure to resolve an import. Distinct from `Ok(None)`, which means the
/// resolver had no answer and the preprocessor should try its own lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Failed to resolve '{url}': {message}")]
    Failed { url: String, message: String },

    #[error("Import resolution was terminated")]
    Terminated,
}

/// How an import was requested
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// `@import` as opposed to `@use`/`@forward`
    pub from_import: bool,
    /// Stylesheet that contains the import, when known
    pub containing_url: Option<PathBuf>,
}

/// Resolves imports on the coordinating side
pub trait ImportResolver: Send + Sync {
    /// `previous_resolved_modules` holds directories of files already
    /// resolved during the same render.
    fn resolve(
        &self,
        url: &str,
        options: &ImportOptions,
        previous_resolved_modules: &[PathBuf],
    ) -> Result<Option<PathBuf>, ResolveError>;
}

/// Receives warnings of a finished render on the coordinating side
pub trait RenderLogger: Send + Sync {
    fn warn(&self, warning: &StylesheetWarning);
}

/// Collects warnings into a list
#[derive(Debug, Default)]
pub struct CollectingRenderLogger {
    warnings: Mutex<Vec<StylesheetWarning>>,
}

impl CollectingRenderLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<StylesheetWarning> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

impl RenderLogger for CollectingRenderLogger {
    fn warn(&self, warning: &StylesheetWarning) {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(warning.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub language: StylesheetLanguage,
    /// File being rendered; `None` for inline styles
    pub url: Option<PathBuf>,
    pub load_paths: Vec<PathBuf>,
    pub source_map: bool,
}

impl RenderOptions {
    pub fn new(language: StylesheetLanguage) -> Self {
        RenderOptions {
            language,
            url: None,
            load_paths: Vec::new(),
            source_map: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<PathBuf>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderOutput {
    pub css: String,
    pub source_map: Option<String>,
    /// Every file read while rendering, including the entry file
    pub loaded_urls: Vec<PathBuf>,
    /// Assets referenced by the stylesheet that must be written next to it
    pub resource_files: Vec<OutputFile>,
}

/// Per-render handle given to a preprocessor on its worker thread
pub struct RenderContext<'a> {
    id: u64,
    importer: Option<&'a bridge::WorkerImporterPort>,
    warnings: Vec<StylesheetWarning>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(id: u64, importer: Option<&'a bridge::WorkerImporterPort>) -> Self {
        RenderContext {
            id,
            importer,
            warnings: Vec::new(),
        }
    }

    /// A context without an importer, for rendering outside a pool
    pub fn detached() -> RenderContext<'static> {
        RenderContext {
            id: 0,
            importer: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_importer(&self) -> bool {
        self.importer.is_some()
    }

    /// Block until the coordinator resolves `url`. Without an importer the
    /// answer is always `Ok(None)`.
    pub fn resolve_import(&self, url: &str, options: ImportOptions) -> Result<Option<PathBuf>, ResolveError> {
        match self.importer {
            Some(port) => port.resolve(self.id, url, options),
            None => Ok(None),
        }
    }

    pub fn warn(&mut self, warning: StylesheetWarning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[StylesheetWarning] {
        &self.warnings
    }

    pub(crate) fn into_warnings(self) -> Vec<StylesheetWarning> {
        self.warnings
    }
}

/// A stylesheet language implementation. Runs on worker threads.
pub trait StylesheetPreprocessor: Send + Sync {
    fn render(
        &self,
        source: &str,
        options: &RenderOptions,
        context: &mut RenderContext<'_>,
    ) -> Result<RenderOutput, StylesheetError>;
}

/// One lazily created worker pool per registered language
pub struct StylesheetPools {
    max_workers: usize,
    preprocessors: FxHashMap<StylesheetLanguage, Arc<dyn StylesheetPreprocessor>>,
    pools: Mutex<FxHashMap<StylesheetLanguage, Arc<StylesheetWorkerPool>>>,
}

impl StylesheetPools {
    pub fn new(max_workers: usize) -> Self {
        StylesheetPools {
            max_workers: max_workers.max(1),
            preprocessors: FxHashMap::default(),
            pools: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn with_preprocessor(
        mut self,
        language: StylesheetLanguage,
        preprocessor: Arc<dyn StylesheetPreprocessor>,
    ) -> Self {
        self.preprocessors.insert(language, preprocessor);
        self
    }

    pub fn supports(&self, language: StylesheetLanguage) -> bool {
        language == StylesheetLanguage::Css || self.preprocessors.contains_key(&language)
    }

    /// Render `source`. Plain CSS without a registered preprocessor is
    /// returned unchanged.
    pub fn render(
        &self,
        source: &str,
        options: RenderOptions,
        importer: Option<Arc<dyn ImportResolver>>,
        logger: Option<Arc<dyn RenderLogger>>,
    ) -> Result<RenderOutput, StylesheetError> {
        let language = options.language;
        let Some(pool) = self.pool(language)? else {
            return Ok(RenderOutput {
                css: source.to_string(),
                loaded_urls: options.url.into_iter().collect(),
                ..Default::default()
            });
        };
        pool.render(source, options, importer, logger)?.wait()
    }

    /// Terminate every pool. Pools are recreated on the next render.
    pub fn close(&self) {
        let pools: Vec<_> = self
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .collect();
        for (language, pool) in pools {
            debug!(%language, "Closing stylesheet worker pool");
            pool.close();
        }
    }

    fn pool(&self, language: StylesheetLanguage) -> Result<Option<Arc<StylesheetWorkerPool>>, StylesheetError> {
        let Some(preprocessor) = self.preprocessors.get(&language) else {
            if language == StylesheetLanguage::Css {
                return Ok(None);
            }
            return Err(StylesheetError::UnsupportedLanguage(language));
        };

        let mut pools = self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let pool = pools.entry(language).or_insert_with(|| {
            Arc::new(StylesheetWorkerPool::new(
                language,
                preprocessor.clone(),
                self.max_workers,
            ))
        });
        Ok(Some(pool.clone()))
    }
}

impl Drop for StylesheetPools {
    fn drop(&mut self) {
        self.close();
    }
}
