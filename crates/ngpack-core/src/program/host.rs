use rustc_hash::{FxHashMap, FxHashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{SourceFile, SourceParser};
use crate::cache::SourceFileCache;
use crate::fs::{normalize_path, FileSystem};
use crate::stylesheets::StylesheetError;

const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];
const STYLESHEET_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less"];

/// Preprocesses component stylesheets read by the framework compiler
pub trait ResourceTransformer: Send + Sync {
    /// `Ok(None)` leaves the data unchanged
    fn transform_stylesheet(
        &self,
        data: &str,
        containing_file: &Path,
        stylesheet_file: Option<&Path>,
    ) -> Result<Option<String>, StylesheetError>;
}

/// Everything a compiler host needs from the plugin for one build
#[derive(Clone)]
pub struct HostOptions {
    pub file_system: Arc<dyn FileSystem>,
    pub parser: Arc<dyn SourceParser>,
    pub file_replacements: FxHashMap<PathBuf, PathBuf>,
    pub modified_files: FxHashSet<PathBuf>,
    pub source_file_cache: Option<Arc<Mutex<SourceFileCache>>>,
    pub resource_transformer: Option<Arc<dyn ResourceTransformer>>,
}

impl HostOptions {
    pub fn new(file_system: Arc<dyn FileSystem>, parser: Arc<dyn SourceParser>) -> Self {
        HostOptions {
            file_system,
            parser,
            file_replacements: FxHashMap::default(),
            modified_files: FxHashSet::default(),
            source_file_cache: None,
            resource_transformer: None,
        }
    }
}

/// File access for the type checker. Parsed files are shared through the
/// source-file cache so unchanged files keep their identity across builds.
pub struct CompilerHost {
    options: HostOptions,
    cache: Arc<Mutex<SourceFileCache>>,
}

impl CompilerHost {
    pub fn new(options: HostOptions) -> Self {
        let cache = options
            .source_file_cache
            .clone()
            .unwrap_or_else(|| Arc::new(Mutex::new(SourceFileCache::new())));
        CompilerHost { options, cache }
    }

    /// Path actually loaded for `path` after file replacements
    pub fn resolve_replacement(&self, path: &Path) -> PathBuf {
        let normalized = normalize_path(path);
        self.options
            .file_replacements
            .get(&normalized)
            .map(|replacement| normalize_path(replacement))
            .unwrap_or(normalized)
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.options
            .file_system
            .exists(&self.resolve_replacement(path))
    }

    pub fn read_file(&self, path: &Path) -> io::Result<String> {
        self.options
            .file_system
            .read_file(&self.resolve_replacement(path))
    }

    /// Parsed file for `path`. A replaced file is loaded in place of the
    /// requested one and carries the replacement's path.
    pub fn get_source_file(&self, path: &Path) -> io::Result<Arc<SourceFile>> {
        let target = self.resolve_replacement(path);

        if let Some(file) = self.lock_cache().get(&target) {
            return Ok(file);
        }

        let text = self.options.file_system.read_file(&target)?;
        let module = self.options.parser.parse(&target, &text);
        let file = Arc::new(SourceFile::new(target.clone(), text, module));
        debug!(path = %target.display(), version = %file.version, "Parsed source file");

        self.lock_cache().insert(file.clone());
        Ok(file)
    }

    pub fn modified_files(&self) -> &FxHashSet<PathBuf> {
        &self.options.modified_files
    }

    /// Modified files that are not TypeScript sources (templates, styles)
    pub fn modified_resource_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .options
            .modified_files
            .iter()
            .filter(|path| !has_extension(path, TYPESCRIPT_EXTENSIONS))
            .cloned()
            .collect();
        files.sort();
        files
    }

    /// Read a component resource. Stylesheets go through the resource
    /// transformer when one is configured.
    pub fn read_resource(&self, path: &Path, containing_file: &Path) -> Result<String, StylesheetError> {
        let data = self
            .options
            .file_system
            .read_file(path)
            .map_err(|error| StylesheetError::Io {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;

        match &self.options.resource_transformer {
            Some(transformer) if has_extension(path, STYLESHEET_EXTENSIONS) => Ok(transformer
                .transform_stylesheet(&data, containing_file, Some(path))?
                .unwrap_or(data)),
            _ => Ok(data),
        }
    }

    /// Preprocess an inline component style
    pub fn transform_inline_style(&self, data: &str, containing_file: &Path) -> Result<String, StylesheetError> {
        match &self.options.resource_transformer {
            Some(transformer) => Ok(transformer
                .transform_stylesheet(data, containing_file, None)?
                .unwrap_or_else(|| data.to_string())),
            None => Ok(data.to_string()),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, SourceFileCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
