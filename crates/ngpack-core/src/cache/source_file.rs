use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::load_result::LoadResultCache;
use crate::fs::{normalize_path, path_to_file_url};
use crate::program::SourceFile;

/// Per-stage caches that survive between builds, plus the set of files the
/// watcher reported as modified.
#[derive(Debug, Default)]
pub struct SourceFileCache {
    source_files: FxHashMap<PathBuf, Arc<SourceFile>>,
    modified_files: FxHashSet<PathBuf>,
    /// Post-transform JavaScript keyed by path
    javascript_output: FxHashMap<PathBuf, Vec<u8>>,
    /// Emitted TypeScript modules keyed by `file://` URL
    typescript_output: FxHashMap<String, Vec<u8>>,
    load_results: LoadResultCache,
    referenced_files: Vec<PathBuf>,
}

impl SourceFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<SourceFile>> {
        self.source_files.get(&normalize_path(path)).cloned()
    }

    pub fn insert(&mut self, file: Arc<SourceFile>) {
        self.source_files.insert(normalize_path(&file.path), file);
    }

    pub fn len(&self) -> usize {
        self.source_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_files.is_empty()
    }

    pub fn modified_files(&self) -> &FxHashSet<PathBuf> {
        &self.modified_files
    }

    /// Forget everything derived from `files` and mark them modified. The
    /// modified set afterwards holds exactly these files.
    pub fn invalidate<I, P>(&mut self, files: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.modified_files.clear();

        for file in files {
            let file = normalize_path(file.as_ref());
            self.javascript_output.remove(&file);
            self.typescript_output.remove(&path_to_file_url(&file));
            self.load_results.invalidate(&file);
            self.source_files.remove(&file);
            debug!(path = %file.display(), "Invalidated cached file");
            self.modified_files.insert(file);
        }
    }

    pub fn javascript_output(&self, path: &Path) -> Option<&[u8]> {
        self.javascript_output
            .get(&normalize_path(path))
            .map(Vec::as_slice)
    }

    pub fn set_javascript_output(&mut self, path: &Path, contents: Vec<u8>) {
        self.javascript_output.insert(normalize_path(path), contents);
    }

    pub fn typescript_output(&self, path: &Path) -> Option<&[u8]> {
        self.typescript_output
            .get(&path_to_file_url(path))
            .map(Vec::as_slice)
    }

    pub fn set_typescript_output(&mut self, path: &Path, contents: Vec<u8>) {
        self.typescript_output
            .insert(path_to_file_url(path), contents);
    }

    /// Drop the emitted module of `path`. Returns whether one was cached.
    pub fn remove_typescript_output(&mut self, path: &Path) -> bool {
        self.typescript_output.remove(&path_to_file_url(path)).is_some()
    }

    pub fn load_results(&self) -> &LoadResultCache {
        &self.load_results
    }

    pub fn load_results_mut(&mut self) -> &mut LoadResultCache {
        &mut self.load_results
    }

    pub fn referenced_files(&self) -> &[PathBuf] {
        &self.referenced_files
    }

    pub fn set_referenced_files(&mut self, files: Vec<PathBuf>) {
        self.referenced_files = files;
    }
}
