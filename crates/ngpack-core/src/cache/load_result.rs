use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::SourceFileCache;
use crate::diagnostics::Message;
use crate::fs::normalize_path;

/// How the bundler should interpret loaded contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Js,
    Ts,
    Css,
    Text,
    Empty,
}

/// Result of a load hook
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub contents: Option<String>,
    pub loader: Option<Loader>,
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    pub watch_files: Vec<PathBuf>,
    /// Assets produced while loading, added to the build output each time
    /// the result is served
    #[serde(skip)]
    pub resource_files: Vec<OutputFile>,
}

impl LoadResult {
    pub fn new(contents: impl Into<String>, loader: Loader) -> Self {
        LoadResult {
            contents: Some(contents.into()),
            loader: Some(loader),
            ..Default::default()
        }
    }

    pub fn with_watch_files(mut self, files: Vec<PathBuf>) -> Self {
        self.watch_files = files;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A file added to the bundler's output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        OutputFile {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Cache key of a load: the plain path for the `file` namespace, otherwise
/// `namespace:path`
pub fn load_cache_key(namespace: &str, path: &str) -> String {
    if namespace == "file" {
        path.to_string()
    } else {
        format!("{}:{}", namespace, path)
    }
}

/// Load results keyed by load key, with a reverse index from watched files to
/// the keys depending on them
#[derive(Debug, Default)]
pub struct LoadResultCache {
    results: IndexMap<String, LoadResult>,
    file_dependencies: FxHashMap<PathBuf, FxHashSet<String>>,
}

impl LoadResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&LoadResult> {
        self.results.get(key)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Store `result` under `key`, replacing any previous entry and its
    /// watch links. Watch files are stored with forward slashes.
    pub fn put(&mut self, key: impl Into<String>, mut result: LoadResult) {
        let key = key.into();
        result.watch_files = result.watch_files.iter().map(|file| normalize_path(file)).collect();
        if let Some(previous) = self.results.get(&key) {
            let stale: Vec<PathBuf> = previous.watch_files.clone();
            for file in stale {
                self.unlink(&file, &key);
            }
        }

        for file in &result.watch_files {
            self.file_dependencies
                .entry(file.clone())
                .or_default()
                .insert(key.clone());
        }
        self.results.insert(key, result);
    }

    /// Evict every result watching `path` and the result stored directly at
    /// `path`. Returns whether anything was evicted.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let path = normalize_path(path);
        let mut found = false;

        if let Some(dependents) = self.file_dependencies.remove(&path) {
            for key in dependents {
                if self.remove_entry(&key) {
                    found = true;
                }
            }
        }

        let direct = path.to_string_lossy();
        if self.remove_entry(&direct) {
            found = true;
        }

        if found {
            debug!(path = %path.display(), "Evicted cached load results");
        }
        found
    }

    /// Cached keys followed by every watched file
    pub fn watch_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.results.keys().map(PathBuf::from).collect();
        let mut watched: Vec<&PathBuf> = self.file_dependencies.keys().collect();
        watched.sort();
        files.extend(watched.into_iter().cloned());
        files
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.file_dependencies.clear();
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.results.shift_remove(key) {
            Some(result) => {
                for file in &result.watch_files {
                    self.unlink(file, key);
                }
                true
            }
            None => false,
        }
    }

    fn unlink(&mut self, file: &Path, key: &str) {
        if let Some(keys) = self.file_dependencies.get_mut(file) {
            keys.remove(key);
            if keys.is_empty() {
                self.file_dependencies.remove(file);
            }
        }
    }
}

/// Run `loader` unless `key` is cached. Results that are `None` or carry
/// errors are returned but not stored. The cache lock is not held while the
/// loader runs.
pub fn cached_load<E>(
    cache: Option<&Mutex<SourceFileCache>>,
    key: &str,
    loader: impl FnOnce() -> Result<Option<LoadResult>, E>,
) -> Result<Option<LoadResult>, E> {
    let Some(cache) = cache else {
        return loader();
    };

    let hit = cache
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .load_results()
        .get(key)
        .cloned();
    if let Some(result) = hit {
        debug!(key, "Load result cache hit");
        return Ok(Some(result));
    }

    let result = loader()?;
    if let Some(result) = &result {
        if !result.has_errors() {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .load_results_mut()
                .put(key, result.clone());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css(contents: &str, watch: &[&str]) -> LoadResult {
        LoadResult::new(contents, Loader::Css)
            .with_watch_files(watch.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn test_load_cache_key() {
        assert_eq!(load_cache_key("file", "/src/a.ts"), "/src/a.ts");
        assert_eq!(
            load_cache_key("angular:styles", "/src/a.scss"),
            "angular:styles:/src/a.scss"
        );
    }

    #[test]
    fn test_invalidate_evicts_every_watcher() {
        let mut cache = LoadResultCache::new();
        cache.put("style:a", css("a{}", &["/src/a.scss", "/src/_vars.scss"]));
        cache.put("style:b", css("b{}", &["/src/b.scss", "/src/_vars.scss"]));
        cache.put("style:c", css("c{}", &["/src/c.scss"]));

        assert!(cache.invalidate(Path::new("/src/_vars.scss")));

        assert!(cache.get("style:a").is_none());
        assert!(cache.get("style:b").is_none());
        assert!(cache.get("style:c").is_some());
    }

    #[test]
    fn test_invalidate_unrelated_path_evicts_nothing() {
        let mut cache = LoadResultCache::new();
        cache.put("style:a", css("a{}", &["/src/a.scss"]));

        assert!(!cache.invalidate(Path::new("/src/other.scss")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_direct_entry() {
        let mut cache = LoadResultCache::new();
        cache.put("/src/a.html", LoadResult::new("<p></p>", Loader::Text));

        assert!(cache.invalidate(Path::new("/src/a.html")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_replaces_watch_links() {
        let mut cache = LoadResultCache::new();
        cache.put("style:a", css("a{}", &["/src/old.scss"]));
        cache.put("style:a", css("a{}", &["/src/new.scss"]));

        assert!(!cache.invalidate(Path::new("/src/old.scss")));
        assert!(cache.invalidate(Path::new("/src/new.scss")));
    }

    #[test]
    fn test_backslash_watch_files_are_normalized() {
        let mut cache = LoadResultCache::new();
        cache.put("style:a", css("a{}", &["C:\\src\\a.scss", "C:\\src\\_vars.scss"]));

        assert_eq!(
            cache.get("style:a").map(|result| result.watch_files.clone()),
            Some(vec![PathBuf::from("C:/src/a.scss"), PathBuf::from("C:/src/_vars.scss")])
        );
        assert!(cache.invalidate(Path::new("C:/src/_vars.scss")));
        assert!(cache.is_empty());

        cache.put("style:b", css("b{}", &["C:/src/b.scss"]));
        assert!(cache.invalidate(Path::new("C:\\src\\b.scss")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_watch_files_lists_keys_and_dependencies() {
        let mut cache = LoadResultCache::new();
        cache.put("/src/a.html", css("", &["/src/a.scss"]));

        assert_eq!(
            cache.watch_files(),
            vec![PathBuf::from("/src/a.html"), PathBuf::from("/src/a.scss")]
        );
    }

    #[test]
    fn test_cached_load_skips_errors_and_none() {
        let cache = Mutex::new(SourceFileCache::new());
        let mut calls = 0;

        let mut failing = || {
            calls += 1;
            let mut result = LoadResult::new("", Loader::Css);
            result.errors.push(Message::text("broken"));
            Ok::<_, ()>(Some(result))
        };
        cached_load(Some(&cache), "k", &mut failing).unwrap();
        cached_load(Some(&cache), "k", &mut failing).unwrap();
        assert_eq!(calls, 2);

        let none = cached_load(Some(&cache), "n", || Ok::<_, ()>(None)).unwrap();
        assert!(none.is_none());
        assert!(cache.lock().unwrap().load_results().is_empty());
    }

    #[test]
    fn test_cached_load_hits_skip_loader() {
        let cache = Mutex::new(SourceFileCache::new());

        let first = cached_load(Some(&cache), "k", || {
            Ok::<_, ()>(Some(LoadResult::new("a{}", Loader::Css)))
        })
        .unwrap();
        let second = cached_load(Some(&cache), "k", || -> Result<Option<LoadResult>, ()> {
            panic!("loader must not run on a cache hit")
        })
        .unwrap();

        assert_eq!(first, second);
    }
}
