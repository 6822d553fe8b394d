use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{ImportOptions, ImportResolver, ResolveError, StylesheetLanguage};

/// Module resolution of the host bundler
pub trait BundlerResolver: Send + Sync {
    /// Resolve `specifier` from `resolve_dir`. Relative specifiers start with
    /// `./`, `../` or `/`; anything else is a package specifier.
    fn resolve(&self, specifier: &str, resolve_dir: &Path) -> Result<Option<PathBuf>, ResolveError>;
}

/// Resolves stylesheet imports with the preprocessor lookup rules on top of
/// the bundler's resolution
pub struct BundlerStylesheetImporter {
    resolver: Arc<dyn BundlerResolver>,
    resolve_dir: PathBuf,
    extensions: &'static [&'static str],
}

impl BundlerStylesheetImporter {
    pub fn new(resolver: Arc<dyn BundlerResolver>, resolve_dir: impl Into<PathBuf>, language: StylesheetLanguage) -> Self {
        let extensions: &'static [&'static str] = match language {
            StylesheetLanguage::Less => &["less", "css"],
            StylesheetLanguage::Css => &["css"],
            StylesheetLanguage::Scss | StylesheetLanguage::Sass => &["scss", "sass", "css"],
        };
        BundlerStylesheetImporter {
            resolver,
            resolve_dir: resolve_dir.into(),
            extensions,
        }
    }

    /// Directories searched for relative lookups, deduplicated in order
    fn search_directories(&self, options: &ImportOptions, previous: &[PathBuf]) -> Vec<PathBuf> {
        let containing = options
            .containing_url
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let mut directories: Vec<PathBuf> = Vec::new();
        for directory in containing
            .into_iter()
            .chain(std::iter::once(self.resolve_dir.clone()))
            .chain(previous.iter().cloned())
        {
            if !directories.contains(&directory) {
                directories.push(directory);
            }
        }
        directories
    }
}

impl ImportResolver for BundlerStylesheetImporter {
    fn resolve(
        &self,
        url: &str,
        options: &ImportOptions,
        previous_resolved_modules: &[PathBuf],
    ) -> Result<Option<PathBuf>, ResolveError> {
        let url = url.strip_prefix("file://").unwrap_or(url);
        // Webpack-style package prefix
        let url = url.strip_prefix('~').unwrap_or(url);
        let candidates = import_candidates(url, options.from_import, self.extensions);

        if Path::new(url).is_absolute() {
            for candidate in &candidates {
                if let Some(path) = self.resolver.resolve(candidate, &self.resolve_dir)? {
                    return Ok(Some(path));
                }
            }
            return Ok(None);
        }

        for directory in self.search_directories(options, previous_resolved_modules) {
            for candidate in &candidates {
                if let Some(path) = self.resolver.resolve(&as_relative(candidate), &directory)? {
                    debug!(url, resolved = %path.display(), "Resolved stylesheet import");
                    return Ok(Some(path));
                }
            }
        }

        if is_relative(url) {
            return Ok(None);
        }

        // Package imports, e.g. `@angular/material` or `bootstrap/scss/functions`
        for candidate in &candidates {
            if let Some(path) = self.resolver.resolve(candidate, &self.resolve_dir)? {
                debug!(url, resolved = %path.display(), "Resolved stylesheet package import");
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

fn as_relative(candidate: &str) -> String {
    if is_relative(candidate) || candidate.starts_with('/') {
        candidate.to_string()
    } else {
        format!("./{}", candidate)
    }
}

/// Files a stylesheet import may refer to, most specific first: import-only
/// files (for `@import`), then the file or its partial, then directory
/// indexes, then the specifier itself.
pub fn import_candidates(url: &str, from_import: bool, extensions: &[&str]) -> Vec<String> {
    let (directory, name) = match url.rfind('/') {
        Some(index) => (&url[..=index], &url[index + 1..]),
        None => ("", url),
    };

    let mut candidates = Vec::new();
    let mut push = |candidate: String| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    let explicit_extension = name
        .rsplit_once('.')
        .filter(|(_, extension)| extensions.contains(extension));

    if let Some((stem, extension)) = explicit_extension {
        if from_import {
            push(format!("{directory}{stem}.import.{extension}"));
            push(format!("{directory}_{stem}.import.{extension}"));
        }
        push(url.to_string());
        push(format!("{directory}_{name}"));
        return candidates;
    }

    if from_import {
        for extension in extensions {
            push(format!("{directory}{name}.import.{extension}"));
            push(format!("{directory}_{name}.import.{extension}"));
        }
    }
    for extension in extensions {
        push(format!("{directory}{name}.{extension}"));
        push(format!("{directory}_{name}.{extension}"));
    }
    for extension in extensions {
        push(format!("{url}/index.{extension}"));
        push(format!("{url}/_index.{extension}"));
    }
    push(url.to_string());

    candidates
}
