use crate::cache::SourceFileCache;
use crate::config::PluginOptions;
use crate::fs::{FileSystem, RealFileSystem};
use crate::javascript::JavaScriptTransformer;
use crate::stylesheets::StylesheetPools;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Dependency injection container
/// Owns everything shared by one plugin instance across its builds
pub struct Container {
    options: Arc<PluginOptions>,
    file_system: Arc<dyn FileSystem>,
    source_file_cache: Option<Arc<Mutex<SourceFileCache>>>,
    javascript_transformer: Arc<JavaScriptTransformer>,
    stylesheet_pools: Arc<StylesheetPools>,
}

impl Container {
    /// Create a new container with production dependencies
    pub fn new(options: PluginOptions) -> Self {
        let file_system: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
        let stylesheet_pools = StylesheetPools::new(options.resolved_max_workers());
        Self::with_dependencies(options, file_system, stylesheet_pools)
    }

    /// Create a container with custom dependencies (for testing, or to
    /// register stylesheet preprocessors)
    pub fn with_dependencies(
        options: PluginOptions,
        file_system: Arc<dyn FileSystem>,
        stylesheet_pools: StylesheetPools,
    ) -> Self {
        let javascript_transformer = JavaScriptTransformer::from_plugin_options(&options, file_system.clone());
        let source_file_cache = options
            .incremental
            .then(|| Arc::new(Mutex::new(SourceFileCache::new())));

        Container {
            options: Arc::new(options),
            file_system,
            source_file_cache,
            javascript_transformer: Arc::new(javascript_transformer),
            stylesheet_pools: Arc::new(stylesheet_pools),
        }
    }

    /// Replace the JavaScript transformer, e.g. to install a linker
    pub fn with_javascript_transformer(mut self, transformer: JavaScriptTransformer) -> Self {
        self.javascript_transformer = Arc::new(transformer);
        self
    }

    pub fn options(&self) -> &Arc<PluginOptions> {
        &self.options
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    /// `None` for non-incremental builds
    pub fn source_file_cache(&self) -> Option<&Arc<Mutex<SourceFileCache>>> {
        self.source_file_cache.as_ref()
    }

    pub fn javascript_transformer(&self) -> &Arc<JavaScriptTransformer> {
        &self.javascript_transformer
    }

    pub fn stylesheet_pools(&self) -> &Arc<StylesheetPools> {
        &self.stylesheet_pools
    }

    /// Forget everything derived from `paths` before the next build
    pub fn invalidate<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if let Some(cache) = &self.source_file_cache {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .invalidate(paths);
        }
    }

    /// Terminate both worker pools. They restart on demand.
    pub fn shutdown(&self) {
        debug!("Shutting down worker pools");
        self.javascript_transformer.close();
        self.stylesheet_pools.close();
    }
}
