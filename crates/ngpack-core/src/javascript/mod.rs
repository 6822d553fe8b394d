//! JavaScript post-processing on the transformation worker pool

pub mod linker;
pub mod optimize;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::config::PluginOptions;
use crate::fs::FileSystem;
use crate::worker_pool::{PendingTask, WorkerError, WorkerPool};

pub use linker::{requires_linking, Linker, LinkerFactory, PARTIAL_DECLARATION_MARKER};
pub use worker::{
    requires_async_transformation, strip_source_mapping_url, transform_javascript, LinkerSlot,
    RequiredStages, TransformRequest, TransformerOptions,
};

/// Failures while transforming one file
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to read '{}': {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("'{}' contains partial declarations but no linker is available", .path.display())]
    LinkerUnavailable { path: PathBuf },

    #[error("Linking '{}' failed: {message}", .path.display())]
    Link { path: PathBuf, message: String },

    #[error("Downleveling async code in '{}' failed: {message}", .path.display())]
    Downlevel { path: PathBuf, message: String },

    #[error("Transforming '{}' failed: {source}", .path.display())]
    Worker {
        path: PathBuf,
        #[source]
        source: WorkerError,
    },
}

impl TransformError {
    pub fn path(&self) -> &Path {
        match self {
            TransformError::Read { path, .. }
            | TransformError::LinkerUnavailable { path }
            | TransformError::Link { path, .. }
            | TransformError::Downlevel { path, .. }
            | TransformError::Worker { path, .. } => path,
        }
    }
}

/// Rewrites native async generators into code zone.js can intercept
pub trait AsyncDownleveler: Send + Sync {
    fn downlevel(&self, filename: &Path, source: &str) -> Result<String, TransformError>;
}

/// A transformation that is either finished or running on the pool
pub enum TransformTask {
    Ready(Result<Vec<u8>, TransformError>),
    Pending {
        path: PathBuf,
        task: PendingTask<Result<Vec<u8>, TransformError>>,
    },
}

impl TransformTask {
    pub fn wait(self) -> Result<Vec<u8>, TransformError> {
        match self {
            TransformTask::Ready(result) => result,
            TransformTask::Pending { path, task } => task
                .wait()
                .map_err(|source| TransformError::Worker { path, source })?,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TransformTask::Ready(_))
    }
}

/// Coordinator side of JavaScript transformation. The pool starts on the
/// first job that needs it and can be closed and restarted.
pub struct JavaScriptTransformer {
    options: TransformerOptions,
    max_workers: usize,
    file_system: Arc<dyn FileSystem>,
    linker: LinkerSlot,
    downleveler: Option<Arc<dyn AsyncDownleveler>>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl JavaScriptTransformer {
    pub fn new(options: TransformerOptions, max_workers: usize, file_system: Arc<dyn FileSystem>) -> Self {
        JavaScriptTransformer {
            options,
            max_workers,
            file_system,
            linker: LinkerSlot::default(),
            downleveler: None,
            pool: Mutex::new(None),
        }
    }

    pub fn from_plugin_options(options: &PluginOptions, file_system: Arc<dyn FileSystem>) -> Self {
        Self::new(
            TransformerOptions {
                sourcemap: options.sourcemap,
                third_party_sourcemaps: options.third_party_sourcemaps,
                advanced_optimizations: options.advanced_optimizations,
                jit: options.jit,
            },
            options.resolved_max_workers(),
            file_system,
        )
    }

    pub fn with_linker(mut self, factory: Arc<dyn LinkerFactory>) -> Self {
        self.linker = LinkerSlot::new(Some(factory));
        self
    }

    pub fn with_async_downleveler(mut self, downleveler: Arc<dyn AsyncDownleveler>) -> Self {
        self.downleveler = Some(downleveler);
        self
    }

    pub fn options(&self) -> &TransformerOptions {
        &self.options
    }

    /// Transform in-memory content. Content that needs no transformation is
    /// returned without a round trip through the pool.
    pub fn transform_data(
        &self,
        path: &Path,
        data: &str,
        skip_linker: bool,
        side_effects: Option<bool>,
    ) -> TransformTask {
        let stages = RequiredStages::detect(path, data, skip_linker, &self.options);
        if !stages.any() {
            return TransformTask::Ready(Ok(worker::passthrough(path, data, &self.options)));
        }

        debug!(path = %path.display(), ?stages, "Dispatching JavaScript transformation");
        self.dispatch(path, Some(data.to_string()), skip_linker, side_effects)
    }

    /// Transform a file the worker reads itself
    pub fn transform_file(&self, path: &Path, skip_linker: bool, side_effects: Option<bool>) -> TransformTask {
        self.dispatch(path, None, skip_linker, side_effects)
    }

    /// Stop the pool. Running jobs finish; later calls start a new pool.
    pub fn close(&self) {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if pool.is_some() {
            debug!("Closed JavaScript transformer pool");
        }
    }

    fn dispatch(
        &self,
        path: &Path,
        data: Option<String>,
        skip_linker: bool,
        side_effects: Option<bool>,
    ) -> TransformTask {
        let pool = match self.ensure_pool() {
            Ok(pool) => pool,
            Err(source) => {
                return TransformTask::Ready(Err(TransformError::Worker {
                    path: path.to_path_buf(),
                    source,
                }))
            }
        };

        let request = TransformRequest {
            filename: path.to_path_buf(),
            data,
            skip_linker,
            side_effects,
            options: self.options,
            file_system: self.file_system.clone(),
            linker: self.linker.clone(),
            downleveler: self.downleveler.clone(),
        };

        TransformTask::Pending {
            path: path.to_path_buf(),
            task: pool.run(move || transform_javascript(request)),
        }
    }

    fn ensure_pool(&self) -> Result<Arc<WorkerPool>, WorkerError> {
        let mut slot = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = Arc::new(WorkerPool::new("ng-transform", self.max_workers)?);
        *slot = Some(pool.clone());
        Ok(pool)
    }
}

impl Drop for JavaScriptTransformer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn transformer(options: TransformerOptions) -> JavaScriptTransformer {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/src/lazy.js", "export default 1;\n//# sourceMappingURL=lazy.js.map");
        JavaScriptTransformer::new(options, 2, fs)
    }

    #[test]
    fn test_fast_path_does_not_start_pool() {
        let transformer = transformer(TransformerOptions::default());
        let task = transformer.transform_data(Path::new("/src/a.js"), "let a = 1;", true, None);

        assert!(task.is_ready());
        assert_eq!(task.wait().unwrap(), b"let a = 1;");
        assert!(transformer.pool.lock().unwrap().is_none());
    }

    #[test]
    fn test_transform_file_reads_through_worker() {
        let transformer = transformer(TransformerOptions::default());
        let output = transformer
            .transform_file(Path::new("/src/lazy.js"), false, None)
            .wait()
            .unwrap();

        assert_eq!(output, b"export default 1;\n");
    }

    #[test]
    fn test_close_allows_restart() {
        let transformer = transformer(TransformerOptions::default());
        transformer.transform_file(Path::new("/src/lazy.js"), true, None).wait().unwrap();
        transformer.close();

        assert!(transformer.pool.lock().unwrap().is_none());
        assert!(transformer
            .transform_file(Path::new("/src/lazy.js"), true, None)
            .wait()
            .is_ok());
    }

    #[test]
    fn test_worker_errors_carry_the_path() {
        let transformer = transformer(TransformerOptions::default());
        let error = transformer
            .transform_file(Path::new("/src/missing.js"), true, None)
            .wait()
            .unwrap_err();

        assert_eq!(error.path(), Path::new("/src/missing.js"));
    }
}
