use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::linker::{requires_linking, Linker, LinkerFactory};
use super::optimize::{annotate_pure_top_level, elide_class_metadata, is_side_effect_free_framework_package};
use super::{AsyncDownleveler, TransformError};
use crate::fs::FileSystem;

static ASYNC_TRANSFORMATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"async(?:\s+function)?\s*\*|for\s+await\s*\(").expect("valid regex"));

static SOURCE_MAPPING_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^//# sourceMappingURL=[^\r\n]*").expect("valid regex"));

static NODE_MODULES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\/]node_modules[\\/]").expect("valid regex"));

/// Options shared by every job of a transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformerOptions {
    pub sourcemap: bool,
    pub third_party_sourcemaps: bool,
    pub advanced_optimizations: bool,
    pub jit: bool,
}

impl TransformerOptions {
    /// Input source maps survive only for application code unless third-party
    /// maps were requested
    pub fn keeps_source_map(&self, path: &Path) -> bool {
        self.sourcemap
            && (self.third_party_sourcemaps || !NODE_MODULES.is_match(&path.to_string_lossy()))
    }
}

/// Native async generators and `for await` need downleveling for zone-based
/// change detection
pub fn requires_async_transformation(data: &str) -> bool {
    ASYNC_TRANSFORMATION.is_match(data)
}

/// Remove `//# sourceMappingURL=` comment lines
pub fn strip_source_mapping_url(data: &str) -> String {
    SOURCE_MAPPING_URL.replace_all(data, "").into_owned()
}

/// Lazily created linker shared by all jobs of one transformer
#[derive(Clone, Default)]
pub struct LinkerSlot {
    factory: Option<Arc<dyn LinkerFactory>>,
    linker: Arc<OnceCell<Arc<dyn Linker>>>,
}

impl LinkerSlot {
    pub fn new(factory: Option<Arc<dyn LinkerFactory>>) -> Self {
        LinkerSlot {
            factory,
            linker: Arc::new(OnceCell::new()),
        }
    }

    fn get(&self, path: &Path) -> Result<&Arc<dyn Linker>, TransformError> {
        self.linker.get_or_try_init(|| match &self.factory {
            Some(factory) => {
                debug!("Creating partial declaration linker");
                factory.create()
            }
            None => Err(TransformError::LinkerUnavailable {
                path: path.to_path_buf(),
            }),
        })
    }
}

/// A transformation job. Everything it needs is owned, so it can move to a
/// worker thread.
pub struct TransformRequest {
    pub filename: PathBuf,
    /// Read from `file_system` when absent
    pub data: Option<String>,
    pub skip_linker: bool,
    pub side_effects: Option<bool>,
    pub options: TransformerOptions,
    pub file_system: Arc<dyn FileSystem>,
    pub linker: LinkerSlot,
    pub downleveler: Option<Arc<dyn AsyncDownleveler>>,
}

/// Stages a file needs. All false means the input passes through unchanged
/// apart from source map comment stripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredStages {
    pub link: bool,
    pub downlevel_async: bool,
    pub optimize: bool,
}

impl RequiredStages {
    pub fn detect(path: &Path, data: &str, skip_linker: bool, options: &TransformerOptions) -> Self {
        RequiredStages {
            link: !skip_linker && requires_linking(path, data),
            downlevel_async: requires_async_transformation(data),
            optimize: options.advanced_optimizations,
        }
    }

    pub fn any(&self) -> bool {
        self.link || self.downlevel_async || self.optimize
    }
}

/// Output for a file that needs no transformation
pub fn passthrough(path: &Path, data: &str, options: &TransformerOptions) -> Vec<u8> {
    if options.keeps_source_map(path) {
        data.as_bytes().to_vec()
    } else {
        strip_source_mapping_url(data).into_bytes()
    }
}

/// Run a job. Output depends only on the file name, its content and the
/// request flags.
pub fn transform_javascript(request: TransformRequest) -> Result<Vec<u8>, TransformError> {
    let TransformRequest {
        filename,
        data,
        skip_linker,
        side_effects,
        options,
        file_system,
        linker,
        downleveler,
    } = request;

    let data = match data {
        Some(data) => data,
        None => file_system
            .read_file(&filename)
            .map_err(|error| TransformError::Read {
                path: filename.clone(),
                message: error.to_string(),
            })?,
    };

    let stages = RequiredStages::detect(&filename, &data, skip_linker, &options);
    if !stages.any() {
        return Ok(passthrough(&filename, &data, &options));
    }

    let mut code = data;

    if stages.link {
        code = linker.get(&filename)?.link(&filename, &code, options.jit)?;
    }

    if stages.downlevel_async {
        match &downleveler {
            Some(downleveler) => code = downleveler.downlevel(&filename, &code)?,
            None => warn!(
                path = %filename.display(),
                "Async generators found but no downleveler is configured"
            ),
        }
    }

    let side_effect_free =
        side_effects == Some(false) || is_side_effect_free_framework_package(&filename);
    if stages.optimize && side_effect_free {
        code = annotate_pure_top_level(&code);
        code = elide_class_metadata(&code);
    }

    Ok(passthrough(&filename, &code, &options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    struct AppendLinker;

    impl Linker for AppendLinker {
        fn link(&self, _filename: &Path, source: &str, jit: bool) -> Result<String, TransformError> {
            Ok(format!("{}\n// linked jit={}", source.replace("ɵɵngDeclare", "ɵɵdefine"), jit))
        }
    }

    struct AppendLinkerFactory;

    impl LinkerFactory for AppendLinkerFactory {
        fn create(&self) -> Result<Arc<dyn Linker>, TransformError> {
            Ok(Arc::new(AppendLinker))
        }
    }

    fn request(path: &str, data: Option<&str>) -> TransformRequest {
        TransformRequest {
            filename: PathBuf::from(path),
            data: data.map(str::to_string),
            skip_linker: false,
            side_effects: None,
            options: TransformerOptions::default(),
            file_system: Arc::new(MockFileSystem::new()),
            linker: LinkerSlot::new(Some(Arc::new(AppendLinkerFactory))),
            downleveler: None,
        }
    }

    #[test]
    fn test_async_heuristic() {
        assert!(requires_async_transformation("async function* gen() {}"));
        assert!(requires_async_transformation("async *values() {}"));
        assert!(requires_async_transformation("for await (const x of xs) {}"));
        assert!(!requires_async_transformation("async function run() { await x; }"));
    }

    #[test]
    fn test_source_map_comments_are_stripped() {
        let output = transform_javascript(request(
            "/src/main.js",
            Some("run();\n//# sourceMappingURL=main.js.map\n"),
        ))
        .unwrap();

        assert_eq!(output, b"run();\n\n");
    }

    #[test]
    fn test_source_maps_kept_for_application_code_only() {
        let options = TransformerOptions {
            sourcemap: true,
            ..Default::default()
        };

        assert!(options.keeps_source_map(Path::new("/src/main.js")));
        assert!(!options.keeps_source_map(Path::new("/app/node_modules/x/index.js")));
    }

    #[test]
    fn test_linking_runs_when_marker_present() {
        let mut req = request(
            "/app/node_modules/@angular/material/fesm2022/button.mjs",
            Some("i0.ɵɵngDeclareComponent({});"),
        );
        req.options.jit = true;

        let output = String::from_utf8(transform_javascript(req).unwrap()).unwrap();

        assert_eq!(output, "i0.ɵɵdefineComponent({});\n// linked jit=true");
    }

    #[test]
    fn test_skip_linker_leaves_declarations() {
        let mut req = request(
            "/app/node_modules/lib/index.mjs",
            Some("i0.ɵɵngDeclareComponent({});"),
        );
        req.skip_linker = true;

        assert_eq!(
            transform_javascript(req).unwrap(),
            b"i0.\xc9\xb5\xc9\xb5ngDeclareComponent({});".to_vec()
        );
    }

    #[test]
    fn test_missing_linker_is_an_error() {
        let mut req = request("/app/node_modules/lib/index.mjs", Some("ɵɵngDeclareFactory"));
        req.linker = LinkerSlot::new(None);

        assert!(matches!(
            transform_javascript(req),
            Err(TransformError::LinkerUnavailable { .. })
        ));
    }

    #[test]
    fn test_optimization_requires_side_effect_free_file() {
        let source = "export const a = create();\n";
        let mut req = request("/src/a.js", Some(source));
        req.options.advanced_optimizations = true;
        assert_eq!(transform_javascript(req).unwrap(), source.as_bytes());

        let mut req = request("/src/a.js", Some(source));
        req.options.advanced_optimizations = true;
        req.side_effects = Some(false);
        assert_eq!(
            transform_javascript(req).unwrap(),
            b"export const a = /*#__PURE__*/ create();\n".to_vec()
        );
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = transform_javascript(request("/src/missing.js", None));
        match result {
            Err(TransformError::Read { path, .. }) => assert_eq!(path, PathBuf::from("/src/missing.js")),
            other => panic!("expected read error, got {:?}", other.map(|_| ())),
        }
    }
}
