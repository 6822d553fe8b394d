use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::cache::OutputFile;
use crate::diagnostics::Message;
use crate::program::ResourceTransformer;
use crate::stylesheets::{
    BundlerResolver, BundlerStylesheetImporter, CollectingRenderLogger, ImportResolver, RenderOptions,
    StylesheetError, StylesheetLanguage, StylesheetPools,
};

/// A rendered component stylesheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetResult {
    pub css: String,
    pub loaded_urls: Vec<PathBuf>,
    pub warnings: Vec<Message>,
    pub resource_files: Vec<OutputFile>,
}

#[derive(Default)]
struct BuildState {
    resource_files: IndexMap<PathBuf, OutputFile>,
    referenced_files: IndexSet<PathBuf>,
    warnings: Vec<Message>,
}

impl BuildState {
    fn add_resource_files(&mut self, files: &[OutputFile]) {
        for file in files {
            self.resource_files.insert(file.path.clone(), file.clone());
        }
    }
}

/// Renders component stylesheets through the worker pools and collects the
/// side outputs of a build: asset files, watched imports and warnings.
pub struct StylesheetResourceTransformer {
    pools: Arc<StylesheetPools>,
    resolver: Option<Arc<dyn BundlerResolver>>,
    inline_language: StylesheetLanguage,
    sourcemap: bool,
    state: Mutex<BuildState>,
}

impl StylesheetResourceTransformer {
    pub fn new(pools: Arc<StylesheetPools>, inline_language: StylesheetLanguage, sourcemap: bool) -> Self {
        StylesheetResourceTransformer {
            pools,
            resolver: None,
            inline_language,
            sourcemap,
            state: Mutex::new(BuildState::default()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn BundlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Render a stylesheet file, or an inline style when `stylesheet_file`
    /// is `None`
    pub fn render(
        &self,
        data: &str,
        stylesheet_file: Option<&Path>,
        containing_file: &Path,
    ) -> Result<StylesheetResult, StylesheetError> {
        let language = stylesheet_file
            .and_then(StylesheetLanguage::from_path)
            .unwrap_or(self.inline_language);
        let resolve_dir = stylesheet_file
            .unwrap_or(containing_file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let importer = self.resolver.as_ref().map(|resolver| {
            Arc::new(BundlerStylesheetImporter::new(resolver.clone(), resolve_dir, language))
                as Arc<dyn ImportResolver>
        });
        let logger = Arc::new(CollectingRenderLogger::new());

        let mut options = RenderOptions::new(language);
        options.url = stylesheet_file.map(Path::to_path_buf);
        options.source_map = self.sourcemap;

        let output = self.pools.render(data, options, importer, Some(logger.clone()))?;
        debug!(
            file = %stylesheet_file.unwrap_or(containing_file).display(),
            %language,
            imports = output.loaded_urls.len(),
            "Rendered component stylesheet"
        );

        let message_file = stylesheet_file.unwrap_or(containing_file);
        let warnings = logger
            .take()
            .iter()
            .map(|warning| warning.to_message(Some(message_file)))
            .collect();

        let css = match &output.source_map {
            Some(map) if self.sourcemap => format!(
                "{}\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */",
                output.css,
                STANDARD.encode(map.as_bytes())
            ),
            _ => output.css,
        };

        {
            let mut state = self.lock_state();
            state.add_resource_files(&output.resource_files);
            state.referenced_files.extend(output.loaded_urls.iter().cloned());
        }

        Ok(StylesheetResult {
            css,
            loaded_urls: output.loaded_urls,
            warnings,
            resource_files: output.resource_files,
        })
    }

    /// Forget the side outputs of the previous build
    pub fn reset(&self) {
        *self.lock_state() = BuildState::default();
    }

    /// Register asset files of a stylesheet rendered in an earlier build.
    /// Files are keyed by path, so adding them again is harmless.
    pub fn add_resource_files(&self, files: &[OutputFile]) {
        self.lock_state().add_resource_files(files);
    }

    pub fn take_resource_files(&self) -> Vec<OutputFile> {
        std::mem::take(&mut self.lock_state().resource_files)
            .into_values()
            .collect()
    }

    pub fn take_warnings(&self) -> Vec<Message> {
        std::mem::take(&mut self.lock_state().warnings)
    }

    /// Every file read by a render since the last reset
    pub fn referenced_files(&self) -> Vec<PathBuf> {
        self.lock_state().referenced_files.iter().cloned().collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResourceTransformer for StylesheetResourceTransformer {
    fn transform_stylesheet(
        &self,
        data: &str,
        containing_file: &Path,
        stylesheet_file: Option<&Path>,
    ) -> Result<Option<String>, StylesheetError> {
        let result = self.render(data, stylesheet_file, containing_file)?;
        self.lock_state().warnings.extend(result.warnings);
        Ok(Some(result.css))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheets::{
        RenderContext, RenderOutput, StylesheetPreprocessor, StylesheetWarning,
    };

    struct AssetPreprocessor;

    impl StylesheetPreprocessor for AssetPreprocessor {
        fn render(
            &self,
            source: &str,
            options: &RenderOptions,
            context: &mut RenderContext<'_>,
        ) -> Result<RenderOutput, StylesheetError> {
            context.warn(StylesheetWarning::new("deprecated syntax"));
            Ok(RenderOutput {
                css: source.replace("$c", "red"),
                source_map: Some("{}".to_string()),
                loaded_urls: options.url.iter().cloned().collect(),
                resource_files: vec![OutputFile::new("media/logo.png", b"png".to_vec())],
            })
        }
    }

    fn transformer(sourcemap: bool) -> StylesheetResourceTransformer {
        let pools = StylesheetPools::new(1)
            .with_preprocessor(StylesheetLanguage::Scss, Arc::new(AssetPreprocessor));
        StylesheetResourceTransformer::new(Arc::new(pools), StylesheetLanguage::Scss, sourcemap)
    }

    #[test]
    fn test_file_stylesheet_collects_side_outputs() {
        let transformer = transformer(false);
        let result = transformer
            .render("a { color: $c; }", Some(Path::new("/src/app.scss")), Path::new("/src/app.ts"))
            .unwrap();

        assert_eq!(result.css, "a { color: red; }");
        assert_eq!(result.loaded_urls, vec![PathBuf::from("/src/app.scss")]);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0].location.as_ref().map(|l| l.file.clone()),
            None,
            "warnings without a span carry no location"
        );
        assert_eq!(transformer.referenced_files(), vec![PathBuf::from("/src/app.scss")]);
        assert_eq!(transformer.take_resource_files().len(), 1);
        assert!(transformer.take_resource_files().is_empty());
    }

    #[test]
    fn test_inline_style_uses_inline_language() {
        let transformer = transformer(false);
        let css = transformer
            .transform_stylesheet("b { color: $c; }", Path::new("/src/app.ts"), None)
            .unwrap();

        assert_eq!(css.as_deref(), Some("b { color: red; }"));
        assert_eq!(transformer.take_warnings().len(), 1);
    }

    #[test]
    fn test_source_map_is_inlined() {
        let transformer = transformer(true);
        let result = transformer
            .render("a {}", Some(Path::new("/src/app.scss")), Path::new("/src/app.ts"))
            .unwrap();

        assert_eq!(
            result.css,
            "a {}\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,e30= */"
        );
    }

    #[test]
    fn test_resource_files_are_kept_once_per_path() {
        let transformer = transformer(false);
        let result = transformer
            .render("a {}", Some(Path::new("/src/app.scss")), Path::new("/src/app.ts"))
            .unwrap();
        assert_eq!(result.resource_files, vec![OutputFile::new("media/logo.png", b"png".to_vec())]);

        transformer.add_resource_files(&result.resource_files);
        transformer
            .render("b {}", Some(Path::new("/src/other.scss")), Path::new("/src/other.ts"))
            .unwrap();

        assert_eq!(transformer.take_resource_files(), result.resource_files);
    }

    #[test]
    fn test_reset_clears_build_state() {
        let transformer = transformer(false);
        transformer
            .render("a {}", Some(Path::new("/src/app.scss")), Path::new("/src/app.ts"))
            .unwrap();
        transformer.reset();

        assert!(transformer.referenced_files().is_empty());
        assert!(transformer.take_resource_files().is_empty());
    }
}
