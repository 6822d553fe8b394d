use ngpack_core::ast::{Module, NodeFactory};
use ngpack_core::cache::{load_cache_key, Loader, OutputFile};
use ngpack_core::diagnostics::Message;
use ngpack_core::fs::{FileSystem, MockFileSystem};
use ngpack_core::program::Transformer;
use ngpack_core::stylesheets::StylesheetLanguage;
use ngpack_core::transformers::{generate_jit_inline_uri, JitResourceKind};
use ngpack_core::{
    CompilerPlugin, Container, PluginOptions, ProjectConfig, ScriptTarget, SourceFile, StylesheetPools,
};
use ngpack_test_helpers::parser::raw_module;
use ngpack_test_helpers::{
    fixtures, init_test_logging, FakeToolchain, FixtureParser, MapResolver, ProjectFixture, RecordingPreprocessor,
};
use rustc_hash::FxHashMap;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAIN: &str = "/src/main.ts";
const COMPONENT: &str = "/src/app.component.ts";
const TEMPLATE: &str = "/src/app.component.html";
const STYLES: &str = "/src/app.component.scss";

struct Harness {
    fs: Arc<MockFileSystem>,
    parser: Arc<FixtureParser>,
    preprocessor: Arc<RecordingPreprocessor>,
    toolchain: FakeToolchain,
    plugin: CompilerPlugin,
}

impl Harness {
    fn new(project: ProjectFixture, options: PluginOptions) -> Self {
        Self::with_config(project, options, |_| {})
    }

    fn with_config(
        project: ProjectFixture,
        options: PluginOptions,
        configure: impl FnOnce(&mut ProjectConfig),
    ) -> Self {
        init_test_logging();
        let fs = project.mock_file_system();
        let parser = Arc::new(FixtureParser::new());
        let preprocessor = Arc::new(RecordingPreprocessor::new(fs.clone()));
        let pools = StylesheetPools::new(2).with_preprocessor(StylesheetLanguage::Scss, preprocessor.clone());
        let container = Arc::new(Container::with_dependencies(options, fs.clone(), pools));
        let toolchain = FakeToolchain::new();

        let mut config = ProjectConfig {
            tsconfig: PathBuf::from("/tsconfig.json"),
            root_names: project.root_names(),
            compiler_options: json!({ "target": "ES2022" }),
            diagnostics: Vec::new(),
        };
        configure(&mut config);

        let plugin = CompilerPlugin::new(container, Arc::new(toolchain.clone()), parser.clone(), config);
        Harness {
            fs,
            parser,
            preprocessor,
            toolchain,
            plugin,
        }
    }

    fn load(&self, path: &str) -> (String, Loader) {
        let result = self
            .plugin
            .on_load(Path::new(path), None)
            .unwrap_or_else(|| panic!("{path} is not handled"));
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
        (result.contents.unwrap_or_default(), result.loader.unwrap_or(Loader::Empty))
    }
}

fn service_project() -> ProjectFixture {
    ProjectFixture::new()
        .file(MAIN, "import { value } from './service';\nconsole.log(value);\n")
        .file("/src/service.ts", "export const value = 1;\n")
}

fn component_project(styles: &str) -> ProjectFixture {
    ProjectFixture::new()
        .file(MAIN, "import { AppComponent } from './app.component';\n")
        .file(COMPONENT, fixtures::app_component_source())
        .file(TEMPLATE, "<h1>Hello</h1>\n")
        .file(STYLES, styles)
}

#[test]
fn test_first_build_publishes_diagnostics_and_setup_warning() {
    let mut harness = Harness::with_config(
        ProjectFixture::new().file(MAIN, fixtures::type_error_source()),
        PluginOptions::default(),
        |config| config.compiler_options = json!({}),
    );

    let first = harness.plugin.on_start();

    assert_eq!(first.errors.len(), 1);
    assert_eq!(
        first.errors[0].text,
        "TS2322: Type 'string' is not assignable to type 'number'."
    );
    let location = first.errors[0].location.as_ref().unwrap();
    assert_eq!(location.file, PathBuf::from(MAIN));
    assert_eq!(location.line, Some(2));

    assert_eq!(first.warnings.len(), 1);
    assert!(first.warnings[0].text.starts_with("TypeScript compiler options 'target'"));
    assert_eq!(
        first.warnings[0].location.as_ref().map(|l| l.file.clone()),
        Some(PathBuf::from("/tsconfig.json"))
    );

    let options = harness.plugin.compiler_options().unwrap();
    assert_eq!(options.target, Some(ScriptTarget::Es2022));
    assert_eq!(options.use_define_for_class_fields, Some(false));

    let second = harness.plugin.on_start();
    assert_eq!(second.errors, first.errors);
    assert!(second.warnings.is_empty());
}

#[test]
fn test_modern_target_has_no_setup_warning() {
    let mut harness = Harness::new(service_project(), PluginOptions::default());

    let result = harness.plugin.on_start();

    assert!(!result.has_errors());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_configuration_diagnostics_are_published() {
    let mut harness = Harness::with_config(service_project(), PluginOptions::default(), |config| {
        config.diagnostics.push(ngpack_core::Diagnostic::error(5023, "Unknown compiler option 'foo'."));
    });

    let result = harness.plugin.on_start();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].text, "TS5023: Unknown compiler option 'foo'.");
}

#[test]
fn test_invalid_compiler_options_are_a_single_error() {
    let mut harness = Harness::with_config(service_project(), PluginOptions::default(), |config| {
        config.compiler_options = json!("es2022");
    });

    let result = harness.plugin.on_start();

    assert_eq!(
        result.errors,
        vec![Message::text("Configuration error: 'compilerOptions' must be an object")]
    );
    assert!(harness.plugin.compiler_options().is_none());
}

#[test]
fn test_program_files_are_emitted_and_cached() {
    let mut harness = Harness::new(service_project(), PluginOptions::default());
    harness.plugin.on_start();

    let (contents, loader) = harness.load("/src/service.ts");

    assert_eq!(contents, "export const value = 1;\n");
    assert_eq!(loader, Loader::Js);
    let cache = harness.plugin.container().source_file_cache().unwrap();
    assert!(cache
        .lock()
        .unwrap()
        .typescript_output(Path::new("/src/service.ts"))
        .is_some());

    harness.fs.add_file("/src/service.ts", "export const value = 2;\n");
    harness.plugin.invalidate(["/src/service.ts"]);
    harness.plugin.on_start();

    assert_eq!(harness.load("/src/service.ts").0, "export const value = 2;\n");
}

#[test]
fn test_file_replacement_is_served_for_requested_path() {
    let mut replacements = FxHashMap::default();
    replacements.insert(PathBuf::from("/src/env.ts"), PathBuf::from("/src/env.prod.ts"));
    let options = PluginOptions {
        file_replacements: replacements,
        ..Default::default()
    };
    let project = ProjectFixture::new()
        .file(MAIN, "import { production } from './env';\n")
        .file("/src/env.ts", "export const production = false;\n")
        .file("/src/env.prod.ts", "export const production = true;\n");
    let mut harness = Harness::with_config(project, options, |config| {
        config.root_names = vec![PathBuf::from(MAIN), PathBuf::from("/src/env.ts")];
    });
    harness.plugin.on_start();

    assert_eq!(harness.load("/src/env.ts").0, "export const production = true;\n");
}

#[test]
fn test_missing_file_names_the_replacement() {
    let mut replacements = FxHashMap::default();
    replacements.insert(PathBuf::from("/src/feature.ts"), PathBuf::from("/src/feature.prod.ts"));
    let options = PluginOptions {
        file_replacements: replacements,
        ..Default::default()
    };
    let mut harness = Harness::new(service_project(), options);
    harness.plugin.on_start();

    let replaced = harness.plugin.on_load(Path::new("/src/feature.ts"), None).unwrap();
    assert_eq!(replaced.errors.len(), 1);
    assert_eq!(
        replaced.errors[0].text,
        "File '/src/feature.prod.ts' is missing from the TypeScript compilation."
    );
    assert_eq!(replaced.errors[0].notes.len(), 2);

    let missing = harness.plugin.on_load(Path::new("/src/other.ts"), None).unwrap();
    assert_eq!(missing.errors[0].notes.len(), 1);
    assert!(missing.contents.is_none());
}

#[test]
fn test_fatal_analysis_error_disables_the_emitter() {
    let mut harness = Harness::new(service_project(), PluginOptions::default());
    harness.toolchain.fail_analysis(Some("decorator metadata is not statically analyzable"));

    let result = harness.plugin.on_start();

    assert_eq!(
        result.errors,
        vec![Message::text(
            "Program analysis failed: decorator metadata is not statically analyzable"
        )]
    );
    let load = harness.plugin.on_load(Path::new(MAIN), None).unwrap();
    assert_eq!(load.errors[0].text, "Compilation has not been initialized");
}

#[test]
fn test_javascript_files_go_through_the_transformer() {
    let mut harness = Harness::new(
        service_project().file("/src/vendor.js", "export const v = 1;\n//# sourceMappingURL=vendor.js.map"),
        PluginOptions::default(),
    );
    harness.plugin.on_start();

    let (contents, loader) = harness.load("/src/vendor.js");
    assert_eq!(contents, "export const v = 1;\n");
    assert_eq!(loader, Loader::Js);

    harness.fs.add_file("/src/vendor.js", "export const v = 2;\n");
    assert_eq!(harness.load("/src/vendor.js").0, "export const v = 1;\n");

    harness.plugin.invalidate(["/src/vendor.js"]);
    assert_eq!(harness.load("/src/vendor.js").0, "export const v = 2;\n");

    assert!(harness.plugin.on_load(Path::new("/src/styles.css"), None).is_none());
}

#[test]
fn test_component_stylesheets_are_rendered_during_build() {
    let mut harness = Harness::new(
        component_project("@import 'missing';\n$c: red;\nh1 { color: $c; }"),
        PluginOptions::default(),
    );

    let result = harness.plugin.on_start();

    assert!(!result.has_errors(), "{:?}", result.errors);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].text, "Can't find stylesheet to import: missing");
    assert_eq!(
        result.warnings[0].location.as_ref().map(|l| l.file.clone()),
        Some(PathBuf::from(STYLES))
    );

    let renders = harness.preprocessor.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].url.as_deref(), Some(Path::new(STYLES)));

    let watched = harness.plugin.watch_files();
    for expected in [MAIN, COMPONENT, TEMPLATE, STYLES] {
        assert!(watched.contains(&PathBuf::from(expected)), "{expected} is not watched");
    }
}

#[test]
fn test_inline_styles_use_the_inline_language() {
    let options = PluginOptions {
        inline_style_language: "scss".to_string(),
        ..Default::default()
    };
    let source = format!("{}// @inline-style: a {{ color: blue; }}\n", fixtures::app_component_source());
    let mut harness = Harness::new(component_project("h1 {}").file(COMPONENT, source), options);

    harness.plugin.on_start();

    let renders = harness.preprocessor.renders();
    let inline = renders.iter().find(|render| render.url.is_none()).unwrap();
    assert_eq!(inline.language, StylesheetLanguage::Scss);
}

#[test]
fn test_build_end_adds_stylesheet_resource_files() {
    let mut harness = Harness::new(
        component_project("@output-file media/logo.svg\nh1 {}"),
        PluginOptions::default(),
    );
    harness.plugin.on_start();

    let mut outputs = vec![OutputFile::new("/dist/main.js", b"main".to_vec())];
    harness.plugin.on_end(&mut outputs);

    let paths: Vec<PathBuf> = outputs.iter().map(|file| file.path.clone()).collect();
    assert_eq!(paths, vec![PathBuf::from("/dist/main.js"), PathBuf::from("media/logo.svg")]);

    let mut again = Vec::new();
    harness.plugin.on_end(&mut again);
    assert!(again.is_empty());
}

/// Compiles the component template into the component module, the way the
/// framework compiler does for AOT builds.
struct TemplateInliner {
    fs: Arc<MockFileSystem>,
}

impl Transformer for TemplateInliner {
    fn name(&self) -> &str {
        "inline-template"
    }

    fn transform(&self, file: &SourceFile, module: &Module) -> Module {
        if file.path != Path::new(COMPONENT) {
            return module.clone();
        }
        let template = self.fs.read_file(Path::new(TEMPLATE)).unwrap_or_default();
        raw_module(&format!("export const TEMPLATE = {template:?};\n"))
    }
}

#[test]
fn test_template_change_reemits_the_component() {
    let mut harness = Harness::new(component_project("h1 {}"), PluginOptions::default());
    harness.toolchain.add_emit_transformer(Arc::new(TemplateInliner {
        fs: harness.fs.clone(),
    }));
    harness.plugin.on_start();
    assert!(harness.load(COMPONENT).0.contains("<h1>Hello</h1>"));

    harness.fs.add_file(TEMPLATE, "<h1>Bye</h1>\n");
    harness.plugin.invalidate([TEMPLATE]);
    let result = harness.plugin.on_start();

    assert!(!result.has_errors(), "{:?}", result.errors);
    let (contents, _) = harness.load(COMPONENT);
    assert!(contents.contains("<h1>Bye</h1>"), "stale output: {contents}");
    assert!(!contents.contains("Hello"));
}

mod jit {
    use super::*;

    const COMPONENT: &str = "/src/app/app.component.ts";
    const STYLES: &str = "/src/app/app.component.scss";
    const THEME: &str = "/src/app/_theme.scss";

    fn harness() -> Harness {
        let options = PluginOptions {
            jit: true,
            inline_style_language: "scss".to_string(),
            ..Default::default()
        };
        let project = ProjectFixture::new()
            .file(MAIN, "import './app/app.component';\n")
            .file(COMPONENT, fixtures::app_component_source())
            .file("/src/app/app.component.html", "<h1>Hello</h1>")
            .file(STYLES, "@import 'theme';\nh1 { color: $accent; }")
            .file(THEME, "$accent: blue;");
        let harness = Harness::new(project, options);
        harness.parser.set_module(
            COMPONENT,
            fixtures::component_module(
                "AppComponent",
                vec![
                    NodeFactory::property("templateUrl", NodeFactory::string("./app.component.html")),
                    NodeFactory::property("styleUrl", NodeFactory::string("./app.component.scss")),
                ],
            ),
        );
        harness
    }

    fn with_resolver(mut harness: Harness) -> Harness {
        harness.plugin = harness
            .plugin
            .with_bundler_resolver(Arc::new(MapResolver::new().with_file(THEME)));
        harness
    }

    #[test]
    fn test_component_imports_its_resources() {
        let mut harness = harness();
        let result = harness.plugin.on_start();
        assert!(!result.has_errors(), "{:?}", result.errors);

        let (contents, _) = harness.load(COMPONENT);

        assert!(contents.contains("from 'angular:jit:template:file;./app.component.html'"));
        assert!(contents.contains("from 'angular:jit:style:file;./app.component.scss'"));
        assert!(!contents.contains("templateUrl"));
    }

    #[test]
    fn test_template_resource_is_served_as_text() {
        let mut harness = harness();
        harness.plugin.on_start();

        let result = harness
            .plugin
            .on_load_virtual("angular:jit:template:file;./app.component.html", Path::new("/src/app"))
            .unwrap();

        assert_eq!(result.contents.as_deref(), Some("<h1>Hello</h1>"));
        assert_eq!(result.loader, Some(Loader::Text));
        assert_eq!(result.watch_files, vec![PathBuf::from("/src/app/app.component.html")]);
    }

    #[test]
    fn test_style_resource_is_rendered_and_cached() {
        let mut harness = with_resolver(harness());
        harness.plugin.on_start();
        let specifier = "angular:jit:style:file;./app.component.scss";

        let result = harness.plugin.on_load_virtual(specifier, Path::new("/src/app")).unwrap();

        assert_eq!(result.contents.as_deref(), Some("h1 { color: blue; }"));
        assert_eq!(result.watch_files, vec![PathBuf::from(STYLES), PathBuf::from(THEME)]);
        let key = load_cache_key("angular:jit:style", STYLES);
        let cache = harness.plugin.container().source_file_cache().unwrap().clone();
        assert!(cache.lock().unwrap().load_results().get(&key).is_some());

        harness.plugin.on_load_virtual(specifier, Path::new("/src/app")).unwrap();
        assert_eq!(harness.preprocessor.renders().len(), 1);

        harness.fs.add_file(THEME, "$accent: green;");
        harness.plugin.invalidate([THEME]);
        let result = harness.plugin.on_load_virtual(specifier, Path::new("/src/app")).unwrap();

        assert_eq!(result.contents.as_deref(), Some("h1 { color: green; }"));
        assert_eq!(harness.preprocessor.renders().len(), 2);
        assert!(harness.plugin.watch_files().contains(&PathBuf::from(THEME)));
    }

    #[test]
    fn test_cached_style_keeps_its_assets_across_builds() {
        let mut harness = harness();
        harness.fs.add_file(STYLES, "@output-file media/logo.svg\nh1 {}");
        let specifier = "angular:jit:style:file;./app.component.scss";

        let mut builds = Vec::new();
        for _ in 0..2 {
            harness.plugin.on_start();
            let result = harness.plugin.on_load_virtual(specifier, Path::new("/src/app")).unwrap();
            assert!(result.errors.is_empty(), "{:?}", result.errors);

            let mut outputs = Vec::new();
            harness.plugin.on_end(&mut outputs);
            builds.push(outputs.into_iter().map(|file| file.path).collect::<Vec<_>>());
        }

        assert_eq!(harness.preprocessor.renders().len(), 1);
        let expected = vec![PathBuf::from("media/logo.svg")];
        assert_eq!(builds, vec![expected.clone(), expected]);
    }

    #[test]
    fn test_missing_style_resource_is_an_error() {
        let mut harness = harness();
        harness.plugin.on_start();

        let result = harness
            .plugin
            .on_load_virtual("angular:jit:style:file;./missing.scss", Path::new("/src/app"))
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].text.starts_with("Could not read style resource"));
    }

    #[test]
    fn test_inline_resources_are_decoded() {
        let mut harness = harness();
        harness.plugin.on_start();

        let template = harness
            .plugin
            .on_load_virtual(
                &generate_jit_inline_uri("<p>inline</p>", JitResourceKind::Template),
                Path::new("/src/app"),
            )
            .unwrap();
        assert_eq!(template.contents.as_deref(), Some("<p>inline</p>"));

        let style = harness
            .plugin
            .on_load_virtual(
                &generate_jit_inline_uri("$c: red;\np { color: $c; }", JitResourceKind::Style),
                Path::new("/src/app"),
            )
            .unwrap();
        assert_eq!(style.contents.as_deref(), Some("p { color: red; }"));
        assert_eq!(style.loader, Some(Loader::Text));
    }

    #[test]
    fn test_unrelated_specifiers_are_ignored() {
        let harness = harness();

        assert!(harness
            .plugin
            .on_load_virtual("angular:other:file;./x.html", Path::new("/src"))
            .is_none());
    }
}

#[test]
fn test_disposed_plugin_restarts_its_pools() {
    let mut harness = Harness::new(
        service_project().file("/src/vendor.js", "export default 1;\n"),
        PluginOptions::default(),
    );
    harness.plugin.on_start();
    harness.plugin.dispose();

    let (contents, _) = harness.load("/src/vendor.js");
    assert_eq!(contents, "export default 1;\n");
}

#[test]
fn test_non_incremental_plugin_watches_nothing() {
    let options = PluginOptions {
        incremental: false,
        ..Default::default()
    };
    let mut harness = Harness::new(service_project(), options);

    harness.plugin.on_start();

    assert!(harness.plugin.watch_files().is_empty());
    assert_eq!(harness.load(MAIN).0, "import { value } from './service';\nconsole.log(value);\n");
}

#[test]
fn test_project_on_disk() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let written = service_project().write_to(dir.path()).unwrap();
    let container = Arc::new(Container::new(PluginOptions {
        max_workers: Some(1),
        ..Default::default()
    }));
    let mut plugin = CompilerPlugin::new(
        container,
        Arc::new(FakeToolchain::new()),
        Arc::new(FixtureParser::new()),
        ProjectConfig {
            tsconfig: dir.path().join("tsconfig.json"),
            root_names: written.clone(),
            compiler_options: json!({ "target": "ES2022" }),
            diagnostics: Vec::new(),
        },
    );

    assert!(!plugin.on_start().has_errors());
    let result = plugin.on_load(&written[1], None).unwrap();

    assert_eq!(result.contents.as_deref(), Some("export const value = 1;\n"));
    assert!(plugin.watch_files().contains(&written[0]));
}
