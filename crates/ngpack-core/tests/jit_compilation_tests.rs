use ngpack_core::ast::NodeFactory;
use ngpack_core::compilation::{Compilation, InitializeResult, JitCompilation};
use ngpack_core::diagnostics::{CollectingDiagnosticHandler, Diagnostic, DiagnosticHandler};
use ngpack_core::fs::MockFileSystem;
use ngpack_core::program::HostOptions;
use ngpack_core::transformers::{parse_jit_uri, JitResourceKind, JitResourceOrigin};
use ngpack_core::SourceFileCache;
use ngpack_test_helpers::toolchain::SEMANTIC_ERROR_CODE;
use ngpack_test_helpers::{fixtures, init_test_logging, FakeToolchain, FixtureParser, ProjectFixture};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const COMPONENT: &str = "/src/app/app.component.ts";

struct Harness {
    fs: Arc<MockFileSystem>,
    parser: Arc<FixtureParser>,
    cache: Arc<Mutex<SourceFileCache>>,
    toolchain: FakeToolchain,
    compilation: JitCompilation,
    roots: Vec<PathBuf>,
}

impl Harness {
    fn new(project: ProjectFixture) -> Self {
        init_test_logging();
        let toolchain = FakeToolchain::new();
        Harness {
            fs: project.mock_file_system(),
            parser: Arc::new(FixtureParser::new()),
            cache: Arc::new(Mutex::new(SourceFileCache::new())),
            compilation: JitCompilation::new(Arc::new(toolchain.clone())),
            toolchain,
            roots: project.root_names(),
        }
    }

    fn build(&mut self) -> (InitializeResult, Vec<Diagnostic>) {
        let mut host = HostOptions::new(self.fs.clone(), self.parser.clone());
        host.source_file_cache = Some(self.cache.clone());
        let result = self
            .compilation
            .initialize(&self.roots, &json!({}), host, Vec::new())
            .unwrap();
        let handler = CollectingDiagnosticHandler::new();
        self.compilation.collect_diagnostics(&handler).unwrap();
        (result, handler.get_diagnostics())
    }
}

fn component_project() -> ProjectFixture {
    ProjectFixture::new()
        .file("/src/main.ts", "import './app/app.component';\n")
        .file(COMPONENT, fixtures::app_component_source())
        .file("/src/app/app.component.html", "<h1>Hello</h1>")
        .file("/src/app/app.component.scss", "h1 { color: red; }")
}

fn register_component(parser: &FixtureParser) {
    parser.set_module(
        COMPONENT,
        fixtures::component_module(
            "AppComponent",
            vec![
                NodeFactory::property("selector", NodeFactory::string("app-root")),
                NodeFactory::property("templateUrl", NodeFactory::string("./app.component.html")),
                NodeFactory::property(
                    "styleUrls",
                    NodeFactory::array(vec![NodeFactory::string("./app.component.scss")]),
                ),
            ],
        ),
    );
}

#[test]
fn test_component_resources_become_imports() {
    let mut harness = Harness::new(component_project());
    register_component(&harness.parser);
    harness.build();

    let emitter = harness.compilation.create_file_emitter().unwrap();
    let output = emitter.emit(Path::new(COMPONENT)).unwrap();

    assert_eq!(
        output.content,
        "import __NG_CLI_RESOURCE__0 from 'angular:jit:template:file;./app.component.html';\n\
         import __NG_CLI_RESOURCE__1 from 'angular:jit:style:file;./app.component.scss';\n\
         import { Component } from '@angular/core';\n\
         @Component({ selector: 'app-root', template: __NG_CLI_RESOURCE__0, styles: [__NG_CLI_RESOURCE__1] })\n\
         export class AppComponent {\n\
         }\n"
    );
}

#[test]
fn test_emitted_resource_specifiers_parse_back() {
    let mut harness = Harness::new(component_project());
    register_component(&harness.parser);
    harness.build();

    let output = harness
        .compilation
        .create_file_emitter()
        .unwrap()
        .emit(Path::new(COMPONENT))
        .unwrap();
    let specifiers: Vec<&str> = output
        .content
        .lines()
        .filter_map(|line| line.split('\'').nth(1))
        .filter(|specifier| specifier.starts_with("angular:jit:"))
        .collect();

    let template = parse_jit_uri(specifiers[0]).unwrap();
    assert_eq!(template.kind, JitResourceKind::Template);
    assert_eq!(template.origin, JitResourceOrigin::File);
    assert_eq!(template.specifier, "./app.component.html");

    let style = parse_jit_uri(specifiers[1]).unwrap();
    assert_eq!(style.kind, JitResourceKind::Style);
}

#[test]
fn test_template_markers_are_not_checked() {
    let mut harness = Harness::new(
        ProjectFixture::new().file(
            "/src/main.ts",
            "// @template-error: never reported\n// @semantic-error: reported\n",
        ),
    );
    let (_, diagnostics) = harness.build();

    let codes: Vec<i64> = diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![SEMANTIC_ERROR_CODE]);
    assert!(harness.toolchain.stats().template_diagnostic_calls.is_empty());
    assert_eq!(harness.toolchain.stats().analyze_calls, 0);
}

#[test]
fn test_program_has_no_type_check_shims() {
    let mut harness = Harness::new(component_project());
    let (result, _) = harness.build();

    assert_eq!(
        result.affected_files.paths(),
        vec![PathBuf::from("/src/main.ts"), PathBuf::from(COMPONENT)]
    );
    assert_eq!(result.referenced_files.len(), 2);
}

#[test]
fn test_rebuild_without_changes_has_no_affected_files() {
    let mut harness = Harness::new(component_project());
    harness.build();
    let (result, _) = harness.build();

    assert!(result.affected_files.is_empty());
    assert_eq!(harness.toolchain.stats().reused_old_program, 1);
}
