//! Test fixtures - projects, source snippets and syntax trees

use anyhow::Context;
use indexmap::IndexMap;
use ngpack_core::ast::statement::{
    ClassDeclaration, Decorator, ImportBindings, ImportDeclaration, ImportSpecifier, Statement,
};
use ngpack_core::ast::{Module, NodeFactory, ObjectProperty};
use ngpack_core::fs::MockFileSystem;
use ngpack_core::span::Span;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Root component with an external template and stylesheet
pub fn app_component_source() -> &'static str {
    r#"import { Component } from '@angular/core';

@Component({
  selector: 'app-root',
  templateUrl: './app.component.html',
  styleUrls: ['./app.component.scss'],
})
export class AppComponent {}
// @resource: ./app.component.html
// @resource: ./app.component.scss
"#
}

pub fn main_source() -> &'static str {
    r#"import { platformBrowserDynamic } from '@angular/platform-browser-dynamic';
import { AppModule } from './app/app.module';

platformBrowserDynamic().bootstrapModule(AppModule);
"#
}

/// Program with a type error
pub fn type_error_source() -> &'static str {
    r#"export const count: number = 'one';
// @semantic-error: Type 'string' is not assignable to type 'number'.
"#
}

/// An in-memory project
#[derive(Debug, Clone, Default)]
pub struct ProjectFixture {
    files: IndexMap<PathBuf, String>,
}

impl ProjectFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Paths of every `.ts` file that is not a declaration
    pub fn root_names(&self) -> Vec<PathBuf> {
        self.files
            .keys()
            .filter(|path| {
                let name = path.to_string_lossy();
                name.ends_with(".ts") && !name.ends_with(".d.ts")
            })
            .cloned()
            .collect()
    }

    pub fn mock_file_system(&self) -> Arc<MockFileSystem> {
        let fs = MockFileSystem::new();
        for (path, contents) in &self.files {
            fs.add_file(path.clone(), contents.clone());
        }
        Arc::new(fs)
    }

    /// Write the project below `root`. Fixture paths are taken relative to it.
    pub fn write_to(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.files.len());
        for (path, contents) in &self.files {
            let relative = path.strip_prefix("/").unwrap_or(path);
            let target = root.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&target, contents)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            written.push(target);
        }
        Ok(written)
    }
}

/// `import { a, b } from '<source>';`
pub fn named_import(names: &[&str], source: &str) -> Statement {
    Statement::Import(ImportDeclaration {
        default: None,
        bindings: Some(ImportBindings::Named(
            names
                .iter()
                .map(|name| ImportSpecifier {
                    imported: None,
                    local: NodeFactory::ident(*name),
                    type_only: false,
                    span: Span::dummy(),
                })
                .collect(),
        )),
        type_only: false,
        source: source.to_string(),
        span: Span::dummy(),
    })
}

/// `@Component({...}) export class <name> {}`
pub fn component_class(name: &str, properties: Vec<ObjectProperty>) -> Statement {
    Statement::Class(ClassDeclaration {
        decorators: vec![Decorator {
            expression: NodeFactory::call(
                NodeFactory::identifier("Component"),
                vec![NodeFactory::object(properties)],
            ),
            span: Span::dummy(),
        }],
        is_exported: true,
        is_default_export: false,
        is_abstract: false,
        name: Some(NodeFactory::ident(name)),
        extends: None,
        members: Vec::new(),
        span: Span::dummy(),
    })
}

/// Tree of a component file importing `Component` from the framework core
pub fn component_module(name: &str, properties: Vec<ObjectProperty>) -> Module {
    Module::new(
        vec![
            named_import(&["Component"], "@angular/core"),
            component_class(name, properties),
        ],
        Span::dummy(),
    )
}
