use crate::ast::expression::{Expression, ExpressionKind, ObjectProperty, PropertyKey};
use crate::ast::statement::{ClassDeclaration, Decorator, Statement};
use crate::ast::{Module, NodeFactory};
use crate::program::{SourceFile, Transformer};

use super::symbols::ImportSymbols;
use super::uri::{generate_jit_file_uri, generate_jit_inline_uri, JitResourceKind};

/// Prefix of the default imports generated for component resources
pub const RESOURCE_IMPORT_PREFIX: &str = "__NG_CLI_RESOURCE__";

/// Rewrites component resource references into imports of virtual modules
/// so the bundler loads templates and styles for just-in-time compilation.
#[derive(Debug, Default)]
pub struct JitResourceTransformer;

impl JitResourceTransformer {
    pub fn new() -> Self {
        JitResourceTransformer
    }
}

/// Resource imports created while visiting one module
#[derive(Default)]
struct ResourceImports {
    declarations: Vec<Statement>,
}

impl ResourceImports {
    /// Add `import __NG_CLI_RESOURCE__N from '<uri>'` and return the identifier
    fn create(&mut self, uri: String) -> Expression {
        let name = format!("{}{}", RESOURCE_IMPORT_PREFIX, self.declarations.len());
        self.declarations
            .push(NodeFactory::default_import(name.clone(), uri));
        NodeFactory::identifier(name)
    }
}

impl Transformer for JitResourceTransformer {
    fn name(&self) -> &str {
        "jit-resources"
    }

    fn transform(&self, _file: &SourceFile, module: &Module) -> Module {
        let symbols = ImportSymbols::from_module(module);
        let mut imports = ResourceImports::default();

        let statements: Vec<Statement> = module
            .statements
            .iter()
            .map(|statement| match statement {
                Statement::Class(class) => {
                    Statement::Class(visit_class(class, &symbols, &mut imports))
                }
                other => other.clone(),
            })
            .collect();

        if imports.declarations.is_empty() {
            return module.clone();
        }

        let mut updated = imports.declarations;
        updated.extend(statements);
        Module::new(updated, module.span)
    }
}

fn visit_class(
    class: &ClassDeclaration,
    symbols: &ImportSymbols,
    imports: &mut ResourceImports,
) -> ClassDeclaration {
    let mut class = class.clone();
    for decorator in &mut class.decorators {
        if symbols.is_framework_decorator(decorator, "Component") {
            visit_component_decorator(decorator, imports);
        }
    }
    class
}

fn visit_component_decorator(decorator: &mut Decorator, imports: &mut ResourceImports) {
    let ExpressionKind::Call(_, args) = &mut decorator.expression.kind else {
        return;
    };
    if args.len() != 1 {
        return;
    }
    let ExpressionKind::Object(properties) = &mut args[0].kind else {
        return;
    };

    let mut style_replacements: Vec<Expression> = Vec::new();
    let mut updated = Vec::with_capacity(properties.len());

    for property in properties.drain(..) {
        if let Some(kept) = visit_component_metadata(property, &mut style_replacements, imports) {
            updated.push(kept);
        }
    }

    if !style_replacements.is_empty() {
        updated.push(NodeFactory::property(
            "styles",
            NodeFactory::array(style_replacements),
        ));
    }

    *properties = updated;
}

/// Returns the property to keep, `None` to drop it
fn visit_component_metadata(
    property: ObjectProperty,
    style_replacements: &mut Vec<Expression>,
    imports: &mut ResourceImports,
) -> Option<ObjectProperty> {
    let name = match &property {
        ObjectProperty::Property {
            key: PropertyKey::Identifier(ident),
            ..
        } => ident.node.clone(),
        ObjectProperty::Property {
            key: PropertyKey::String(value),
            ..
        } => value.clone(),
        _ => return Some(property),
    };
    let ObjectProperty::Property { value, span, .. } = &property else {
        return Some(property);
    };

    match name.as_str() {
        "templateUrl" => {
            let url = match value.as_string_literal() {
                Some(url) if !url.is_empty() => url.to_string(),
                _ => return Some(property),
            };
            let import = imports.create(generate_jit_file_uri(&url, JitResourceKind::Template));
            Some(ObjectProperty::Property {
                key: PropertyKey::Identifier(NodeFactory::ident("template")),
                value: import,
                span: *span,
            })
        }
        "styles" => {
            if let Some(contents) = value.as_string_literal() {
                if !contents.is_empty() {
                    let import =
                        imports.create(generate_jit_inline_uri(contents, JitResourceKind::Style));
                    style_replacements.insert(0, import);
                }
                return None;
            }

            let ExpressionKind::Array(elements) = &value.kind else {
                // Computed style lists cannot be rewritten
                return Some(property);
            };
            let inline: Vec<Expression> = elements
                .iter()
                .filter_map(|element| match element.as_string_literal() {
                    Some("") => None,
                    Some(contents) => Some(
                        imports.create(generate_jit_inline_uri(contents, JitResourceKind::Style)),
                    ),
                    None => Some(element.clone()),
                })
                .collect();
            // Inline styles come before external ones
            style_replacements.splice(0..0, inline);
            None
        }
        "styleUrl" => {
            match value.as_string_literal() {
                Some("") => None,
                Some(url) => {
                    let import = imports.create(generate_jit_file_uri(url, JitResourceKind::Style));
                    style_replacements.push(import);
                    None
                }
                None => Some(property),
            }
        }
        "styleUrls" => {
            let ExpressionKind::Array(elements) = &value.kind else {
                return Some(property);
            };
            let external: Vec<Expression> = elements
                .iter()
                .filter_map(|element| match element.as_string_literal() {
                    Some("") => None,
                    Some(url) => {
                        Some(imports.create(generate_jit_file_uri(url, JitResourceKind::Style)))
                    }
                    None => Some(element.clone()),
                })
                .collect();
            style_replacements.extend(external);
            None
        }
        _ => Some(property),
    }
}
