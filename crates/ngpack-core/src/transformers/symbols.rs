use rustc_hash::FxHashMap;

use crate::ast::expression::{Expression, ExpressionKind};
use crate::ast::statement::{Decorator, ImportBindings};
use crate::ast::Module;

/// Module of the framework's core runtime
pub const FRAMEWORK_CORE_MODULE: &str = "@angular/core";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Named(String),
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportedSymbol {
    module: String,
    binding: Binding,
}

/// Exported symbol an expression refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolOrigin<'a> {
    pub module: &'a str,
    pub name: &'a str,
}

/// Local names introduced by a module's value imports
#[derive(Debug, Default)]
pub struct ImportSymbols {
    locals: FxHashMap<String, ImportedSymbol>,
}

impl ImportSymbols {
    pub fn from_module(module: &Module) -> Self {
        let mut locals = FxHashMap::default();

        for import in module.imports().filter(|import| !import.type_only) {
            if let Some(default) = &import.default {
                locals.insert(
                    default.node.clone(),
                    ImportedSymbol {
                        module: import.source.clone(),
                        binding: Binding::Default,
                    },
                );
            }

            match &import.bindings {
                Some(ImportBindings::Namespace(local)) => {
                    locals.insert(
                        local.node.clone(),
                        ImportedSymbol {
                            module: import.source.clone(),
                            binding: Binding::Namespace,
                        },
                    );
                }
                Some(ImportBindings::Named(specifiers)) => {
                    for specifier in specifiers.iter().filter(|s| !s.type_only) {
                        locals.insert(
                            specifier.local.node.clone(),
                            ImportedSymbol {
                                module: import.source.clone(),
                                binding: Binding::Named(specifier.imported_name().to_string()),
                            },
                        );
                    }
                }
                None => {}
            }
        }

        ImportSymbols { locals }
    }

    /// Resolve `name`, `alias` or `ns.name` to the export it refers to
    pub fn resolve<'a>(&'a self, expr: &'a Expression) -> Option<SymbolOrigin<'a>> {
        match &expr.kind {
            ExpressionKind::Identifier(local) => {
                let symbol = self.locals.get(local)?;
                let name = match &symbol.binding {
                    Binding::Named(name) => name.as_str(),
                    Binding::Default => "default",
                    Binding::Namespace => return None,
                };
                Some(SymbolOrigin {
                    module: &symbol.module,
                    name,
                })
            }
            ExpressionKind::Member(object, property) => {
                let local = object.as_identifier()?;
                let symbol = self.locals.get(local)?;
                if symbol.binding != Binding::Namespace {
                    return None;
                }
                Some(SymbolOrigin {
                    module: &symbol.module,
                    name: &property.node,
                })
            }
            ExpressionKind::Parenthesized(inner) => self.resolve(inner),
            _ => None,
        }
    }

    /// Origin of a decorator's callee, whether it is called or not
    pub fn decorator_origin<'a>(&'a self, decorator: &'a Decorator) -> Option<SymbolOrigin<'a>> {
        match &decorator.expression.kind {
            ExpressionKind::Call(callee, _) => self.resolve(callee),
            _ => self.resolve(&decorator.expression),
        }
    }

    /// True when `decorator` is `name` from the framework core module
    pub fn is_framework_decorator(&self, decorator: &Decorator, name: &str) -> bool {
        self.decorator_origin(decorator)
            .map(|origin| origin.module == FRAMEWORK_CORE_MODULE && origin.name == name)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statement::{ImportDeclaration, ImportSpecifier, Statement};
    use crate::ast::NodeFactory;
    use crate::span::Span;

    fn named_import(imported: &str, local: &str, source: &str) -> Statement {
        let aliased = imported != local;
        Statement::Import(ImportDeclaration {
            default: None,
            bindings: Some(ImportBindings::Named(vec![ImportSpecifier {
                imported: aliased.then(|| NodeFactory::ident(imported)),
                local: NodeFactory::ident(local),
                type_only: false,
                span: Span::dummy(),
            }])),
            type_only: false,
            source: source.to_string(),
            span: Span::dummy(),
        })
    }

    fn decorator(callee: Expression) -> Decorator {
        Decorator {
            expression: NodeFactory::call(callee, vec![NodeFactory::object(Vec::new())]),
            span: Span::dummy(),
        }
    }

    fn symbols(statements: Vec<Statement>) -> ImportSymbols {
        ImportSymbols::from_module(&Module::new(statements, Span::dummy()))
    }

    #[test]
    fn test_named_and_aliased_imports() {
        let symbols = symbols(vec![
            named_import("Component", "Component", "@angular/core"),
            named_import("Directive", "Dir", "@angular/core"),
        ]);

        assert!(symbols.is_framework_decorator(&decorator(NodeFactory::identifier("Component")), "Component"));
        assert!(symbols.is_framework_decorator(&decorator(NodeFactory::identifier("Dir")), "Directive"));
        assert!(!symbols.is_framework_decorator(&decorator(NodeFactory::identifier("Dir")), "Component"));
    }

    #[test]
    fn test_namespace_import() {
        let symbols = symbols(vec![NodeFactory::namespace_import("core", "@angular/core")]);
        let callee = NodeFactory::member(NodeFactory::identifier("core"), "Component");

        assert!(symbols.is_framework_decorator(&decorator(callee), "Component"));
    }

    #[test]
    fn test_default_import_resolves_to_default() {
        let symbols = symbols(vec![NodeFactory::default_import("Component", "my-lib")]);
        let ident = NodeFactory::identifier("Component");
        let origin = symbols.resolve(&ident).unwrap();

        assert_eq!(origin, SymbolOrigin { module: "my-lib", name: "default" });
    }

    #[test]
    fn test_same_name_from_other_module_is_not_framework() {
        let symbols = symbols(vec![named_import("Component", "Component", "my-ui-lib")]);
        assert!(!symbols.is_framework_decorator(&decorator(NodeFactory::identifier("Component")), "Component"));
    }

    #[test]
    fn test_unimported_identifier_has_no_origin() {
        let symbols = symbols(Vec::new());
        assert!(symbols.resolve(&NodeFactory::identifier("Component")).is_none());
    }
}
