use crate::ast::expression::ExpressionKind;
use crate::ast::{Module, NodeFactory};
use crate::program::{SourceFile, Transformer};

use super::symbols::ImportSymbols;
use super::visit::rewrite_module_expressions;

const DYNAMIC_PLATFORM_MODULE: &str = "@angular/platform-browser-dynamic";
const DYNAMIC_PLATFORM_FACTORY: &str = "platformBrowserDynamic";
const STATIC_PLATFORM_MODULE: &str = "@angular/platform-browser";
const STATIC_PLATFORM_FACTORY: &str = "platformBrowser";
const BOOTSTRAP_NAMESPACE: &str = "__NgCli_bootstrap_1";

/// Rewrites calls of the dynamic platform factory to the static platform.
/// Ahead-of-time output has no use for the runtime template compiler the
/// dynamic platform pulls in.
#[derive(Debug, Default)]
pub struct ReplaceBootstrapTransformer;

impl ReplaceBootstrapTransformer {
    pub fn new() -> Self {
        ReplaceBootstrapTransformer
    }
}

impl Transformer for ReplaceBootstrapTransformer {
    fn name(&self) -> &str {
        "replace-bootstrap"
    }

    fn transform(&self, _file: &SourceFile, module: &Module) -> Module {
        let symbols = ImportSymbols::from_module(module);
        let mut replaced = false;

        let updated = rewrite_module_expressions(module, &mut |expr| {
            let ExpressionKind::Call(callee, args) = &expr.kind else {
                return None;
            };
            let origin = symbols.resolve(callee)?;
            if origin.module != DYNAMIC_PLATFORM_MODULE || origin.name != DYNAMIC_PLATFORM_FACTORY {
                return None;
            }

            replaced = true;
            Some(NodeFactory::call(
                NodeFactory::member(
                    NodeFactory::identifier(BOOTSTRAP_NAMESPACE),
                    STATIC_PLATFORM_FACTORY,
                ),
                args.clone(),
            ))
        });

        if !replaced {
            return module.clone();
        }

        let mut statements = vec![NodeFactory::namespace_import(
            BOOTSTRAP_NAMESPACE,
            STATIC_PLATFORM_MODULE,
        )];
        statements.extend(updated.statements);
        Module::new(statements, module.span)
    }
}
