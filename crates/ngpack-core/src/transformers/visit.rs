use crate::ast::expression::{ArrowFunction, Expression, ExpressionKind, ObjectProperty, PropertyKey};
use crate::ast::statement::{ClassMember, Statement};
use crate::ast::Module;

/// Rebuild `expr` bottom-up, giving `rewrite` each node after its children
/// were rebuilt. `rewrite` returns `None` to keep a node.
pub fn rewrite_expression(
    expr: &Expression,
    rewrite: &mut dyn FnMut(&Expression) -> Option<Expression>,
) -> Expression {
    let kind = match &expr.kind {
        ExpressionKind::Member(object, name) => {
            ExpressionKind::Member(Box::new(rewrite_expression(object, rewrite)), name.clone())
        }
        ExpressionKind::Call(callee, args) => ExpressionKind::Call(
            Box::new(rewrite_expression(callee, rewrite)),
            rewrite_list(args, rewrite),
        ),
        ExpressionKind::New(callee, args) => ExpressionKind::New(
            Box::new(rewrite_expression(callee, rewrite)),
            rewrite_list(args, rewrite),
        ),
        ExpressionKind::Array(elements) => ExpressionKind::Array(rewrite_list(elements, rewrite)),
        ExpressionKind::Object(properties) => ExpressionKind::Object(
            properties
                .iter()
                .map(|property| match property {
                    ObjectProperty::Property { key, value, span } => ObjectProperty::Property {
                        key: match key {
                            PropertyKey::Computed(inner) => {
                                PropertyKey::Computed(Box::new(rewrite_expression(inner, rewrite)))
                            }
                            other => other.clone(),
                        },
                        value: rewrite_expression(value, rewrite),
                        span: *span,
                    },
                    ObjectProperty::Spread(inner) => {
                        ObjectProperty::Spread(rewrite_expression(inner, rewrite))
                    }
                    shorthand => shorthand.clone(),
                })
                .collect(),
        ),
        ExpressionKind::Arrow(arrow) => ExpressionKind::Arrow(ArrowFunction {
            parameters: arrow.parameters.clone(),
            body: Box::new(rewrite_expression(&arrow.body, rewrite)),
        }),
        ExpressionKind::Spread(inner) => {
            ExpressionKind::Spread(Box::new(rewrite_expression(inner, rewrite)))
        }
        ExpressionKind::Parenthesized(inner) => {
            ExpressionKind::Parenthesized(Box::new(rewrite_expression(inner, rewrite)))
        }
        leaf => leaf.clone(),
    };

    let rebuilt = Expression::new(kind, expr.span);
    rewrite(&rebuilt).unwrap_or(rebuilt)
}

fn rewrite_list(
    items: &[Expression],
    rewrite: &mut dyn FnMut(&Expression) -> Option<Expression>,
) -> Vec<Expression> {
    items
        .iter()
        .map(|item| rewrite_expression(item, rewrite))
        .collect()
}

/// Apply [`rewrite_expression`] to every value expression of a module:
/// statement expressions, variable and property initializers, decorators
/// and class heritage.
pub fn rewrite_module_expressions(
    module: &Module,
    rewrite: &mut dyn FnMut(&Expression) -> Option<Expression>,
) -> Module {
    let statements = module
        .statements
        .iter()
        .map(|statement| match statement {
            Statement::Expression(expr) => Statement::Expression(rewrite_expression(expr, rewrite)),
            Statement::Variable(decl) => {
                let mut decl = decl.clone();
                decl.initializer = decl
                    .initializer
                    .as_ref()
                    .map(|init| rewrite_expression(init, rewrite));
                Statement::Variable(decl)
            }
            Statement::Class(class) => {
                let mut class = class.clone();
                for decorator in &mut class.decorators {
                    decorator.expression = rewrite_expression(&decorator.expression, rewrite);
                }
                class.extends = class
                    .extends
                    .as_ref()
                    .map(|extends| rewrite_expression(extends, rewrite));
                for member in &mut class.members {
                    if let ClassMember::Property(property) = member {
                        property.initializer = property
                            .initializer
                            .as_ref()
                            .map(|init| rewrite_expression(init, rewrite));
                    }
                }
                Statement::Class(class)
            }
            other => other.clone(),
        })
        .collect();

    Module::new(statements, module.span)
}
