use super::expression::{ArrowFunction, Expression, ExpressionKind, Literal, ObjectProperty, PropertyKey};
use super::statement::{
    ImportBindings, ImportDeclaration, PropertyDeclaration, Statement,
};
use super::{Ident, Spanned};
use crate::span::Span;

/// Builds synthesized nodes. Everything it creates carries a dummy span.
pub struct NodeFactory;

impl NodeFactory {
    pub fn ident(name: impl Into<String>) -> Ident {
        Spanned::new(name.into(), Span::dummy())
    }

    pub fn identifier(name: impl Into<String>) -> Expression {
        Self::expr(ExpressionKind::Identifier(name.into()))
    }

    pub fn string(value: impl Into<String>) -> Expression {
        Self::expr(ExpressionKind::Literal(Literal::String(value.into())))
    }

    pub fn undefined() -> Expression {
        Self::expr(ExpressionKind::Literal(Literal::Undefined))
    }

    pub fn member(object: Expression, name: impl Into<String>) -> Expression {
        Self::expr(ExpressionKind::Member(Box::new(object), Self::ident(name)))
    }

    /// `a.b.c` from its segments
    pub fn qualified_name(segments: &[String]) -> Expression {
        let mut iter = segments.iter();
        let first = iter
            .next()
            .map(|name| Self::identifier(name.clone()))
            .unwrap_or_else(Self::undefined);
        iter.fold(first, |object, name| Self::member(object, name.clone()))
    }

    pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
        Self::expr(ExpressionKind::Call(Box::new(callee), arguments))
    }

    pub fn array(elements: Vec<Expression>) -> Expression {
        Self::expr(ExpressionKind::Array(elements))
    }

    pub fn object(properties: Vec<ObjectProperty>) -> Expression {
        Self::expr(ExpressionKind::Object(properties))
    }

    pub fn property(name: impl Into<String>, value: Expression) -> ObjectProperty {
        ObjectProperty::Property {
            key: PropertyKey::Identifier(Self::ident(name)),
            value,
            span: Span::dummy(),
        }
    }

    /// `() => body`
    pub fn arrow(body: Expression) -> Expression {
        Self::expr(ExpressionKind::Arrow(ArrowFunction {
            parameters: Vec::new(),
            body: Box::new(body),
        }))
    }

    pub fn parenthesized(inner: Expression) -> Expression {
        Self::expr(ExpressionKind::Parenthesized(Box::new(inner)))
    }

    /// `import local from 'source';`
    pub fn default_import(local: impl Into<String>, source: impl Into<String>) -> Statement {
        Statement::Import(ImportDeclaration {
            default: Some(Self::ident(local)),
            bindings: None,
            type_only: false,
            source: source.into(),
            span: Span::dummy(),
        })
    }

    /// `import * as local from 'source';`
    pub fn namespace_import(local: impl Into<String>, source: impl Into<String>) -> Statement {
        Statement::Import(ImportDeclaration {
            default: None,
            bindings: Some(ImportBindings::Namespace(Self::ident(local))),
            type_only: false,
            source: source.into(),
            span: Span::dummy(),
        })
    }

    /// `static name = initializer;`
    pub fn static_property(name: impl Into<String>, initializer: Expression) -> PropertyDeclaration {
        PropertyDeclaration {
            decorators: Vec::new(),
            access: None,
            is_static: true,
            is_readonly: false,
            name: PropertyKey::Identifier(Self::ident(name)),
            type_annotation: None,
            initializer: Some(initializer),
            span: Span::dummy(),
        }
    }

    fn expr(kind: ExpressionKind) -> Expression {
        Expression::new(kind, Span::dummy())
    }
}
