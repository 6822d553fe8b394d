pub mod expression;
pub mod factory;
pub mod statement;

use crate::span::Span;

pub use expression::{
    ArrowFunction, Expression, ExpressionKind, Literal, ObjectProperty, PropertyKey,
};
pub use factory::NodeFactory;
pub use statement::{
    AccessModifier, ClassDeclaration, ClassMember, ConstructorDeclaration, Decorator,
    ImportBindings, ImportDeclaration, ImportSpecifier, MethodDeclaration, Parameter,
    PropertyDeclaration, Statement, TypeAnnotation, VariableDeclaration, VariableKind,
};

/// Wrapper for AST nodes with span information
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }
}

/// Identifier
pub type Ident = Spanned<String>;

/// Parsed source module. Trees are never mutated in place; transformers
/// build a new `Module` and leave the original shared with the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl Module {
    pub fn new(statements: Vec<Statement>, span: Span) -> Self {
        Module { statements, span }
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportDeclaration> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Import(import) => Some(import),
            _ => None,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDeclaration> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Class(class) => Some(class),
            _ => None,
        })
    }
}
