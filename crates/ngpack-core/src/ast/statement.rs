use super::expression::{Expression, PropertyKey};
use super::{Ident, Spanned};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Import(ImportDeclaration),
    Class(ClassDeclaration),
    Variable(VariableDeclaration),
    Expression(Expression),
    /// Source text the parser did not model; printed verbatim
    Raw(Spanned<String>),
}

/// `import a, { b as c } from 'x'`, `import * as ns from 'x'` or `import 'x'`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
    pub default: Option<Ident>,
    pub bindings: Option<ImportBindings>,
    pub type_only: bool,
    pub source: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportBindings {
    Namespace(Ident),
    Named(Vec<ImportSpecifier>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpecifier {
    /// Exported name when aliased (`imported as local`)
    pub imported: Option<Ident>,
    pub local: Ident,
    pub type_only: bool,
    pub span: Span,
}

impl ImportSpecifier {
    pub fn imported_name(&self) -> &str {
        self.imported
            .as_ref()
            .map(|ident| ident.node.as_str())
            .unwrap_or(&self.local.node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessModifier {
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub decorators: Vec<Decorator>,
    pub is_exported: bool,
    pub is_default_export: bool,
    pub is_abstract: bool,
    pub name: Option<Ident>,
    pub extends: Option<Expression>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

impl ClassDeclaration {
    pub fn constructor(&self) -> Option<&ConstructorDeclaration> {
        self.members.iter().find_map(|member| match member {
            ClassMember::Constructor(ctor) => Some(ctor),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Constructor(ConstructorDeclaration),
    Property(PropertyDeclaration),
    Method(MethodDeclaration),
    Raw(Spanned<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDeclaration {
    pub parameters: Vec<Parameter>,
    /// Body text including the braces
    pub body: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub decorators: Vec<Decorator>,
    pub access: Option<AccessModifier>,
    pub is_readonly: bool,
    pub name: Ident,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    pub decorators: Vec<Decorator>,
    pub access: Option<AccessModifier>,
    pub is_static: bool,
    pub is_readonly: bool,
    pub name: PropertyKey,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDeclaration {
    pub decorators: Vec<Decorator>,
    pub is_static: bool,
    pub name: PropertyKey,
    /// Parameter list and body text, starting at `(`
    pub text: String,
    pub span: Span,
}

/// Type annotation as far as runtime reflection needs it
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    /// `Foo`, `ns.Foo` or `Foo<T>`; type arguments are dropped
    Reference(Vec<String>),
    /// `string`, `number`, `any`, ...
    Keyword(String),
    /// Union, literal, function and other types with no runtime value
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Const,
    Let,
    Var,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Const => "const",
            VariableKind::Let => "let",
            VariableKind::Var => "var",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub is_exported: bool,
    pub name: Ident,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expression>,
    pub span: Span,
}
