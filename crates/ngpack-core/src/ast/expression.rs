use super::Ident;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Expression { kind, span }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Text of a string literal or a substitution-free template literal
    pub fn as_string_literal(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Literal(Literal::String(value)) => Some(value),
            ExpressionKind::Template(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Identifier(String),
    Literal(Literal),
    /// Template literal without substitutions
    Template(String),
    Member(Box<Expression>, Ident),
    Call(Box<Expression>, Vec<Expression>),
    New(Box<Expression>, Vec<Expression>),
    Array(Vec<Expression>),
    Object(Vec<ObjectProperty>),
    Arrow(ArrowFunction),
    Spread(Box<Expression>),
    Parenthesized(Box<Expression>),
    /// Source text the parser did not model
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Undefined,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProperty {
    Property {
        key: PropertyKey,
        value: Expression,
        span: Span,
    },
    Shorthand(Ident),
    Spread(Expression),
}

impl ObjectProperty {
    /// Static name of the property, if it has one
    pub fn name(&self) -> Option<&str> {
        match self {
            ObjectProperty::Property { key, .. } => key.name(),
            ObjectProperty::Shorthand(ident) => Some(&ident.node),
            ObjectProperty::Spread(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(Ident),
    String(String),
    Computed(Box<Expression>),
}

impl PropertyKey {
    pub fn name(&self) -> Option<&str> {
        match self {
            PropertyKey::Identifier(ident) => Some(&ident.node),
            PropertyKey::String(value) => Some(value),
            PropertyKey::Computed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFunction {
    pub parameters: Vec<Ident>,
    pub body: Box<Expression>,
}
