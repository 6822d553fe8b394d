use crate::ast::expression::{Expression, ExpressionKind, Literal, ObjectProperty, PropertyKey};
use crate::ast::statement::{
    ClassDeclaration, ClassMember, ImportBindings, ImportDeclaration, Statement,
    VariableDeclaration,
};
use crate::ast::Module;

/// Prints a module as JavaScript. Type annotations, type-only imports and
/// parameter decorators are erased; class and member decorators are kept.
pub struct CodeGenerator {
    output: String,
    indent_level: usize,
    indent_str: String,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator {
            output: String::new(),
            indent_level: 0,
            indent_str: "  ".to_string(),
        }
    }

    pub fn generate(mut self, module: &Module) -> String {
        for statement in &module.statements {
            self.generate_statement(statement);
        }
        self.output
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self, s: &str) {
        self.write_indent();
        self.write(s);
        self.write("\n");
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            let indent = self.indent_str.clone();
            self.write(&indent);
        }
    }

    fn generate_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Import(import) => self.generate_import(import),
            Statement::Class(class) => self.generate_class(class),
            Statement::Variable(decl) => self.generate_variable(decl),
            Statement::Expression(expr) => {
                let text = format!("{};", print_expression(expr));
                self.writeln(&text);
            }
            Statement::Raw(raw) => {
                let text = raw.node.trim_end().to_string();
                self.writeln(&text);
            }
        }
    }

    fn generate_import(&mut self, import: &ImportDeclaration) {
        if import.type_only {
            return;
        }

        let mut clauses = Vec::new();
        if let Some(default) = &import.default {
            clauses.push(default.node.clone());
        }
        match &import.bindings {
            Some(ImportBindings::Namespace(local)) => clauses.push(format!("* as {}", local.node)),
            Some(ImportBindings::Named(specifiers)) => {
                let names: Vec<String> = specifiers
                    .iter()
                    .filter(|s| !s.type_only)
                    .map(|s| match &s.imported {
                        Some(imported) => format!("{} as {}", imported.node, s.local.node),
                        None => s.local.node.clone(),
                    })
                    .collect();
                if !names.is_empty() {
                    clauses.push(format!("{{ {} }}", names.join(", ")));
                }
            }
            None => {}
        }

        let source = quote(&import.source);
        let line = if clauses.is_empty() {
            format!("import {};", source)
        } else {
            format!("import {} from {};", clauses.join(", "), source)
        };
        self.writeln(&line);
    }

    fn generate_variable(&mut self, decl: &VariableDeclaration) {
        let mut line = String::new();
        if decl.is_exported {
            line.push_str("export ");
        }
        line.push_str(decl.kind.as_str());
        line.push(' ');
        line.push_str(&decl.name.node);
        if let Some(init) = &decl.initializer {
            line.push_str(" = ");
            line.push_str(&print_expression(init));
        }
        line.push(';');
        self.writeln(&line);
    }

    fn generate_class(&mut self, class: &ClassDeclaration) {
        for decorator in &class.decorators {
            let text = format!("@{}", print_expression(&decorator.expression));
            self.writeln(&text);
        }

        let mut header = String::new();
        if class.is_exported {
            header.push_str("export ");
        }
        if class.is_default_export {
            header.push_str("default ");
        }
        header.push_str("class");
        if let Some(name) = &class.name {
            header.push(' ');
            header.push_str(&name.node);
        }
        if let Some(extends) = &class.extends {
            header.push_str(" extends ");
            header.push_str(&print_expression(extends));
        }
        header.push_str(" {");
        self.writeln(&header);

        self.indent();
        for member in &class.members {
            self.generate_member(member);
        }
        self.dedent();
        self.writeln("}");
    }

    fn generate_member(&mut self, member: &ClassMember) {
        match member {
            ClassMember::Constructor(ctor) => {
                let params: Vec<String> = ctor
                    .parameters
                    .iter()
                    .map(|p| match &p.initializer {
                        Some(init) => format!("{} = {}", p.name.node, print_expression(init)),
                        None => p.name.node.clone(),
                    })
                    .collect();
                let line = format!("constructor({}) {}", params.join(", "), ctor.body.trim());
                self.writeln(&line);
            }
            ClassMember::Property(prop) => {
                for decorator in &prop.decorators {
                    let text = format!("@{}", print_expression(&decorator.expression));
                    self.writeln(&text);
                }
                let mut line = String::new();
                if prop.is_static {
                    line.push_str("static ");
                }
                line.push_str(&print_property_key(&prop.name));
                if let Some(init) = &prop.initializer {
                    line.push_str(" = ");
                    line.push_str(&print_expression(init));
                }
                line.push(';');
                self.writeln(&line);
            }
            ClassMember::Method(method) => {
                for decorator in &method.decorators {
                    let text = format!("@{}", print_expression(&decorator.expression));
                    self.writeln(&text);
                }
                let prefix = if method.is_static { "static " } else { "" };
                let line = format!(
                    "{}{}{}",
                    prefix,
                    print_property_key(&method.name),
                    method.text.trim()
                );
                self.writeln(&line);
            }
            ClassMember::Raw(raw) => {
                let text = raw.node.trim_end().to_string();
                self.writeln(&text);
            }
        }
    }
}

/// Print a single expression on one line
pub fn print_expression(expr: &Expression) -> String {
    match &expr.kind {
        ExpressionKind::Identifier(name) => name.clone(),
        ExpressionKind::Literal(literal) => match literal {
            Literal::Null => "null".to_string(),
            Literal::Undefined => "undefined".to_string(),
            Literal::Boolean(value) => value.to_string(),
            Literal::Number(value) => value.to_string(),
            Literal::String(value) => quote(value),
        },
        ExpressionKind::Template(value) => format!("`{}`", value),
        ExpressionKind::Member(object, name) => {
            format!("{}.{}", print_expression(object), name.node)
        }
        ExpressionKind::Call(callee, args) => {
            format!("{}({})", print_expression(callee), print_list(args))
        }
        ExpressionKind::New(callee, args) => {
            format!("new {}({})", print_expression(callee), print_list(args))
        }
        ExpressionKind::Array(elements) => format!("[{}]", print_list(elements)),
        ExpressionKind::Object(properties) => {
            if properties.is_empty() {
                return "{}".to_string();
            }
            let items: Vec<String> = properties.iter().map(print_object_property).collect();
            format!("{{ {} }}", items.join(", "))
        }
        ExpressionKind::Arrow(arrow) => {
            let params: Vec<&str> = arrow.parameters.iter().map(|p| p.node.as_str()).collect();
            let body = print_expression(&arrow.body);
            // Object bodies need parentheses to not parse as a block
            let body = if matches!(arrow.body.kind, ExpressionKind::Object(_)) {
                format!("({})", body)
            } else {
                body
            };
            format!("({}) => {}", params.join(", "), body)
        }
        ExpressionKind::Spread(inner) => format!("...{}", print_expression(inner)),
        ExpressionKind::Parenthesized(inner) => format!("({})", print_expression(inner)),
        ExpressionKind::Raw(text) => text.clone(),
    }
}

fn print_list(items: &[Expression]) -> String {
    items
        .iter()
        .map(print_expression)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_object_property(property: &ObjectProperty) -> String {
    match property {
        ObjectProperty::Property { key, value, .. } => {
            format!("{}: {}", print_property_key(key), print_expression(value))
        }
        ObjectProperty::Shorthand(ident) => ident.node.clone(),
        ObjectProperty::Spread(expr) => format!("...{}", print_expression(expr)),
    }
}

fn print_property_key(key: &PropertyKey) -> String {
    match key {
        PropertyKey::Identifier(ident) => ident.node.clone(),
        PropertyKey::String(value) => quote(value),
        PropertyKey::Computed(expr) => format!("[{}]", print_expression(expr)),
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statement::{Decorator, ImportSpecifier};
    use crate::ast::NodeFactory;
    use crate::span::Span;

    #[test]
    fn test_print_imports() {
        let module = Module::new(
            vec![
                Statement::Import(ImportDeclaration {
                    default: None,
                    bindings: Some(ImportBindings::Named(vec![
                        ImportSpecifier {
                            imported: Some(NodeFactory::ident("Component")),
                            local: NodeFactory::ident("Cmp"),
                            type_only: false,
                            span: Span::dummy(),
                        },
                        ImportSpecifier {
                            imported: None,
                            local: NodeFactory::ident("OnInit"),
                            type_only: true,
                            span: Span::dummy(),
                        },
                    ])),
                    type_only: false,
                    source: "@angular/core".to_string(),
                    span: Span::dummy(),
                }),
                NodeFactory::namespace_import("i0", "@angular/platform-browser"),
            ],
            Span::dummy(),
        );

        let output = CodeGenerator::new().generate(&module);

        assert_eq!(
            output,
            "import { Component as Cmp } from '@angular/core';\nimport * as i0 from '@angular/platform-browser';\n"
        );
    }

    #[test]
    fn test_print_decorated_class() {
        let class = ClassDeclaration {
            decorators: vec![Decorator {
                expression: NodeFactory::call(
                    NodeFactory::identifier("Component"),
                    vec![NodeFactory::object(vec![NodeFactory::property(
                        "template",
                        NodeFactory::identifier("__NG_CLI_RESOURCE__0"),
                    )])],
                ),
                span: Span::dummy(),
            }],
            is_exported: true,
            is_default_export: false,
            is_abstract: false,
            name: Some(NodeFactory::ident("AppComponent")),
            extends: None,
            members: vec![ClassMember::Property(NodeFactory::static_property(
                "ctorParameters",
                NodeFactory::arrow(NodeFactory::array(vec![])),
            ))],
            span: Span::dummy(),
        };
        let module = Module::new(vec![Statement::Class(class)], Span::dummy());

        let output = CodeGenerator::new().generate(&module);

        assert_eq!(
            output,
            "@Component({ template: __NG_CLI_RESOURCE__0 })\nexport class AppComponent {\n  static ctorParameters = () => [];\n}\n"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\nb"), "'a\\nb'");
    }
}
