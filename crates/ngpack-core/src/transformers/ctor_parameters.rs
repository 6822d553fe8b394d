use crate::ast::expression::{Expression, ExpressionKind, Literal, ObjectProperty};
use crate::ast::statement::{ClassDeclaration, ClassMember, Decorator, Parameter, Statement, TypeAnnotation};
use crate::ast::{Module, NodeFactory};
use crate::program::{SourceFile, Transformer};

/// Moves constructor parameter types and decorators into a static
/// `ctorParameters` property so dependency injection can read them at runtime.
///
/// Applies to decorated classes whose constructor takes parameters. Parameter
/// decorators are removed from the constructor afterwards.
#[derive(Debug, Default)]
pub struct CtorParametersTransformer;

impl CtorParametersTransformer {
    pub fn new() -> Self {
        CtorParametersTransformer
    }
}

impl Transformer for CtorParametersTransformer {
    fn name(&self) -> &str {
        "ctor-parameters"
    }

    fn transform(&self, _file: &SourceFile, module: &Module) -> Module {
        let statements = module
            .statements
            .iter()
            .map(|statement| match statement {
                Statement::Class(class) if needs_ctor_parameters(class) => {
                    Statement::Class(downlevel_class(class))
                }
                other => other.clone(),
            })
            .collect();
        Module::new(statements, module.span)
    }
}

fn needs_ctor_parameters(class: &ClassDeclaration) -> bool {
    let Some(ctor) = class.constructor() else {
        return false;
    };
    !ctor.parameters.is_empty()
        && (!class.decorators.is_empty() || ctor.parameters.iter().any(|p| !p.decorators.is_empty()))
}

fn downlevel_class(class: &ClassDeclaration) -> ClassDeclaration {
    let mut class = class.clone();
    let mut entries = Vec::new();

    for member in &mut class.members {
        if let ClassMember::Constructor(ctor) = member {
            entries = ctor.parameters.iter().map(parameter_metadata).collect();
            for parameter in &mut ctor.parameters {
                parameter.decorators.clear();
            }
        }
    }

    let initializer = NodeFactory::arrow(NodeFactory::array(entries));
    class.members.push(ClassMember::Property(NodeFactory::static_property(
        "ctorParameters",
        initializer,
    )));
    class
}

/// `{ type: T, decorators: [...] }`, or `null` for an untyped undecorated
/// parameter
fn parameter_metadata(parameter: &Parameter) -> Expression {
    if parameter.type_annotation.is_none() && parameter.decorators.is_empty() {
        return Expression::new(ExpressionKind::Literal(Literal::Null), parameter.span);
    }

    let type_expression = match &parameter.type_annotation {
        Some(TypeAnnotation::Reference(segments)) if !segments.is_empty() => {
            NodeFactory::qualified_name(segments)
        }
        _ => NodeFactory::undefined(),
    };

    let mut members = vec![NodeFactory::property("type", type_expression)];
    if !parameter.decorators.is_empty() {
        let decorators = parameter.decorators.iter().map(decorator_metadata).collect();
        members.push(NodeFactory::property("decorators", NodeFactory::array(decorators)));
    }
    NodeFactory::object(members)
}

/// `{ type: Inject, args: [TOKEN] }`
fn decorator_metadata(decorator: &Decorator) -> Expression {
    let (callee, args) = match &decorator.expression.kind {
        ExpressionKind::Call(callee, args) => ((**callee).clone(), args.clone()),
        _ => (decorator.expression.clone(), Vec::new()),
    };

    let mut members: Vec<ObjectProperty> = vec![NodeFactory::property("type", callee)];
    if !args.is_empty() {
        members.push(NodeFactory::property("args", NodeFactory::array(args)));
    }
    NodeFactory::object(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statement::ConstructorDeclaration;
    use crate::codegen::CodeGenerator;
    use crate::span::Span;

    fn parameter(name: &str, ty: Option<TypeAnnotation>, decorators: Vec<Decorator>) -> Parameter {
        Parameter {
            decorators,
            access: None,
            is_readonly: false,
            name: NodeFactory::ident(name),
            type_annotation: ty,
            initializer: None,
            span: Span::dummy(),
        }
    }

    fn decorator(expression: Expression) -> Decorator {
        Decorator {
            expression,
            span: Span::dummy(),
        }
    }

    fn class(decorators: Vec<Decorator>, parameters: Vec<Parameter>) -> Module {
        Module::new(
            vec![Statement::Class(ClassDeclaration {
                decorators,
                is_exported: false,
                is_default_export: false,
                is_abstract: false,
                name: Some(NodeFactory::ident("Service")),
                extends: None,
                members: vec![ClassMember::Constructor(ConstructorDeclaration {
                    parameters,
                    body: "{}".to_string(),
                    span: Span::dummy(),
                })],
                span: Span::dummy(),
            })],
            Span::dummy(),
        )
    }

    fn run(module: Module) -> String {
        let file = SourceFile::new("/src/service.ts", "", module.clone());
        CodeGenerator::new().generate(&CtorParametersTransformer::new().transform(&file, &module))
    }

    #[test]
    fn test_decorated_class_gains_ctor_parameters() {
        let module = class(
            vec![decorator(NodeFactory::call(NodeFactory::identifier("Injectable"), Vec::new()))],
            vec![
                parameter(
                    "http",
                    Some(TypeAnnotation::Reference(vec!["HttpClient".to_string()])),
                    Vec::new(),
                ),
                parameter(
                    "token",
                    Some(TypeAnnotation::Keyword("string".to_string())),
                    vec![decorator(NodeFactory::call(
                        NodeFactory::identifier("Inject"),
                        vec![NodeFactory::identifier("API_URL")],
                    ))],
                ),
                parameter("untyped", None, Vec::new()),
            ],
        );

        let output = run(module);

        assert_eq!(
            output,
            "@Injectable()\nclass Service {\n  constructor(http, token, untyped) {}\n  \
             static ctorParameters = () => [{ type: HttpClient }, { type: undefined, decorators: [{ type: Inject, args: [API_URL] }] }, null];\n}\n"
        );
    }

    #[test]
    fn test_qualified_type_reference() {
        let module = class(
            vec![decorator(NodeFactory::call(NodeFactory::identifier("Injectable"), Vec::new()))],
            vec![parameter(
                "router",
                Some(TypeAnnotation::Reference(vec!["ng".to_string(), "Router".to_string()])),
                Vec::new(),
            )],
        );

        assert!(run(module).contains("static ctorParameters = () => [{ type: ng.Router }];"));
    }

    #[test]
    fn test_undecorated_class_is_untouched() {
        let module = class(
            Vec::new(),
            vec![parameter(
                "http",
                Some(TypeAnnotation::Reference(vec!["HttpClient".to_string()])),
                Vec::new(),
            )],
        );

        assert!(!run(module).contains("ctorParameters"));
    }

    #[test]
    fn test_parameter_decorators_are_stripped() {
        let module = class(
            Vec::new(),
            vec![parameter(
                "value",
                None,
                vec![decorator(NodeFactory::identifier("Optional"))],
            )],
        );
        let file = SourceFile::new("/src/service.ts", "", module.clone());
        let output = CtorParametersTransformer::new().transform(&file, &module);

        let Statement::Class(class) = &output.statements[0] else {
            panic!("expected class");
        };
        assert!(class.constructor().unwrap().parameters[0].decorators.is_empty());
        assert!(CodeGenerator::new()
            .generate(&output)
            .contains("[{ type: undefined, decorators: [{ type: Optional }] }]"));
    }
}
