//! Statement lowering.

use crate::ast::{JumpMode, Statement, Type, Variable};

use super::expr::LoweringContext;
use super::names::fix_name;
use super::types::{array_suffix, qualifier_prefix};

impl LoweringContext<'_> {
    /// Appends the GLSL form of `stmt` to `out`, newline-terminated.
    pub fn statement(&mut self, out: &mut String, stmt: &Statement) {
        match stmt {
            Statement::Compound { statements } => {
                out.push_str("{\n");
                for s in statements {
                    self.statement(out, s);
                }
                out.push_str("}\n");
            }
            Statement::DeclaratorList { declarators } => {
                for var in declarators {
                    let decl = self.declaration(var);
                    out.push_str(&decl);
                    out.push_str(";\n");
                }
            }
            Statement::Expression { expression } => {
                let text = self.expression(expression);
                out.push_str(&text);
                out.push_str(";\n");
            }
            Statement::If {
                condition,
                on_true,
                on_false,
            } => {
                let c = self.condition(condition);
                out.push_str(&format!("if ({c})\n"));
                self.body(out, on_true.as_deref());
                if let Some(on_false) = on_false {
                    out.push_str("else\n");
                    self.statement(out, on_false);
                }
            }
            Statement::Switch { test, cases } => {
                let t = self.expression(test);
                out.push_str(&format!("switch ({t})\n{{\n"));
                for case in cases {
                    for label in &case.labels {
                        match label {
                            Some(value) => {
                                let v = self.expression(value);
                                out.push_str(&format!("case {v}:\n"));
                            }
                            None => out.push_str("default:\n"),
                        }
                    }
                    self.statement(out, &case.body);
                }
                out.push_str("}\n");
            }
            Statement::For {
                initialization,
                condition,
                increment,
                body,
            } => {
                let init = match initialization.as_deref() {
                    Some(Statement::DeclaratorList { declarators }) => {
                        self.single_declaration(declarators)
                    }
                    Some(Statement::Expression { expression }) => self.expression(expression),
                    Some(other) => {
                        // Anything else cannot appear in a for-init clause; hoist it.
                        self.statement(out, other);
                        String::new()
                    }
                    None => String::new(),
                };
                let cond = match condition {
                    Some(c) => self.condition(c),
                    None => String::new(),
                };
                let incr = match increment {
                    Some(e) => self.expression(e),
                    None => String::new(),
                };
                out.push_str(&format!("for ({init}; {cond}; {incr})\n"));
                self.body(out, body.as_deref());
            }
            Statement::While {
                condition,
                body,
                do_while,
            } => {
                let c = self.condition(condition);
                if *do_while {
                    out.push_str("do\n");
                    self.body(out, body.as_deref());
                    out.push_str(&format!("while ({c});\n"));
                } else {
                    out.push_str(&format!("while ({c})\n"));
                    self.body(out, body.as_deref());
                }
            }
            Statement::Return { value, discard } => {
                if *discard {
                    out.push_str("discard;\n");
                    return;
                }
                match value {
                    Some(value) => {
                        let ret = self.return_type();
                        let v = self.expression_as(value, &ret);
                        out.push_str(&format!("return {v};\n"));
                    }
                    None => out.push_str("return;\n"),
                }
            }
            Statement::Jump { mode } => match mode {
                JumpMode::Break => out.push_str("break;\n"),
                JumpMode::Continue => out.push_str("continue;\n"),
            },
        }
    }

    fn body(&mut self, out: &mut String, body: Option<&Statement>) {
        match body {
            Some(s) => self.statement(out, s),
            None => out.push_str("\t;\n"),
        }
    }

    fn return_type(&self) -> Type {
        self.current_function
            .and_then(|id| self.tree.function(id))
            .map(|f| f.return_type.clone())
            .unwrap_or_default()
    }

    fn initializer(&mut self, var: &Variable) -> String {
        match &var.initializer {
            Some(init) => format!(" = {}", self.expression_as(init, &var.ty)),
            None => String::new(),
        }
    }

    /// `<qualifiers> <type> <name>[N] = <init>` without the terminator.
    pub fn declaration(&mut self, var: &Variable) -> String {
        let init = self.initializer(var);
        format!(
            "{}{} {}{}{}",
            qualifier_prefix(&var.ty),
            self.type_name(&var.ty.element()),
            fix_name(&var.name, &var.namespace),
            array_suffix(&var.ty),
            init
        )
    }

    /// Declarators sharing one type in a single comma-separated statement.
    fn single_declaration(&mut self, declarators: &[Variable]) -> String {
        let mut parts = Vec::with_capacity(declarators.len());
        for (i, var) in declarators.iter().enumerate() {
            if i == 0 {
                parts.push(self.declaration(var));
            } else {
                let init = self.initializer(var);
                parts.push(format!(
                    "{}{}{}",
                    fix_name(&var.name, &var.namespace),
                    array_suffix(&var.ty),
                    init
                ));
            }
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        AssignOp, BaseClass, BinaryOp, Case, Expression, ExpressionKind, Function, FunctionId,
        LiteralValue, NodeTree, UnaryOp,
    };
    use crate::diagnostics::Diagnostics;

    fn var(name: &str, ty: Type) -> Expression {
        Expression::new(
            ty,
            ExpressionKind::LValue {
                name: name.to_string(),
                namespace: String::new(),
            },
        )
    }

    fn int_lit(v: i32) -> Expression {
        Expression::new(
            Type::scalar(BaseClass::Int),
            ExpressionKind::Literal {
                value: LiteralValue::Int(vec![v]),
            },
        )
    }

    fn lower(tree: &NodeTree, current: Option<FunctionId>, stmt: &Statement) -> String {
        let mut diags = Diagnostics::new();
        let mut ctx = LoweringContext::new(tree, &mut diags);
        ctx.current_function = current;
        let mut out = String::new();
        ctx.statement(&mut out, stmt);
        out
    }

    #[test]
    fn test_declaration_with_cast_initializer() {
        let mut v = Variable::new("color", Type::vector(BaseClass::Float, 3));
        v.initializer = Some(var("src", Type::vector(BaseClass::Float, 4)));
        let stmt = Statement::DeclaratorList {
            declarators: vec![v],
        };
        assert_eq!(lower(&NodeTree::default(), None, &stmt), "vec3 color = src.xyz;\n");
    }

    #[test]
    fn test_if_with_empty_branch() {
        let stmt = Statement::If {
            condition: var("x", Type::scalar(BaseClass::Float)),
            on_true: None,
            on_false: Some(Box::new(Statement::Jump {
                mode: JumpMode::Break,
            })),
        };
        assert_eq!(
            lower(&NodeTree::default(), None, &stmt),
            "if (bool(x))\n\t;\nelse\nbreak;\n"
        );
    }

    #[test]
    fn test_for_loop_with_declarator_init() {
        let mut i = Variable::new("i", Type::scalar(BaseClass::Int));
        i.initializer = Some(int_lit(0));
        let mut j = Variable::new("j", Type::scalar(BaseClass::Int));
        j.initializer = Some(int_lit(4));
        let stmt = Statement::For {
            initialization: Some(Box::new(Statement::DeclaratorList {
                declarators: vec![i, j],
            })),
            condition: Some(Expression::new(
                Type::scalar(BaseClass::Bool),
                ExpressionKind::Binary {
                    op: BinaryOp::Less,
                    left: Box::new(var("i", Type::scalar(BaseClass::Int))),
                    right: Box::new(var("j", Type::scalar(BaseClass::Int))),
                },
            )),
            increment: Some(Expression::new(
                Type::scalar(BaseClass::Int),
                ExpressionKind::Unary {
                    op: UnaryOp::PostIncrease,
                    operand: Box::new(var("i", Type::scalar(BaseClass::Int))),
                },
            )),
            body: Some(Box::new(Statement::Compound { statements: vec![] })),
        };
        assert_eq!(
            lower(&NodeTree::default(), None, &stmt),
            "for (int i = 0, j = 4; (i < j); i++)\n{\n}\n"
        );
    }

    #[test]
    fn test_return_casts_to_function_type() {
        let tree = NodeTree {
            functions: vec![Function {
                name: "f".to_string(),
                namespace: String::new(),
                return_type: Type::vector(BaseClass::Float, 4),
                return_semantic: String::new(),
                parameters: vec![],
                definition: None,
                location: Default::default(),
            }],
            ..Default::default()
        };
        let stmt = Statement::Return {
            value: Some(var("c", Type::vector(BaseClass::Float, 3))),
            discard: false,
        };
        assert_eq!(lower(&tree, Some(FunctionId(0)), &stmt), "return c.xyzz;\n");
        let stmt = Statement::Return {
            value: None,
            discard: true,
        };
        assert_eq!(lower(&tree, Some(FunctionId(0)), &stmt), "discard;\n");
    }

    #[test]
    fn test_switch_and_do_while() {
        let stmt = Statement::Switch {
            test: var("mode", Type::scalar(BaseClass::Int)),
            cases: vec![
                Case {
                    labels: vec![Some(int_lit(1)), None],
                    body: Statement::Jump {
                        mode: JumpMode::Break,
                    },
                },
            ],
        };
        assert_eq!(
            lower(&NodeTree::default(), None, &stmt),
            "switch (mode)\n{\ncase 1:\ndefault:\nbreak;\n}\n"
        );

        let stmt = Statement::While {
            condition: var("go", Type::scalar(BaseClass::Bool)),
            body: Some(Box::new(Statement::Expression {
                expression: Expression::new(
                    Type::scalar(BaseClass::Bool),
                    ExpressionKind::Assignment {
                        op: AssignOp::Assign,
                        left: Box::new(var("go", Type::scalar(BaseClass::Bool))),
                        right: Box::new(var("done", Type::scalar(BaseClass::Bool))),
                    },
                ),
            })),
            do_while: true,
        };
        assert_eq!(
            lower(&NodeTree::default(), None, &stmt),
            "do\n(go = done);\nwhile (go);\n"
        );
    }
}
