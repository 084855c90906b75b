//! Expression lowering rules.
//!
//! Every rule maps one node plus the surrounding `LoweringContext` to GLSL
//! text. Implicit conversions always go through [`types::cast`] so operands,
//! arguments, branches and assigned values are coerced the same way.

use crate::ast::{
    AssignOp, BaseClass, BinaryOp, Expression, ExpressionKind, FunctionId, LiteralValue,
    NodeTree, Qualifiers, Type, UnaryOp,
};
use crate::diagnostics::Diagnostics;

use super::names::fix_name;
use super::types::{self, Cast};

/// Formats a float literal so GLSL always reads it as a float.
pub fn fmt_float(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v:?}");
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}

fn literal_component(value: &LiteralValue, index: usize) -> f64 {
    match value {
        LiteralValue::Bool(v) => v.get(index).map_or(0.0, |&b| f64::from(u8::from(b))),
        LiteralValue::Int(v) => v.get(index).map_or(0.0, |&x| f64::from(x)),
        LiteralValue::Uint(v) => v.get(index).map_or(0.0, |&x| f64::from(x)),
        LiteralValue::Float(v) => v.get(index).map_or(0.0, |&x| f64::from(x)),
        LiteralValue::String(_) => 0.0,
    }
}

/// State shared by the lowering rules while one function body (or one
/// global initializer) is lowered.
pub struct LoweringContext<'a> {
    pub tree: &'a NodeTree,
    pub diagnostics: &'a mut Diagnostics,
    /// Function whose body is being lowered; return values cast to its type.
    pub current_function: Option<FunctionId>,
    /// Functions called from the lowered code, in first-call order.
    pub callees: Vec<FunctionId>,
}

impl<'a> LoweringContext<'a> {
    pub fn new(tree: &'a NodeTree, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            tree,
            diagnostics,
            current_function: None,
            callees: Vec::new(),
        }
    }

    pub fn cast(&self, from: &Type, to: &Type) -> Cast {
        types::cast(from, to, self.tree)
    }

    pub fn type_name(&self, ty: &Type) -> String {
        types::type_name(ty, self.tree)
    }

    /// Lowers `expr` and converts the result to `to`.
    pub fn expression_as(&mut self, expr: &Expression, to: &Type) -> String {
        let text = self.expression(expr);
        self.cast(&expr.ty, to).wrap(&text)
    }

    pub fn expression(&mut self, expr: &Expression) -> String {
        match &expr.kind {
            ExpressionKind::LValue { name, namespace } => fix_name(name, namespace),
            ExpressionKind::Literal { value } => self.literal(&expr.ty, value),
            ExpressionKind::Sequence { expressions } => {
                let parts: Vec<String> = expressions.iter().map(|e| self.expression(e)).collect();
                format!("({})", parts.join(", "))
            }
            ExpressionKind::Unary { op, operand } => self.unary(&expr.ty, *op, operand),
            ExpressionKind::Binary { op, left, right } => {
                self.binary(&expr.ty, *op, left, right)
            }
            ExpressionKind::Intrinsic {
                intrinsic,
                arguments,
            } => self.intrinsic(&expr.ty, *intrinsic, arguments),
            ExpressionKind::Conditional {
                condition,
                on_true,
                on_false,
            } => self.conditional(&expr.ty, condition, on_true, on_false),
            ExpressionKind::Swizzle { operand, mask } => self.swizzle(expr, operand, mask),
            ExpressionKind::FieldSelection { operand, field } => {
                let base = self.expression(operand);
                format!("({base}.{})", fix_name(field, ""))
            }
            ExpressionKind::Assignment { op, left, right } => self.assignment(*op, left, right),
            ExpressionKind::Call { callee, arguments } => self.call(expr, *callee, arguments),
            ExpressionKind::Constructor { arguments } => self.constructor(&expr.ty, arguments),
            ExpressionKind::InitializerList { values } => {
                let element = expr.ty.element();
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| self.expression_as(v, &element))
                    .collect();
                format!("{}[]({})", self.type_name(&element), parts.join(", "))
            }
        }
    }

    pub fn literal(&self, ty: &Type, value: &LiteralValue) -> String {
        let count = ty.components().max(1) as usize;
        let parts: Vec<String> = (0..count)
            .map(|i| {
                let v = literal_component(value, i);
                match ty.base {
                    BaseClass::Bool => (v != 0.0).to_string(),
                    BaseClass::Int => (v as i32).to_string(),
                    BaseClass::Uint => format!("{}u", v as u32),
                    _ => fmt_float(v as f32),
                }
            })
            .collect();
        if count == 1 {
            parts.into_iter().next().unwrap_or_default()
        } else {
            format!("{}({})", self.type_name(&ty.element()), parts.join(", "))
        }
    }

    pub fn unary(&mut self, ty: &Type, op: UnaryOp, operand: &Expression) -> String {
        let x = self.expression(operand);
        match op {
            UnaryOp::Negate if x.starts_with('-') => format!("-({x})"),
            UnaryOp::Negate => format!("-{x}"),
            UnaryOp::BitwiseNot => format!("~{x}"),
            UnaryOp::LogicalNot if operand.ty.is_vector() => {
                let target = Type::vector(BaseClass::Bool, operand.ty.rows);
                format!("not({})", self.cast(&operand.ty, &target).wrap(&x))
            }
            UnaryOp::LogicalNot => format!("!bool({x})"),
            UnaryOp::Increase => format!("++{x}"),
            UnaryOp::Decrease => format!("--{x}"),
            UnaryOp::PostIncrease => format!("{x}++"),
            UnaryOp::PostDecrease => format!("{x}--"),
            UnaryOp::Cast => format!("{}({x})", self.type_name(&ty.element())),
        }
    }

    pub fn binary(
        &mut self,
        ty: &Type,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> String {
        let l = self.expression(left);
        let r = self.expression(right);

        match op {
            BinaryOp::LeftShift => return format!("({l} << {r})"),
            BinaryOp::RightShift => return format!("({l} >> {r})"),
            BinaryOp::ElementExtract => {
                return if right.ty.base == BaseClass::Uint {
                    format!("{l}[{r}]")
                } else {
                    format!("{l}[uint({r})]")
                };
            }
            _ => {}
        }

        let comparison = match op {
            BinaryOp::Less => Some(("lessThan", "<")),
            BinaryOp::Greater => Some(("greaterThan", ">")),
            BinaryOp::LessOrEqual => Some(("lessThanEqual", "<=")),
            BinaryOp::GreaterOrEqual => Some(("greaterThanEqual", ">=")),
            BinaryOp::Equal => Some(("equal", "==")),
            BinaryOp::NotEqual => Some(("notEqual", "!=")),
            _ => None,
        };
        if let Some((function, symbol)) = comparison {
            let promoted = types::promoted_type(&left.ty, &right.ty);
            let a = self.cast(&left.ty, &promoted).wrap(&l);
            let b = self.cast(&right.ty, &promoted).wrap(&r);
            return if ty.is_vector() {
                format!("{function}({a}, {b})")
            } else {
                format!("({a} {symbol} {b})")
            };
        }

        let a = self.cast(&left.ty, ty).wrap(&l);
        let b = self.cast(&right.ty, ty).wrap(&r);
        match op {
            BinaryOp::Add => format!("({a} + {b})"),
            BinaryOp::Subtract => format!("({a} - {b})"),
            BinaryOp::Multiply if ty.is_matrix() && left.ty.is_matrix() && right.ty.is_matrix() => {
                format!("matrixCompMult({a}, {b})")
            }
            BinaryOp::Multiply => format!("({a} * {b})"),
            BinaryOp::Divide => format!("({a} / {b})"),
            BinaryOp::Modulo if ty.is_floating_point() => format!("_fmod({a}, {b})"),
            BinaryOp::Modulo => format!("({a} % {b})"),
            BinaryOp::BitwiseAnd => format!("({a} & {b})"),
            BinaryOp::BitwiseOr => format!("({a} | {b})"),
            BinaryOp::BitwiseXor => format!("({a} ^ {b})"),
            BinaryOp::LogicalAnd => format!("({a} && {b})"),
            BinaryOp::LogicalOr => format!("({a} || {b})"),
            BinaryOp::LeftShift
            | BinaryOp::RightShift
            | BinaryOp::ElementExtract
            | BinaryOp::Less
            | BinaryOp::Greater
            | BinaryOp::LessOrEqual
            | BinaryOp::GreaterOrEqual
            | BinaryOp::Equal
            | BinaryOp::NotEqual => {
                self.diagnostics.error(
                    &left.location,
                    format!("internal error: {op:?} reached arithmetic lowering"),
                );
                String::new()
            }
        }
    }

    /// Condition text usable where GLSL expects a single `bool`.
    pub fn condition(&mut self, condition: &Expression) -> String {
        let c = self.expression(condition);
        if condition.ty.is_vector() {
            let target = Type::vector(BaseClass::Bool, condition.ty.rows);
            format!("all({})", self.cast(&condition.ty, &target).wrap(&c))
        } else if condition.ty.is_boolean() && condition.ty.is_scalar() {
            c
        } else {
            format!("bool({c})")
        }
    }

    pub fn conditional(
        &mut self,
        ty: &Type,
        condition: &Expression,
        on_true: &Expression,
        on_false: &Expression,
    ) -> String {
        let c = self.condition(condition);
        let t = self.expression_as(on_true, ty);
        let f = self.expression_as(on_false, ty);
        format!("({c} ? {t} : {f})")
    }

    pub fn swizzle(&mut self, expr: &Expression, operand: &Expression, mask: &[u8]) -> String {
        let x = self.expression(operand);
        if mask.is_empty() {
            self.diagnostics
                .error(&expr.location, "empty swizzle mask");
            return x;
        }
        if operand.ty.is_matrix() {
            if mask.len() > 1 {
                self.diagnostics.error(
                    &expr.location,
                    "multiple component matrix swizzling is not supported",
                );
                return x;
            }
            let m = mask[0];
            return format!("{x}[{}][{}]", m % 4, m / 4);
        }
        let mut out = x;
        out.push('.');
        for &component in mask {
            match ['x', 'y', 'z', 'w'].get(component as usize) {
                Some(c) => out.push(*c),
                None => {
                    self.diagnostics.error(
                        &expr.location,
                        format!("invalid swizzle component {component}"),
                    );
                    return out;
                }
            }
        }
        out
    }

    pub fn assignment(&mut self, op: AssignOp, left: &Expression, right: &Expression) -> String {
        let l = self.expression(left);
        let r = self.expression_as(right, &left.ty);
        let symbol = match op {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Subtract => "-=",
            AssignOp::Multiply if left.ty.is_matrix() && right.ty.is_matrix() => {
                return format!("({l} = matrixCompMult({l}, {r}))");
            }
            AssignOp::Multiply => "*=",
            AssignOp::Divide => "/=",
            AssignOp::Modulo if left.ty.is_floating_point() => {
                return format!("({l} = _fmod({l}, {r}))");
            }
            AssignOp::Modulo => "%=",
            AssignOp::BitwiseAnd => "&=",
            AssignOp::BitwiseOr => "|=",
            AssignOp::BitwiseXor => "^=",
            AssignOp::LeftShift => "<<=",
            AssignOp::RightShift => ">>=",
        };
        format!("({l} {symbol} {r})")
    }

    pub fn call(
        &mut self,
        expr: &Expression,
        callee: FunctionId,
        arguments: &[Expression],
    ) -> String {
        let tree = self.tree;
        let Some(function) = tree.function(callee) else {
            self.diagnostics.error(
                &expr.location,
                format!("call to undefined function #{}", callee.0),
            );
            return "0".to_string();
        };
        if !self.callees.contains(&callee) {
            self.callees.push(callee);
        }

        let mut parts = Vec::with_capacity(arguments.len());
        for (i, arg) in arguments.iter().enumerate() {
            // Out arguments must stay assignable.
            let text = match function.parameters.get(i) {
                Some(param) if !param.ty.has(Qualifiers::OUT) => {
                    self.expression_as(arg, &param.ty)
                }
                _ => self.expression(arg),
            };
            parts.push(text);
        }
        format!(
            "{}({})",
            fix_name(&function.name, &function.namespace),
            parts.join(", ")
        )
    }

    pub fn constructor(&mut self, ty: &Type, arguments: &[Expression]) -> String {
        let parts: Vec<String> = arguments.iter().map(|a| self.expression(a)).collect();
        let name = self.type_name(&ty.element());
        if ty.is_matrix() {
            // Effect matrices are row-major, GLSL constructors fill columns.
            format!("transpose({name}({}))", parts.join(", "))
        } else {
            format!("{name}({})", parts.join(", "))
        }
    }
}
