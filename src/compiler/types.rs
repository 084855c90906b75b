//! GLSL type names and implicit-cast lowering.

use crate::ast::{BaseClass, NodeTree, Qualifiers, Type};

use super::names::fix_name;

/// GLSL name of `ty` without qualifiers or array suffix.
pub fn type_name(ty: &Type, tree: &NodeTree) -> String {
    if ty.is_matrix() {
        return format!("mat{}x{}", ty.rows, ty.cols);
    }
    let scalar = match ty.base {
        BaseClass::Void => return "void".to_string(),
        BaseClass::Bool => "bool",
        BaseClass::Int => "int",
        BaseClass::Uint => "uint",
        BaseClass::Float => "float",
        BaseClass::Sampler | BaseClass::Texture => return "sampler2D".to_string(),
        BaseClass::String => return "int".to_string(),
        BaseClass::Struct => {
            return ty
                .definition
                .and_then(|id| tree.structure(id))
                .map(|s| fix_name(&s.name, &s.namespace))
                .unwrap_or_else(|| "_invalid_struct".to_string());
        }
    };
    if ty.rows > 1 {
        let prefix = match ty.base {
            BaseClass::Bool => "b",
            BaseClass::Int => "i",
            BaseClass::Uint => "u",
            _ => "",
        };
        format!("{prefix}vec{}", ty.rows)
    } else {
        scalar.to_string()
    }
}

/// Interpolation, storage and constness keywords for `ty`, each followed by a
/// space, in the order GLSL expects them.
pub fn qualifier_prefix(ty: &Type) -> String {
    let mut out = String::new();
    if ty.has(Qualifiers::LINEAR) {
        out.push_str("smooth ");
    }
    if ty.has(Qualifiers::NO_PERSPECTIVE) {
        out.push_str("noperspective ");
    }
    if ty.has(Qualifiers::CENTROID) {
        out.push_str("centroid ");
    }
    if ty.has(Qualifiers::NO_INTERPOLATION) {
        out.push_str("flat ");
    }
    if ty.has(Qualifiers::INOUT) {
        out.push_str("inout ");
    } else if ty.has(Qualifiers::IN) {
        out.push_str("in ");
    } else if ty.has(Qualifiers::OUT) {
        out.push_str("out ");
    } else if ty.has(Qualifiers::UNIFORM) {
        out.push_str("uniform ");
    }
    if ty.has(Qualifiers::CONST) {
        out.push_str("const ");
    }
    out
}

/// Array suffix for declarations: `[N]`, or `[]` for an unsized array.
pub fn array_suffix(ty: &Type) -> String {
    match ty.array_length {
        None => String::new(),
        Some(0) => "[]".to_string(),
        Some(n) => format!("[{n}]"),
    }
}

/// Text wrapped around an expression to convert it between two types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cast {
    pub prefix: String,
    pub suffix: String,
}

impl Cast {
    pub fn is_identity(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }

    pub fn wrap(&self, expr: &str) -> String {
        format!("{}{}{}", self.prefix, expr, self.suffix)
    }
}

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

/// Lowers the implicit conversion `from` → `to`.
///
/// A base-class change wraps the value in a constructor of the target class
/// that keeps the source shape. The value is then narrowed by swizzling the
/// leading components, or widened by repeating the last one. Matrices and
/// non-numeric types are never swizzled.
pub fn cast(from: &Type, to: &Type, tree: &NodeTree) -> Cast {
    let mut out = Cast::default();
    if !from.is_numeric() || !to.is_numeric() || from.is_array() || to.is_array() {
        return out;
    }
    if from.rows > 4 || to.rows > 4 {
        return out;
    }

    if from.is_matrix() || to.is_matrix() {
        if from.is_matrix() && to.is_matrix() {
            if from.rows != to.rows || from.cols != to.cols {
                out.prefix = format!("{}(", type_name(&to.element(), tree));
                out.suffix = ")".to_string();
            }
            return out;
        }
        if from.base != to.base {
            let shaped = Type::matrix(to.base, from.rows, from.cols);
            out.prefix = format!("{}(", type_name(&shaped, tree));
            out.suffix = ")".to_string();
        }
        return out;
    }

    if from.base != to.base {
        let shaped = Type::matrix(to.base, from.rows, from.cols);
        out.prefix = format!("{}(", type_name(&shaped, tree));
        out.suffix = ")".to_string();
    }

    if from.rows >= 1 && from.rows < to.rows {
        let last = COMPONENTS[from.rows as usize - 1];
        out.suffix.push('.');
        out.suffix.extend(COMPONENTS[..from.rows as usize].iter());
        for _ in from.rows..to.rows.min(4) {
            out.suffix.push(last);
        }
    } else if from.rows > to.rows && to.rows >= 1 {
        out.suffix.push('.');
        out.suffix.extend(COMPONENTS[..to.rows as usize].iter());
    }
    out
}

/// The common type two operands are promoted to for comparisons and logical
/// operators: the floating operand's class wins, the widest shape wins.
pub fn promoted_type(lhs: &Type, rhs: &Type) -> Type {
    let base = if rhs.is_floating_point() { rhs.base } else { lhs.base };
    Type::matrix(base, lhs.rows.max(rhs.rows), lhs.cols.max(rhs.cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BaseClass::{Bool, Float, Int, Uint};

    fn tree() -> NodeTree {
        NodeTree::default()
    }

    #[test]
    fn test_type_names() {
        let t = tree();
        assert_eq!(type_name(&Type::scalar(Float), &t), "float");
        assert_eq!(type_name(&Type::vector(Int, 3), &t), "ivec3");
        assert_eq!(type_name(&Type::vector(Uint, 2), &t), "uvec2");
        assert_eq!(type_name(&Type::vector(Bool, 4), &t), "bvec4");
        assert_eq!(type_name(&Type::matrix(Float, 4, 4), &t), "mat4x4");
        assert_eq!(type_name(&Type::sampler(), &t), "sampler2D");
        assert_eq!(type_name(&Type::void(), &t), "void");
    }

    #[test]
    fn test_qualifier_order() {
        let ty = Type::scalar(Float)
            .with_qualifiers(Qualifiers::CONST | Qualifiers::NO_INTERPOLATION | Qualifiers::OUT);
        assert_eq!(qualifier_prefix(&ty), "flat out const ");
        let ty = Type::scalar(Float).with_qualifiers(Qualifiers::INOUT);
        assert_eq!(qualifier_prefix(&ty), "inout ");
    }

    #[test]
    fn test_identity_cast_is_empty() {
        let v = Type::vector(Float, 3);
        assert!(cast(&v, &v, &tree()).is_identity());
    }

    #[test]
    fn test_narrowing_swizzles_leading_components() {
        let c = cast(&Type::vector(Float, 4), &Type::vector(Float, 2), &tree());
        assert_eq!(c.wrap("v"), "v.xy");
        let c = cast(&Type::vector(Float, 4), &Type::scalar(Float), &tree());
        assert_eq!(c.wrap("v"), "v.x");
    }

    #[test]
    fn test_widening_repeats_last_component() {
        let c = cast(&Type::vector(Float, 2), &Type::vector(Float, 4), &tree());
        assert_eq!(c.wrap("v"), "v.xyyy");
    }

    #[test]
    fn test_scalar_widening_replicates() {
        let c = cast(&Type::scalar(Float), &Type::vector(Float, 3), &tree());
        assert_eq!(c.wrap("s"), "s.xxx");
        let c = cast(&Type::scalar(Int), &Type::vector(Float, 2), &tree());
        assert_eq!(c.wrap("i"), "float(i).xx");
    }

    #[test]
    fn test_base_change_keeps_shape() {
        let c = cast(&Type::vector(Int, 4), &Type::vector(Float, 2), &tree());
        assert_eq!(c.wrap("v"), "vec4(v).xy");
    }

    #[test]
    fn test_matrix_casts() {
        let t = tree();
        let m4 = Type::matrix(Float, 4, 4);
        let m3 = Type::matrix(Float, 3, 3);
        assert_eq!(cast(&m4, &m3, &t).wrap("m"), "mat3x3(m)");
        assert!(cast(&m4, &m4, &t).is_identity());
        assert!(cast(&Type::scalar(Float), &m3, &t).is_identity());
        assert_eq!(cast(&Type::scalar(Int), &m3, &t).wrap("i"), "float(i)");
    }

    #[test]
    fn test_promotion_prefers_float_operand() {
        let p = promoted_type(&Type::scalar(Int), &Type::vector(Float, 3));
        assert_eq!(p, Type::vector(Float, 3));
        let p = promoted_type(&Type::vector(Float, 2), &Type::scalar(Int));
        assert_eq!(p, Type::vector(Float, 2));
    }

    proptest::proptest! {
        #[test]
        fn vector_casts_take_leading_then_repeat_last(from in 1u32..=4, to in 1u32..=4) {
            let c = cast(&Type::vector(Float, from), &Type::vector(Float, to), &tree());
            if from == to {
                proptest::prop_assert!(c.is_identity());
                return Ok(());
            }
            let kept: String = COMPONENTS[..from.min(to) as usize].iter().collect();
            let last = COMPONENTS[from as usize - 1];
            let repeated: String =
                std::iter::repeat_n(last, to.saturating_sub(from) as usize).collect();
            proptest::prop_assert_eq!(c.prefix, "");
            proptest::prop_assert_eq!(c.suffix, format!(".{kept}{repeated}"));
        }
    }
}
