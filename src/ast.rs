//! Node tree produced by the effect-language front-end.
//!
//! The parser and semantic analysis live outside this crate; everything here
//! is already resolved (types are attached to every expression, calls refer to
//! functions by index). Trees travel as JSON between the front-end, the
//! headless CLI and tests, so every node derives serde.

use std::path::Path;

use anyhow::{Context, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ── Source locations ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub source: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(source: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }
}

// ── Types ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseClass {
    #[default]
    Void,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Sampler,
    Texture,
    Struct,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Qualifiers: u32 {
        const EXTERN = 1 << 0;
        const STATIC = 1 << 1;
        const UNIFORM = 1 << 2;
        const VOLATILE = 1 << 3;
        const PRECISE = 1 << 4;
        const IN = 1 << 5;
        const OUT = 1 << 6;
        const INOUT = Self::IN.bits() | Self::OUT.bits();
        const CONST = 1 << 8;
        const LINEAR = 1 << 10;
        const NO_PERSPECTIVE = 1 << 11;
        const CENTROID = 1 << 12;
        const NO_INTERPOLATION = 1 << 13;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub usize);

fn one() -> u32 {
    1
}

/// A fully resolved effect-language type.
///
/// `rows` is the vector width (1 for scalars) and `cols` the matrix column
/// count (1 for scalars and vectors). `array_length` is `None` for non-array
/// types and `Some(0)` for arrays whose size is taken from the initializer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub base: BaseClass,
    #[serde(default)]
    pub qualifiers: Qualifiers,
    #[serde(default = "one")]
    pub rows: u32,
    #[serde(default = "one")]
    pub cols: u32,
    #[serde(default)]
    pub array_length: Option<u32>,
    #[serde(default)]
    pub definition: Option<StructId>,
}

impl Default for Type {
    fn default() -> Self {
        Self::void()
    }
}

impl Type {
    pub fn void() -> Self {
        Self {
            base: BaseClass::Void,
            qualifiers: Qualifiers::empty(),
            rows: 0,
            cols: 0,
            array_length: None,
            definition: None,
        }
    }

    pub fn scalar(base: BaseClass) -> Self {
        Self::matrix(base, 1, 1)
    }

    pub fn vector(base: BaseClass, rows: u32) -> Self {
        Self::matrix(base, rows, 1)
    }

    pub fn matrix(base: BaseClass, rows: u32, cols: u32) -> Self {
        Self {
            base,
            qualifiers: Qualifiers::empty(),
            rows,
            cols,
            array_length: None,
            definition: None,
        }
    }

    pub fn sampler() -> Self {
        Self::scalar(BaseClass::Sampler)
    }

    pub fn structure(id: StructId) -> Self {
        Self {
            definition: Some(id),
            ..Self::scalar(BaseClass::Struct)
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn with_array(mut self, length: u32) -> Self {
        self.array_length = Some(length);
        self
    }

    /// The same type stripped of qualifiers and array-ness.
    pub fn element(&self) -> Self {
        Self {
            qualifiers: Qualifiers::empty(),
            array_length: None,
            ..self.clone()
        }
    }

    pub fn has(&self, qualifier: Qualifiers) -> bool {
        self.qualifiers.contains(qualifier)
    }

    pub fn is_void(&self) -> bool {
        self.base == BaseClass::Void
    }

    pub fn is_boolean(&self) -> bool {
        self.base == BaseClass::Bool
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.base,
            BaseClass::Bool | BaseClass::Int | BaseClass::Uint | BaseClass::Float
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.base, BaseClass::Int | BaseClass::Uint)
    }

    pub fn is_floating_point(&self) -> bool {
        self.base == BaseClass::Float
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.base, BaseClass::Int | BaseClass::Float)
    }

    pub fn is_scalar(&self) -> bool {
        self.is_numeric() && !self.is_array() && self.rows == 1 && self.cols == 1
    }

    pub fn is_vector(&self) -> bool {
        self.is_numeric() && !self.is_array() && self.rows > 1 && self.cols == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.is_numeric() && !self.is_array() && self.rows >= 1 && self.cols > 1
    }

    pub fn is_array(&self) -> bool {
        self.array_length.is_some()
    }

    pub fn is_struct(&self) -> bool {
        self.base == BaseClass::Struct
    }

    pub fn is_sampler(&self) -> bool {
        self.base == BaseClass::Sampler
    }

    pub fn is_texture(&self) -> bool {
        self.base == BaseClass::Texture
    }

    /// Number of scalar components, ignoring array-ness.
    pub fn components(&self) -> u32 {
        self.rows * self.cols
    }
}

// ── Literals and annotations ─────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralValue {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Uint(Vec<u32>),
    Float(Vec<f32>),
    String(String),
}

impl LiteralValue {
    /// Raw 4-byte-per-component representation used for uniform storage.
    /// Booleans are stored as 32-bit integers.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(values) => {
                let ints: Vec<i32> = values.iter().map(|&b| i32::from(b)).collect();
                bytemuck::cast_slice(&ints).to_vec()
            }
            Self::Int(values) => bytemuck::cast_slice(values).to_vec(),
            Self::Uint(values) => bytemuck::cast_slice(values).to_vec(),
            Self::Float(values) => bytemuck::cast_slice(values).to_vec(),
            Self::String(_) => Vec::new(),
        }
    }

    /// Interprets the first component as a truth value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => v.first().copied(),
            Self::Int(v) => v.first().map(|&x| x != 0),
            Self::Uint(v) => v.first().map(|&x| x != 0),
            Self::Float(v) => v.first().map(|&x| x != 0.0),
            Self::String(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub value: LiteralValue,
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Negate,
    BitwiseNot,
    LogicalNot,
    Increase,
    Decrease,
    PostIncrease,
    PostDecrease,
    Cast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    NotEqual,
    LeftShift,
    RightShift,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LogicalAnd,
    LogicalOr,
    ElementExtract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intrinsic {
    Abs,
    Acos,
    All,
    Any,
    #[serde(alias = "asint")]
    BitCastFloatToInt,
    #[serde(alias = "asuint")]
    BitCastFloatToUint,
    #[serde(alias = "asfloat_from_int")]
    BitCastIntToFloat,
    #[serde(alias = "asfloat_from_uint")]
    BitCastUintToFloat,
    Asin,
    Atan,
    Atan2,
    Ceil,
    Clamp,
    Cos,
    Cosh,
    Cross,
    Ddx,
    Ddy,
    Degrees,
    Determinant,
    Distance,
    Dot,
    Exp,
    Exp2,
    Faceforward,
    Floor,
    Frac,
    Frexp,
    Fwidth,
    Ldexp,
    Length,
    Lerp,
    Log,
    Log10,
    Log2,
    Mad,
    Max,
    Min,
    Modf,
    Mul,
    Normalize,
    Pow,
    Radians,
    Rcp,
    Reflect,
    Refract,
    Round,
    Rsqrt,
    Saturate,
    Sign,
    Sin,
    Sincos,
    Sinh,
    Smoothstep,
    Sqrt,
    Step,
    Tan,
    Tanh,
    Tex2d,
    Tex2dfetch,
    Tex2dgather,
    Tex2dgatheroffset,
    Tex2dgrad,
    Tex2dlod,
    Tex2dlodoffset,
    Tex2doffset,
    Tex2dproj,
    Tex2dsize,
    Transpose,
    Trunc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub location: Location,
    #[serde(flatten)]
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(ty: Type, kind: ExpressionKind) -> Self {
        Self {
            ty,
            location: Location::default(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ExpressionKind {
    LValue {
        name: String,
        #[serde(default)]
        namespace: String,
    },
    Literal {
        value: LiteralValue,
    },
    Sequence {
        expressions: Vec<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Intrinsic {
        intrinsic: Intrinsic,
        arguments: Vec<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        on_true: Box<Expression>,
        on_false: Box<Expression>,
    },
    Swizzle {
        operand: Box<Expression>,
        mask: Vec<u8>,
    },
    FieldSelection {
        operand: Box<Expression>,
        field: String,
    },
    Assignment {
        op: AssignOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        callee: FunctionId,
        arguments: Vec<Expression>,
    },
    Constructor {
        arguments: Vec<Expression>,
    },
    InitializerList {
        values: Vec<Expression>,
    },
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpMode {
    Break,
    Continue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// `None` marks the `default` label.
    pub labels: Vec<Option<Expression>>,
    pub body: Statement,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Statement {
    Compound {
        statements: Vec<Statement>,
    },
    DeclaratorList {
        declarators: Vec<Variable>,
    },
    Expression {
        expression: Expression,
    },
    If {
        condition: Expression,
        #[serde(default)]
        on_true: Option<Box<Statement>>,
        #[serde(default)]
        on_false: Option<Box<Statement>>,
    },
    Switch {
        test: Expression,
        cases: Vec<Case>,
    },
    For {
        #[serde(default)]
        initialization: Option<Box<Statement>>,
        #[serde(default)]
        condition: Option<Expression>,
        #[serde(default)]
        increment: Option<Expression>,
        #[serde(default)]
        body: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        #[serde(default)]
        body: Option<Box<Statement>>,
        #[serde(default)]
        do_while: bool,
    },
    Return {
        #[serde(default)]
        value: Option<Expression>,
        #[serde(default)]
        discard: bool,
    },
    Jump {
        mode: JumpMode,
    },
}

// ── Pass and sampler literals ────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    #[serde(alias = "rev-subtract")]
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    InvSrcColor,
    InvSrcAlpha,
    DestColor,
    DestAlpha,
    InvDestColor,
    InvDestAlpha,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    R8,
    R16f,
    R32f,
    Rg8,
    Rg16,
    Rg16f,
    Rg32f,
    #[default]
    Rgba8,
    Rgba16,
    Rgba16f,
    Rgba32f,
    Dxt1,
    Dxt3,
    Dxt5,
    Latc1,
    Latc2,
    Rgtc1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    Wrap,
    Mirror,
    #[default]
    Clamp,
    Border,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

/// Texture and sampler properties attached to a global variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Properties {
    /// Name of the texture a sampler reads from.
    pub texture: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub srgb_texture: bool,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub max_anisotropy: u32,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            texture: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: PixelFormat::Rgba8,
            srgb_texture: false,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            mip_lod_bias: 0.0,
            min_lod: -1000.0,
            max_lod: 1000.0,
            max_anisotropy: 1,
        }
    }
}

// ── Declarations ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub semantic: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub initializer: Option<Expression>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub location: Location,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            ty,
            semantic: String::new(),
            annotations: Vec::new(),
            initializer: None,
            properties: Properties::default(),
            location: Location::default(),
        }
    }

    pub fn with_semantic(mut self, semantic: impl Into<String>) -> Self {
        self.semantic = semantic.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub fields: Vec<Variable>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub return_type: Type,
    #[serde(default)]
    pub return_semantic: String,
    #[serde(default)]
    pub parameters: Vec<Variable>,
    #[serde(default)]
    pub definition: Option<Statement>,
    #[serde(default)]
    pub location: Location,
}

/// Fixed-function state and program references of one pass, as written in
/// the effect source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassStates {
    pub vertex_shader: Option<FunctionId>,
    pub pixel_shader: Option<FunctionId>,
    pub render_targets: [Option<String>; 8],
    pub srgb_write_enable: bool,
    pub blend_enable: bool,
    pub blend_op: BlendOp,
    pub blend_op_alpha: BlendOp,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub depth_enable: bool,
    pub depth_write_mask: bool,
    pub depth_func: CompareFunc,
    pub stencil_enable: bool,
    pub stencil_ref: u32,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_func: CompareFunc,
    pub stencil_pass: StencilOp,
    pub stencil_fail: StencilOp,
    pub stencil_depth_fail: StencilOp,
    /// RGBA write bits, red in bit 0.
    pub color_write_mask: u8,
}

impl Default for PassStates {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            pixel_shader: None,
            render_targets: Default::default(),
            srgb_write_enable: false,
            blend_enable: false,
            blend_op: BlendOp::Add,
            blend_op_alpha: BlendOp::Add,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            depth_enable: false,
            depth_write_mask: true,
            depth_func: CompareFunc::Less,
            stencil_enable: false,
            stencil_ref: 0,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_func: CompareFunc::Always,
            stencil_pass: StencilOp::Keep,
            stencil_fail: StencilOp::Keep,
            stencil_depth_fail: StencilOp::Keep,
            color_write_mask: 0xF,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub name: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub states: PassStates,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub passes: Vec<Pass>,
    #[serde(default)]
    pub location: Location,
}

/// The root of a compiled effect: declarations in source order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTree {
    pub structs: Vec<StructDef>,
    /// Global variables: textures, samplers, uniforms and static globals.
    pub uniforms: Vec<Variable>,
    pub functions: Vec<Function>,
    pub techniques: Vec<Technique>,
}

impl NodeTree {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid effect node tree json")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read node tree {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("while loading {}", path.display()))
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn structure(&self, id: StructId) -> Option<&StructDef> {
        self.structs.get(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_shape_predicates() {
        let f = Type::scalar(BaseClass::Float);
        let v = Type::vector(BaseClass::Float, 3);
        let m = Type::matrix(BaseClass::Float, 4, 4);
        assert!(f.is_scalar() && !f.is_vector() && !f.is_matrix());
        assert!(v.is_vector() && !v.is_scalar());
        assert!(m.is_matrix() && !m.is_vector());
        assert!(!Type::sampler().is_numeric());
        assert!(!v.clone().with_array(4).is_vector());
    }

    #[test]
    fn test_inout_contains_both_directions() {
        let q = Qualifiers::INOUT;
        assert!(q.contains(Qualifiers::IN));
        assert!(q.contains(Qualifiers::OUT));
        assert!(!Qualifiers::OUT.contains(Qualifiers::INOUT));
    }

    #[test]
    fn test_literal_bytes_store_bools_as_ints() {
        let lit = LiteralValue::Bool(vec![true, false]);
        assert_eq!(lit.to_bytes(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        let lit = LiteralValue::Float(vec![1.0]);
        assert_eq!(lit.to_bytes(), 1.0f32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_expression_json_is_internally_tagged() {
        let json = r#"{
            "type": { "base": "float" },
            "node": "binary",
            "op": "add",
            "left": { "type": { "base": "float" }, "node": "l_value", "name": "a" },
            "right": { "type": { "base": "float" }, "node": "literal", "value": { "float": [1.0] } }
        }"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        match expr.kind {
            ExpressionKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Add),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(expr.ty.rows, 1);
    }

    #[test]
    fn test_pass_states_defaults() {
        let pass: Pass = serde_json::from_str(r#"{ "name": "p0" }"#).unwrap();
        assert_eq!(pass.states.color_write_mask, 0xF);
        assert!(pass.states.render_targets.iter().all(Option::is_none));
        assert_eq!(pass.states.stencil_func, CompareFunc::Always);
    }
}
