//! Intrinsic call lowering.
//!
//! Most intrinsics map to the GLSL builtin of the same meaning with every
//! argument cast to the call's result type. Texture lookups additionally
//! flip the vertical coordinate, because effect sources address textures
//! top-down while GL stores them bottom-up.

use crate::ast::{BaseClass, Expression, Intrinsic, Type};

use super::expr::LoweringContext;

const FLIP_UV: &str = " * vec2(1.0, -1.0) + vec2(0.0, 1.0)";
const FLIP_UVLOD: &str = " * vec4(1.0, -1.0, 1.0, 1.0) + vec4(0.0, 1.0, 0.0, 0.0)";
const FLIP_OFFSET: &str = " * ivec2(1, -1)";

impl LoweringContext<'_> {
    pub fn intrinsic(&mut self, ty: &Type, intrinsic: Intrinsic, args: &[Expression]) -> String {
        let Some(first) = args.first() else {
            return format!("{}()", builtin_name(intrinsic));
        };

        let arg_ty = |i: usize| args.get(i).map(|a| a.ty.clone()).unwrap_or_default();
        let float2 = Type::vector(BaseClass::Float, 2);
        let float4 = Type::vector(BaseClass::Float, 4);
        let int2 = Type::vector(BaseClass::Int, 2);

        match intrinsic {
            Intrinsic::All | Intrinsic::Any => {
                let x = self.expression(first);
                let name = if intrinsic == Intrinsic::All { "all" } else { "any" };
                if first.ty.is_vector() {
                    format!("{name}(bvec{}({x}))", first.ty.rows)
                } else {
                    format!("bool({x})")
                }
            }
            Intrinsic::BitCastIntToFloat
            | Intrinsic::BitCastUintToFloat
            | Intrinsic::BitCastFloatToInt
            | Intrinsic::BitCastFloatToUint => {
                let (name, needed) = match intrinsic {
                    Intrinsic::BitCastIntToFloat => ("intBitsToFloat", BaseClass::Int),
                    Intrinsic::BitCastUintToFloat => ("uintBitsToFloat", BaseClass::Uint),
                    Intrinsic::BitCastFloatToInt => ("floatBitsToInt", BaseClass::Float),
                    _ => ("floatBitsToUint", BaseClass::Float),
                };
                let x = self.retyped(first, needed);
                format!("{name}({x})")
            }
            Intrinsic::Determinant
            | Intrinsic::Length
            | Intrinsic::Normalize
            | Intrinsic::Transpose => {
                let x = self.retyped(first, BaseClass::Float);
                format!("{}({x})", builtin_name(intrinsic))
            }
            Intrinsic::Distance | Intrinsic::Dot => {
                let promoted = super::types::promoted_type(&first.ty, &arg_ty(1));
                let a = self.expression_as(first, &promoted);
                let b = self.argument_as(args, 1, &promoted);
                format!("{}({a}, {b})", builtin_name(intrinsic))
            }
            Intrinsic::Log10 => {
                let x = self.expression_as(first, ty);
                format!("(log({x}) / {}(2.302585093))", self.type_name(&ty.element()))
            }
            Intrinsic::Mad => {
                let a = self.expression_as(first, ty);
                let b = self.argument_as(args, 1, ty);
                let c = self.argument_as(args, 2, ty);
                format!("({a} * {b} + {c})")
            }
            Intrinsic::Mul => {
                let a = self.expression(first);
                let b = self.argument(args, 1);
                format!("({a} * {b})")
            }
            Intrinsic::Rcp => {
                let x = self.expression_as(first, ty);
                format!("({}(1.0) / {x})", self.type_name(&ty.element()))
            }
            Intrinsic::Refract => {
                let a = self.expression_as(first, ty);
                let b = self.argument_as(args, 1, ty);
                let eta = self.argument(args, 2);
                format!("refract({a}, {b}, float({eta}))")
            }
            Intrinsic::Saturate => {
                let x = self.expression_as(first, ty);
                format!("clamp({x}, 0.0, 1.0)")
            }
            Intrinsic::Sign => {
                // sign() keeps the argument's class; the result is cast afterwards.
                let x = self.expression(first);
                self.cast(&first.ty, ty).wrap(&format!("sign({x})"))
            }
            Intrinsic::Sincos => {
                let x = self.retyped(first, BaseClass::Float);
                let s = self.argument(args, 1);
                let c = self.argument(args, 2);
                format!("_sincos({x}, {s}, {c})")
            }
            Intrinsic::Tex2d => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float2);
                format!("texture({s}, {uv}{FLIP_UV})")
            }
            Intrinsic::Tex2dfetch => {
                let s = self.expression(first);
                let coord = self.argument_as(args, 1, &Type::vector(BaseClass::Int, 4));
                format!("_texelFetch({s}, {coord})")
            }
            Intrinsic::Tex2dgather => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float2);
                let comp = self.argument(args, 2);
                format!("textureGather({s}, {uv}{FLIP_UV}, int({comp}))")
            }
            Intrinsic::Tex2dgatheroffset => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float2);
                let offset = self.argument_as(args, 2, &int2);
                let comp = self.argument(args, 3);
                format!("textureGatherOffset({s}, {uv}{FLIP_UV}, {offset}{FLIP_OFFSET}, int({comp}))")
            }
            Intrinsic::Tex2dgrad => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float2);
                let ddx = self.argument_as(args, 2, &float2);
                let ddy = self.argument_as(args, 3, &float2);
                format!("textureGrad({s}, {uv}{FLIP_UV}, {ddx}, {ddy})")
            }
            Intrinsic::Tex2dlod => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float4);
                format!("_textureLod({s}, {uv}{FLIP_UVLOD})")
            }
            Intrinsic::Tex2dlodoffset => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float4);
                let offset = self.argument_as(args, 2, &int2);
                format!("_textureLodOffset({s}, {uv}{FLIP_UVLOD}, {offset}{FLIP_OFFSET})")
            }
            Intrinsic::Tex2doffset => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float2);
                let offset = self.argument_as(args, 2, &int2);
                format!("textureOffset({s}, {uv}{FLIP_UV}, {offset}{FLIP_OFFSET})")
            }
            Intrinsic::Tex2dproj => {
                let s = self.expression(first);
                let uv = self.argument_as(args, 1, &float4);
                format!("textureProj({s}, {uv}{FLIP_UVLOD})")
            }
            Intrinsic::Tex2dsize => {
                let s = self.expression(first);
                let level = self.argument(args, 1);
                let size = format!("textureSize({s}, int({level}))");
                self.cast(&int2, ty).wrap(&size)
            }
            _ => {
                // Plain builtins: every argument cast to the result type.
                let parts: Vec<String> = (0..args.len())
                    .map(|i| self.argument_as(args, i, ty))
                    .collect();
                format!("{}({})", builtin_name(intrinsic), parts.join(", "))
            }
        }
    }

    fn argument(&mut self, args: &[Expression], index: usize) -> String {
        match args.get(index) {
            Some(arg) => self.expression(arg),
            None => "0".to_string(),
        }
    }

    fn argument_as(&mut self, args: &[Expression], index: usize, to: &Type) -> String {
        match args.get(index) {
            Some(arg) => self.expression_as(arg, to),
            None => "0".to_string(),
        }
    }

    /// The argument converted to `base` while keeping its shape, for builtins
    /// that only accept one class.
    fn retyped(&mut self, arg: &Expression, base: BaseClass) -> String {
        let x = self.expression(arg);
        if arg.ty.base == base {
            return x;
        }
        let target = Type {
            base,
            ..arg.ty.element()
        };
        format!("{}({x})", self.type_name(&target))
    }
}

/// GLSL builtin implementing `intrinsic` when it lowers to a plain call.
pub fn builtin_name(intrinsic: Intrinsic) -> &'static str {
    match intrinsic {
        Intrinsic::Abs => "abs",
        Intrinsic::Acos => "acos",
        Intrinsic::All => "all",
        Intrinsic::Any => "any",
        Intrinsic::BitCastFloatToInt => "floatBitsToInt",
        Intrinsic::BitCastFloatToUint => "floatBitsToUint",
        Intrinsic::BitCastIntToFloat => "intBitsToFloat",
        Intrinsic::BitCastUintToFloat => "uintBitsToFloat",
        Intrinsic::Asin => "asin",
        Intrinsic::Atan | Intrinsic::Atan2 => "atan",
        Intrinsic::Ceil => "ceil",
        Intrinsic::Clamp | Intrinsic::Saturate => "clamp",
        Intrinsic::Cos => "cos",
        Intrinsic::Cosh => "cosh",
        Intrinsic::Cross => "cross",
        Intrinsic::Ddx => "dFdx",
        Intrinsic::Ddy => "dFdy",
        Intrinsic::Degrees => "degrees",
        Intrinsic::Determinant => "determinant",
        Intrinsic::Distance => "distance",
        Intrinsic::Dot => "dot",
        Intrinsic::Exp => "exp",
        Intrinsic::Exp2 => "exp2",
        Intrinsic::Faceforward => "faceforward",
        Intrinsic::Floor => "floor",
        Intrinsic::Frac => "fract",
        Intrinsic::Frexp => "frexp",
        Intrinsic::Fwidth => "fwidth",
        Intrinsic::Ldexp => "ldexp",
        Intrinsic::Length => "length",
        Intrinsic::Lerp => "mix",
        Intrinsic::Log | Intrinsic::Log10 => "log",
        Intrinsic::Log2 => "log2",
        Intrinsic::Mad => "fma",
        Intrinsic::Max => "max",
        Intrinsic::Min => "min",
        Intrinsic::Modf => "modf",
        Intrinsic::Mul => "mul",
        Intrinsic::Normalize => "normalize",
        Intrinsic::Pow => "pow",
        Intrinsic::Radians => "radians",
        Intrinsic::Rcp => "rcp",
        Intrinsic::Reflect => "reflect",
        Intrinsic::Refract => "refract",
        Intrinsic::Round => "round",
        Intrinsic::Rsqrt => "inversesqrt",
        Intrinsic::Sign => "sign",
        Intrinsic::Sin => "sin",
        Intrinsic::Sincos => "_sincos",
        Intrinsic::Sinh => "sinh",
        Intrinsic::Smoothstep => "smoothstep",
        Intrinsic::Sqrt => "sqrt",
        Intrinsic::Step => "step",
        Intrinsic::Tan => "tan",
        Intrinsic::Tanh => "tanh",
        Intrinsic::Tex2d => "texture",
        Intrinsic::Tex2dfetch => "_texelFetch",
        Intrinsic::Tex2dgather => "textureGather",
        Intrinsic::Tex2dgatheroffset => "textureGatherOffset",
        Intrinsic::Tex2dgrad => "textureGrad",
        Intrinsic::Tex2dlod => "_textureLod",
        Intrinsic::Tex2dlodoffset => "_textureLodOffset",
        Intrinsic::Tex2doffset => "textureOffset",
        Intrinsic::Tex2dproj => "textureProj",
        Intrinsic::Tex2dsize => "textureSize",
        Intrinsic::Transpose => "transpose",
        Intrinsic::Trunc => "trunc",
    }
}
