//! Per-stage source synthesis.
//!
//! An entry function is wrapped into a GLSL stage: the fixed prelude, the
//! shared uniform block, global code, the entry's dependencies in post-order,
//! the entry itself, interface variable declarations and a generated `main`
//! that marshals interface variables and builtins into the entry's
//! parameters and scatters outputs back afterwards.

use crate::ast::{Function, FunctionId, Location, Qualifiers, Type, Variable};

use super::ShaderStage;
use super::codegen::CodeGenerator;
use super::names::{SemanticSlot, builtin_for_semantic, fix_name, semantic_slot};
use super::types::{cast, qualifier_prefix, type_name};

/// Helpers every stage may call, emitted ahead of user code.
pub const PRELUDE: &str = "#version 450\n\
float _fmod(float x, float y) { return x - y * trunc(x / y); }\n\
vec2 _fmod(vec2 x, vec2 y) { return x - y * trunc(x / y); }\n\
vec3 _fmod(vec3 x, vec3 y) { return x - y * trunc(x / y); }\n\
vec4 _fmod(vec4 x, vec4 y) { return x - y * trunc(x / y); }\n\
mat2 _fmod(mat2 x, mat2 y) { return mat2(_fmod(x[0], y[0]), _fmod(x[1], y[1])); }\n\
mat3 _fmod(mat3 x, mat3 y) { return mat3(_fmod(x[0], y[0]), _fmod(x[1], y[1]), _fmod(x[2], y[2])); }\n\
mat4 _fmod(mat4 x, mat4 y) { return mat4(_fmod(x[0], y[0]), _fmod(x[1], y[1]), _fmod(x[2], y[2]), _fmod(x[3], y[3])); }\n\
void _sincos(float x, out float s, out float c) { s = sin(x); c = cos(x); }\n\
void _sincos(vec2 x, out vec2 s, out vec2 c) { s = sin(x); c = cos(x); }\n\
void _sincos(vec3 x, out vec3 s, out vec3 c) { s = sin(x); c = cos(x); }\n\
void _sincos(vec4 x, out vec4 s, out vec4 c) { s = sin(x); c = cos(x); }\n\
#define _textureLod(s, c) textureLod(s, (c).xy, (c).w)\n\
#define _textureLodOffset(s, c, offset) textureLodOffset(s, (c).xy, (c).w, offset)\n\
#define _texelFetch(s, c) texelFetch(s, ivec2((c).x, textureSize(s, (c).w).y - 1 - (c).y), (c).w)\n";

/// Maps clip-space depth from [0, 1] to GL's [-1, 1].
const VERTEX_DEPTH_FIXUP: &str =
    "gl_Position = gl_Position * vec4(1.0, 1.0, 2.0, 1.0) + vec4(0.0, 0.0, -gl_Position.w, 0.0);\n";

const COLOR_SWIZZLES: [&str; 3] = ["x", "xy", "xyz"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// One interface variable or builtin as seen from `main`.
#[derive(Clone, Debug)]
struct Slot {
    name: String,
    ty: Type,
    /// Color outputs are `vec4` and default to opaque black.
    color: bool,
}

#[derive(Default)]
struct MainBuilder {
    declarations: String,
    prologue: String,
    arguments: Vec<String>,
    call: String,
    epilogue: String,
}

impl CodeGenerator<'_> {
    /// Complete GLSL source of the stage whose entry point is `entry`.
    pub fn stage_source(&mut self, entry: FunctionId, stage: ShaderStage) -> String {
        let tree = self.tree();
        let Some(function) = tree.function(entry) else {
            self.diagnostics_mut().error(
                &Location::default(),
                format!("entry point #{} does not exist", entry.0),
            );
            return String::new();
        };

        let dependencies = self.dependency_order(entry);

        let mut source = String::from(PRELUDE);
        if stage == ShaderStage::Vertex {
            source.push_str("#define discard\n");
        }
        if !self.uniform_block().is_empty() {
            source.push_str("layout(std140, binding = 0) uniform _GLOBAL_\n{\n");
            source.push_str(self.uniform_block());
            source.push_str("};\n");
        }
        source.push_str(self.global_code());
        for id in dependencies.iter().chain(std::iter::once(&entry)) {
            if let Some(f) = self.function_source(*id) {
                source.push_str(&f.code);
            }
        }

        let main = self.build_main(function, stage);
        source.push_str(&main.declarations);
        source.push_str("void main()\n{\n");
        source.push_str(&main.prologue);
        source.push_str(&main.call);
        source.push_str(&main.epilogue);
        if stage == ShaderStage::Vertex {
            source.push_str(VERTEX_DEPTH_FIXUP);
        }
        source.push_str("}\n");
        source
    }

    fn build_main(&mut self, function: &Function, stage: ShaderStage) -> MainBuilder {
        let tree = self.tree();
        let mut main = MainBuilder::default();

        for param in &function.parameters {
            self.marshal_parameter(&mut main, param, stage);
        }

        let call = format!(
            "{}({})",
            fix_name(&function.name, &function.namespace),
            main.arguments.join(", ")
        );
        let ret = &function.return_type;
        if ret.is_void() {
            main.call = format!("{call};\n");
        } else if ret.is_struct() {
            let Some(def) = ret.definition.and_then(|id| tree.structure(id)) else {
                self.diagnostics_mut()
                    .error(&function.location, "entry point returns an undefined structure");
                return main;
            };
            main.call = format!("{} _return = {call};\n", type_name(&ret.element(), tree));
            for field in &def.fields {
                let fname = fix_name(&field.name, "");
                let slots = self.interface_slots(
                    &mut main.declarations,
                    &format!("_return_{fname}"),
                    &field.ty,
                    &field.semantic,
                    Direction::Out,
                    stage,
                    &field.location,
                );
                if let Some(slot) = slots.first() {
                    let store = self.store(slot, &format!("_return.{fname}"), &field.ty);
                    main.epilogue.push_str(&store);
                }
            }
        } else {
            let slots = self.interface_slots(
                &mut main.declarations,
                "_return",
                ret,
                &function.return_semantic,
                Direction::Out,
                stage,
                &function.location,
            );
            match slots.first() {
                Some(slot) => main.call = self.store(slot, &call, ret),
                None => main.call = format!("{call};\n"),
            }
        }
        main
    }

    fn marshal_parameter(&mut self, main: &mut MainBuilder, param: &Variable, stage: ShaderStage) {
        let tree = self.tree();
        let pname = format!("_param_{}", fix_name(&param.name, ""));
        let writes = param.ty.has(Qualifiers::OUT);
        let reads = !writes || param.ty.has(Qualifiers::INOUT);
        let direction = if writes { Direction::Out } else { Direction::In };
        let element = param.ty.element();

        if param.ty.is_struct() {
            if param.ty.is_array() {
                self.diagnostics_mut().error(
                    &param.location,
                    "arrays of structures are not supported as entry point parameters",
                );
                main.arguments.push(pname);
                return;
            }
            let Some(def) = param.ty.definition.and_then(|id| tree.structure(id)) else {
                self.diagnostics_mut()
                    .error(&param.location, "entry point parameter has an undefined structure");
                main.arguments.push(pname);
                return;
            };
            let struct_name = type_name(&element, tree);
            let mut fields = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                let fname = fix_name(&field.name, "");
                let mut field_ty = field.ty.clone();
                field_ty.qualifiers |= param.ty.qualifiers & interpolation_qualifiers();
                let slots = self.interface_slots(
                    &mut main.declarations,
                    &format!("{pname}_{fname}"),
                    &field_ty,
                    &field.semantic,
                    direction,
                    stage,
                    &field.location,
                );
                if let Some(slot) = slots.into_iter().next() {
                    fields.push((fname, field.ty.element(), slot));
                }
            }
            if reads && fields.len() == def.fields.len() {
                let values: Vec<String> = fields
                    .iter()
                    .map(|(_, ty, slot)| cast(&slot.ty, ty, tree).wrap(&slot.name))
                    .collect();
                main.prologue.push_str(&format!(
                    "{struct_name} {pname} = {struct_name}({});\n",
                    values.join(", ")
                ));
            } else {
                main.prologue.push_str(&format!("{struct_name} {pname};\n"));
            }
            if writes {
                for (fname, ty, slot) in &fields {
                    let store = self.store(slot, &format!("{pname}.{fname}"), ty);
                    main.epilogue.push_str(&store);
                }
            }
            main.arguments.push(pname);
            return;
        }

        let slots = self.interface_slots(
            &mut main.declarations,
            &pname,
            &param.ty,
            &param.semantic,
            direction,
            stage,
            &param.location,
        );

        if let Some(length) = param.ty.array_length {
            let elem_name = type_name(&element, tree);
            if reads {
                let values: Vec<String> = slots
                    .iter()
                    .map(|slot| cast(&slot.ty, &element, tree).wrap(&slot.name))
                    .collect();
                main.prologue.push_str(&format!(
                    "{elem_name} {pname}[{length}] = {elem_name}[{length}]({});\n",
                    values.join(", ")
                ));
            } else {
                main.prologue
                    .push_str(&format!("{elem_name} {pname}[{length}];\n"));
            }
            if writes {
                for (i, slot) in slots.iter().enumerate() {
                    let store = self.store(slot, &format!("{pname}[{i}]"), &element);
                    main.epilogue.push_str(&store);
                }
            }
            main.arguments.push(pname);
            return;
        }

        let Some(slot) = slots.into_iter().next() else {
            main.arguments.push(pname);
            return;
        };

        if !writes {
            main.arguments
                .push(cast(&slot.ty, &element, tree).wrap(&slot.name));
        } else if slot.ty == element {
            main.arguments.push(slot.name);
        } else if slot.color && slot.ty.base == element.base && element.rows < 4 && !element.is_matrix() {
            if !reads {
                main.prologue
                    .push_str(&format!("{} = vec4(0, 0, 0, 1);\n", slot.name));
            }
            let swizzle = COLOR_SWIZZLES[element.rows.clamp(1, 3) as usize - 1];
            main.arguments.push(format!("{}.{swizzle}", slot.name));
        } else {
            // Shapes differ: go through a local and convert on both ends.
            let local_ty = type_name(&element, tree);
            if reads {
                main.prologue.push_str(&format!(
                    "{local_ty} {pname} = {};\n",
                    cast(&slot.ty, &element, tree).wrap(&slot.name)
                ));
            } else {
                main.prologue.push_str(&format!("{local_ty} {pname};\n"));
            }
            let store = self.store(&slot, &pname, &element);
            main.epilogue.push_str(&store);
            main.arguments.push(pname);
        }
    }

    /// Resolves `semantic` to a builtin or declares interface variables for
    /// it (one per array element).
    #[allow(clippy::too_many_arguments)]
    fn interface_slots(
        &mut self,
        declarations: &mut String,
        name: &str,
        ty: &Type,
        semantic: &str,
        direction: Direction,
        stage: ShaderStage,
        location: &Location,
    ) -> Vec<Slot> {
        let count = ty.array_length.map_or(1, |n| n.max(1));

        if let Some(builtin) = builtin_for_semantic(semantic, stage) {
            return (0..count)
                .map(|_| Slot {
                    name: builtin.name.to_string(),
                    ty: builtin.ty.clone(),
                    color: false,
                })
                .collect();
        }

        let slot = semantic_slot(semantic).unwrap_or_else(|| {
            self.diagnostics_mut().warning(
                location,
                format!("semantic '{semantic}' has no interface location, using location 0"),
            );
            SemanticSlot {
                location: 0,
                force_vec4: false,
            }
        });

        let mut var_ty = ty.element();
        if slot.force_vec4 {
            var_ty.rows = 4;
            var_ty.cols = 1;
        }
        let mut qualifiers = ty.qualifiers & interpolation_qualifiers();
        let between_stages = matches!(
            (stage, direction),
            (ShaderStage::Vertex, Direction::Out) | (ShaderStage::Fragment, Direction::In)
        );
        if !between_stages {
            qualifiers = Qualifiers::empty();
        } else if var_ty.is_integral() {
            qualifiers |= Qualifiers::NO_INTERPOLATION;
        }
        qualifiers |= match direction {
            Direction::In => Qualifiers::IN,
            Direction::Out => Qualifiers::OUT,
        };
        let declared = var_ty.clone().with_qualifiers(qualifiers);
        let decl_type = format!(
            "{}{}",
            qualifier_prefix(&declared),
            type_name(&var_ty, self.tree())
        );

        (0..count)
            .map(|i| {
                let var_name = if ty.is_array() {
                    format!("{name}{i}")
                } else {
                    name.to_string()
                };
                declarations.push_str(&format!(
                    "layout(location = {}) {decl_type} {var_name};\n",
                    slot.location + i
                ));
                Slot {
                    name: var_name,
                    ty: var_ty.clone(),
                    color: slot.force_vec4,
                }
            })
            .collect()
    }

    /// Assignment of `value` (of type `ty`) into an output slot.
    fn store(&self, slot: &Slot, value: &str, ty: &Type) -> String {
        let tree = self.tree();
        if slot.color && ty.rows < 4 && !ty.is_matrix() && ty.is_numeric() {
            let swizzle = COLOR_SWIZZLES[ty.rows.clamp(1, 3) as usize - 1];
            let target = Type::vector(slot.ty.base, ty.rows);
            let target = if ty.rows == 1 {
                Type::scalar(slot.ty.base)
            } else {
                target
            };
            return format!(
                "{name} = vec4(0, 0, 0, 1);\n{name}.{swizzle} = {};\n",
                cast(ty, &target, tree).wrap(value),
                name = slot.name
            );
        }
        format!("{} = {};\n", slot.name, cast(ty, &slot.ty, tree).wrap(value))
    }
}

fn interpolation_qualifiers() -> Qualifiers {
    Qualifiers::LINEAR
        | Qualifiers::NO_PERSPECTIVE
        | Qualifiers::CENTROID
        | Qualifiers::NO_INTERPOLATION
}
