//! Global declarations, per-function source buffers and call-graph ordering.
//!
//! The generator keeps three kinds of text apart:
//! - the uniform block members (one `_GLOBAL_` block shared by all stages)
//! - global code: structs, sampler declarations and static globals
//! - one buffer per function, together with the functions it calls
//!
//! A stage source is stitched together from these in
//! [`CodeGenerator::stage_source`](super::entry_point).

use std::collections::{BTreeMap, HashSet};

use crate::ast::{FunctionId, NodeTree, Qualifiers, StructDef, Variable};
use crate::diagnostics::Diagnostics;

use super::expr::LoweringContext;
use super::names::fix_name;
use super::types::{array_suffix, qualifier_prefix, type_name};

/// Lowered text of one function and the functions its body calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSource {
    pub code: String,
    pub callees: Vec<FunctionId>,
}

pub struct CodeGenerator<'a> {
    tree: &'a NodeTree,
    diagnostics: Diagnostics,
    global_code: String,
    uniform_block: String,
    functions: BTreeMap<FunctionId, FunctionSource>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(tree: &'a NodeTree) -> Self {
        Self {
            tree,
            diagnostics: Diagnostics::new(),
            global_code: String::new(),
            uniform_block: String::new(),
            functions: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &'a NodeTree {
        self.tree
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    pub fn global_code(&self) -> &str {
        &self.global_code
    }

    pub fn uniform_block(&self) -> &str {
        &self.uniform_block
    }

    pub fn function_source(&self, id: FunctionId) -> Option<&FunctionSource> {
        self.functions.get(&id)
    }

    pub fn emit_struct(&mut self, def: &StructDef) {
        let tree = self.tree;
        let mut out = format!("struct {}\n{{\n", fix_name(&def.name, &def.namespace));
        if def.fields.is_empty() {
            out.push_str("float _dummy;\n");
        }
        for field in &def.fields {
            out.push_str(&format!(
                "{} {}{};\n",
                type_name(&field.ty.element(), tree),
                fix_name(&field.name, ""),
                array_suffix(&field.ty)
            ));
        }
        out.push_str("};\n");
        self.global_code.push_str(&out);
    }

    pub fn emit_structs(&mut self) {
        for def in &self.tree.structs {
            self.emit_struct(def);
        }
    }

    pub fn declare_sampler(&mut self, var: &Variable, binding: u32) {
        self.global_code.push_str(&format!(
            "layout(binding = {binding}) uniform sampler2D {};\n",
            fix_name(&var.name, &var.namespace)
        ));
    }

    /// Adds `var` as a member of the shared uniform block.
    pub fn declare_uniform(&mut self, var: &Variable) {
        let mut ty = var.ty.clone();
        ty.qualifiers.remove(Qualifiers::UNIFORM | Qualifiers::CONST);
        self.uniform_block.push_str(&format!(
            "{}{} {}{};\n",
            qualifier_prefix(&ty),
            type_name(&ty.element(), self.tree),
            fix_name(&var.name, &var.namespace),
            array_suffix(&ty)
        ));
    }

    /// Emits a non-uniform global (a `static` in the effect language).
    pub fn emit_global(&mut self, var: &Variable) {
        let mut var = var.clone();
        var.ty.qualifiers.remove(Qualifiers::STATIC | Qualifiers::UNIFORM | Qualifiers::EXTERN);
        let tree = self.tree;
        let mut ctx = LoweringContext::new(tree, &mut self.diagnostics);
        let decl = ctx.declaration(&var);
        self.global_code.push_str(&decl);
        self.global_code.push_str(";\n");
    }

    pub fn emit_function(&mut self, id: FunctionId) {
        let tree = self.tree;
        let Some(function) = tree.function(id) else {
            self.diagnostics.error(
                &Default::default(),
                format!("reference to undefined function #{}", id.0),
            );
            return;
        };

        let mut ctx = LoweringContext::new(tree, &mut self.diagnostics);
        ctx.current_function = Some(id);

        let params: Vec<String> = function
            .parameters
            .iter()
            .map(|p| {
                let mut ty = p.ty.clone();
                ty.qualifiers &= Qualifiers::INOUT | Qualifiers::CONST;
                format!(
                    "{}{} {}{}",
                    qualifier_prefix(&ty),
                    ctx.type_name(&ty.element()),
                    fix_name(&p.name, ""),
                    array_suffix(&ty)
                )
            })
            .collect();
        let mut code = format!(
            "{} {}({})\n",
            ctx.type_name(&function.return_type.element()),
            fix_name(&function.name, &function.namespace),
            params.join(", ")
        );
        match &function.definition {
            Some(body @ crate::ast::Statement::Compound { .. }) => ctx.statement(&mut code, body),
            Some(body) => {
                code.push_str("{\n");
                ctx.statement(&mut code, body);
                code.push_str("}\n");
            }
            None => {
                code.pop();
                code.push_str(";\n");
            }
        }
        let callees = std::mem::take(&mut ctx.callees);
        self.functions.insert(id, FunctionSource { code, callees });
    }

    pub fn emit_functions(&mut self) {
        for i in 0..self.tree.functions.len() {
            self.emit_function(FunctionId(i));
        }
    }

    fn ensure_emitted(&mut self, id: FunctionId) {
        if !self.functions.contains_key(&id) {
            self.emit_function(id);
        }
    }

    /// Transitive callees of `entry` in post-order: every function appears
    /// after everything it calls. `entry` itself is not included.
    pub fn dependency_order(&mut self, entry: FunctionId) -> Vec<FunctionId> {
        let mut visited = HashSet::from([entry]);
        let mut order = Vec::new();
        self.visit_callees(entry, &mut visited, &mut order);
        order
    }

    fn visit_callees(
        &mut self,
        id: FunctionId,
        visited: &mut HashSet<FunctionId>,
        order: &mut Vec<FunctionId>,
    ) {
        self.ensure_emitted(id);
        let callees = self
            .functions
            .get(&id)
            .map(|f| f.callees.clone())
            .unwrap_or_default();
        for callee in callees {
            if visited.insert(callee) {
                self.visit_callees(callee, visited, order);
                order.push(callee);
            }
        }
    }
}
