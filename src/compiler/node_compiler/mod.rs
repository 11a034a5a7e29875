//! Per-kind node compilers and the dispatch that routes each build phase to
//! them.

pub mod attribute;
pub mod color_nodes;
pub mod flow_nodes;
pub mod function_nodes;
pub mod input_nodes;
pub mod math_nodes;
pub mod texture_nodes;
pub mod vector_nodes;

use crate::compiler::context::{BuildContext, ShaderStage};
use crate::compiler::types::{ShaderType, can_convert, wider};
use crate::error::{CompileError, Result};
use crate::graph::{NodeId, NodeKind};

/// Setup hook: registers varyings and attributes, then visits children.
pub fn setup(ctx: &mut BuildContext<'_>, id: NodeId) -> Result<()> {
    let kind = &ctx.graph().node(id).kind;
    match kind {
        NodeKind::Attribute { name, ty } => return ctx.require_attribute(name, *ty),
        NodeKind::Varying { node, name } => {
            return match ctx.stage() {
                ShaderStage::Fragment => ctx.require_node_varying(id, *node, name.as_deref()),
                ShaderStage::Vertex => ctx.setup_node(*node),
                ShaderStage::Compute => Err(CompileError::unsupported(
                    "varyings are not available in compute stages",
                )),
            };
        }
        NodeKind::Texture { uv: None, .. } => ctx.require_attribute("uv", ShaderType::VEC2)?,
        NodeKind::Call { args, .. } => {
            for arg in args {
                ctx.setup_node(*arg)?;
            }
            let (function, signature) = ctx.call_target(id)?;
            let body = function_nodes::function_body(ctx, function)?;
            return ctx.with_signature(signature, |ctx| ctx.setup_node(body));
        }
        NodeKind::Function { .. } | NodeKind::Overload { .. } => return Ok(()),
        _ => {}
    }
    for child in kind.children() {
        ctx.setup_node(child)?;
    }
    Ok(())
}

/// Analyze hook: counts references of every reachable node.
pub fn analyze(ctx: &mut BuildContext<'_>, id: NodeId) -> Result<()> {
    let kind = &ctx.graph().node(id).kind;
    match kind {
        NodeKind::Call { args, .. } => {
            for arg in args {
                ctx.analyze_node(*arg)?;
            }
            let (function, signature) = ctx.call_target(id)?;
            let body = function_nodes::function_body(ctx, function)?;
            ctx.analyze_function(function, signature, body)
        }
        NodeKind::Function { .. } | NodeKind::Overload { .. } => Ok(()),
        // the source is counted in the vertex stage
        NodeKind::Varying { .. } if ctx.stage() == ShaderStage::Fragment => Ok(()),
        _ => {
            for child in kind.children() {
                ctx.analyze_node(child)?;
            }
            Ok(())
        }
    }
}

/// Infer the output type of a node from its kind and inputs.
pub fn resolve_type(ctx: &mut BuildContext<'_>, id: NodeId) -> Result<ShaderType> {
    let kind = &ctx.graph().node(id).kind;
    match kind {
        NodeKind::Constant(literal) => {
            literal.check_finite()?;
            Ok(literal.ty())
        }
        NodeKind::Uniform { ty, .. }
        | NodeKind::Attribute { ty, .. }
        | NodeKind::Property { ty, .. }
        | NodeKind::Expression { ty, .. } => Ok(*ty),
        NodeKind::Varying { node, .. } | NodeKind::Var { node, .. } => ctx.node_type(*node),
        NodeKind::Assign { .. }
        | NodeKind::Loop { .. }
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Discard
        | NodeKind::Function { .. }
        | NodeKind::Overload { .. } => Ok(ShaderType::Void),
        NodeKind::Operator { op, a, b } => math_nodes::operator_type(ctx, *op, *a, *b),
        NodeKind::Unary { op, a } => math_nodes::unary_type(ctx, *op, *a),
        NodeKind::Math { method, args } => math_nodes::math_type(ctx, *method, args),
        NodeKind::Convert { node, to } => {
            let from = ctx.node_type(*node)?;
            if from != ShaderType::Void && !can_convert(from, *to) {
                return Err(CompileError::type_resolution(format!(
                    "convert only widens; {from} cannot become {to}"
                )));
            }
            Ok(*to)
        }
        NodeKind::Split { node, components } => vector_nodes::split_type(ctx, *node, components),
        NodeKind::Join { nodes, ty } => vector_nodes::join_type(ctx, nodes, *ty),
        NodeKind::Texture { .. } => Ok(ShaderType::VEC4),
        NodeKind::Element { node, .. } => vector_nodes::element_type(ctx, *node),
        NodeKind::Member { node, member } => vector_nodes::member_type(ctx, *node, member),
        NodeKind::Builtin(builtin) => Ok(builtin.ty()),
        NodeKind::Stack { output, .. } => match output {
            Some(output) => ctx.node_type(*output),
            None => Ok(ShaderType::Void),
        },
        NodeKind::Conditional {
            if_true, if_false, ..
        } => {
            let t = ctx.node_type(*if_true)?;
            let f = match if_false {
                Some(f) => ctx.node_type(*f)?,
                None => ShaderType::Void,
            };
            Ok(wider(t, f))
        }
        NodeKind::LoopIndex { loop_node } => flow_nodes::loop_index_type(ctx, *loop_node),
        NodeKind::Parameter { function, index } => ctx.parameter_type(*function, *index),
        NodeKind::Call { .. } => function_nodes::call_type(ctx, id),
        NodeKind::ToneMap { .. } => Ok(ShaderType::VEC3),
        NodeKind::ColorSpace { color, .. } => color_nodes::color_space_type(ctx, *color),
    }
}

/// Emit code for one node and return the expression standing for its value.
/// Statement kinds write their code to the flow and return an empty string.
pub fn generate(ctx: &mut BuildContext<'_>, id: NodeId) -> Result<String> {
    let kind = &ctx.graph().node(id).kind;
    match kind {
        NodeKind::Constant(literal) => Ok(input_nodes::compile_constant(literal)),
        NodeKind::Uniform { .. } => ctx.register_uniform(id),
        NodeKind::Property { name, ty } => ctx.property_var(name, *ty),
        NodeKind::Var { node, name } => input_nodes::compile_var(ctx, id, *node, name.as_deref()),
        NodeKind::Assign { target, value } => input_nodes::compile_assign(ctx, *target, *value),
        NodeKind::Expression { snippet, inputs, .. } => {
            input_nodes::compile_expression(ctx, snippet, inputs)
        }
        NodeKind::Builtin(builtin) => ctx.use_builtin(*builtin),
        NodeKind::Attribute { name, ty } => attribute::compile_attribute(ctx, name, *ty),
        NodeKind::Varying { node, .. } => attribute::compile_varying(ctx, id, *node),
        NodeKind::Operator { op, a, b } => math_nodes::compile_operator(ctx, id, *op, *a, *b),
        NodeKind::Unary { op, a } => math_nodes::compile_unary(ctx, id, *op, *a),
        NodeKind::Math { method, args } => math_nodes::compile_math(ctx, id, *method, args),
        NodeKind::Convert { node, to } => ctx.build(*node, Some(*to)),
        NodeKind::Split { node, components } => {
            vector_nodes::compile_split(ctx, *node, components)
        }
        NodeKind::Join { nodes, .. } => vector_nodes::compile_join(ctx, id, nodes),
        NodeKind::Element { node, index } => vector_nodes::compile_element(ctx, *node, *index),
        NodeKind::Member { node, member } => vector_nodes::compile_member(ctx, *node, member),
        NodeKind::Texture { name, uv, level } => {
            texture_nodes::compile_texture(ctx, name, *uv, *level)
        }
        NodeKind::Stack { nodes, output } => flow_nodes::compile_stack(ctx, nodes, *output),
        NodeKind::Conditional {
            cond,
            if_true,
            if_false,
        } => flow_nodes::compile_conditional(ctx, id, *cond, *if_true, *if_false),
        NodeKind::Loop { range, body } => flow_nodes::compile_loop(ctx, id, range, *body),
        NodeKind::LoopIndex { loop_node } => flow_nodes::compile_loop_index(ctx, *loop_node),
        NodeKind::Break => flow_nodes::compile_jump(ctx, "break"),
        NodeKind::Continue => flow_nodes::compile_jump(ctx, "continue"),
        NodeKind::Discard => flow_nodes::compile_discard(ctx),
        NodeKind::Function { .. } | NodeKind::Overload { .. } => Err(
            CompileError::type_resolution("functions are only usable through call nodes"),
        ),
        NodeKind::Parameter { function, index } => ctx.parameter_name(*function, *index),
        NodeKind::Call { args, .. } => function_nodes::compile_call(ctx, id, args),
        NodeKind::ToneMap {
            mapping,
            color,
            exposure,
        } => color_nodes::compile_tone_map(ctx, *mapping, *color, *exposure),
        NodeKind::ColorSpace { from, to, color } => {
            color_nodes::compile_color_space(ctx, *from, *to, *color)
        }
    }
}

/// Kinds whose expression is worth a variable when referenced more than once.
pub fn is_hoistable(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Operator { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Math { .. }
            | NodeKind::Join { .. }
            | NodeKind::Convert { .. }
            | NodeKind::Element { .. }
            | NodeKind::Member { .. }
            | NodeKind::Expression { .. }
            | NodeKind::Call { .. }
            | NodeKind::ToneMap { .. }
            | NodeKind::ColorSpace { .. }
            | NodeKind::Conditional { .. }
    )
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::compiler::context::{BuildContext, CompiledProgram, StageRoots, UniformRegistry};
    use crate::compiler::wgsl::WgslBackend;
    use crate::error::Result;
    use crate::graph::{NodeGraph, NodeId};
    use crate::options::CompilerOptions;

    /// Compile a fragment root with a constant vertex position.
    pub fn compile_fragment(graph: &mut NodeGraph, root: NodeId) -> Result<CompiledProgram> {
        compile_fragment_with(graph, root, &CompilerOptions::default())
    }

    pub fn compile_fragment_with(
        graph: &mut NodeGraph,
        root: NodeId,
        options: &CompilerOptions,
    ) -> Result<CompiledProgram> {
        let position = graph.vec4(0.0, 0.0, 0.0, 1.0);
        let backend = WgslBackend;
        let mut registry = UniformRegistry::new();
        BuildContext::new(graph, options, &backend, &mut registry)
            .compile(&StageRoots::render(position, root))
    }

    /// Fragment flow followed by the result expression, for snapshot-style asserts.
    pub fn fragment_text(program: &CompiledProgram) -> String {
        let stage = program.fragment.as_ref().map(|s| {
            format!("{}=> {}", s.flow, s.result.clone().unwrap_or_default())
        });
        stage.unwrap_or_default()
    }
}
