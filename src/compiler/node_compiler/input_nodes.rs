//! Compilers for value-source and variable nodes (Constant, Var, Assign,
//! Expression).

use crate::compiler::context::BuildContext;
use crate::compiler::types::resolve_swizzle;
use crate::compiler::utils::{fmt_literal, wrap, wrap_operand};
use crate::error::{CompileError, Result};
use crate::graph::{Literal, NodeId, NodeKind};

/// Compile a Constant node to a WGSL literal.
///
/// # Example
/// ```wgsl
/// vec3f(1.0, 0.5, 0.0)
/// ```
pub fn compile_constant(literal: &Literal) -> String {
    fmt_literal(literal)
}

/// Compile a Var node: evaluates `node` once into a named variable.
///
/// # Example
/// ```wgsl
/// nodeVar0 = (a * b);
/// ```
pub fn compile_var(
    ctx: &mut BuildContext<'_>,
    id: NodeId,
    node: NodeId,
    name: Option<&str>,
) -> Result<String> {
    let ty = ctx.node_type(id)?;
    let value = ctx.build(node, Some(ty))?;
    let var = match name {
        Some(name) => ctx.declare_named_var(name, ty)?,
        None => ctx.declare_var(ty, "nodeVar")?,
    };
    ctx.add_line(&format!("{var} = {value};"));
    Ok(var)
}

/// Compile an Assign node. The target must resolve to an assignable place:
/// a property, a variable, a component selection or an indexed element.
/// Multi-component selections are written one component at a time since
/// WGSL cannot assign through a swizzle.
pub fn compile_assign(ctx: &mut BuildContext<'_>, target: NodeId, value: NodeId) -> Result<String> {
    let target = ctx.canonical(target)?;
    let target_ty = ctx.node_type(target)?;
    match &ctx.graph().node(target).kind {
        NodeKind::Property { .. }
        | NodeKind::Var { .. }
        | NodeKind::Element { .. }
        | NodeKind::Member { .. } => {
            let place = ctx.build(target, None)?;
            let value = ctx.build(value, Some(target_ty))?;
            ctx.add_line(&format!("{place} = {value};"));
        }
        NodeKind::Split { node, components } => {
            let base_ty = ctx.node_type(*node)?;
            let swizzle = resolve_swizzle(base_ty, components)?;
            let base = ctx.build(*node, None)?;
            let value = ctx.build(value, Some(target_ty))?;
            if swizzle.components.len() == 1 {
                ctx.add_line(&format!("{}.{} = {value};", wrap(&base), swizzle.components));
            } else {
                let tmp = ctx.declare_var(target_ty, "nodeVar")?;
                ctx.add_line(&format!("{tmp} = {value};"));
                for (src, dst) in "xyzw".chars().zip(swizzle.components.chars()) {
                    ctx.add_line(&format!("{}.{dst} = {tmp}.{src};", wrap(&base)));
                }
            }
        }
        other => {
            return Err(CompileError::type_resolution(format!(
                "cannot assign to a {} node",
                other.tag()
            )));
        }
    }
    Ok(String::new())
}

/// Compile an Expression node by substituting `$N` placeholders with the
/// built inputs. Higher indices are replaced first so `$1` never eats the
/// prefix of `$10`.
pub fn compile_expression(ctx: &mut BuildContext<'_>, snippet: &str, inputs: &[NodeId]) -> Result<String> {
    let mut built = Vec::with_capacity(inputs.len());
    for input in inputs {
        built.push(wrap_operand(&ctx.build(*input, None)?));
    }
    let mut out = snippet.to_string();
    for (i, value) in built.iter().enumerate().rev() {
        out = out.replace(&format!("${i}"), value);
    }
    if out.contains('$') {
        return Err(CompileError::type_resolution(format!(
            "expression '{snippet}' references a missing input"
        )));
    }
    Ok(out)
}

/// Whether a built snippet names a plain variable.
pub fn is_identifier(snippet: &str) -> bool {
    !snippet.is_empty()
        && !snippet.starts_with(|c: char| c.is_ascii_digit())
        && snippet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::node_compiler::test_utils::{compile_fragment, fragment_text};
    use crate::compiler::types::ShaderType;
    use crate::graph::{NodeGraph, UniformGroup};

    fn assert_type_error(g: &mut NodeGraph, root: NodeId) -> String {
        let err = compile_fragment(g, root).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
        err.to_string()
    }

    #[test]
    fn var_is_assigned_once() {
        let mut g = NodeGraph::new();
        let a = g.float(2.0);
        let b = g.float(3.0);
        let sum = g.add(a, b);
        let v = g.named_var(sum, "total");
        let out = g.convert(v, ShaderType::VEC4);
        let program = compile_fragment(&mut g, out).unwrap();
        let text = fragment_text(&program);
        assert!(text.contains("total = (2.0 + 3.0);"), "{text}");
        assert!(text.ends_with("=> vec4f(total)"), "{text}");
    }

    #[test]
    fn swizzle_assignment_writes_each_component() {
        let mut g = NodeGraph::new();
        let color = g.property("color", ShaderType::VEC4);
        let rgb = g.split(color, "rgb");
        let value = g.vec3(1.0, 0.0, 0.0);
        let write = g.assign(rgb, value);
        let out = g.stack(&[write], Some(color));
        let program = compile_fragment(&mut g, out).unwrap();
        let text = fragment_text(&program);
        assert!(text.contains("nodeVar0 = vec3f(1.0, 0.0, 0.0);"), "{text}");
        assert!(text.contains("color.x = nodeVar0.x;"), "{text}");
        assert!(text.contains("color.z = nodeVar0.z;"), "{text}");
    }

    #[test]
    fn assigning_to_a_constant_fails() {
        let mut g = NodeGraph::new();
        let c = g.float(1.0);
        let v = g.float(2.0);
        let write = g.assign(c, v);
        let out_value = g.vec4(0.0, 0.0, 0.0, 1.0);
        let out = g.stack(&[write], Some(out_value));
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }));
    }

    #[test]
    fn convert_only_widens() {
        let mut g = NodeGraph::new();
        let tint = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let to_float = g.convert(tint, ShaderType::FLOAT);
        let msg = assert_type_error(&mut g, to_float);
        assert!(msg.contains("Convert"), "{msg}");

        let half = g.float(0.5);
        let to_int = g.convert(half, ShaderType::INT);
        let out = g.convert(to_int, ShaderType::VEC4);
        assert_type_error(&mut g, out);

        let widened = g.convert(half, ShaderType::VEC3);
        let out = g.convert(widened, ShaderType::VEC4);
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(text.ends_with("=> vec4f(vec3f(0.5), 1.0)"), "{text}");
    }

    #[test]
    fn narrowing_assignment_is_rejected() {
        let mut g = NodeGraph::new();
        let normal = g.property("normal", ShaderType::VEC3);
        let tint = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let write = g.assign(normal, tint);
        let out = g.stack(&[write], Some(tint));
        let msg = assert_type_error(&mut g, out);
        assert!(msg.contains("vec4 to vec3"), "{msg}");
    }

    #[test]
    fn var_narrower_than_its_value_is_rejected() {
        let mut g = NodeGraph::new();
        let tint = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let v = g.var(tint);
        g.set_declared_type(v, ShaderType::FLOAT);
        let out = g.convert(v, ShaderType::VEC4);
        assert_type_error(&mut g, out);
    }

    #[test]
    fn declared_type_must_widen_the_inferred_one() {
        let mut g = NodeGraph::new();
        let tint = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let sum = g.add(tint, tint);
        g.set_declared_type(sum, ShaderType::VEC3);
        let out = g.convert(sum, ShaderType::VEC4);
        let msg = assert_type_error(&mut g, out);
        assert!(msg.contains("Operator"), "{msg}");
    }

    #[test]
    fn expression_placeholders() {
        let mut g = NodeGraph::new();
        let a = g.float(1.0);
        let b = g.float(2.0);
        let sum = g.add(a, b);
        let e = g.expression("vec4f($0, $1, 0.0, 1.0)", ShaderType::VEC4, &[sum, b]);
        let program = compile_fragment(&mut g, e).unwrap();
        assert!(fragment_text(&program).ends_with("=> vec4f((1.0 + 2.0), 2.0, 0.0, 1.0)"));
    }
}
