//! Compilers for component access and construction (Split, Join, Element,
//! Member).

use crate::compiler::context::BuildContext;
use crate::compiler::types::{Scalar, ShaderType, resolve_swizzle};
use crate::compiler::utils::{vector_ctor, wgsl_type, wrap};
use crate::error::{CompileError, Result};
use crate::graph::NodeId;

pub fn split_type(ctx: &mut BuildContext<'_>, node: NodeId, components: &str) -> Result<ShaderType> {
    let source = ctx.node_type(node)?;
    Ok(resolve_swizzle(source, components)?.ty)
}

/// Compile a Split node to a swizzle. Selecting every component in order
/// yields the source unchanged; scalars are splatted instead of swizzled.
///
/// # Example
/// ```wgsl
/// color.xyz
/// vec2f(alpha)
/// ```
pub fn compile_split(ctx: &mut BuildContext<'_>, node: NodeId, components: &str) -> Result<String> {
    let source_ty = ctx.node_type(node)?;
    let swizzle = resolve_swizzle(source_ty, components)?;
    let base = ctx.build(node, None)?;
    if swizzle.identity {
        return Ok(base);
    }
    match source_ty {
        ShaderType::Scalar(scalar) => Ok(format!(
            "{}({base})",
            vector_ctor(scalar, swizzle.components.len())
        )),
        _ => Ok(format!("{}.{}", wrap(&base), swizzle.components)),
    }
}

/// Result of joining `nodes`: a vector of the summed length (or the declared
/// type, whose length must match).
pub fn join_type(ctx: &mut BuildContext<'_>, nodes: &[NodeId], declared: Option<ShaderType>) -> Result<ShaderType> {
    if nodes.is_empty() {
        return Err(CompileError::type_resolution("join needs at least one input"));
    }
    let mut total = 0;
    let mut scalar = Scalar::Bool;
    for node in nodes {
        let ty = ctx.node_type(*node)?;
        let Some(s) = ty.scalar().filter(|_| ty.is_vector_like()) else {
            return Err(CompileError::type_resolution(format!("cannot join a {ty} value")));
        };
        if s > scalar {
            scalar = s;
        }
        total += ty.length();
    }
    match declared {
        Some(ShaderType::Matrix(n)) if total == (n as usize) * (n as usize) => {
            Ok(ShaderType::Matrix(n))
        }
        Some(ty) if ty.is_vector_like() && ty.length() == total => Ok(ty),
        Some(ty) => Err(CompileError::type_resolution(format!(
            "join of {total} component(s) cannot form {ty}"
        ))),
        None => ShaderType::vector(scalar, total),
    }
}

/// Compile a Join node to a constructor call.
///
/// # Example
/// ```wgsl
/// vec4f(rgb, 1.0)
/// ```
pub fn compile_join(ctx: &mut BuildContext<'_>, id: NodeId, nodes: &[NodeId]) -> Result<String> {
    let out = ctx.inferred_type(id)?;
    let scalar = out.scalar().unwrap_or(Scalar::Float);
    if out.length() == 1 {
        return ctx.build(nodes[0], Some(out));
    }
    let mut parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        let ty = ctx.node_type(*node)?.with_scalar(scalar);
        parts.push(ctx.build(*node, Some(ty))?);
    }
    Ok(format!("{}({})", wgsl_type(out), parts.join(", ")))
}

pub fn element_type(ctx: &mut BuildContext<'_>, node: NodeId) -> Result<ShaderType> {
    let ty = ctx.node_type(node)?;
    ty.element()
        .ok_or_else(|| CompileError::type_resolution(format!("{ty} cannot be indexed")))
}

/// Compile an Element node to an index expression.
///
/// # Example
/// ```wgsl
/// weights[i]
/// ```
pub fn compile_element(ctx: &mut BuildContext<'_>, node: NodeId, index: NodeId) -> Result<String> {
    let index_ty = ctx.node_type(index)?;
    let index_ty = match index_ty {
        ShaderType::Scalar(Scalar::Int | Scalar::Uint) => index_ty,
        ShaderType::Scalar(Scalar::Bool) => ShaderType::INT,
        other => {
            return Err(CompileError::type_resolution(format!(
                "index must be an integer, got {other}"
            )));
        }
    };
    let base = ctx.build(node, None)?;
    let idx = ctx.build(index, Some(index_ty))?;
    Ok(format!("{}[{idx}]", wrap(&base)))
}

pub fn member_type(ctx: &mut BuildContext<'_>, node: NodeId, member: &str) -> Result<ShaderType> {
    let ty = ctx.node_type(node)?;
    match ty {
        ShaderType::Struct(_) => ctx
            .struct_decl(ty)
            .and_then(|decl| decl.member(member))
            .map(|m| m.ty)
            .ok_or_else(|| {
                CompileError::type_resolution(format!("{ty} has no member '{member}'"))
            }),
        _ if ty.is_vector_like() => Ok(resolve_swizzle(ty, member)?.ty),
        _ => Err(CompileError::type_resolution(format!(
            "{ty} has no members"
        ))),
    }
}

/// Compile a Member node: a struct field read, or a swizzle on vectors.
pub fn compile_member(ctx: &mut BuildContext<'_>, node: NodeId, member: &str) -> Result<String> {
    let ty = ctx.node_type(node)?;
    if ty.is_vector_like() {
        return compile_split(ctx, node, member);
    }
    let base = ctx.build(node, None)?;
    Ok(format!("{}.{member}", wrap(&base)))
}
