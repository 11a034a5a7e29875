//! Compiler for Texture nodes.

use crate::compiler::context::{BuildContext, ShaderStage};
use crate::compiler::types::ShaderType;
use crate::error::Result;
use crate::graph::NodeId;

/// Compile a Texture node.
///
/// Registers the texture/sampler pair, samples it at `uv` (the `uv`
/// attribute when unconnected) and stores the sample in a variable so each
/// texture read happens once.
///
/// # Inputs
/// - `uv`: sample coordinate, converted to `vec2`
/// - `level`: explicit mip level; forces `textureSampleLevel`
///
/// # Output
/// - Type: vec4
///
/// # Example
/// ```wgsl
/// nodeSample0 = textureSample(t_map, s_map, in.v_uv);
/// ```
pub fn compile_texture(
    ctx: &mut BuildContext<'_>,
    name: &str,
    uv: Option<NodeId>,
    level: Option<NodeId>,
) -> Result<String> {
    let (texture, sampler) = ctx.register_texture(name);
    let uv = match uv {
        Some(uv) => ctx.build(uv, Some(ShaderType::VEC2))?,
        None => ctx.attribute_read("uv", ShaderType::VEC2)?,
    };
    let sample = match (ctx.stage(), level) {
        (ShaderStage::Fragment, None) => format!("textureSample({texture}, {sampler}, {uv})"),
        (_, level) => {
            // implicit derivatives only exist in fragment stages
            let level = match level {
                Some(level) => ctx.build(level, Some(ShaderType::FLOAT))?,
                None => "0.0".to_string(),
            };
            format!("textureSampleLevel({texture}, {sampler}, {uv}, {level})")
        }
    };
    let var = ctx.declare_var(ShaderType::VEC4, "nodeSample")?;
    ctx.add_line(&format!("{var} = {sample};"));
    Ok(var)
}
