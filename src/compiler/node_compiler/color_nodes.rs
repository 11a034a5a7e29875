//! Compilers for color output nodes (ToneMap, ColorSpace).

use crate::compiler::context::BuildContext;
use crate::compiler::node_compiler::input_nodes::is_identifier;
use crate::compiler::types::ShaderType;
use crate::error::{CompileError, Result};
use crate::graph::{ColorSpace, NodeId, ToneMapping};

/// Evaluate `color` once into a variable so formulas can repeat it. An
/// alpha channel the formula has no use for is dropped.
fn hoisted(ctx: &mut BuildContext<'_>, color: NodeId, ty: ShaderType) -> Result<String> {
    let value = ctx.build_coerced(color, ty)?;
    if is_identifier(&value) {
        return Ok(value);
    }
    let var = ctx.declare_var(ty, "nodeVar")?;
    ctx.add_line(&format!("{var} = {value};"));
    Ok(var)
}

/// Compile a ToneMap node. The result is always `vec3`.
///
/// # Example
/// ```wgsl
/// nodeTone0 = (nodeVar0 * u_exposure);
/// saturate(nodeTone0 / (vec3f(1.0) + nodeTone0))
/// ```
pub fn compile_tone_map(
    ctx: &mut BuildContext<'_>,
    mapping: ToneMapping,
    color: NodeId,
    exposure: Option<NodeId>,
) -> Result<String> {
    let c = hoisted(ctx, color, ShaderType::VEC3)?;
    let exposure = match exposure {
        Some(e) => Some(ctx.build(e, Some(ShaderType::FLOAT))?),
        None => None,
    };
    let exposed = match &exposure {
        Some(e) => format!("({c} * {e})"),
        None => c.clone(),
    };
    match mapping {
        ToneMapping::None => Ok(c),
        ToneMapping::Linear => Ok(exposed),
        ToneMapping::Reinhard => {
            let x = exposed_var(ctx, exposed)?;
            Ok(format!("saturate({x} / (vec3f(1.0) + {x}))"))
        }
        ToneMapping::Aces => {
            // Narkowicz 2015 fit of the ACES filmic curve
            let x = exposed_var(ctx, exposed)?;
            Ok(format!(
                "saturate(({x} * (2.51 * {x} + vec3f(0.03))) / ({x} * (2.43 * {x} + vec3f(0.59)) + vec3f(0.14)))"
            ))
        }
    }
}

fn exposed_var(ctx: &mut BuildContext<'_>, exposed: String) -> Result<String> {
    if is_identifier(&exposed) {
        return Ok(exposed);
    }
    let var = ctx.declare_var(ShaderType::VEC3, "nodeTone")?;
    ctx.add_line(&format!("{var} = {exposed};"));
    Ok(var)
}

pub fn color_space_type(ctx: &mut BuildContext<'_>, color: NodeId) -> Result<ShaderType> {
    match ctx.node_type(color)? {
        ShaderType::VEC4 => Ok(ShaderType::VEC4),
        ty if ty.is_vector_like() => Ok(ShaderType::VEC3),
        ty => Err(CompileError::type_resolution(format!(
            "color space conversion needs a color, got {ty}"
        ))),
    }
}

/// Compile a ColorSpace node. Alpha passes through untouched.
///
/// # Example
/// ```wgsl
/// select(1.055 * pow(c, vec3f(1.0 / 2.4)) - vec3f(0.055), c * 12.92, c <= vec3f(0.0031308))
/// ```
pub fn compile_color_space(ctx: &mut BuildContext<'_>, from: ColorSpace, to: ColorSpace, color: NodeId) -> Result<String> {
    let ty = color_space_type(ctx, color)?;
    if from == to {
        return ctx.build(color, Some(ty));
    }
    let c = hoisted(ctx, color, ty)?;
    let rgb = if ty == ShaderType::VEC4 {
        format!("{c}.xyz")
    } else {
        c.clone()
    };
    let converted = match to {
        ColorSpace::Srgb => format!(
            "select(1.055 * pow({rgb}, vec3f(1.0 / 2.4)) - vec3f(0.055), {rgb} * 12.92, {rgb} <= vec3f(0.0031308))"
        ),
        ColorSpace::Linear => format!(
            "select(pow(({rgb} + vec3f(0.055)) / 1.055, vec3f(2.4)), {rgb} / 12.92, {rgb} <= vec3f(0.04045))"
        ),
    };
    Ok(if ty == ShaderType::VEC4 {
        format!("vec4f({converted}, {c}.w)")
    } else {
        converted
    })
}
