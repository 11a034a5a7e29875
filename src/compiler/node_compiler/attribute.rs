//! Compilers for per-vertex inputs (Attribute) and stage-crossing values
//! (Varying).

use crate::compiler::context::{BuildContext, ShaderStage};
use crate::compiler::types::ShaderType;
use crate::error::{CompileError, Result};
use crate::graph::NodeId;

/// Compile an Attribute node.
///
/// Vertex stages read the vertex input directly; fragment stages read the
/// varying registered for the attribute during setup.
///
/// # Example
/// ```wgsl
/// vin.uv      // vertex
/// in.v_uv     // fragment
/// ```
pub fn compile_attribute(ctx: &mut BuildContext<'_>, name: &str, ty: ShaderType) -> Result<String> {
    ctx.attribute_read(name, ty)
}

/// Compile a Varying node. In the vertex stage the source is evaluated in
/// place; in the fragment stage the interpolated value is read back.
pub fn compile_varying(ctx: &mut BuildContext<'_>, id: NodeId, source: NodeId) -> Result<String> {
    match ctx.stage() {
        ShaderStage::Vertex => ctx.build(source, None),
        ShaderStage::Fragment => {
            let ty = ctx.node_type(id)?;
            ctx.node_varying_read(id, ty)
        }
        ShaderStage::Compute => Err(CompileError::unsupported(
            "varyings are not available in compute stages",
        )),
    }
}
