//! Compilers for user functions (Call; Function, Parameter and Overload are
//! resolved through the call).

use crate::compiler::context::BuildContext;
use crate::compiler::types::ShaderType;
use crate::error::{CompileError, Result};
use crate::graph::{NodeId, NodeKind};

pub fn function_body(ctx: &BuildContext<'_>, function: NodeId) -> Result<NodeId> {
    match &ctx.graph().node(function).kind {
        NodeKind::Function { body, .. } => Ok(*body),
        other => Err(CompileError::type_resolution(format!(
            "expected a function, found a {} node",
            other.tag()
        ))),
    }
}

/// Return type of a call: the declared one, otherwise the body's type under
/// the call's signature.
pub fn call_type(ctx: &mut BuildContext<'_>, call: NodeId) -> Result<ShaderType> {
    let (function, signature) = ctx.call_target(call)?;
    if let NodeKind::Function {
        return_ty: Some(ty),
        ..
    } = &ctx.graph().node(function).kind
    {
        return Ok(*ty);
    }
    let body = function_body(ctx, function)?;
    ctx.with_signature(signature, |ctx| ctx.node_type(body))
}

/// Compile a Call node. The target function is generated once per stage and
/// concrete signature; recursion is reported as a cycle.
///
/// # Example
/// ```wgsl
/// luminance(color)
/// ```
pub fn compile_call(ctx: &mut BuildContext<'_>, call: NodeId, args: &[NodeId]) -> Result<String> {
    let (function, signature) = ctx.call_target(call)?;
    let types = ctx
        .signature(signature)
        .map(|(_, types)| types.clone())
        .unwrap_or_default();
    let mut built = Vec::with_capacity(args.len());
    for (arg, ty) in args.iter().zip(types) {
        built.push(ctx.build(*arg, Some(ty))?);
    }
    let name = ctx.build_function(function, signature)?;
    Ok(format!("{name}({})", built.join(", ")))
}

#[cfg(test)]
mod tests {
    use crate::compiler::node_compiler::test_utils::{compile_fragment, fragment_text};
    use crate::compiler::types::ShaderType;
    use crate::error::CompileError;
    use crate::graph::{MathFn, NodeGraph, UniformGroup};

    #[test]
    fn function_is_emitted_once() {
        let mut g = NodeGraph::new();
        let weights = g.vec3(0.2126, 0.7152, 0.0722);
        let luminance = g.function("luminance", &[("c", Some(ShaderType::VEC3))], Some(ShaderType::FLOAT), |g, p| {
            g.dot(p[0], weights)
        });
        let a = g.uniform("a", ShaderType::VEC3, UniformGroup::Object);
        let b = g.uniform("b", ShaderType::VEC3, UniformGroup::Object);
        let la = g.call(luminance, &[a]);
        let lb = g.call(luminance, &[b]);
        let sum = g.add(la, lb);
        let out = g.convert(sum, ShaderType::VEC4);
        let program = compile_fragment(&mut g, out).unwrap();
        assert_eq!(program.functions.len(), 1);
        assert!(program.functions[0].code.contains("fn luminance(c: vec3f) -> f32 {"));
        assert!(program.functions[0].code.contains("return dot(c, vec3f(0.2126, 0.7152, 0.0722));"));
        let text = fragment_text(&program);
        assert!(text.contains("(luminance(u_a) + luminance(u_b))"), "{text}");
    }

    #[test]
    fn untyped_parameters_specialize_per_signature() {
        let mut g = NodeGraph::new();
        let double = g.function("double", &[("x", None)], None, |g, p| {
            let two = g.float(2.0);
            g.mul(p[0], two)
        });
        let s = g.float(1.0);
        let v = g.vec3(1.0, 2.0, 3.0);
        let ds = g.call(double, &[s]);
        let dv = g.call(double, &[v]);
        let sum = g.add(dv, ds);
        let out = g.convert(sum, ShaderType::VEC4);
        let program = compile_fragment(&mut g, out).unwrap();
        let names: Vec<&str> = program.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names.len(), 2, "{names:?}");
        assert!(program.functions.iter().any(|f| f.code.contains("(x: f32) -> f32")));
        assert!(program.functions.iter().any(|f| f.code.contains("(x: vec3f) -> vec3f")));
    }

    #[test]
    fn overloads_pick_the_best_match() {
        let mut g = NodeGraph::new();
        let f_float = g.function("scale_f", &[("x", Some(ShaderType::FLOAT))], None, |_, p| p[0]);
        let f_vec = g.function("scale_v", &[("x", Some(ShaderType::VEC3))], None, |g, p| {
            g.normalize(p[0])
        });
        let ov = g.overload(&[f_float, f_vec]);
        let v = g.vec3(1.0, 0.0, 0.0);
        let call = g.call(ov, &[v]);
        let out = g.convert(call, ShaderType::VEC4);
        let program = compile_fragment(&mut g, out).unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "scale_v");

        let a = g.float(1.0);
        let b = g.float(2.0);
        let bad = g.call(ov, &[a, b]);
        let out = g.convert(bad, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::OverloadResolution { arity: 2, candidates: 2, .. }));
    }

    #[test]
    fn arguments_do_not_narrow_to_parameters() {
        let mut g = NodeGraph::new();
        let f = g.function("halve", &[("x", Some(ShaderType::FLOAT))], Some(ShaderType::FLOAT), |g, p| {
            let half = g.float(0.5);
            g.mul(p[0], half)
        });
        let v = g.uniform("dir", ShaderType::VEC3, UniformGroup::Object);
        let call = g.call(f, &[v]);
        let out = g.convert(call, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
        assert!(err.to_string().contains("vec3 to float"), "{err}");
    }

    #[test]
    fn recursion_is_a_cycle() {
        let mut g = NodeGraph::new();
        let f = g.function("forever", &[("x", Some(ShaderType::FLOAT))], Some(ShaderType::FLOAT), |g, p| p[0]);
        let param = crate::graph::NodeId(f.0 + 1);
        let recurse = g.call(f, &[param]);
        g.set_input(f, "body", recurse).unwrap();
        let one = g.float(1.0);
        let call = g.call(f, &[one]);
        let out = g.math(MathFn::Abs, &[call]);
        let out = g.convert(out, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::Cycle { .. }), "{err}");
    }
}
