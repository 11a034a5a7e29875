//! Compilers for arithmetic nodes (Operator, Unary, Math).

use crate::compiler::context::BuildContext;
use crate::compiler::types::{
    BinaryOp, Scalar, ShaderType, binary_result_type, common_type, wider,
};
use crate::compiler::utils::wrap_operand;
use crate::compiler::wgsl::Intrinsic;
use crate::error::{CompileError, Result};
use crate::graph::{MathFn, NodeId, UnaryOp};

pub fn operator_type(ctx: &mut BuildContext<'_>, op: BinaryOp, a: NodeId, b: NodeId) -> Result<ShaderType> {
    let ta = ctx.node_type(a)?;
    let tb = ctx.node_type(b)?;
    binary_result_type(op, ta, tb)
}

/// Types each operand is formatted to before the operator is applied.
fn operand_types(op: BinaryOp, ta: ShaderType, tb: ShaderType, out: ShaderType) -> Result<(ShaderType, ShaderType)> {
    if op.is_comparison() {
        let common = common_type(ta, tb)?;
        return Ok((common, common));
    }
    if op.is_logical() {
        return Ok((out, out));
    }
    if op.is_shift() {
        return Ok((out, out.with_scalar(Scalar::Uint)));
    }
    if op.is_bitwise() {
        return Ok((out, out));
    }
    let float = |t: ShaderType| t.with_scalar(Scalar::Float);
    Ok(match (ta, tb) {
        (ShaderType::Matrix(_), ShaderType::Vector(..)) => (ta, float(tb)),
        (ShaderType::Vector(..), ShaderType::Matrix(_)) => (float(ta), tb),
        (ShaderType::Scalar(_), ShaderType::Matrix(_)) => (ShaderType::FLOAT, tb),
        (ShaderType::Matrix(_), ShaderType::Scalar(_)) => (ta, ShaderType::FLOAT),
        (ShaderType::Matrix(_), ShaderType::Matrix(_)) => (out, out),
        // WGSL applies a scalar to every component; no splat needed
        (ShaderType::Scalar(_), ShaderType::Vector(..)) => (ta.with_scalar(scalar_of(out)), out),
        (ShaderType::Vector(..), ShaderType::Scalar(_)) => (out, tb.with_scalar(scalar_of(out))),
        _ => (out, out),
    })
}

fn scalar_of(ty: ShaderType) -> Scalar {
    ty.scalar().unwrap_or(Scalar::Float)
}

/// Compile an Operator node.
///
/// # Example
/// ```wgsl
/// (a + b)
/// (v * 2.0)
/// ```
pub fn compile_operator(
    ctx: &mut BuildContext<'_>,
    id: NodeId,
    op: BinaryOp,
    a: NodeId,
    b: NodeId,
) -> Result<String> {
    let ta = ctx.node_type(a)?;
    let tb = ctx.node_type(b)?;
    let out = ctx.inferred_type(id)?;
    let (ea, eb) = operand_types(op, ta, tb, out)?;
    let sa = ctx.build(a, Some(ea))?;
    // shift counts are always unsigned
    let sb = if op.is_shift() {
        ctx.build_coerced(b, eb)?
    } else {
        ctx.build(b, Some(eb))?
    };
    let vector = out.length() > 1;
    let symbol = match op {
        BinaryOp::And if vector => "&",
        BinaryOp::Or if vector => "|",
        BinaryOp::Xor => "!=",
        _ => op.symbol(),
    };
    Ok(format!("({} {symbol} {})", wrap_operand(&sa), wrap_operand(&sb)))
}

pub fn unary_type(ctx: &mut BuildContext<'_>, op: UnaryOp, a: NodeId) -> Result<ShaderType> {
    let ty = ctx.node_type(a)?;
    match op {
        UnaryOp::Negate => match ty.scalar() {
            Some(Scalar::Bool) | None => Err(CompileError::type_resolution(format!(
                "cannot negate {ty}"
            ))),
            Some(Scalar::Uint) => Ok(ty.with_scalar(Scalar::Int)),
            Some(_) => Ok(ty),
        },
        UnaryOp::Not if ty.is_vector_like() => Ok(ty.with_scalar(Scalar::Bool)),
        UnaryOp::BitNot if ty.is_vector_like() && ty.scalar().is_some_and(Scalar::is_integer) => {
            Ok(ty)
        }
        _ => Err(CompileError::type_resolution(format!(
            "operator {op:?} is not defined for {ty}"
        ))),
    }
}

/// Compile a Unary node.
///
/// # Example
/// ```wgsl
/// (-x)
/// (!flag)
/// ```
pub fn compile_unary(ctx: &mut BuildContext<'_>, id: NodeId, op: UnaryOp, a: NodeId) -> Result<String> {
    let out = ctx.inferred_type(id)?;
    let value = ctx.build_coerced(a, out)?;
    let symbol = match op {
        UnaryOp::Negate => "-",
        UnaryOp::Not => "!",
        UnaryOp::BitNot => "~",
    };
    Ok(format!("({symbol}{})", wrap_operand(&value)))
}

fn widest(types: &[ShaderType]) -> ShaderType {
    types.iter().copied().fold(ShaderType::Void, wider)
}

fn require_vector_like(method: MathFn, types: &[ShaderType]) -> Result<()> {
    match types.iter().find(|t| !t.is_vector_like()) {
        Some(t) => Err(CompileError::type_resolution(format!(
            "{} is not defined for {t}",
            method.name()
        ))),
        None => Ok(()),
    }
}

pub fn math_type(ctx: &mut BuildContext<'_>, method: MathFn, args: &[NodeId]) -> Result<ShaderType> {
    let (min, max) = method.arity();
    if args.len() < min || max.is_some_and(|m| args.len() > m) {
        return Err(CompileError::type_resolution(format!(
            "{} takes {min}{} argument(s), got {}",
            method.name(),
            match max {
                Some(m) if m == min => String::new(),
                Some(m) => format!("..{m}"),
                None => " or more".to_string(),
            },
            args.len()
        )));
    }
    let mut types = Vec::with_capacity(args.len());
    for arg in args {
        let ty = ctx.node_type(*arg)?;
        if !ty.is_numeric() || ty.scalar() == Some(Scalar::Bool) {
            return Err(CompileError::type_resolution(format!(
                "{} is not defined for {ty}",
                method.name()
            )));
        }
        types.push(ty);
    }

    use MathFn::*;
    match method {
        Transpose | Inverse | Determinant => {
            if !types[0].is_matrix() {
                return Err(CompileError::type_resolution(format!(
                    "{} needs a matrix, got {}",
                    method.name(),
                    types[0]
                )));
            }
            Ok(if method == Determinant {
                ShaderType::FLOAT
            } else {
                types[0]
            })
        }
        Negate if types[0].is_matrix() => Ok(types[0]),
        _ => {
            require_vector_like(method, &types)?;
            Ok(match method {
                Length | LengthSq | Distance | Dot => ShaderType::FLOAT,
                Cross => ShaderType::VEC3,
                Abs | Sign | Negate | Min | Max | Clamp | Mod => widest(&types),
                Mix | Refract => widest(&types[..2]).with_scalar(Scalar::Float),
                Step | Smoothstep | Pow | Atan2 | Reflect | FaceForward => {
                    widest(&types).with_scalar(Scalar::Float)
                }
                _ => types[0].with_scalar(Scalar::Float),
            })
        }
    }
}

/// Compile a Math node through the backend's intrinsic table.
///
/// # Example
/// ```wgsl
/// normalize(v)
/// clamp(x, 0.0, 1.0)
/// max(max(a, b), c)
/// ```
pub fn compile_math(ctx: &mut BuildContext<'_>, id: NodeId, method: MathFn, args: &[NodeId]) -> Result<String> {
    let out = ctx.inferred_type(id)?;
    let mut types = Vec::with_capacity(args.len());
    for arg in args {
        types.push(ctx.node_type(*arg)?);
    }

    use MathFn::*;
    let operands: Vec<ShaderType> = match method {
        Length | LengthSq | Normalize => vec![types[0].with_scalar(Scalar::Float)],
        Distance | Dot => {
            let common = widest(&types).with_scalar(Scalar::Float);
            vec![common, common]
        }
        Cross => vec![ShaderType::VEC3, ShaderType::VEC3],
        Transpose | Inverse | Determinant => types.clone(),
        Negate if out.is_matrix() => types.clone(),
        Mix => {
            let t = if types[2].length() == 1 {
                ShaderType::FLOAT
            } else {
                out
            };
            vec![out, out, t]
        }
        Refract => vec![out, out, ShaderType::FLOAT],
        _ => vec![out; args.len()],
    };

    let mut built = Vec::with_capacity(args.len());
    for (arg, ty) in args.iter().zip(&operands) {
        built.push(ctx.build(*arg, Some(*ty))?);
    }

    let intrinsic = ctx.backend().intrinsic(method, operands[0], ctx.stage())?;
    Ok(match intrinsic {
        Intrinsic::Call(name) if built.len() > 2 && matches!(method, Min | Max) => {
            let mut iter = built.iter();
            let first = iter.next().cloned().unwrap_or_default();
            iter.fold(first, |acc, x| format!("{name}({acc}, {x})"))
        }
        Intrinsic::Call(name) => format!("{name}({})", built.join(", ")),
        Intrinsic::Infix(symbol) => {
            let lhs = built.first().map(|s| wrap_operand(s)).unwrap_or_default();
            let rhs = built.get(1).map(|s| wrap_operand(s)).unwrap_or_default();
            format!("({lhs} {symbol} {rhs})")
        }
        Intrinsic::Template(template) => {
            let mut out = template.to_string();
            for (i, value) in built.iter().enumerate() {
                out = out.replace(&format!("{{{i}}}"), &wrap_operand(value));
            }
            out
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::compiler::node_compiler::test_utils::{compile_fragment, fragment_text};
    use crate::compiler::types::ShaderType;
    use crate::error::CompileError;
    use crate::graph::{MathFn, NodeGraph, UniformGroup};

    fn frag(g: &mut NodeGraph, value: crate::graph::NodeId) -> String {
        let out = g.convert(value, ShaderType::VEC4);
        fragment_text(&compile_fragment(g, out).unwrap())
    }

    #[test]
    fn scalars_apply_to_vectors_without_splat() {
        let mut g = NodeGraph::new();
        let v = g.uniform("tint", ShaderType::VEC3, UniformGroup::Object);
        let s = g.int(2);
        let m = g.mul(v, s);
        let text = frag(&mut g, m);
        assert!(text.contains("(u_tint * f32(2i))"), "{text}");
    }

    #[test]
    fn mixed_int_and_uint_operands_are_rejected() {
        let mut g = NodeGraph::new();
        let a = g.int(1);
        let b = g.uniform("count", ShaderType::UINT, UniformGroup::Object);
        let sum = g.add(a, b);
        let out = g.convert(sum, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
        assert!(err.to_string().contains("int to uint"), "{err}");
    }

    #[test]
    fn negating_a_uint_reads_it_as_signed() {
        let mut g = NodeGraph::new();
        let n = g.uniform("count", ShaderType::UINT, UniformGroup::Object);
        let neg = g.negate(n);
        let text = frag(&mut g, neg);
        assert!(text.contains("(-i32(u_count))"), "{text}");
    }

    #[test]
    fn float_mod_expands() {
        let mut g = NodeGraph::new();
        let a = g.uniform("a", ShaderType::FLOAT, UniformGroup::Object);
        let b = g.float(3.0);
        let m = g.math(MathFn::Mod, &[a, b]);
        let text = frag(&mut g, m);
        assert!(text.contains("(u_a - 3.0 * floor(u_a / 3.0))"), "{text}");
    }

    #[test]
    fn int_mod_uses_remainder() {
        let mut g = NodeGraph::new();
        let a = g.int(7);
        let b = g.int(3);
        let m = g.math(MathFn::Mod, &[a, b]);
        let text = frag(&mut g, m);
        assert!(text.contains("(7i % 3i)"), "{text}");
    }

    #[test]
    fn variadic_max_nests() {
        let mut g = NodeGraph::new();
        let a = g.float(1.0);
        let b = g.float(2.0);
        let c = g.float(3.0);
        let m = g.math(MathFn::Max, &[a, b, c]);
        let text = frag(&mut g, m);
        assert!(text.contains("max(max(1.0, 2.0), 3.0)"), "{text}");
    }

    #[test]
    fn scalar_dot_and_length_degrade() {
        let mut g = NodeGraph::new();
        let a = g.uniform("a", ShaderType::FLOAT, UniformGroup::Object);
        let d = g.dot(a, a);
        let l = g.length(d);
        let text = frag(&mut g, l);
        assert!(text.contains("abs((u_a * u_a))"), "{text}");
    }

    #[test]
    fn derivatives_need_a_fragment_stage() {
        let mut g = NodeGraph::new();
        let p = g.attribute("position", ShaderType::VEC3);
        let d = g.math(MathFn::Dfdx, &[p]);
        let pos = g.convert(d, ShaderType::VEC4);
        let color = g.vec4(1.0, 1.0, 1.0, 1.0);
        let backend = crate::compiler::wgsl::WgslBackend;
        let options = crate::options::CompilerOptions::default();
        let mut registry = crate::compiler::context::UniformRegistry::new();
        let err = crate::compiler::context::BuildContext::new(&g, &options, &backend, &mut registry)
            .compile(&crate::compiler::context::StageRoots::render(pos, color))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedFeature { .. }), "{err}");
    }

    #[test]
    fn wrong_arity_is_a_type_error() {
        let mut g = NodeGraph::new();
        let a = g.float(1.0);
        let m = g.math(MathFn::Clamp, &[a]);
        let out = g.convert(m, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }));
    }

    #[test]
    fn comparisons_yield_bools() {
        let mut g = NodeGraph::new();
        let a = g.float(1.0);
        let b = g.int(2);
        let lt = g.less(a, b);
        let one = g.float(1.0);
        let zero = g.float(0.0);
        let pick = g.conditional(lt, one, Some(zero));
        let text = frag(&mut g, pick);
        assert!(text.contains("(1.0 < f32(2i))"), "{text}");
    }
}
