//! Compilers for control-flow nodes (Stack, Conditional, Loop, LoopIndex,
//! Break, Continue, Discard).

use crate::compiler::context::{BuildContext, ShaderStage};
use crate::compiler::types::{Scalar, ShaderType, wider};
use crate::compiler::utils::{fmt_literal, one_literal, wgsl_type, zero_literal};
use crate::error::{CompileError, Result};
use crate::graph::{Literal, LoopRange, NodeId, NodeKind};

/// Compile a Stack node: every entry in order as a statement, then the
/// optional output value.
pub fn compile_stack(ctx: &mut BuildContext<'_>, nodes: &[NodeId], output: Option<NodeId>) -> Result<String> {
    for node in nodes {
        ctx.build_statement(*node)?;
    }
    match output {
        Some(output) => ctx.build(output, None),
        None => Ok(String::new()),
    }
}

fn zero_value(ty: ShaderType) -> Result<String> {
    Ok(fmt_literal(&Literal::splat(ty, 0.0)?))
}

/// Build one branch into the open block, storing its value in `result`.
fn emit_branch(ctx: &mut BuildContext<'_>, branch: NodeId, result: Option<&str>, ty: ShaderType) -> Result<()> {
    match result {
        Some(var) if ctx.node_type(branch)? != ShaderType::Void => {
            let value = ctx.build(branch, Some(ty))?;
            ctx.add_line(&format!("{var} = {value};"));
        }
        _ => ctx.build_statement(branch)?,
    }
    Ok(())
}

/// Whether `code` (at `level`) is exactly one `if` chain, so that it can
/// follow an `else` directly.
fn is_single_if(code: &str, unit: &str, level: usize) -> bool {
    let indent = unit.repeat(level);
    let deeper = unit.repeat(level + 1);
    let mut lines = code.lines().filter(|l| !l.starts_with(&deeper));
    let Some(first) = lines.next() else {
        return false;
    };
    if !first.starts_with(&format!("{indent}if (")) {
        return false;
    }
    let rest: Vec<&str> = lines.collect();
    match rest.split_last() {
        Some((last, middle)) => {
            *last == format!("{indent}}}")
                && middle
                    .iter()
                    .all(|l| l.starts_with(&format!("{indent}}} else")))
        }
        None => false,
    }
}

/// Compile a Conditional node.
///
/// Pure value branches become a `select`; branches that emit statements
/// (or produce no value) become an `if` block whose value, if any, lands in a
/// `nodeCond` variable. Nested conditionals in the else branch collapse into
/// `else if`.
///
/// # Example
/// ```wgsl
/// select(0.0, 1.0, (x < 0.5))
///
/// if ((x < 0.5)) {
///     discard;
/// } else if ((x < 0.75)) {
///     nodeCond0 = 1.0;
/// }
/// ```
pub fn compile_conditional(
    ctx: &mut BuildContext<'_>,
    id: NodeId,
    cond: NodeId,
    if_true: NodeId,
    if_false: Option<NodeId>,
) -> Result<String> {
    let ty = ctx.inferred_type(id)?;
    let mut block_form = ty == ShaderType::Void || !ty.is_vector_like() || ctx.contains_statement(if_true)?;
    if let Some(f) = if_false {
        block_form |= ctx.contains_statement(f)?;
    }
    let condition = ctx.build(cond, Some(ShaderType::BOOL))?;

    if !block_form {
        let t = ctx.build(if_true, Some(ty))?;
        let f = match if_false {
            Some(f) => ctx.build(f, Some(ty))?,
            None => zero_value(ty)?,
        };
        return Ok(format!("select({f}, {t}, {condition})"));
    }

    let result = if ty == ShaderType::Void {
        None
    } else {
        Some(ctx.declare_var(ty, "nodeCond")?)
    };
    let level = ctx.tab();
    ctx.add_line(&format!("if ({condition}) {{"));
    ctx.push_block();
    let then = emit_branch(ctx, if_true, result.as_deref(), ty);
    let then_code = ctx.pop_block();
    then?;
    ctx.add_code(&then_code);

    if let Some(f) = if_false {
        ctx.push_block();
        let otherwise = emit_branch(ctx, f, result.as_deref(), ty);
        let else_code = ctx.pop_block();
        otherwise?;
        let unit = ctx.options().indent.clone();
        if !unit.is_empty() && is_single_if(&else_code, &unit, level + 1) {
            let mut lines = else_code.lines().map(|l| l.strip_prefix(unit.as_str()).unwrap_or(l));
            let head = lines.next().unwrap_or_default().trim_start();
            ctx.add_line(&format!("}} else {head}"));
            for line in lines {
                ctx.add_code(line);
                ctx.add_code("\n");
            }
            return Ok(result.unwrap_or_default());
        }
        ctx.add_line("} else {");
        ctx.add_code(&else_code);
    }
    ctx.add_line("}");
    Ok(result.unwrap_or_default())
}

/// Index type of a loop: integer unless a bound is unsigned or floating.
fn range_type(ctx: &mut BuildContext<'_>, range: &LoopRange) -> Result<ShaderType> {
    let ty = match range {
        LoopRange::Count(end) => match ctx.node_type(*end)? {
            ShaderType::Scalar(Scalar::Uint) => ShaderType::UINT,
            ShaderType::Scalar(Scalar::Float) => ShaderType::FLOAT,
            _ => ShaderType::INT,
        },
        LoopRange::Range { start, end, .. } => {
            let s = ctx.node_type(*start)?;
            let e = ctx.node_type(*end)?;
            wider(s, e)
        }
    };
    match ty {
        ShaderType::Scalar(Scalar::Int | Scalar::Uint | Scalar::Float) => Ok(ty),
        other => Err(CompileError::type_resolution(format!(
            "loop bounds must be numeric scalars, got {other}"
        ))),
    }
}

pub fn loop_index_type(ctx: &mut BuildContext<'_>, loop_node: NodeId) -> Result<ShaderType> {
    match &ctx.graph().node(loop_node).kind {
        NodeKind::Loop { range, .. } => range_type(ctx, range),
        other => Err(CompileError::type_resolution(format!(
            "loop index refers to a {} node",
            other.tag()
        ))),
    }
}

/// Compile a Loop node to a `for` statement.
///
/// # Example
/// ```wgsl
/// for (var i: i32 = 0i; i < 4i; i = i + 1i) {
///     acc = (acc + f32(i));
/// }
/// ```
pub fn compile_loop(ctx: &mut BuildContext<'_>, id: NodeId, range: &LoopRange, body: NodeId) -> Result<String> {
    let ty = range_type(ctx, range)?;
    let scalar = ty.scalar().unwrap_or(Scalar::Int);
    let (start, end, symbol, step, counts_up) = match range {
        LoopRange::Count(end) => (
            zero_literal(scalar),
            ctx.build(*end, Some(ty))?,
            "<",
            one_literal(scalar),
            true,
        ),
        LoopRange::Range {
            start,
            end,
            condition,
            step,
        } => {
            let start = ctx.build(*start, Some(ty))?;
            let end = ctx.build(*end, Some(ty))?;
            let (step, counts_up) = match step {
                Some(step) => (ctx.build(*step, Some(ty))?, true),
                None => (one_literal(scalar), condition.counts_up()),
            };
            (start, end, condition.symbol(), step, counts_up)
        }
    };
    let op = if counts_up { "+" } else { "-" };

    let name = ctx.enter_loop(id, ty);
    ctx.add_line(&format!(
        "for (var {name}: {} = {start}; {name} {symbol} {end}; {name} = {name} {op} {step}) {{",
        wgsl_type(ty)
    ));
    ctx.push_block();
    let built = ctx.build_statement(body);
    let code = ctx.pop_block();
    ctx.exit_loop(id);
    built?;
    ctx.add_code(&code);
    ctx.add_line("}");
    Ok(String::new())
}

pub fn compile_loop_index(ctx: &mut BuildContext<'_>, loop_node: NodeId) -> Result<String> {
    ctx.loop_var(loop_node)
        .map(|(name, _)| name.clone())
        .ok_or_else(|| CompileError::type_resolution("loop index used outside of its loop"))
}

/// `break` / `continue`; only valid inside a loop body.
pub fn compile_jump(ctx: &mut BuildContext<'_>, keyword: &str) -> Result<String> {
    if !ctx.in_loop() {
        return Err(CompileError::unsupported(format!("{keyword} outside of a loop")));
    }
    ctx.add_line(&format!("{keyword};"));
    Ok(String::new())
}

pub fn compile_discard(ctx: &mut BuildContext<'_>) -> Result<String> {
    if ctx.stage() != ShaderStage::Fragment {
        return Err(CompileError::unsupported(format!(
            "discard in a {} stage",
            ctx.stage().name()
        )));
    }
    ctx.add_line("discard;");
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::node_compiler::test_utils::{compile_fragment, fragment_text};
    use crate::graph::{LoopCondition, NodeGraph, UniformGroup};

    #[test]
    fn value_branches_use_select() {
        let mut g = NodeGraph::new();
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let half = g.float(0.5);
        let c = g.less(x, half);
        let one = g.float(1.0);
        let pick = g.conditional(c, one, None);
        let out = g.convert(pick, ShaderType::VEC4);
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(text.contains("select(0.0, 1.0, (u_x < 0.5))"), "{text}");
    }

    #[test]
    fn discard_branch_becomes_if() {
        let mut g = NodeGraph::new();
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let half = g.float(0.5);
        let c = g.less(x, half);
        let kill = g.discard();
        let branch = g.conditional(c, kill, None);
        let color = g.vec4(1.0, 0.0, 0.0, 1.0);
        let out = g.stack(&[branch], Some(color));
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(
            text.contains("    if ((u_x < 0.5)) {\n        discard;\n    }\n"),
            "{text}"
        );
    }

    #[test]
    fn else_if_chains_collapse() {
        let mut g = NodeGraph::new();
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let a = g.float(0.25);
        let b = g.float(0.75);
        let c1 = g.less(x, a);
        let c2 = g.less(x, b);
        let color = g.property("color", ShaderType::VEC4);
        let red = g.vec4(1.0, 0.0, 0.0, 1.0);
        let green = g.vec4(0.0, 1.0, 0.0, 1.0);
        let w1 = g.assign(color, red);
        let w2 = g.assign(color, green);
        let kill = g.discard();
        let chain = g.if_(c1, w1).elseif(c2, w2).else_(kill);
        let out = g.stack(&[chain], Some(color));
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(text.contains("} else if ((u_x < 0.75)) {"), "{text}");
        assert!(text.contains("    } else {\n        discard;\n    }\n"), "{text}");
        assert_eq!(text.matches("if (").count(), 2, "{text}");
    }

    #[test]
    fn counted_loop() {
        let mut g = NodeGraph::new();
        let acc = g.property("acc", ShaderType::FLOAT);
        let n = g.int(4);
        let looped = g.loop_count(n, |g, i| {
            let fi = g.convert(i, ShaderType::FLOAT);
            let next = g.add(acc, fi);
            g.assign(acc, next)
        });
        let out_value = g.convert(acc, ShaderType::VEC4);
        let out = g.stack(&[looped], Some(out_value));
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(
            text.contains("for (var i: i32 = 0i; i < 4i; i = i + 1i) {\n        acc = (acc + f32(i));\n    }"),
            "{text}"
        );
    }

    #[test]
    fn float_count_keeps_a_float_index() {
        let mut g = NodeGraph::new();
        let acc = g.property("acc", ShaderType::FLOAT);
        let n = g.float(3.0);
        let looped = g.loop_count(n, |g, i| {
            let next = g.add(acc, i);
            g.assign(acc, next)
        });
        let out_value = g.convert(acc, ShaderType::VEC4);
        let out = g.stack(&[looped], Some(out_value));
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(text.contains("for (var i: f32 = 0.0; i < 3.0; i = i + 1.0) {"), "{text}");
    }

    #[test]
    fn conditions_must_be_boolean() {
        let mut g = NodeGraph::new();
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let one = g.float(1.0);
        let pick = g.conditional(x, one, None);
        let out = g.convert(pick, ShaderType::VEC4);
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
    }

    #[test]
    fn counting_down() {
        let mut g = NodeGraph::new();
        let start = g.int(8);
        let end = g.int(0);
        let looped = g.loop_between(start, end, LoopCondition::Greater, None, |g, _| g.break_());
        let color = g.vec4(1.0, 1.0, 1.0, 1.0);
        let out = g.stack(&[looped], Some(color));
        let text = fragment_text(&compile_fragment(&mut g, out).unwrap());
        assert!(text.contains("for (var i: i32 = 8i; i > 0i; i = i - 1i) {"), "{text}");
        assert!(text.contains("break;"), "{text}");
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let mut g = NodeGraph::new();
        let stop = g.break_();
        let color = g.vec4(1.0, 1.0, 1.0, 1.0);
        let out = g.stack(&[stop], Some(color));
        let err = compile_fragment(&mut g, out).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedFeature { .. }));
    }

    #[test]
    fn single_if_detection() {
        let code = "        if (a) {\n            x = 1.0;\n        } else {\n            x = 2.0;\n        }\n";
        assert!(is_single_if(code, "    ", 2));
        let two = format!("{code}        y = 3.0;\n");
        assert!(!is_single_if(&two, "    ", 2));
    }
}
