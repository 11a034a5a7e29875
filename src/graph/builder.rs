//! Builder API: one method per node kind, each returning the new handle.

use crate::compiler::types::{BinaryOp, ShaderType};

use super::{
    Builtin, ColorSpace, Literal, LoopCondition, LoopRange, MathFn, NodeGraph, NodeId, NodeKind,
    Param, ToneMapping, UnaryOp, UniformGroup,
};

impl NodeGraph {
    pub fn constant(&mut self, value: Literal) -> NodeId {
        self.add_node(NodeKind::Constant(value))
    }

    pub fn float(&mut self, v: f32) -> NodeId {
        self.constant(Literal::float(v))
    }

    pub fn int(&mut self, v: i32) -> NodeId {
        self.constant(Literal::int(v))
    }

    pub fn uint(&mut self, v: u32) -> NodeId {
        self.constant(Literal::uint(v))
    }

    pub fn boolean(&mut self, v: bool) -> NodeId {
        self.constant(Literal::boolean(v))
    }

    pub fn vec2(&mut self, x: f32, y: f32) -> NodeId {
        self.constant(Literal::vec2(x, y))
    }

    pub fn vec3(&mut self, x: f32, y: f32, z: f32) -> NodeId {
        self.constant(Literal::vec3(x, y, z))
    }

    pub fn vec4(&mut self, x: f32, y: f32, z: f32, w: f32) -> NodeId {
        self.constant(Literal::vec4(x, y, z, w))
    }

    pub fn uniform(&mut self, name: &str, ty: ShaderType, group: UniformGroup) -> NodeId {
        self.add_node(NodeKind::Uniform {
            name: name.to_string(),
            ty,
            group,
        })
    }

    /// Frame-updated elapsed time.
    pub fn time(&mut self) -> NodeId {
        self.uniform("time", ShaderType::FLOAT, UniformGroup::Frame)
    }

    pub fn attribute(&mut self, name: &str, ty: ShaderType) -> NodeId {
        self.add_node(NodeKind::Attribute {
            name: name.to_string(),
            ty,
        })
    }

    pub fn varying(&mut self, node: NodeId, name: Option<&str>) -> NodeId {
        self.add_node(NodeKind::Varying {
            node,
            name: name.map(str::to_string),
        })
    }

    pub fn property(&mut self, name: &str, ty: ShaderType) -> NodeId {
        self.add_node(NodeKind::Property {
            name: name.to_string(),
            ty,
        })
    }

    pub fn var(&mut self, node: NodeId) -> NodeId {
        self.add_node(NodeKind::Var { node, name: None })
    }

    pub fn named_var(&mut self, node: NodeId, name: &str) -> NodeId {
        self.add_node(NodeKind::Var {
            node,
            name: Some(name.to_string()),
        })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.add_node(NodeKind::Assign { target, value })
    }

    pub fn op(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> NodeId {
        self.add_node(NodeKind::Operator { op, a, b })
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Div, a, b)
    }

    pub fn less(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Less, a, b)
    }

    pub fn less_equal(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::LessEqual, a, b)
    }

    pub fn greater(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Greater, a, b)
    }

    pub fn equal(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(BinaryOp::Equal, a, b)
    }

    /// Left fold of `op` over `nodes`; a single node is returned unchanged.
    pub fn fold(&mut self, op: BinaryOp, nodes: &[NodeId]) -> Option<NodeId> {
        let (first, rest) = nodes.split_first()?;
        Some(rest.iter().fold(*first, |acc, n| self.op(op, acc, *n)))
    }

    pub fn unary(&mut self, op: UnaryOp, a: NodeId) -> NodeId {
        self.add_node(NodeKind::Unary { op, a })
    }

    pub fn negate(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Negate, a)
    }

    pub fn not(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Not, a)
    }

    pub fn math(&mut self, method: MathFn, args: &[NodeId]) -> NodeId {
        self.add_node(NodeKind::Math {
            method,
            args: args.to_vec(),
        })
    }

    pub fn normalize(&mut self, a: NodeId) -> NodeId {
        self.math(MathFn::Normalize, &[a])
    }

    pub fn dot(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.math(MathFn::Dot, &[a, b])
    }

    pub fn cross(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.math(MathFn::Cross, &[a, b])
    }

    pub fn max(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.math(MathFn::Max, &[a, b])
    }

    pub fn pow(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.math(MathFn::Pow, &[a, b])
    }

    pub fn mix(&mut self, a: NodeId, b: NodeId, t: NodeId) -> NodeId {
        self.math(MathFn::Mix, &[a, b, t])
    }

    pub fn clamp(&mut self, x: NodeId, lo: NodeId, hi: NodeId) -> NodeId {
        self.math(MathFn::Clamp, &[x, lo, hi])
    }

    pub fn length(&mut self, a: NodeId) -> NodeId {
        self.math(MathFn::Length, &[a])
    }

    pub fn convert(&mut self, node: NodeId, to: ShaderType) -> NodeId {
        self.add_node(NodeKind::Convert { node, to })
    }

    pub fn split(&mut self, node: NodeId, components: &str) -> NodeId {
        self.add_node(NodeKind::Split {
            node,
            components: components.to_string(),
        })
    }

    pub fn join(&mut self, nodes: &[NodeId]) -> NodeId {
        self.add_node(NodeKind::Join {
            nodes: nodes.to_vec(),
            ty: None,
        })
    }

    pub fn join_as(&mut self, nodes: &[NodeId], ty: ShaderType) -> NodeId {
        self.add_node(NodeKind::Join {
            nodes: nodes.to_vec(),
            ty: Some(ty),
        })
    }

    /// Sample texture `name`; the `uv` attribute is used when `uv` is `None`.
    pub fn texture(&mut self, name: &str, uv: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::Texture {
            name: name.to_string(),
            uv,
            level: None,
        })
    }

    pub fn texture_level(&mut self, name: &str, uv: Option<NodeId>, level: NodeId) -> NodeId {
        self.add_node(NodeKind::Texture {
            name: name.to_string(),
            uv,
            level: Some(level),
        })
    }

    pub fn element(&mut self, node: NodeId, index: NodeId) -> NodeId {
        self.add_node(NodeKind::Element { node, index })
    }

    pub fn member(&mut self, node: NodeId, member: &str) -> NodeId {
        self.add_node(NodeKind::Member {
            node,
            member: member.to_string(),
        })
    }

    pub fn expression(&mut self, snippet: &str, ty: ShaderType, inputs: &[NodeId]) -> NodeId {
        self.add_node(NodeKind::Expression {
            snippet: snippet.to_string(),
            ty,
            inputs: inputs.to_vec(),
        })
    }

    pub fn builtin(&mut self, builtin: Builtin) -> NodeId {
        self.add_node(NodeKind::Builtin(builtin))
    }

    pub fn stack(&mut self, nodes: &[NodeId], output: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::Stack {
            nodes: nodes.to_vec(),
            output,
        })
    }

    pub fn conditional(&mut self, cond: NodeId, if_true: NodeId, if_false: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::Conditional {
            cond,
            if_true,
            if_false,
        })
    }

    /// Start an `if / else if / else` chain.
    pub fn if_(&mut self, cond: NodeId, then: NodeId) -> IfBuilder<'_> {
        IfBuilder {
            graph: self,
            first: (cond, then),
            rest: Vec::new(),
        }
    }

    /// Counted loop `0..end`; `body` receives the loop index node.
    pub fn loop_count(
        &mut self,
        end: NodeId,
        body: impl FnOnce(&mut NodeGraph, NodeId) -> NodeId,
    ) -> NodeId {
        self.loop_range(LoopRange::Count(end), body)
    }

    pub fn loop_between(
        &mut self,
        start: NodeId,
        end: NodeId,
        condition: LoopCondition,
        step: Option<NodeId>,
        body: impl FnOnce(&mut NodeGraph, NodeId) -> NodeId,
    ) -> NodeId {
        self.loop_range(
            LoopRange::Range {
                start,
                end,
                condition,
                step,
            },
            body,
        )
    }

    pub fn loop_range(
        &mut self,
        range: LoopRange,
        body: impl FnOnce(&mut NodeGraph, NodeId) -> NodeId,
    ) -> NodeId {
        // The loop points at itself until the body exists.
        let loop_id = NodeId(self.len() as u32);
        self.add_node(NodeKind::Loop {
            range,
            body: loop_id,
        });
        let index = self.add_node(NodeKind::LoopIndex { loop_node: loop_id });
        let body_id = body(self, index);
        if let NodeKind::Loop { body, .. } = &mut self.node_mut(loop_id).kind {
            *body = body_id;
        }
        loop_id
    }

    pub fn break_(&mut self) -> NodeId {
        self.add_node(NodeKind::Break)
    }

    pub fn continue_(&mut self) -> NodeId {
        self.add_node(NodeKind::Continue)
    }

    pub fn discard(&mut self) -> NodeId {
        self.add_node(NodeKind::Discard)
    }

    /// Define a function. `params` with a `None` type are typed per call
    /// site; `body` receives the parameter nodes.
    pub fn function(
        &mut self,
        name: &str,
        params: &[(&str, Option<ShaderType>)],
        return_ty: Option<ShaderType>,
        body: impl FnOnce(&mut NodeGraph, &[NodeId]) -> NodeId,
    ) -> NodeId {
        let fn_id = NodeId(self.len() as u32);
        self.add_node(NodeKind::Function {
            name: name.to_string(),
            params: params
                .iter()
                .map(|(n, ty)| Param {
                    name: n.to_string(),
                    ty: *ty,
                })
                .collect(),
            return_ty,
            body: fn_id,
        });
        let param_ids: Vec<NodeId> = (0..params.len())
            .map(|index| {
                self.add_node(NodeKind::Parameter {
                    function: fn_id,
                    index,
                })
            })
            .collect();
        let body_id = body(self, &param_ids);
        if let NodeKind::Function { body, .. } = &mut self.node_mut(fn_id).kind {
            *body = body_id;
        }
        fn_id
    }

    pub fn call(&mut self, function: NodeId, args: &[NodeId]) -> NodeId {
        self.add_node(NodeKind::Call {
            function,
            args: args.to_vec(),
        })
    }

    pub fn overload(&mut self, candidates: &[NodeId]) -> NodeId {
        self.add_node(NodeKind::Overload {
            candidates: candidates.to_vec(),
        })
    }

    pub fn tone_map(&mut self, mapping: ToneMapping, color: NodeId, exposure: Option<NodeId>) -> NodeId {
        self.add_node(NodeKind::ToneMap {
            mapping,
            color,
            exposure,
        })
    }

    pub fn color_space(&mut self, color: NodeId, from: ColorSpace, to: ColorSpace) -> NodeId {
        self.add_node(NodeKind::ColorSpace { from, to, color })
    }
}

/// Fluent `if / else if / else` construction; folds into nested
/// conditionals when finished.
pub struct IfBuilder<'g> {
    graph: &'g mut NodeGraph,
    first: (NodeId, NodeId),
    rest: Vec<(NodeId, NodeId)>,
}

impl IfBuilder<'_> {
    pub fn elseif(mut self, cond: NodeId, then: NodeId) -> Self {
        self.rest.push((cond, then));
        self
    }

    pub fn else_(self, otherwise: NodeId) -> NodeId {
        self.finish(Some(otherwise))
    }

    pub fn end(self) -> NodeId {
        self.finish(None)
    }

    fn finish(self, otherwise: Option<NodeId>) -> NodeId {
        let mut tail = otherwise;
        for (cond, then) in self.rest.into_iter().rev() {
            tail = Some(self.graph.conditional(cond, then, tail));
        }
        let (cond, then) = self.first;
        self.graph.conditional(cond, then, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_chain_nests_conditionals() {
        let mut g = NodeGraph::new();
        let c1 = g.boolean(true);
        let c2 = g.boolean(false);
        let a = g.float(1.0);
        let b = g.float(2.0);
        let c = g.float(3.0);
        let head = g.if_(c1, a).elseif(c2, b).else_(c);
        let NodeKind::Conditional {
            cond,
            if_true,
            if_false: Some(inner),
        } = g.kind(head).clone()
        else {
            panic!("expected a conditional with an else branch");
        };
        assert_eq!((cond, if_true), (c1, a));
        assert_eq!(
            g.kind(inner),
            &NodeKind::Conditional {
                cond: c2,
                if_true: b,
                if_false: Some(c)
            }
        );
    }

    #[test]
    fn loop_body_sees_its_index() {
        let mut g = NodeGraph::new();
        let n = g.int(4);
        let mut seen = None;
        let lp = g.loop_count(n, |g, i| {
            seen = Some(i);
            let target = g.property("acc", ShaderType::INT);
            let sum = g.add(target, i);
            g.assign(target, sum)
        });
        let index = seen.unwrap();
        assert_eq!(g.kind(index), &NodeKind::LoopIndex { loop_node: lp });
        let NodeKind::Loop { body, .. } = g.kind(lp) else {
            panic!("not a loop");
        };
        assert!(matches!(g.kind(*body), NodeKind::Assign { .. }));
    }

    #[test]
    fn function_params_point_back() {
        let mut g = NodeGraph::new();
        let f = g.function("double", &[("x", None)], None, |g, p| g.add(p[0], p[0]));
        let NodeKind::Function { body, .. } = g.kind(f).clone() else {
            panic!("not a function");
        };
        let NodeKind::Operator { a, .. } = g.kind(body).clone() else {
            panic!("not an operator");
        };
        assert_eq!(g.kind(a), &NodeKind::Parameter { function: f, index: 0 });
    }
}
