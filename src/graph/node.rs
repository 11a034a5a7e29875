//! Node kinds and the data they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compiler::types::{BinaryOp, ShaderType};
use crate::error::{CompileError, Result};
use crate::options::DedupePolicy;

/// Handle of a node inside a [`super::NodeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A constant value: a numeric type plus its components (column-major for
/// matrices).
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    ty: ShaderType,
    components: Vec<f64>,
}

impl Literal {
    pub fn new(ty: ShaderType, components: Vec<f64>) -> Result<Self> {
        if !ty.is_numeric() {
            return Err(CompileError::type_resolution(format!(
                "constants of type {ty} are not supported"
            )));
        }
        if components.len() != ty.length() {
            return Err(CompileError::type_resolution(format!(
                "{ty} constant needs {} component(s), got {}",
                ty.length(),
                components.len()
            )));
        }
        let literal = Self { ty, components };
        literal.check_finite()?;
        Ok(literal)
    }

    /// WGSL has no spelling for NaN or infinity.
    pub fn check_finite(&self) -> Result<()> {
        match self.components.iter().find(|v| !v.is_finite()) {
            Some(v) => Err(CompileError::type_resolution(format!(
                "{} constant has a non-finite component ({v})",
                self.ty
            ))),
            None => Ok(()),
        }
    }

    /// Every component set to `v`.
    pub fn splat(ty: ShaderType, v: f64) -> Result<Self> {
        Literal::new(ty, vec![v; ty.length()])
    }

    pub fn float(v: f32) -> Self {
        Self {
            ty: ShaderType::FLOAT,
            components: vec![v as f64],
        }
    }

    pub fn int(v: i32) -> Self {
        Self {
            ty: ShaderType::INT,
            components: vec![v as f64],
        }
    }

    pub fn uint(v: u32) -> Self {
        Self {
            ty: ShaderType::UINT,
            components: vec![v as f64],
        }
    }

    pub fn boolean(v: bool) -> Self {
        Self {
            ty: ShaderType::BOOL,
            components: vec![if v { 1.0 } else { 0.0 }],
        }
    }

    pub fn vec2(x: f32, y: f32) -> Self {
        Self {
            ty: ShaderType::VEC2,
            components: vec![x as f64, y as f64],
        }
    }

    pub fn vec3(x: f32, y: f32, z: f32) -> Self {
        Self {
            ty: ShaderType::VEC3,
            components: vec![x as f64, y as f64, z as f64],
        }
    }

    pub fn vec4(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self {
            ty: ShaderType::VEC4,
            components: vec![x as f64, y as f64, z as f64, w as f64],
        }
    }

    pub fn ty(&self) -> ShaderType {
        self.ty
    }

    pub fn components(&self) -> &[f64] {
        &self.components
    }
}

/// How often a node's runtime value must be refreshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
    #[default]
    None,
    Frame,
    Render,
    Object,
}

/// Uniform grouping; decides the update cadence of the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UniformGroup {
    #[default]
    Object,
    Render,
    Frame,
}

impl UniformGroup {
    pub fn update_type(self) -> UpdateType {
        match self {
            UniformGroup::Object => UpdateType::Object,
            UniformGroup::Render => UpdateType::Render,
            UniformGroup::Frame => UpdateType::Frame,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}

/// Math intrinsics. The backend maps each to a call, an infix operator or an
/// expanded expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathFn {
    Radians,
    Degrees,
    Exp,
    Exp2,
    Log,
    Log2,
    Sqrt,
    InverseSqrt,
    Floor,
    Ceil,
    Fract,
    Round,
    Trunc,
    Normalize,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Saturate,
    Negate,
    OneMinus,
    Abs,
    Sign,
    Dfdx,
    Dfdy,
    Fwidth,
    Transpose,
    Inverse,
    Determinant,
    Length,
    LengthSq,
    Distance,
    Dot,
    Min,
    Max,
    Mod,
    Step,
    Pow,
    Atan2,
    Reflect,
    Cross,
    Clamp,
    Mix,
    Smoothstep,
    Refract,
    FaceForward,
}

impl MathFn {
    /// Accepted argument count as `(min, max)`; `None` means unbounded.
    pub fn arity(self) -> (usize, Option<usize>) {
        use MathFn::*;
        match self {
            Min | Max => (2, None),
            Distance | Dot | Mod | Step | Pow | Atan2 | Reflect | Cross => (2, Some(2)),
            Clamp | Mix | Smoothstep | Refract | FaceForward => (3, Some(3)),
            _ => (1, Some(1)),
        }
    }

    pub fn name(self) -> String {
        let debug = format!("{self:?}");
        let mut chars = debug.chars();
        match chars.next() {
            Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
            None => debug,
        }
    }
}

/// Stage inputs exposed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Builtin {
    VertexIndex,
    InstanceIndex,
    FragCoord,
    FrontFacing,
    GlobalInvocationId,
    LocalInvocationId,
    WorkgroupId,
}

impl Builtin {
    pub fn ty(self) -> ShaderType {
        match self {
            Builtin::VertexIndex | Builtin::InstanceIndex => ShaderType::UINT,
            Builtin::FragCoord => ShaderType::VEC4,
            Builtin::FrontFacing => ShaderType::BOOL,
            Builtin::GlobalInvocationId | Builtin::LocalInvocationId | Builtin::WorkgroupId => {
                ShaderType::Vector(crate::compiler::types::Scalar::Uint, 3)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopCondition {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl LoopCondition {
    pub fn symbol(self) -> &'static str {
        match self {
            LoopCondition::Less => "<",
            LoopCondition::LessEqual => "<=",
            LoopCondition::Greater => ">",
            LoopCondition::GreaterEqual => ">=",
        }
    }

    pub fn counts_up(self) -> bool {
        matches!(self, LoopCondition::Less | LoopCondition::LessEqual)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoopRange {
    /// `for (i = 0; i < end; i++)`
    Count(NodeId),
    Range {
        start: NodeId,
        end: NodeId,
        condition: LoopCondition,
        /// Step added each iteration; one (or minus one when counting down)
        /// when absent.
        step: Option<NodeId>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    /// Typed from the call site when absent.
    pub ty: Option<ShaderType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Aces,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

/// Every node kind the compiler understands.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Constant(Literal),
    Uniform {
        name: String,
        ty: ShaderType,
        group: UniformGroup,
    },
    Attribute {
        name: String,
        ty: ShaderType,
    },
    /// Computed in the vertex stage, interpolated into the fragment stage.
    Varying {
        node: NodeId,
        name: Option<String>,
    },
    /// Named function-scope variable shared by every reference.
    Property {
        name: String,
        ty: ShaderType,
    },
    /// Temporary variable holding `node`.
    Var {
        node: NodeId,
        name: Option<String>,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Operator {
        op: BinaryOp,
        a: NodeId,
        b: NodeId,
    },
    Unary {
        op: UnaryOp,
        a: NodeId,
    },
    Math {
        method: MathFn,
        args: Vec<NodeId>,
    },
    Convert {
        node: NodeId,
        to: ShaderType,
    },
    Split {
        node: NodeId,
        components: String,
    },
    Join {
        nodes: Vec<NodeId>,
        ty: Option<ShaderType>,
    },
    Texture {
        name: String,
        uv: Option<NodeId>,
        level: Option<NodeId>,
    },
    Element {
        node: NodeId,
        index: NodeId,
    },
    Member {
        node: NodeId,
        member: String,
    },
    /// Raw snippet; `$0`, `$1`, ... are replaced by the built inputs.
    Expression {
        snippet: String,
        ty: ShaderType,
        inputs: Vec<NodeId>,
    },
    Builtin(Builtin),
    Stack {
        nodes: Vec<NodeId>,
        output: Option<NodeId>,
    },
    Conditional {
        cond: NodeId,
        if_true: NodeId,
        if_false: Option<NodeId>,
    },
    Loop {
        range: LoopRange,
        body: NodeId,
    },
    LoopIndex {
        loop_node: NodeId,
    },
    Break,
    Continue,
    Discard,
    Function {
        name: String,
        params: Vec<Param>,
        return_ty: Option<ShaderType>,
        body: NodeId,
    },
    Parameter {
        function: NodeId,
        index: usize,
    },
    Call {
        function: NodeId,
        args: Vec<NodeId>,
    },
    Overload {
        candidates: Vec<NodeId>,
    },
    ToneMap {
        mapping: ToneMapping,
        color: NodeId,
        exposure: Option<NodeId>,
    },
    ColorSpace {
        from: ColorSpace,
        to: ColorSpace,
        color: NodeId,
    },
}

fn indexed(prefix: &str, ids: &[NodeId]) -> Vec<(String, NodeId)> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (format!("{prefix}.{i}"), *id))
        .collect()
}

fn indexed_mut<'a>(ids: &'a mut [NodeId], prefix: &str, name: &str) -> Option<&'a mut NodeId> {
    let idx: usize = name.strip_prefix(prefix)?.strip_prefix('.')?.parse().ok()?;
    ids.get_mut(idx)
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Constant(_) => "Constant",
            NodeKind::Uniform { .. } => "Uniform",
            NodeKind::Attribute { .. } => "Attribute",
            NodeKind::Varying { .. } => "Varying",
            NodeKind::Property { .. } => "Property",
            NodeKind::Var { .. } => "Var",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::Operator { .. } => "Operator",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Math { .. } => "Math",
            NodeKind::Convert { .. } => "Convert",
            NodeKind::Split { .. } => "Split",
            NodeKind::Join { .. } => "Join",
            NodeKind::Texture { .. } => "Texture",
            NodeKind::Element { .. } => "Element",
            NodeKind::Member { .. } => "Member",
            NodeKind::Expression { .. } => "Expression",
            NodeKind::Builtin(_) => "Builtin",
            NodeKind::Stack { .. } => "Stack",
            NodeKind::Conditional { .. } => "Conditional",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::LoopIndex { .. } => "LoopIndex",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Discard => "Discard",
            NodeKind::Function { .. } => "Function",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::Call { .. } => "Call",
            NodeKind::Overload { .. } => "Overload",
            NodeKind::ToneMap { .. } => "ToneMap",
            NodeKind::ColorSpace { .. } => "ColorSpace",
        }
    }

    /// Named child inputs, in evaluation order. Back references
    /// (`Parameter::function`, `LoopIndex::loop_node`) are not inputs.
    pub fn inputs(&self) -> Vec<(String, NodeId)> {
        let one = |name: &str, id: NodeId| vec![(name.to_string(), id)];
        match self {
            NodeKind::Constant(_)
            | NodeKind::Uniform { .. }
            | NodeKind::Attribute { .. }
            | NodeKind::Property { .. }
            | NodeKind::Builtin(_)
            | NodeKind::LoopIndex { .. }
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Discard
            | NodeKind::Parameter { .. } => Vec::new(),
            NodeKind::Varying { node, .. }
            | NodeKind::Var { node, .. }
            | NodeKind::Convert { node, .. }
            | NodeKind::Split { node, .. }
            | NodeKind::Member { node, .. } => one("node", *node),
            NodeKind::Assign { target, value } => {
                vec![("target".to_string(), *target), ("value".to_string(), *value)]
            }
            NodeKind::Operator { a, b, .. } => {
                vec![("a".to_string(), *a), ("b".to_string(), *b)]
            }
            NodeKind::Unary { a, .. } => one("a", *a),
            NodeKind::Math { args, .. } => indexed("args", args),
            NodeKind::Join { nodes, .. } => indexed("nodes", nodes),
            NodeKind::Texture { uv, level, .. } => {
                let mut out = Vec::new();
                if let Some(uv) = uv {
                    out.push(("uv".to_string(), *uv));
                }
                if let Some(level) = level {
                    out.push(("level".to_string(), *level));
                }
                out
            }
            NodeKind::Element { node, index } => {
                vec![("node".to_string(), *node), ("index".to_string(), *index)]
            }
            NodeKind::Expression { inputs, .. } => indexed("inputs", inputs),
            NodeKind::Stack { nodes, output } => {
                let mut out = indexed("nodes", nodes);
                if let Some(output) = output {
                    out.push(("output".to_string(), *output));
                }
                out
            }
            NodeKind::Conditional {
                cond,
                if_true,
                if_false,
            } => {
                let mut out = vec![
                    ("cond".to_string(), *cond),
                    ("ifTrue".to_string(), *if_true),
                ];
                if let Some(f) = if_false {
                    out.push(("ifFalse".to_string(), *f));
                }
                out
            }
            NodeKind::Loop { range, body } => {
                let mut out = match range {
                    LoopRange::Count(end) => one("end", *end),
                    LoopRange::Range {
                        start, end, step, ..
                    } => {
                        let mut v = vec![("start".to_string(), *start), ("end".to_string(), *end)];
                        if let Some(step) = step {
                            v.push(("step".to_string(), *step));
                        }
                        v
                    }
                };
                out.push(("body".to_string(), *body));
                out
            }
            NodeKind::Function { body, .. } => one("body", *body),
            NodeKind::Call { function, args } => {
                let mut out = one("function", *function);
                out.extend(indexed("args", args));
                out
            }
            NodeKind::Overload { candidates } => indexed("candidates", candidates),
            NodeKind::ToneMap {
                color, exposure, ..
            } => {
                let mut out = one("color", *color);
                if let Some(e) = exposure {
                    out.push(("exposure".to_string(), *e));
                }
                out
            }
            NodeKind::ColorSpace { color, .. } => one("color", *color),
        }
    }

    pub fn children(&self) -> Vec<NodeId> {
        self.inputs().into_iter().map(|(_, id)| id).collect()
    }

    /// Mutable access to a named input slot, as listed by [`NodeKind::inputs`].
    pub fn input_mut(&mut self, name: &str) -> Option<&mut NodeId> {
        match self {
            NodeKind::Varying { node, .. }
            | NodeKind::Var { node, .. }
            | NodeKind::Convert { node, .. }
            | NodeKind::Split { node, .. }
            | NodeKind::Member { node, .. } if name == "node" => Some(node),
            NodeKind::Assign { target, value } => match name {
                "target" => Some(target),
                "value" => Some(value),
                _ => None,
            },
            NodeKind::Operator { a, b, .. } => match name {
                "a" => Some(a),
                "b" => Some(b),
                _ => None,
            },
            NodeKind::Unary { a, .. } if name == "a" => Some(a),
            NodeKind::Math { args, .. } => indexed_mut(args, "args", name),
            NodeKind::Join { nodes, .. } => indexed_mut(nodes, "nodes", name),
            NodeKind::Texture { uv, level, .. } => match name {
                "uv" => uv.as_mut(),
                "level" => level.as_mut(),
                _ => None,
            },
            NodeKind::Element { node, index } => match name {
                "node" => Some(node),
                "index" => Some(index),
                _ => None,
            },
            NodeKind::Expression { inputs, .. } => indexed_mut(inputs, "inputs", name),
            NodeKind::Stack { nodes, output } => match name {
                "output" => output.as_mut(),
                _ => indexed_mut(nodes, "nodes", name),
            },
            NodeKind::Conditional {
                cond,
                if_true,
                if_false,
            } => match name {
                "cond" => Some(cond),
                "ifTrue" => Some(if_true),
                "ifFalse" => if_false.as_mut(),
                _ => None,
            },
            NodeKind::Loop { range, body } => match (name, range) {
                ("body", _) => Some(body),
                ("end", LoopRange::Count(end)) => Some(end),
                ("start", LoopRange::Range { start, .. }) => Some(start),
                ("end", LoopRange::Range { end, .. }) => Some(end),
                ("step", LoopRange::Range { step, .. }) => step.as_mut(),
                _ => None,
            },
            NodeKind::Function { body, .. } if name == "body" => Some(body),
            NodeKind::Call { function, args } => match name {
                "function" => Some(function),
                _ => indexed_mut(args, "args", name),
            },
            NodeKind::Overload { candidates } => indexed_mut(candidates, "candidates", name),
            NodeKind::ToneMap {
                color, exposure, ..
            } => match name {
                "color" => Some(color),
                "exposure" => exposure.as_mut(),
                _ => None,
            },
            NodeKind::ColorSpace { color, .. } if name == "color" => Some(color),
            _ => None,
        }
    }

    /// Link to an enclosing definition that is not a child input.
    pub fn back_reference(&self) -> Option<NodeId> {
        match self {
            NodeKind::Parameter { function, .. } => Some(*function),
            NodeKind::LoopIndex { loop_node } => Some(*loop_node),
            _ => None,
        }
    }

    /// Kinds that only ever emit statements.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Assign { .. }
                | NodeKind::Loop { .. }
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Discard
        )
    }

    /// Kinds whose value depends on where they are referenced; never merged
    /// by content.
    pub fn requires_identity(&self) -> bool {
        self.is_statement()
            || matches!(
                self,
                NodeKind::Stack { .. }
                    | NodeKind::Function { .. }
                    | NodeKind::Parameter { .. }
                    | NodeKind::LoopIndex { .. }
                    | NodeKind::Var { .. }
                    | NodeKind::Overload { .. }
            )
    }

    /// Non-child parameters, rendered for content cache keys.
    pub fn params_key(&self) -> String {
        match self {
            NodeKind::Constant(lit) => format!("{}{:?}", lit.ty(), lit.components()),
            NodeKind::Uniform { name, ty, group } => format!("{name}:{ty}:{group:?}"),
            NodeKind::Attribute { name, ty } | NodeKind::Property { name, ty } => {
                format!("{name}:{ty}")
            }
            NodeKind::Varying { name, .. } | NodeKind::Var { name, .. } => {
                name.clone().unwrap_or_default()
            }
            NodeKind::Operator { op, .. } => format!("{op:?}"),
            NodeKind::Unary { op, .. } => format!("{op:?}"),
            NodeKind::Math { method, .. } => format!("{method:?}"),
            NodeKind::Convert { to, .. } => to.name(),
            NodeKind::Split { components, .. } => components.clone(),
            NodeKind::Join { ty, .. } => ty.map(|t| t.name()).unwrap_or_default(),
            NodeKind::Texture {
                name, uv, level, ..
            } => format!("{name}:{}:{}", uv.is_some(), level.is_some()),
            NodeKind::Member { member, .. } => member.clone(),
            NodeKind::Expression { snippet, ty, .. } => format!("{snippet}:{ty}"),
            NodeKind::Builtin(b) => format!("{b:?}"),
            NodeKind::Conditional { if_false, .. } => format!("{}", if_false.is_some()),
            NodeKind::ToneMap {
                mapping, exposure, ..
            } => format!("{mapping:?}:{}", exposure.is_some()),
            NodeKind::ColorSpace { from, to, .. } => format!("{from:?}:{to:?}"),
            NodeKind::Function { name, .. } => name.clone(),
            NodeKind::Parameter { index, .. } => index.to_string(),
            _ => String::new(),
        }
    }
}

/// One arena entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub uuid: String,
    pub kind: NodeKind,
    /// Overrides the inferred type; the value is converted when they differ.
    pub declared_type: Option<ShaderType>,
    pub update: UpdateType,
    /// Per-node override of the compiler's dedupe policy.
    pub sharing: Option<DedupePolicy>,
    pub label: Option<String>,
}

impl Node {
    pub fn new(uuid: String, kind: NodeKind) -> Self {
        let update = match &kind {
            NodeKind::Uniform { group, .. } => group.update_type(),
            _ => UpdateType::None,
        };
        Self {
            uuid,
            kind,
            declared_type: None,
            update,
            sharing: None,
            label: None,
        }
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => format!("{label}#{}", self.uuid),
            None => format!("{}#{}", self.kind.tag(), self.uuid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_checks_component_count() {
        assert!(Literal::new(ShaderType::VEC3, vec![1.0, 2.0]).is_err());
        assert!(Literal::new(ShaderType::Texture2D, vec![]).is_err());
        let m = Literal::splat(ShaderType::MAT2, 0.0).unwrap();
        assert_eq!(m.components().len(), 4);
    }

    #[test]
    fn non_finite_literals_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Literal::new(ShaderType::VEC2, vec![0.0, bad]).unwrap_err();
            assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
        }
        assert!(Literal::float(f32::NAN).check_finite().is_err());
        assert!(Literal::vec3(1.0, 0.5, 0.0).check_finite().is_ok());
    }

    #[test]
    fn inputs_are_named_and_mutable() {
        let mut kind = NodeKind::Math {
            method: MathFn::Clamp,
            args: vec![NodeId(0), NodeId(1), NodeId(2)],
        };
        assert_eq!(kind.inputs()[2], ("args.2".to_string(), NodeId(2)));
        *kind.input_mut("args.1").unwrap() = NodeId(7);
        assert_eq!(kind.children(), vec![NodeId(0), NodeId(7), NodeId(2)]);
        assert!(kind.input_mut("args.3").is_none());
        assert!(kind.input_mut("body").is_none());
    }

    #[test]
    fn back_references_are_not_children() {
        let kind = NodeKind::LoopIndex {
            loop_node: NodeId(4),
        };
        assert!(kind.children().is_empty());
        assert_eq!(kind.back_reference(), Some(NodeId(4)));
    }

    #[test]
    fn math_names_are_camel_case() {
        assert_eq!(MathFn::InverseSqrt.name(), "inverseSqrt");
        assert_eq!(MathFn::Dot.arity(), (2, Some(2)));
        assert_eq!(MathFn::Max.arity(), (2, None));
    }
}
