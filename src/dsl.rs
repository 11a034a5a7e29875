//! JSON record format for node graphs.
//!
//! Every node becomes one `{uuid, type, inputNodes, params}` record; child
//! links are uuids, so a child shared by several parents is written once and
//! comes back as one shared node.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::compiler::context::StageRoots;
use crate::compiler::types::{ShaderType, StructDecl, StructMember};
use crate::error::{CompileError, Result};
use crate::graph::{Literal, LoopRange, Node, NodeGraph, NodeId, NodeKind, Param, UpdateType};
use crate::options::DedupePolicy;

pub const DSL_VERSION: &str = "1";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GraphDSL {
    pub version: String,
    #[serde(default)]
    pub structs: Vec<StructRecord>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub roots: RootRecord,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StructRecord {
    pub name: String,
    pub members: Vec<MemberRecord>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MemberRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ShaderType,
}

/// Root node uuid per shader stage.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct RootRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeRecord {
    pub uuid: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Input property name to child uuid. Indexed inputs use `args.0`,
    /// `args.1`, ...
    #[serde(default, rename = "inputNodes")]
    pub input_nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default, rename = "declaredType", skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<ShaderType>,
    #[serde(default)]
    pub update: UpdateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<DedupePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
struct ParamRecord {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    ty: Option<ShaderType>,
}

/// Name under which a back reference is stored in `inputNodes`.
fn back_reference_name(kind: &NodeKind) -> Option<&'static str> {
    match kind {
        NodeKind::Parameter { .. } => Some("function"),
        NodeKind::LoopIndex { .. } => Some("loop"),
        _ => None,
    }
}

fn encode_params(kind: &NodeKind) -> BTreeMap<String, Value> {
    let value = match kind {
        NodeKind::Constant(lit) => json!({ "type": lit.ty(), "value": lit.components() }),
        NodeKind::Uniform { name, ty, group } => json!({ "name": name, "type": ty, "group": group }),
        NodeKind::Attribute { name, ty } | NodeKind::Property { name, ty } => {
            json!({ "name": name, "type": ty })
        }
        NodeKind::Varying { name, .. } | NodeKind::Var { name, .. } => match name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        },
        NodeKind::Operator { op, .. } => json!({ "op": op }),
        NodeKind::Unary { op, .. } => json!({ "op": op }),
        NodeKind::Math { method, .. } => json!({ "method": method }),
        NodeKind::Convert { to, .. } => json!({ "to": to }),
        NodeKind::Split { components, .. } => json!({ "components": components }),
        NodeKind::Join { ty: Some(ty), .. } => json!({ "type": ty }),
        NodeKind::Texture { name, .. } => json!({ "name": name }),
        NodeKind::Member { member, .. } => json!({ "member": member }),
        NodeKind::Expression { snippet, ty, .. } => json!({ "snippet": snippet, "type": ty }),
        NodeKind::Builtin(builtin) => json!({ "builtin": builtin }),
        NodeKind::Loop {
            range: LoopRange::Range { condition, .. },
            ..
        } => json!({ "condition": condition }),
        NodeKind::Function {
            name,
            params,
            return_ty,
            ..
        } => {
            let params: Vec<ParamRecord> = params
                .iter()
                .map(|p| ParamRecord {
                    name: p.name.clone(),
                    ty: p.ty,
                })
                .collect();
            json!({ "name": name, "params": params, "returnType": return_ty })
        }
        NodeKind::Parameter { index, .. } => json!({ "index": index }),
        NodeKind::ToneMap { mapping, .. } => json!({ "mapping": mapping }),
        NodeKind::ColorSpace { from, to, .. } => json!({ "from": from, "to": to }),
        _ => json!({}),
    };
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => BTreeMap::new(),
    }
}

/// Records for every node of `graph`, in arena order.
pub fn graph_to_dsl(graph: &NodeGraph, roots: &StageRoots) -> GraphDSL {
    let uuid = |id: NodeId| graph.node(id).uuid.clone();
    let nodes = graph
        .ids()
        .map(|id| {
            let node = graph.node(id);
            let mut input_nodes: BTreeMap<String, String> = node
                .kind
                .inputs()
                .into_iter()
                .map(|(name, child)| (name, uuid(child)))
                .collect();
            if let (Some(name), Some(target)) = (back_reference_name(&node.kind), node.kind.back_reference()) {
                input_nodes.insert(name.to_string(), uuid(target));
            }
            NodeRecord {
                uuid: node.uuid.clone(),
                node_type: node.kind.tag().to_string(),
                input_nodes,
                params: encode_params(&node.kind),
                declared_type: node.declared_type,
                update: node.update,
                sharing: node.sharing,
                label: node.label.clone(),
            }
        })
        .collect();

    GraphDSL {
        version: DSL_VERSION.to_string(),
        structs: graph
            .structs()
            .iter()
            .map(|s| StructRecord {
                name: s.name.clone(),
                members: s
                    .members
                    .iter()
                    .map(|m| MemberRecord {
                        name: m.name.clone(),
                        ty: m.ty,
                    })
                    .collect(),
            })
            .collect(),
        nodes,
        roots: RootRecord {
            vertex: roots.vertex.map(uuid),
            fragment: roots.fragment.map(uuid),
            compute: roots.compute.map(uuid),
        },
    }
}

struct RecordReader<'a> {
    record: &'a NodeRecord,
    ids: &'a HashMap<&'a str, NodeId>,
}

impl RecordReader<'_> {
    fn error(&self, message: impl std::fmt::Display) -> CompileError {
        CompileError::Serialization(format!(
            "{} node '{}': {message}",
            self.record.node_type, self.record.uuid
        ))
    }

    fn resolve(&self, uuid: &str) -> Result<NodeId> {
        self.ids
            .get(uuid)
            .copied()
            .ok_or_else(|| self.error(format!("unknown node uuid '{uuid}'")))
    }

    fn input(&self, name: &str) -> Result<NodeId> {
        self.optional_input(name)?
            .ok_or_else(|| self.error(format!("missing input '{name}'")))
    }

    fn optional_input(&self, name: &str) -> Result<Option<NodeId>> {
        self.record
            .input_nodes
            .get(name)
            .map(|uuid| self.resolve(uuid))
            .transpose()
    }

    /// `prefix.0`, `prefix.1`, ... in index order; indices must be dense.
    fn indexed(&self, prefix: &str) -> Result<Vec<NodeId>> {
        let mut entries: Vec<(usize, &String)> = Vec::new();
        for (name, uuid) in &self.record.input_nodes {
            let Some(index) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('.')) else {
                continue;
            };
            let index: usize = index
                .parse()
                .map_err(|_| self.error(format!("bad input index '{name}'")))?;
            entries.push((index, uuid));
        }
        entries.sort_by_key(|(i, _)| *i);
        if entries.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
            return Err(self.error(format!("'{prefix}' inputs are not numbered 0..n")));
        }
        entries.into_iter().map(|(_, uuid)| self.resolve(uuid)).collect()
    }

    fn param<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.optional_param(key)?
            .ok_or_else(|| self.error(format!("missing param '{key}'")))
    }

    fn optional_param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.record.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| self.error(format!("param '{key}': {e}"))),
        }
    }

    fn kind(&self) -> Result<NodeKind> {
        let kind = match self.record.node_type.as_str() {
            "Constant" => {
                let ty: ShaderType = self.param("type")?;
                let value: Vec<f64> = self.param("value")?;
                NodeKind::Constant(Literal::new(ty, value).map_err(|e| self.error(e))?)
            }
            "Uniform" => NodeKind::Uniform {
                name: self.param("name")?,
                ty: self.param("type")?,
                group: self.optional_param("group")?.unwrap_or_default(),
            },
            "Attribute" => NodeKind::Attribute {
                name: self.param("name")?,
                ty: self.param("type")?,
            },
            "Varying" => NodeKind::Varying {
                node: self.input("node")?,
                name: self.optional_param("name")?,
            },
            "Property" => NodeKind::Property {
                name: self.param("name")?,
                ty: self.param("type")?,
            },
            "Var" => NodeKind::Var {
                node: self.input("node")?,
                name: self.optional_param("name")?,
            },
            "Assign" => NodeKind::Assign {
                target: self.input("target")?,
                value: self.input("value")?,
            },
            "Operator" => NodeKind::Operator {
                op: self.param("op")?,
                a: self.input("a")?,
                b: self.input("b")?,
            },
            "Unary" => NodeKind::Unary {
                op: self.param("op")?,
                a: self.input("a")?,
            },
            "Math" => NodeKind::Math {
                method: self.param("method")?,
                args: self.indexed("args")?,
            },
            "Convert" => NodeKind::Convert {
                node: self.input("node")?,
                to: self.param("to")?,
            },
            "Split" => NodeKind::Split {
                node: self.input("node")?,
                components: self.param("components")?,
            },
            "Join" => NodeKind::Join {
                nodes: self.indexed("nodes")?,
                ty: self.optional_param("type")?,
            },
            "Texture" => NodeKind::Texture {
                name: self.param("name")?,
                uv: self.optional_input("uv")?,
                level: self.optional_input("level")?,
            },
            "Element" => NodeKind::Element {
                node: self.input("node")?,
                index: self.input("index")?,
            },
            "Member" => NodeKind::Member {
                node: self.input("node")?,
                member: self.param("member")?,
            },
            "Expression" => NodeKind::Expression {
                snippet: self.param("snippet")?,
                ty: self.param("type")?,
                inputs: self.indexed("inputs")?,
            },
            "Builtin" => NodeKind::Builtin(self.param("builtin")?),
            "Stack" => NodeKind::Stack {
                nodes: self.indexed("nodes")?,
                output: self.optional_input("output")?,
            },
            "Conditional" => NodeKind::Conditional {
                cond: self.input("cond")?,
                if_true: self.input("ifTrue")?,
                if_false: self.optional_input("ifFalse")?,
            },
            "Loop" => {
                let range = match self.optional_input("start")? {
                    Some(start) => LoopRange::Range {
                        start,
                        end: self.input("end")?,
                        condition: self.param("condition")?,
                        step: self.optional_input("step")?,
                    },
                    None => LoopRange::Count(self.input("end")?),
                };
                NodeKind::Loop {
                    range,
                    body: self.input("body")?,
                }
            }
            "LoopIndex" => NodeKind::LoopIndex {
                loop_node: self.input("loop")?,
            },
            "Break" => NodeKind::Break,
            "Continue" => NodeKind::Continue,
            "Discard" => NodeKind::Discard,
            "Function" => {
                let params: Vec<ParamRecord> = self.optional_param("params")?.unwrap_or_default();
                NodeKind::Function {
                    name: self.param("name")?,
                    params: params
                        .into_iter()
                        .map(|p| Param { name: p.name, ty: p.ty })
                        .collect(),
                    return_ty: self.optional_param("returnType")?,
                    body: self.input("body")?,
                }
            }
            "Parameter" => NodeKind::Parameter {
                function: self.input("function")?,
                index: self.param("index")?,
            },
            "Call" => NodeKind::Call {
                function: self.input("function")?,
                args: self.indexed("args")?,
            },
            "Overload" => NodeKind::Overload {
                candidates: self.indexed("candidates")?,
            },
            "ToneMap" => NodeKind::ToneMap {
                mapping: self.param("mapping")?,
                color: self.input("color")?,
                exposure: self.optional_input("exposure")?,
            },
            "ColorSpace" => NodeKind::ColorSpace {
                from: self.param("from")?,
                to: self.param("to")?,
                color: self.input("color")?,
            },
            other => return Err(self.error(format!("unknown node type '{other}'"))),
        };
        Ok(kind)
    }
}

/// Rebuild a graph from records. Node handles follow record order, so
/// children may appear before or after their parents.
pub fn graph_from_dsl(dsl: &GraphDSL) -> Result<(NodeGraph, StageRoots)> {
    if dsl.version != DSL_VERSION {
        return Err(CompileError::Serialization(format!(
            "unsupported graph version '{}'",
            dsl.version
        )));
    }

    let mut ids: HashMap<&str, NodeId> = HashMap::with_capacity(dsl.nodes.len());
    for (index, record) in dsl.nodes.iter().enumerate() {
        if ids.insert(record.uuid.as_str(), NodeId(index as u32)).is_some() {
            return Err(CompileError::Serialization(format!(
                "duplicate node uuid '{}'",
                record.uuid
            )));
        }
    }

    let mut graph = NodeGraph::new();
    for s in &dsl.structs {
        graph.push_struct(StructDecl {
            name: s.name.clone(),
            members: s
                .members
                .iter()
                .map(|m| StructMember {
                    name: m.name.clone(),
                    ty: m.ty,
                })
                .collect(),
        });
    }

    for record in &dsl.nodes {
        let reader = RecordReader { record, ids: &ids };
        let mut node = Node::new(record.uuid.clone(), reader.kind()?);
        node.declared_type = record.declared_type;
        node.update = record.update;
        node.sharing = record.sharing;
        node.label = record.label.clone();
        graph.push_node(node);
    }

    let root = |uuid: &Option<String>| -> Result<Option<NodeId>> {
        uuid.as_deref()
            .map(|u| {
                ids.get(u).copied().ok_or_else(|| {
                    CompileError::Serialization(format!("root references unknown node '{u}'"))
                })
            })
            .transpose()
    };
    let roots = StageRoots {
        vertex: root(&dsl.roots.vertex)?,
        fragment: root(&dsl.roots.fragment)?,
        compute: root(&dsl.roots.compute)?,
    };
    Ok((graph, roots))
}

/// Drops records no root reaches, following inputs and back references.
pub fn treeshake_unreachable(dsl: &GraphDSL) -> GraphDSL {
    let by_uuid: HashMap<&str, &NodeRecord> = dsl.nodes.iter().map(|n| (n.uuid.as_str(), n)).collect();
    let mut keep: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = [&dsl.roots.vertex, &dsl.roots.fragment, &dsl.roots.compute]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    while let Some(uuid) = stack.pop() {
        if !keep.insert(uuid) {
            continue;
        }
        if let Some(record) = by_uuid.get(uuid) {
            stack.extend(record.input_nodes.values().map(String::as_str));
        }
    }

    GraphDSL {
        version: dsl.version.clone(),
        structs: dsl.structs.clone(),
        nodes: dsl
            .nodes
            .iter()
            .filter(|n| keep.contains(n.uuid.as_str()))
            .cloned()
            .collect(),
        roots: dsl.roots.clone(),
    }
}

pub fn graph_to_json(graph: &NodeGraph, roots: &StageRoots) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&graph_to_dsl(graph, roots)).context("failed to serialize graph json")
}

pub fn graph_from_json(text: &str) -> anyhow::Result<(NodeGraph, StageRoots)> {
    let dsl: GraphDSL = serde_json::from_str(text).context("failed to parse graph json")?;
    graph_from_dsl(&dsl).context("failed to rebuild graph")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UniformGroup;

    #[test]
    fn shared_children_stay_shared() {
        let mut g = NodeGraph::new();
        let shared = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let a = g.mul(shared, shared);
        let b = g.add(a, shared);
        let pos = g.vec4(0.0, 0.0, 0.0, 1.0);
        let roots = StageRoots::render(pos, b);

        let dsl = graph_to_dsl(&g, &roots);
        let (back, back_roots) = graph_from_dsl(&dsl).unwrap();
        assert_eq!(back.len(), g.len());
        assert_eq!(back_roots, roots);
        let NodeKind::Operator { a: l, b: r, .. } = back.kind(a) else {
            panic!("expected operator");
        };
        assert_eq!(l, r);
        assert_eq!(back.kind(b).children(), vec![a, shared]);
    }

    #[test]
    fn functions_and_loops_round_trip() {
        let mut g = NodeGraph::new();
        let f = g.function("twice", &[("x", None)], None, |g, p| {
            let two = g.float(2.0);
            g.mul(p[0], two)
        });
        let four = g.int(4);
        let acc = g.property("acc", ShaderType::FLOAT);
        let lp = g.loop_count(four, |g, i| {
            let fi = g.convert(i, ShaderType::FLOAT);
            let called = g.call(f, &[fi]);
            let sum = g.add(acc, called);
            g.assign(acc, sum)
        });
        let out = g.stack(&[lp], Some(acc));
        let pos = g.vec4(0.0, 0.0, 0.0, 1.0);
        let roots = StageRoots::render(pos, out);

        let json = graph_to_json(&g, &roots).unwrap();
        let (back, _) = graph_from_json(&json).unwrap();
        for id in g.ids() {
            assert_eq!(back.node(id), g.node(id));
        }
    }

    #[test]
    fn unknown_types_are_rejected() {
        let text = r#"{
            "version": "1",
            "nodes": [
                { "uuid": "a", "type": "Uniform", "params": { "name": "x", "type": "vec9" } }
            ]
        }"#;
        let err = graph_from_json(text).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("failed to rebuild graph"), "{msg}");
        assert!(msg.contains("vec9"), "{msg}");
    }

    #[test]
    fn missing_children_are_errors() {
        let text = r#"{
            "version": "1",
            "nodes": [
                { "uuid": "m", "type": "Math", "params": { "method": "sin" },
                  "inputNodes": { "args.0": "nowhere" } }
            ]
        }"#;
        let dsl: GraphDSL = serde_json::from_str(text).unwrap();
        let err = graph_from_dsl(&dsl).unwrap_err();
        assert!(matches!(err, CompileError::Serialization(ref m) if m.contains("nowhere")), "{err}");
    }

    #[test]
    fn treeshake_keeps_back_references() {
        let mut g = NodeGraph::new();
        let stray = g.float(9.0);
        let three = g.int(3);
        let lp = g.loop_count(three, |g, i| {
            let p = g.property("last", ShaderType::INT);
            g.assign(p, i)
        });
        let roots = StageRoots::compute(lp);
        let dsl = treeshake_unreachable(&graph_to_dsl(&g, &roots));
        assert_eq!(dsl.nodes.len(), g.len() - 1);
        assert!(!dsl.nodes.iter().any(|n| n.uuid == g.node(stray).uuid));
        assert!(dsl.nodes.iter().any(|n| n.node_type == "LoopIndex"));
    }
}
