//! Node graph arena. Nodes reference each other through [`NodeId`] handles;
//! no node owns another and the compiler never mutates the graph.

mod builder;
mod node;

use std::collections::{HashMap, HashSet, VecDeque};

pub use builder::IfBuilder;
pub use node::{
    Builtin, ColorSpace, Literal, LoopCondition, LoopRange, MathFn, Node, NodeId, NodeKind,
    Param, ToneMapping, UnaryOp, UniformGroup, UpdateType,
};

use crate::compiler::types::{ShaderType, StructDecl, StructId, StructMember};
use crate::error::{CompileError, Result};
use crate::options::DedupePolicy;

#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    structs: Vec<StructDecl>,
    uuids: HashMap<String, NodeId>,
    next_uuid: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node behind a handle. Handles come from this graph, so indexing is in
    /// bounds for every id it hands out.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn find(&self, uuid: &str) -> Option<NodeId> {
        self.uuids.get(uuid).copied()
    }

    pub fn structs(&self) -> &[StructDecl] {
        &self.structs
    }

    pub fn struct_decl(&self, id: StructId) -> Option<&StructDecl> {
        self.structs.get(id.0 as usize)
    }

    pub fn define_struct(&mut self, name: &str, members: &[(&str, ShaderType)]) -> StructId {
        self.structs.push(StructDecl {
            name: name.to_string(),
            members: members
                .iter()
                .map(|(n, ty)| StructMember {
                    name: n.to_string(),
                    ty: *ty,
                })
                .collect(),
        });
        StructId(self.structs.len() as u32 - 1)
    }

    pub(crate) fn push_struct(&mut self, decl: StructDecl) -> StructId {
        self.structs.push(decl);
        StructId(self.structs.len() as u32 - 1)
    }

    fn fresh_uuid(&mut self) -> String {
        loop {
            let uuid = format!("n{:04}", self.next_uuid);
            self.next_uuid += 1;
            if !self.uuids.contains_key(&uuid) {
                return uuid;
            }
        }
    }

    /// Append a node and return its handle.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let uuid = self.fresh_uuid();
        self.push_node(Node::new(uuid, kind))
    }

    /// Append a node carrying an externally chosen uuid.
    pub fn add_with_uuid(&mut self, uuid: &str, kind: NodeKind) -> Result<NodeId> {
        if self.uuids.contains_key(uuid) {
            return Err(CompileError::Serialization(format!(
                "duplicate node uuid '{uuid}'"
            )));
        }
        Ok(self.push_node(Node::new(uuid.to_string(), kind)))
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.uuids.insert(node.uuid.clone(), id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Rewire one named input of `node` (see [`NodeKind::inputs`]).
    pub fn set_input(&mut self, node: NodeId, input: &str, child: NodeId) -> Result<()> {
        if self.get(child).is_none() {
            return Err(CompileError::type_resolution(format!(
                "unknown child handle {child}"
            )));
        }
        let target = self.node_mut(node);
        let label = target.display_name();
        match target.kind.input_mut(input) {
            Some(slot) => {
                *slot = child;
                Ok(())
            }
            None => Err(CompileError::type_resolution(format!("no input named '{input}'"))
                .at_node(&label)),
        }
    }

    pub fn set_declared_type(&mut self, id: NodeId, ty: ShaderType) -> NodeId {
        self.node_mut(id).declared_type = Some(ty);
        id
    }

    pub fn set_sharing(&mut self, id: NodeId, sharing: DedupePolicy) -> NodeId {
        self.node_mut(id).sharing = Some(sharing);
        id
    }

    pub fn set_update(&mut self, id: NodeId, update: UpdateType) -> NodeId {
        self.node_mut(id).update = update;
        id
    }

    pub fn set_label(&mut self, id: NodeId, label: &str) -> NodeId {
        self.node_mut(id).label = Some(label.to_string());
        id
    }

    /// Every node reachable from `roots` through child inputs, in id order.
    pub fn upstream_reachable(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(n) = stack.pop() {
            if !visited.insert(n) {
                continue;
            }
            stack.extend(self.kind(n).children());
        }
        let mut out: Vec<NodeId> = visited.into_iter().collect();
        out.sort();
        out
    }

    /// Children-first order of the nodes reachable from `roots`.
    pub fn topo_sort(&self, roots: &[NodeId]) -> Result<Vec<NodeId>> {
        let reachable = self.upstream_reachable(roots);
        let mut indeg: HashMap<NodeId, usize> = reachable.iter().map(|id| (*id, 0)).collect();
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for id in &reachable {
            for child in self.kind(*id).children() {
                if let Some(d) = indeg.get_mut(id) {
                    *d += 1;
                }
                outgoing.entry(child).or_default().push(*id);
            }
        }

        let mut q: VecDeque<NodeId> = reachable
            .iter()
            .filter(|id| indeg.get(id) == Some(&0))
            .copied()
            .collect();
        let mut order = Vec::with_capacity(reachable.len());
        while let Some(n) = q.pop_front() {
            order.push(n);
            for parent in outgoing.get(&n).into_iter().flatten() {
                if let Some(d) = indeg.get_mut(parent) {
                    *d -= 1;
                    if *d == 0 {
                        q.push_back(*parent);
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            let stuck: Vec<String> = reachable
                .iter()
                .filter(|id| indeg.get(id).is_some_and(|d| *d > 0))
                .map(|id| self.node(*id).display_name())
                .collect();
            return Err(CompileError::Cycle {
                node: stuck.first().cloned().unwrap_or_default(),
                chain: stuck,
            });
        }
        Ok(order)
    }
}
