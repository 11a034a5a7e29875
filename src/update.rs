//! Per-cadence refresh of uniform values.
//!
//! Compiled shaders never change when a value does; instead each uniform
//! node gets a provider that [`NodeFrame`] calls once per frame, render or
//! object according to the node's [`UpdateType`].

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::compiler::context::UniformDecl;
use crate::compiler::types::{Scalar, ShaderType};
use crate::graph::{NodeGraph, NodeId, NodeKind, UniformGroup, UpdateType};

/// Host-side value of a uniform. Matrices are column-major.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    UVec2([u32; 2]),
    UVec3([u32; 3]),
    UVec4([u32; 4]),
    BVec2([bool; 2]),
    BVec3([bool; 3]),
    BVec4([bool; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// Scalars or vectors, all of one type.
    Array(Vec<UniformValue>),
}

fn words<T: Copy>(values: &[T], to_bytes: impl Fn(T) -> [u8; 4]) -> Vec<u8> {
    values.iter().flat_map(|v| to_bytes(*v)).collect()
}

fn bool_word(v: bool) -> [u8; 4] {
    u32::from(v).to_ne_bytes()
}

impl UniformValue {
    /// Declared type this value fills. Empty or mixed arrays have none and
    /// report `Void`.
    pub fn ty(&self) -> ShaderType {
        use UniformValue as V;
        match self {
            V::Float(_) => ShaderType::FLOAT,
            V::Int(_) => ShaderType::INT,
            V::Uint(_) => ShaderType::UINT,
            V::Bool(_) => ShaderType::BOOL,
            V::Vec2(_) => ShaderType::VEC2,
            V::Vec3(_) => ShaderType::VEC3,
            V::Vec4(_) => ShaderType::VEC4,
            V::IVec2(_) => ShaderType::Vector(Scalar::Int, 2),
            V::IVec3(_) => ShaderType::Vector(Scalar::Int, 3),
            V::IVec4(_) => ShaderType::Vector(Scalar::Int, 4),
            V::UVec2(_) => ShaderType::Vector(Scalar::Uint, 2),
            V::UVec3(_) => ShaderType::Vector(Scalar::Uint, 3),
            V::UVec4(_) => ShaderType::Vector(Scalar::Uint, 4),
            V::BVec2(_) => ShaderType::Vector(Scalar::Bool, 2),
            V::BVec3(_) => ShaderType::Vector(Scalar::Bool, 3),
            V::BVec4(_) => ShaderType::Vector(Scalar::Bool, 4),
            V::Mat2(_) => ShaderType::MAT2,
            V::Mat3(_) => ShaderType::MAT3,
            V::Mat4(_) => ShaderType::MAT4,
            V::Array(items) => {
                let Some(first) = items.first() else {
                    return ShaderType::Void;
                };
                let elem = first.ty();
                if items.iter().any(|item| item.ty() != elem) {
                    return ShaderType::Void;
                }
                let len = items.len() as u32;
                match elem {
                    ShaderType::Scalar(scalar) => ShaderType::Array { scalar, width: 1, len },
                    ShaderType::Vector(scalar, width) => ShaderType::Array { scalar, width, len },
                    _ => ShaderType::Void,
                }
            }
        }
    }

    /// Tightly packed components; `mat3` columns and array elements keep
    /// the stride WGSL gives them.
    fn packed(&self) -> Vec<u8> {
        use UniformValue as V;
        match self {
            V::Float(v) => v.to_ne_bytes().to_vec(),
            V::Int(v) => v.to_ne_bytes().to_vec(),
            V::Uint(v) => v.to_ne_bytes().to_vec(),
            V::Bool(v) => bool_word(*v).to_vec(),
            V::Vec2(v) => words(v, f32::to_ne_bytes),
            V::Vec3(v) => words(v, f32::to_ne_bytes),
            V::Vec4(v) => words(v, f32::to_ne_bytes),
            V::IVec2(v) => words(v, i32::to_ne_bytes),
            V::IVec3(v) => words(v, i32::to_ne_bytes),
            V::IVec4(v) => words(v, i32::to_ne_bytes),
            V::UVec2(v) => words(v, u32::to_ne_bytes),
            V::UVec3(v) => words(v, u32::to_ne_bytes),
            V::UVec4(v) => words(v, u32::to_ne_bytes),
            V::BVec2(v) => words(v, bool_word),
            V::BVec3(v) => words(v, bool_word),
            V::BVec4(v) => words(v, bool_word),
            V::Mat2(v) => words(v, f32::to_ne_bytes),
            // vec3 columns are 16 byte aligned
            V::Mat3(v) => v
                .chunks(3)
                .flat_map(|column| {
                    let mut bytes = words(column, f32::to_ne_bytes);
                    bytes.resize(16, 0);
                    bytes
                })
                .collect(),
            V::Mat4(v) => words(v, f32::to_ne_bytes),
            V::Array(items) => {
                let stride = match self.ty() {
                    ShaderType::Array { width: 1, .. } => 4,
                    ShaderType::Array { width: 2, .. } => 8,
                    _ => 16,
                };
                items
                    .iter()
                    .flat_map(|item| {
                        let mut bytes = item.packed();
                        bytes.resize(stride, 0);
                        bytes
                    })
                    .collect()
            }
        }
    }

    /// Bytes as laid out in a uniform buffer, padded to whole 16 byte slots.
    /// Bools are stored as `u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.packed();
        let slots = bytes.len().div_ceil(16).max(1);
        bytes.resize(slots * 16, 0);
        bytes
    }
}

/// Counters handed to providers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInfo {
    pub frame: u64,
    pub render: u64,
    pub object: u64,
    /// Seconds since the first frame.
    pub time: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
}

type Provider = Box<dyn FnMut(&FrameInfo) -> UniformValue>;

struct Entry {
    update: UpdateType,
    provider: Provider,
    /// Counter value of the cadence at the last call.
    last: Option<u64>,
}

/// Drives value providers. Owned by the render loop, one per scene.
#[derive(Default)]
pub struct NodeFrame {
    info: FrameInfo,
    entries: BTreeMap<NodeId, Entry>,
    values: HashMap<NodeId, UniformValue>,
}

impl NodeFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame with providers for the frame-updated `time` uniforms of `graph`.
    pub fn for_graph(graph: &NodeGraph) -> Self {
        let mut frame = Self::new();
        for id in graph.ids() {
            let is_time = matches!(
                graph.kind(id),
                NodeKind::Uniform {
                    name,
                    ty: ShaderType::Scalar(Scalar::Float),
                    group: UniformGroup::Frame,
                } if name == "time"
            );
            if is_time {
                frame.on_update(graph, id, |info| UniformValue::Float(info.time));
            }
        }
        frame
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// Register the provider of `id`. Its cadence is the node's update type;
    /// nodes without one are evaluated once.
    pub fn on_update(
        &mut self,
        graph: &NodeGraph,
        id: NodeId,
        provider: impl FnMut(&FrameInfo) -> UniformValue + 'static,
    ) {
        self.entries.insert(
            id,
            Entry {
                update: graph.node(id).update,
                provider: Box::new(provider),
                last: None,
            },
        );
        self.values.remove(&id);
    }

    pub fn begin_frame(&mut self, time: f32) {
        self.info.frame += 1;
        self.info.delta = if self.info.frame == 1 { 0.0 } else { time - self.info.time };
        self.info.time = time;
        self.update(UpdateType::Frame);
    }

    pub fn begin_render(&mut self) {
        self.info.render += 1;
        self.update(UpdateType::Render);
    }

    pub fn begin_object(&mut self) {
        self.info.object += 1;
        self.update(UpdateType::Object);
    }

    fn counter(&self, cadence: UpdateType) -> u64 {
        match cadence {
            UpdateType::None => 0,
            UpdateType::Frame => self.info.frame,
            UpdateType::Render => self.info.render,
            UpdateType::Object => self.info.object,
        }
    }

    /// Call every provider of `cadence` not yet called for the current
    /// counter value, plus pending one-shot providers.
    pub fn update(&mut self, cadence: UpdateType) {
        let stamp = self.counter(cadence);
        let info = self.info;
        for (id, entry) in &mut self.entries {
            let due = match entry.update {
                UpdateType::None => entry.last.is_none(),
                update => update == cadence && entry.last != Some(stamp),
            };
            if !due {
                continue;
            }
            entry.last = Some(if entry.update == UpdateType::None { 0 } else { stamp });
            let value = (entry.provider)(&info);
            trace!(node = %id, ?value, "updated value");
            self.values.insert(*id, value);
        }
    }

    pub fn value(&self, id: NodeId) -> Option<&UniformValue> {
        self.values.get(&id)
    }

    /// Buffer contents for a compiled uniform, when its node has a value of
    /// the declared type.
    pub fn uniform_bytes(&self, decl: &UniformDecl) -> Option<Vec<u8>> {
        self.value(decl.node)
            .filter(|v| v.ty() == decl.ty)
            .map(UniformValue::to_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn providers_run_once_per_cadence_tick() {
        let mut g = NodeGraph::new();
        let per_frame = g.uniform("wobble", ShaderType::FLOAT, UniformGroup::Frame);
        let per_object = g.uniform("model_tint", ShaderType::VEC3, UniformGroup::Object);

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut frame = NodeFrame::new();
        frame.on_update(&g, per_frame, move |info| {
            counter.set(counter.get() + 1);
            UniformValue::Float(info.frame as f32)
        });
        frame.on_update(&g, per_object, |info| UniformValue::Vec3([info.object as f32, 0.0, 0.0]));

        frame.begin_frame(0.0);
        frame.update(UpdateType::Frame);
        assert_eq!(calls.get(), 1);
        assert_eq!(frame.value(per_frame), Some(&UniformValue::Float(1.0)));
        assert_eq!(frame.value(per_object), None);

        frame.begin_render();
        frame.begin_object();
        frame.begin_object();
        assert_eq!(frame.value(per_object), Some(&UniformValue::Vec3([2.0, 0.0, 0.0])));
        assert_eq!(calls.get(), 1);

        frame.begin_frame(0.5);
        assert_eq!(calls.get(), 2);
        assert_eq!(frame.info().delta, 0.5);
    }

    #[test]
    fn one_shot_values_are_computed_once() {
        let mut g = NodeGraph::new();
        let u = g.uniform("seed", ShaderType::UINT, UniformGroup::Object);
        g.set_update(u, UpdateType::None);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut frame = NodeFrame::new();
        frame.on_update(&g, u, move |_| {
            counter.set(counter.get() + 1);
            UniformValue::Uint(7)
        });
        frame.begin_frame(0.0);
        frame.begin_render();
        frame.begin_frame(1.0);
        assert_eq!(calls.get(), 1);
        assert_eq!(frame.value(u), Some(&UniformValue::Uint(7)));
    }

    #[test]
    fn matrices_keep_their_column_layout() {
        let identity3 = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let bytes = UniformValue::Mat3(identity3).to_bytes();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[0..4], &1.0_f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &[0; 4]);
        assert_eq!(&bytes[20..24], &1.0_f32.to_ne_bytes());
        assert_eq!(&bytes[40..44], &1.0_f32.to_ne_bytes());

        let bytes = UniformValue::Mat2([1.0, 2.0, 3.0, 4.0]).to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..12], &3.0_f32.to_ne_bytes());
        assert_eq!(UniformValue::Mat2([0.0; 4]).ty(), ShaderType::MAT2);
    }

    #[test]
    fn integer_and_bool_vectors() {
        let v = UniformValue::IVec3([-1, 2, 3]);
        assert_eq!(v.ty(), ShaderType::Vector(Scalar::Int, 3));
        assert_eq!(&v.to_bytes()[..4], &(-1_i32).to_ne_bytes());

        let b = UniformValue::BVec2([false, true]);
        assert_eq!(b.ty(), ShaderType::Vector(Scalar::Bool, 2));
        let bytes = b.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[4..8], &1_u32.to_ne_bytes());

        assert_eq!(UniformValue::UVec4([1, 2, 3, 4]).to_bytes().len(), 16);
    }

    #[test]
    fn arrays_use_the_element_stride() {
        let weights = UniformValue::Array(vec![
            UniformValue::Vec3([1.0, 0.0, 0.0]),
            UniformValue::Vec3([0.0, 1.0, 0.0]),
        ]);
        assert_eq!(
            weights.ty(),
            ShaderType::Array {
                scalar: Scalar::Float,
                width: 3,
                len: 2
            }
        );
        let bytes = weights.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[20..24], &1.0_f32.to_ne_bytes());

        let mixed = UniformValue::Array(vec![UniformValue::Float(1.0), UniformValue::Int(2)]);
        assert_eq!(mixed.ty(), ShaderType::Void);
        assert_eq!(UniformValue::Array(Vec::new()).ty(), ShaderType::Void);
    }

    #[test]
    fn values_of_another_type_are_not_packed() {
        let mut g = NodeGraph::new();
        let u = g.uniform("normals", ShaderType::MAT3, UniformGroup::Object);
        let mut frame = NodeFrame::new();
        frame.on_update(&g, u, |_| UniformValue::Mat4([0.0; 16]));
        frame.begin_object();
        let decl = UniformDecl {
            name: "u_normals".to_string(),
            source_name: "normals".to_string(),
            ty: ShaderType::MAT3,
            group: UniformGroup::Object,
            binding: 0,
            node: u,
        };
        assert_eq!(frame.uniform_bytes(&decl), None);
    }

    #[test]
    fn time_uniforms_follow_the_clock() {
        let mut g = NodeGraph::new();
        let t = g.time();
        let mut frame = NodeFrame::for_graph(&g);
        frame.begin_frame(1.25);
        assert_eq!(frame.value(t), Some(&UniformValue::Float(1.25)));
        let bytes = frame.value(t).map(UniformValue::to_bytes).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &1.25_f32.to_ne_bytes());
    }
}
