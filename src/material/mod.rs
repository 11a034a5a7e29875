//! Material assembly: fills a fixed set of slots with graph fragments and
//! wires them into vertex and fragment roots.
//!
//! The fragment output is composed in a fixed order:
//! 1. base color (diffuse × vertex color × map),
//! 2. opacity, then alpha test or alpha hash discard,
//! 3. the shading normal,
//! 4. lighting, emissive, tone mapping and output color space.
//!
//! The discard is emitted before any normal or lighting work so that
//! discarded fragments skip it.

pub mod lighting;
pub mod program;
pub mod slots;

use tracing::debug;

pub use lighting::{ReflectedLight, Surface};
pub use program::MaterialProgram;
pub use slots::{AlphaTest, Light, LightingModel, MaterialDescriptor, NormalSlot, Side};

use crate::compiler::types::{BinaryOp, ShaderType};
use crate::compiler::{ShaderBundle, ShaderCompiler, StageRoots};
use crate::error::{CompileError, ConfigurationWarning, Result};
use crate::graph::{Builtin, ColorSpace, MathFn, NodeGraph, NodeId, ToneMapping, UniformGroup};

/// Uniforms every material reads. The host provides their values.
pub const MODEL_MATRIX: &str = "modelMatrix";
pub const NORMAL_MATRIX: &str = "normalMatrix";
pub const VIEW_PROJECTION_MATRIX: &str = "viewProjectionMatrix";
pub const CAMERA_POSITION: &str = "cameraPosition";

/// The graph a material compiles: the author's nodes plus the ones the
/// slots were wired with.
#[derive(Clone, Debug)]
pub struct MaterialGraph {
    pub graph: NodeGraph,
    pub roots: StageRoots,
    pub warnings: Vec<ConfigurationWarning>,
}

/// Output of [`ShaderCompiler::compile_material`].
#[derive(Clone, Debug)]
pub struct CompiledMaterial {
    /// The assembled graph. Uniform declarations in `bundle` refer to its
    /// node ids.
    pub graph: NodeGraph,
    pub bundle: ShaderBundle,
    pub warnings: Vec<ConfigurationWarning>,
}

struct Assembler<'m> {
    g: NodeGraph,
    material: &'m MaterialDescriptor,
    warnings: Vec<ConfigurationWarning>,
    world: Option<NodeId>,
    fragment_position: Option<NodeId>,
    normal_matrix: Option<NodeId>,
    geometry_normal: Option<NodeId>,
}

impl<'m> Assembler<'m> {
    fn normal_matrix(&mut self) -> NodeId {
        if let Some(m) = self.normal_matrix {
            return m;
        }
        let m = self
            .g
            .uniform(NORMAL_MATRIX, ShaderType::MAT3, UniformGroup::Object);
        self.normal_matrix = Some(m);
        m
    }

    /// World-space position as a `vec4`, evaluated in the vertex stage.
    fn world_position4(&mut self) -> NodeId {
        if let Some(world) = self.world {
            return world;
        }
        let position = match self.material.position {
            Some(p) => p,
            None => self.g.attribute("position", ShaderType::VEC3),
        };
        let position = self.g.convert(position, ShaderType::VEC4);
        let model = self
            .g
            .uniform(MODEL_MATRIX, ShaderType::MAT4, UniformGroup::Object);
        let world = self.g.mul(model, position);
        self.world = Some(world);
        world
    }

    fn clip_position(&mut self) -> NodeId {
        let world = self.world_position4();
        let view_projection =
            self.g
                .uniform(VIEW_PROJECTION_MATRIX, ShaderType::MAT4, UniformGroup::Render);
        self.g.mul(view_projection, world)
    }

    /// Interpolated world-space position for the fragment stage.
    fn fragment_position(&mut self) -> NodeId {
        if let Some(p) = self.fragment_position {
            return p;
        }
        let world = self.world_position4();
        let xyz = self.g.split(world, "xyz");
        let p = self.g.varying(xyz, Some("v_worldPosition"));
        self.fragment_position = Some(p);
        p
    }

    fn geometry_normal(&mut self) -> NodeId {
        if let Some(n) = self.geometry_normal {
            return n;
        }
        let attribute = self.g.attribute("normal", ShaderType::VEC3);
        let normal_matrix = self.normal_matrix();
        let world = self.g.mul(normal_matrix, attribute);
        let interpolated = self.g.varying(world, Some("v_normal"));
        let n = self.g.normalize(interpolated);
        self.geometry_normal = Some(n);
        n
    }

    fn warn(&mut self, slot: &str, message: &str) {
        self.warnings.push(ConfigurationWarning::new(slot, message));
    }

    /// The color texture, honoring the deprecated `diffuse_map` slot.
    fn color_map(&mut self) -> Option<String> {
        match (&self.material.map, &self.material.diffuse_map) {
            (Some(map), None) => Some(map.clone()),
            (None, Some(old)) => {
                let old = old.clone();
                self.warn("diffuseMap", "deprecated, use `map` instead");
                Some(old)
            }
            (Some(map), Some(_)) => {
                let map = map.clone();
                self.warn("diffuseMap", "deprecated and ignored because `map` is set");
                Some(map)
            }
            (None, None) => None,
        }
    }

    fn base_color(&mut self) -> NodeId {
        let mut color = match self.material.color {
            Some(c) => self.g.convert(c, ShaderType::VEC4),
            None => self.g.vec4(1.0, 1.0, 1.0, 1.0),
        };
        if self.material.vertex_colors {
            let vertex = self.g.attribute("color", ShaderType::VEC3);
            color = self.g.mul(color, vertex);
        }
        if let Some(map) = self.color_map() {
            let sample = self.g.texture(&map, None);
            color = self.g.mul(color, sample);
        }
        color
    }

    /// `if (alpha < cutoff) { discard; }`, when the material tests alpha.
    fn alpha_discard(&mut self, alpha: NodeId) -> Option<NodeId> {
        let cutoff = match self.material.alpha_test.as_ref()? {
            AlphaTest::Threshold(t) => *t,
            AlphaTest::Hash => {
                let frag = self.g.builtin(Builtin::FragCoord);
                let xy = self.g.split(frag, "xy");
                self.g.expression(
                    "fract(sin(dot($0, vec2f(12.9898, 78.233))) * 43758.5453)",
                    ShaderType::FLOAT,
                    &[xy],
                )
            }
        };
        let below = self.g.less(alpha, cutoff);
        let discard = self.g.discard();
        Some(self.g.conditional(below, discard, None))
    }

    fn tangent_mapped(&mut self, texture: &str, scale: Option<NodeId>) -> NodeId {
        let n = self.geometry_normal();

        let tangent = self.g.attribute("tangent", ShaderType::VEC4);
        let xyz = self.g.split(tangent, "xyz");
        let normal_matrix = self.normal_matrix();
        let world_xyz = self.g.mul(normal_matrix, xyz);
        let sign = self.g.split(tangent, "w");
        let world_tangent = self.g.join(&[world_xyz, sign]);
        let interpolated = self.g.varying(world_tangent, Some("v_tangent"));

        let t_xyz = self.g.split(interpolated, "xyz");
        let t = self.g.normalize(t_xyz);
        let handedness = self.g.split(interpolated, "w");
        let b = self.g.cross(n, t);
        let b = self.g.mul(b, handedness);

        let sample = self.g.texture(texture, None);
        let encoded = self.g.split(sample, "xyz");
        let two = self.g.float(2.0);
        let one = self.g.float(1.0);
        let scaled = self.g.mul(encoded, two);
        let mut mapped = self.g.sub(scaled, one);
        if let Some(scale) = scale {
            let one = self.g.float(1.0);
            let factor = self.g.join(&[scale, scale, one]);
            mapped = self.g.mul(mapped, factor);
        }

        let sx = self.g.split(mapped, "x");
        let sy = self.g.split(mapped, "y");
        let sz = self.g.split(mapped, "z");
        let tx = self.g.mul(t, sx);
        let by = self.g.mul(b, sy);
        let nz = self.g.mul(n, sz);
        let sum = self.g.fold(BinaryOp::Add, &[tx, by, nz]).unwrap_or(nz);
        self.g.normalize(sum)
    }

    /// Height-map perturbation from screen-space derivatives of the height
    /// and the surface position.
    fn bumped(&mut self, texture: &str, scale: Option<NodeId>) -> NodeId {
        let n = self.geometry_normal();
        let position = self.fragment_position();

        let sample = self.g.texture(texture, None);
        let mut height = self.g.split(sample, "x");
        if let Some(scale) = scale {
            height = self.g.mul(height, scale);
        }
        let dhdx = self.g.math(MathFn::Dfdx, &[height]);
        let dhdy = self.g.math(MathFn::Dfdy, &[height]);
        let dpdx = self.g.math(MathFn::Dfdx, &[position]);
        let dpdy = self.g.math(MathFn::Dfdy, &[position]);

        let r1 = self.g.cross(dpdy, n);
        let r2 = self.g.cross(n, dpdx);
        let det = self.g.dot(dpdx, r1);
        let a = self.g.mul(dhdx, r1);
        let b = self.g.mul(dhdy, r2);
        let sum = self.g.add(a, b);
        let sign = self.g.math(MathFn::Sign, &[det]);
        let grad = self.g.mul(sign, sum);
        let abs_det = self.g.math(MathFn::Abs, &[det]);
        let weighted = self.g.mul(abs_det, n);
        let perturbed = self.g.sub(weighted, grad);
        self.g.normalize(perturbed)
    }

    fn shading_normal(&mut self) -> NodeId {
        let n = match self.material.normal.clone() {
            NormalSlot::Geometry => self.geometry_normal(),
            NormalSlot::Custom(node) => self.g.normalize(node),
            NormalSlot::TangentMap { texture, scale } => self.tangent_mapped(&texture, scale),
            NormalSlot::Bump { texture, scale } => self.bumped(&texture, scale),
        };
        match self.material.side {
            Side::Front => n,
            Side::Double => {
                let front = self.g.builtin(Builtin::FrontFacing);
                let flipped = self.g.negate(n);
                self.g.conditional(front, n, Some(flipped))
            }
        }
    }

    fn outgoing_light(&mut self, base: NodeId) -> NodeId {
        let rgb = self.g.split(base, "xyz");
        if !self.material.is_lit() {
            if !self.material.lights.is_empty() {
                self.warn("lights", "ignored by the unlit lighting model");
            }
            return rgb;
        }

        let normal = self.shading_normal();
        let position = self.fragment_position();
        let camera = self
            .g
            .uniform(CAMERA_POSITION, ShaderType::VEC3, UniformGroup::Render);
        let to_camera = self.g.sub(camera, position);
        let view_dir = self.g.normalize(to_camera);
        let surface = Surface {
            normal,
            position,
            view_dir,
            diffuse: rgb,
        };
        let reflected = lighting::accumulate(
            &mut self.g,
            &self.material.lighting,
            &self.material.lights,
            &surface,
        );
        if reflected.is_empty() {
            debug!(model = self.material.lighting.name(), "material has no light contribution");
        }
        reflected.total(&mut self.g)
    }

    fn fragment_output(&mut self) -> NodeId {
        let base = self.base_color();
        let mut alpha = self.g.split(base, "w");
        if let Some(opacity) = self.material.opacity {
            alpha = self.g.mul(alpha, opacity);
        }
        let discard = self.alpha_discard(alpha);

        let mut color = self.outgoing_light(base);
        if let Some(emissive) = self.material.emissive {
            color = self.g.add(color, emissive);
        }
        if self.material.tone_mapping != ToneMapping::None {
            color = self
                .g
                .tone_map(self.material.tone_mapping, color, self.material.exposure);
        }
        if self.material.output_color_space != ColorSpace::Linear {
            color = self
                .g
                .color_space(color, ColorSpace::Linear, self.material.output_color_space);
        }
        let output = self.g.join_as(&[color, alpha], ShaderType::VEC4);

        match discard {
            Some(discard) => self.g.stack(&[discard], Some(output)),
            None => output,
        }
    }
}

fn slot_handles(material: &MaterialDescriptor) -> Vec<(&'static str, NodeId)> {
    let mut handles: Vec<(&'static str, NodeId)> = [
        ("position", material.position),
        ("color", material.color),
        ("opacity", material.opacity),
        ("emissive", material.emissive),
        ("exposure", material.exposure),
    ]
    .into_iter()
    .filter_map(|(slot, id)| id.map(|id| (slot, id)))
    .collect();
    match &material.normal {
        NormalSlot::Custom(id) => handles.push(("normal", *id)),
        NormalSlot::TangentMap { scale: Some(id), .. } | NormalSlot::Bump { scale: Some(id), .. } => {
            handles.push(("normal", *id))
        }
        _ => {}
    }
    if let Some(AlphaTest::Threshold(id)) = &material.alpha_test {
        handles.push(("alphaTest", *id));
    }
    if let LightingModel::Phong {
        shininess,
        specular,
    } = &material.lighting
    {
        handles.extend(shininess.iter().map(|id| ("shininess", *id)));
        handles.extend(specular.iter().map(|id| ("specular", *id)));
    }
    for light in &material.lights {
        match light {
            Light::Ambient { color } => handles.push(("lights", *color)),
            Light::Directional { color, direction } => {
                handles.extend([("lights", *color), ("lights", *direction)])
            }
            Light::Point {
                color,
                position,
                range,
            } => {
                handles.extend([("lights", *color), ("lights", *position)]);
                handles.extend(range.iter().map(|id| ("lights", *id)));
            }
        }
    }
    handles
}

/// Wire `material` into a copy of `graph`. The author's graph is left
/// untouched, so one graph can back any number of materials.
pub fn assemble_material(graph: &NodeGraph, material: &MaterialDescriptor) -> Result<MaterialGraph> {
    for (slot, id) in slot_handles(material) {
        if graph.get(id).is_none() {
            return Err(CompileError::type_resolution(format!(
                "slot '{slot}' refers to unknown node {id}"
            )));
        }
    }

    let mut assembler = Assembler {
        g: graph.clone(),
        material,
        warnings: Vec::new(),
        world: None,
        fragment_position: None,
        normal_matrix: None,
        geometry_normal: None,
    };
    let vertex = assembler.clip_position();
    let fragment = assembler.fragment_output();
    debug!(
        lighting = material.lighting.name(),
        lights = material.lights.len(),
        nodes = assembler.g.len(),
        "assembled material"
    );
    Ok(MaterialGraph {
        graph: assembler.g,
        roots: StageRoots::render(vertex, fragment),
        warnings: assembler.warnings,
    })
}

impl ShaderCompiler {
    /// Assemble and compile a material.
    pub fn compile_material(
        &mut self,
        graph: &NodeGraph,
        material: &MaterialDescriptor,
    ) -> Result<CompiledMaterial> {
        let MaterialGraph {
            graph,
            roots,
            warnings,
        } = assemble_material(graph, material)?;
        let program = self.compile_with_warnings(&graph, &roots, warnings)?;
        let bundle = self.assemble(&program)?;
        Ok(CompiledMaterial {
            graph,
            bundle,
            warnings: program.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(compiled: &CompiledMaterial) -> &str {
        compiled.bundle.fragment.as_deref().unwrap_or_default()
    }

    #[test]
    fn empty_material_is_opaque_white() {
        let mut compiler = ShaderCompiler::default();
        let compiled = compiler
            .compile_material(&NodeGraph::new(), &MaterialDescriptor::new())
            .unwrap();
        assert!(compiled.warnings.is_empty());
        let mut names: Vec<&str> = compiled.bundle.uniforms.iter().map(|u| u.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["u_modelMatrix", "u_viewProjectionMatrix"]);
        assert!(fragment(&compiled).contains("vec4f(1.0, 1.0, 1.0, 1.0)"), "{}", fragment(&compiled));
    }

    #[test]
    fn deprecated_diffuse_map_falls_back_to_map() {
        let material = MaterialDescriptor {
            diffuse_map: Some("albedo".to_string()),
            ..MaterialDescriptor::default()
        };
        let mut compiler = ShaderCompiler::default();
        let compiled = compiler.compile_material(&NodeGraph::new(), &material).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].slot, "diffuseMap");
        assert_eq!(compiled.bundle.textures[0].name, "albedo");
    }

    #[test]
    fn map_wins_over_diffuse_map() {
        let material = MaterialDescriptor {
            diffuse_map: Some("old".to_string()),
            ..MaterialDescriptor::default()
        }
        .with_map("new");
        let mut compiler = ShaderCompiler::default();
        let compiled = compiler.compile_material(&NodeGraph::new(), &material).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.bundle.textures.len(), 1);
        assert_eq!(compiled.bundle.textures[0].name, "new");
    }

    #[test]
    fn unknown_slot_handles_are_rejected() {
        let mut other = NodeGraph::new();
        let foreign = other.float(0.5);
        let material = MaterialDescriptor::new().with_opacity(foreign);
        let err = assemble_material(&NodeGraph::new(), &material).unwrap_err();
        assert!(err.to_string().contains("opacity"), "{err}");
    }

    #[test]
    fn author_graph_is_not_modified() {
        let mut g = NodeGraph::new();
        let tint = g.uniform("tint", ShaderType::VEC3, UniformGroup::Object);
        let before = g.len();
        let material = MaterialDescriptor::new().with_color(tint);
        let assembled = assemble_material(&g, &material).unwrap();
        assert_eq!(g.len(), before);
        assert!(assembled.graph.len() > before);
    }

    #[test]
    fn unlit_warns_about_lights() {
        let mut g = NodeGraph::new();
        let light = Light::ambient_uniform(&mut g, "ambient");
        let material = MaterialDescriptor::new().with_light(light);
        let assembled = assemble_material(&g, &material).unwrap();
        assert_eq!(assembled.warnings[0].slot, "lights");
    }
}
