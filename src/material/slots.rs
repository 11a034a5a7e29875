//! Material slot record. Every slot is optional; an empty slot takes the
//! documented default when the material is assembled.

use crate::compiler::types::ShaderType;
use crate::graph::{ColorSpace, NodeGraph, NodeId, ToneMapping, UniformGroup};

/// Where the shading normal comes from.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NormalSlot {
    /// Interpolated geometry normal.
    #[default]
    Geometry,
    /// A world-space normal computed by the graph (`vec3`).
    Custom(NodeId),
    /// Tangent-space normal map; needs a `tangent` attribute (`vec4`, `w`
    /// holding the bitangent sign).
    TangentMap {
        texture: String,
        scale: Option<NodeId>,
    },
    /// Height map perturbing the geometry normal through screen-space
    /// derivatives.
    Bump {
        texture: String,
        scale: Option<NodeId>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LightingModel {
    /// Base color straight to output; lights are ignored.
    #[default]
    Unlit,
    Lambert,
    /// Blinn-Phong specular on top of Lambert diffuse.
    Phong {
        /// `f32`; 30 when absent.
        shininess: Option<NodeId>,
        /// `vec3`; dark grey when absent.
        specular: Option<NodeId>,
    },
}

impl LightingModel {
    pub fn name(&self) -> &'static str {
        match self {
            LightingModel::Unlit => "unlit",
            LightingModel::Lambert => "lambert",
            LightingModel::Phong { .. } => "phong",
        }
    }
}

/// A light contribution. Colors are `vec3` with intensity already applied.
#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    /// Indirect diffuse light reaching every surface.
    Ambient { color: NodeId },
    /// `direction` points from the surface toward the light.
    Directional { color: NodeId, direction: NodeId },
    /// World-space `position`; `range` (when set) fades the light to zero at
    /// that distance.
    Point {
        color: NodeId,
        position: NodeId,
        range: Option<NodeId>,
    },
}

impl Light {
    /// Ambient light driven by a `{name}Color` uniform.
    pub fn ambient_uniform(graph: &mut NodeGraph, name: &str) -> Self {
        Light::Ambient {
            color: graph.uniform(&format!("{name}Color"), ShaderType::VEC3, UniformGroup::Render),
        }
    }

    /// Directional light driven by `{name}Color` and `{name}Direction`.
    pub fn directional_uniform(graph: &mut NodeGraph, name: &str) -> Self {
        Light::Directional {
            color: graph.uniform(&format!("{name}Color"), ShaderType::VEC3, UniformGroup::Render),
            direction: graph.uniform(
                &format!("{name}Direction"),
                ShaderType::VEC3,
                UniformGroup::Render,
            ),
        }
    }

    /// Point light driven by `{name}Color`, `{name}Position` and `{name}Range`.
    pub fn point_uniform(graph: &mut NodeGraph, name: &str) -> Self {
        Light::Point {
            color: graph.uniform(&format!("{name}Color"), ShaderType::VEC3, UniformGroup::Render),
            position: graph.uniform(
                &format!("{name}Position"),
                ShaderType::VEC3,
                UniformGroup::Render,
            ),
            range: Some(graph.uniform(
                &format!("{name}Range"),
                ShaderType::FLOAT,
                UniformGroup::Render,
            )),
        }
    }
}

/// Which faces are shaded. Back faces of double-sided materials get a
/// flipped normal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Side {
    #[default]
    Front,
    Double,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlphaTest {
    /// Discard fragments whose alpha is below the threshold (`f32`).
    Threshold(NodeId),
    /// Discard against a per-pixel hash of the fragment position, giving
    /// stochastic transparency without sorting.
    Hash,
}

/// Slots of a surface material. Node handles refer to the graph the
/// material is compiled with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialDescriptor {
    /// Object-space position (`vec3`); the `position` attribute when absent.
    pub position: Option<NodeId>,
    pub normal: NormalSlot,
    /// Diffuse color (`vec3` or `vec4`); opaque white when absent.
    pub color: Option<NodeId>,
    /// Multiply by the `color` vertex attribute.
    pub vertex_colors: bool,
    /// Color texture sampled at the `uv` attribute.
    pub map: Option<String>,
    /// Deprecated name of `map`, still honored with a warning.
    pub diffuse_map: Option<String>,
    /// Alpha multiplier (`f32`).
    pub opacity: Option<NodeId>,
    pub alpha_test: Option<AlphaTest>,
    /// Added after lighting (`vec3`).
    pub emissive: Option<NodeId>,
    pub lighting: LightingModel,
    pub lights: Vec<Light>,
    pub side: Side,
    pub tone_mapping: ToneMapping,
    /// Exposure (`f32`) applied by the tone mapper.
    pub exposure: Option<NodeId>,
    pub output_color_space: ColorSpace,
}

impl MaterialDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, color: NodeId) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_map(mut self, texture: &str) -> Self {
        self.map = Some(texture.to_string());
        self
    }

    pub fn with_opacity(mut self, opacity: NodeId) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_alpha_test(mut self, test: AlphaTest) -> Self {
        self.alpha_test = Some(test);
        self
    }

    pub fn with_normal(mut self, normal: NormalSlot) -> Self {
        self.normal = normal;
        self
    }

    pub fn with_lighting(mut self, lighting: LightingModel) -> Self {
        self.lighting = lighting;
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.lights.push(light);
        self
    }

    pub fn with_emissive(mut self, emissive: NodeId) -> Self {
        self.emissive = Some(emissive);
        self
    }

    pub fn with_tone_mapping(mut self, mapping: ToneMapping, exposure: Option<NodeId>) -> Self {
        self.tone_mapping = mapping;
        self.exposure = exposure;
        self
    }

    pub fn with_output_color_space(mut self, space: ColorSpace) -> Self {
        self.output_color_space = space;
        self
    }

    /// Lit materials need surface position and normal in the fragment stage.
    pub fn is_lit(&self) -> bool {
        self.lighting != LightingModel::Unlit
    }
}
