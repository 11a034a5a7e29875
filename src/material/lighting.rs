//! Lighting models. Each light adds graph nodes to a [`ReflectedLight`]
//! accumulator; the sum of its terms is the outgoing light of the surface.

use crate::compiler::types::{BinaryOp, ShaderType};
use crate::graph::{MathFn, NodeGraph, NodeId};

use super::slots::{Light, LightingModel};

/// Fragment-stage surface values shared by every light.
#[derive(Clone, Copy, Debug)]
pub struct Surface {
    /// Normalized world-space normal.
    pub normal: NodeId,
    /// World-space position.
    pub position: NodeId,
    /// Normalized direction toward the camera.
    pub view_dir: NodeId,
    /// Diffuse reflectance (`vec3`).
    pub diffuse: NodeId,
}

/// Direct and indirect contributions, kept apart until the end so the
/// terms stay inspectable.
#[derive(Clone, Debug, Default)]
pub struct ReflectedLight {
    pub direct_diffuse: Vec<NodeId>,
    pub direct_specular: Vec<NodeId>,
    pub indirect_diffuse: Vec<NodeId>,
    pub indirect_specular: Vec<NodeId>,
}

impl ReflectedLight {
    pub fn is_empty(&self) -> bool {
        self.direct_diffuse.is_empty()
            && self.direct_specular.is_empty()
            && self.indirect_diffuse.is_empty()
            && self.indirect_specular.is_empty()
    }

    /// Sum of every term; black when nothing contributed.
    pub fn total(&self, g: &mut NodeGraph) -> NodeId {
        let terms: Vec<NodeId> = self
            .direct_diffuse
            .iter()
            .chain(&self.indirect_diffuse)
            .chain(&self.direct_specular)
            .chain(&self.indirect_specular)
            .copied()
            .collect();
        match g.fold(BinaryOp::Add, &terms) {
            Some(sum) => sum,
            None => g.vec3(0.0, 0.0, 0.0),
        }
    }
}

/// Specular highlight shared by every light of a Phong material.
fn blinn_phong_function(g: &mut NodeGraph) -> NodeId {
    g.function(
        "blinnPhong",
        &[
            ("normal", Some(ShaderType::VEC3)),
            ("lightDir", Some(ShaderType::VEC3)),
            ("viewDir", Some(ShaderType::VEC3)),
            ("shininess", Some(ShaderType::FLOAT)),
        ],
        Some(ShaderType::FLOAT),
        |g, p| {
            let half = g.add(p[1], p[2]);
            let half = g.normalize(half);
            let n_dot_h = g.dot(p[0], half);
            let n_dot_h = g.math(MathFn::Saturate, &[n_dot_h]);
            g.pow(n_dot_h, p[3])
        },
    )
}

/// Direction toward the light and its color at the surface.
fn incident(g: &mut NodeGraph, light: &Light, surface: &Surface) -> Option<(NodeId, NodeId)> {
    match light {
        Light::Ambient { .. } => None,
        Light::Directional { color, direction } => Some((g.normalize(*direction), *color)),
        Light::Point {
            color,
            position,
            range,
        } => {
            let to_light = g.sub(*position, surface.position);
            let dist = g.length(to_light);
            let dir = g.normalize(to_light);
            let dist_sq = g.mul(dist, dist);
            let floor = g.float(0.01);
            let dist_sq = g.max(dist_sq, floor);
            let one = g.float(1.0);
            let mut falloff = g.div(one, dist_sq);
            if let Some(range) = range {
                // Smooth window reaching zero at the range.
                let q = g.div(dist, *range);
                let q2 = g.mul(q, q);
                let q4 = g.mul(q2, q2);
                let one = g.float(1.0);
                let w = g.sub(one, q4);
                let w = g.math(MathFn::Saturate, &[w]);
                let w2 = g.mul(w, w);
                falloff = g.mul(falloff, w2);
            }
            Some((dir, g.mul(*color, falloff)))
        }
    }
}

/// Accumulate `lights` under `model`. Unlit materials receive nothing.
pub fn accumulate(
    g: &mut NodeGraph,
    model: &LightingModel,
    lights: &[Light],
    surface: &Surface,
) -> ReflectedLight {
    let mut reflected = ReflectedLight::default();
    if *model == LightingModel::Unlit {
        return reflected;
    }

    let specular = match model {
        LightingModel::Phong {
            shininess,
            specular,
        } => {
            let shininess = shininess.unwrap_or_else(|| g.float(30.0));
            let color = specular.unwrap_or_else(|| g.vec3(0.0667, 0.0667, 0.0667));
            Some((blinn_phong_function(g), shininess, color))
        }
        _ => None,
    };

    for light in lights {
        if let Light::Ambient { color } = light {
            reflected.indirect_diffuse.push(g.mul(*color, surface.diffuse));
            continue;
        }
        let Some((dir, color)) = incident(g, light, surface) else {
            continue;
        };
        let n_dot_l = g.dot(surface.normal, dir);
        let n_dot_l = g.math(MathFn::Saturate, &[n_dot_l]);
        let irradiance = g.mul(color, n_dot_l);
        reflected
            .direct_diffuse
            .push(g.mul(irradiance, surface.diffuse));

        if let Some((function, shininess, spec_color)) = specular {
            let highlight = g.call(function, &[surface.normal, dir, surface.view_dir, shininess]);
            let tinted = g.mul(irradiance, spec_color);
            reflected.direct_specular.push(g.mul(tinted, highlight));
        }
    }
    reflected
}
