//! The live shader of one material.

use tracing::{debug, warn};

use crate::compiler::{ShaderBundle, ShaderCompiler};
use crate::error::{CompileError, Result};
use crate::graph::NodeGraph;

use super::{CompiledMaterial, MaterialDescriptor};

/// Holds the last successfully compiled shader of a material. A failed
/// rebuild reports its error and leaves the previous program in place.
#[derive(Debug, Default)]
pub struct MaterialProgram {
    material: MaterialDescriptor,
    current: Option<CompiledMaterial>,
    version: u64,
    last_error: Option<CompileError>,
}

impl MaterialProgram {
    pub fn new(material: MaterialDescriptor) -> Self {
        Self {
            material,
            ..Self::default()
        }
    }

    pub fn material(&self) -> &MaterialDescriptor {
        &self.material
    }

    /// Replace the slots. Takes effect on the next [`Self::rebuild`].
    pub fn set_material(&mut self, material: MaterialDescriptor) {
        self.material = material;
    }

    /// Recompile against `graph`. Returns whether the generated module
    /// changed; `version` only advances when it did.
    pub fn rebuild(&mut self, compiler: &mut ShaderCompiler, graph: &NodeGraph) -> Result<bool> {
        match compiler.compile_material(graph, &self.material) {
            Ok(compiled) => {
                let changed = self
                    .current
                    .as_ref()
                    .is_none_or(|prev| prev.bundle.module != compiled.bundle.module);
                if changed {
                    self.version += 1;
                    debug!(version = self.version, "material program replaced");
                }
                self.current = Some(compiled);
                self.last_error = None;
                Ok(changed)
            }
            Err(e) => {
                warn!(error = %e, version = self.version, "material rebuild failed; keeping previous program");
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn compiled(&self) -> Option<&CompiledMaterial> {
        self.current.as_ref()
    }

    pub fn bundle(&self) -> Option<&ShaderBundle> {
        self.current.as_ref().map(|c| &c.bundle)
    }

    /// Number of distinct modules produced so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_error(&self) -> Option<&CompileError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::ShaderType;
    use crate::graph::UniformGroup;

    #[test]
    fn failed_rebuild_keeps_the_last_good_program() {
        let mut compiler = ShaderCompiler::default();
        let mut g = NodeGraph::new();
        let tint = g.uniform("tint", ShaderType::VEC3, UniformGroup::Object);
        let mut program = MaterialProgram::new(MaterialDescriptor::new().with_color(tint));
        assert!(program.rebuild(&mut compiler, &g).unwrap());
        let good = program.bundle().unwrap().module.clone();

        // A texture cannot be used as a color.
        let bad = g.uniform("bad", ShaderType::Texture2D, UniformGroup::Object);
        program.set_material(MaterialDescriptor::new().with_color(bad));
        assert!(program.rebuild(&mut compiler, &g).is_err());
        assert!(program.last_error().is_some());
        assert_eq!(program.bundle().unwrap().module, good);
        assert_eq!(program.version(), 1);
    }

    #[test]
    fn unchanged_rebuilds_keep_the_version() {
        let mut compiler = ShaderCompiler::default();
        let g = NodeGraph::new();
        let mut program = MaterialProgram::new(MaterialDescriptor::new());
        assert!(program.rebuild(&mut compiler, &g).unwrap());
        assert!(!program.rebuild(&mut compiler, &g).unwrap());
        assert_eq!(program.version(), 1);
    }
}
