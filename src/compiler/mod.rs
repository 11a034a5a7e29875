//! Node graph to WGSL compiler.
//!
//! This module is organized into several submodules:
//! - `types`: Type system (type names, promotion, swizzles)
//! - `utils`: Literal formatting and snippet conversions
//! - `context`: Build context, phases and flow blocks
//! - `node_compiler`: Per-kind type resolution and code generation
//! - `wgsl`: WGSL backend and module assembly
//! - `validation`: WGSL validation using naga
//!
//! The main entry point is [`ShaderCompiler`].

pub mod context;
pub mod node_compiler;
pub mod types;
pub mod utils;
pub mod validation;
pub mod wgsl;

use tracing::{debug, info, warn};

pub use context::{
    BuildContext, BuildStage, CompiledProgram, ShaderStage, StageRoots, UniformRegistry,
};
pub use types::{BinaryOp, Scalar, ShaderType, StructId};
pub use validation::{validate_wgsl, validate_wgsl_with_context};
pub use wgsl::{ShaderBackend, ShaderBundle, WgslBackend};

use crate::error::{CompileError, ConfigurationWarning, Result};
use crate::graph::NodeGraph;
use crate::options::CompilerOptions;

/// Compiles graphs into WGSL. Uniform binding names are remembered for the
/// compiler's lifetime, so every material it builds agrees on them.
#[derive(Debug, Default)]
pub struct ShaderCompiler {
    options: CompilerOptions,
    backend: WgslBackend,
    registry: UniformRegistry,
}

impl ShaderCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            backend: WgslBackend,
            registry: UniformRegistry::new(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn registry(&self) -> &UniformRegistry {
        &self.registry
    }

    /// Run setup, analyze and generate over every stage in `roots`.
    pub fn compile(&mut self, graph: &NodeGraph, roots: &StageRoots) -> Result<CompiledProgram> {
        self.compile_with_warnings(graph, roots, Vec::new())
    }

    /// Like [`Self::compile`], carrying warnings raised while the graph was
    /// assembled so they come back with the program.
    pub fn compile_with_warnings(
        &mut self,
        graph: &NodeGraph,
        roots: &StageRoots,
        warnings: Vec<ConfigurationWarning>,
    ) -> Result<CompiledProgram> {
        for warning in &warnings {
            warn!(slot = %warning.slot, "{}", warning.message);
        }
        debug!(nodes = graph.len(), "compiling graph");
        let program = BuildContext::new(graph, &self.options, &self.backend, &mut self.registry)
            .with_warnings(warnings)
            .compile(roots)?;
        info!(
            uniforms = program.uniforms.len(),
            textures = program.textures.len(),
            varyings = program.varyings.len(),
            functions = program.functions.len(),
            "compiled graph"
        );
        Ok(program)
    }

    /// Compile and assemble into WGSL source.
    pub fn compile_bundle(&mut self, graph: &NodeGraph, roots: &StageRoots) -> Result<ShaderBundle> {
        let program = self.compile(graph, roots)?;
        self.assemble(&program)
    }

    /// Assemble a compiled program, validating it with naga when
    /// `validate_output` is set.
    pub fn assemble(&self, program: &CompiledProgram) -> Result<ShaderBundle> {
        let bundle = self.backend.assemble(program, &self.options)?;
        if self.options.validate_output {
            validate_wgsl(&bundle.module).map_err(|e| CompileError::Validation(format!("{e:#}")))?;
            debug!("generated module passed validation");
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UniformGroup;

    #[test]
    fn registry_outlives_a_single_build() {
        let mut compiler = ShaderCompiler::default();
        let mut g = NodeGraph::new();
        let pos = g.vec4(0.0, 0.0, 0.0, 1.0);
        let color = g.uniform("color", ShaderType::VEC4, UniformGroup::Object);
        let first = compiler.compile(&g, &StageRoots::render(pos, color)).unwrap();
        let second = compiler.compile(&g, &StageRoots::render(pos, color)).unwrap();
        assert_eq!(first.uniforms[0].name, "u_color");
        assert_eq!(second.uniforms[0].name, "u_color");
        assert_eq!(compiler.registry().len(), 1);
    }

    #[test]
    fn distinct_uniforms_with_one_name_get_suffixes() {
        let mut compiler = ShaderCompiler::default();
        let mut g = NodeGraph::new();
        let pos = g.vec4(0.0, 0.0, 0.0, 1.0);
        let a = g.uniform("tint", ShaderType::VEC4, UniformGroup::Object);
        let b = g.uniform("tint", ShaderType::VEC4, UniformGroup::Render);
        let sum = g.add(a, b);
        let program = compiler.compile(&g, &StageRoots::render(pos, sum)).unwrap();
        let names: Vec<&str> = program.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["u_tint", "u_tint_1"]);
    }

    #[test]
    fn validation_failures_are_reported() {
        let options = CompilerOptions::default().with_validation(true);
        let mut compiler = ShaderCompiler::new(options);
        let mut g = NodeGraph::new();
        let pos = g.vec4(0.0, 0.0, 0.0, 1.0);
        let bad = g.expression("not_a_function(1.0)", ShaderType::VEC4, &[]);
        let err = compiler.compile_bundle(&g, &StageRoots::render(pos, bad)).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)), "{err}");
    }
}
