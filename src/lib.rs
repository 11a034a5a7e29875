//! Compiles typed node graphs into WGSL shader modules.
//!
//! A [`graph::NodeGraph`] describes the computation; [`ShaderCompiler`]
//! runs setup, analyze and generate over it and hands the per-stage code to
//! the WGSL backend. [`material`] wires graph fragments into complete
//! vertex/fragment programs.

pub mod compiler;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod logging;
pub mod material;
pub mod options;
pub mod update;

pub use compiler::{CompiledProgram, ShaderBundle, ShaderCompiler, ShaderStage, StageRoots};
pub use error::{CompileError, ConfigurationWarning, Result};
pub use graph::{NodeGraph, NodeId, NodeKind};
pub use material::{CompiledMaterial, MaterialDescriptor, MaterialProgram};
pub use options::{CompilerOptions, DedupePolicy};
pub use update::{NodeFrame, UniformValue};
