//! WGSL backend.
//!
//! This module handles:
//! - the intrinsic table and access expressions the node compilers ask for
//! - helper function source text
//! - assembling a [`CompiledProgram`] into standalone stage modules

use std::fmt::Write as _;

use crate::compiler::context::{AttributeDecl, TextureDecl, UniformDecl, VaryingDecl};
use crate::compiler::context::{CompiledProgram, ShaderStage, StageCode, VarDecl};
use crate::compiler::types::{Scalar, ShaderType, StructDecl};
use crate::compiler::utils::{sanitize_wgsl_ident, wgsl_type};
use crate::error::{CompileError, Result};
use crate::graph::{Builtin, MathFn};
use crate::options::CompilerOptions;

/// How a math function is spelled in the target language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    /// `name(a, b, ...)`
    Call(&'static str),
    /// `(a op b)`
    Infix(&'static str),
    /// Expression with `{0}`, `{1}`, ... placeholders for the operands.
    Template(&'static str),
}

/// A generated helper function before it is rendered to text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSource {
    pub name: String,
    pub params: Vec<(String, ShaderType)>,
    pub return_ty: ShaderType,
    pub vars: Vec<VarDecl>,
    /// Body statements, already indented one level.
    pub flow: String,
    pub result: Option<String>,
    pub indent: String,
}

/// Assembled shader source for one compiled graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderBundle {
    /// Declarations shared between stages (structs, bindings, stage IO).
    pub common: String,
    /// A standalone vertex module (common + @vertex entry).
    pub vertex: Option<String>,
    /// A standalone fragment module (common + @fragment entry).
    pub fragment: Option<String>,
    /// A standalone compute module (common + @compute entry).
    pub compute: Option<String>,
    /// One module containing every emitted entry point.
    pub module: String,
    pub uniforms: Vec<UniformDecl>,
    pub textures: Vec<TextureDecl>,
    pub attributes: Vec<AttributeDecl>,
    pub varyings: Vec<VaryingDecl>,
}

/// Target-language specific parts of code generation.
///
/// The build context stays language agnostic; everything spelled in the
/// output language goes through this trait.
pub trait ShaderBackend {
    fn name(&self) -> &'static str;

    /// Expression reading the uniform bound as `name`.
    fn uniform_access(&self, name: &str, ty: ShaderType) -> String;

    /// Expression reading vertex attribute `name` in the vertex stage.
    fn attribute_access(&self, name: &str) -> String;

    /// Fragment-side read of varying `name`.
    fn varying_read(&self, name: &str) -> String;

    /// Vertex-side assignment target of varying `name`.
    fn varying_write(&self, name: &str) -> String;

    fn builtin_access(&self, builtin: Builtin, stage: ShaderStage) -> Result<String>;

    fn intrinsic(&self, method: MathFn, operand: ShaderType, stage: ShaderStage) -> Result<Intrinsic>;

    fn type_name(&self, ty: ShaderType, structs: &[StructDecl]) -> Result<String>;

    fn function_code(&self, source: &FunctionSource, structs: &[StructDecl]) -> Result<String>;

    fn assemble(&self, program: &CompiledProgram, options: &CompilerOptions) -> Result<ShaderBundle>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WgslBackend;

/// WGSL has no bool uniforms; they travel as `u32` (or `vecNu`).
fn uniform_storage_type(ty: ShaderType) -> ShaderType {
    match ty.scalar() {
        Some(Scalar::Bool) if !ty.is_matrix() => ty.with_scalar(Scalar::Uint),
        _ => ty,
    }
}

fn builtin_name(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::VertexIndex => "vertex_index",
        Builtin::InstanceIndex => "instance_index",
        Builtin::FragCoord => "position",
        Builtin::FrontFacing => "front_facing",
        Builtin::GlobalInvocationId => "global_invocation_id",
        Builtin::LocalInvocationId => "local_invocation_id",
        Builtin::WorkgroupId => "workgroup_id",
    }
}

fn compute_builtin_var(builtin: Builtin) -> Option<&'static str> {
    match builtin {
        Builtin::GlobalInvocationId => Some("global_id"),
        Builtin::LocalInvocationId => Some("local_id"),
        Builtin::WorkgroupId => Some("workgroup_id"),
        _ => None,
    }
}

impl ShaderBackend for WgslBackend {
    fn name(&self) -> &'static str {
        "wgsl"
    }

    fn uniform_access(&self, name: &str, ty: ShaderType) -> String {
        match ty {
            ShaderType::Scalar(Scalar::Bool) => format!("({name} != 0u)"),
            ShaderType::Vector(Scalar::Bool, n) => format!("({name} != vec{n}u(0u))"),
            _ => name.to_string(),
        }
    }

    fn attribute_access(&self, name: &str) -> String {
        format!("vin.{name}")
    }

    fn varying_read(&self, name: &str) -> String {
        format!("in.{name}")
    }

    fn varying_write(&self, name: &str) -> String {
        format!("out.{name}")
    }

    fn builtin_access(&self, builtin: Builtin, stage: ShaderStage) -> Result<String> {
        let access = match (builtin, stage) {
            (Builtin::VertexIndex | Builtin::InstanceIndex, ShaderStage::Vertex) => {
                Some(format!("vin.{}", builtin_name(builtin)))
            }
            (Builtin::FragCoord, ShaderStage::Fragment) => Some("in.position".to_string()),
            (Builtin::FrontFacing, ShaderStage::Fragment) => Some("front_facing".to_string()),
            (_, ShaderStage::Compute) => compute_builtin_var(builtin).map(str::to_string),
            _ => None,
        };
        access.ok_or_else(|| {
            CompileError::unsupported(format!(
                "builtin {} in a {} stage",
                builtin_name(builtin),
                stage.name()
            ))
        })
    }

    fn intrinsic(&self, method: MathFn, operand: ShaderType, stage: ShaderStage) -> Result<Intrinsic> {
        use Intrinsic::{Call, Infix, Template};
        use MathFn::*;
        let scalar = operand.length() == 1 && !operand.is_matrix();
        let float = operand.scalar() == Some(Scalar::Float);
        Ok(match method {
            Radians => Call("radians"),
            Degrees => Call("degrees"),
            Exp => Call("exp"),
            Exp2 => Call("exp2"),
            Log => Call("log"),
            Log2 => Call("log2"),
            Sqrt => Call("sqrt"),
            InverseSqrt => Call("inverseSqrt"),
            Floor => Call("floor"),
            Ceil => Call("ceil"),
            Fract => Call("fract"),
            Round => Call("round"),
            Trunc => Call("trunc"),
            Normalize if scalar => Template("sign({0})"),
            Normalize => Call("normalize"),
            Sin => Call("sin"),
            Cos => Call("cos"),
            Tan => Call("tan"),
            Asin => Call("asin"),
            Acos => Call("acos"),
            Atan => Call("atan"),
            Saturate => Call("saturate"),
            Negate => Template("(-{0})"),
            OneMinus => Template("(1.0 - {0})"),
            Abs => Call("abs"),
            Sign => Call("sign"),
            Dfdx | Dfdy | Fwidth if stage != ShaderStage::Fragment => {
                return Err(CompileError::unsupported(format!(
                    "{} outside a fragment stage",
                    method.name()
                )));
            }
            Dfdx => Call("dpdx"),
            Dfdy => Call("dpdy"),
            Fwidth => Call("fwidth"),
            Transpose => Call("transpose"),
            Inverse => return Err(CompileError::unsupported("matrix inverse")),
            Determinant => Call("determinant"),
            Length if scalar => Call("abs"),
            Length => Call("length"),
            LengthSq if scalar => Template("({0} * {0})"),
            LengthSq => Template("dot({0}, {0})"),
            Distance if scalar => Template("abs({0} - {1})"),
            Distance => Call("distance"),
            Dot if scalar => Template("({0} * {1})"),
            Dot => Call("dot"),
            Min => Call("min"),
            Max => Call("max"),
            Mod if float => Template("({0} - {1} * floor({0} / {1}))"),
            Mod => Infix("%"),
            Step => Call("step"),
            Pow => Call("pow"),
            Atan2 => Call("atan2"),
            Reflect => Call("reflect"),
            Cross => Call("cross"),
            Clamp => Call("clamp"),
            Mix => Call("mix"),
            Smoothstep => Call("smoothstep"),
            Refract => Call("refract"),
            FaceForward => Call("faceForward"),
        })
    }

    fn type_name(&self, ty: ShaderType, structs: &[StructDecl]) -> Result<String> {
        match ty {
            ShaderType::Struct(id) => structs
                .get(id.0 as usize)
                .map(|s| sanitize_wgsl_ident(&s.name))
                .ok_or_else(|| CompileError::type_resolution(format!("unknown struct #{}", id.0))),
            other => Ok(wgsl_type(other)),
        }
    }

    fn function_code(&self, source: &FunctionSource, structs: &[StructDecl]) -> Result<String> {
        let indent = &source.indent;
        let mut params = Vec::with_capacity(source.params.len());
        for (name, ty) in &source.params {
            params.push(format!("{name}: {}", self.type_name(*ty, structs)?));
        }
        let mut code = format!("fn {}({})", source.name, params.join(", "));
        if source.return_ty != ShaderType::Void {
            let _ = write!(code, " -> {}", self.type_name(source.return_ty, structs)?);
        }
        code.push_str(" {\n");
        for var in &source.vars {
            let _ = writeln!(code, "{indent}var {}: {};", var.name, self.type_name(var.ty, structs)?);
        }
        code.push_str(&source.flow);
        if let Some(result) = &source.result {
            let _ = writeln!(code, "{indent}return {result};");
        }
        code.push_str("}\n");
        Ok(code)
    }

    fn assemble(&self, program: &CompiledProgram, options: &CompilerOptions) -> Result<ShaderBundle> {
        let structs = &program.structs;
        let indent = options.indent.as_str();
        let mut common = String::new();

        for decl in structs {
            let _ = writeln!(common, "struct {} {{", sanitize_wgsl_ident(&decl.name));
            for member in &decl.members {
                let _ = writeln!(common, "{indent}{}: {},", member.name, self.type_name(member.ty, structs)?);
            }
            common.push_str("};\n\n");
        }

        for uniform in &program.uniforms {
            let ty = self.type_name(uniform_storage_type(uniform.ty), structs)?;
            let _ = writeln!(
                common,
                "@group(0) @binding({})\nvar<uniform> {}: {ty};\n",
                uniform.binding, uniform.name
            );
        }

        for texture in &program.textures {
            let _ = writeln!(
                common,
                "@group(1) @binding({})\nvar {}: texture_2d<f32>;\n",
                texture.binding, texture.texture
            );
            let _ = writeln!(
                common,
                "@group(1) @binding({})\nvar {}: sampler;\n",
                texture.binding + 1,
                texture.sampler
            );
        }

        if program.vertex.is_some() {
            common.push_str("struct VertexInput {\n");
            let _ = writeln!(common, "{indent}@builtin(vertex_index) vertex_index: u32,");
            let _ = writeln!(common, "{indent}@builtin(instance_index) instance_index: u32,");
            for attribute in &program.attributes {
                let _ = writeln!(
                    common,
                    "{indent}@location({}) {}: {},",
                    attribute.location,
                    attribute.name,
                    wgsl_type(attribute.ty)
                );
            }
            common.push_str("};\n\n");

            common.push_str("struct VertexOutput {\n");
            let _ = writeln!(common, "{indent}@builtin(position) position: vec4f,");
            for varying in &program.varyings {
                let flat = if varying.ty.scalar().is_some_and(Scalar::is_integer) {
                    " @interpolate(flat)"
                } else {
                    ""
                };
                let _ = writeln!(
                    common,
                    "{indent}@location({}){flat} {}: {},",
                    varying.location,
                    varying.name,
                    wgsl_type(varying.ty)
                );
            }
            common.push_str("};\n\n");
        }

        let stage_functions = |stage: &StageCode| -> String {
            stage
                .functions
                .iter()
                .filter_map(|name| program.functions.iter().find(|f| &f.name == name))
                .map(|f| format!("{}\n", f.code))
                .collect()
        };

        let vertex_entry = match &program.vertex {
            Some(stage) => Some(format!(
                "{}{}",
                stage_functions(stage),
                self.vertex_entry(stage, structs, indent)?
            )),
            None => None,
        };
        let fragment_entry = match &program.fragment {
            Some(stage) => Some(format!(
                "{}{}",
                stage_functions(stage),
                self.fragment_entry(stage, structs, indent)?
            )),
            None => None,
        };
        let compute_entry = match &program.compute {
            Some(stage) => Some(format!(
                "{}{}",
                stage_functions(stage),
                self.compute_entry(stage, structs, indent, options.workgroup_size)?
            )),
            None => None,
        };

        let with_common = |entry: &Option<String>| entry.as_ref().map(|e| format!("{common}{e}"));
        let mut module = common.clone();
        for entry in [&vertex_entry, &fragment_entry, &compute_entry].into_iter().flatten() {
            module.push_str(entry);
        }

        Ok(ShaderBundle {
            vertex: with_common(&vertex_entry),
            fragment: with_common(&fragment_entry),
            compute: with_common(&compute_entry),
            common,
            module,
            uniforms: program.uniforms.clone(),
            textures: program.textures.clone(),
            attributes: program.attributes.clone(),
            varyings: program.varyings.clone(),
        })
    }
}

impl WgslBackend {
    fn var_decls(&self, stage: &StageCode, structs: &[StructDecl], indent: &str) -> Result<String> {
        let mut out = String::new();
        for var in &stage.vars {
            let _ = writeln!(out, "{indent}var {}: {};", var.name, self.type_name(var.ty, structs)?);
        }
        Ok(out)
    }

    // Stage inputs are mirrored into module-scope privates so helper
    // functions can read them too.
    fn vertex_entry(&self, stage: &StageCode, structs: &[StructDecl], indent: &str) -> Result<String> {
        let mut out = String::from("var<private> vin: VertexInput;\n\n@vertex\nfn vs_main(input: VertexInput) -> VertexOutput {\n");
        let _ = writeln!(out, "{indent}vin = input;");
        let _ = writeln!(out, "{indent}var out: VertexOutput;");
        out.push_str(&self.var_decls(stage, structs, indent)?);
        out.push_str(&stage.flow);
        if let Some(result) = &stage.result {
            let _ = writeln!(out, "{indent}out.position = {result};");
        }
        let _ = writeln!(out, "{indent}return out;");
        out.push_str("}\n\n");
        Ok(out)
    }

    fn fragment_entry(&self, stage: &StageCode, structs: &[StructDecl], indent: &str) -> Result<String> {
        let front_facing = stage.builtins.contains(&Builtin::FrontFacing);
        let mut out = String::from("var<private> in: VertexOutput;\n\n");
        if front_facing {
            out.push_str("var<private> front_facing: bool;\n\n");
        }
        out.push_str("@fragment\nfn fs_main(input: VertexOutput");
        if front_facing {
            out.push_str(", @builtin(front_facing) is_front: bool");
        }
        out.push_str(") -> @location(0) vec4f {\n");
        let _ = writeln!(out, "{indent}in = input;");
        if front_facing {
            let _ = writeln!(out, "{indent}front_facing = is_front;");
        }
        out.push_str(&self.var_decls(stage, structs, indent)?);
        out.push_str(&stage.flow);
        let result = stage.result.as_deref().unwrap_or("vec4f(0.0, 0.0, 0.0, 1.0)");
        let _ = writeln!(out, "{indent}return {result};");
        out.push_str("}\n\n");
        Ok(out)
    }

    fn compute_entry(
        &self,
        stage: &StageCode,
        structs: &[StructDecl],
        indent: &str,
        workgroup_size: [u32; 3],
    ) -> Result<String> {
        let used: Vec<(Builtin, &str)> = stage
            .builtins
            .iter()
            .filter_map(|b| compute_builtin_var(*b).map(|var| (*b, var)))
            .collect();
        let mut out = String::new();
        for (_, var) in &used {
            let _ = writeln!(out, "var<private> {var}: vec3u;\n");
        }
        let [x, y, z] = workgroup_size;
        let params: Vec<String> = used
            .iter()
            .map(|(b, var)| format!("@builtin({}) {var}_in: vec3u", builtin_name(*b)))
            .collect();
        let _ = writeln!(out, "@compute @workgroup_size({x}, {y}, {z})");
        let _ = writeln!(out, "fn cs_main({}) {{", params.join(", "));
        for (_, var) in &used {
            let _ = writeln!(out, "{indent}{var} = {var}_in;");
        }
        out.push_str(&self.var_decls(stage, structs, indent)?);
        out.push_str(&stage.flow);
        out.push_str("}\n\n");
        Ok(out)
    }
}
