use std::path::{Path, PathBuf};

use node_forge_shader_graph::compiler::{ShaderType, validate_wgsl_with_context};
use node_forge_shader_graph::graph::{MathFn, UniformGroup};
use node_forge_shader_graph::{
    CompilerOptions, DedupePolicy, NodeGraph, ShaderBundle, ShaderCompiler, StageRoots, dsl,
};

fn case_dir(case_name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
        .join(case_name)
}

fn list_json_cases(dir: &Path) -> Vec<PathBuf> {
    let mut cases = Vec::new();
    let Ok(rd) = std::fs::read_dir(dir) else {
        return cases;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            cases.push(path);
        }
    }
    cases.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    cases
}

fn case_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("case")
        .to_string()
}

fn compile_case(name: &str) -> ShaderBundle {
    let path = case_dir("wgsl_generation").join(format!("{name}.json"));
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("case {name}: read failed: {e}"));
    let (graph, roots) =
        dsl::graph_from_json(&text).unwrap_or_else(|e| panic!("case {name}: {e:#}"));
    ShaderCompiler::default()
        .compile_bundle(&graph, &roots)
        .unwrap_or_else(|e| panic!("case {name}: compile failed: {e}"))
}

#[test]
fn dsl_json_compiles_to_valid_wgsl_modules() {
    let dir = case_dir("wgsl_generation");
    let json_cases = list_json_cases(&dir);
    assert!(
        !json_cases.is_empty(),
        "expected at least one *.json case in {}",
        dir.display()
    );

    for input_path in json_cases {
        let case_name = case_stem(&input_path);
        let bundle = compile_case(&case_name);
        validate_wgsl_with_context(&bundle.module, &case_name)
            .unwrap_or_else(|e| panic!("{e:#}"));
        for stage in [&bundle.vertex, &bundle.fragment, &bundle.compute]
            .into_iter()
            .flatten()
        {
            validate_wgsl_with_context(stage, &case_name).unwrap_or_else(|e| panic!("{e:#}"));
        }
    }
}

#[test]
fn diffuse_scenario_emits_in_dependency_order() {
    let bundle = compile_case("diffuse_uniform_texture");
    let fs = bundle.fragment.as_deref().unwrap();

    assert_eq!(fs.matches("var<uniform> u_tint").count(), 1, "{fs}");
    assert_eq!(fs.matches("textureSample(").count(), 1, "{fs}");
    let sample = fs.find("textureSample(t_map, s_map, in.v_uv)").unwrap();
    let combined = fs.find("(u_tint + (nodeSample0 * 0.5))").unwrap();
    assert!(sample < combined, "{fs}");
    assert_eq!(bundle.uniforms.len(), 1);
    assert_eq!(bundle.textures.len(), 1);
}

#[test]
fn discard_branch_is_a_real_if() {
    let bundle = compile_case("discard_branch");
    let fs = bundle.fragment.as_deref().unwrap();
    assert!(fs.contains("if ((in.v_uv.x < 0.5)) {"), "{fs}");
    assert!(fs.contains("discard;"), "{fs}");
    assert!(fs.contains("} else {"), "{fs}");
    assert!(!fs.contains("select("), "{fs}");
}

#[test]
fn compute_stage_reads_invocation_ids() {
    let bundle = compile_case("compute_accumulate");
    let cs = bundle.compute.as_deref().unwrap();
    assert!(cs.contains("@compute @workgroup_size(64, 1, 1)"), "{cs}");
    assert!(cs.contains("@builtin(global_invocation_id)"), "{cs}");
    assert!(cs.contains("for ("), "{cs}");
    assert!(bundle.vertex.is_none());
    assert!(bundle.fragment.is_none());
}

#[test]
fn attributes_read_in_fragment_become_one_varying() {
    let mut g = NodeGraph::new();
    let position = g.attribute("position", ShaderType::VEC3);
    let clip = g.convert(position, ShaderType::VEC4);
    let uv = g.attribute("uv", ShaderType::VEC2);
    let u = g.split(uv, "x");
    let v = g.split(uv, "y");
    let color = g.join(&[u, v, u, v]);
    let bundle = ShaderCompiler::default()
        .compile_bundle(&g, &StageRoots::render(clip, color))
        .unwrap();

    assert_eq!(bundle.varyings.len(), 1);
    assert_eq!(bundle.varyings[0].name, "v_uv");
    let vs = bundle.vertex.as_deref().unwrap();
    assert_eq!(vs.matches("out.v_uv = ").count(), 1, "{vs}");
    validate_wgsl_with_context(&bundle.module, "varying promotion").unwrap();
}

#[test]
fn equal_constants_share_under_content_dedupe() {
    let build = |policy: DedupePolicy| {
        let mut g = NodeGraph::new();
        let clip = g.vec4(0.0, 0.0, 0.0, 1.0);
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let one_a = g.float(1.0);
        let one_b = g.float(1.0);
        let a = g.add(x, one_a);
        let b = g.add(x, one_b);
        let a = g.math(MathFn::Sin, &[a]);
        let b = g.math(MathFn::Cos, &[b]);
        let sum = g.add(a, b);
        let color = g.convert(sum, ShaderType::VEC4);
        let options = CompilerOptions::default().with_dedupe(policy);
        ShaderCompiler::new(options)
            .compile_bundle(&g, &StageRoots::render(clip, color))
            .unwrap()
    };

    let content = build(DedupePolicy::Content);
    let fs = content.fragment.as_deref().unwrap();
    // One shared `(u_x + 1.0)`, hoisted and read twice.
    assert_eq!(fs.matches("(u_x + 1.0)").count(), 1, "{fs}");
    assert!(fs.contains("nodeVar0 = (u_x + 1.0);"), "{fs}");

    let identity = build(DedupePolicy::Identity);
    let fs = identity.fragment.as_deref().unwrap();
    assert_eq!(fs.matches("(u_x + 1.0)").count(), 2, "{fs}");
    assert!(!fs.contains("nodeVar"), "{fs}");
}

#[test]
fn unchanged_graphs_compile_byte_identically() {
    let a = compile_case("diffuse_uniform_texture");
    let b = compile_case("diffuse_uniform_texture");
    assert_eq!(a.module, b.module);
}
