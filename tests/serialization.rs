use node_forge_shader_graph::compiler::ShaderType;
use node_forge_shader_graph::dsl::{self, GraphDSL};
use node_forge_shader_graph::graph::{MathFn, UniformGroup};
use node_forge_shader_graph::{DedupePolicy, NodeGraph, ShaderCompiler, StageRoots};

fn lit_graph() -> (NodeGraph, StageRoots) {
    let mut g = NodeGraph::new();
    let position = g.attribute("position", ShaderType::VEC3);
    let clip = g.convert(position, ShaderType::VEC4);
    let tint = g.uniform("tint", ShaderType::VEC3, UniformGroup::Object);
    let normal = g.attribute("normal", ShaderType::VEC3);
    let n = g.normalize(normal);
    let light = g.vec3(0.0, 1.0, 0.0);
    let d = g.dot(n, light);
    let zero = g.float(0.0);
    let d = g.max(d, zero);
    let shaded = g.mul(tint, d);
    // Read twice, so it is hoisted.
    let glow = g.math(MathFn::Sin, &[d]);
    let lit = g.add(shaded, glow);
    let one = g.float(1.0);
    let color = g.join(&[lit, one]);
    g.set_label(color, "output");
    g.set_sharing(zero, DedupePolicy::Identity);
    (g, StageRoots::render(clip, color))
}

#[test]
fn json_round_trip_compiles_to_the_same_module() {
    let (graph, roots) = lit_graph();
    let expected = ShaderCompiler::default().compile_bundle(&graph, &roots).unwrap();

    let text = dsl::graph_to_json(&graph, &roots).unwrap();
    let (restored, restored_roots) = dsl::graph_from_json(&text).unwrap();
    assert_eq!(restored.len(), graph.len());
    let actual = ShaderCompiler::default()
        .compile_bundle(&restored, &restored_roots)
        .unwrap();
    assert_eq!(actual.module, expected.module);

    // Writing the restored graph again gives the same document.
    assert_eq!(dsl::graph_to_json(&restored, &restored_roots).unwrap(), text);
}

#[test]
fn records_keep_labels_and_sharing() {
    let (graph, roots) = lit_graph();
    let doc = dsl::graph_to_dsl(&graph, &roots);
    assert!(doc.nodes.iter().any(|n| n.label.as_deref() == Some("output")));
    assert_eq!(
        doc.nodes
            .iter()
            .filter(|n| n.sharing == Some(DedupePolicy::Identity))
            .count(),
        1
    );

    let value: serde_json::Value = serde_json::to_value(&doc).unwrap();
    let first = &value["nodes"][0];
    assert!(first.get("inputNodes").is_some(), "{first}");
    assert!(first.get("type").is_some(), "{first}");
}

#[test]
fn treeshaking_drops_only_unreachable_records() {
    let (mut graph, roots) = lit_graph();
    let stray = graph.float(42.0);
    let _stray_parent = graph.negate(stray);

    let doc = dsl::graph_to_dsl(&graph, &roots);
    let shaken = dsl::treeshake_unreachable(&doc);
    assert_eq!(shaken.nodes.len(), doc.nodes.len() - 2);

    let before = ShaderCompiler::default().compile_bundle(&graph, &roots).unwrap();
    let (restored, restored_roots) = dsl::graph_from_dsl(&shaken).unwrap();
    let after = ShaderCompiler::default()
        .compile_bundle(&restored, &restored_roots)
        .unwrap();
    assert_eq!(after.module, before.module);
}

#[test]
fn documents_from_disk_parse_as_records() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/cases/wgsl_generation/discard_branch.json");
    let text = std::fs::read_to_string(path).unwrap();
    let doc: GraphDSL = serde_json::from_str(&text).unwrap();
    assert!(doc.roots.fragment.is_some());
    assert_eq!(dsl::treeshake_unreachable(&doc).nodes.len(), doc.nodes.len());
}
