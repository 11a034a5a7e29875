use node_forge_shader_graph::compiler::types::{binary_result_type, can_convert, common_type};
use node_forge_shader_graph::compiler::utils::fmt_f32;
use node_forge_shader_graph::compiler::{BinaryOp, Scalar, ShaderType};
use node_forge_shader_graph::graph::UniformGroup;
use node_forge_shader_graph::{NodeGraph, ShaderCompiler, StageRoots};
use proptest::prelude::*;

fn numeric_scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![Just(Scalar::Int), Just(Scalar::Uint), Just(Scalar::Float)]
}

fn numeric_value_type() -> impl Strategy<Value = ShaderType> {
    (numeric_scalar(), 1_u8..=4).prop_map(|(scalar, len)| {
        if len == 1 {
            ShaderType::Scalar(scalar)
        } else {
            ShaderType::Vector(scalar, len)
        }
    })
}

fn arithmetic() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Div),
    ]
}

proptest! {
    #[test]
    fn common_type_is_symmetric(a in numeric_value_type(), b in numeric_value_type()) {
        prop_assert_eq!(common_type(a, b).unwrap(), common_type(b, a).unwrap());
    }

    #[test]
    fn arithmetic_results_accept_both_operands(
        op in arithmetic(),
        a in numeric_value_type(),
        b in numeric_value_type(),
    ) {
        let result = binary_result_type(op, a, b).unwrap();
        prop_assert_eq!(result.length(), a.length().max(b.length()));
        // Every operand reaches the result type by widening alone, unless
        // the kinds are mixed integers (uint wins over int by rank).
        if !(a.scalar() == Some(Scalar::Int) && result.scalar() == Some(Scalar::Uint)) {
            prop_assert!(can_convert(a, result), "{a} -> {result}");
        }
        if !(b.scalar() == Some(Scalar::Int) && result.scalar() == Some(Scalar::Uint)) {
            prop_assert!(can_convert(b, result), "{b} -> {result}");
        }
    }

    #[test]
    fn comparisons_produce_booleans(a in numeric_value_type(), b in numeric_value_type()) {
        let result = binary_result_type(BinaryOp::Less, a, b).unwrap();
        prop_assert_eq!(result.scalar(), Some(Scalar::Bool));
        prop_assert_eq!(result.length(), a.length().max(b.length()));
    }

    #[test]
    fn float_literals_round_trip(v in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
        let text = fmt_f32(v);
        prop_assert!(text.contains('.'), "{text}");
        prop_assert_eq!(text.parse::<f32>().unwrap(), v);
    }

    #[test]
    fn random_chains_compile_deterministically(
        values in prop::collection::vec(-100.0_f32..100.0, 1..8),
        ops in prop::collection::vec(arithmetic(), 7),
    ) {
        let build = || {
            let mut g = NodeGraph::new();
            let clip = g.vec4(0.0, 0.0, 0.0, 1.0);
            let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
            let mut acc = x;
            for (v, op) in values.iter().zip(ops.iter()) {
                let c = g.float(*v);
                acc = g.op(*op, acc, c);
            }
            let color = g.convert(acc, ShaderType::VEC4);
            (g, StageRoots::render(clip, color))
        };

        let (g1, roots1) = build();
        let (g2, roots2) = build();
        let a = ShaderCompiler::default().compile_bundle(&g1, &roots1).unwrap();
        let b = ShaderCompiler::default().compile_bundle(&g2, &roots2).unwrap();
        prop_assert_eq!(&a.module, &b.module);
        prop_assert_eq!(a.module.matches("var<uniform> u_x").count(), 1);
    }
}
