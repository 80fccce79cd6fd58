use crate::error::ElabError;
use crate::fabric::input::{build_input_interconnect, InputIcParams};
use crate::fabric::merge::{build_merge_busses, MergeParams};
use crate::fabric::output_ps::{build_output_ps_interconnect, OutputPsParams, PsLoad};
use crate::fabric::weight::{build_weight_interconnect, WeightIcParams};
use crate::graph::eval::eval_module;
use crate::graph::{Module, Source};
use crate::spec::projection::{Factor, Preload, Projection, Dtype};

fn outputs(m: &Module, prefix: &str, count: u64, ins: &[(&str, u128)]) -> Vec<u128> {
    let values = eval_module(m, ins);
    (0..count)
        .map(|i| values[&format!("{}_{}", prefix, i)])
        .collect()
}

#[test]
fn merge_busses_packing() {
    // (in_width, num_ins, out_width, num_outs, ins_per_out?) with inputs
    // 0..num_ins; expected packed outputs.
    let vectors: Vec<(MergeParams, Vec<u128>)> = vec![
        (MergeParams::new(2, 4, 4, 4, Some(1)), vec![0, 1, 2, 3]),
        (MergeParams::new(2, 4, 5, 2, Some(2)), vec![4, 14]),
        (
            MergeParams::new(3, 8, 23, 4, Some(6)),
            vec![181896, 62, 0, 0],
        ),
        (MergeParams::new(2, 4, 4, 4, None), vec![4, 14, 0, 0]),
        (MergeParams::new(2, 4, 5, 2, None), vec![4, 14]),
        (MergeParams::new(3, 8, 23, 4, None), vec![1754760, 7, 0, 0]),
    ];
    for (params, expected) in vectors {
        let m = build_merge_busses(&params).unwrap();
        let names: Vec<String> = (0..params.num_ins).map(|i| format!("input_{}", i)).collect();
        let ins: Vec<(&str, u128)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i as u128))
            .collect();
        assert_eq!(outputs(&m, "output", params.num_outs, &ins), expected);
    }
}

#[test]
fn merge_busses_rejects_overpacked_words() {
    // Three 2-bit lanes cannot fit a 5-bit word.
    assert!(matches!(
        build_merge_busses(&MergeParams::new(2, 4, 5, 8, Some(3))),
        Err(ElabError::StreamWidthMismatch { .. })
    ));
    assert!(matches!(
        build_merge_busses(&MergeParams::new(8, 2, 6, 2, None)),
        Err(ElabError::BufferTooNarrow { .. })
    ));
}

#[test]
fn merge_busses_round_trip() {
    // Slicing the packed words back at the lane stride recovers the lanes.
    let params = MergeParams::new(4, 6, 16, 2, None);
    let m = build_merge_busses(&params).unwrap();
    let lanes: Vec<u128> = vec![9, 4, 7, 1, 15, 2];
    let names: Vec<String> = (0..6).map(|i| format!("input_{}", i)).collect();
    let ins: Vec<(&str, u128)> = names
        .iter()
        .zip(&lanes)
        .map(|(n, v)| (n.as_str(), *v))
        .collect();
    let outs = outputs(&m, "output", 2, &ins);
    for (i, lane) in lanes.iter().enumerate() {
        let word = outs[i / 4];
        assert_eq!((word >> (4 * (i % 4))) & 0xf, *lane);
    }
}

#[test]
fn weight_interconnect_streaming() {
    // Buffers hold two 3-bit sections each; positions differing only in UB
    // read the same section.
    let cases = [
        (
            Projection::simple(1, 2, 2, 2, 1),
            10,
            vec![0u128, 1, 2, 3, 0, 1, 2, 3, 0, 0],
        ),
        (
            Projection::simple(2, 1, 3, 1, 2),
            15,
            vec![0, 1, 0, 1, 0, 1, 2, 3, 2, 3, 2, 3, 0, 0, 0],
        ),
    ];
    for (proj, num_mlbs, expected) in cases {
        let m = build_weight_interconnect(
            &WeightIcParams::new(8, 8, 3, 4, num_mlbs),
            &proj,
            &Projection::simple(1, 1, 1, 1, 1),
            1,
        )
        .unwrap();
        let ins = [
            ("inputs_from_buffer_0", 8u128),
            ("inputs_from_buffer_1", 26),
            ("inputs_from_buffer_2", 44),
            ("inputs_from_buffer_3", 62),
        ];
        assert_eq!(outputs(&m, "outputs_to_mlb", num_mlbs, &ins), expected);
    }
}

#[test]
fn weight_interconnect_stream_count_matches_wired_slices() {
    let proj = Projection::simple(1, 2, 2, 2, 1);
    let m = build_weight_interconnect(
        &WeightIcParams::new(8, 8, 3, 4, 10),
        &proj,
        &Projection::simple(1, 1, 1, 1, 1),
        1,
    )
    .unwrap();
    let mut slices = std::collections::BTreeSet::new();
    for e in &m.edges {
        if let Source::Bits(src) = &e.src {
            if let crate::graph::PortRef::This(name) = &src.port {
                if name.starts_with("inputs_from_buffer") {
                    slices.insert((name.clone(), src.lo, src.hi));
                }
            }
        }
    }
    assert_eq!(slices.len() as u64, proj.stream_count(Dtype::W));
}

#[test]
fn weight_interconnect_errors() {
    let inner = Projection::simple(1, 1, 1, 1, 1);
    assert!(matches!(
        build_weight_interconnect(
            &WeightIcParams::new(8, 2, 3, 4, 10),
            &Projection::simple(1, 2, 2, 2, 1),
            &inner,
            1
        ),
        Err(ElabError::StreamWidthMismatch { .. })
    ));
    assert!(matches!(
        build_weight_interconnect(
            &WeightIcParams::new(8, 8, 3, 400, 15),
            &Projection::simple(2, 1, 3, 10, 2),
            &inner,
            1
        ),
        Err(ElabError::InsufficientMlbs { .. })
    ));
    assert!(matches!(
        build_weight_interconnect(
            &WeightIcParams::new(8, 8, 3, 4, 1000),
            &Projection::simple(2, 1, 3, 10, 2),
            &inner,
            1
        ),
        Err(ElabError::InsufficientBuffers { .. })
    ));
    assert!(matches!(
        build_weight_interconnect(
            &WeightIcParams::new(5, 8, 3, 3, 15),
            &Projection::simple(2, 1, 3, 1, 2),
            &inner,
            1
        ),
        Err(ElabError::InsufficientBuffers { .. })
    ));
}

#[test]
fn weight_interconnect_preload_chains() {
    // 5 MLBs over 2 buffers: chains of length 3 and 2.
    let mut proj = Projection::simple(1, 1, 5, 1, 1);
    proj.preload.push(Preload {
        dtype: Dtype::W,
        bus_count: 2,
    });
    let m = build_weight_interconnect(
        &WeightIcParams::new(8, 8, 4, 2, 5),
        &proj,
        &Projection::simple(1, 1, 1, 1, 1),
        1,
    )
    .unwrap();
    let ins = [
        ("inputs_from_buffer_0", 0x5u128),
        ("inputs_from_buffer_1", 0x9),
        ("inputs_from_mlb_0", 1),
        ("inputs_from_mlb_1", 2),
        ("inputs_from_mlb_2", 3),
        ("inputs_from_mlb_3", 4),
        ("inputs_from_mlb_4", 6),
    ];
    // Heads read their buffer, every other link forwards its predecessor.
    assert_eq!(
        outputs(&m, "outputs_to_mlb", 5, &ins),
        vec![0x5, 1, 2, 0x9, 4]
    );
    // Tails mirror back toward the buffers.
    assert_eq!(outputs(&m, "outputs_to_buffer", 2, &ins), vec![3, 6]);
}

#[test]
fn weight_interconnect_preload_budget() {
    let mut proj = Projection::simple(1, 1, 4, 1, 1);
    proj.preload.push(Preload {
        dtype: Dtype::W,
        bus_count: 4,
    });
    assert!(matches!(
        build_weight_interconnect(
            &WeightIcParams::new(8, 8, 8, 2, 4),
            &proj,
            &Projection::simple(1, 1, 1, 1, 1),
            1
        ),
        Err(ElabError::PreloadBudgetExceeded { .. })
    ));
}

#[test]
fn weight_interconnect_dilation_gating() {
    // Two x sub-lanes per MLB, dilation 2: exactly one lane per MLB is
    // tied off and the live lanes take consecutive buffer bits.
    let proj = Projection::simple(2, 1, 1, 1, 1);
    let inner = Projection {
        urw: Factor {
            value: 2,
            x: Some(2),
            ..Factor::new(2)
        },
        ..Projection::simple(2, 1, 1, 1, 1)
    };
    let m = build_weight_interconnect(
        &WeightIcParams::new(16, 8, 8, 1, 2),
        &proj,
        &inner,
        2,
    )
    .unwrap();
    let ins = [("inputs_from_buffer_0", 0xABCDu128)];
    assert_eq!(outputs(&m, "outputs_to_mlb", 2, &ins), vec![0xD, 0xB]);

    let zero_lanes = m
        .edges
        .iter()
        .filter(|e| {
            matches!(e.src, Source::Zero)
                && matches!(&e.dst.port, crate::graph::PortRef::This(n)
                    if n == "outputs_to_mlb_0" || n == "outputs_to_mlb_1")
        })
        .count();
    assert_eq!(zero_lanes, 2);
}

#[test]
fn input_interconnect_cascade_and_heads() {
    let cases = [
        (
            Projection::simple(2, 1, 4, 1, 1),
            vec![6u128, 1, 7, 3, 2, 5, 3, 7, 0, 0],
        ),
        (
            Projection::simple(2, 1, 2, 2, 1),
            vec![6, 1, 6, 3, 7, 5, 7, 7, 0, 0],
        ),
    ];
    for (proj, expected) in cases {
        let m = build_input_interconnect(
            &InputIcParams::new(8, 8, 3, 2, 10),
            &proj,
            &Projection::simple(1, 1, 1, 1, 1),
            3,
            1,
        )
        .unwrap();
        let mut ins: Vec<(String, u128)> = vec![
            ("inputs_from_buffer_0".to_string(), 62),
            ("inputs_from_buffer_1".to_string(), 26),
        ];
        for i in 0..10u64 {
            ins.push((format!("inputs_from_mlb_{}", i), (i + 1) as u128));
        }
        let ins_ref: Vec<(&str, u128)> = ins.iter().map(|(n, v)| (n.as_str(), *v)).collect();
        assert_eq!(outputs(&m, "outputs_to_mlb", 10, &ins_ref), expected);
    }
}

#[test]
fn input_interconnect_y_rotation() {
    // Two y rows rotate through one 2x2 mux under urn_sel.
    let proj = Projection {
        urn: Factor {
            value: 2,
            chans: Some(1),
            y: Some(2),
            ..Factor::new(2)
        },
        ..Projection::simple(1, 2, 1, 1, 1)
    };
    let m = build_input_interconnect(
        &InputIcParams::new(8, 4, 4, 1, 2),
        &proj,
        &Projection::simple(1, 1, 1, 1, 1),
        4,
        1,
    )
    .unwrap();
    assert!(m.instance("mux2x2_0").is_some());

    let base = [("inputs_from_buffer_0", 0x7Au128)];
    let mut with_sel0 = base.to_vec();
    with_sel0.push(("urn_sel", 0));
    assert_eq!(outputs(&m, "outputs_to_mlb", 2, &with_sel0), vec![0xA, 0x7]);

    let mut with_sel1 = base.to_vec();
    with_sel1.push(("urn_sel", 1));
    assert_eq!(outputs(&m, "outputs_to_mlb", 2, &with_sel1), vec![0x7, 0xA]);
}

#[test]
fn input_interconnect_y_dilation_zeroes_skipped_rows() {
    let proj = Projection {
        urn: Factor {
            value: 2,
            chans: Some(1),
            y: Some(2),
            ..Factor::new(2)
        },
        ..Projection::simple(1, 2, 1, 1, 1)
    };
    let m = build_input_interconnect(
        &InputIcParams::new(8, 4, 4, 1, 2),
        &proj,
        &Projection::simple(1, 1, 1, 1, 1),
        4,
        2,
    )
    .unwrap();
    let ins = [("inputs_from_buffer_0", 0x7Au128), ("urn_sel", 0)];
    // Row 1 lands between dilated taps and reads zero.
    assert_eq!(outputs(&m, "outputs_to_mlb", 2, &ins), vec![0xA, 0]);
}

#[test]
fn input_interconnect_errors() {
    let inner = Projection::simple(1, 1, 1, 1, 1);
    assert!(matches!(
        build_input_interconnect(
            &InputIcParams::new(2, 8, 3, 2, 10),
            &Projection::simple(2, 1, 4, 1, 1),
            &inner,
            3,
            1
        ),
        Err(ElabError::BufferTooNarrow { .. })
    ));
    assert!(matches!(
        build_input_interconnect(
            &InputIcParams::new(8, 8, 3, 2, 3),
            &Projection::simple(2, 1, 4, 1, 1),
            &inner,
            3,
            1
        ),
        Err(ElabError::InsufficientMlbs { .. })
    ));
    assert!(matches!(
        build_input_interconnect(
            &InputIcParams::new(8, 8, 3, 1, 10),
            &Projection::simple(2, 1, 4, 1, 1),
            &inner,
            3,
            1
        ),
        Err(ElabError::InsufficientBuffers { .. })
    ));
}

#[test]
fn output_ps_chains_and_activation_slices() {
    let proj = Projection::simple(2, 2, 2, 1, 1);
    let m = build_output_ps_interconnect(
        &OutputPsParams::new(3, 10, 6, 6, 10),
        &proj,
        None,
    )
    .unwrap();
    let mut ins: Vec<(String, u128)> = Vec::new();
    for (i, v) in [62u128, 0, 0, 62, 26, 0, 0, 26, 0, 0].iter().enumerate() {
        ins.push((format!("inputs_from_mlb_{}", i), *v));
    }
    let ins_ref: Vec<(&str, u128)> = ins.iter().map(|(n, v)| (n.as_str(), *v)).collect();
    assert_eq!(
        outputs(&m, "outputs_to_afs", 6, &ins_ref),
        vec![6, 7, 2, 3, 0, 0]
    );
    assert_eq!(
        outputs(&m, "outputs_to_mlb", 10, &ins_ref),
        vec![0, 62, 0, 0, 0, 26, 0, 0, 0, 0]
    );
}

#[test]
fn output_ps_preloaded_heads() {
    let proj = Projection::simple(1, 1, 2, 1, 1);
    let m = build_output_ps_interconnect(
        &OutputPsParams::new(4, 8, 4, 2, 2),
        &proj,
        Some(&PsLoad::new(1, 8)),
    )
    .unwrap();
    let ins = [("inputs_from_psbuf_0", 0x53u128)];
    assert_eq!(outputs(&m, "outputs_to_mlb", 2, &ins), vec![3, 5]);
}

#[test]
fn output_ps_errors() {
    // Activation width must divide the used stream width.
    assert!(matches!(
        build_output_ps_interconnect(
            &OutputPsParams::new(4, 10, 6, 6, 10),
            &Projection::simple(2, 2, 2, 1, 1),
            None,
        ),
        Err(ElabError::StreamWidthMismatch { .. })
    ));
    assert!(matches!(
        build_output_ps_interconnect(
            &OutputPsParams::new(3, 10, 6, 2, 10),
            &Projection::simple(2, 2, 2, 1, 1),
            None,
        ),
        Err(ElabError::InsufficientBuffers { .. })
    ));
}
