use crate::datapath::{build_activation_wrapper, build_datapath, build_hwb_wrapper};
use crate::error::ElabError;
use crate::graph::{Block, HasPorts, PortRef, Source};
use crate::spec::projection::ProjectionSpec;
use crate::spec::HwbSpec;

fn mlb_spec() -> HwbSpec {
    serde_yaml::from_str(
        r#"
block_name: ml_block
simulation_model: MLB
MAC_info:
  num_units: 128
  data_widths: { W: 8, I: 8, O: 32 }
ports:
  - { name: a_in, width: 32, direction: in, type: W }
  - { name: a_out, width: 32, direction: out, type: W }
  - { name: b_in, width: 64, direction: in, type: I }
  - { name: b_out, width: 64, direction: out, type: I }
  - { name: res_in, width: 128, direction: in, type: O }
  - { name: res_out, width: 128, direction: out, type: O }
  - { name: a_en, width: 1, direction: in, type: W_EN }
  - { name: b_en, width: 1, direction: in, type: I_EN }
  - { name: acc_en, width: 1, direction: in, type: ACC_EN }
"#,
    )
    .unwrap()
}

fn buffer_spec(name: &str, addr_width: u32, data_width: u32) -> HwbSpec {
    serde_yaml::from_str(&format!(
        r#"
block_name: {}
simulation_model: Buffer
ports:
  - {{ name: portaaddr, width: {}, direction: in, type: ADDRESS }}
  - {{ name: portadatain, width: {}, direction: in, type: DATA }}
  - {{ name: portadataout, width: {}, direction: out, type: DATA }}
  - {{ name: portawe, width: 1, direction: in, type: WEN }}
"#,
        name, addr_width, data_width, data_width
    ))
    .unwrap()
}

fn projection() -> ProjectionSpec {
    serde_yaml::from_str(
        r#"
name: test
activation_function: RELU
stream_info: { W: 4, I: 4, O: 16 }
inner_projection:
  URW: { value: 3 }
  URN: { value: 2 }
  UB: { value: 2 }
  UE: { value: 1 }
  UG: { value: 2 }
  PRELOAD: [ { dtype: W, bus_count: 1 } ]
outer_projection:
  URW: { value: 1 }
  URN: { value: 2 }
  UB: { value: 2 }
  UE: { value: 1 }
  UG: { value: 2 }
  PRELOAD: [ { dtype: W, bus_count: 1 } ]
"#,
    )
    .unwrap()
}

#[test]
fn hwb_wrapper_shares_control_ports() {
    let spec: HwbSpec = serde_yaml::from_str(
        r#"
block_name: test_block
ports:
  - { name: A, width: 5, direction: in, type: C }
  - { name: B, width: 5, direction: out, type: C }
  - { name: C, width: 5, direction: in, type: ADDRESS }
  - { name: D, width: 5, direction: out, type: ADDRESS }
  - { name: E, width: 5, direction: in, type: OTHER }
  - { name: F, width: 5, direction: out, type: OTHER }
"#,
    )
    .unwrap();
    let w = build_hwb_wrapper(&spec, 2, "test_wrapper").unwrap();

    // Config and address inputs are lifted once; everything else is
    // duplicated per instance.
    assert!(w.port("A").is_some());
    assert!(w.port("C").is_some());
    assert!(w.port("A_0").is_none());
    for name in ["E_0", "E_1", "B_0", "B_1", "D_0", "D_1", "F_0", "F_1"] {
        assert!(w.port(name).is_some(), "missing {}", name);
    }
    assert_eq!(w.instances.len(), 2);
    assert!(w.instance("test_block_inst_0").is_some());

    // The shared port drives the same input of both instances.
    let shared_edges = w
        .edges
        .iter()
        .filter(|e| {
            matches!(&e.src, Source::Bits(b)
                if matches!(&b.port, PortRef::This(n) if n == "A"))
        })
        .count();
    assert_eq!(shared_edges, 2);
}

#[test]
fn activation_wrapper_rejects_unknown_functions() {
    assert!(build_activation_wrapper(2, "RELU", 4, 4).is_ok());
    assert!(matches!(
        build_activation_wrapper(2, "notrelu", 4, 4),
        Err(ElabError::UnknownActivationFunction(_))
    ));
}

#[test]
fn datapath_single_projection() {
    let proj = projection();
    let dp = build_datapath(
        &mlb_spec(),
        &buffer_spec("ml_block_weights", 4, 16),
        &buffer_spec("ml_block_inputs", 3, 32),
        &buffer_spec("mlb_outs", 3, 16),
        std::slice::from_ref(&proj),
    )
    .unwrap();

    for name in [
        "mlb_modules",
        "weight_modules",
        "input_act_modules",
        "output_act_modules",
        "activation_function_modules",
        "weight_interconnect_0",
        "input_interconnect_0",
        "output_ps_interconnect_0",
        "output_interconnect_0",
    ] {
        assert!(dp.instance(name).is_some(), "missing instance {}", name);
    }

    // 8 MLBs (outer URN*UB*UG), 8 input buffers, 1 weight buffer.
    let mlbs = match &dp.instance("mlb_modules").unwrap().block {
        Block::Module(m) => m.instances.len(),
        _ => 0,
    };
    assert_eq!(mlbs, 8);
    let wbufs = match &dp.instance("weight_modules").unwrap().block {
        Block::Module(m) => m.instances.len(),
        _ => 0,
    };
    assert_eq!(wbufs, 1);
    let ibufs = match &dp.instance("input_act_modules").unwrap().block {
        Block::Module(m) => m.instances.len(),
        _ => 0,
    };
    assert_eq!(ibufs, 8);

    // Single projection: no projection selector, but the ping-pong address
    // path and the lifted control inputs are present.
    assert!(dp.port("sel").is_none());
    assert!(dp.port("addr_sel").is_some());
    assert!(dp.port("portaaddr_0").is_some());
    assert!(dp.port("portaaddr_b_0").is_some());
    assert!(dp.instance("addr_mux_portaaddr_0").is_some());
    assert!(dp.port("mlb_modules_a_en_top").is_some());
    assert!(dp.port("weight_modules_portaaddr_top").is_some());

    // Output buffer readback reaches the top.
    assert!(dp.port("portadataout_0").is_some());
}

#[test]
fn datapath_is_deterministic() {
    let proj = projection();
    let build = || {
        build_datapath(
            &mlb_spec(),
            &buffer_spec("ml_block_weights", 4, 16),
            &buffer_spec("ml_block_inputs", 3, 32),
            &buffer_spec("mlb_outs", 3, 16),
            std::slice::from_ref(&proj),
        )
        .unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn datapath_multi_projection_steering() {
    let proj = projection();
    let dp = build_datapath(
        &mlb_spec(),
        &buffer_spec("ml_block_weights", 4, 16),
        &buffer_spec("ml_block_inputs", 3, 32),
        &buffer_spec("mlb_outs", 3, 16),
        &[proj.clone(), proj],
    )
    .unwrap();

    let sel = dp.port("sel").expect("projection selector");
    assert_eq!(sel.width, 1);
    for name in ["weight_interconnect_1", "output_interconnect_1"] {
        assert!(dp.instance(name).is_some(), "missing instance {}", name);
    }
    assert!(dp.instance("sel_mux_a_in_0").is_some());
    assert!(dp.instance("sel_mux_afs_0").is_some());
}

#[test]
fn datapath_rejects_oversized_inner_projection() {
    let mut proj = projection();
    proj.inner_projection.ue.value = 100;
    let err = build_datapath(
        &mlb_spec(),
        &buffer_spec("ml_block_weights", 4, 16),
        &buffer_spec("ml_block_inputs", 3, 32),
        &buffer_spec("mlb_outs", 3, 16),
        std::slice::from_ref(&proj),
    );
    assert!(matches!(
        err,
        Err(ElabError::ProjectionExceedsHardware { .. })
    ));
}

#[test]
fn datapath_requires_buffer_data_ports() {
    let mut bad_ob = buffer_spec("mlb_outs", 3, 16);
    bad_ob.ports.retain(|p| p.name != "portadatain");
    let err = build_datapath(
        &mlb_spec(),
        &buffer_spec("ml_block_weights", 4, 16),
        &buffer_spec("ml_block_inputs", 3, 32),
        &bad_ob,
        &[projection()],
    );
    assert!(matches!(err, Err(ElabError::PortTypeMissing { .. })));
}
