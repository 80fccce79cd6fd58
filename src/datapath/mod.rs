//! Wrappers around described hardware blocks and the top-level datapath
//! composition: shared pools of MLBs, buffers and activation functions,
//! one fabric set per projection, steered by a projection selector.

use log::{info, warn};

use crate::error::ElabError;
use crate::fabric::input::{build_input_interconnect, InputIcParams};
use crate::fabric::merge::{build_merge_busses, MergeParams};
use crate::fabric::output_ps::{build_output_ps_interconnect, OutputPsParams};
use crate::fabric::weight::{build_weight_interconnect, WeightIcParams};
use crate::graph::{
    BitRange, Block, HasPorts, Leaf, LeafKind, Module, ModuleBuilder, ModuleKind, Port, PortRef,
};
use crate::spec::projection::{Dtype, ProjectionSpec};
use crate::spec::{Direction, HwbSpec, PortType, SimModel};
use crate::utils::calculation::{clog2, max_input_bus_width, num_buffers_reqd};

/// Wrap `count` instances of a described block. Input ports of the shared
/// control types are lifted once; every other non-clock port is duplicated
/// per instance as `<name>_<i>`.
pub fn build_hwb_wrapper(
    spec: &HwbSpec,
    count: u64,
    name: &str,
) -> Result<Module, ElabError> {
    let kind = match spec.simulation_model {
        Some(SimModel::Mlb) => LeafKind::Mlb,
        Some(SimModel::Emif) => LeafKind::Emif,
        _ => LeafKind::Buffer,
    };
    let mut b = ModuleBuilder::new(ModuleKind::Wrapper, name);

    for port in &spec.ports {
        if port.direction == Direction::In && port.ty.is_shared_control() {
            b.add_port(&port.name, port.width, Direction::In, port.ty);
        }
    }

    for i in 0..count {
        let inst = b.add_instance(
            format!("{}_inst_{}", spec.block_name, i),
            Block::Leaf(Leaf::from_spec(kind, spec)),
        );
        for port in &spec.ports {
            if matches!(port.ty, PortType::Clk | PortType::Reset) {
                continue;
            }
            if port.direction == Direction::In && port.ty.is_shared_control() {
                b.connect_ports(
                    PortRef::This(port.name.clone()),
                    PortRef::Child {
                        inst,
                        port: port.name.clone(),
                    },
                );
            } else {
                let top = format!("{}_{}", port.name, i);
                b.add_port(&top, port.width, port.direction, port.ty);
                match port.direction {
                    Direction::In => b.connect_ports(
                        PortRef::This(top),
                        PortRef::Child {
                            inst,
                            port: port.name.clone(),
                        },
                    ),
                    Direction::Out => b.connect_ports(
                        PortRef::Child {
                            inst,
                            port: port.name.clone(),
                        },
                        PortRef::This(top),
                    ),
                }
            }
        }
    }
    Ok(b.finish())
}

/// Wrap `count` activation functions. RELU is the only function the
/// hardware library provides.
pub fn build_activation_wrapper(
    count: u64,
    function: &str,
    input_width: u32,
    output_width: u32,
) -> Result<Module, ElabError> {
    if function != "RELU" {
        return Err(ElabError::UnknownActivationFunction(function.to_string()));
    }
    if output_width < input_width {
        warn!(
            "activation output downcast: {} -> {} bits",
            input_width, output_width
        );
    }
    let mut b = ModuleBuilder::new(ModuleKind::Wrapper, "activation_functions");
    for i in 0..count {
        let leaf = Leaf::new(
            LeafKind::Activation,
            "relu",
            vec![
                Port {
                    name: "activation_function_in".to_string(),
                    width: input_width,
                    dir: Direction::In,
                    ty: PortType::Data,
                },
                Port {
                    name: "activation_function_out".to_string(),
                    width: output_width,
                    dir: Direction::Out,
                    ty: PortType::Data,
                },
            ],
        );
        let inst = b.add_instance(format!("relu_inst_{}", i), Block::Leaf(leaf));
        let top_in = format!("activation_function_in_{}", i);
        b.add_port(&top_in, input_width, Direction::In, PortType::Data);
        b.connect_ports(
            PortRef::This(top_in),
            PortRef::Child {
                inst,
                port: "activation_function_in".to_string(),
            },
        );
        let top_out = format!("activation_function_out_{}", i);
        b.add_port(&top_out, output_width, Direction::Out, PortType::Data);
        b.connect_ports(
            PortRef::Child {
                inst,
                port: "activation_function_out".to_string(),
            },
            PortRef::This(top_out),
        );
    }
    Ok(b.finish())
}

/// Per-projection resource requirements.
#[derive(Debug, Clone)]
struct ProjCounts {
    mlb_count: u64,
    wbuf: u64,
    ibuf: u64,
    obuf: u64,
    afs: u64,
    i_cap: u32,
}

fn proj_counts(
    mlb_spec: &HwbSpec,
    wb: &HwbSpec,
    ib: &HwbSpec,
    ob: &HwbSpec,
    proj: &ProjectionSpec,
) -> Result<ProjCounts, ElabError> {
    proj.validate()?;
    let inner = &proj.inner_projection;
    let outer = &proj.outer_projection;

    let mac_count = inner.mlb_count();
    let mac_info = mlb_spec
        .mac_info
        .ok_or_else(|| ElabError::InvalidSpec("MLB description lacks MAC_info".to_string()))?;
    if mac_count > mac_info.num_units {
        return Err(ElabError::ProjectionExceedsHardware {
            what: "MACs per MLB",
            requested: mac_count,
            supported: mac_info.num_units,
        });
    }
    for (t, mac_width) in [
        (Dtype::W, mac_info.data_widths.w),
        (Dtype::I, mac_info.data_widths.i),
        (Dtype::O, mac_info.data_widths.o),
    ] {
        let bus_width = proj.inner_bus_width(t);
        let port_ty = match t {
            Dtype::W => PortType::W,
            Dtype::I => PortType::I,
            Dtype::O => PortType::O,
        };
        let avail = mlb_spec.sum_port_width(port_ty, Direction::In);
        if bus_width > avail {
            return Err(ElabError::ProjectionExceedsHardware {
                what: "MLB port width",
                requested: bus_width as u64,
                supported: avail as u64,
            });
        }
        if proj.stream_width(t) > mac_width {
            warn!(
                "MLB internal {:?} width {} is narrower than the projected stream width {}",
                t,
                mac_width,
                proj.stream_width(t)
            );
        }
    }

    let mlb_count = outer.mlb_count();
    let wbuf = num_buffers_reqd(
        wb,
        outer.stream_count(Dtype::W),
        proj.inner_bus_width(Dtype::W),
        None,
    )?;
    let i_cap = max_input_bus_width(ib.data_out_width(), proj);
    let ibuf = num_buffers_reqd(
        ib,
        outer.stream_count(Dtype::I),
        proj.inner_bus_width(Dtype::I),
        Some(i_cap),
    )?;
    let afs = outer.stream_count(Dtype::O) * inner.stream_count(Dtype::O);
    let obuf = num_buffers_reqd(ob, afs, proj.stream_info.i, None)?;

    info!(
        "projection {}: {} MLBs x {} MACs, buffers W/I/O = {}/{}/{}, {} activations",
        proj.name.as_deref().unwrap_or("unnamed"),
        mlb_count,
        mac_count,
        wbuf,
        ibuf,
        obuf,
        afs
    );
    Ok(ProjCounts {
        mlb_count,
        wbuf,
        ibuf,
        obuf,
        afs,
        i_cap,
    })
}

/// Elaborate the complete datapath for one or more projections over shared
/// block pools.
pub fn build_datapath(
    mlb_spec: &HwbSpec,
    wb_spec: &HwbSpec,
    ib_spec: &HwbSpec,
    ob_spec: &HwbSpec,
    projs: &[ProjectionSpec],
) -> Result<Module, ElabError> {
    if projs.is_empty() {
        return Err(ElabError::InvalidSpec("no projections supplied".to_string()));
    }
    let n = projs.len();
    let function = projs[0]
        .activation_function
        .as_deref()
        .unwrap_or("RELU")
        .to_string();
    for p in projs {
        let f = p.activation_function.as_deref().unwrap_or("RELU");
        if f != function {
            return Err(ElabError::UnknownActivationFunction(format!(
                "conflicting activation functions {} and {}",
                function, f
            )));
        }
    }

    let counts: Vec<ProjCounts> = projs
        .iter()
        .map(|p| proj_counts(mlb_spec, wb_spec, ib_spec, ob_spec, p))
        .collect::<Result<_, _>>()?;

    let mlb_pool = counts.iter().map(|c| c.mlb_count).max().unwrap();
    let wbuf_pool = counts.iter().map(|c| c.wbuf).max().unwrap();
    let ibuf_pool = counts.iter().map(|c| c.ibuf).max().unwrap();
    let obuf_pool = counts.iter().map(|c| c.obuf).max().unwrap();
    let af_pool = counts.iter().map(|c| c.afs).max().unwrap();
    let act_in_w = projs.iter().map(|p| p.stream_info.o).max().unwrap();
    let act_out_w = projs.iter().map(|p| p.stream_info.i).max().unwrap();

    let mut b = ModuleBuilder::new(ModuleKind::Datapath, "datapath");

    let mlb_modules = b.add_instance(
        "mlb_modules",
        Block::Module(build_hwb_wrapper(mlb_spec, mlb_pool, "mlb_modules")?),
    );
    let weight_modules = b.add_instance(
        "weight_modules",
        Block::Module(build_hwb_wrapper(wb_spec, wbuf_pool, "weight_modules")?),
    );
    let input_act_modules = b.add_instance(
        "input_act_modules",
        Block::Module(build_hwb_wrapper(ib_spec, ibuf_pool, "input_act_modules")?),
    );
    let output_act_modules = b.add_instance(
        "output_act_modules",
        Block::Module(build_hwb_wrapper(ob_spec, obuf_pool, "output_act_modules")?),
    );
    let activation_modules = b.add_instance(
        "activation_function_modules",
        Block::Module(build_activation_wrapper(
            af_pool, &function, act_in_w, act_out_w,
        )?),
    );

    if n > 1 {
        b.add_port("sel", clog2(n as u64), Direction::In, PortType::C);
    }
    b.add_port("addr_sel", 1, Direction::In, PortType::C);

    let mlb_w_width = mlb_spec.sum_port_width(PortType::W, Direction::In);
    let mlb_i_width = mlb_spec.sum_port_width(PortType::I, Direction::In);
    let mlb_o_width = mlb_spec.sum_port_width(PortType::O, Direction::In);
    mlb_spec.require_port_type(PortType::W, Direction::In)?;
    mlb_spec.require_port_type(PortType::I, Direction::In)?;
    mlb_spec.require_port_type(PortType::O, Direction::In)?;
    wb_spec.require_port_type(PortType::Data, Direction::Out)?;
    ib_spec.require_port_type(PortType::Data, Direction::Out)?;
    ob_spec.require_port_type(PortType::Data, Direction::In)?;

    let mut fabric_sets = Vec::new();
    for (i, (proj, c)) in projs.iter().zip(&counts).enumerate() {
        let dil = proj.dilation();
        let weight_ic = build_weight_interconnect(
            &WeightIcParams::new(
                wb_spec.data_out_width(),
                mlb_w_width,
                proj.inner_bus_width(Dtype::W),
                wbuf_pool,
                mlb_pool,
            ),
            &proj.outer_projection,
            &proj.inner_projection,
            dil.x,
        )?;
        let input_ic = build_input_interconnect(
            &InputIcParams::new(
                c.i_cap,
                mlb_i_width,
                proj.inner_bus_width(Dtype::I),
                ibuf_pool,
                mlb_pool,
            ),
            &proj.outer_projection,
            &proj.inner_projection,
            proj.stream_info.i,
            dil.y,
        )?;
        let output_ic = build_output_ps_interconnect(
            &OutputPsParams::new(
                proj.stream_info.o,
                mlb_o_width,
                proj.inner_bus_width(Dtype::O),
                af_pool,
                mlb_pool,
            ),
            &proj.outer_projection,
            None,
        )?;
        let merge = build_merge_busses(&MergeParams::new(
            proj.stream_info.i,
            c.afs,
            ob_spec.data_in_width(),
            obuf_pool,
            None,
        ))?;

        let w = b.add_instance(
            format!("weight_interconnect_{}", i),
            Block::Module(weight_ic),
        );
        let inp = b.add_instance(format!("input_interconnect_{}", i), Block::Module(input_ic));
        let o = b.add_instance(
            format!("output_ps_interconnect_{}", i),
            Block::Module(output_ic),
        );
        let m = b.add_instance(format!("output_interconnect_{}", i), Block::Module(merge));
        fabric_sets.push((w, inp, o, m));
    }

    // Fabric outputs into the shared MLB pool, selected per projection.
    for (ty, fabric_of) in [
        (PortType::W, 0usize),
        (PortType::I, 1usize),
        (PortType::O, 2usize),
    ] {
        let in_ports: Vec<(String, u32)> = mlb_spec
            .ports_of_type(ty, Some(Direction::In))
            .map(|p| (p.name.clone(), p.width))
            .collect();
        for (pname, pwidth) in in_ports {
            for k in 0..mlb_pool {
                let dst = PortRef::Child {
                    inst: mlb_modules,
                    port: format!("{}_{}", pname, k),
                };
                let srcs: Vec<PortRef> = fabric_sets
                    .iter()
                    .map(|set| PortRef::Child {
                        inst: [set.0, set.1, set.2][fabric_of],
                        port: format!("outputs_to_mlb_{}", k),
                    })
                    .collect();
                steer(&mut b, &srcs, dst, pwidth, &format!("{}_{}", pname, k))?;
            }
        }

        // Readbacks from the MLB pool fan out to every projection.
        let out_ports: Vec<String> = mlb_spec
            .ports_of_type(ty, Some(Direction::Out))
            .map(|p| p.name.clone())
            .collect();
        for pname in out_ports {
            for k in 0..mlb_pool {
                for set in &fabric_sets {
                    let src = PortRef::Child {
                        inst: mlb_modules,
                        port: format!("{}_{}", pname, k),
                    };
                    let dst = PortRef::Child {
                        inst: [set.0, set.1, set.2][fabric_of],
                        port: format!("inputs_from_mlb_{}", k),
                    };
                    connect_exact(&mut b, src, dst)?;
                }
            }
        }
    }

    // Buffer read data fans out to the fabrics.
    for (buf_inst, fabric_of) in [(weight_modules, 0usize), (input_act_modules, 1usize)] {
        let spec = if fabric_of == 0 { wb_spec } else { ib_spec };
        let names: Vec<String> = spec
            .ports_of_type(PortType::Data, Some(Direction::Out))
            .map(|p| p.name.clone())
            .collect();
        for pname in names {
            let count = if fabric_of == 0 { wbuf_pool } else { ibuf_pool };
            for bidx in 0..count {
                for set in &fabric_sets {
                    let src = PortRef::Child {
                        inst: buf_inst,
                        port: format!("{}_{}", pname, bidx),
                    };
                    let dst = PortRef::Child {
                        inst: [set.0, set.1][fabric_of],
                        port: format!("inputs_from_buffer_{}", bidx),
                    };
                    if fabric_of == 0 {
                        connect_exact(&mut b, src, dst)?;
                    } else {
                        // The input fabric may use a capped low slice of a
                        // wider buffer word.
                        connect_sliced(&mut b, src, dst)?;
                    }
                }
            }
        }
    }

    // Partial-sum tails into the activation pool, then packed into the
    // output buffers.
    for j in 0..af_pool {
        let dst = PortRef::Child {
            inst: activation_modules,
            port: format!("activation_function_in_{}", j),
        };
        let srcs: Vec<PortRef> = fabric_sets
            .iter()
            .map(|set| PortRef::Child {
                inst: set.2,
                port: format!("outputs_to_afs_{}", j),
            })
            .collect();
        steer(&mut b, &srcs, dst, act_in_w, &format!("afs_{}", j))?;
    }
    for set in &fabric_sets {
        let merge_ins = match b.instance_block(set.3) {
            Block::Module(m) => m.ports_with_prefix("input").len() as u64,
            _ => 0,
        };
        for j in 0..merge_ins {
            let src = PortRef::Child {
                inst: activation_modules,
                port: format!("activation_function_out_{}", j),
            };
            let dst = PortRef::Child {
                inst: set.3,
                port: format!("input_{}", j),
            };
            // Activation outputs are pooled at the widest projection; a
            // narrower merge lane reads the low bits.
            connect_sliced(&mut b, src, dst)?;
        }
    }
    let ob_in_ports: Vec<(String, u32)> = ob_spec
        .ports_of_type(PortType::Data, Some(Direction::In))
        .map(|p| (p.name.clone(), p.width))
        .collect();
    for (pname, pwidth) in &ob_in_ports {
        for bidx in 0..obuf_pool {
            let dst = PortRef::Child {
                inst: output_act_modules,
                port: format!("{}_{}", pname, bidx),
            };
            let srcs: Vec<PortRef> = fabric_sets
                .iter()
                .map(|set| PortRef::Child {
                    inst: set.3,
                    port: format!("output_{}", bidx),
                })
                .collect();
            steer(&mut b, &srcs, dst, *pwidth, &format!("{}_{}", pname, bidx))?;
        }
    }

    // Ping-pong addressing of the input buffers: a 2:1 mux per projection
    // between the primary and secondary address, then the projection
    // selector.
    let ib_addr_ports: Vec<(String, u32)> = ib_spec
        .ports_of_type(PortType::Address, Some(Direction::In))
        .map(|p| (p.name.clone(), p.width))
        .collect();
    for (pname, pwidth) in &ib_addr_ports {
        let mut per_proj = Vec::new();
        for i in 0..n {
            let mux = b.add_instance(
                format!("addr_mux_{}_{}", pname, i),
                Block::Leaf(Leaf::mux_n_to_1(2, *pwidth)),
            );
            for (slot, suffix) in [(0u32, ""), (1u32, "_b")] {
                let top = format!("{}{}_{}", pname, suffix, i);
                b.add_port(&top, *pwidth, Direction::In, PortType::Address);
                b.connect_ports(
                    PortRef::This(top),
                    PortRef::Child {
                        inst: mux,
                        port: format!("input_{}", slot),
                    },
                );
            }
            let src = b.this("addr_sel", 0, 1);
            let dst = b.child(mux, "sel", 0, 1);
            b.connect(src, dst);
            per_proj.push(PortRef::Child {
                inst: mux,
                port: "out".to_string(),
            });
        }
        let dst = PortRef::Child {
            inst: input_act_modules,
            port: pname.clone(),
        };
        steer(&mut b, &per_proj, dst, *pwidth, &format!("addr_{}", pname))?;
    }

    // Shared select line of the input-fabric y muxes.
    let urn_sel_w = fabric_sets
        .iter()
        .filter_map(|set| match &b.instance_block(set.1) {
            Block::Module(m) => m.port("urn_sel").map(|p| p.width),
            _ => None,
        })
        .max();
    if let Some(w) = urn_sel_w {
        b.add_port("urn_sel", w, Direction::In, PortType::C);
        for set in &fabric_sets {
            let pw = match b.instance_block(set.1) {
                Block::Module(m) => m.port("urn_sel").map(|p| p.width),
                _ => None,
            };
            if let Some(pw) = pw {
                let src = b.this("urn_sel", 0, pw);
                let dst = b.child(set.1, "urn_sel", 0, pw);
                b.connect(src, dst);
            }
        }
    }

    // Readback paths to the top.
    for (i, set) in fabric_sets.iter().enumerate() {
        for inst in [set.0, set.1] {
            let rbs: Vec<(String, u32)> = match b.instance_block(inst) {
                Block::Module(m) => m
                    .ports_with_prefix("outputs_to_buffer")
                    .iter()
                    .map(|(idx, p)| (format!("outputs_to_buffer_{}", idx), p.width))
                    .collect(),
                _ => Vec::new(),
            };
            let iname = b.instance_block(inst).block_name().to_string();
            let tag = if iname.starts_with("weight") {
                "weight"
            } else {
                "input"
            };
            for (pname, pwidth) in rbs {
                let top = format!("{}_{}_{}", tag, pname, i);
                b.add_port(&top, pwidth, Direction::Out, PortType::Data);
                b.connect_ports(
                    PortRef::Child {
                        inst,
                        port: pname,
                    },
                    PortRef::This(top),
                );
            }
        }
    }
    let ob_out_names: Vec<(String, u32)> = ob_spec
        .ports_of_type(PortType::Data, Some(Direction::Out))
        .map(|p| (p.name.clone(), p.width))
        .collect();
    for (pname, pwidth) in &ob_out_names {
        for bidx in 0..obuf_pool {
            let port = format!("{}_{}", pname, bidx);
            b.add_port(&port, *pwidth, Direction::Out, PortType::Data);
            b.connect_ports(
                PortRef::Child {
                    inst: output_act_modules,
                    port: port.clone(),
                },
                PortRef::This(port),
            );
        }
    }

    // Everything still unconnected becomes a top-level control input.
    b.lift_unconnected_inputs();
    Ok(b.finish())
}

/// Drive `dst` from one source per projection, through an N-to-1 mux under
/// the top-level `sel` when more than one projection exists. A source
/// narrower than `dst` (a projection not using the full pooled port) is
/// zero-extended; a wider source is a fatal inconsistency.
fn steer(
    b: &mut ModuleBuilder,
    srcs: &[PortRef],
    dst: PortRef,
    width: u32,
    tag: &str,
) -> Result<(), ElabError> {
    if srcs.len() == 1 {
        return connect_padded(b, srcs[0].clone(), dst);
    }
    let n = srcs.len() as u64;
    let mux = b.add_instance(
        format!("sel_mux_{}", tag),
        Block::Leaf(Leaf::mux_n_to_1(n, width)),
    );
    for (i, src) in srcs.iter().enumerate() {
        connect_padded(
            b,
            src.clone(),
            PortRef::Child {
                inst: mux,
                port: format!("input_{}", i),
            },
        )?;
    }
    let sel_w = clog2(n);
    let src = b.this("sel", 0, sel_w);
    let dst_sel = b.child(mux, "sel", 0, sel_w.max(1));
    b.connect(src, dst_sel);
    connect_exact(
        b,
        PortRef::Child {
            inst: mux,
            port: "out".to_string(),
        },
        dst,
    )
}

fn lookup_width(b: &ModuleBuilder, r: &PortRef) -> Result<u32, ElabError> {
    b.try_port_width(r).ok_or_else(|| {
        let what = match r {
            PortRef::This(name) => format!("datapath port `{}`", name),
            PortRef::Child { inst, port } => {
                format!("port `{}` on {}", port, b.instance_name(*inst))
            }
        };
        ElabError::InvalidSpec(format!("{} does not exist", what))
    })
}

/// Connect two ports that must have the same width.
fn connect_exact(b: &mut ModuleBuilder, src: PortRef, dst: PortRef) -> Result<(), ElabError> {
    let sw = lookup_width(b, &src)?;
    let dw = lookup_width(b, &dst)?;
    if sw != dw {
        return Err(ElabError::StreamWidthMismatch {
            context: "datapath wiring",
            width: sw,
            lanes: 1,
            lane_width: dw,
        });
    }
    let src = BitRange { port: src, lo: 0, hi: sw };
    let dst = BitRange { port: dst, lo: 0, hi: dw };
    b.connect(src, dst);
    Ok(())
}

/// Connect a source into an equal-or-wider destination, zero-tying the
/// destination bits beyond the source. Pooled ports are sized to the widest
/// projection, so a narrower projection drives only the low bits.
fn connect_padded(b: &mut ModuleBuilder, src: PortRef, dst: PortRef) -> Result<(), ElabError> {
    let sw = lookup_width(b, &src)?;
    let dw = lookup_width(b, &dst)?;
    if sw > dw {
        return Err(ElabError::StreamWidthMismatch {
            context: "datapath wiring",
            width: sw,
            lanes: 1,
            lane_width: dw,
        });
    }
    let src_r = BitRange { port: src, lo: 0, hi: sw };
    let dst_r = BitRange {
        port: dst.clone(),
        lo: 0,
        hi: sw,
    };
    b.connect(src_r, dst_r);
    if sw < dw {
        let rest = BitRange {
            port: dst,
            lo: sw,
            hi: dw,
        };
        b.tie_zero(rest);
    }
    Ok(())
}

/// Connect the low bits of an equal-or-wider source into a destination.
/// Used where only part of a wide port is deliberately in use (capped
/// input-buffer words, pooled activation outputs).
fn connect_sliced(b: &mut ModuleBuilder, src: PortRef, dst: PortRef) -> Result<(), ElabError> {
    let sw = lookup_width(b, &src)?;
    let dw = lookup_width(b, &dst)?;
    if sw < dw {
        return Err(ElabError::StreamWidthMismatch {
            context: "datapath wiring",
            width: sw,
            lanes: 1,
            lane_width: dw,
        });
    }
    let src = BitRange { port: src, lo: 0, hi: dw };
    let dst = BitRange { port: dst, lo: 0, hi: dw };
    b.connect(src, dst);
    Ok(())
}
