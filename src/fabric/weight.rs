//! Weight interconnect: buffer-to-MLB wiring for the weight datatype, in
//! either the streaming (weight-stationary) or the preload-chain contract.

use derive_more::Constructor;

use crate::error::ElabError;
use crate::graph::{Module, ModuleBuilder, ModuleKind};
use crate::spec::projection::{Dim, Dtype, Projection};

#[derive(Debug, Clone, Copy, Constructor)]
pub struct WeightIcParams {
    /// Bit-width of each weight buffer's data word.
    pub buffer_width: u32,
    /// Full bit-width of the MLB weight port.
    pub mlb_width: u32,
    /// Portion of the MLB weight port this projection drives.
    pub mlb_width_used: u32,
    pub num_buffers: u64,
    pub num_mlbs: u64,
}

/// Build the weight interconnect for `proj` (the outer projection).
/// `inner` supplies the sub-lane structure needed for x-dilation gating;
/// `dilation_x` of 1 disables it.
pub fn build_weight_interconnect(
    p: &WeightIcParams,
    proj: &Projection,
    inner: &Projection,
    dilation_x: u64,
) -> Result<Module, ElabError> {
    if p.mlb_width_used > p.mlb_width {
        return Err(ElabError::StreamWidthMismatch {
            context: "weight interconnect",
            width: p.mlb_width,
            lanes: 1,
            lane_width: p.mlb_width_used,
        });
    }
    let mlb_count = proj.mlb_count();
    if p.num_mlbs < mlb_count {
        return Err(ElabError::InsufficientMlbs {
            fabric: "weight interconnect",
            needed: mlb_count,
            available: p.num_mlbs,
        });
    }

    let mut b = ModuleBuilder::new(ModuleKind::Interconnect, "weight_interconnect");
    b.add_n_in_ports(p.num_buffers, p.buffer_width, "inputs_from_buffer");

    if let Some(bus_count) = proj.preload_count(Dtype::W) {
        build_preload(&mut b, p, mlb_count, bus_count)?;
    } else {
        build_streaming(&mut b, p, proj, inner, dilation_x)?;
    }

    // Tie disconnected MLB positions to 0 and give every position a
    // readback input.
    for i in 0..p.num_mlbs {
        let out = format!("outputs_to_mlb_{}", i);
        if !b.has_port(&out) {
            b.add_out_port(&out, p.mlb_width);
            let dst = b.this(&out, 0, p.mlb_width);
            b.tie_zero(dst);
        }
        b.add_in_port(&format!("inputs_from_mlb_{}", i), p.mlb_width);
    }
    Ok(b.finish())
}

fn build_streaming(
    b: &mut ModuleBuilder,
    p: &WeightIcParams,
    proj: &Projection,
    inner: &Projection,
    dilation_x: u64,
) -> Result<(), ElabError> {
    let wu = p.mlb_width_used;
    let streams_per_buffer = (p.buffer_width / wu) as u64;
    if streams_per_buffer == 0 {
        return Err(ElabError::BufferTooNarrow {
            buffer_width: p.buffer_width,
            stream_width: wu,
        });
    }
    let stream_count = proj.var_product(&[Dim::Urw, Dim::Urn, Dim::Ue, Dim::Ug]);
    let needed = crate::utils::calculation::div_ceil(stream_count, streams_per_buffer);
    if p.num_buffers < needed {
        return Err(ElabError::InsufficientBuffers {
            fabric: "weight interconnect",
            resource: "weight buffers",
            needed,
            available: p.num_buffers,
        });
    }

    // Sub-lane structure for dilation gating.
    let lanes = inner.urw_x() * inner.urw_y() * inner.var_product(&[Dim::Urn, Dim::Ue, Dim::Ug]);
    if dilation_x > 1 {
        if lanes == 0 || wu as u64 % lanes != 0 {
            return Err(ElabError::StreamWidthMismatch {
                context: "weight dilation",
                width: wu,
                lanes,
                lane_width: if lanes > 0 { wu / lanes as u32 } else { 0 },
            });
        }
        if lanes % dilation_x != 0 {
            return Err(ElabError::ProjectionExceedsHardware {
                what: "x-dilation over weight sub-lanes",
                requested: dilation_x,
                supported: lanes,
            });
        }
    }
    let lane_w = if lanes > 0 { wu / lanes as u32 } else { wu };

    for ug in 0..proj.ug.value {
        for ue in 0..proj.ue.value {
            for ub in 0..proj.ub.value {
                for urn in 0..proj.urn.value {
                    for urw in 0..proj.urw.value {
                        let out_idx = proj.overall_idx(&[
                            (Dim::Urw, urw),
                            (Dim::Urn, urn),
                            (Dim::Ub, ub),
                            (Dim::Ue, ue),
                            (Dim::Ug, ug),
                        ]);
                        let out = format!("outputs_to_mlb_{}", out_idx);
                        b.add_out_port(&out, p.mlb_width);
                        b.add_in_port(&format!("inputs_from_mlb_{}", out_idx), p.mlb_width);

                        // The stream index excludes UB: positions differing
                        // only in UB share one weight slice.
                        let stream_idx = proj.overall_idx(&[
                            (Dim::Urw, urw),
                            (Dim::Urn, urn),
                            (Dim::Ue, ue),
                            (Dim::Ug, ug),
                        ]);
                        let bus = format!("inputs_from_buffer_{}", stream_idx / streams_per_buffer);
                        let section = (stream_idx % streams_per_buffer) as u32;
                        let base = section * wu;

                        if dilation_x <= 1 {
                            let src = b.this(&bus, base, base + wu);
                            let dst = b.this(&out, 0, wu);
                            b.connect(src, dst);
                        } else {
                            // The buffer stores the compacted kernel; only
                            // sub-lanes landing on a dilated sample connect,
                            // the rest are zero.
                            let mut connected = 0u32;
                            for wx in 0..lanes {
                                let dst = b.this(
                                    &out,
                                    wx as u32 * lane_w,
                                    (wx as u32 + 1) * lane_w,
                                );
                                if (inner.urw_x() * urw + wx) % dilation_x == 0 {
                                    let lo = base + connected * lane_w;
                                    let src = b.this(&bus, lo, lo + lane_w);
                                    b.connect(src, dst);
                                    connected += 1;
                                } else {
                                    b.tie_zero(dst);
                                }
                            }
                        }

                        // The UB=0 member of each sharing group mirrors its
                        // slice back toward the buffers.
                        if ub == 0 {
                            let rb = format!("outputs_to_buffer_{}", stream_idx);
                            b.add_out_port(&rb, wu);
                            let src =
                                b.this(&format!("inputs_from_mlb_{}", out_idx), 0, wu);
                            let dst = b.this(&rb, 0, wu);
                            b.connect(src, dst);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn build_preload(
    b: &mut ModuleBuilder,
    p: &WeightIcParams,
    mlb_count: u64,
    bus_count: u64,
) -> Result<(), ElabError> {
    let wu = p.mlb_width_used;
    let needed_bits = wu as u64 * bus_count;
    let budget_bits = p.num_buffers * p.buffer_width as u64;
    if needed_bits > budget_bits {
        return Err(ElabError::PreloadBudgetExceeded {
            needed_bits,
            budget_bits,
            buffers: p.num_buffers,
        });
    }
    if p.buffer_width < wu {
        return Err(ElabError::BufferTooNarrow {
            buffer_width: p.buffer_width,
            stream_width: wu,
        });
    }

    // Split the used MLBs into one chain per buffer; the first `rem`
    // chains are one longer so that lengths differ by at most one.
    let chains = p.num_buffers;
    let base = mlb_count / chains;
    let rem = mlb_count % chains;
    let mut start = 0u64;
    for c in 0..chains {
        let len = base + if c < rem { 1 } else { 0 };
        for pos in 0..len {
            let idx = start + pos;
            let out = format!("outputs_to_mlb_{}", idx);
            b.add_out_port(&out, p.mlb_width);
            b.add_in_port(&format!("inputs_from_mlb_{}", idx), p.mlb_width);
            let dst = b.this(&out, 0, wu);
            let src = if pos == 0 {
                b.this(&format!("inputs_from_buffer_{}", c), 0, wu)
            } else {
                b.this(&format!("inputs_from_mlb_{}", idx - 1), 0, wu)
            };
            b.connect(src, dst);
        }
        let rb = format!("outputs_to_buffer_{}", c);
        b.add_out_port(&rb, wu);
        let dst = b.this(&rb, 0, wu);
        if len > 0 {
            let tail = format!("inputs_from_mlb_{}", start + len - 1);
            b.add_in_port(&tail, p.mlb_width);
            let src = b.this(&tail, 0, wu);
            b.connect(src, dst);
        } else {
            b.tie_zero(dst);
        }
        start += len;
    }
    Ok(())
}
