//! Input interconnect: routes input activations from buffers to MLBs,
//! implements the URW cascade so a group of MLBs differing only in `urw`
//! share one fetched input, and rotates y-unrolled lanes through NxN muxes
//! when the projection tiles the input feature map along y.

use derive_more::Constructor;

use crate::error::ElabError;
use crate::graph::{Block, Leaf, Module, ModuleBuilder, ModuleKind};
use crate::spec::projection::{Dim, Projection, SubAxis};
use crate::spec::{Direction, PortType};
use crate::utils::calculation::{clog2, div_ceil};

#[derive(Debug, Clone, Copy, Constructor)]
pub struct InputIcParams {
    /// Usable bit-width of each input buffer word (already capped so no
    /// input row straddles two buffers).
    pub buffer_width: u32,
    pub mlb_width: u32,
    pub mlb_width_used: u32,
    pub num_buffers: u64,
    pub num_mlbs: u64,
}

/// Lane linearization order of the inner input streams within one outer
/// stream: channels innermost, then batches, then the y sub-axes, then
/// groups.
const LANE_ORDER: [SubAxis; 5] = [
    SubAxis::UrnChans,
    SubAxis::UbBatches,
    SubAxis::UrnY,
    SubAxis::UbY,
    SubAxis::Ug,
];

pub fn build_input_interconnect(
    p: &InputIcParams,
    proj: &Projection,
    inner: &Projection,
    i_width: u32,
    dilation_y: u64,
) -> Result<Module, ElabError> {
    let wu = p.mlb_width_used;
    if wu > p.mlb_width {
        return Err(ElabError::StreamWidthMismatch {
            context: "input interconnect",
            width: p.mlb_width,
            lanes: 1,
            lane_width: wu,
        });
    }
    let streams_per_buffer = (p.buffer_width / wu) as u64;
    if streams_per_buffer == 0 {
        return Err(ElabError::BufferTooNarrow {
            buffer_width: p.buffer_width,
            stream_width: wu,
        });
    }
    let mlb_count = proj.mlb_count();
    if p.num_mlbs < mlb_count {
        return Err(ElabError::InsufficientMlbs {
            fabric: "input interconnect",
            needed: mlb_count,
            available: p.num_mlbs,
        });
    }
    let stream_count = proj.var_product(&[Dim::Urn, Dim::Ub, Dim::Ug]);
    let needed = div_ceil(stream_count, streams_per_buffer);
    if p.num_buffers < needed {
        return Err(ElabError::InsufficientBuffers {
            fabric: "input interconnect",
            resource: "input buffers",
            needed,
            available: p.num_buffers,
        });
    }

    let mux_size = proj.urn_y() * proj.ub_y() * inner.urn_y() * inner.ub_y();
    let inner_streams = inner.var_product(&[Dim::Urn, Dim::Ub, Dim::Ug]);
    let lane_granular = mux_size > 1 || dilation_y > 1;
    if lane_granular && wu as u64 != inner_streams * i_width as u64 {
        return Err(ElabError::StreamWidthMismatch {
            context: "input interconnect lanes",
            width: wu,
            lanes: inner_streams,
            lane_width: i_width,
        });
    }

    let mut b = ModuleBuilder::new(ModuleKind::Interconnect, "input_interconnect");
    b.add_n_in_ports(p.num_buffers, p.buffer_width, "inputs_from_buffer");
    if mux_size > 1 {
        b.add_port(
            "urn_sel",
            clog2(mux_size).max(1),
            Direction::In,
            PortType::C,
        );
    }

    // Phase 1: MLB ports, cascades, direct head slices and readbacks.
    for ug in 0..proj.ug.value {
        for ue in 0..proj.ue.value {
            for ub in 0..proj.ub.value {
                for urn in 0..proj.urn.value {
                    for urw in 0..proj.urw.value {
                        let mlb_idx = proj.overall_idx(&[
                            (Dim::Urw, urw),
                            (Dim::Urn, urn),
                            (Dim::Ub, ub),
                            (Dim::Ue, ue),
                            (Dim::Ug, ug),
                        ]);
                        let out = format!("outputs_to_mlb_{}", mlb_idx);
                        b.add_out_port(&out, p.mlb_width);
                        b.add_in_port(&format!("inputs_from_mlb_{}", mlb_idx), p.mlb_width);

                        let stream_idx = proj.overall_idx(&[
                            (Dim::Urn, urn),
                            (Dim::Ub, ub),
                            (Dim::Ug, ug),
                        ]);

                        if urw > 0 {
                            // Cascade: reuse the neighbor's freshly fetched
                            // input.
                            let prev = proj.overall_idx(&[
                                (Dim::Urw, urw - 1),
                                (Dim::Urn, urn),
                                (Dim::Ub, ub),
                                (Dim::Ue, ue),
                                (Dim::Ug, ug),
                            ]);
                            let src =
                                b.this(&format!("inputs_from_mlb_{}", prev), 0, wu);
                            let dst = b.this(&out, 0, wu);
                            b.connect(src, dst);
                        } else if mux_size == 1 {
                            connect_head_direct(
                                &mut b,
                                &out,
                                stream_idx,
                                streams_per_buffer,
                                wu,
                                i_width,
                                proj,
                                inner,
                                urn,
                                inner_streams,
                                dilation_y,
                            );
                        }

                        // Tail readback, only from UE=0 to avoid duplicates.
                        if urw == proj.urw.value - 1 && ue == 0 {
                            let rb = format!("outputs_to_buffer_{}", stream_idx);
                            if !b.has_port(&rb) {
                                b.add_out_port(&rb, wu);
                                let src = b.this(
                                    &format!("inputs_from_mlb_{}", mlb_idx),
                                    0,
                                    wu,
                                );
                                let dst = b.this(&rb, 0, wu);
                                b.connect(src, dst);
                            }
                        }
                    }
                }
            }
        }
    }

    // Phase 2: y-rotation muxes, one per compound {UG, UB.batches,
    // URN.chans} index.
    if mux_size > 1 {
        build_y_muxes(
            &mut b,
            p,
            proj,
            inner,
            i_width,
            mux_size,
            streams_per_buffer,
            dilation_y,
        );
    }

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

/// Wire one cascade head straight from its buffer slice, zeroing lanes
/// suppressed by y-dilation.
#[allow(clippy::too_many_arguments)]
fn connect_head_direct(
    b: &mut ModuleBuilder,
    out: &str,
    stream_idx: u64,
    streams_per_buffer: u64,
    wu: u32,
    i_width: u32,
    proj: &Projection,
    inner: &Projection,
    urn: u64,
    inner_streams: u64,
    dilation_y: u64,
) {
    let bus = format!("inputs_from_buffer_{}", stream_idx / streams_per_buffer);
    let base = (stream_idx % streams_per_buffer) as u32 * wu;
    if dilation_y <= 1 {
        let src = b.this(&bus, base, base + wu);
        let dst = b.this(out, 0, wu);
        b.connect(src, dst);
        return;
    }
    // Per-lane gating: a tap participates only when it lands on a dilated
    // row of the kernel sweep.
    let urny = urn / proj.urn_chans();
    let reqd_urw = inner.urw.value;
    for li in 0..inner_streams {
        let r = inner_lane_y(inner, li);
        let lo = li as u32 * i_width;
        let dst = b.this(out, lo, lo + i_width);
        if (urny * reqd_urw + r) % dilation_y == 0 {
            let src = b.this(&bus, base + lo, base + lo + i_width);
            b.connect(src, dst);
        } else {
            b.tie_zero(dst);
        }
    }
}

/// URN.y sub-index of an inner lane.
fn inner_lane_y(inner: &Projection, lane: u64) -> u64 {
    let chans = inner.urn_chans();
    let batches = inner.ub_batches();
    (lane / (chans * batches)) % inner.urn_y()
}

#[allow(clippy::too_many_arguments)]
fn build_y_muxes(
    b: &mut ModuleBuilder,
    p: &InputIcParams,
    proj: &Projection,
    inner: &Projection,
    i_width: u32,
    mux_size: u64,
    streams_per_buffer: u64,
    dilation_y: u64,
) {
    let inner_y = inner.urn_y() * inner.ub_y();
    let reqd_urw = inner.urw.value;
    let mut mux_no = 0u64;
    for go in 0..proj.ug.value {
        for gi in 0..inner.ug.value {
            for bo in 0..proj.ub_batches() {
                for bi in 0..inner.ub_batches() {
                    for co in 0..proj.urn_chans() {
                        for ci in 0..inner.urn_chans() {
                            let mux = b.add_instance(
                                format!("mux{}x{}_{}", mux_size, mux_size, mux_no),
                                Block::Leaf(Leaf::mux_n_x_n(mux_size, i_width)),
                            );
                            mux_no += 1;
                            let sel_w = clog2(mux_size).max(1);
                            let src = b.this("urn_sel", 0, sel_w);
                            let dst = b.child(mux, "sel", 0, sel_w);
                            b.connect(src, dst);

                            for y in 0..mux_size {
                                let (y_out, y_in) = (y / inner_y, y % inner_y);
                                let (y_n_o, y_b_o) =
                                    (y_out % proj.urn_y(), y_out / proj.urn_y());
                                let (y_n_i, y_b_i) =
                                    (y_in % inner.urn_y(), y_in / inner.urn_y());

                                let urn = co + proj.urn_chans() * y_n_o;
                                let ub = bo + proj.ub_batches() * y_b_o;
                                let stream_idx = proj.overall_idx(&[
                                    (Dim::Urn, urn),
                                    (Dim::Ub, ub),
                                    (Dim::Ug, go),
                                ]);
                                let lane = inner.overall_idx_sub(
                                    &[
                                        (SubAxis::UrnChans, ci),
                                        (SubAxis::UbBatches, bi),
                                        (SubAxis::UrnY, y_n_i),
                                        (SubAxis::UbY, y_b_i),
                                        (SubAxis::Ug, gi),
                                    ],
                                    &LANE_ORDER,
                                );
                                let lane_lo = lane as u32 * i_width;

                                // Mux input y: the buffer slice holding this
                                // group's value in y-row y.
                                let dst = b.child(mux, &format!("in_{}", y), 0, i_width);
                                if dilation_y > 1
                                    && (y_n_o * reqd_urw + y_n_i) % dilation_y != 0
                                {
                                    b.tie_zero(dst);
                                } else {
                                    let bus = format!(
                                        "inputs_from_buffer_{}",
                                        stream_idx / streams_per_buffer
                                    );
                                    let base = (stream_idx % streams_per_buffer) as u32
                                        * p.mlb_width_used;
                                    let src =
                                        b.this(&bus, base + lane_lo, base + lane_lo + i_width);
                                    b.connect(src, dst);
                                }

                                // Mux output y drives the same lane of every
                                // cascade head at that y position, shared
                                // across UE.
                                for ue in 0..proj.ue.value {
                                    let head = proj.overall_idx(&[
                                        (Dim::Urw, 0),
                                        (Dim::Urn, urn),
                                        (Dim::Ub, ub),
                                        (Dim::Ue, ue),
                                        (Dim::Ug, go),
                                    ]);
                                    let src = b.child(mux, &format!("out_{}", y), 0, i_width);
                                    let dst = b.this(
                                        &format!("outputs_to_mlb_{}", head),
                                        lane_lo,
                                        lane_lo + i_width,
                                    );
                                    b.connect(src, dst);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
