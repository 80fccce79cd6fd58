//! Output / partial-sum interconnect: chains partial sums through URW*URN
//! MLBs, optionally seeds the chain head from a partial-sum load buffer,
//! and slices the chain tail into activation-function inputs.

use derive_more::Constructor;

use crate::error::ElabError;
use crate::graph::{Module, ModuleBuilder, ModuleKind};
use crate::spec::projection::{Dim, Projection};

#[derive(Debug, Clone, Copy, Constructor)]
pub struct OutputPsParams {
    /// Bit-width of one activation-function input.
    pub af_width: u32,
    pub mlb_width: u32,
    pub mlb_width_used: u32,
    pub num_afs: u64,
    pub num_mlbs: u64,
}

/// Optional partial-sum preload path feeding the chain heads.
#[derive(Debug, Clone, Copy, Constructor)]
pub struct PsLoad {
    pub num_buffers: u64,
    pub buffer_width: u32,
}

pub fn build_output_ps_interconnect(
    p: &OutputPsParams,
    proj: &Projection,
    ps_load: Option<&PsLoad>,
) -> Result<Module, ElabError> {
    let wu = p.mlb_width_used;
    if wu > p.mlb_width {
        return Err(ElabError::StreamWidthMismatch {
            context: "output interconnect",
            width: p.mlb_width,
            lanes: 1,
            lane_width: wu,
        });
    }
    if p.af_width == 0 || wu % p.af_width != 0 {
        return Err(ElabError::StreamWidthMismatch {
            context: "output interconnect activations",
            width: wu,
            lanes: (wu / p.af_width.max(1)) as u64,
            lane_width: p.af_width,
        });
    }
    let acts_per_stream = (wu / p.af_width) as u64;
    let mlb_count = proj.mlb_count();
    if p.num_mlbs < mlb_count {
        return Err(ElabError::InsufficientMlbs {
            fabric: "output interconnect",
            needed: mlb_count,
            available: p.num_mlbs,
        });
    }
    let chain_count = proj.var_product(&[Dim::Ue, Dim::Ub, Dim::Ug]);
    let needed_afs = chain_count * acts_per_stream;
    if p.num_afs < needed_afs {
        return Err(ElabError::InsufficientBuffers {
            fabric: "output interconnect",
            resource: "activation functions",
            needed: needed_afs,
            available: p.num_afs,
        });
    }
    let chains_per_psbuf = match ps_load {
        Some(ps) => {
            let n = (ps.buffer_width / wu) as u64;
            if n == 0 {
                return Err(ElabError::BufferTooNarrow {
                    buffer_width: ps.buffer_width,
                    stream_width: wu,
                });
            }
            let needed = crate::utils::calculation::div_ceil(chain_count, n);
            if ps.num_buffers < needed {
                return Err(ElabError::InsufficientBuffers {
                    fabric: "output interconnect",
                    resource: "partial-sum buffers",
                    needed,
                    available: ps.num_buffers,
                });
            }
            n
        }
        None => 0,
    };

    let mut b = ModuleBuilder::new(ModuleKind::Interconnect, "output_ps_interconnect");
    b.add_n_out_ports(p.num_afs, p.af_width, "outputs_to_afs");
    if let Some(ps) = ps_load {
        b.add_n_in_ports(ps.num_buffers, ps.buffer_width, "inputs_from_psbuf");
    }

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
                        let input = format!("inputs_from_mlb_{}", mlb_idx);
                        b.add_in_port(&input, p.mlb_width);

                        // Chain tail: slice the accumulated sum into
                        // activation inputs.
                        if urw == proj.urw.value - 1 && urn == proj.urn.value - 1 {
                            let stream_idx = proj.overall_idx(&[
                                (Dim::Ub, ub),
                                (Dim::Ue, ue),
                                (Dim::Ug, ug),
                            ]);
                            for part in 0..acts_per_stream {
                                let af =
                                    format!("outputs_to_afs_{}", stream_idx * acts_per_stream + part);
                                let lo = part as u32 * p.af_width;
                                let src = b.this(&input, lo, lo + p.af_width);
                                let dst = b.this(&af, 0, p.af_width);
                                b.connect(src, dst);
                            }
                        }

                        if urw > 0 || urn > 0 {
                            // Forward the partial sum along the chain.
                            let prev = if urw > 0 {
                                proj.overall_idx(&[
                                    (Dim::Urw, urw - 1),
                                    (Dim::Urn, urn),
                                    (Dim::Ub, ub),
                                    (Dim::Ue, ue),
                                    (Dim::Ug, ug),
                                ])
                            } else {
                                proj.overall_idx(&[
                                    (Dim::Urw, proj.urw.value - 1),
                                    (Dim::Urn, urn - 1),
                                    (Dim::Ub, ub),
                                    (Dim::Ue, ue),
                                    (Dim::Ug, ug),
                                ])
                            };
                            let src = b.this(&format!("inputs_from_mlb_{}", prev), 0, wu);
                            let dst = b.this(&out, 0, wu);
                            b.connect(src, dst);
                        } else if let Some(_ps) = ps_load {
                            // Chain head seeded with a preloaded partial sum.
                            let stream_idx = proj.overall_idx(&[
                                (Dim::Ub, ub),
                                (Dim::Ue, ue),
                                (Dim::Ug, ug),
                            ]);
                            let bus = format!(
                                "inputs_from_psbuf_{}",
                                stream_idx / chains_per_psbuf
                            );
                            let base = (stream_idx % chains_per_psbuf) as u32 * wu;
                            let src = b.this(&bus, base, base + wu);
                            let dst = b.this(&out, 0, wu);
                            b.connect(src, dst);
                        } else {
                            let dst = b.this(&out, 0, wu);
                            b.tie_zero(dst);
                        }
                    }
                }
            }
        }
    }

    // Unused activation outputs and MLB positions read as zero.
    for j in 0..p.num_afs {
        let af = format!("outputs_to_afs_{}", j);
        if !b.dst_connected(None, &af) {
            let dst = b.this(&af, 0, p.af_width);
            b.tie_zero(dst);
        }
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
