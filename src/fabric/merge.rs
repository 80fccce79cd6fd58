//! MergeBusses: pack narrow lanes little-endian into wider output words.

use derive_more::Constructor;

use crate::error::ElabError;
use crate::graph::{Module, ModuleBuilder, ModuleKind};

#[derive(Debug, Clone, Copy, Constructor)]
pub struct MergeParams {
    pub in_width: u32,
    pub num_ins: u64,
    pub out_width: u32,
    pub num_outs: u64,
    /// Lanes packed per output word; the densest packing by default.
    pub ins_per_out: Option<u32>,
}

pub fn build_merge_busses(p: &MergeParams) -> Result<Module, ElabError> {
    let ins_per_out = match p.ins_per_out {
        Some(n) => n,
        None => p.out_width / p.in_width.max(1),
    };
    if p.in_width == 0 || ins_per_out == 0 {
        return Err(ElabError::BufferTooNarrow {
            buffer_width: p.out_width,
            stream_width: p.in_width,
        });
    }
    if ins_per_out * p.in_width > p.out_width {
        return Err(ElabError::StreamWidthMismatch {
            context: "merge busses",
            width: p.out_width,
            lanes: ins_per_out as u64,
            lane_width: p.in_width,
        });
    }

    let mut b = ModuleBuilder::new(ModuleKind::Interconnect, "merge_busses");
    b.add_n_in_ports(p.num_ins, p.in_width, "input");
    b.add_n_out_ports(p.num_outs, p.out_width, "output");

    // Lanes beyond the packing capacity are dropped.
    let wired = p.num_ins.min(ins_per_out as u64 * p.num_outs);
    for inp in 0..wired {
        let bus = inp / ins_per_out as u64;
        let slot = (inp % ins_per_out as u64) as u32;
        let src = b.this(&format!("input_{}", inp), 0, p.in_width);
        let dst = b.this(
            &format!("output_{}", bus),
            slot * p.in_width,
            (slot + 1) * p.in_width,
        );
        b.connect(src, dst);
    }

    // Zero-fill above the last wired lane of each word, and whole unused
    // words.
    for bus in 0..p.num_outs {
        let filled = wired
            .saturating_sub(bus * ins_per_out as u64)
            .min(ins_per_out as u64) as u32;
        if filled * p.in_width < p.out_width {
            let dst = b.this(
                &format!("output_{}", bus),
                filled * p.in_width,
                p.out_width,
            );
            b.tie_zero(dst);
        }
    }
    Ok(b.finish())
}
