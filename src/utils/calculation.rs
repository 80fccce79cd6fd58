//! Bus and count arithmetic shared by the fabrics and the datapath.

use crate::error::ElabError;
use crate::spec::projection::{Dim, Dtype, ProjectionSpec};
use crate::spec::HwbSpec;

/// Ceiling of `a / b`. Counts how many `b`-sized groups cover `a` items.
pub fn div_ceil(a: u64, b: u64) -> u64 {
    assert!(b > 0, "group size must be nonzero");
    (a + b - 1) / b
}

/// Number of select bits needed to distinguish `n` choices.
pub fn clog2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// Number of buffers required so that `stream_count` streams of
/// `stream_width` bits each land entirely inside one buffer word. An
/// optional cap restricts the usable part of the buffer word.
pub fn num_buffers_reqd(
    buf_spec: &HwbSpec,
    stream_count: u64,
    stream_width: u32,
    max_bus_width: Option<u32>,
) -> Result<u64, ElabError> {
    let usable = match max_bus_width {
        Some(cap) => buf_spec.data_out_width().min(cap),
        None => buf_spec.data_out_width(),
    };
    let streams_per_buffer = (usable / stream_width.max(1)) as u64;
    if stream_width == 0 || streams_per_buffer == 0 {
        return Err(ElabError::BufferTooNarrow {
            buffer_width: usable,
            stream_width,
        });
    }
    Ok(div_ceil(stream_count, streams_per_buffer))
}

/// Largest power-of-two fraction of `buffer_width` whose stream capacity
/// lines up with the per-row stream group of the projection, so that a
/// single input row is never sliced across two buffers.
pub fn max_input_bus_width(buffer_width: u32, proj: &ProjectionSpec) -> u32 {
    let stream_width = proj.inner_bus_width(Dtype::I);
    if stream_width == 0 || buffer_width < stream_width {
        return buffer_width;
    }
    let outer = &proj.outer_projection;
    let outer_streams = outer.var_product(&[Dim::Urn, Dim::Ub, Dim::Ug]);
    let outer_y = outer.urn_y() * outer.ub_y();
    let streams_per_row = (outer_streams / outer_y).max(1);

    let mut width = buffer_width;
    while width >= stream_width {
        let streams_per_buffer = (width / stream_width) as u64;
        if streams_per_row % streams_per_buffer == 0 || streams_per_buffer % streams_per_row == 0 {
            return width;
        }
        width /= 2;
    }
    stream_width
}

/// For each input buffer, the y-coordinate of the first input-tile row it
/// holds. The input fabric's muxing must agree with this packing.
pub fn buffer_idx_to_y_idx(
    proj: &ProjectionSpec,
    ibuf_count: u64,
    ivalues_per_buf: u64,
) -> Vec<u64> {
    let outer = &proj.outer_projection;
    let inner = &proj.inner_projection;
    let inner_count = inner.stream_count(Dtype::I).max(1);
    let streams_per_buf = (ivalues_per_buf / inner_count).max(1);
    let urn = outer.urn.value;
    let ub = outer.ub.value;
    let inner_y = inner.urn_y() * inner.ub_y();

    (0..ibuf_count)
        .map(|b| {
            let s0 = b * streams_per_buf;
            let urn_idx = s0 % urn;
            let rest = s0 / urn;
            let ub_idx = rest % ub;
            let y_n = urn_idx / outer.urn_chans();
            let y_b = ub_idx / outer.ub_batches();
            let y_outer = y_n + outer.urn_y() * y_b;
            y_outer * inner_y
        })
        .collect()
}
