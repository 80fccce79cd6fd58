//! The four interconnect fabrics. Each solves one constrained wiring
//! problem: map per-MLB streams onto wider buffer or activation ports while
//! honoring unrolling factors, preload chains, dilation and spatial reuse.

pub mod input;
pub mod merge;
pub mod output_ps;
pub mod weight;
