//! The mapping enumerator: exhaustively factor a seven-dimensional
//! convolutional loop nest into outer (across-MLB), inner (within-MLB) and
//! temporal tiles, filter by hardware constraints, and score throughput.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::spec::HwbSpec;

/// A convolutional workload: batch, input channels, output channels,
/// planar x/y, receptive field x/y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    #[serde(rename = "B")]
    pub b: u64,
    #[serde(rename = "C")]
    pub c: u64,
    #[serde(rename = "E")]
    pub e: u64,
    #[serde(rename = "PX")]
    pub px: u64,
    #[serde(rename = "PY")]
    pub py: u64,
    #[serde(rename = "RX")]
    pub rx: u64,
    #[serde(rename = "RY")]
    pub ry: u64,
}

impl Workload {
    pub fn axes(&self) -> [u64; 7] {
        [self.b, self.c, self.e, self.px, self.py, self.rx, self.ry]
    }

    /// Total MAC operations in the workload.
    pub fn ops(&self) -> u64 {
        self.axes().iter().product()
    }
}

pub const AXIS_NAMES: [&str; 7] = ["B", "C", "E", "PX", "PY", "RX", "RY"];

/// One factorization: for each workload axis, an outer spatial factor, an
/// inner spatial factor and a temporal tile count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(rename = "BO")]
    pub bo: u64,
    #[serde(rename = "BI")]
    pub bi: u64,
    #[serde(rename = "BT")]
    pub bt: u64,
    #[serde(rename = "CO")]
    pub co: u64,
    #[serde(rename = "CI")]
    pub ci: u64,
    #[serde(rename = "CT")]
    pub ct: u64,
    #[serde(rename = "EO")]
    pub eo: u64,
    #[serde(rename = "EI")]
    pub ei: u64,
    #[serde(rename = "ET")]
    pub et: u64,
    #[serde(rename = "PXO")]
    pub pxo: u64,
    #[serde(rename = "PXI")]
    pub pxi: u64,
    #[serde(rename = "PXT")]
    pub pxt: u64,
    #[serde(rename = "PYO")]
    pub pyo: u64,
    #[serde(rename = "PYI")]
    pub pyi: u64,
    #[serde(rename = "PYT")]
    pub pyt: u64,
    #[serde(rename = "RXO")]
    pub rxo: u64,
    #[serde(rename = "RXI")]
    pub rxi: u64,
    #[serde(rename = "RXT")]
    pub rxt: u64,
    #[serde(rename = "RYO")]
    pub ryo: u64,
    #[serde(rename = "RYI")]
    pub ryi: u64,
    #[serde(rename = "RYT")]
    pub ryt: u64,
}

impl Mapping {
    pub fn outer_product(&self) -> u64 {
        self.bo * self.co * self.eo * self.pxo * self.pyo * self.rxo * self.ryo
    }

    pub fn inner_product(&self) -> u64 {
        self.bi * self.ci * self.ei * self.pxi * self.pyi * self.rxi * self.ryi
    }

    pub fn temporal_product(&self) -> u64 {
        self.bt * self.ct * self.et * self.pxt * self.pyt * self.rxt * self.ryt
    }

    fn from_triples(t: &[(u64, u64, u64)]) -> Self {
        Mapping {
            bo: t[0].0,
            bi: t[0].1,
            bt: t[0].2,
            co: t[1].0,
            ci: t[1].1,
            ct: t[1].2,
            eo: t[2].0,
            ei: t[2].1,
            et: t[2].2,
            pxo: t[3].0,
            pxi: t[3].1,
            pxt: t[3].2,
            pyo: t[4].0,
            pyi: t[4].1,
            pyt: t[4].2,
            rxo: t[5].0,
            rxi: t[5].1,
            rxt: t[5].2,
            ryo: t[6].0,
            ryi: t[6].1,
            ryt: t[6].2,
        }
    }
}

/// Search controls. `preload_o` / `preload_i` of -1 model a fully resident
/// output / input tile (no reload traffic between temporal tiles).
#[derive(Debug, Clone, Default)]
pub struct MappingOptions {
    pub suggested: Option<Mapping>,
    pub preload_o: i64,
    pub preload_i: i64,
}

impl MappingOptions {
    pub fn new() -> Self {
        MappingOptions {
            suggested: None,
            preload_o: 1,
            preload_i: 1,
        }
    }
}

/// Native per-dimension sweep capacities of the block, taken from
/// `possible_projections` when present and from the access-pattern weights
/// otherwise.
#[derive(Debug, Clone, Copy)]
struct Caps {
    urw: u64,
    urn: u64,
    ue: u64,
    ub: u64,
    ug: u64,
    weights: [u64; 5],
}

impl Caps {
    fn of(hwb: &HwbSpec) -> Caps {
        if let Some(p) = &hwb.possible_projections {
            return Caps {
                urw: p.urw.max(1),
                urn: p.urn.max(1),
                ue: p.ue.max(1),
                ub: p.ub.max(1),
                ug: p.ug.max(1),
                weights: [
                    p.urw.max(1),
                    p.urn.max(1),
                    p.ue.max(1),
                    p.ub.max(1),
                    p.ug.max(1),
                ],
            };
        }
        if let Some(ap) = &hwb.access_patterns {
            return Caps {
                urw: ap.ap1.max(1),
                urn: ap.ap2.max(1),
                ue: ap.ap3.max(1),
                ub: ap.ap4.max(1),
                ug: ap.ap5.max(1),
                weights: [
                    ap.ap1.max(1),
                    ap.ap2.max(1),
                    ap.ap3.max(1),
                    ap.ap4.max(1),
                    ap.ap5.max(1),
                ],
            };
        }
        Caps {
            urw: u64::MAX,
            urn: u64::MAX,
            ue: u64::MAX,
            ub: u64::MAX,
            ug: u64::MAX,
            weights: [1; 5],
        }
    }
}

/// Access-pattern cost of the inner factorization after folding: the
/// weighted overflow beyond the native capacities. `None` means the
/// factorization cannot be expressed at all (both URW and URN overflow).
fn access_pattern_cost(caps: &Caps, m: &Mapping) -> Option<u64> {
    let mut urw = m.rxi;
    let mut urn = m.ci * m.ryi;
    let mut ue = m.ei;
    let mut ub = m.bi * m.pxi * m.pyi;
    let mut ug = 1u64;

    // A URW overflow folds into URN, but only when the block has no native
    // URW sweep; if URN overflows too the order of folding would matter, so
    // reject outright.
    if urw > caps.urw && caps.urw == 1 {
        if urn > caps.urn {
            return None;
        }
        urn *= urw;
        urw = 1;
    }
    // URN, UB and UE overflows fold into the group dimension when the
    // native axis is degenerate.
    if urn > caps.urn && caps.urn == 1 {
        ug *= urn;
        urn = 1;
    }
    if ub > caps.ub && caps.ub == 1 {
        ug *= ub;
        ub = 1;
    }
    if ue > caps.ue && caps.ue == 1 {
        ug *= ue;
        ue = 1;
    }

    let reqs = [urw, urn, ue, ub, ug];
    let capv = [caps.urw, caps.urn, caps.ue, caps.ub, caps.ug];
    let mut cost = 0u64;
    for d in 0..5 {
        if reqs[d] > capv[d] {
            cost += caps.weights[d] * (reqs[d] - capv[d]);
        }
    }
    Some(cost)
}

/// Estimated cycle count of a mapping: temporal steps, plus weight-tile
/// reload traffic, plus input and partial-sum re-streaming unless the
/// corresponding tile is resident. An access-pattern violation scales the
/// whole count.
fn cycle_count(m: &Mapping, opts: &MappingOptions, cost: u64) -> u64 {
    let steps = m.temporal_product();
    let weight_swaps = m.ct * m.et * m.rxt * m.ryt;
    let weight_tile = m.ci * m.ei * m.rxi * m.ryi;
    let weight_load = weight_swaps * weight_tile;
    let input_reload = if opts.preload_i == -1 {
        0
    } else {
        (m.et - 1) * m.bt * m.ct * m.pxt * m.pyt
    };
    let ps_reload = if opts.preload_o == -1 {
        0
    } else {
        (m.ct * m.rxt * m.ryt - 1) * m.bt * m.et * m.pxt * m.pyt
    };
    (steps + weight_load + input_reload + ps_reload) * (1 + cost)
}

/// Throughput figure of one mapping: MAC operations per thousand cycles.
fn score(w: &Workload, m: &Mapping, opts: &MappingOptions, cost: u64) -> u64 {
    let cycles = cycle_count(m, opts, cost).max(1);
    ((w.ops() as u128 * 1000) / cycles as u128) as u64
}

/// All ordered factor triples (outer, inner, temporal) of `n`, in
/// lexicographic (outer, inner) order.
fn factor_triples(n: u64) -> Vec<(u64, u64, u64)> {
    let divisors: Vec<u64> = (1..=n).filter(|d| n % d == 0).collect();
    let mut triples = Vec::new();
    for &o in &divisors {
        let rest = n / o;
        for i in (1..=rest).filter(|d| rest % d == 0) {
            triples.push((o, i, rest / i));
        }
    }
    triples
}

fn admit(
    hwb: &HwbSpec,
    caps: &Caps,
    num_units: u64,
    mlb_budget: u64,
    soft: bool,
    m: &Mapping,
) -> Option<u64> {
    if m.inner_product() > num_units {
        return None;
    }
    if m.outer_product() > mlb_budget {
        return None;
    }
    // Temporal splits of the reduction axes only make sense when the block
    // can accumulate outputs across tiles.
    if m.ct * m.rxt * m.ryt > 1 && !hwb.output_accumulator {
        return None;
    }
    let cost = access_pattern_cost(caps, m)?;
    if cost > 0 && !soft {
        return None;
    }
    Some(cost)
}

/// Enumerate all admissible mappings of `workload` onto `hwb` with at most
/// `mlb_budget` MLBs, returning the mappings in generation order together
/// with the best throughput figure (0 when the feasible set is empty).
pub fn find_mappings(
    hwb: &HwbSpec,
    workload: &Workload,
    mlb_budget: u64,
    soft: bool,
    opts: &MappingOptions,
) -> Result<(Vec<Mapping>, u64), MappingError> {
    for (axis, name) in workload.axes().iter().zip(AXIS_NAMES) {
        if *axis == 0 {
            return Err(MappingError::InvalidWorkload(name));
        }
    }
    if mlb_budget < 1 {
        return Err(MappingError::InvalidBudget);
    }
    let num_units = hwb.mac_info.map(|m| m.num_units).unwrap_or(mlb_budget);
    let caps = Caps::of(hwb);

    let mut mappings = Vec::new();
    let mut best = 0u64;

    // A caller-suggested mapping seeds the result so its score is always
    // represented, even when it violates the hard constraints.
    if let Some(s) = opts.suggested {
        let cost = access_pattern_cost(&caps, &s).unwrap_or(0);
        best = best.max(score(workload, &s, opts, cost));
        mappings.push(s);
    }

    let per_axis: Vec<Vec<(u64, u64, u64)>> = workload
        .axes()
        .iter()
        .map(|n| {
            factor_triples(*n)
                .into_iter()
                .filter(|(_, i, _)| *i <= num_units)
                .collect()
        })
        .collect();

    for combo in per_axis
        .iter()
        .map(|v| v.iter().copied())
        .multi_cartesian_product()
    {
        let m = Mapping::from_triples(&combo);
        if let Some(cost) = admit(hwb, &caps, num_units, mlb_budget, soft, &m) {
            best = best.max(score(workload, &m, opts, cost));
            mappings.push(m);
        }
    }

    if mappings.is_empty() {
        return Ok((Vec::new(), 0));
    }
    Ok((mappings, best))
}
