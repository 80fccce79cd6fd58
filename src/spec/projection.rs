//! Projection definitions and the index arithmetic over unrolling factors.
//!
//! A projection assigns an unrolling factor to each of the five loop
//! dimensions URW, URN, UB, UE, UG. Every fabric derives its bus indexes
//! from the functions here, so this module is the single source of truth
//! for how a logical loop index maps to a physical bus index.

use serde::{Deserialize, Serialize};

use super::DataWidths;
use crate::error::ElabError;

/// The five loop dimensions of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dim {
    Urw,
    Urn,
    Ub,
    Ue,
    Ug,
}

/// Canonical mixed-radix order for instance numbering: URW is the innermost
/// (fastest varying) dimension, UG the outermost.
pub const IDX_ORDER: [Dim; 5] = [Dim::Urw, Dim::Urn, Dim::Ue, Dim::Ub, Dim::Ug];

/// Streamed datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    W,
    I,
    O,
}

/// One unrolling factor. Sub-axes further decompose `value` for addressing:
/// URW may carry {x, y}, URN {chans, y}, UB {batches, y}. An absent y
/// defaults to 1 and the absent primary sub-axis to `value / y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chans: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batches: Option<u64>,
}

impl Factor {
    pub fn new(value: u64) -> Self {
        Factor {
            value,
            x: None,
            y: None,
            chans: None,
            batches: None,
        }
    }
}

impl Default for Factor {
    fn default() -> Self {
        Factor::new(1)
    }
}

/// A datatype that is preloaded over `bus_count` external buses rather than
/// streamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preload {
    pub dtype: Dtype,
    pub bus_count: u64,
}

fn one() -> u64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dilation {
    #[serde(default = "one")]
    pub x: u64,
    #[serde(default = "one")]
    pub y: u64,
}

impl Default for Dilation {
    fn default() -> Self {
        Dilation { x: 1, y: 1 }
    }
}

/// Unrolling factors of one level (within one MLB, or across the array).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Projection {
    #[serde(rename = "URW", default)]
    pub urw: Factor,
    #[serde(rename = "URN", default)]
    pub urn: Factor,
    #[serde(rename = "UB", default)]
    pub ub: Factor,
    #[serde(rename = "UE", default)]
    pub ue: Factor,
    #[serde(rename = "UG", default)]
    pub ug: Factor,
    #[serde(rename = "PRELOAD", default, skip_serializing_if = "Vec::is_empty")]
    pub preload: Vec<Preload>,
}

/// Sub-axis identifiers used by the finer-grained index encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAxis {
    UrwX,
    UrwY,
    UrnChans,
    UrnY,
    UbBatches,
    UbY,
    Ug,
    Ue,
}

/// Sub-axis radix order used by the input fabric, innermost first.
pub const INPUT_ORDER: [SubAxis; 7] = [
    SubAxis::UrwX,
    SubAxis::UrnChans,
    SubAxis::UbBatches,
    SubAxis::UrnY,
    SubAxis::UbY,
    SubAxis::Ug,
    SubAxis::Ue,
];

impl Projection {
    /// Convenience constructor used pervasively by tests.
    pub fn simple(urw: u64, urn: u64, ub: u64, ue: u64, ug: u64) -> Self {
        Projection {
            urw: Factor::new(urw),
            urn: Factor::new(urn),
            ub: Factor::new(ub),
            ue: Factor::new(ue),
            ug: Factor::new(ug),
            preload: Vec::new(),
        }
    }

    pub fn factor(&self, d: Dim) -> &Factor {
        match d {
            Dim::Urw => &self.urw,
            Dim::Urn => &self.urn,
            Dim::Ub => &self.ub,
            Dim::Ue => &self.ue,
            Dim::Ug => &self.ug,
        }
    }

    /// Product of the factor values of a subset of dimensions.
    pub fn var_product(&self, dims: &[Dim]) -> u64 {
        dims.iter().map(|d| self.factor(*d).value).product()
    }

    /// Number of inner instances this projection spreads over.
    pub fn mlb_count(&self) -> u64 {
        self.var_product(&IDX_ORDER)
    }

    pub fn preload_count(&self, t: Dtype) -> Option<u64> {
        self.preload
            .iter()
            .find(|p| p.dtype == t)
            .map(|p| p.bus_count)
    }

    /// Number of independent streams of datatype `t` at this level's
    /// boundary. Preloaded datatypes are overridden by their bus count.
    pub fn stream_count(&self, t: Dtype) -> u64 {
        if let Some(n) = self.preload_count(t) {
            return n;
        }
        match t {
            Dtype::W => self.var_product(&[Dim::Urw, Dim::Urn, Dim::Ue, Dim::Ug]),
            Dtype::I => self.var_product(&[Dim::Urn, Dim::Ub, Dim::Ug]),
            Dtype::O => self.var_product(&[Dim::Ue, Dim::Ub, Dim::Ug]),
        }
    }

    /// Cascade chain length for datatype `t`.
    pub fn chain_length(&self, t: Dtype) -> u64 {
        match t {
            Dtype::W | Dtype::I => self.var_product(&[Dim::Urw]),
            Dtype::O => self.var_product(&[Dim::Urw, Dim::Urn]),
        }
    }

    /// Instance number of the position given by `idxs`, encoded in the
    /// canonical mixed-radix order. Dimensions absent from `idxs` contribute
    /// neither an offset nor a radix step.
    pub fn overall_idx(&self, idxs: &[(Dim, u64)]) -> u64 {
        let mut product = 1u64;
        let mut total = 0u64;
        for d in IDX_ORDER {
            if let Some((_, i)) = idxs.iter().find(|(dim, _)| *dim == d) {
                let value = self.factor(d).value;
                debug_assert!(*i < value, "index out of range along {:?}", d);
                total += product * i;
                product *= value;
            }
        }
        total
    }

    pub fn urw_x(&self) -> u64 {
        let y = self.urw.y.unwrap_or(1);
        self.urw.x.unwrap_or(self.urw.value / y)
    }

    pub fn urw_y(&self) -> u64 {
        self.urw.y.unwrap_or(1)
    }

    pub fn urn_chans(&self) -> u64 {
        let y = self.urn.y.unwrap_or(1);
        self.urn.chans.unwrap_or(self.urn.value / y)
    }

    pub fn urn_y(&self) -> u64 {
        self.urn.y.unwrap_or(1)
    }

    pub fn ub_batches(&self) -> u64 {
        let y = self.ub.y.unwrap_or(1);
        self.ub.batches.unwrap_or(self.ub.value / y)
    }

    pub fn ub_y(&self) -> u64 {
        self.ub.y.unwrap_or(1)
    }

    pub fn sub_size(&self, s: SubAxis) -> u64 {
        match s {
            SubAxis::UrwX => self.urw_x(),
            SubAxis::UrwY => self.urw_y(),
            SubAxis::UrnChans => self.urn_chans(),
            SubAxis::UrnY => self.urn_y(),
            SubAxis::UbBatches => self.ub_batches(),
            SubAxis::UbY => self.ub_y(),
            SubAxis::Ug => self.ug.value,
            SubAxis::Ue => self.ue.value,
        }
    }

    /// Mixed-radix encoding over sub-axes in a caller-supplied order,
    /// innermost first. Every axis in `order` contributes a radix step;
    /// axes missing from `idxs` contribute index 0.
    pub fn overall_idx_sub(&self, idxs: &[(SubAxis, u64)], order: &[SubAxis]) -> u64 {
        let mut product = 1u64;
        let mut total = 0u64;
        for s in order {
            let size = self.sub_size(*s);
            if let Some((_, i)) = idxs.iter().find(|(axis, _)| axis == s) {
                debug_assert!(*i < size, "sub-index out of range along {:?}", s);
                total += product * i;
            }
            product *= size;
        }
        total
    }

    /// Check that declared sub-axes multiply back to the factor values.
    pub fn validate(&self) -> Result<(), ElabError> {
        let checks = [
            ("URW", self.urw.value, self.urw_x() * self.urw_y()),
            ("URN", self.urn.value, self.urn_chans() * self.urn_y()),
            ("UB", self.ub.value, self.ub_batches() * self.ub_y()),
        ];
        for (name, value, product) in checks {
            if value == 0 {
                return Err(ElabError::InvalidSpec(format!("{} factor is zero", name)));
            }
            if product != value {
                return Err(ElabError::InvalidSpec(format!(
                    "{} sub-axes multiply to {}, expected {}",
                    name, product, value
                )));
            }
        }
        if self.ue.value == 0 || self.ug.value == 0 {
            return Err(ElabError::InvalidSpec("UE/UG factor is zero".to_string()));
        }
        Ok(())
    }
}

/// A compound projection: the across-MLB (outer) and within-MLB (inner)
/// unrolling factors plus the stream metadata shared by both levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_function: Option<String>,
    pub stream_info: DataWidths,
    pub inner_projection: Projection,
    pub outer_projection: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilation: Option<Dilation>,
}

impl ProjectionSpec {
    pub fn dilation(&self) -> Dilation {
        self.dilation.unwrap_or_default()
    }

    pub fn stream_width(&self, t: Dtype) -> u32 {
        match t {
            Dtype::W => self.stream_info.w,
            Dtype::I => self.stream_info.i,
            Dtype::O => self.stream_info.o,
        }
    }

    /// Width of one outer-level stream of datatype `t`: the number of inner
    /// streams times the per-value width.
    pub fn inner_bus_width(&self, t: Dtype) -> u32 {
        (self.inner_projection.stream_count(t) as u32) * self.stream_width(t)
    }

    /// Total y-axis multiplicity of the input tile across both levels.
    pub fn total_input_y(&self) -> u64 {
        self.outer_projection.urn_y()
            * self.outer_projection.ub_y()
            * self.inner_projection.urn_y()
            * self.inner_projection.ub_y()
    }

    pub fn validate(&self) -> Result<(), ElabError> {
        self.inner_projection.validate()?;
        self.outer_projection.validate()
    }
}
