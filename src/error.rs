use thiserror::Error;

/// Fatal elaboration errors. Every precondition violation in the fabrics or
/// the datapath composition raises one of these immediately; none of them is
/// recoverable because each indicates an inconsistency between the projection
/// and the hardware description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElabError {
    #[error("{fabric}: projection needs {needed} ML blocks but only {available} exist")]
    InsufficientMlbs {
        fabric: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("{fabric}: projection needs {needed} {resource} but only {available} exist")]
    InsufficientBuffers {
        fabric: &'static str,
        resource: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("buffer data port of {buffer_width} bits cannot hold a single {stream_width}-bit stream")]
    BufferTooNarrow { buffer_width: u32, stream_width: u32 },

    #[error("{context}: stream width {width} does not divide into {lanes} lanes of {lane_width} bits")]
    StreamWidthMismatch {
        context: &'static str,
        width: u32,
        lanes: u64,
        lane_width: u32,
    },

    #[error("preload of {needed_bits} bits exceeds the {budget_bits}-bit budget of {buffers} buffers")]
    PreloadBudgetExceeded {
        needed_bits: u64,
        budget_bits: u64,
        buffers: u64,
    },

    #[error("projection requests {requested} along {what}, hardware supports at most {supported}")]
    ProjectionExceedsHardware {
        what: &'static str,
        requested: u64,
        supported: u64,
    },

    #[error("unknown activation function `{0}`")]
    UnknownActivationFunction(String),

    #[error("block `{block}` has no {direction} port of type {port_type}")]
    PortTypeMissing {
        block: String,
        direction: &'static str,
        port_type: &'static str,
    },

    #[error("malformed specification: {0}")]
    InvalidSpec(String),
}

/// Errors of the mapping enumerator. An empty feasible set is a returned
/// value (empty list, score 0), not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("workload axis {0} is zero")]
    InvalidWorkload(&'static str),

    #[error("ML block budget must be at least 1")]
    InvalidBudget,
}
