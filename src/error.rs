use crate::dtype::DType;
use crate::tensor::MAX_DIMS;
use thiserror::Error;

/// Errors raised by the arena engine while allocating or wiring tensors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "Context out of memory: need {needed} bytes but only {available} of {capacity} are free"
    )]
    OutOfMemory {
        needed: usize,
        available: usize,
        capacity: usize,
    },

    #[error("Tensors have 1 to 4 dimensions, got {0}")]
    InvalidRank(usize),

    #[error("Dimension {dim} of shape {shape:?} is zero")]
    ZeroExtent { dim: usize, shape: Vec<usize> },

    #[error("Shape mismatch: tensor has {elements} elements but data length is {len}")]
    ShapeDataMismatch { elements: usize, len: usize },

    #[error("Shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: [usize; MAX_DIMS],
        rhs: [usize; MAX_DIMS],
    },

    #[error("DType {0} has no compute kernels")]
    UnsupportedDType(DType),

    #[error("{0} node is missing an operand")]
    MissingOperand(&'static str),

    #[error("No backward rule for {0}")]
    BackwardNotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A reference value that disagrees with what the engine computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Mismatch {
    #[error(
        "mul_mat: i0={}, i1={}, i2={}, i3={}, sum={reference:.6}, y={actual:.6}, tolerance={tolerance:e}",
        .coords[0], .coords[1], .coords[2], .coords[3]
    )]
    MatMul {
        coords: [usize; MAX_DIMS],
        reference: f32,
        actual: f32,
        tolerance: f32,
    },

    #[error(
        "{op}: ndims={ndims}, i={arg}, k={index}, g0={numerical:.6}, g1={analytical:.6}, error_abs={error_abs:.6}, error_rel={error_rel:.6}"
    )]
    Gradient {
        op: String,
        ndims: usize,
        arg: usize,
        index: usize,
        numerical: f32,
        analytical: f32,
        error_abs: f32,
        error_rel: f32,
    },
}

/// Failures surfaced by the verification harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Numerical mismatch: {0}")]
    NumericalMismatch(Mismatch),

    #[error(
        "Shape contract violated: {output:?} = {lhs:?} * {rhs:?}, expected {expected:?}"
    )]
    ShapeContractViolation {
        output: [usize; MAX_DIMS],
        lhs: [usize; MAX_DIMS],
        rhs: [usize; MAX_DIMS],
        expected: [usize; MAX_DIMS],
    },

    #[error("Dimensionality {0} is outside 1..=4")]
    InvalidDims(usize),

    #[error("Invalid sampling range [{min}, {max}): {source}")]
    SamplingRange {
        min: f32,
        max: f32,
        #[source]
        source: rand::distr::uniform::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl HarnessError {
    /// True for the two verdict kinds; false for setup and engine failures.
    #[must_use]
    pub fn is_verdict(&self) -> bool {
        matches!(
            self,
            HarnessError::NumericalMismatch(_) | HarnessError::ShapeContractViolation { .. }
        )
    }
}

impl From<Mismatch> for HarnessError {
    fn from(m: Mismatch) -> Self {
        HarnessError::NumericalMismatch(m)
    }
}
