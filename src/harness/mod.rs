//! Randomised verification of `mul_mat`
//!
//! - [`random`]: random shapes and uniformly filled tensors
//! - [`verify`]: strided reference product and shape contract
//! - [`gradcheck`]: central-difference gradient check against the backward graph
//! - [`driver`]: the iteration sweep tying the three together
pub mod driver;
pub mod gradcheck;
pub mod random;
pub mod verify;

pub use driver::{
    CaseFailure, CaseReport, DEFAULT_ITERATIONS, FailurePolicy, MatMulVariant, SweepConfig,
    SweepReport, iteration_seed, run_case, run_sweep,
};
pub use gradcheck::{
    GradCheckConfig, GradCheckSummary, check_gradient, gradient_mismatch, relative_error,
};
pub use random::{random_dims, random_tensor, truncate_dims};
pub use verify::{MAT_MUL_TOLERANCE, check_mat_mul, check_mat_mul_shape};
