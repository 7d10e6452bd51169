//! # mulmat-check
//!
//! A small arena-based tensor engine with reverse-mode autodiff, and a
//! randomised harness that checks its batched, stride-aware `mul_mat`.
//!
//! ## Engine
//! - [`Context`]: byte-budgeted arena owning every tensor; handles are [`TensorId`]s
//! - Ops: `mul_mat`, `transpose` (a view), `cont`, `add`, `repeat`, `sum`
//! - [`Graph`]: forward/backward graphs, `compute`, `reset`, Graphviz dumps
//!
//! ## Harness
//! - Random shapes and values drawn from a seeded generator
//! - Strided reference product with a fixed absolute tolerance
//! - Central-difference gradient check against the backward graph
//! - A sweep over both operand layouts and 1 to 4 dimensions
//!
//! ```
//! use mulmat_check::{Context, Graph};
//!
//! let mut ctx = Context::default();
//! let a = ctx.from_vec(&[2, 3], &[1.0; 6]).unwrap();
//! let b = ctx.from_vec(&[2, 4], &[1.0; 8]).unwrap();
//! let y = ctx.mul_mat(b, a).unwrap();
//! Graph::build_forward(&ctx, y).compute(&mut ctx).unwrap();
//! assert_eq!(ctx.tensor(y).shape(), &[4, 3]);
//! assert_eq!(ctx.get_f32_1d(y, 0), 2.0);
//! ```

mod autograd;
pub mod config;
pub mod context;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod harness;
pub mod logging;
pub mod ops;
pub mod storage;
pub mod tensor;

pub use context::{Context, ContextParams, DEFAULT_MEM_SIZE};
pub use dtype::DType;
pub use error::{EngineError, HarnessError, Mismatch};
pub use graph::Graph;
pub use harness::{
    FailurePolicy, GradCheckConfig, MatMulVariant, SweepConfig, SweepReport, run_sweep,
};
pub use ops::Op;
pub use ops::matmul::mul_mat_shape;
pub use tensor::{MAX_DIMS, RawTensor, TensorId};
