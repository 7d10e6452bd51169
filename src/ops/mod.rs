// Operation enum and forward dispatch
pub mod binary;
pub mod matmul;
pub mod movement;
pub mod reduce;

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::tensor::TensorId;

/// The operation that produces a tensor.
///
/// `None` marks leaves (inputs, parameters, gradient accumulators).
/// `Transpose` is a view: computing it is a no-op because it reads its
/// source's storage through permuted strides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Op {
    #[default]
    None,
    Add,
    Cont,
    Repeat,
    Transpose,
    Sum,
    MulMat,
}

impl Op {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Op::None => "NONE",
            Op::Add => "ADD",
            Op::Cont => "CONT",
            Op::Repeat => "REPEAT",
            Op::Transpose => "TRANSPOSE",
            Op::Sum => "SUM",
            Op::MulMat => "MUL_MAT",
        }
    }

    /// Short formula used in graph dumps
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::None => "none",
            Op::Add => "x+y",
            Op::Cont => "cont(x)",
            Op::Repeat => "repeat(x)",
            Op::Transpose => "transpose(x)",
            Op::Sum => "Σx",
            Op::MulMat => "X*Y",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Run the forward kernel of a single node
pub(crate) fn compute_forward(ctx: &mut Context, node: TensorId) -> Result<()> {
    match ctx.tensor(node).op {
        Op::None | Op::Transpose => Ok(()),
        Op::Add => binary::compute_add(ctx, node),
        Op::Cont => movement::compute_cont(ctx, node),
        Op::Repeat => movement::compute_repeat(ctx, node),
        Op::Sum => reduce::compute_sum(ctx, node),
        Op::MulMat => matmul::compute_mul_mat(ctx, node),
    }
}

/// First operand of a node
pub(crate) fn src0(ctx: &Context, node: TensorId) -> Result<TensorId> {
    let t = ctx.tensor(node);
    t.src[0].ok_or(EngineError::MissingOperand(t.op.name()))
}

/// Both operands of a binary node
pub(crate) fn src01(ctx: &Context, node: TensorId) -> Result<(TensorId, TensorId)> {
    let t = ctx.tensor(node);
    match t.src {
        [Some(a), Some(b)] => Ok((a, b)),
        _ => Err(EngineError::MissingOperand(t.op.name())),
    }
}

/// Gradient of a node that is known to carry one
pub(crate) fn grad_of(ctx: &Context, node: TensorId) -> Result<TensorId> {
    let t = ctx.tensor(node);
    t.grad.ok_or(EngineError::MissingOperand(t.op.name()))
}

/// Store kernel output into a freshly allocated, contiguous result
pub(crate) fn write_contiguous(ctx: &mut Context, dst: TensorId, values: &[f32]) {
    let start = {
        let t = ctx.tensor(dst);
        debug_assert!(t.is_contiguous());
        debug_assert_eq!(t.nelements(), values.len());
        t.offset / t.dtype.size_of()
    };
    ctx.storage_of_mut(dst)[start..start + values.len()].copy_from_slice(values);
}
