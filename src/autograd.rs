use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::ops::{Op, binary, matmul, movement, reduce};
use crate::tensor::TensorId;

// ===== DIFFERENTIATION RULES =====

/// Append the gradient-propagation ops for one node of the forward graph.
///
/// Each rule reads the node's (already accumulated) gradient and folds a
/// contribution into every differentiable operand via [`accumulate`]. The
/// ops are only wired here; nothing is computed until the backward graph
/// runs.
pub(crate) fn compute_backward(ctx: &mut Context, node: TensorId) -> Result<()> {
    match ctx.tensor(node).op {
        Op::None => Ok(()),
        Op::Add => binary::backward_add(ctx, node),
        Op::Cont => movement::backward_cont(ctx, node),
        Op::Transpose => movement::backward_transpose(ctx, node),
        Op::Sum => reduce::backward_sum(ctx, node),
        Op::MulMat => matmul::backward_mul_mat(ctx, node),
        Op::Repeat => Err(EngineError::BackwardNotImplemented(Op::Repeat.name())),
    }
}

/// `src.grad = src.grad + contribution`, as a new node.
///
/// The gradient handle of `src` is moved to the sum, so later rules (and
/// readers after the backward pass) see the accumulated value. Operands
/// without a gradient are left alone.
pub(crate) fn accumulate(ctx: &mut Context, src: TensorId, contribution: TensorId) -> Result<()> {
    let Some(current) = ctx.grad(src) else {
        return Ok(());
    };
    let sum = ctx.add(current, contribution)?;
    ctx.set_grad(src, sum);
    Ok(())
}
