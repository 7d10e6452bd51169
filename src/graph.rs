//! Computation graphs
//!
//! A [`Graph`] is a topologically ordered list of tensor handles split into
//! `nodes` (results of an op, or anything carrying a gradient) and `leafs`
//! (plain inputs). Building a graph never computes anything; [`Graph::compute`]
//! runs the forward kernels in order.

use crate::autograd::compute_backward;
use crate::context::Context;
use crate::error::Result;
use crate::ops::{Op, compute_forward};
use crate::tensor::TensorId;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<TensorId>,
    leafs: Vec<TensorId>,
    visited: HashSet<TensorId>,
}

impl Graph {
    /// Collect everything `root` depends on, operands before consumers
    pub fn build_forward(ctx: &Context, root: TensorId) -> Graph {
        let mut graph = Graph::default();
        graph.build_forward_expand(ctx, root);
        graph
    }

    /// Append `root` and its not-yet-seen dependencies to this graph.
    pub fn build_forward_expand(&mut self, ctx: &Context, root: TensorId) {
        enum Action {
            Visit(TensorId),
            PostVisit(TensorId),
        }

        // Post-order DFS with an explicit stack; deep chains don't recurse
        let mut stack = vec![Action::Visit(root)];
        while let Some(action) = stack.pop() {
            match action {
                Action::Visit(id) => {
                    if !self.visited.insert(id) {
                        continue;
                    }
                    stack.push(Action::PostVisit(id));
                    // Reversed so src[0] is ordered first
                    for src in ctx.tensor(id).src.iter().rev().flatten() {
                        if !self.visited.contains(src) {
                            stack.push(Action::Visit(*src));
                        }
                    }
                }
                Action::PostVisit(id) => {
                    let t = ctx.tensor(id);
                    if t.op == Op::None && t.grad.is_none() {
                        self.leafs.push(id);
                    } else {
                        self.nodes.push(id);
                    }
                }
            }
        }
    }

    /// Build the backward graph of `gf`.
    ///
    /// The result contains every forward node plus the ops that compute the
    /// gradient of each parameter. After this call `ctx.grad(param)` names
    /// the accumulated gradient expression. With `keep`, the gradient
    /// tensors already attached to `gf`'s nodes are replaced by fresh
    /// copies first so `gf`'s own buffers are left untouched.
    pub fn build_backward(ctx: &mut Context, gf: &Graph, keep: bool) -> Result<Graph> {
        let mut gb = gf.clone();

        if keep {
            for &node in &gf.nodes {
                if let Some(grad) = ctx.grad(node) {
                    let copy = ctx.dup_tensor(grad)?;
                    ctx.set_grad(node, copy);
                }
            }
        }

        ctx.no_grad(|ctx| -> Result<()> {
            for &node in gf.nodes.iter().rev() {
                if ctx.grad(node).is_some() {
                    compute_backward(ctx, node)?;
                }
            }
            Ok(())
        })?;

        for &node in &gf.nodes {
            let t = ctx.tensor(node);
            if t.is_param
                && let Some(grad) = t.grad
            {
                gb.build_forward_expand(ctx, grad);
            }
        }

        tracing::debug!(
            forward_nodes = gf.nodes.len(),
            backward_nodes = gb.nodes.len(),
            leafs = gb.leafs.len(),
            "built backward graph"
        );
        Ok(gb)
    }

    /// Evaluate every node in order
    pub fn compute(&self, ctx: &mut Context) -> Result<()> {
        for &node in &self.nodes {
            compute_forward(ctx, node)?;
        }
        Ok(())
    }

    /// Zero the gradient of every tensor in the graph
    pub fn reset(&self, ctx: &mut Context) {
        for &id in self.nodes.iter().chain(&self.leafs) {
            if let Some(grad) = ctx.grad(id) {
                ctx.set_f32(grad, 0.0);
            }
        }
    }

    pub fn nodes(&self) -> &[TensorId] {
        &self.nodes
    }

    pub fn leafs(&self) -> &[TensorId] {
        &self.leafs
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.visited.contains(&id)
    }

    /// Graphviz rendering of this graph.
    ///
    /// Parameters are yellow. When `forward` is given, nodes that are not part
    /// of it (the gradient ops) are green.
    pub fn to_dot(&self, ctx: &Context, forward: Option<&Graph>) -> String {
        let mut out = String::from("digraph G {\n  newrank = true;\n  rankdir = LR;\n");
        for &id in &self.nodes {
            let t = ctx.tensor(id);
            let color = if t.is_param {
                "yellow"
            } else if forward.is_some_and(|gf| !gf.contains(id)) {
                "green"
            } else {
                "lightgrey"
            };
            let _ = writeln!(
                out,
                "  \"t{}\" [ style = filled; fillcolor = {color}; shape = record; label=\"{}|{:?}|<x>{}\" ];",
                id.index(),
                dot_label(&t.name, id),
                t.shape(),
                t.op.symbol(),
            );
        }
        for &id in &self.leafs {
            let t = ctx.tensor(id);
            let label = if t.nelements() == 1 {
                format!("{:.4}", ctx.get_element(id, 0))
            } else {
                format!("{:?}", t.shape())
            };
            let _ = writeln!(
                out,
                "  \"t{}\" [ style = filled; fillcolor = pink; shape = record; label=\"<x>{}|{label}\" ];",
                id.index(),
                dot_label(&t.name, id),
            );
        }
        for &id in self.nodes.iter().chain(&self.leafs) {
            for (slot, src) in ctx.tensor(id).src.iter().enumerate() {
                if let Some(src) = src {
                    let _ = writeln!(
                        out,
                        "  \"t{}\":x -> \"t{}\":x [ arrowhead = vee; label = \"{}\" ];",
                        src.index(),
                        id.index(),
                        if slot == 0 { "x" } else { "y" },
                    );
                }
            }
        }
        out.push_str("}\n");
        out
    }

    /// Write [`Graph::to_dot`] to `path`
    pub fn dump_dot(
        &self,
        ctx: &Context,
        forward: Option<&Graph>,
        path: impl AsRef<Path>,
    ) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot(ctx, forward))
    }
}

fn dot_label(name: &str, id: TensorId) -> String {
    if name.is_empty() {
        format!("#{}", id.index())
    } else {
        format!("{name} (#{})", id.index())
    }
}
