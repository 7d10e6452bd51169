//! Arena context
//!
//! A `Context` owns every tensor and buffer created through it. Tensors are
//! addressed by [`TensorId`] handles and are never freed one by one: the whole
//! arena is released at once, either by dropping the context or by calling
//! [`Context::release`].

use crate::dtype::DType;
use crate::error::{EngineError, Result};
use crate::ops::Op;
use crate::storage::Storage;
use crate::tensor::{MAX_DIMS, RawTensor, TensorId, contiguous_strides, pad_shape};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default arena budget, 128 MiB.
pub const DEFAULT_MEM_SIZE: usize = 128 * 1024 * 1024;

/// Bytes charged against the budget for each tensor's metadata.
pub const TENSOR_OVERHEAD: usize = std::mem::size_of::<RawTensor>();

static NEXT_ARENA: AtomicU64 = AtomicU64::new(1);

fn next_arena_id() -> u64 {
    NEXT_ARENA.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy)]
pub struct ContextParams {
    /// Byte budget shared by tensor metadata and data buffers
    pub mem_size: usize,
}

impl Default for ContextParams {
    fn default() -> Self {
        ContextParams {
            mem_size: DEFAULT_MEM_SIZE,
        }
    }
}

pub struct Context {
    arena: u64,
    mem_size: usize,
    mem_used: usize,
    storages: Vec<Storage>,
    tensors: Vec<RawTensor>,
    grad_enabled: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("arena", &self.arena)
            .field("tensors", &self.tensors.len())
            .field("mem_used", &self.mem_used)
            .field("mem_size", &self.mem_size)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextParams::default())
    }
}

// ===== ARENA LIFECYCLE =====
impl Context {
    pub fn new(params: ContextParams) -> Self {
        Context {
            arena: next_arena_id(),
            mem_size: params.mem_size,
            mem_used: 0,
            storages: Vec::new(),
            tensors: Vec::new(),
            grad_enabled: true,
        }
    }

    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    pub fn mem_used(&self) -> usize {
        self.mem_used
    }

    /// Number of tensors (including views) allocated so far
    pub fn n_tensors(&self) -> usize {
        self.tensors.len()
    }

    /// Drop every tensor at once and start a fresh arena.
    ///
    /// Handles issued before the call are invalid afterwards.
    pub fn release(&mut self) {
        self.tensors.clear();
        self.storages.clear();
        self.mem_used = 0;
        self.arena = next_arena_id();
    }

    fn reserve(&mut self, bytes: usize) -> Result<()> {
        let available = self.mem_size - self.mem_used;
        if bytes > available {
            return Err(EngineError::OutOfMemory {
                needed: bytes,
                available,
                capacity: self.mem_size,
            });
        }
        self.mem_used += bytes;
        Ok(())
    }

    fn push(&mut self, tensor: RawTensor) -> TensorId {
        self.tensors.push(tensor);
        TensorId {
            arena: self.arena,
            index: self.tensors.len() - 1,
        }
    }

    /// Tensor metadata for a handle
    ///
    /// # Panics
    /// In debug builds, panics when the handle was issued by another arena
    /// or before the last `release`.
    pub fn tensor(&self, id: TensorId) -> &RawTensor {
        debug_assert_eq!(
            id.arena, self.arena,
            "stale tensor handle {id:?}: arena was released"
        );
        &self.tensors[id.index]
    }

    pub(crate) fn tensor_mut(&mut self, id: TensorId) -> &mut RawTensor {
        debug_assert_eq!(
            id.arena, self.arena,
            "stale tensor handle {id:?}: arena was released"
        );
        &mut self.tensors[id.index]
    }

    /// Run `f` with gradient tracking disabled, so ops built inside it
    /// never get gradient tensors of their own.
    pub(crate) fn no_grad<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev = self.grad_enabled;
        self.grad_enabled = false;
        let out = f(self);
        self.grad_enabled = prev;
        out
    }
}

// ===== TENSOR CONSTRUCTORS =====
impl Context {
    /// Allocate a zero-filled tensor of the given shape
    ///
    /// `shape` has between one and four entries, dimension 0 first.
    pub fn new_tensor(&mut self, dtype: DType, shape: &[usize]) -> Result<TensorId> {
        if shape.is_empty() || shape.len() > MAX_DIMS {
            return Err(EngineError::InvalidRank(shape.len()));
        }
        if let Some(dim) = shape.iter().position(|&n| n == 0) {
            return Err(EngineError::ZeroExtent {
                dim,
                shape: shape.to_vec(),
            });
        }
        self.alloc(dtype, pad_shape(shape), shape.len(), Op::None, [None, None])
    }

    pub fn new_f32(&mut self, shape: &[usize]) -> Result<TensorId> {
        self.new_tensor(DType::F32, shape)
    }

    /// Allocate a tensor and copy `data` into it, dimension 0 fastest
    pub fn from_vec(&mut self, shape: &[usize], data: &[f32]) -> Result<TensorId> {
        let elements: usize = shape.iter().product();
        if elements != data.len() {
            return Err(EngineError::ShapeDataMismatch {
                elements,
                len: data.len(),
            });
        }
        let t = self.new_f32(shape)?;
        self.storage_of_mut(t).copy_from_slice(data);
        Ok(t)
    }

    /// Allocate a new tensor with the same shape as `id` (data not copied)
    pub fn dup_tensor(&mut self, id: TensorId) -> Result<TensorId> {
        let (dtype, ne, n_dims) = {
            let t = self.tensor(id);
            (t.dtype, t.ne, t.n_dims)
        };
        self.alloc(dtype, ne, n_dims, Op::None, [None, None])
    }

    /// Mark a tensor as a differentiable parameter and give it a zeroed gradient
    pub fn set_param(&mut self, id: TensorId) -> Result<()> {
        let grad = self.dup_tensor(id)?;
        let t = self.tensor_mut(id);
        t.is_param = true;
        t.grad = Some(grad);
        Ok(())
    }

    pub fn set_name(&mut self, id: TensorId, name: impl Into<String>) {
        self.tensor_mut(id).name = name.into();
    }

    pub fn grad(&self, id: TensorId) -> Option<TensorId> {
        self.tensor(id).grad
    }

    pub(crate) fn set_grad(&mut self, id: TensorId, grad: TensorId) {
        self.tensor_mut(id).grad = Some(grad);
    }

    fn alloc(
        &mut self,
        dtype: DType,
        ne: [usize; MAX_DIMS],
        n_dims: usize,
        op: Op,
        src: [Option<TensorId>; 2],
    ) -> Result<TensorId> {
        if !dtype.is_supported() {
            return Err(EngineError::UnsupportedDType(dtype));
        }
        let elements: usize = ne.iter().product();
        self.reserve(TENSOR_OVERHEAD + elements * dtype.size_of())?;
        self.storages.push(Storage::zeros(elements));
        let raw = RawTensor {
            dtype,
            n_dims,
            ne,
            nb: contiguous_strides(&ne, dtype.size_of()),
            op,
            src,
            grad: None,
            is_param: false,
            name: String::new(),
            storage: self.storages.len() - 1,
            offset: 0,
        };
        Ok(self.push(raw))
    }

    /// Allocate the result of an op.
    ///
    /// The result is differentiable iff gradient tracking is on and any
    /// input carries a gradient.
    pub(crate) fn new_op_tensor(
        &mut self,
        ne: [usize; MAX_DIMS],
        n_dims: usize,
        op: Op,
        src: [Option<TensorId>; 2],
    ) -> Result<TensorId> {
        let is_node = self.tracks(src);
        let out = self.alloc(DType::F32, ne, n_dims, op, src)?;
        if is_node {
            let grad = self.dup_tensor(out)?;
            self.set_grad(out, grad);
        }
        Ok(out)
    }

    /// Create a view over `src`'s storage; only metadata is charged.
    pub(crate) fn new_view(
        &mut self,
        src: TensorId,
        ne: [usize; MAX_DIMS],
        nb: [usize; MAX_DIMS],
        n_dims: usize,
        op: Op,
    ) -> Result<TensorId> {
        let is_node = self.tracks([Some(src), None]);
        self.reserve(TENSOR_OVERHEAD)?;
        let (dtype, storage, offset) = {
            let s = self.tensor(src);
            (s.dtype, s.storage, s.offset)
        };
        let raw = RawTensor {
            dtype,
            n_dims,
            ne,
            nb,
            op,
            src: [Some(src), None],
            grad: None,
            is_param: false,
            name: String::new(),
            storage,
            offset,
        };
        let out = self.push(raw);
        if is_node {
            let grad = self.alloc(dtype, ne, n_dims, Op::None, [None, None])?;
            self.set_grad(out, grad);
        }
        Ok(out)
    }

    fn tracks(&self, src: [Option<TensorId>; 2]) -> bool {
        self.grad_enabled
            && src
                .iter()
                .flatten()
                .any(|&s| self.tensor(s).grad.is_some())
    }
}

// ===== ELEMENT ACCESS =====
impl Context {
    /// Read the element at a 4-D coordinate through the tensor's strides
    pub fn get(&self, id: TensorId, coords: [usize; MAX_DIMS]) -> f32 {
        let t = self.tensor(id);
        self.storages[t.storage].as_slice()[t.element_index(coords)]
    }

    pub fn set(&mut self, id: TensorId, coords: [usize; MAX_DIMS], value: f32) {
        let (storage, idx) = {
            let t = self.tensor(id);
            (t.storage, t.element_index(coords))
        };
        self.storages[storage].as_mut_slice()[idx] = value;
    }

    /// Read by flat index, dimension 0 fastest
    pub fn get_element(&self, id: TensorId, flat: usize) -> f32 {
        let coords = self.tensor(id).unravel(flat);
        self.get(id, coords)
    }

    pub fn set_element(&mut self, id: TensorId, flat: usize, value: f32) {
        let coords = self.tensor(id).unravel(flat);
        self.set(id, coords, value);
    }

    pub fn get_f32_1d(&self, id: TensorId, i: usize) -> f32 {
        self.get_element(id, i)
    }

    /// Fill every element of a tensor with `value`
    pub fn set_f32(&mut self, id: TensorId, value: f32) {
        let (contiguous, storage, start, len) = {
            let t = self.tensor(id);
            (
                t.is_contiguous(),
                t.storage,
                t.offset / t.dtype.size_of(),
                t.nelements(),
            )
        };
        if contiguous {
            self.storages[storage].as_mut_slice()[start..start + len]
                .iter_mut()
                .for_each(|x| *x = value);
        } else {
            for flat in 0..len {
                self.set_element(id, flat, value);
            }
        }
    }

    /// Copy a tensor out in logical order (dimension 0 fastest)
    pub fn to_vec(&self, id: TensorId) -> Vec<f32> {
        let n = self.tensor(id).nelements();
        (0..n).map(|k| self.get_element(id, k)).collect()
    }

    /// The full backing buffer of a tensor (shared with its views)
    pub(crate) fn storage_of(&self, id: TensorId) -> &[f32] {
        self.storages[self.tensor(id).storage].as_slice()
    }

    pub(crate) fn storage_of_mut(&mut self, id: TensorId) -> &mut [f32] {
        let s = self.tensor(id).storage;
        self.storages[s].as_mut_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_tensor_is_contiguous_and_zeroed() {
        let mut ctx = Context::default();
        let t = ctx.new_f32(&[3, 2, 2]).unwrap();
        let raw = ctx.tensor(t);
        assert_eq!(raw.ne, [3, 2, 2, 1]);
        assert_eq!(raw.nb, [4, 12, 24, 48]);
        assert_eq!(raw.shape(), &[3, 2, 2]);
        assert!(raw.is_contiguous());
        assert!(ctx.to_vec(t).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_flat_index_matches_coordinates() {
        let mut ctx = Context::default();
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let t = ctx.from_vec(&[2, 3, 4], &data).unwrap();
        assert_eq!(ctx.get(t, [1, 2, 3, 0]), 1.0 + 2.0 * 2.0 + 3.0 * 6.0);
        for (k, &v) in data.iter().enumerate() {
            assert_eq!(ctx.get_element(t, k), v);
        }
        ctx.set_element(t, 5, -7.0);
        assert_eq!(ctx.get(t, [1, 2, 0, 0]), -7.0);
    }

    #[test]
    fn test_set_param_allocates_zero_grad() {
        let mut ctx = Context::default();
        let t = ctx.new_f32(&[2, 2]).unwrap();
        assert!(ctx.grad(t).is_none());
        ctx.set_param(t).unwrap();
        let g = ctx.grad(t).unwrap();
        assert!(ctx.tensor(t).is_param);
        assert!(ctx.tensor(g).same_shape(ctx.tensor(t)));
        assert_eq!(ctx.to_vec(g), vec![0.0; 4]);
    }

    #[test]
    fn test_budget_is_enforced() {
        let mut ctx = Context::new(ContextParams {
            mem_size: TENSOR_OVERHEAD + 16,
        });
        assert!(ctx.new_f32(&[4]).is_ok());
        let err = ctx.new_f32(&[1]).unwrap_err();
        assert!(matches!(err, EngineError::OutOfMemory { .. }));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let mut ctx = Context::default();
        assert!(matches!(
            ctx.new_f32(&[]),
            Err(EngineError::InvalidRank(0))
        ));
        assert!(matches!(
            ctx.new_f32(&[1, 1, 1, 1, 1]),
            Err(EngineError::InvalidRank(5))
        ));
        assert!(matches!(
            ctx.new_f32(&[2, 0]),
            Err(EngineError::ZeroExtent { dim: 1, .. })
        ));
        assert!(matches!(
            ctx.new_tensor(DType::F16, &[2]),
            Err(EngineError::UnsupportedDType(DType::F16))
        ));
        assert!(matches!(
            ctx.from_vec(&[2, 2], &[1.0; 3]),
            Err(EngineError::ShapeDataMismatch { elements: 4, len: 3 })
        ));
    }

    #[test]
    fn test_release_resets_usage() {
        let mut ctx = Context::default();
        ctx.new_f32(&[4, 4]).unwrap();
        assert!(ctx.mem_used() > 0);
        ctx.release();
        assert_eq!(ctx.mem_used(), 0);
        assert_eq!(ctx.n_tensors(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "stale tensor handle")]
    fn test_stale_handle_panics_in_debug() {
        let mut ctx = Context::default();
        let t = ctx.new_f32(&[2]).unwrap();
        ctx.release();
        ctx.new_f32(&[2]).unwrap();
        let _ = ctx.get_element(t, 0);
    }
}
