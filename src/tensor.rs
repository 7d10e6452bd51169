use crate::dtype::DType;
use crate::ops::Op;

/// Maximum number of logical dimensions a tensor can have.
pub const MAX_DIMS: usize = 4;

/// Handle to a tensor living inside a [`Context`](crate::Context).
///
/// Handles are plain indices tagged with the id of the arena that issued
/// them. Releasing the arena bumps its id, so a handle that outlives its
/// arena trips a debug assertion on the next access instead of aliasing
/// whatever tensor was allocated into the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId {
    pub(crate) arena: u64,
    pub(crate) index: usize,
}

impl TensorId {
    /// Position of the tensor inside its arena, in allocation order.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

// ===== RAW TENSOR STRUCTURE =====

/// Tensor metadata stored in the arena.
///
/// Fields:
/// - `ne`: elements per dimension, dimension 0 varies fastest; unused slots are 1
/// - `nb`: byte stride per dimension; views may permute these
/// - `storage`/`offset`: which arena buffer holds the data and where (in bytes) it starts
/// - `op`/`src`: the operation that produces this tensor and its inputs
/// - `grad`: gradient tensor of identical shape, if this tensor is differentiable
#[derive(Clone)]
pub struct RawTensor {
    pub dtype: DType,
    pub n_dims: usize,
    pub ne: [usize; MAX_DIMS],
    pub nb: [usize; MAX_DIMS],
    pub op: Op,
    pub src: [Option<TensorId>; 2],
    pub grad: Option<TensorId>,
    pub is_param: bool,
    pub name: String,
    pub(crate) storage: usize,
    pub(crate) offset: usize,
}

impl std::fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("ne", &self.ne)
            .field("nb", &self.nb)
            .field("is_param", &self.is_param)
            .field("has_grad", &self.grad.is_some())
            .finish()
    }
}

impl RawTensor {
    /// Logical shape, trimmed to `n_dims`
    pub fn shape(&self) -> &[usize] {
        &self.ne[..self.n_dims]
    }

    pub fn nelements(&self) -> usize {
        self.ne.iter().product()
    }

    /// True when the strides match a freshly allocated row-major buffer
    pub fn is_contiguous(&self) -> bool {
        self.nb == contiguous_strides(&self.ne, self.dtype.size_of())
    }

    /// True for views whose first two dimensions were swapped
    pub fn is_transposed(&self) -> bool {
        self.nb[0] > self.nb[1]
    }

    pub fn same_shape(&self, other: &RawTensor) -> bool {
        self.ne == other.ne
    }

    /// Element offset into the backing storage for a logical coordinate.
    ///
    /// Every read and write goes through here, so views never assume
    /// contiguity.
    pub fn element_index(&self, coords: [usize; MAX_DIMS]) -> usize {
        debug_assert!(
            coords.iter().zip(&self.ne).all(|(c, n)| c < n),
            "coordinate {coords:?} out of bounds for {:?}",
            self.ne
        );
        let bytes = self.offset
            + coords
                .iter()
                .zip(&self.nb)
                .map(|(c, s)| c * s)
                .sum::<usize>();
        bytes / self.dtype.size_of()
    }

    /// Convert a flat index (dimension 0 fastest) into a coordinate
    pub fn unravel(&self, flat: usize) -> [usize; MAX_DIMS] {
        let mut coords = [0; MAX_DIMS];
        let mut rem = flat;
        for (c, &n) in coords.iter_mut().zip(&self.ne) {
            *c = rem % n;
            rem /= n;
        }
        coords
    }
}

/// Byte strides of a contiguous tensor: `nb[0]` is the element size and
/// `nb[i] = nb[i-1] * ne[i-1]`.
pub fn contiguous_strides(ne: &[usize; MAX_DIMS], elem_size: usize) -> [usize; MAX_DIMS] {
    let mut nb = [0; MAX_DIMS];
    nb[0] = elem_size;
    for i in 1..MAX_DIMS {
        nb[i] = nb[i - 1] * ne[i - 1];
    }
    nb
}

/// Pad a shape slice to four slots with trailing ones
pub fn pad_shape(shape: &[usize]) -> [usize; MAX_DIMS] {
    let mut ne = [1; MAX_DIMS];
    ne[..shape.len()].copy_from_slice(shape);
    ne
}

/// Iterate over every coordinate of `ne` with dimension 0 varying fastest
pub fn coords(ne: [usize; MAX_DIMS]) -> impl Iterator<Item = [usize; MAX_DIMS]> {
    let total: usize = ne.iter().product();
    (0..total).map(move |flat| {
        let mut c = [0; MAX_DIMS];
        let mut rem = flat;
        for d in 0..MAX_DIMS {
            c[d] = rem % ne[d];
            rem /= ne[d];
        }
        c
    })
}
