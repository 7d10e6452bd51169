//! Arena buffer storage
//!
//! Every non-view tensor owns one `Storage` slot in its context. Views
//! (transposes) point at their source's slot with their own offset and
//! strides, so they never allocate.

/// Flat element buffer backing one or more tensors
#[derive(Clone, Default)]
pub struct Storage {
    data: Vec<f32>,
}

impl Storage {
    /// Create zero-filled storage for `len` elements
    pub fn zeros(len: usize) -> Self {
        Storage {
            data: vec![0.0; len],
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Storage({} elements)", self.data.len())
    }
}
