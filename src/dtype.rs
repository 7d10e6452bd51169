//! Element types for arena tensors
//!
//! Strides are stored in bytes, so every tensor carries its element type
//! and the engine derives `nb[0]` from `DType::size_of`. Tensors are always
//! `F32`. `F16` and `I32` are only recognised as tags: allocating them is
//! refused with `EngineError::UnsupportedDType`.

use std::fmt;

/// Element type tag of a tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DType {
    /// 16-bit floating point (IEEE 754 half precision)
    F16 = 0,
    /// 32-bit floating point (default)
    #[default]
    F32 = 1,
    /// 32-bit signed integer
    I32 = 2,
}

impl DType {
    /// Returns the size in bytes of a single element of this dtype
    #[must_use]
    pub fn size_of(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
        }
    }

    /// Returns the name of this dtype as a string
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::I32 => "i32",
        }
    }

    /// Whether the engine can compute with this dtype
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
