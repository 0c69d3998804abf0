//! Element types and array shapes of executable parameters and results.

use std::fmt;

/// Element type of a device array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Pred,
    U8,
    I8,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::Pred | DType::U8 | DType::I8 => 1,
            DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DType::Pred => write!(f, "pred"),
            DType::U8 => write!(f, "u8"),
            DType::I8 => write!(f, "s8"),
            DType::I32 => write!(f, "s32"),
            DType::I64 => write!(f, "s64"),
            DType::F16 => write!(f, "f16"),
            DType::BF16 => write!(f, "bf16"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
        }
    }
}

/// Dense array shape: element type plus dimensions.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dtype: DType,
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from an element type and dimensions.
    pub fn new(dtype: DType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            dims: dims.into(),
        }
    }

    /// Creates a rank-0 shape.
    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, Vec::new())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A scalar has one element.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Bytes needed to hold a dense array of this shape.
    pub fn byte_size(&self) -> usize {
        self.numel() * self.dtype.size()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "{}[{}]", self.dtype, dims.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        assert_eq!(Shape::new(DType::F32, vec![4, 8]).byte_size(), 128);
        assert_eq!(Shape::new(DType::F16, vec![3]).byte_size(), 6);
        assert_eq!(Shape::scalar(DType::F64).byte_size(), 8);
        assert_eq!(Shape::new(DType::I8, vec![0, 16]).byte_size(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(DType::BF16, vec![2, 3]).to_string(), "bf16[2,3]");
        assert_eq!(Shape::scalar(DType::Pred).to_string(), "pred[]");
    }
}
