//! Shapes, strides and broadcasting for n-dimensional arrays.
//!
//! Batch dimensions are addressed from the right with negative positions
//! (`-1` is the rightmost axis), which is how plates and enumerated variables
//! claim their axes.

use crate::error::{Error, Result};
use std::fmt;

/// Shape of an n-dimensional array. An empty shape is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// # use marginal_rs::Shape;
    /// let shape = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(shape.ndim(), 3);
    /// assert_eq!(shape.size(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Create a scalar shape (no dimensions).
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// A shape of `ndim` ones.
    pub fn ones(ndim: usize) -> Self {
        Self { dims: vec![1; ndim] }
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns a slice of the dimensions.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.dims
    }

    /// Returns true if this is a scalar shape.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Left-pad with ones up to `ndim` dimensions.
    pub fn left_pad(&self, ndim: usize) -> Shape {
        if self.ndim() >= ndim {
            return self.clone();
        }
        let mut dims = vec![1; ndim - self.ndim()];
        dims.extend_from_slice(&self.dims);
        Shape::new(dims)
    }

    /// Concatenate two shapes (`self` on the left).
    pub fn concat(&self, other: &Shape) -> Shape {
        let mut dims = self.dims.clone();
        dims.extend_from_slice(&other.dims);
        Shape::new(dims)
    }

    /// Drop `n` trailing dimensions (the event part of a value).
    pub fn drop_right(&self, n: usize) -> Shape {
        let keep = self.ndim().saturating_sub(n);
        Shape::new(self.dims[..keep].to_vec())
    }

    /// Row-major strides for this shape.
    ///
    /// ```
    /// # use marginal_rs::Shape;
    /// assert_eq!(Shape::new(vec![2, 3, 4]).default_strides(), vec![12, 4, 1]);
    /// ```
    pub fn default_strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.ndim()];
        for i in (0..self.ndim().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Convert a flat row-major index into a multi-index.
    pub fn unravel(&self, flat_idx: usize) -> Vec<usize> {
        let mut multi = vec![0; self.ndim()];
        let mut idx = flat_idx;
        for (slot, &dim) in multi.iter_mut().zip(self.dims.iter()).rev() {
            *slot = idx % dim;
            idx /= dim;
        }
        multi
    }

    /// Broadcast two shapes following NumPy rules.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let ndim = self.ndim().max(other.ndim());
        let lhs = self.left_pad(ndim);
        let rhs = other.left_pad(ndim);
        let mut result = Vec::with_capacity(ndim);
        for (&a, &b) in lhs.dims.iter().zip(rhs.dims.iter()) {
            if a == b || b == 1 {
                result.push(a);
            } else if a == 1 {
                result.push(b);
            } else {
                return None;
            }
        }
        Some(Shape::new(result))
    }

    /// Like [`Shape::broadcast_with`], reporting incompatibility as an error.
    pub fn broadcast(&self, other: &Shape) -> Result<Shape> {
        self.broadcast_with(other).ok_or_else(|| Error::ShapeMismatch {
            lhs: self.dims.clone(),
            rhs: other.dims.clone(),
        })
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}
