//! Dense n-dimensional `f64` arrays.
//!
//! Arrays are the positional tensors that distributions consume and produce.
//! Once a site's log-probability has been computed it is converted into a
//! [`Factor`](crate::Factor), which replaces axis positions with names.

use crate::error::{Error, Result};
use crate::Shape;
use std::fmt;
use std::sync::Arc;

/// A multidimensional array of `f64` values in row-major order.
///
/// Data lives behind an `Arc`, so cloning an array is cheap and arrays can be
/// shared between a trace and the factors derived from it.
///
/// ```
/// # use marginal_rs::{Array, Shape};
/// let a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![2, 3])).unwrap();
/// assert_eq!(a.shape().as_slice(), &[2, 3]);
/// assert_eq!(a.get(&[1, 0]), Some(4.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    data: Arc<Vec<f64>>,
    shape: Shape,
}

impl Array {
    /// Create an array from flat row-major data and a shape.
    pub fn from_vec(data: Vec<f64>, shape: Shape) -> Result<Self> {
        if data.len() != shape.size() {
            return Err(Error::DataLength { len: data.len(), shape: shape.as_slice().to_vec() });
        }
        Ok(Self { data: Arc::new(data), shape })
    }

    /// A one-dimensional array.
    pub fn vector(data: Vec<f64>) -> Self {
        let shape = Shape::new(vec![data.len()]);
        Self { data: Arc::new(data), shape }
    }

    /// A zero-dimensional array.
    pub fn scalar(value: f64) -> Self {
        Self { data: Arc::new(vec![value]), shape: Shape::scalar() }
    }

    /// An array filled with a single value.
    pub fn full(value: f64, shape: Shape) -> Self {
        Self { data: Arc::new(vec![value; shape.size()]), shape }
    }

    /// An array of zeros.
    pub fn zeros(shape: Shape) -> Self {
        Self::full(0.0, shape)
    }

    /// `[0, 1, ..., n - 1]` as a one-dimensional array.
    pub fn arange(n: usize) -> Self {
        Self::vector((0..n).map(|i| i as f64).collect())
    }

    /// Construct without length validation (caller guarantees consistency).
    pub(crate) fn from_parts(data: Vec<f64>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.size());
        Self { data: Arc::new(data), shape }
    }

    /// Returns the shape of this array.
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Returns the total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Returns true if this is a zero-dimensional array.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }

    /// Borrow the flat row-major data.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy the flat row-major data.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.to_vec()
    }

    /// The single value of a one-element array.
    pub fn item(&self) -> Option<f64> {
        if self.size() == 1 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Element at a multi-index, or `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.ndim() {
            return None;
        }
        let mut flat = 0;
        for ((&i, &dim), stride) in index
            .iter()
            .zip(self.shape.as_slice())
            .zip(self.shape.default_strides())
        {
            if i >= dim {
                return None;
            }
            flat += i * stride;
        }
        Some(self.data[flat])
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Array::scalar(value)
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array:f64{}", self.shape())
    }
}
