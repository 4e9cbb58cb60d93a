//! Element-wise binary operations with NumPy broadcasting.

use crate::error::Result;
use crate::{Array, Shape};

/// Numerically stable `log(exp(a) + exp(b))`.
///
/// `-inf` is the identity: `logaddexp(-inf, x) == x`, including `x == -inf`.
#[inline]
pub fn logaddexp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Apply a binary function element-wise, broadcasting both operands.
pub(crate) fn binary_op<F>(lhs: &Array, rhs: &Array, f: F) -> Result<Array>
where
    F: Fn(f64, f64) -> f64,
{
    let result_shape = lhs.shape().broadcast(rhs.shape())?;
    let lhs_data = lhs.as_slice();
    let rhs_data = rhs.as_slice();

    let result_data = if lhs.shape() == rhs.shape() {
        lhs_data.iter().zip(rhs_data.iter()).map(|(&a, &b)| f(a, b)).collect()
    } else {
        let size = result_shape.size();
        let mut out = Vec::with_capacity(size);
        for i in 0..size {
            let lhs_idx = broadcast_index(i, &result_shape, lhs.shape());
            let rhs_idx = broadcast_index(i, &result_shape, rhs.shape());
            out.push(f(lhs_data[lhs_idx], rhs_data[rhs_idx]));
        }
        out
    };

    Ok(Array::from_parts(result_data, result_shape))
}

/// Map a flat index of the broadcast result back to a flat index of `src_shape`.
pub(crate) fn broadcast_index(flat_idx: usize, result_shape: &Shape, src_shape: &Shape) -> usize {
    let result_dims = result_shape.as_slice();
    let src_dims = src_shape.as_slice();
    let offset = result_dims.len() - src_dims.len();

    let mut idx = flat_idx;
    let mut src_idx = 0;
    let mut stride = 1;
    for axis in (0..result_dims.len()).rev() {
        let coord = idx % result_dims[axis];
        idx /= result_dims[axis];
        if axis >= offset {
            let src_dim = src_dims[axis - offset];
            if src_dim != 1 {
                src_idx += coord * stride;
            }
            stride *= src_dim;
        }
    }
    src_idx
}

impl Array {
    /// Element-wise addition with broadcasting.
    ///
    /// ```
    /// # use marginal_rs::{Array, Shape};
    /// let a = Array::from_vec(vec![1.0, 2.0], Shape::new(vec![2, 1])).unwrap();
    /// let b = Array::vector(vec![10.0, 20.0, 30.0]);
    /// let c = a.add(&b).unwrap();
    /// assert_eq!(c.shape().as_slice(), &[2, 3]);
    /// assert_eq!(c.to_vec(), vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
    /// ```
    pub fn add(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, |a, b| a - b)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, |a, b| a * b)
    }

    /// Element-wise division.
    pub fn div(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, |a, b| a / b)
    }

    /// Element-wise maximum.
    pub fn maximum(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, f64::max)
    }

    /// Element-wise `log(exp(self) + exp(other))`.
    pub fn logaddexp(&self, other: &Array) -> Result<Array> {
        binary_op(self, other, logaddexp)
    }

    /// Multiply every element by a constant.
    pub fn mul_scalar(&self, factor: f64) -> Array {
        self.map(|x| x * factor)
    }

    /// Add a constant to every element.
    pub fn add_scalar(&self, value: f64) -> Array {
        self.map(|x| x + value)
    }
}
