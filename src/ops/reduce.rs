//! Axis reductions.
//!
//! Variable elimination only ever reduces one named axis at a time, so the
//! reductions here work on a single positional axis and drop it.

use crate::error::{Error, Result};
use crate::{Array, Shape};

/// Fold `f` over one axis starting from `init`, removing that axis.
fn reduce_axis<F>(input: &Array, axis: usize, init: f64, f: F) -> Result<Array>
where
    F: Fn(f64, f64) -> f64,
{
    let dims = input.shape().as_slice();
    if axis >= dims.len() {
        return Err(Error::AxisOutOfBounds { axis, ndim: dims.len() });
    }

    let mut result_dims = dims.to_vec();
    let axis_len = result_dims.remove(axis);
    let result_shape = Shape::new(result_dims);

    // Split into (outer, axis, inner) blocks of the row-major layout.
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();
    let data = input.as_slice();

    let mut result = vec![init; outer * inner];
    for o in 0..outer {
        for k in 0..axis_len {
            let base = (o * axis_len + k) * inner;
            for i in 0..inner {
                let slot = &mut result[o * inner + i];
                *slot = f(*slot, data[base + i]);
            }
        }
    }

    Ok(Array::from_parts(result, result_shape))
}

impl Array {
    /// Sum along an axis.
    ///
    /// ```
    /// # use marginal_rs::{Array, Shape};
    /// let a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2])).unwrap();
    /// assert_eq!(a.sum(0).unwrap().to_vec(), vec![4.0, 6.0]);
    /// ```
    pub fn sum(&self, axis: usize) -> Result<Array> {
        reduce_axis(self, axis, 0.0, |acc, x| acc + x)
    }

    /// Product along an axis.
    pub fn prod(&self, axis: usize) -> Result<Array> {
        reduce_axis(self, axis, 1.0, |acc, x| acc * x)
    }

    /// Maximum along an axis.
    pub fn max(&self, axis: usize) -> Result<Array> {
        reduce_axis(self, axis, f64::NEG_INFINITY, f64::max)
    }

    /// `log(sum(exp(x)))` along an axis, stabilized by the axis maximum.
    pub fn logsumexp(&self, axis: usize) -> Result<Array> {
        let max = self.max(axis)?;
        let max_kept = max.expand_dims(axis)?;
        let shifted = self.sub(&max_kept)?.map(|x| if x.is_nan() { f64::NEG_INFINITY } else { x });
        let summed = shifted.exp().sum(axis)?;
        let data = summed
            .as_slice()
            .iter()
            .zip(max.as_slice())
            .map(|(&s, &m)| if m.is_infinite() { m } else { m + s.ln() })
            .collect();
        Ok(Array::from_parts(data, summed.shape().clone()))
    }
}
