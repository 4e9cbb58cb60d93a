//! Shape manipulation: reshape, permute, broadcast and gather.

use crate::error::{Error, Result};
use crate::ops::binary::broadcast_index;
use crate::{Array, Shape};

impl Array {
    /// Reinterpret the data with a new shape of the same size.
    pub fn reshape(&self, shape: Shape) -> Result<Array> {
        if shape.size() != self.size() {
            return Err(Error::DataLength { len: self.size(), shape: shape.as_slice().to_vec() });
        }
        Ok(Array::from_parts(self.to_vec(), shape))
    }

    /// Reorder axes; `axes[i]` is the source axis that lands at position `i`.
    ///
    /// ```
    /// # use marginal_rs::{Array, Shape};
    /// let a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![2, 3])).unwrap();
    /// let t = a.permute(&[1, 0]).unwrap();
    /// assert_eq!(t.shape().as_slice(), &[3, 2]);
    /// assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn permute(&self, axes: &[usize]) -> Result<Array> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        for &axis in axes {
            if axis >= ndim || seen[axis] {
                return Err(Error::AxisOutOfBounds { axis, ndim });
            }
            seen[axis] = true;
        }
        if axes.len() != ndim {
            return Err(Error::AxisOutOfBounds { axis: axes.len(), ndim });
        }
        if axes.iter().enumerate().all(|(i, &a)| i == a) {
            return Ok(self.clone());
        }

        let src_dims = self.shape().as_slice();
        let src_strides = self.shape().default_strides();
        let result_shape = Shape::new(axes.iter().map(|&a| src_dims[a]).collect());
        let data = self.as_slice();

        let mut out = Vec::with_capacity(self.size());
        for flat in 0..result_shape.size() {
            let coords = result_shape.unravel(flat);
            let src: usize = coords
                .iter()
                .zip(axes)
                .map(|(&c, &a)| c * src_strides[a])
                .sum();
            out.push(data[src]);
        }
        Ok(Array::from_parts(out, result_shape))
    }

    /// Insert a size-1 axis at `axis`.
    pub fn expand_dims(&self, axis: usize) -> Result<Array> {
        if axis > self.ndim() {
            return Err(Error::AxisOutOfBounds { axis, ndim: self.ndim() });
        }
        let mut dims = self.shape().as_slice().to_vec();
        dims.insert(axis, 1);
        Ok(Array::from_parts(self.to_vec(), Shape::new(dims)))
    }

    /// Materialize a broadcast to `shape`.
    pub fn broadcast_to(&self, shape: &Shape) -> Result<Array> {
        let target = self.shape().broadcast(shape)?;
        if &target != shape {
            return Err(Error::ShapeMismatch {
                lhs: self.shape().as_slice().to_vec(),
                rhs: shape.as_slice().to_vec(),
            });
        }
        if self.shape() == shape {
            return Ok(self.clone());
        }
        let data = self.as_slice();
        let out = (0..shape.size())
            .map(|i| data[broadcast_index(i, shape, self.shape())])
            .collect();
        Ok(Array::from_parts(out, shape.clone()))
    }

    /// Gather rows along axis 0.
    ///
    /// The result has shape `indices.shape ++ self.shape[1..]`. Indices are
    /// `f64` values that must be non-negative integers below `self.shape[0]`.
    pub fn take(&self, indices: &Array) -> Result<Array> {
        let dims = self.shape().as_slice();
        if dims.is_empty() {
            return Err(Error::AxisOutOfBounds { axis: 0, ndim: 0 });
        }
        let rows = dims[0];
        let row_len: usize = dims[1..].iter().product();
        let data = self.as_slice();

        let mut out = Vec::with_capacity(indices.size() * row_len);
        for &index in indices.as_slice() {
            if index < 0.0 || index.fract() != 0.0 || index as usize >= rows {
                return Err(Error::IndexOutOfBounds { index, size: rows });
            }
            let start = index as usize * row_len;
            out.extend_from_slice(&data[start..start + row_len]);
        }

        let shape = indices.shape().concat(&Shape::from(&dims[1..]));
        Ok(Array::from_parts(out, shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape() {
        let a = Array::arange(6);
        let b = a.reshape(Shape::new(vec![2, 1, 3])).unwrap();
        assert_eq!(b.shape().as_slice(), &[2, 1, 3]);
        assert!(a.reshape(Shape::new(vec![4])).is_err());
    }

    #[test]
    fn test_permute_3d() {
        let a = Array::from_vec((0..24).map(|i| i as f64).collect(), Shape::new(vec![2, 3, 4])).unwrap();
        let p = a.permute(&[2, 0, 1]).unwrap();
        assert_eq!(p.shape().as_slice(), &[4, 2, 3]);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(p.get(&[k, i, j]), a.get(&[i, j, k]));
                }
            }
        }
    }

    #[test]
    fn test_permute_invalid() {
        let a = Array::arange(6).reshape(Shape::new(vec![2, 3])).unwrap();
        assert!(a.permute(&[0, 0]).is_err());
        assert!(a.permute(&[0]).is_err());
    }

    #[test]
    fn test_expand_dims() {
        let a = Array::vector(vec![1.0, 2.0]);
        let b = a.expand_dims(0).unwrap();
        assert_eq!(b.shape().as_slice(), &[1, 2]);
        assert_eq!(a.expand_dims(1).unwrap().shape().as_slice(), &[2, 1]);
        assert!(a.expand_dims(2).is_err());
    }

    #[test]
    fn test_broadcast_to() {
        let a = Array::from_vec(vec![1.0, 2.0], Shape::new(vec![2, 1])).unwrap();
        let b = a.broadcast_to(&Shape::new(vec![2, 3])).unwrap();
        assert_eq!(b.to_vec(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        assert!(a.broadcast_to(&Shape::new(vec![3])).is_err());
    }

    #[test]
    fn test_take() {
        let table = Array::from_vec(vec![0.1, 0.9, 0.8, 0.2], Shape::new(vec![2, 2])).unwrap();
        let idx = Array::from_vec(vec![1.0, 0.0, 1.0], Shape::new(vec![3, 1])).unwrap();
        let rows = table.take(&idx).unwrap();
        assert_eq!(rows.shape().as_slice(), &[3, 1, 2]);
        assert_eq!(rows.to_vec(), vec![0.8, 0.2, 0.1, 0.9, 0.8, 0.2]);
    }

    #[test]
    fn test_take_out_of_bounds() {
        let table = Array::vector(vec![1.0, 2.0]);
        assert!(matches!(table.take(&Array::scalar(2.0)), Err(Error::IndexOutOfBounds { .. })));
        assert!(matches!(table.take(&Array::scalar(0.5)), Err(Error::IndexOutOfBounds { .. })));
    }
}
