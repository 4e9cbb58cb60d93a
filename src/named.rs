//! Named tensors.
//!
//! A [`Factor`] is an array whose axes are identified by name instead of by
//! position. Positional batch dims of a site's log-probability become names
//! through the site's dim-to-name mapping; from then on every operation
//! aligns operands by name, so factors from different sites combine without
//! any bookkeeping about where each variable happened to sit.

use crate::error::{Error, Result};
use crate::semiring::BinaryOp;
use crate::{Array, Shape};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An array with one name per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    names: Vec<String>,
    array: Array,
}

impl Factor {
    /// Pair an array with axis names. Names must be unique and one per axis.
    pub fn new(names: Vec<String>, array: Array) -> Result<Self> {
        if names.len() != array.ndim() {
            return Err(Error::AxisOutOfBounds { axis: names.len(), ndim: array.ndim() });
        }
        let mut seen = BTreeSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateDimName(name.clone()));
            }
        }
        Ok(Self { names, array })
    }

    /// A factor with no inputs.
    pub fn scalar(value: f64) -> Self {
        Self { names: Vec::new(), array: Array::scalar(value) }
    }

    /// Name the batch axes of a positional array.
    ///
    /// Axis `i` of an `n`-dimensional array sits at negative position
    /// `i - n`. Axes of size 1 are broadcast axes and are dropped whether or
    /// not they are named. Any other axis must have a name in `dim_to_name`.
    ///
    /// ```
    /// # use marginal_rs::{Array, Factor, Shape};
    /// # use std::collections::BTreeMap;
    /// let lp = Array::from_vec(vec![0.1, 0.2, 0.3, 0.4], Shape::new(vec![2, 1, 2])).unwrap();
    /// let names = BTreeMap::from([(-3, "z".to_string()), (-1, "data".to_string())]);
    /// let f = Factor::from_array(lp, &names, "x").unwrap();
    /// assert_eq!(f.names(), &["z".to_string(), "data".to_string()]);
    /// ```
    pub fn from_array(array: Array, dim_to_name: &BTreeMap<isize, String>, site: &str) -> Result<Self> {
        let dims = array.shape().as_slice();
        let ndim = dims.len() as isize;
        let mut names = Vec::new();
        let mut kept = Vec::new();
        for (i, &size) in dims.iter().enumerate() {
            let dim = i as isize - ndim;
            if size == 1 {
                continue;
            }
            match dim_to_name.get(&dim) {
                Some(name) => names.push(name.clone()),
                None => return Err(Error::UnnamedDim { site: site.to_string(), dim, size }),
            }
            kept.push(size);
        }
        let array = array.reshape(Shape::new(kept))?;
        Self::new(names, array)
    }

    /// Dim names, one per axis.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Underlying data.
    pub fn array(&self) -> &Array {
        &self.array
    }

    /// Consume the factor, keeping its data.
    pub fn into_array(self) -> Array {
        self.array
    }

    /// Free variables and their sizes.
    pub fn inputs(&self) -> BTreeMap<String, usize> {
        self.names
            .iter()
            .cloned()
            .zip(self.array.shape().as_slice().iter().copied())
            .collect()
    }

    /// Size of the axis called `name`.
    pub fn size_of(&self, name: &str) -> Option<usize> {
        let axis = self.axis_of(name)?;
        Some(self.array.shape().as_slice()[axis])
    }

    fn axis_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The single value of a factor with no inputs.
    pub fn item(&self) -> Option<f64> {
        if self.names.is_empty() {
            self.array.item()
        } else {
            None
        }
    }

    /// Lay the array out in `order` (a permutation of this factor's names)
    /// with size-1 axes for names in `order` the factor does not have.
    fn broadcast_layout(&self, order: &[String]) -> Result<Array> {
        let mut perm = Vec::with_capacity(self.names.len());
        let mut dims = Vec::with_capacity(order.len());
        for name in order {
            match self.axis_of(name) {
                Some(axis) => {
                    perm.push(axis);
                    dims.push(self.array.shape().as_slice()[axis]);
                }
                None => dims.push(1),
            }
        }
        self.array.permute(&perm)?.reshape(Shape::new(dims))
    }

    /// Combine two factors element-wise, aligning shared names.
    ///
    /// The result's names are `self`'s followed by the names only `other` has.
    pub fn binary(&self, other: &Factor, op: BinaryOp) -> Result<Factor> {
        let mut names = self.names.clone();
        for (name, size) in other.names.iter().zip(other.array.shape().as_slice()) {
            match self.size_of(name) {
                Some(own) if own != *size => {
                    return Err(Error::DimSizeMismatch { name: name.clone(), lhs: own, rhs: *size })
                }
                Some(_) => {}
                None => names.push(name.clone()),
            }
        }
        let lhs = self.broadcast_layout(&names)?;
        let rhs = other.broadcast_layout(&names)?;
        Ok(Factor { names, array: op.apply_array(&lhs, &rhs)? })
    }

    /// Eliminate `vars` with `op`. Names the factor does not have are ignored.
    pub fn reduce<'a, I>(&self, op: BinaryOp, vars: I) -> Result<Factor>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut result = self.clone();
        for var in vars {
            if let Some(axis) = result.axis_of(var) {
                result.array = op.reduce_axis(&result.array, axis)?;
                result.names.remove(axis);
            }
        }
        Ok(result)
    }

    /// The array with axes in exactly the order `names`.
    pub fn align(&self, names: &[String]) -> Result<Array> {
        let same_set = names.len() == self.names.len() && names.iter().all(|n| self.axis_of(n).is_some());
        if !same_set {
            return Err(Error::ShapeMismatch {
                lhs: self.array.shape().as_slice().to_vec(),
                rhs: Vec::new(),
            });
        }
        self.broadcast_layout(names)
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factor[")?;
        for (i, (name, size)) in self.names.iter().zip(self.array.shape().as_slice()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, size)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn factor(names: &[&str], dims: Vec<usize>, data: Vec<f64>) -> Factor {
        let array = Array::from_vec(data, Shape::new(dims)).unwrap();
        Factor::new(names.iter().map(|s| s.to_string()).collect(), array).unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let array = Array::zeros(Shape::new(vec![2, 2]));
        let err = Factor::new(vec!["a".into(), "a".into()], array).unwrap_err();
        assert_eq!(err, Error::DuplicateDimName("a".into()));
    }

    #[test]
    fn test_from_array_unnamed_dim() {
        let lp = Array::zeros(Shape::new(vec![3, 2]));
        let names = BTreeMap::from([(-1, "data".to_string())]);
        let err = Factor::from_array(lp, &names, "obs").unwrap_err();
        assert_eq!(err, Error::UnnamedDim { site: "obs".into(), dim: -2, size: 3 });
    }

    #[test]
    fn test_from_array_drops_singletons() {
        let lp = Array::zeros(Shape::new(vec![1, 1]));
        let f = Factor::from_array(lp, &BTreeMap::new(), "x").unwrap();
        assert!(f.names().is_empty());
        assert_eq!(f.item(), Some(0.0));
    }

    #[test]
    fn test_binary_aligns_by_name() {
        // f(a, b) + g(b, c)
        let f = factor(&["a", "b"], vec![2, 3], (0..6).map(|x| x as f64).collect());
        let g = factor(&["c", "b"], vec![2, 3], (0..6).map(|x| 10.0 * x as f64).collect());
        let h = f.binary(&g, BinaryOp::Add).unwrap();
        assert_eq!(h.names(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        for a in 0..2 {
            for b in 0..3 {
                for c in 0..2 {
                    let want = f.array().get(&[a, b]).unwrap() + g.array().get(&[c, b]).unwrap();
                    assert_eq!(h.array().get(&[a, b, c]), Some(want));
                }
            }
        }
    }

    #[test]
    fn test_binary_size_mismatch() {
        let f = factor(&["a"], vec![2], vec![0.0, 0.0]);
        let g = factor(&["a"], vec![3], vec![0.0; 3]);
        assert!(matches!(f.binary(&g, BinaryOp::Add), Err(Error::DimSizeMismatch { .. })));
    }

    #[test]
    fn test_reduce_ignores_absent_vars() {
        let f = factor(&["a", "b"], vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let vars: Vec<String> = vec!["b".into(), "zzz".into()];
        let r = f.reduce(BinaryOp::Add, &vars).unwrap();
        assert_eq!(r.names(), &["a".to_string()]);
        assert_eq!(r.array().to_vec(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_reduce_logaddexp_to_scalar() {
        let f = factor(&["z"], vec![2], vec![0.3f64.ln(), 0.7f64.ln()]);
        let r = f.reduce(BinaryOp::LogAddExp, &["z".to_string()]).unwrap();
        assert_abs_diff_eq!(r.item().unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_align() {
        let f = factor(&["a", "b"], vec![2, 3], (0..6).map(|x| x as f64).collect());
        let t = f.align(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(t.shape().as_slice(), &[3, 2]);
        assert!(f.align(&["a".to_string()]).is_err());
    }

    #[test]
    fn test_display() {
        let f = factor(&["x", "y"], vec![2, 3], vec![0.0; 6]);
        assert_eq!(f.to_string(), "Factor[x=2, y=3]");
    }
}
