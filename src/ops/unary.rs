//! Element-wise unary operations.

use crate::Array;

impl Array {
    /// Apply a function to every element.
    pub fn map<F>(&self, f: F) -> Array
    where
        F: Fn(f64) -> f64,
    {
        let data = self.as_slice().iter().map(|&x| f(x)).collect();
        Array::from_parts(data, self.shape().clone())
    }

    /// Element-wise `e^x`.
    pub fn exp(&self) -> Array {
        self.map(f64::exp)
    }

    /// Natural logarithm (`log(0) = -inf`).
    pub fn log(&self) -> Array {
        self.map(f64::ln)
    }

    /// Element-wise `x^2`.
    pub fn square(&self) -> Array {
        self.map(|x| x * x)
    }
}

#[cfg(test)]
mod tests {
    use crate::Array;

    #[test]
    fn test_exp_log_inverse() {
        let a = Array::vector(vec![0.5, 1.0, 2.0]);
        let b = a.log().exp();
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_log_zero() {
        let a = Array::vector(vec![0.0]);
        assert_eq!(a.log().to_vec(), vec![f64::NEG_INFINITY]);
    }

    #[test]
    fn test_square() {
        let a = Array::vector(vec![-2.0, 3.0]);
        assert_eq!(a.square().to_vec(), vec![4.0, 9.0]);
    }
}
