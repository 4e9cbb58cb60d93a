//! Semirings for sum-product contraction.
//!
//! A sum-product reduces factors with two associative operations: a "sum"
//! that eliminates variables and a "product" that combines factors and
//! eliminates plates. The log-density path uses `(logaddexp, add)`; the
//! other instances exist for testing and for max-product decoding.

use crate::error::Result;
use crate::ops::binary::logaddexp;
use crate::Array;
use std::fmt;

/// A binary associative and commutative operation on scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a * b`
    Mul,
    /// `log(exp(a) + exp(b))`
    LogAddExp,
    /// `max(a, b)`
    Max,
}

impl BinaryOp {
    /// Apply to two scalars.
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Mul => a * b,
            BinaryOp::LogAddExp => logaddexp(a, b),
            BinaryOp::Max => a.max(b),
        }
    }

    /// Identity element: `apply(unit, x) == x`.
    pub fn unit(self) -> f64 {
        match self {
            BinaryOp::Add => 0.0,
            BinaryOp::Mul => 1.0,
            BinaryOp::LogAddExp | BinaryOp::Max => f64::NEG_INFINITY,
        }
    }

    /// Apply element-wise with broadcasting.
    pub fn apply_array(self, lhs: &Array, rhs: &Array) -> Result<Array> {
        match self {
            BinaryOp::Add => lhs.add(rhs),
            BinaryOp::Mul => lhs.mul(rhs),
            BinaryOp::LogAddExp => lhs.logaddexp(rhs),
            BinaryOp::Max => lhs.maximum(rhs),
        }
    }

    /// Reduce one positional axis.
    pub fn reduce_axis(self, array: &Array, axis: usize) -> Result<Array> {
        match self {
            BinaryOp::Add => array.sum(axis),
            BinaryOp::Mul => array.prod(axis),
            BinaryOp::LogAddExp => array.logsumexp(axis),
            BinaryOp::Max => array.max(axis),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Mul => "mul",
            BinaryOp::LogAddExp => "logaddexp",
            BinaryOp::Max => "max",
        };
        f.write_str(name)
    }
}

/// A `(sum, product)` pair of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semiring {
    /// Eliminates sum variables
    pub sum_op: BinaryOp,
    /// Combines factors and eliminates plates
    pub prod_op: BinaryOp,
}

impl Semiring {
    /// Log-space probabilities: marginalize with `logaddexp`, combine with `+`.
    pub const LOG: Semiring = Semiring { sum_op: BinaryOp::LogAddExp, prod_op: BinaryOp::Add };

    /// Max-product in log space.
    pub const MAX_LOG: Semiring = Semiring { sum_op: BinaryOp::Max, prod_op: BinaryOp::Add };

    /// Linear-space probabilities.
    pub const REAL: Semiring = Semiring { sum_op: BinaryOp::Add, prod_op: BinaryOp::Mul };

    /// A semiring from its two operations.
    pub fn new(sum_op: BinaryOp, prod_op: BinaryOp) -> Self {
        Self { sum_op, prod_op }
    }
}

impl fmt::Display for Semiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sum_op, self.prod_op)
    }
}
