//! Deferred sum-product evaluation.
//!
//! A contraction is evaluated in three phases: [`sum_product`] builds an
//! expression symbolically, [`optimize`] rewrites it into an efficient
//! elimination plan and the [`Interpreter`] computes it. No tensor
//! arithmetic happens before the plan is fixed.

pub mod builder;
pub mod interpreter;
pub mod ir;
pub mod optimize;

pub use builder::{partial_sum_product, sum_product};
pub use interpreter::Interpreter;
pub use ir::{Expr, Inputs};
pub use optimize::{analyze, optimize, ExprStats};
