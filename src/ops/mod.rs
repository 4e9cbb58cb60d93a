//! Array operations and transformations.

pub mod binary;
pub mod manipulation;
pub mod reduce;
pub mod unary;
