//! # marginal-rs: exact marginalization for probabilistic programs
//!
//! Computes the joint log-density of a probabilistic model while summing out
//! its discrete latent variables exactly instead of sampling them.
//!
//! ## Key Features
//!
//! - **Effect handlers**: `trace`, `seed`, `substitute`, `condition`, `scale`
//! - **Enumeration**: `config_enumerate` + `enumerate` lay discrete supports out along batch dims
//! - **Plates**: conditionally independent batches, eliminated as product variables
//! - **Lazy sum-product**: contractions are planned before any tensor is touched
//! - **Named factors**: log-probabilities combine by dim name, not position
//!
//! ## Quick Start
//!
//! ```rust
//! use marginal_rs::handlers::{config_enumerate, enumerate};
//! use marginal_rs::{log_density, Array, Bernoulli, Context, Normal, Result};
//! use std::collections::HashMap;
//!
//! // z ~ Bernoulli(0.3); x_i ~ Normal(3 z, 1)
//! let model = |cx: &mut Context, data: &Array| -> Result<()> {
//!     let z = cx.sample("z", Bernoulli::with_prob(0.3)?)?;
//!     let loc = z.mul_scalar(3.0);
//!     cx.plate("data", data.size(), |cx| {
//!         cx.observe("x", Normal::new(loc.clone(), Array::scalar(1.0))?, data.clone())?;
//!         Ok(())
//!     })
//! };
//!
//! let data = Array::vector(vec![2.9, 3.2, 2.7]);
//! let model = enumerate(config_enumerate(model), -2);
//! let (log_joint, trace) = log_density(model, &data, &HashMap::new()).unwrap();
//! assert!(log_joint.is_scalar());
//! assert_eq!(trace.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod array;
pub mod config;
pub mod density;
pub mod distributions;
mod error;
pub mod handlers;
pub mod lazy;
mod named;
pub mod ops;
pub mod random;
pub mod semiring;
mod shape;

// Public exports
pub use array::Array;
pub use config::{ContractionStrategy, EliminationConfig, EnumStrategy, PlateFactory};
pub use density::{assemble_factor_graph, log_density, log_density_with_config, FactorGraph};
pub use distributions::{Bernoulli, Categorical, Distribution, LogNormal, Normal};
pub use error::{Error, Result};
pub use handlers::{plate_to_enum_plate, Context, Model, Trace};
pub use named::Factor;
pub use semiring::{BinaryOp, Semiring};
pub use shape::Shape;
