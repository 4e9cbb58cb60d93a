//! Probability distributions.
//!
//! Distributions are vectorized over a batch shape. A model draws from them at
//! sample sites; the effect handlers broadcast them to plate dimensions and,
//! for distributions with finite support, replace the draw by the full support
//! laid out along a fresh batch dimension.

use crate::error::{Error, Result};
use crate::ops::binary::{binary_op, broadcast_index};
use crate::random::{self, PRNGKey};
use crate::{Array, Shape};
use std::f64::consts::PI;
use std::fmt::Debug;
use std::sync::Arc;

/// A vectorized probability distribution over `f64` arrays.
///
/// Values have shape `sample_shape ++ batch_shape ++ event_shape`. Every
/// distribution in this crate has a scalar event shape.
pub trait Distribution: Debug + Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &'static str;

    /// Shape of the independent parameter batch.
    fn batch_shape(&self) -> Shape;

    /// Shape of a single draw.
    fn event_shape(&self) -> Shape {
        Shape::scalar()
    }

    /// Whether the support is finite and can be enumerated.
    fn has_enumerate_support(&self) -> bool {
        false
    }

    /// All support values along a new leftmost axis.
    ///
    /// With `expand == false` the result has shape `[K] ++ ones(batch_ndim)`,
    /// so it broadcasts against the batch; with `expand == true` it is
    /// materialized to `[K] ++ batch_shape`.
    fn enumerate_support(&self, expand: bool) -> Result<Array> {
        let _ = expand;
        Err(Error::NoEnumerateSupport(self.name()))
    }

    /// The same distribution broadcast to a larger batch shape.
    fn expand(&self, batch_shape: &Shape) -> Result<Arc<dyn Distribution>>;

    /// Draw a sample of shape `sample_shape ++ batch_shape ++ event_shape`.
    fn sample(&self, key: PRNGKey, sample_shape: &Shape) -> Result<Array>;

    /// Draw a sample together with intermediate values that make a later
    /// [`Distribution::log_prob_with_intermediates`] call cheaper.
    fn sample_with_intermediates(&self, key: PRNGKey, sample_shape: &Shape) -> Result<(Array, Vec<Array>)> {
        Ok((self.sample(key, sample_shape)?, Vec::new()))
    }

    /// Log-density (or log-mass) of `value`, broadcast against the batch.
    fn log_prob(&self, value: &Array) -> Result<Array>;

    /// Log-density of `value`, reusing intermediates from `sample_with_intermediates`.
    fn log_prob_with_intermediates(&self, value: &Array, intermediates: &[Array]) -> Result<Array> {
        let _ = intermediates;
        self.log_prob(value)
    }
}

/// Shape of the support array for a scalar-event distribution.
fn support_shape(k: usize, batch: &Shape, expand: bool) -> Shape {
    let tail = if expand { batch.clone() } else { Shape::ones(batch.ndim()) };
    Shape::new(vec![k]).concat(&tail)
}

fn is_integer(x: f64) -> bool {
    x.fract() == 0.0
}

/// Bernoulli distribution over `{0, 1}`.
#[derive(Debug, Clone)]
pub struct Bernoulli {
    probs: Array,
}

impl Bernoulli {
    /// Bernoulli with success probabilities `probs`.
    pub fn new(probs: Array) -> Result<Self> {
        if let Some(&p) = probs.as_slice().iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::InvalidParameter {
                dist: "Bernoulli",
                reason: format!("probability {} outside [0, 1]", p),
            });
        }
        Ok(Self { probs })
    }

    /// Bernoulli with a single scalar probability.
    pub fn with_prob(p: f64) -> Result<Self> {
        Self::new(Array::scalar(p))
    }

    /// Success probabilities.
    pub fn probs(&self) -> &Array {
        &self.probs
    }
}

impl Distribution for Bernoulli {
    fn name(&self) -> &'static str {
        "Bernoulli"
    }

    fn batch_shape(&self) -> Shape {
        self.probs.shape().clone()
    }

    fn has_enumerate_support(&self) -> bool {
        true
    }

    fn enumerate_support(&self, expand: bool) -> Result<Array> {
        let batch = self.batch_shape();
        let support = Array::vector(vec![0.0, 1.0]).reshape(support_shape(2, &batch, false))?;
        if expand {
            support.broadcast_to(&support_shape(2, &batch, true))
        } else {
            Ok(support)
        }
    }

    fn expand(&self, batch_shape: &Shape) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(Bernoulli { probs: self.probs.broadcast_to(batch_shape)? }))
    }

    fn sample(&self, key: PRNGKey, sample_shape: &Shape) -> Result<Array> {
        random::bernoulli(key, &self.probs, sample_shape.concat(&self.batch_shape()))
    }

    fn log_prob(&self, value: &Array) -> Result<Array> {
        if let Some(&v) = value.as_slice().iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(Error::OutOfSupport { dist: "Bernoulli", value: v });
        }
        // branch rather than v*ln(p) so that p == 0 never yields 0 * -inf
        binary_op(value, &self.probs, |v, p| if v == 1.0 { p.ln() } else { (1.0 - p).ln() })
    }
}

/// Categorical distribution over `{0, ..., K-1}`.
///
/// `probs` has shape `batch_shape ++ [K]` and is normalized over its last axis
/// on construction.
#[derive(Debug, Clone)]
pub struct Categorical {
    probs: Array,
}

impl Categorical {
    /// Categorical over the last axis of `probs`.
    pub fn new(probs: Array) -> Result<Self> {
        let k = match probs.shape().as_slice().last() {
            Some(&k) if k > 0 => k,
            _ => {
                return Err(Error::InvalidParameter {
                    dist: "Categorical",
                    reason: "probs needs a non-empty trailing axis".to_string(),
                })
            }
        };
        let mut data = probs.to_vec();
        for row in data.chunks_mut(k) {
            if row.iter().any(|&p| p < 0.0 || !p.is_finite()) {
                return Err(Error::InvalidParameter {
                    dist: "Categorical",
                    reason: "probs must be finite and non-negative".to_string(),
                });
            }
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                return Err(Error::InvalidParameter {
                    dist: "Categorical",
                    reason: "probs must have positive mass".to_string(),
                });
            }
            row.iter_mut().for_each(|p| *p /= total);
        }
        Ok(Self { probs: Array::from_vec(data, probs.shape().clone())? })
    }

    /// Number of categories `K`.
    pub fn num_categories(&self) -> usize {
        self.probs.shape().as_slice().last().copied().unwrap_or(0)
    }

    /// Normalized category probabilities.
    pub fn probs(&self) -> &Array {
        &self.probs
    }
}

impl Distribution for Categorical {
    fn name(&self) -> &'static str {
        "Categorical"
    }

    fn batch_shape(&self) -> Shape {
        self.probs.shape().drop_right(1)
    }

    fn has_enumerate_support(&self) -> bool {
        true
    }

    fn enumerate_support(&self, expand: bool) -> Result<Array> {
        let k = self.num_categories();
        let batch = self.batch_shape();
        let support = Array::arange(k).reshape(support_shape(k, &batch, false))?;
        if expand {
            support.broadcast_to(&support_shape(k, &batch, true))
        } else {
            Ok(support)
        }
    }

    fn expand(&self, batch_shape: &Shape) -> Result<Arc<dyn Distribution>> {
        let target = batch_shape.concat(&Shape::new(vec![self.num_categories()]));
        Ok(Arc::new(Categorical { probs: self.probs.broadcast_to(&target)? }))
    }

    fn sample(&self, key: PRNGKey, sample_shape: &Shape) -> Result<Array> {
        let target = sample_shape.concat(self.probs.shape());
        Ok(random::categorical(key, &self.probs.broadcast_to(&target)?))
    }

    fn log_prob(&self, value: &Array) -> Result<Array> {
        let k = self.num_categories();
        let batch = self.batch_shape();
        let out_shape = value.shape().broadcast(&batch)?;
        let log_probs = self.probs.log();
        let lp = log_probs.as_slice();
        let values = value.as_slice();

        let mut out = Vec::with_capacity(out_shape.size());
        for i in 0..out_shape.size() {
            let v = values[broadcast_index(i, &out_shape, value.shape())];
            if v < 0.0 || !is_integer(v) || v as usize >= k {
                return Err(Error::OutOfSupport { dist: "Categorical", value: v });
            }
            let row = broadcast_index(i, &out_shape, &batch);
            out.push(lp[row * k + v as usize]);
        }
        Array::from_vec(out, out_shape)
    }
}

/// Normal distribution.
#[derive(Debug, Clone)]
pub struct Normal {
    loc: Array,
    scale: Array,
}

impl Normal {
    /// Normal with broadcastable `loc` and `scale`.
    pub fn new(loc: Array, scale: Array) -> Result<Self> {
        if let Some(&s) = scale.as_slice().iter().find(|&&s| !(s > 0.0)) {
            return Err(Error::InvalidParameter {
                dist: "Normal",
                reason: format!("scale {} is not positive", s),
            });
        }
        // validates that the parameters broadcast
        loc.shape().broadcast(scale.shape())?;
        Ok(Self { loc, scale })
    }

    /// Scalar `Normal(0, 1)`.
    pub fn standard() -> Self {
        Self { loc: Array::scalar(0.0), scale: Array::scalar(1.0) }
    }

    /// Scalar normal from plain floats.
    pub fn with_params(loc: f64, scale: f64) -> Result<Self> {
        Self::new(Array::scalar(loc), Array::scalar(scale))
    }
}

impl Distribution for Normal {
    fn name(&self) -> &'static str {
        "Normal"
    }

    fn batch_shape(&self) -> Shape {
        self.loc.shape().broadcast_with(self.scale.shape()).unwrap_or_default()
    }

    fn expand(&self, batch_shape: &Shape) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(Normal {
            loc: self.loc.broadcast_to(batch_shape)?,
            scale: self.scale.broadcast_to(batch_shape)?,
        }))
    }

    fn sample(&self, key: PRNGKey, sample_shape: &Shape) -> Result<Array> {
        let eps = random::normal(key, sample_shape.concat(&self.batch_shape()));
        eps.mul(&self.scale)?.add(&self.loc)
    }

    fn log_prob(&self, value: &Array) -> Result<Array> {
        let z = value.sub(&self.loc)?.div(&self.scale)?;
        let log_norm = self.scale.log().add_scalar(0.5 * (2.0 * PI).ln());
        z.square().mul_scalar(-0.5).sub(&log_norm)
    }
}

/// Log-normal distribution: `exp(X)` for `X ~ Normal(loc, scale)`.
///
/// Samples carry `log(value)` as their single intermediate.
#[derive(Debug, Clone)]
pub struct LogNormal {
    base: Normal,
}

impl LogNormal {
    /// Log-normal whose logarithm is `Normal(loc, scale)`.
    pub fn new(loc: Array, scale: Array) -> Result<Self> {
        Ok(Self { base: Normal::new(loc, scale)? })
    }

    fn log_prob_from_log(&self, log_value: &Array) -> Result<Array> {
        self.base.log_prob(log_value)?.sub(log_value)
    }
}

impl Distribution for LogNormal {
    fn name(&self) -> &'static str {
        "LogNormal"
    }

    fn batch_shape(&self) -> Shape {
        self.base.batch_shape()
    }

    fn expand(&self, batch_shape: &Shape) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(LogNormal {
            base: Normal {
                loc: self.base.loc.broadcast_to(batch_shape)?,
                scale: self.base.scale.broadcast_to(batch_shape)?,
            },
        }))
    }

    fn sample(&self, key: PRNGKey, sample_shape: &Shape) -> Result<Array> {
        Ok(self.base.sample(key, sample_shape)?.exp())
    }

    fn sample_with_intermediates(&self, key: PRNGKey, sample_shape: &Shape) -> Result<(Array, Vec<Array>)> {
        let log_value = self.base.sample(key, sample_shape)?;
        Ok((log_value.exp(), vec![log_value]))
    }

    fn log_prob(&self, value: &Array) -> Result<Array> {
        if let Some(&v) = value.as_slice().iter().find(|&&v| v <= 0.0) {
            return Err(Error::OutOfSupport { dist: "LogNormal", value: v });
        }
        self.log_prob_from_log(&value.log())
    }

    fn log_prob_with_intermediates(&self, value: &Array, intermediates: &[Array]) -> Result<Array> {
        match intermediates.first() {
            Some(log_value) => self.log_prob_from_log(log_value),
            None => self.log_prob(value),
        }
    }
}
