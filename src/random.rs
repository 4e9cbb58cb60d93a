//! Random number generation with reproducible PRNG keys.
//!
//! Keys are explicit values: the `seed` handler splits a fresh key for every
//! sample site, so a model run under the same seed always draws the same
//! values.

use crate::error::Result;
use crate::{Array, Shape};

/// PRNG key for reproducible random number generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PRNGKey {
    state: [u64; 2],
}

impl PRNGKey {
    /// Create a new PRNG key from a seed.
    ///
    /// ```
    /// # use marginal_rs::random::PRNGKey;
    /// let key = PRNGKey::from_seed(42);
    /// assert_eq!(key, PRNGKey::from_seed(42));
    /// ```
    pub fn from_seed(seed: u64) -> Self {
        // xorshift needs a non-zero state
        let s0 = seed ^ 0x853c_49e6_748f_ea9b;
        Self { state: [s0, seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1] }
    }

    /// Split a key into two independent keys.
    pub fn split(self) -> (Self, Self) {
        let mut key1 = self;
        let mut key2 = self;

        key1.state[0] = key1.state[0].wrapping_add(0x9e37_79b9_7f4a_7c15);
        key2.state[0] = key2.state[0].wrapping_add(0x3c6e_f372_fe94_f82a);

        key1.state[1] = key1.state[1].rotate_left(27);
        key2.state[1] = key2.state[1].rotate_right(17);

        (key1, key2)
    }

    /// xorshift128+
    fn next_u64(&mut self) -> u64 {
        let mut s1 = self.state[0];
        let s0 = self.state[1];

        self.state[0] = s0;
        s1 ^= s1 << 23;
        s1 ^= s1 >> 17;
        s1 ^= s0;
        s1 ^= s0 >> 26;
        self.state[1] = s1;

        s1.wrapping_add(s0)
    }

    /// Uniform in `[0, 1)` using the upper 53 bits.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Uniform random values in `[0, 1)`.
///
/// ```
/// # use marginal_rs::{random::{PRNGKey, uniform}, Shape};
/// let samples = uniform(PRNGKey::from_seed(42), Shape::new(vec![3, 2]));
/// assert_eq!(samples.shape().as_slice(), &[3, 2]);
/// assert!(samples.as_slice().iter().all(|&u| (0.0..1.0).contains(&u)));
/// ```
pub fn uniform(mut key: PRNGKey, shape: Shape) -> Array {
    let data = (0..shape.size()).map(|_| key.next_f64()).collect();
    Array::from_parts(data, shape)
}

/// Standard normal samples via the Box-Muller transform.
pub fn normal(mut key: PRNGKey, shape: Shape) -> Array {
    let size = shape.size();
    let mut data = Vec::with_capacity(size + 1);
    while data.len() < size {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - key.next_f64();
        let u2 = key.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        data.push(r * theta.cos());
        data.push(r * theta.sin());
    }
    data.truncate(size);
    Array::from_parts(data, shape)
}

/// Bernoulli draws (`0.0` or `1.0`) with success probabilities `probs`.
///
/// `probs` is broadcast to `shape`.
pub fn bernoulli(key: PRNGKey, probs: &Array, shape: Shape) -> Result<Array> {
    let probs = probs.broadcast_to(&shape)?;
    let u = uniform(key, shape);
    Ok(u.map_with(&probs, |u, p| if u < p { 1.0 } else { 0.0 }))
}

/// Categorical draws by inverse CDF over the last axis of `probs`.
///
/// `probs` has shape `batch ++ [K]` and must be normalized over its last
/// axis; the result has shape `batch` and holds category indices.
pub fn categorical(key: PRNGKey, probs: &Array) -> Array {
    let dims = probs.shape().as_slice();
    let k = dims.last().copied().unwrap_or(1);
    let batch = probs.shape().drop_right(1);
    let u = uniform(key, batch.clone());

    let data = u
        .as_slice()
        .iter()
        .zip(probs.as_slice().chunks(k.max(1)))
        .map(|(&u, row)| {
            let mut cdf = 0.0;
            for (i, &p) in row.iter().enumerate() {
                cdf += p;
                if u < cdf {
                    return i as f64;
                }
            }
            // rounding in the cdf can leave u above the final sum
            (k - 1) as f64
        })
        .collect();
    Array::from_parts(data, batch)
}

impl Array {
    /// Zip two same-shaped arrays element-wise.
    pub(crate) fn map_with<F>(&self, other: &Array, f: F) -> Array
    where
        F: Fn(f64, f64) -> f64,
    {
        debug_assert_eq!(self.shape(), other.shape());
        let data = self.as_slice().iter().zip(other.as_slice()).map(|(&a, &b)| f(a, b)).collect();
        Array::from_parts(data, self.shape().clone())
    }
}
