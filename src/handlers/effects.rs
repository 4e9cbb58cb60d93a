//! Model wrappers that reinterpret sample statements.
//!
//! Each wrapper installs one [`Messenger`] for the duration of a model run.
//! Wrappers compose: the outermost wrapper's handler sits lowest on the
//! stack and sees messages last.

use crate::config::EnumStrategy;
use crate::error::{Error, Result};
use crate::handlers::context::{Context, ExecutionState, Message, MessageKind, Messenger};
use crate::handlers::trace::InferConfig;
use crate::handlers::Model;
use crate::random::PRNGKey;
use crate::{Array, Shape};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// A model run under one extra handler.
///
/// `make` builds a fresh handler for every run, so wrapped models can be run
/// any number of times.
pub struct Handled<M, F> {
    model: M,
    make: F,
}

impl<A, M, F> Model<A> for Handled<M, F>
where
    A: ?Sized,
    M: Model<A>,
    F: Fn() -> Box<dyn Messenger>,
{
    fn run(&self, cx: &mut Context, args: &A) -> Result<()> {
        cx.with_handler((self.make)(), |cx| self.model.run(cx, args))
    }
}

fn handled<M, F>(model: M, make: F) -> Handled<M, F>
where
    F: Fn() -> Box<dyn Messenger>,
{
    Handled { model, make }
}

type ConfigFn = dyn Fn(&Message, &mut InferConfig);

struct InferConfigMessenger {
    config_fn: Arc<ConfigFn>,
}

impl Messenger for InferConfigMessenger {
    fn process_message(&mut self, msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
        if msg.is_sample() {
            let mut infer = std::mem::take(&mut msg.infer);
            (self.config_fn)(msg, &mut infer);
            msg.infer = infer;
        }
        Ok(())
    }
}

/// Let `config_fn` edit the inference hints of every sample site.
pub fn infer_config<M, F>(model: M, config_fn: F) -> Handled<M, impl Fn() -> Box<dyn Messenger>>
where
    F: Fn(&Message, &mut InferConfig) + 'static,
{
    let config_fn: Arc<ConfigFn> = Arc::new(config_fn);
    handled(model, move || Box::new(InferConfigMessenger { config_fn: config_fn.clone() }) as Box<dyn Messenger>)
}

/// Configure parallel enumeration for every latent site with finite support.
pub fn config_enumerate<M>(model: M) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    config_enumerate_with(model, Some(EnumStrategy::Parallel))
}

/// Configure enumeration with an explicit default.
///
/// Only unobserved sites whose distribution has enumerable support are
/// touched, and a strategy a site already carries is kept.
pub fn config_enumerate_with<M>(
    model: M,
    default: Option<EnumStrategy>,
) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    infer_config(model, move |msg: &Message, infer: &mut InferConfig| {
        let enumerable = msg.dist().is_some_and(|d| d.has_enumerate_support());
        if enumerable && !msg.is_observed() && infer.enumerate.is_none() {
            infer.enumerate = default;
        }
    })
}

struct EnumMessenger {
    first_available_dim: isize,
    next_dim: isize,
    previous: Option<isize>,
}

impl Messenger for EnumMessenger {
    fn enter(&mut self, state: &mut ExecutionState) -> Result<()> {
        if self.first_available_dim >= 0 {
            return Err(Error::InvalidFirstAvailableDim(self.first_available_dim));
        }
        self.previous = state.first_available_dim.replace(self.first_available_dim);
        self.next_dim = self.first_available_dim;
        Ok(())
    }

    fn exit(&mut self, state: &mut ExecutionState) {
        state.first_available_dim = self.previous;
    }

    fn process_message(&mut self, msg: &mut Message, state: &mut ExecutionState) -> Result<()> {
        if msg.value.is_some() || msg.infer.enumerate != Some(EnumStrategy::Parallel) {
            return Ok(());
        }
        let MessageKind::Sample { dist, is_observed: false, .. } = &msg.kind else {
            return Ok(());
        };
        if !dist.has_enumerate_support() {
            return Ok(());
        }

        while state.dim_names.contains_key(&self.next_dim) {
            self.next_dim -= 1;
        }
        let dim = self.next_dim;
        self.next_dim -= 1;

        let support = dist.enumerate_support(false)?;
        let k = support.shape().as_slice().first().copied().unwrap_or(1);
        let mut dims = vec![k];
        dims.extend(std::iter::repeat(1).take((-dim - 1) as usize));
        let value = support.reshape(Shape::new(dims))?;

        trace!(site = %msg.name, dim, support = k, "enumerating site");
        state.dim_names.insert(dim, msg.name.clone());
        msg.infer.enumerate_dim = Some(dim);
        msg.value = Some(value);
        Ok(())
    }
}

/// Enumerate configured sites in parallel, on dims at or left of
/// `first_available_dim`.
///
/// Plates inside the model must stay right of `first_available_dim`.
pub fn enumerate<M>(model: M, first_available_dim: isize) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    handled(model, move || {
        Box::new(EnumMessenger { first_available_dim, next_dim: first_available_dim, previous: None })
            as Box<dyn Messenger>
    })
}

struct SubstituteMessenger {
    data: Arc<HashMap<String, Array>>,
    observe: bool,
}

impl Messenger for SubstituteMessenger {
    fn process_message(&mut self, msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
        let Some(value) = self.data.get(&msg.name) else {
            return Ok(());
        };
        match &mut msg.kind {
            MessageKind::Sample { is_observed, .. } => {
                if self.observe {
                    *is_observed = true;
                }
                msg.value = Some(value.clone());
            }
            MessageKind::Param if !self.observe => msg.value = Some(value.clone()),
            _ => {}
        }
        Ok(())
    }
}

/// Replace the values of sample and param sites by name.
pub fn substitute<M>(model: M, data: HashMap<String, Array>) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    let data = Arc::new(data);
    handled(model, move || {
        Box::new(SubstituteMessenger { data: data.clone(), observe: false }) as Box<dyn Messenger>
    })
}

/// Fix the values of sample sites by name and mark them observed.
pub fn condition<M>(model: M, data: HashMap<String, Array>) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    let data = Arc::new(data);
    handled(model, move || {
        Box::new(SubstituteMessenger { data: data.clone(), observe: true }) as Box<dyn Messenger>
    })
}

struct SeedMessenger {
    key: PRNGKey,
}

impl Messenger for SeedMessenger {
    fn process_message(&mut self, msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
        if msg.is_sample() && msg.value.is_none() && msg.rng_key.is_none() {
            let (next, site_key) = self.key.split();
            self.key = next;
            msg.rng_key = Some(site_key);
        }
        Ok(())
    }
}

/// Supply PRNG keys to sample sites, splitting `key` once per site.
pub fn seed<M>(model: M, key: PRNGKey) -> Handled<M, impl Fn() -> Box<dyn Messenger>> {
    handled(model, move || Box::new(SeedMessenger { key }) as Box<dyn Messenger>)
}

struct ScaleMessenger {
    scale: f64,
}

impl Messenger for ScaleMessenger {
    fn process_message(&mut self, msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
        if msg.is_sample() {
            msg.scale = Some(msg.scale.unwrap_or(1.0) * self.scale);
        }
        Ok(())
    }
}

/// Multiply the log-probability of every sample site by `scale`.
pub fn scale<M>(model: M, scale: f64) -> Result<Handled<M, impl Fn() -> Box<dyn Messenger>>> {
    if !(scale > 0.0) {
        return Err(Error::InvalidScale(scale));
    }
    Ok(handled(model, move || Box::new(ScaleMessenger { scale }) as Box<dyn Messenger>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Bernoulli, Categorical, Normal};
    use crate::handlers::trace::trace;

    fn mixed_model(cx: &mut Context, _: &()) -> Result<()> {
        cx.sample("z", Bernoulli::with_prob(0.3)?)?;
        cx.sample("c", Categorical::new(Array::vector(vec![0.2, 0.3, 0.5]))?)?;
        cx.sample("x", Normal::standard())?;
        cx.observe("y", Bernoulli::with_prob(0.5)?, Array::scalar(1.0))?;
        Ok(())
    }

    #[test]
    fn test_config_enumerate_marks_discrete_latents() {
        let model = seed(config_enumerate(mixed_model), PRNGKey::from_seed(0));
        let tr = trace(model).get_trace(&()).unwrap();
        let strategy = |name: &str| tr.get(name).and_then(|s| s.as_sample()).and_then(|s| s.infer.enumerate);
        assert_eq!(strategy("z"), Some(EnumStrategy::Parallel));
        assert_eq!(strategy("c"), Some(EnumStrategy::Parallel));
        assert_eq!(strategy("x"), None);
        assert_eq!(strategy("y"), None);
    }

    #[test]
    fn test_enumerate_allocates_dims() {
        let model = seed(enumerate(config_enumerate(mixed_model), -1), PRNGKey::from_seed(0));
        let tr = trace(model).get_trace(&()).unwrap();
        let z = tr.get("z").and_then(|s| s.as_sample()).unwrap();
        let c = tr.get("c").and_then(|s| s.as_sample()).unwrap();
        assert_eq!(z.infer.enumerate_dim, Some(-1));
        assert_eq!(z.value.to_vec(), vec![0.0, 1.0]);
        assert_eq!(c.infer.enumerate_dim, Some(-2));
        assert_eq!(c.value.shape().as_slice(), &[3, 1]);
        assert_eq!(c.infer.dim_to_name.get(&-2).map(String::as_str), Some("c"));
    }

    #[test]
    fn test_invalid_first_available_dim() {
        let model = enumerate(config_enumerate(mixed_model), 0);
        let err = trace(model).get_trace(&()).unwrap_err();
        assert_eq!(err, Error::InvalidFirstAvailableDim(0));
    }

    #[test]
    fn test_condition_marks_observed() {
        let data = HashMap::from([("x".to_string(), Array::scalar(0.5))]);
        let model = seed(condition(mixed_model, data), PRNGKey::from_seed(1));
        let tr = trace(model).get_trace(&()).unwrap();
        let x = tr.get("x").and_then(|s| s.as_sample()).unwrap();
        assert!(x.is_observed);
        assert_eq!(x.value.item(), Some(0.5));
    }

    #[test]
    fn test_scale_multiplies() {
        let model = scale(scale(seed(mixed_model, PRNGKey::from_seed(2)), 2.0).unwrap(), 3.0).unwrap();
        let tr = trace(model).get_trace(&()).unwrap();
        assert!(tr.sample_sites().all(|s| s.scale == Some(6.0)));
        assert!(scale(mixed_model, 0.0).is_err());
    }
}
