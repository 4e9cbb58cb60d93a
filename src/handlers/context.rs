//! Model execution context and message routing.
//!
//! Every statement a model executes becomes a [`Message`] that travels
//! through the stack of active handlers: innermost first on the way in,
//! then default processing, then back out through the handlers that saw it.

use crate::config::PlateFactory;
use crate::distributions::Distribution;
use crate::error::{Error, Result};
use crate::handlers::plate::current_plate_factory;
use crate::handlers::trace::{InferConfig, PlateFrame};
use crate::random::PRNGKey;
use crate::{Array, Shape};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a message is about.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// A `sample` or `observe` statement.
    Sample {
        /// Distribution at the site
        dist: Arc<dyn Distribution>,
        /// Whether the value came from data
        is_observed: bool,
        /// Intermediates from the default draw
        intermediates: Vec<Array>,
    },
    /// A `param` statement.
    Param,
    /// A `deterministic` statement.
    Deterministic,
}

/// A statement in flight through the handler stack.
#[derive(Debug, Clone)]
pub struct Message {
    /// Site name
    pub name: String,
    /// Statement kind
    pub kind: MessageKind,
    /// Value, once a handler or default processing supplies one
    pub value: Option<Array>,
    /// Log-probability weight accumulated by `scale` handlers
    pub scale: Option<f64>,
    /// Enclosing plates, outermost first
    pub cond_indep_stack: Vec<PlateFrame>,
    /// Inference hints
    pub infer: InferConfig,
    /// Key for default sampling, set by `seed`
    pub rng_key: Option<PRNGKey>,
    /// Set by a handler to hide the message from the handlers outside it.
    pub stop: bool,
}

impl Message {
    fn new(name: &str, kind: MessageKind, value: Option<Array>, frames: &[PlateFrame]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value,
            scale: None,
            cond_indep_stack: frames.to_vec(),
            infer: InferConfig::default(),
            rng_key: None,
            stop: false,
        }
    }

    /// The distribution of a sample message.
    pub fn dist(&self) -> Option<&Arc<dyn Distribution>> {
        match &self.kind {
            MessageKind::Sample { dist, .. } => Some(dist),
            _ => None,
        }
    }

    /// Returns true for sample and observe statements.
    pub fn is_sample(&self) -> bool {
        matches!(self.kind, MessageKind::Sample { .. })
    }

    /// Returns true for observed sample statements.
    pub fn is_observed(&self) -> bool {
        matches!(self.kind, MessageKind::Sample { is_observed: true, .. })
    }
}

/// An effect handler.
///
/// Handlers see messages on the way in (`process_message`, innermost handler
/// first) and on the way out (`postprocess_message`). `enter` and `exit`
/// bracket the handler's time on the stack.
pub trait Messenger {
    /// Called when the handler is pushed.
    fn enter(&mut self, _state: &mut ExecutionState) -> Result<()> {
        Ok(())
    }

    /// Called when the handler is popped, also on error.
    fn exit(&mut self, _state: &mut ExecutionState) {}

    /// Inspect or rewrite a message before default processing.
    fn process_message(&mut self, _msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
        Ok(())
    }

    /// Observe a message after default processing.
    fn postprocess_message(&mut self, _msg: &Message, _state: &mut ExecutionState) -> Result<()> {
        Ok(())
    }
}

/// Bookkeeping shared by the handlers of one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// Active plates, outermost first.
    pub(crate) frames: Vec<PlateFrame>,
    pub(crate) plate_factory: PlateFactory,
    /// Symbolic names of batch dims: enumerated sites and enumerated plates.
    pub(crate) dim_names: BTreeMap<isize, String>,
    /// Leftmost dim plates may use is one right of this, when enumerating.
    pub(crate) first_available_dim: Option<isize>,
}

impl ExecutionState {
    /// Active plates, outermost first.
    pub fn frames(&self) -> &[PlateFrame] {
        &self.frames
    }

    /// Symbolic names of the named batch dims.
    pub fn dim_names(&self) -> &BTreeMap<isize, String> {
        &self.dim_names
    }

    /// First enumeration dim, when an `enumerate` handler is active.
    pub fn first_available_dim(&self) -> Option<isize> {
        self.first_available_dim
    }

    /// Name the batch dims of `shape` that carry a symbolic name.
    fn dim_to_name(&self, shape: &Shape) -> BTreeMap<isize, String> {
        let ndim = shape.ndim() as isize;
        (0..ndim)
            .map(|i| i - ndim)
            .filter_map(|dim| self.dim_names.get(&dim).map(|name| (dim, name.clone())))
            .collect()
    }
}

/// Execution context of a model.
///
/// A context owns the handler stack and the plate bookkeeping. Models never
/// create one; the code that runs a model (for example
/// [`TraceHandler::get_trace`](crate::handlers::TraceHandler::get_trace))
/// does.
pub struct Context {
    stack: Vec<Box<dyn Messenger>>,
    pub(crate) state: ExecutionState,
}

impl Context {
    /// A context using the thread's current plate factory.
    pub fn new() -> Self {
        Self::with_plate_factory(current_plate_factory())
    }

    /// A context creating plates with `plate_factory`.
    pub fn with_plate_factory(plate_factory: PlateFactory) -> Self {
        Self { stack: Vec::new(), state: ExecutionState { plate_factory, ..ExecutionState::default() } }
    }

    /// Kind of plate this context creates.
    pub fn plate_factory(&self) -> PlateFactory {
        self.state.plate_factory
    }

    /// Plate and dim bookkeeping of this execution.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Run `body` with `handler` pushed on top of the stack.
    ///
    /// The handler is popped again whether or not `body` succeeds.
    pub fn with_handler<R, F>(&mut self, mut handler: Box<dyn Messenger>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Context) -> Result<R>,
    {
        handler.enter(&mut self.state)?;
        self.stack.push(handler);
        let result = body(self);
        if let Some(mut handler) = self.stack.pop() {
            handler.exit(&mut self.state);
        }
        result
    }

    /// Draw a latent value from `dist`.
    pub fn sample<D: Distribution + 'static>(&mut self, name: &str, dist: D) -> Result<Array> {
        self.sample_with(name, Arc::new(dist), None, InferConfig::default())
    }

    /// Score an observed value under `dist`.
    pub fn observe<D: Distribution + 'static>(&mut self, name: &str, dist: D, value: Array) -> Result<Array> {
        self.sample_with(name, Arc::new(dist), Some(value), InferConfig::default())
    }

    /// General sample statement.
    pub fn sample_with(
        &mut self,
        name: &str,
        dist: Arc<dyn Distribution>,
        obs: Option<Array>,
        infer: InferConfig,
    ) -> Result<Array> {
        let dist = self.state.broadcast_to_plates(dist)?;
        let kind = MessageKind::Sample { dist, is_observed: obs.is_some(), intermediates: Vec::new() };
        let mut msg = Message::new(name, kind, obs, &self.state.frames);
        msg.infer = infer;
        self.apply(msg)
    }

    /// A learnable parameter with initial value `init`.
    pub fn param(&mut self, name: &str, init: Array) -> Result<Array> {
        let msg = Message::new(name, MessageKind::Param, Some(init), &self.state.frames);
        self.apply(msg)
    }

    /// Record a derived value.
    pub fn deterministic(&mut self, name: &str, value: Array) -> Result<Array> {
        let msg = Message::new(name, MessageKind::Deterministic, Some(value), &self.state.frames);
        self.apply(msg)
    }

    fn apply(&mut self, mut msg: Message) -> Result<Array> {
        let depth = self.stack.len();
        let mut seen = 0;
        for handler in self.stack.iter_mut().rev() {
            seen += 1;
            handler.process_message(&mut msg, &mut self.state)?;
            if msg.stop {
                break;
            }
        }

        self.default_process(&mut msg)?;

        for handler in self.stack[depth - seen..].iter_mut() {
            handler.postprocess_message(&msg, &mut self.state)?;
        }

        msg.value.ok_or_else(|| Error::model(format!("site '{}' finished without a value", msg.name)))
    }

    fn default_process(&self, msg: &mut Message) -> Result<()> {
        let MessageKind::Sample { dist, intermediates, .. } = &mut msg.kind else {
            return Ok(());
        };
        if msg.value.is_none() {
            let key = msg.rng_key.ok_or_else(|| Error::MissingRngKey(msg.name.clone()))?;
            let (value, inter) = dist.sample_with_intermediates(key, &Shape::scalar())?;
            msg.value = Some(value);
            *intermediates = inter;
        }
        if let Some(value) = &msg.value {
            let event_ndim = dist.event_shape().ndim();
            let value_batch = value.shape().drop_right(event_ndim);
            let total = value_batch.broadcast(&dist.batch_shape())?;
            msg.infer.dim_to_name = self.state.dim_to_name(&total);
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Bernoulli, Normal};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        tag: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        stop: bool,
    }

    impl Messenger for Recorder {
        fn process_message(&mut self, msg: &mut Message, _state: &mut ExecutionState) -> Result<()> {
            self.log.borrow_mut().push(format!("in:{}", self.tag));
            msg.stop = self.stop;
            Ok(())
        }

        fn postprocess_message(&mut self, _msg: &Message, _state: &mut ExecutionState) -> Result<()> {
            self.log.borrow_mut().push(format!("out:{}", self.tag));
            Ok(())
        }
    }

    #[test]
    fn test_message_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Recorder { tag: "outer", log: log.clone(), stop: false };
        let inner = Recorder { tag: "inner", log: log.clone(), stop: false };
        let mut cx = Context::with_plate_factory(PlateFactory::Independent);
        cx.with_handler(Box::new(outer), |cx| {
            cx.with_handler(Box::new(inner), |cx| cx.deterministic("x", Array::scalar(1.0)))
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["in:inner", "in:outer", "out:outer", "out:inner"]);
    }

    #[test]
    fn test_stop_hides_message_from_outer_handlers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Recorder { tag: "outer", log: log.clone(), stop: false };
        let inner = Recorder { tag: "inner", log: log.clone(), stop: true };
        let mut cx = Context::with_plate_factory(PlateFactory::Independent);
        cx.with_handler(Box::new(outer), |cx| {
            cx.with_handler(Box::new(inner), |cx| cx.deterministic("x", Array::scalar(1.0)))
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["in:inner", "out:inner"]);
    }

    #[test]
    fn test_sample_without_key_fails() {
        let mut cx = Context::with_plate_factory(PlateFactory::Independent);
        let err = cx.sample("z", Bernoulli::with_prob(0.5).unwrap()).unwrap_err();
        assert_eq!(err, Error::MissingRngKey("z".into()));
    }

    #[test]
    fn test_observe_returns_value() {
        let mut cx = Context::with_plate_factory(PlateFactory::Independent);
        let x = cx.observe("x", Normal::standard(), Array::scalar(0.25)).unwrap();
        assert_eq!(x.item(), Some(0.25));
    }

    #[test]
    fn test_handler_popped_on_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut cx = Context::with_plate_factory(PlateFactory::Independent);
        let handler = Recorder { tag: "h", log: log.clone(), stop: false };
        let result: Result<()> = cx.with_handler(Box::new(handler), |_| Err(Error::model("boom")));
        assert!(result.is_err());
        cx.deterministic("x", Array::scalar(0.0)).unwrap();
        assert!(log.borrow().is_empty());
    }
}
