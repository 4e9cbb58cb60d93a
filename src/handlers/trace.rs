//! Recorded sites and the trace handler.

use crate::config::EnumStrategy;
use crate::distributions::Distribution;
use crate::error::{Error, Result};
use crate::handlers::context::{Context, ExecutionState, Message, MessageKind, Messenger};
use crate::handlers::Model;
use crate::Array;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace as trace_event;

/// One enclosing plate of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateFrame {
    /// Plate name
    pub name: String,
    /// Batch dim claimed by the plate; `None` for sequential plates.
    pub dim: Option<isize>,
    /// Number of independent copies
    pub size: usize,
}

/// Inference hints attached to a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferConfig {
    /// Requested enumeration strategy, if any
    pub enumerate: Option<EnumStrategy>,
    /// Batch dim holding the enumerated support, once enumerated.
    pub enumerate_dim: Option<isize>,
    /// Symbolic names of the value's batch dims.
    pub dim_to_name: BTreeMap<isize, String>,
}

impl InferConfig {
    /// Hints requesting enumeration with `strategy`.
    pub fn enumerated(strategy: EnumStrategy) -> Self {
        Self { enumerate: Some(strategy), ..Self::default() }
    }
}

/// A recorded random draw or observation.
#[derive(Debug, Clone)]
pub struct SampleSite {
    /// Site name
    pub name: String,
    /// Distribution the value was drawn from or scored under
    pub dist: Arc<dyn Distribution>,
    /// Drawn, enumerated or observed value
    pub value: Array,
    /// Sampling intermediates, empty unless the draw produced some
    pub intermediates: Vec<Array>,
    /// Whether the value came from data
    pub is_observed: bool,
    /// Weight of the site's log-probability; `None` means 1.
    pub scale: Option<f64>,
    /// Enclosing plates, outermost first
    pub cond_indep_stack: Vec<PlateFrame>,
    /// Inference hints
    pub infer: InferConfig,
}

impl SampleSite {
    /// Log-probability of the recorded value, reusing intermediates when the
    /// draw produced any.
    pub fn log_prob(&self) -> Result<Array> {
        if self.intermediates.is_empty() {
            self.dist.log_prob(&self.value)
        } else {
            self.dist.log_prob_with_intermediates(&self.value, &self.intermediates)
        }
    }
}

/// A recorded parameter.
#[derive(Debug, Clone)]
pub struct ParamSite {
    /// Parameter name
    pub name: String,
    /// Current parameter value
    pub value: Array,
    /// Enclosing plates, outermost first
    pub cond_indep_stack: Vec<PlateFrame>,
}

/// A recorded deterministic value.
#[derive(Debug, Clone)]
pub struct DeterministicSite {
    /// Site name
    pub name: String,
    /// Recorded value
    pub value: Array,
}

/// A site recorded by the trace handler.
#[derive(Debug, Clone)]
pub enum Site {
    /// Random draw or observation
    Sample(SampleSite),
    /// Learnable parameter
    Param(ParamSite),
    /// Named deterministic value
    Deterministic(DeterministicSite),
}

impl Site {
    fn from_message(msg: &Message) -> Result<Self> {
        let value = msg
            .value
            .clone()
            .ok_or_else(|| Error::model(format!("site '{}' finished without a value", msg.name)))?;
        let site = match &msg.kind {
            MessageKind::Sample { dist, is_observed, intermediates } => Site::Sample(SampleSite {
                name: msg.name.clone(),
                dist: dist.clone(),
                value,
                intermediates: intermediates.clone(),
                is_observed: *is_observed,
                scale: msg.scale,
                cond_indep_stack: msg.cond_indep_stack.clone(),
                infer: msg.infer.clone(),
            }),
            MessageKind::Param => Site::Param(ParamSite {
                name: msg.name.clone(),
                value,
                cond_indep_stack: msg.cond_indep_stack.clone(),
            }),
            MessageKind::Deterministic => Site::Deterministic(DeterministicSite { name: msg.name.clone(), value }),
        };
        Ok(site)
    }

    /// Site name.
    pub fn name(&self) -> &str {
        match self {
            Site::Sample(s) => &s.name,
            Site::Param(s) => &s.name,
            Site::Deterministic(s) => &s.name,
        }
    }

    /// Recorded value.
    pub fn value(&self) -> &Array {
        match self {
            Site::Sample(s) => &s.value,
            Site::Param(s) => &s.value,
            Site::Deterministic(s) => &s.value,
        }
    }

    /// The sample site, if this is one.
    pub fn as_sample(&self) -> Option<&SampleSite> {
        match self {
            Site::Sample(s) => Some(s),
            _ => None,
        }
    }
}

/// Sites of one model execution, in execution order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    sites: IndexMap<String, Site>,
}

impl Trace {
    /// An empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a site. Names are unique within a trace.
    pub fn insert(&mut self, site: Site) -> Result<()> {
        let name = site.name().to_string();
        if self.sites.contains_key(&name) {
            return Err(Error::DuplicateSite(name));
        }
        self.sites.insert(name, site);
        Ok(())
    }

    /// Look up a site by name.
    pub fn get(&self, name: &str) -> Option<&Site> {
        self.sites.get(name)
    }

    /// Number of recorded sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Returns true if no site was recorded.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Sites in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    /// Site names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    /// Sample sites in execution order.
    pub fn sample_sites(&self) -> impl Iterator<Item = &SampleSite> {
        self.sites.values().filter_map(Site::as_sample)
    }
}

struct TraceMessenger {
    trace: Rc<RefCell<Trace>>,
}

impl Messenger for TraceMessenger {
    fn postprocess_message(&mut self, msg: &Message, _state: &mut ExecutionState) -> Result<()> {
        let site = Site::from_message(msg)?;
        trace_event!(site = %msg.name, value = %site.value(), "recorded site");
        self.trace.borrow_mut().insert(site)
    }
}

/// Records every site of a model run.
pub struct TraceHandler<M> {
    model: M,
}

/// Wrap a model so that its execution can be recorded.
pub fn trace<M>(model: M) -> TraceHandler<M> {
    TraceHandler { model }
}

impl<M> TraceHandler<M> {
    /// Run the model once in a fresh [`Context`] and return its trace.
    pub fn get_trace<A: ?Sized>(&self, args: &A) -> Result<Trace>
    where
        M: Model<A>,
    {
        let mut cx = Context::new();
        self.get_trace_in(&mut cx, args)
    }

    /// Like [`TraceHandler::get_trace`], running in a caller-provided context.
    pub fn get_trace_in<A: ?Sized>(&self, cx: &mut Context, args: &A) -> Result<Trace>
    where
        M: Model<A>,
    {
        let trace = Rc::new(RefCell::new(Trace::new()));
        let handler = TraceMessenger { trace: trace.clone() };
        cx.with_handler(Box::new(handler), |cx| self.model.run(cx, args))?;
        let recorded = trace.borrow().clone();
        Ok(recorded)
    }
}

impl<A: ?Sized, M: Model<A>> Model<A> for TraceHandler<M> {
    fn run(&self, cx: &mut Context, args: &A) -> Result<()> {
        self.get_trace_in(cx, args).map(|_| ())
    }
}
