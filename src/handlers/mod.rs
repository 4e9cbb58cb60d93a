//! Effect handlers for probabilistic programs.
//!
//! A model is ordinary Rust code that issues `sample`, `param` and
//! `deterministic` statements against a [`Context`]. Handlers intercept
//! those statements to record, condition, seed, scale or enumerate them.

pub mod context;
pub mod effects;
pub mod plate;
pub mod trace;

pub use context::{Context, ExecutionState, Message, MessageKind, Messenger};
pub use effects::{
    condition, config_enumerate, config_enumerate_with, enumerate, infer_config, scale, seed, substitute, Handled,
};
pub use plate::{current_plate_factory, plate_to_enum_plate, with_enum_plates, EnumPlateScope};
pub use trace::{
    trace, DeterministicSite, InferConfig, ParamSite, PlateFrame, SampleSite, Site, Trace, TraceHandler,
};

use crate::error::Result;

/// A probabilistic program taking arguments of type `A`.
///
/// `A` carries everything the model is called with; it is passed through
/// handlers untouched. Any `Fn(&mut Context, &A) -> Result<()>` is a model.
pub trait Model<A: ?Sized> {
    /// Execute the model body against `cx`.
    fn run(&self, cx: &mut Context, args: &A) -> Result<()>;
}

impl<A: ?Sized, F> Model<A> for F
where
    F: Fn(&mut Context, &A) -> Result<()>,
{
    fn run(&self, cx: &mut Context, args: &A) -> Result<()> {
        self(cx, args)
    }
}
