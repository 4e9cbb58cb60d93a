//! Plates and the enumerated-plate scope.
//!
//! A plate marks its body as conditionally independent along one batch dim.
//! Plates come in two flavors, chosen per [`Context`] through its
//! [`PlateFactory`]: independent plates only claim a dim, enumerated plates
//! also give that dim a symbolic name so the plate can later be eliminated
//! as a product variable.

use crate::config::PlateFactory;
use crate::distributions::Distribution;
use crate::error::{Error, Result};
use crate::handlers::context::{Context, ExecutionState};
use crate::handlers::trace::PlateFrame;
use crate::Shape;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

thread_local! {
    /// Plate factory picked up by contexts created on this thread.
    static PLATE_FACTORY: Cell<PlateFactory> = const { Cell::new(PlateFactory::Independent) };
}

/// The plate factory new contexts on this thread will use.
pub fn current_plate_factory() -> PlateFactory {
    PLATE_FACTORY.with(Cell::get)
}

/// Guard returned by [`plate_to_enum_plate`].
///
/// Restores independent plates when dropped, including during unwinding.
#[must_use = "the scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EnumPlateScope {
    // bound to the thread whose factory it overrides
    _not_send: PhantomData<*const ()>,
}

impl Drop for EnumPlateScope {
    fn drop(&mut self) {
        PLATE_FACTORY.with(|f| f.set(PlateFactory::Independent));
        trace!("left enumerated plate scope");
    }
}

/// Make plates created on this thread enumerated until the guard drops.
///
/// Scopes do not nest: entering while one is active is an error.
pub fn plate_to_enum_plate() -> Result<EnumPlateScope> {
    PLATE_FACTORY.with(|f| {
        if f.get() == PlateFactory::Enumerated {
            return Err(Error::ScopeAlreadyActive);
        }
        f.set(PlateFactory::Enumerated);
        trace!("entered enumerated plate scope");
        Ok(EnumPlateScope { _not_send: PhantomData })
    })
}

/// Run `f` inside an enumerated plate scope.
pub fn with_enum_plates<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    let _scope = plate_to_enum_plate()?;
    f()
}

impl ExecutionState {
    fn is_dim_taken(&self, dim: isize) -> bool {
        self.frames.iter().any(|frame| frame.dim == Some(dim))
    }

    /// Activate a plate, claiming `dim` or the rightmost free dim.
    fn push_plate(&mut self, name: &str, size: usize, dim: Option<isize>) -> Result<PlateFrame> {
        if self.frames.iter().any(|frame| frame.name == name) {
            return Err(Error::DuplicatePlate(name.to_string()));
        }
        let dim = match dim {
            Some(dim) if dim >= 0 => return Err(Error::InvalidPlateDim { name: name.to_string(), dim }),
            Some(dim) if self.is_dim_taken(dim) => {
                return Err(Error::DimCollision { name: name.to_string(), dim })
            }
            Some(dim) => dim,
            None => {
                let mut dim = -1;
                while self.is_dim_taken(dim) {
                    dim -= 1;
                }
                dim
            }
        };
        if let Some(first_available_dim) = self.first_available_dim {
            if dim <= first_available_dim {
                return Err(Error::PlateNestingExceeded { name: name.to_string(), dim, first_available_dim });
            }
        }

        if self.plate_factory == PlateFactory::Enumerated {
            self.dim_names.insert(dim, name.to_string());
        }
        let frame = PlateFrame { name: name.to_string(), dim: Some(dim), size };
        self.frames.push(frame.clone());
        Ok(frame)
    }

    fn pop_plate(&mut self, frame: &PlateFrame) {
        if let Some(pos) = self.frames.iter().rposition(|f| f.name == frame.name) {
            self.frames.remove(pos);
        }
        if let Some(dim) = frame.dim {
            if self.dim_names.get(&dim) == Some(&frame.name) {
                self.dim_names.remove(&dim);
            }
        }
    }

    /// Broadcast a distribution's batch shape over every active plate.
    pub(crate) fn broadcast_to_plates(&self, dist: Arc<dyn Distribution>) -> Result<Arc<dyn Distribution>> {
        let batch = dist.batch_shape();
        let needed = self
            .frames
            .iter()
            .filter_map(|f| f.dim)
            .map(|d| (-d) as usize)
            .max()
            .unwrap_or(0);
        if needed == 0 {
            return Ok(dist);
        }

        let padded = batch.left_pad(needed);
        let mut target = padded.as_slice().to_vec();
        let ndim = target.len() as isize;
        for frame in &self.frames {
            let Some(dim) = frame.dim else { continue };
            let slot = &mut target[(ndim + dim) as usize];
            if *slot == 1 {
                *slot = frame.size;
            } else if *slot != frame.size {
                return Err(Error::ShapeMismatch {
                    lhs: batch.as_slice().to_vec(),
                    rhs: vec![frame.size],
                });
            }
        }

        let target = Shape::new(target);
        if target == batch {
            Ok(dist)
        } else {
            dist.expand(&target)
        }
    }
}

impl Context {
    /// Run `body` inside a plate of `size` on the rightmost free dim.
    ///
    /// ```
    /// # use marginal_rs::{Array, Context, Normal, Result};
    /// # use marginal_rs::handlers::trace;
    /// let model = |cx: &mut Context, data: &Array| -> Result<()> {
    ///     cx.plate("data", data.size(), |cx| {
    ///         cx.observe("x", Normal::standard(), data.clone())?;
    ///         Ok(())
    ///     })
    /// };
    /// let tr = trace(model).get_trace(&Array::vector(vec![0.1, -0.3, 0.2])).unwrap();
    /// let site = tr.get("x").unwrap().as_sample().unwrap();
    /// assert_eq!(site.cond_indep_stack[0].dim, Some(-1));
    /// ```
    pub fn plate<R, F>(&mut self, name: &str, size: usize, body: F) -> Result<R>
    where
        F: FnOnce(&mut Context) -> Result<R>,
    {
        self.plate_with_dim(name, size, None, body)
    }

    /// Like [`Context::plate`], with an explicit negative dim.
    pub fn plate_with_dim<R, F>(&mut self, name: &str, size: usize, dim: Option<isize>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Context) -> Result<R>,
    {
        let frame = self.state.push_plate(name, size, dim)?;
        let result = body(self);
        self.state.pop_plate(&frame);
        result
    }

    /// Run `body` once per index in `0..size`.
    ///
    /// Sequential plates claim no dim; their frames carry `dim: None`.
    pub fn sequential_plate<F>(&mut self, name: &str, size: usize, mut body: F) -> Result<()>
    where
        F: FnMut(&mut Context, usize) -> Result<()>,
    {
        if self.state.frames.iter().any(|frame| frame.name == name) {
            return Err(Error::DuplicatePlate(name.to_string()));
        }
        for i in 0..size {
            let frame = PlateFrame { name: name.to_string(), dim: None, size };
            self.state.frames.push(frame.clone());
            let result = body(self, i);
            self.state.pop_plate(&frame);
            result?;
        }
        Ok(())
    }
}
