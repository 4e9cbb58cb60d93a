//! Error type shared by the whole crate.

use thiserror::Error;

/// Errors raised while building, tracing or eliminating a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Two shapes cannot be broadcast together.
    #[error("shapes {lhs:?} and {rhs:?} are not broadcast-compatible")]
    ShapeMismatch {
        /// Left operand shape
        lhs: Vec<usize>,
        /// Right operand shape
        rhs: Vec<usize>,
    },

    /// Flat data does not fill the requested shape.
    #[error("data length {len} does not match shape {shape:?}")]
    DataLength {
        /// Number of elements supplied
        len: usize,
        /// Requested shape
        shape: Vec<usize>,
    },

    /// Axis index past the rank of an array.
    #[error("axis {axis} out of bounds for array of rank {ndim}")]
    AxisOutOfBounds {
        /// Requested axis
        axis: usize,
        /// Rank of the array
        ndim: usize,
    },

    /// Gather index that is negative, fractional or too large.
    #[error("index {index} out of bounds for axis of size {size}")]
    IndexOutOfBounds {
        /// Offending index value
        index: f64,
        /// Size of the indexed axis
        size: usize,
    },

    /// A distribution was built with parameters outside its domain.
    #[error("invalid parameter for {dist}: {reason}")]
    InvalidParameter {
        /// Distribution name
        dist: &'static str,
        /// What was wrong
        reason: String,
    },

    /// A value lies outside the support of a distribution.
    #[error("value {value} is outside the support of {dist}")]
    OutOfSupport {
        /// Distribution name
        dist: &'static str,
        /// Offending value
        value: f64,
    },

    /// Enumeration requested on a continuous distribution.
    #[error("{0} has no enumerable support")]
    NoEnumerateSupport(&'static str),

    /// Two sites share a name.
    #[error("site '{0}' is already present in the trace")]
    DuplicateSite(String),

    /// Default sampling needs a key and none was supplied.
    #[error("sample site '{0}' has no value and no PRNG key; wrap the model with `seed`")]
    MissingRngKey(String),

    /// A plate was opened inside a plate of the same name.
    #[error("plate '{0}' is already active")]
    DuplicatePlate(String),

    /// A plate asked for a dim another plate holds.
    #[error("plate '{name}' requested dim {dim}, which is already in use")]
    DimCollision {
        /// Plate name
        name: String,
        /// Requested dim
        dim: isize,
    },

    /// Plates must stay to the right of the enumeration dims.
    #[error("plate '{name}' at dim {dim} reaches the enumeration dims (first available dim {first_available_dim})")]
    PlateNestingExceeded {
        /// Plate name
        name: String,
        /// Dim the plate would occupy
        dim: isize,
        /// Rightmost dim reserved for enumeration
        first_available_dim: isize,
    },

    /// A plate was pinned to a dim that is not negative.
    #[error("plate '{name}' requested non-negative dim {dim}; batch dims count from the right")]
    InvalidPlateDim {
        /// Plate name
        name: String,
        /// Requested dim
        dim: isize,
    },

    /// `enumerate` was given a dim that is not negative.
    #[error("first available dim must be negative, got {0}")]
    InvalidFirstAvailableDim(isize),

    /// `scale` was given a non-positive or non-finite factor.
    #[error("scale must be positive, got {0}")]
    InvalidScale(f64),

    /// A batch axis of size > 1 has no symbolic name to convert it to.
    #[error("site '{site}' has batch dim {dim} of size {size} without a symbolic name")]
    UnnamedDim {
        /// Site whose log-probability carries the axis
        site: String,
        /// Negative batch position
        dim: isize,
        /// Axis size
        size: usize,
    },

    /// One named dim seen with two different sizes.
    #[error("named dim '{name}' has inconsistent sizes {lhs} and {rhs}")]
    DimSizeMismatch {
        /// Dim name
        name: String,
        /// Size on the left operand
        lhs: usize,
        /// Size on the right operand
        rhs: usize,
    },

    /// A factor listed the same dim name twice.
    #[error("duplicate dim name '{0}' in factor")]
    DuplicateDimName(String),

    /// `plate_to_enum_plate` entered while already inside it.
    #[error("an enumerated plate scope is already active on this thread")]
    ScopeAlreadyActive,

    /// Strategy string other than `"parallel"` or `"sequential"`.
    #[error("unknown enumeration strategy '{0}'")]
    UnknownStrategy(String),

    /// Plate variables that are not also eliminated.
    #[error("plates {plates:?} are not a subset of the eliminated variables")]
    PlatesNotEliminated {
        /// Offending plate names
        plates: Vec<String>,
    },

    /// A sum variable would have to be eliminated inside a plate it does not live in.
    #[error("intractable elimination: variables {vars:?} cannot be summed out of plates {plates:?}")]
    Intractable {
        /// Sum variables left over
        vars: Vec<String>,
        /// Plates they would have to leave
        plates: Vec<String>,
    },

    /// Error raised by user model code.
    #[error("model error: {0}")]
    Model(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convenience constructor for errors raised from model bodies.
    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }
}
