//! Expression graph for deferred sum-product contraction.

use crate::error::{Error, Result};
use crate::semiring::BinaryOp;
use crate::Factor;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Free variables of an expression and their sizes.
pub type Inputs = BTreeMap<String, usize>;

/// A node in an unevaluated contraction.
///
/// Nodes are immutable and shared through `Arc`; the optimizer and the
/// interpreter both memoize on node addresses.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A materialized factor.
    Leaf {
        /// The factor itself
        factor: Factor,
        /// Cached `factor.inputs()`
        inputs: Inputs,
    },

    /// Element-wise combination of all terms with `op`.
    Product {
        /// Product operation
        op: BinaryOp,
        /// Operands, at least two
        terms: Vec<Arc<Expr>>,
        /// Union of the terms' inputs
        inputs: Inputs,
    },

    /// Elimination of `vars` from `input` with `op`.
    Reduce {
        /// Sum or product operation
        op: BinaryOp,
        /// Eliminated variables, all inputs of `input`
        vars: BTreeSet<String>,
        /// Reduced expression
        input: Arc<Expr>,
        /// Inputs of `input` minus `vars`
        inputs: Inputs,
    },
}

impl Expr {
    /// Wrap a materialized factor.
    pub fn leaf(factor: Factor) -> Arc<Self> {
        let inputs = factor.inputs();
        Arc::new(Expr::Leaf { factor, inputs })
    }

    /// A constant with no inputs.
    pub fn constant(value: f64) -> Arc<Self> {
        Self::leaf(Factor::scalar(value))
    }

    /// Combine terms with `op`.
    ///
    /// No terms give the unit of `op`; a single term is returned unchanged.
    /// Terms sharing a variable must agree on its size.
    pub fn product(op: BinaryOp, mut terms: Vec<Arc<Expr>>) -> Result<Arc<Self>> {
        if terms.len() <= 1 {
            return Ok(terms.pop().unwrap_or_else(|| Self::constant(op.unit())));
        }
        let mut inputs = Inputs::new();
        for term in &terms {
            for (name, &size) in term.inputs() {
                match inputs.get(name) {
                    Some(&existing) if existing != size => {
                        return Err(Error::DimSizeMismatch { name: name.clone(), lhs: existing, rhs: size })
                    }
                    Some(_) => {}
                    None => {
                        inputs.insert(name.clone(), size);
                    }
                }
            }
        }
        Ok(Arc::new(Expr::Product { op, terms, inputs }))
    }

    /// Eliminate `vars` from `input` with `op`.
    ///
    /// Variables that are not inputs of `input` are dropped; when none remain
    /// the input itself is returned.
    pub fn reduce<I>(op: BinaryOp, input: Arc<Expr>, vars: I) -> Arc<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let vars: BTreeSet<String> = vars.into_iter().filter(|v| input.inputs().contains_key(v)).collect();
        if vars.is_empty() {
            return input;
        }
        let inputs = input
            .inputs()
            .iter()
            .filter(|(name, _)| !vars.contains(*name))
            .map(|(name, &size)| (name.clone(), size))
            .collect();
        Arc::new(Expr::Reduce { op, vars, input, inputs })
    }

    /// Free variables of this expression.
    pub fn inputs(&self) -> &Inputs {
        match self {
            Expr::Leaf { inputs, .. } | Expr::Product { inputs, .. } | Expr::Reduce { inputs, .. } => inputs,
        }
    }

    /// Number of elements this node materializes.
    pub fn size(&self) -> usize {
        self.inputs().values().product()
    }

    /// Returns true for materialized factors.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Expr::Leaf { .. })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf { factor, .. } => write!(f, "{}", factor),
            Expr::Product { op, terms, .. } => {
                write!(f, "{}(", op)?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
            Expr::Reduce { op, vars, input, .. } => {
                let vars: Vec<&str> = vars.iter().map(String::as_str).collect();
                write!(f, "{}[{}]({})", op, vars.join(","), input)
            }
        }
    }
}
