//! Evaluation of contraction expressions.

use crate::error::Result;
use crate::lazy::ir::Expr;
use crate::Factor;
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluates expressions bottom-up into factors.
pub struct Interpreter {
    /// Cache of evaluated nodes (node address -> result)
    cache: HashMap<usize, Factor>,
}

impl Interpreter {
    /// Creates an interpreter with an empty cache.
    pub fn new() -> Self {
        Self { cache: HashMap::new() }
    }

    /// Evaluate an expression. Shared sub-expressions are computed once.
    pub fn evaluate(&mut self, expr: &Arc<Expr>) -> Result<Factor> {
        let node_addr = Arc::as_ptr(expr) as usize;
        if let Some(result) = self.cache.get(&node_addr) {
            return Ok(result.clone());
        }

        let result = match expr.as_ref() {
            Expr::Leaf { factor, .. } => factor.clone(),
            Expr::Product { op, terms, .. } => {
                let mut acc: Option<Factor> = None;
                for term in terms {
                    let value = self.evaluate(term)?;
                    acc = Some(match acc {
                        Some(lhs) => lhs.binary(&value, *op)?,
                        None => value,
                    });
                }
                acc.unwrap_or_else(|| Factor::scalar(op.unit()))
            }
            Expr::Reduce { op, vars, input, .. } => self.evaluate(input)?.reduce(*op, vars)?,
        };

        self.cache.insert(node_addr, result.clone());
        Ok(result)
    }

    /// Number of cached nodes.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
