//! Rewrite passes over contraction expressions.
//!
//! The builder emits reductions of whole products, which evaluated as-is
//! materialize the joint table of every variable in the product. The passes
//! here turn them into a sequence of single-variable eliminations so that
//! each intermediate only spans the variables still in play.

use crate::config::ContractionStrategy;
use crate::error::Result;
use crate::lazy::ir::{Expr, Inputs};
use crate::semiring::BinaryOp;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Whether `sum_op` distributes over `prod_op`.
fn distributes(sum_op: BinaryOp, prod_op: BinaryOp) -> bool {
    matches!(
        (sum_op, prod_op),
        (BinaryOp::LogAddExp, BinaryOp::Add) | (BinaryOp::Max, BinaryOp::Add) | (BinaryOp::Add, BinaryOp::Mul)
    )
}

/// Optimize an expression for evaluation.
///
/// The result denotes the same value; only the association of products and
/// reductions changes.
pub fn optimize(expr: &Arc<Expr>, strategy: &ContractionStrategy) -> Result<Arc<Expr>> {
    let mut optimizer = Optimizer { strategy, memo: HashMap::new() };
    optimizer.rewrite(expr)
}

struct Optimizer<'a> {
    strategy: &'a ContractionStrategy,
    /// Rewritten nodes keyed by the address of the original.
    memo: HashMap<*const Expr, Arc<Expr>>,
}

impl Optimizer<'_> {
    fn rewrite(&mut self, expr: &Arc<Expr>) -> Result<Arc<Expr>> {
        let ptr = Arc::as_ptr(expr);
        if let Some(done) = self.memo.get(&ptr) {
            return Ok(done.clone());
        }

        let result = match expr.as_ref() {
            Expr::Leaf { .. } => expr.clone(),
            Expr::Product { op, terms, .. } => {
                let mut new_terms = Vec::with_capacity(terms.len());
                let mut changed = false;
                for term in terms {
                    let new_term = self.rewrite(term)?;
                    match new_term.as_ref() {
                        Expr::Product { op: inner, terms: inner_terms, .. } if inner == op => {
                            new_terms.extend(inner_terms.iter().cloned());
                            changed = true;
                        }
                        _ => {
                            changed |= !Arc::ptr_eq(&new_term, term);
                            new_terms.push(new_term);
                        }
                    }
                }
                if changed {
                    Expr::product(*op, new_terms)?
                } else {
                    expr.clone()
                }
            }
            Expr::Reduce { op, vars, input, .. } => {
                let new_input = self.rewrite(input)?;
                self.rewrite_reduce(*op, vars.clone(), new_input)?
            }
        };

        self.memo.insert(ptr, result.clone());
        Ok(result)
    }

    fn rewrite_reduce(&mut self, op: BinaryOp, mut vars: BTreeSet<String>, mut input: Arc<Expr>) -> Result<Arc<Expr>> {
        // Reduce(op, A, Reduce(op, B, x)) == Reduce(op, A | B, x)
        loop {
            let inner = match input.as_ref() {
                Expr::Reduce { op: inner_op, vars: inner_vars, input: inner_input, .. } if *inner_op == op => {
                    vars.extend(inner_vars.iter().cloned());
                    inner_input.clone()
                }
                _ => break,
            };
            input = inner;
        }

        if *self.strategy == ContractionStrategy::Naive {
            return Ok(Expr::reduce(op, input, vars));
        }

        let (prod_op, terms) = match input.as_ref() {
            Expr::Product { op: prod_op, terms, .. } => (*prod_op, terms.clone()),
            _ => return Ok(Expr::reduce(op, input, vars)),
        };

        if op == prod_op {
            // Plate reduction: pushes into the terms only when every term is
            // replicated along every reduced plate.
            let all_plated = terms.iter().all(|t| vars.iter().all(|v| t.inputs().contains_key(v)));
            if !all_plated {
                return Ok(Expr::reduce(op, input, vars));
            }
            let reduced = terms.into_iter().map(|t| Expr::reduce(op, t, vars.iter().cloned())).collect();
            return Expr::product(prod_op, reduced);
        }

        if !distributes(op, prod_op) {
            return Ok(Expr::reduce(op, input, vars));
        }
        self.eliminate(op, prod_op, vars, terms)
    }

    /// Variable elimination: one sum variable at a time, each reduction
    /// touching only the terms that mention it.
    fn eliminate(
        &self,
        sum_op: BinaryOp,
        prod_op: BinaryOp,
        mut remaining: BTreeSet<String>,
        mut terms: Vec<Arc<Expr>>,
    ) -> Result<Arc<Expr>> {
        let fixed: &[String] = match self.strategy {
            ContractionStrategy::Fixed(order) => order,
            _ => &[],
        };

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let var = match fixed.iter().find(|v| remaining.contains(*v)) {
                Some(v) => v.clone(),
                None => match greedy_choice(&terms, &remaining) {
                    Some(v) => v,
                    None => break,
                },
            };
            remaining.remove(&var);

            let (with, without): (Vec<_>, Vec<_>) =
                terms.into_iter().partition(|t| t.inputs().contains_key(&var));
            let product = Expr::product(prod_op, with)?;
            terms = without;
            terms.push(Expr::reduce(sum_op, product, [var.clone()]));
            order.push(var);
        }

        debug!(order = ?order, strategy = ?self.strategy, "elimination order");
        Expr::product(prod_op, terms)
    }
}

/// The variable whose elimination creates the smallest intermediate.
///
/// Ties go to the first variable in name order.
fn greedy_choice(terms: &[Arc<Expr>], remaining: &BTreeSet<String>) -> Option<String> {
    remaining
        .iter()
        .min_by_key(|var| {
            let mut joint = Inputs::new();
            for term in terms.iter().filter(|t| t.inputs().contains_key(*var)) {
                joint.extend(term.inputs().iter().map(|(k, v)| (k.clone(), *v)));
            }
            joint.values().product::<usize>()
        })
        .cloned()
}

/// Statistics about a contraction expression.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExprStats {
    /// Number of distinct leaf factors
    pub num_leaves: usize,
    /// Number of distinct product nodes
    pub num_products: usize,
    /// Number of distinct reduce nodes
    pub num_reductions: usize,
    /// Largest number of elements any single node materializes
    pub max_intermediate_size: usize,
}

/// Analyze an expression without evaluating it.
pub fn analyze(expr: &Arc<Expr>) -> ExprStats {
    fn visit(expr: &Arc<Expr>, seen: &mut HashSet<*const Expr>, stats: &mut ExprStats) {
        if !seen.insert(Arc::as_ptr(expr)) {
            return;
        }
        stats.max_intermediate_size = stats.max_intermediate_size.max(expr.size());
        match expr.as_ref() {
            Expr::Leaf { .. } => stats.num_leaves += 1,
            Expr::Product { terms, .. } => {
                stats.num_products += 1;
                for term in terms {
                    visit(term, seen, stats);
                }
            }
            Expr::Reduce { input, .. } => {
                stats.num_reductions += 1;
                visit(input, seen, stats);
            }
        }
    }

    let mut stats = ExprStats::default();
    visit(expr, &mut HashSet::new(), &mut stats);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::Interpreter;
    use crate::{Array, Factor, Shape};
    use approx::assert_abs_diff_eq;

    fn leaf(names: &[&str], dims: Vec<usize>) -> Arc<Expr> {
        let size: usize = dims.iter().product();
        let data = (0..size).map(|i| ((i * 7 % 11) as f64 + 1.0).ln()).collect();
        let array = Array::from_vec(data, Shape::new(dims)).unwrap();
        Expr::leaf(Factor::new(names.iter().map(|s| s.to_string()).collect(), array).unwrap())
    }

    fn chain() -> Arc<Expr> {
        let terms = vec![
            leaf(&["a", "b"], vec![4, 4]),
            leaf(&["b", "c"], vec![4, 4]),
            leaf(&["c", "d"], vec![4, 4]),
        ];
        let product = Expr::product(BinaryOp::Add, terms).unwrap();
        Expr::reduce(BinaryOp::LogAddExp, product, ["a", "b", "c", "d"].map(String::from))
    }

    #[test]
    fn test_greedy_shrinks_intermediates() {
        let expr = chain();
        let naive = optimize(&expr, &ContractionStrategy::Naive).unwrap();
        let greedy = optimize(&expr, &ContractionStrategy::Greedy).unwrap();
        assert_eq!(analyze(&naive).max_intermediate_size, 256);
        assert_eq!(analyze(&greedy).max_intermediate_size, 16);
    }

    #[test]
    fn test_strategies_agree() {
        let expr = chain();
        let strategies = [
            ContractionStrategy::Naive,
            ContractionStrategy::Greedy,
            ContractionStrategy::Fixed(vec!["c".into(), "a".into()]),
        ];
        let values: Vec<f64> = strategies
            .iter()
            .map(|s| {
                let plan = optimize(&expr, s).unwrap();
                Interpreter::new().evaluate(&plan).unwrap().item().unwrap()
            })
            .collect();
        assert_abs_diff_eq!(values[0], values[1], epsilon = 1e-9);
        assert_abs_diff_eq!(values[0], values[2], epsilon = 1e-9);
    }

    #[test]
    fn test_nested_reductions_merge() {
        let x = leaf(&["a", "b"], vec![2, 3]);
        let inner = Expr::reduce(BinaryOp::LogAddExp, x, ["a".to_string()]);
        let outer = Expr::reduce(BinaryOp::LogAddExp, inner, ["b".to_string()]);
        let opt = optimize(&outer, &ContractionStrategy::Greedy).unwrap();
        match opt.as_ref() {
            Expr::Reduce { vars, input, .. } => {
                assert_eq!(vars.len(), 2);
                assert!(input.is_leaf());
            }
            other => panic!("expected a single reduction, got {}", other),
        }
    }

    #[test]
    fn test_nested_products_flatten() {
        let inner = Expr::product(BinaryOp::Add, vec![leaf(&["a"], vec![2]), leaf(&["b"], vec![2])]).unwrap();
        let outer = Expr::product(BinaryOp::Add, vec![inner, leaf(&["c"], vec![2])]).unwrap();
        let opt = optimize(&outer, &ContractionStrategy::Greedy).unwrap();
        match opt.as_ref() {
            Expr::Product { terms, .. } => assert_eq!(terms.len(), 3),
            other => panic!("expected a product, got {}", other),
        }
    }

    #[test]
    fn test_plate_reduction_distributes() {
        let product = Expr::product(BinaryOp::Add, vec![leaf(&["i"], vec![3]), leaf(&["i", "j"], vec![3, 2])]).unwrap();
        let expr = Expr::reduce(BinaryOp::Add, product, ["i".to_string()]);
        let opt = optimize(&expr, &ContractionStrategy::Greedy).unwrap();
        assert!(matches!(opt.as_ref(), Expr::Product { .. }));

        let want = Interpreter::new().evaluate(&expr).unwrap();
        let got = Interpreter::new().evaluate(&opt).unwrap();
        for (a, b) in want.array().as_slice().iter().zip(got.array().as_slice()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_plate_reduction_kept_when_term_lacks_plate() {
        let product = Expr::product(BinaryOp::Add, vec![leaf(&["i"], vec![3]), leaf(&["j"], vec![2])]).unwrap();
        let expr = Expr::reduce(BinaryOp::Add, product, ["i".to_string()]);
        let opt = optimize(&expr, &ContractionStrategy::Greedy).unwrap();
        assert!(matches!(opt.as_ref(), Expr::Reduce { .. }));
    }

    #[test]
    fn test_analyze_counts_shared_nodes_once() {
        let x = leaf(&["a"], vec![5]);
        let p = Expr::product(BinaryOp::Add, vec![x.clone(), x]).unwrap();
        let stats = analyze(&p);
        assert_eq!(stats.num_leaves, 1);
        assert_eq!(stats.num_products, 1);
        assert_eq!(stats.max_intermediate_size, 5);
    }
}
