//! Symbolic construction of plated sum-product contractions.
//!
//! Factors are grouped by their *ordinal*: the set of plates among their
//! inputs. A sum variable is eliminated at the ordinal it shares with every
//! factor it appears in. Starting from the deepest ordinal, each connected
//! component of factors is multiplied, its local sum variables are eliminated
//! and the result is product-reduced over the plates it no longer needs
//! before it joins the factors of the enclosing ordinal.
//!
//! Nothing here touches data: only the input sets of expressions are read.

use crate::error::{Error, Result};
use crate::lazy::ir::Expr;
use crate::semiring::Semiring;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

type Ordinal = BTreeSet<String>;

fn names(set: &BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

fn input_set(expr: &Expr, within: &BTreeSet<String>) -> BTreeSet<String> {
    expr.inputs().keys().filter(|k| within.contains(*k)).cloned().collect()
}

/// Split terms into connected components linked by shared `sum_vars`.
///
/// Each component comes with the sum variables it contains. Components are
/// ordered by their first term.
fn partition(terms: Vec<Arc<Expr>>, sum_vars: &BTreeSet<String>) -> Vec<(Vec<Arc<Expr>>, BTreeSet<String>)> {
    let mut parent: Vec<usize> = (0..terms.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut owner: BTreeMap<&String, usize> = BTreeMap::new();
    for (i, term) in terms.iter().enumerate() {
        for var in term.inputs().keys().filter(|k| sum_vars.contains(*k)) {
            match owner.get(var) {
                Some(&j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(var, i);
                }
            }
        }
    }

    let roots: Vec<usize> = (0..terms.len()).map(|i| find(&mut parent, i)).collect();
    let mut components: BTreeMap<usize, (Vec<Arc<Expr>>, BTreeSet<String>)> = BTreeMap::new();
    for (term, root) in terms.into_iter().zip(roots) {
        let entry = components.entry(root).or_default();
        entry.1.extend(input_set(&term, sum_vars));
        entry.0.push(term);
    }
    components.into_values().collect()
}

/// Eliminate `eliminate` from `factors`, returning the factors that remain.
///
/// `plates` must be a subset of `eliminate`. The remaining factors are
/// mutually independent and can be combined with the product operation.
pub fn partial_sum_product(
    semiring: Semiring,
    factors: Vec<Arc<Expr>>,
    eliminate: &BTreeSet<String>,
    plates: &BTreeSet<String>,
) -> Result<Vec<Arc<Expr>>> {
    if !plates.is_subset(eliminate) {
        return Err(Error::PlatesNotEliminated { plates: names(&(plates - eliminate)) });
    }
    let sum_vars: BTreeSet<String> = eliminate - plates;

    let mut ordinal_to_factors: BTreeMap<Ordinal, Vec<Arc<Expr>>> = BTreeMap::new();
    for factor in factors {
        ordinal_to_factors.entry(input_set(&factor, plates)).or_default().push(factor);
    }

    // A sum variable lives in the plates common to every factor that uses it.
    let mut var_to_ordinal: BTreeMap<String, Ordinal> = BTreeMap::new();
    for (ordinal, group) in &ordinal_to_factors {
        for factor in group {
            for var in input_set(factor, &sum_vars) {
                var_to_ordinal
                    .entry(var)
                    .and_modify(|o| *o = &*o & ordinal)
                    .or_insert_with(|| ordinal.clone());
            }
        }
    }

    let mut results = Vec::new();
    loop {
        // Deepest ordinal first; ties go to the first in set order.
        let leaf = match ordinal_to_factors.keys().fold(None::<&Ordinal>, |best, o| match best {
            Some(b) if b.len() >= o.len() => Some(b),
            _ => Some(o),
        }) {
            Some(leaf) => leaf.clone(),
            None => break,
        };
        let leaf_factors = ordinal_to_factors.remove(&leaf).unwrap_or_default();
        let leaf_vars: BTreeSet<String> = var_to_ordinal
            .iter()
            .filter(|(_, o)| **o == leaf)
            .map(|(v, _)| v.clone())
            .collect();
        trace!(plates = ?leaf, vars = ?leaf_vars, factors = leaf_factors.len(), "eliminating ordinal");

        for (group, group_vars) in partition(leaf_factors, &leaf_vars) {
            let product = Expr::product(semiring.prod_op, group)?;
            let reduced = Expr::reduce(semiring.sum_op, product, group_vars);
            let remaining = input_set(&reduced, &sum_vars);

            if remaining.is_empty() {
                let local_plates = &leaf & eliminate;
                results.push(Expr::reduce(semiring.prod_op, reduced, local_plates));
                continue;
            }

            let new_plates: Ordinal = remaining
                .iter()
                .filter_map(|v| var_to_ordinal.get(v))
                .flat_map(|o| o.iter().cloned())
                .collect();
            if new_plates == leaf {
                return Err(Error::Intractable { vars: names(&remaining), plates: names(&leaf) });
            }
            let reduced = Expr::reduce(semiring.prod_op, reduced, &leaf - &new_plates);
            ordinal_to_factors.entry(new_plates).or_default().push(reduced);
        }
    }

    Ok(results)
}

/// Build the full contraction of `factors` as a single expression.
///
/// ```
/// # use marginal_rs::{Array, Factor, Semiring};
/// # use marginal_rs::lazy::{Expr, Interpreter, sum_product};
/// # use std::collections::BTreeSet;
/// let z = Factor::new(vec!["z".into()], Array::vector(vec![0.3f64.ln(), 0.7f64.ln()])).unwrap();
/// let eliminate = BTreeSet::from(["z".to_string()]);
/// let expr = sum_product(Semiring::LOG, vec![Expr::leaf(z)], &eliminate, &BTreeSet::new()).unwrap();
/// let total = Interpreter::new().evaluate(&expr).unwrap();
/// assert!(total.item().unwrap().abs() < 1e-12);
/// ```
pub fn sum_product(
    semiring: Semiring,
    factors: Vec<Arc<Expr>>,
    eliminate: &BTreeSet<String>,
    plates: &BTreeSet<String>,
) -> Result<Arc<Expr>> {
    let results = partial_sum_product(semiring, factors, eliminate, plates)?;
    Expr::product(semiring.prod_op, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::Interpreter;
    use crate::{Array, Factor, Shape};
    use approx::assert_abs_diff_eq;

    fn leaf(names: &[&str], dims: Vec<usize>, data: Vec<f64>) -> Arc<Expr> {
        let array = Array::from_vec(data, Shape::new(dims)).unwrap();
        Expr::leaf(Factor::new(names.iter().map(|s| s.to_string()).collect(), array).unwrap())
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partition_components() {
        let terms = vec![
            leaf(&["a"], vec![2], vec![0.0; 2]),
            leaf(&["b"], vec![2], vec![0.0; 2]),
            leaf(&["a", "c"], vec![2, 2], vec![0.0; 4]),
            leaf(&[], vec![], vec![0.0]),
        ];
        let parts = partition(terms, &set(&["a", "b", "c"]));
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].0.len(), 2);
        assert_eq!(parts[0].1, set(&["a", "c"]));
        assert_eq!(parts[1].1, set(&["b"]));
        assert!(parts[2].1.is_empty());
    }

    #[test]
    fn test_plates_must_be_eliminated() {
        let err = sum_product(Semiring::LOG, vec![], &set(&[]), &set(&["i"])).unwrap_err();
        assert_eq!(err, Error::PlatesNotEliminated { plates: vec!["i".into()] });
    }

    #[test]
    fn test_global_var_inside_plate() {
        // p(z) * prod_i p(x_i | z), z eliminated outside the plate
        let pz = leaf(&["z"], vec![2], vec![0.4f64.ln(), 0.6f64.ln()]);
        let px = leaf(
            &["z", "i"],
            vec![2, 3],
            vec![0.1f64.ln(), 0.2f64.ln(), 0.3f64.ln(), 0.5f64.ln(), 0.5f64.ln(), 0.5f64.ln()],
        );
        let expr = sum_product(Semiring::LOG, vec![pz, px], &set(&["z", "i"]), &set(&["i"])).unwrap();
        let got = Interpreter::new().evaluate(&expr).unwrap().item().unwrap();
        let want = (0.4 * 0.1 * 0.2 * 0.3 + 0.6 * 0.5f64.powi(3)).ln();
        assert_abs_diff_eq!(got, want, epsilon = 1e-12);
    }

    #[test]
    fn test_local_var_inside_plate() {
        // prod_i sum_{z_i} p(z_i) p(x_i | z_i)
        let pz = leaf(&["z"], vec![2], vec![0.4f64.ln(), 0.6f64.ln()]);
        let px = leaf(&["i", "z"], vec![2, 2], vec![0.1f64.ln(), 0.9f64.ln(), 0.3f64.ln(), 0.7f64.ln()]);
        let pz_plated = Expr::product(crate::BinaryOp::Add, vec![pz, leaf(&["i"], vec![2], vec![0.0, 0.0])]).unwrap();
        let expr = sum_product(Semiring::LOG, vec![pz_plated, px], &set(&["z", "i"]), &set(&["i"])).unwrap();
        let got = Interpreter::new().evaluate(&expr).unwrap().item().unwrap();
        let want = (0.4 * 0.1 + 0.6 * 0.9f64).ln() + (0.4 * 0.3 + 0.6 * 0.7f64).ln();
        assert_abs_diff_eq!(got, want, epsilon = 1e-12);
    }

    #[test]
    fn test_intractable() {
        // x is local to plate i and y to plate j, but one factor couples them
        let a = leaf(&["i", "x"], vec![2, 2], vec![0.0; 4]);
        let b = leaf(&["j", "y"], vec![2, 2], vec![0.0; 4]);
        let c = leaf(&["i", "j", "x", "y"], vec![2, 2, 2, 2], vec![0.0; 16]);
        let err =
            sum_product(Semiring::LOG, vec![a, b, c], &set(&["x", "y", "i", "j"]), &set(&["i", "j"])).unwrap_err();
        assert_eq!(
            err,
            Error::Intractable { vars: vec!["x".into(), "y".into()], plates: vec!["i".into(), "j".into()] }
        );
    }

    #[test]
    fn test_no_eliminate_keeps_free_vars() {
        let f = leaf(&["z"], vec![2], vec![1.0, 2.0]);
        let expr = sum_product(Semiring::LOG, vec![f], &set(&[]), &set(&[])).unwrap();
        assert_eq!(expr.inputs().len(), 1);
    }
}
