//! Joint log-density with discrete latents marginalized out.

use crate::config::EliminationConfig;
use crate::error::Result;
use crate::handlers::{plate_to_enum_plate, substitute, trace, Model, Trace};
use crate::lazy::{optimize, sum_product, Expr, Interpreter};
use crate::semiring::Semiring;
use crate::{Array, Factor};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Log-probability factors of a trace and the roles of their named dims.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    /// One factor per sample site, in trace order.
    pub factors: Vec<Factor>,
    /// Names of all sample sites. Only enumerated sites show up as dims.
    pub sum_vars: BTreeSet<String>,
    /// Plates that claimed a batch dim.
    pub prod_vars: BTreeSet<String>,
}

impl FactorGraph {
    /// Every variable to eliminate.
    pub fn eliminate(&self) -> BTreeSet<String> {
        &self.sum_vars | &self.prod_vars
    }
}

/// Turn every sample site of `trace` into a named log-probability factor.
///
/// A site's scale multiplies its log-probability unless it is exactly one.
pub fn assemble_factor_graph(trace: &Trace) -> Result<FactorGraph> {
    let mut graph = FactorGraph::default();
    for site in trace.sample_sites() {
        let mut log_prob = site.log_prob()?;
        if let Some(scale) = site.scale.filter(|&s| s != 1.0) {
            log_prob = log_prob.mul_scalar(scale);
        }
        let factor = Factor::from_array(log_prob, &site.infer.dim_to_name, &site.name)?;
        debug!(site = %site.name, factor = %factor, "site factor");

        graph.factors.push(factor);
        graph.sum_vars.insert(site.name.clone());
        graph
            .prod_vars
            .extend(site.cond_indep_stack.iter().filter(|f| f.dim.is_some()).map(|f| f.name.clone()));
    }
    Ok(graph)
}

/// Joint log-density of `model`, summing out enumerated discrete sites.
///
/// `params` are substituted into matching sites before the model runs. The
/// model is traced with enumerated plates, each sample site contributes its
/// log-probability, and the factors are contracted with `logaddexp` as sum
/// and `+` as product. Returns the log-density and the trace it came from.
///
/// Wrap the model with [`enumerate`](crate::handlers::enumerate) and
/// [`config_enumerate`](crate::handlers::config_enumerate) to have discrete
/// latents enumerated rather than sampled.
pub fn log_density<A, M>(model: M, args: &A, params: &HashMap<String, Array>) -> Result<(Array, Trace)>
where
    A: ?Sized,
    M: Model<A>,
{
    log_density_with_config(model, args, params, &EliminationConfig::default())
}

/// [`log_density`] with explicit elimination options.
pub fn log_density_with_config<A, M>(
    model: M,
    args: &A,
    params: &HashMap<String, Array>,
    config: &EliminationConfig,
) -> Result<(Array, Trace)>
where
    A: ?Sized,
    M: Model<A>,
{
    let model = substitute(model, params.clone());
    let model_trace = {
        let _scope = plate_to_enum_plate()?;
        trace(model).get_trace(args)?
    };

    let graph = assemble_factor_graph(&model_trace)?;
    let eliminate = graph.eliminate();
    debug!(
        factors = graph.factors.len(),
        sum_vars = ?graph.sum_vars,
        prod_vars = ?graph.prod_vars,
        "assembled factor graph"
    );

    let leaves = graph.factors.into_iter().map(Expr::leaf).collect();
    let lazy = sum_product(Semiring::LOG, leaves, &eliminate, &graph.prod_vars)?;
    let plan = optimize(&lazy, &config.strategy)?;
    let result = Interpreter::new().evaluate(&plan)?;

    let mut free: Vec<String> = result.names().to_vec();
    free.sort();
    if !free.is_empty() {
        warn!(dims = ?free, "log density still depends on named dims");
    }
    Ok((result.align(&free)?, model_trace))
}
