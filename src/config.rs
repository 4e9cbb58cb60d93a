//! Configuration types.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// How a discrete latent site is enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnumStrategy {
    /// All support values at once, along a dedicated batch dimension.
    #[default]
    Parallel,
    /// One value at a time. Recorded but not acted on by the parallel
    /// enumeration handler.
    Sequential,
}

impl FromStr for EnumStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parallel" => Ok(EnumStrategy::Parallel),
            "sequential" => Ok(EnumStrategy::Sequential),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for EnumStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumStrategy::Parallel => f.write_str("parallel"),
            EnumStrategy::Sequential => f.write_str("sequential"),
        }
    }
}

/// Order in which the optimizer eliminates sum variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContractionStrategy {
    /// Repeatedly eliminate the variable whose intermediate is smallest.
    #[default]
    Greedy,
    /// Materialize every product in full before reducing.
    Naive,
    /// Eliminate the listed variables first, in order, then fall back to greedy.
    Fixed(Vec<String>),
}

/// Options for [`log_density_with_config`](crate::log_density_with_config).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EliminationConfig {
    /// Elimination order used when contracting the factor graph
    pub strategy: ContractionStrategy,
}

impl EliminationConfig {
    /// Config with the given contraction strategy.
    pub fn new(strategy: ContractionStrategy) -> Self {
        Self { strategy }
    }
}

/// Which kind of plate a [`Context`](crate::Context) creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlateFactory {
    /// Plain conditionally independent plates.
    #[default]
    Independent,
    /// Plates whose dims also carry a symbolic name, so they can be
    /// eliminated as product variables.
    Enumerated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_strategy_round_trip() {
        for s in [EnumStrategy::Parallel, EnumStrategy::Sequential] {
            assert_eq!(s.to_string().parse::<EnumStrategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_strategy() {
        let err = "fancy".parse::<EnumStrategy>().unwrap_err();
        assert_eq!(err, Error::UnknownStrategy("fancy".into()));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(EliminationConfig::default().strategy, ContractionStrategy::Greedy);
        assert_eq!(PlateFactory::default(), PlateFactory::Independent);
    }
}
