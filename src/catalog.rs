//! Catalog of the remote heuristics and the parameters each one requires.
//!
//! This is static configuration: the solver service defines the algorithms,
//! the client only needs to know their identifiers and tunables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VizError, VizResult};

/// Identifier of a remote solving heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ls")]
    LocalSearch,
    #[serde(rename = "ts")]
    TabuSearch,
    #[serde(rename = "sa")]
    SimulatedAnnealing,
    #[serde(rename = "aco")]
    AntColony,
    #[serde(rename = "pso")]
    ParticleSwarm,
}

/// A tunable the solver expects for a given algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Wire name of the parameter.
    pub key: &'static str,
    /// Human-readable label.
    pub name: &'static str,
}

const fn spec(key: &'static str, name: &'static str) -> ParamSpec {
    ParamSpec { key, name }
}

const LOCAL_SEARCH_PARAMS: &[ParamSpec] = &[spec("numIter", "Number of iterations")];
const TABU_SEARCH_PARAMS: &[ParamSpec] = &[spec("numIter", "Number of iterations")];
const SIMULATED_ANNEALING_PARAMS: &[ParamSpec] = &[
    spec("to", "Initial temperature (To)"),
    spec("c", "Cooling constant (c)"),
];
const ANT_COLONY_PARAMS: &[ParamSpec] = &[
    spec("alpha", "α"),
    spec("beta", "β"),
    spec("p", "Algorithm memory (p)"),
    spec("q", "Q"),
];
const PARTICLE_SWARM_PARAMS: &[ParamSpec] = &[
    spec("w", "Inertia (w)"),
    spec("c1", "c1"),
    spec("c2", "c2"),
];

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::LocalSearch,
        Algorithm::TabuSearch,
        Algorithm::SimulatedAnnealing,
        Algorithm::AntColony,
        Algorithm::ParticleSwarm,
    ];

    pub const DEFAULT: Algorithm = Algorithm::LocalSearch;

    pub fn id(self) -> &'static str {
        match self {
            Algorithm::LocalSearch => "ls",
            Algorithm::TabuSearch => "ts",
            Algorithm::SimulatedAnnealing => "sa",
            Algorithm::AntColony => "aco",
            Algorithm::ParticleSwarm => "pso",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Algorithm::LocalSearch => "Local Search",
            Algorithm::TabuSearch => "Tabu Search",
            Algorithm::SimulatedAnnealing => "Simulated Annealing",
            Algorithm::AntColony => "Ant Colony",
            Algorithm::ParticleSwarm => "Particle Swarm",
        }
    }

    /// Required parameters, in the order they are sent.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            Algorithm::LocalSearch => LOCAL_SEARCH_PARAMS,
            Algorithm::TabuSearch => TABU_SEARCH_PARAMS,
            Algorithm::SimulatedAnnealing => SIMULATED_ANNEALING_PARAMS,
            Algorithm::AntColony => ANT_COLONY_PARAMS,
            Algorithm::ParticleSwarm => PARTICLE_SWARM_PARAMS,
        }
    }

    pub fn param(self, key: &str) -> Option<&'static ParamSpec> {
        self.params().iter().find(|p| p.key == key)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Algorithm {
    type Err = VizError;

    /// Accepts the short id (`sa`) or the label in any case, with `-`/`_`
    /// standing in for spaces (`simulated-annealing`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Algorithm::ALL
            .into_iter()
            .find(|algo| algo.id() == normalized || algo.label().to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Algorithm::ALL.iter().map(|a| a.id()).collect();
                VizError::validation(format!(
                    "Unknown algorithm '{}'. Available: {}",
                    s.trim(),
                    known.join(", ")
                ))
            })
    }
}

/// A named numeric parameter as sent to the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
}

/// Current parameter values keyed by parameter key.
///
/// Values for keys of other algorithms are kept so switching back and forth
/// does not lose input; only the selected algorithm's keys are sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues {
    values: BTreeMap<String, f64>,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Set a value for `key`, which must be a parameter of `algorithm`.
    pub fn set(&mut self, algorithm: Algorithm, key: &str, value: f64) -> VizResult<()> {
        let Some(spec) = algorithm.param(key) else {
            let known: Vec<&str> = algorithm.params().iter().map(|p| p.key).collect();
            return Err(VizError::validation(format!(
                "{} has no parameter '{}'. Expected: {}",
                algorithm.label(),
                key,
                known.join(", ")
            )));
        };
        if !value.is_finite() {
            return Err(VizError::validation(format!(
                "{} must be a finite number",
                spec.name
            )));
        }
        self.values.insert(spec.key.to_string(), value);
        Ok(())
    }

    /// Parse `raw` and store it under `key`.
    pub fn set_text(&mut self, algorithm: Algorithm, key: &str, raw: &str) -> VizResult<()> {
        let value: f64 = raw.trim().parse().map_err(|_| {
            let label = algorithm.param(key).map_or(key, |p| p.name);
            VizError::validation(format!("{} must be a number, got '{}'", label, raw.trim()))
        })?;
        self.set(algorithm, key, value)
    }

    /// Resolve the parameter list for `algorithm`, in catalog order.
    ///
    /// Every required parameter must have a value.
    pub fn resolve(&self, algorithm: Algorithm) -> VizResult<Vec<Parameter>> {
        let missing: Vec<&str> = algorithm
            .params()
            .iter()
            .filter(|p| !self.values.contains_key(p.key))
            .map(|p| p.name)
            .collect();
        if !missing.is_empty() {
            return Err(VizError::validation(format!(
                "Missing parameter(s) for {}: {}",
                algorithm.label(),
                missing.join(", ")
            )));
        }

        Ok(algorithm
            .params()
            .iter()
            .filter_map(|p| {
                self.get(p.key).map(|value| Parameter {
                    name: p.key.to_string(),
                    value,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_ids_and_labels() {
        assert_eq!("sa".parse::<Algorithm>().unwrap(), Algorithm::SimulatedAnnealing);
        assert_eq!(" ACO ".parse::<Algorithm>().unwrap(), Algorithm::AntColony);
        assert_eq!(
            "particle-swarm".parse::<Algorithm>().unwrap(),
            Algorithm::ParticleSwarm
        );
        assert_eq!("Tabu Search".parse::<Algorithm>().unwrap(), Algorithm::TabuSearch);
        assert!("genetic".parse::<Algorithm>().is_err());
    }

    #[test]
    fn every_algorithm_has_params_with_unique_keys() {
        for algo in Algorithm::ALL {
            let keys: Vec<&str> = algo.params().iter().map(|p| p.key).collect();
            assert!(!keys.is_empty(), "{} has no params", algo);
            let mut deduped = keys.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), keys.len(), "{} repeats a key", algo);
        }
    }

    #[test]
    fn serde_uses_short_ids() {
        let json = serde_json::to_string(&Algorithm::AntColony).unwrap();
        assert_eq!(json, "\"aco\"");
        let back: Algorithm = serde_json::from_str("\"pso\"").unwrap();
        assert_eq!(back, Algorithm::ParticleSwarm);
    }

    #[test]
    fn resolve_follows_catalog_order() {
        let mut values = ParamValues::new();
        values.set(Algorithm::AntColony, "q", 100.0).unwrap();
        values.set(Algorithm::AntColony, "alpha", 1.0).unwrap();
        values.set(Algorithm::AntColony, "p", 0.5).unwrap();
        values.set(Algorithm::AntColony, "beta", 2.0).unwrap();

        let names: Vec<String> = values
            .resolve(Algorithm::AntColony)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["alpha", "beta", "p", "q"]);
    }

    #[test]
    fn resolve_names_missing_params() {
        let mut values = ParamValues::new();
        values.set(Algorithm::SimulatedAnnealing, "to", 100.0).unwrap();
        let err = values.resolve(Algorithm::SimulatedAnnealing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing parameter(s) for Simulated Annealing: Cooling constant (c)"
        );
    }

    #[test]
    fn values_of_other_algorithms_are_not_sent() {
        let mut values = ParamValues::new();
        values.set(Algorithm::SimulatedAnnealing, "to", 100.0).unwrap();
        values.set(Algorithm::LocalSearch, "numIter", 500.0).unwrap();

        let params = values.resolve(Algorithm::LocalSearch).unwrap();
        assert_eq!(
            params,
            vec![Parameter {
                name: "numIter".to_string(),
                value: 500.0
            }]
        );
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_numbers() {
        let mut values = ParamValues::new();
        assert!(values.set(Algorithm::LocalSearch, "alpha", 1.0).is_err());
        assert!(values.set(Algorithm::LocalSearch, "numIter", f64::NAN).is_err());
        let err = values
            .set_text(Algorithm::SimulatedAnnealing, "c", "fast")
            .unwrap_err();
        assert_eq!(err.to_string(), "Cooling constant (c) must be a number, got 'fast'");
    }
}
