//! Runtime configuration.
//!
//! A single [`Config`] struct gathers the handful of knobs this crate
//! exposes: the nesting-depth guard the HSM core enforces (exposed here so
//! an embedder can raise or lower it, by wiring `config.max_nest_depth`
//! into a [`crate::hsm::StateMachine::max_nest_depth`] override on the
//! concrete active object type) and the [`Logger`] settings. `Deserialize`
//! is derived so a host application can load it from TOML, JSON, or
//! whatever layering scheme it already uses, without this crate needing an
//! opinion on which.

use serde::{Deserialize, Serialize};

use crate::hsm::MAX_NEST_DEPTH;
use crate::logging::Logger;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_nest_depth: usize,
    pub logger: Logger,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_nest_depth: MAX_NEST_DEPTH,
            logger: Logger::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_core_nest_depth() {
        let config = Config::default();
        assert_eq!(config.max_nest_depth, MAX_NEST_DEPTH);
    }

    #[test]
    fn deserializes_from_partial_json() {
        let config: Config = serde_json::from_str(r#"{"max_nest_depth": 8}"#).unwrap();
        assert_eq!(config.max_nest_depth, 8);
    }
}
