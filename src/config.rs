//! Layered runtime configuration (spec §10 "Configuration"): compiled-in
//! defaults, an optional local `siftcore.toml` override, and environment
//! variables prefixed `SIFTCORE_`, merged via `figment` - the same
//! three-tier pattern the reference architecture uses for its own
//! configuration.

use serde::{Deserialize, Serialize};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;

use crate::error::EngineError;
use crate::stats::{DEFAULT_COST, DEFAULT_MIN_SAMPLES};

/// Tunable knobs for a search session (spec §4.7, §7, §10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Objects processed between reoptimization attempts (spec §4.7).
    pub reopt_interval: u64,
    /// Cap on optimizer steps per reoptimization attempt (spec §4.7).
    pub max_opt_steps: usize,
    /// Minimum samples before a filter's stats are trusted (spec §4.4).
    pub min_samples: u64,
    /// Assumed mean cost for an unsampled filter (spec §4.4).
    pub default_cost: f64,
    /// Attribute cache budget, in bytes (spec §4.8).
    pub cache_byte_budget: usize,
    /// Consecutive eval failures on one filter before the search aborts
    /// (spec §7).
    pub max_consec_fails: u64,
    /// Exponential backoff base delay, in milliseconds (spec §7).
    pub backoff_base_ms: u64,
    /// Exponential backoff cap, in milliseconds (spec §7).
    pub backoff_cap_ms: u64,
    /// Maximum retry attempts before `collaborator_unavailable` is fatal
    /// (spec §7).
    pub backoff_max_attempts: u32,
    /// Worker pool size; 0 means "use the number of logical CPUs" (spec §5
    /// "Worker pool sizing").
    pub worker_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            reopt_interval: 100,
            max_opt_steps: 256,
            min_samples: DEFAULT_MIN_SAMPLES,
            default_cost: DEFAULT_COST,
            cache_byte_budget: 64 * 1024 * 1024,
            max_consec_fails: 10,
            backoff_base_ms: 100,
            backoff_cap_ms: 30_000,
            backoff_max_attempts: 5,
            worker_pool_size: 0,
        }
    }
}

impl Config {
    /// Resolved worker pool size: `worker_pool_size` if set, otherwise the
    /// number of logical CPUs (spec §5).
    pub fn resolved_worker_pool_size(&self) -> usize {
        if self.worker_pool_size == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_pool_size
        }
    }

    /// Load configuration by layering, lowest precedence first: compiled-in
    /// defaults, an optional `siftcore.toml` in the current directory, then
    /// `SIFTCORE_*` environment variables.
    pub fn load() -> Result<Self, EngineError> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("siftcore.toml"))
            .merge(Env::prefixed("SIFTCORE_"))
            .extract()
            .map_err(|source| EngineError::InvalidSpec {
                line: 0,
                message: format!("configuration error: {source}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let cfg = Config::default();
        assert!(cfg.min_samples > 0);
        assert!(cfg.backoff_base_ms <= cfg.backoff_cap_ms);
        assert!(cfg.resolved_worker_pool_size() >= 1);
    }

    #[test]
    fn env_override_takes_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SIFTCORE_REOPT_INTERVAL", "7");
            let cfg = Config::load().unwrap();
            assert_eq!(cfg.reopt_interval, 7);
            Ok(())
        });
    }
}
