//! Runtime configuration: thread count and complex-step seed size.

use crate::object::Ref;
use crate::threads::ThreadInfo;
use crate::types::{TacsError, DEFAULT_COMPLEX_STEP, MAX_NUM_THREADS};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

pub const ENV_NUM_THREADS: &str = "TACS_NUM_THREADS";
pub const ENV_COMPLEX_STEP: &str = "TACS_COMPLEX_STEP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Requested threads; clamped to `[1, MAX_NUM_THREADS]` when applied.
    pub num_threads: usize,
    /// Imaginary seed magnitude for complex-step sensitivities.
    pub complex_step_size: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            complex_step_size: DEFAULT_COMPLEX_STEP,
        }
    }
}

impl RuntimeConfig {
    /// Parse from TOML; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, TacsError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `TACS_NUM_THREADS` / `TACS_COMPLEX_STEP` when set.
    pub fn with_env_overrides(mut self) -> Result<Self, TacsError> {
        if let Ok(v) = env::var(ENV_NUM_THREADS) {
            self.num_threads = v
                .trim()
                .parse()
                .map_err(|_| TacsError::Config(format!("{ENV_NUM_THREADS}={v:?} is not a count")))?;
        }
        if let Ok(v) = env::var(ENV_COMPLEX_STEP) {
            self.complex_step_size = v
                .trim()
                .parse()
                .map_err(|_| TacsError::Config(format!("{ENV_COMPLEX_STEP}={v:?} is not a number")))?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), TacsError> {
        let h = self.complex_step_size;
        if !(h.is_finite() && h > 0.0) {
            return Err(TacsError::Config(format!(
                "complex_step_size must be positive and finite, got {h}"
            )));
        }
        if self.num_threads == 0 || self.num_threads > MAX_NUM_THREADS {
            warn!(
                num_threads = self.num_threads,
                max = MAX_NUM_THREADS,
                "num_threads outside supported range, will be clamped"
            );
        }
        Ok(())
    }

    /// Build an owned thread-info object from this configuration.
    pub fn thread_info(&self) -> Ref<ThreadInfo> {
        Ref::new(ThreadInfo::new(self.num_threads))
    }
}
