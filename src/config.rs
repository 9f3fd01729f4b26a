//! Run-level configuration: knobs about *how* to simulate, orthogonal to the
//! financial scenario itself.

use std::time::Duration;

use crate::params::{ParameterPack, Toggle};

/// Deterministic fallback seed used when a caller doesn't supply one, so a
/// bare `RunConfig::default()` run is still reproducible.
pub const DEFAULT_SEED: u64 = 42;

pub const DEFAULT_CHUNK_SIZE: usize = 2_000;
pub const DEFAULT_PILOT_YEARS: usize = 20;
pub const DEFAULT_PILOT_SIMS: usize = 40_000;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub seed: u64,
    /// Number of simulation paths handed to each parallel worker.
    pub chunk_size: usize,
    /// Optional wall-clock cap; past this the orchestrator cancels
    /// outstanding chunks and returns `SimError::Cancelled`.
    pub timeout: Option<Duration>,
    pub pilot_years: usize,
    pub pilot_sims: usize,
    /// Parameter pack to use; defaults to the production calibration
    /// when not supplied.
    pub parameter_pack: Option<ParameterPack>,
    /// Fat-tail magnitude/frequency/skew toggle applied to a copy of
    /// `parameter_pack` before the pilot and main passes.
    pub toggle: Option<Toggle>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: None,
            pilot_years: DEFAULT_PILOT_YEARS,
            pilot_sims: DEFAULT_PILOT_SIMS,
            parameter_pack: None,
            toggle: None,
        }
    }
}

impl RunConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    pub fn with_toggle(toggle: Toggle) -> Self {
        Self { toggle: Some(toggle), ..Self::default() }
    }

    /// Small pilot/chunk sizes for fast unit and integration tests; still
    /// exercises the real pilot-correction and chunking code paths.
    pub fn for_tests(seed: u64) -> Self {
        Self {
            seed,
            chunk_size: 256,
            timeout: None,
            pilot_years: 5,
            pilot_sims: 4_000,
            parameter_pack: None,
            toggle: None,
        }
    }

    /// The effective parameter pack for a run: the configured override (or
    /// the production default) with the configured toggle applied, if any.
    pub fn effective_pack(&self) -> ParameterPack {
        let base = self.parameter_pack.clone().unwrap_or_else(ParameterPack::production_default);
        match self.toggle {
            Some(toggle) => base.with_toggle(toggle),
            None => base,
        }
    }
}

/// Install a process-wide `tracing` subscriber reading `RUST_LOG` (or
/// defaulting to `info`). Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
