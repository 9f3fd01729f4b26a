//! Monte Carlo retirement simulation kernel: correlated fat-tailed returns,
//! a per-path cashflow engine, and percentile aggregation over many
//! independent simulated trajectories.

pub mod aggregate;
pub mod asset;
pub mod body;
pub mod cashflow;
pub mod config;
pub mod covariance;
pub mod error;
pub mod jumps;
pub mod orchestrator;
pub mod params;
pub mod returns;
pub mod rng;
pub mod scenario;
pub mod tensor;

pub use aggregate::{AggregateResult, EndBalancePercentiles};
pub use asset::Asset;
pub use config::RunConfig;
pub use error::{NumericalError, SimError, ValidationError};
pub use orchestrator::{simulate, SimulationResult};
pub use params::{ParameterPack, Toggle};
pub use scenario::Scenario;
