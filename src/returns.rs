//! Return assembler and pilot-based mean corrector (component D).
//!
//! Body + jumps + drift are composed entirely in log space; arithmetic
//! returns are produced exactly once, after the pilot-based drift
//! correction has been applied.

use rand::Rng;

use crate::asset::{Asset, AssetArray, N_ASSETS};
use tracing::error;
use crate::body::{fill_body, GAUSSIAN_LIMIT_DF};
use crate::error::NumericalError;
use crate::jumps::fill_jumps;
use crate::params::ParameterPack;
use crate::tensor::ReturnTensor;

/// Maximum tolerated pilot drift correction per asset before treating the
/// result as numerically unstable.
pub const MAX_DRIFT_CORRECTION: f64 = 0.5;

/// Ito-consistent log-space drift: `mu_log = ln(1 + mu) - 0.5 * sigma_log^2`,
/// chosen so that `E[exp(R_log)] = 1 + mu` before any jump or pilot
/// correction is applied.
pub fn mu_log_drift(mean: AssetArray, sigma_log: AssetArray) -> AssetArray {
    let mut out = [0.0; N_ASSETS];
    for i in 0..N_ASSETS {
        out[i] = (1.0 + mean[i]).ln() - 0.5 * sigma_log[i] * sigma_log[i];
    }
    out
}

/// Fill `tensor[.., sim_range, ..]` with `R_log = Z + J + mu_log`, using the
/// fat-tail body generator and, when enabled, the Kou jump generator.
pub fn assemble_log_returns(
    tensor: &mut ReturnTensor,
    sim_range: std::ops::Range<usize>,
    l: &[[f64; N_ASSETS]; N_ASSETS],
    pack: &ParameterPack,
    mu_log: AssetArray,
    black_swan_active_at: impl Fn(usize, usize) -> bool,
    rng: &mut impl Rng,
) {
    // Off => skip jump generation and fall back to the Gaussian limit for
    // the body.
    let body_df = if pack.fat_tail.fat_tails {
        pack.fat_tail.t_df
    } else {
        GAUSSIAN_LIMIT_DF
    };
    fill_body(tensor, sim_range.clone(), l, body_df, rng);
    if pack.fat_tail.fat_tails {
        fill_jumps(tensor, sim_range.clone(), pack, &black_swan_active_at, rng);
    }
    let n_years = tensor.n_years;
    for year in 0..n_years {
        for sim in sim_range.clone() {
            for (i, &drift) in mu_log.iter().enumerate() {
                tensor.add(year, sim, i, drift);
            }
        }
    }
}

/// Run the pilot pass: a small, independently-seeded tensor used only to
/// estimate the empirical arithmetic mean so a per-asset additive drift
/// correction can be derived.
pub fn pilot_drift_correction(
    pilot_years: usize,
    pilot_sims: usize,
    l: &[[f64; N_ASSETS]; N_ASSETS],
    pack: &ParameterPack,
    mu_log: AssetArray,
    target_mean: AssetArray,
    rng: &mut impl Rng,
) -> Result<AssetArray, NumericalError> {
    let mut pilot = ReturnTensor::zeros(pilot_years, pilot_sims);
    assemble_log_returns(&mut pilot, 0..pilot_sims, l, pack, mu_log, |_, _| false, rng);

    if !pilot.all_finite() {
        let (year, sim, asset) = pilot.first_non_finite().unwrap();
        error!(asset = ?Asset::from_index(asset), year, sim, "non-finite return in pilot pass");
        return Err(NumericalError::NonFiniteReturn { asset, year, sim });
    }

    let mut empirical_mean = [0.0; N_ASSETS];
    let n = (pilot_years * pilot_sims) as f64;
    for asset in 0..N_ASSETS {
        let mut sum = 0.0;
        for year in 0..pilot_years {
            for sim in 0..pilot_sims {
                sum += pilot.get(year, sim, asset).exp() - 1.0;
            }
        }
        empirical_mean[asset] = sum / n;
    }

    let mut delta = [0.0; N_ASSETS];
    for asset in 0..N_ASSETS {
        let corrected = (1.0 + target_mean[asset]) / (1.0 + empirical_mean[asset]);
        let d = corrected.ln();
        if !d.is_finite() || d.abs() > MAX_DRIFT_CORRECTION {
            return Err(NumericalError::MeanCorrectionDiverged { asset, delta: d });
        }
        delta[asset] = d;
    }

    Ok(delta)
}

/// Convert the final, drift-corrected log-return tensor to arithmetic
/// returns. Produced exactly once per run.
pub fn to_arithmetic_returns(tensor: &mut ReturnTensor) -> Result<(), NumericalError> {
    if !tensor.all_finite() {
        let (year, sim, asset) = tensor.first_non_finite().unwrap();
        error!(asset = ?Asset::from_index(asset), year, sim, "non-finite return in main pass");
        return Err(NumericalError::NonFiniteReturn { asset, year, sim });
    }
    let n_years = tensor.n_years;
    let n_sims = tensor.n_sims;
    for year in 0..n_years {
        for sim in 0..n_sims {
            for asset in 0..N_ASSETS {
                let r_log = tensor.get(year, sim, asset);
                tensor.set(year, sim, asset, r_log.exp() - 1.0);
            }
        }
    }
    Ok(())
}

pub fn apply_delta(tensor: &mut ReturnTensor, sim_range: std::ops::Range<usize>, delta: AssetArray) {
    let n_years = tensor.n_years;
    for year in 0..n_years {
        for sim in sim_range.clone() {
            for (asset, &d) in delta.iter().enumerate() {
                tensor.add(year, sim, asset, d);
            }
        }
    }
}
