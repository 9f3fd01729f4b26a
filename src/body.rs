//! Correlated Student-t diffusion body (component B).
//!
//! Produces zero-mean, correlated log-space shocks. Independent Student-t
//! draws are scaled to unit variance and then correlated via the Cholesky
//! factor of the log-return covariance.

use rand::Rng;
use rand_distr::{Distribution, StudentT};

use crate::asset::N_ASSETS;
use crate::tensor::ReturnTensor;

/// Degrees of freedom used as the Gaussian limit when `fat_tails` is off:
/// high enough that the Student-t body is indistinguishable from a normal.
pub const GAUSSIAN_LIMIT_DF: f64 = 1.0e6;

/// `t_df <= 2` makes the unit-variance scaling undefined; clamp with a
/// warning rather than producing NaNs.
pub fn safe_df(t_df: f64) -> f64 {
    if t_df <= 2.0 {
        tracing::warn!(requested_df = t_df, clamped_to = 2.5, "student-t df clamped");
        2.5
    } else {
        t_df
    }
}

/// Unit-variance scaling factor for a Student-t(df) variate: multiplying a
/// raw draw by this makes its unconditional variance 1.
pub fn variance_scale(df: f64) -> f64 {
    ((df - 2.0) / df).sqrt()
}

/// Fill every (year, sim) cell in `sim_range` with correlated Student-t
/// shocks. `l` is the Cholesky factor of the log-return covariance.
pub fn fill_body(
    tensor: &mut ReturnTensor,
    sim_range: std::ops::Range<usize>,
    l: &[[f64; N_ASSETS]; N_ASSETS],
    t_df: f64,
    rng: &mut impl Rng,
) {
    let df = safe_df(t_df);
    let scale = variance_scale(df);
    let dist = StudentT::new(df).expect("df > 2 after clamping");

    let n_years = tensor.n_years;
    for year in 0..n_years {
        for sim in sim_range.clone() {
            let mut raw = [0.0; N_ASSETS];
            for r in raw.iter_mut() {
                *r = scale * dist.sample(rng);
            }
            for i in 0..N_ASSETS {
                let mut z_i = 0.0;
                for (k, &raw_k) in raw.iter().enumerate() {
                    z_i += l[i][k] * raw_k;
                }
                tensor.set(year, sim, i, z_i);
            }
        }
    }
}
