//! Log-space covariance and its Cholesky factor.
//!
//! Computed once per run from the scenario's CMA block: covariance is
//! `diag(sigma) * rho * diag(sigma)` in log-return space, and its Cholesky
//! factor `L` satisfies `L * L^T = Sigma_log`. A plain nested-array
//! Cholesky-Banachiewicz decomposition is enough at this fixed 5x5 size; no
//! matrix-library dependency is pulled in for it.

use crate::asset::N_ASSETS;
use crate::error::NumericalError;
use crate::params::Cma;

/// Convert an annual arithmetic vol to the log-return vol it implies, via
/// the Ito-consistent approximation `sigma_log^2 = ln(1 + sigma^2 / (1 +
/// mu)^2)`.
pub fn arithmetic_vol_to_log_vol(mean: f64, vol: f64) -> f64 {
    let ratio = vol * vol / ((1.0 + mean) * (1.0 + mean));
    (1.0 + ratio).ln().max(0.0).sqrt()
}

/// Log-space covariance matrix built from the scenario's CMA block, treating
/// the supplied vols as already log-scale (the common case) unless
/// `cma.vols_are_arithmetic` asks for the arithmetic-to-log conversion.
pub fn log_covariance(cma: &Cma) -> [[f64; N_ASSETS]; N_ASSETS] {
    let mut sigma_log = [0.0; N_ASSETS];
    for i in 0..N_ASSETS {
        sigma_log[i] = if cma.vols_are_arithmetic {
            arithmetic_vol_to_log_vol(cma.mean[i], cma.vol[i])
        } else {
            cma.vol[i]
        };
    }

    let mut cov = [[0.0; N_ASSETS]; N_ASSETS];
    for i in 0..N_ASSETS {
        for j in 0..N_ASSETS {
            cov[i][j] = sigma_log[i] * cma.correlation[i][j] * sigma_log[j];
        }
    }
    cov
}

/// Cholesky-Banachiewicz decomposition of a symmetric positive semi-definite
/// matrix: returns lower-triangular `L` with `L * L^T = cov`.
pub fn cholesky(cov: &[[f64; N_ASSETS]; N_ASSETS]) -> Result<[[f64; N_ASSETS]; N_ASSETS], NumericalError> {
    let mut l = [[0.0; N_ASSETS]; N_ASSETS];
    for i in 0..N_ASSETS {
        for j in 0..=i {
            let mut sum = cov[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum < -1e-9 {
                    return Err(NumericalError::CholeskyFailed);
                }
                l[i][j] = sum.max(0.0).sqrt();
            } else if l[j][j] > 1e-12 {
                l[i][j] = sum / l[j][j];
            } else {
                l[i][j] = 0.0;
            }
        }
    }
    Ok(l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn identity_cma() -> Cma {
        let mut correlation = [[0.0; N_ASSETS]; N_ASSETS];
        for i in 0..N_ASSETS {
            correlation[i][i] = 1.0;
        }
        Cma {
            mean: [0.07, 0.03, 0.30, 0.02, 0.02],
            vol: [0.18, 0.06, 0.80, 0.01, 0.01],
            correlation,
            vols_are_arithmetic: false,
        }
    }

    #[test]
    fn cholesky_reconstructs_covariance() {
        let cma = identity_cma();
        let cov = log_covariance(&cma);
        let l = cholesky(&cov).unwrap();

        let mut reconstructed = [[0.0; N_ASSETS]; N_ASSETS];
        for i in 0..N_ASSETS {
            for j in 0..N_ASSETS {
                let mut s = 0.0;
                for k in 0..N_ASSETS {
                    s += l[i][k] * l[j][k];
                }
                reconstructed[i][j] = s;
            }
        }

        for i in 0..N_ASSETS {
            for j in 0..N_ASSETS {
                assert_abs_diff_eq!(reconstructed[i][j], cov[i][j], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn correlated_pair_cholesky_is_lower_triangular() {
        let mut cma = identity_cma();
        cma.correlation[0][1] = 0.3;
        cma.correlation[1][0] = 0.3;
        let cov = log_covariance(&cma);
        let l = cholesky(&cov).unwrap();
        for i in 0..N_ASSETS {
            for j in (i + 1)..N_ASSETS {
                assert_eq!(l[i][j], 0.0);
            }
        }
    }

    #[test]
    fn non_psd_matrix_is_rejected() {
        let mut cma = identity_cma();
        // An inconsistent correlation structure that cannot be PSD.
        cma.correlation[0][1] = 0.99;
        cma.correlation[1][0] = 0.99;
        cma.correlation[0][2] = -0.99;
        cma.correlation[2][0] = -0.99;
        cma.correlation[1][2] = 0.99;
        cma.correlation[2][1] = 0.99;
        let cov = log_covariance(&cma);
        assert!(cholesky(&cov).is_err());
    }

    #[test]
    fn arithmetic_to_log_vol_is_close_for_small_vol() {
        let log_vol = arithmetic_vol_to_log_vol(0.07, 0.18);
        assert!((log_vol - 0.18).abs() < 0.02);
    }
}
