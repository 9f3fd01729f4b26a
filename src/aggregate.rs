//! Percentile aggregation over simulated balance paths (component F).

use crate::cashflow::BalancePaths;

/// Linear-interpolation ("type-7") quantile of `values` at `q in [0,1]`.
/// `values` is sorted in place by the caller's copy, never the original.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = pos - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

#[derive(Debug, Clone, Copy)]
pub struct EndBalancePercentiles {
    pub p20: f64,
    pub p50: f64,
    pub p80: f64,
}

#[derive(Debug, Clone)]
pub struct AggregateResult {
    pub ages: Vec<i64>,
    pub p20: Vec<f64>,
    pub p50: Vec<f64>,
    pub p80: Vec<f64>,
    pub end_balance_percentiles: EndBalancePercentiles,
    pub success_prob: f64,
}

/// Reduce a full `(n_years+1, S)` balance-path matrix down to the per-year
/// quantile bands, end-balance percentiles, and success probability.
pub fn aggregate(paths: &BalancePaths, current_age: i64) -> AggregateResult {
    let n_years = paths.n_years;
    let mut ages = Vec::with_capacity(n_years + 1);
    let mut p20 = Vec::with_capacity(n_years + 1);
    let mut p50 = Vec::with_capacity(n_years + 1);
    let mut p80 = Vec::with_capacity(n_years + 1);

    let mut scratch = vec![0.0; paths.n_sims];
    for year in 0..=n_years {
        ages.push(current_age + year as i64);
        scratch.copy_from_slice(paths.row(year));
        scratch.sort_by(|a, b| a.partial_cmp(b).expect("balances are never NaN"));
        p20.push(quantile(&scratch, 0.20));
        p50.push(quantile(&scratch, 0.50));
        p80.push(quantile(&scratch, 0.80));
    }

    let final_row = paths.row(n_years);
    let success_count = final_row.iter().filter(|&&b| b > 0.0).count();
    let success_prob = success_count as f64 / paths.n_sims as f64;

    let end_balance_percentiles = EndBalancePercentiles {
        p20: p20[n_years],
        p50: p50[n_years],
        p80: p80[n_years],
    };

    AggregateResult {
        ages,
        p20,
        p50,
        p80,
        end_balance_percentiles,
        success_prob,
    }
}
