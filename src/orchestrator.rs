//! Orchestrator (component G): wires parameter pack, covariance, pilot pass,
//! parallel main pass, cashflow simulation, and aggregation into the single
//! `simulate` entrypoint.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, info_span};

use crate::aggregate::{aggregate, AggregateResult};
use crate::asset::N_ASSETS;
use crate::cashflow::{black_swan_active_at, simulate_path, BalancePaths};
use crate::config::RunConfig;
use crate::covariance::{cholesky, log_covariance};
use crate::error::SimError;
use crate::params::ParameterPack;
use crate::returns::{apply_delta, assemble_log_returns, mu_log_drift, pilot_drift_correction, to_arithmetic_returns};
use crate::scenario::Scenario;
use crate::rng::{rng_for_stream, StreamId};
use crate::tensor::ReturnTensor;

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub ages: Vec<i64>,
    pub p20: Vec<f64>,
    pub p50: Vec<f64>,
    pub p80: Vec<f64>,
    pub end_balance_percentiles: crate::aggregate::EndBalancePercentiles,
    pub success_prob: f64,
}

impl From<AggregateResult> for SimulationResult {
    fn from(r: AggregateResult) -> Self {
        Self {
            ages: r.ages,
            p20: r.p20,
            p50: r.p50,
            p80: r.p80,
            end_balance_percentiles: r.end_balance_percentiles,
            success_prob: r.success_prob,
        }
    }
}

/// Run one Monte Carlo retirement simulation for `scenario` under the
/// knobs in `run_config`.
pub fn simulate(scenario: &Scenario, run_config: &RunConfig) -> Result<SimulationResult, SimError> {
    let started = Instant::now();
    let span = info_span!("simulate", n_sims = scenario.n_sims, n_years = scenario.n_years());
    let _guard = span.enter();

    scenario.validate()?;
    let pack = run_config.effective_pack();
    pack.validate()?;

    check_deadline(run_config, started)?;

    let w_target = scenario.target_weights();
    let cov = log_covariance(&scenario.cma);
    let l = cholesky(&cov)?;
    let mu_log = mu_log_drift(scenario.cma.mean, scenario.cma.vol);

    let delta = {
        let pilot_span = info_span!("pilot_pass", n_sims = run_config.pilot_sims, n_years = run_config.pilot_years);
        let _pilot_guard = pilot_span.enter();
        let mut pilot_rng = rng_for_stream(run_config.seed, StreamId::Pilot);
        pilot_drift_correction(
            run_config.pilot_years,
            run_config.pilot_sims,
            &l,
            &pack,
            mu_log,
            scenario.cma.mean,
            &mut pilot_rng,
        )?
    };
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "pilot pass complete");

    check_deadline(run_config, started)?;

    let tensor = {
        let main_span = info_span!("main_pass", n_sims = scenario.n_sims, n_years = scenario.n_years());
        let _main_guard = main_span.enter();
        run_main_pass(scenario, &pack, &l, mu_log, delta, run_config)?
    };
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "main pass complete");

    check_deadline(run_config, started)?;

    let mut tensor = tensor;
    to_arithmetic_returns(&mut tensor)?;

    let n_years = scenario.n_years();
    let n_sims = scenario.n_sims as usize;
    let mut paths = BalancePaths::new(n_years, n_sims, scenario.initial_balance());
    for sim in 0..n_sims {
        if sim % 4096 == 0 {
            check_deadline(run_config, started)?;
        }
        simulate_path(scenario, w_target, &tensor, sim, &mut paths);
    }

    if let Some((year, sim)) = paths.first_non_finite() {
        return Err(SimError::Internal {
            path: sim,
            year,
            message: "non-finite balance after cashflow arithmetic on already-finite returns".into(),
        });
    }

    let result = {
        let agg_span = info_span!("aggregate", n_sims = scenario.n_sims, n_years = scenario.n_years());
        let _agg_guard = agg_span.enter();
        aggregate(&paths, scenario.current_age)
    };
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "simulation complete");

    Ok(result.into())
}

fn check_deadline(run_config: &RunConfig, started: Instant) -> Result<(), SimError> {
    if let Some(timeout) = run_config.timeout {
        if started.elapsed() > timeout {
            return Err(SimError::Cancelled {
                reason: format!("wall-clock timeout of {timeout:?} exceeded"),
            });
        }
    }
    Ok(())
}

/// Split the simulation axis into independent chunks of a few thousand
/// paths each, generate each chunk's return tensor on its own substream in
/// parallel, then merge the chunk tensors into one (Y, S, A) tensor.
fn run_main_pass(
    scenario: &Scenario,
    pack: &ParameterPack,
    l: &[[f64; N_ASSETS]; N_ASSETS],
    mu_log: [f64; N_ASSETS],
    delta: [f64; N_ASSETS],
    run_config: &RunConfig,
) -> Result<ReturnTensor, SimError> {
    let n_years = scenario.n_years();
    let n_sims = scenario.n_sims as usize;
    let chunk_size = run_config.chunk_size.max(1);

    let bounds: Vec<(usize, usize)> = (0..n_sims)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(n_sims)))
        .collect();

    let chunk_results: Vec<ReturnTensor> = bounds
        .par_iter()
        .enumerate()
        .map(|(chunk_idx, &(start, end))| {
            let chunk_len = end - start;
            let mut local = ReturnTensor::zeros(n_years, chunk_len);
            let mut rng = rng_for_stream(run_config.seed, StreamId::MainChunk(chunk_idx as u64));
            assemble_log_returns(
                &mut local,
                0..chunk_len,
                l,
                pack,
                mu_log,
                |_local_sim, year| black_swan_active_at(&scenario.black_swan, scenario.current_age, year),
                &mut rng,
            );
            apply_delta(&mut local, 0..chunk_len, delta);
            local
        })
        .collect();

    let mut tensor = ReturnTensor::zeros(n_years, n_sims);
    for (&(start, end), local) in bounds.iter().zip(chunk_results.iter()) {
        for year in 0..n_years {
            let dst_start = start * N_ASSETS;
            let dst_end = end * N_ASSETS;
            tensor.year_slice_mut(year)[dst_start..dst_end].copy_from_slice(local.year_slice(year));
        }
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Account, AccountWeights, BlackSwan, Consulting, SpendingSchedule, TaxSettings};
    use crate::params::{Cma, Toggle};
    use crate::asset::Asset;

    fn identity_cma(mean: [f64; N_ASSETS], vol: [f64; N_ASSETS]) -> Cma {
        let mut correlation = [[0.0; N_ASSETS]; N_ASSETS];
        for i in 0..N_ASSETS {
            correlation[i][i] = 1.0;
        }
        Cma { mean, vol, correlation, vols_are_arithmetic: false }
    }

    fn baseline_scenario() -> Scenario {
        Scenario {
            current_age: 55,
            end_age: 90,
            n_sims: 2000,
            accounts: vec![Account {
                kind: "brokerage".into(),
                balance: 1_500_000.0,
                weights: AccountWeights { stocks: 0.6, bonds: 0.4, crypto: 0.0, cds: 0.0, cash: 0.0 },
            }],
            spending: SpendingSchedule {
                base_annual: 60_000.0,
                reduced_annual: 60_000.0,
                reduce_at_age: 55,
                inflation: 0.025,
            },
            incomes: vec![],
            lumps: vec![],
            toys: vec![],
            consulting: Consulting::default(),
            taxes: TaxSettings { effective_rate: 0.15, taxable_portfolio_ratio: 0.5, taxable_income_ratio: 0.5 },
            cma: identity_cma([0.07, 0.03, 0.30, 0.02, 0.02], [0.18, 0.06, 0.80, 0.01, 0.01]),
            black_swan: BlackSwan::default(),
        }
    }

    #[test]
    fn baseline_scenario_produces_sane_output() {
        let scenario = baseline_scenario();
        let run_config = RunConfig::for_tests(42);
        let result = simulate(&scenario, &run_config).unwrap();

        assert_eq!(result.ages.len(), scenario.n_years() + 1);
        assert_eq!(result.p50.len(), result.ages.len());
        for y in 0..result.ages.len() {
            assert!(result.p20[y] <= result.p50[y] + 1e-6);
            assert!(result.p50[y] <= result.p80[y] + 1e-6);
        }
        assert!((0.0..=1.0).contains(&result.success_prob));
    }

    #[test]
    fn determinism_same_seed_same_result() {
        let scenario = baseline_scenario();
        let run_config = RunConfig::for_tests(42);
        let a = simulate(&scenario, &run_config).unwrap();
        let b = simulate(&scenario, &run_config).unwrap();
        assert_eq!(a.success_prob, b.success_prob);
        for y in 0..a.p50.len() {
            assert_eq!(a.p50[y], b.p50[y]);
        }
    }

    #[test]
    fn different_seeds_can_differ() {
        let scenario = baseline_scenario();
        let a = simulate(&scenario, &RunConfig::for_tests(1)).unwrap();
        let b = simulate(&scenario, &RunConfig::for_tests(2)).unwrap();
        // Not asserting inequality (they could coincide), just that both run.
        assert!(a.success_prob.is_finite());
        assert!(b.success_prob.is_finite());
    }

    #[test]
    fn toggle_monotonicity_extreme_ge_standard_success_rate() {
        let scenario = baseline_scenario();
        let standard = simulate(&scenario, &RunConfig::for_tests(42)).unwrap();
        let extreme = simulate(
            &scenario,
            &RunConfig { toggle: Some(Toggle::ExtremeMagnitude), ..RunConfig::for_tests(42) },
        )
        .unwrap();
        assert!(extreme.success_prob <= standard.success_prob + 1e-9);
    }

    #[test]
    fn toggle_tiers_separate_success_prob_by_at_least_half_a_percent() {
        let mut scenario = baseline_scenario();
        scenario.n_sims = 20_000;
        let run_config = RunConfig::for_tests(42);

        let extreme = simulate(
            &scenario,
            &RunConfig { toggle: Some(Toggle::ExtremeMagnitude), ..run_config.clone() },
        )
        .unwrap();
        let standard = simulate(&scenario, &run_config).unwrap();

        let mut gaussian_pack = ParameterPack::production_default();
        gaussian_pack.fat_tail.fat_tails = false;
        let gaussian = simulate(
            &scenario,
            &RunConfig { parameter_pack: Some(gaussian_pack), ..run_config },
        )
        .unwrap();

        assert!(
            standard.success_prob - extreme.success_prob >= 0.005,
            "standard {} should clear extreme {} by at least 0.005",
            standard.success_prob,
            extreme.success_prob
        );
        assert!(
            gaussian.success_prob - standard.success_prob >= 0.005,
            "gaussian-limit {} should clear standard {} by at least 0.005",
            gaussian.success_prob,
            standard.success_prob
        );
    }

    #[test]
    fn fat_tails_reduce_success_prob_within_a_bounded_range() {
        let mut scenario = baseline_scenario();
        scenario.n_sims = 20_000;
        let run_config = RunConfig::for_tests(42);

        let with_fat_tails = simulate(&scenario, &run_config).unwrap();
        assert!(
            (0.63..=0.68).contains(&with_fat_tails.success_prob),
            "fat-tail success_prob {} out of expected range",
            with_fat_tails.success_prob
        );

        let mut gaussian_pack = ParameterPack::production_default();
        gaussian_pack.fat_tail.fat_tails = false;
        let without_fat_tails = simulate(
            &scenario,
            &RunConfig { parameter_pack: Some(gaussian_pack), ..run_config },
        )
        .unwrap();
        assert!(
            (0.66..=0.71).contains(&without_fat_tails.success_prob),
            "gaussian-limit success_prob {} out of expected range",
            without_fat_tails.success_prob
        );

        let reduction = without_fat_tails.success_prob - with_fat_tails.success_prob;
        assert!(
            (0.015..=0.055).contains(&reduction),
            "fat-tail success_prob reduction {reduction} out of expected range"
        );
    }

    #[test]
    fn success_prob_is_stable_across_seeds_within_a_small_bound() {
        let mut scenario = baseline_scenario();
        scenario.n_sims = 20_000;
        let a = simulate(&scenario, &RunConfig::for_tests(1)).unwrap();
        let b = simulate(&scenario, &RunConfig::for_tests(2)).unwrap();
        assert!(
            (a.success_prob - b.success_prob).abs() < 0.02,
            "success_prob across seeds diverged by more than 0.02: {} vs {}",
            a.success_prob,
            b.success_prob
        );
    }

    #[test]
    fn all_cash_allocation_has_near_zero_cross_path_variance() {
        let mut scenario = baseline_scenario();
        scenario.cma.vol[Asset::Cash.index()] = 0.0001;
        scenario.accounts = vec![Account {
            kind: "brokerage".into(),
            balance: 1_500_000.0,
            weights: AccountWeights { stocks: 0.0, bonds: 0.0, crypto: 0.0, cds: 0.0, cash: 1.0 },
        }];
        let result = simulate(&scenario, &RunConfig::for_tests(42)).unwrap();
        for y in 1..result.ages.len() {
            let p50 = result.p50[y];
            if p50.abs() < 1.0 {
                continue;
            }
            assert!(
                (result.p20[y] - p50).abs() / p50 < 0.01,
                "year {y}: p20 {} vs p50 {p50} diverge beyond 1%",
                result.p20[y]
            );
            assert!(
                (result.p80[y] - p50).abs() / p50 < 0.01,
                "year {y}: p80 {} vs p50 {p50} diverge beyond 1%",
                result.p80[y]
            );
        }
    }

    #[test]
    fn zero_spending_all_stocks_mean_growth_matches_target_drift() {
        let mut scenario = baseline_scenario();
        scenario.end_age = scenario.current_age + 1;
        scenario.spending.base_annual = 0.0;
        scenario.spending.reduced_annual = 0.0;
        scenario.accounts = vec![Account {
            kind: "brokerage".into(),
            balance: 1_000_000.0,
            weights: AccountWeights { stocks: 1.0, bonds: 0.0, crypto: 0.0, cds: 0.0, cash: 0.0 },
        }];
        scenario.n_sims = 200_000;
        let run_config = RunConfig::for_tests(42);

        let pack = run_config.effective_pack();
        let cov = log_covariance(&scenario.cma);
        let l = cholesky(&cov).unwrap();
        let mu_log = mu_log_drift(scenario.cma.mean, scenario.cma.vol);
        let mut pilot_rng = rng_for_stream(run_config.seed, StreamId::Pilot);
        let delta = pilot_drift_correction(
            run_config.pilot_years,
            run_config.pilot_sims,
            &l,
            &pack,
            mu_log,
            scenario.cma.mean,
            &mut pilot_rng,
        )
        .unwrap();

        let n_sims = scenario.n_sims as usize;
        let mut tensor = ReturnTensor::zeros(1, n_sims);
        let mut rng = rng_for_stream(run_config.seed, StreamId::MainChunk(0));
        assemble_log_returns(&mut tensor, 0..n_sims, &l, &pack, mu_log, |_, _| false, &mut rng);
        apply_delta(&mut tensor, 0..n_sims, delta);
        to_arithmetic_returns(&mut tensor).unwrap();

        let w_target = scenario.target_weights();
        let mut paths = BalancePaths::new(1, n_sims, scenario.initial_balance());
        for sim in 0..n_sims {
            simulate_path(&scenario, w_target, &tensor, sim, &mut paths);
        }

        let mean: f64 = paths.row(1).iter().sum::<f64>() / n_sims as f64;
        let expected = scenario.initial_balance() * (1.0 + scenario.cma.mean[Asset::Stocks.index()]);
        assert!(
            (mean - expected).abs() / expected < 0.01,
            "mean balance {mean} too far from target drift {expected}"
        );
    }

    #[test]
    fn black_swan_halves_median_balance_relative_to_no_shock() {
        let mut baseline = baseline_scenario();
        baseline.spending.base_annual = 0.0;
        baseline.spending.reduced_annual = 0.0;
        baseline.n_sims = 20_000;

        let mut shocked = baseline.clone();
        shocked.black_swan = BlackSwan { enabled: true, age: baseline.current_age, portfolio_drop: 0.5 };

        let run_config = RunConfig::for_tests(42);
        let base_result = simulate(&baseline, &run_config).unwrap();
        let shocked_result = simulate(&shocked, &run_config).unwrap();

        let ratio = shocked_result.p50[1] / base_result.p50[1];
        assert!(
            (ratio - 0.5).abs() < 0.05,
            "expected ~0.5x median balance after a 50% black swan, got ratio {ratio}"
        );
    }

    #[test]
    fn zero_years_returns_single_row() {
        let mut scenario = baseline_scenario();
        scenario.end_age = scenario.current_age;
        let result = simulate(&scenario, &RunConfig::for_tests(42)).unwrap();
        assert_eq!(result.ages.len(), 1);
        assert!((result.p50[0] - scenario.initial_balance()).abs() < 1e-6);
        assert_eq!(result.success_prob, 1.0);
    }

    #[test]
    fn black_swan_total_wipeout_forces_zero_success() {
        let mut scenario = baseline_scenario();
        scenario.black_swan = BlackSwan { enabled: true, age: scenario.current_age, portfolio_drop: 1.0 };
        scenario.spending.base_annual = 0.0;
        scenario.spending.reduced_annual = 0.0;
        let result = simulate(&scenario, &RunConfig::for_tests(42)).unwrap();
        assert_eq!(result.success_prob, 0.0);
    }

    #[test]
    fn invalid_scenario_is_rejected_without_panicking() {
        let mut scenario = baseline_scenario();
        scenario.end_age = scenario.current_age - 1;
        assert!(simulate(&scenario, &RunConfig::for_tests(42)).is_err());
    }
}
