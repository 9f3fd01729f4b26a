//! Per-path, per-year cashflow engine (component E).
//!
//! Applies income, spending, lump events, toy purchases, taxes, the
//! black-swan shock, and the year's portfolio return, in a fixed order.
//! Once a path's balance hits zero it stays zero for every subsequent year.

use crate::asset::{AssetArray, N_ASSETS};
use crate::scenario::{BlackSwan, Consulting, IncomeStream, LumpEvent, Scenario, TaxSettings, ToyEvent};
use crate::tensor::ReturnTensor;

/// Balances for every (year, sim) pair, row-major by year. Row 0 is the
/// initial balance for every path.
#[derive(Debug, Clone)]
pub struct BalancePaths {
    pub n_years: usize,
    pub n_sims: usize,
    data: Vec<f64>,
}

impl BalancePaths {
    pub fn new(n_years: usize, n_sims: usize, initial_balance: f64) -> Self {
        let mut data = vec![0.0; (n_years + 1) * n_sims];
        data[..n_sims].fill(initial_balance);
        Self { n_years, n_sims, data }
    }

    #[inline]
    pub fn get(&self, year: usize, sim: usize) -> f64 {
        self.data[year * self.n_sims + sim]
    }

    #[inline]
    pub fn set(&mut self, year: usize, sim: usize, value: f64) {
        self.data[year * self.n_sims + sim] = value;
    }

    pub fn row(&self, year: usize) -> &[f64] {
        let start = year * self.n_sims;
        &self.data[start..start + self.n_sims]
    }

    /// First `(year, sim)` pair whose balance is NaN or infinite, if any.
    /// Returns are validated finite before the cashflow loop runs, so a hit
    /// here means the withdraw/return arithmetic itself overflowed.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        for year in 0..=self.n_years {
            for sim in 0..self.n_sims {
                if !self.get(year, sim).is_finite() {
                    return Some((year, sim));
                }
            }
        }
        None
    }
}

fn consulting_income(consulting: &Consulting, age: i64) -> f64 {
    if consulting.years <= 0 || age < consulting.start_age || age >= consulting.start_age + consulting.years {
        return 0.0;
    }
    let years_since_start = (age - consulting.start_age) as f64;
    consulting.start_amount * (1.0 + consulting.growth).powf(years_since_start)
}

fn income_streams_total(incomes: &[IncomeStream], age: i64) -> f64 {
    incomes
        .iter()
        .filter(|s| age >= s.start_age && age <= s.end_age)
        .map(|s| {
            let years_since_start = (age - s.start_age).max(0) as f64;
            s.monthly * 12.0 * (1.0 + s.cola).powf(years_since_start)
        })
        .sum()
}

fn spending_for_year(spending: &crate::scenario::SpendingSchedule, age: i64, current_age: i64) -> f64 {
    let base = if age < spending.reduce_at_age {
        spending.base_annual
    } else {
        spending.reduced_annual
    };
    let years_since_start = (age - current_age).max(0) as f64;
    base * (1.0 + spending.inflation).powf(years_since_start)
}

fn lumps_for_year(lumps: &[LumpEvent], age: i64) -> f64 {
    lumps.iter().filter(|l| l.age == age).map(|l| l.amount).sum()
}

fn toys_for_year(toys: &[ToyEvent], age: i64) -> f64 {
    toys.iter().filter(|t| t.age == age).map(|t| t.amount).sum()
}

/// Net-of-tax withdrawal need for the year: income reduces the need first,
/// then the remainder is grossed up for withdrawal tax, and income's own
/// taxable share is added back on top.
fn withdrawal_need_after_tax(spending: f64, income: f64, lumps: f64, taxes: &TaxSettings) -> f64 {
    let w = spending - income - lumps;
    let w_portfolio = w.max(0.0);
    let grossed_up_portfolio = w_portfolio * (1.0 + taxes.effective_rate * taxes.taxable_portfolio_ratio);
    let income_tax = income.max(0.0) * taxes.effective_rate * taxes.taxable_income_ratio;
    let mut w_eff = grossed_up_portfolio + income_tax;
    // A negative raw need (income covers spending with room to spare) means
    // no withdrawal is required at all; taxes on income already reduced it
    // above, so only floor at zero rather than letting a negative need net
    // against the income tax term.
    if w <= 0.0 {
        w_eff = income_tax;
    }
    w_eff
}

/// Per-path outcome for a single simulated year, kept for callers that want
/// more than the surviving balance (diagnostics, future extensions).
#[derive(Debug, Clone, Copy)]
pub struct YearOutcome {
    pub withdrawal: f64,
    pub portfolio_return: f64,
    pub balance: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn simulate_path(
    scenario: &Scenario,
    w_target: AssetArray,
    returns: &ReturnTensor,
    sim: usize,
    paths: &mut BalancePaths,
) {
    let current_age = scenario.current_age;
    let n_years = scenario.n_years();
    let mut balance = paths.get(0, sim);
    let mut alive = balance > 0.0;

    for year in 0..n_years {
        let age = current_age + year as i64;

        if !alive {
            paths.set(year + 1, sim, 0.0);
            continue;
        }

        let income =
            consulting_income(&scenario.consulting, age) + income_streams_total(&scenario.incomes, age);
        let spending = spending_for_year(&scenario.spending, age, current_age) + toys_for_year(&scenario.toys, age);
        let lumps = lumps_for_year(&scenario.lumps, age);
        let w_eff = withdrawal_need_after_tax(spending, income, lumps, &scenario.taxes);

        if scenario.black_swan.enabled && age == scenario.black_swan.age {
            balance *= 1.0 - scenario.black_swan.portfolio_drop;
        }

        let mut portfolio_return = 0.0;
        for asset in 0..N_ASSETS {
            portfolio_return += w_target[asset] * returns.get(year, sim, asset);
        }

        balance = (balance - w_eff) * (1.0 + portfolio_return);

        if balance <= 0.0 {
            balance = 0.0;
            alive = false;
        }

        paths.set(year + 1, sim, balance);
    }
}

pub fn black_swan_active_at(black_swan: &BlackSwan, current_age: i64, year: usize) -> bool {
    black_swan.enabled && current_age + year as i64 == black_swan.age
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Account, AccountWeights, SpendingSchedule, TaxSettings};
    use crate::params::Cma;
    use crate::asset::{asset_array_from_map, Asset};

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

    fn scenario_with(spending: f64, weights_all_stocks: bool) -> Scenario {
        let weights = if weights_all_stocks {
            AccountWeights { stocks: 1.0, bonds: 0.0, crypto: 0.0, cds: 0.0, cash: 0.0 }
        } else {
            AccountWeights { stocks: 0.6, bonds: 0.4, crypto: 0.0, cds: 0.0, cash: 0.0 }
        };
        Scenario {
            current_age: 55,
            end_age: 60,
            n_sims: 10,
            accounts: vec![Account { kind: "brokerage".into(), balance: 1_000_000.0, weights }],
            spending: SpendingSchedule { base_annual: spending, reduced_annual: spending, reduce_at_age: 55, inflation: 0.0 },
            incomes: vec![],
            lumps: vec![],
            toys: vec![],
            consulting: Consulting::default(),
            taxes: TaxSettings { effective_rate: 0.0, taxable_portfolio_ratio: 0.0, taxable_income_ratio: 0.0 },
            cma: identity_cma(),
            black_swan: BlackSwan::default(),
        }
    }

    #[test]
    fn zero_spending_grows_at_expected_return() {
        let scenario = scenario_with(0.0, true);
        let w = asset_array_from_map(|a| if a == Asset::Stocks { 1.0 } else { 0.0 });
        let mut returns = ReturnTensor::zeros(scenario.n_years(), 1);
        for year in 0..scenario.n_years() {
            returns.set(year, 0, Asset::Stocks.index(), 0.08);
        }
        let mut paths = BalancePaths::new(scenario.n_years(), 1, scenario.initial_balance());
        simulate_path(&scenario, w, &returns, 0, &mut paths);

        let expected = 1_000_000.0 * 1.08_f64.powi(scenario.n_years() as i32);
        assert!((paths.get(scenario.n_years(), 0) - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn depletion_is_one_way() {
        let scenario = scenario_with(2_000_000.0, true);
        let w = asset_array_from_map(|a| if a == Asset::Stocks { 1.0 } else { 0.0 });
        let mut returns = ReturnTensor::zeros(scenario.n_years(), 1);
        let mut paths = BalancePaths::new(scenario.n_years(), 1, scenario.initial_balance());
        simulate_path(&scenario, w, &returns, 0, &mut paths);

        let mut seen_zero = false;
        for year in 0..=scenario.n_years() {
            let balance = paths.get(year, 0);
            if seen_zero {
                assert_eq!(balance, 0.0);
            }
            if balance == 0.0 {
                seen_zero = true;
            }
        }
        assert!(seen_zero);
    }

    #[test]
    fn black_swan_applies_before_that_years_return() {
        let mut scenario = scenario_with(0.0, true);
        scenario.black_swan = BlackSwan { enabled: true, age: 55, portfolio_drop: 0.5 };
        let w = asset_array_from_map(|a| if a == Asset::Stocks { 1.0 } else { 0.0 });
        let mut returns = ReturnTensor::zeros(scenario.n_years(), 1);
        for year in 0..scenario.n_years() {
            returns.set(year, 0, Asset::Stocks.index(), 0.0);
        }
        let mut paths = BalancePaths::new(scenario.n_years(), 1, scenario.initial_balance());
        simulate_path(&scenario, w, &returns, 0, &mut paths);
        assert!((paths.get(1, 0) - 500_000.0).abs() < 1e-6);
    }

    #[test]
    fn withdrawal_need_floors_at_zero_when_income_exceeds_spending() {
        let taxes = TaxSettings { effective_rate: 0.2, taxable_portfolio_ratio: 0.5, taxable_income_ratio: 0.5 };
        let w_eff = withdrawal_need_after_tax(10_000.0, 20_000.0, 0.0, &taxes);
        assert!(w_eff >= 0.0);
        assert!(w_eff < 10_000.0);
    }

    #[test]
    fn first_non_finite_finds_the_offending_cell() {
        let mut paths = BalancePaths::new(2, 3, 100.0);
        assert!(paths.first_non_finite().is_none());
        paths.set(1, 2, f64::INFINITY);
        assert_eq!(paths.first_non_finite(), Some((1, 2)));
    }

    #[test]
    fn consulting_income_grows_from_start_age() {
        let consulting = Consulting { start_age: 50, years: 5, start_amount: 10_000.0, growth: 0.10 };
        assert_eq!(consulting_income(&consulting, 49), 0.0);
        assert!((consulting_income(&consulting, 50) - 10_000.0).abs() < 1e-9);
        assert!((consulting_income(&consulting, 51) - 11_000.0).abs() < 1e-9);
        assert_eq!(consulting_income(&consulting, 55), 0.0);
    }
}
