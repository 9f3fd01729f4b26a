//! Scenario: the immutable, user-supplied description of a retirement plan.
//! Validated once at the orchestrator boundary; never mutated during a run.

use serde::{Deserialize, Serialize};

use crate::asset::{asset_array_from_map, Asset, AssetArray, N_ASSETS};
use crate::error::ValidationError;
use crate::params::Cma;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountWeights {
    pub stocks: f64,
    pub bonds: f64,
    pub crypto: f64,
    pub cds: f64,
    pub cash: f64,
}

impl AccountWeights {
    pub fn as_array(&self) -> AssetArray {
        asset_array_from_map(|a| match a {
            Asset::Stocks => self.stocks,
            Asset::Bonds => self.bonds,
            Asset::Crypto => self.crypto,
            Asset::Cds => self.cds,
            Asset::Cash => self.cash,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub kind: String,
    pub balance: f64,
    pub weights: AccountWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingSchedule {
    pub base_annual: f64,
    pub reduced_annual: f64,
    pub reduce_at_age: i64,
    pub inflation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeStream {
    pub start_age: i64,
    pub end_age: i64,
    pub monthly: f64,
    pub cola: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LumpEvent {
    pub age: i64,
    pub amount: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToyEvent {
    pub age: i64,
    pub amount: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consulting {
    pub start_age: i64,
    pub years: i64,
    pub start_amount: f64,
    pub growth: f64,
}

impl Default for Consulting {
    fn default() -> Self {
        Self {
            start_age: 0,
            years: 0,
            start_amount: 0.0,
            growth: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSettings {
    pub effective_rate: f64,
    pub taxable_portfolio_ratio: f64,
    pub taxable_income_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackSwan {
    pub enabled: bool,
    pub age: i64,
    pub portfolio_drop: f64,
}

impl Default for BlackSwan {
    fn default() -> Self {
        Self {
            enabled: false,
            age: 0,
            portfolio_drop: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub current_age: i64,
    pub end_age: i64,
    pub n_sims: i64,
    pub accounts: Vec<Account>,
    pub spending: SpendingSchedule,
    #[serde(default)]
    pub incomes: Vec<IncomeStream>,
    #[serde(default)]
    pub lumps: Vec<LumpEvent>,
    #[serde(default)]
    pub toys: Vec<ToyEvent>,
    #[serde(default)]
    pub consulting: Consulting,
    pub taxes: TaxSettings,
    pub cma: Cma,
    #[serde(default)]
    pub black_swan: BlackSwan,
}

impl Scenario {
    pub fn n_years(&self) -> usize {
        (self.end_age - self.current_age) as usize
    }

    pub fn initial_balance(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    /// Balance-weighted average of account weights, renormalized to sum to
    /// one.
    pub fn target_weights(&self) -> AssetArray {
        let total = self.initial_balance();
        if total <= 0.0 {
            // No capital to weight by: fall back to an equal-weight split of
            // the first account's allocation, or all-cash if there isn't one.
            return self
                .accounts
                .first()
                .map(|a| a.weights.as_array())
                .unwrap_or(asset_array_from_map(|a| if a == Asset::Cash { 1.0 } else { 0.0 }));
        }
        let mut agg = [0.0; N_ASSETS];
        for account in &self.accounts {
            let w = account.weights.as_array();
            for i in 0..N_ASSETS {
                agg[i] += (account.balance / total) * w[i];
            }
        }
        let sum: f64 = agg.iter().sum();
        if sum > 0.0 {
            for v in agg.iter_mut() {
                *v /= sum;
            }
        }
        agg
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_age < self.current_age {
            return Err(ValidationError::AgesInverted {
                current_age: self.current_age,
                end_age: self.end_age,
            });
        }
        if self.n_sims <= 0 {
            return Err(ValidationError::NonPositiveSims(self.n_sims));
        }
        for (index, account) in self.accounts.iter().enumerate() {
            if account.balance < 0.0 {
                return Err(ValidationError::NegativeBalance { index, balance: account.balance });
            }
            let w = account.weights.as_array();
            let sum: f64 = w.iter().sum();
            if (sum - 1.0).abs() > 1e-6 {
                return Err(ValidationError::AccountWeightsDontSum { index, sum });
            }
            for (i, &value) in w.iter().enumerate() {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ValidationError::WeightOutOfRange { index: i, value });
                }
            }
        }
        if !(0.0..=1.0).contains(&self.taxes.effective_rate) {
            return Err(ValidationError::TaxRateOutOfRange(self.taxes.effective_rate));
        }
        self.cma.validate()?;
        Ok(())
    }
}
