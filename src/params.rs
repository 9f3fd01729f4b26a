//! Parameter pack: CMA, Kou jump parameters, market co-jump, fat-tail
//! toggles. Immutable for the lifetime of a run; toggle transforms always
//! produce a fresh copy rather than mutating the pack in place.

use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetArray, N_ASSETS};
use crate::error::ValidationError;

pub const PARAMS_VERSION: &str = "kou_params_v1";

/// The Standard-toggle annual tail probability that `tail_prob` is measured
/// relative to; a pack with `tail_prob == BASELINE_TAIL_PROB` leaves every
/// Kou intensity unscaled.
pub const BASELINE_TAIL_PROB: f64 = 0.025;

/// Capital market assumptions: per-asset means/vols plus the correlation
/// matrix, in the order declared by `Asset::ALL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cma {
    pub mean: AssetArray,
    /// Annual vol per asset, already on the log-return scale unless
    /// `vols_are_arithmetic` says otherwise.
    pub vol: AssetArray,
    /// Row-major |A|x|A| symmetric correlation matrix, unit diagonal.
    pub correlation: [[f64; N_ASSETS]; N_ASSETS],
    /// Set when `vol` holds arithmetic-return vols instead of log-return
    /// vols, so the covariance builder converts them first.
    #[serde(default)]
    pub vols_are_arithmetic: bool,
}

impl Cma {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for i in 0..N_ASSETS {
            let diag = self.correlation[i][i];
            if (diag - 1.0).abs() > 1e-9 {
                return Err(ValidationError::CorrelationBadDiagonal {
                    index: i,
                    value: diag,
                });
            }
            for j in 0..N_ASSETS {
                let a = self.correlation[i][j];
                let b = self.correlation[j][i];
                if (a - b).abs() > 1e-9 {
                    return Err(ValidationError::CorrelationNotSymmetric { i, j, a, b });
                }
            }
        }
        // The correlation matrix has unit diagonal, so it is its own
        // covariance; a failed Cholesky here means it isn't PSD.
        if crate::covariance::cholesky(&self.correlation).is_err() {
            return Err(ValidationError::CorrelationNotPsd);
        }
        Ok(())
    }
}

/// Kou double-exponential jump parameters for a single asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KouParams {
    /// Annual Poisson jump rate.
    pub lam: f64,
    /// Probability a jump is positive.
    pub p_pos: f64,
    /// Mean of the positive exponential jump size.
    pub eta_pos: f64,
    /// Mean of the negative exponential jump size.
    pub eta_neg: f64,
}

impl KouParams {
    pub fn validate(&self, asset_index: usize) -> Result<(), ValidationError> {
        if self.eta_pos < 0.0 {
            return Err(ValidationError::NegativeEta {
                index: asset_index,
                value: self.eta_pos,
            });
        }
        if self.eta_neg < 0.0 {
            return Err(ValidationError::NegativeEta {
                index: asset_index,
                value: self.eta_neg,
            });
        }
        Ok(())
    }
}

/// Shared market co-jump parameters: a single jump event that moves a set
/// of correlated assets together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCoJumpParams {
    pub kou: KouParams,
    pub affected_assets: Vec<Asset>,
    pub bond_beta: f64,
}

/// Fat-tail toggle settings: Student-t degrees of freedom, an annual
/// jump-frequency knob, and the negative-skew multiplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FatTailSettings {
    pub fat_tails: bool,
    pub t_df: f64,
    /// Annual tail probability (Standard 0.025, High 0.05) relative to
    /// [`BASELINE_TAIL_PROB`]; every Kou intensity is scaled by the ratio
    /// via [`ParameterPack::tail_prob_multiplier`].
    pub tail_prob: f64,
    pub tail_boost: f64,
}

impl Default for FatTailSettings {
    fn default() -> Self {
        Self {
            fat_tails: true,
            t_df: 8.0,
            tail_prob: BASELINE_TAIL_PROB,
            tail_boost: 1.0,
        }
    }
}

/// Named fat-tail magnitude/frequency toggles, as presented to a caller.
/// Each maps to a pure transform over a `ParameterPack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    ExtremeMagnitude,
    HighFrequency,
    NegativeSkew,
}

/// The full immutable parameter pack consumed by the body/jump generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterPack {
    #[serde(default = "default_version")]
    pub version: String,
    pub fat_tail: FatTailSettings,
    /// Per-asset Kou parameters, indexed by `Asset::index()`.
    pub kou: [KouParams; N_ASSETS],
    pub market_co_jump: MarketCoJumpParams,
}

fn default_version() -> String {
    PARAMS_VERSION.to_string()
}

/// Scale a Kou jump-size pair by the `tail_boost` skew knob: `eta_neg` grows
/// and `eta_pos` shrinks by the same factor above 1.0, and the reverse below
/// it, leaving `lam`/`p_pos` untouched.
fn apply_tail_boost(mut k: KouParams, boost: f64) -> KouParams {
    k.eta_neg *= boost;
    k.eta_pos /= boost;
    k
}

impl ParameterPack {
    /// The production capital-market and jump calibration used for a real run.
    pub fn production_default() -> Self {
        let kou = [
            KouParams {
                lam: 0.20,
                p_pos: 0.40,
                eta_pos: 0.030,
                eta_neg: 0.075,
            }, // stocks
            KouParams {
                lam: 0.03,
                p_pos: 0.50,
                eta_pos: 0.006,
                eta_neg: 0.012,
            }, // bonds
            KouParams {
                lam: 0.90,
                p_pos: 0.45,
                eta_pos: 0.140,
                eta_neg: 0.170,
            }, // crypto
            KouParams {
                lam: 0.0,
                p_pos: 0.50,
                eta_pos: 0.0,
                eta_neg: 0.0,
            }, // cds
            KouParams {
                lam: 0.0,
                p_pos: 0.50,
                eta_pos: 0.0,
                eta_neg: 0.0,
            }, // cash
        ];

        Self {
            version: PARAMS_VERSION.to_string(),
            fat_tail: FatTailSettings::default(),
            kou,
            market_co_jump: MarketCoJumpParams {
                kou: KouParams {
                    lam: 0.25,
                    p_pos: 0.40,
                    eta_pos: 0.055,
                    eta_neg: 0.075,
                },
                affected_assets: vec![Asset::Stocks, Asset::Crypto],
                bond_beta: 0.10,
            },
        }
    }

    /// Ratio of the configured `tail_prob` to [`BASELINE_TAIL_PROB`]: the
    /// multiplier every Kou intensity is scaled by. `1.0` at the Standard
    /// setting; `2.0` at the High setting (`tail_prob = 0.05`).
    pub fn tail_prob_multiplier(&self) -> f64 {
        self.fat_tail.tail_prob / BASELINE_TAIL_PROB
    }

    /// Per-asset Kou parameters with the `tail_boost` skew knob and the
    /// `tail_prob` intensity multiplier folded in. `boost == 1.0` is a
    /// no-op on jump size; `boost > 1.0` scales `eta_neg` up and `eta_pos`
    /// down by the same factor, and conversely below 1.0.
    pub fn kou_for(&self, asset: Asset) -> KouParams {
        let mut k = apply_tail_boost(self.kou[asset.index()], self.fat_tail.tail_boost);
        k.lam *= self.tail_prob_multiplier();
        k
    }

    /// Kou intensity for idiosyncratic jumps, capped at 1.0 per year to
    /// prevent unrealistic cascades.
    pub fn idiosyncratic_lam_capped(&self, asset: Asset) -> f64 {
        self.kou_for(asset).lam.min(1.0)
    }

    /// Market co-jump parameters, with `tail_boost` and `tail_prob` folded
    /// in and `eta_neg` reduced when a black-swan shock is active for this
    /// (path, year) to avoid double-counting the tail event.
    pub fn market_co_jump_for(&self, black_swan_active: bool) -> KouParams {
        let mut k = apply_tail_boost(self.market_co_jump.kou, self.fat_tail.tail_boost);
        k.lam *= self.tail_prob_multiplier();
        if black_swan_active {
            k.eta_neg = 0.070;
        }
        k
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fat_tail.t_df < 3.0 {
            return Err(ValidationError::DegenerateDf(self.fat_tail.t_df));
        }
        for (i, k) in self.kou.iter().enumerate() {
            k.validate(i)?;
        }
        self.market_co_jump.kou.validate(usize::MAX)?;
        Ok(())
    }

    /// Apply a toggle, returning a fresh pack. The receiver is never
    /// mutated.
    pub fn with_toggle(&self, toggle: Toggle) -> ParameterPack {
        let mut copy = self.clone();
        match toggle {
            Toggle::ExtremeMagnitude => {
                for k in copy.kou.iter_mut() {
                    k.eta_pos *= 1.30;
                    k.eta_neg *= 1.30;
                }
                copy.market_co_jump.kou.eta_pos *= 1.30;
                copy.market_co_jump.kou.eta_neg *= 1.30;
                copy.fat_tail.t_df = 5.0;
            }
            Toggle::HighFrequency => {
                // Scales every lam directly rather than through tail_prob's
                // multiplier, so tail_prob stays at the baseline here and
                // the two knobs don't compound into a 3x intensity jump.
                for k in copy.kou.iter_mut() {
                    k.lam *= 1.50;
                }
                copy.market_co_jump.kou.lam *= 1.50;
                copy.market_co_jump.kou.eta_neg *= 1.10;
            }
            Toggle::NegativeSkew => {
                for k in copy.kou.iter_mut() {
                    k.p_pos = (k.p_pos - 0.05).clamp(0.05, 0.95);
                    k.eta_neg *= 1.10;
                    k.eta_pos *= 0.95;
                }
                copy.market_co_jump.kou.p_pos = (copy.market_co_jump.kou.p_pos - 0.05).clamp(0.05, 0.95);
                copy.market_co_jump.kou.eta_neg *= 1.10;
                copy.market_co_jump.kou.eta_pos *= 0.95;
            }
        }
        copy
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(s).map_err(|e| ValidationError::MissingField(e.to_string()))
    }
}
