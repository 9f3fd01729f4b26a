//! Kou double-exponential jump generator (component C).
//!
//! Produces additive log-space jumps: a market co-jump shared by a set of
//! correlated assets, plus an idiosyncratic jump per asset. Sizes are drawn
//! asymmetric double-exponential; the jump count for a cell and each
//! jump's sign are drawn independently, so the consumption order through a
//! single RNG stream defines reproducibility.

use rand::Rng;
use rand_distr::{Distribution, Exp, Poisson};

use crate::asset::Asset;
use crate::params::{KouParams, ParameterPack};
use crate::tensor::ReturnTensor;

/// Sum of `count` asymmetric double-exponential jump sizes: each jump is
/// independently positive with probability `p_pos` (`+Exp(eta_pos)`) or
/// negative otherwise (`-Exp(eta_neg)`). One size is drawn per unit of
/// count, never a batch average.
fn draw_kou_sum(count: u64, params: KouParams, rng: &mut impl Rng) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let pos_dist = if params.eta_pos > 0.0 {
        Some(Exp::new(1.0 / params.eta_pos).expect("eta_pos > 0"))
    } else {
        None
    };
    let neg_dist = if params.eta_neg > 0.0 {
        Some(Exp::new(1.0 / params.eta_neg).expect("eta_neg > 0"))
    } else {
        None
    };

    let mut total = 0.0;
    for _ in 0..count {
        if rng.gen::<f64>() < params.p_pos {
            total += pos_dist.map(|d| d.sample(rng)).unwrap_or(0.0);
        } else {
            total -= neg_dist.map(|d| d.sample(rng)).unwrap_or(0.0);
        }
    }
    total
}

fn draw_jump_field(
    n_years: usize,
    n_sims: usize,
    lam: f64,
    params: KouParams,
    rng: &mut impl Rng,
) -> Vec<f64> {
    let mut field = vec![0.0; n_years * n_sims];
    if lam <= 0.0 {
        return field;
    }
    let poisson = Poisson::new(lam).expect("lam > 0");
    for cell in field.iter_mut() {
        let count = poisson.sample(rng).round().max(0.0) as u64;
        *cell = draw_kou_sum(count, params, rng);
    }
    field
}

/// Fill jump contributions into `tensor` for the assigned sim range, for one
/// "stream chunk" (a contiguous set of sims sharing one RNG). Years are
/// iterated as part of each field's (year, sim) flattening so the market
/// co-jump and every idiosyncratic jump consume the stream in a fixed order.
pub fn fill_jumps(
    tensor: &mut ReturnTensor,
    sim_range: std::ops::Range<usize>,
    pack: &ParameterPack,
    black_swan_active_at: impl Fn(usize, usize) -> bool,
    rng: &mut impl Rng,
) {
    let n_years = tensor.n_years;
    let chunk_sims = sim_range.len();
    if chunk_sims == 0 {
        return;
    }

    // Market co-jump: drawn once per (year, sim) cell in the chunk, shared
    // across all assets it affects. Black-swan years use a distinct eta_neg
    // per (year, sim) so the field can't be precomputed globally without
    // knowing which cells have an active shock; draw it field-by-field with
    // the predicate inlined instead.
    let market_kou_normal = pack.market_co_jump_for(false);
    let market_kou_shocked = pack.market_co_jump_for(true);
    let market_lam = market_kou_normal.lam;

    let mut market_field = vec![0.0; n_years * chunk_sims];
    if market_lam > 0.0 {
        let poisson = Poisson::new(market_lam).expect("lam > 0");
        for year in 0..n_years {
            for (local_idx, sim) in sim_range.clone().enumerate() {
                let params = if black_swan_active_at(sim, year) {
                    market_kou_shocked
                } else {
                    market_kou_normal
                };
                let count = poisson.sample(rng).round().max(0.0) as u64;
                market_field[year * chunk_sims + local_idx] = draw_kou_sum(count, params, rng);
            }
        }
    }

    for (local_idx, sim) in sim_range.clone().enumerate() {
        for year in 0..n_years {
            let field_value = market_field[year * chunk_sims + local_idx];
            if field_value == 0.0 {
                continue;
            }
            for &asset in &pack.market_co_jump.affected_assets {
                tensor.add(year, sim, asset.index(), field_value);
            }
            tensor.add(
                year,
                sim,
                Asset::Bonds.index(),
                pack.market_co_jump.bond_beta * field_value,
            );
        }
    }

    // Idiosyncratic jumps, one independent field per asset.
    for asset in Asset::ALL {
        let mut kou = pack.kou_for(asset);
        kou.lam = pack.idiosyncratic_lam_capped(asset);
        if kou.lam <= 0.0 {
            continue;
        }
        let field = draw_jump_field(n_years, chunk_sims, kou.lam, kou, rng);
        for (local_idx, sim) in sim_range.clone().enumerate() {
            for year in 0..n_years {
                let v = field[year * chunk_sims + local_idx];
                if v != 0.0 {
                    tensor.add(year, sim, asset.index(), v);
                }
            }
        }
    }
}
